//! Mailbox resolution: account identifier to Inbox folder

use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::session::StoreSession;
use crate::store::MailFolder;

/// Name of the child folder every account's mail is delivered to
pub const INBOX: &str = "Inbox";

/// Resolve the Inbox of the top-level store named `account`
///
/// The match on the store name is exact. The returned folder borrows the
/// session and cannot outlive its binding.
///
/// # Errors
///
/// - `InvalidInput` if `account` is blank
/// - `AccountNotFound` if no top-level store matches
/// - `FolderNotFound` if the store has no Inbox
pub fn resolve_inbox<'s>(
    session: &'s StoreSession<'_>,
    account: &str,
) -> AppResult<Box<dyn MailFolder + 's>> {
    if account.trim().is_empty() {
        return Err(AppError::invalid("Email account ID is required"));
    }

    let connection = session.connection()?;
    let stores = connection.top_level_stores()?;
    if !stores.iter().any(|name| name == account) {
        return Err(AppError::AccountNotFound(account.to_owned()));
    }

    let inbox = connection
        .child_folder(account, INBOX)?
        .ok_or_else(|| AppError::FolderNotFound(account.to_owned()))?;
    debug!(account, folder = %inbox.name(), "resolved inbox");
    Ok(inbox)
}
