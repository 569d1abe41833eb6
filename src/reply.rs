//! Reply dispatch: compose and send a new outgoing message
//!
//! A dispatch failure never raises past this module; it is returned as a
//! `SendResult` with `success: false`.

use tracing::{error, info, warn};

use crate::errors::{AppError, AppResult};
use crate::models::{ExtractedRecord, ReplyRequest, SendResult};
use crate::session::StoreSession;
use crate::store::{OutgoingAccount, OutgoingItem, StoreConnection};

/// Subject used for a correlated reply when the original had none
const FALLBACK_SUBJECT: &str = "Your email";

/// Send `request` through the session's store
///
/// With an `outgoing_account`, the configured accounts are searched for an
/// exact match on display name or address. No match is not an error: a
/// warning is logged and the store's default account sends the item.
pub fn send(session: &StoreSession<'_>, request: &ReplyRequest) -> SendResult {
    let connection = match session.connection() {
        Ok(connection) => connection,
        Err(e) => return failed(&e.to_string()),
    };

    let send_using = request
        .outgoing_account
        .as_deref()
        .and_then(|wanted| select_account(connection, wanted));

    let item = OutgoingItem {
        to: request.to.clone(),
        subject: request.subject.clone(),
        body: request.body.clone(),
        send_using,
    };

    match connection.send(&item) {
        Ok(used) => {
            info!(
                to = %request.to,
                subject = %request.subject,
                account = %used.display_name,
                "email sent"
            );
            SendResult {
                success: true,
                detail: "Email sent successfully".to_owned(),
                account_used: Some(used.display_name),
            }
        }
        Err(e) => failed(&e.to_string()),
    }
}

fn failed(cause: &str) -> SendResult {
    let detail = format!("Error sending email: {cause}");
    error!(%detail, "send failed");
    SendResult {
        success: false,
        detail,
        account_used: None,
    }
}

/// Find the configured account named `wanted`, logging a fallback notice otherwise
fn select_account(connection: &dyn StoreConnection, wanted: &str) -> Option<OutgoingAccount> {
    let accounts = match connection.accounts() {
        Ok(accounts) => accounts,
        Err(e) => {
            warn!(account = wanted, error = %e, "cannot enumerate accounts; using default account");
            return None;
        }
    };

    match accounts
        .into_iter()
        .find(|a| a.display_name == wanted || a.smtp_address == wanted)
    {
        Some(account) => {
            info!(account = %account.display_name, "using account");
            Some(account)
        }
        None => {
            warn!(account = wanted, "account not found, using default account");
            None
        }
    }
}

/// Build the request-attachments reply for an extracted message
///
/// # Errors
///
/// `SenderUnresolved` when neither the sender address field nor the sender
/// object yielded an address.
pub fn attachment_request(
    record: &ExtractedRecord,
    reply_message: Option<&str>,
    template: &str,
    outgoing_account: Option<&str>,
) -> AppResult<ReplyRequest> {
    let to = record
        .correlation
        .sender_address
        .clone()
        .ok_or_else(|| AppError::SenderUnresolved(record.subject.clone()))?;
    let original_subject = record
        .correlation
        .original_subject
        .as_deref()
        .unwrap_or(FALLBACK_SUBJECT);

    let body = match reply_message {
        Some(message) => message.to_owned(),
        None => template.replace("{subject}", original_subject),
    };

    Ok(ReplyRequest {
        to,
        subject: format!("Re: {original_subject}"),
        body,
        outgoing_account: outgoing_account.map(str::to_owned),
    })
}
