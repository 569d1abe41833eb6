//! Message locator: most recent mail item whose subject contains a search text

use std::cmp::Reverse;

use tracing::{info, warn};

use crate::errors::AppResult;
use crate::store::{ItemClass, MailFolder, MailItem, StoreResult};

/// Find the most recently received mail item whose subject contains
/// `subject_substring`, case-insensitively
///
/// Candidates are all items, or only unread ones when `unread_only` is set,
/// ordered by received time descending. The sort is stable, so ties keep the
/// store's native order; items without a received time sort last. Non-mail
/// items are skipped, and a candidate whose class or subject cannot be read is
/// skipped with a warning rather than aborting the scan.
///
/// Returns `Ok(None)` when nothing matches.
///
/// # Errors
///
/// Only a failure to enumerate the folder itself is an error.
pub fn locate<'f>(
    folder: &'f dyn MailFolder,
    subject_substring: &str,
    unread_only: bool,
) -> AppResult<Option<Box<dyn MailItem + 'f>>> {
    if unread_only {
        info!(subject = subject_substring, "searching unread emails");
    } else {
        info!(subject = subject_substring, "searching all emails");
    }

    let mut candidates = folder.items(unread_only)?;
    candidates.sort_by_key(|item| Reverse(item.received_time().ok().flatten()));

    let needle = subject_substring.to_lowercase();
    for (position, item) in candidates.into_iter().enumerate() {
        match subject_if_mail(item.as_ref()) {
            Ok(Some(subject)) if subject.to_lowercase().contains(&needle) => {
                info!(subject = %subject, "found matching email");
                return Ok(Some(item));
            }
            Ok(_) => {}
            Err(reason) => {
                warn!(position, %reason, "error checking email; skipping");
            }
        }
    }

    warn!(subject = subject_substring, "no email found with matching subject");
    Ok(None)
}

/// Subject of a mail-class item; `None` for other classes or missing subjects
fn subject_if_mail(item: &dyn MailItem) -> StoreResult<Option<String>> {
    if item.item_class()? != ItemClass::Mail {
        return Ok(None);
    }
    item.subject()
}
