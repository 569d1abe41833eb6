//! Content extraction: copy a live message into a detached record
//!
//! Every field has a documented placeholder, so extraction succeeds for any
//! valid item; only a released reference fails it.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::errors::{AppError, AppResult};
use crate::models::{ExtractedRecord, ReplyCorrelation};
use crate::store::{MailItem, StoreError, StoreResult};

pub const NO_SUBJECT: &str = "No Subject";
pub const UNKNOWN: &str = "Unknown";

/// Name of the headers-plus-body file inside an extraction folder
pub const CONTENT_FILE_NAME: &str = "email_content.txt";

/// Copy the fields of `item` into an [`ExtractedRecord`]
///
/// Also resolves the reply address (direct sender address, else the sender
/// object's address) so the reply path never needs the live item again.
///
/// # Errors
///
/// `InvalidHandle` if the item reference has been released.
pub fn extract(item: &dyn MailItem) -> AppResult<ExtractedRecord> {
    let subject = field("subject", item.subject())?;
    let sender_email = field("sender_email", item.sender_email_address())?;
    let sender = field("sender", item.sender())?;

    let sender_address = sender_email
        .clone()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| {
            sender
                .as_ref()
                .and_then(|s| s.address.clone())
                .filter(|s| !s.trim().is_empty())
        });

    let record = ExtractedRecord {
        subject: subject.clone().unwrap_or_else(|| NO_SUBJECT.to_owned()),
        sender_name: field("sender_name", item.sender_name())?
            .or_else(|| sender.as_ref().and_then(|s| s.name.clone()))
            .unwrap_or_else(|| UNKNOWN.to_owned()),
        sender_email: sender_email.unwrap_or_else(|| UNKNOWN.to_owned()),
        to: field("to", item.to())?.unwrap_or_else(|| UNKNOWN.to_owned()),
        cc: field("cc", item.cc())?.unwrap_or_default(),
        sent_on: format_time(field("sent_on", item.sent_on())?),
        received_time: format_time(field("received_time", item.received_time())?),
        body: field("body", item.body())?.unwrap_or_default(),
        unread: field("unread", item.is_unread().map(Some))?.unwrap_or(false),
        entry_id: field("entry_id", item.entry_id())?.unwrap_or_default(),
        correlation: ReplyCorrelation {
            sender_address,
            original_subject: subject,
        },
    };
    debug!(subject = %record.subject, "extracted email content");
    Ok(record)
}

/// Treat an unreadable optional field as absent; a released reference is fatal
fn field<T>(name: &'static str, value: StoreResult<Option<T>>) -> AppResult<Option<T>> {
    match value {
        Ok(v) => Ok(v),
        Err(StoreError::Disposed(what)) => Err(AppError::InvalidHandle(what)),
        Err(e) => {
            debug!(field = name, error = %e, "field unavailable; using placeholder");
            Ok(None)
        }
    }
}

fn format_time(value: Option<DateTime<Utc>>) -> String {
    value.map_or_else(
        || UNKNOWN.to_owned(),
        |t| t.format("%Y-%m-%d %H:%M:%S%:z").to_string(),
    )
}

/// Render the headers-plus-body text persisted next to the attachments
pub fn render_content(record: &ExtractedRecord) -> String {
    let mut out = String::with_capacity(record.body.len() + 512);
    let _ = writeln!(out, "Subject: {}", record.subject);
    let _ = writeln!(out, "From: {} <{}>", record.sender_name, record.sender_email);
    let _ = writeln!(out, "To: {}", record.to);
    if !record.cc.is_empty() {
        let _ = writeln!(out, "CC: {}", record.cc);
    }
    let _ = writeln!(out, "Sent: {}", record.sent_on);
    let _ = writeln!(out, "Received: {}", record.received_time);
    out.push_str(&"-".repeat(80));
    out.push('\n');
    out.push_str("Body:\n");
    out.push_str(&record.body);
    out
}

/// Write `email_content.txt` into `folder` and return its path
pub fn save_content(record: &ExtractedRecord, folder: &Path) -> AppResult<PathBuf> {
    let path = folder.join(CONTENT_FILE_NAME);
    fs::write(&path, render_content(record))
        .map_err(|e| AppError::io(format!("Error saving email content to {}", path.display()), e))?;
    info!(path = %path.display(), "saved email content");
    Ok(path)
}
