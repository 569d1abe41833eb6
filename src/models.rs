//! Input/output DTOs and schema-bearing types
//!
//! Defines the request/response envelope of the stdin/stdout protocol, the
//! per-capability argument types (annotated with `JsonSchema` for the `schema`
//! subcommand) and the detached records that outlive a store session.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One request read from standard input
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    /// Capability name
    pub capability: Option<String>,
    /// Capability arguments (defaults to an empty object)
    #[serde(default = "empty_args")]
    pub args: serde_json::Value,
}

/// One response written to standard output
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Response {
    Success {
        result: serde_json::Value,
        capability: String,
    },
    Failure {
        error: String,
        capability: String,
    },
}

impl Response {
    pub fn success(capability: impl Into<String>, result: serde_json::Value) -> Self {
        Self::Success {
            result,
            capability: capability.into(),
        }
    }

    pub fn failure(capability: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
            capability: capability.into(),
        }
    }
}

/// Input: `find_and_extract_email`
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct FindAndExtractInput {
    /// Text the subject must contain (case-insensitive)
    pub subject: Option<String>,
    /// Top-level store name (display name or address) whose Inbox is searched
    pub email_account: Option<String>,
    /// Base directory for `email_extractions/` (defaults to configuration)
    pub output_base_path: Option<String>,
    /// Only consider unread messages (default true)
    pub search_unread_only: Option<bool>,
    /// Ask the sender for attachments when none were found (default false)
    pub send_reply_if_no_attachments: Option<bool>,
    /// Custom reply body (defaults to the configured template)
    pub reply_message: Option<String>,
}

/// Input: `check_email_attachments`
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct CheckAttachmentsInput {
    /// Text the subject must contain (case-insensitive)
    pub subject: Option<String>,
    /// Top-level store name whose Inbox is searched
    pub email_account: Option<String>,
    /// Only consider unread messages (default true)
    pub search_unread_only: Option<bool>,
}

/// Input: `check_specific_files`
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct CheckSpecificFilesInput {
    /// Text the subject must contain (case-insensitive)
    pub subject: Option<String>,
    /// Top-level store name whose Inbox is searched
    pub email_account: Option<String>,
    /// Case-insensitive substrings to look for in attachment filenames
    pub file_patterns: Option<Vec<String>>,
    /// Only consider unread messages (default true)
    pub search_unread_only: Option<bool>,
}

/// Input: `send_email_reply`
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct SendReplyInput {
    /// Recipient address
    pub to_email: Option<String>,
    /// Subject line
    pub subject: Option<String>,
    /// Plain-text body
    pub body: Option<String>,
    /// Outgoing account (display name or address); store default when omitted
    pub email_account: Option<String>,
}

/// Detached copy of a located message
///
/// Built inside the first store session and immutable afterwards; nothing in
/// it refers back to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRecord {
    pub subject: String,
    pub sender_name: String,
    pub sender_email: String,
    pub to: String,
    pub cc: String,
    pub sent_on: String,
    pub received_time: String,
    pub body: String,
    pub unread: bool,
    pub entry_id: String,
    /// Fields the correlated reply needs, copied before the session ends
    pub correlation: ReplyCorrelation,
}

/// Reply addressing data captured during extraction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyCorrelation {
    /// Sender address from the direct field, else from the sender object
    pub sender_address: Option<String>,
    /// Subject exactly as the store reported it
    pub original_subject: Option<String>,
}

/// One successfully materialized attachment
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AttachmentInfo {
    /// Name as reported by the store
    pub filename: String,
    /// Sanitized name the file was written under
    pub cleaned_filename: String,
    /// Destination path
    pub path: String,
    /// Size of the written file on disk
    pub size_bytes: u64,
}

/// Attachment as listed by the store, without touching the filesystem
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AttachmentSummary {
    pub filename: String,
    pub size_bytes: Option<u64>,
}

/// A transient outgoing message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub outgoing_account: Option<String>,
}

/// Outcome of a dispatch; a failed send is data, not an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResult {
    pub success: bool,
    pub detail: String,
    /// Display name of the account that sent the item; `None` when the send failed
    pub account_used: Option<String>,
}

/// Result: `find_and_extract_email`
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub email_found: bool,
    pub email_subject: String,
    pub email_sender: String,
    pub email_sender_address: String,
    pub email_sent_time: String,
    pub email_received_time: String,
    pub has_attachments: bool,
    pub attachment_count: usize,
    pub skipped_attachments: usize,
    pub output_folder: String,
    pub email_content_file: String,
    pub attachments_folder: String,
    pub attachments: Vec<AttachmentInfo>,
    pub reply_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_error: Option<String>,
}

/// Result: `check_email_attachments`
#[derive(Debug, Clone, Serialize)]
pub struct AttachmentCheckResult {
    pub email_found: bool,
    pub email_subject: String,
    pub email_sender: String,
    pub has_attachments: bool,
    pub attachment_count: usize,
    pub attachments: Vec<AttachmentSummary>,
}

/// Result: `check_specific_files`
#[derive(Debug, Clone, Serialize)]
pub struct SpecificFilesResult {
    pub email_found: bool,
    pub email_subject: String,
    pub patterns_searched: Vec<String>,
    pub attachment_names: Vec<String>,
    pub files_found: BTreeMap<String, Vec<String>>,
    pub patterns_found: Vec<String>,
    pub missing_patterns: Vec<String>,
    pub all_patterns_found: bool,
}

/// Result: `send_email_reply`
#[derive(Debug, Clone, Serialize)]
pub struct SendReplyResult {
    pub success: bool,
    pub to: String,
    pub subject: String,
    pub account_used: Option<String>,
    pub message: String,
}

/// One top-level store, as listed by the `accounts` subcommand
#[derive(Debug, Clone, Serialize)]
pub struct AccountListing {
    /// Exact name to pass as `email_account`
    pub name: String,
    /// Items in the store's Inbox, when it can be opened
    pub inbox_items: Option<usize>,
    /// Why the Inbox could not be opened
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inbox_error: Option<String>,
    /// Address of the outgoing account with the same name or address
    pub smtp_address: Option<String>,
}

fn empty_args() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}
