//! Capability orchestration
//!
//! Routes a parsed request to its capability handler, sequences the store
//! session, resolver, locator, extractor, materializer and reply dispatcher,
//! and converts the outcome into the response envelope.
//!
//! Every handler scopes one [`StoreSession`] to the work that needs the live
//! store; the session is released when it goes out of scope, on success, on a
//! locate miss and on every error path alike. The optional correlated reply
//! runs afterwards in a second, independent session from data copied into the
//! [`ExtractedRecord`] during the first.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{error, info, info_span, warn};

use crate::attachments::{Materialized, list, match_patterns, materialize};
use crate::config::ToolkitConfig;
use crate::errors::{AppError, AppResult};
use crate::extract::{extract, save_content};
use crate::locator::locate;
use crate::mailbox::{INBOX, resolve_inbox};
use crate::models::{
    AccountListing, AttachmentCheckResult, CheckAttachmentsInput, CheckSpecificFilesInput,
    ExtractedRecord, ExtractionResult, FindAndExtractInput, ReplyRequest, Request, Response,
    SendReplyInput, SendReplyResult, SpecificFilesResult,
};
use crate::naming::{email_folder_name, generate_timestamp};
use crate::reply;
use crate::session::StoreSession;
use crate::store::{MailFolder, MailItem, MailStore};

/// Capability name reported when the request could not be attributed
pub const UNKNOWN_CAPABILITY: &str = "unknown";

/// Directory under the output base that holds one folder per extraction
const EXTRACTIONS_DIR: &str = "email_extractions";
const ATTACHMENTS_DIR: &str = "attachments";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    FindAndExtractEmail,
    CheckEmailAttachments,
    CheckSpecificFiles,
    SendEmailReply,
}

impl Capability {
    pub const ALL: [Self; 4] = [
        Self::FindAndExtractEmail,
        Self::CheckEmailAttachments,
        Self::CheckSpecificFiles,
        Self::SendEmailReply,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::FindAndExtractEmail => "find_and_extract_email",
            Self::CheckEmailAttachments => "check_email_attachments",
            Self::CheckSpecificFiles => "check_specific_files",
            Self::SendEmailReply => "send_email_reply",
        }
    }

    /// Exact, case-sensitive lookup by wire name
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// JSON Schema of the capability's `args` object
    pub fn input_schema(self) -> Value {
        match self {
            Self::FindAndExtractEmail => schemars::schema_for!(FindAndExtractInput).to_value(),
            Self::CheckEmailAttachments => schemars::schema_for!(CheckAttachmentsInput).to_value(),
            Self::CheckSpecificFiles => schemars::schema_for!(CheckSpecificFilesInput).to_value(),
            Self::SendEmailReply => schemars::schema_for!(SendReplyInput).to_value(),
        }
    }
}

/// Parse one request document into a capability and its arguments
///
/// # Errors
///
/// The ready-to-print failure response for malformed JSON, a missing
/// capability name, or an unknown capability. These are protocol failures
/// and the process exits non-zero after printing them.
pub fn parse_request(input: &str) -> Result<(Capability, Value), Response> {
    let request: Request = serde_json::from_str(input).map_err(|e| {
        Response::failure(UNKNOWN_CAPABILITY, format!("Invalid JSON input: {e}"))
    })?;

    let Some(name) = request.capability.filter(|c| !c.is_empty()) else {
        return Err(Response::failure(
            UNKNOWN_CAPABILITY,
            "Missing 'capability' in input",
        ));
    };
    match Capability::parse(&name) {
        Some(capability) => Ok((capability, request.args)),
        None => Err(Response::failure(
            name.clone(),
            format!("Unknown capability: {name}"),
        )),
    }
}

/// Capability handlers over one mail store
pub struct MailToolkit {
    config: ToolkitConfig,
    store: Box<dyn MailStore>,
}

/// Output of the first (extraction) session
struct Extraction {
    record: ExtractedRecord,
    output_folder: PathBuf,
    content_file: PathBuf,
    attachments_folder: PathBuf,
    materialized: Materialized,
}

impl MailToolkit {
    pub fn new(config: ToolkitConfig, store: Box<dyn MailStore>) -> Self {
        Self { config, store }
    }

    /// Run one capability call to completion
    ///
    /// Always yields exactly one response; capability failures become the
    /// response's `error` field.
    pub fn dispatch(&self, capability: Capability, args: Value) -> Response {
        let started = Instant::now();
        let span = info_span!("capability", name = capability.name());
        let _entered = span.enter();
        info!("capability started");

        match capability {
            Capability::FindAndExtractEmail => {
                finalize(capability, started, self.find_and_extract_email(args))
            }
            Capability::CheckEmailAttachments => {
                finalize(capability, started, self.check_email_attachments(args))
            }
            Capability::CheckSpecificFiles => {
                finalize(capability, started, self.check_specific_files(args))
            }
            Capability::SendEmailReply => {
                finalize(capability, started, self.send_email_reply(args))
            }
        }
    }

    fn find_and_extract_email(&self, args: Value) -> AppResult<ExtractionResult> {
        let input: FindAndExtractInput = parse_args(Capability::FindAndExtractEmail, args)?;
        let subject = require(input.subject, "subject")?;
        let account = require(input.email_account, "email_account")?;
        let unread_only = input
            .search_unread_only
            .unwrap_or(self.config.search_unread_only);
        let reply_if_empty = input
            .send_reply_if_no_attachments
            .unwrap_or(self.config.send_reply_if_no_attachments);
        let output_base = input
            .output_base_path
            .filter(|p| !p.trim().is_empty())
            .map_or_else(|| self.config.output_base_path.clone(), PathBuf::from);

        let extraction = self.extraction_cycle(&account, &subject, unread_only, &output_base)?;
        let has_attachments = !extraction.materialized.saved.is_empty();

        let (reply_sent, reply_error) = if !has_attachments && reply_if_empty {
            let reply_message = input.reply_message.filter(|m| !m.trim().is_empty());
            self.request_attachments(&extraction.record, reply_message.as_deref(), &account)
        } else {
            (false, None)
        };

        let Extraction {
            record,
            output_folder,
            content_file,
            attachments_folder,
            materialized,
        } = extraction;
        Ok(ExtractionResult {
            email_found: true,
            email_subject: record.subject,
            email_sender: record.sender_name,
            email_sender_address: record.sender_email,
            email_sent_time: record.sent_on,
            email_received_time: record.received_time,
            has_attachments,
            attachment_count: materialized.saved.len(),
            skipped_attachments: materialized.skipped,
            output_folder: output_folder.display().to_string(),
            email_content_file: content_file.display().to_string(),
            attachments_folder: attachments_folder.display().to_string(),
            attachments: materialized.saved,
            reply_sent,
            reply_error,
        })
    }

    /// Locate, copy out and persist one message inside a single session
    fn extraction_cycle(
        &self,
        account: &str,
        subject: &str,
        unread_only: bool,
        output_base: &Path,
    ) -> AppResult<Extraction> {
        let session = StoreSession::open(self.store.as_ref())?;
        let inbox = resolve_inbox(&session, account)?;
        let item = locate(inbox.as_ref(), subject, unread_only)?
            .ok_or_else(|| AppError::EmailNotFound(subject.to_owned()))?;
        let record = extract(item.as_ref())?;
        info!(
            entry_id = %record.entry_id,
            unread = record.unread,
            received = %record.received_time,
            "extracting email"
        );

        let folder_name = email_folder_name(
            &record.subject,
            &generate_timestamp(),
            self.config.folder_subject_max_chars,
        );
        let output_folder = output_base.join(EXTRACTIONS_DIR).join(folder_name);
        fs::create_dir_all(&output_folder).map_err(|e| {
            AppError::io(
                format!("cannot create output folder {}", output_folder.display()),
                e,
            )
        })?;
        let content_file = save_content(&record, &output_folder)?;

        let attachments_folder = output_folder.join(ATTACHMENTS_DIR);
        let materialized = materialize(
            item.as_ref(),
            &attachments_folder,
            self.config.filename_max_chars,
        )?;

        Ok(Extraction {
            record,
            output_folder,
            content_file,
            attachments_folder,
            materialized,
        })
    }

    /// Ask the original sender for the missing attachments
    ///
    /// Never fails the surrounding extraction; the outcome is returned as
    /// `(reply_sent, reply_error)`.
    fn request_attachments(
        &self,
        record: &ExtractedRecord,
        reply_message: Option<&str>,
        account: &str,
    ) -> (bool, Option<String>) {
        info!("no attachments found; requesting them from the sender");
        let outcome = reply::attachment_request(
            record,
            reply_message,
            &self.config.reply_template,
            Some(account),
        )
        .and_then(|request| {
            let session = StoreSession::open(self.store.as_ref())?;
            Ok(reply::send(&session, &request))
        });

        match outcome {
            Ok(sent) if sent.success => (true, None),
            Ok(sent) => (false, Some(sent.detail)),
            Err(e) => {
                warn!(code = e.code(), error = %e, "reply not sent");
                (false, Some(e.to_string()))
            }
        }
    }

    fn check_email_attachments(&self, args: Value) -> AppResult<AttachmentCheckResult> {
        let input: CheckAttachmentsInput = parse_args(Capability::CheckEmailAttachments, args)?;
        let subject = require(input.subject, "subject")?;
        let account = require(input.email_account, "email_account")?;
        let unread_only = input
            .search_unread_only
            .unwrap_or(self.config.search_unread_only);

        let session = StoreSession::open(self.store.as_ref())?;
        let inbox = resolve_inbox(&session, &account)?;
        let item = locate_required(inbox.as_ref(), &subject, unread_only)?;
        let record = extract(item.as_ref())?;
        let attachments = list(item.as_ref())?;

        Ok(AttachmentCheckResult {
            email_found: true,
            email_subject: record.subject,
            email_sender: record.sender_name,
            has_attachments: !attachments.is_empty(),
            attachment_count: attachments.len(),
            attachments,
        })
    }

    fn check_specific_files(&self, args: Value) -> AppResult<SpecificFilesResult> {
        let input: CheckSpecificFilesInput = parse_args(Capability::CheckSpecificFiles, args)?;
        let subject = require(input.subject, "subject")?;
        let account = require(input.email_account, "email_account")?;
        let patterns = input
            .file_patterns
            .ok_or_else(|| missing_parameter("file_patterns"))?;
        if patterns.is_empty() {
            return Err(AppError::invalid("file_patterns list cannot be empty"));
        }
        let unread_only = input
            .search_unread_only
            .unwrap_or(self.config.search_unread_only);

        let session = StoreSession::open(self.store.as_ref())?;
        let inbox = resolve_inbox(&session, &account)?;
        let item = locate_required(inbox.as_ref(), &subject, unread_only)?;
        let email_subject = extract(item.as_ref())?.subject;
        let attachment_names: Vec<String> = list(item.as_ref())?
            .into_iter()
            .map(|a| a.filename)
            .collect();

        let matches = match_patterns(&attachment_names, &patterns);
        info!(
            found = matches.found.len(),
            missing = matches.missing.len(),
            "matched file patterns"
        );
        Ok(SpecificFilesResult {
            email_found: true,
            email_subject,
            all_patterns_found: matches.missing.is_empty(),
            patterns_searched: patterns,
            attachment_names,
            files_found: matches.files_found,
            patterns_found: matches.found,
            missing_patterns: matches.missing,
        })
    }

    fn send_email_reply(&self, args: Value) -> AppResult<SendReplyResult> {
        let input: SendReplyInput = parse_args(Capability::SendEmailReply, args)?;
        let request = ReplyRequest {
            to: require(input.to_email, "to_email")?,
            subject: require(input.subject, "subject")?,
            body: require(input.body, "body")?,
            outgoing_account: input.email_account.filter(|a| !a.trim().is_empty()),
        };

        let session = StoreSession::open(self.store.as_ref())?;
        let sent = reply::send(&session, &request);
        if !sent.success {
            return Err(AppError::SendFailed(sent.detail));
        }
        Ok(SendReplyResult {
            success: true,
            to: request.to,
            subject: request.subject,
            account_used: sent.account_used,
            message: sent.detail,
        })
    }

    /// Top-level stores with their Inbox sizes and matching outgoing account
    ///
    /// # Errors
    ///
    /// `Connection` when the store cannot be reached.
    pub fn list_accounts(&self) -> AppResult<Vec<AccountListing>> {
        let session = StoreSession::open(self.store.as_ref())?;
        let connection = session.connection()?;
        let outgoing = connection.accounts()?;

        let mut listings = Vec::new();
        for name in connection.top_level_stores()? {
            let (inbox_items, inbox_error) = match connection.child_folder(&name, INBOX) {
                Ok(Some(folder)) => match folder.item_count() {
                    Ok(count) => (Some(count), None),
                    Err(e) => (None, Some(e.to_string())),
                },
                Ok(None) => (None, Some(AppError::FolderNotFound(name.clone()).to_string())),
                Err(e) => (None, Some(e.to_string())),
            };
            let smtp_address = outgoing
                .iter()
                .find(|a| a.display_name == name || a.smtp_address == name)
                .map(|a| a.smtp_address.clone());
            listings.push(AccountListing {
                name,
                inbox_items,
                inbox_error,
                smtp_address,
            });
        }
        Ok(listings)
    }
}

fn locate_required<'f>(
    folder: &'f dyn MailFolder,
    subject: &str,
    unread_only: bool,
) -> AppResult<Box<dyn MailItem + 'f>> {
    locate(folder, subject, unread_only)?.ok_or_else(|| AppError::EmailNotFound(subject.to_owned()))
}

fn parse_args<T: DeserializeOwned>(capability: Capability, args: Value) -> AppResult<T> {
    let args = if args.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| {
        AppError::invalid(format!("invalid arguments for {}: {e}", capability.name()))
    })
}

fn require(value: Option<String>, name: &str) -> AppResult<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| missing_parameter(name))
}

fn missing_parameter(name: &str) -> AppError {
    AppError::invalid(format!("Missing required parameter: {name}"))
}

fn duration_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn finalize<T: Serialize>(
    capability: Capability,
    started: Instant,
    result: AppResult<T>,
) -> Response {
    let result = result.and_then(|data| {
        serde_json::to_value(data)
            .map_err(|e| AppError::Internal(format!("cannot serialize result: {e}")))
    });
    match result {
        Ok(value) => {
            info!(duration_ms = duration_ms(started), "capability completed");
            Response::success(capability.name(), value)
        }
        Err(e) => {
            error!(
                code = e.code(),
                error = %e,
                duration_ms = duration_ms(started),
                "capability failed"
            );
            Response::failure(capability.name(), e.to_string())
        }
    }
}
