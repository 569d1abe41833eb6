//! Configuration module for the store location, extraction defaults and
//! outgoing accounts
//!
//! All configuration is loaded from environment variables prefixed with
//! `MAIL_TOOLKIT_`. Outgoing accounts are discovered by scanning for
//! `MAIL_TOOLKIT_ACCOUNT_*_ADDRESS` variables.

use std::env;
use std::env::VarError;
use std::path::PathBuf;

use regex::Regex;

use crate::errors::{AppError, AppResult};
use crate::store::OutgoingAccount;

/// Body template for the correlated request-attachments reply
pub const DEFAULT_REPLY_TEMPLATE: &str = "Please provide the required attachments for: {subject}";

/// Toolkit-wide configuration
///
/// Built once per process and shared read-only by every capability handler.
#[derive(Debug, Clone)]
pub struct ToolkitConfig {
    /// Root directory of the Maildir-backed mail store
    pub store_root: PathBuf,
    /// Default base directory for `email_extractions/`
    pub output_base_path: PathBuf,
    /// Reply body template; `{subject}` is replaced with the original subject
    pub reply_template: String,
    /// Default for `search_unread_only`
    pub search_unread_only: bool,
    /// Default for `send_reply_if_no_attachments`
    pub send_reply_if_no_attachments: bool,
    /// Upper bound on sanitized attachment filenames, in characters
    pub filename_max_chars: usize,
    /// Upper bound on the subject portion of an extraction folder name
    pub folder_subject_max_chars: usize,
    /// Watchdog around one capability call in milliseconds (`0` disables)
    pub operation_timeout_ms: u64,
    /// Outgoing accounts; the first entry is the store's default account
    pub outgoing_accounts: Vec<OutgoingAccount>,
}

impl ToolkitConfig {
    /// Configuration with built-in defaults for everything but the two paths
    pub fn new(store_root: PathBuf, output_base_path: PathBuf) -> Self {
        Self {
            store_root,
            output_base_path,
            reply_template: DEFAULT_REPLY_TEMPLATE.to_owned(),
            search_unread_only: true,
            send_reply_if_no_attachments: false,
            filename_max_chars: 200,
            folder_subject_max_chars: 100,
            operation_timeout_ms: 300_000,
            outgoing_accounts: Vec::new(),
        }
    }

    /// Load all configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a variable is set to a malformed value.
    ///
    /// # Example Environment
    ///
    /// ```text
    /// MAIL_TOOLKIT_STORE_ROOT=/home/me/Maildir
    /// MAIL_TOOLKIT_OUTPUT_BASE_PATH=/srv/extractions
    /// MAIL_TOOLKIT_SEARCH_UNREAD_ONLY=true
    /// MAIL_TOOLKIT_ACCOUNT_DEFAULT_ADDRESS=me@example.com
    /// MAIL_TOOLKIT_ACCOUNT_DEFAULT_NAME=Me
    /// MAIL_TOOLKIT_ACCOUNT_WORK_ADDRESS=me@company.com
    /// ```
    pub fn load_from_env() -> AppResult<Self> {
        let cwd = env::current_dir()
            .map_err(|e| AppError::io("cannot determine current directory", e))?;

        let store_root = match optional_env("MAIL_TOOLKIT_STORE_ROOT")? {
            Some(root) => PathBuf::from(root),
            None => optional_env("HOME")?
                .map(PathBuf::from)
                .unwrap_or_else(|| cwd.clone())
                .join("Maildir"),
        };
        let output_base_path = optional_env("MAIL_TOOLKIT_OUTPUT_BASE_PATH")?
            .map(PathBuf::from)
            .unwrap_or(cwd);

        let mut config = Self::new(store_root, output_base_path);
        if let Some(template) = optional_env("MAIL_TOOLKIT_REPLY_TEMPLATE")? {
            config.reply_template = template;
        }
        config.search_unread_only = parse_bool_env("MAIL_TOOLKIT_SEARCH_UNREAD_ONLY", true)?;
        config.send_reply_if_no_attachments =
            parse_bool_env("MAIL_TOOLKIT_SEND_REPLY_IF_NO_ATTACHMENTS", false)?;
        config.filename_max_chars = parse_usize_env("MAIL_TOOLKIT_FILENAME_MAX_CHARS", 200)?;
        config.folder_subject_max_chars =
            parse_usize_env("MAIL_TOOLKIT_FOLDER_SUBJECT_MAX_CHARS", 100)?;
        config.operation_timeout_ms =
            parse_u64_env("MAIL_TOOLKIT_OPERATION_TIMEOUT_MS", 300_000)?;
        config.outgoing_accounts = load_outgoing_accounts()?;

        if config.filename_max_chars == 0 || config.folder_subject_max_chars == 0 {
            return Err(AppError::invalid(
                "filename bounds must be greater than zero",
            ));
        }
        Ok(config)
    }
}

/// Discover outgoing accounts from `MAIL_TOOLKIT_ACCOUNT_<SEGMENT>_ADDRESS`
///
/// The `DEFAULT` segment sorts first when present, otherwise segments are in
/// lexical order. `_NAME` defaults to the address.
fn load_outgoing_accounts() -> AppResult<Vec<OutgoingAccount>> {
    let account_pattern = Regex::new(r"^MAIL_TOOLKIT_ACCOUNT_([A-Z0-9_]+)_ADDRESS$")
        .map_err(|e| AppError::Internal(format!("invalid account regex: {e}")))?;

    let mut segments: Vec<String> = env::vars()
        .filter_map(|(k, _)| {
            account_pattern
                .captures(&k)
                .and_then(|c| c.get(1).map(|m| m.as_str().to_owned()))
        })
        .collect();
    order_segments(&mut segments);

    let mut accounts = Vec::with_capacity(segments.len());
    for seg in segments {
        let prefix = format!("MAIL_TOOLKIT_ACCOUNT_{}_", sanitize_segment(&seg));
        let smtp_address = required_env(&format!("{prefix}ADDRESS"))?;
        let display_name =
            optional_env(&format!("{prefix}NAME"))?.unwrap_or_else(|| smtp_address.clone());
        accounts.push(OutgoingAccount {
            display_name,
            smtp_address,
        });
    }
    Ok(accounts)
}

/// Sort and dedup account segments, moving `DEFAULT` to the front
fn order_segments(segments: &mut Vec<String>) {
    segments.sort();
    segments.dedup();
    if let Some(pos) = segments.iter().position(|s| s == "DEFAULT") {
        let default = segments.remove(pos);
        segments.insert(0, default);
    }
}

/// Read a required environment variable, returning error if missing or empty
fn required_env(key: &str) -> AppResult<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AppError::InvalidInput(format!(
            "missing required environment variable {key}"
        ))),
    }
}

/// Read an optional environment variable, treating blank values as unset
fn optional_env(key: &str) -> AppResult<Option<String>> {
    match env::var(key) {
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => Ok(Some(v)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

/// Sanitize an account segment to uppercase alphanumeric/underscore
fn sanitize_segment(seg: &str) -> String {
    let mut out = String::with_capacity(seg.len());
    for ch in seg.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push('_');
        }
    }
    out.trim_matches('_').to_owned()
}

/// Parse a boolean environment variable with flexible values
///
/// Accepts: `1`, `true`, `yes`, `y`, `on` (truthy) or `0`, `false`, `no`,
/// `n`, `off` (falsy). Case-insensitive. Returns `default` if unset.
fn parse_bool_env(key: &str, default: bool) -> AppResult<bool> {
    match optional_env(key)? {
        Some(v) => parse_bool_value(&v).ok_or_else(|| {
            AppError::InvalidInput(format!("invalid boolean environment variable {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}

fn parse_bool_value(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn parse_u64_env(key: &str, default: u64) -> AppResult<u64> {
    match optional_env(key)? {
        Some(v) => v.trim().parse::<u64>().map_err(|_| {
            AppError::InvalidInput(format!("invalid u64 environment variable {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}

fn parse_usize_env(key: &str, default: usize) -> AppResult<usize> {
    match optional_env(key)? {
        Some(v) => v.trim().parse::<usize>().map_err(|_| {
            AppError::InvalidInput(format!("invalid usize environment variable {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}
