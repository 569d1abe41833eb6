//! Attachment handling: materialize to disk, list, and match filename patterns

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use tracing::{error, info, warn};

use crate::errors::{AppError, AppResult};
use crate::models::{AttachmentInfo, AttachmentSummary};
use crate::naming::{clean_filename, unique_destination};
use crate::store::{ItemAttachment, MailItem, StoreResult};

/// Placeholder for attachments the store reports without a filename
const UNNAMED: &str = "attachment";

/// Outcome of [`materialize`]
#[derive(Debug, Clone, Default)]
pub struct Materialized {
    /// Successfully written attachments, in store order
    pub saved: Vec<AttachmentInfo>,
    /// Number of attachments that failed to read or write
    pub skipped: usize,
}

/// Persist every attachment of `item` into `destination_dir`
///
/// The directory (and parents) is created only when there is something to
/// write. Names are sanitized to at most `max_name_chars` characters; a name
/// that collides with one already written gets a `_<n>` suffix. A failure on
/// one attachment is logged and skipped, so `saved` holds only the files
/// that actually reached the disk.
///
/// # Errors
///
/// A released item, an unreadable attachment collection, or failure to
/// create `destination_dir`.
pub fn materialize(
    item: &dyn MailItem,
    destination_dir: &Path,
    max_name_chars: usize,
) -> AppResult<Materialized> {
    let attachments = item.attachments()?;
    if attachments.is_empty() {
        info!("email has no attachments");
        return Ok(Materialized::default());
    }

    fs::create_dir_all(destination_dir).map_err(|e| {
        AppError::io(
            format!("cannot create attachments folder {}", destination_dir.display()),
            e,
        )
    })?;
    info!(count = attachments.len(), "downloading attachments");

    let mut claimed = HashSet::new();
    let mut result = Materialized::default();
    for (idx, attachment) in attachments.iter().enumerate() {
        let index = idx + 1;
        match save_one(attachment.as_ref(), destination_dir, max_name_chars, &mut claimed) {
            Ok(info) => {
                info!(index, filename = %info.filename, path = %info.path, "downloaded attachment");
                result.saved.push(info);
            }
            Err(e) => {
                error!(index, error = %e, "error downloading attachment; skipping");
                result.skipped += 1;
            }
        }
    }
    Ok(result)
}

fn save_one(
    attachment: &dyn ItemAttachment,
    dir: &Path,
    max_name_chars: usize,
    claimed: &mut HashSet<String>,
) -> StoreResult<AttachmentInfo> {
    let filename = attachment
        .file_name()?
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| UNNAMED.to_owned());
    let sanitized = clean_filename(&filename, max_name_chars);
    let (cleaned_filename, path) = unique_destination(dir, &sanitized, max_name_chars, claimed);

    attachment.save_as_file(&path)?;
    let size_bytes = fs::metadata(&path)?.len();

    Ok(AttachmentInfo {
        filename,
        cleaned_filename,
        path: path.display().to_string(),
        size_bytes,
    })
}

/// List attachments as the store reports them, without writing anything
///
/// An attachment whose name cannot be read is listed under a placeholder.
pub fn list(item: &dyn MailItem) -> AppResult<Vec<AttachmentSummary>> {
    let attachments = item.attachments()?;
    let mut out = Vec::with_capacity(attachments.len());
    for (idx, attachment) in attachments.iter().enumerate() {
        let filename = match attachment.file_name() {
            Ok(Some(name)) if !name.trim().is_empty() => name,
            Ok(_) => UNNAMED.to_owned(),
            Err(e) => {
                warn!(index = idx + 1, error = %e, "cannot read attachment name");
                UNNAMED.to_owned()
            }
        };
        let size_bytes = attachment.size().ok().flatten();
        out.push(AttachmentSummary {
            filename,
            size_bytes,
        });
    }
    Ok(out)
}

/// Result of matching filename patterns against attachment names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatches {
    /// Pattern to matching filenames, for patterns with at least one match
    pub files_found: BTreeMap<String, Vec<String>>,
    /// Matched patterns, in request order
    pub found: Vec<String>,
    /// Unmatched patterns, in request order
    pub missing: Vec<String>,
}

/// Match each pattern, case-insensitively, as a substring of each filename
pub fn match_patterns(names: &[String], patterns: &[String]) -> PatternMatches {
    let lowered: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();
    let mut matches = PatternMatches {
        files_found: BTreeMap::new(),
        found: Vec::new(),
        missing: Vec::new(),
    };

    for pattern in patterns {
        let needle = pattern.to_lowercase();
        let hits: Vec<String> = names
            .iter()
            .zip(&lowered)
            .filter(|(_, lower)| lower.contains(&needle))
            .map(|(name, _)| name.clone())
            .collect();
        if hits.is_empty() {
            matches.missing.push(pattern.clone());
        } else {
            matches.found.push(pattern.clone());
            matches.files_found.insert(pattern.clone(), hits);
        }
    }
    matches
}
