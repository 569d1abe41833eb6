//! Filesystem naming helpers
//!
//! Sanitizes names taken from mail items before they touch the filesystem,
//! and builds the timestamped extraction folder names.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Local;

/// Characters that are illegal in Windows filenames
const ILLEGAL_CHARS: [char; 9] = [':', '\\', '/', '?', '*', '"', '<', '>', '|'];

/// Name used when sanitization leaves nothing usable
const FALLBACK_NAME: &str = "attachment";

/// Make a name safe for the target filesystem
///
/// Drops illegal and control characters, replaces spaces with underscores,
/// trims surrounding whitespace and bounds the result to `max_chars`
/// characters. Idempotent: sanitizing an already sanitized name returns it
/// unchanged.
pub fn clean_filename(name: &str, max_chars: usize) -> String {
    let cleaned: String = name
        .chars()
        .filter(|ch| !ILLEGAL_CHARS.contains(ch) && !ch.is_control())
        .map(|ch| if ch == ' ' { '_' } else { ch })
        .collect();
    let bounded = truncate_chars(cleaned.trim().to_owned(), max_chars);
    let bounded = bounded.trim();

    if bounded.is_empty() || bounded == "." || bounded == ".." {
        truncate_chars(FALLBACK_NAME.to_owned(), max_chars)
    } else {
        bounded.to_owned()
    }
}

/// Truncate string to maximum characters (Unicode-aware)
///
/// Preserves complete characters, never splitting multi-byte sequences.
pub fn truncate_chars(input: String, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input;
    }
    input.chars().take(max_chars).collect()
}

/// Local timestamp used in extraction folder names (`YYYY-MM-DD_HH-MM-SS`)
pub fn generate_timestamp() -> String {
    Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// Extraction folder name: cleaned subject followed by a timestamp
pub fn email_folder_name(subject: &str, timestamp: &str, max_subject_chars: usize) -> String {
    format!("{}_{timestamp}", clean_filename(subject, max_subject_chars))
}

/// Pick a destination path for `name` inside `dir` that has not been used yet
///
/// A name already claimed during this materialization, or already present on
/// disk, gets `_<n>` inserted before its extension, shortening the stem so the
/// result stays within `max_chars`. The returned name is recorded in `claimed`.
pub fn unique_destination(
    dir: &Path,
    name: &str,
    max_chars: usize,
    claimed: &mut HashSet<String>,
) -> (String, PathBuf) {
    let (stem, ext) = split_extension(name);
    let mut candidate = name.to_owned();
    let mut n = 1usize;
    while claimed.contains(&candidate) || dir.join(&candidate).exists() {
        candidate = suffixed(stem, ext, n, max_chars);
        n += 1;
    }
    claimed.insert(candidate.clone());
    let path = dir.join(&candidate);
    (candidate, path)
}

/// `stem_<n>ext` bounded to `max_chars`
///
/// The extension is folded into the stem when it leaves no room for the
/// suffix. A bound shorter than the suffix itself cannot be met.
fn suffixed(stem: &str, ext: &str, n: usize, max_chars: usize) -> String {
    let suffix = format!("_{n}");
    let suffix_len = suffix.chars().count();
    let ext_len = ext.chars().count();
    if suffix_len + ext_len < max_chars {
        let stem = truncate_chars(stem.to_owned(), max_chars - suffix_len - ext_len);
        return format!("{stem}{suffix}{ext}");
    }
    let whole = truncate_chars(format!("{stem}{ext}"), max_chars.saturating_sub(suffix_len));
    format!("{whole}{suffix}")
}

/// Split `report.final.pdf` into (`report.final`, `.pdf`); dotfiles keep their name as stem
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{clean_filename, email_folder_name, truncate_chars, unique_destination};

    #[test]
    fn removes_illegal_characters_and_spaces() {
        let out = clean_filename(r#"Q1: "Budget" <draft>/v2\final?*|.xlsx"#, 200);
        assert_eq!(out, "Q1_Budget_draftv2final.xlsx");
        for ch in [':', '\\', '/', '?', '*', '"', '<', '>', '|', ' '] {
            assert!(!out.contains(ch));
        }
    }

    #[test]
    fn sanitization_is_idempotent() {
        let inputs = [
            "Invoice March 2025.pdf",
            "  padded name  .txt ",
            "tab\tinside",
            "a:b*c",
            "ends with space \t",
            "..",
            "",
        ];
        for input in inputs {
            for bound in [3, 10, 200] {
                let once = clean_filename(input, bound);
                assert_eq!(clean_filename(&once, bound), once, "input {input:?}");
                assert!(once.chars().count() <= bound);
            }
        }
    }

    #[test]
    fn bounds_length_by_characters() {
        let long = "é".repeat(300);
        let out = clean_filename(&long, 200);
        assert_eq!(out.chars().count(), 200);
    }

    #[test]
    fn empty_or_dot_names_fall_back() {
        assert_eq!(clean_filename("???", 200), "attachment");
        assert_eq!(clean_filename("..", 200), "attachment");
    }

    #[test]
    fn truncate_keeps_short_input() {
        assert_eq!(truncate_chars("abc".to_owned(), 5), "abc");
        assert_eq!(truncate_chars("a😀b😀c".to_owned(), 4), "a😀b😀");
    }

    #[test]
    fn folder_name_combines_subject_and_timestamp() {
        let name = email_folder_name("Re: Quarterly report", "2025-01-02_03-04-05", 100);
        assert_eq!(name, "Re_Quarterly_report_2025-01-02_03-04-05");
    }

    #[test]
    fn unique_destination_suffixes_collisions() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("notes.txt"), b"existing").expect("seed file");

        let mut claimed = HashSet::new();
        let (first, _) = unique_destination(dir.path(), "report.pdf", 200, &mut claimed);
        let (second, second_path) =
            unique_destination(dir.path(), "report.pdf", 200, &mut claimed);
        let (third, _) = unique_destination(dir.path(), "notes.txt", 200, &mut claimed);
        let (dotfile, _) = unique_destination(dir.path(), ".env", 200, &mut claimed);
        let (dotfile_again, _) = unique_destination(dir.path(), ".env", 200, &mut claimed);

        assert_eq!(first, "report.pdf");
        assert_eq!(second, "report_1.pdf");
        assert_eq!(second_path, dir.path().join("report_1.pdf"));
        assert_eq!(third, "notes_1.txt");
        assert_eq!(dotfile, ".env");
        assert_eq!(dotfile_again, ".env_1");
    }

    #[test]
    fn collision_suffix_stays_within_bound() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut claimed = HashSet::new();

        let names: Vec<String> = (0..12)
            .map(|_| unique_destination(dir.path(), "abcdefghij", 10, &mut claimed).0)
            .collect();
        assert_eq!(names[0], "abcdefghij");
        assert_eq!(names[1], "abcdefgh_1");
        assert_eq!(names[10], "abcdefg_10");
        for name in &names {
            assert!(name.chars().count() <= 10, "{name}");
        }
        assert_eq!(claimed.len(), names.len());

        let (first, _) = unique_destination(dir.path(), "report.pdf", 10, &mut claimed);
        let (second, _) = unique_destination(dir.path(), "report.pdf", 10, &mut claimed);
        assert_eq!(first, "report.pdf");
        assert_eq!(second, "repo_1.pdf");

        let (long_ext, _) = unique_destination(dir.path(), "a.verylong", 10, &mut claimed);
        let (long_ext_again, _) =
            unique_destination(dir.path(), "a.verylong", 10, &mut claimed);
        assert_eq!(long_ext, "a.verylong");
        assert_eq!(long_ext_again, "a.verylo_1");
    }
}
