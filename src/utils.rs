//! Utility functions for text normalization, dates, logging and the file system.
//!
//! - Body text normalization applied to every scraped article
//! - Calendar dates for the dataset (UTC+9) and the email subject (local)
//! - String truncation for log previews
//! - Output directory validation for the local object store

use chrono::{Duration, Local, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

use crate::error::Result;

/// Offset of Korea Standard Time from UTC, in hours.
const KST_OFFSET_HOURS: i64 = 9;

static BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]+\]").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Normalize scraped body text.
///
/// Removes bracketed attribution clauses such as `[헤럴드경제=신현주 기자]`,
/// drops literal backslashes, collapses every whitespace run (newlines
/// included) into a single space and trims both ends.
///
/// The function is idempotent: `normalize_text(&normalize_text(x)) == normalize_text(x)`.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(normalize_text("[경향닷컴=신현주]  Hello\n\nWorld  "), "Hello World");
/// ```
pub fn normalize_text(text: &str) -> String {
    let text = BRACKETED.replace_all(text, "");
    let text = text.replace('\\', "");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Today's calendar date in Korea (UTC+9), as stored in the dataset.
pub fn kst_today() -> NaiveDate {
    (Utc::now() + Duration::hours(KST_OFFSET_HOURS)).date_naive()
}

/// Today's local calendar date, used for the digest subject line.
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut at the last character boundary before `max` bytes and
/// get `"…(+N bytes)"` appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then creates and removes a marker file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await?;
    let marker_path = path.join("..__write_check__");
    stdfs::File::create(&marker_path)?;
    let _ = stdfs::remove_file(&marker_path);
    info!("Storage directory is writable");
    Ok(())
}
