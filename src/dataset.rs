//! The persisted news dataset.
//!
//! Rows are keyed by an identifier of the form `N<integer>`. Identifiers are
//! unique and strictly increasing in row order; appending a new batch
//! renumbers it past the largest identifier already stored (see [`merge`]).
//!
//! The table is written with a header row:
//!
//! ```text
//! index,date,category,url,title,body,title_google_translated,body_google_translated_distilbart_summarized
//! ```

use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::{NewsError, Result};

/// Column names, in file order.
pub const COLUMNS: [&str; 8] = [
    "index",
    "date",
    "category",
    "url",
    "title",
    "body",
    "title_google_translated",
    "body_google_translated_distilbart_summarized",
];

/// One stored article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsRow {
    pub index: String,
    pub date: String,
    pub category: String,
    pub url: String,
    pub title: String,
    pub body: String,
    pub title_google_translated: Option<String>,
    pub body_google_translated_distilbart_summarized: Option<String>,
}

/// Format an identifier from its numeric suffix.
pub fn format_id(n: u64) -> String {
    format!("N{n}")
}

/// Numeric suffix of an identifier: its first run of ASCII digits.
pub fn id_suffix(id: &str) -> Option<u64> {
    let start = id.find(|c: char| c.is_ascii_digit())?;
    let digits: &str = &id[start..];
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse().ok()
}

fn suffix_or_integrity(id: &str) -> Result<u64> {
    id_suffix(id)
        .ok_or_else(|| NewsError::Integrity(format!("identifier {id:?} has no numeric suffix")))
}

/// Check that identifiers are unique and strictly increasing.
pub fn validate_ids(rows: &[NewsRow]) -> Result<()> {
    let mut previous: Option<u64> = None;
    for row in rows {
        let n = suffix_or_integrity(&row.index)?;
        if let Some(p) = previous {
            if n <= p {
                return Err(NewsError::Integrity(format!(
                    "identifier {} does not follow {}",
                    row.index,
                    format_id(p)
                )));
            }
        }
        previous = Some(n);
    }
    Ok(())
}

/// Append `new` to `old`, renumbering the new rows.
///
/// With `M` the largest suffix in `old`, a new row with local suffix `s`
/// becomes `N<M + 1 + s>`. Old rows are returned unchanged and first; the new
/// batch keeps its order. An empty `old` returns `new` as is.
///
/// # Arguments
///
/// * `old` - Rows already stored, in file order
/// * `new` - Freshly ingested rows numbered from `N0`
///
/// # Returns
///
/// The combined table, or [`NewsError::Integrity`] when an identifier has no
/// numeric suffix, a renumbered suffix would overflow, or the result is not
/// strictly increasing.
///
/// # Examples
///
/// ```ignore
/// // old: N0..N9, new: N0, N1, N2
/// let merged = merge(old, new)?;
/// assert_eq!(merged[10].index, "N10");
/// assert_eq!(merged[12].index, "N12");
/// ```
#[instrument(level = "info", skip_all, fields(old = old.len(), new = new.len()))]
pub fn merge(old: Vec<NewsRow>, new: Vec<NewsRow>) -> Result<Vec<NewsRow>> {
    let Some(max_old) = old
        .iter()
        .map(|row| suffix_or_integrity(&row.index))
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .max()
    else {
        info!("No existing rows; keeping the new batch as is");
        return Ok(new);
    };

    let overflow = || {
        NewsError::Integrity(format!(
            "identifier suffix overflows after {}",
            format_id(max_old)
        ))
    };
    let offset = max_old.checked_add(1).ok_or_else(overflow)?;
    let mut merged = old;
    merged.reserve(new.len());
    for mut row in new {
        let local = suffix_or_integrity(&row.index)?;
        let renumbered = format_id(local.checked_add(offset).ok_or_else(overflow)?);
        debug!(from = %row.index, to = %renumbered, "Renumbered row");
        row.index = renumbered;
        merged.push(row);
    }

    validate_ids(&merged)?;
    info!(rows = merged.len(), max_old, "Merged dataset");
    Ok(merged)
}

/// Field delimiter for a stored object: comma for `.csv`, tab otherwise.
pub fn delimiter_for(key: &str) -> u8 {
    if key.to_ascii_lowercase().ends_with(".csv") {
        b','
    } else {
        b'\t'
    }
}

/// Parse a dataset table written by [`write_rows`].
///
/// Empty input is an empty dataset. Empty translated columns read back as
/// `None`.
pub fn read_rows(bytes: &[u8], delimiter: u8) -> Result<Vec<NewsRow>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(bytes);
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

/// Serialize a dataset table, header included even when empty.
///
/// Fields holding quotes, the delimiter or line breaks are quoted, for tab
/// tables as well as comma tables.
pub fn write_rows(rows: &[NewsRow], delimiter: u8) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| NewsError::Io(e.into_error()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(index: &str) -> NewsRow {
        NewsRow {
            index: index.to_string(),
            date: "2026-10-16".to_string(),
            category: "Politics".to_string(),
            url: format!("https://n.news.naver.com/{index}"),
            title: format!("title {index}"),
            body: "body".to_string(),
            title_google_translated: Some("translated".to_string()),
            body_google_translated_distilbart_summarized: Some("summary".to_string()),
        }
    }

    fn ids(rows: &[NewsRow]) -> Vec<&str> {
        rows.iter().map(|r| r.index.as_str()).collect()
    }

    #[test]
    fn test_id_suffix() {
        assert_eq!(id_suffix("N0"), Some(0));
        assert_eq!(id_suffix("N12345"), Some(12345));
        assert_eq!(id_suffix("N12-b7"), Some(12));
        assert_eq!(id_suffix("N"), None);
        assert_eq!(id_suffix(""), None);
    }

    #[test]
    fn test_merge_renumbers_past_the_old_maximum() {
        let old: Vec<NewsRow> = (0..10).map(|i| row(&format!("N{i}"))).collect();
        let new = vec![row("N0"), row("N1"), row("N2")];
        let merged = merge(old.clone(), new).unwrap();

        assert_eq!(merged.len(), 13);
        assert_eq!(&merged[..10], &old[..]);
        assert_eq!(ids(&merged[10..]), vec!["N10", "N11", "N12"]);
        assert_eq!(merged[10].title, "title N0");
    }

    #[test]
    fn test_merge_keeps_gaps_of_filtered_rows() {
        let old = vec![row("N3"), row("N7")];
        let new = vec![row("N0"), row("N2"), row("N5")];
        let merged = merge(old, new).unwrap();
        assert_eq!(ids(&merged), vec!["N3", "N7", "N8", "N10", "N13"]);
    }

    #[test]
    fn test_merge_into_empty_dataset() {
        let new = vec![row("N0"), row("N1")];
        let merged = merge(Vec::new(), new.clone()).unwrap();
        assert_eq!(merged, new);
    }

    #[test]
    fn test_merge_rejects_identifiers_without_suffix() {
        let err = merge(vec![row("N1"), row("X")], vec![row("N0")]).unwrap_err();
        assert!(matches!(err, NewsError::Integrity(_)));
    }

    #[test]
    fn test_merge_rejects_unordered_old_rows() {
        let err = merge(vec![row("N5"), row("N2")], vec![row("N0")]).unwrap_err();
        assert!(matches!(err, NewsError::Integrity(_)));
    }

    #[test]
    fn test_merge_rejects_suffix_overflow() {
        let at_max = merge(vec![row(&format_id(u64::MAX))], vec![row("N0")]).unwrap_err();
        assert!(matches!(at_max, NewsError::Integrity(_)));

        let near_max = merge(vec![row(&format_id(u64::MAX - 2))], vec![row("N0"), row("N1"), row("N2")])
            .unwrap_err();
        assert!(matches!(near_max, NewsError::Integrity(_)));
    }

    #[test]
    fn test_merged_ids_are_disjoint_and_increasing() {
        for old_len in 1..6u64 {
            for new_len in 0..5u64 {
                let old: Vec<NewsRow> = (0..old_len).map(|i| row(&format_id(i * 2))).collect();
                let new: Vec<NewsRow> = (0..new_len).map(|i| row(&format_id(i))).collect();
                let merged = merge(old, new).unwrap();
                validate_ids(&merged).unwrap();
                let max_old = (old_len - 1) * 2;
                for (k, r) in merged[old_len as usize..].iter().enumerate() {
                    assert_eq!(id_suffix(&r.index), Some(max_old + 1 + k as u64));
                }
            }
        }
    }

    #[test]
    fn test_delimiter_for() {
        assert_eq!(delimiter_for("data/predict/news.csv"), b',');
        assert_eq!(delimiter_for("NEWS.CSV"), b',');
        assert_eq!(delimiter_for("news.tsv"), b'\t');
    }

    #[test]
    fn test_write_then_read_preserves_rows() {
        let mut second = row("N1");
        second.body = "comma, \"quote\" and\nnewline".to_string();
        second.title_google_translated = None;
        let rows = vec![row("N0"), second];

        let bytes = write_rows(&rows, b',').unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with(&COLUMNS.join(",")));
        assert_eq!(read_rows(&bytes, b',').unwrap(), rows);
    }

    #[test]
    fn test_empty_table_has_header() {
        let bytes = write_rows(&[], b'\t').unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap().trim_end(), COLUMNS.join("\t"));
        assert!(read_rows(b"", b',').unwrap().is_empty());
    }
}
