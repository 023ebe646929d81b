//! Tables read by the recommendation pipeline.
//!
//! - News metadata: positional columns `0` id, `2` category, `6` title and
//!   `7` abstract, after a header row
//! - Behaviors: no header, five positional columns
//!   `impression_id user time clicked_news impressions`, lists space separated
//! - User map: `user<TAB>int` after a header row

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use itertools::Itertools;
use std::collections::HashMap;
use tracing::{info, instrument, warn};

use crate::error::{NewsError, Result};

/// Metadata of one article, as used for scoring and the digest.
#[derive(Debug, Clone, PartialEq)]
pub struct NewsMeta {
    pub id: String,
    pub category: String,
    pub title: String,
    pub abstract_text: String,
}

/// Article metadata keyed by id.
#[derive(Debug, Default)]
pub struct NewsTable {
    rows: Vec<NewsMeta>,
    by_id: HashMap<String, usize>,
}

impl NewsTable {
    pub fn new(rows: Vec<NewsMeta>) -> Self {
        let mut by_id = HashMap::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            // first occurrence wins, as a row lookup by id would
            by_id.entry(row.id.clone()).or_insert(i);
        }
        Self { rows, by_id }
    }

    /// Parse the news table written by ingestion.
    ///
    /// Quotes are honoured for either delimiter, matching
    /// [`crate::dataset::write_rows`], so fields may hold quotes, delimiters
    /// and newlines.
    #[instrument(level = "info", skip(bytes), fields(bytes = bytes.len()))]
    pub fn parse(bytes: &[u8], delimiter: u8) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes);

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let field = |i: usize| record.get(i).unwrap_or("").to_string();
            rows.push(NewsMeta {
                id: field(0),
                category: field(2),
                title: field(6),
                abstract_text: field(7),
            });
        }
        info!(rows = rows.len(), "Loaded news table");
        Ok(Self::new(rows))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NewsMeta> {
        self.rows.iter()
    }

    pub fn get(&self, id: &str) -> Option<&NewsMeta> {
        self.by_id.get(id).map(|&i| &self.rows[i])
    }

    /// Look up an article that must exist.
    pub fn require(&self, id: &str) -> Result<&NewsMeta> {
        self.get(id)
            .ok_or_else(|| NewsError::Integrity(format!("article {id} is not in the news table")))
    }
}

/// One impression log row.
#[derive(Debug, Clone, PartialEq)]
pub struct Behavior {
    pub impression_id: String,
    pub user: String,
    pub time: String,
    pub clicked_news: Vec<String>,
    pub impressions: Vec<String>,
}

impl Behavior {
    fn from_record(record: &StringRecord, line: usize) -> Result<Self> {
        if record.len() < 5 {
            return Err(NewsError::Integrity(format!(
                "behaviors line {line} has {} columns, expected 5",
                record.len()
            )));
        }
        let list = |i: usize| -> Vec<String> {
            record[i].split_whitespace().map(str::to_string).collect()
        };
        Ok(Self {
            impression_id: record[0].to_string(),
            user: record[1].to_string(),
            time: record[2].to_string(),
            clicked_news: list(3),
            impressions: list(4),
        })
    }

    /// Clicked ids joined back into their stored form.
    pub fn clicked_news_string(&self) -> String {
        self.clicked_news.join(" ")
    }
}

fn behaviors_reader(bytes: &[u8]) -> csv::Reader<&[u8]> {
    ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(bytes)
}

/// Parse the behaviors table.
#[instrument(level = "info", skip(bytes), fields(bytes = bytes.len()))]
pub fn parse_behaviors(bytes: &[u8]) -> Result<Vec<Behavior>> {
    let mut reader = behaviors_reader(bytes);
    let mut behaviors = Vec::new();
    for (line, record) in reader.records().enumerate() {
        behaviors.push(Behavior::from_record(&record?, line + 1)?);
    }
    info!(rows = behaviors.len(), "Loaded behaviors");
    Ok(behaviors)
}

/// Replace the impressions column of every behavior row with `ids`.
///
/// Other columns are written back untouched; the table keeps its headerless
/// five-column layout.
pub fn rewrite_impressions(bytes: &[u8], ids: &[String]) -> Result<Vec<u8>> {
    let impressions = ids.join(" ");
    let mut reader = behaviors_reader(bytes);
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(Vec::new());

    for (line, record) in reader.records().enumerate() {
        let behavior = Behavior::from_record(&record?, line + 1)?;
        writer.write_record([
            behavior.impression_id.as_str(),
            behavior.user.as_str(),
            behavior.time.as_str(),
            behavior.clicked_news_string().as_str(),
            impressions.as_str(),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| NewsError::Io(e.into_error()))
}

/// Parse the `user<TAB>int` table.
pub fn parse_user2int(bytes: &[u8]) -> Result<HashMap<String, u32>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .quoting(false)
        .from_reader(bytes);
    let mut map = HashMap::new();
    for record in reader.records() {
        let record = record?;
        let (Some(user), Some(int)) = (record.get(0), record.get(1)) else {
            continue;
        };
        match int.trim().parse::<u32>() {
            Ok(int) => {
                map.insert(user.to_string(), int);
            }
            Err(e) => warn!(%user, raw = %int, error = %e, "Unparsable user index; skipping"),
        }
    }
    Ok(map)
}

/// User id to model index for the users present in the behaviors.
#[derive(Debug, Default)]
pub struct UserIndex {
    map: HashMap<String, u32>,
    pub total: usize,
    pub missed: usize,
}

impl UserIndex {
    /// Index used for users the model was not trained on.
    pub const UNKNOWN: u32 = 0;

    /// Build the index from distinct `(user, clicked_news)` pairs.
    ///
    /// Unknown users map to [`UserIndex::UNKNOWN`] and are counted in `missed`.
    pub fn build(behaviors: &[Behavior], user2int: &HashMap<String, u32>) -> Self {
        let mut index = UserIndex::default();
        for behavior in behaviors
            .iter()
            .unique_by(|b| (b.user.clone(), b.clicked_news_string()))
        {
            index.total += 1;
            let int = match user2int.get(&behavior.user) {
                Some(&int) => int,
                None => {
                    index.missed += 1;
                    Self::UNKNOWN
                }
            };
            index.map.insert(behavior.user.clone(), int);
        }
        info!(total = index.total, missed = index.missed, "Resolved users");
        index
    }

    pub fn get(&self, user: &str) -> u32 {
        self.map.get(user).copied().unwrap_or(Self::UNKNOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NEWS_TSV: &str = "index\tdate\tcategory\turl\ttitle\tbody\ttitle_t\tbody_t\n\
N0\t2026-10-16\tPolitics\thttps://a/0\t제목\t본문\tTitle zero\tAbstract zero\n\
N1\t2026-10-16\tWorld\thttps://a/1\t제목\t본문\tTitle \"one\"\tAbstract one\n\
N2\t2026-10-16\tSocial\thttps://a/2\t제목\n";

    const BEHAVIORS_TSV: &str = "1\tU1\t10/16/2026 7:00:00 AM\tN0 N1\tN0 N1 N2\n\
2\tU2\t10/16/2026 7:05:00 AM\t\tN2\n\
3\tU1\t10/16/2026 7:09:00 AM\tN0 N1\tN1\n";

    #[test]
    fn test_parse_news_table_positional_columns() {
        let table = NewsTable::parse(NEWS_TSV.as_bytes(), b'\t').unwrap();
        assert_eq!(table.len(), 3);
        let one = table.get("N1").unwrap();
        assert_eq!(one.category, "World");
        assert_eq!(one.title, "Title \"one\"");
        assert_eq!(one.abstract_text, "Abstract one");
        let short = table.get("N2").unwrap();
        assert_eq!(short.title, "");
    }

    #[test]
    fn test_parse_news_table_from_dataset_csv() {
        let csv = "index,date,category,url,title,body,title_google_translated,body_google_translated_distilbart_summarized\n\
N4,2026-10-16,IT/Science,https://a/4,제목,\"본문, 쉼표\",Chips,\"Summary, with comma\"\n";
        let table = NewsTable::parse(csv.as_bytes(), b',').unwrap();
        let row = table.get("N4").unwrap();
        assert_eq!(row.category, "IT/Science");
        assert_eq!(row.abstract_text, "Summary, with comma");
    }

    #[test]
    fn test_parse_news_table_reads_tab_dataset_written_by_ingestion() {
        use crate::dataset::{NewsRow, delimiter_for, write_rows};

        let row = NewsRow {
            index: "N7".to_string(),
            date: "2026-10-16".to_string(),
            category: "Politics".to_string(),
            url: "https://a/7".to_string(),
            title: "제목".to_string(),
            body: "본문".to_string(),
            title_google_translated: Some("\"Quoted\" headline\twith tab".to_string()),
            body_google_translated_distilbart_summarized: Some(
                "He said \"no\" to talks.\nTalks resume Monday.".to_string(),
            ),
        };
        let delimiter = delimiter_for("news.tsv");
        let bytes = write_rows(&[row], delimiter).unwrap();

        let table = NewsTable::parse(&bytes, delimiter).unwrap();
        assert_eq!(table.len(), 1);
        let meta = table.get("N7").unwrap();
        assert_eq!(meta.title, "\"Quoted\" headline\twith tab");
        assert_eq!(
            meta.abstract_text,
            "He said \"no\" to talks.\nTalks resume Monday."
        );
    }

    #[test]
    fn test_require_missing_is_integrity_error() {
        let table = NewsTable::parse(NEWS_TSV.as_bytes(), b'\t').unwrap();
        assert!(matches!(table.require("N9"), Err(NewsError::Integrity(_))));
        assert!(table.require("N0").is_ok());
    }

    #[test]
    fn test_parse_behaviors() {
        let behaviors = parse_behaviors(BEHAVIORS_TSV.as_bytes()).unwrap();
        assert_eq!(behaviors.len(), 3);
        assert_eq!(behaviors[0].clicked_news, vec!["N0", "N1"]);
        assert_eq!(behaviors[0].impressions, vec!["N0", "N1", "N2"]);
        assert!(behaviors[1].clicked_news.is_empty());
        assert_eq!(behaviors[1].clicked_news_string(), "");
    }

    #[test]
    fn test_parse_behaviors_rejects_short_rows() {
        let err = parse_behaviors(b"1\tU1\ttime\n").unwrap_err();
        assert!(matches!(err, NewsError::Integrity(_)));
    }

    #[test]
    fn test_rewrite_impressions() {
        let ids = vec!["N7".to_string(), "N8".to_string()];
        let bytes = rewrite_impressions(BEHAVIORS_TSV.as_bytes(), &ids).unwrap();
        let behaviors = parse_behaviors(&bytes).unwrap();
        assert_eq!(behaviors.len(), 3);
        for b in &behaviors {
            assert_eq!(b.impressions, ids);
        }
        assert_eq!(behaviors[0].clicked_news, vec!["N0", "N1"]);
        assert_eq!(behaviors[2].time, "10/16/2026 7:09:00 AM");
    }

    #[test]
    fn test_user_index_maps_unknown_users_to_zero() {
        let behaviors = parse_behaviors(BEHAVIORS_TSV.as_bytes()).unwrap();
        let user2int = parse_user2int(b"user\tint\nU1\t7\nU3\t9\n").unwrap();
        let index = UserIndex::build(&behaviors, &user2int);

        // rows 1 and 3 share user and history
        assert_eq!(index.total, 2);
        assert_eq!(index.missed, 1);
        assert_eq!(index.get("U1"), 7);
        assert_eq!(index.get("U2"), UserIndex::UNKNOWN);
        assert_eq!(index.get("U404"), UserIndex::UNKNOWN);
        // the source map is untouched
        assert_eq!(user2int.len(), 2);
    }
}
