//! Plain-text email digest.

use chrono::NaiveDate;
use std::fmt::Write;

use super::ranking::CategoryWinners;
use super::tables::NewsTable;
use crate::error::Result;

/// Subject line of the digest sent on `date`.
pub fn subject(date: NaiveDate) -> String {
    format!("{date} Breaking News Today by NewsNudge")
}

/// Render one block per winning article:
///
/// ```text
/// <category>
/// <title>
/// <abstract>
///
/// ```
///
/// Blocks follow the iteration order of `winners`. A winner missing from
/// `news` fails the whole digest.
pub fn render(winners: &CategoryWinners, news: &NewsTable) -> Result<String> {
    let mut content = String::new();
    for winner in winners.iter() {
        let article = news.require(&winner.news_id)?;
        // writing to a String cannot fail
        let _ = write!(
            content,
            "{}\n{}\n{}\n\n",
            article.category, article.title, article.abstract_text
        );
    }
    Ok(content)
}
