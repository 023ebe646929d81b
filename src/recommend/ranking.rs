//! Per-category candidate selection.

use tracing::debug;

use super::tables::NewsTable;
use crate::error::{NewsError, Result};

/// Winning article of one category.
#[derive(Debug, Clone, PartialEq)]
pub struct Winner {
    pub category: String,
    pub news_id: String,
    pub probability: f32,
}

/// Category → best article, iterated in the order categories were first seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryWinners {
    winners: Vec<Winner>,
}

impl CategoryWinners {
    pub fn get(&self, category: &str) -> Option<&Winner> {
        self.winners.iter().find(|w| w.category == category)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Winner> {
        self.winners.iter()
    }

    pub fn len(&self) -> usize {
        self.winners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.winners.is_empty()
    }

    /// Offer a candidate; it replaces the current winner of its category only
    /// with a strictly greater probability.
    fn offer(&mut self, category: &str, news_id: &str, probability: f32) {
        match self.winners.iter_mut().find(|w| w.category == category) {
            Some(current) => {
                if probability > current.probability {
                    current.news_id = news_id.to_string();
                    current.probability = probability;
                }
            }
            None => self.winners.push(Winner {
                category: category.to_string(),
                news_id: news_id.to_string(),
                probability,
            }),
        }
    }
}

/// Reduce scored candidates to one winner per category.
///
/// Candidates are scanned in the given order and the first of equal maxima
/// wins. Categories without candidates do not appear. A candidate that has no
/// category according to `category_of` is a data-integrity error.
///
/// # Arguments
///
/// * `candidates` - `(news_id, click_probability)` pairs of one session
/// * `category_of` - Category lookup for a news id
///
/// # Returns
///
/// The winners keyed by category, iterated in first-seen category order.
///
/// # Examples
///
/// ```ignore
/// // A:X 0.2, B:X 0.9, C:Y 0.9
/// let winners = select_per_category(&candidates, |id| categories.get(id).cloned())?;
/// assert_eq!(winners.get("X").unwrap().news_id, "B");
/// assert_eq!(winners.get("Y").unwrap().news_id, "C");
/// ```
pub fn select_per_category<F>(candidates: &[(String, f32)], category_of: F) -> Result<CategoryWinners>
where
    F: Fn(&str) -> Option<String>,
{
    let mut winners = CategoryWinners::default();
    for (news_id, probability) in candidates {
        let category = category_of(news_id).ok_or_else(|| {
            NewsError::Integrity(format!("candidate {news_id} has no category"))
        })?;
        winners.offer(&category, news_id, *probability);
    }
    debug!(categories = winners.len(), candidates = candidates.len(), "Selected winners");
    Ok(winners)
}

/// [`select_per_category`] with categories looked up in the news table.
pub fn select_from_table(candidates: &[(String, f32)], news: &NewsTable) -> Result<CategoryWinners> {
    select_per_category(candidates, |id| news.get(id).map(|m| m.category.clone()))
}
