//! Data models shared by the ingestion and recommendation pipelines.
//!
//! - [`Category`]: the fixed set of news sections crawled each run
//! - [`ListingItem`]: one entry of a section's listing page
//! - [`NewsArticle`]: the top listing item of a section with its scraped body

use serde::{Deserialize, Serialize};
use std::fmt;

/// A news section of the listing site.
///
/// Each variant carries the numeric code used in the listing URL and the
/// label written to the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Politics,
    Economics,
    Social,
    LifeCultures,
    World,
    ItScience,
}

impl Category {
    /// Every section, in crawl order.
    pub const ALL: [Category; 6] = [
        Category::Politics,
        Category::Economics,
        Category::Social,
        Category::LifeCultures,
        Category::World,
        Category::ItScience,
    ];

    /// Section code used in the listing URL (`sid1=<code>`).
    pub fn code(self) -> u16 {
        match self {
            Category::Politics => 100,
            Category::Economics => 101,
            Category::Social => 102,
            Category::LifeCultures => 103,
            Category::World => 104,
            Category::ItScience => 105,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Politics => "Politics",
            Category::Economics => "Economics",
            Category::Social => "Social",
            Category::LifeCultures => "Life/Cultures",
            Category::World => "World",
            Category::ItScience => "IT/Science",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One article listed on a section page.
///
/// `count` is the engagement signal reported by the site (number of related
/// articles in the cluster).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingItem {
    pub url: String,
    pub title: String,
    pub count: u32,
}

impl ListingItem {
    /// The entry selected when a section lists nothing worth picking.
    pub fn placeholder() -> Self {
        Self::default()
    }

    pub fn is_placeholder(&self) -> bool {
        self.url.is_empty()
    }
}

/// The top article of a section, ready for translation.
#[derive(Debug, Clone)]
pub struct NewsArticle {
    pub category: Category,
    pub url: String,
    pub title: String,
    /// Normalized body text, or the not-found sentinel.
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_codes_are_sequential() {
        let codes: Vec<u16> = Category::ALL.iter().map(|c| c.code()).collect();
        assert_eq!(codes, vec![100, 101, 102, 103, 104, 105]);
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(Category::LifeCultures.label(), "Life/Cultures");
        assert_eq!(Category::ItScience.to_string(), "IT/Science");
    }

    #[test]
    fn test_placeholder() {
        let p = ListingItem::placeholder();
        assert_eq!(p.count, 0);
        assert!(p.title.is_empty());
        assert!(p.is_placeholder());
    }
}
