//! News source scrapers.
//!
//! Scraping follows a two-phase pattern:
//!
//! 1. **Selection**: fetch a section listing and pick its top article
//! 2. **Fetching**: download the article page and extract the body text
//!
//! | Source | Module | Method |
//! |--------|--------|--------|
//! | Naver News | [`naver`] | HTML scraping of the section listings |

pub mod naver;
