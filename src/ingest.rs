//! Ingestion pipeline.
//!
//! 1. **Selection**: pick the top article of every section
//! 2. **Fetching**: scrape each article body
//! 3. **Translation**: translate titles, translate and summarize bodies; rows
//!    whose service answer is malformed are dropped
//! 4. **Merge**: renumber the batch after the stored rows and upload the table
//!
//! A failure before the upload leaves the stored dataset untouched.

use reqwest::Client;
use std::fmt;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::api::{TextService, Translation};
use crate::config::Settings;
use crate::dataset::{self, NewsRow, delimiter_for, format_id};
use crate::error::{NewsError, Result};
use crate::models::{Category, NewsArticle};
use crate::recommend::tables::rewrite_impressions;
use crate::scrapers::naver;
use crate::storage::ObjectStore;
use crate::utils::{kst_today, truncate_for_log};

/// Outcome of an ingestion run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub crawled: usize,
    pub kept: usize,
    pub dropped: usize,
    pub total_rows: usize,
}

/// Crawl every section in order.
#[instrument(level = "info", skip_all)]
pub async fn crawl(client: &Client, listing_base_url: &str) -> Result<Vec<NewsArticle>> {
    let mut articles = Vec::with_capacity(Category::ALL.len());
    for category in Category::ALL {
        articles.push(naver::fetch_article(client, listing_base_url, category).await?);
    }
    info!(count = articles.len(), "Crawling finished");
    Ok(articles)
}

/// Turn crawled articles into rows numbered from `N0`.
pub fn to_rows(articles: Vec<NewsArticle>, date: &str) -> Vec<NewsRow> {
    articles
        .into_iter()
        .enumerate()
        .map(|(i, article)| NewsRow {
            index: format_id(i as u64),
            date: date.to_string(),
            category: article.category.label().to_string(),
            url: article.url,
            title: article.title,
            body: article.body,
            title_google_translated: None,
            body_google_translated_distilbart_summarized: None,
        })
        .collect()
}

/// Fill the translated columns, dropping rows with a malformed service answer.
///
/// Any other failure aborts the batch.
#[instrument(level = "info", skip_all, fields(rows = rows.len()))]
pub async fn translate_rows<T, S>(
    translation: &Translation<T, S>,
    rows: Vec<NewsRow>,
) -> Result<(Vec<NewsRow>, usize)>
where
    T: TextService + fmt::Debug,
    S: TextService + fmt::Debug,
{
    let mut kept = Vec::with_capacity(rows.len());
    let mut dropped = 0usize;

    for mut row in rows {
        let translated = async {
            let title = translation.translate(&row.title).await?;
            let summary = translation.summarize(&row.body).await?;
            Ok::<_, NewsError>((title, summary))
        }
        .await;

        match translated {
            Ok((title, summary)) => {
                info!(index = %row.index, title = %truncate_for_log(&title, 80), "Translated row");
                row.title_google_translated = Some(title);
                row.body_google_translated_distilbart_summarized = Some(summary);
                kept.push(row);
            }
            Err(e) if e.is_malformed() => {
                warn!(index = %row.index, error = %e, "Malformed service answer; dropping row");
                dropped += 1;
            }
            Err(e) => {
                error!(index = %row.index, error = %e, "Translation failed; aborting batch");
                return Err(e);
            }
        }
    }
    Ok((kept, dropped))
}

/// Merge `batch` into the stored dataset and upload the result.
#[instrument(level = "info", skip_all, fields(key = %key, batch = batch.len()))]
pub async fn append_to_store(
    store: &impl ObjectStore,
    key: &str,
    batch: Vec<NewsRow>,
) -> Result<Vec<NewsRow>> {
    let delimiter = delimiter_for(key);
    let old = match store.get(key).await? {
        Some(bytes) => dataset::read_rows(&bytes, delimiter)?,
        None => Vec::new(),
    };
    if old.is_empty() {
        info!("No dataset exists; writing the new batch");
    } else {
        info!(rows = old.len(), "Dataset exists; appending");
    }

    let merged = dataset::merge(old, batch)?;
    store
        .put(key, &dataset::write_rows(&merged, delimiter)?)
        .await?;
    Ok(merged)
}

/// Point every stored behavior row at the dataset ids, if the table exists.
#[instrument(level = "info", skip_all, fields(key = %key, ids = ids.len()))]
pub async fn refresh_impressions(
    store: &impl ObjectStore,
    key: &str,
    ids: &[String],
) -> Result<bool> {
    let Some(bytes) = store.get(key).await? else {
        warn!("No behaviors table; impressions not refreshed");
        return Ok(false);
    };
    store.put(key, &rewrite_impressions(&bytes, ids)?).await?;
    info!("Refreshed impressions");
    Ok(true)
}

/// Translate, merge and persist an already crawled batch.
pub async fn ingest_articles<T, S>(
    settings: &Settings,
    store: &impl ObjectStore,
    translation: &Translation<T, S>,
    articles: Vec<NewsArticle>,
) -> Result<IngestReport>
where
    T: TextService + fmt::Debug,
    S: TextService + fmt::Debug,
{
    let crawled = articles.len();
    let rows = to_rows(articles, &kst_today().to_string());

    info!("Translation started");
    let (rows, dropped) = translate_rows(translation, rows).await?;
    let kept = rows.len();

    info!(kept, dropped, "Dataset ready; merging");
    let merged = append_to_store(store, &settings.storage.news_object, rows).await?;

    if settings.ingest.refresh_impressions {
        let ids: Vec<String> = merged.iter().map(|r| r.index.clone()).collect();
        refresh_impressions(store, &settings.storage.behaviors_object, &ids).await?;
    }

    Ok(IngestReport {
        crawled,
        kept,
        dropped,
        total_rows: merged.len(),
    })
}

/// Run the full ingestion pipeline.
#[instrument(level = "info", skip_all)]
pub async fn run(
    settings: &Settings,
    client: &Client,
    store: &impl ObjectStore,
) -> Result<IngestReport> {
    let t0 = Instant::now();
    info!("Crawling started");
    let articles = crawl(client, &settings.ingest.listing_base_url).await?;

    let translation = Translation::from_settings(client, &settings.ingest, &settings.http);
    let report = ingest_articles(settings, store, &translation, articles).await?;

    info!(
        crawled = report.crawled,
        kept = report.kept,
        dropped = report.dropped,
        total_rows = report.total_rows,
        elapsed_ms = t0.elapsed().as_millis(),
        "Ingestion finished"
    );
    Ok(report)
}
