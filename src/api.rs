//! Translation and summarization API calls with exponential backoff.
//!
//! # Architecture
//!
//! - [`TextService`]: one stateless text-in/text-out HTTP call
//! - [`GoogleTranslator`]: the Google translate web endpoint
//! - [`Summarizer`]: a Hugging Face style summarization endpoint
//! - [`Retry`]: decorator adding retry with backoff to any [`TextService`]
//! - [`Translation`]: translate, or translate then summarize
//!
//! # Retry Strategy
//!
//! Only transient failures (connection errors, 429, 5xx) are retried. A
//! malformed answer is returned at once so the caller can drop the row.
//!
//! - Exponential backoff starting at the configured base delay
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to every delay

use rand::{Rng, rng};
use reqwest::{Client, Response};
use serde_json::{Value, json};
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{HttpSettings, IngestSettings};
use crate::error::{NewsError, Result};
use crate::utils::truncate_for_log;

/// A stateless text transformation backed by an HTTP service.
pub trait TextService {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    async fn call(&self, text: &str) -> Result<String>;
}

/// Wrapper that adds exponential backoff retry logic to any [`TextService`].
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct Retry<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> Retry<T>
where
    T: TextService,
{
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    fn backoff(&self, attempt: usize) -> StdDuration {
        let shift = (attempt - 1).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + StdDuration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for Retry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> TextService for Retry<T>
where
    T: TextService + fmt::Debug,
{
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    #[instrument(level = "info", skip_all, fields(service = self.inner.name()))]
    async fn call(&self, text: &str) -> Result<String> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.call(text).await {
                Ok(resp) => return Ok(resp),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis(),
                            elapsed_ms_total = total_dt.as_millis(),
                            error = %e,
                            "call() exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis(),
                        elapsed_ms_total = total_dt.as_millis(),
                        ?delay,
                        error = %e,
                        "call() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Build the HTTP client shared by every call of a run.
pub fn build_client(http: &HttpSettings) -> Result<Client> {
    Ok(Client::builder().user_agent(http.user_agent.as_str()).build()?)
}

/// Map a non-success status to a transport error (retryable) or a malformed
/// answer (dropped row).
async fn check_status(service: &'static str, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let code = status.as_u16();
    if code == 429 || status.is_server_error() {
        return Err(NewsError::Status {
            service,
            status: code,
        });
    }
    let body = resp.text().await.unwrap_or_default();
    Err(NewsError::malformed(
        service,
        format!("status {code}: {}", truncate_for_log(&body, 200)),
    ))
}

/// Client for the Google translate web endpoint.
#[derive(Debug, Clone)]
pub struct GoogleTranslator {
    client: Client,
    url: String,
    target: String,
}

impl GoogleTranslator {
    pub fn new(client: Client, url: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            target: target.into(),
        }
    }
}

/// Concatenate the translated segments of a `translate_a/single` answer.
///
/// The answer is a nested array whose first element lists
/// `[translated, original, ...]` segments.
pub fn parse_translation(body: &Value) -> Result<String> {
    let segments = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| NewsError::malformed("translator", "missing segment list"))?;

    let mut out = String::new();
    for segment in segments {
        if let Some(part) = segment.get(0).and_then(Value::as_str) {
            out.push_str(part);
        }
    }
    Ok(out)
}

impl TextService for GoogleTranslator {
    fn name(&self) -> &'static str {
        "translator"
    }

    #[instrument(level = "debug", skip_all, fields(chars = text.chars().count()))]
    async fn call(&self, text: &str) -> Result<String> {
        let resp = self
            .client
            .post(&self.url)
            .query(&[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", self.target.as_str()),
                ("dt", "t"),
            ])
            .form(&[("q", text)])
            .send()
            .await?;
        let resp = check_status(self.name(), resp).await?;
        let raw = resp.text().await?;
        let body: Value = serde_json::from_str(&raw).map_err(|e| {
            NewsError::malformed(
                "translator",
                format!("{e}: {}", truncate_for_log(&raw, 200)),
            )
        })?;
        parse_translation(&body)
    }
}

/// Client for a summarization inference endpoint.
#[derive(Debug, Clone)]
pub struct Summarizer {
    client: Client,
    url: String,
    token: Option<String>,
}

impl Summarizer {
    pub fn new(client: Client, url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            url: url.into(),
            token,
        }
    }
}

/// Extract `[0].summary_text` from a summarization answer.
///
/// Error payloads such as `{"error": "Model is loading"}` and empty summaries
/// are malformed.
pub fn parse_summary(body: &Value) -> Result<String> {
    if let Some(err) = body.get("error").and_then(Value::as_str) {
        return Err(NewsError::malformed("summarizer", err.to_string()));
    }
    let summary = body
        .get(0)
        .and_then(|first| first.get("summary_text"))
        .and_then(Value::as_str)
        .ok_or_else(|| NewsError::malformed("summarizer", "missing summary_text"))?;
    if summary.trim().is_empty() {
        return Err(NewsError::malformed("summarizer", "empty summary_text"));
    }
    Ok(summary.to_string())
}

impl TextService for Summarizer {
    fn name(&self) -> &'static str {
        "summarizer"
    }

    #[instrument(level = "debug", skip_all, fields(chars = text.chars().count()))]
    async fn call(&self, text: &str) -> Result<String> {
        let mut req = self.client.post(&self.url).json(&json!({ "inputs": text }));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = check_status(self.name(), req.send().await?).await?;
        let raw = resp.text().await?;
        let body: Value = serde_json::from_str(&raw).map_err(|e| {
            NewsError::malformed(
                "summarizer",
                format!("{e}: {}", truncate_for_log(&raw, 200)),
            )
        })?;
        parse_summary(&body)
    }
}

/// Translation and summarization, each behind its own retry wrapper.
#[derive(Debug)]
pub struct Translation<T, S> {
    translator: Retry<T>,
    summarizer: Retry<S>,
}

impl Translation<GoogleTranslator, Summarizer> {
    /// Build the HTTP-backed services from the run settings.
    pub fn from_settings(client: &Client, ingest: &IngestSettings, http: &HttpSettings) -> Self {
        let translator = GoogleTranslator::new(
            client.clone(),
            ingest.translate_url.clone(),
            ingest.target_language.clone(),
        );
        let summarizer = Summarizer::new(
            client.clone(),
            ingest.summarizer_url.clone(),
            ingest.summarizer_token.clone(),
        );
        Self::new(translator, summarizer, http.max_retries, http.base_delay())
    }
}

impl<T, S> Translation<T, S>
where
    T: TextService + fmt::Debug,
    S: TextService + fmt::Debug,
{
    pub fn new(translator: T, summarizer: S, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            translator: Retry::new(translator, max_retries, base_delay),
            summarizer: Retry::new(summarizer, max_retries, base_delay),
        }
    }

    /// Translate free text to the target language.
    ///
    /// # Arguments
    ///
    /// * `text` - Source text in any language
    ///
    /// # Returns
    ///
    /// The translation. Blank input yields an empty string without calling
    /// the service, so placeholder rows with no title survive.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// assert_eq!(translation.translate("").await?, "");
    /// ```
    #[instrument(level = "info", skip_all)]
    pub async fn translate(&self, text: &str) -> Result<String> {
        if text.trim().is_empty() {
            debug!("Blank input; nothing to translate");
            return Ok(String::new());
        }
        let translated = self.translator.call(text).await?;
        debug!(preview = %truncate_for_log(&translated, 120), "Translated text");
        Ok(translated)
    }

    /// Translate, then summarize the translation.
    ///
    /// Blank input yields an empty summary without calling either service.
    #[instrument(level = "info", skip_all)]
    pub async fn summarize(&self, text: &str) -> Result<String> {
        let t0 = Instant::now();
        let translated = self.translate(text).await?;
        if translated.is_empty() {
            return Ok(String::new());
        }
        let summary = self.summarizer.call(&translated).await?;
        info!(
            elapsed_ms_total = t0.elapsed().as_millis(),
            input_chars = text.chars().count(),
            summary_chars = summary.chars().count(),
            "Summarized text"
        );
        Ok(summary)
    }
}
