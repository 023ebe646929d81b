//! Run configuration.
//!
//! A [`Settings`] value is built once per invocation from an optional YAML
//! file plus command-line/environment overrides, then handed to the pipeline.
//! Every YAML field has a default, so an empty file (or no file) is valid.
//!
//! ```yaml
//! storage:
//!   root: ./data/predict
//! recommend:
//!   model: long-short-term
//!   checkpoint_dir: ./checkpoint/NAML
//! email:
//!   to: digest@example.com
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

use crate::error::{NewsError, Result};
use crate::recommend::model::ModelKind;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageSettings,
    pub http: HttpSettings,
    pub ingest: IngestSettings,
    pub recommend: RecommendSettings,
    pub email: EmailSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory holding every object.
    pub root: PathBuf,
    /// News dataset written by ingestion and read by recommendation.
    pub news_object: String,
    pub behaviors_object: String,
    pub user2int_object: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data/predict"),
            news_object: "news.csv".to_string(),
            behaviors_object: "behaviors.tsv".to_string(),
            user2int_object: "user2int.tsv".to_string(),
        }
    }
}

/// Transport settings shared by every outbound HTTP call.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agent: String,
    /// Attempts after the first failure before a transient error is fatal.
    pub max_retries: usize,
    pub base_delay_ms: u64,
}

impl HttpSettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36".to_string(),
            max_retries: 5,
            base_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Listing URL prefix; the section code is appended.
    pub listing_base_url: String,
    pub translate_url: String,
    pub target_language: String,
    pub summarizer_url: String,
    /// Bearer token for the summarizer, usually supplied through `HF_API_TOKEN`.
    #[serde(skip)]
    pub summarizer_token: Option<String>,
    /// Rewrite the behaviors impressions with the merged dataset ids.
    pub refresh_impressions: bool,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            listing_base_url: "https://news.naver.com/main/main.naver?mode=LSD&mid=shm&sid1="
                .to_string(),
            translate_url: "https://translate.googleapis.com/translate_a/single".to_string(),
            target_language: "en".to_string(),
            summarizer_url:
                "https://api-inference.huggingface.co/models/sshleifer/distilbart-cnn-12-6"
                    .to_string(),
            summarizer_token: None,
            refresh_impressions: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecommendSettings {
    pub model: ModelKind,
    /// Directory searched for `ckpt-<epoch>.json`.
    pub checkpoint_dir: PathBuf,
    pub num_clicked_news_a_user: usize,
    /// Stop after this many behavior rows.
    pub max_sessions: Option<usize>,
}

impl Default for RecommendSettings {
    fn default() -> Self {
        Self {
            model: ModelKind::default(),
            checkpoint_dir: PathBuf::from("./checkpoint"),
            num_clicked_news_a_user: 50,
            max_sessions: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    #[serde(skip)]
    pub username: Option<String>,
    #[serde(skip)]
    pub password: Option<String>,
    /// Defaults to the SMTP username.
    pub from: Option<String>,
    /// Defaults to the sender.
    pub to: Option<String>,
}

impl EmailSettings {
    pub fn sender(&self) -> Result<&str> {
        self.from
            .as_deref()
            .or(self.username.as_deref())
            .ok_or_else(|| NewsError::Config("no sender address configured".to_string()))
    }

    pub fn recipient(&self) -> Result<&str> {
        match self.to.as_deref() {
            Some(to) => Ok(to),
            None => self.sender(),
        }
    }
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            username: None,
            password: None,
            from: None,
            to: None,
        }
    }
}

impl Settings {
    /// Load settings from a YAML file, or defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                let settings = Self::from_yaml(&raw)?;
                info!(path = %path.display(), "Loaded configuration");
                Ok(settings)
            }
            None => {
                info!("No configuration file given; using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }
}
