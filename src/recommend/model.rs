//! Click model inference.
//!
//! A model is picked by [`ModelKind`] and built from a checkpoint through the
//! registry in [`ModelKind::build`]. Every model shares the same news encoder
//! and click predictor and differs in how it encodes users:
//!
//! | Kind | User vector |
//! |------|-------------|
//! | `mean-pooling` | mean of the clicked news vectors |
//! | `long-short-term` | the mean above plus a per-user embedding |
//!
//! Checkpoints are JSON files named `ckpt-<epoch>.json`:
//!
//! ```json
//! {
//!   "dim": 3,
//!   "word_embeddings": { "election": [0.1, 0.0, 0.3] },
//!   "category_embeddings": { "Politics": [0.5, 0.1, 0.0] },
//!   "user_embeddings": [[0.0, 0.0, 0.0], [0.2, 0.1, 0.0]]
//! }
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument};

use super::tables::{NewsMeta, UserIndex};
use crate::error::{NewsError, Result};

pub type Embedding = Vec<f32>;

static CHECKPOINT_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ckpt-(\d+)\.json$").unwrap());

/// Closed set of model architectures that can be loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    #[default]
    MeanPooling,
    LongShortTerm,
}

type Factory = fn(Checkpoint) -> Result<Model>;

impl ModelKind {
    pub fn name(self) -> &'static str {
        match self {
            ModelKind::MeanPooling => "mean-pooling",
            ModelKind::LongShortTerm => "long-short-term",
        }
    }

    fn factory(self) -> Factory {
        match self {
            ModelKind::MeanPooling => |ckpt| Ok(Model::MeanPooling(NewsEncoder::new(ckpt)?)),
            ModelKind::LongShortTerm => |ckpt| {
                let users = ckpt.user_embeddings.clone();
                let encoder = NewsEncoder::new(ckpt)?;
                Ok(Model::LongShortTerm { encoder, users })
            },
        }
    }

    /// Build a model of this kind from a checkpoint.
    pub fn build(self, checkpoint: Checkpoint) -> Result<Model> {
        (self.factory())(checkpoint)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Trained parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct Checkpoint {
    pub dim: usize,
    #[serde(default)]
    pub word_embeddings: HashMap<String, Embedding>,
    #[serde(default)]
    pub category_embeddings: HashMap<String, Embedding>,
    /// Indexed by user int; row 0 stands for unknown users.
    #[serde(default)]
    pub user_embeddings: Vec<Embedding>,
}

impl Checkpoint {
    pub fn from_json(raw: &str) -> Result<Self> {
        let checkpoint: Checkpoint = serde_json::from_str(raw)?;
        checkpoint.validate()?;
        Ok(checkpoint)
    }

    fn validate(&self) -> Result<()> {
        if self.dim == 0 {
            return Err(NewsError::Config("checkpoint dim must be positive".to_string()));
        }
        let vectors = self
            .word_embeddings
            .iter()
            .chain(self.category_embeddings.iter())
            .map(|(k, v)| (k.as_str(), v))
            .chain(self.user_embeddings.iter().map(|v| ("<user>", v)));
        for (key, vector) in vectors {
            if vector.len() != self.dim {
                return Err(NewsError::Config(format!(
                    "embedding {key:?} has {} values, expected {}",
                    vector.len(),
                    self.dim
                )));
            }
        }
        Ok(())
    }
}

/// Newest checkpoint in `dir`, by epoch number.
pub fn latest_checkpoint(dir: &Path) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut best: Option<(u64, PathBuf)> = None;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(epoch) = name
            .to_str()
            .and_then(|n| CHECKPOINT_NAME.captures(n))
            .and_then(|c| c[1].parse::<u64>().ok())
        else {
            continue;
        };
        if best.as_ref().is_none_or(|(e, _)| epoch > *e) {
            best = Some((epoch, entry.path()));
        }
    }
    Ok(best.map(|(_, path)| path))
}

/// Load the newest checkpoint of `dir` and build a `kind` model from it.
#[instrument(level = "info", fields(dir = %dir.display(), %kind))]
pub async fn load_model(kind: ModelKind, dir: &Path) -> Result<Model> {
    let path = latest_checkpoint(dir)?
        .ok_or_else(|| NewsError::Config(format!("no checkpoint found in {}", dir.display())))?;
    let raw = fs::read_to_string(&path).await?;
    let model = kind.build(Checkpoint::from_json(&raw)?)?;
    info!(path = %path.display(), dim = model.dim(), "Loaded model");
    Ok(model)
}

/// Lowercased alphanumeric tokens.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

fn mean<'a, I>(vectors: I, dim: usize) -> Option<Embedding>
where
    I: IntoIterator<Item = &'a Embedding>,
{
    let mut sum = vec![0.0f32; dim];
    let mut n = 0usize;
    for v in vectors {
        for (s, x) in sum.iter_mut().zip(v) {
            *s += x;
        }
        n += 1;
    }
    if n == 0 {
        return None;
    }
    for s in &mut sum {
        *s /= n as f32;
    }
    Some(sum)
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Encodes an article from its title, abstract and category.
#[derive(Debug, Clone)]
pub struct NewsEncoder {
    dim: usize,
    words: HashMap<String, Embedding>,
    categories: HashMap<String, Embedding>,
}

impl NewsEncoder {
    fn new(checkpoint: Checkpoint) -> Result<Self> {
        checkpoint.validate()?;
        Ok(Self {
            dim: checkpoint.dim,
            words: checkpoint.word_embeddings,
            categories: checkpoint.category_embeddings,
        })
    }

    fn text_vector(&self, text: &str) -> Option<Embedding> {
        let tokens: Vec<String> = tokenize(text).collect();
        mean(tokens.iter().filter_map(|t| self.words.get(t)), self.dim)
    }

    /// Average of the title, abstract and category vectors that exist; zeros
    /// when none does.
    pub fn encode(&self, news: &NewsMeta) -> Embedding {
        let title = self.text_vector(&news.title);
        let abstract_text = self.text_vector(&news.abstract_text);
        let category = self.categories.get(&news.category).cloned();
        let parts: Vec<Embedding> = [title, abstract_text, category].into_iter().flatten().collect();
        mean(parts.iter(), self.dim).unwrap_or_else(|| vec![0.0; self.dim])
    }
}

/// A loaded click model.
#[derive(Debug, Clone)]
pub enum Model {
    MeanPooling(NewsEncoder),
    LongShortTerm {
        encoder: NewsEncoder,
        users: Vec<Embedding>,
    },
}

impl Model {
    fn encoder(&self) -> &NewsEncoder {
        match self {
            Model::MeanPooling(encoder) => encoder,
            Model::LongShortTerm { encoder, .. } => encoder,
        }
    }

    pub fn dim(&self) -> usize {
        self.encoder().dim
    }

    pub fn news_vector(&self, news: &NewsMeta) -> Embedding {
        self.encoder().encode(news)
    }

    /// Encode a user from their clicked news vectors.
    pub fn user_vector(&self, user: u32, clicked: &[&Embedding]) -> Embedding {
        let dim = self.dim();
        let short_term = mean(clicked.iter().copied(), dim).unwrap_or_else(|| vec![0.0; dim]);
        match self {
            Model::MeanPooling(_) => short_term,
            Model::LongShortTerm { users, .. } => {
                let long_term = if user == UserIndex::UNKNOWN {
                    None
                } else {
                    users.get(user as usize)
                };
                match long_term {
                    Some(long_term) => short_term
                        .iter()
                        .zip(long_term)
                        .map(|(s, l)| s + l)
                        .collect(),
                    None => {
                        debug!(user, "No long-term embedding; using clicks only");
                        short_term
                    }
                }
            }
        }
    }

    /// Probability that a user clicks a candidate.
    pub fn click_probability(&self, candidate: &Embedding, user: &Embedding) -> f32 {
        sigmoid(dot(candidate, user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint() -> Checkpoint {
        Checkpoint::from_json(
            r#"{
                "dim": 2,
                "word_embeddings": {
                    "election": [1.0, 0.0],
                    "vote": [3.0, 0.0],
                    "chip": [0.0, 2.0]
                },
                "category_embeddings": {
                    "Politics": [2.0, 0.0],
                    "IT/Science": [0.0, 1.0]
                },
                "user_embeddings": [[9.0, 9.0], [0.0, -4.0]]
            }"#,
        )
        .unwrap()
    }

    fn meta(category: &str, title: &str, abstract_text: &str) -> NewsMeta {
        NewsMeta {
            id: "N0".to_string(),
            category: category.to_string(),
            title: title.to_string(),
            abstract_text: abstract_text.to_string(),
        }
    }

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("newsnudge-ckpt-{}", rand::random::<u64>()))
    }

    #[test]
    fn test_tokenize() {
        let tokens: Vec<String> = tokenize("Election-day VOTE, 2026!").collect();
        assert_eq!(tokens, vec!["election", "day", "vote", "2026"]);
    }

    #[test]
    fn test_news_vector_averages_present_parts() {
        let model = ModelKind::MeanPooling.build(checkpoint()).unwrap();
        // title mean [2, 0], no abstract words, category [2, 0]
        let v = model.news_vector(&meta("Politics", "Election vote", "unknown words"));
        assert_eq!(v, vec![2.0, 0.0]);
    }

    #[test]
    fn test_news_vector_without_known_parts_is_zero() {
        let model = ModelKind::MeanPooling.build(checkpoint()).unwrap();
        let v = model.news_vector(&meta("Weather", "sunny", ""));
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn test_mean_pooling_user_vector() {
        let model = ModelKind::MeanPooling.build(checkpoint()).unwrap();
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 3.0];
        assert_eq!(model.user_vector(5, &[&a, &b]), vec![0.5, 1.5]);
        assert_eq!(model.user_vector(5, &[]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_long_short_term_adds_user_embedding() {
        let model = ModelKind::LongShortTerm.build(checkpoint()).unwrap();
        let a = vec![1.0, 1.0];
        assert_eq!(model.user_vector(1, &[&a]), vec![1.0, -3.0]);
        // unknown and out-of-range users fall back to clicks
        assert_eq!(model.user_vector(UserIndex::UNKNOWN, &[&a]), vec![1.0, 1.0]);
        assert_eq!(model.user_vector(42, &[&a]), vec![1.0, 1.0]);
    }

    #[test]
    fn test_click_probability_is_monotonic_in_affinity() {
        let model = ModelKind::MeanPooling.build(checkpoint()).unwrap();
        let user = vec![1.0, 0.0];
        let close = model.click_probability(&vec![2.0, 0.0], &user);
        let far = model.click_probability(&vec![-2.0, 0.0], &user);
        let neutral = model.click_probability(&vec![0.0, 5.0], &user);
        assert!(close > neutral && neutral > far);
        assert!((neutral - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_checkpoint_dimension_mismatch_is_rejected() {
        let err = Checkpoint::from_json(r#"{"dim": 3, "word_embeddings": {"a": [1.0]}}"#)
            .unwrap_err();
        assert!(matches!(err, NewsError::Config(_)));
    }

    #[test]
    fn test_latest_checkpoint_picks_highest_epoch() {
        let dir = scratch_dir();
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["ckpt-2.json", "ckpt-10.json", "ckpt-9.json", "notes.txt", "ckpt-x.json"] {
            std::fs::write(dir.join(name), "{}").unwrap();
        }
        let latest = latest_checkpoint(&dir).unwrap().unwrap();
        assert_eq!(latest.file_name().unwrap(), "ckpt-10.json");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_latest_checkpoint_missing_dir() {
        assert!(latest_checkpoint(&scratch_dir()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_model_without_checkpoint_fails() {
        let dir = scratch_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let err = load_model(ModelKind::MeanPooling, &dir).await.unwrap_err();
        assert!(matches!(err, NewsError::Config(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
