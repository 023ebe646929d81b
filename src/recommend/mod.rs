//! Recommendation pipeline.
//!
//! 1. **Model**: load the newest checkpoint into the configured [`model::ModelKind`]
//! 2. **Tables**: read news metadata, behaviors and the user map from storage
//! 3. **Scoring**: encode every article, then every session's user, and score
//!    the session's candidates
//! 4. **Reduction**: keep the best candidate per category
//! 5. **Digest**: render the winners of the last scored session and mail them

pub mod digest;
pub mod model;
pub mod ranking;
pub mod tables;

use std::collections::HashMap;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::config::Settings;
use crate::dataset::delimiter_for;
use crate::email::Mailer;
use crate::error::{NewsError, Result};
use crate::storage::ObjectStore;
use crate::utils::local_today;
use model::{Embedding, Model};
use ranking::{CategoryWinners, select_from_table};
use tables::{Behavior, NewsTable, UserIndex};

/// Filler id for short click histories; encodes to the zero vector.
pub const PADDED_NEWS: &str = "PADDED_NEWS";

/// Outcome of a recommendation run.
#[derive(Debug)]
pub struct RecommendReport {
    pub sessions: usize,
    pub winners: CategoryWinners,
    /// `None` when there was nothing to send.
    pub digest: Option<String>,
}

async fn require_object(store: &impl ObjectStore, key: &str) -> Result<Vec<u8>> {
    store
        .get(key)
        .await?
        .ok_or_else(|| NewsError::Config(format!("object {key} not found in storage")))
}

/// Score every session and return the winners of the last one.
///
/// Clicked and candidate ids must all be present in `news`; the first missing
/// id aborts scoring.
#[instrument(level = "info", skip_all, fields(sessions = behaviors.len()))]
pub fn score_sessions(
    model: &Model,
    news: &NewsTable,
    behaviors: &[Behavior],
    users: &UserIndex,
    num_clicked_news_a_user: usize,
) -> Result<Option<CategoryWinners>> {
    let t0 = Instant::now();
    let news_vectors: HashMap<&str, Embedding> = news
        .iter()
        .map(|meta| (meta.id.as_str(), model.news_vector(meta)))
        .collect();
    info!(
        count = news_vectors.len(),
        elapsed_ms = t0.elapsed().as_millis(),
        "Calculated vectors for news"
    );

    let lookup = |id: &str| -> Result<&Embedding> {
        news_vectors
            .get(id)
            .ok_or_else(|| NewsError::Integrity(format!("article {id} is not in the news table")))
    };

    let mut user_vectors: HashMap<(u32, String), Embedding> = HashMap::new();
    let mut last = None;

    for behavior in behaviors {
        let user = users.get(&behavior.user);
        let key = (user, behavior.clicked_news_string());
        if !user_vectors.contains_key(&key) {
            let clicked = behavior
                .clicked_news
                .iter()
                .filter(|id| id.as_str() != PADDED_NEWS)
                .take(num_clicked_news_a_user)
                .map(|id| lookup(id))
                .collect::<Result<Vec<_>>>()?;
            let vector = model.user_vector(user, &clicked);
            user_vectors.insert(key.clone(), vector);
        }
        let user_vector = &user_vectors[&key];

        let scored = behavior
            .impressions
            .iter()
            .map(|id| -> Result<(String, f32)> {
                Ok((id.clone(), model.click_probability(lookup(id)?, user_vector)))
            })
            .collect::<Result<Vec<_>>>()?;

        let winners = select_from_table(&scored, news)?;
        info!(
            impression_id = %behavior.impression_id,
            candidates = scored.len(),
            categories = winners.len(),
            "Scored session"
        );
        last = Some(winners);
    }

    info!(
        users = user_vectors.len(),
        elapsed_ms = t0.elapsed().as_millis(),
        "Calculated probabilities"
    );
    Ok(last)
}

/// Run the recommendation pipeline and send the digest through `mailer`.
#[instrument(level = "info", skip_all, fields(model = %settings.recommend.model))]
pub async fn run(
    settings: &Settings,
    store: &impl ObjectStore,
    mailer: &impl Mailer,
) -> Result<RecommendReport> {
    let recommend = &settings.recommend;
    let storage = &settings.storage;

    let model = model::load_model(recommend.model, &recommend.checkpoint_dir).await?;

    let news_bytes = require_object(store, &storage.news_object).await?;
    let news = NewsTable::parse(&news_bytes, delimiter_for(&storage.news_object))?;

    let mut behaviors =
        tables::parse_behaviors(&require_object(store, &storage.behaviors_object).await?)?;
    if let Some(max) = recommend.max_sessions {
        behaviors.truncate(max);
    }

    let user2int = match store.get(&storage.user2int_object).await? {
        Some(bytes) => tables::parse_user2int(&bytes)?,
        None => {
            warn!(key = %storage.user2int_object, "No user map; every user is unknown");
            HashMap::new()
        }
    };
    let users = UserIndex::build(&behaviors, &user2int);

    let winners = score_sessions(
        &model,
        &news,
        &behaviors,
        &users,
        recommend.num_clicked_news_a_user,
    )?;

    let Some(winners) = winners else {
        warn!("No sessions to score; no email sent");
        return Ok(RecommendReport {
            sessions: 0,
            winners: CategoryWinners::default(),
            digest: None,
        });
    };

    for winner in winners.iter() {
        info!(
            category = %winner.category,
            news_id = %winner.news_id,
            probability = winner.probability,
            "Recommendation"
        );
    }

    let content = digest::render(&winners, &news)?;
    info!("Digest written; sending email");
    mailer.send(&digest::subject(local_today()), &content).await?;

    Ok(RecommendReport {
        sessions: behaviors.len(),
        winners,
        digest: Some(content),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStore;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl Mailer for RecordingMailer {
        async fn send(&self, subject: &str, body: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    const NEWS_CSV: &str = "index,date,category,url,title,body,title_google_translated,body_google_translated_distilbart_summarized\n\
N0,2026-10-15,Politics,https://a/0,t,b,Election results,Votes were counted.\n\
N1,2026-10-15,IT/Science,https://a/1,t,b,New chip,A faster chip ships.\n\
N2,2026-10-16,Politics,https://a/2,t,b,Vote reform,Reform of the vote.\n\
N3,2026-10-16,IT/Science,https://a/3,t,b,Chip shortage,Chip supply is short.\n\
N4,2026-10-16,World,https://a/4,t,b,Summit,Leaders met.\n";

    const CHECKPOINT: &str = r#"{
        "dim": 2,
        "word_embeddings": {
            "election": [1.0, 0.0],
            "vote": [2.0, 0.0],
            "chip": [0.0, 1.0]
        },
        "category_embeddings": {},
        "user_embeddings": [[0.0, 0.0], [0.0, 5.0]]
    }"#;

    fn scratch_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("newsnudge-{tag}-{}", rand::random::<u64>()))
    }

    async fn fixture(behaviors: &str) -> (Settings, LocalStore) {
        let ckpt_dir = scratch_dir("ckpt");
        std::fs::create_dir_all(&ckpt_dir).unwrap();
        std::fs::write(ckpt_dir.join("ckpt-1.json"), CHECKPOINT).unwrap();

        let store = LocalStore::open(scratch_dir("store")).await.unwrap();
        store.put("news.csv", NEWS_CSV.as_bytes()).await.unwrap();
        store.put("behaviors.tsv", behaviors.as_bytes()).await.unwrap();
        store.put("user2int.tsv", b"user\tint\nU7\t1\n").await.unwrap();

        let mut settings = Settings::default();
        settings.storage.root = store.root().to_path_buf();
        settings.recommend.checkpoint_dir = ckpt_dir;
        (settings, store)
    }

    fn cleanup(settings: &Settings) {
        let _ = std::fs::remove_dir_all(&settings.storage.root);
        let _ = std::fs::remove_dir_all(&settings.recommend.checkpoint_dir);
    }

    #[tokio::test]
    async fn test_run_mails_one_article_per_category() {
        let (settings, store) = fixture("1\tU1\t10/16/2026 7:00:00 AM\tN0\tN2 N3 N4\n").await;
        let mailer = RecordingMailer::default();

        let report = run(&settings, &store, &mailer).await.unwrap();
        assert_eq!(report.sessions, 1);
        let ids: Vec<&str> = report.winners.iter().map(|w| w.news_id.as_str()).collect();
        assert_eq!(ids, vec!["N2", "N3", "N4"]);

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0.ends_with(" Breaking News Today by NewsNudge"));
        assert!(sent[0].1.starts_with("Politics\nVote reform\nReform of the vote.\n\n"));
        cleanup(&settings);
    }

    #[tokio::test]
    async fn test_run_uses_last_session_and_long_term_interest() {
        let behaviors = "1\tU1\ttime\tN0\tN0 N2\n2\tU7\ttime\t\tN0 N1 N3\n";
        let (mut settings, store) = fixture(behaviors).await;
        settings.recommend.model = model::ModelKind::LongShortTerm;
        let mailer = RecordingMailer::default();

        let report = run(&settings, &store, &mailer).await.unwrap();
        // U7 has no clicks but a long-term taste for chips
        assert_eq!(report.winners.get("IT/Science").unwrap().news_id, "N1");
        assert_eq!(report.winners.get("Politics").unwrap().news_id, "N0");
        assert_eq!(report.sessions, 2);
        cleanup(&settings);
    }

    #[tokio::test]
    async fn test_run_aborts_on_unknown_candidate() {
        let (settings, store) = fixture("1\tU1\ttime\tN0\tN2 N99\n").await;
        let mailer = RecordingMailer::default();

        let err = run(&settings, &store, &mailer).await.unwrap_err();
        assert!(matches!(err, NewsError::Integrity(_)));
        assert!(mailer.sent.lock().unwrap().is_empty());
        cleanup(&settings);
    }

    #[tokio::test]
    async fn test_run_without_sessions_sends_nothing() {
        let (settings, store) = fixture("").await;
        let mailer = RecordingMailer::default();

        let report = run(&settings, &store, &mailer).await.unwrap();
        assert!(report.digest.is_none());
        assert!(mailer.sent.lock().unwrap().is_empty());
        cleanup(&settings);
    }
}
