//! Command-line interface definitions for NewsNudge.
//!
//! Secrets are taken from flags or environment variables and never from the
//! YAML configuration file.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Settings;

/// Command-line arguments for NewsNudge.
///
/// # Examples
///
/// ```sh
/// # Crawl, translate and append today's top articles
/// HF_API_TOKEN=hf_xxx newsnudge ingest
///
/// # Score the candidates and mail the digest
/// SMTP_USERNAME=me@example.com SMTP_PASSWORD=xxxx newsnudge -c newsnudge.yaml recommend
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the persisted tables (overrides the config file)
    #[arg(short, long, global = true, env = "NEWSNUDGE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Crawl the top article of every section and append it to the dataset
    Ingest(IngestArgs),
    /// Rank the candidates per category and send the email digest
    Recommend(RecommendArgs),
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Token for the summarization API
    #[arg(long, env = "HF_API_TOKEN")]
    pub hf_api_token: Option<String>,

    /// Also rewrite the behaviors impressions with every dataset id
    #[arg(long)]
    pub refresh_impressions: bool,
}

#[derive(Args, Debug)]
pub struct RecommendArgs {
    /// SMTP login, also the default sender and recipient
    #[arg(long, env = "SMTP_USERNAME")]
    pub smtp_username: Option<String>,

    /// SMTP password (app password)
    #[arg(long, env = "SMTP_PASSWORD")]
    pub smtp_password: Option<String>,

    /// Recipient address (overrides the config file)
    #[arg(long)]
    pub to: Option<String>,

    /// Stop after this many behavior rows
    #[arg(long)]
    pub max_sessions: Option<usize>,

    /// Log the digest instead of sending it
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    /// Fold flag and environment overrides into the loaded settings.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(dir) = &self.data_dir {
            settings.storage.root = dir.clone();
        }
        match &self.command {
            Command::Ingest(args) => {
                if args.hf_api_token.is_some() {
                    settings.ingest.summarizer_token = args.hf_api_token.clone();
                }
                if args.refresh_impressions {
                    settings.ingest.refresh_impressions = true;
                }
            }
            Command::Recommend(args) => {
                if args.smtp_username.is_some() {
                    settings.email.username = args.smtp_username.clone();
                }
                if args.smtp_password.is_some() {
                    settings.email.password = args.smtp_password.clone();
                }
                if args.to.is_some() {
                    settings.email.to = args.to.clone();
                }
                if args.max_sessions.is_some() {
                    settings.recommend.max_sessions = args.max_sessions;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing_ingest() {
        let cli = Cli::parse_from([
            "newsnudge",
            "--data-dir",
            "/tmp/news",
            "ingest",
            "--hf-api-token",
            "hf_test",
            "--refresh-impressions",
        ]);

        let mut settings = Settings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.storage.root, PathBuf::from("/tmp/news"));
        assert_eq!(settings.ingest.summarizer_token.as_deref(), Some("hf_test"));
        assert!(settings.ingest.refresh_impressions);
    }

    #[test]
    fn test_cli_parsing_recommend() {
        let cli = Cli::parse_from([
            "newsnudge",
            "recommend",
            "-c",
            "newsnudge.yaml",
            "--to",
            "reader@example.com",
            "--max-sessions",
            "2",
            "--dry-run",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("newsnudge.yaml")));
        let Command::Recommend(ref args) = cli.command else {
            panic!("expected recommend subcommand");
        };
        assert!(args.dry_run);

        let mut settings = Settings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.email.to.as_deref(), Some("reader@example.com"));
        assert_eq!(settings.recommend.max_sessions, Some(2));
    }
}
