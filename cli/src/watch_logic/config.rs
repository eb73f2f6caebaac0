use anyhow::{Context, Result};
use clap::Parser;
use lib_livefeed::FeedConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_CONFIG_FILE: &str = "feed_watch.json5";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Follows a live feed and prints new messages as they arrive", version)]
#[serde(rename_all = "camelCase")]
pub struct Args {
    #[clap(long, env = "FEED_CONFIG_PATH", help = "Path to the JSON5 configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "FEED_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "FEED_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "FEED_BASE_URL", help = "Base URL of the REST endpoints.")]
    pub base_url: Option<String>,

    #[clap(long, env = "FEED_PUSH_URL", help = "WebSocket URL of the push channel.")]
    pub push_url: Option<String>,

    #[clap(long, env = "FEED_POLL_INTERVAL_MS", help = "Poll cadence in milliseconds while push is unavailable.")]
    pub poll_interval_ms: Option<u64>,

    #[clap(long, env = "FEED_BUFFER_CAPACITY", help = "How many of the newest messages to keep.")]
    pub buffer_capacity: Option<usize>,

    #[clap(long, env = "FEED_PUSH_CONNECT_TIMEOUT_MS", help = "Push handshake timeout in milliseconds.")]
    pub push_connect_timeout_ms: Option<u64>,

    #[clap(long, env = "FEED_PUSH_REPROBE_INTERVAL_MS", help = "Retry push this often while polling. Off when unset.")]
    pub push_reprobe_interval_ms: Option<u64>,

    #[clap(long, env = "FEED_HTTP_MAX_RETRIES", help = "Retries for transient HTTP failures.")]
    pub http_max_retries: Option<u32>,

    #[clap(long, env = "FEED_HTTP_TIMEOUT_MS", help = "Per-request HTTP timeout in milliseconds.")]
    pub http_timeout_ms: Option<u64>,

    #[clap(long, env = "FEED_AUTH_TOKEN", help = "Bearer token sent with REST calls.")]
    pub auth_token: Option<String>,

    #[clap(long = "view", value_name = "ENTITY", help = "Register a view on this entity after start. Repeatable.")]
    #[serde(skip)]
    pub views: Vec<String>,
}

impl Args {
    // Fields set here override the ones already in `feed`.
    fn apply_to(&self, feed: &mut FeedConfig) {
        if let Some(v) = &self.base_url {
            feed.base_url = v.clone();
        }
        if let Some(v) = &self.push_url {
            feed.push_url = v.clone();
        }
        if let Some(v) = self.poll_interval_ms {
            feed.poll_interval_ms = v;
        }
        if let Some(v) = self.buffer_capacity {
            feed.buffer_capacity = v;
        }
        if let Some(v) = self.push_connect_timeout_ms {
            feed.push_connect_timeout_ms = v;
        }
        if let Some(v) = self.push_reprobe_interval_ms {
            feed.push_reprobe_interval_ms = Some(v);
        }
        if let Some(v) = self.http_max_retries {
            feed.http_max_retries = v;
        }
        if let Some(v) = self.http_timeout_ms {
            feed.http_timeout_ms = v;
        }
        if let Some(v) = &self.auth_token {
            feed.auth_token = Some(v.clone());
        }
    }
}

/// Everything `feed_watch` needs after layering.
#[derive(Debug, Clone)]
pub struct Settings {
    pub feed: FeedConfig,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub views: Vec<String>,
}

pub fn load_settings() -> Result<Settings> {
    resolve(Args::parse())
}

/// Defaults, then the config file (if present), then env/CLI.
pub fn resolve(args: Args) -> Result<Settings> {
    // 1. Defaults, or the config file layered over them
    let config_file_path = args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut feed = if config_file_path.exists() {
        FeedConfig::from_file(&config_file_path)
            .with_context(|| format!("Invalid config file {}", config_file_path.display()))?
    } else {
        // Only an explicitly named file is required to exist.
        if args.config_path.is_some() {
            anyhow::bail!("Config file not found: {}", config_file_path.display());
        }
        FeedConfig::default()
    };

    // 2. Environment variables and CLI arguments
    args.apply_to(&mut feed);
    feed.validate().context("Invalid feed configuration")?;

    Ok(Settings {
        feed,
        log_dir: args.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
        log_level: args.log_level.unwrap_or_else(|| "info".to_string()),
        views: args.views,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_file_or_flags() {
        let settings = resolve(Args {
            config_path: None,
            ..Args::default()
        })
        .unwrap();
        assert_eq!(settings.feed, FeedConfig::default());
        assert_eq!(settings.log_level, "info");
        assert!(settings.views.is_empty());
    }

    #[test]
    fn flags_override_file_which_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{ pollIntervalMs: 500, bufferCapacity: 50, }}").unwrap();

        let settings = resolve(Args {
            config_path: Some(file.path().to_path_buf()),
            buffer_capacity: Some(20),
            views: vec!["ad-1".into()],
            ..Args::default()
        })
        .unwrap();

        assert_eq!(settings.feed.poll_interval_ms, 500);
        assert_eq!(settings.feed.buffer_capacity, 20);
        assert_eq!(settings.feed.push_connect_timeout_ms, 5000);
        assert_eq!(settings.views, vec!["ad-1"]);
    }

    #[test]
    fn named_but_missing_file_is_an_error() {
        let args = Args {
            config_path: Some(PathBuf::from("/definitely/not/here.json5")),
            ..Args::default()
        };
        assert!(resolve(args).is_err());
    }

    #[test]
    fn invalid_override_is_rejected() {
        let args = Args {
            poll_interval_ms: Some(0),
            ..Args::default()
        };
        assert!(resolve(args).is_err());
    }
}
