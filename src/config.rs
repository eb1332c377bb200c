//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! The access token is wrapped in secrecy::SecretString to prevent log leaks.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct Config {
    /// Base URL of the Pixelfed instance, e.g. "https://pixelfed.social".
    pub instance_url: String,
    /// OAuth bearer token for the instance.
    pub access_token: SecretString,
    /// Directory to watch for new images.
    pub watch_dir: PathBuf,
    /// Text appended to every post caption.
    pub default_post_text: String,
    /// License text appended to every post caption.
    pub cc_license: String,
    /// Path to the durable queue document. Defaults to a dotfile
    /// inside the watch directory.
    queue_file: Option<PathBuf>,
    /// How often the control loop drains the queue.
    pub poll_interval: Duration,
    /// Pause after a file-creation event before the file is read,
    /// so partially written files are not picked up.
    pub settle_delay: Duration,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let instance_url = required_var("PIXELFED_INSTANCE_URL")?
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            instance_url,
            access_token: SecretString::from(required_var("PIXELFED_ACCESS_TOKEN")?),
            watch_dir: PathBuf::from(
                std::env::var("WATCH_FOLDER").unwrap_or_else(|_| "./watch".to_string()),
            ),
            default_post_text: std::env::var("DEFAULT_POST_TEXT").unwrap_or_default(),
            cc_license: std::env::var("CC_LICENSE").unwrap_or_default(),
            queue_file: std::env::var("QUEUE_FILE").ok().map(PathBuf::from),
            poll_interval: Duration::from_secs(parsed_var("POLL_INTERVAL_SECS", 2)?),
            settle_delay: Duration::from_millis(parsed_var("SETTLE_DELAY_MS", 1000)?),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Where the queue document lives.
    pub fn queue_path(&self) -> PathBuf {
        self.queue_file
            .clone()
            .unwrap_or_else(|| self.watch_dir.join(".upload_queue.json"))
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn parsed_var(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("{name} must be a non-negative integer: {raw}"))),
        Err(_) => Ok(default),
    }
}
