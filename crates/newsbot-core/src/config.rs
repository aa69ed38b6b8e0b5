use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{errors::Error, reconcile::RetryPolicy, Result};

/// Env var holding the credentials document when no file is present.
/// The dotted name matches what hosting platforms were given historically.
pub const INFO_ENV_VAR: &str = "info.json";
pub const INFO_ENV_VAR_ALT: &str = "NEWSBOT_INFO_JSON";
pub const DEFAULT_INFO_PATH: &str = "info.json";

/// The credentials document (`info.json`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub discord: DiscordCredentials,
    pub twitter: TwitterCredentials,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordCredentials {
    pub bot_token: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwitterCredentials {
    pub api_key: String,
    pub api_secret_key: String,
    pub access_token: String,
    pub access_token_secret: String,
}

impl Credentials {
    pub fn parse(raw: &str) -> Result<Self> {
        let creds: Credentials = serde_json::from_str(raw)?;
        creds.validate()?;
        Ok(creds)
    }

    fn validate(&self) -> Result<()> {
        let required = [
            ("discord.botToken", &self.discord.bot_token),
            ("twitter.apiKey", &self.twitter.api_key),
            ("twitter.apiSecretKey", &self.twitter.api_secret_key),
            ("twitter.accessToken", &self.twitter.access_token),
            ("twitter.accessTokenSecret", &self.twitter.access_token_secret),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }

    /// Read the document from `path`, or from the environment if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let raw = fs::read_to_string(path)?;
            return Self::parse(&raw);
        }

        let raw = env_str(INFO_ENV_VAR)
            .or_else(|| env_str(INFO_ENV_VAR_ALT))
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config(format!(
                    "{} must exist, or the {INFO_ENV_VAR} config var must be set",
                    path.display()
                ))
            })?;
        Self::parse(&raw)
    }

    /// Single-line JSON suitable for an environment variable value.
    pub fn to_compact_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Typed configuration for the relay.
#[derive(Clone, Debug)]
pub struct Config {
    pub credentials: Credentials,

    /// Category is named "<label> For <account>".
    pub category_label: String,
    pub content_domain: String,

    /// Items fetched for a list that has nothing delivered yet.
    pub backfill_count: u32,
    pub drain_retry_delay: Duration,
    pub channel_create_retry: RetryPolicy,
    /// Added to the content platform's reset time before the next cycle.
    pub reschedule_margin: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let info_path = env_path("NEWSBOT_INFO_PATH").unwrap_or_else(info_path_default);
        let credentials = Credentials::load(&info_path)?;

        let mut cfg = Self::with_credentials(credentials);

        if let Some(label) = env_str("NEWSBOT_CATEGORY_LABEL").and_then(non_empty) {
            cfg.category_label = label;
        }
        if let Some(domain) = env_str("NEWSBOT_CONTENT_DOMAIN").and_then(non_empty) {
            cfg.content_domain = domain;
        }
        if let Some(n) = env_u32("NEWSBOT_BACKFILL_COUNT") {
            cfg.backfill_count = n.clamp(1, 200);
        }
        if let Some(s) = env_u64("NEWSBOT_DRAIN_RETRY_SECS") {
            cfg.drain_retry_delay = Duration::from_secs(s);
        }
        if let Some(s) = env_u64("NEWSBOT_CHANNEL_CREATE_RETRY_SECS") {
            cfg.channel_create_retry.delay = Duration::from_secs(s);
        }
        if let Some(n) = env_u32("NEWSBOT_CHANNEL_CREATE_MAX_ATTEMPTS") {
            cfg.channel_create_retry.max_attempts = n;
        }
        if let Some(s) = env_u64("NEWSBOT_RESCHEDULE_MARGIN_SECS") {
            cfg.reschedule_margin = Duration::from_secs(s);
        }

        Ok(cfg)
    }

    /// Defaults for everything except credentials.
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            credentials,
            category_label: "Twitter".to_string(),
            content_domain: crate::formatting::DEFAULT_CONTENT_DOMAIN.to_string(),
            backfill_count: 100,
            drain_retry_delay: crate::dispatch::DEFAULT_DRAIN_RETRY_DELAY,
            channel_create_retry: RetryPolicy::default(),
            reschedule_margin: Duration::from_secs(1),
        }
    }

}

/// Category that holds the relay's channels: "<label> For <account>".
pub fn category_name(label: &str, account: &str) -> String {
    format!("{label} For {account}")
}

fn info_path_default() -> PathBuf {
    PathBuf::from(DEFAULT_INFO_PATH)
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
