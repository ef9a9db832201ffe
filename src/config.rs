//! Configuration module for the brs-marks application.
//!
//! Values come from, in increasing priority: built-in defaults, an optional
//! `brs-marks.toml` next to the working directory, and `BRS_`-prefixed
//! environment variables (a `.env` file is loaded into the environment first).

use anyhow::Context;
use custom_debug_derive::Debug;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use fundu::{DurationParser, TimeUnit};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::brs::api::DEFAULT_BRS_BASE_URL;
use crate::sheets::api::{DEFAULT_SHEETS_BASE_URL, SheetsAuth};

pub const CONFIG_FILE: &str = "brs-marks.toml";
pub const ENV_PREFIX: &str = "BRS_";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Log level for this crate's targets; other crates log at `warn`.
    pub log_level: String,
    /// Base URL of the BRS portal, e.g. `https://brs.urfu.ru/mvc/`.
    pub portal_url: String,
    /// Portal login, used to scope cached data to one teacher.
    pub login: String,
    /// Value of the portal's `JSESSIONID` cookie.
    #[debug(skip)]
    pub session_id: Option<String>,
    pub sheets_url: String,
    #[debug(skip)]
    pub sheets_api_key: Option<String>,
    #[debug(skip)]
    pub sheets_access_token: Option<String>,
    /// Per-request HTTP timeout, e.g. "30s" or "2m".
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub request_timeout: Duration,
    /// Groups taking longer than this are logged as slow.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub slow_threshold: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            portal_url: DEFAULT_BRS_BASE_URL.to_string(),
            login: String::new(),
            session_id: None,
            sheets_url: DEFAULT_SHEETS_BASE_URL.to_string(),
            sheets_api_key: None,
            sheets_access_token: None,
            request_timeout: Duration::from_secs(30),
            slow_threshold: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load from the default file and the process environment.
    pub fn load() -> anyhow::Result<Self> {
        Self::figment(CONFIG_FILE)
            .extract()
            .context("Failed to load config")
    }

    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// The portal session id, required for anything that talks to BRS.
    pub fn require_session_id(&self) -> anyhow::Result<&str> {
        self.session_id
            .as_deref()
            .map(str::trim)
            .filter(|sid| !sid.is_empty())
            .with_context(|| format!("{ENV_PREFIX}SESSION_ID is not set"))
    }

    /// Sheets credentials; an access token takes precedence over an API key.
    pub fn sheets_auth(&self) -> anyhow::Result<SheetsAuth> {
        if let Some(token) = self.sheets_access_token.as_ref().filter(|t| !t.is_empty()) {
            return Ok(SheetsAuth::AccessToken(token.clone()));
        }
        if let Some(key) = self.sheets_api_key.as_ref().filter(|k| !k.is_empty()) {
            return Ok(SheetsAuth::ApiKey(key.clone()));
        }
        anyhow::bail!(
            "neither {ENV_PREFIX}SHEETS_ACCESS_TOKEN nor {ENV_PREFIX}SHEETS_API_KEY is set"
        )
    }
}

fn duration_parser() -> DurationParser<'static> {
    DurationParser::with_time_units(&[
        TimeUnit::MilliSecond,
        TimeUnit::Second,
        TimeUnit::Minute,
        TimeUnit::Hour,
    ])
}

/// Parse "30s", "2m", "1500ms"; a bare number means seconds.
pub fn parse_duration(input: &str) -> anyhow::Result<Duration> {
    let parsed = duration_parser()
        .parse(input.trim())
        .map_err(|e| anyhow::anyhow!("invalid duration '{input}': {e}"))?;
    Duration::try_from(parsed).map_err(|e| anyhow::anyhow!("invalid duration '{input}': {e}"))
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format!("{}ms", duration.as_millis()))
}
