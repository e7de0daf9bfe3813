//! Configuration module for environment variable parsing.
//!
//! Configuration is read once at startup into an immutable [`Config`] and
//! passed by reference to every component. Nothing else reads the process
//! environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::HeaderValue;
use thiserror::Error;
use url::Url;

/// Variables that must be present (and non-empty) before any network call.
pub const REQUIRED_VARS: &[&str] = &[
    "JELLYFIN_API_URL",
    "JELLYFIN_API_TOKEN",
    "SENDER_EMAIL",
    "SENDER_PASSWORD",
    "RECIPIENT_EMAILS",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variables not set: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// SMTP session settings used by the dispatcher.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// SMTP server hostname
    pub host: String,
    /// SMTP server port (STARTTLS submission, 587 by default)
    pub port: u16,
    /// Sender address, also the login username
    pub sender: String,
    /// Sender password
    pub password: String,
    /// Every address that receives the digest
    pub recipients: Vec<String>,
    /// Subject line
    pub subject: String,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Jellyfin "latest items" endpoint, e.g. `http://host:8096/Users/<id>/Items/Latest`
    pub api_url: String,

    /// Static API token sent as `Authorization: MediaBrowser Token=<token>`
    pub api_token: String,

    /// Link to the Jellyfin web front end placed in the email header
    pub web_url: String,

    /// Root directory holding the `posters/` and `logos/` caches
    pub cache_dir: PathBuf,

    /// HTTP request timeout in milliseconds
    pub request_timeout_ms: u64,

    pub smtp: SmtpConfig,
}

impl Config {
    /// Load configuration from the process environment, honoring a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// Empty values are treated the same as unset ones.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let recipients = get("RECIPIENT_EMAILS")
            .map(|raw| parse_csv(&raw))
            .unwrap_or_default();

        let missing: Vec<&'static str> = REQUIRED_VARS
            .iter()
            .copied()
            .filter(|name| match *name {
                "RECIPIENT_EMAILS" => recipients.is_empty(),
                other => get(other).is_none(),
            })
            .collect();

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        // Presence was checked above.
        let api_url = get("JELLYFIN_API_URL").unwrap_or_default();
        let api_token = get("JELLYFIN_API_TOKEN").unwrap_or_default();

        Url::parse(&api_url).map_err(|e| ConfigError::Invalid {
            name: "JELLYFIN_API_URL",
            reason: e.to_string(),
        })?;

        HeaderValue::from_str(&authorization_value(&api_token)).map_err(|e| {
            ConfigError::Invalid {
                name: "JELLYFIN_API_TOKEN",
                reason: e.to_string(),
            }
        })?;

        Ok(Config {
            api_url,
            api_token,

            web_url: get("JELLYFIN_WEB_URL")
                .unwrap_or_else(|| "http://localhost:8096/web/index.html".to_string()),

            cache_dir: get("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("cache")),

            request_timeout_ms: parse_number(get("REQUEST_TIMEOUT_MS"), "REQUEST_TIMEOUT_MS", 10_000)?,

            smtp: SmtpConfig {
                host: get("SMTP_SERVER").unwrap_or_else(|| "smtp.gmail.com".to_string()),
                port: parse_number(get("SMTP_PORT"), "SMTP_PORT", 587)?,
                sender: get("SENDER_EMAIL").unwrap_or_default(),
                password: get("SENDER_PASSWORD").unwrap_or_default(),
                recipients,
                subject: get("EMAIL_SUBJECT").unwrap_or_else(|| "Now on Jellyfin!".to_string()),
            },
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Value of the `Authorization` header sent to Jellyfin.
    pub fn authorization(&self) -> String {
        authorization_value(&self.api_token)
    }
}

fn authorization_value(token: &str) -> String {
    format!("MediaBrowser Token={}", token)
}

fn parse_number<T: std::str::FromStr>(
    raw: Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: format!("{v:?}: {e}"),
        }),
    }
}

/// Parse a comma-separated list of strings.
fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
