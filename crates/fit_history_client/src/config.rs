use crate::FitError;
use secrecy::SecretString;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";
pub const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080/oauth2/callback";
pub const DEFAULT_LOOKBACK_DAYS: u32 = 10;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug)]
pub struct Config {
    pub client_id: String,
    pub client_secret: Option<SecretString>,
    pub access_token: Option<SecretString>,
    pub base_url: String,
    pub auth_url: String,
    pub token_url: String,
    pub tokeninfo_url: String,
    pub redirect_uri: String,
    /// Package of this application's own sessions, used when a read is not
    /// allowed to see other applications' sessions.
    pub app_package: Option<String>,
    pub lookback_days: u32,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, FitError> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Testable helper that reads configuration values using the provided
    /// function, so tests never touch the process environment.
    pub fn from_env_with<F>(mut get: F) -> Result<Self, FitError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let client_id = get("FIT_HISTORY_CLIENT_ID")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| FitError::Config("FIT_HISTORY_CLIENT_ID missing".into()))?;
        let client_secret = get("FIT_HISTORY_CLIENT_SECRET").map(|s| SecretString::new(s.into()));
        let access_token = get("FIT_HISTORY_ACCESS_TOKEN")
            .filter(|v| !v.is_empty())
            .map(|s| SecretString::new(s.into()));
        let base_url = get("FIT_HISTORY_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let auth_url = get("FIT_HISTORY_AUTH_URL").unwrap_or_else(|| DEFAULT_AUTH_URL.into());
        let token_url = get("FIT_HISTORY_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.into());
        let tokeninfo_url =
            get("FIT_HISTORY_TOKENINFO_URL").unwrap_or_else(|| DEFAULT_TOKENINFO_URL.into());
        let redirect_uri =
            get("FIT_HISTORY_REDIRECT_URI").unwrap_or_else(|| DEFAULT_REDIRECT_URI.into());
        let app_package = get("FIT_HISTORY_APP_PACKAGE").filter(|v| !v.is_empty());
        let lookback_days = parse_or(
            get("FIT_HISTORY_LOOKBACK_DAYS"),
            "FIT_HISTORY_LOOKBACK_DAYS",
            DEFAULT_LOOKBACK_DAYS,
        )?;
        let timeout_secs = parse_or(
            get("FIT_HISTORY_TIMEOUT_SECS"),
            "FIT_HISTORY_TIMEOUT_SECS",
            DEFAULT_TIMEOUT_SECS,
        )?;
        Ok(Self {
            client_id,
            client_secret,
            access_token,
            base_url,
            auth_url,
            token_url,
            tokeninfo_url,
            redirect_uri,
            app_package,
            lookback_days,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    key: &str,
    default: T,
) -> Result<T, FitError> {
    match raw {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| FitError::Config(format!("{key} is not a valid number: {v}"))),
    }
}
