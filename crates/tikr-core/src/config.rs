//! Runtime configuration.
//!
//! [`TikrConfig::from_env`] loads a `.env` file when present and reads the
//! `TIKR_*` variables. [`TikrConfig::from_lookup`] takes any key lookup so the
//! parsing can be exercised without touching the process environment.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, TikrError};

/// Default company search endpoint (public search index).
pub const DEFAULT_SEARCH_URL: &str = "https://tjpay1dyt8-3.algolianet.com/1/indexes/tikr-feb/query\
?x-algolia-agent=Algolia%20for%20JavaScript%20(3.35.1)%3B%20Browser%20(lite)\
&x-algolia-application-id=TJPAY1DYT8&x-algolia-api-key=d88ea2aa3c22293c96736f5ceb5bab4e";

/// Default financial statements endpoint.
pub const DEFAULT_FINANCIALS_URL: &str =
    "https://oljizlzlsa.execute-api.us-east-1.amazonaws.com/prod/fin";

/// Default directory for workbooks and the cached token.
pub const DEFAULT_OUTPUT_DIR: &str = "outputs";

/// File name of the cached token inside the output directory.
pub const TOKEN_FILE_NAME: &str = "token.tmp";

/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Provider endpoint URLs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    /// Company search endpoint.
    pub search_url: String,
    /// Financial statements endpoint.
    pub financials_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            search_url: DEFAULT_SEARCH_URL.to_string(),
            financials_url: DEFAULT_FINANCIALS_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Points both endpoints at one base URL (used with mock servers).
    #[must_use]
    pub fn with_base_url(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            search_url: format!("{base}/search"),
            financials_url: format!("{base}/fin"),
        }
    }
}

/// Pipeline configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TikrConfig {
    /// Account email for the login collaborator.
    pub email: Option<String>,
    /// Account password for the login collaborator.
    pub password: Option<String>,
    /// Externally supplied access token, used before anything else.
    pub injected_token: Option<String>,
    /// Running where interactive login is unavailable.
    pub deployment: bool,
    /// Where workbooks are written.
    pub output_dir: PathBuf,
    /// Where the credential artifact lives.
    pub token_path: PathBuf,
    /// Fetch the live market snapshot.
    pub include_live_data: bool,
    /// Verbose logging.
    pub debug: bool,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Provider URLs.
    pub endpoints: Endpoints,
}

impl Default for TikrConfig {
    fn default() -> Self {
        let output_dir = PathBuf::from(DEFAULT_OUTPUT_DIR);
        Self {
            email: None,
            password: None,
            injected_token: None,
            deployment: false,
            token_path: output_dir.join(TOKEN_FILE_NAME),
            output_dir,
            include_live_data: true,
            debug: false,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            endpoints: Endpoints::default(),
        }
    }
}

impl TikrConfig {
    /// Loads configuration from the environment, reading `.env` if it exists.
    ///
    /// # Errors
    /// Returns [`TikrError::Config`] if a variable is present but malformed.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from a key lookup.
    ///
    /// # Errors
    /// Returns [`TikrError::Config`] if a variable is present but malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let output_dir = get("TIKR_OUTPUT_DIR").map_or(defaults.output_dir, PathBuf::from);
        let token_path = get("TIKR_TOKEN_PATH")
            .map_or_else(|| output_dir.join(TOKEN_FILE_NAME), PathBuf::from);
        let request_timeout = match get("TIKR_REQUEST_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(raw.parse().map_err(|_| {
                TikrError::Config(format!(
                    "TIKR_REQUEST_TIMEOUT_SECS must be whole seconds, got {raw:?}"
                ))
            })?),
            None => defaults.request_timeout,
        };

        Ok(Self {
            email: get("TIKR_EMAIL"),
            password: get("TIKR_PASSWORD"),
            injected_token: get("TIKR_ACCESS_TOKEN"),
            deployment: parse_flag("DEPLOYMENT", get("DEPLOYMENT"), false)?,
            output_dir,
            token_path,
            include_live_data: parse_flag(
                "TIKR_INCLUDE_LIVE_DATA",
                get("TIKR_INCLUDE_LIVE_DATA"),
                true,
            )?,
            debug: parse_flag("TIKR_DEBUG", get("TIKR_DEBUG"), false)?,
            request_timeout,
            endpoints: defaults.endpoints,
        })
    }

    /// Returns true if both login credentials are configured.
    #[must_use]
    pub const fn has_login(&self) -> bool {
        self.email.is_some() && self.password.is_some()
    }

    /// Sets the endpoints.
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Sets the output directory and moves the token file with it.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self.token_path = self.output_dir.join(TOKEN_FILE_NAME);
        self
    }
}

fn parse_flag(key: &str, value: Option<String>, default: bool) -> Result<bool> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(TikrError::Config(format!(
            "{key} must be a boolean, got {value:?}"
        ))),
    }
}

impl fmt::Debug for TikrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("TikrConfig")
            .field("email", &self.email)
            .field("password", &redact(&self.password))
            .field("injected_token", &redact(&self.injected_token))
            .field("deployment", &self.deployment)
            .field("output_dir", &self.output_dir)
            .field("token_path", &self.token_path)
            .field("include_live_data", &self.include_live_data)
            .field("debug", &self.debug)
            .field("request_timeout", &self.request_timeout)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}
