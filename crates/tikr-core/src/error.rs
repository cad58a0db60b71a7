//! Error types for the statements pipeline.
//!
//! This module defines [`TikrError`], one variant per failure kind a caller has
//! to tell apart, and [`ErrorKind`], a field-less mirror used for reporting and
//! for recording per-statement failures.

use std::fmt;

use thiserror::Error;

/// Errors that can occur while resolving, fetching, normalizing or exporting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TikrError {
    /// The ticker failed local validation; no network call was made.
    #[error("Invalid ticker {ticker:?}: {reason}")]
    InvalidTicker {
        /// The rejected input.
        ticker: String,
        /// Why it was rejected.
        reason: String,
    },

    /// No usable credential could be produced.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The interactive login path is unavailable and no token was injected.
    #[error("A manually supplied access token is required: {0}")]
    ManualTokenRequired(String),

    /// The search endpoint returned no plausible match for the ticker.
    #[error("Company not found: {0}")]
    CompanyNotFound(String),

    /// The provider kept failing after the retry budget was spent.
    #[error("Upstream unavailable after {attempts} attempt(s): {cause}")]
    UpstreamUnavailable {
        /// Number of requests issued.
        attempts: u32,
        /// Last failure observed.
        cause: String,
    },

    /// A successful response was empty, malformed, or lacked required fields.
    #[error("Incomplete data: {0}")]
    DataIncomplete(String),

    /// Building or writing the workbook failed.
    #[error("Export failed: {0}")]
    Export(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The credential artifact could not be read or written.
    #[error("Token store error: {0}")]
    Store(String),
}

impl TikrError {
    /// Shorthand for [`TikrError::InvalidTicker`].
    pub fn invalid_ticker(ticker: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTicker {
            ticker: ticker.into(),
            reason: reason.into(),
        }
    }

    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTicker { .. } => ErrorKind::InvalidTicker,
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::ManualTokenRequired(_) => ErrorKind::ManualTokenRequired,
            Self::CompanyNotFound(_) => ErrorKind::CompanyNotFound,
            Self::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            Self::DataIncomplete(_) => ErrorKind::DataIncomplete,
            Self::Export(_) => ErrorKind::Export,
            Self::Config(_) => ErrorKind::Config,
            Self::Store(_) => ErrorKind::Store,
        }
    }

    /// Returns true if a pipeline may continue with other statements after this error.
    ///
    /// Only per-statement retrieval failures are recoverable; validation,
    /// resolution and credential errors abort the run.
    #[must_use]
    pub const fn is_statement_local(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable { .. } | Self::DataIncomplete(_)
        )
    }
}

/// Field-less discriminant of [`TikrError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`TikrError::InvalidTicker`].
    InvalidTicker,
    /// See [`TikrError::Authentication`].
    Authentication,
    /// See [`TikrError::ManualTokenRequired`].
    ManualTokenRequired,
    /// See [`TikrError::CompanyNotFound`].
    CompanyNotFound,
    /// See [`TikrError::UpstreamUnavailable`].
    UpstreamUnavailable,
    /// See [`TikrError::DataIncomplete`].
    DataIncomplete,
    /// See [`TikrError::Export`].
    Export,
    /// See [`TikrError::Config`].
    Config,
    /// See [`TikrError::Store`].
    Store,
}

impl ErrorKind {
    /// Stable name used in reports.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidTicker => "InvalidTickerError",
            Self::Authentication => "AuthenticationError",
            Self::ManualTokenRequired => "ManualTokenRequired",
            Self::CompanyNotFound => "CompanyNotFoundError",
            Self::UpstreamUnavailable => "UpstreamUnavailableError",
            Self::DataIncomplete => "DataIncompleteError",
            Self::Export => "ExportError",
            Self::Config => "ConfigError",
            Self::Store => "StoreError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type alias using [`TikrError`].
pub type Result<T> = std::result::Result<T, TikrError>;
