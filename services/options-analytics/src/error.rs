//! Error types for the options analytics core

use thiserror::Error;

/// Analytics error types
#[derive(Error, Debug)]
pub enum AnalyticsError {
    /// Expiry is in the past or already settled
    #[error("Expiry date {expiry} is in the past")]
    InvalidExpiry {
        /// The expiry string as supplied by the caller
        expiry: String,
    },

    /// Expiry string matches none of the accepted formats
    #[error("Invalid expiry date format: {input}. Expected 'DD-MMM-YYYY' or 'YYYY-MM-DD'")]
    InvalidDateFormat {
        /// The unparseable input
        input: String,
    },

    /// Option type token is not a call or put
    #[error("Invalid option type: {token}. Expected CE/CALL or PE/PUT")]
    InvalidOptionType {
        /// The unrecognised token
        token: String,
    },

    /// Numeric input outside its domain
    #[error("Invalid input: {reason}")]
    InvalidInput {
        /// Why the input was rejected
        reason: String,
    },

    /// Live data source failed or is not configured
    #[error("Data source unavailable: {reason}")]
    SourceUnavailable {
        /// What went wrong with the source
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration {
        /// Configuration error message detailing what went wrong
        message: String,
    },

    /// HTTP transport error from a live source
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Instrument dump parsing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl AnalyticsError {
    /// Shorthand for a source failure
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            reason: reason.into(),
        }
    }

    /// Shorthand for a rejected numeric input
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }
}

/// Type alias for analytics results
pub type AnalyticsResult<T> = Result<T, AnalyticsError>;
