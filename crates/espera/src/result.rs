//! Result and error types for Espera.

use std::time::Duration;
use thiserror::Error;

/// Result type for Espera operations
pub type EsperaResult<T> = Result<T, EsperaError>;

/// Errors that can occur while waiting on or interacting with elements
#[derive(Debug, Error)]
pub enum EsperaError {
    /// A poll loop never observed a truthy predicate before its deadline
    #[error("Timed out after {elapsed:?} (timeout {timeout:?}) waiting for {waited_for}")]
    DeadlineExceeded {
        /// Description of the condition that was polled
        waited_for: String,
        /// Configured timeout for the wait
        timeout: Duration,
        /// Wall-clock time actually spent polling
        elapsed: Duration,
    },

    /// The driver could not locate any element at the moment of the query
    #[error("No element found for {locator}")]
    NotFound {
        /// Rendered locator that failed to match
        locator: String,
    },

    /// Programmer error: unregistered element kind, malformed locator, bad settings
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// A previously resolved element is no longer attached to the document
    #[error("Stale element reference: {element}")]
    StaleReference {
        /// Raw element id that went stale
        element: String,
    },

    /// Unexpected driver failure, never retried
    #[error("Driver error: {message}")]
    Driver {
        /// Error message
        message: String,
    },

    /// Settings file could not be parsed
    #[error("YAML error: {message}")]
    Yaml {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EsperaError {
    /// Build a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Build a driver error
    #[must_use]
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// Whether a poll loop treats this error as "not yet ready"
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::StaleReference { .. })
    }

    /// Whether this is a missing-element error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this is a deadline failure
    #[must_use]
    pub const fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }
}
