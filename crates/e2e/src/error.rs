//! Error types for scenario runs

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Timeout after {duration:?} waiting for: {what}")]
    Timeout { what: String, duration: Duration },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Action resolution failed for '{instruction}': {reason}")]
    ActionResolution { instruction: String, reason: String },

    #[error("No observed action to perform; add an observe step first")]
    NoPendingAction,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Playwright bridge exited: {0}")]
    BridgeClosed(String),

    #[error("Scenario parse error: {0}")]
    SpecParse(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl E2eError {
    /// Shorthand for a timeout on a named wait.
    pub fn timeout(what: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            duration,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
