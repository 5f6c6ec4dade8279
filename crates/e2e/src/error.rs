//! Error types for E2E scenarios

use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    /// A required credential or setting is missing. Aborts the run before any scenario.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Neither the logged-out nor the logged-in marker settled in time.
    #[error("Authentication did not settle: {0}")]
    AuthTimeout(String),

    /// The post-creation state never appeared. Nothing was registered for cleanup.
    #[error("Failed to create {kind}: {reason} (fields: {fields:?})")]
    CreationFailed {
        kind: String,
        reason: String,
        fields: BTreeMap<String, String>,
    },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("App server failed to start: {0}")]
    ServerStartup(String),

    #[error("App health check failed after {0} attempts")]
    ServerHealthCheck(usize),

    #[error("Playwright not found. Install with: npm install playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Scenario not found: {0}")]
    ScenarioNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    /// Whether this error ends the whole run rather than a single scenario.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, E2eError::Configuration(_))
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
