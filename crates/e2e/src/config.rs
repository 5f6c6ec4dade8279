//! Harness configuration and credential resolution
//!
//! Settings come from an optional YAML file and are then overlaid with
//! `LOCHNESS_E2E_*` environment variables. Credentials are resolved once,
//! before the first scenario, so a missing secret fails the run up front.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::error::{E2eError, E2eResult};

/// Token used when no REDCap credential file is present.
pub const PLACEHOLDER_REDCAP_TOKEN: &str = "PLACEHOLDER_REDCAP_TOKEN";

/// Top-level harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Base URL of the Lochness WebUI (also serves the REST API)
    pub base_url: String,

    /// Operator login
    pub credentials: CredentialSource,

    /// REDCap endpoint and token file
    pub redcap: RedcapConfig,

    /// Bounded-wait budgets
    pub timeouts: Timeouts,

    /// Browser launch settings
    pub browser: BrowserConfig,

    /// Whether one login is shared across the suite or redone per scenario
    pub session_scope: SessionScope,

    /// Where screenshots and the results file are written
    pub artifacts_dir: PathBuf,

    /// File backing the shared fixture store
    pub fixture_store: PathBuf,

    /// Optional override for the data-source form table
    pub data_source_table: Option<PathBuf>,

    /// Launch the WebUI instead of connecting to a running one
    pub app: Option<AppConfig>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            credentials: CredentialSource::default(),
            redcap: RedcapConfig::default(),
            timeouts: Timeouts::default(),
            browser: BrowserConfig::default(),
            session_scope: SessionScope::Scenario,
            artifacts_dir: PathBuf::from("test-results"),
            fixture_store: PathBuf::from("test-results/shared_test_data.json"),
            data_source_table: None,
            app: None,
        }
    }
}

impl HarnessConfig {
    /// Load from an optional YAML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> E2eResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_yaml(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }

    /// Overlay settings from a key lookup (the process environment in practice).
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("LOCHNESS_E2E_BASE_URL") {
            self.base_url = url;
        }
        if let Some(email) = lookup("LOCHNESS_E2E_EMAIL") {
            self.credentials.email = Some(email);
        }
        if let Some(password) = lookup("LOCHNESS_E2E_PASSWORD") {
            self.credentials.password = Some(password);
        }
        if let Some(path) = lookup("LOCHNESS_E2E_REDCAP_CRED_FILE") {
            self.redcap.credential_file = PathBuf::from(path);
        }
        if let Some(dir) = lookup("LOCHNESS_E2E_ARTIFACTS_DIR") {
            self.artifacts_dir = PathBuf::from(dir);
        }
        if let Some(headless) = lookup("LOCHNESS_E2E_HEADLESS") {
            self.browser.headless = !matches!(headless.as_str(), "0" | "false" | "no");
        }
    }

    /// Base URL without a trailing slash.
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Resolve operator credentials; fails if either half is missing or blank.
    pub fn resolve_credentials(&self) -> E2eResult<Credentials> {
        let email = self
            .credentials
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                E2eError::Configuration(
                    "operator email is not set (LOCHNESS_E2E_EMAIL or credentials.email)".into(),
                )
            })?;
        let password = self
            .credentials
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                E2eError::Configuration(
                    "operator password is not set (LOCHNESS_E2E_PASSWORD or credentials.password)"
                        .into(),
                )
            })?;

        Ok(Credentials::new(email, password))
    }

    /// Resolve the REDCap token, falling back to a placeholder when the file is absent.
    pub fn resolve_redcap(&self) -> RedcapCredentials {
        let path = &self.redcap.credential_file;
        match std::fs::read_to_string(path) {
            Ok(raw) if !raw.trim().is_empty() => {
                info!("Loaded REDCap token from {}", path.display());
                RedcapCredentials {
                    api_address: self.redcap.api_address.clone(),
                    token: Zeroizing::new(raw.trim().to_string()),
                    placeholder: false,
                }
            }
            _ => {
                warn!(
                    "No REDCap token at {}; using a placeholder (REDCap checks will be shallow)",
                    path.display()
                );
                RedcapCredentials {
                    api_address: self.redcap.api_address.clone(),
                    token: Zeroizing::new(PLACEHOLDER_REDCAP_TOKEN.to_string()),
                    placeholder: true,
                }
            }
        }
    }
}

/// Unresolved credential settings as they appear in the config file
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialSource {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSource")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Resolved operator credentials. The password is zeroized on drop.
#[derive(Clone)]
pub struct Credentials {
    email: String,
    password: Zeroizing<String>,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.email.trim().is_empty() || self.password.is_empty() {
            return Err(E2eError::Configuration("credentials must be non-empty".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedcapConfig {
    pub api_address: String,
    pub credential_file: PathBuf,
}

impl Default for RedcapConfig {
    fn default() -> Self {
        Self {
            api_address: "https://redcap.partners.org/redcap/api/".to_string(),
            credential_file: PathBuf::from(".redcap_cred"),
        }
    }
}

#[derive(Clone)]
pub struct RedcapCredentials {
    pub api_address: String,
    pub token: Zeroizing<String>,
    /// True when no credential file was found
    pub placeholder: bool,
}

impl fmt::Debug for RedcapCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedcapCredentials")
            .field("api_address", &self.api_address)
            .field("token", &"[REDACTED]")
            .field("placeholder", &self.placeholder)
            .finish()
    }
}

/// Bounded-wait budgets, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Element visibility and text checks
    pub element_ms: u64,
    /// Page navigation and URL settle
    pub navigation_ms: u64,
    /// Login and logout transitions
    pub login_ms: u64,
    /// Single REST call
    pub api_ms: u64,
    /// Whole scenario body
    pub scenario_ms: u64,
    /// Delay between polls of a bounded wait
    pub poll_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            element_ms: 5_000,
            navigation_ms: 30_000,
            login_ms: 60_000,
            api_ms: 10_000,
            scenario_ms: 300_000,
            poll_interval_ms: 100,
        }
    }
}

impl Timeouts {
    pub fn element(&self) -> Duration {
        Duration::from_millis(self.element_ms)
    }

    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn login(&self) -> Duration {
        Duration::from_millis(self.login_ms)
    }

    pub fn api(&self) -> Duration {
        Duration::from_millis(self.api_ms)
    }

    pub fn scenario(&self) -> Duration {
        Duration::from_millis(self.scenario_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub kind: BrowserKind,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Node project directory that has `playwright` installed
    pub node_project_dir: PathBuf,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            kind: BrowserKind::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            node_project_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionScope {
    /// Log in once and reuse the session while it stays fresh
    Suite,
    /// Log out and back in before every scenario
    #[default]
    Scenario,
}

/// How to launch the WebUI when the harness owns it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Program to run, e.g. `npm`
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory of the WebUI checkout
    pub working_dir: PathBuf,
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
}

fn default_startup_timeout_ms() -> u64 {
    120_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_partial_yaml_keeps_defaults() {
        let yaml = r#"
base_url: http://127.0.0.1:4000/
session_scope: suite
timeouts:
  element_ms: 250
browser:
  kind: firefox
"#;
        let config = HarnessConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.base(), "http://127.0.0.1:4000");
        assert_eq!(config.session_scope, SessionScope::Suite);
        assert_eq!(config.timeouts.element(), Duration::from_millis(250));
        assert_eq!(config.timeouts.login(), Duration::from_secs(60));
        assert_eq!(config.browser.kind, BrowserKind::Firefox);
        assert!(config.browser.headless);
    }

    #[test]
    fn test_env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("LOCHNESS_E2E_BASE_URL", "http://ui.test:3000"),
            ("LOCHNESS_E2E_EMAIL", "operator@example.org"),
            ("LOCHNESS_E2E_PASSWORD", "hunter2"),
            ("LOCHNESS_E2E_HEADLESS", "false"),
        ]
        .into_iter()
        .collect();

        let mut config = HarnessConfig::default();
        config.apply_env_with(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.base_url, "http://ui.test:3000");
        assert!(!config.browser.headless);
        let creds = config.resolve_credentials().unwrap();
        assert_eq!(creds.email(), "operator@example.org");
        assert_eq!(creds.password(), "hunter2");
    }

    #[test]
    fn test_missing_password_is_configuration_error() {
        let mut config = HarnessConfig::default();
        config.credentials.email = Some("operator@example.org".into());

        let err = config.resolve_credentials().unwrap_err();
        assert!(matches!(err, E2eError::Configuration(_)));
        assert!(err.is_fatal_for_run());
    }

    #[test]
    fn test_blank_email_is_rejected() {
        let mut config = HarnessConfig::default();
        config.credentials.email = Some("   ".into());
        config.credentials.password = Some("pw".into());
        assert!(config.resolve_credentials().is_err());
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let creds = Credentials::new("a@b.c", "s3cret");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("a@b.c"));
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn test_redcap_token_falls_back_to_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = HarnessConfig::default();
        config.redcap.credential_file = dir.path().join("missing");

        let redcap = config.resolve_redcap();
        assert!(redcap.placeholder);
        assert_eq!(redcap.token.as_str(), PLACEHOLDER_REDCAP_TOKEN);

        let file = dir.path().join(".redcap_cred");
        std::fs::write(&file, "ABC123\n").unwrap();
        config.redcap.credential_file = file;
        let redcap = config.resolve_redcap();
        assert!(!redcap.placeholder);
        assert_eq!(redcap.token.as_str(), "ABC123");
    }
}
