//! Unique fixture identifiers
//!
//! Identifiers look like `TEST_PROJ_20261015093012_0007_K3ZQ`: a prefix, the
//! local timestamp at second granularity, a process-wide sequence number and a
//! random nonce. The sequence keeps ids distinct within one process even when
//! generated in the same second; the nonce keeps concurrent processes apart.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};

static SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// The sequence restarts in every process, so the nonce alone separates
/// concurrent runs.
const NONCE_LEN: usize = 8;

fn grammar() -> &'static Regex {
    static GRAMMAR: OnceLock<Regex> = OnceLock::new();
    GRAMMAR.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("static id grammar"))
}

/// A backend identifier generated for (or accepted by) the harness
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TestIdentity(String);

impl TestIdentity {
    /// Generate a fresh identifier. Characters outside the id grammar are
    /// replaced with `_` so any prefix yields a valid id.
    pub fn generate(prefix: &str) -> Self {
        let prefix: String = prefix
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        let prefix = if prefix.is_empty() { "TEST".to_string() } else { prefix };

        let timestamp = chrono::Local::now().format("%Y%m%d%H%M%S");
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LEN)
            .map(|b| (b as char).to_ascii_uppercase())
            .collect();

        Self(format!("{}_{}_{:04}_{}", prefix, timestamp, seq, nonce))
    }

    /// Accept an externally supplied identifier after checking the grammar.
    pub fn parse(value: impl Into<String>) -> E2eResult<Self> {
        let value = value.into();
        if !grammar().is_match(&value) {
            return Err(E2eError::Configuration(format!(
                "'{}' is not a valid identifier (alphanumeric and underscore only)",
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TestIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TestIdentity {
    type Error = E2eError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<TestIdentity> for String {
    fn from(id: TestIdentity) -> Self {
        id.0
    }
}
