//! Per-scenario fixture ownership and lifecycle state

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::entity::EntityRecord;
use crate::identity::TestIdentity;

/// Store key for the project id exported by a providing scenario
pub const CREATED_PROJECT_ID: &str = "created_project_id";
/// Store key for the site id exported by a providing scenario
pub const CREATED_SITE_ID: &str = "created_site_id";

/// Linear scenario lifecycle. `TornDown` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioState {
    NotStarted,
    Authenticated,
    FixturesCreated,
    Asserted,
    TornDown,
}

/// Everything one scenario created, in creation order
#[derive(Debug)]
pub struct ScenarioContext {
    scenario: String,
    records: Vec<EntityRecord>,
    removed: Vec<EntityRecord>,
    state: ScenarioState,
    operation: String,
}

impl ScenarioContext {
    pub fn new(scenario: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            records: Vec::new(),
            removed: Vec::new(),
            state: ScenarioState::NotStarted,
            operation: "setup".to_string(),
        }
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn state(&self) -> ScenarioState {
        self.state
    }

    pub fn records(&self) -> &[EntityRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Name of the step in progress, used to label diagnostics.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn begin(&mut self, operation: impl Into<String>) {
        self.operation = operation.into();
        debug!(scenario = %self.scenario, operation = %self.operation, "step");
    }

    /// Move the lifecycle forward. Earlier states are kept as a high-water
    /// mark, and nothing leaves `TornDown`.
    pub fn advance(&mut self, next: ScenarioState) {
        if self.state == ScenarioState::TornDown {
            return;
        }
        if next > self.state {
            self.state = next;
        }
    }

    /// Schedule a freshly created entity for teardown.
    pub fn register(&mut self, record: EntityRecord) {
        if self.state == ScenarioState::TornDown {
            warn!(scenario = %self.scenario, "{} registered after teardown", record);
        }
        debug!(scenario = %self.scenario, "registered {}", record);
        self.records.push(record);
        self.advance(ScenarioState::FixturesCreated);
    }

    /// Note that an entity was already deleted through the UI.
    pub fn mark_removed(&mut self, id: &TestIdentity) {
        if let Some(record) = self.records.iter().find(|r| &r.id == id) {
            if !self.removed.contains(record) {
                self.removed.push(record.clone());
            }
        }
    }

    pub fn is_removed(&self, record: &EntityRecord) -> bool {
        self.removed.contains(record)
    }

    /// Hand records over to another owner (the suite context for exported
    /// fixtures). Takes the matching record plus any ancestors registered here.
    pub fn release(&mut self, id: &TestIdentity) -> Vec<EntityRecord> {
        let Some(target) = self.records.iter().find(|r| &r.id == id).cloned() else {
            return Vec::new();
        };
        let (released, kept): (Vec<_>, Vec<_>) = self
            .records
            .drain(..)
            .partition(|r| *r == target || target.descends_from(r));
        self.records = kept;
        released
    }

    /// Adopt records released by another context, keeping creation order.
    pub fn adopt(&mut self, records: Vec<EntityRecord>) {
        for record in records {
            if !self.records.contains(&record) {
                self.records.push(record);
            }
        }
    }

    /// Take the records for teardown, newest first, and mark the context torn down.
    pub(crate) fn drain_for_teardown(&mut self) -> Vec<(EntityRecord, bool)> {
        let removed = std::mem::take(&mut self.removed);
        let drained: Vec<_> = self
            .records
            .drain(..)
            .rev()
            .map(|r| {
                let gone = removed.contains(&r);
                (r, gone)
            })
            .collect();
        self.state = ScenarioState::TornDown;
        drained
    }
}

/// How a scenario obtains its fixtures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureStrategy {
    /// Creates and removes everything it needs
    SelfContained,
    /// Self-contained, and exports these keys for downstream scenarios
    Provides(Vec<&'static str>),
    /// Chained: reads these keys from the shared store, skips if absent
    Requires(Vec<&'static str>),
}

/// Identifiers passed explicitly between scenarios
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixtureBundle(BTreeMap<String, String>);

impl FixtureBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Read a key as an identifier; `None` if absent or malformed.
    pub fn identity(&self, key: &str) -> Option<TestIdentity> {
        self.get(key).and_then(|v| TestIdentity::parse(v).ok())
    }

    /// Keys from `required` that are missing.
    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .copied()
            .filter(|k| !self.0.contains_key(*k))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
