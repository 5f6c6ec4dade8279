//! Scenario trait and the per-run handle scenarios work through

use async_trait::async_trait;

use crate::api::LochnessApi;
use crate::assertions::Expect;
use crate::browser::Browser;
use crate::config::{HarnessConfig, RedcapCredentials};
use crate::context::{FixtureBundle, FixtureStrategy, ScenarioContext};
use crate::entity::EntityKind;
use crate::error::{E2eError, E2eResult};
use crate::factory::EntityFactory;
use crate::session::Session;
use crate::sources::SourceTable;
use crate::teardown::{CleanupOutcome, TeardownReport};

/// One end-to-end test case
#[async_trait]
pub trait Scenario: Send + Sync {
    fn name(&self) -> &str;

    fn tags(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn strategy(&self) -> FixtureStrategy {
        FixtureStrategy::SelfContained
    }

    fn requires_session(&self) -> bool {
        true
    }

    /// The scenario body. Returns the fixture keys it exports, if any.
    async fn run(&self, cx: &mut ScenarioCx<'_>) -> E2eResult<FixtureBundle>;

    /// Checks that run after a passing body has been torn down.
    async fn verify_teardown(&self, _api: &LochnessApi, _report: &TeardownReport) -> E2eResult<()> {
        Ok(())
    }
}

/// Everything a scenario body may touch
pub struct ScenarioCx<'a> {
    pub browser: &'a mut dyn Browser,
    pub ctx: &'a mut ScenarioContext,
    pub api: &'a LochnessApi,
    pub config: &'a HarnessConfig,
    pub session: Option<&'a Session>,
    pub redcap: &'a RedcapCredentials,
    pub sources: &'a SourceTable,
    /// Keys read from the shared store for `Requires` scenarios
    pub fixtures: &'a FixtureBundle,
}

impl<'a> ScenarioCx<'a> {
    pub fn factory(&mut self) -> EntityFactory<'_> {
        EntityFactory::new(
            &mut *self.browser,
            &mut *self.ctx,
            self.config.base(),
            &self.config.timeouts,
        )
    }

    pub fn expect(&mut self) -> Expect<'_> {
        Expect::new(&mut *self.browser, &self.config.timeouts)
    }

    /// Navigate to a path under the base URL.
    pub async fn goto(&mut self, path: &str) -> E2eResult<()> {
        let url = format!("{}{}", self.config.base(), path);
        self.browser.goto(&url, self.config.timeouts.navigation()).await
    }
}

/// Post-teardown check: every project the report covers must be gone.
pub async fn verify_projects_absent(api: &LochnessApi, report: &TeardownReport) -> E2eResult<()> {
    for entry in &report.entries {
        if entry.record.kind != EntityKind::Project {
            continue;
        }
        if let CleanupOutcome::Warning(w) = &entry.outcome {
            return Err(E2eError::AssertionFailed(format!(
                "project {} was not cleaned up: {}",
                entry.record.id, w.reason
            )));
        }
        if api.project(entry.record.id.as_str()).await?.is_found() {
            return Err(E2eError::AssertionFailed(format!(
                "project {} still exists after teardown",
                entry.record.id
            )));
        }
    }
    Ok(())
}
