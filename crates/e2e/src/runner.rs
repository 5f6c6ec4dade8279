//! Suite runner: sessions, scenario bodies, diagnostics and teardown

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::time::Instant;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::api::LochnessApi;
use crate::browser::Browser;
use crate::config::{Credentials, HarnessConfig, RedcapCredentials, SessionScope};
use crate::context::{FixtureBundle, FixtureStrategy, ScenarioContext, ScenarioState};
use crate::error::{E2eError, E2eResult};
use crate::playwright::PlaywrightHandle;
use crate::scenario::{Scenario, ScenarioCx};
use crate::scenarios;
use crate::server::AppServer;
use crate::session::{Session, SessionManager};
use crate::sources::SourceTable;
use crate::store::SharedFixtureStore;
use crate::teardown::{teardown, TeardownReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed,
    Skipped,
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub outcome: Outcome,
    pub duration_ms: u64,
    pub state: ScenarioState,
    pub error: Option<String>,
    pub screenshot: Option<PathBuf>,
    pub cleanup: TeardownReport,
    #[serde(default, skip_serializing_if = "FixtureBundle::is_empty")]
    pub exported: FixtureBundle,
}

impl TestResult {
    fn skipped(name: &str, reason: String) -> Self {
        Self {
            name: name.to_string(),
            outcome: Outcome::Skipped,
            duration_ms: 0,
            state: ScenarioState::NotStarted,
            error: Some(reason),
            screenshot: None,
            cleanup: TeardownReport::default(),
            exported: FixtureBundle::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Passed
    }
}

/// Result of running a suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Main E2E test runner
pub struct TestRunner {
    config: HarnessConfig,

    /// Scenarios in run order
    scenarios: Vec<Box<dyn Scenario>>,

    /// Browser driving the console; launched on first use unless injected
    browser: Option<Box<dyn Browser>>,

    sessions: SessionManager,
    api: LochnessApi,
    store: SharedFixtureStore,
    sources: SourceTable,
    redcap: RedcapCredentials,
    credentials: Option<Credentials>,

    /// Fixtures exported by providing scenarios, torn down in `finish`
    suite: ScenarioContext,

    /// WebUI process (if the runner owns it)
    server: Option<AppServer>,

    started: bool,
}

impl TestRunner {
    pub fn new(config: HarnessConfig) -> E2eResult<Self> {
        let sources = match &config.data_source_table {
            Some(path) => SourceTable::from_file(path)?,
            None => SourceTable::builtin()?,
        };
        let scenarios = scenarios::catalog(&sources);
        let api = LochnessApi::new(config.base(), config.timeouts.api())?;
        let sessions = SessionManager::new(config.base(), config.timeouts.clone());
        let store = SharedFixtureStore::new(&config.fixture_store);
        let redcap = config.resolve_redcap();

        Ok(Self {
            config,
            scenarios,
            browser: None,
            sessions,
            api,
            store,
            sources,
            redcap,
            credentials: None,
            suite: ScenarioContext::new("suite"),
            server: None,
            started: false,
        })
    }

    /// Drive scenarios through `browser` instead of launching Playwright.
    pub fn with_browser(mut self, browser: Box<dyn Browser>) -> Self {
        self.browser = Some(browser);
        self
    }

    /// Replace the built-in catalog.
    pub fn with_scenarios(mut self, scenarios: Vec<Box<dyn Scenario>>) -> Self {
        self.scenarios = scenarios;
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Names and tags of the scenarios in run order
    pub fn list(&self) -> Vec<(String, Vec<&'static str>)> {
        self.scenarios
            .iter()
            .map(|s| (s.name().to_string(), s.tags()))
            .collect()
    }

    /// Wait for the WebUI, launching it first when `launch` is set and an
    /// app command is configured.
    pub async fn start_app(&mut self, launch: bool) -> E2eResult<()> {
        if self.server.is_some() {
            return Ok(());
        }
        let server = match (&self.config.app, launch) {
            (Some(app), true) => AppServer::spawn(app, self.config.base()).await?,
            (None, true) => {
                return Err(E2eError::Configuration(
                    "--launch-app needs an `app` section in the config".into(),
                ))
            }
            (_, false) => {
                AppServer::connect(self.config.base(), self.config.timeouts.navigation()).await?
            }
        };
        self.server = Some(server);
        Ok(())
    }

    /// Stop the WebUI if the runner launched it
    pub fn stop_app(&mut self) -> E2eResult<()> {
        if let Some(mut server) = self.server.take() {
            server.stop()?;
        }
        Ok(())
    }

    pub async fn run_all(&mut self) -> E2eResult<TestSuiteResult> {
        let selected = (0..self.scenarios.len()).collect();
        self.run_selected(selected).await
    }

    /// Run scenarios carrying `tag`
    pub async fn run_tagged(&mut self, tag: &str) -> E2eResult<TestSuiteResult> {
        let selected = self
            .scenarios
            .iter()
            .enumerate()
            .filter(|(_, s)| s.tags().iter().any(|t| *t == tag))
            .map(|(i, _)| i)
            .collect();
        self.run_selected(selected).await
    }

    /// Run one scenario by name
    pub async fn run_named(&mut self, name: &str) -> E2eResult<TestSuiteResult> {
        let index = self
            .scenarios
            .iter()
            .position(|s| s.name() == name)
            .ok_or_else(|| E2eError::ScenarioNotFound(name.to_string()))?;
        self.run_selected(vec![index]).await
    }

    async fn run_selected(&mut self, selected: Vec<usize>) -> E2eResult<TestSuiteResult> {
        let start = Instant::now();
        let scenarios = std::mem::take(&mut self.scenarios);
        let picked: Vec<&dyn Scenario> = selected.iter().map(|&i| scenarios[i].as_ref()).collect();

        let prepared = self.begin_suite(&picked);
        let mut results = Vec::new();
        if prepared.is_ok() {
            info!("Running {} scenario(s)...", picked.len());
            for scenario in &picked {
                let result = self.run_scenario(*scenario).await;
                match result.outcome {
                    Outcome::Passed => info!("✓ {} ({} ms)", result.name, result.duration_ms),
                    Outcome::Skipped => info!(
                        "- {} skipped: {}",
                        result.name,
                        result.error.as_deref().unwrap_or("")
                    ),
                    Outcome::Failed => error!(
                        "✗ {} - {}",
                        result.name,
                        result.error.as_deref().unwrap_or("unknown error")
                    ),
                }
                results.push(result);
            }
        }
        drop(picked);
        self.scenarios = scenarios;
        prepared?;

        let passed = results.iter().filter(|r| r.outcome == Outcome::Passed).count();
        let failed = results.iter().filter(|r| r.outcome == Outcome::Failed).count();
        let skipped = results.iter().filter(|r| r.outcome == Outcome::Skipped).count();
        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            passed, failed, skipped, duration_ms
        );

        Ok(TestSuiteResult {
            total: results.len(),
            passed,
            failed,
            skipped,
            duration_ms,
            results,
        })
    }

    /// First-run setup: reset the shared store and resolve credentials
    /// before any scenario starts.
    fn begin_suite(&mut self, picked: &[&dyn Scenario]) -> E2eResult<()> {
        if !self.started {
            self.store.clear()?;
            std::fs::create_dir_all(&self.config.artifacts_dir)?;
            self.started = true;
        }
        if self.credentials.is_none() && picked.iter().any(|s| s.requires_session()) {
            self.credentials = Some(self.config.resolve_credentials()?);
        }
        Ok(())
    }

    async fn ensure_browser(&mut self) -> E2eResult<()> {
        if self.browser.is_none() {
            let handle =
                PlaywrightHandle::launch(&self.config.browser, self.config.timeouts.navigation())
                    .await?;
            self.browser = Some(Box::new(handle));
        }
        Ok(())
    }

    async fn run_scenario(&mut self, scenario: &dyn Scenario) -> TestResult {
        let start = Instant::now();
        let name = scenario.name().to_string();
        let mut ctx = ScenarioContext::new(&name);

        let fixtures = match scenario.strategy() {
            FixtureStrategy::Requires(keys) => {
                let bundle = self.store.load();
                let missing = bundle.missing(&keys);
                if !missing.is_empty() {
                    return TestResult::skipped(
                        &name,
                        format!("missing shared fixtures: {}", missing.join(", ")),
                    );
                }
                bundle
            }
            _ => FixtureBundle::new(),
        };

        let mut failure: Option<String> = None;
        let mut exported = FixtureBundle::new();
        let mut screenshot = None;

        if let Err(e) = self.ensure_browser().await {
            failure = Some(e.to_string());
        }

        if let Some(browser) = self.browser.as_deref_mut() {
            let mut session: Option<Session> = None;
            if failure.is_none() && scenario.requires_session() {
                ctx.begin("authenticate");
                if self.config.session_scope == SessionScope::Scenario {
                    self.sessions.invalidate();
                }
                match &self.credentials {
                    Some(credentials) => {
                        match self.sessions.ensure_authenticated(browser, credentials).await {
                            Ok(s) => {
                                ctx.advance(ScenarioState::Authenticated);
                                session = Some(s);
                            }
                            Err(e) => failure = Some(e.to_string()),
                        }
                    }
                    None => failure = Some("credentials were not resolved".to_string()),
                }
            }
            self.api.set_session(session.as_ref());

            if failure.is_none() {
                let budget = self.config.timeouts.scenario();
                let mut cx = ScenarioCx {
                    browser: &mut *browser,
                    ctx: &mut ctx,
                    api: &self.api,
                    config: &self.config,
                    session: session.as_ref(),
                    redcap: &self.redcap,
                    sources: &self.sources,
                    fixtures: &fixtures,
                };
                let body = AssertUnwindSafe(scenario.run(&mut cx)).catch_unwind();
                match tokio::time::timeout(budget, body).await {
                    Ok(Ok(Ok(bundle))) => exported = bundle,
                    Ok(Ok(Err(e))) => failure = Some(e.to_string()),
                    Ok(Err(panic)) => {
                        failure = Some(format!(
                            "scenario panicked: {}",
                            panic_message(panic.as_ref())
                        ))
                    }
                    Err(_) => {
                        failure = Some(
                            E2eError::Timeout(format!("scenario body exceeded {:?}", budget))
                                .to_string(),
                        )
                    }
                }
            }

            if failure.is_some() {
                screenshot = capture_failure(&self.config.artifacts_dir, browser, &ctx).await;
            } else {
                ctx.advance(ScenarioState::Asserted);
            }
        }

        if failure.is_none() {
            if let FixtureStrategy::Provides(keys) = scenario.strategy() {
                if let Err(e) = self.hand_over(&mut ctx, &keys, &exported) {
                    failure = Some(e.to_string());
                }
            }
        }

        let cleanup = teardown(&mut ctx, &self.api, self.config.timeouts.api()).await;

        if failure.is_none() {
            if let Err(e) = scenario.verify_teardown(&self.api, &cleanup).await {
                failure = Some(e.to_string());
            }
        }

        if failure.is_none() && !exported.is_empty() {
            if let Err(e) = self.store.save_all(&exported) {
                warn!("Could not persist fixtures from {}: {}", name, e);
            }
        }

        TestResult {
            name,
            outcome: if failure.is_none() { Outcome::Passed } else { Outcome::Failed },
            duration_ms: start.elapsed().as_millis() as u64,
            state: ctx.state(),
            error: failure,
            screenshot,
            cleanup,
            exported,
        }
    }

    /// Move exported fixtures (and their ancestors) to the suite context so
    /// they outlive the providing scenario.
    fn hand_over(
        &mut self,
        ctx: &mut ScenarioContext,
        keys: &[&'static str],
        exported: &FixtureBundle,
    ) -> E2eResult<()> {
        for key in keys {
            let id = exported.identity(key).ok_or_else(|| {
                E2eError::AssertionFailed(format!("scenario did not export '{}'", key))
            })?;
            let released = ctx.release(&id);
            debug!("Suite now owns {} record(s) for {}", released.len(), key);
            self.suite.adopt(released);
        }
        Ok(())
    }

    /// Tear down suite-owned fixtures and release the browser.
    ///
    /// The API client's cookie follows whichever scenario ran last, so suite
    /// teardown authenticates again and uses its own client.
    pub async fn finish(&mut self) -> TeardownReport {
        let mut api = self.api.anonymous();
        if !self.suite.is_empty() {
            let session = self.suite_session().await;
            api.set_session(session.as_ref());
        }
        let report = teardown(&mut self.suite, &api, self.config.timeouts.api()).await;
        self.suite = ScenarioContext::new("suite");
        if let Some(browser) = self.browser.as_deref_mut() {
            if let Err(e) = browser.close().await {
                warn!("Browser did not close cleanly: {}", e);
            }
        }
        self.browser = None;
        report
    }

    async fn suite_session(&mut self) -> Option<Session> {
        let (Some(browser), Some(credentials)) =
            (self.browser.as_deref_mut(), self.credentials.as_ref())
        else {
            return self.sessions.current().cloned();
        };
        match self.sessions.ensure_authenticated(browser, credentials).await {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("Suite teardown could not authenticate: {}", e);
                self.sessions.current().cloned()
            }
        }
    }

    /// Write results to `test-results.json` in the artifacts directory
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.artifacts_dir)?;

        let path = self.config.artifacts_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Drop for TestRunner {
    fn drop(&mut self) {
        if !self.suite.is_empty() {
            warn!(
                "Runner dropped without finish(); {} suite fixture(s) left behind",
                self.suite.records().len()
            );
        }
        let _ = self.stop_app();
    }
}

async fn capture_failure(
    dir: &Path,
    browser: &mut dyn Browser,
    ctx: &ScenarioContext,
) -> Option<PathBuf> {
    let path = dir.join(failure_screenshot_name(
        ctx.scenario(),
        ctx.operation(),
        chrono::Local::now(),
    ));
    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!("Cannot create {}: {}", dir.display(), e);
        return None;
    }
    match browser.screenshot(&path).await {
        Ok(()) => {
            info!("Failure screenshot: {}", path.display());
            Some(path)
        }
        Err(e) => {
            warn!("Failure screenshot not captured: {}", e);
            None
        }
    }
}

/// `<scenario>_<operation>_failure_<YYYYmmddHHMMSS>.png`, with anything
/// outside `[A-Za-z0-9_-]` replaced.
pub fn failure_screenshot_name(
    scenario: &str,
    operation: &str,
    at: chrono::DateTime<chrono::Local>,
) -> String {
    fn clean(s: &str) -> String {
        s.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect()
    }
    format!(
        "{}_{}_failure_{}.png",
        clean(scenario),
        clean(operation),
        at.format("%Y%m%d%H%M%S")
    )
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
