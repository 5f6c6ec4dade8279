//! Lochness WebUI E2E Harness
//!
//! Drives the Lochness configuration console through Playwright from Rust and
//! owns the lifecycle of every fixture a scenario creates:
//! - Establishes one authenticated session and reuses it across scenarios
//! - Creates projects, sites, data sources and data sinks through the UI
//!   with per-run unique identifiers
//! - Asserts on visible state with bounded waits
//! - Tears fixtures down child-first through the HTTP API, always
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TestRunner (Rust)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  HarnessConfig ── credentials, timeouts, browser, store     │
//! │  AppServer     ── wait for (or launch) the WebUI            │
//! │  PlaywrightHandle: Browser ── JSON-lines Node bridge        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  per scenario:                                              │
//! │    SessionManager::ensure_authenticated                     │
//! │    Scenario::run(ScenarioCx)                                │
//! │      ├── EntityFactory  -> EntityRecord into ScenarioContext│
//! │      └── Expect         -> bounded visibility/url/text      │
//! │    failure screenshot                                       │
//! │    teardown(ScenarioContext, LochnessApi) -> TeardownReport │
//! │    SharedFixtureStore::save_all (providers only)            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  finish(): suite-owned fixtures torn down, browser closed   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod assertions;
pub mod browser;
pub mod config;
pub mod context;
pub mod entity;
pub mod error;
pub mod factory;
pub mod identity;
pub mod playwright;
pub mod runner;
pub mod scenario;
pub mod scenarios;
pub mod server;
pub mod session;
pub mod sources;
pub mod store;
pub mod teardown;

pub use api::{DeleteOutcome, LochnessApi};
pub use assertions::{Expect, Presence, UrlPattern};
pub use browser::{Browser, Cookie, Locator, Role};
pub use config::{Credentials, HarnessConfig, SessionScope, Timeouts};
pub use context::{FixtureBundle, FixtureStrategy, ScenarioContext, ScenarioState};
pub use entity::{EntityKind, EntityRecord, SourceVariant};
pub use error::{E2eError, E2eResult};
pub use factory::EntityFactory;
pub use identity::TestIdentity;
pub use runner::{Outcome, TestResult, TestRunner, TestSuiteResult};
pub use scenario::{Scenario, ScenarioCx};
pub use session::{Session, SessionManager};
pub use store::SharedFixtureStore;
pub use teardown::{teardown, CleanupOutcome, FixtureBackend, TeardownReport};
