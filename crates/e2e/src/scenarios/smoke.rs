//! Reachability and login smoke checks

use async_trait::async_trait;

use crate::browser::Locator;
use crate::context::FixtureBundle;
use crate::error::E2eResult;
use crate::scenario::{Scenario, ScenarioCx};

/// The home page loads and carries the product title.
pub struct WebuiTitle;

#[async_trait]
impl Scenario for WebuiTitle {
    fn name(&self) -> &str {
        "webui_title"
    }

    fn tags(&self) -> Vec<&'static str> {
        vec!["smoke"]
    }

    fn requires_session(&self) -> bool {
        false
    }

    async fn run(&self, cx: &mut ScenarioCx<'_>) -> E2eResult<FixtureBundle> {
        cx.ctx.begin("load_home");
        cx.goto("/").await?;
        cx.expect().title("Lochness").await?;
        Ok(FixtureBundle::new())
    }
}

/// Logging in lands on the welcome page.
pub struct Login;

#[async_trait]
impl Scenario for Login {
    fn name(&self) -> &str {
        "login"
    }

    fn tags(&self) -> Vec<&'static str> {
        vec!["smoke", "auth"]
    }

    async fn run(&self, cx: &mut ScenarioCx<'_>) -> E2eResult<FixtureBundle> {
        cx.ctx.begin("welcome");
        cx.expect().visible(&Locator::text("Welcome")).await?;
        Ok(FixtureBundle::new())
    }
}
