//! Project and site workflows

use async_trait::async_trait;
use tracing::info;

use crate::api::LochnessApi;
use crate::browser::Locator;
use crate::context::{FixtureBundle, FixtureStrategy, CREATED_PROJECT_ID};
use crate::error::{E2eError, E2eResult};
use crate::factory::{ProjectFields, SiteFields};
use crate::identity::TestIdentity;
use crate::scenario::{verify_projects_absent, Scenario, ScenarioCx};
use crate::teardown::TeardownReport;

/// Create a project, check its detail page, and confirm teardown removed it.
pub struct ProjectLifecycle;

#[async_trait]
impl Scenario for ProjectLifecycle {
    fn name(&self) -> &str {
        "project_lifecycle"
    }

    fn tags(&self) -> Vec<&'static str> {
        vec!["projects"]
    }

    async fn run(&self, cx: &mut ScenarioCx<'_>) -> E2eResult<FixtureBundle> {
        let project = ProjectFields::generate("LIFECYCLE");
        cx.factory().create_project(&project).await?;

        cx.ctx.begin("verify_project");
        cx.expect().visible(&Locator::heading(&project.name)).await?;
        cx.expect().visible(&Locator::text(&project.description)).await?;
        Ok(FixtureBundle::new())
    }

    async fn verify_teardown(&self, api: &LochnessApi, report: &TeardownReport) -> E2eResult<()> {
        verify_projects_absent(api, report).await
    }
}

/// Create a project and a site under it.
pub struct AddSite;

#[async_trait]
impl Scenario for AddSite {
    fn name(&self) -> &str {
        "add_site"
    }

    fn tags(&self) -> Vec<&'static str> {
        vec!["sites"]
    }

    async fn run(&self, cx: &mut ScenarioCx<'_>) -> E2eResult<FixtureBundle> {
        let project = ProjectFields::generate("SITE");
        let site = SiteFields::generate("SITE");

        let project_id = cx.factory().create_project(&project).await?;
        cx.factory().create_site(&project_id, &site).await?;

        cx.ctx.begin("verify_site");
        cx.expect().visible(&Locator::text(&site.description)).await?;
        Ok(FixtureBundle::new())
    }
}

/// Creating a site under a project that does not exist must fail cleanly.
pub struct SiteRequiresExistingProject;

#[async_trait]
impl Scenario for SiteRequiresExistingProject {
    fn name(&self) -> &str {
        "site_requires_existing_project"
    }

    fn tags(&self) -> Vec<&'static str> {
        vec!["sites", "negative"]
    }

    async fn run(&self, cx: &mut ScenarioCx<'_>) -> E2eResult<FixtureBundle> {
        let missing = TestIdentity::generate("TEST_PROJ_MISSING");
        let site = SiteFields::generate("ORPHAN");

        match cx.factory().create_site(&missing, &site).await {
            Err(E2eError::CreationFailed { reason, .. }) => {
                info!("Site creation under {} refused: {}", missing, reason);
            }
            Ok(id) => {
                return Err(E2eError::AssertionFailed(format!(
                    "site {} was created under nonexistent project {}",
                    id, missing
                )))
            }
            Err(other) => return Err(other),
        }

        if !cx.ctx.is_empty() {
            return Err(E2eError::AssertionFailed(format!(
                "{} records registered for a failed creation",
                cx.ctx.records().len()
            )));
        }
        Ok(FixtureBundle::new())
    }
}

/// Create a project and export it for chained scenarios.
pub struct SharedProject;

#[async_trait]
impl Scenario for SharedProject {
    fn name(&self) -> &str {
        "shared_project"
    }

    fn tags(&self) -> Vec<&'static str> {
        vec!["projects", "chained"]
    }

    fn strategy(&self) -> FixtureStrategy {
        FixtureStrategy::Provides(vec![CREATED_PROJECT_ID])
    }

    async fn run(&self, cx: &mut ScenarioCx<'_>) -> E2eResult<FixtureBundle> {
        let project = ProjectFields::generate("SHARED");
        let id = cx.factory().create_project(&project).await?;

        cx.ctx.begin("verify_project");
        cx.expect().visible(&Locator::text(&project.description)).await?;
        Ok(FixtureBundle::new().with(CREATED_PROJECT_ID, id.as_str()))
    }
}

/// Add a site to the project exported by [`SharedProject`].
pub struct AddSiteToSharedProject;

#[async_trait]
impl Scenario for AddSiteToSharedProject {
    fn name(&self) -> &str {
        "add_site_to_shared_project"
    }

    fn tags(&self) -> Vec<&'static str> {
        vec!["sites", "chained"]
    }

    fn strategy(&self) -> FixtureStrategy {
        FixtureStrategy::Requires(vec![CREATED_PROJECT_ID])
    }

    async fn run(&self, cx: &mut ScenarioCx<'_>) -> E2eResult<FixtureBundle> {
        let project = cx.fixtures.identity(CREATED_PROJECT_ID).ok_or_else(|| {
            E2eError::Configuration(format!("'{}' is not a valid project id", CREATED_PROJECT_ID))
        })?;
        let site = SiteFields::generate("SHARED");

        cx.factory().create_site(&project, &site).await?;

        cx.ctx.begin("verify_site");
        cx.expect().visible(&Locator::text(&site.description)).await?;
        Ok(FixtureBundle::new())
    }
}

/// Delete a site with the console's own Delete Site button.
pub struct DeleteViaUi;

#[async_trait]
impl Scenario for DeleteViaUi {
    fn name(&self) -> &str {
        "delete_via_ui"
    }

    fn tags(&self) -> Vec<&'static str> {
        vec!["sites", "delete"]
    }

    async fn run(&self, cx: &mut ScenarioCx<'_>) -> E2eResult<FixtureBundle> {
        let project = ProjectFields::generate("DELETE");
        let site = SiteFields::generate("DELETE");

        let project_id = cx.factory().create_project(&project).await?;
        let site_id = cx.factory().create_site(&project_id, &site).await?;

        cx.ctx.begin("delete_site");
        let element = cx.config.timeouts.element();
        cx.goto(&format!("/config/projects/{}/sites/{}", project_id, site_id)).await?;
        cx.expect().visible(&Locator::text(site_id.as_str())).await?;
        cx.browser.click(&Locator::button("Delete Site"), element).await?;
        cx.expect().url(&format!("**/config/projects/{}", project_id)).await?;
        cx.ctx.mark_removed(&site_id);

        cx.ctx.begin("verify_site_removed");
        cx.expect().hidden(&Locator::text(site_id.as_str())).await?;
        Ok(FixtureBundle::new())
    }
}
