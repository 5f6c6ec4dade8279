//! One parameterized scenario per data-source table row

use async_trait::async_trait;
use tracing::warn;

use crate::browser::Locator;
use crate::context::FixtureBundle;
use crate::entity::SourceVariant;
use crate::error::{E2eError, E2eResult};
use crate::factory::{ProjectFields, SiteFields};
use crate::scenario::{Scenario, ScenarioCx};

/// Create project, site and one data source of `variant`.
pub struct AddDataSource {
    variant: SourceVariant,
    name: String,
}

impl AddDataSource {
    pub fn new(variant: SourceVariant) -> Self {
        Self {
            variant,
            name: format!("add_data_source_{}", variant.slug()),
        }
    }
}

#[async_trait]
impl Scenario for AddDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> Vec<&'static str> {
        vec!["data_sources", self.variant.slug()]
    }

    async fn run(&self, cx: &mut ScenarioCx<'_>) -> E2eResult<FixtureBundle> {
        let form = cx.sources.get(self.variant).cloned().ok_or_else(|| {
            E2eError::Configuration(format!("no form table entry for {}", self.variant))
        })?;
        let label = self.variant.slug().to_ascii_uppercase();
        let project = ProjectFields::generate(&label);
        let site = SiteFields::generate(&label);
        let fields = form.fields_for(cx.redcap);

        let project_id = cx.factory().create_project(&project).await?;
        let site_id = cx.factory().create_site(&project_id, &site).await?;
        cx.factory()
            .create_data_source(&project_id, &site_id, &form, &fields)
            .await?;

        cx.ctx.begin(format!("verify_{}_details", self.variant));
        if self.variant == SourceVariant::Redcap && cx.redcap.placeholder {
            warn!("Placeholder REDCap token in use; skipping detail checks");
            return Ok(FixtureBundle::new());
        }
        for value in fields.shown() {
            cx.expect().visible(&Locator::text(value)).await?;
        }
        Ok(FixtureBundle::new())
    }
}
