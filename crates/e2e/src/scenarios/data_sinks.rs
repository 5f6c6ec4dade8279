//! Data sink create, view, edit and delete through the console

use async_trait::async_trait;
use serde_json::json;

use crate::browser::Locator;
use crate::context::FixtureBundle;
use crate::error::E2eResult;
use crate::factory::{metadata_text, ProjectFields, SinkFields, SiteFields};
use crate::scenario::{Scenario, ScenarioCx};

pub struct DataSinkCrud;

#[async_trait]
impl Scenario for DataSinkCrud {
    fn name(&self) -> &str {
        "data_sink_crud"
    }

    fn tags(&self) -> Vec<&'static str> {
        vec!["data_sinks"]
    }

    async fn run(&self, cx: &mut ScenarioCx<'_>) -> E2eResult<FixtureBundle> {
        let element = cx.config.timeouts.element();
        let project = ProjectFields::generate("SINK");
        let site = SiteFields::generate("SINK");
        let sink = SinkFields::generate(json!({"type": "generic", "note": "test"}));

        let project_id = cx.factory().create_project(&project).await?;
        let site_id = cx.factory().create_site(&project_id, &site).await?;
        let sink_id = cx.factory().create_data_sink(&project_id, &site_id, &sink).await?;

        let site_path = format!("**/config/projects/{}/sites/{}", project_id, site_id);
        let sink_path = format!("{}/data-sinks/{}", site_path, sink_id);

        cx.ctx.begin("view_data_sink");
        cx.browser.click(&Locator::link(sink_id.as_str()), element).await?;
        cx.expect().url(&sink_path).await?;
        cx.expect().visible(&Locator::text_exact(sink_id.as_str())).await?;
        cx.expect().visible(&Locator::text(r#""type": "generic""#)).await?;

        cx.ctx.begin("edit_data_sink");
        cx.browser
            .click(&Locator::css(r#"[data-slot="button"]:has-text("Edit")"#), element)
            .await?;
        cx.expect().url(&format!("{}/edit", sink_path)).await?;
        cx.expect().visible(&Locator::text("Update Data Sink")).await?;
        let updated = json!({"type": "generic", "note": "updated", "extra": 123});
        cx.browser
            .fill(&Locator::css(r#"[data-slot="textarea"]"#), &metadata_text(&updated), element)
            .await?;
        cx.browser.click(&Locator::button("Update Data Sink"), element).await?;
        cx.expect().url(&sink_path).await?;
        cx.expect().visible(&Locator::text(r#""note": "updated""#)).await?;
        cx.expect().visible(&Locator::text(r#""extra": 123"#)).await?;

        cx.ctx.begin("delete_data_sink");
        cx.browser.accept_next_dialog().await?;
        cx.browser.click(&Locator::button("Delete"), element).await?;
        cx.expect().url(&site_path).await?;
        cx.ctx.mark_removed(&sink_id);

        cx.ctx.begin("verify_data_sink_removed");
        cx.browser.click(&Locator::tab("Data Sinks"), element).await?;
        cx.expect().hidden(&Locator::text(sink_id.as_str())).await?;
        Ok(FixtureBundle::new())
    }
}
