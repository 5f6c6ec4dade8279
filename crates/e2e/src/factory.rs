//! Entity creation through the console UI
//!
//! Each `create_*` drives the form workflow (navigate, open form, fill,
//! submit) and waits for the post-creation URL. Once that URL settles the
//! record is registered with the scenario context, before any further
//! assertion, so an entity that exists but fails verification is still torn
//! down. A failure before that point is `CreationFailed` and registers nothing.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::info;

use crate::assertions::Expect;
use crate::browser::{Browser, Locator, Role};
use crate::config::Timeouts;
use crate::context::ScenarioContext;
use crate::entity::{EntityKind, EntityRecord};
use crate::error::{E2eError, E2eResult};
use crate::identity::TestIdentity;
use crate::sources::{DataSourceFields, SourceForm};

const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Clone)]
pub struct ProjectFields {
    pub id: TestIdentity,
    pub name: String,
    pub description: String,
    pub active: bool,
}

impl ProjectFields {
    /// Fresh project fields; `label` ends up in the id prefix and the name.
    pub fn generate(label: &str) -> Self {
        let id = TestIdentity::generate(&format!("TEST_PROJ_{}", label));
        let name = format!("Test Project for {} - {}", label, id);
        Self {
            description: format!("Description for {}", name),
            name,
            id,
            active: true,
        }
    }

    fn snapshot(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("Project ID".to_string(), self.id.to_string()),
            ("Project Name".to_string(), self.name.clone()),
            ("Project Description".to_string(), self.description.clone()),
            ("Is Active".to_string(), self.active.to_string()),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct SiteFields {
    pub id: TestIdentity,
    pub name: String,
    pub description: String,
    pub active: bool,
}

impl SiteFields {
    pub fn generate(label: &str) -> Self {
        let id = TestIdentity::generate(&format!("TEST_SITE_{}", label));
        let name = format!("Test Site for {} - {}", label, id);
        Self {
            description: format!("Description for {}", name),
            name,
            id,
            active: true,
        }
    }

    fn snapshot(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("Site ID".to_string(), self.id.to_string()),
            ("Site Name".to_string(), self.name.clone()),
            ("Site Description".to_string(), self.description.clone()),
            ("Is Active".to_string(), self.active.to_string()),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct SinkFields {
    pub name: TestIdentity,
    pub metadata: Value,
}

impl SinkFields {
    pub fn generate(metadata: Value) -> Self {
        Self {
            name: TestIdentity::generate("TEST_SINK"),
            metadata,
        }
    }

    fn snapshot(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("data_sink_name".to_string(), self.name.to_string()),
            ("data_sink_metadata".to_string(), self.metadata.to_string()),
        ])
    }
}

/// Render sink metadata the way the console's textarea expects it.
pub fn metadata_text(metadata: &Value) -> String {
    // serde_json's compact form has no space after ':'; the console displays
    // and accepts `"key": value`.
    match metadata {
        Value::Object(map) => {
            let pairs: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", Value::String(k.clone()), v))
                .collect();
            format!("{{{}}}", pairs.join(", "))
        }
        other => other.to_string(),
    }
}

fn is_secret_label(label: &str) -> bool {
    let label = label.to_ascii_lowercase();
    ["token", "key", "password", "secret"]
        .iter()
        .any(|word| label.contains(word))
        && !label.contains("keystore")
}

fn creation_failed(
    kind: EntityKind,
    error: E2eError,
    fields: BTreeMap<String, String>,
) -> E2eError {
    match error {
        already @ E2eError::CreationFailed { .. } => already,
        other => E2eError::CreationFailed {
            kind: kind.to_string(),
            reason: other.to_string(),
            fields,
        },
    }
}

fn require_non_empty(
    kind: EntityKind,
    fields: &BTreeMap<String, String>,
) -> E2eResult<()> {
    if let Some((label, _)) = fields.iter().find(|(_, v)| v.trim().is_empty()) {
        return Err(E2eError::CreationFailed {
            kind: kind.to_string(),
            reason: format!("required field '{}' is empty", label),
            fields: fields.clone(),
        });
    }
    Ok(())
}

/// Creates entities and registers them with the running scenario
pub struct EntityFactory<'a> {
    browser: &'a mut dyn Browser,
    ctx: &'a mut ScenarioContext,
    base_url: &'a str,
    timeouts: &'a Timeouts,
}

impl<'a> EntityFactory<'a> {
    pub fn new(
        browser: &'a mut dyn Browser,
        ctx: &'a mut ScenarioContext,
        base_url: &'a str,
        timeouts: &'a Timeouts,
    ) -> Self {
        Self {
            browser,
            ctx,
            base_url,
            timeouts,
        }
    }

    fn expect(&mut self) -> Expect<'_> {
        Expect::new(&mut *self.browser, self.timeouts)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn create_project(&mut self, fields: &ProjectFields) -> E2eResult<TestIdentity> {
        self.ctx.begin("create_project");
        let snapshot = fields.snapshot();
        require_non_empty(EntityKind::Project, &snapshot)?;

        self.submit_project(fields)
            .await
            .map_err(|e| creation_failed(EntityKind::Project, e, snapshot))?;
        self.ctx.register(EntityRecord::project(fields.id.clone()));
        info!(id = %fields.id, "Created project");

        self.expect().visible(&Locator::heading(&fields.name)).await?;
        Ok(fields.id.clone())
    }

    async fn submit_project(&mut self, fields: &ProjectFields) -> E2eResult<()> {
        let element = self.timeouts.element();
        let url = self.url("/config/projects/new");
        self.browser.goto(&url, self.timeouts.navigation()).await?;
        self.expect().text(&Locator::css("h1"), "New Project").await?;

        let id_input = Locator::label("Project ID");
        self.browser.fill(&id_input, fields.id.as_str(), element).await?;
        self.expect().field_value(&id_input, fields.id.as_str()).await?;
        self.browser.fill(&Locator::label("Project Name"), &fields.name, element).await?;
        if fields.active {
            self.browser.check(&Locator::label("Is Active"), element).await?;
        }
        self.browser
            .fill(&Locator::label("Project Description"), &fields.description, element)
            .await?;
        self.browser.click(&Locator::button("Update Project"), element).await?;

        self.expect().url(&format!("**/config/projects/{}", fields.id)).await?;
        Ok(())
    }

    pub async fn create_site(
        &mut self,
        project: &TestIdentity,
        fields: &SiteFields,
    ) -> E2eResult<TestIdentity> {
        self.ctx.begin("create_site");
        let snapshot = fields.snapshot();
        require_non_empty(EntityKind::Site, &snapshot)?;

        self.submit_site(project, fields)
            .await
            .map_err(|e| creation_failed(EntityKind::Site, e, snapshot))?;
        self.ctx.register(EntityRecord::site(project.clone(), fields.id.clone()));
        info!(project = %project, id = %fields.id, "Created site");

        self.expect().visible(&Locator::text_exact(&fields.name)).await?;
        Ok(fields.id.clone())
    }

    async fn submit_site(&mut self, project: &TestIdentity, fields: &SiteFields) -> E2eResult<()> {
        let element = self.timeouts.element();
        let project_path = format!("/config/projects/{}", project);

        let url = self.url(&project_path);
        self.browser.goto(&url, self.timeouts.navigation()).await?;
        self.expect().url(&format!("**{}", project_path)).await?;
        self.expect().visible(&Locator::text(project.as_str())).await?;

        let add_site = Locator::link("Add Site");
        self.expect().visible(&add_site).await?;
        self.browser.click(&add_site, element).await?;
        self.expect().url(&format!("**{}/sites/new", project_path)).await?;
        self.expect()
            .text(&Locator::css("h1"), &format!("Adding Site for {}", project))
            .await?;

        self.browser.fill(&Locator::label("Site ID"), fields.id.as_str(), element).await?;
        self.browser.fill(&Locator::label("Site Name"), &fields.name, element).await?;
        if fields.active {
            self.browser.check(&Locator::label("Is Active"), element).await?;
        }
        self.browser
            .fill(&Locator::label("Site Description"), &fields.description, element)
            .await?;
        self.browser.click(&Locator::button("Create Site"), element).await?;

        self.expect()
            .url(&format!("**{}/sites/{}", project_path, fields.id))
            .await?;
        Ok(())
    }

    /// Open a site's detail page and wait for its breadcrumb links.
    pub async fn open_site(
        &mut self,
        project: &TestIdentity,
        site: &TestIdentity,
    ) -> E2eResult<()> {
        let site_path = format!("/config/projects/{}/sites/{}", project, site);
        let url = self.url(&site_path);
        self.browser.goto(&url, self.timeouts.navigation()).await?;
        self.expect().url(&format!("**{}", site_path)).await?;
        self.expect().visible(&Locator::link(project.as_str())).await?;
        self.expect().visible(&Locator::link(site.as_str())).await?;
        Ok(())
    }

    pub async fn create_data_source(
        &mut self,
        project: &TestIdentity,
        site: &TestIdentity,
        form: &SourceForm,
        fields: &DataSourceFields,
    ) -> E2eResult<TestIdentity> {
        let kind = EntityKind::DataSource(form.variant);
        self.ctx.begin(format!("create_{}_data_source", form.variant));

        let mut snapshot: BTreeMap<String, String> = fields
            .values
            .iter()
            .map(|f| {
                let value = if f.secret || is_secret_label(&f.label) {
                    REDACTED.to_string()
                } else {
                    f.value.clone()
                };
                (f.label.clone(), value)
            })
            .collect();
        snapshot.insert(form.instance_label.clone(), fields.instance_name.to_string());
        if let Some(f) = fields.values.iter().find(|f| f.value.trim().is_empty()) {
            return Err(E2eError::CreationFailed {
                kind: kind.to_string(),
                reason: format!("required field '{}' is empty", f.label),
                fields: snapshot,
            });
        }

        self.submit_data_source(project, site, form, fields)
            .await
            .map_err(|e| creation_failed(kind, e, snapshot))?;
        self.ctx.register(EntityRecord::data_source(
            project.clone(),
            site.clone(),
            form.variant,
            fields.instance_name.clone(),
        ));
        info!(site = %site, id = %fields.instance_name, "Created {}", kind);

        self.expect()
            .visible(&Locator::text_exact(fields.instance_name.as_str()))
            .await?;
        Ok(fields.instance_name.clone())
    }

    async fn submit_data_source(
        &mut self,
        project: &TestIdentity,
        site: &TestIdentity,
        form: &SourceForm,
        fields: &DataSourceFields,
    ) -> E2eResult<()> {
        let element = self.timeouts.element();
        self.open_site(project, site).await?;

        let add_source = Locator::button("Add Data Source");
        self.expect().visible(&add_source).await?;
        self.browser.click(&add_source, element).await?;

        // Generated ids embed the variant name, so the breadcrumbs would also match
        let menu = Locator::role_exact(Role::Link, &form.menu_link);
        self.expect().visible(&menu).await?;
        self.browser.click(&menu, element).await?;

        let sources_path = format!(
            "**/config/projects/{}/sites/{}/data-sources/{}",
            project,
            site,
            form.variant.slug()
        );
        self.expect().url(&format!("{}/new", sources_path)).await?;
        self.expect().text(&Locator::css("h1"), &form.heading).await?;

        self.browser
            .fill(&Locator::label(&form.instance_label), fields.instance_name.as_str(), element)
            .await?;
        for field in &fields.values {
            self.browser.fill(&Locator::label(&field.label), &field.value, element).await?;
        }
        for checkbox in &fields.checkboxes {
            self.browser.check(&Locator::label(checkbox), element).await?;
        }
        self.browser.click(&Locator::button(&form.submit), element).await?;

        self.expect()
            .url(&format!("{}/{}", sources_path, fields.instance_name))
            .await?;
        Ok(())
    }

    pub async fn create_data_sink(
        &mut self,
        project: &TestIdentity,
        site: &TestIdentity,
        fields: &SinkFields,
    ) -> E2eResult<TestIdentity> {
        self.ctx.begin("create_data_sink");
        let snapshot = fields.snapshot();
        require_non_empty(EntityKind::DataSink, &snapshot)?;

        self.submit_data_sink(project, site, fields)
            .await
            .map_err(|e| creation_failed(EntityKind::DataSink, e, snapshot))?;
        self.ctx.register(EntityRecord::data_sink(
            project.clone(),
            site.clone(),
            fields.name.clone(),
        ));
        info!(site = %site, id = %fields.name, "Created data sink");

        self.browser
            .click(&Locator::tab("Data Sinks"), self.timeouts.element())
            .await?;
        self.expect().visible(&Locator::text_exact(fields.name.as_str())).await?;
        Ok(fields.name.clone())
    }

    async fn submit_data_sink(
        &mut self,
        project: &TestIdentity,
        site: &TestIdentity,
        fields: &SinkFields,
    ) -> E2eResult<()> {
        let element = self.timeouts.element();
        self.open_site(project, site).await?;

        self.browser.click(&Locator::tab("Data Sinks"), element).await?;
        let add_sink = Locator::link("Add Data Sink");
        self.expect().visible(&add_sink).await?;
        self.browser.click(&add_sink, element).await?;

        let site_path = format!("**/config/projects/{}/sites/{}", project, site);
        self.expect().url(&format!("{}/data-sinks/new", site_path)).await?;
        self.expect().text(&Locator::css("h1"), "Add Data Sink").await?;

        self.browser
            .fill(&Locator::css(r#"input[name="data_sink_name"]"#), fields.name.as_str(), element)
            .await?;
        self.browser
            .fill(
                &Locator::css(r#"textarea[name="data_sink_metadata"]"#),
                &metadata_text(&fields.metadata),
                element,
            )
            .await?;
        self.browser.click(&Locator::button("Create Data Sink"), element).await?;

        self.expect().url(&site_path).await?;
        Ok(())
    }
}
