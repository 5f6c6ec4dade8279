//! Test doubles for the integration suites
//!
//! [`Console`] is an in-memory stand-in for the Lochness WebUI: it implements
//! [`Browser`] with the routes, headings, labels and controls the harness
//! drives, and serves the REST endpoints from an axum stub bound to a local
//! port. Both views share one state, so an entity created through the
//! simulated UI is visible to the API and a DELETE removes it from the pages.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path as FsPath, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde_json::{json, Value};

use lochness_e2e::browser::{Browser, Cookie, Locator, Role};
use lochness_e2e::config::{HarnessConfig, SessionScope, Timeouts};
use lochness_e2e::entity::SourceVariant;
use lochness_e2e::sources::SourceTable;
use lochness_e2e::{E2eError, E2eResult, TestRunner};

pub const OPERATOR_EMAIL: &str = "operator@example.org";
pub const OPERATOR_PASSWORD: &str = "correct-horse";
pub const SESSION_COOKIE: &str = "session";
const TITLE: &str = "Lochness - WebUI";
const SINK_EDIT_CONTROL: &str = r#"[data-slot="button"]:has-text("Edit")"#;
const SINK_NAME_INPUT: &str = r#"input[name="data_sink_name"]"#;
const SINK_METADATA_INPUT: &str = r#"textarea[name="data_sink_metadata"]"#;
const SINK_EDIT_TEXTAREA: &str = r#"[data-slot="textarea"]"#;

#[derive(Debug, Clone, Default)]
pub struct Project {
    pub name: String,
    pub description: String,
    pub sites: BTreeMap<String, Site>,
}

#[derive(Debug, Clone, Default)]
pub struct Site {
    pub name: String,
    pub description: String,
    pub sources: BTreeMap<String, Source>,
    pub sinks: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Source {
    pub variant: SourceVariant,
    /// (label, value, secret)
    pub values: Vec<(String, String, bool)>,
}

struct ConsoleState {
    base: String,
    url: String,
    forms: SourceTable,

    session: Option<String>,
    issued: u32,
    logins: u32,
    logouts: u32,
    login_error: bool,
    /// Home page renders neither auth marker
    blank_home: bool,

    form: HashMap<String, String>,
    checked: HashSet<String>,
    sinks_tab: bool,
    menu_open: bool,
    dialog_armed: bool,

    projects: BTreeMap<String, Project>,

    deletes: Vec<String>,
    /// Whether each DELETE carried the live session cookie
    delete_auth: Vec<bool>,
    reject: HashMap<String, u16>,
    visits: Vec<String>,
    screenshots: Vec<PathBuf>,
}

type Shared = Arc<Mutex<ConsoleState>>;

#[derive(Debug, Clone, PartialEq)]
enum Route {
    Home,
    Login,
    NewProject,
    Project(String),
    NewSite(String),
    Site(String, String),
    NewSource(String, String, SourceVariant),
    SourceDetail(String, String, SourceVariant, String),
    NewSink(String, String),
    Sink(String, String, String),
    EditSink(String, String, String),
    Unknown,
}

/// What the current page renders
#[derive(Debug, Default)]
struct View {
    h1: Option<String>,
    headings: Vec<String>,
    texts: Vec<String>,
    buttons: Vec<String>,
    links: Vec<String>,
    tabs: Vec<String>,
    labels: Vec<String>,
    css: Vec<String>,
}

fn name_matches(candidate: &str, name: &str, exact: bool) -> bool {
    if exact {
        candidate.trim() == name
    } else {
        candidate.to_lowercase().contains(&name.to_lowercase())
    }
}

impl View {
    fn matches(&self, locator: &Locator) -> Vec<String> {
        match locator {
            Locator::Label { text } => self.labels.iter().filter(|l| *l == text).cloned().collect(),
            Locator::Role { role, name, exact } => {
                let pool = match role {
                    Role::Button => &self.buttons,
                    Role::Link => &self.links,
                    Role::Heading => &self.headings,
                    Role::Tab => &self.tabs,
                    Role::Checkbox | Role::Textbox => &self.labels,
                };
                pool.iter()
                    .filter(|c| name_matches(c, name, *exact))
                    .cloned()
                    .collect()
            }
            Locator::Text { text, exact } => self
                .h1
                .iter()
                .chain(&self.headings)
                .chain(&self.texts)
                .chain(&self.buttons)
                .chain(&self.links)
                .chain(&self.tabs)
                .filter(|c| name_matches(c, text, *exact))
                .cloned()
                .collect(),
            Locator::Css { selector } if selector == "h1" => self.h1.iter().cloned().collect(),
            Locator::Css { selector } => {
                self.css.iter().filter(|c| *c == selector).cloned().collect()
            }
        }
    }

    fn first(&self, locator: &Locator) -> Option<String> {
        self.matches(locator).into_iter().next()
    }
}

fn form_key(locator: &Locator) -> String {
    match locator {
        Locator::Label { text } => text.clone(),
        Locator::Css { selector } => selector.clone(),
        other => other.to_string(),
    }
}

impl ConsoleState {
    fn route(&self) -> Route {
        let path = self.url.strip_prefix(&self.base).unwrap_or("/");
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let variant = |slug: &str| SourceVariant::ALL.into_iter().find(|v| v.slug() == slug);
        let owned = |s: &str| s.to_string();

        match segments.as_slice() {
            [] => Route::Home,
            ["auth", "login"] => Route::Login,
            ["config", "projects", "new"] => Route::NewProject,
            ["config", "projects", p] => Route::Project(owned(p)),
            ["config", "projects", p, "sites", "new"] => Route::NewSite(owned(p)),
            ["config", "projects", p, "sites", s] => Route::Site(owned(p), owned(s)),
            ["config", "projects", p, "sites", s, "data-sources", slug, "new"] => {
                match variant(slug) {
                    Some(v) => Route::NewSource(owned(p), owned(s), v),
                    None => Route::Unknown,
                }
            }
            ["config", "projects", p, "sites", s, "data-sources", slug, x] => match variant(slug) {
                Some(v) => Route::SourceDetail(owned(p), owned(s), v, owned(x)),
                None => Route::Unknown,
            },
            ["config", "projects", p, "sites", s, "data-sinks", "new"] => {
                Route::NewSink(owned(p), owned(s))
            }
            ["config", "projects", p, "sites", s, "data-sinks", k] => {
                Route::Sink(owned(p), owned(s), owned(k))
            }
            ["config", "projects", p, "sites", s, "data-sinks", k, "edit"] => {
                Route::EditSink(owned(p), owned(s), owned(k))
            }
            _ => Route::Unknown,
        }
    }

    fn site(&self, p: &str, s: &str) -> Option<&Site> {
        self.projects.get(p).and_then(|project| project.sites.get(s))
    }

    fn site_mut(&mut self, p: &str, s: &str) -> Option<&mut Site> {
        self.projects.get_mut(p).and_then(|project| project.sites.get_mut(s))
    }

    fn not_found(view: &mut View, what: &str) {
        let heading = format!("{} not found", what);
        view.h1 = Some(heading.clone());
        view.headings.push(heading);
    }

    fn view(&self) -> View {
        let mut view = View::default();

        match self.session {
            Some(_) => view.buttons.push("Logout".into()),
            None => view.texts.push("Not Logged In".into()),
        }

        match self.route() {
            Route::Home => {
                if self.blank_home {
                    return View::default();
                }
                view.h1 = Some("Lochness".into());
                if self.session.is_some() {
                    view.texts.push(format!("Welcome, {}", OPERATOR_EMAIL));
                }
            }
            Route::Login => {
                view.h1 = Some("Login".into());
                view.labels.extend(["Email".to_string(), "Password".to_string()]);
                view.buttons.push("Login".into());
                if self.login_error {
                    view.texts.push("Invalid email or password".into());
                }
            }
            Route::NewProject => {
                view.h1 = Some("New Project".into());
                view.labels.extend(
                    ["Project ID", "Project Name", "Is Active", "Project Description"]
                        .map(String::from),
                );
                view.buttons.push("Update Project".into());
            }
            Route::Project(p) => match self.projects.get(&p) {
                Some(project) => {
                    view.h1 = Some(project.name.clone());
                    view.headings.push(project.name.clone());
                    view.texts.extend([p.clone(), project.description.clone()]);
                    view.links.push("Add Site".into());
                    for (id, site) in &project.sites {
                        view.links.push(id.clone());
                        view.texts.push(site.name.clone());
                    }
                }
                None => Self::not_found(&mut view, "Project"),
            },
            Route::NewSite(p) => {
                if self.projects.contains_key(&p) {
                    view.h1 = Some(format!("Adding Site for {}", p));
                    view.labels.extend(
                        ["Site ID", "Site Name", "Is Active", "Site Description"].map(String::from),
                    );
                    view.buttons.push("Create Site".into());
                } else {
                    Self::not_found(&mut view, "Project");
                }
            }
            Route::Site(p, s) => match self.site(&p, &s) {
                Some(site) => {
                    view.links.extend([p.clone(), s.clone()]);
                    view.texts.extend([s.clone(), site.name.clone(), site.description.clone()]);
                    view.buttons.extend(["Add Data Source".to_string(), "Delete Site".to_string()]);
                    view.tabs.extend(["Data Sources".to_string(), "Data Sinks".to_string()]);
                    if self.menu_open {
                        view.links.extend(self.forms.rows().iter().map(|f| f.menu_link.clone()));
                    }
                    if self.sinks_tab {
                        view.links.push("Add Data Sink".into());
                        view.links.extend(site.sinks.keys().cloned());
                    } else {
                        view.texts.extend(site.sources.keys().cloned());
                    }
                }
                None => Self::not_found(&mut view, "Site"),
            },
            Route::NewSource(p, s, variant) => match (self.site(&p, &s), self.forms.get(variant)) {
                (Some(_), Some(form)) => {
                    view.h1 = Some(form.heading.clone());
                    view.labels.push(form.instance_label.clone());
                    view.labels.extend(form.fields.iter().map(|f| f.label.clone()));
                    view.labels.extend(form.checkboxes.iter().cloned());
                    view.buttons.push(form.submit.clone());
                }
                _ => Self::not_found(&mut view, "Site"),
            },
            Route::SourceDetail(p, s, _, x) => {
                match self.site(&p, &s).and_then(|site| site.sources.get(&x)) {
                    Some(source) => {
                        view.h1 = Some(x.clone());
                        view.links.extend([p.clone(), s.clone()]);
                        view.texts.push(x.clone());
                        view.texts.extend(
                            source
                                .values
                                .iter()
                                .filter(|(_, _, secret)| !secret)
                                .map(|(_, value, _)| value.clone()),
                        );
                    }
                    None => Self::not_found(&mut view, "Data source"),
                }
            }
            Route::NewSink(p, s) => {
                if self.site(&p, &s).is_some() {
                    view.h1 = Some("Add Data Sink".into());
                    view.css.extend([SINK_NAME_INPUT.to_string(), SINK_METADATA_INPUT.to_string()]);
                    view.buttons.push("Create Data Sink".into());
                } else {
                    Self::not_found(&mut view, "Site");
                }
            }
            Route::Sink(p, s, k) => match self.site(&p, &s).and_then(|site| site.sinks.get(&k)) {
                Some(metadata) => {
                    view.h1 = Some(k.clone());
                    view.links.extend([p.clone(), s.clone()]);
                    view.texts.extend([k.clone(), metadata.clone()]);
                    view.buttons.extend(["Edit".to_string(), "Delete".to_string()]);
                    view.css.push(SINK_EDIT_CONTROL.into());
                }
                None => Self::not_found(&mut view, "Data sink"),
            },
            Route::EditSink(p, s, k) => {
                if self.site(&p, &s).map(|site| site.sinks.contains_key(&k)) == Some(true) {
                    view.h1 = Some("Edit Data Sink".into());
                    view.css.push(SINK_EDIT_TEXTAREA.into());
                    view.buttons.push("Update Data Sink".into());
                } else {
                    Self::not_found(&mut view, "Data sink");
                }
            }
            Route::Unknown => Self::not_found(&mut view, "Page"),
        }
        view
    }

    /// Load a page as a fresh document.
    fn navigate(&mut self, path: &str) {
        self.url = format!("{}{}", self.base, path);
        self.form.clear();
        self.checked.clear();
        self.sinks_tab = false;
        self.menu_open = false;
        self.login_error = false;

        let protected = !matches!(self.route(), Route::Home | Route::Login | Route::Unknown);
        if protected && self.session.is_none() {
            self.url = format!("{}/auth/login", self.base);
        }
        if let Route::EditSink(p, s, k) = self.route() {
            if let Some(metadata) = self.site(&p, &s).and_then(|site| site.sinks.get(&k)).cloned() {
                self.form.insert(SINK_EDIT_TEXTAREA.into(), metadata);
            }
        }
    }

    fn field(&self, key: &str) -> String {
        self.form.get(key).cloned().unwrap_or_default()
    }

    fn activate(&mut self, target: &str) {
        match self.route() {
            _ if target == "Logout" => {
                self.session = None;
                self.logouts += 1;
                self.navigate("/auth/login");
            }
            Route::Login if target == "Login" => {
                if self.field("Email") == OPERATOR_EMAIL
                    && self.field("Password") == OPERATOR_PASSWORD
                {
                    self.issued += 1;
                    self.logins += 1;
                    self.session = Some(format!("sim-{}", self.issued));
                    self.navigate("/");
                } else {
                    self.login_error = true;
                }
            }
            Route::NewProject if target == "Update Project" => {
                let id = self.field("Project ID");
                if id.is_empty() || self.projects.contains_key(&id) {
                    return;
                }
                self.projects.insert(
                    id.clone(),
                    Project {
                        name: self.field("Project Name"),
                        description: self.field("Project Description"),
                        sites: BTreeMap::new(),
                    },
                );
                self.navigate(&format!("/config/projects/{}", id));
            }
            Route::Project(p) if target == "Add Site" => {
                self.navigate(&format!("/config/projects/{}/sites/new", p));
            }
            Route::Project(p)
                if self.projects.get(&p).map(|project| project.sites.contains_key(target))
                    == Some(true) =>
            {
                self.navigate(&format!("/config/projects/{}/sites/{}", p, target));
            }
            Route::NewSite(p) if target == "Create Site" => {
                let id = self.field("Site ID");
                let site = Site {
                    name: self.field("Site Name"),
                    description: self.field("Site Description"),
                    ..Site::default()
                };
                if let Some(project) = self.projects.get_mut(&p) {
                    if !id.is_empty() && !project.sites.contains_key(&id) {
                        project.sites.insert(id.clone(), site);
                        self.navigate(&format!("/config/projects/{}/sites/{}", p, id));
                    }
                }
            }
            Route::Site(p, s) => {
                let base = format!("/config/projects/{}/sites/{}", p, s);
                let menu = self
                    .forms
                    .rows()
                    .iter()
                    .find(|f| f.menu_link == target)
                    .map(|f| f.variant);
                let is_sink = self
                    .site(&p, &s)
                    .is_some_and(|site| site.sinks.contains_key(target));
                match target {
                    "Add Data Source" => self.menu_open = true,
                    "Data Sinks" => self.sinks_tab = true,
                    "Data Sources" => self.sinks_tab = false,
                    "Add Data Sink" => self.navigate(&format!("{}/data-sinks/new", base)),
                    "Delete Site" => {
                        if let Some(project) = self.projects.get_mut(&p) {
                            project.sites.remove(&s);
                        }
                        self.navigate(&format!("/config/projects/{}", p));
                    }
                    _ if menu.is_some() => {
                        if let Some(variant) = menu {
                            self.navigate(&format!("{}/data-sources/{}/new", base, variant.slug()));
                        }
                    }
                    _ if is_sink => self.navigate(&format!("{}/data-sinks/{}", base, target)),
                    _ if target == p => self.navigate(&format!("/config/projects/{}", p)),
                    _ => {}
                }
            }
            Route::NewSource(p, s, variant) => {
                let Some(form) = self.forms.get(variant).cloned() else { return };
                if target != form.submit {
                    return;
                }
                let name = self.field(&form.instance_label);
                if name.is_empty() {
                    return;
                }
                let values = form
                    .fields
                    .iter()
                    .map(|f| (f.label.clone(), self.field(&f.label), f.secret))
                    .collect();
                if let Some(site) = self.site_mut(&p, &s) {
                    site.sources.insert(name.clone(), Source { variant, values });
                }
                self.navigate(&format!(
                    "/config/projects/{}/sites/{}/data-sources/{}/{}",
                    p,
                    s,
                    variant.slug(),
                    name
                ));
            }
            Route::NewSink(p, s) if target == "Create Data Sink" => {
                let name = self.field(SINK_NAME_INPUT);
                let metadata = self.field(SINK_METADATA_INPUT);
                if name.is_empty() || serde_json::from_str::<Value>(&metadata).is_err() {
                    return;
                }
                if let Some(site) = self.site_mut(&p, &s) {
                    site.sinks.insert(name, metadata);
                }
                self.navigate(&format!("/config/projects/{}/sites/{}", p, s));
            }
            Route::Sink(p, s, k) => {
                let sink_path = format!("/config/projects/{}/sites/{}/data-sinks/{}", p, s, k);
                if target == SINK_EDIT_CONTROL || target == "Edit" {
                    self.navigate(&format!("{}/edit", sink_path));
                } else if target == "Delete" {
                    // Unarmed confirm dialogs are dismissed
                    if std::mem::take(&mut self.dialog_armed) {
                        if let Some(site) = self.site_mut(&p, &s) {
                            site.sinks.remove(&k);
                        }
                        self.navigate(&format!("/config/projects/{}/sites/{}", p, s));
                    }
                }
            }
            Route::EditSink(p, s, k) if target == "Update Data Sink" => {
                let metadata = self.field(SINK_EDIT_TEXTAREA);
                if serde_json::from_str::<Value>(&metadata).is_err() {
                    return;
                }
                if let Some(site) = self.site_mut(&p, &s) {
                    site.sinks.insert(k.clone(), metadata);
                }
                self.navigate(&format!("/config/projects/{}/sites/{}/data-sinks/{}", p, s, k));
            }
            _ => {}
        }
    }
}

/// Simulated Lochness WebUI plus its REST API
#[derive(Clone)]
pub struct Console {
    state: Shared,
}

impl Console {
    /// Bind the stub API on an ephemeral port and return the console.
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let state: Shared = Arc::new(Mutex::new(ConsoleState {
            url: "about:blank".into(),
            base,
            forms: SourceTable::builtin().unwrap(),
            session: None,
            issued: 0,
            logins: 0,
            logouts: 0,
            login_error: false,
            blank_home: false,
            form: HashMap::new(),
            checked: HashSet::new(),
            sinks_tab: false,
            menu_open: false,
            dialog_armed: false,
            projects: BTreeMap::new(),
            deletes: Vec::new(),
            delete_auth: Vec::new(),
            reject: HashMap::new(),
            visits: Vec::new(),
            screenshots: Vec::new(),
        }));

        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { state }
    }

    fn lock(&self) -> MutexGuard<'_, ConsoleState> {
        self.state.lock().unwrap()
    }

    pub fn base_url(&self) -> String {
        self.lock().base.clone()
    }

    pub fn has_project(&self, id: &str) -> bool {
        self.lock().projects.contains_key(id)
    }

    pub fn project(&self, id: &str) -> Option<Project> {
        self.lock().projects.get(id).cloned()
    }

    pub fn project_ids(&self) -> Vec<String> {
        self.lock().projects.keys().cloned().collect()
    }

    /// Paths of every DELETE the API received, in order
    pub fn deletes(&self) -> Vec<String> {
        self.lock().deletes.clone()
    }

    /// For each DELETE, whether it was sent with the current session cookie
    pub fn delete_auth(&self) -> Vec<bool> {
        self.lock().delete_auth.clone()
    }

    pub fn visits(&self) -> Vec<String> {
        self.lock().visits.clone()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.lock().screenshots.clone()
    }

    pub fn logins(&self) -> u32 {
        self.lock().logins
    }

    pub fn logouts(&self) -> u32 {
        self.lock().logouts
    }

    pub fn logged_in(&self) -> bool {
        self.lock().session.is_some()
    }

    /// Answer DELETE `path` with `status` instead of deleting.
    pub fn reject_delete(&self, path: &str, status: u16) {
        self.lock().reject.insert(path.to_string(), status);
    }

    /// Render the home page without either auth marker.
    pub fn hide_auth_markers(&self) {
        self.lock().blank_home = true;
    }

    pub fn seed_project(&self, id: &str) {
        self.lock().projects.insert(
            id.to_string(),
            Project {
                name: format!("Seeded {}", id),
                ..Project::default()
            },
        );
    }

    pub fn seed_site(&self, project: &str, site: &str) {
        if let Some(p) = self.lock().projects.get_mut(project) {
            p.sites.insert(
                site.to_string(),
                Site {
                    name: format!("Seeded {}", site),
                    ..Site::default()
                },
            );
        }
    }

    pub fn seed_source(&self, project: &str, site: &str, variant: SourceVariant, name: &str) {
        if let Some(s) = self.lock().site_mut(project, site) {
            s.sources.insert(
                name.to_string(),
                Source {
                    variant,
                    values: Vec::new(),
                },
            );
        }
    }

    pub fn seed_sink(&self, project: &str, site: &str, name: &str) {
        if let Some(s) = self.lock().site_mut(project, site) {
            s.sinks.insert(name.to_string(), "{}".to_string());
        }
    }

    fn not_actionable(locator: &Locator, found: usize, timeout: Duration) -> E2eError {
        if found == 0 {
            E2eError::Timeout(format!("{} not actionable within {:?}", locator, timeout))
        } else {
            E2eError::Playwright(format!(
                "strict mode violation: {} resolved to {} elements",
                locator, found
            ))
        }
    }

    /// The single element an action targets, Playwright strict-mode style.
    fn target(state: &ConsoleState, locator: &Locator, timeout: Duration) -> E2eResult<String> {
        let matches = state.view().matches(locator);
        match matches.as_slice() {
            [one] => Ok(one.clone()),
            _ => Err(Self::not_actionable(locator, matches.len(), timeout)),
        }
    }
}

#[async_trait]
impl Browser for Console {
    async fn goto(&mut self, url: &str, _timeout: Duration) -> E2eResult<()> {
        let mut state = self.lock();
        state.visits.push(url.to_string());
        match url.strip_prefix(&state.base) {
            Some(path) => {
                let path = if path.is_empty() { "/".to_string() } else { path.to_string() };
                state.navigate(&path);
                Ok(())
            }
            None => Err(E2eError::Playwright(format!("net::ERR_CONNECTION_REFUSED at {}", url))),
        }
    }

    async fn current_url(&mut self) -> E2eResult<String> {
        Ok(self.lock().url.clone())
    }

    async fn title(&mut self) -> E2eResult<String> {
        Ok(TITLE.to_string())
    }

    async fn is_visible(&mut self, locator: &Locator) -> E2eResult<bool> {
        Ok(self.lock().view().first(locator).is_some())
    }

    async fn text_of(&mut self, locator: &Locator) -> E2eResult<Option<String>> {
        Ok(self.lock().view().first(locator))
    }

    async fn input_value(&mut self, locator: &Locator) -> E2eResult<Option<String>> {
        Ok(self.lock().form.get(&form_key(locator)).cloned())
    }

    async fn fill(&mut self, locator: &Locator, value: &str, timeout: Duration) -> E2eResult<()> {
        let mut state = self.lock();
        Self::target(&state, locator, timeout)?;
        state.form.insert(form_key(locator), value.to_string());
        Ok(())
    }

    async fn check(&mut self, locator: &Locator, timeout: Duration) -> E2eResult<()> {
        let mut state = self.lock();
        let target = Self::target(&state, locator, timeout)?;
        state.checked.insert(target);
        Ok(())
    }

    async fn click(&mut self, locator: &Locator, timeout: Duration) -> E2eResult<()> {
        let mut state = self.lock();
        let target = match locator {
            Locator::Css { selector } => {
                Self::target(&state, locator, timeout)?;
                selector.clone()
            }
            _ => Self::target(&state, locator, timeout)?,
        };
        state.activate(&target);
        Ok(())
    }

    async fn accept_next_dialog(&mut self) -> E2eResult<()> {
        self.lock().dialog_armed = true;
        Ok(())
    }

    async fn screenshot(&mut self, path: &FsPath) -> E2eResult<()> {
        std::fs::write(path, b"\x89PNG simulated")?;
        self.lock().screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn cookies(&mut self) -> E2eResult<Vec<Cookie>> {
        let state = self.lock();
        Ok(state
            .session
            .iter()
            .map(|token| Cookie {
                name: SESSION_COOKIE.into(),
                value: token.clone(),
                domain: "127.0.0.1".into(),
                path: "/".into(),
            })
            .collect())
    }
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/api/v1/keystore", get(keystore))
        .route("/api/v1/projects/:project_id", get(get_project).delete(delete_project))
        .route("/api/v1/projects/:project_id/sites/:site_id", delete(delete_site))
        .route(
            "/api/v1/projects/:project_id/sites/:site_id/sources/:instance",
            delete(delete_source),
        )
        .route(
            "/api/v1/projects/:project_id/sites/:site_id/sinks/:instance",
            delete(delete_sink),
        )
        .with_state(state)
}

async fn home() -> &'static str {
    TITLE
}

async fn get_project(State(state): State<Shared>, Path(project): Path<String>) -> StatusCode {
    if state.lock().unwrap().projects.contains_key(&project) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

fn authenticated(state: &ConsoleState, headers: &HeaderMap) -> bool {
    let cookie = headers.get(header::COOKIE).and_then(|v| v.to_str().ok());
    match (&state.session, cookie) {
        (Some(token), Some(cookie)) => {
            let expected = format!("{}={}", SESSION_COOKIE, token);
            cookie.split("; ").any(|pair| pair == expected)
        }
        _ => false,
    }
}

fn record_delete(
    state: &Shared,
    headers: &HeaderMap,
    path: String,
    remove: impl FnOnce(&mut ConsoleState) -> bool,
) -> (StatusCode, String) {
    let mut state = state.lock().unwrap();
    let auth = authenticated(&state, headers);
    state.deletes.push(path.clone());
    state.delete_auth.push(auth);
    if let Some(status) = state.reject.get(&path).copied() {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, "rejected by stub".to_string());
    }
    if remove(&mut state) {
        (StatusCode::OK, String::new())
    } else {
        (StatusCode::NOT_FOUND, "not found".to_string())
    }
}

async fn delete_project(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(project): Path<String>,
) -> (StatusCode, String) {
    let path = format!("/api/v1/projects/{}", project);
    record_delete(&state, &headers, path, |s| s.projects.remove(&project).is_some())
}

async fn delete_site(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((project, site)): Path<(String, String)>,
) -> (StatusCode, String) {
    let path = format!("/api/v1/projects/{}/sites/{}", project, site);
    record_delete(&state, &headers, path, |s| {
        s.projects
            .get_mut(&project)
            .and_then(|p| p.sites.remove(&site))
            .is_some()
    })
}

async fn delete_source(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((project, site, instance)): Path<(String, String, String)>,
) -> (StatusCode, String) {
    let path = format!("/api/v1/projects/{}/sites/{}/sources/{}", project, site, instance);
    record_delete(&state, &headers, path, |s| {
        s.site_mut(&project, &site)
            .and_then(|site| site.sources.remove(&instance))
            .is_some()
    })
}

async fn delete_sink(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((project, site, instance)): Path<(String, String, String)>,
) -> (StatusCode, String) {
    let path = format!("/api/v1/projects/{}/sites/{}/sinks/{}", project, site, instance);
    record_delete(&state, &headers, path, |s| {
        s.site_mut(&project, &site)
            .and_then(|site| site.sinks.remove(&instance))
            .is_some()
    })
}

async fn keystore(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let state = state.lock().unwrap();
    if !authenticated(&state, &headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "Unauthorized"})));
    }

    match params.get("project_id") {
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Project ID is required"})),
        ),
        Some(project) => (
            StatusCode::OK,
            Json(json!({
                "entries": [{
                    "keystore_name": "cantab_prod",
                    "key_type": "cantab",
                    "project_id": project,
                    "key_metadata": {}
                }]
            })),
        ),
    }
}

/// Harness config pointed at `console`, with tight budgets and scratch paths
/// under `dir`.
pub fn config(console: &Console, dir: &FsPath) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.base_url = console.base_url();
    config.credentials.email = Some(OPERATOR_EMAIL.into());
    config.credentials.password = Some(OPERATOR_PASSWORD.into());
    config.redcap.credential_file = dir.join("no_redcap_cred");
    config.artifacts_dir = dir.join("artifacts");
    config.fixture_store = dir.join("artifacts/shared_test_data.json");
    config.session_scope = SessionScope::Scenario;
    config.timeouts = fast_timeouts();
    config
}

pub fn fast_timeouts() -> Timeouts {
    Timeouts {
        element_ms: 300,
        navigation_ms: 2_000,
        login_ms: 500,
        api_ms: 2_000,
        scenario_ms: 20_000,
        poll_interval_ms: 10,
    }
}

/// A runner driving `console` instead of Playwright.
pub fn runner(console: &Console, config: HarnessConfig) -> TestRunner {
    TestRunner::new(config)
        .unwrap()
        .with_browser(Box::new(console.clone()))
}
