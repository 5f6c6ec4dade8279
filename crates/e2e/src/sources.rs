//! Declarative data-source form table
//!
//! Each row describes how to create one data-source variant through the
//! console: which menu link opens the form, the heading to expect, the
//! labelled fields to fill and which values the detail page must show.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::RedcapCredentials;
use crate::entity::SourceVariant;
use crate::error::{E2eError, E2eResult};
use crate::identity::TestIdentity;

const BUILTIN_TABLE: &str = include_str!("../fixtures/data_sources.yaml");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceField {
    pub label: String,
    pub value: String,
    /// Must appear on the detail page
    #[serde(default)]
    pub shown: bool,
    /// Redacted from error reports
    #[serde(default)]
    pub secret: bool,
}

/// How to create one data-source variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceForm {
    pub variant: SourceVariant,
    pub menu_link: String,
    pub heading: String,
    pub instance_label: String,
    pub instance_prefix: String,
    pub submit: String,
    #[serde(default)]
    pub fields: Vec<SourceField>,
    #[serde(default)]
    pub checkboxes: Vec<String>,
}

impl SourceForm {
    /// Concrete field values for one creation, with placeholders substituted.
    pub fn fields_for(&self, redcap: &RedcapCredentials) -> DataSourceFields {
        let values = self
            .fields
            .iter()
            .map(|f| SourceField {
                label: f.label.clone(),
                value: f
                    .value
                    .replace("{redcap_api_address}", &redcap.api_address)
                    .replace("{redcap_api_token}", redcap.token.as_str()),
                shown: f.shown,
                secret: f.secret,
            })
            .collect();

        DataSourceFields {
            instance_name: TestIdentity::generate(&self.instance_prefix),
            values,
            checkboxes: self.checkboxes.clone(),
        }
    }
}

/// Filled-in values for one data-source creation
#[derive(Debug, Clone)]
pub struct DataSourceFields {
    pub instance_name: TestIdentity,
    pub values: Vec<SourceField>,
    pub checkboxes: Vec<String>,
}

impl DataSourceFields {
    /// Values the detail page must display.
    pub fn shown(&self) -> impl Iterator<Item = &str> {
        self.values.iter().filter(|f| f.shown).map(|f| f.value.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct TableFile {
    sources: Vec<SourceForm>,
}

#[derive(Debug, Clone)]
pub struct SourceTable {
    rows: Vec<SourceForm>,
}

impl SourceTable {
    /// The table shipped with the crate.
    pub fn builtin() -> E2eResult<Self> {
        Self::from_yaml(BUILTIN_TABLE)
    }

    pub fn from_file(path: &Path) -> E2eResult<Self> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let file: TableFile = serde_yaml::from_str(yaml)?;
        let mut seen = BTreeSet::new();
        for row in &file.sources {
            if !seen.insert(row.variant) {
                return Err(E2eError::Configuration(format!(
                    "data source table lists '{}' more than once",
                    row.variant
                )));
            }
            let blank = [&row.menu_link, &row.heading, &row.instance_label, &row.submit]
                .iter()
                .any(|s| s.trim().is_empty());
            if blank || row.fields.iter().any(|f| f.label.trim().is_empty()) {
                return Err(E2eError::Configuration(format!(
                    "data source table row '{}' has an empty label",
                    row.variant
                )));
            }
        }
        Ok(Self { rows: file.sources })
    }

    pub fn get(&self, variant: SourceVariant) -> Option<&SourceForm> {
        self.rows.iter().find(|r| r.variant == variant)
    }

    pub fn rows(&self) -> &[SourceForm] {
        &self.rows
    }
}
