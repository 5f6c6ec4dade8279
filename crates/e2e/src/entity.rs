//! Backend entities the harness creates and removes

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::TestIdentity;

/// Data-source integrations offered by the console
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceVariant {
    Redcap,
    Cantab,
    Xnat,
    Sharepoint,
    Mindlamp,
}

impl SourceVariant {
    pub const ALL: [SourceVariant; 5] = [
        SourceVariant::Redcap,
        SourceVariant::Cantab,
        SourceVariant::Xnat,
        SourceVariant::Sharepoint,
        SourceVariant::Mindlamp,
    ];

    /// Route segment under `data-sources/`
    pub fn slug(&self) -> &'static str {
        match self {
            SourceVariant::Redcap => "redcap",
            SourceVariant::Cantab => "cantab",
            SourceVariant::Xnat => "xnat",
            SourceVariant::Sharepoint => "sharepoint",
            SourceVariant::Mindlamp => "mindlamp",
        }
    }
}

impl fmt::Display for SourceVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "variant", rename_all = "snake_case")]
pub enum EntityKind {
    Project,
    Site,
    DataSource(SourceVariant),
    DataSink,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Project => f.write_str("project"),
            EntityKind::Site => f.write_str("site"),
            EntityKind::DataSource(variant) => write!(f, "{} data source", variant),
            EntityKind::DataSink => f.write_str("data sink"),
        }
    }
}

/// One entity created during a scenario
///
/// `parent_ids` holds the ancestors outermost first: `[project]` for a site,
/// `[project, site]` for sources and sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub kind: EntityKind,
    pub id: TestIdentity,
    pub parent_ids: Vec<TestIdentity>,
}

impl EntityRecord {
    pub fn project(id: TestIdentity) -> Self {
        Self {
            kind: EntityKind::Project,
            id,
            parent_ids: vec![],
        }
    }

    pub fn site(project_id: TestIdentity, id: TestIdentity) -> Self {
        Self {
            kind: EntityKind::Site,
            id,
            parent_ids: vec![project_id],
        }
    }

    pub fn data_source(
        project_id: TestIdentity,
        site_id: TestIdentity,
        variant: SourceVariant,
        id: TestIdentity,
    ) -> Self {
        Self {
            kind: EntityKind::DataSource(variant),
            id,
            parent_ids: vec![project_id, site_id],
        }
    }

    pub fn data_sink(project_id: TestIdentity, site_id: TestIdentity, id: TestIdentity) -> Self {
        Self {
            kind: EntityKind::DataSink,
            id,
            parent_ids: vec![project_id, site_id],
        }
    }

    /// REST route that deletes this entity, or `None` when the record lacks
    /// the ancestors its route needs.
    pub fn delete_path(&self) -> Option<String> {
        let path = match (&self.kind, self.parent_ids.as_slice()) {
            (EntityKind::Project, _) => format!("/api/v1/projects/{}", self.id),
            (EntityKind::Site, [project, ..]) => {
                format!("/api/v1/projects/{}/sites/{}", project, self.id)
            }
            (EntityKind::DataSource(_), [project, site, ..]) => format!(
                "/api/v1/projects/{}/sites/{}/sources/{}",
                project, site, self.id
            ),
            (EntityKind::DataSink, [project, site, ..]) => format!(
                "/api/v1/projects/{}/sites/{}/sinks/{}",
                project, site, self.id
            ),
            _ => return None,
        };
        Some(path)
    }

    /// Whether `other` is one of this record's ancestors.
    pub fn descends_from(&self, other: &EntityRecord) -> bool {
        match other.kind {
            EntityKind::Project => self.parent_ids.first() == Some(&other.id),
            EntityKind::Site => match self.parent_ids.as_slice() {
                [project, site, ..] => {
                    *site == other.id && other.parent_ids.first() == Some(project)
                }
                _ => false,
            },
            _ => false,
        }
    }
}

impl fmt::Display for EntityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}
