//! Scenario catalog

mod data_sinks;
mod data_sources;
mod keystore;
mod projects;
mod smoke;

pub use data_sinks::DataSinkCrud;
pub use data_sources::AddDataSource;
pub use keystore::KeystoreApi;
pub use projects::{
    AddSite, AddSiteToSharedProject, DeleteViaUi, ProjectLifecycle, SharedProject,
    SiteRequiresExistingProject,
};
pub use smoke::{Login, WebuiTitle};

use crate::scenario::Scenario;
use crate::sources::SourceTable;

/// Every scenario in run order. Providers come before the scenarios that
/// require their fixtures.
pub fn catalog(sources: &SourceTable) -> Vec<Box<dyn Scenario>> {
    let mut scenarios: Vec<Box<dyn Scenario>> = vec![
        Box::new(WebuiTitle),
        Box::new(Login),
        Box::new(ProjectLifecycle),
        Box::new(AddSite),
        Box::new(SiteRequiresExistingProject),
        Box::new(SharedProject),
        Box::new(AddSiteToSharedProject),
    ];
    scenarios.extend(
        sources
            .rows()
            .iter()
            .map(|row| Box::new(AddDataSource::new(row.variant)) as Box<dyn Scenario>),
    );
    scenarios.push(Box::new(DataSinkCrud));
    scenarios.push(Box::new(DeleteViaUi));
    scenarios.push(Box::new(KeystoreApi));
    scenarios
}
