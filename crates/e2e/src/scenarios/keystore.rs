//! Keystore lookup API

use async_trait::async_trait;
use tracing::info;

use crate::api::KeystoreListing;
use crate::context::FixtureBundle;
use crate::error::{E2eError, E2eResult};
use crate::factory::ProjectFields;
use crate::scenario::{Scenario, ScenarioCx};

const PROJECT_ID_REQUIRED: &str = "Project ID is required";

pub struct KeystoreApi;

#[async_trait]
impl Scenario for KeystoreApi {
    fn name(&self) -> &str {
        "keystore_api"
    }

    fn tags(&self) -> Vec<&'static str> {
        vec!["api", "keystore"]
    }

    async fn run(&self, cx: &mut ScenarioCx<'_>) -> E2eResult<FixtureBundle> {
        let project = ProjectFields::generate("KEYSTORE");
        let project_id = cx.factory().create_project(&project).await?;

        cx.ctx.begin("keystore_missing_project_id");
        let reply = cx.api.keystore(None).await?;
        if reply.status != 400 || reply.error_message() != Some(PROJECT_ID_REQUIRED) {
            return Err(E2eError::AssertionFailed(format!(
                "expected 400 '{}', got {} {}",
                PROJECT_ID_REQUIRED, reply.status, reply.body
            )));
        }

        cx.ctx.begin("keystore_listing");
        let reply = cx.api.keystore(Some(project_id.as_str())).await?;
        if reply.status != 200 {
            return Err(E2eError::AssertionFailed(format!(
                "expected 200 from keystore listing, got {} {}",
                reply.status, reply.body
            )));
        }
        let listing: KeystoreListing = reply.json().map_err(|e| {
            E2eError::AssertionFailed(format!("keystore listing has no entries array: {}", e))
        })?;
        info!(project = %project_id, entries = listing.entries.len(), "Keystore listing");

        cx.ctx.begin("keystore_unauthenticated");
        let reply = cx.api.anonymous().keystore(Some(project_id.as_str())).await?;
        if reply.status != 401 {
            return Err(E2eError::AssertionFailed(format!(
                "expected 401 without a session, got {}",
                reply.status
            )));
        }
        Ok(FixtureBundle::new())
    }
}
