//! Fixture teardown
//!
//! Consumes a [`ScenarioContext`] newest-first so children go before their
//! parents. Each delete is independent and bounded; failures become
//! [`CleanupWarning`]s in the report and never stop the remaining deletes.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::DeleteOutcome;
use crate::context::ScenarioContext;
use crate::entity::EntityRecord;

/// Whatever can delete fixtures on the backend
#[async_trait]
pub trait FixtureBackend: Send + Sync {
    async fn delete(&self, record: &EntityRecord) -> DeleteOutcome;
}

/// A delete that did not succeed. Logged, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupWarning {
    pub status: Option<u16>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CleanupOutcome {
    Deleted,
    AlreadyAbsent,
    /// Deleted through the UI by the scenario itself; no call issued
    RemovedDuringScenario,
    Warning(CleanupWarning),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupEntry {
    pub record: EntityRecord,
    pub outcome: CleanupOutcome,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeardownReport {
    pub entries: Vec<CleanupEntry>,
}

impl TeardownReport {
    pub fn warnings(&self) -> impl Iterator<Item = (&EntityRecord, &CleanupWarning)> {
        self.entries.iter().filter_map(|e| match &e.outcome {
            CleanupOutcome::Warning(w) => Some((&e.record, w)),
            _ => None,
        })
    }

    pub fn is_clean(&self) -> bool {
        self.warnings().next().is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Delete everything `ctx` owns. Calling it again on the same context is a no-op.
pub async fn teardown(
    ctx: &mut ScenarioContext,
    backend: &dyn FixtureBackend,
    per_call: Duration,
) -> TeardownReport {
    let scenario = ctx.scenario().to_string();
    let drained = ctx.drain_for_teardown();
    if drained.is_empty() {
        debug!(scenario = %scenario, "Nothing to tear down");
        return TeardownReport::default();
    }

    // Deleting a parent through the UI takes its children with it.
    let removed: Vec<EntityRecord> = drained
        .iter()
        .filter(|(_, gone)| *gone)
        .map(|(r, _)| r.clone())
        .collect();

    info!(scenario = %scenario, count = drained.len(), "Tearing down fixtures");

    let mut report = TeardownReport::default();
    for (record, gone) in drained {
        let outcome = if gone || removed.iter().any(|r| record.descends_from(r)) {
            CleanupOutcome::RemovedDuringScenario
        } else {
            match tokio::time::timeout(per_call, backend.delete(&record)).await {
                Ok(DeleteOutcome::Deleted) => CleanupOutcome::Deleted,
                Ok(DeleteOutcome::AlreadyAbsent) => CleanupOutcome::AlreadyAbsent,
                Ok(DeleteOutcome::Rejected { status, body }) => {
                    CleanupOutcome::Warning(CleanupWarning {
                        status: Some(status),
                        reason: if body.is_empty() {
                            format!("delete rejected with status {}", status)
                        } else {
                            body
                        },
                    })
                }
                Ok(DeleteOutcome::Unreachable { reason }) => {
                    CleanupOutcome::Warning(CleanupWarning {
                        status: None,
                        reason,
                    })
                }
                Err(_) => CleanupOutcome::Warning(CleanupWarning {
                    status: None,
                    reason: format!("delete timed out after {:?}", per_call),
                }),
            }
        };

        match &outcome {
            CleanupOutcome::Warning(w) => warn!(
                scenario = %scenario,
                id = %record.id,
                status = ?w.status,
                "Cleanup of {} failed: {}",
                record,
                w.reason
            ),
            other => debug!(
                scenario = %scenario,
                id = %record.id,
                "Cleanup of {}: {:?}",
                record,
                other
            ),
        }
        report.entries.push(CleanupEntry { record, outcome });
    }
    report
}
