//! Cleanup hook for deletions in the tool and workload stores.
//!
//! This crate does not watch those stores. Whoever deletes a tool or a
//! workload must call [`LifecycleHooks::on_entity_deleted`] so that the
//! associations pointing at it are purged. The hook is not gated: the
//! owning store has already authorized the deletion.

use serde::Serialize;
use tracing::info;

use crate::association::{tool, workload};
use crate::catalog::{ResourceKind, ResourceRef};
use crate::error::Result;
use crate::store::Store;

/// Rows removed by a purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    /// Tool-level attachments removed.
    pub tool_associations: u64,
    /// Workload-tool attachments removed.
    pub workload_tool_associations: u64,
}

/// Orphan cleanup for externally owned records.
#[derive(Debug, Clone)]
pub struct LifecycleHooks {
    store: Store,
}

impl LifecycleHooks {
    /// Hooks over `store`.
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Purge every association that refers to the deleted record.
    ///
    /// For a tool this clears its own attachments and every workload's
    /// attachments on it. For a workload it clears all of that workload's
    /// attachments. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Database`] on SQLite failure; nothing is
    /// removed in that case.
    pub async fn on_entity_deleted(
        &self,
        kind: ResourceKind,
        resource: &ResourceRef,
    ) -> Result<PurgeReport> {
        let mut uow = self.store.begin().await?;
        let report = match kind {
            ResourceKind::Tool => PurgeReport {
                tool_associations: tool::purge_tool(&mut uow, resource).await?,
                workload_tool_associations: workload::purge_tool(&mut uow, resource).await?,
            },
            ResourceKind::Workload => PurgeReport {
                tool_associations: 0,
                workload_tool_associations: workload::purge_workload(&mut uow, resource).await?,
            },
        };
        uow.commit().await?;

        info!(
            kind = kind.as_str(),
            %resource,
            tool_associations = report.tool_associations,
            workload_tool_associations = report.workload_tool_associations,
            "associations purged for deleted entity"
        );
        Ok(report)
    }
}
