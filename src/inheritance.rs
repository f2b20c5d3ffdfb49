//! Copy-on-attach inheritance of tool guardrails into workloads.
//!
//! When a workload adopts a tool, every guardrail currently attached to the
//! tool is materialized as a `source = tool` row for that pairing. The copy
//! is a snapshot: attaching or detaching at the tool level afterwards does
//! not touch workloads that already adopted the tool.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::association::{tool, workload};
use crate::auth::{EntityKind, MutationGate, Operation};
use crate::catalog::{EntityCatalog, ResourceRef};
use crate::error::Result;
use crate::store::{Store, UnitOfWork};

/// Outcome of a propagation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PropagationReport {
    /// Rows written.
    pub copied: u64,
    /// Tool attachments whose natural key already existed for the pairing.
    pub already_present: u64,
}

/// Materializes tool attachments into workload/tool pairings.
#[derive(Clone)]
pub struct InheritancePropagator {
    store: Store,
    gate: MutationGate,
    catalog: Arc<dyn EntityCatalog>,
}

impl std::fmt::Debug for InheritancePropagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InheritancePropagator")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl InheritancePropagator {
    /// Propagator over `store`.
    pub fn new(store: Store, gate: MutationGate, catalog: Arc<dyn EntityCatalog>) -> Self {
        Self {
            store,
            gate,
            catalog,
        }
    }

    /// Copy `tool`'s guardrails into `workload` as inherited rows.
    ///
    /// Safe to repeat: rows whose natural key already exists are left
    /// untouched, whatever their source. All rows commit together.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::PermissionDenied`] if the gate refuses.
    /// - [`crate::Error::NotFound`] if the workload or tool does not exist,
    ///   or the tool is not one of the workload's dependencies.
    pub async fn on_tool_added_to_workload(
        &self,
        workload: &ResourceRef,
        tool: &ResourceRef,
    ) -> Result<PropagationReport> {
        self.gate
            .check(EntityKind::WorkloadToolGuardrail, Operation::Create)
            .await?;
        workload::require_pairing(self.catalog.as_ref(), workload, tool).await?;

        let mut uow = self.store.begin().await?;
        let report = Self::propagate(&mut uow, workload, tool).await?;
        uow.commit().await?;

        info!(
            %workload,
            %tool,
            copied = report.copied,
            already_present = report.already_present,
            "tool guardrails propagated to workload"
        );
        Ok(report)
    }

    /// Copy within a caller-owned unit of work. Nothing is committed here.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Database`] on SQLite failure; the caller
    /// should drop `uow` to roll back.
    pub async fn propagate(
        uow: &mut UnitOfWork,
        workload: &ResourceRef,
        tool: &ResourceRef,
    ) -> Result<PropagationReport> {
        let attachments = tool::list_for_tool(&mut **uow, tool).await?;
        let mut report = PropagationReport::default();
        for attachment in &attachments {
            if workload::insert_inherited(&mut **uow, workload, attachment).await? {
                report.copied = report.copied.saturating_add(1);
            } else {
                report.already_present = report.already_present.saturating_add(1);
            }
        }
        Ok(report)
    }

    /// Drop every association of a pairing after the workload stops using
    /// the tool. Inherited and direct rows both go.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::PermissionDenied`] if the gate refuses.
    /// - [`crate::Error::Database`] on SQLite failure.
    pub async fn on_tool_removed_from_workload(
        &self,
        workload: &ResourceRef,
        tool: &ResourceRef,
    ) -> Result<u64> {
        self.gate
            .check(EntityKind::WorkloadToolGuardrail, Operation::Delete)
            .await?;
        let mut uow = self.store.begin().await?;
        let removed = workload::delete_pair(&mut uow, workload, tool).await?;
        uow.commit().await?;

        info!(%workload, %tool, removed, "workload tool guardrails released");
        Ok(removed)
    }
}
