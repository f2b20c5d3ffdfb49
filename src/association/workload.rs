//! Guardrails attached to a workload's use of a tool.
//!
//! Rows carry a [`Source`]. `workload` rows are created here by [`add`] and
//! may be edited or removed freely. `tool` rows are only ever written by
//! [`crate::inheritance::InheritancePropagator`] and are read-only at this
//! level: [`remove`] and [`update`] reject them with [`Error::Forbidden`].
//!
//! [`add`]: WorkloadToolAssociationStore::add
//! [`remove`]: WorkloadToolAssociationStore::remove
//! [`update`]: WorkloadToolAssociationStore::update

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Sqlite, SqliteConnection};
use tracing::{debug, info, trace};

use super::{AssociationPatch, ExecutionTiming, Source, ToolAssociation};
use crate::auth::{EntityKind, MutationGate, Operation};
use crate::catalog::{EntityCatalog, ResourceKind, ResourceRef};
use crate::error::{conflict_on_unique, Error, Result};
use crate::guardrail::{self, validate};
use crate::store::{self, Store};

/// Row type returned by SQLite queries for workload-tool associations.
type WorkloadToolRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    String,
);

const SELECT_WORKLOAD_TOOL: &str = "SELECT a.id, a.workload_namespace, a.workload_name, \
     a.tool_namespace, a.tool_name, a.guardrail_id, g.namespace, g.name, \
     a.execution_timing, a.source, a.parameters, a.created_at \
     FROM workload_tool_guardrails a JOIN guardrails g ON g.id = a.guardrail_id";

/// A guardrail attached to a workload's use of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkloadToolAssociation {
    /// Row identifier.
    pub id: String,
    /// The workload.
    pub workload: ResourceRef,
    /// The tool within the workload.
    pub tool: ResourceRef,
    /// Referenced guardrail id.
    pub guardrail_id: String,
    /// Referenced guardrail key, resolved at read time.
    pub guardrail: ResourceRef,
    /// When the guardrail runs.
    pub execution_timing: ExecutionTiming,
    /// Whether the row was inherited from the tool or added on the workload.
    pub source: Source,
    /// Opaque per-attachment payload.
    pub parameters: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl WorkloadToolAssociation {
    /// Whether the row was inherited from the tool.
    pub fn is_inherited(&self) -> bool {
        self.source == Source::Tool
    }
}

fn row_into_association(row: WorkloadToolRow) -> Result<WorkloadToolAssociation> {
    let (
        id,
        workload_ns,
        workload_name,
        tool_ns,
        tool_name,
        guardrail_id,
        g_ns,
        g_name,
        timing,
        source,
        parameters,
        created,
    ) = row;
    Ok(WorkloadToolAssociation {
        id,
        workload: ResourceRef::new(workload_ns, workload_name),
        tool: ResourceRef::new(tool_ns, tool_name),
        guardrail_id,
        guardrail: ResourceRef::new(g_ns, g_name),
        execution_timing: ExecutionTiming::decode(&timing)?,
        source: Source::decode(&source)?,
        parameters,
        created_at: store::parse_timestamp(&created)?,
    })
}

/// Every association of the `(workload, tool)` pairing.
pub(crate) async fn list_for_pair<'e, E>(
    exec: E,
    workload: &ResourceRef,
    tool: &ResourceRef,
) -> Result<Vec<WorkloadToolAssociation>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "{SELECT_WORKLOAD_TOOL} WHERE a.workload_namespace = ?1 AND a.workload_name = ?2 \
         AND a.tool_namespace = ?3 AND a.tool_name = ?4 ORDER BY g.namespace, g.name"
    );
    let rows: Vec<WorkloadToolRow> = sqlx::query_as(&sql)
        .bind(&workload.namespace)
        .bind(&workload.name)
        .bind(&tool.namespace)
        .bind(&tool.name)
        .fetch_all(exec)
        .await?;
    rows.into_iter().map(row_into_association).collect()
}

/// Every workload-tool association referencing `guardrail_id`.
pub(crate) async fn list_by_guardrail<'e, E>(
    exec: E,
    guardrail_id: &str,
) -> Result<Vec<WorkloadToolAssociation>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "{SELECT_WORKLOAD_TOOL} WHERE a.guardrail_id = ?1 \
         ORDER BY a.workload_namespace, a.workload_name, a.tool_namespace, a.tool_name"
    );
    let rows: Vec<WorkloadToolRow> = sqlx::query_as(&sql)
        .bind(guardrail_id)
        .fetch_all(exec)
        .await?;
    rows.into_iter().map(row_into_association).collect()
}

/// Number of workload-tool associations referencing `guardrail_id`.
pub(crate) async fn count_by_guardrail<'e, E>(exec: E, guardrail_id: &str) -> Result<u64>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row: (i64,) =
        sqlx::query_as("SELECT count(*) FROM workload_tool_guardrails WHERE guardrail_id = ?1")
            .bind(guardrail_id)
            .fetch_one(exec)
            .await?;
    Ok(u64::try_from(row.0).unwrap_or(0))
}

async fn fetch_one(
    conn: &mut SqliteConnection,
    workload: &ResourceRef,
    tool: &ResourceRef,
    guardrail_id: &str,
) -> Result<Option<WorkloadToolAssociation>> {
    let sql = format!(
        "{SELECT_WORKLOAD_TOOL} WHERE a.workload_namespace = ?1 AND a.workload_name = ?2 \
         AND a.tool_namespace = ?3 AND a.tool_name = ?4 AND a.guardrail_id = ?5"
    );
    let row: Option<WorkloadToolRow> = sqlx::query_as(&sql)
        .bind(&workload.namespace)
        .bind(&workload.name)
        .bind(&tool.namespace)
        .bind(&tool.name)
        .bind(guardrail_id)
        .fetch_optional(conn)
        .await?;
    row.map(row_into_association).transpose()
}

/// Insert-if-absent copy of a tool-level attachment as a `source = tool`
/// row. Returns `true` if a row was written, `false` if the natural key was
/// already present (of either provenance).
pub(crate) async fn insert_inherited(
    conn: &mut SqliteConnection,
    workload: &ResourceRef,
    inherited: &ToolAssociation,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO workload_tool_guardrails (id, workload_namespace, workload_name, \
         tool_namespace, tool_name, guardrail_id, execution_timing, source, parameters, \
         created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
         ON CONFLICT (workload_namespace, workload_name, tool_namespace, tool_name, guardrail_id) \
         DO NOTHING",
    )
    .bind(store::new_id())
    .bind(&workload.namespace)
    .bind(&workload.name)
    .bind(&inherited.tool.namespace)
    .bind(&inherited.tool.name)
    .bind(&inherited.guardrail_id)
    .bind(inherited.execution_timing.as_str())
    .bind(Source::Tool.as_str())
    .bind(&inherited.parameters)
    .bind(store::format_timestamp(&store::now()))
    .execute(conn)
    .await?;
    let written = result.rows_affected() > 0;
    trace!(
        %workload,
        tool = %inherited.tool,
        guardrail = %inherited.guardrail,
        written,
        "inherited guardrail copied"
    );
    Ok(written)
}

/// Delete every association of a `(workload, tool)` pairing, both
/// provenances. Returns the number of rows removed.
pub(crate) async fn delete_pair(
    conn: &mut SqliteConnection,
    workload: &ResourceRef,
    tool: &ResourceRef,
) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM workload_tool_guardrails WHERE workload_namespace = ?1 \
         AND workload_name = ?2 AND tool_namespace = ?3 AND tool_name = ?4",
    )
    .bind(&workload.namespace)
    .bind(&workload.name)
    .bind(&tool.namespace)
    .bind(&tool.name)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Delete every association involving `tool` across all workloads.
pub(crate) async fn purge_tool(conn: &mut SqliteConnection, tool: &ResourceRef) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM workload_tool_guardrails WHERE tool_namespace = ?1 AND tool_name = ?2",
    )
    .bind(&tool.namespace)
    .bind(&tool.name)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Delete every association of `workload`.
pub(crate) async fn purge_workload(
    conn: &mut SqliteConnection,
    workload: &ResourceRef,
) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM workload_tool_guardrails \
         WHERE workload_namespace = ?1 AND workload_name = ?2",
    )
    .bind(&workload.namespace)
    .bind(&workload.name)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

fn inherited_error(
    action: &str,
    workload: &ResourceRef,
    tool: &ResourceRef,
    guardrail: &ResourceRef,
) -> Error {
    Error::Forbidden(format!(
        "guardrail {guardrail} on {workload} -> {tool} is inherited from the tool \
         and cannot be {action} at the workload level"
    ))
}

/// Add, edit, remove and list guardrails on workload/tool pairings.
#[derive(Clone)]
pub struct WorkloadToolAssociationStore {
    store: Store,
    gate: MutationGate,
    catalog: Arc<dyn EntityCatalog>,
}

impl std::fmt::Debug for WorkloadToolAssociationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkloadToolAssociationStore")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl WorkloadToolAssociationStore {
    /// Store over `store`, checking workload/tool existence against `catalog`.
    pub fn new(store: Store, gate: MutationGate, catalog: Arc<dyn EntityCatalog>) -> Self {
        Self {
            store,
            gate,
            catalog,
        }
    }

    /// Attach `guardrail` directly to `workload`'s use of `tool`. The row is
    /// always recorded with `source = workload`.
    ///
    /// # Errors
    ///
    /// - [`Error::PermissionDenied`] if the gate refuses.
    /// - [`Error::InvalidArgument`] if `parameters` is too large.
    /// - [`Error::NotFound`] if the workload, tool or guardrail does not
    ///   exist, or the tool is not one of the workload's dependencies.
    /// - [`Error::Conflict`] if the guardrail is already attached to the
    ///   pairing, inherited or not.
    pub async fn add(
        &self,
        workload: &ResourceRef,
        tool: &ResourceRef,
        guardrail: &ResourceRef,
        execution_timing: ExecutionTiming,
        parameters: Option<String>,
    ) -> Result<WorkloadToolAssociation> {
        self.gate
            .check(EntityKind::WorkloadToolGuardrail, Operation::Create)
            .await?;
        validate::parameters(parameters.as_deref())?;
        require_pairing(self.catalog.as_ref(), workload, tool).await?;

        let duplicate =
            || format!("guardrail {guardrail} is already attached to {workload} -> {tool}");
        let mut tx = self.store.begin().await?;
        let target = guardrail::require(&mut *tx, guardrail).await?;
        if fetch_one(&mut tx, workload, tool, &target.id).await?.is_some() {
            return Err(Error::Conflict(duplicate()));
        }

        let association = WorkloadToolAssociation {
            id: store::new_id(),
            workload: workload.clone(),
            tool: tool.clone(),
            guardrail_id: target.id.clone(),
            guardrail: target.key(),
            execution_timing,
            source: Source::Workload,
            parameters,
            created_at: store::now(),
        };
        sqlx::query(
            "INSERT INTO workload_tool_guardrails (id, workload_namespace, workload_name, \
             tool_namespace, tool_name, guardrail_id, execution_timing, source, parameters, \
             created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&association.id)
        .bind(&workload.namespace)
        .bind(&workload.name)
        .bind(&tool.namespace)
        .bind(&tool.name)
        .bind(&association.guardrail_id)
        .bind(execution_timing.as_str())
        .bind(Source::Workload.as_str())
        .bind(&association.parameters)
        .bind(store::format_timestamp(&association.created_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, duplicate))?;
        tx.commit().await?;

        info!(
            %workload,
            %tool,
            %guardrail,
            timing = execution_timing.as_str(),
            "guardrail added to workload tool"
        );
        Ok(association)
    }

    /// Remove a guardrail that was added directly on the workload.
    ///
    /// # Errors
    ///
    /// - [`Error::PermissionDenied`] if the gate refuses.
    /// - [`Error::NotFound`] if there is no such association.
    /// - [`Error::Forbidden`] if the association was inherited from the tool.
    pub async fn remove(
        &self,
        workload: &ResourceRef,
        tool: &ResourceRef,
        guardrail: &ResourceRef,
    ) -> Result<()> {
        self.gate
            .check(EntityKind::WorkloadToolGuardrail, Operation::Delete)
            .await?;

        let mut tx = self.store.begin().await?;
        let target = guardrail::require(&mut *tx, guardrail).await?;
        let existing = fetch_one(&mut tx, workload, tool, &target.id)
            .await?
            .ok_or_else(|| not_attached(workload, tool, guardrail))?;
        if existing.is_inherited() {
            return Err(inherited_error("removed", workload, tool, guardrail));
        }

        sqlx::query("DELETE FROM workload_tool_guardrails WHERE id = ?1")
            .bind(&existing.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(%workload, %tool, %guardrail, "guardrail removed from workload tool");
        Ok(())
    }

    /// Change the timing or parameters of a directly added association.
    ///
    /// Inherited rows are a snapshot of the tool's attachment and are not
    /// editable here, the same as they are not removable.
    ///
    /// # Errors
    ///
    /// - [`Error::PermissionDenied`] if the gate refuses.
    /// - [`Error::InvalidArgument`] if `parameters` is too large.
    /// - [`Error::NotFound`] if there is no such association.
    /// - [`Error::Forbidden`] if the association was inherited from the tool.
    pub async fn update(
        &self,
        workload: &ResourceRef,
        tool: &ResourceRef,
        guardrail: &ResourceRef,
        patch: AssociationPatch,
    ) -> Result<WorkloadToolAssociation> {
        self.gate
            .check(EntityKind::WorkloadToolGuardrail, Operation::Update)
            .await?;
        if let Some(parameters) = &patch.parameters {
            validate::parameters(parameters.as_deref())?;
        }

        let mut tx = self.store.begin().await?;
        let target = guardrail::require(&mut *tx, guardrail).await?;
        let mut association = fetch_one(&mut tx, workload, tool, &target.id)
            .await?
            .ok_or_else(|| not_attached(workload, tool, guardrail))?;
        if association.is_inherited() {
            return Err(inherited_error("edited", workload, tool, guardrail));
        }
        if patch.is_empty() {
            return Ok(association);
        }

        if let Some(timing) = patch.execution_timing {
            association.execution_timing = timing;
        }
        if let Some(parameters) = patch.parameters {
            association.parameters = parameters;
        }
        sqlx::query(
            "UPDATE workload_tool_guardrails SET execution_timing = ?2, parameters = ?3 \
             WHERE id = ?1",
        )
        .bind(&association.id)
        .bind(association.execution_timing.as_str())
        .bind(&association.parameters)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(
            %workload,
            %tool,
            %guardrail,
            timing = association.execution_timing.as_str(),
            "workload tool guardrail updated"
        );
        Ok(association)
    }

    /// Every guardrail on `workload`'s use of `tool`, each with its source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] on SQLite failure.
    pub async fn list(
        &self,
        workload: &ResourceRef,
        tool: &ResourceRef,
    ) -> Result<Vec<WorkloadToolAssociation>> {
        let associations = list_for_pair(self.store.pool(), workload, tool).await?;
        debug!(
            %workload,
            %tool,
            count = associations.len(),
            "workload tool guardrails listed"
        );
        Ok(associations)
    }
}

fn not_attached(workload: &ResourceRef, tool: &ResourceRef, guardrail: &ResourceRef) -> Error {
    Error::not_found(
        "workload tool guardrail",
        format!("{guardrail} on {workload} -> {tool}"),
    )
}

/// Fail with [`Error::NotFound`] unless the workload and tool exist and the
/// tool is one of the workload's dependencies.
pub(crate) async fn require_pairing(
    catalog: &dyn EntityCatalog,
    workload: &ResourceRef,
    tool: &ResourceRef,
) -> Result<()> {
    if !catalog.exists(ResourceKind::Workload, workload).await? {
        return Err(Error::not_found("workload", workload));
    }
    if !catalog.exists(ResourceKind::Tool, tool).await? {
        return Err(Error::not_found("tool", tool));
    }
    if !catalog.workload_uses_tool(workload, tool).await? {
        return Err(Error::not_found(
            "workload dependency",
            format!("{tool} in {workload}"),
        ));
    }
    Ok(())
}
