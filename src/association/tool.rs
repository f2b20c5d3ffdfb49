//! Guardrails attached directly to tools.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Sqlite, SqliteConnection};
use tracing::{debug, info};

use super::ExecutionTiming;
use crate::auth::{EntityKind, MutationGate, Operation};
use crate::catalog::{EntityCatalog, ResourceKind, ResourceRef};
use crate::error::{conflict_on_unique, Error, Result};
use crate::guardrail::{self, validate};
use crate::store::{self, Store};

/// Row type returned by SQLite queries for tool associations.
type ToolAssociationRow = (
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

const SELECT_TOOL_ASSOCIATION: &str = "SELECT a.id, a.tool_namespace, a.tool_name, \
     a.guardrail_id, g.namespace, g.name, a.execution_timing, a.parameters, a.created_at \
     FROM tool_guardrails a JOIN guardrails g ON g.id = a.guardrail_id";

/// A guardrail attached to a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolAssociation {
    /// Row identifier.
    pub id: String,
    /// The guarded tool.
    pub tool: ResourceRef,
    /// Referenced guardrail id.
    pub guardrail_id: String,
    /// Referenced guardrail key, resolved at read time.
    pub guardrail: ResourceRef,
    /// When the guardrail runs.
    pub execution_timing: ExecutionTiming,
    /// Opaque per-attachment payload.
    pub parameters: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

fn row_into_association(row: ToolAssociationRow) -> Result<ToolAssociation> {
    let (id, tool_ns, tool_name, guardrail_id, g_ns, g_name, timing, parameters, created) = row;
    Ok(ToolAssociation {
        id,
        tool: ResourceRef::new(tool_ns, tool_name),
        guardrail_id,
        guardrail: ResourceRef::new(g_ns, g_name),
        execution_timing: ExecutionTiming::decode(&timing)?,
        parameters,
        created_at: store::parse_timestamp(&created)?,
    })
}

/// Every association of `tool`, on any executor.
pub(crate) async fn list_for_tool<'e, E>(exec: E, tool: &ResourceRef) -> Result<Vec<ToolAssociation>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "{SELECT_TOOL_ASSOCIATION} WHERE a.tool_namespace = ?1 AND a.tool_name = ?2 \
         ORDER BY g.namespace, g.name"
    );
    let rows: Vec<ToolAssociationRow> = sqlx::query_as(&sql)
        .bind(&tool.namespace)
        .bind(&tool.name)
        .fetch_all(exec)
        .await?;
    rows.into_iter().map(row_into_association).collect()
}

/// Every tool association referencing `guardrail_id`.
pub(crate) async fn list_by_guardrail<'e, E>(
    exec: E,
    guardrail_id: &str,
) -> Result<Vec<ToolAssociation>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "{SELECT_TOOL_ASSOCIATION} WHERE a.guardrail_id = ?1 \
         ORDER BY a.tool_namespace, a.tool_name"
    );
    let rows: Vec<ToolAssociationRow> = sqlx::query_as(&sql)
        .bind(guardrail_id)
        .fetch_all(exec)
        .await?;
    rows.into_iter().map(row_into_association).collect()
}

/// Number of tool associations referencing `guardrail_id`.
pub(crate) async fn count_by_guardrail<'e, E>(exec: E, guardrail_id: &str) -> Result<u64>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row: (i64,) = sqlx::query_as("SELECT count(*) FROM tool_guardrails WHERE guardrail_id = ?1")
        .bind(guardrail_id)
        .fetch_one(exec)
        .await?;
    Ok(u64::try_from(row.0).unwrap_or(0))
}

/// Delete every association of `tool`. Returns the number of rows removed.
pub(crate) async fn purge_tool(conn: &mut SqliteConnection, tool: &ResourceRef) -> Result<u64> {
    let result =
        sqlx::query("DELETE FROM tool_guardrails WHERE tool_namespace = ?1 AND tool_name = ?2")
            .bind(&tool.namespace)
            .bind(&tool.name)
            .execute(conn)
            .await?;
    Ok(result.rows_affected())
}

/// Attach, detach and list guardrails on tools.
#[derive(Clone)]
pub struct ToolAssociationStore {
    store: Store,
    gate: MutationGate,
    catalog: Arc<dyn EntityCatalog>,
}

impl std::fmt::Debug for ToolAssociationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolAssociationStore")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl ToolAssociationStore {
    /// Store over `store`, checking tool existence against `catalog`.
    pub fn new(store: Store, gate: MutationGate, catalog: Arc<dyn EntityCatalog>) -> Self {
        Self {
            store,
            gate,
            catalog,
        }
    }

    /// Attach `guardrail` to `tool`.
    ///
    /// # Errors
    ///
    /// - [`Error::PermissionDenied`] if the gate refuses.
    /// - [`Error::InvalidArgument`] if `parameters` is too large.
    /// - [`Error::NotFound`] if the tool or guardrail does not exist.
    /// - [`Error::Conflict`] if the guardrail is already attached to the tool.
    pub async fn attach(
        &self,
        tool: &ResourceRef,
        guardrail: &ResourceRef,
        execution_timing: ExecutionTiming,
        parameters: Option<String>,
    ) -> Result<ToolAssociation> {
        self.gate
            .check(EntityKind::ToolGuardrail, Operation::Create)
            .await?;
        validate::parameters(parameters.as_deref())?;
        if !self.catalog.exists(ResourceKind::Tool, tool).await? {
            return Err(Error::not_found("tool", tool));
        }

        let duplicate = || format!("guardrail {guardrail} is already attached to tool {tool}");
        let mut tx = self.store.begin().await?;
        let target = guardrail::require(&mut *tx, guardrail).await?;

        let existing: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM tool_guardrails \
             WHERE tool_namespace = ?1 AND tool_name = ?2 AND guardrail_id = ?3",
        )
        .bind(&tool.namespace)
        .bind(&tool.name)
        .bind(&target.id)
        .fetch_optional(&mut *tx)
        .await?;
        if existing.is_some() {
            return Err(Error::Conflict(duplicate()));
        }

        let association = ToolAssociation {
            id: store::new_id(),
            tool: tool.clone(),
            guardrail_id: target.id.clone(),
            guardrail: target.key(),
            execution_timing,
            parameters,
            created_at: store::now(),
        };
        sqlx::query(
            "INSERT INTO tool_guardrails (id, tool_namespace, tool_name, guardrail_id, \
             execution_timing, parameters, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&association.id)
        .bind(&tool.namespace)
        .bind(&tool.name)
        .bind(&association.guardrail_id)
        .bind(execution_timing.as_str())
        .bind(&association.parameters)
        .bind(store::format_timestamp(&association.created_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, duplicate))?;
        tx.commit().await?;

        info!(
            %tool,
            %guardrail,
            timing = execution_timing.as_str(),
            "guardrail attached to tool"
        );
        Ok(association)
    }

    /// Detach `guardrail` from `tool`.
    ///
    /// Workloads that already inherited the attachment keep their copy.
    ///
    /// # Errors
    ///
    /// - [`Error::PermissionDenied`] if the gate refuses.
    /// - [`Error::NotFound`] if there is no such attachment.
    pub async fn detach(&self, tool: &ResourceRef, guardrail: &ResourceRef) -> Result<()> {
        self.gate
            .check(EntityKind::ToolGuardrail, Operation::Delete)
            .await?;

        let mut tx = self.store.begin().await?;
        let target = guardrail::require(&mut *tx, guardrail).await?;
        let result = sqlx::query(
            "DELETE FROM tool_guardrails \
             WHERE tool_namespace = ?1 AND tool_name = ?2 AND guardrail_id = ?3",
        )
        .bind(&tool.namespace)
        .bind(&tool.name)
        .bind(&target.id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(
                "tool guardrail",
                format!("{guardrail} on tool {tool}"),
            ));
        }
        tx.commit().await?;

        info!(%tool, %guardrail, "guardrail detached from tool");
        Ok(())
    }

    /// Every guardrail attached to `tool`. No priority is implied by the
    /// order of the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] on SQLite failure.
    pub async fn list(&self, tool: &ResourceRef) -> Result<Vec<ToolAssociation>> {
        let associations = list_for_tool(self.store.pool(), tool).await?;
        debug!(%tool, count = associations.len(), "tool guardrails listed");
        Ok(associations)
    }
}
