//! Guardrail registry: the canonical protection-policy records.
//!
//! A guardrail is identified by `(namespace, name)`. Deleting one is only
//! possible once nothing references it (see [`crate::references`]).

pub mod import;
pub mod validate;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Sqlite;
use tracing::{debug, info};

use crate::association::{tool, workload, ToolAssociation, WorkloadToolAssociation};
use crate::auth::{EntityKind, MutationGate, Operation};
use crate::catalog::ResourceRef;
use crate::error::{conflict_on_unique, Error, Result};
use crate::references::ReferenceGuard;
use crate::store::{self, Store};

/// Row type returned by SQLite queries for guardrails.
type GuardrailRow = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    bool,
    String,
    String,
);

const SELECT_GUARDRAIL: &str = "SELECT id, namespace, name, description, deployment, \
     parameters, disabled, created_at, updated_at FROM guardrails";

/// A named protection policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Guardrail {
    /// Stable identifier referenced by associations.
    pub id: String,
    /// Scoping namespace.
    pub namespace: String,
    /// DNS-label name, unique within the namespace.
    pub name: String,
    /// Human-readable purpose.
    pub description: String,
    /// Where the enforcement for this guardrail runs.
    pub deployment: String,
    /// Opaque payload for the enforcement system.
    pub parameters: Option<String>,
    /// Global kill-switch.
    pub disabled: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Guardrail {
    /// `(namespace, name)` key.
    pub fn key(&self) -> ResourceRef {
        ResourceRef::new(&self.namespace, &self.name)
    }
}

fn row_into_guardrail(row: GuardrailRow) -> Result<Guardrail> {
    let (id, namespace, name, description, deployment, parameters, disabled, created, updated) =
        row;
    Ok(Guardrail {
        id,
        namespace,
        name,
        description,
        deployment,
        parameters,
        disabled,
        created_at: store::parse_timestamp(&created)?,
        updated_at: store::parse_timestamp(&updated)?,
    })
}

/// Input for [`GuardrailRegistry::create`] and bulk import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGuardrail {
    /// Scoping namespace.
    pub namespace: String,
    /// DNS-label name.
    pub name: String,
    /// Human-readable purpose, 1-1000 characters.
    pub description: String,
    /// Deployment string, 1-2000 characters.
    pub deployment: String,
    /// Opaque payload, at most 10000 characters.
    #[serde(default)]
    pub parameters: Option<String>,
    /// Create in the disabled state.
    #[serde(default)]
    pub disabled: bool,
}

impl NewGuardrail {
    /// `(namespace, name)` key.
    pub fn key(&self) -> ResourceRef {
        ResourceRef::new(&self.namespace, &self.name)
    }

    /// Check every field against its bounds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        validate::namespace(&self.namespace)?;
        validate::name(&self.name)?;
        validate::description(&self.description)?;
        validate::deployment(&self.deployment)?;
        validate::parameters(self.parameters.as_deref())
    }
}

/// Partial update for [`GuardrailRegistry::update`]. `None` leaves a field
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardrailPatch {
    /// Rename within the same namespace.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New deployment string.
    pub deployment: Option<String>,
    /// New parameters; `Some(None)` clears them.
    pub parameters: Option<Option<String>>,
    /// New disabled flag.
    pub disabled: Option<bool>,
}

impl GuardrailPatch {
    fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validate::name(name)?;
        }
        if let Some(description) = &self.description {
            validate::description(description)?;
        }
        if let Some(deployment) = &self.deployment {
            validate::deployment(deployment)?;
        }
        if let Some(parameters) = &self.parameters {
            validate::parameters(parameters.as_deref())?;
        }
        Ok(())
    }
}

/// Associations that currently reference a guardrail.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GuardrailUsage {
    /// Tool-level attachments.
    pub tools: Vec<ToolAssociation>,
    /// Workload-tool attachments of either provenance.
    pub workload_tools: Vec<WorkloadToolAssociation>,
}

/// A guardrail together with its computed usage.
#[derive(Debug, Clone, Serialize)]
pub struct GuardrailDetails {
    /// The stored record.
    #[serde(flatten)]
    pub guardrail: Guardrail,
    /// Where it is attached. Informational only.
    pub usage: GuardrailUsage,
}

/// Look up a guardrail by key on any executor (pool or open transaction).
pub(crate) async fn fetch_by_key<'e, E>(exec: E, key: &ResourceRef) -> Result<Option<Guardrail>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!("{SELECT_GUARDRAIL} WHERE namespace = ?1 AND name = ?2");
    let row: Option<GuardrailRow> = sqlx::query_as(&sql)
        .bind(&key.namespace)
        .bind(&key.name)
        .fetch_optional(exec)
        .await?;
    row.map(row_into_guardrail).transpose()
}

/// Like [`fetch_by_key`] but a missing guardrail is [`Error::NotFound`].
pub(crate) async fn require<'e, E>(exec: E, key: &ResourceRef) -> Result<Guardrail>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    fetch_by_key(exec, key)
        .await?
        .ok_or_else(|| Error::not_found("guardrail", key))
}

/// Owns create, update, disable and delete of guardrail records.
#[derive(Debug, Clone)]
pub struct GuardrailRegistry {
    store: Store,
    gate: MutationGate,
}

impl GuardrailRegistry {
    /// Registry over `store`, gating writes through `gate`.
    pub fn new(store: Store, gate: MutationGate) -> Self {
        Self { store, gate }
    }

    /// Create a guardrail.
    ///
    /// # Errors
    ///
    /// - [`Error::PermissionDenied`] if the gate refuses.
    /// - [`Error::InvalidArgument`] on field violations.
    /// - [`Error::Conflict`] if `(namespace, name)` is taken.
    pub async fn create(&self, input: NewGuardrail) -> Result<Guardrail> {
        self.gate
            .check(EntityKind::Guardrail, Operation::Create)
            .await?;
        self.insert(input).await
    }

    /// Validate and insert without consulting the gate.
    async fn insert(&self, input: NewGuardrail) -> Result<Guardrail> {
        input.validate()?;
        let key = input.key();
        let taken = || format!("guardrail {key} already exists");

        let mut tx = self.store.begin().await?;
        if fetch_by_key(&mut *tx, &key).await?.is_some() {
            return Err(Error::Conflict(taken()));
        }

        let now = store::now();
        let guardrail = Guardrail {
            id: store::new_id(),
            namespace: input.namespace,
            name: input.name,
            description: input.description,
            deployment: input.deployment,
            parameters: input.parameters,
            disabled: input.disabled,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO guardrails (id, namespace, name, description, deployment, \
             parameters, disabled, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&guardrail.id)
        .bind(&guardrail.namespace)
        .bind(&guardrail.name)
        .bind(&guardrail.description)
        .bind(&guardrail.deployment)
        .bind(&guardrail.parameters)
        .bind(guardrail.disabled)
        .bind(store::format_timestamp(&guardrail.created_at))
        .bind(store::format_timestamp(&guardrail.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, taken))?;
        tx.commit().await?;

        info!(guardrail = %key, id = %guardrail.id, "guardrail created");
        Ok(guardrail)
    }

    /// Apply a partial update, including rename within the namespace.
    ///
    /// Either every field in `patch` is applied or none is.
    ///
    /// # Errors
    ///
    /// - [`Error::PermissionDenied`] if the gate refuses.
    /// - [`Error::InvalidArgument`] on field violations.
    /// - [`Error::NotFound`] if the guardrail does not exist.
    /// - [`Error::Conflict`] if the new name is taken by another guardrail.
    pub async fn update(&self, key: &ResourceRef, patch: GuardrailPatch) -> Result<Guardrail> {
        self.gate
            .check(EntityKind::Guardrail, Operation::Update)
            .await?;
        patch.validate()?;

        let mut tx = self.store.begin().await?;
        let current = require(&mut *tx, key).await?;
        let mut next = current.clone();

        if let Some(name) = patch.name {
            if name != current.name {
                let target = ResourceRef::new(&current.namespace, &name);
                if fetch_by_key(&mut *tx, &target).await?.is_some() {
                    return Err(Error::Conflict(format!(
                        "cannot rename {key}: guardrail {target} already exists"
                    )));
                }
            }
            next.name = name;
        }
        if let Some(description) = patch.description {
            next.description = description;
        }
        if let Some(deployment) = patch.deployment {
            next.deployment = deployment;
        }
        if let Some(parameters) = patch.parameters {
            next.parameters = parameters;
        }
        if let Some(disabled) = patch.disabled {
            next.disabled = disabled;
        }
        next.updated_at = bumped(current.updated_at);

        let target = next.key();
        sqlx::query(
            "UPDATE guardrails SET name = ?2, description = ?3, deployment = ?4, \
             parameters = ?5, disabled = ?6, updated_at = ?7 WHERE id = ?1",
        )
        .bind(&next.id)
        .bind(&next.name)
        .bind(&next.description)
        .bind(&next.deployment)
        .bind(&next.parameters)
        .bind(next.disabled)
        .bind(store::format_timestamp(&next.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            conflict_on_unique(e, || {
                format!("cannot rename {key}: guardrail {target} already exists")
            })
        })?;
        tx.commit().await?;

        info!(guardrail = %key, renamed_to = %target, "guardrail updated");
        Ok(next)
    }

    /// Toggle the disabled flag.
    ///
    /// # Errors
    ///
    /// Same as [`GuardrailRegistry::update`].
    pub async fn set_disabled(&self, key: &ResourceRef, disabled: bool) -> Result<Guardrail> {
        self.update(
            key,
            GuardrailPatch {
                disabled: Some(disabled),
                ..GuardrailPatch::default()
            },
        )
        .await
    }

    /// Fetch a guardrail and the associations that reference it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the guardrail does not exist.
    pub async fn get(&self, key: &ResourceRef) -> Result<GuardrailDetails> {
        let pool = self.store.pool();
        let guardrail = require(pool, key).await?;
        let usage = GuardrailUsage {
            tools: tool::list_by_guardrail(pool, &guardrail.id).await?,
            workload_tools: workload::list_by_guardrail(pool, &guardrail.id).await?,
        };
        debug!(
            guardrail = %key,
            tools = usage.tools.len(),
            workload_tools = usage.workload_tools.len(),
            "guardrail fetched"
        );
        Ok(GuardrailDetails { guardrail, usage })
    }

    /// Look up a guardrail without usage. `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] on SQLite failure.
    pub async fn find(&self, key: &ResourceRef) -> Result<Option<Guardrail>> {
        fetch_by_key(self.store.pool(), key).await
    }

    /// List guardrails, optionally restricted to one namespace, sorted by
    /// namespace then name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] on SQLite failure.
    pub async fn list(&self, namespace: Option<&str>) -> Result<Vec<Guardrail>> {
        let sql = format!(
            "{SELECT_GUARDRAIL} WHERE (?1 IS NULL OR namespace = ?1) ORDER BY namespace, name"
        );
        let rows: Vec<GuardrailRow> = sqlx::query_as(&sql)
            .bind(namespace)
            .fetch_all(self.store.pool())
            .await?;
        rows.into_iter().map(row_into_guardrail).collect()
    }

    /// Delete a guardrail that nothing references.
    ///
    /// # Errors
    ///
    /// - [`Error::PermissionDenied`] if the gate refuses.
    /// - [`Error::NotFound`] if the guardrail does not exist.
    /// - [`Error::InUse`] with the live counts if any association references it.
    pub async fn delete(&self, key: &ResourceRef) -> Result<Guardrail> {
        self.gate
            .check(EntityKind::Guardrail, Operation::Delete)
            .await?;

        let mut tx = self.store.begin().await?;
        let guardrail = require(&mut *tx, key).await?;
        ReferenceGuard::ensure_unreferenced(&mut tx, &guardrail).await?;

        sqlx::query("DELETE FROM guardrails WHERE id = ?1")
            .bind(&guardrail.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| match e.as_database_error() {
                Some(db) if db.is_foreign_key_violation() => {
                    Error::Conflict(format!("guardrail {key} is still referenced"))
                }
                _ => Error::Database(e),
            })?;
        tx.commit().await?;

        info!(guardrail = %key, id = %guardrail.id, "guardrail deleted");
        Ok(guardrail)
    }
}

/// Next `updated_at`: now, but never at or before the previous value.
fn bumped(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = store::now();
    match previous.checked_add_signed(TimeDelta::microseconds(1)) {
        Some(floor) if floor > now => floor,
        _ => now,
    }
}
