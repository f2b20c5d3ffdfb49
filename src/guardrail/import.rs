//! Bulk guardrail import with per-item outcomes.
//!
//! One bad item never aborts the batch. Authorization is checked once for
//! the whole request; a denial rejects it before any item is attempted.

use serde::Serialize;
use tracing::{info, warn};

use super::{GuardrailRegistry, NewGuardrail};
use crate::auth::{EntityKind, Operation, Role};
use crate::error::{ErrorKind, Result};

/// Result of one imported item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ImportOutcome {
    /// The guardrail was created.
    Imported {
        /// Id of the new guardrail.
        id: String,
    },
    /// The guardrail was rejected.
    Failed {
        /// Error category.
        kind: ErrorKind,
        /// Error message.
        message: String,
    },
}

/// One line of an [`ImportReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportItem {
    /// Position in the submitted batch.
    pub index: usize,
    /// Namespace as submitted.
    pub namespace: String,
    /// Name as submitted.
    pub name: String,
    /// What happened.
    #[serde(flatten)]
    pub outcome: ImportOutcome,
}

/// Summary of a bulk import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Number of guardrails created.
    pub imported: usize,
    /// Number of items rejected.
    pub failed: usize,
    /// Per-item detail, in submission order.
    pub items: Vec<ImportItem>,
}

impl GuardrailRegistry {
    /// Create every guardrail in `batch`, recording success or failure per
    /// item. Each item commits on its own.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::PermissionDenied`] if the gate refuses the
    /// import. Item failures are reported in the [`ImportReport`].
    pub async fn import(&self, batch: Vec<NewGuardrail>) -> Result<ImportReport> {
        self.gate
            .check_role(Role::Admin, EntityKind::Guardrail, Operation::Create)
            .await?;

        let mut report = ImportReport::default();
        for (index, item) in batch.into_iter().enumerate() {
            let namespace = item.namespace.clone();
            let name = item.name.clone();
            let outcome = match self.insert(item).await {
                Ok(guardrail) => {
                    report.imported = report.imported.saturating_add(1);
                    ImportOutcome::Imported { id: guardrail.id }
                }
                Err(err) => {
                    warn!(index, %namespace, %name, error = %err, "guardrail import item rejected");
                    report.failed = report.failed.saturating_add(1);
                    ImportOutcome::Failed {
                        kind: err.kind(),
                        message: err.to_string(),
                    }
                }
            };
            report.items.push(ImportItem {
                index,
                namespace,
                name,
                outcome,
            });
        }

        info!(
            imported = report.imported,
            failed = report.failed,
            "guardrail import finished"
        );
        Ok(report)
    }
}
