//! Live reference counting for guardrail deletion.

use serde::Serialize;
use tracing::warn;

use crate::association::{tool, workload};
use crate::error::{Error, Result};
use crate::guardrail::Guardrail;
use crate::store::{Store, UnitOfWork};

/// How many associations point at a guardrail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReferenceCounts {
    /// Rows in the tool association table.
    pub tool: u64,
    /// Rows in the workload-tool association table.
    pub workload_tool: u64,
}

impl ReferenceCounts {
    /// Sum of both counts.
    pub fn total(&self) -> u64 {
        self.tool.saturating_add(self.workload_tool)
    }

    /// Whether nothing references the guardrail.
    pub fn is_zero(&self) -> bool {
        self.total() == 0
    }
}

/// Counts references across both association tables.
#[derive(Debug, Clone)]
pub struct ReferenceGuard {
    store: Store,
}

impl ReferenceGuard {
    /// Guard over `store`.
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Current committed reference counts for `guardrail_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] on SQLite failure.
    pub async fn count_references(&self, guardrail_id: &str) -> Result<ReferenceCounts> {
        let pool = self.store.pool();
        Ok(ReferenceCounts {
            tool: tool::count_by_guardrail(pool, guardrail_id).await?,
            workload_tool: workload::count_by_guardrail(pool, guardrail_id).await?,
        })
    }

    /// Count inside `uow` and refuse if anything references `guardrail`.
    ///
    /// The counts are taken in the same transaction as the delete that
    /// follows, so the error always reports what the store holds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InUse`] if either count is non-zero.
    pub async fn ensure_unreferenced(uow: &mut UnitOfWork, guardrail: &Guardrail) -> Result<()> {
        let counts = ReferenceCounts {
            tool: tool::count_by_guardrail(&mut **uow, &guardrail.id).await?,
            workload_tool: workload::count_by_guardrail(&mut **uow, &guardrail.id).await?,
        };
        if counts.is_zero() {
            return Ok(());
        }
        let key = guardrail.key();
        warn!(
            guardrail = %key,
            tools = counts.tool,
            workload_tools = counts.workload_tool,
            "guardrail deletion refused: still referenced"
        );
        Err(Error::InUse {
            guardrail: key.to_string(),
            counts,
        })
    }
}
