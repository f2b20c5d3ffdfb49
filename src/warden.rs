//! Wiring of the registry, association stores and hooks over one store.

use std::sync::Arc;

use crate::association::{ToolAssociationStore, WorkloadToolAssociationStore};
use crate::auth::{Authorizer, MutationGate};
use crate::catalog::EntityCatalog;
use crate::guardrail::GuardrailRegistry;
use crate::inheritance::InheritancePropagator;
use crate::lifecycle::LifecycleHooks;
use crate::references::ReferenceGuard;
use crate::store::Store;

/// Every component, sharing one store, one gate and one catalog.
///
/// | Field         | Operation surface                                              |
/// |---------------|----------------------------------------------------------------|
/// | `guardrails`  | `/guardrails`, `/guardrails/{ns}/{name}`, `/guardrails/import` |
/// | `tools`       | `/tools/{ns}/{name}/guardrails[/{gns}/{gname}]`                |
/// | `workloads`   | `/workloads/{wns}/{wname}/tools/{tns}/{tname}/guardrails[...]` |
/// | `inheritance` | workload store's "tool added" / "tool removed" callbacks       |
/// | `lifecycle`   | tool/workload store's "entity deleted" callback                |
#[derive(Debug, Clone)]
pub struct Warden {
    /// Guardrail records.
    pub guardrails: GuardrailRegistry,
    /// Tool-level attachments.
    pub tools: ToolAssociationStore,
    /// Workload-tool attachments.
    pub workloads: WorkloadToolAssociationStore,
    /// Copy-on-attach propagation.
    pub inheritance: InheritancePropagator,
    /// Reference counts.
    pub references: ReferenceGuard,
    /// Orphan cleanup.
    pub lifecycle: LifecycleHooks,
}

impl Warden {
    /// Build every component over `store`.
    pub fn new(
        store: Store,
        authorizer: Arc<dyn Authorizer>,
        catalog: Arc<dyn EntityCatalog>,
    ) -> Self {
        let gate = MutationGate::new(authorizer);
        Self {
            guardrails: GuardrailRegistry::new(store.clone(), gate.clone()),
            tools: ToolAssociationStore::new(store.clone(), gate.clone(), Arc::clone(&catalog)),
            workloads: WorkloadToolAssociationStore::new(
                store.clone(),
                gate.clone(),
                Arc::clone(&catalog),
            ),
            inheritance: InheritancePropagator::new(store.clone(), gate, catalog),
            references: ReferenceGuard::new(store.clone()),
            lifecycle: LifecycleHooks::new(store),
        }
    }
}
