//! Lookups against the tool and workload records owned by other stores.
//!
//! The registry never owns tools or workloads. Before an attach or add it
//! asks an [`EntityCatalog`] whether the referenced records exist and whether
//! a tool is one of a workload's dependencies. [`StaticCatalog`] is an
//! in-memory implementation seeded from config or tests.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// `(namespace, name)` identity of a tool, workload or guardrail.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Scoping namespace.
    pub namespace: String,
    /// Name within the namespace.
    pub name: String,
}

impl ResourceRef {
    /// Build a reference from its parts.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ResourceRef {
    type Err = Error;

    /// Parse `namespace/name`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(ns, name))
            }
            _ => Err(Error::invalid(
                "reference",
                format!("expected namespace/name, got {s:?}"),
            )),
        }
    }
}

/// Kinds of externally owned records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A callable unit.
    Tool,
    /// A higher-level unit composed of tools.
    Workload,
}

impl ResourceKind {
    /// Lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Workload => "workload",
        }
    }
}

/// Errors from a catalog backend.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The backing store could not be queried.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Existence checks against the tool and workload stores.
#[async_trait]
pub trait EntityCatalog: Send + Sync {
    /// Whether a record of `kind` named `namespace/name` exists.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the backing store cannot be queried.
    async fn exists(&self, kind: ResourceKind, resource: &ResourceRef)
        -> Result<bool, CatalogError>;

    /// Whether `tool` is part of `workload`'s dependency set.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the backing store cannot be queried.
    async fn workload_uses_tool(
        &self,
        workload: &ResourceRef,
        tool: &ResourceRef,
    ) -> Result<bool, CatalogError>;
}

/// In-memory catalog of tools and workloads.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    tools: RwLock<HashSet<ResourceRef>>,
    workloads: RwLock<HashMap<ResourceRef, HashSet<ResourceRef>>>,
}

impl StaticCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.
    pub fn add_tool(&self, tool: ResourceRef) {
        self.tools_mut().insert(tool);
    }

    /// Register a workload with its tool dependencies.
    pub fn add_workload(&self, workload: ResourceRef, tools: impl IntoIterator<Item = ResourceRef>) {
        self.workloads_mut()
            .insert(workload, tools.into_iter().collect());
    }

    /// Add `tool` to an existing workload's dependency set.
    ///
    /// Returns `false` if the workload is unknown.
    pub fn add_dependency(&self, workload: &ResourceRef, tool: ResourceRef) -> bool {
        match self.workloads_mut().get_mut(workload) {
            Some(deps) => {
                deps.insert(tool);
                true
            }
            None => false,
        }
    }

    /// Drop a tool or workload. Workloads that depended on a removed tool
    /// lose that dependency.
    pub fn remove(&self, kind: ResourceKind, resource: &ResourceRef) {
        match kind {
            ResourceKind::Tool => {
                self.tools_mut().remove(resource);
                for deps in self.workloads_mut().values_mut() {
                    deps.remove(resource);
                }
            }
            ResourceKind::Workload => {
                self.workloads_mut().remove(resource);
            }
        }
    }

    // Single-statement writes never leave the sets half-updated, so a
    // poisoned guard is still safe to use.
    fn tools_mut(&self) -> RwLockWriteGuard<'_, HashSet<ResourceRef>> {
        self.tools.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn workloads_mut(&self) -> RwLockWriteGuard<'_, HashMap<ResourceRef, HashSet<ResourceRef>>> {
        self.workloads.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EntityCatalog for StaticCatalog {
    async fn exists(
        &self,
        kind: ResourceKind,
        resource: &ResourceRef,
    ) -> Result<bool, CatalogError> {
        let poisoned = || CatalogError::Unavailable("catalog lock poisoned".to_owned());
        match kind {
            ResourceKind::Tool => Ok(self.tools.read().map_err(|_| poisoned())?.contains(resource)),
            ResourceKind::Workload => Ok(self
                .workloads
                .read()
                .map_err(|_| poisoned())?
                .contains_key(resource)),
        }
    }

    async fn workload_uses_tool(
        &self,
        workload: &ResourceRef,
        tool: &ResourceRef,
    ) -> Result<bool, CatalogError> {
        let workloads = self
            .workloads
            .read()
            .map_err(|_| CatalogError::Unavailable("catalog lock poisoned".to_owned()))?;
        Ok(workloads
            .get(workload)
            .is_some_and(|deps| deps.contains(tool)))
    }
}
