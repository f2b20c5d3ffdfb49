//! Guardrail attachments to tools and to workload/tool pairings.
//!
//! Two tables, one shape:
//!
//! - `tool_guardrails` ([`tool::ToolAssociationStore`]): a guardrail on a tool.
//! - `workload_tool_guardrails` ([`workload::WorkloadToolAssociationStore`]):
//!   a guardrail on a workload's use of a tool, tagged with its [`Source`].
//!
//! Both reference `guardrails(id)` with `ON DELETE RESTRICT`. No ordering is
//! defined between several guardrails on the same attachment point; list
//! results are sorted by guardrail key only for stable output.

pub mod tool;
pub mod workload;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// When a guardrail runs relative to the tool it guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionTiming {
    /// Before the tool runs.
    #[serde(rename = "pre-execution")]
    PreExecution,
    /// After the tool runs.
    #[serde(rename = "post-execution")]
    PostExecution,
}

impl ExecutionTiming {
    /// Returns the string representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreExecution => "pre-execution",
            Self::PostExecution => "post-execution",
        }
    }

    pub(crate) fn decode(raw: &str) -> Result<Self> {
        raw.parse().map_err(|_| Error::Corrupt {
            field: "execution_timing",
            value: raw.to_owned(),
        })
    }
}

impl fmt::Display for ExecutionTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionTiming {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pre-execution" => Ok(Self::PreExecution),
            "post-execution" => Ok(Self::PostExecution),
            other => Err(Error::invalid(
                "execution_timing",
                format!("{other:?} is not one of pre-execution, post-execution"),
            )),
        }
    }
}

/// Provenance of a workload-tool association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Copied from the tool's own attachments when the workload adopted the
    /// tool. Cannot be removed or edited at the workload level.
    Tool,
    /// Added directly on the workload.
    Workload,
}

impl Source {
    /// Returns the string representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Workload => "workload",
        }
    }

    pub(crate) fn decode(raw: &str) -> Result<Self> {
        match raw {
            "tool" => Ok(Self::Tool),
            "workload" => Ok(Self::Workload),
            other => Err(Error::Corrupt {
                field: "source",
                value: other.to_owned(),
            }),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partial edit of an association.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationPatch {
    /// New execution timing.
    pub execution_timing: Option<ExecutionTiming>,
    /// New parameters; `Some(None)` clears them.
    pub parameters: Option<Option<String>>,
}

impl AssociationPatch {
    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.execution_timing.is_none() && self.parameters.is_none()
    }
}

pub use tool::{ToolAssociation, ToolAssociationStore};
pub use workload::{WorkloadToolAssociation, WorkloadToolAssociationStore};
