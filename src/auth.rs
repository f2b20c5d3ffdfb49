//! Authorization seam for every mutating call.
//!
//! Components never talk to an [`Authorizer`] directly; they go through
//! [`MutationGate::check`], which turns the three possible outcomes into
//! results:
//!
//! | Authorizer returns     | Gate returns                                   |
//! |------------------------|------------------------------------------------|
//! | `Ok(Decision::Allow)`  | `Ok(())`                                       |
//! | `Ok(Decision::Deny)`   | `Err(PermissionDenied(Denial::Policy))`        |
//! | `Err(_)`               | `Err(PermissionDenied(Denial::ProviderUnavailable))` |
//!
//! A provider failure is never treated as an allow.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Denial, Error, Result};

/// Roles in ascending order of privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Read-only access.
    Viewer,
    /// May attach, detach and edit.
    Editor,
    /// May also delete and bulk-import guardrails.
    Admin,
}

impl Role {
    /// Lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Editor => "editor",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "viewer" => Ok(Self::Viewer),
            "editor" => Ok(Self::Editor),
            "admin" => Ok(Self::Admin),
            other => Err(Error::invalid("role", format!("unknown role {other:?}"))),
        }
    }
}

/// Record kinds a mutation can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A guardrail definition.
    Guardrail,
    /// A guardrail attached to a tool.
    ToolGuardrail,
    /// A guardrail attached to a workload's use of a tool.
    WorkloadToolGuardrail,
}

impl EntityKind {
    /// Snake-case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Guardrail => "guardrail",
            Self::ToolGuardrail => "tool_guardrail",
            Self::WorkloadToolGuardrail => "workload_tool_guardrail",
        }
    }
}

/// Mutation verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Insert a record.
    Create,
    /// Modify a record in place.
    Update,
    /// Remove a record.
    Delete,
}

impl Operation {
    /// Lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Minimum role for a mutation.
///
/// Deleting a guardrail requires `admin`; every other mutation requires
/// `editor`. Bulk import asks for `admin` explicitly.
pub fn required_role(entity: EntityKind, op: Operation) -> Role {
    match (entity, op) {
        (EntityKind::Guardrail, Operation::Delete) => Role::Admin,
        _ => Role::Editor,
    }
}

/// Outcome of an authorization query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Proceed with the mutation.
    Allow,
    /// Refuse the mutation.
    Deny(String),
}

/// Errors raised by an authorization provider.
#[derive(Debug, thiserror::Error)]
pub enum AuthorizerError {
    /// The provider could not be reached.
    #[error("authorizer unreachable: {0}")]
    Unreachable(String),

    /// The provider answered with something unusable.
    #[error("authorizer failed: {0}")]
    Failed(String),
}

/// Policy backend deciding whether the current caller may mutate.
///
/// Implementations are bound to a caller (a request, a CLI session); the
/// query itself carries no identity.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Decide whether `op` on `entity` is allowed for a caller that must
    /// hold at least `required`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorizerError`] if the decision cannot be made.
    async fn authorize(
        &self,
        required: Role,
        entity: EntityKind,
        op: Operation,
    ) -> std::result::Result<Decision, AuthorizerError>;
}

/// Fail-closed wrapper around an [`Authorizer`].
#[derive(Clone)]
pub struct MutationGate {
    authorizer: Arc<dyn Authorizer>,
}

impl fmt::Debug for MutationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationGate").finish_non_exhaustive()
    }
}

impl MutationGate {
    /// Wrap an authorizer.
    pub fn new(authorizer: Arc<dyn Authorizer>) -> Self {
        Self { authorizer }
    }

    /// Check `op` on `entity` using [`required_role`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] on a policy denial or when the
    /// authorizer errors.
    pub async fn check(&self, entity: EntityKind, op: Operation) -> Result<()> {
        self.check_role(required_role(entity, op), entity, op).await
    }

    /// Check `op` on `entity` against an explicit minimum role.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] on a policy denial or when the
    /// authorizer errors.
    pub async fn check_role(&self, required: Role, entity: EntityKind, op: Operation) -> Result<()> {
        match self.authorizer.authorize(required, entity, op).await {
            Ok(Decision::Allow) => {
                debug!(
                    entity = entity.as_str(),
                    op = op.as_str(),
                    %required,
                    "mutation authorized"
                );
                Ok(())
            }
            Ok(Decision::Deny(reason)) => {
                warn!(entity = entity.as_str(), op = op.as_str(), %reason, "mutation denied");
                Err(Error::PermissionDenied(Denial::Policy(reason)))
            }
            Err(err) => {
                warn!(
                    entity = entity.as_str(),
                    op = op.as_str(),
                    error = %err,
                    "authorizer failed; denying mutation"
                );
                Err(Error::PermissionDenied(Denial::ProviderUnavailable(
                    err.to_string(),
                )))
            }
        }
    }
}

/// Grants a fixed role to every caller.
#[derive(Debug, Clone, Copy)]
pub struct StaticAuthorizer {
    granted: Role,
}

impl StaticAuthorizer {
    /// Authorizer for a caller holding `granted`.
    pub fn new(granted: Role) -> Self {
        Self { granted }
    }
}

#[async_trait]
impl Authorizer for StaticAuthorizer {
    async fn authorize(
        &self,
        required: Role,
        _entity: EntityKind,
        _op: Operation,
    ) -> std::result::Result<Decision, AuthorizerError> {
        if self.granted >= required {
            Ok(Decision::Allow)
        } else {
            Ok(Decision::Deny(format!(
                "role {} is below required role {}",
                self.granted, required
            )))
        }
    }
}

/// Allows everything. For tests and single-user tooling.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn authorize(
        &self,
        _required: Role,
        _entity: EntityKind,
        _op: Operation,
    ) -> std::result::Result<Decision, AuthorizerError> {
        Ok(Decision::Allow)
    }
}

/// Always fails to answer, so every mutation is denied.
#[derive(Debug, Clone, Default)]
pub struct Unavailable {
    reason: String,
}

impl Unavailable {
    /// Provider that reports `reason` on every call.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Authorizer for Unavailable {
    async fn authorize(
        &self,
        _required: Role,
        _entity: EntityKind,
        _op: Operation,
    ) -> std::result::Result<Decision, AuthorizerError> {
        Err(AuthorizerError::Unreachable(self.reason.clone()))
    }
}
