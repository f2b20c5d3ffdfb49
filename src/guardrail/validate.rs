//! Field bounds for guardrail and association records.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Maximum length of a guardrail name or namespace.
pub const MAX_NAME_LEN: usize = 63;
/// Maximum length of a guardrail description.
pub const MAX_DESCRIPTION_LEN: usize = 1000;
/// Maximum length of a guardrail deployment string.
pub const MAX_DEPLOYMENT_LEN: usize = 2000;
/// Maximum length of an opaque parameters payload.
pub const MAX_PARAMETERS_LEN: usize = 10_000;

// Lowercase alphanumerics with internal hyphens.
static DNS_LABEL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").ok());

fn check_label(field: &'static str, value: &str) -> Result<()> {
    let len = value.chars().count();
    if len == 0 || len > MAX_NAME_LEN {
        return Err(Error::invalid(
            field,
            format!("must be 1-{MAX_NAME_LEN} characters, got {len}"),
        ));
    }
    let matches = DNS_LABEL.as_ref().is_some_and(|re| re.is_match(value));
    if !matches {
        return Err(Error::invalid(
            field,
            format!(
                "{value:?} must consist of lowercase alphanumerics and hyphens, \
                 starting and ending with an alphanumeric"
            ),
        ));
    }
    Ok(())
}

fn check_text(field: &'static str, value: &str, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len == 0 || len > max {
        return Err(Error::invalid(
            field,
            format!("must be 1-{max} characters, got {len}"),
        ));
    }
    Ok(())
}

/// Validate a guardrail name.
pub fn name(value: &str) -> Result<()> {
    check_label("name", value)
}

/// Validate a guardrail namespace.
pub fn namespace(value: &str) -> Result<()> {
    check_label("namespace", value)
}

/// Validate a guardrail description.
pub fn description(value: &str) -> Result<()> {
    check_text("description", value, MAX_DESCRIPTION_LEN)
}

/// Validate a guardrail deployment string.
pub fn deployment(value: &str) -> Result<()> {
    check_text("deployment", value, MAX_DEPLOYMENT_LEN)
}

/// Validate an optional parameters payload. Content is opaque; only the
/// size is bounded.
pub fn parameters(value: Option<&str>) -> Result<()> {
    match value {
        Some(p) => {
            let len = p.chars().count();
            if len > MAX_PARAMETERS_LEN {
                return Err(Error::invalid(
                    "parameters",
                    format!("must be at most {MAX_PARAMETERS_LEN} characters, got {len}"),
                ));
            }
            Ok(())
        }
        None => Ok(()),
    }
}
