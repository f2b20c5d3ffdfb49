//! Configuration loading.
//!
//! `~/.warden/config.toml` (or `$WARDEN_CONFIG`) is optional; every section
//! has defaults. `$WARDEN_DB` overrides the database path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;

use crate::auth::{Authorizer, Role, StaticAuthorizer, Unavailable};
use crate::catalog::{ResourceRef, StaticCatalog};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite location.
    pub database: DatabaseConfig,
    /// Authorization for the local operator.
    pub auth: AuthConfig,
    /// Log output.
    pub logging: LoggingConfig,
    /// Tools and workloads known to the local catalog.
    pub catalog: CatalogConfig,
}

/// Database settings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file. Defaults to `~/.warden/warden.db`.
    pub path: Option<PathBuf>,
}

/// How mutations are authorized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Grant [`AuthConfig::role`] to the operator.
    #[default]
    Static,
    /// Behave as if the policy provider were down: deny every mutation.
    Deny,
}

/// Authorization settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Role granted to the local operator.
    pub role: Role,
    /// Authorizer selection.
    pub mode: AuthMode,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            role: Role::Viewer,
            mode: AuthMode::Static,
        }
    }
}

/// Logging settings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// When set, JSON logs are also written here with daily rotation.
    pub json_dir: Option<PathBuf>,
}

/// Seed data for [`StaticCatalog`].
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Known tools.
    pub tools: Vec<ResourceRef>,
    /// Known workloads and their tool dependencies.
    pub workloads: Vec<WorkloadEntry>,
}

/// One workload in the catalog.
#[derive(Debug, Deserialize)]
pub struct WorkloadEntry {
    /// Workload namespace.
    pub namespace: String,
    /// Workload name.
    pub name: String,
    /// Tool dependencies as `namespace/name`.
    #[serde(default)]
    pub tools: Vec<String>,
}

impl Config {
    /// Apply environment overrides. `env` is injected for testability.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(path) = env("WARDEN_DB") {
            self.database.path = Some(PathBuf::from(path));
        }
    }

    /// Resolved database path.
    ///
    /// # Errors
    ///
    /// Returns an error if no path is configured and the home directory
    /// cannot be determined.
    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        match &self.database.path {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join("warden.db")),
        }
    }

    /// Authorizer for the local operator.
    pub fn authorizer(&self) -> Arc<dyn Authorizer> {
        match self.auth.mode {
            AuthMode::Static => Arc::new(StaticAuthorizer::new(self.auth.role)),
            AuthMode::Deny => Arc::new(Unavailable::new("authorization disabled by config")),
        }
    }

    /// Build the static catalog from the `[catalog]` section.
    ///
    /// # Errors
    ///
    /// Returns an error if a workload dependency is not `namespace/name`.
    pub fn build_catalog(&self) -> anyhow::Result<StaticCatalog> {
        let catalog = StaticCatalog::new();
        for tool in &self.catalog.tools {
            catalog.add_tool(tool.clone());
        }
        for entry in &self.catalog.workloads {
            let workload = ResourceRef::new(&entry.namespace, &entry.name);
            let deps = entry
                .tools
                .iter()
                .map(|t| t.parse::<ResourceRef>())
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("invalid tool dependency in workload {workload}"))?;
            catalog.add_workload(workload, deps);
        }
        Ok(catalog)
    }
}

/// Load configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config at {}: {e}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config at {}: {e}", path.display()))?;
    Ok(config)
}

/// Load from `path`, `$WARDEN_CONFIG` or `~/.warden/config.toml`, in that
/// order, then apply environment overrides. A missing default file yields
/// defaults; an explicitly named file must exist.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    let explicit = path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("WARDEN_CONFIG").map(PathBuf::from));
    let mut config = match explicit {
        Some(path) => load_config(&path)?,
        None => {
            let path = config_dir()?.join("config.toml");
            if path.exists() {
                load_config(&path)?
            } else {
                tracing::debug!(path = %path.display(), "no config file found, using defaults");
                Config::default()
            }
        }
    };
    config.apply_overrides(|key| std::env::var(key).ok());
    Ok(config)
}

/// Resolve the default config directory (`~/.warden/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".warden"))
}
