//! Transaction pipeline configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Dashed option names accepted in configuration files.
pub(crate) const KEY_ALIASES: [(&str, &str); 1] = [("dry-run", "dry_run")];

/// Options that decide whether a transaction's request is performed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Run every hook but never perform requests.
    #[serde(default)]
    pub dry_run: bool,
    /// Log transaction names instead of performing requests.
    #[serde(default)]
    pub names: bool,
    /// When non-empty, only transactions with these names are requested.
    #[serde(default)]
    pub only: Vec<String>,
    /// When non-empty, only requests with these HTTP methods are performed.
    #[serde(default)]
    pub method: Vec<String>,
    /// Path to the compiled transaction list (JSON array).
    #[serde(default)]
    pub transactions: Option<PathBuf>,
}

impl RunnerConfig {
    /// Returns whether `method` passes the method filter.
    pub fn allows_method(&self, method: &str) -> bool {
        self.method.is_empty() || self.method.iter().any(|m| m.eq_ignore_ascii_case(method))
    }

    /// Returns whether `name` passes the `only` filter.
    pub fn allows_name(&self, name: &str) -> bool {
        self.only.is_empty() || self.only.iter().any(|n| n == name)
    }
}
