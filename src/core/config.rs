//! Runtime configuration.
//!
//! Loaded from `.atlas_config.json` (or `--config`), then overridden by CLI
//! flags. The Go root falls back to `$GOROOT` and finally `go env GOROOT`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::core::error::{AnalyzerError, Result, ResultExt};
use crate::core::oracle::command::CommandSpec;

/// Default name of the per-project configuration file.
pub const CONFIG_FILE_NAME: &str = ".atlas_config.json";

/// Default deadline for the module listing query, in seconds.
pub const DEFAULT_LIST_TIMEOUT_SECS: u64 = 15;

/// Atlas configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AtlasConfig {
    /// Go installation root; discovered when unset.
    pub goroot: Option<PathBuf>,
    /// The go command to run.
    pub go_command: String,
    /// Deadline for the module listing query.
    pub list_timeout_secs: u64,
    pub verbose: bool,
    /// Module path prefix to repository URL, checked before host inference.
    pub repository_url_overrides: Vec<UrlOverride>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct UrlOverride {
    pub prefix: String,
    pub url: String,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            goroot: None,
            go_command: "go".to_string(),
            list_timeout_secs: DEFAULT_LIST_TIMEOUT_SECS,
            verbose: false,
            repository_url_overrides: Vec::new(),
        }
    }
}

impl AtlasConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(AnalyzerError::from)
            .context(format!("reading {}", path.display()))?;
        let config: AtlasConfig = serde_json::from_str(&content)
            .map_err(AnalyzerError::from)
            .context(format!("parsing {}", path.display()))?;
        if config.go_command.trim().is_empty() {
            return Err(AnalyzerError::invalid_config("go_command must not be empty"));
        }
        Ok(config)
    }

    /// Load `explicit`, or the default file under `dir` when it exists.
    pub fn load(explicit: Option<&Path>, dir: &Path) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let default = dir.join(CONFIG_FILE_NAME);
                if default.is_file() {
                    Self::from_file(&default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_secs(self.list_timeout_secs)
    }

    /// The Go root: configured, `$GOROOT`, or asked from the go command.
    pub fn resolve_goroot(&self) -> Result<PathBuf> {
        if let Some(goroot) = &self.goroot {
            return Ok(goroot.clone());
        }
        if let Some(goroot) = std::env::var_os("GOROOT").filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(goroot));
        }
        let stdout = CommandSpec::new(&self.go_command)
            .args(["env", "GOROOT"])
            .run_checked(Some(self.list_timeout()))
            .context("locating GOROOT")?;
        let goroot = String::from_utf8_lossy(&stdout).trim().to_string();
        if goroot.is_empty() {
            return Err(AnalyzerError::invalid_config("go env GOROOT printed nothing"));
        }
        Ok(PathBuf::from(goroot))
    }

    /// Repository URL configured for `module_path`, longest prefix first.
    pub fn url_override(&self, module_path: &str) -> Option<&str> {
        matching_override(&self.repository_url_overrides, module_path).map(|o| o.url.as_str())
    }
}

/// The override whose prefix covers `module_path`, longest prefix first.
pub fn matching_override<'a>(overrides: &'a [UrlOverride], module_path: &str) -> Option<&'a UrlOverride> {
    overrides
        .iter()
        .filter(|o| module_path == o.prefix || module_path.starts_with(&format!("{}/", o.prefix)))
        .max_by_key(|o| o.prefix.len())
}

/// `$GOROOT/src/cmd`
pub fn toolchain_path(goroot: &Path) -> PathBuf {
    goroot.join("src").join("cmd")
}
