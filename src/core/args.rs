//! Scope argument normalization.
//!
//! Turns the user's scope arguments into the argument list handed to the
//! oracle, plus the directory and environment the oracle must run with.
//! Nothing here touches the process environment or working directory.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::core::error::{AnalyzerError, Result};
use crate::core::oracle::BUILTIN_PACKAGE;

/// Selects the entire standard distribution.
pub const STD_TOKEN: &str = "std";

/// Selects the toolchain's own sources (`$GOROOT/src/cmd`).
pub const TOOLCHAIN_TOKEN: &str = "toolchain";

/// Normalized scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeArgs {
    /// Arguments for the oracle, `builtin` removed.
    pub args: Vec<String>,
    /// The caller asked for the toolchain sources.
    pub has_toolchain: bool,
    /// The scope is exactly the standard distribution.
    pub std_only: bool,
    /// Directory oracle queries must run in.
    pub work_dir: Option<PathBuf>,
    /// Environment overrides for oracle queries.
    pub env: Vec<(String, String)>,
}

/// Normalize `args` against the toolchain source directory.
///
/// - no arguments select the current directory
/// - `std` alone also sets `GO111MODULE=off` and `CGO_ENABLED=0`
/// - `toolchain` becomes `./...` run inside `toolchain_path`; it may only be
///   combined with `std`, and is dropped with a warning when that directory
///   does not exist
/// - `builtin` is always removed: it is loaded by a dedicated query
pub fn normalize_arguments(args: &[String], toolchain_path: &Path) -> Result<ScopeArgs> {
    if args.is_empty() {
        return Ok(ScopeArgs {
            args: vec![".".to_string()],
            has_toolchain: false,
            std_only: false,
            work_dir: None,
            env: Vec::new(),
        });
    }

    let std_only = args.len() == 1 && args[0] == STD_TOKEN;
    let mut scope = ScopeArgs {
        args: Vec::with_capacity(args.len()),
        has_toolchain: false,
        std_only,
        work_dir: None,
        env: Vec::new(),
    };

    if std_only {
        scope.args.push(STD_TOKEN.to_string());
        scope.env.push(("GO111MODULE".to_string(), "off".to_string()));
        scope.env.push(("CGO_ENABLED".to_string(), "0".to_string()));
        return Ok(scope);
    }

    let mut toolchain_requested = false;
    let mut has_others = false;
    for arg in args {
        match arg.as_str() {
            STD_TOKEN => scope.args.push(arg.clone()),
            TOOLCHAIN_TOKEN => {
                toolchain_requested = true;
                if !toolchain_path.is_dir() {
                    warn!(
                        path = %toolchain_path.display(),
                        "the toolchain argument is ignored, its source directory does not exist"
                    );
                    continue;
                }
                scope.has_toolchain = true;
                scope.args.push("./...".to_string());
            }
            BUILTIN_PACKAGE => {}
            _ => {
                has_others = true;
                scope.args.push(arg.clone());
            }
        }
    }

    if toolchain_requested && has_others {
        return Err(AnalyzerError::invalid_arguments(
            "the toolchain pseudo module name can only be used solely or alongside with the std pseudo module name",
        ));
    }
    if scope.has_toolchain {
        scope.work_dir = Some(toolchain_path.to_path_buf());
    }

    Ok(scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_defaults_to_current_dir() {
        let scope = normalize_arguments(&[], Path::new("/nonexistent/cmd")).unwrap();
        assert_eq!(scope.args, vec!["."]);
        assert!(!scope.has_toolchain);
        assert!(scope.env.is_empty());
    }

    #[test]
    fn test_std_only_sets_environment() {
        let scope = normalize_arguments(&strings(&["std"]), Path::new("/nonexistent/cmd")).unwrap();
        assert!(scope.std_only);
        assert_eq!(scope.args, vec!["std"]);
        assert!(scope.env.contains(&("GO111MODULE".to_string(), "off".to_string())));
        assert!(scope.env.contains(&("CGO_ENABLED".to_string(), "0".to_string())));
    }

    #[test]
    fn test_toolchain_switches_directory() {
        let tmp = TempDir::new().unwrap();
        let scope = normalize_arguments(&strings(&["std", "toolchain"]), tmp.path()).unwrap();
        assert!(scope.has_toolchain);
        assert!(!scope.std_only);
        assert_eq!(scope.args, vec!["std", "./..."]);
        assert_eq!(scope.work_dir.as_deref(), Some(tmp.path()));
        assert!(scope.env.is_empty());
    }

    #[test]
    fn test_toolchain_with_other_paths_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = normalize_arguments(&strings(&["toolchain", "./pkg/..."]), tmp.path()).unwrap_err();
        assert!(matches!(err, AnalyzerError::InvalidArguments { .. }));

        // Still rejected when the toolchain directory is missing.
        let err = normalize_arguments(&strings(&["./pkg", "toolchain"]), Path::new("/nonexistent/cmd")).unwrap_err();
        assert!(matches!(err, AnalyzerError::InvalidArguments { .. }));
    }

    #[test]
    fn test_missing_toolchain_dir_is_dropped() {
        let scope = normalize_arguments(&strings(&["toolchain"]), Path::new("/nonexistent/cmd")).unwrap();
        assert!(!scope.has_toolchain);
        assert!(scope.args.is_empty());
        assert!(scope.work_dir.is_none());
    }

    #[test]
    fn test_builtin_is_stripped() {
        let scope = normalize_arguments(&strings(&["builtin", "./..."]), Path::new("/nonexistent")).unwrap();
        assert_eq!(scope.args, vec!["./..."]);
    }
}
