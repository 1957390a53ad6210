//! An oracle whose answers are fixed up front.
//!
//! Useful for replaying a captured `go list` listing against a prepared
//! package set, and for exercising the atlas without a Go installation.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::types::{canonical_unsafe_scope, Scope};
use super::{BuildOracle, LoadRequest, OraclePackage, ParseHook, BUILTIN_PACKAGE};
use crate::core::error::{AnalyzerError, Result};

pub struct InMemoryOracle {
    roots: Vec<Arc<OraclePackage>>,
    builtin: Option<Arc<OraclePackage>>,
    std_packages: Vec<String>,
    package_dirs: HashMap<String, PathBuf>,
    listing: Option<Vec<u8>>,
    load_error: Option<String>,
    unsafe_scope: Scope,
}

impl InMemoryOracle {
    pub fn new(roots: Vec<Arc<OraclePackage>>) -> Self {
        Self {
            roots,
            builtin: None,
            std_packages: Vec::new(),
            package_dirs: HashMap::new(),
            listing: None,
            load_error: None,
            unsafe_scope: canonical_unsafe_scope(),
        }
    }

    pub fn with_builtin(mut self, builtin: Arc<OraclePackage>) -> Self {
        self.builtin = Some(builtin);
        self
    }

    pub fn with_std_packages<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.std_packages = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_package_dir(mut self, path: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.package_dirs.insert(path.into(), dir.into());
        self
    }

    /// Answer module listings with `listing`; without one they fail.
    pub fn with_listing(mut self, listing: impl Into<Vec<u8>>) -> Self {
        self.listing = Some(listing.into());
        self
    }

    /// Make the primary load fail with `message`.
    pub fn failing_load(mut self, message: impl Into<String>) -> Self {
        self.load_error = Some(message.into());
        self
    }

    pub fn with_unsafe_scope(mut self, scope: Scope) -> Self {
        self.unsafe_scope = scope;
        self
    }
}

/// Report every syntax file reachable from `roots` to the hook, once each.
fn replay_parses(roots: &[Arc<OraclePackage>], hook: &dyn ParseHook) {
    let mut seen = HashSet::new();
    let mut stack: Vec<&Arc<OraclePackage>> = roots.iter().collect();
    while let Some(pkg) = stack.pop() {
        if !seen.insert(pkg.path.as_str()) {
            continue;
        }
        for file in &pkg.syntax {
            hook.file_parsed(&file.path);
        }
        stack.extend(pkg.imports.iter());
    }
}

impl BuildOracle for InMemoryOracle {
    fn load(&self, request: &LoadRequest, hook: &dyn ParseHook) -> Result<Vec<Arc<OraclePackage>>> {
        if let Some(message) = &self.load_error {
            return Err(AnalyzerError::oracle("load", message));
        }
        if request.args.len() == 1 && request.args[0] == BUILTIN_PACKAGE {
            let builtin = self.builtin.iter().cloned().collect::<Vec<_>>();
            replay_parses(&builtin, hook);
            return Ok(builtin);
        }
        replay_parses(&self.roots, hook);
        Ok(self.roots.clone())
    }

    fn list_std_packages(&self, _request: &LoadRequest) -> Result<Vec<String>> {
        Ok(self.std_packages.clone())
    }

    fn locate_package_dir(&self, path: &str) -> Result<PathBuf> {
        self.package_dirs
            .get(path)
            .cloned()
            .ok_or_else(|| AnalyzerError::oracle("locate package", format!("no directory for {}", path)))
    }

    fn list_modules(&self, _request: &LoadRequest, timeout: Duration) -> Result<Vec<u8>> {
        self.listing.clone().ok_or_else(|| AnalyzerError::CommandTimeout {
            command: "go list -deps -json".to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }

    fn unsafe_scope(&self) -> &Scope {
        &self.unsafe_scope
    }
}
