//! Core data structures: packages, modules and the module arena.
//!
//! Packages and modules refer to each other by index (`PackageId`,
//! `ModuleId`) into tables owned by the `CodeAnalyzer`. A module's id is its
//! registration index and never changes.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::core::error::{AnalyzerError, Result};
use crate::core::oracle::OraclePackage;

/// Index of a package in the analyzer's package list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PackageId(pub usize);

/// Registration index of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ModuleId(pub usize);

/// One compilation unit.
#[derive(Debug, Clone)]
pub struct Package {
    /// Everything the oracle reported: files, syntax, types.
    pub oracle: Arc<OraclePackage>,
    /// Imported packages, in import order.
    pub deps: Vec<PackageId>,
    /// Packages importing this one.
    pub deped_bys: Vec<PackageId>,
    /// Owning module, when it could be determined.
    pub module: Option<ModuleId>,
    /// Source directory, filled by module resolution.
    pub directory: Option<PathBuf>,
}

impl Package {
    pub fn new(oracle: Arc<OraclePackage>) -> Self {
        Self {
            oracle,
            deps: Vec::new(),
            deped_bys: Vec::new(),
            module: None,
            directory: None,
        }
    }

    /// Import path.
    pub fn path(&self) -> &str {
        &self.oracle.path
    }
}

/// A versioned distribution unit.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Module {
    /// Module path; empty for the standard library.
    pub path: String,
    /// Version, possibly a pseudo-version; empty for modules developed in place.
    pub version: String,
    pub dir: PathBuf,
    /// Whether the go command reports this as a main module.
    pub main: bool,
    #[serde(skip)]
    pub pkgs: Vec<PackageId>,
    pub index: usize,

    pub repository_url: String,
    pub repository_commit: String,
    pub repository_dir: PathBuf,
    /// Where the module lives inside its repository, e.g. `/src/` or `/sub/dir/`.
    pub extra_path_in_repository: String,
}

impl Module {
    pub fn new(path: impl Into<String>, version: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            version: version.into(),
            dir: dir.into(),
            ..Self::default()
        }
    }

    /// The standard library module, before its version is known.
    pub fn standard(expected_packages: usize) -> Self {
        Self {
            pkgs: Vec::with_capacity(expected_packages),
            ..Self::default()
        }
    }

    pub fn id(&self) -> ModuleId {
        ModuleId(self.index)
    }

    /// Human readable `path@version`; the standard library prints as `std`.
    pub fn display_name(&self) -> String {
        let path = if self.path.is_empty() { "std" } else { &self.path };
        if self.version.is_empty() {
            path.to_string()
        } else {
            format!("{}@{}", path, self.version)
        }
    }
}

/// Module storage sized to its final length before any id is handed out.
///
/// Registering beyond the announced capacity is an internal error: the
/// resolver counts modules before allocating, so overflow means the count
/// and the registration pass disagree.
#[derive(Debug, Default)]
pub struct ModuleArena {
    modules: Vec<Module>,
    capacity: usize,
}

impl ModuleArena {
    pub fn with_exact_capacity(capacity: usize) -> Self {
        Self {
            modules: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Store `module`, assigning the next index.
    pub fn register(&mut self, mut module: Module) -> Result<ModuleId> {
        if self.modules.len() >= self.capacity {
            return Err(AnalyzerError::invariant(format!(
                "module table overflow registering {} (capacity {})",
                module.display_name(),
                self.capacity
            )));
        }
        module.index = self.modules.len();
        self.modules.push(module);
        Ok(ModuleId(self.modules.len() - 1))
    }

    pub fn get(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id.0)
    }

    pub fn get_mut(&mut self, id: ModuleId) -> Option<&mut Module> {
        self.modules.get_mut(id.0)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Module> {
        self.modules.iter()
    }

    /// Modules from `start` on, mutably and disjointly.
    pub fn tail_mut(&mut self, start: usize) -> &mut [Module] {
        let start = start.min(self.modules.len());
        &mut self.modules[start..]
    }

    pub fn as_slice(&self) -> &[Module] {
        &self.modules
    }
}
