//! The analyzer context.
//!
//! `CodeAnalyzer` owns everything one analysis produces: the package table
//! with its edges and the module set. Operations take it explicitly; there is
//! no process-wide state.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::core::config::{toolchain_path, DEFAULT_LIST_TIMEOUT_SECS};
use crate::core::graph::PackageGraph;
use crate::core::models::{Module, ModuleId, Package, PackageId};
use crate::core::modules::ModuleSet;
use crate::core::provenance::PseudoVersion;

/// Package/module model of one workspace.
#[derive(Debug)]
pub struct CodeAnalyzer {
    pub(crate) goroot: PathBuf,
    pub(crate) list_timeout: Duration,
    pub(crate) graph: PackageGraph,
    pub(crate) builtin_pkg: Option<PackageId>,
    pub(crate) modules: Option<ModuleSet>,
    pub(crate) parsed_files: u32,
}

impl CodeAnalyzer {
    pub fn new(goroot: impl Into<PathBuf>) -> Self {
        Self {
            goroot: goroot.into(),
            list_timeout: Duration::from_secs(DEFAULT_LIST_TIMEOUT_SECS),
            graph: PackageGraph::default(),
            builtin_pkg: None,
            modules: None,
            parsed_files: 0,
        }
    }

    /// Deadline for the module listing query.
    pub fn with_list_timeout(mut self, timeout: Duration) -> Self {
        self.list_timeout = timeout;
        self
    }

    pub fn goroot(&self) -> &Path {
        &self.goroot
    }

    pub fn toolchain_path(&self) -> PathBuf {
        toolchain_path(&self.goroot)
    }

    pub fn graph(&self) -> &PackageGraph {
        &self.graph
    }

    pub fn packages(&self) -> &[Package] {
        &self.graph.packages
    }

    pub fn package(&self, path: &str) -> Option<&Package> {
        self.graph.get(path)
    }

    pub fn package_by_id(&self, id: PackageId) -> Option<&Package> {
        self.graph.packages.get(id.0)
    }

    pub fn builtin_package(&self) -> Option<&Package> {
        self.builtin_pkg.and_then(|id| self.package_by_id(id))
    }

    /// All modules in index order; empty before `parse_packages`.
    pub fn modules(&self) -> &[Module] {
        self.modules.as_ref().map(|m| m.arena.as_slice()).unwrap_or(&[])
    }

    /// Look a module up by path; the standard module is keyed `std`.
    pub fn module(&self, path: &str) -> Option<&Module> {
        self.modules.as_ref().and_then(|m| m.get(path))
    }

    pub fn module_by_id(&self, id: ModuleId) -> Option<&Module> {
        self.modules.as_ref().and_then(|m| m.arena.get(id))
    }

    pub fn module_of(&self, pkg: &Package) -> Option<&Module> {
        pkg.module.and_then(|id| self.module_by_id(id))
    }

    pub fn std_module(&self) -> Option<&Module> {
        self.modules.as_ref().and_then(|m| m.arena.get(m.std))
    }

    pub fn toolchain_module(&self) -> Option<&Module> {
        self.modules.as_ref().and_then(|m| m.toolchain).and_then(|id| self.module_by_id(id))
    }

    pub fn working_module(&self) -> Option<&Module> {
        self.modules.as_ref().and_then(|m| m.working).and_then(|id| self.module_by_id(id))
    }

    /// Number of files the oracle parsed during the last load.
    pub fn parsed_files(&self) -> u32 {
        self.parsed_files
    }

    pub fn summary(&self) -> AnalysisSummary {
        AnalysisSummary {
            packages: self.graph.packages.len(),
            edges: self.graph.edge_count(),
            parsed_files: self.parsed_files,
            packages_without_module: self.graph.packages.iter().filter(|p| p.module.is_none()).count(),
            std_module: self.std_module().map(|m| m.version.clone()).unwrap_or_default(),
            toolchain_module: self.toolchain_module().is_some(),
            working_module: self.working_module().map(|m| m.path.clone()),
            modules: self.modules().iter().map(ModuleSummary::from).collect(),
        }
    }
}

/// What the CLI reports after an analysis.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary {
    pub packages: usize,
    pub edges: usize,
    pub parsed_files: u32,
    pub packages_without_module: usize,
    /// Version of the standard module, empty when unknown.
    pub std_module: String,
    pub toolchain_module: bool,
    pub working_module: Option<String>,
    pub modules: Vec<ModuleSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleSummary {
    pub index: usize,
    pub path: String,
    pub version: String,
    pub packages: usize,
    pub dir: PathBuf,
    pub repository_url: String,
    pub repository_commit: String,
    pub extra_path_in_repository: String,
    /// Commit time encoded in a pseudo-version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_time: Option<NaiveDateTime>,
}

impl From<&Module> for ModuleSummary {
    fn from(m: &Module) -> Self {
        Self {
            index: m.index,
            path: if m.path.is_empty() { "std".to_string() } else { m.path.clone() },
            version: m.version.clone(),
            packages: m.pkgs.len(),
            dir: m.dir.clone(),
            repository_url: m.repository_url.clone(),
            repository_commit: m.repository_commit.clone(),
            extra_path_in_repository: m.extra_path_in_repository.clone(),
            revision_time: PseudoVersion::parse(&m.version).map(|pv| pv.timestamp),
        }
    }
}

impl fmt::Display for AnalysisSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} packages, {} import edges, {} files parsed",
            self.packages, self.edges, self.parsed_files
        )?;
        if self.packages_without_module > 0 {
            writeln!(f, "{} packages without a module", self.packages_without_module)?;
        }
        if let Some(working) = &self.working_module {
            writeln!(f, "working module: {}", working)?;
        }
        writeln!(f, "{} modules:", self.modules.len())?;
        for m in &self.modules {
            let name = if m.version.is_empty() {
                m.path.clone()
            } else {
                format!("{}@{}", m.path, m.version)
            };
            write!(f, "  [{}] {} ({} pkgs)", m.index, name, m.packages)?;
            if !m.repository_url.is_empty() {
                write!(f, " {}", m.repository_url)?;
                if !m.repository_commit.is_empty() {
                    write!(f, " @ {}", m.repository_commit)?;
                }
            }
            if let Some(time) = m.revision_time {
                write!(f, " ({})", time.format("%Y-%m-%d %H:%M:%S"))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
