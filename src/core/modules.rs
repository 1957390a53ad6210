//! Module resolution.
//!
//! Packages are partitioned into modules by reconciling the package table
//! with a second, cheaper oracle listing (`go list -deps -json`). The listing
//! is best-effort enrichment: when it cannot be obtained or decoded the
//! analysis continues with only the standard module known.
//!
//! Module ids are fixed in this order: the standard module, the toolchain
//! module when present, then every external module in listing order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::core::config::{toolchain_path, DEFAULT_LIST_TIMEOUT_SECS};
use crate::core::error::{AnalyzerError, Result};
use crate::core::graph::PackageGraph;
use crate::core::models::{Module, ModuleArena, ModuleId, PackageId};
use crate::core::oracle::{BuildOracle, LoadRequest};
use crate::core::provenance::{complete_all, confirm_repository_commit, CompleteModuleInfo};

/// Key of the standard module in the by-path table.
pub const STD_MODULE_KEY: &str = "std";

/// Path of the synthetic toolchain module.
pub const TOOLCHAIN_MODULE_PATH: &str = "cmd";

/// Upstream repository of the Go distribution.
pub const GO_REPOSITORY_URL: &str = "https://github.com/golang/go";

/// One `go list -json` record, reduced to what resolution needs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ListedPackage {
    pub import_path: String,
    pub dir: String,
    pub module: Option<ListedModule>,
    /// Lives under GOROOT.
    pub goroot: bool,
    pub standard: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ListedModule {
    pub path: String,
    pub version: String,
    pub dir: String,
    pub main: bool,
}

impl ListedPackage {
    /// Owning module path, when the record names one.
    fn module_path(&self) -> Option<&str> {
        self.module.as_ref().map(|m| m.path.as_str()).filter(|p| !p.is_empty())
    }
}

/// Decode a stream of concatenated JSON objects.
///
/// A record cut short at the end of the stream (a truncated listing) is
/// dropped with a warning; any other malformed input is an error.
pub fn parse_listing(output: &[u8]) -> Result<Vec<ListedPackage>> {
    let mut records = Vec::with_capacity(256);
    let stream = serde_json::Deserializer::from_slice(output).into_iter::<ListedPackage>();
    for record in stream {
        match record {
            Ok(record) => records.push(record),
            Err(e) if e.is_eof() => {
                warn!(records = records.len(), error = %e, "module listing ends with a partial record, dropped");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(records)
}

/// Read the distribution version from `$GOROOT/VERSION` (its first line).
pub fn read_go_version(goroot: &Path) -> Result<String> {
    let path = goroot.join("VERSION");
    let data = std::fs::read_to_string(&path).map_err(|source| AnalyzerError::VersionMarker {
        path: path.clone(),
        source,
    })?;
    Ok(data.lines().next().unwrap_or("").trim().to_string())
}

/// The resolved modules.
#[derive(Debug)]
pub struct ModuleSet {
    pub arena: ModuleArena,
    pub by_path: HashMap<String, ModuleId>,
    pub std: ModuleId,
    pub toolchain: Option<ModuleId>,
    /// The module developed in place, if any.
    pub working: Option<ModuleId>,
}

impl ModuleSet {
    /// Only the standard module; the degraded result.
    pub fn std_only(std_module: Module) -> Result<Self> {
        let mut arena = ModuleArena::with_exact_capacity(1);
        let std = arena.register(std_module)?;
        let mut by_path = HashMap::with_capacity(1);
        by_path.insert(STD_MODULE_KEY.to_string(), std);
        Ok(Self {
            arena,
            by_path,
            std,
            toolchain: None,
            working: None,
        })
    }

    pub fn get(&self, path: &str) -> Option<&Module> {
        self.by_path.get(path).and_then(|&id| self.arena.get(id))
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    fn first_external(&self) -> usize {
        1 + usize::from(self.toolchain.is_some())
    }

    /// Modules fetched or developed outside the distribution.
    pub fn external(&self) -> &[Module] {
        let start = self.first_external().min(self.arena.len());
        &self.arena.as_slice()[start..]
    }
}

/// Build the standard module from the distribution's package list.
///
/// Packages of `std_paths` present in the graph join the module (id 0) now,
/// before the listing pass, so they stay attributed even when the listing
/// is unavailable.
pub fn seed_std_module(graph: &mut PackageGraph, std_paths: &[String]) -> Module {
    let mut std_module = Module::standard(std_paths.len());
    let std_id = ModuleId(0);
    for path in std_paths {
        if let Some(&id) = graph.table.get(path) {
            let pkg = &mut graph.packages[id.0];
            if pkg.module.is_none() {
                pkg.module = Some(std_id);
                std_module.pkgs.push(id);
            }
        }
    }
    debug!(packages = std_module.pkgs.len(), "standard module seeded");
    std_module
}

/// Reconciles the module listing against a package graph.
pub struct ModuleResolver<'a> {
    oracle: &'a dyn BuildOracle,
    goroot: PathBuf,
    toolchain_path: PathBuf,
    timeout: Duration,
    verbose: bool,
    complete: Option<&'a CompleteModuleInfo<'a>>,
}

impl<'a> ModuleResolver<'a> {
    pub fn new(oracle: &'a dyn BuildOracle, goroot: &Path) -> Self {
        Self {
            oracle,
            goroot: goroot.to_path_buf(),
            toolchain_path: toolchain_path(goroot),
            timeout: Duration::from_secs(DEFAULT_LIST_TIMEOUT_SECS),
            verbose: false,
            complete: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Called once per external module, concurrently, before commits are derived.
    pub fn completion(mut self, complete: Option<&'a CompleteModuleInfo<'a>>) -> Self {
        self.complete = complete;
        self
    }

    /// Partition the packages of `graph` into modules.
    ///
    /// `has_toolchain` is the caller's guess; the listing decides. Listing
    /// failures degrade to a standard-only result. An unreadable VERSION
    /// marker, a module count disagreement or more than one unversioned
    /// module are errors.
    pub fn resolve(
        &self,
        request: &LoadRequest,
        has_toolchain: bool,
        graph: &mut PackageGraph,
        std_module: Module,
    ) -> Result<ModuleSet> {
        let records = match self
            .oracle
            .list_modules(request, self.timeout)
            .and_then(|output| parse_listing(&output))
        {
            Ok(records) => records,
            Err(e) => {
                warn!(args = ?request.args, error = %e, "unable to list packages and modules info");
                return ModuleSet::std_only(std_module);
            }
        };
        self.reconcile(&records, has_toolchain, graph, std_module)
    }

    /// Resolution over already decoded listing records.
    pub fn reconcile(
        &self,
        records: &[ListedPackage],
        mut has_toolchain: bool,
        graph: &mut PackageGraph,
        std_module: Module,
    ) -> Result<ModuleSet> {
        let mut num_toolchain_pkgs = 0usize;
        let mut modules_num_pkgs: HashMap<&str, usize> = HashMap::with_capacity(256);
        for record in records {
            if let Some(path) = record.module_path() {
                *modules_num_pkgs.entry(path).or_default() += 1;
            } else if self.in_toolchain(record) {
                num_toolchain_pkgs += 1;
            }
        }

        if num_toolchain_pkgs == 0 && has_toolchain {
            warn!("toolchain requested but no package lies under the toolchain root");
            has_toolchain = false;
        } else if num_toolchain_pkgs > 0 && !has_toolchain {
            debug!(packages = num_toolchain_pkgs, "toolchain packages found, adding the toolchain module");
            has_toolchain = true;
        }

        let capacity = 1 + usize::from(has_toolchain) + modules_num_pkgs.len();
        let mut arena = ModuleArena::with_exact_capacity(capacity);
        let mut by_path: HashMap<String, ModuleId> = HashMap::with_capacity(capacity);

        let std = arena.register(std_module)?;
        by_path.insert(STD_MODULE_KEY.to_string(), std);
        let toolchain = if has_toolchain {
            let mut module = Module::new(TOOLCHAIN_MODULE_PATH, "", self.toolchain_path.clone());
            module.pkgs = Vec::with_capacity(num_toolchain_pkgs);
            let id = arena.register(module)?;
            by_path.insert(TOOLCHAIN_MODULE_PATH.to_string(), id);
            Some(id)
        } else {
            None
        };
        let first_external = arena.len();

        let mut packages_without_module = 0usize;
        for record in records {
            let pkg_id = graph.table.get(&record.import_path).copied();
            match pkg_id {
                Some(id) if !record.dir.is_empty() => {
                    graph.packages[id.0].directory = Some(PathBuf::from(&record.dir));
                }
                Some(_) => {}
                None => warn!(package = %record.import_path, "listed package is not in the package table"),
            }

            if let (Some(path), Some(listed)) = (record.module_path(), record.module.as_ref()) {
                let module_id = match by_path.get(path) {
                    Some(&id) => id,
                    None => {
                        let mut module = Module::new(path, listed.version.clone(), listed.dir.clone());
                        module.main = listed.main;
                        module.pkgs = Vec::with_capacity(modules_num_pkgs.get(path).copied().unwrap_or(0));
                        let id = arena.register(module)?;
                        by_path.insert(path.to_string(), id);
                        id
                    }
                };
                if let Some(id) = pkg_id {
                    attach(graph, &mut arena, id, module_id)?;
                }
            } else if self.in_toolchain(record) {
                let (Some(id), Some(toolchain)) = (pkg_id, toolchain) else {
                    continue;
                };
                if graph.packages[id.0].module.is_some() {
                    warn!(package = %record.import_path, "module of toolchain package is already confirmed");
                } else {
                    attach(graph, &mut arena, id, toolchain)?;
                }
            } else if record.standard {
                if pkg_id.is_some_and(|id| graph.packages[id.0].module != Some(std)) {
                    warn!(package = %record.import_path, "module of standard package is still not confirmed");
                }
            } else {
                packages_without_module += 1;
            }
        }

        let num_external = arena.len() - first_external;
        if num_external != modules_num_pkgs.len() {
            return Err(AnalyzerError::invariant(format!(
                "non-std modules count wrong ({} : {})",
                num_external,
                modules_num_pkgs.len()
            )));
        }
        for m in &arena.as_slice()[first_external..] {
            let listed = modules_num_pkgs.get(m.path.as_str()).copied().unwrap_or(0);
            if m.pkgs.len() != listed {
                warn!(module = %m.path, attached = m.pkgs.len(), listed, "module package count mismatch");
            }
        }
        if packages_without_module > 0 && num_external > 0 {
            warn!(
                packages = packages_without_module,
                "in modules mode, but some packages are not in any module"
            );
        }

        let go_version = read_go_version(&self.goroot)?;
        if let Some(m) = arena.get_mut(std) {
            m.version = go_version.clone();
            m.dir = self.goroot.join("src");
            m.repository_commit = go_version.clone();
            m.repository_dir = self.goroot.clone();
            m.repository_url = GO_REPOSITORY_URL.to_string();
            m.extra_path_in_repository = "/src/".to_string();
        }
        if let Some(m) = toolchain.and_then(|id| arena.get_mut(id)) {
            m.version = go_version.clone();
            m.dir = self.toolchain_path.clone();
            m.repository_commit = go_version;
            m.repository_dir = self.goroot.clone();
            m.repository_url = GO_REPOSITORY_URL.to_string();
            m.extra_path_in_repository = "/src/cmd".to_string();
        }

        let unversioned: Vec<&Module> = arena.as_slice()[first_external..]
            .iter()
            .filter(|m| m.version.is_empty())
            .collect();
        let working = match unversioned.as_slice() {
            [] => toolchain,
            [m] => Some(m.id()),
            many => {
                return Err(AnalyzerError::AmbiguousWorkingModule {
                    paths: many.iter().map(|m| m.path.clone()).collect(),
                })
            }
        };

        if let Some(complete) = self.complete {
            complete_all(arena.tail_mut(first_external), complete);
            for (index, m) in arena.iter().enumerate() {
                if m.index != index {
                    return Err(AnalyzerError::invariant(format!(
                        "module {} changed its index ({} -> {}) during completion",
                        m.path, index, m.index
                    )));
                }
            }
        }
        for m in arena.tail_mut(first_external) {
            if !m.version.is_empty() {
                confirm_repository_commit(m);
            }
        }

        let set = ModuleSet {
            arena,
            by_path,
            std,
            toolchain,
            working,
        };
        if self.verbose {
            dump_modules(&set, graph);
        }
        check_consistency(&set, graph);
        Ok(set)
    }

    fn in_toolchain(&self, record: &ListedPackage) -> bool {
        !record.dir.is_empty() && Path::new(&record.dir).starts_with(&self.toolchain_path)
    }
}

fn attach(graph: &mut PackageGraph, arena: &mut ModuleArena, pkg: PackageId, module: ModuleId) -> Result<()> {
    let m = arena
        .get_mut(module)
        .ok_or_else(|| AnalyzerError::invariant(format!("module #{} not registered", module.0)))?;
    m.pkgs.push(pkg);
    graph.packages[pkg.0].module = Some(module);
    Ok(())
}

fn dump_modules(set: &ModuleSet, graph: &PackageGraph) {
    for m in set.arena.iter() {
        let first_dir = m
            .pkgs
            .first()
            .and_then(|id| graph.packages[id.0].directory.as_ref())
            .map(|d| d.display().to_string())
            .unwrap_or_default();
        info!(
            module = %m.display_name(),
            packages = m.pkgs.len(),
            first_package_dir = %first_dir,
            dir = %m.dir.display(),
            repository_dir = %m.repository_dir.display(),
            repository_url = %m.repository_url,
            extra_path_in_repository = %m.extra_path_in_repository,
            "module"
        );
    }
}

fn check_consistency(set: &ModuleSet, graph: &PackageGraph) {
    for m in set.external() {
        if Some(m.id()) != set.working && m.version.is_empty() {
            warn!(module = %m.path, "module version is not confirmed");
        }
    }
    for pkg in &graph.packages {
        let Some(id) = pkg.module else { continue };
        if id == set.std {
            continue;
        }
        if let Some(m) = set.arena.get(id) {
            if !pkg.path().starts_with(&m.path) {
                warn!(package = %pkg.path(), module = %m.path, "package path does not start with its module path");
            }
        }
    }
}
