//! Package-set loading: the analysis entry point.
//!
//! One primary oracle query loads the requested scope, a second one loads
//! `builtin` alone (including it in the primary query reintroduces its
//! self-reference errors). The answers are flattened into the package graph,
//! `unsafe` is reconstructed, and modules are resolved.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::core::analyzer::CodeAnalyzer;
use crate::core::args::{normalize_arguments, STD_TOKEN};
use crate::core::error::{AnalyzerError, Result, ResultExt};
use crate::core::graph::{build_package_graph, collect_oracle_packages, insert_or_replace};
use crate::core::modules::{seed_std_module, ModuleResolver};
use crate::core::oracle::{BuildOracle, LoadRequest, OraclePackage, BUILTIN_PACKAGE};
use crate::core::progress::{ProgressCallback, ProgressReporter, SubTask};
use crate::core::provenance::CompleteModuleInfo;
use crate::core::unsafe_pkg::{fill_unsafe_package, needs_reconstruction};

/// Caller hooks for `parse_packages`.
#[derive(Default, Clone, Copy)]
pub struct ParseOptions<'a> {
    pub progress: Option<&'a ProgressCallback<'a>>,
    /// Dump every resolved module at `info` level.
    pub verbose: bool,
    /// Run once per external module, concurrently, to fill provenance.
    pub complete_module_info: Option<&'a CompleteModuleInfo<'a>>,
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Print the diagnostics of every package reachable from `roots` except
/// `builtin`, whose self-reference errors are expected. Returns how many
/// were printed.
fn report_diagnostics(roots: &[Arc<OraclePackage>]) -> usize {
    let mut reported = 0;
    for pkg in collect_oracle_packages(roots) {
        if pkg.path == BUILTIN_PACKAGE {
            continue;
        }
        for diag in &pkg.diagnostics {
            eprintln!("{}: {}", pkg.path, diag);
            reported += 1;
        }
    }
    reported
}

impl CodeAnalyzer {
    /// Load the packages selected by `args` and build the package/module model.
    ///
    /// Replaces whatever a previous call produced.
    pub fn parse_packages(&mut self, oracle: &dyn BuildOracle, options: &ParseOptions<'_>, args: &[String]) -> Result<()> {
        let scope = normalize_arguments(args, &self.toolchain_path())?;
        debug!(args = ?scope.args, has_toolchain = scope.has_toolchain, "scope normalized");

        let reporter = ProgressReporter::new(options.progress);
        let hook = |_: &Path| reporter.file_parsed();

        let mut request = LoadRequest::new(scope.args.clone());
        request.dir = scope.work_dir.clone();
        request.env = scope.env.clone();

        let roots = oracle.load(&request, &hook).context("packages load (parse packages)")?;
        let reported = report_diagnostics(&roots);
        if reported > 0 {
            return Err(AnalyzerError::PackageErrors { count: reported });
        }

        let builtin = oracle
            .load(&request.with_args(vec![BUILTIN_PACKAGE.to_string()]), &hook)
            .context("packages load (parse builtin package)")?;
        let [builtin] = <[Arc<OraclePackage>; 1]>::try_from(builtin).map_err(|found| {
            AnalyzerError::oracle(
                "parse builtin package",
                format!("expected exactly one package, got {}", found.len()),
            )
        })?;
        reporter.report(true, SubTask::ParsePackagesDone, &[reporter.parsed_files()]);

        let mut std_paths = oracle
            .list_std_packages(&request.with_args(vec![STD_TOKEN.to_string()]))
            .context("failed to collect std packages")?;
        if !std_paths.iter().any(|p| p == BUILTIN_PACKAGE) {
            std_paths.insert(0, BUILTIN_PACKAGE.to_string());
        }

        let mut all = collect_oracle_packages(&roots);
        insert_or_replace(&mut all, builtin);
        if let Some((unsafe_index, builtin_index)) = needs_reconstruction(&all) {
            let filled = fill_unsafe_package(oracle, &all[unsafe_index], &all[builtin_index])?;
            all[unsafe_index] = Arc::new(filled);
        }
        let mut graph = build_package_graph(all)?;
        reporter.report(true, SubTask::CollectPackages, &[count(graph.packages.len())]);

        let std_module = seed_std_module(&mut graph, &std_paths);
        let modules = ModuleResolver::new(oracle, &self.goroot)
            .timeout(self.list_timeout)
            .verbose(options.verbose)
            .completion(options.complete_module_info)
            .resolve(&request, scope.has_toolchain, &mut graph, std_module)?;
        reporter.report(true, SubTask::CollectModules, &[count(modules.len())]);

        info!(
            packages = graph.packages.len(),
            edges = graph.edge_count(),
            modules = modules.len(),
            "workspace model built"
        );
        self.builtin_pkg = graph.table.get(BUILTIN_PACKAGE).copied();
        self.parsed_files = reporter.parsed_files();
        self.graph = graph;
        self.modules = Some(modules);
        Ok(())
    }
}
