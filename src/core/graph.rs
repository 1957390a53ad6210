//! Dependency graph construction.
//!
//! The oracle answers with a nested import tree. This module flattens it
//! into one key-unique package table and builds forward and reverse edges.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::core::error::{AnalyzerError, Result};
use crate::core::models::{Package, PackageId};
use crate::core::oracle::OraclePackage;

/// The flat package table with both edge directions.
#[derive(Debug, Default)]
pub struct PackageGraph {
    pub packages: Vec<Package>,
    pub table: HashMap<String, PackageId>,
}

impl PackageGraph {
    pub fn get(&self, path: &str) -> Option<&Package> {
        self.table.get(path).map(|id| &self.packages[id.0])
    }

    pub fn edge_count(&self) -> usize {
        self.packages.iter().map(|p| p.deps.len()).sum()
    }
}

/// Collect every package reachable from `roots`, first occurrence wins.
///
/// Order is a depth-first preorder over imports, so the result is
/// deterministic for a given oracle answer.
pub fn collect_oracle_packages(roots: &[Arc<OraclePackage>]) -> Vec<Arc<OraclePackage>> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(1024);
    let mut all = Vec::with_capacity(1024);
    let mut stack: Vec<&Arc<OraclePackage>> = roots.iter().rev().collect();
    while let Some(pkg) = stack.pop() {
        if !seen.insert(pkg.path.as_str()) {
            continue;
        }
        all.push(Arc::clone(pkg));
        stack.extend(pkg.imports.iter().rev());
    }
    all
}

/// Put `pkg` into `all`, replacing an entry with the same path.
pub fn insert_or_replace(all: &mut Vec<Arc<OraclePackage>>, pkg: Arc<OraclePackage>) {
    match all.iter().position(|p| p.path == pkg.path) {
        Some(i) => all[i] = pkg,
        None => all.push(pkg),
    }
}

/// Build the package table and its edges from a key-unique package list.
///
/// Forward edges follow each package's import list. Reverse edges are sized
/// exactly in a counting pass before being filled. An import whose target is
/// not in the table means the oracle contradicted itself and is reported as
/// an invariant violation.
pub fn build_package_graph(all: Vec<Arc<OraclePackage>>) -> Result<PackageGraph> {
    let mut table = HashMap::with_capacity(all.len());
    let mut packages = Vec::with_capacity(all.len());
    for oracle in all {
        if table.contains_key(&oracle.path) {
            return Err(AnalyzerError::invariant(format!(
                "package {} collected twice",
                oracle.path
            )));
        }
        table.insert(oracle.path.clone(), PackageId(packages.len()));
        packages.push(Package::new(oracle));
    }

    let mut num_deped_bys = vec![0u32; packages.len()];
    for pkg in packages.iter_mut() {
        let mut deps = Vec::with_capacity(pkg.oracle.imports.len());
        for path in pkg.oracle.import_paths() {
            let Some(&dep) = table.get(path) else {
                return Err(AnalyzerError::invariant(format!(
                    "dependency package {} of {} not found",
                    path,
                    pkg.path()
                )));
            };
            if deps.contains(&dep) {
                continue;
            }
            deps.push(dep);
            num_deped_bys[dep.0] += 1;
        }
        pkg.deps = deps;
    }

    for (pkg, &count) in packages.iter_mut().zip(&num_deped_bys) {
        pkg.deped_bys = Vec::with_capacity(count as usize);
    }
    for i in 0..packages.len() {
        for j in 0..packages[i].deps.len() {
            let dep = packages[i].deps[j];
            packages[dep.0].deped_bys.push(PackageId(i));
        }
    }

    Ok(PackageGraph { packages, table })
}
