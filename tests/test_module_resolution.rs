//! Module resolution integration tests
//!
//! Packages are partitioned into modules from a captured `go list -deps -json`
//! listing. Covers partitioning, index stability, commit derivation, the
//! toolchain module and concurrent provenance completion.

mod fixture;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use atlas::core::oracle::{FileSet, InMemoryOracle, OraclePackage};
use atlas::core::provenance::derive_commit;
use atlas::core::CompleteModuleInfo;
use atlas::{CodeAnalyzer, Module, ParseOptions};
use fixture::{fake_goroot, workspace_listing, workspace_oracle, GO_VERSION, PSEUDO_VERSION};
use serde_json::json;

fn analyze_with(oracle: &InMemoryOracle, goroot: &std::path::Path, args: &[&str], options: &ParseOptions<'_>) -> CodeAnalyzer {
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    let mut analyzer = CodeAnalyzer::new(goroot);
    analyzer.parse_packages(oracle, options, &args).unwrap();
    analyzer
}

#[test]
fn test_modules_partition_packages() {
    let goroot = fake_goroot();
    let oracle = workspace_oracle(goroot.path()).with_listing(workspace_listing(goroot.path()));
    let analyzer = analyze_with(&oracle, goroot.path(), &["./..."], &ParseOptions::default());

    let mut seen = HashSet::new();
    for m in analyzer.modules() {
        for id in &m.pkgs {
            assert!(seen.insert(*id), "package listed twice");
            assert_eq!(analyzer.package_by_id(*id).unwrap().module, Some(m.id()));
        }
    }
    let with_module: HashSet<_> = analyzer
        .packages()
        .iter()
        .enumerate()
        .filter(|(_, p)| p.module.is_some())
        .map(|(i, _)| atlas::PackageId(i))
        .collect();
    assert_eq!(seen, with_module);
    // Every package of this workspace has a module.
    assert_eq!(with_module.len(), analyzer.packages().len());

    let app = analyzer.module("example.com/app").unwrap();
    assert_eq!(app.pkgs.len(), 2);
    assert!(app.main);
    assert_eq!(analyzer.working_module().map(|m| m.path.as_str()), Some("example.com/app"));
    let util = analyzer.package("example.com/app/util").unwrap();
    assert_eq!(util.directory.as_deref(), Some(std::path::Path::new("/work/app/util")));
}

#[test]
fn test_module_indices_are_stable_and_unique() {
    let goroot = fake_goroot();
    let oracle = workspace_oracle(goroot.path()).with_listing(workspace_listing(goroot.path()));
    let analyzer = analyze_with(&oracle, goroot.path(), &["./..."], &ParseOptions::default());

    let indices: Vec<usize> = analyzer.modules().iter().map(|m| m.index).collect();
    assert_eq!(indices, (0..analyzer.modules().len()).collect::<Vec<_>>());
    assert_eq!(analyzer.std_module().unwrap().index, 0);
    // Listing order: the dependency is listed before the main module.
    assert_eq!(analyzer.module("github.com/x/y").unwrap().index, 1);
    assert_eq!(analyzer.module("example.com/app").unwrap().index, 2);
    for m in analyzer.modules() {
        assert_eq!(analyzer.module_by_id(m.id()).unwrap().path, m.path);
    }
}

#[test]
fn test_std_module_provenance() {
    let goroot = fake_goroot();
    let oracle = workspace_oracle(goroot.path()).with_listing(workspace_listing(goroot.path()));
    let analyzer = analyze_with(&oracle, goroot.path(), &["./..."], &ParseOptions::default());

    let std = analyzer.module("std").unwrap();
    assert_eq!(std.version, GO_VERSION);
    assert_eq!(std.repository_commit, GO_VERSION);
    assert_eq!(std.repository_url, "https://github.com/golang/go");
    assert_eq!(std.extra_path_in_repository, "/src/");
    assert_eq!(std.dir, goroot.path().join("src"));
    assert_eq!(std.repository_dir, goroot.path());
    // builtin, errors, fmt, io, os, unsafe
    assert_eq!(std.pkgs.len(), 6);
}

#[test]
fn test_commit_derivation() {
    assert_eq!(derive_commit("v0.0.0-20180917221912-90fa682c2a6e", ""), "90fa682c2a6e");
    assert_eq!(derive_commit("v0.4.2-0.20210302225053-d515b24adc21", ""), "d515b24adc21");
    assert_eq!(derive_commit("v1.2.3", ""), "v1.2.3");
    assert_eq!(derive_commit("v1.2.3", "/sub/dir/"), "sub/dir/v1.2.3");

    let goroot = fake_goroot();
    let oracle = workspace_oracle(goroot.path()).with_listing(workspace_listing(goroot.path()));
    let analyzer = analyze_with(&oracle, goroot.path(), &["./..."], &ParseOptions::default());
    let dep = analyzer.module("github.com/x/y").unwrap();
    assert_eq!(dep.version, PSEUDO_VERSION);
    assert_eq!(dep.repository_commit, "90fa682c2a6e");
    // The working module is never given a derived commit.
    assert_eq!(analyzer.module("example.com/app").unwrap().repository_commit, "");

    let summary = analyzer.summary();
    let pinned = summary.modules.iter().find(|m| m.path == "github.com/x/y").unwrap();
    assert_eq!(pinned.revision_time.unwrap().to_string(), "2018-09-17 22:19:12");
}

#[test]
fn test_completion_runs_once_per_external_module() {
    let goroot = fake_goroot();
    let oracle = workspace_oracle(goroot.path()).with_listing(workspace_listing(goroot.path()));
    let calls = AtomicUsize::new(0);
    let complete = |m: &mut Module| {
        calls.fetch_add(1, Ordering::SeqCst);
        m.repository_url = format!("https://source.example/{}", m.path);
        m.extra_path_in_repository = "/nested/".to_string();
    };
    let options = ParseOptions {
        complete_module_info: Some(&complete as &CompleteModuleInfo<'_>),
        ..ParseOptions::default()
    };
    let analyzer = analyze_with(&oracle, goroot.path(), &["./..."], &options);

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let dep = analyzer.module("github.com/x/y").unwrap();
    assert_eq!(dep.repository_url, "https://source.example/github.com/x/y");
    // The pseudo-version revision still wins over the sub-path.
    assert_eq!(dep.repository_commit, "90fa682c2a6e");
    // The standard module is not handed to the callback.
    assert_eq!(analyzer.std_module().unwrap().repository_url, "https://github.com/golang/go");
}

#[test]
fn test_completion_calls_overlap() {
    let goroot = fake_goroot();
    let oracle = workspace_oracle(goroot.path()).with_listing(workspace_listing(goroot.path()));
    // Both external modules must be inside the callback at once to get past the barrier.
    let barrier = Barrier::new(2);
    let complete = |m: &mut Module| {
        barrier.wait();
        m.repository_url = format!("https://source.example/{}", m.path);
    };
    let options = ParseOptions {
        complete_module_info: Some(&complete as &CompleteModuleInfo<'_>),
        ..ParseOptions::default()
    };
    let analyzer = analyze_with(&oracle, goroot.path(), &["./..."], &options);
    assert_eq!(
        analyzer.module("github.com/x/y").unwrap().repository_url,
        "https://source.example/github.com/x/y"
    );
}

fn toolchain_workspace(goroot: &std::path::Path, with_cmd_package: bool) -> InMemoryOracle {
    let fset = Arc::new(FileSet::new());
    let fmt = Arc::new(OraclePackage::new("fmt", "fmt", fset.clone()));
    let mut roots = vec![fmt];
    let mut records = vec![json!({
        "ImportPath": "fmt",
        "Dir": goroot.join("src/fmt").display().to_string(),
        "Standard": true,
    })];
    if with_cmd_package {
        let vet = OraclePackage::new("cmd/vet", "main", fset.clone()).with_imports(vec![Arc::clone(&roots[0])]);
        roots.push(Arc::new(vet));
        records.push(json!({
            "ImportPath": "cmd/vet",
            "Dir": goroot.join("src/cmd/vet").display().to_string(),
        }));
    }
    let listing: String = records.iter().map(|r| r.to_string()).collect::<Vec<_>>().join("\n");
    InMemoryOracle::new(roots)
        .with_builtin(fixture::builtin_package(&fset))
        .with_std_packages(["fmt"])
        .with_listing(listing)
}

#[test]
fn test_toolchain_module_requires_toolchain_packages() {
    let goroot = fake_goroot();

    // Asked for, but nothing lives under the toolchain root.
    let oracle = toolchain_workspace(goroot.path(), false);
    let analyzer = analyze_with(&oracle, goroot.path(), &["std", "toolchain"], &ParseOptions::default());
    assert!(analyzer.toolchain_module().is_none());
    assert!(analyzer.module("cmd").is_none());

    // Not asked for, but a toolchain package is in scope.
    let oracle = toolchain_workspace(goroot.path(), true);
    let analyzer = analyze_with(&oracle, goroot.path(), &["./..."], &ParseOptions::default());
    let toolchain = analyzer.toolchain_module().unwrap();
    assert_eq!(toolchain.path, "cmd");
    assert_eq!(toolchain.index, 1);
    assert_eq!(toolchain.version, GO_VERSION);
    assert_eq!(toolchain.extra_path_in_repository, "/src/cmd");
    assert_eq!(toolchain.pkgs.len(), 1);
    assert_eq!(
        analyzer.modules().iter().filter(|m| m.path == "cmd").count(),
        1
    );
    assert_eq!(analyzer.working_module().map(|m| m.path.as_str()), Some("cmd"));
}

#[test]
fn test_unversioned_modules_are_ambiguous() {
    let goroot = fake_goroot();
    let fset = Arc::new(FileSet::new());
    let a = Arc::new(OraclePackage::new("a.example/x", "x", fset.clone()));
    let b = Arc::new(OraclePackage::new("b.example/y", "y", fset.clone()));
    let listing = [
        json!({"ImportPath": "a.example/x", "Dir": "/a", "Module": {"Path": "a.example/x", "Dir": "/a"}}),
        json!({"ImportPath": "b.example/y", "Dir": "/b", "Module": {"Path": "b.example/y", "Dir": "/b"}}),
    ]
    .iter()
    .map(|r| r.to_string())
    .collect::<String>();
    let oracle = InMemoryOracle::new(vec![a, b])
        .with_builtin(fixture::builtin_package(&fset))
        .with_listing(listing);

    let err = CodeAnalyzer::new(goroot.path())
        .parse_packages(&oracle, &ParseOptions::default(), &["./...".to_string()])
        .unwrap_err();
    assert!(matches!(err, atlas::AnalyzerError::AmbiguousWorkingModule { .. }));
}
