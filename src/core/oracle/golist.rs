//! The production oracle, backed by the `go` command.
//!
//! Package identity, files and imports come from `go list -e -deps -json`.
//! Files are parsed with tree-sitter-go across a scoped worker pool, and each
//! package's scope gets one object per top-level declaration. Package
//! `unsafe` comes back with blank syntax and type info, like every other
//! loader reports it; `builtin` provides the universe objects.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use super::command::CommandSpec;
use super::syntax::{Decl, FileSet, GoParser, SyntaxFile};
use super::types::{canonical_unsafe_scope, BasicKind, Object, ObjectKind, PackageTypes, Scope, Type};
use super::{
    BuildOracle, Diagnostic, DiagnosticKind, LoadMode, LoadRequest, OraclePackage, ParseHook, BUILTIN_PACKAGE,
    UNSAFE_PACKAGE,
};
use crate::core::error::{AnalyzerError, Result};

/// `go list -json` record, as much of it as loading needs.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct ListedPackage {
    import_path: String,
    name: String,
    dir: PathBuf,
    go_files: Vec<String>,
    cgo_files: Vec<String>,
    imports: Vec<String>,
    import_map: HashMap<String, String>,
    dep_only: bool,
    error: Option<ListError>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct ListError {
    pos: String,
    err: String,
}

/// Oracle that shells out to `go list` and parses with tree-sitter.
pub struct GoListOracle {
    go: String,
    goroot: PathBuf,
    unsafe_scope: Scope,
    workers: usize,
}

impl GoListOracle {
    pub fn new(go: impl Into<String>, goroot: impl Into<PathBuf>) -> Self {
        let workers = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        Self {
            go: go.into(),
            goroot: goroot.into(),
            unsafe_scope: canonical_unsafe_scope(),
            workers,
        }
    }

    pub fn goroot(&self) -> &Path {
        &self.goroot
    }

    fn command(&self, request: &LoadRequest) -> CommandSpec {
        CommandSpec::new(&self.go)
            .dir(request.dir.as_deref())
            .envs(&request.env)
    }

    fn list(&self, request: &LoadRequest) -> Result<Vec<ListedPackage>> {
        let mut flags = vec!["list", "-e", "-json"];
        if request.mode.contains(LoadMode::DEPS) {
            flags.push("-deps");
        }
        if request.tests {
            flags.push("-test");
        }
        let spec = self.command(request).args(flags).args(request.args.iter().cloned());
        let stdout = spec.run_checked(None)?;
        let stream = serde_json::Deserializer::from_slice(&stdout).into_iter::<ListedPackage>();
        let mut listed = Vec::new();
        for record in stream {
            listed.push(record?);
        }
        Ok(listed)
    }

    /// Parse every package's files. Results are indexed like `listed`.
    fn parse_all(
        &self,
        listed: &[ListedPackage],
        fset: &FileSet,
        hook: &dyn ParseHook,
    ) -> Vec<(Vec<SyntaxFile>, Vec<Diagnostic>)> {
        let jobs: Vec<(usize, PathBuf)> = listed
            .iter()
            .enumerate()
            .filter(|(_, p)| p.import_path != UNSAFE_PACKAGE)
            .flat_map(|(i, p)| {
                p.go_files
                    .iter()
                    .chain(p.cgo_files.iter())
                    .map(move |f| (i, p.dir.join(f)))
            })
            .collect();

        let results: Mutex<Vec<(Vec<SyntaxFile>, Vec<Diagnostic>)>> =
            Mutex::new((0..listed.len()).map(|_| (Vec::new(), Vec::new())).collect());
        let next = std::sync::atomic::AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..self.workers.min(jobs.len()).max(1) {
                s.spawn(|| {
                    let mut parser = match GoParser::new() {
                        Ok(p) => p,
                        Err(e) => {
                            warn!(error = %e, "parser initialization failed");
                            return;
                        }
                    };
                    loop {
                        let n = next.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        let Some((pkg_index, path)) = jobs.get(n) else { break };
                        hook.file_parsed(path);
                        let outcome = std::fs::read(path)
                            .map_err(AnalyzerError::from)
                            .and_then(|src| parser.parse_file(fset, path, &src));
                        let mut results = results.lock().unwrap_or_else(|e| e.into_inner());
                        let slot = &mut results[*pkg_index];
                        match outcome {
                            Ok(file) => {
                                for (line, col) in &file.errors {
                                    slot.1.push(Diagnostic {
                                        kind: DiagnosticKind::Parse,
                                        pos: Some(format!("{}:{}:{}", path.display(), line, col)),
                                        message: "syntax error".to_string(),
                                    });
                                }
                                slot.0.push(file);
                            }
                            Err(e) => slot.1.push(Diagnostic {
                                kind: DiagnosticKind::Parse,
                                pos: Some(path.display().to_string()),
                                message: e.to_string(),
                            }),
                        }
                    }
                });
            }
        });

        let mut results = results.into_inner().unwrap_or_else(|e| e.into_inner());
        for (files, _) in results.iter_mut() {
            files.sort_by(|a, b| a.path.cmp(&b.path));
        }
        results
    }
}

/// Declare one object per top-level declaration of `files`.
///
/// In `builtin`, type declarations naming a predeclared basic type resolve to
/// that basic type; everything else is reported by spelling only.
fn declare_package_objects(
    path: &str,
    name: &str,
    files: &[SyntaxFile],
) -> (PackageTypes, super::types::TypesInfo) {
    let is_builtin = path == BUILTIN_PACKAGE;
    let owner = if is_builtin { None } else { Some(path) };
    let mut scope = Scope::new();
    let mut info = super::types::TypesInfo::default();

    for file in files {
        for decl in &file.decls {
            match decl {
                Decl::Func(func) if func.receiver.is_none() => {
                    let kind = if is_builtin { ObjectKind::Builtin } else { ObjectKind::Func };
                    let obj = Arc::new(Object::new(func.name.name.clone(), kind, owner, None));
                    scope.insert(obj.clone());
                    info.defs.insert(func.name.id, obj);
                }
                Decl::Type(specs) => {
                    for spec in specs {
                        let ty = match BasicKind::from_name(&spec.name.name) {
                            Some(kind) if is_builtin => Type::Basic(kind),
                            _ => Type::opaque(&spec.ty.text),
                        };
                        let obj = Arc::new(Object::new(spec.name.name.clone(), ObjectKind::TypeName, owner, Some(ty)));
                        scope.insert(obj.clone());
                        info.defs.insert(spec.name.id, obj);
                    }
                }
                Decl::Var(names) | Decl::Const(names) => {
                    let kind = match decl {
                        Decl::Var(_) => ObjectKind::Var,
                        _ => ObjectKind::Const,
                    };
                    for ident in names {
                        let kind = if is_builtin && ident.name == "nil" { ObjectKind::Nil } else { kind };
                        let obj = Arc::new(Object::new(ident.name.clone(), kind, owner, None));
                        scope.insert(obj.clone());
                        info.defs.insert(ident.id, obj);
                    }
                }
                _ => {}
            }
        }
    }

    let types = PackageTypes {
        path: path.to_string(),
        name: name.to_string(),
        scope,
    };
    (types, info)
}

fn list_error_diagnostic(err: &ListError) -> Diagnostic {
    Diagnostic {
        kind: DiagnosticKind::List,
        pos: (!err.pos.is_empty()).then(|| err.pos.clone()),
        message: err.err.trim().to_string(),
    }
}

/// Turn `go list` records into linked oracle packages.
///
/// `-deps` emits dependencies before dependents, so one forward pass
/// normally finds every import already built. An import naming a package
/// absent from the listing is an invariant violation; `-e -deps` reports
/// even unresolvable imports as records of their own.
fn link_packages(
    listed: &[ListedPackage],
    mut parsed: Vec<(Vec<SyntaxFile>, Vec<Diagnostic>)>,
    fset: &Arc<FileSet>,
    mode: LoadMode,
) -> Result<Vec<Arc<OraclePackage>>> {
    let index: HashMap<&str, usize> = listed
        .iter()
        .enumerate()
        .map(|(i, p)| (p.import_path.as_str(), i))
        .collect();

    let mut targets: Vec<Vec<usize>> = Vec::with_capacity(listed.len());
    for p in listed {
        let mut resolved_targets = Vec::with_capacity(p.imports.len());
        for imp in p.imports.iter().filter(|imp| imp.as_str() != "C") {
            let resolved = p.import_map.get(imp).unwrap_or(imp);
            let Some(&target) = index.get(resolved.as_str()) else {
                return Err(AnalyzerError::invariant(format!(
                    "dependency package {} of {} not found",
                    resolved, p.import_path
                )));
            };
            resolved_targets.push(target);
        }
        targets.push(resolved_targets);
    }

    let mut built: Vec<Option<Arc<OraclePackage>>> = vec![None; listed.len()];
    let mut pending: Vec<usize> = (0..listed.len()).collect();
    while !pending.is_empty() {
        let mut deferred = Vec::new();
        let round = pending.len();
        for i in pending {
            if targets[i].iter().any(|&t| built[t].is_none()) {
                deferred.push(i);
                continue;
            }
            let p = &listed[i];
            let (syntax, parse_diagnostics) = std::mem::take(&mut parsed[i]);
            let mut pkg = OraclePackage::new(p.import_path.clone(), p.name.clone(), Arc::clone(fset));
            if p.import_path == UNSAFE_PACKAGE {
                pkg.types = Some(PackageTypes {
                    path: UNSAFE_PACKAGE.to_string(),
                    name: UNSAFE_PACKAGE.to_string(),
                    scope: Scope::new(),
                });
            } else {
                pkg.go_files = p.go_files.iter().map(|f| p.dir.join(f)).collect();
                if mode.contains(LoadMode::TYPES) {
                    let (types, info) = declare_package_objects(&p.import_path, &p.name, &syntax);
                    pkg.types = Some(types);
                    if mode.contains(LoadMode::TYPES_INFO) {
                        pkg.types_info = info;
                    }
                }
            }
            pkg.syntax = syntax;
            pkg.imports = targets[i].iter().filter_map(|&t| built[t].clone()).collect();
            // A dependency's own record carries its error; `DepsErrors` would repeat it.
            pkg.diagnostics = p.error.iter().map(list_error_diagnostic).chain(parse_diagnostics).collect();
            built[i] = Some(Arc::new(pkg));
        }
        if deferred.len() == round {
            // Import cycle in a broken tree: build the rest without the cyclic edges.
            warn!(packages = deferred.len(), "import cycle in go list output");
            for &i in &deferred {
                let p = &listed[i];
                let (syntax, diagnostics) = std::mem::take(&mut parsed[i]);
                let mut pkg = OraclePackage::new(p.import_path.clone(), p.name.clone(), Arc::clone(fset));
                pkg.syntax = syntax;
                pkg.diagnostics = diagnostics;
                pkg.diagnostics.push(Diagnostic {
                    kind: DiagnosticKind::List,
                    pos: None,
                    message: "import cycle not allowed".to_string(),
                });
                built[i] = Some(Arc::new(pkg));
            }
            break;
        }
        pending = deferred;
    }

    Ok(listed
        .iter()
        .zip(built)
        .filter(|(p, _)| !p.dep_only)
        .filter_map(|(_, pkg)| pkg)
        .collect())
}

impl BuildOracle for GoListOracle {
    fn load(&self, request: &LoadRequest, hook: &dyn ParseHook) -> Result<Vec<Arc<OraclePackage>>> {
        let listed = self.list(request)?;
        debug!(packages = listed.len(), "go list finished");

        let fset = Arc::new(FileSet::new());
        let parsed = if request.mode.contains(LoadMode::SYNTAX) {
            self.parse_all(&listed, &fset, hook)
        } else {
            (0..listed.len()).map(|_| (Vec::new(), Vec::new())).collect()
        };
        link_packages(&listed, parsed, &fset, request.mode)
    }

    fn list_std_packages(&self, request: &LoadRequest) -> Result<Vec<String>> {
        let stdout = self.command(request).args(["list", "std"]).run_checked(None)?;
        Ok(String::from_utf8_lossy(&stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn locate_package_dir(&self, path: &str) -> Result<PathBuf> {
        let in_goroot = self.goroot.join("src").join(path);
        if in_goroot.is_dir() {
            return Ok(in_goroot);
        }
        let stdout = CommandSpec::new(&self.go)
            .args(["list", "-find", "-f", "{{.Dir}}", path])
            .run_checked(None)?;
        let dir = String::from_utf8_lossy(&stdout).trim().to_string();
        if dir.is_empty() {
            return Err(AnalyzerError::oracle("locate package", format!("no directory for {}", path)));
        }
        Ok(PathBuf::from(dir))
    }

    fn list_modules(&self, request: &LoadRequest, timeout: Duration) -> Result<Vec<u8>> {
        self.command(request)
            .args(["list", "-deps", "-json"])
            .args(request.args.iter().cloned())
            .run_checked(Some(timeout))
    }

    fn unsafe_scope(&self) -> &Scope {
        &self.unsafe_scope
    }
}
