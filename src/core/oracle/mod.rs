//! The build oracle: everything the atlas learns about source code comes
//! from here.
//!
//! The oracle parses and type-checks on our behalf. The atlas only
//! orchestrates queries and reconciles what comes back.
//!
//! - `types`: objects, types, scopes reported for each package
//! - `syntax`: raw Go syntax via tree-sitter
//! - `command`: bounded subprocess runner
//! - `golist`: the production oracle backed by `go list`
//! - `memory`: an oracle whose answers are supplied up front

pub mod command;
pub mod golist;
pub mod memory;
pub mod syntax;
pub mod types;

use std::ops::BitOr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

use crate::core::error::Result;

pub use golist::GoListOracle;
pub use memory::InMemoryOracle;
pub use syntax::{Decl, Expr, FileId, FileSet, FuncDecl, GoParser, Ident, NodeId, SyntaxFile, TypeSpec};
pub use types::{
    canonical_unsafe_scope, BasicKind, NamedType, Object, ObjectKind, PackageTypes, Scope, Type, TypeAndValue,
    TypesInfo,
};

/// Import path of the pseudo-package declaring the predeclared identifiers.
pub const BUILTIN_PACKAGE: &str = "builtin";

/// Import path of the low-level primitives pseudo-package.
pub const UNSAFE_PACKAGE: &str = "unsafe";

/// Which facets of each package a load should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadMode(u32);

impl LoadMode {
    pub const NAME: LoadMode = LoadMode(1);
    pub const FILES: LoadMode = LoadMode(1 << 1);
    pub const IMPORTS: LoadMode = LoadMode(1 << 2);
    pub const DEPS: LoadMode = LoadMode(1 << 3);
    pub const TYPES: LoadMode = LoadMode(1 << 4);
    pub const SYNTAX: LoadMode = LoadMode(1 << 5);
    pub const TYPES_INFO: LoadMode = LoadMode(1 << 6);

    /// Everything the package model consumes.
    pub const FULL: LoadMode = LoadMode(0b111_1111);

    pub fn contains(self, other: LoadMode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for LoadMode {
    type Output = LoadMode;

    fn bitor(self, rhs: LoadMode) -> LoadMode {
        LoadMode(self.0 | rhs.0)
    }
}

/// One oracle query.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub mode: LoadMode,
    /// Include test packages. The atlas always loads without them.
    pub tests: bool,
    pub args: Vec<String>,
    /// Directory the query runs in; `None` for the current one.
    pub dir: Option<PathBuf>,
    /// Environment overrides applied to oracle subprocesses.
    pub env: Vec<(String, String)>,
}

impl LoadRequest {
    pub fn new(args: Vec<String>) -> Self {
        Self {
            mode: LoadMode::FULL,
            tests: false,
            args,
            dir: None,
            env: Vec::new(),
        }
    }

    /// Same mode, directory and environment, different scope.
    pub fn with_args(&self, args: Vec<String>) -> Self {
        Self {
            args,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Reported while listing or locating packages.
    List,
    Parse,
    Type,
    Unknown,
}

/// An error the oracle attached to one package.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// `file:line:col`, when known.
    pub pos: Option<String>,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.pos {
            Some(pos) => write!(f, "{}: {}", pos, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// One package as the oracle reports it.
///
/// `imports` reference other packages of the same answer; together they form
/// an implicit graph that the atlas flattens.
#[derive(Debug, Clone)]
pub struct OraclePackage {
    pub path: String,
    pub name: String,
    pub go_files: Vec<PathBuf>,
    pub fset: Arc<FileSet>,
    pub syntax: Vec<SyntaxFile>,
    pub types: Option<PackageTypes>,
    pub types_info: TypesInfo,
    pub imports: Vec<Arc<OraclePackage>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl OraclePackage {
    /// A package with no files, types or imports.
    pub fn new(path: impl Into<String>, name: impl Into<String>, fset: Arc<FileSet>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            go_files: Vec::new(),
            fset,
            syntax: Vec::new(),
            types: None,
            types_info: TypesInfo::default(),
            imports: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn with_imports(mut self, imports: Vec<Arc<OraclePackage>>) -> Self {
        self.imports = imports;
        self
    }

    pub fn import_paths(&self) -> impl Iterator<Item = &str> {
        self.imports.iter().map(|p| p.path.as_str())
    }
}

/// Observes every file parse. Called from the oracle's worker threads.
pub trait ParseHook: Sync {
    fn file_parsed(&self, path: &Path);
}

impl<F> ParseHook for F
where
    F: Fn(&Path) + Sync,
{
    fn file_parsed(&self, path: &Path) {
        self(path)
    }
}

/// A hook that observes nothing.
pub struct NoopHook;

impl ParseHook for NoopHook {
    fn file_parsed(&self, _path: &Path) {}
}

/// The capability the atlas delegates parsing and type checking to.
#[cfg_attr(test, automock)]
pub trait BuildOracle: Send + Sync {
    /// Load the packages selected by `request`; returns the top-level ones.
    fn load(&self, request: &LoadRequest, hook: &dyn ParseHook) -> Result<Vec<Arc<OraclePackage>>>;

    /// Import paths of the standard distribution.
    fn list_std_packages(&self, request: &LoadRequest) -> Result<Vec<String>>;

    /// Source directory of a package, test files aside.
    fn locate_package_dir(&self, path: &str) -> Result<PathBuf>;

    /// Per-package directory/module records as concatenated JSON objects
    /// (`go list -deps -json` shape).
    fn list_modules(&self, request: &LoadRequest, timeout: Duration) -> Result<Vec<u8>>;

    /// Canonical objects of package `unsafe`.
    fn unsafe_scope(&self) -> &Scope;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_load_mode_flags() {
        let mode = LoadMode::NAME | LoadMode::IMPORTS;
        assert!(mode.contains(LoadMode::NAME));
        assert!(!mode.contains(LoadMode::SYNTAX));
        assert!(LoadMode::FULL.contains(mode | LoadMode::TYPES_INFO));
    }

    #[test]
    fn test_request_with_args_keeps_environment() {
        let mut request = LoadRequest::new(vec!["./...".to_string()]);
        request.env.push(("CGO_ENABLED".to_string(), "0".to_string()));
        let builtin = request.with_args(vec![BUILTIN_PACKAGE.to_string()]);
        assert_eq!(builtin.args, vec!["builtin"]);
        assert_eq!(builtin.env, request.env);
        assert!(!builtin.tests);
    }

    #[test]
    fn test_closure_parse_hook() {
        let count = AtomicUsize::new(0);
        let hook = |_: &Path| {
            count.fetch_add(1, Ordering::Relaxed);
        };
        hook.file_parsed(Path::new("a.go"));
        (&hook as &dyn ParseHook).file_parsed(Path::new("b.go"));
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic {
            kind: DiagnosticKind::Type,
            pos: Some("x.go:3:1".to_string()),
            message: "undefined: y".to_string(),
        };
        assert_eq!(diag.to_string(), "x.go:3:1: undefined: y");
    }
}
