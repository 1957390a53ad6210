//! A small synthetic Go workspace served by the in-memory oracle.
//!
//! The fake GOROOT carries a VERSION marker, the `unsafe` sources and an
//! empty toolchain directory.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use atlas::core::oracle::{
    BasicKind, FileSet, InMemoryOracle, Object, ObjectKind, OraclePackage, PackageTypes, Scope, Type,
    BUILTIN_PACKAGE, UNSAFE_PACKAGE,
};
use serde_json::json;
use tempfile::TempDir;

pub const GO_VERSION: &str = "go1.22.1";

pub const UNSAFE_GO: &str = r#"// Package unsafe contains operations that step around the type safety of Go programs.
package unsafe

// ArbitraryType is here for the purposes of documentation only.
type ArbitraryType int

// IntegerType is here for the purposes of documentation only.
type IntegerType int

// Pointer represents a pointer to an arbitrary type.
type Pointer *ArbitraryType

func Sizeof(x ArbitraryType) uintptr
func Offsetof(x ArbitraryType) uintptr
func Alignof(x ArbitraryType) uintptr
func Add(ptr Pointer, len IntegerType) Pointer
func Slice(ptr *ArbitraryType, len IntegerType) []ArbitraryType
func SliceData(slice []ArbitraryType) *ArbitraryType
func String(ptr *byte, len IntegerType) string
func StringData(str string) *byte
"#;

pub const STD_PACKAGES: &[&str] = &["errors", "fmt", "io", "os", "unsafe"];

pub const PSEUDO_VERSION: &str = "v0.0.0-20180917221912-90fa682c2a6e";

pub fn fake_goroot() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("VERSION"), format!("{}\ntime 2024-03-05T22:03:51Z\n", GO_VERSION)).unwrap();
    let unsafe_dir = tmp.path().join("src").join("unsafe");
    fs::create_dir_all(&unsafe_dir).unwrap();
    fs::write(unsafe_dir.join("unsafe.go"), UNSAFE_GO).unwrap();
    fs::create_dir_all(tmp.path().join("src").join("cmd")).unwrap();
    tmp
}

fn pkg(fset: &Arc<FileSet>, path: &str, imports: &[&Arc<OraclePackage>]) -> Arc<OraclePackage> {
    let name = path.rsplit('/').next().unwrap_or(path);
    Arc::new(
        OraclePackage::new(path, name, Arc::clone(fset)).with_imports(imports.iter().map(|p| Arc::clone(p)).collect()),
    )
}

pub fn builtin_package(fset: &Arc<FileSet>) -> Arc<OraclePackage> {
    let mut builtin = OraclePackage::new(BUILTIN_PACKAGE, "builtin", Arc::clone(fset));
    let mut scope = Scope::new();
    for kind in [BasicKind::Int, BasicKind::Uintptr, BasicKind::String] {
        scope.insert(Arc::new(Object::new(kind.name(), ObjectKind::TypeName, None, Some(Type::Basic(kind)))));
    }
    builtin.types = Some(PackageTypes {
        path: BUILTIN_PACKAGE.to_string(),
        name: "builtin".to_string(),
        scope,
    });
    Arc::new(builtin)
}

/// The roots of the workspace:
///
/// ```text
/// example.com/app      -> fmt, os, github.com/x/y
/// example.com/app/util -> errors
/// github.com/x/y       -> fmt
/// fmt -> os, io, errors;  os -> io, errors, unsafe;  io -> errors
/// ```
pub fn workspace_roots() -> Vec<Arc<OraclePackage>> {
    let fset = Arc::new(FileSet::new());
    let errors = pkg(&fset, "errors", &[]);
    let unsafe_pkg = pkg(&fset, UNSAFE_PACKAGE, &[]);
    let io = pkg(&fset, "io", &[&errors]);
    let os = pkg(&fset, "os", &[&io, &errors, &unsafe_pkg]);
    let fmt = pkg(&fset, "fmt", &[&os, &io, &errors]);
    let xy = pkg(&fset, "github.com/x/y", &[&fmt]);
    let app = pkg(&fset, "example.com/app", &[&fmt, &os, &xy]);
    let util = pkg(&fset, "example.com/app/util", &[&errors]);
    vec![app, util]
}

/// The `go list -deps -json` output matching `workspace_roots`.
pub fn workspace_listing(goroot: &Path) -> Vec<u8> {
    let src = goroot.join("src");
    let std_record = |path: &str| {
        json!({
            "ImportPath": path,
            "Dir": src.join(path).display().to_string(),
            "Goroot": true,
            "Standard": true,
        })
    };
    let records = vec![
        std_record("errors"),
        std_record("io"),
        std_record("unsafe"),
        std_record("os"),
        std_record("fmt"),
        json!({
            "ImportPath": "github.com/x/y",
            "Dir": "/gopath/pkg/mod/github.com/x/y@v0.0.0-20180917221912-90fa682c2a6e",
            "Module": {
                "Path": "github.com/x/y",
                "Version": PSEUDO_VERSION,
                "Dir": "/gopath/pkg/mod/github.com/x/y@v0.0.0-20180917221912-90fa682c2a6e",
            },
        }),
        json!({
            "ImportPath": "example.com/app/util",
            "Dir": "/work/app/util",
            "Module": {"Path": "example.com/app", "Dir": "/work/app", "Main": true},
        }),
        json!({
            "ImportPath": "example.com/app",
            "Dir": "/work/app",
            "Module": {"Path": "example.com/app", "Dir": "/work/app", "Main": true},
        }),
    ];
    records
        .iter()
        .map(|r| serde_json::to_string_pretty(r).unwrap())
        .collect::<Vec<_>>()
        .join("\n")
        .into_bytes()
}

/// An oracle serving the workspace, without a module listing.
pub fn workspace_oracle(goroot: &Path) -> InMemoryOracle {
    let fset = Arc::new(FileSet::new());
    InMemoryOracle::new(workspace_roots())
        .with_builtin(builtin_package(&fset))
        .with_std_packages(STD_PACKAGES.iter().copied())
        .with_package_dir(UNSAFE_PACKAGE, goroot.join("src").join("unsafe"))
}
