//! Reconstruction of package `unsafe`.
//!
//! Oracles report `unsafe` with blank syntax and type info. The atlas
//! parses its real source with a fresh file set and binds every declaration
//! to the oracle's canonical object, so downstream consumers can treat it
//! like any other package.
//!
//! The declaration set is closed: any name missing from
//! [`UNSAFE_DECLARATIONS`] is an invariant violation.

use std::sync::Arc;

use tracing::debug;

use crate::core::error::{AnalyzerError, Result};
use crate::core::oracle::syntax::{is_go_source, parse_dir};
use crate::core::oracle::{
    BuildOracle, Expr, FileSet, Object, ObjectKind, OraclePackage, PackageTypes, Type, TypeAndValue, TypesInfo, BUILTIN_PACKAGE, UNSAFE_PACKAGE,
};

/// How a declaration of package `unsafe` is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsafeRole {
    /// A function implemented by the compiler; bound to its canonical builtin.
    Builtin,
    /// `Pointer`; bound to its canonical type name.
    PointerType,
    /// `ArbitraryType`; no canonical object exists, one is manufactured.
    ArbitraryType,
    /// `IntegerType`; documentation-only like `ArbitraryType`.
    IntegerType,
}

/// Every declaration package `unsafe` is known to contain.
pub const UNSAFE_DECLARATIONS: &[(&str, UnsafeRole)] = &[
    ("Add", UnsafeRole::Builtin),
    ("Alignof", UnsafeRole::Builtin),
    ("Offsetof", UnsafeRole::Builtin),
    ("Sizeof", UnsafeRole::Builtin),
    ("Slice", UnsafeRole::Builtin),
    ("SliceData", UnsafeRole::Builtin),
    ("String", UnsafeRole::Builtin),
    ("StringData", UnsafeRole::Builtin),
    ("Pointer", UnsafeRole::PointerType),
    ("ArbitraryType", UnsafeRole::ArbitraryType),
    ("IntegerType", UnsafeRole::IntegerType),
];

pub fn role_of(name: &str) -> Option<UnsafeRole> {
    UNSAFE_DECLARATIONS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, role)| *role)
}

/// Rebuild `placeholder` (the oracle's blank `unsafe`) from source.
///
/// `builtin` supplies the canonical `int`, whose underlying type becomes the
/// representation of the manufactured `ArbitraryType`.
pub fn fill_unsafe_package(
    oracle: &dyn BuildOracle,
    placeholder: &OraclePackage,
    builtin: &OraclePackage,
) -> Result<OraclePackage> {
    let int_type = builtin
        .types
        .as_ref()
        .and_then(|t| t.scope.lookup("int"))
        .and_then(|obj| obj.ty.clone())
        .ok_or_else(|| AnalyzerError::invariant("builtin package declares no typed int"))?;

    let dir = oracle.locate_package_dir(UNSAFE_PACKAGE).map_err(|e| {
        AnalyzerError::invariant(format!("unsafe package source directory not locatable: {}", e))
    })?;

    let fset = Arc::new(FileSet::new());
    let mut parsed = parse_dir(&fset, &dir, is_go_source)?;
    let files = parsed
        .remove(UNSAFE_PACKAGE)
        .ok_or_else(|| AnalyzerError::invariant(format!("no unsafe package source in {}", dir.display())))?;

    // The filled scope holds the canonical objects, then whatever the
    // placeholder already declared, then the manufactured type names.
    let canonical = oracle.unsafe_scope();
    let mut scope = canonical.clone();
    if let Some(types) = &placeholder.types {
        for name in types.scope.names() {
            if let Some(obj) = types.scope.lookup(name) {
                scope.insert(Arc::clone(obj));
            }
        }
    }
    let mut info = TypesInfo::default();

    let mut pointer_expr: Option<Expr> = None;
    let mut arbitrary_expr: Option<Expr> = None;
    let mut arbitrary_type: Option<Type> = None;
    let mut integer_expr: Option<Expr> = None;

    for file in &files {
        for func in file.funcs() {
            let role = role_of(&func.name.name);
            let obj = canonical.lookup(&func.name.name);
            match (role, obj) {
                (Some(UnsafeRole::Builtin), Some(obj)) => {
                    info.defs.insert(func.name.id, Arc::clone(obj));
                }
                _ => {
                    return Err(AnalyzerError::invariant(format!(
                        "{} is not found in unsafe scope",
                        func.name.name
                    )))
                }
            }
        }

        for spec in file.type_specs() {
            let obj = match role_of(&spec.name.name) {
                Some(UnsafeRole::PointerType) => {
                    let obj = canonical
                        .lookup(&spec.name.name)
                        .filter(|o| o.kind == ObjectKind::TypeName)
                        .ok_or_else(|| {
                            AnalyzerError::invariant("a canonical type object for unsafe.Pointer is expected")
                        })?;
                    pointer_expr = Some(spec.ty.clone());
                    Arc::clone(obj)
                }
                Some(role @ (UnsafeRole::ArbitraryType | UnsafeRole::IntegerType)) => {
                    // Reuse an object from an earlier reconstruction of the same scope.
                    let existing = scope.lookup(&spec.name.name).cloned();
                    let obj = match existing {
                        Some(existing) => existing,
                        None => {
                            let manufactured = Arc::new(Object::new(
                                spec.name.name.clone(),
                                ObjectKind::TypeName,
                                Some(UNSAFE_PACKAGE),
                                None,
                            ));
                            scope.insert(Arc::clone(&manufactured));
                            manufactured
                        }
                    };
                    if role == UnsafeRole::ArbitraryType {
                        arbitrary_expr = Some(spec.ty.clone());
                        arbitrary_type = Some(Type::named(Arc::clone(&obj), int_type.clone()));
                    } else {
                        integer_expr = Some(spec.ty.clone());
                    }
                    obj
                }
                _ => {
                    return Err(AnalyzerError::invariant(format!(
                        "unexpected type name in unsafe: {}",
                        spec.name.name
                    )))
                }
            };
            info.defs.insert(spec.name.id, obj);
        }
    }

    let pointer_expr = pointer_expr.ok_or_else(|| AnalyzerError::invariant("unsafe.Pointer declaration is missing"))?;
    let arbitrary_expr =
        arbitrary_expr.ok_or_else(|| AnalyzerError::invariant("unsafe.ArbitraryType declaration is missing"))?;
    let arbitrary_type =
        arbitrary_type.ok_or_else(|| AnalyzerError::invariant("unsafe.ArbitraryType type was not built"))?;

    // Source types: `type ArbitraryType int` resolves to int and
    // `type Pointer *ArbitraryType` to the manufactured named type.
    info.types.insert(arbitrary_expr.id, TypeAndValue { ty: int_type.clone() });
    info.types.insert(pointer_expr.id, TypeAndValue { ty: arbitrary_type });
    if let Some(expr) = integer_expr {
        info.types.insert(expr.id, TypeAndValue { ty: int_type });
    }

    debug!(
        dir = %dir.display(),
        files = files.len(),
        defs = info.defs.len(),
        "reconstructed unsafe package"
    );

    Ok(OraclePackage {
        path: placeholder.path.clone(),
        name: UNSAFE_PACKAGE.to_string(),
        go_files: files.iter().map(|f| f.path.clone()).collect(),
        fset,
        syntax: files,
        types: Some(PackageTypes {
            path: placeholder.path.clone(),
            name: UNSAFE_PACKAGE.to_string(),
            scope,
        }),
        types_info: info,
        imports: placeholder.imports.clone(),
        diagnostics: placeholder.diagnostics.clone(),
    })
}

/// Whether both pseudo-packages needed for reconstruction are present.
pub fn needs_reconstruction(all: &[Arc<OraclePackage>]) -> Option<(usize, usize)> {
    let unsafe_index = all.iter().position(|p| p.path == UNSAFE_PACKAGE)?;
    let builtin_index = all.iter().position(|p| p.path == BUILTIN_PACKAGE)?;
    Some((unsafe_index, builtin_index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::oracle::{BasicKind, InMemoryOracle, Scope};
    use std::fs;
    use tempfile::TempDir;

    const UNSAFE_GO: &str = r#"package unsafe

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
"#;

    fn builtin_with_int() -> OraclePackage {
        let mut builtin = OraclePackage::new(BUILTIN_PACKAGE, "builtin", Arc::new(FileSet::new()));
        let mut scope = Scope::new();
        scope.insert(Arc::new(Object::new(
            "int",
            ObjectKind::TypeName,
            None,
            Some(Type::Basic(BasicKind::Int)),
        )));
        builtin.types = Some(PackageTypes {
            path: BUILTIN_PACKAGE.into(),
            name: "builtin".into(),
            scope,
        });
        builtin
    }

    fn unsafe_dir(source: &str) -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("unsafe.go"), source).unwrap();
        fs::write(tmp.path().join("unsafe_test.go"), "package unsafe_test\nfunc TestX() {}\n").unwrap();
        tmp
    }

    #[test]
    fn test_reconstruction_binds_canonical_objects() {
        let dir = unsafe_dir(UNSAFE_GO);
        let oracle = InMemoryOracle::new(Vec::new()).with_package_dir(UNSAFE_PACKAGE, dir.path());
        let placeholder = OraclePackage::new(UNSAFE_PACKAGE, "unsafe", Arc::new(FileSet::new()));
        let builtin = builtin_with_int();

        let filled = fill_unsafe_package(&oracle, &placeholder, &builtin).unwrap();

        assert_ne!(filled.fset.id(), placeholder.fset.id());
        assert_eq!(filled.go_files.len(), 1);
        let file = &filled.syntax[0];
        let sizeof = file.funcs().find(|f| f.name.name == "Sizeof").unwrap();
        let bound = &filled.types_info.defs[&sizeof.name.id];
        assert!(Arc::ptr_eq(bound, oracle.unsafe_scope().lookup("Sizeof").unwrap()));

        let pointer = file.type_specs().find(|s| s.name.name == "Pointer").unwrap();
        let pointer_obj = &filled.types_info.defs[&pointer.name.id];
        assert!(Arc::ptr_eq(pointer_obj, oracle.unsafe_scope().lookup("Pointer").unwrap()));

        let arbitrary = file.type_specs().find(|s| s.name.name == "ArbitraryType").unwrap();
        assert_eq!(
            filled.types_info.types[&arbitrary.ty.id].ty,
            Type::Basic(BasicKind::Int)
        );
        let pointer_source = &filled.types_info.types[&pointer.ty.id].ty;
        match pointer_source {
            Type::Named(named) => {
                assert_eq!(named.obj.name, "ArbitraryType");
                assert_eq!(named.underlying, Type::Basic(BasicKind::Int));
            }
            other => panic!("expected named type, got {:?}", other),
        }
        assert!(filled.types.as_ref().unwrap().scope.lookup("ArbitraryType").is_some());
    }

    #[test]
    fn test_filled_scope_exposes_canonical_objects() {
        let dir = unsafe_dir(UNSAFE_GO);
        let oracle = InMemoryOracle::new(Vec::new()).with_package_dir(UNSAFE_PACKAGE, dir.path());
        let mut placeholder = OraclePackage::new(UNSAFE_PACKAGE, "unsafe", Arc::new(FileSet::new()));
        placeholder.types = Some(PackageTypes {
            path: UNSAFE_PACKAGE.into(),
            name: UNSAFE_PACKAGE.into(),
            scope: Scope::new(),
        });

        let filled = fill_unsafe_package(&oracle, &placeholder, &builtin_with_int()).unwrap();
        let scope = &filled.types.as_ref().unwrap().scope;
        let canonical = oracle.unsafe_scope();
        for name in ["Pointer", "Sizeof", "Add", "StringData"] {
            assert!(Arc::ptr_eq(scope.lookup(name).unwrap(), canonical.lookup(name).unwrap()), "{}", name);
        }
        assert_eq!(scope.lookup("ArbitraryType").unwrap().package.as_deref(), Some(UNSAFE_PACKAGE));
        assert_eq!(scope.len(), canonical.len() + 2);
    }

    #[test]
    fn test_reconstruction_is_idempotent() {
        let dir = unsafe_dir(UNSAFE_GO);
        let oracle = InMemoryOracle::new(Vec::new()).with_package_dir(UNSAFE_PACKAGE, dir.path());
        let placeholder = OraclePackage::new(UNSAFE_PACKAGE, "unsafe", Arc::new(FileSet::new()));
        let builtin = builtin_with_int();

        let first = fill_unsafe_package(&oracle, &placeholder, &builtin).unwrap();
        let second = fill_unsafe_package(&oracle, &placeholder, &builtin).unwrap();

        let bound = |pkg: &OraclePackage| {
            let mut defs: Vec<(String, Object)> = pkg.syntax[0]
                .funcs()
                .map(|f| (f.name.name.clone(), pkg.types_info.defs[&f.name.id].as_ref().clone()))
                .chain(
                    pkg.syntax[0]
                        .type_specs()
                        .map(|s| (s.name.name.clone(), pkg.types_info.defs[&s.name.id].as_ref().clone())),
                )
                .collect();
            defs.sort_by(|a, b| a.0.cmp(&b.0));
            defs
        };
        assert_eq!(bound(&first), bound(&second));

        let resolved = |pkg: &OraclePackage| {
            pkg.syntax[0]
                .type_specs()
                .filter_map(|s| pkg.types_info.types.get(&s.ty.id).map(|t| (s.name.name.clone(), t.ty.clone())))
                .collect::<Vec<_>>()
        };
        assert_eq!(resolved(&first), resolved(&second));
    }

    #[test]
    fn test_unknown_function_is_fatal() {
        let dir = unsafe_dir(&format!("{}\nfunc Teleport(x ArbitraryType)\n", UNSAFE_GO));
        let oracle = InMemoryOracle::new(Vec::new()).with_package_dir(UNSAFE_PACKAGE, dir.path());
        let placeholder = OraclePackage::new(UNSAFE_PACKAGE, "unsafe", Arc::new(FileSet::new()));
        let err = fill_unsafe_package(&oracle, &placeholder, &builtin_with_int()).unwrap_err();
        assert!(err.is_invariant_violation());
        assert!(err.to_string().contains("Teleport"));
    }

    #[test]
    fn test_unknown_type_is_fatal() {
        let dir = unsafe_dir(&format!("{}\ntype Mystery struct{{}}\n", UNSAFE_GO));
        let oracle = InMemoryOracle::new(Vec::new()).with_package_dir(UNSAFE_PACKAGE, dir.path());
        let placeholder = OraclePackage::new(UNSAFE_PACKAGE, "unsafe", Arc::new(FileSet::new()));
        let err = fill_unsafe_package(&oracle, &placeholder, &builtin_with_int()).unwrap_err();
        assert!(err.to_string().contains("Mystery"));
    }

    #[test]
    fn test_missing_pointer_is_fatal() {
        let dir = unsafe_dir("package unsafe\ntype ArbitraryType int\nfunc Sizeof(x ArbitraryType) uintptr\n");
        let oracle = InMemoryOracle::new(Vec::new()).with_package_dir(UNSAFE_PACKAGE, dir.path());
        let placeholder = OraclePackage::new(UNSAFE_PACKAGE, "unsafe", Arc::new(FileSet::new()));
        let err = fill_unsafe_package(&oracle, &placeholder, &builtin_with_int()).unwrap_err();
        assert!(err.is_invariant_violation());
        assert!(err.to_string().contains("Pointer"));
    }

    #[test]
    fn test_unlocatable_directory_is_fatal() {
        let oracle = InMemoryOracle::new(Vec::new());
        let placeholder = OraclePackage::new(UNSAFE_PACKAGE, "unsafe", Arc::new(FileSet::new()));
        let err = fill_unsafe_package(&oracle, &placeholder, &builtin_with_int()).unwrap_err();
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_role_table_is_closed() {
        assert_eq!(role_of("Sizeof"), Some(UnsafeRole::Builtin));
        assert_eq!(role_of("Pointer"), Some(UnsafeRole::PointerType));
        assert_eq!(role_of("Teleport"), None);
        for (name, role) in UNSAFE_DECLARATIONS {
            if *role == UnsafeRole::Builtin {
                assert!(crate::core::oracle::canonical_unsafe_scope().lookup(name).is_some());
            }
        }
    }
}
