//! Semantic model reported by the build oracle.
//!
//! Objects are shared behind `Arc`; two references to the same canonical
//! object compare equal by pointer (`Arc::ptr_eq`) as well as by value.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use super::syntax::NodeId;

/// Predeclared basic types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicKind {
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uintptr,
    Float32,
    Float64,
    Complex64,
    Complex128,
    String,
    UnsafePointer,
}

impl BasicKind {
    /// Map a predeclared type name (as declared in `builtin`) to its kind.
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "bool" => BasicKind::Bool,
            "int" => BasicKind::Int,
            "int8" => BasicKind::Int8,
            "int16" => BasicKind::Int16,
            "int32" | "rune" => BasicKind::Int32,
            "int64" => BasicKind::Int64,
            "uint" => BasicKind::Uint,
            "uint8" | "byte" => BasicKind::Uint8,
            "uint16" => BasicKind::Uint16,
            "uint32" => BasicKind::Uint32,
            "uint64" => BasicKind::Uint64,
            "uintptr" => BasicKind::Uintptr,
            "float32" => BasicKind::Float32,
            "float64" => BasicKind::Float64,
            "complex64" => BasicKind::Complex64,
            "complex128" => BasicKind::Complex128,
            "string" => BasicKind::String,
            _ => return None,
        };
        Some(kind)
    }

    pub fn name(&self) -> &'static str {
        match self {
            BasicKind::Bool => "bool",
            BasicKind::Int => "int",
            BasicKind::Int8 => "int8",
            BasicKind::Int16 => "int16",
            BasicKind::Int32 => "int32",
            BasicKind::Int64 => "int64",
            BasicKind::Uint => "uint",
            BasicKind::Uint8 => "uint8",
            BasicKind::Uint16 => "uint16",
            BasicKind::Uint32 => "uint32",
            BasicKind::Uint64 => "uint64",
            BasicKind::Uintptr => "uintptr",
            BasicKind::Float32 => "float32",
            BasicKind::Float64 => "float64",
            BasicKind::Complex64 => "complex64",
            BasicKind::Complex128 => "complex128",
            BasicKind::String => "string",
            BasicKind::UnsafePointer => "unsafe.Pointer",
        }
    }
}

/// A declared named type: its type name object and underlying type.
#[derive(Debug, PartialEq)]
pub struct NamedType {
    pub obj: Arc<Object>,
    pub underlying: Type,
}

/// A resolved type.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Basic(BasicKind),
    Named(Arc<NamedType>),
    /// A type the oracle reports only by its source spelling.
    Opaque(Arc<str>),
}

impl Type {
    /// The underlying type; named types resolve to their representation.
    pub fn underlying(&self) -> &Type {
        match self {
            Type::Named(named) => named.underlying.underlying(),
            other => other,
        }
    }

    pub fn named(obj: Arc<Object>, underlying: Type) -> Self {
        Type::Named(Arc::new(NamedType {
            obj,
            underlying: underlying.underlying().clone(),
        }))
    }

    pub fn opaque(spelling: &str) -> Self {
        Type::Opaque(Arc::from(spelling))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Basic(kind) => f.write_str(kind.name()),
            Type::Named(named) => match &named.obj.package {
                Some(pkg) => write!(f, "{}.{}", pkg, named.obj.name),
                None => f.write_str(&named.obj.name),
            },
            Type::Opaque(spelling) => f.write_str(spelling),
        }
    }
}

/// What a declared object is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    TypeName,
    Func,
    /// Predeclared function with compiler-defined semantics (`len`, `unsafe.Sizeof`).
    Builtin,
    Var,
    Const,
    Nil,
}

/// A declared entity.
///
/// Type name objects manufactured for synthetic declarations carry no type;
/// the named type points back at them instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub name: String,
    pub kind: ObjectKind,
    /// Import path of the declaring package; `None` for universe objects.
    pub package: Option<String>,
    pub ty: Option<Type>,
}

impl Object {
    pub fn new(name: impl Into<String>, kind: ObjectKind, package: Option<&str>, ty: Option<Type>) -> Self {
        Self {
            name: name.into(),
            kind,
            package: package.map(str::to_string),
            ty,
        }
    }
}

/// Name to object table, ordered by name.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    objects: BTreeMap<String, Arc<Object>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<&Arc<Object>> {
        self.objects.get(name)
    }

    /// Insert `obj` unless the name is taken; returns the existing object in that case.
    pub fn insert(&mut self, obj: Arc<Object>) -> Option<Arc<Object>> {
        if let Some(existing) = self.objects.get(&obj.name) {
            return Some(Arc::clone(existing));
        }
        self.objects.insert(obj.name.clone(), obj);
        None
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Package-level type information.
#[derive(Debug, Clone, Default)]
pub struct PackageTypes {
    pub path: String,
    pub name: String,
    pub scope: Scope,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeAndValue {
    pub ty: Type,
}

/// Syntax node to semantic entity tables.
#[derive(Debug, Clone, Default)]
pub struct TypesInfo {
    /// Identifiers that declare an object.
    pub defs: HashMap<NodeId, Arc<Object>>,
    /// Type expressions and their resolved types.
    pub types: HashMap<NodeId, TypeAndValue>,
}

impl TypesInfo {
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty() && self.types.is_empty()
    }
}

/// Builtin functions the compiler provides through package `unsafe`.
pub const UNSAFE_BUILTINS: &[&str] = &[
    "Add",
    "Alignof",
    "Offsetof",
    "Sizeof",
    "Slice",
    "SliceData",
    "String",
    "StringData",
];

/// The canonical objects of package `unsafe`.
///
/// Mirrors what a type checker predeclares: `Pointer` is a type name whose
/// type is the unsafe pointer basic type, everything else is a builtin.
/// `ArbitraryType` and `IntegerType` are documentation-only and absent.
pub fn canonical_unsafe_scope() -> Scope {
    let mut scope = Scope::new();
    scope.insert(Arc::new(Object::new(
        "Pointer",
        ObjectKind::TypeName,
        Some("unsafe"),
        Some(Type::Basic(BasicKind::UnsafePointer)),
    )));
    for name in UNSAFE_BUILTINS {
        scope.insert(Arc::new(Object::new(*name, ObjectKind::Builtin, Some("unsafe"), None)));
    }
    scope
}
