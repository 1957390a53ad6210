//! Raw Go syntax via tree-sitter.
//!
//! Only top-level declarations are modelled: that is all the package model
//! needs to bind identifiers and type expressions. Comments are retained as
//! doc text on the declaration that follows them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::core::error::{AnalyzerError, Result};

static NEXT_FILE_SET: AtomicU64 = AtomicU64::new(1);

/// A registry of parsed files. Node ids are only meaningful within one set.
#[derive(Debug)]
pub struct FileSet {
    id: u64,
    files: Mutex<Vec<PathBuf>>,
}

impl FileSet {
    pub fn new() -> Self {
        Self {
            id: NEXT_FILE_SET.fetch_add(1, Ordering::Relaxed),
            files: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn add_file(&self, path: &Path) -> FileId {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.push(path.to_path_buf());
        FileId {
            set: self.id,
            index: (files.len() - 1) as u32,
        }
    }

    pub fn file_path(&self, file: FileId) -> Option<PathBuf> {
        if file.set != self.id {
            return None;
        }
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.get(file.index as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.files.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FileSet {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId {
    pub set: u64,
    pub index: u32,
}

/// Byte span of a node inside a registered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub file: FileId,
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub id: NodeId,
}

/// A type expression, kept as its source spelling.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// tree-sitter node kind, e.g. `pointer_type`
    pub kind: String,
    pub text: String,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub name: Ident,
    /// Receiver spelling for methods.
    pub receiver: Option<String>,
    pub has_body: bool,
    pub doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeSpec {
    pub name: Ident,
    pub ty: Expr,
    pub alias: bool,
    pub doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Func(FuncDecl),
    Type(Vec<TypeSpec>),
    Var(Vec<Ident>),
    Const(Vec<Ident>),
    Import(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct SyntaxFile {
    pub path: PathBuf,
    pub file: FileId,
    pub package_name: String,
    pub decls: Vec<Decl>,
    /// Line/column (1-based) of every error node.
    pub errors: Vec<(usize, usize)>,
}

impl SyntaxFile {
    pub fn funcs(&self) -> impl Iterator<Item = &FuncDecl> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Func(f) => Some(f),
            _ => None,
        })
    }

    pub fn type_specs(&self) -> impl Iterator<Item = &TypeSpec> {
        self.decls.iter().flat_map(|d| match d {
            Decl::Type(specs) => specs.as_slice(),
            _ => &[],
        })
    }
}

/// A tree-sitter parser configured for Go. Not `Sync`; keep one per thread.
pub struct GoParser {
    parser: tree_sitter::Parser,
}

impl GoParser {
    pub fn new() -> Result<Self> {
        let mut parser = tree_sitter::Parser::new();
        let language: tree_sitter::Language = tree_sitter_go::LANGUAGE.into();
        parser.set_language(&language).map_err(|e| AnalyzerError::Syntax {
            path: PathBuf::new(),
            message: format!("tree-sitter initialization failed: {}", e),
        })?;
        Ok(Self { parser })
    }

    /// Parse one file, registering it in `fset`.
    pub fn parse_file(&mut self, fset: &FileSet, path: &Path, source: &[u8]) -> Result<SyntaxFile> {
        let tree = self.parser.parse(source, None).ok_or_else(|| AnalyzerError::Syntax {
            path: path.to_path_buf(),
            message: "parser returned no tree".to_string(),
        })?;
        let file = fset.add_file(path);
        let root = tree.root_node();

        let mut syntax = SyntaxFile {
            path: path.to_path_buf(),
            file,
            package_name: String::new(),
            decls: Vec::new(),
            errors: Vec::new(),
        };
        if root.has_error() {
            collect_errors(root, &mut syntax.errors);
        }

        let mut pending_doc: Vec<String> = Vec::new();
        let mut last_comment_row: Option<usize> = None;
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            if child.kind() == "comment" {
                let row = child.start_position().row;
                if last_comment_row.map(|r| r + 1 != row).unwrap_or(false) {
                    pending_doc.clear();
                }
                pending_doc.push(text(child, source));
                last_comment_row = Some(child.end_position().row);
                continue;
            }
            let doc = match last_comment_row {
                Some(r) if r + 1 == child.start_position().row && !pending_doc.is_empty() => {
                    Some(pending_doc.join("\n"))
                }
                _ => None,
            };
            pending_doc.clear();
            last_comment_row = None;

            match child.kind() {
                "package_clause" => {
                    let mut c = child.walk();
                    if let Some(name) = child.named_children(&mut c).find(|n| n.kind() == "package_identifier") {
                        syntax.package_name = text(name, source);
                    };
                }
                "function_declaration" | "method_declaration" => {
                    if let Some(name) = child.child_by_field_name("name") {
                        syntax.decls.push(Decl::Func(FuncDecl {
                            name: ident(name, source, file),
                            receiver: child.child_by_field_name("receiver").map(|r| text(r, source)),
                            has_body: child.child_by_field_name("body").is_some(),
                            doc,
                        }));
                    }
                }
                "type_declaration" => {
                    syntax.decls.push(Decl::Type(type_specs(child, source, file, doc)));
                }
                "var_declaration" => {
                    syntax.decls.push(Decl::Var(declared_names(child, "var_spec", source, file)));
                }
                "const_declaration" => {
                    syntax.decls.push(Decl::Const(declared_names(child, "const_spec", source, file)));
                }
                "import_declaration" => {
                    syntax.decls.push(Decl::Import(import_paths(child, source)));
                }
                _ => {}
            }
        }

        Ok(syntax)
    }
}

/// Parse every `.go` file of `dir` accepted by `filter`, grouped by package name.
///
/// Files are visited in name order so repeated parses assign identical spans.
pub fn parse_dir(
    fset: &FileSet,
    dir: &Path,
    filter: impl Fn(&Path) -> bool,
) -> Result<BTreeMap<String, Vec<SyntaxFile>>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && filter(p))
        .collect();
    paths.sort();

    let mut parser = GoParser::new()?;
    let mut packages: BTreeMap<String, Vec<SyntaxFile>> = BTreeMap::new();
    for path in paths {
        let source = std::fs::read(&path)?;
        let file = parser.parse_file(fset, &path, &source)?;
        packages.entry(file.package_name.clone()).or_default().push(file);
    }
    Ok(packages)
}

/// Non-test Go source files.
pub fn is_go_source(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.ends_with(".go") && !name.ends_with("_test.go")
}

fn text(node: tree_sitter::Node, source: &[u8]) -> String {
    node.utf8_text(source).unwrap_or("").to_string()
}

fn node_id(node: tree_sitter::Node, file: FileId) -> NodeId {
    NodeId {
        file,
        start: node.start_byte() as u32,
        end: node.end_byte() as u32,
    }
}

fn ident(node: tree_sitter::Node, source: &[u8], file: FileId) -> Ident {
    Ident {
        name: text(node, source),
        id: node_id(node, file),
    }
}

fn type_specs(node: tree_sitter::Node, source: &[u8], file: FileId, doc: Option<String>) -> Vec<TypeSpec> {
    let mut specs = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        let alias = match child.kind() {
            "type_spec" => false,
            "type_alias" => true,
            _ => continue,
        };
        let (Some(name), Some(ty)) = (child.child_by_field_name("name"), child.child_by_field_name("type")) else {
            continue;
        };
        specs.push(TypeSpec {
            name: ident(name, source, file),
            ty: Expr {
                kind: ty.kind().to_string(),
                text: text(ty, source),
                id: node_id(ty, file),
            },
            alias,
            doc: doc.clone(),
        });
    }
    specs
}

fn declared_names(node: tree_sitter::Node, spec_kind: &str, source: &[u8], file: FileId) -> Vec<Ident> {
    let mut names = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        let mut cursor = current.walk();
        for child in current.named_children(&mut cursor) {
            if child.kind() == spec_kind {
                let mut c = child.walk();
                for name in child.children_by_field_name("name", &mut c) {
                    names.push(ident(name, source, file));
                }
            } else if child.kind().ends_with("_spec_list") {
                stack.push(child);
            }
        }
    }
    names.sort_by_key(|i| i.id.start);
    names
}

fn import_paths(node: tree_sitter::Node, source: &[u8]) -> Vec<String> {
    let mut paths = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        let mut cursor = current.walk();
        for child in current.named_children(&mut cursor) {
            match child.kind() {
                "import_spec" => {
                    if let Some(path) = child.child_by_field_name("path") {
                        paths.push(text(path, source).trim_matches(|c| c == '"' || c == '`').to_string());
                    }
                }
                "import_spec_list" => stack.push(child),
                _ => {}
            }
        }
    }
    paths
}

fn collect_errors(node: tree_sitter::Node, out: &mut Vec<(usize, usize)>) {
    if node.is_error() || node.is_missing() {
        let pos = node.start_position();
        out.push((pos.row + 1, pos.column + 1));
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() || child.is_missing() {
            collect_errors(child, out);
        }
    }
}
