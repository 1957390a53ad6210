//! Core of the workspace atlas
//!
//! Builds a cross-referenced package/module model of a Go workspace from the
//! answers of a build oracle.
//!
//! # Architecture
//!
//! - `oracle`: the build oracle trait, the `go list` oracle and an in-memory one
//! - `args`: scope argument normalization
//! - `loader`: the `parse_packages` entry point
//! - `unsafe_pkg`: reconstruction of package `unsafe`
//! - `graph`: package table and import edges
//! - `modules`: module resolution from the module listing
//! - `provenance`: repository commit heuristics
//! - `repository`: default repository URL / checkout completion
//! - `analyzer`: the `CodeAnalyzer` context holding the result
//! - `models`, `error`, `config`, `progress`: shared plumbing

pub mod analyzer;
pub mod args;
pub mod config;
pub mod error;
pub mod graph;
pub mod loader;
pub mod models;
pub mod modules;
pub mod oracle;
pub mod progress;
pub mod provenance;
pub mod repository;
pub mod unsafe_pkg;

// Re-export commonly used types
pub use analyzer::{AnalysisSummary, CodeAnalyzer, ModuleSummary};
pub use args::{normalize_arguments, ScopeArgs};
pub use config::{AtlasConfig, UrlOverride};
pub use error::{AnalyzerError, Result, ResultExt};
pub use graph::PackageGraph;
pub use loader::ParseOptions;
pub use models::{Module, ModuleArena, ModuleId, Package, PackageId};
pub use modules::{ModuleResolver, ModuleSet};
pub use oracle::{BuildOracle, GoListOracle, InMemoryOracle, LoadRequest, OraclePackage, ParseHook};
pub use progress::{ProgressCallback, SubTask};
pub use provenance::{derive_commit, CommitRule, CompleteModuleInfo};
pub use repository::RepositoryResolver;
