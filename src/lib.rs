//! workspace-atlas - package and module graph discovery for Go workspaces
//!
//! This library builds the model a documentation browser needs: every
//! package reachable from a scope, its import edges in both directions, the
//! modules owning those packages, and where each module's sources live.
//!
//! # Architecture
//!
//! This crate follows the "Library-First" pattern:
//! - **lib.rs** (this file) and `core`: pure logic, no CLI concerns
//! - **bin/atlas.rs**: thin wrapper that calls the library
//!
//! # Example
//!
//! ```no_run
//! use atlas::{CodeAnalyzer, GoListOracle, ParseOptions};
//!
//! let oracle = GoListOracle::new("go", "/usr/local/go");
//! let mut analyzer = CodeAnalyzer::new("/usr/local/go");
//! analyzer.parse_packages(&oracle, &ParseOptions::default(), &["./...".to_string()])?;
//! println!("{}", analyzer.summary());
//! # Ok::<(), atlas::AnalyzerError>(())
//! ```

pub mod core;

pub use crate::core::{
    AnalysisSummary, AnalyzerError, AtlasConfig, BuildOracle, CodeAnalyzer, GoListOracle, InMemoryOracle, Module,
    ModuleId, Package, PackageId, ParseOptions, RepositoryResolver, Result, SubTask,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
