//! Repository commit heuristics for modules.
//!
//! A module's version usually names a tag; a pseudo-version names a revision
//! directly. The rules below run in priority order and the first that
//! applies wins. The result may not resolve to anything real; that is never
//! an error.

use chrono::NaiveDateTime;
use lazy_static::lazy_static;
use regex::Regex;

use crate::core::models::Module;

lazy_static! {
    /// `v0.0.0-20180917221912-90fa682c2a6e`, `v0.4.2-0.20210302225053-d515b24adc21`
    static ref PSEUDO_VERSION_REVISION: Regex =
        Regex::new(r"v[0-9]\S*[0-9]{8,}-([0-9a-f]{6,})").unwrap();

    /// Base version, 14-digit UTC timestamp and revision of a pseudo-version.
    static ref PSEUDO_VERSION: Regex =
        Regex::new(r"^(v[0-9]+\.[0-9]+\.[0-9]+(?:-[0-9A-Za-z.]+?)??)[-.](?:0\.)?([0-9]{14})-([0-9a-f]{12,})(?:\+incompatible)?$")
            .unwrap();
}

/// One way of turning `(version, extra path in repository)` into a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitRule {
    /// The revision suffix of a pseudo-version.
    PseudoVersionRevision,
    /// `sub/dir/` + version: the tag of a module nested in its repository.
    SubPathTag,
    /// The version verbatim.
    RawVersion,
}

/// Rules in the order they are tried.
pub const DEFAULT_COMMIT_RULES: &[CommitRule] = &[
    CommitRule::PseudoVersionRevision,
    CommitRule::SubPathTag,
    CommitRule::RawVersion,
];

impl CommitRule {
    /// The commit this rule derives, or `None` when it does not apply.
    pub fn derive(&self, version: &str, extra_path: &str) -> Option<String> {
        match self {
            CommitRule::PseudoVersionRevision => PSEUDO_VERSION_REVISION
                .captures(version)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string()),
            CommitRule::SubPathTag => {
                if extra_path.is_empty() {
                    return None;
                }
                let mut extra = extra_path;
                // At most two leading separators.
                for _ in 0..2 {
                    extra = extra.strip_prefix('/').unwrap_or(extra);
                }
                if extra.ends_with('/') {
                    Some(format!("{}{}", extra, version))
                } else {
                    Some(format!("{}/{}", extra, version))
                }
            }
            CommitRule::RawVersion => Some(version.to_string()),
        }
    }
}

/// Apply `rules` in order; falls back to the version itself.
pub fn derive_commit_with(rules: &[CommitRule], version: &str, extra_path: &str) -> String {
    rules
        .iter()
        .find_map(|rule| rule.derive(version, extra_path))
        .unwrap_or_else(|| version.to_string())
}

pub fn derive_commit(version: &str, extra_path: &str) -> String {
    derive_commit_with(DEFAULT_COMMIT_RULES, version, extra_path)
}

/// Fill `m.repository_commit` from its version and sub-path.
pub fn confirm_repository_commit(m: &mut Module) {
    m.repository_commit = derive_commit(&m.version, &m.extra_path_in_repository);
}

/// The parts of a pseudo-version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PseudoVersion {
    pub base: String,
    pub timestamp: NaiveDateTime,
    pub revision: String,
}

impl PseudoVersion {
    pub fn parse(version: &str) -> Option<Self> {
        let caps = PSEUDO_VERSION.captures(version)?;
        let timestamp = NaiveDateTime::parse_from_str(caps.get(2)?.as_str(), "%Y%m%d%H%M%S").ok()?;
        Some(Self {
            base: caps.get(1)?.as_str().to_string(),
            timestamp,
            revision: caps.get(3)?.as_str().to_string(),
        })
    }
}

/// Signature of the caller-supplied completion step, run once per module.
pub type CompleteModuleInfo<'a> = dyn Fn(&mut Module) + Sync + 'a;

/// Run `complete` on every module concurrently and wait for all of them.
///
/// Each task owns exactly one module entry for its duration.
pub fn complete_all(modules: &mut [Module], complete: &CompleteModuleInfo<'_>) {
    std::thread::scope(|s| {
        for m in modules.iter_mut() {
            s.spawn(move || complete(m));
        }
    });
}
