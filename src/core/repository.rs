//! Default module provenance completion.
//!
//! Fills a module's repository URL and its location inside that repository.
//! Sources, in order of precedence: configured URL overrides, the `origin`
//! remote of a local git checkout, and well-known hosting conventions
//! inferred from the module path.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::core::config::{matching_override, AtlasConfig, UrlOverride};
use crate::core::models::Module;

lazy_static! {
    /// A major-version suffix segment (`v2`, `v13`), absent from repository layouts.
    static ref MAJOR_VERSION_SEGMENT: Regex = Regex::new(r"^v[2-9][0-9]*$|^v1[0-9]+$").unwrap();
}

/// Hosts whose repository root is the first three path segments.
const THREE_SEGMENT_HOSTS: &[&str] = &["github.com", "gitlab.com", "bitbucket.org"];

/// Where a module's sources live, as inferred from its path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLocation {
    pub url: String,
    /// `/sub/dir/`, or empty when the module is the repository root.
    pub extra_path: String,
}

/// `a/b/` segments as `/a/b/`, dropping a trailing major-version segment.
fn extra_path_of(segments: &[&str]) -> String {
    let segments = match segments.split_last() {
        Some((last, rest)) if MAJOR_VERSION_SEGMENT.is_match(last) => rest,
        _ => segments,
    };
    if segments.is_empty() {
        String::new()
    } else {
        format!("/{}/", segments.join("/"))
    }
}

/// Infer the repository of `module_path` from hosting conventions.
pub fn infer_repository(module_path: &str) -> Option<RepositoryLocation> {
    let segments: Vec<&str> = module_path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        ["golang.org", "x", name, rest @ ..] => Some(RepositoryLocation {
            url: format!("https://github.com/golang/{}", name),
            extra_path: extra_path_of(rest),
        }),
        [host, owner, repo, rest @ ..] if THREE_SEGMENT_HOSTS.contains(host) => Some(RepositoryLocation {
            url: format!("https://{}/{}/{}", host, owner, repo.trim_end_matches(".git")),
            extra_path: extra_path_of(rest),
        }),
        _ => None,
    }
}

/// Apply the longest matching override prefix.
fn apply_override(overrides: &[UrlOverride], module_path: &str) -> Option<RepositoryLocation> {
    let o = matching_override(overrides, module_path)?;
    let rest: Vec<&str> = module_path[o.prefix.len()..].split('/').filter(|s| !s.is_empty()).collect();
    Some(RepositoryLocation {
        url: o.url.trim_end_matches('/').to_string(),
        extra_path: extra_path_of(&rest),
    })
}

/// Provenance completion usable as the resolver's completion callback.
#[derive(Debug, Clone, Default)]
pub struct RepositoryResolver {
    overrides: Vec<UrlOverride>,
}

impl RepositoryResolver {
    pub fn new(config: &AtlasConfig) -> Self {
        Self {
            overrides: config.repository_url_overrides.clone(),
        }
    }

    /// Fill the repository fields of `m` that are still empty.
    pub fn complete(&self, m: &mut Module) {
        let inferred = apply_override(&self.overrides, &m.path);
        let overridden = inferred.is_some();
        let inferred = inferred.or_else(|| infer_repository(&m.path));

        // Only modules developed in place have a checkout of their own; a
        // module cache directory may sit inside an unrelated repository.
        if m.version.is_empty() || m.main {
            #[cfg(feature = "git")]
            discover_checkout(m, overridden);
        }

        if let Some(location) = inferred {
            if m.repository_url.is_empty() {
                m.repository_url = location.url;
            }
            if m.extra_path_in_repository.is_empty() {
                m.extra_path_in_repository = location.extra_path;
            }
        }
        debug!(
            module = %m.path,
            url = %m.repository_url,
            extra = %m.extra_path_in_repository,
            overridden,
            "module provenance completed"
        );
    }
}

/// Fill repository dir, sub-path, origin URL and HEAD commit from the git
/// checkout enclosing `m.dir`.
#[cfg(feature = "git")]
fn discover_checkout(m: &mut Module, keep_url: bool) {
    use git2::Repository;
    use std::path::Path;

    if m.dir.as_os_str().is_empty() || !m.dir.is_dir() {
        return;
    }
    let repo = match Repository::discover(&m.dir) {
        Ok(repo) => repo,
        Err(e) => {
            debug!(module = %m.path, error = %e, "no git checkout");
            return;
        }
    };
    let Some(workdir) = repo.workdir().map(Path::to_path_buf) else {
        return;
    };
    let workdir = workdir.canonicalize().unwrap_or(workdir);
    let dir = m.dir.canonicalize().unwrap_or_else(|_| m.dir.clone());

    if let Ok(rel) = dir.strip_prefix(&workdir) {
        let segments: Vec<String> = rel.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
        m.extra_path_in_repository = if segments.is_empty() {
            String::new()
        } else {
            format!("/{}/", segments.join("/"))
        };
    }
    m.repository_dir = workdir;

    if !keep_url && m.repository_url.is_empty() {
        if let Some(url) = repo.find_remote("origin").ok().and_then(|r| r.url().map(normalize_remote_url)) {
            m.repository_url = url;
        }
    }
    if m.version.is_empty() && m.repository_commit.is_empty() {
        if let Ok(commit) = repo.head().and_then(|h| h.peel_to_commit()) {
            m.repository_commit = commit.id().to_string();
        }
    }
}

/// `git@host:owner/repo.git` and `https://host/owner/repo.git` as `https://host/owner/repo`.
pub fn normalize_remote_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/').trim_end_matches(".git");
    if let Some(rest) = url.strip_prefix("git@") {
        if let Some((host, path)) = rest.split_once(':') {
            return format!("https://{}/{}", host, path);
        }
    }
    if let Some(rest) = url.strip_prefix("ssh://git@") {
        return format!("https://{}", rest);
    }
    url.to_string()
}
