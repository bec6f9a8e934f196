//! Submodule discovery.
//!
//! Parses the `.gitmodules` manifest, checks which submodules are
//! actually present on disk, resolves their commit identity from the
//! `.git` pointer file, and applies include/exclude filters. Recursive
//! discovery carries a visited set keyed by canonical path so a cyclic
//! layout terminates instead of looping.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ScanError, ScanResult};
use crate::options::SubmoduleOptions;

/// Name of the submodule manifest at a repository root.
pub const GITMODULES: &str = ".gitmodules";

/// One discovered submodule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmoduleInfo {
    /// Logical name from the manifest section header.
    pub name: String,

    /// Path relative to the project root (nested submodules are prefixed
    /// with their parent's path).
    pub path: PathBuf,

    /// Tracked branch, when the manifest declares one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Current commit identity, when resolvable. Best-effort metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,

    /// Whether the submodule directory has content beyond `.git`.
    pub initialized: bool,
}

struct RawEntry {
    name: String,
    path: Option<String>,
    branch: Option<String>,
}

/// Parse `.gitmodules` content into manifest order. Entries without a
/// `path` are dropped; the `url` key is recognized but not retained;
/// unknown keys are ignored.
pub fn parse_gitmodules(content: &str) -> Vec<(String, String, Option<String>)> {
    let mut entries: Vec<RawEntry> = Vec::new();
    let mut current: Option<RawEntry> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current = parse_section_header(line).map(|name| RawEntry {
                name,
                path: None,
                branch: None,
            });
            continue;
        }

        let Some(entry) = current.as_mut() else {
            continue;
        };
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim() {
            "path" => entry.path = Some(value),
            "branch" => entry.branch = Some(value),
            // The URL is needed for cloning, not for indexing.
            "url" => {}
            _ => {}
        }
    }
    if let Some(entry) = current.take() {
        entries.push(entry);
    }

    entries
        .into_iter()
        .filter_map(|e| e.path.map(|p| (e.name, p, e.branch)))
        .collect()
}

fn parse_section_header(line: &str) -> Option<String> {
    let inner = line.strip_prefix('[')?.strip_suffix(']')?.trim();
    let rest = inner.strip_prefix("submodule")?.trim();
    let name = rest.strip_prefix('"')?.strip_suffix('"')?;
    Some(name.to_string())
}

/// Discovers submodules beneath a project root.
pub struct SubmoduleResolver;

impl SubmoduleResolver {
    /// Discover submodules for `root`, applying the filters in `opts`.
    /// A missing manifest is not an error; the project simply has none.
    pub fn discover(root: &Path, opts: &SubmoduleOptions) -> ScanResult<Vec<SubmoduleInfo>> {
        let mut visited = HashSet::new();
        Self::discover_at(root, Path::new(""), opts, &mut visited)
    }

    fn discover_at(
        dir: &Path,
        rel_prefix: &Path,
        opts: &SubmoduleOptions,
        visited: &mut HashSet<PathBuf>,
    ) -> ScanResult<Vec<SubmoduleInfo>> {
        let canonical = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        if !visited.insert(canonical) {
            debug!(dir = %dir.display(), "submodule cycle detected, stopping branch");
            return Ok(Vec::new());
        }

        let manifest = dir.join(GITMODULES);
        let content = match std::fs::read_to_string(&manifest) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ScanError::Manifest {
                    path: manifest,
                    reason: e.to_string(),
                })
            }
        };

        let mut found = Vec::new();
        for (name, path, branch) in parse_gitmodules(&content) {
            let rel = rel_prefix.join(&path);
            if !passes_filters(&name, &rel, opts) {
                debug!(name, path, "submodule filtered out");
                continue;
            }

            let sub_dir = dir.join(&path);
            let initialized = is_initialized(&sub_dir);
            let commit = if initialized {
                read_commit(&sub_dir).ok()
            } else {
                None
            };

            found.push(SubmoduleInfo {
                name,
                path: rel.clone(),
                branch,
                commit,
                initialized,
            });

            if opts.recursive && initialized {
                found.extend(Self::discover_at(&sub_dir, &rel, opts, visited)?);
            }
        }
        Ok(found)
    }
}

/// A submodule is initialized iff its directory holds anything besides
/// the version-control metadata entry.
pub fn is_initialized(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries
        .filter_map(|e| e.ok())
        .any(|e| e.file_name() != amanmcp_ignore::GIT_DIR)
}

/// Resolve the commit a submodule currently points at.
///
/// Follows the `gitdir:` directive in the submodule's `.git` pointer file
/// and reads the referenced `HEAD`. A symbolic ref is surfaced as a typed
/// error; callers treat the commit as optional metadata.
pub fn read_commit(dir: &Path) -> ScanResult<String> {
    let pointer = dir.join(amanmcp_ignore::GIT_DIR);
    let git_dir = if pointer.is_dir() {
        pointer
    } else {
        let content = std::fs::read_to_string(&pointer)?;
        let target = content
            .trim()
            .strip_prefix("gitdir:")
            .ok_or_else(|| ScanError::Manifest {
                path: pointer.clone(),
                reason: "missing gitdir directive".into(),
            })?
            .trim();
        let target = Path::new(target);
        if target.is_absolute() {
            target.to_path_buf()
        } else {
            dir.join(target)
        }
    };

    let head = std::fs::read_to_string(git_dir.join("HEAD"))?;
    let head = head.trim();
    if head.starts_with("ref:") {
        return Err(ScanError::SymbolicHead(head.to_string()));
    }
    Ok(head.to_string())
}

fn passes_filters(name: &str, rel: &Path, opts: &SubmoduleOptions) -> bool {
    let rel_str = rel.to_string_lossy();
    let hits = |pattern: &str| submodule_glob(pattern, name) || submodule_glob(pattern, &rel_str);

    if opts.exclude.iter().any(|p| hits(p)) {
        return false;
    }
    if !opts.include.is_empty() && !opts.include.iter().any(|p| hits(p)) {
        return false;
    }
    true
}

/// Simple submodule filter globs: exact, `prefix/*`, `*/suffix`,
/// `*substr*`.
fn submodule_glob(pattern: &str, value: &str) -> bool {
    if pattern.len() >= 2 {
        if let Some(inner) = pattern
            .strip_prefix('*')
            .and_then(|p| p.strip_suffix('*'))
        {
            return value.contains(inner);
        }
    }
    if let Some(prefix) = pattern.strip_suffix("/*") {
        return value == prefix || value.starts_with(&format!("{prefix}/"));
    }
    if let Some(suffix) = pattern.strip_prefix("*/") {
        return value.ends_with(&format!("/{suffix}"));
    }
    pattern == value
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
# project submodules
[submodule "libfoo"]
    path = libs/foo
    url = https://example.com/foo.git
    branch = main

[submodule "bar"]
    path = bar
    url = https://example.com/bar.git
    shallow = true

[submodule "broken"]
    url = https://example.com/broken.git
"#;

    #[test]
    fn test_parse_manifest_in_order() {
        let entries = parse_gitmodules(MANIFEST);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "libfoo");
        assert_eq!(entries[0].1, "libs/foo");
        assert_eq!(entries[0].2.as_deref(), Some("main"));
        assert_eq!(entries[1].0, "bar");
        assert!(entries[1].2.is_none());
    }

    #[test]
    fn test_entry_without_path_is_dropped() {
        let entries = parse_gitmodules(MANIFEST);
        assert!(!entries.iter().any(|(name, _, _)| name == "broken"));
    }

    #[test]
    fn test_unknown_sections_and_keys_ignored() {
        let content = "[core]\n    bare = false\n[submodule \"x\"]\n    path = x\n    weird = 1\n";
        let entries = parse_gitmodules(content);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, "x");
    }

    #[test]
    fn test_initialized_requires_content_beyond_git() {
        let tmp = TempDir::new().unwrap();
        let sub = tmp.path().join("sub");
        std::fs::create_dir_all(sub.join(".git")).unwrap();
        assert!(!is_initialized(&sub));

        std::fs::write(sub.join("main.go"), "package main\n").unwrap();
        assert!(is_initialized(&sub));
        assert!(!is_initialized(&tmp.path().join("missing")));
    }

    #[test]
    fn test_read_commit_through_gitdir_pointer() {
        let tmp = TempDir::new().unwrap();
        let sub = tmp.path().join("sub");
        let store = tmp.path().join(".git/modules/sub");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::create_dir_all(&store).unwrap();
        std::fs::write(sub.join(".git"), "gitdir: ../.git/modules/sub\n").unwrap();
        std::fs::write(store.join("HEAD"), "0123456789abcdef0123456789abcdef01234567\n")
            .unwrap();

        let commit = read_commit(&sub).unwrap();
        assert_eq!(commit, "0123456789abcdef0123456789abcdef01234567");
    }

    #[test]
    fn test_symbolic_head_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let sub = tmp.path().join("sub");
        std::fs::create_dir_all(sub.join(".git")).unwrap();
        std::fs::write(sub.join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();

        assert!(matches!(
            read_commit(&sub),
            Err(ScanError::SymbolicHead(_))
        ));
    }

    #[test]
    fn test_filters() {
        let mut opts = SubmoduleOptions::default();
        assert!(passes_filters("foo", Path::new("libs/foo"), &opts));

        opts.exclude = vec!["*test*".to_string()];
        assert!(!passes_filters("foo-test", Path::new("libs/foo-test"), &opts));
        assert!(passes_filters("foo", Path::new("libs/foo"), &opts));

        opts.include = vec!["libs/*".to_string()];
        assert!(passes_filters("foo", Path::new("libs/foo"), &opts));
        assert!(!passes_filters("other", Path::new("ext/other"), &opts));
    }

    #[test]
    fn test_submodule_glob_shapes() {
        assert!(submodule_glob("foo", "foo"));
        assert!(!submodule_glob("foo", "foobar"));
        assert!(submodule_glob("libs/*", "libs/foo"));
        assert!(submodule_glob("libs/*", "libs"));
        assert!(submodule_glob("*/legacy", "vendor/legacy"));
        assert!(submodule_glob("*core*", "my-core-lib"));
    }

    #[test]
    fn test_missing_manifest_yields_empty() {
        let tmp = TempDir::new().unwrap();
        let found =
            SubmoduleResolver::discover(tmp.path(), &SubmoduleOptions::default()).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_discover_with_recursion_and_cycle_guard() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::write(
            root.join(".gitmodules"),
            "[submodule \"inner\"]\n    path = inner\n    url = u\n",
        )
        .unwrap();
        let inner = root.join("inner");
        std::fs::create_dir_all(inner.join(".git")).unwrap();
        std::fs::write(inner.join("lib.rs"), "").unwrap();
        // The nested manifest points straight back at the parent tree.
        std::fs::write(
            inner.join(".gitmodules"),
            "[submodule \"loop\"]\n    path = ../\n    url = u\n",
        )
        .unwrap();

        let opts = SubmoduleOptions {
            recursive: true,
            ..Default::default()
        };
        let found = SubmoduleResolver::discover(root, &opts).unwrap();
        let names: Vec<_> = found.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"inner"));
        // The cycle branch terminates silently instead of recursing forever.
        assert!(found.len() <= 2);
    }
}
