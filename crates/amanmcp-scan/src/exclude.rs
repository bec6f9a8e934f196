//! Built-in exclusions and the shorthand pattern matcher.
//!
//! Built-in and user exclusion patterns use a small shorthand dialect,
//! distinct from ignore-file syntax:
//!
//! - `prefix/**` matches the directory itself and any descendant
//! - `**/name/**` matches a directory component `name` at any depth
//! - `**/*.ext` matches any file with that extension
//! - `**/name` matches a basename at any depth
//! - `dir/pre*.ext` matches directory-exact plus basename glob
//! - `*substr*`, `prefix*`, `*suffix`, and exact names are basename globs

use std::path::Path;

/// Directory names pruned at any depth, including the cloud-credential
/// directories that must never reach an index.
pub const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "vendor",
    "__pycache__",
    "dist",
    "build",
    ".aws",
    ".azure",
    ".gcloud",
];

/// File basename patterns excluded by default: lock files and minified
/// outputs carry no signal worth indexing. The service's own ignore files
/// are metadata, not content.
pub const EXCLUDED_FILES: &[&str] = &[
    "*.min.js",
    "*.min.css",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "go.sum",
    ".ignore",
];

/// Credential and key material. Matched before every other layer and not
/// overridable by user patterns or includes.
pub const SENSITIVE_PATTERNS: &[&str] = &[
    ".env",
    ".env.*",
    "*.pem",
    "*.key",
    "*.p12",
    "*.pfx",
    "*credentials*",
    "*secrets*",
    "*password*",
    ".netrc",
    ".npmrc",
    ".pypirc",
    "id_rsa",
    "id_dsa",
    "id_ecdsa",
    "id_ed25519",
];

/// Whether `name` is a directory pruned by default.
pub fn is_excluded_dir_name(name: &str) -> bool {
    EXCLUDED_DIRS.contains(&name)
}

/// Whether any pattern in `patterns` matches the relative path.
pub fn matches_any(patterns: &[impl AsRef<str>], rel: &Path) -> bool {
    let rel_str = path_str(rel);
    let name = rel
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    patterns
        .iter()
        .any(|p| matches_pattern(p.as_ref(), &rel_str, &name))
}

/// Test one shorthand pattern against a relative path and its basename.
pub fn matches_pattern(pattern: &str, rel: &str, name: &str) -> bool {
    // `**/name/**`: a path component at any depth.
    if let Some(inner) = pattern
        .strip_prefix("**/")
        .and_then(|p| p.strip_suffix("/**"))
    {
        return rel.split('/').any(|c| glob_component(inner, c));
    }

    // `prefix/**`: the directory itself and everything below it.
    if let Some(prefix) = pattern.strip_suffix("/**") {
        return rel == prefix || rel.starts_with(&format!("{prefix}/"));
    }

    // `**/rest`: basename (or trailing path) at any depth.
    if let Some(rest) = pattern.strip_prefix("**/") {
        if rest.contains('/') {
            return rel == rest || rel.ends_with(&format!("/{rest}"));
        }
        return glob_component(rest, name);
    }

    // `dir/pre*.ext`: directory-exact plus basename glob.
    if pattern.contains('/') {
        let (dir, base) = pattern.rsplit_once('/').unwrap_or(("", pattern));
        let (rel_dir, rel_base) = rel.rsplit_once('/').unwrap_or(("", rel));
        return rel_dir == dir && glob_component(base, rel_base);
    }

    // Plain basename glob.
    glob_component(pattern, name)
}

/// Iterative `*`/`?` wildcard match over a single path component.
fn glob_component(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let (mut star_pi, mut star_ti) = (usize::MAX, 0usize);

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star_pi = pi;
            star_ti = ti;
            pi += 1;
        } else if star_pi != usize::MAX {
            pi = star_pi + 1;
            star_ti += 1;
            ti = star_ti;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

fn path_str(rel: &Path) -> String {
    let s = rel.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        s.into_owned()
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(pattern: &str, rel: &str) -> bool {
        let name = rel.rsplit('/').next().unwrap_or(rel);
        matches_pattern(pattern, rel, name)
    }

    #[test]
    fn test_prefix_double_star() {
        assert!(m("dist/**", "dist"));
        assert!(m("dist/**", "dist/app.js"));
        assert!(m("dist/**", "dist/sub/app.js"));
        assert!(!m("dist/**", "src/dist.rs"));
        assert!(!m("dist/**", "distfiles"));
    }

    #[test]
    fn test_component_at_any_depth() {
        assert!(m("**/node_modules/**", "node_modules"));
        assert!(m("**/node_modules/**", "a/node_modules/pkg/i.js"));
        assert!(!m("**/node_modules/**", "a/node_modules_backup/i.js"));
    }

    #[test]
    fn test_extension_at_any_depth() {
        assert!(m("**/*.min.js", "app.min.js"));
        assert!(m("**/*.min.js", "assets/js/app.min.js"));
        assert!(!m("**/*.min.js", "app.js"));
    }

    #[test]
    fn test_basename_at_any_depth() {
        assert!(m("**/go.sum", "go.sum"));
        assert!(m("**/go.sum", "services/api/go.sum"));
        assert!(!m("**/go.sum", "go.summary"));
    }

    #[test]
    fn test_dir_exact_basename_glob() {
        assert!(m("logs/app*.log", "logs/app-2024.log"));
        assert!(!m("logs/app*.log", "logs/sub/app-2024.log"));
        assert!(!m("logs/app*.log", "other/app-2024.log"));
    }

    #[test]
    fn test_basename_shorthands() {
        assert!(m("*.pem", "certs/server.pem"));
        assert!(m("*credentials*", "gcp-credentials.json"));
        assert!(m(".env.*", ".env.production"));
        assert!(!m(".env.*", ".environment"));
        assert!(m("id_rsa", ".ssh/id_rsa"));
        assert!(!m("id_rsa", "id_rsa.pub"));
        assert!(m("prefix*", "prefix-anything"));
        assert!(m("*suffix", "any-suffix"));
    }

    #[test]
    fn test_question_mark() {
        assert!(m("v?.lock", "v1.lock"));
        assert!(!m("v?.lock", "v10.lock"));
    }

    #[test]
    fn test_sensitive_list_covers_credential_shapes() {
        for rel in [
            ".env",
            ".env.local",
            "server.key",
            "tls/cert.pem",
            "aws-credentials",
            "app-secrets.yaml",
            "password-list.txt",
            ".netrc",
            ".ssh/id_ed25519",
        ] {
            assert!(
                matches_any(SENSITIVE_PATTERNS, Path::new(rel)),
                "{rel} should be sensitive"
            );
        }
        assert!(!matches_any(SENSITIVE_PATTERNS, Path::new("src/main.rs")));
    }

    #[test]
    fn test_builtin_file_exclusions() {
        assert!(matches_any(EXCLUDED_FILES, Path::new("ui/app.min.js")));
        assert!(matches_any(EXCLUDED_FILES, Path::new("package-lock.json")));
        assert!(matches_any(EXCLUDED_FILES, Path::new("sub/.ignore")));
        assert!(!matches_any(EXCLUDED_FILES, Path::new("src/app.js")));
    }

    #[test]
    fn test_excluded_dir_names() {
        assert!(is_excluded_dir_name("node_modules"));
        assert!(is_excluded_dir_name(".aws"));
        assert!(!is_excluded_dir_name("src"));
    }
}
