//! Single ignore-rule compilation.
//!
//! Each non-blank, non-comment line of an ignore file compiles to one
//! [`Rule`]. Syntax follows `.gitignore` conventions:
//!
//! - `#` comments (escape with `\#`), blank lines skipped
//! - `!` prefix negates a rule (escape with `\!`)
//! - Trailing `/` matches directories only
//! - Leading `/` (or any interior `/`) anchors the pattern to the base
//! - `*`, `?`, `[...]`, and `**` wildcards; `*` and `?` never cross `/`
//! - Trailing whitespace is stripped unless escaped as `\ `

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};

/// One compiled rule from an ignore file.
#[derive(Debug, Clone)]
pub struct Rule {
    text: String,
    matcher: GlobMatcher,
    negate: bool,
    dir_only: bool,
    anchored: bool,
    /// Directory (relative to the project root) this rule is scoped to.
    /// Rules from nested ignore files only apply inside their own tree.
    base: Option<PathBuf>,
}

/// Strip comments and trailing whitespace, preserving escapes.
///
/// Returns the effective pattern text (negation prefix included) or `None`
/// for lines that produce no rule. Shared with the diff utility so both
/// agree on what counts as a pattern.
pub(crate) fn normalize_line(line: &str) -> Option<String> {
    let stripped = line.trim_start();
    if stripped.is_empty() || stripped.starts_with('#') {
        return None;
    }

    // Trailing whitespace is insignificant unless escaped with a backslash.
    let text = match stripped.trim_end().strip_suffix('\\') {
        Some(head) if stripped.len() > stripped.trim_end().len() => format!("{head}\\ "),
        _ => stripped.trim_end().to_string(),
    };

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

impl Rule {
    /// Compile one ignore line. Returns `None` for blanks, comments, and
    /// patterns that fail to compile even after bracket recovery.
    pub fn compile(line: &str) -> Option<Rule> {
        let text = normalize_line(line)?;
        let mut pattern = text.as_str();

        let negate = match pattern.strip_prefix('!') {
            Some(rest) => {
                pattern = rest;
                true
            }
            None => false,
        };
        // `\!` and `\#` stay escaped; the glob compiler treats them as the
        // literal character.

        let dir_only = match pattern.strip_suffix('/') {
            Some(rest) => {
                pattern = rest;
                true
            }
            None => false,
        };

        let anchored = match pattern.strip_prefix('/') {
            Some(rest) => {
                pattern = rest;
                true
            }
            // An interior slash also anchors the pattern to the base.
            None => pattern.contains('/'),
        };

        if pattern.is_empty() {
            return None;
        }

        let matcher = compile_glob(pattern)?;

        Some(Rule {
            text,
            matcher,
            negate,
            dir_only,
            anchored,
            base: None,
        })
    }

    /// Scope this rule to a directory relative to the project root.
    pub fn scoped(mut self, base: &Path) -> Rule {
        if !base.as_os_str().is_empty() {
            self.base = Some(base.to_path_buf());
        }
        self
    }

    /// The normalized pattern text this rule was compiled from.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether a match of this rule un-ignores the path.
    pub fn is_negation(&self) -> bool {
        self.negate
    }

    /// Whether this rule only matches directories (and their contents).
    pub fn is_dir_only(&self) -> bool {
        self.dir_only
    }

    /// Whether this rule is anchored to its base directory.
    pub fn is_anchored(&self) -> bool {
        self.anchored
    }

    /// Test this rule against a root-relative path.
    ///
    /// `is_dir` states whether `rel` refers to a directory; directory-only
    /// rules also match files *inside* a matched directory.
    pub fn matches(&self, rel: &Path, is_dir: bool) -> bool {
        // A scoped rule never matches outside its base; the base is
        // stripped before the pattern sees the path.
        let rel = match &self.base {
            Some(base) => match rel.strip_prefix(base) {
                Ok(inner) if !inner.as_os_str().is_empty() => inner,
                _ => return false,
            },
            None => rel,
        };

        if self.anchored {
            if self.matcher.is_match(rel) && (!self.dir_only || is_dir) {
                return true;
            }
            if self.dir_only {
                // A matched directory ignores everything below it.
                return rel
                    .ancestors()
                    .skip(1)
                    .filter(|a| !a.as_os_str().is_empty())
                    .any(|a| self.matcher.is_match(a));
            }
            return false;
        }

        if self.dir_only {
            let components: Vec<&std::ffi::OsStr> =
                rel.components().map(|c| c.as_os_str()).collect();
            for (i, component) in components.iter().enumerate() {
                if self.matcher.is_match(Path::new(component)) {
                    let interior = i + 1 < components.len();
                    if interior || is_dir {
                        return true;
                    }
                }
            }
            return false;
        }

        if let Some(name) = rel.file_name() {
            if self.matcher.is_match(Path::new(name)) {
                return true;
            }
        }
        if self.matcher.is_match(rel) {
            return true;
        }
        rel.components()
            .any(|c| self.matcher.is_match(Path::new(c.as_os_str())))
    }
}

/// Compile a glob with gitignore semantics: `*` and `?` stop at `/`,
/// `**` spans components, backslash escapes the next character.
///
/// A pattern with an unmatched `[` is retried with its brackets escaped,
/// so the bracket matches literally instead of poisoning the rule.
fn compile_glob(pattern: &str) -> Option<GlobMatcher> {
    match build(pattern) {
        Some(m) => Some(m),
        None => build(&escape_brackets(pattern)),
    }
}

fn build(pattern: &str) -> Option<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
        .ok()
        .map(|glob| glob.compile_matcher())
}

fn escape_brackets(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 2);
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push('\\');
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '[' | ']' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}
