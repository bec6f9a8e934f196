//! Language and content classification.
//!
//! Pure lookups: filename first (for the well-known extensionless files),
//! extension second. Tags are stable string identifiers the index keys on.

use std::path::Path;

use crate::info::ContentClass;

/// Language tag for a path, or `None` when unrecognized.
pub fn language(path: &Path) -> Option<&'static str> {
    let name = path.file_name()?.to_str()?;

    match name {
        "Dockerfile" | "Containerfile" => return Some("dockerfile"),
        "Makefile" | "GNUmakefile" | "makefile" => return Some("make"),
        "CMakeLists.txt" => return Some("cmake"),
        "Gemfile" | "Rakefile" => return Some("ruby"),
        "Jenkinsfile" => return Some("groovy"),
        "go.mod" => return Some("gomod"),
        _ => {}
    }

    let ext = path.extension()?.to_str()?;
    let tag = match ext.to_ascii_lowercase().as_str() {
        "go" => "go",
        "py" | "pyi" => "python",
        "rs" => "rust",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "javascriptreact",
        "ts" | "mts" | "cts" => "typescript",
        "tsx" => "typescriptreact",
        "java" => "java",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" | "hh" | "hxx" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "kt" | "kts" => "kotlin",
        "scala" => "scala",
        "sh" | "bash" | "zsh" => "shell",
        "fish" => "fish",
        "pl" | "pm" => "perl",
        "lua" => "lua",
        "r" => "r",
        "sql" => "sql",
        "html" | "htm" => "html",
        "css" => "css",
        "scss" | "sass" => "scss",
        "less" => "less",
        "vue" => "vue",
        "svelte" => "svelte",
        "md" | "markdown" => "markdown",
        "rst" => "restructuredtext",
        "txt" | "text" => "text",
        "json" => "json",
        "jsonc" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "xml" => "xml",
        "ini" | "cfg" | "conf" => "ini",
        "env" => "dotenv",
        "proto" => "protobuf",
        "graphql" | "gql" => "graphql",
        "tf" | "tfvars" => "terraform",
        "gradle" => "groovy",
        "groovy" => "groovy",
        "ps1" | "psm1" => "powershell",
        "bat" | "cmd" => "batch",
        "dart" => "dart",
        "ex" | "exs" => "elixir",
        "erl" | "hrl" => "erlang",
        "hs" => "haskell",
        "ml" | "mli" => "ocaml",
        "clj" | "cljs" | "cljc" => "clojure",
        "zig" => "zig",
        "nim" => "nim",
        "jl" => "julia",
        "vim" => "vimscript",
        "dockerfile" => "dockerfile",
        "mk" => "make",
        "cmake" => "cmake",
        _ => return None,
    };
    Some(tag)
}

/// Map a language tag to its content class. Unknown languages are plain
/// text.
pub fn content_class(language: Option<&str>) -> ContentClass {
    match language {
        Some("markdown") | Some("restructuredtext") => ContentClass::Markdown,
        Some("json") | Some("yaml") | Some("toml") | Some("xml") | Some("ini")
        | Some("dotenv") | Some("gomod") => ContentClass::Config,
        Some("text") | None => ContentClass::Text,
        Some(_) => ContentClass::Code,
    }
}

/// Conventional markers declaring a file machine-produced.
pub const GENERATED_MARKERS: &[&str] = &[
    "// Code generated",
    "// DO NOT EDIT",
    "# Generated by",
    "<!-- AUTO-GENERATED -->",
    "@generated",
    "Autogenerated by",
    "automatically generated",
];

/// Whether the file head carries a generated-code marker. The caller
/// passes at most the first KiB; markers further down don't count.
pub fn is_generated(head: &[u8]) -> bool {
    let text = String::from_utf8_lossy(head);
    GENERATED_MARKERS.iter().any(|m| text.contains(m))
}

/// Null-byte heuristic over the first 512 bytes. Misclassifies UTF-16
/// text as binary; acceptable for a code indexer.
pub fn is_binary(head: &[u8]) -> bool {
    head.iter().take(512).any(|&b| b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_by_extension() {
        assert_eq!(language(Path::new("main.go")), Some("go"));
        assert_eq!(language(Path::new("src/app.py")), Some("python"));
        assert_eq!(language(Path::new("lib.rs")), Some("rust"));
        assert_eq!(language(Path::new("a/b/c.tsx")), Some("typescriptreact"));
        assert_eq!(language(Path::new("README.md")), Some("markdown"));
        assert_eq!(language(Path::new("data.bin")), None);
    }

    #[test]
    fn test_language_by_filename_wins_over_extension() {
        assert_eq!(language(Path::new("Dockerfile")), Some("dockerfile"));
        assert_eq!(language(Path::new("Makefile")), Some("make"));
        assert_eq!(language(Path::new("GNUmakefile")), Some("make"));
        assert_eq!(language(Path::new("deploy/CMakeLists.txt")), Some("cmake"));
    }

    #[test]
    fn test_extension_case_insensitive() {
        assert_eq!(language(Path::new("LEGACY.GO")), Some("go"));
    }

    #[test]
    fn test_content_class_mapping() {
        assert_eq!(content_class(Some("go")), ContentClass::Code);
        assert_eq!(content_class(Some("markdown")), ContentClass::Markdown);
        assert_eq!(content_class(Some("yaml")), ContentClass::Config);
        assert_eq!(content_class(Some("text")), ContentClass::Text);
        assert_eq!(content_class(None), ContentClass::Text);
    }

    #[test]
    fn test_generated_markers() {
        assert!(is_generated(b"// Code generated by protoc-gen-go. DO NOT EDIT.\n"));
        assert!(is_generated(b"# Generated by tooling\n"));
        assert!(is_generated(b"<!-- AUTO-GENERATED -->\n"));
        assert!(!is_generated(b"package main\n"));
    }

    #[test]
    fn test_binary_detection() {
        assert!(is_binary(b"\x7fELF\x00\x01\x02"));
        assert!(!is_binary(b"plain text content"));
        // Null past the 512-byte window does not count.
        let mut buf = vec![b'a'; 600];
        buf[599] = 0;
        assert!(!is_binary(&buf));
    }
}
