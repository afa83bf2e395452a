// src/analyzer.rs
//! Built-in per-file work function: a documentation-surface profile.
//!
//! The engine is agnostic to what a work function computes; this is the
//! default one the CLI ships. It extracts the cheap signals downstream
//! document generators key off: size, language, and how densely the file
//! uses annotation/route-style idioms.

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::json;
use std::path::Path;
use std::sync::LazyLock;

// Decorator/annotation idioms across the supported languages:
// Rust/Java/Python attribute markers and HTTP route string literals.
static ANNOTATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*(#\[[A-Za-z_]|@[A-Za-z_][A-Za-z0-9_]*)"#)
        .unwrap_or_else(|_| panic!("Invalid Regex"))
});
static ROUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(get|post|put|patch|delete)\s*\(\s*["']/"#)
        .unwrap_or_else(|_| panic!("Invalid Regex"))
});
static DOC_COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*(///|//!|"{3}|#{1}\s)"#).unwrap_or_else(|_| panic!("Invalid Regex"))
});

/// Analyzes one file and returns its profile as an opaque JSON payload.
///
/// # Errors
/// Returns error if the file cannot be read as text.
pub fn profile_file(path: &Path) -> Result<serde_json::Value> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let lines = source.lines().count();
    let blank = source.lines().filter(|l| l.trim().is_empty()).count();

    Ok(json!({
        "language": language_of(path),
        "bytes": source.len(),
        "lines": lines,
        "code_lines": lines - blank,
        "annotations": ANNOTATION_RE.find_iter(&source).count(),
        "routes": ROUTE_RE.find_iter(&source).count(),
        "doc_comments": DOC_COMMENT_RE.find_iter(&source).count(),
    }))
}

fn language_of(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
        "rs" => "rust",
        "py" => "python",
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "rb" => "ruby",
        "c" | "h" => "c",
        "cc" | "cpp" | "hh" | "hpp" => "cpp",
        "cs" => "csharp",
        "php" => "php",
        "swift" => "swift",
        "md" => "markdown",
        _ => "other",
    }
}
