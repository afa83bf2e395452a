// src/discovery.rs
use crate::config::EngineConfig;
use anyhow::Result;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

/// Directories never descended into.
pub const PRUNE_DIRS: &[&str] = &[
    ".git",
    ".archdoc",
    "node_modules",
    "dist",
    "build",
    "target",
    "gen",
    ".venv",
    "venv",
    ".tox",
    ".cache",
    "coverage",
    "vendor",
    "third_party",
];

const BIN_EXT_PATTERN: &str = r"(?i)\.(png|jpe?g|gif|svg|ico|icns|webp|woff2?|ttf|otf|pdf|mp4|mov|mkv|avi|mp3|wav|flac|zip|gz|bz2|xz|7z|rar|jar|csv|tsv|parquet|sqlite|db|bin|exe|dll|so|dylib|pkl|onnx|tgz|zst)$";

const SECRET_PATTERN: &str = r"(?i)(^\.?env(\..*)?$|/\.?env(\..*)?$|(^|/)(id_rsa(\.pub)?|id_ed25519(\.pub)?|.*\.(pem|p12|jks|keystore|pfx))$)";

const SOURCE_EXT_PATTERN: &str = r"(?i)\.(c|h|cc|hh|cpp|hpp|rs|go|py|js|jsx|ts|tsx|java|kt|kts|rb|php|scala|cs|swift|m|mm|lua|sh|sql|html|xml|yaml|yml|toml|json|md|proto|graphql|gql|dart)$";

static BIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(BIN_EXT_PATTERN).unwrap_or_else(|_| panic!("Invalid Regex")));
static SECRET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(SECRET_PATTERN).unwrap_or_else(|_| panic!("Invalid Regex")));
static SOURCE_EXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(SOURCE_EXT_PATTERN).unwrap_or_else(|_| panic!("Invalid Regex")));

/// Walks `root` and returns the canonical absolute paths worth analyzing.
///
/// # Errors
/// Returns error if `root` itself is unreadable. Errors on individual
/// entries are counted and reported, never fatal.
pub fn discover(root: &Path, config: &EngineConfig) -> Result<Vec<PathBuf>> {
    let raw = walk_filesystem(root, config.verbose);
    let sources = raw.into_iter().filter(|p| is_source_like(p)).collect();
    Ok(filter_config(sources, config))
}

fn walk_filesystem(root: &Path, verbose: bool) -> Vec<PathBuf> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !should_prune(&e.file_name().to_string_lossy()));

    let mut paths = Vec::new();
    let mut errors = 0usize;
    for item in walker {
        match item {
            Ok(entry) => {
                if entry.file_type().is_file() {
                    if let Ok(canon) = entry.path().canonicalize() {
                        paths.push(canon);
                    }
                }
            }
            Err(_) => errors += 1,
        }
    }
    if errors > 0 && verbose {
        eprintln!("WARN: encountered {errors} errors during file walk");
    }
    paths
}

fn should_prune(name: &str) -> bool {
    PRUNE_DIRS.contains(&name)
}

fn is_source_like(path: &Path) -> bool {
    let filename = path.file_name().map_or("", |f| f.to_str().unwrap_or(""));
    if BIN_RE.is_match(filename) || SECRET_RE.is_match(filename) {
        return false;
    }
    SOURCE_EXT_RE.is_match(filename)
}

/// Normalizes a path to forward slashes for cross-platform pattern matching.
fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn filter_config(mut paths: Vec<PathBuf>, config: &EngineConfig) -> Vec<PathBuf> {
    if !config.include_patterns.is_empty() {
        paths.retain(|p| {
            let s = normalize_path(p);
            config.include_patterns.iter().any(|pat| s.contains(pat))
        });
    }
    if !config.exclude_patterns.is_empty() {
        paths.retain(|p| {
            let s = normalize_path(p);
            !config.exclude_patterns.iter().any(|pat| s.contains(pat))
        });
    }
    paths
}
