//! Shared utilities for obi.
//!
//! Every path and argument interpolated into a shell command goes through
//! [`shell_quote`]; commands are plain strings so the same text can be run
//! locally, sent over ssh, printed by a dry run, or written to a script.

use std::path::{Path, PathBuf};

fn is_safe_shell_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '@' | '%' | '+' | '=' | ':' | ',' | '.' | '/' | '-' | '_')
}

/// Quote a single token for a POSIX shell.
///
/// Empty strings become `''`, tokens made only of safe characters are
/// returned unchanged, anything else is wrapped in single quotes with
/// embedded single quotes spliced as `'"'"'`.
pub fn shell_quote(token: &str) -> String {
    if token.is_empty() {
        return "''".to_string();
    }
    if token.chars().all(is_safe_shell_char) {
        return token.to_string();
    }
    format!("'{}'", token.replace('\'', "'\"'\"'"))
}

/// Quote a path for a POSIX shell.
pub fn shell_quote_path(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}

/// Quote each token individually and join them with single spaces.
pub fn join_quoted<I, S>(tokens: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tokens
        .into_iter()
        .map(|t| shell_quote(t.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Join command fragments with single spaces, dropping empty fragments.
pub fn join_fragments<'a>(fragments: impl IntoIterator<Item = &'a str>) -> String {
    fragments
        .into_iter()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run `command` with `dir` as the working directory.
pub fn within(dir: &Path, command: &str) -> String {
    format!("cd {} && {}", shell_quote_path(dir), command)
}

/// Escape a literal for use inside a POSIX extended regular expression.
pub fn ere_escape(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(
            c,
            '.' | '[' | ']' | '(' | ')' | '*' | '+' | '?' | '{' | '}' | '|' | '^' | '$' | '\\'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Express `path` relative to `base` when it lies underneath it.
///
/// Paths outside `base` are returned unchanged.
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    match path.strip_prefix(base) {
        Ok(rel) if rel.as_os_str().is_empty() => PathBuf::from("."),
        Ok(rel) => rel.to_path_buf(),
        Err(_) => path.to_path_buf(),
    }
}

/// Basename of a configured target path, e.g. `build/foo` -> `foo`.
pub fn target_basename(target: &str) -> String {
    Path::new(target.trim_end_matches('/'))
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
