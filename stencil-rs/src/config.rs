//! Options file parser.
//!
//! One `key = value` setting per line:
//!
//! | Key | Values |
//! |-----|--------|
//! | `identifiers` | `sensitive`, `insensitive` |
//! | `strings` | `ordinal`, `ignore-case` |
//! | `undefined` | text rendered for undefined values |
//! | `collapse_whitespace` | boolean |
//! | `ignore_errors` | boolean |
//! | `strict_identifiers` | boolean |
//! | `strict_members` | boolean |
//! | `tag_start`, `tag_end` | a single character |
//! | Lines starting with `#` or `;` | comment, ignored |
//!
//! Values may be double-quoted to keep surrounding spaces.  Booleans accept
//! `true`/`false`, `yes`/`no`, `on`/`off` and `1`/`0`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use directories::ProjectDirs;

use crate::template::{
    Dialect, DialectError, EvaluationOptions, IdentifierCase, StringComparison,
};

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Dialect and evaluation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub identifiers: IdentifierCase,
    pub strings: StringComparison,
    pub undefined: String,
    pub collapse_whitespace: bool,
    pub tag_start: char,
    pub tag_end: char,
    pub options: EvaluationOptions,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            identifiers: IdentifierCase::default(),
            strings: StringComparison::default(),
            undefined: "undefined".to_owned(),
            collapse_whitespace: false,
            tag_start: '{',
            tag_end: '}',
            options: EvaluationOptions::default(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config string.
    ///
    /// Bad lines are reported and skipped; every other line still applies.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                errors.push(ConfigError {
                    line: lineno,
                    message: format!("expected `key = value`, got `{line}`"),
                });
                continue;
            };
            if let Err(message) = config.apply(key.trim(), unquote(value.trim())) {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        (config, errors)
    }

    /// Read and parse a config file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// Build a dialect with the standard operators and directives and this
    /// config's settings.
    pub fn dialect(&self) -> Result<Arc<Dialect>, DialectError> {
        Dialect::builder("stencil")
            .identifiers(self.identifiers)
            .strings(self.strings)
            .undefined(self.undefined.clone())
            .delimiters(self.tag_start, self.tag_end)
            .collapse_whitespace(self.collapse_whitespace)
            .standard_operators()
            .standard_directives()
            .build()
            .map(Arc::new)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "identifiers" => {
                self.identifiers = match value {
                    "sensitive" => IdentifierCase::Sensitive,
                    "insensitive" => IdentifierCase::Insensitive,
                    other => return Err(format!("identifiers: unknown mode `{other}`")),
                }
            }
            "strings" => {
                self.strings = match value {
                    "ordinal" => StringComparison::Ordinal,
                    "ignore-case" => StringComparison::IgnoreCase,
                    other => return Err(format!("strings: unknown mode `{other}`")),
                }
            }
            "undefined" => self.undefined = value.to_owned(),
            "collapse_whitespace" => self.collapse_whitespace = parse_bool(key, value)?,
            "ignore_errors" => self.options.ignore_evaluation_errors = parse_bool(key, value)?,
            "strict_identifiers" => self.options.strict_identifiers = parse_bool(key, value)?,
            "strict_members" => self.options.strict_members = parse_bool(key, value)?,
            "tag_start" => self.tag_start = parse_char(key, value)?,
            "tag_end" => self.tag_end = parse_char(key, value)?,
            other => return Err(format!("unknown setting `{other}`")),
        }
        Ok(())
    }
}

// ── Value parsing ─────────────────────────────────────────────────────────────

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(s)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(format!("{key}: expected a boolean, got `{value}`")),
    }
}

fn parse_char(key: &str, value: &str) -> Result<char, String> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(format!("{key}: expected a single character, got `{value}`")),
    }
}

// ── Discovery ─────────────────────────────────────────────────────────────────

/// Search for the user config file in the standard locations.
/// Returns the first path that exists, or `None`.
pub fn find_user_config() -> Option<PathBuf> {
    let platform = ProjectDirs::from("", "", "stencil").map(|d| d.config_dir().join("stencil.conf"));
    platform
        .into_iter()
        .chain([PathBuf::from("./.stencilrc")])
        .find(|p| p.exists())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
