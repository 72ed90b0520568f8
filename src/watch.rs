//! Editing of `debian/watch` files.
//!
//! The parser understands watch file versions 1 through 4: the `version=`
//! declaration, line continuations, per-entry and persistent `opts=`, and
//! patterns embedded in the last component of the URL. The serializer always
//! writes canonical form; comment preservation for edited files is provided
//! by the editor's merge fallback. Discovering upstream releases over the
//! network is out of scope here.

use crate::reformatting::{Editor, FileFormat};
use regex::Regex;
use std::sync::OnceLock;

/// The watch file format version written for new files.
pub const DEFAULT_VERSION: u32 = 4;

/// Error interpreting a watch file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchError {
    /// The `version=` line is missing.
    MissingVersion,
    /// The `version=` line does not carry a number.
    InvalidVersion(String),
    /// An `opts="…"` group is never closed.
    UnmatchedQuote(String),
    /// A mangle expression could not be interpreted.
    InvalidMangle(String),
}

impl std::fmt::Display for WatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            WatchError::MissingVersion => write!(f, "missing version= line"),
            WatchError::InvalidVersion(value) => write!(f, "invalid version: {}", value),
            WatchError::UnmatchedQuote(line) => write!(f, "unmatched \" in {:?}", line),
            WatchError::InvalidMangle(expr) => write!(f, "invalid mangle expression: {:?}", expr),
        }
    }
}

impl std::error::Error for WatchError {}

fn trailing_pattern_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/([^/]*\([^/]*\)[^/]*)$").unwrap())
}

fn split_option(option: &str) -> (&str, Option<&str>) {
    match option.split_once('=') {
        Some((key, value)) => (key, Some(value)),
        None => (option, None),
    }
}

fn split_whitespace_n(text: &str, n: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = text.trim();
    while parts.len() + 1 < n {
        match rest.find(char::is_whitespace) {
            Some(position) => {
                parts.push(rest[..position].to_string());
                rest = rest[position..].trim_start();
            }
            None => break,
        }
    }
    if !rest.is_empty() {
        parts.push(rest.to_string());
    }
    parts
}

fn split_unescaped(text: &str, delimiter: char) -> Vec<String> {
    let mut parts = vec![String::new()];
    let mut escaped = false;
    for c in text.chars() {
        if c == delimiter && !escaped {
            parts.push(String::new());
        } else if let Some(last) = parts.last_mut() {
            last.push(c);
        }
        escaped = c == '\\' && !escaped;
    }
    parts
}

/// Apply a uscan-style substitution expression (`s/pattern/replacement/`)
/// to a string.
///
/// # Errors
/// [`WatchError::InvalidMangle`] for anything that is not a valid
/// substitution.
pub fn apply_subst_expr(expr: &str, orig: &str) -> Result<String, WatchError> {
    let mut chars = expr.chars();
    if chars.next() != Some('s') {
        return Err(WatchError::InvalidMangle(expr.to_string()));
    }
    let delimiter = chars
        .next()
        .ok_or_else(|| WatchError::InvalidMangle(expr.to_string()))?;
    let parts = split_unescaped(expr, delimiter);
    if parts.len() < 3 {
        return Err(WatchError::InvalidMangle(expr.to_string()));
    }
    let pattern = &parts[1];
    // uscan replacements refer to groups as $1 or \1
    let replacement = parts[2].replace('\\', "$");
    let re = Regex::new(pattern).map_err(|_| WatchError::InvalidMangle(expr.to_string()))?;
    Ok(re.replace_all(orig, replacement.as_str()).into_owned())
}

/// A single watch entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Watch {
    /// Upstream URL (may contain a `@PACKAGE@` substitution).
    pub url: String,
    /// Pattern matching release file names.
    pub matching_pattern: Option<String>,
    /// Version policy column (e.g. `debian`).
    pub version: Option<String>,
    /// Action script column.
    pub script: Option<String>,
    /// The entry's options.
    pub options: Vec<String>,
}

impl Watch {
    /// Create an entry for a URL with a matching pattern.
    pub fn new(url: &str, matching_pattern: Option<&str>) -> Self {
        Watch {
            url: url.to_string(),
            matching_pattern: matching_pattern.map(ToString::to_string),
            ..Watch::default()
        }
    }

    /// Look up an option. The outer `Option` is presence, the inner one the
    /// value (`opts=repack` has none).
    pub fn get_option(&self, name: &str) -> Option<Option<&str>> {
        self.options
            .iter()
            .find(|option| split_option(option).0 == name)
            .map(|option| split_option(option).1)
    }

    /// Check whether an option is present.
    pub fn has_option(&self, name: &str) -> bool {
        self.get_option(name).is_some()
    }

    /// Set an option, replacing any existing value.
    pub fn set_option(&mut self, name: &str, value: Option<&str>) {
        let option = match value {
            Some(value) => format!("{}={}", name, value),
            None => name.to_string(),
        };
        for existing in self.options.iter_mut() {
            if split_option(existing).0 == name {
                *existing = option;
                return;
            }
        }
        self.options.push(option);
    }

    /// Remove an option. Returns whether it was present.
    pub fn del_option(&mut self, name: &str) -> bool {
        let before = self.options.len();
        self.options
            .retain(|option| split_option(option).0 != name);
        self.options.len() != before
    }

    /// The URL with `@PACKAGE@` substituted.
    pub fn format_url(&self, package: &str) -> String {
        self.url.replace("@PACKAGE@", package)
    }

    /// Apply this entry's `uversionmangle` option to a version string.
    ///
    /// # Errors
    /// [`WatchError::InvalidMangle`] when the option's expression is invalid.
    pub fn uversionmangle(&self, version: &str) -> Result<String, WatchError> {
        match self.get_option("uversionmangle") {
            Some(Some(expr)) => apply_subst_expr(expr, version),
            _ => Ok(version.to_string()),
        }
    }
}

/// Contents of a `debian/watch` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchFile {
    /// The declared format version; `None` for an empty file.
    pub version: Option<u32>,
    /// Options that apply to every entry.
    pub options: Vec<String>,
    /// The watch entries.
    pub entries: Vec<Watch>,
}

impl WatchFile {
    /// Whether the file has any entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add an entry, declaring the default format version if none is set.
    pub fn add_entry(&mut self, entry: Watch) {
        if self.version.is_none() {
            self.version = Some(DEFAULT_VERSION);
        }
        self.entries.push(entry);
    }

    /// Mutable access to the `index`th entry.
    pub fn entry_mut(&mut self, index: usize) -> Option<&mut Watch> {
        self.entries.get_mut(index)
    }
}

fn serialize_options(options: &[String]) -> String {
    let joined = options.join(",");
    if joined.contains(' ') || joined.contains('\t') {
        format!("opts=\"{}\"", joined)
    } else {
        format!("opts={}", joined)
    }
}

impl FileFormat for WatchFile {
    type Error = WatchError;

    fn from_text(text: &str) -> Result<Self, Self::Error> {
        let mut grouped: Vec<Vec<String>> = Vec::new();
        let mut continued: Vec<String> = Vec::new();
        for line in text.lines() {
            if line.starts_with('#') {
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }
            match line.strip_suffix('\\') {
                Some(stripped) => continued.push(stripped.to_string()),
                None => {
                    continued.push(line.to_string());
                    grouped.push(std::mem::take(&mut continued));
                }
            }
        }
        if !continued.is_empty() {
            tracing::warn!("watch file ends with \\; treating the line as complete");
            grouped.push(continued);
        }
        if grouped.is_empty() {
            return Ok(WatchFile::default());
        }
        let first = grouped.remove(0).concat();
        let (key, value) = first.split_once('=').ok_or(WatchError::MissingVersion)?;
        if key.trim() != "version" {
            return Err(WatchError::MissingVersion);
        }
        let version: u32 = value
            .trim()
            .parse()
            .map_err(|_| WatchError::InvalidVersion(value.trim().to_string()))?;
        let mut persistent_options = Vec::new();
        let mut entries = Vec::new();
        for mut chunks in grouped {
            if version > 3 {
                for chunk in chunks.iter_mut() {
                    *chunk = chunk.trim_start().to_string();
                }
            }
            let line = chunks.concat().trim().to_string();
            if line.is_empty() {
                continue;
            }
            let (options, line) = match line.strip_prefix("opts=") {
                Some(rest) => {
                    if let Some(quoted) = rest.strip_prefix('"') {
                        let end = quoted
                            .find('"')
                            .ok_or_else(|| WatchError::UnmatchedQuote(line.clone()))?;
                        let options = quoted[..end]
                            .split(',')
                            .map(ToString::to_string)
                            .collect::<Vec<_>>();
                        (Some(options), quoted[end + 1..].trim_start().to_string())
                    } else {
                        let mut parts = split_whitespace_n(rest, 2);
                        let remainder = if parts.len() > 1 { parts.pop() } else { None };
                        let options = parts
                            .first()
                            .map(|options| {
                                options.split(',').map(ToString::to_string).collect::<Vec<_>>()
                            })
                            .unwrap_or_default();
                        (Some(options), remainder.unwrap_or_default())
                    }
                }
                None => (None, line),
            };
            if line.is_empty() {
                if let Some(options) = options {
                    persistent_options.extend(options);
                }
                continue;
            }
            let mut parts = split_whitespace_n(&line, 2);
            let mut url = parts.remove(0);
            let rest = parts.pop().unwrap_or_default();
            let columns = if let Some(m) = trailing_pattern_re().captures(&url) {
                let component = m[1].to_string();
                url = url[..url.len() - component.len() - 1].trim().to_string();
                let mut columns = vec![component];
                columns.extend(split_whitespace_n(&rest, 2));
                columns
            } else {
                split_whitespace_n(&rest, 3)
            };
            let mut columns = columns.into_iter();
            entries.push(Watch {
                url,
                matching_pattern: columns.next(),
                version: columns.next(),
                script: columns.next(),
                options: options.unwrap_or_default(),
            });
        }
        Ok(WatchFile {
            version: Some(version),
            options: persistent_options,
            entries,
        })
    }

    fn to_text(&self) -> Option<String> {
        if self.version.is_none() && self.options.is_empty() && self.entries.is_empty() {
            return None;
        }
        let mut ret = format!("version={}\n", self.version.unwrap_or(DEFAULT_VERSION));
        if !self.options.is_empty() {
            ret.push_str(&serialize_options(&self.options));
            ret.push('\n');
        }
        for entry in &self.entries {
            if !entry.options.is_empty() {
                ret.push_str(&serialize_options(&entry.options));
                ret.push(' ');
            }
            ret.push_str(&entry.url);
            for column in [&entry.matching_pattern, &entry.version, &entry.script]
                .into_iter()
                .flatten()
            {
                ret.push(' ');
                ret.push_str(column);
            }
            ret.push('\n');
        }
        Some(ret)
    }

    fn missing() -> Option<Self> {
        Some(WatchFile::default())
    }
}

/// Format-preserving editor for a `debian/watch` file.
pub type WatchEditor = Editor<WatchFile>;
