//! Editing of lintian override files.
//!
//! Override lines follow the format documented in lintian's manual:
//! `[[<package>][ [<archlist>]][ <type>]: ]<lintian-tag>[ <lintian-info>]`.
//! Comment and blank lines are kept verbatim.

use crate::reformatting::{Editor, FileFormat};
use regex::Regex;
use std::convert::Infallible;

/// The package type an override applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideType {
    /// A udeb package.
    Udeb,
    /// The source package.
    Source,
    /// A binary package.
    Binary,
}

impl std::fmt::Display for OverrideType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            OverrideType::Udeb => "udeb",
            OverrideType::Source => "source",
            OverrideType::Binary => "binary",
        })
    }
}

impl std::str::FromStr for OverrideType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "udeb" => Ok(OverrideType::Udeb),
            "source" => Ok(OverrideType::Source),
            "binary" => Ok(OverrideType::Binary),
            _ => Err(format!("invalid override type: {}", s)),
        }
    }
}

/// A single lintian override.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LintianOverride {
    /// Package the override applies to.
    pub package: Option<String>,
    /// Architectures the override applies to.
    pub archlist: Option<Vec<String>>,
    /// Package type the override applies to.
    pub override_type: Option<OverrideType>,
    /// The lintian tag, possibly a glob pattern.
    pub tag: Option<String>,
    /// Additional information, possibly a glob pattern.
    pub info: Option<String>,
}

fn glob_matches(pattern: &str, value: &str) -> bool {
    let mut regex = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }
    regex.push('$');
    match Regex::new(&regex) {
        Ok(regex) => regex.is_match(value),
        Err(_) => pattern == value,
    }
}

impl LintianOverride {
    /// Check whether this override matches the given tag occurrence.
    ///
    /// Fields left unset on either side match anything.
    pub fn matches(
        &self,
        package: Option<&str>,
        tag: Option<&str>,
        info: Option<&str>,
        arch: Option<&str>,
        override_type: Option<OverrideType>,
    ) -> bool {
        if let (Some(own), Some(package)) = (&self.package, package) {
            if own != package {
                return false;
            }
        }
        if let (Some(own), Some(override_type)) = (self.override_type, override_type) {
            if own != override_type {
                return false;
            }
        }
        if let (Some(own), Some(tag)) = (&self.tag, tag) {
            if !glob_matches(own, tag) {
                return false;
            }
        }
        if let (Some(own), Some(info)) = (&self.info, info) {
            if !glob_matches(own, info) {
                return false;
            }
        }
        if let (Some(archlist), Some(arch)) = (&self.archlist, arch) {
            if !archlist.is_empty() && !archlist.iter().any(|a| a == arch) {
                return false;
            }
        }
        true
    }
}

/// Parse an override line.
pub fn parse_override(line: &str) -> LintianOverride {
    let line = line.trim();
    let mut package = None;
    let mut archlist = None;
    let mut override_type = None;
    let issue = match line.split_once(": ") {
        Some((origin, issue)) => {
            let mut origin = origin.trim();
            while !origin.is_empty() {
                origin = origin.trim();
                if let Some(rest) = origin.strip_prefix('[') {
                    let (archs, remainder) = match rest.split_once(']') {
                        Some((archs, remainder)) => (archs, remainder),
                        None => (rest, ""),
                    };
                    archlist = Some(
                        archs
                            .split_whitespace()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>(),
                    );
                    origin = remainder;
                } else {
                    let (field, remainder) = match origin.split_once(' ') {
                        Some((field, remainder)) => (field, remainder),
                        None => (origin, ""),
                    };
                    if let Ok(parsed) = field.parse::<OverrideType>() {
                        override_type = Some(parsed);
                    } else {
                        package = Some(field.to_string());
                    }
                    origin = remainder;
                }
            }
            issue
        }
        None => line,
    };
    let (tag, info) = match issue.split_once(char::is_whitespace) {
        Some((tag, info)) => (tag.to_string(), Some(info.trim_start().to_string())),
        None => (issue.to_string(), None),
    };
    LintianOverride {
        package,
        archlist,
        override_type,
        tag: if tag.is_empty() { None } else { Some(tag) },
        info,
    }
}

/// Serialize an override, including the trailing newline.
pub fn serialize_override(override_: &LintianOverride) -> String {
    let mut origin = Vec::new();
    if let Some(package) = &override_.package {
        origin.push(package.clone());
    }
    if let Some(archlist) = &override_.archlist {
        origin.push(format!("[{}]", archlist.join(" ")));
    }
    if let Some(override_type) = &override_.override_type {
        origin.push(override_type.to_string());
    }
    let mut line = if origin.is_empty() {
        override_.tag.clone().unwrap_or_default()
    } else {
        format!(
            "{}: {}",
            origin.join(" "),
            override_.tag.as_deref().unwrap_or("")
        )
    };
    if let Some(info) = &override_.info {
        line.push(' ');
        line.push_str(info);
    }
    line + "\n"
}

/// One line of an overrides file.
#[derive(Debug, Clone, PartialEq, Eq)]
enum OverrideLine {
    /// A comment or blank line, kept verbatim (including line ending).
    Verbatim(String),
    /// An override.
    Override(LintianOverride),
}

/// Contents of a lintian overrides file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LintianOverrides {
    lines: Vec<OverrideLine>,
}

impl LintianOverrides {
    /// Iterate over the overrides in the file.
    pub fn overrides(&self) -> impl Iterator<Item = &LintianOverride> + '_ {
        self.lines.iter().filter_map(|line| match line {
            OverrideLine::Override(override_) => Some(override_),
            OverrideLine::Verbatim(_) => None,
        })
    }

    /// Check whether a matching override exists.
    pub fn override_exists(
        &self,
        tag: &str,
        info: Option<&str>,
        package: Option<&str>,
    ) -> bool {
        self.overrides()
            .any(|override_| override_.matches(package, Some(tag), info, None, None))
    }

    /// Add an override at the end of the file.
    pub fn add_override(&mut self, override_: LintianOverride) {
        self.lines.push(OverrideLine::Override(override_));
    }

    /// Remove all overrides matching the given tag occurrence.
    ///
    /// Returns the number of overrides removed.
    pub fn remove_overrides(&mut self, tag: &str, info: Option<&str>) -> usize {
        let before = self.lines.len();
        self.lines.retain(|line| match line {
            OverrideLine::Override(override_) => {
                !override_.matches(None, Some(tag), info, None, None)
            }
            OverrideLine::Verbatim(_) => true,
        });
        before - self.lines.len()
    }
}

impl FileFormat for LintianOverrides {
    type Error = Infallible;

    fn from_text(text: &str) -> Result<Self, Self::Error> {
        let mut lines = Vec::new();
        let mut rest = text;
        while !rest.is_empty() {
            let (line, remainder) = match rest.find('\n') {
                Some(pos) => rest.split_at(pos + 1),
                None => (rest, ""),
            };
            rest = remainder;
            if line.starts_with('#') || line.trim().is_empty() {
                lines.push(OverrideLine::Verbatim(line.to_string()));
            } else {
                lines.push(OverrideLine::Override(parse_override(line)));
            }
        }
        Ok(LintianOverrides { lines })
    }

    fn to_text(&self) -> Option<String> {
        let mut ret = String::new();
        for line in &self.lines {
            match line {
                OverrideLine::Verbatim(text) => ret.push_str(text),
                OverrideLine::Override(override_) => ret.push_str(&serialize_override(override_)),
            }
        }
        Some(ret)
    }

    fn missing() -> Option<Self> {
        Some(LintianOverrides::default())
    }
}

/// Format-preserving editor for a lintian overrides file.
pub type LintianOverridesEditor = Editor<LintianOverrides>;
