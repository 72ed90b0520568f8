//! Editing of `debian/changelog` files.
//!
//! The changelog is kept as verbatim lines grouped into blocks at entry
//! header boundaries, so an untouched file always round-trips exactly.
//! Structured accessors parse the header and trailer lines on demand, and
//! mutations rewrite only the lines they touch.

use crate::reformatting::{Editor, FileFormat};
use chrono::{DateTime, FixedOffset};
use debversion::Version;
use regex::Regex;
use std::convert::Infallible;
use std::sync::OnceLock;

/// Width to wrap changelog entries at.
pub const WIDTH: usize = 80;

/// Indentation for the first line of a change.
pub const INITIAL_INDENT: &str = "  * ";

/// The distribution to use for new uploads.
pub const DEFAULT_DISTRIBUTION: &str = "unstable";

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<package>\S+) \((?P<version>[^\)]+)\)(?P<distributions>[^;]*);\s*(?P<metadata>.*)$")
            .unwrap()
    })
}

fn trailer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^ -- (?P<maintainer>.*) <(?P<email>[^>]*)> *(?P<date>.*)$").unwrap()
    })
}

/// Check whether a distribution name marks an entry as not yet released.
pub fn distribution_is_unreleased(distribution: &str) -> bool {
    distribution == "UNRELEASED" || distribution.starts_with("UNRELEASED-")
}

/// Format a timestamp the way changelog trailer lines expect it.
pub fn format_datetime(timestamp: &DateTime<FixedOffset>) -> String {
    timestamp.format("%a, %d %b %Y %H:%M:%S %z").to_string()
}

/// Increment a Debian version: the revision for non-native packages, the
/// upstream version for native ones.
pub fn increment_version(version: &Version) -> Version {
    static LAST_NUMBER: OnceLock<Regex> = OnceLock::new();
    let re = LAST_NUMBER.get_or_init(|| Regex::new(r"^(.*?)([0-9]+)$").unwrap());
    let bump = |value: &str| -> String {
        match re.captures(value) {
            Some(m) => {
                let n: u64 = m[2].parse().unwrap_or(0);
                format!("{}{}", &m[1], n + 1)
            }
            None => format!("{}1", value),
        }
    };
    let mut ret = version.clone();
    match &ret.debian_revision {
        Some(revision) => ret.debian_revision = Some(bump(revision)),
        None => ret.upstream_version = bump(&ret.upstream_version),
    }
    ret
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn wrap(text: &str, initial_indent: &str) -> Vec<String> {
    let subsequent_indent = " ".repeat(initial_indent.len());
    let mut lines = Vec::new();
    let mut current = initial_indent.to_string();
    let mut empty = true;
    for word in text.split_whitespace() {
        if !empty && current.len() + 1 + word.len() > WIDTH {
            lines.push(current);
            current = subsequent_indent.clone();
            empty = true;
        }
        if !empty {
            current.push(' ');
        }
        current.push_str(word);
        empty = false;
    }
    lines.push(current);
    lines
}

/// A single changelog entry, kept as verbatim lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeBlock {
    lines: Vec<String>,
}

impl ChangeBlock {
    fn header(&self) -> Option<regex::Captures> {
        let first = self.lines.first()?;
        header_re().captures(first.trim_end_matches('\n'))
    }

    /// The source package name.
    pub fn package(&self) -> Option<String> {
        self.header().map(|m| m["package"].to_string())
    }

    /// The version of this entry.
    pub fn version(&self) -> Option<Version> {
        self.header().and_then(|m| m["version"].parse().ok())
    }

    /// The distributions this entry was uploaded to.
    pub fn distributions(&self) -> Vec<String> {
        self.header()
            .map(|m| {
                m["distributions"]
                    .split_whitespace()
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The `key=value` pairs following the distribution list.
    pub fn metadata(&self) -> Vec<(String, String)> {
        self.header()
            .map(|m| {
                m["metadata"]
                    .split(',')
                    .filter_map(|pair| {
                        let (key, value) = pair.trim().split_once('=')?;
                        Some((key.to_string(), value.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether this entry has not been released yet.
    pub fn is_unreleased(&self) -> bool {
        self.distributions()
            .first()
            .map(|d| distribution_is_unreleased(d))
            .unwrap_or(false)
    }

    /// The change lines, without header, trailer and surrounding blanks.
    pub fn changes(&self) -> Vec<&str> {
        let end = self
            .lines
            .iter()
            .position(|line| line.starts_with(" -- "))
            .unwrap_or(self.lines.len());
        self.lines[..end]
            .iter()
            .skip(1)
            .map(|line| line.trim_end_matches('\n'))
            .filter(|line| !line.trim().is_empty())
            .collect()
    }

    /// The maintainer `(name, email)` from the trailer line.
    pub fn maintainer(&self) -> Option<(String, String)> {
        let trailer = self.lines.iter().find(|line| line.starts_with(" -- "))?;
        let m = trailer_re().captures(trailer.trim_end_matches('\n'))?;
        Some((m["maintainer"].to_string(), m["email"].to_string()))
    }

    /// The date from the trailer line.
    pub fn date(&self) -> Option<String> {
        let trailer = self.lines.iter().find(|line| line.starts_with(" -- "))?;
        let m = trailer_re().captures(trailer.trim_end_matches('\n'))?;
        let date = m["date"].to_string();
        if date.is_empty() {
            None
        } else {
            Some(date)
        }
    }

    fn rewrite_header(&mut self, f: impl FnOnce(&str, &str, &str, &str) -> String) -> bool {
        let first = match self.lines.first() {
            Some(first) => first.clone(),
            None => return false,
        };
        let had_newline = first.ends_with('\n');
        let m = match header_re().captures(first.trim_end_matches('\n')) {
            Some(m) => m,
            None => return false,
        };
        let mut line = f(&m["package"], &m["version"], &m["distributions"], &m["metadata"]);
        if had_newline {
            line.push('\n');
        }
        self.lines[0] = line;
        true
    }

    /// Replace the version in the header line.
    pub fn set_version(&mut self, version: &Version) -> bool {
        let version = version.to_string();
        self.rewrite_header(|package, _old, distributions, metadata| {
            format!("{} ({}){}; {}", package, version, distributions, metadata)
        })
    }

    /// Replace the distribution list in the header line.
    pub fn set_distributions(&mut self, distributions: &str) -> bool {
        self.rewrite_header(|package, version, _old, metadata| {
            format!("{} ({}) {}; {}", package, version, distributions, metadata)
        })
    }

    /// Replace the date in the trailer line.
    pub fn set_date(&mut self, date: &str) -> bool {
        let position = match self.lines.iter().position(|line| line.starts_with(" -- ")) {
            Some(position) => position,
            None => return false,
        };
        let trailer = self.lines[position].clone();
        let had_newline = trailer.ends_with('\n');
        let m = match trailer_re().captures(trailer.trim_end_matches('\n')) {
            Some(m) => m,
            None => return false,
        };
        let mut line = format!(" -- {} <{}>  {}", &m["maintainer"], &m["email"], date);
        if had_newline {
            line.push('\n');
        }
        self.lines[position] = line;
        true
    }

    /// Add raw change lines just before the trailer.
    pub fn add_change_lines<'a>(&mut self, change: impl IntoIterator<Item = &'a str>) {
        let trailer = self
            .lines
            .iter()
            .position(|line| line.starts_with(" -- "))
            .unwrap_or(self.lines.len());
        let mut position = trailer;
        if position > 0 && is_blank(&self.lines[position - 1]) {
            position -= 1;
        }
        if position == 1 {
            self.lines.insert(1, "\n".to_string());
            position = 2;
        }
        for line in change {
            self.lines.insert(position, format!("{}\n", line));
            position += 1;
        }
    }

    /// Add a change, wrapping the first line as a bullet point.
    pub fn add_change<'a>(&mut self, change: impl IntoIterator<Item = &'a str>) {
        let mut lines = Vec::new();
        for (i, text) in change.into_iter().enumerate() {
            if i == 0 {
                lines.extend(wrap(text, INITIAL_INDENT));
            } else {
                lines.extend(wrap(text, &" ".repeat(INITIAL_INDENT.len())));
            }
        }
        self.add_change_lines(lines.iter().map(String::as_str));
    }
}

/// Contents of a `debian/changelog` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changelog {
    /// Lines preceding the first entry, verbatim.
    preamble: Vec<String>,
    blocks: Vec<ChangeBlock>,
}

impl Changelog {
    /// Iterate over the entries, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &ChangeBlock> + '_ {
        self.blocks.iter()
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the changelog has no entries.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The `index`th entry, newest first.
    pub fn block(&self, index: usize) -> Option<&ChangeBlock> {
        self.blocks.get(index)
    }

    /// Mutable access to the `index`th entry.
    pub fn block_mut(&mut self, index: usize) -> Option<&mut ChangeBlock> {
        self.blocks.get_mut(index)
    }

    /// Prepend a new entry.
    #[allow(clippy::too_many_arguments)]
    pub fn new_block<'a>(
        &mut self,
        package: &str,
        version: &Version,
        distributions: &str,
        urgency: &str,
        maintainer: &(String, String),
        timestamp: &DateTime<FixedOffset>,
        change: impl IntoIterator<Item = &'a str>,
    ) {
        let mut lines = vec![
            format!(
                "{} ({}) {}; urgency={}\n",
                package, version, distributions, urgency
            ),
            "\n".to_string(),
        ];
        let mut any_changes = false;
        for (i, text) in change.into_iter().enumerate() {
            let indent = if i == 0 {
                INITIAL_INDENT.to_string()
            } else {
                " ".repeat(INITIAL_INDENT.len())
            };
            for line in wrap(text, &indent) {
                lines.push(format!("{}\n", line));
                any_changes = true;
            }
        }
        if any_changes {
            lines.push("\n".to_string());
        }
        lines.push(format!(
            " -- {} <{}>  {}\n",
            maintainer.0,
            maintainer.1,
            format_datetime(timestamp)
        ));
        if !self.blocks.is_empty() {
            lines.push("\n".to_string());
        }
        self.blocks.insert(0, ChangeBlock { lines });
    }

    /// Add a change to the changelog.
    ///
    /// The change is appended to the topmost entry when it is still
    /// unreleased; otherwise a new `UNRELEASED` entry with an incremented
    /// version is started.
    pub fn add_entry<'a>(
        &mut self,
        change: impl IntoIterator<Item = &'a str>,
        maintainer: &(String, String),
        timestamp: &DateTime<FixedOffset>,
    ) {
        let start_new_block = match self.blocks.first() {
            Some(block) => !block.is_unreleased(),
            None => true,
        };
        if start_new_block {
            let package = self
                .blocks
                .first()
                .and_then(|block| block.package())
                .unwrap_or_else(|| "UNKNOWN".to_string());
            let version = self
                .blocks
                .first()
                .and_then(|block| block.version())
                .map(|version| increment_version(&version))
                .unwrap_or_else(|| Version {
                    epoch: None,
                    upstream_version: "1.0".to_string(),
                    debian_revision: Some("1".to_string()),
                });
            self.new_block(
                &package,
                &version,
                "UNRELEASED",
                "low",
                maintainer,
                timestamp,
                std::iter::empty(),
            );
        }
        self.blocks[0].add_change(change);
    }

    /// Update the topmost entry to a version, or start a new entry for it.
    pub fn auto_version(
        &mut self,
        version: &Version,
        maintainer: &(String, String),
        timestamp: &DateTime<FixedOffset>,
    ) {
        let update_in_place = self
            .blocks
            .first()
            .map(|block| block.is_unreleased())
            .unwrap_or(false);
        if update_in_place {
            if let Some(block) = self.blocks.first_mut() {
                block.set_version(version);
                block.set_date(&format_datetime(timestamp));
            }
            return;
        }
        let package = self
            .blocks
            .first()
            .and_then(|block| block.package())
            .unwrap_or_else(|| "UNKNOWN".to_string());
        self.new_block(
            &package,
            version,
            "UNRELEASED",
            "low",
            maintainer,
            timestamp,
            std::iter::empty(),
        );
    }

    /// Mark the topmost entry as released to a distribution.
    pub fn release(
        &mut self,
        distribution: &str,
        timestamp: &DateTime<FixedOffset>,
    ) -> bool {
        match self.blocks.first_mut() {
            Some(block) if block.is_unreleased() => {
                block.set_distributions(distribution);
                block.set_date(&format_datetime(timestamp));
                true
            }
            _ => false,
        }
    }

    /// The distribution of the most recent actual upload.
    pub fn find_last_distribution(&self) -> Option<String> {
        for block in &self.blocks {
            if let Some(distribution) = block.distributions().first() {
                if !distribution_is_unreleased(distribution) {
                    return Some(distribution.clone());
                }
            }
        }
        None
    }
}

impl FileFormat for Changelog {
    type Error = Infallible;

    fn from_text(text: &str) -> Result<Self, Self::Error> {
        let mut preamble = Vec::new();
        let mut blocks: Vec<ChangeBlock> = Vec::new();
        let mut rest = text;
        while !rest.is_empty() {
            let (line, remainder) = match rest.find('\n') {
                Some(position) => rest.split_at(position + 1),
                None => (rest, ""),
            };
            rest = remainder;
            if header_re().is_match(line.trim_end_matches('\n')) {
                blocks.push(ChangeBlock {
                    lines: vec![line.to_string()],
                });
            } else if let Some(block) = blocks.last_mut() {
                block.lines.push(line.to_string());
            } else {
                preamble.push(line.to_string());
            }
        }
        Ok(Changelog { preamble, blocks })
    }

    fn to_text(&self) -> Option<String> {
        let mut ret = String::new();
        for line in &self.preamble {
            ret.push_str(line);
        }
        for block in &self.blocks {
            for line in &block.lines {
                ret.push_str(line);
            }
        }
        Some(ret)
    }
}

/// Format-preserving editor for a `debian/changelog` file.
pub type ChangelogEditor = Editor<Changelog>;
