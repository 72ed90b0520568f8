//! Editing of quilt patch series under `debian/patches/`.

use crate::reformatting::{Editor, FileFormat};
use std::collections::HashMap;
use std::convert::Infallible;
use std::path::Path;

/// Default location of the quilt patch directory.
pub const DEFAULT_DEBIAN_PATCHES_DIR: &str = "debian/patches";

/// One entry in a quilt series file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuiltSeriesEntry {
    /// Patch file name.
    pub name: String,
    /// Whether the entry is commented out.
    pub quoted: bool,
    /// Options (such as `-p1`) that follow the patch name.
    pub options: Vec<String>,
}

/// Parse a single series line; `None` for blank lines.
pub fn parse_quilt_series_line(line: &str) -> Option<QuiltSeriesEntry> {
    let (quoted, line) = match line.split_once('#') {
        // only the text up to any second '#' counts
        Some((before, after)) if before.trim().is_empty() => {
            (true, after.split('#').next().unwrap_or("").trim())
        }
        _ => (false, line),
    };
    let mut args = line.split_whitespace();
    let name = args.next()?.to_string();
    Some(QuiltSeriesEntry {
        name,
        quoted,
        options: args.map(ToString::to_string).collect(),
    })
}

/// Contents of a quilt series file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuiltSeries {
    /// The entries, in application order.
    pub entries: Vec<QuiltSeriesEntry>,
}

impl QuiltSeries {
    /// Iterate over the names of the patches that are actually applied
    /// (not commented out).
    pub fn patches(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries
            .iter()
            .filter(|entry| !entry.quoted)
            .map(|entry| entry.name.as_str())
    }

    /// Check whether the series contains a patch.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry.name == name)
    }

    /// Append a patch to the series.
    pub fn append(&mut self, name: &str, options: Vec<String>) {
        self.entries.push(QuiltSeriesEntry {
            name: name.to_string(),
            quoted: false,
            options,
        });
    }

    /// Remove a patch from the series.
    ///
    /// Returns whether the patch was present.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.entries.iter().position(|entry| entry.name == name) {
            Some(i) => {
                self.entries.remove(i);
                true
            }
            None => false,
        }
    }
}

impl FileFormat for QuiltSeries {
    type Error = Infallible;

    fn from_text(text: &str) -> Result<Self, Self::Error> {
        Ok(QuiltSeries {
            entries: text.lines().filter_map(parse_quilt_series_line).collect(),
        })
    }

    fn to_text(&self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        let mut ret = String::new();
        for entry in &self.entries {
            if entry.quoted {
                ret.push_str("# ");
            }
            ret.push_str(&entry.name);
            for option in &entry.options {
                ret.push(' ');
                ret.push_str(option);
            }
            ret.push('\n');
        }
        Some(ret)
    }

    fn missing() -> Option<Self> {
        Some(QuiltSeries::default())
    }
}

/// Format-preserving editor for a `debian/patches/series` file.
pub type QuiltSeriesEditor = Editor<QuiltSeries>;

/// Find the patch suffix most commonly used in a patch directory listing.
///
/// `series`, `00list` and `README*` entries are ignored.
pub fn find_common_patch_suffix<'a>(
    names: impl Iterator<Item = &'a str>,
    default: &str,
) -> String {
    let mut suffix_count: HashMap<String, usize> = HashMap::new();
    for name in names {
        if name == "series" || name == "00list" || name.starts_with("README") {
            continue;
        }
        let suffix = match Path::new(name).extension() {
            Some(extension) => format!(".{}", extension.to_string_lossy()),
            None => String::new(),
        };
        *suffix_count.entry(suffix).or_default() += 1;
    }
    suffix_count
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(suffix, _)| suffix)
        .unwrap_or_else(|| default.to_string())
}
