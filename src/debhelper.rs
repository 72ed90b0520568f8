//! Debhelper-related helpers: compat levels, debhelper build-dependencies
//! and `debian/maintscript` files.

use crate::reformatting::{Editor, FileFormat};
use crate::relations::{
    ensure_minimum_version, get_relation, parse_relations, LookupError, VersionConstraint,
};
use deb822_lossless::{Deb822, Paragraph};
use debversion::Version;
use std::convert::Infallible;
use std::io::ErrorKind;
use std::path::Path;

/// Error resolving or updating debhelper metadata.
#[derive(Debug)]
pub enum DebhelperError {
    /// A debhelper dependency was found in a field where it does not belong.
    CompatInWrongField {
        /// The offending field.
        field: String,
        /// The package that was found there.
        package: String,
    },
    /// A debhelper rule too complex to edit.
    ComplexRule(String),
    /// `debhelper-compat` without a version constraint.
    UnversionedCompat,
    /// A compat level that is not a number.
    InvalidCompatLevel(String),
    /// An I/O error reading compat metadata.
    Io(std::io::Error),
    /// A control file that could not be parsed.
    Parse(deb822_lossless::ParseError),
}

impl std::fmt::Display for DebhelperError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DebhelperError::CompatInWrongField { field, package } => {
                write!(f, "{} in {}", package, field)
            }
            DebhelperError::ComplexRule(package) => {
                write!(f, "complex rule for {}, aborting", package)
            }
            DebhelperError::UnversionedCompat => {
                write!(f, "debhelper-compat without version, aborting")
            }
            DebhelperError::InvalidCompatLevel(value) => {
                write!(f, "invalid compat level: {}", value)
            }
            DebhelperError::Io(err) => write!(f, "{}", err),
            DebhelperError::Parse(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for DebhelperError {}

impl From<std::io::Error> for DebhelperError {
    fn from(err: std::io::Error) -> Self {
        DebhelperError::Io(err)
    }
}

/// Ensure that the source paragraph build-depends on at least a particular
/// debhelper version.
///
/// debhelper can also be pulled in through a `debhelper-compat` dependency;
/// an adequate one means no change is needed.
///
/// Returns whether the paragraph was modified.
///
/// # Errors
/// [`DebhelperError::CompatInWrongField`] when debhelper dependencies occur
/// in `Build-Depends-Arch`/`Build-Depends-Indep`; [`DebhelperError`]
/// variants for debhelper-compat rules that cannot be interpreted.
pub fn ensure_minimum_debhelper_version(
    source: &mut Paragraph,
    minimum_version: &Version,
) -> Result<bool, DebhelperError> {
    for field in ["Build-Depends-Arch", "Build-Depends-Indep"] {
        let value = source.get(field).unwrap_or_default();
        for package in ["debhelper-compat", "debhelper"] {
            match get_relation(&value, package) {
                Ok(_) => {
                    return Err(DebhelperError::CompatInWrongField {
                        field: field.to_string(),
                        package: package.to_string(),
                    })
                }
                Err(LookupError::Complex(package)) => {
                    return Err(DebhelperError::ComplexRule(package))
                }
                Err(LookupError::NotFound(_)) => {}
            }
        }
    }
    let build_depends = source.get("Build-Depends").unwrap_or_default();
    match get_relation(&build_depends, "debhelper-compat") {
        Ok((_, relation)) => match &relation[0].version {
            None => return Err(DebhelperError::UnversionedCompat),
            Some((VersionConstraint::Equal, version)) => {
                if version >= minimum_version {
                    return Ok(false);
                }
            }
            Some(_) => {
                return Err(DebhelperError::ComplexRule("debhelper-compat".to_string()))
            }
        },
        Err(LookupError::Complex(package)) => return Err(DebhelperError::ComplexRule(package)),
        Err(LookupError::NotFound(_)) => {}
    }
    let new_build_depends = ensure_minimum_version(&build_depends, "debhelper", minimum_version);
    if source.get("Build-Depends").as_deref() != Some(new_build_depends.as_str()) {
        source.set("Build-Depends", &new_build_depends);
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Read a `debian/compat` file.
pub fn read_debhelper_compat_file(path: &Path) -> Result<u32, DebhelperError> {
    let contents = std::fs::read_to_string(path)?;
    let line = contents.lines().next().unwrap_or("");
    let level = line.split('#').next().unwrap_or("").trim();
    level
        .parse()
        .map_err(|_| DebhelperError::InvalidCompatLevel(level.to_string()))
}

/// Get the debhelper compat level from a source paragraph.
///
/// Looks at `X-DH-Compat` first, then at the `debhelper-compat`
/// build-dependency.
pub fn get_debhelper_compat_level_from_control(
    control: &Paragraph,
) -> Result<Option<u32>, DebhelperError> {
    if let Some(value) = control.get("X-DH-Compat").filter(|v| !v.is_empty()) {
        return value
            .parse()
            .map(Some)
            .map_err(|_| DebhelperError::InvalidCompatLevel(value));
    }
    let build_depends = control.get("Build-Depends").unwrap_or_default();
    match get_relation(&build_depends, "debhelper-compat") {
        Ok((_, relation)) => match &relation[0].version {
            None => Ok(None),
            Some((_, version)) => {
                let value = version.to_string();
                value
                    .parse()
                    .map(Some)
                    .map_err(|_| DebhelperError::InvalidCompatLevel(value))
            }
        },
        Err(LookupError::Complex(package)) => Err(DebhelperError::ComplexRule(package)),
        Err(LookupError::NotFound(_)) => Ok(None),
    }
}

/// Get the debhelper compat level for the package in `path`, from
/// `debian/compat` or from `debian/control`.
pub fn get_debhelper_compat_level(path: &Path) -> Result<Option<u32>, DebhelperError> {
    match read_debhelper_compat_file(&path.join("debian/compat")) {
        Ok(level) => return Ok(Some(level)),
        Err(DebhelperError::Io(err)) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    let control = match Deb822::from_file(path.join("debian/control")) {
        Ok(control) => control,
        Err(deb822_lossless::Error::IoError(err)) if err.kind() == ErrorKind::NotFound => {
            return Ok(None)
        }
        Err(deb822_lossless::Error::IoError(err)) => return Err(err.into()),
        Err(deb822_lossless::Error::ParseError(err)) => return Err(DebhelperError::Parse(err)),
        Err(deb822_lossless::Error::InvalidValue(err)) => {
            return Err(DebhelperError::Parse(deb822_lossless::ParseError(vec![err])))
        }
    };
    match control.paragraphs().next() {
        Some(paragraph) => get_debhelper_compat_level_from_control(&paragraph),
        None => Ok(None),
    }
}

/// The dh sequences pulled in through `dh-sequence-*` build-dependencies.
pub fn dh_sequences(build_depends: &str) -> Vec<String> {
    let mut ret = Vec::new();
    for entry in parse_relations(build_depends) {
        for relation in &entry.alternatives {
            if let Some(sequence) = relation.name.strip_prefix("dh-sequence-") {
                ret.push(sequence.to_string());
            }
        }
    }
    ret
}

/// A typed entry in a `debian/maintscript` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaintscriptEntry {
    /// `supports <command>`
    Supports {
        /// Command to check support for.
        command: String,
    },
    /// `rm_conffile <conffile> [<prior-version> [<package>]]`
    RmConffile {
        /// Conffile to remove.
        conffile: String,
        /// Version before which to act.
        prior_version: Option<Version>,
        /// Owning package.
        package: Option<String>,
    },
    /// `mv_conffile <old> <new> [<prior-version> [<package>]]`
    MvConffile {
        /// Old conffile path.
        old_conffile: String,
        /// New conffile path.
        new_conffile: String,
        /// Version before which to act.
        prior_version: Option<Version>,
        /// Owning package.
        package: Option<String>,
    },
    /// `symlink_to_dir <pathname> <old-target> [<prior-version> [<package>]]`
    SymlinkToDir {
        /// Path that becomes a directory.
        pathname: String,
        /// Previous symlink target.
        old_target: String,
        /// Version before which to act.
        prior_version: Option<Version>,
        /// Owning package.
        package: Option<String>,
    },
    /// `dir_to_symlink <pathname> <new-target> [<prior-version> [<package>]]`
    DirToSymlink {
        /// Path that becomes a symlink.
        pathname: String,
        /// New symlink target.
        new_target: String,
        /// Version before which to act.
        prior_version: Option<Version>,
        /// Owning package.
        package: Option<String>,
    },
}

impl MaintscriptEntry {
    /// The entry as dh_installdeb arguments.
    pub fn args(&self) -> Vec<String> {
        fn push_trailer(ret: &mut Vec<String>, prior_version: &Option<Version>, package: &Option<String>) {
            if let Some(prior_version) = prior_version {
                ret.push(prior_version.to_string());
                if let Some(package) = package {
                    ret.push(package.clone());
                }
            }
        }
        match self {
            MaintscriptEntry::Supports { command } => {
                vec!["supports".to_string(), command.clone()]
            }
            MaintscriptEntry::RmConffile {
                conffile,
                prior_version,
                package,
            } => {
                let mut ret = vec!["rm_conffile".to_string(), conffile.clone()];
                push_trailer(&mut ret, prior_version, package);
                ret
            }
            MaintscriptEntry::MvConffile {
                old_conffile,
                new_conffile,
                prior_version,
                package,
            } => {
                let mut ret = vec![
                    "mv_conffile".to_string(),
                    old_conffile.clone(),
                    new_conffile.clone(),
                ];
                push_trailer(&mut ret, prior_version, package);
                ret
            }
            MaintscriptEntry::SymlinkToDir {
                pathname,
                old_target,
                prior_version,
                package,
            } => {
                let mut ret = vec![
                    "symlink_to_dir".to_string(),
                    pathname.clone(),
                    old_target.clone(),
                ];
                push_trailer(&mut ret, prior_version, package);
                ret
            }
            MaintscriptEntry::DirToSymlink {
                pathname,
                new_target,
                prior_version,
                package,
            } => {
                let mut ret = vec![
                    "dir_to_symlink".to_string(),
                    pathname.clone(),
                    new_target.clone(),
                ];
                push_trailer(&mut ret, prior_version, package);
                ret
            }
        }
    }
}

fn parse_trailer(args: &[&str]) -> Option<(Option<Version>, Option<String>)> {
    match args {
        [] => Some((None, None)),
        [version] => Some((Some(version.parse().ok()?), None)),
        [version, package] => Some((
            Some(version.parse().ok()?),
            Some(package.to_string()),
        )),
        _ => None,
    }
}

/// Parse a maintscript line into a typed entry; `None` when the line does
/// not follow a known form.
pub fn parse_maintscript_line(line: &str) -> Option<MaintscriptEntry> {
    let args: Vec<&str> = line.split_whitespace().collect();
    match args.as_slice() {
        ["supports", command] => Some(MaintscriptEntry::Supports {
            command: command.to_string(),
        }),
        ["rm_conffile", conffile, rest @ ..] => {
            let (prior_version, package) = parse_trailer(rest)?;
            Some(MaintscriptEntry::RmConffile {
                conffile: conffile.to_string(),
                prior_version,
                package,
            })
        }
        ["mv_conffile", old_conffile, new_conffile, rest @ ..] => {
            let (prior_version, package) = parse_trailer(rest)?;
            Some(MaintscriptEntry::MvConffile {
                old_conffile: old_conffile.to_string(),
                new_conffile: new_conffile.to_string(),
                prior_version,
                package,
            })
        }
        ["symlink_to_dir", pathname, old_target, rest @ ..] => {
            let (prior_version, package) = parse_trailer(rest)?;
            Some(MaintscriptEntry::SymlinkToDir {
                pathname: pathname.to_string(),
                old_target: old_target.to_string(),
                prior_version,
                package,
            })
        }
        ["dir_to_symlink", pathname, new_target, rest @ ..] => {
            let (prior_version, package) = parse_trailer(rest)?;
            Some(MaintscriptEntry::DirToSymlink {
                pathname: pathname.to_string(),
                new_target: new_target.to_string(),
                prior_version,
                package,
            })
        }
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MaintscriptLine {
    /// A comment, blank or unrecognized line, without its line ending.
    Verbatim(String),
    Entry(MaintscriptEntry),
}

/// Contents of a `debian/maintscript` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Maintscript {
    lines: Vec<MaintscriptLine>,
}

impl Maintscript {
    /// The typed entries, skipping comments.
    pub fn entries(&self) -> Vec<&MaintscriptEntry> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                MaintscriptLine::Entry(entry) => Some(entry),
                MaintscriptLine::Verbatim(_) => None,
            })
            .collect()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Append an entry.
    pub fn append(&mut self, entry: MaintscriptEntry) {
        self.lines.push(MaintscriptLine::Entry(entry));
    }

    /// Remove the `index`th entry (comments not counted).
    ///
    /// Returns the removed entry, or `None` when out of range.
    pub fn remove_entry(&mut self, index: usize) -> Option<MaintscriptEntry> {
        let position = self
            .lines
            .iter()
            .enumerate()
            .filter(|(_, line)| matches!(line, MaintscriptLine::Entry(_)))
            .nth(index)
            .map(|(i, _)| i)?;
        match self.lines.remove(position) {
            MaintscriptLine::Entry(entry) => Some(entry),
            MaintscriptLine::Verbatim(_) => None,
        }
    }
}

impl FileFormat for Maintscript {
    type Error = Infallible;

    fn from_text(text: &str) -> Result<Self, Self::Error> {
        let mut lines = Vec::new();
        for line in text.lines() {
            if line.starts_with('#') || line.trim().is_empty() {
                lines.push(MaintscriptLine::Verbatim(line.to_string()));
            } else {
                match parse_maintscript_line(line) {
                    Some(entry) => lines.push(MaintscriptLine::Entry(entry)),
                    None => lines.push(MaintscriptLine::Verbatim(line.to_string())),
                }
            }
        }
        Ok(Maintscript { lines })
    }

    fn to_text(&self) -> Option<String> {
        if self.lines.is_empty() {
            return None;
        }
        let mut ret = String::new();
        for line in &self.lines {
            match line {
                MaintscriptLine::Verbatim(text) => ret.push_str(text),
                MaintscriptLine::Entry(entry) => ret.push_str(&entry.args().join(" ")),
            }
            ret.push('\n');
        }
        Some(ret)
    }

    fn missing() -> Option<Self> {
        Some(Maintscript::default())
    }
}

/// Format-preserving editor for a `debian/maintscript` file.
pub type MaintscriptEditor = Editor<Maintscript>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn source_paragraph(text: &str) -> Paragraph {
        Deb822::from_str(text).unwrap().paragraphs().next().unwrap()
    }

    #[test]
    fn test_ensure_minimum_debhelper_version() {
        let mut source = source_paragraph("Source: blah\nBuild-Depends: debhelper (>= 9)\n");
        assert!(
            ensure_minimum_debhelper_version(&mut source, &"12".parse().unwrap()).unwrap()
        );
        assert_eq!(
            source.get("Build-Depends").as_deref(),
            Some("debhelper (>= 12)")
        );
    }

    #[test]
    fn test_ensure_minimum_debhelper_version_already_adequate() {
        let mut source = source_paragraph("Source: blah\nBuild-Depends: debhelper (>= 12)\n");
        assert!(
            !ensure_minimum_debhelper_version(&mut source, &"12".parse().unwrap()).unwrap()
        );
    }

    #[test]
    fn test_ensure_minimum_debhelper_version_compat_satisfies() {
        let mut source =
            source_paragraph("Source: blah\nBuild-Depends: debhelper-compat (= 13)\n");
        assert!(
            !ensure_minimum_debhelper_version(&mut source, &"12".parse().unwrap()).unwrap()
        );
        assert_eq!(
            source.get("Build-Depends").as_deref(),
            Some("debhelper-compat (= 13)")
        );
    }

    #[test]
    fn test_ensure_minimum_debhelper_version_compat_too_old() {
        let mut source =
            source_paragraph("Source: blah\nBuild-Depends: debhelper-compat (= 9)\n");
        assert!(
            ensure_minimum_debhelper_version(&mut source, &"12".parse().unwrap()).unwrap()
        );
        assert_eq!(
            source.get("Build-Depends").as_deref(),
            Some("debhelper-compat (= 9), debhelper (>= 12)")
        );
    }

    #[test]
    fn test_ensure_minimum_debhelper_version_complex_compat() {
        let mut source = source_paragraph(
            "Source: blah\nBuild-Depends: debhelper-compat (= 13) | debhelper (>= 13)\n",
        );
        let err =
            ensure_minimum_debhelper_version(&mut source, &"12".parse().unwrap()).unwrap_err();
        assert!(matches!(err, DebhelperError::ComplexRule(_)));
    }

    #[test]
    fn test_ensure_minimum_debhelper_version_wrong_field() {
        let mut source = source_paragraph(
            "Source: blah\nBuild-Depends-Indep: debhelper (>= 9)\n",
        );
        let err =
            ensure_minimum_debhelper_version(&mut source, &"12".parse().unwrap()).unwrap_err();
        assert!(matches!(err, DebhelperError::CompatInWrongField { .. }));
    }

    #[test]
    fn test_compat_level_from_control() {
        let paragraph =
            source_paragraph("Source: blah\nBuild-Depends: debhelper-compat (= 13)\n");
        assert_eq!(
            get_debhelper_compat_level_from_control(&paragraph).unwrap(),
            Some(13)
        );
        let paragraph = source_paragraph("Source: blah\nX-DH-Compat: 14\n");
        assert_eq!(
            get_debhelper_compat_level_from_control(&paragraph).unwrap(),
            Some(14)
        );
        let paragraph = source_paragraph("Source: blah\n");
        assert_eq!(get_debhelper_compat_level_from_control(&paragraph).unwrap(), None);
    }

    #[test]
    fn test_get_debhelper_compat_level_from_compat_file() {
        let td = tempfile::tempdir().unwrap();
        std::fs::create_dir(td.path().join("debian")).unwrap();
        std::fs::write(td.path().join("debian/compat"), "10\n").unwrap();
        assert_eq!(get_debhelper_compat_level(td.path()).unwrap(), Some(10));
    }

    #[test]
    fn test_get_debhelper_compat_level_missing() {
        let td = tempfile::tempdir().unwrap();
        assert_eq!(get_debhelper_compat_level(td.path()).unwrap(), None);
    }

    #[test]
    fn test_dh_sequences() {
        assert_eq!(
            dh_sequences("debhelper-compat (= 13), dh-sequence-python3, dh-sequence-sphinxdoc"),
            vec!["python3".to_string(), "sphinxdoc".to_string()]
        );
        assert!(dh_sequences("debhelper (>= 9)").is_empty());
    }

    #[test]
    fn test_parse_maintscript_line() {
        assert_eq!(
            parse_maintscript_line("rm_conffile /etc/blah.conf 1.0-1 blah"),
            Some(MaintscriptEntry::RmConffile {
                conffile: "/etc/blah.conf".to_string(),
                prior_version: Some(Version::from_str("1.0-1").unwrap()),
                package: Some("blah".to_string()),
            })
        );
        assert_eq!(
            parse_maintscript_line("supports preinst"),
            Some(MaintscriptEntry::Supports {
                command: "preinst".to_string(),
            })
        );
        assert_eq!(parse_maintscript_line("frob /etc/blah.conf"), None);
    }

    #[test]
    fn test_maintscript_round_trip() {
        let text = "# remove obsolete conffile\nrm_conffile /etc/blah.conf 1.0-1 blah\n";
        let maintscript = Maintscript::from_text(text).unwrap();
        assert_eq!(maintscript.to_text().as_deref(), Some(text));
        assert_eq!(maintscript.entries().len(), 1);
    }

    #[test]
    fn test_maintscript_editor_delete_on_last_entry_removed() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("maintscript");
        std::fs::write(&path, "rm_conffile /etc/blah.conf\n").unwrap();
        let mut editor = MaintscriptEditor::open(&path).unwrap();
        assert!(editor.remove_entry(0).is_some());
        assert!(editor.commit().unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_maintscript_editor_append() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("maintscript");
        let mut editor = MaintscriptEditor::open(&path).unwrap();
        editor.append(MaintscriptEntry::MvConffile {
            old_conffile: "/etc/old.conf".to_string(),
            new_conffile: "/etc/new.conf".to_string(),
            prior_version: Some("2.0-1".parse().unwrap()),
            package: None,
        });
        assert!(editor.commit().unwrap());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "mv_conffile /etc/old.conf /etc/new.conf 2.0-1\n"
        );
    }
}
