//! Editing of `debian/control` files.
//!
//! [`ControlEditor`] wraps the deb822 editor with control-specific helpers
//! (source/binary paragraph access, binary sorting) and with handling for
//! generated control files: when `debian/control` turns out to be built from
//! a `control.in`/`control.m4` template, the recorded field changes are
//! applied to the template instead, and the caller is told which
//! regeneration step still needs to run. Running that step (`./debian/rules
//! debian/control`, `dh_gnome_clean`, `pg_buildext updatecontrol`) is up to
//! the caller.

use crate::deb822::{ChangeConflict, Deb822Editor, Deb822EditorOptions, FieldChanges};
use crate::reformatting::{EditorError, GeneratedFile};
use crate::relations::{
    add_dependency, drop_dependency, ensure_relation, get_relation, is_relation_implied,
    iter_relations, parse_relations, LookupError, PkgRelation, RelationError,
};
use deb822_lossless::{Deb822, Paragraph};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Kind of template a control file is generated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateType {
    /// Generated by a target in `debian/rules`.
    Rules,
    /// Generated by the GNOME team tooling (`dh_gnome_clean`).
    Gnome,
    /// Generated by cdbs at build time; the control file itself is editable.
    Cdbs,
    /// Generated by `pg_buildext updatecontrol`.
    Postgresql,
    /// The "template" is a directory; not something we can edit.
    Directory,
    /// Generated by debcargo from `debcargo.toml`.
    Debcargo,
}

impl std::fmt::Display for TemplateType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            TemplateType::Rules => "rules",
            TemplateType::Gnome => "gnome",
            TemplateType::Cdbs => "cdbs",
            TemplateType::Postgresql => "postgresql",
            TemplateType::Directory => "directory",
            TemplateType::Debcargo => "debcargo",
        })
    }
}

/// A template regeneration step that the caller still needs to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateExpansion {
    /// The template that was updated.
    pub template_path: PathBuf,
    /// The kind of template; determines the regeneration command.
    pub template_type: TemplateType,
}

/// Result of committing a [`ControlEditor`] session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlOutcome {
    /// Whether anything was written.
    pub changed: bool,
    /// The files that were modified.
    pub changed_files: Vec<PathBuf>,
    /// Regeneration still required to bring the control file in sync with
    /// its template.
    pub pending_expansion: Option<TemplateExpansion>,
}

/// Error editing a control file.
#[derive(Debug)]
pub enum ControlError {
    /// Error from the underlying editor.
    Editor(EditorError),
    /// A change could not be applied to the template.
    Conflict(ChangeConflict),
    /// The first paragraph is not a source paragraph.
    MissingSourceParagraph,
}

impl std::fmt::Display for ControlError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ControlError::Editor(err) => write!(f, "{}", err),
            ControlError::Conflict(err) => write!(f, "{}", err),
            ControlError::MissingSourceParagraph => {
                write!(f, "the first paragraph is not a Source paragraph")
            }
        }
    }
}

impl std::error::Error for ControlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ControlError::Editor(err) => Some(err),
            ControlError::Conflict(err) => Some(err),
            ControlError::MissingSourceParagraph => None,
        }
    }
}

impl From<EditorError> for ControlError {
    fn from(err: EditorError) -> Self {
        ControlError::Editor(err)
    }
}

impl From<ChangeConflict> for ControlError {
    fn from(err: ChangeConflict) -> Self {
        ControlError::Conflict(err)
    }
}

/// Find the template a path would be generated from, if one exists.
pub fn find_template_path(path: &Path) -> Option<PathBuf> {
    for ext in [".in", ".m4"] {
        let mut template = path.as_os_str().to_owned();
        template.push(ext);
        let template = PathBuf::from(template);
        if template.exists() {
            return Some(template);
        }
    }
    None
}

/// Guess the kind of a control template.
///
/// `debian_path` is the `debian/` directory, used to look at `rules` and
/// `debcargo.toml`.
pub fn guess_template_type(
    template_path: &Path,
    debian_path: Option<&Path>,
) -> Option<TemplateType> {
    if let Some(debian_path) = debian_path {
        if let Ok(rules) = std::fs::read(debian_path.join("rules")) {
            for line in rules.split(|&b| b == b'\n') {
                if line.starts_with(b"debian/control:")
                    || line.starts_with(b"debian/%: debian/%.in")
                    || line.starts_with(b"include /usr/share/blends-dev/rules")
                {
                    return Some(TemplateType::Rules);
                }
            }
        }
    }
    if template_path.is_dir() {
        return Some(TemplateType::Directory);
    }
    if let Ok(template) = std::fs::read_to_string(template_path) {
        if template.contains("@GNOME_TEAM@") {
            return Some(TemplateType::Gnome);
        }
        if template.contains("@cdbs@") {
            return Some(TemplateType::Cdbs);
        }
        if template.contains("PGVERSION") {
            return Some(TemplateType::Postgresql);
        }
        let (deb822, _errors) = Deb822::from_str_relaxed(&template);
        if let Some(paragraph) = deb822.paragraphs().next() {
            let build_depends = paragraph.get("Build-Depends").unwrap_or_default();
            if !iter_relations(&build_depends, "gnome-pkg-tools").is_empty() {
                return Some(TemplateType::Gnome);
            }
            if !iter_relations(&build_depends, "cdbs").is_empty() {
                return Some(TemplateType::Cdbs);
            }
        }
    }
    if let Some(debian_path) = debian_path {
        if debian_path.join("debcargo.toml").exists() {
            return Some(TemplateType::Debcargo);
        }
    }
    None
}

/// Conflict resolver for cdbs templates.
///
/// cdbs templates carry a `@cdbs@` macro in their Build-Depends, so the
/// recorded old value never matches. Additions to the real control file are
/// grafted onto the template value instead, relation by relation.
pub fn resolve_cdbs_conflict(
    para_key: &(String, String),
    field: &str,
    actual_old_value: Option<&str>,
    template_old_value: Option<&str>,
    actual_new_value: Option<&str>,
) -> Result<Option<String>, ChangeConflict> {
    if para_key.0 == "Source" && field == "Build-Depends" {
        if let (Some(old), Some(template_old), Some(new)) =
            (actual_old_value, template_old_value, actual_new_value)
        {
            if new.contains(old) {
                // a simple addition to the existing list
                return Ok(Some(new.replace(old, template_old)));
            }
            let existing = parse_relations(old);
            let mut ret = template_old.to_string();
            for entry in parse_relations(new) {
                if entry.alternatives.is_empty() {
                    continue;
                }
                let already_implied = existing.iter().any(|e| {
                    !e.alternatives.is_empty()
                        && is_relation_implied(&entry.alternatives, &e.alternatives)
                });
                if already_implied {
                    continue;
                }
                ret = ensure_relation(&ret, entry.alternatives);
            }
            return Ok(Some(ret));
        }
    }
    Err(ChangeConflict {
        paragraph_key: para_key.clone(),
        field: field.to_string(),
        expected_old_value: actual_old_value.map(ToString::to_string),
        actual_old_value: template_old_value.map(ToString::to_string),
        new_value: actual_new_value.map(ToString::to_string),
    })
}

fn update_control_template(
    template_path: &Path,
    path: &Path,
    changes: FieldChanges,
) -> Result<ControlOutcome, ControlError> {
    let template_type = guess_template_type(template_path, path.parent());
    let template_type = match template_type {
        None | Some(TemplateType::Directory) => {
            return Err(EditorError::GeneratedFile(GeneratedFile {
                path: path.to_path_buf(),
                template_path: Some(template_path.to_path_buf()),
                template_type: None,
            })
            .into())
        }
        Some(template_type) => template_type,
    };
    let mut template_editor = Deb822Editor::open_with(
        template_path,
        Deb822EditorOptions {
            accept_files_with_error_tokens: true,
            ..Deb822EditorOptions::default()
        },
    )?;
    if template_type == TemplateType::Cdbs {
        template_editor.apply_changes_with(changes.clone(), resolve_cdbs_conflict)?;
    } else {
        template_editor.apply_changes(changes.clone())?;
    }
    if !template_editor.commit()? {
        return Ok(ControlOutcome {
            changed: false,
            changed_files: vec![],
            pending_expansion: None,
        });
    }
    let changed_files = vec![template_path.to_path_buf(), path.to_path_buf()];
    if template_type == TemplateType::Cdbs {
        // cdbs expands the template at build time; the output file can be
        // updated in place.
        let mut output_editor = Deb822Editor::open_with(
            path,
            Deb822EditorOptions {
                allow_generated: true,
                ..Deb822EditorOptions::default()
            },
        )?;
        output_editor.apply_changes(changes)?;
        output_editor.commit()?;
        Ok(ControlOutcome {
            changed: true,
            changed_files,
            pending_expansion: None,
        })
    } else {
        Ok(ControlOutcome {
            changed: true,
            changed_files,
            pending_expansion: Some(TemplateExpansion {
                template_path: template_path.to_path_buf(),
                template_type,
            }),
        })
    }
}

/// Options controlling a [`ControlEditor`] session.
#[derive(Debug, Clone, Default)]
pub struct ControlEditorOptions {
    /// Permit writes that lose the original formatting.
    pub allow_reformatting: bool,
    /// Start from an empty file when the path does not exist.
    pub allow_missing: bool,
}

/// Format-preserving editor for `debian/control`.
#[derive(Debug)]
pub struct ControlEditor {
    path: PathBuf,
    primary: Deb822Editor,
    /// Packages whose Description field was not the last field when the file
    /// was opened; everyone else gets Description kept last.
    description_not_last: HashSet<String>,
}

impl ControlEditor {
    /// Open a control file for editing.
    ///
    /// # Errors
    /// When the control file does not exist but a template does, this fails
    /// with [`EditorError::GeneratedFile`] naming the template; expanding the
    /// template is the caller's job.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ControlError> {
        Self::open_with(path, ControlEditorOptions::default())
    }

    /// Open a control file for editing with explicit options.
    pub fn open_with(
        path: impl AsRef<Path>,
        options: ControlEditorOptions,
    ) -> Result<Self, ControlError> {
        let path = path.as_ref().to_path_buf();
        let primary = match Deb822Editor::open_with(
            &path,
            Deb822EditorOptions {
                allow_reformatting: options.allow_reformatting,
                allow_missing: options.allow_missing,
                ..Deb822EditorOptions::default()
            },
        ) {
            Ok(primary) => primary,
            Err(EditorError::Io(err)) if err.kind() == ErrorKind::NotFound => {
                if let Some(template_path) = find_template_path(&path) {
                    let template_type = guess_template_type(&template_path, path.parent());
                    return Err(EditorError::GeneratedFile(GeneratedFile {
                        path,
                        template_path: Some(template_path),
                        template_type: template_type.map(|t| t.to_string()),
                    })
                    .into());
                }
                return Err(EditorError::Io(err).into());
            }
            Err(err) => return Err(err.into()),
        };
        let mut description_not_last = HashSet::new();
        for paragraph in primary.paragraphs() {
            let package = match paragraph.get("Package") {
                Some(package) => package,
                None => continue,
            };
            if paragraph.keys().last().as_deref() != Some("Description") {
                description_not_last.insert(package);
            }
        }
        Ok(ControlEditor {
            path,
            primary,
            description_not_last,
        })
    }

    /// Open a control file, creating it if missing.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, ControlError> {
        Self::open_with(
            path,
            ControlEditorOptions {
                allow_reformatting: true,
                allow_missing: true,
            },
        )
    }

    /// Path of the control file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Iterate over all paragraphs.
    pub fn paragraphs(&self) -> impl Iterator<Item = Paragraph> {
        self.primary.paragraphs()
    }

    /// The source paragraph, created empty if the file has none.
    ///
    /// # Errors
    /// [`ControlError::MissingSourceParagraph`] when the first paragraph
    /// exists but is not a source paragraph.
    pub fn source(&mut self) -> Result<Paragraph, ControlError> {
        match self.primary.paragraphs().next() {
            Some(paragraph) => {
                if paragraph.get("Source").filter(|s| !s.is_empty()).is_some() {
                    Ok(paragraph)
                } else {
                    Err(ControlError::MissingSourceParagraph)
                }
            }
            None => Ok(self.primary.deb822.insert_paragraph(0)),
        }
    }

    /// Iterate over the binary package paragraphs.
    pub fn binaries(&self) -> impl Iterator<Item = Paragraph> {
        self.primary
            .paragraphs()
            .filter(|paragraph| paragraph.get("Package").is_some())
    }

    /// Append a new binary package paragraph.
    pub fn add_binary(&mut self, fields: &[(&str, &str)]) -> Paragraph {
        let mut paragraph = self.primary.deb822.add_paragraph();
        for (key, value) in fields {
            paragraph.set(key, value);
        }
        paragraph
    }

    /// Sort the binary package paragraphs by name.
    pub fn sort_binary_packages(&mut self, keep_first: bool) {
        let skip = 1 + usize::from(keep_first);
        let mut names: Vec<Option<String>> = self
            .primary
            .paragraphs()
            .map(|paragraph| paragraph.get("Package"))
            .collect();
        for i in skip..names.len() {
            let mut min = i;
            for j in i + 1..names.len() {
                if names[j] < names[min] {
                    min = j;
                }
            }
            if min != i {
                self.primary.deb822.swap_paragraphs(i, min);
                names.swap(i, min);
            }
        }
    }

    /// Check if any changes have been made so far.
    pub fn has_changed(&self) -> bool {
        self.primary.has_changed()
    }

    /// Field-level changes made so far, relative to the file as opened.
    pub fn changes(&self) -> FieldChanges {
        let orig = match self.primary.orig_content() {
            Some(content) => Deb822::from_str_relaxed(content).0,
            None => Deb822::new(),
        };
        let orig_by_key = paragraphs_by_key(orig.paragraphs());
        let new_by_key = paragraphs_by_key(self.primary.paragraphs());
        let mut keys: Vec<&(String, String)> =
            orig_by_key.keys().chain(new_by_key.keys()).collect::<HashSet<_>>().into_iter().collect();
        keys.sort();
        let mut changes = FieldChanges::new();
        for key in keys {
            let old = orig_by_key.get(key);
            let new = new_by_key.get(key);
            if old == new {
                continue;
            }
            let mut fields: Vec<&str> = old
                .map(|fields| fields.iter().map(|(k, _)| k.as_str()).collect())
                .unwrap_or_default();
            for (field, _) in new.into_iter().flatten() {
                if !fields.contains(&field.as_str()) {
                    fields.push(field);
                }
            }
            for field in fields {
                let old_value = old.and_then(|fields| field_value(fields, field));
                let new_value = new.and_then(|fields| field_value(fields, field));
                if old_value != new_value {
                    changes.entry(key.clone()).or_default().push((
                        field.to_string(),
                        old_value.map(ToString::to_string),
                        new_value.map(ToString::to_string),
                    ));
                }
            }
        }
        changes
    }

    fn restore_description_order(&mut self) {
        let mut paragraphs: Vec<Paragraph> = self.primary.paragraphs().collect();
        for paragraph in paragraphs.iter_mut() {
            let package = match paragraph.get("Package") {
                Some(package) => package,
                None => continue,
            };
            if self.description_not_last.contains(&package) {
                continue;
            }
            if paragraph.keys().last().as_deref() == Some("Description") {
                continue;
            }
            if let Some(description) = paragraph.get("Description") {
                paragraph.remove("Description");
                paragraph.insert("Description", &description);
            }
        }
    }

    /// Reconcile the session against the file on disk, redirecting to the
    /// control template when the file is generated.
    ///
    /// # Errors
    /// [`EditorError::GeneratedFile`] (wrapped) when the file is generated
    /// and no usable template was found; other editor errors pass through.
    pub fn commit(mut self) -> Result<ControlOutcome, ControlError> {
        self.restore_description_order();
        let path = self.path.clone();
        let changes = self.changes();
        match self.primary.commit() {
            Ok(changed) => Ok(ControlOutcome {
                changed,
                changed_files: if changed { vec![path] } else { vec![] },
                pending_expansion: None,
            }),
            Err(EditorError::GeneratedFile(generated)) => {
                let template_path = match &generated.template_path {
                    Some(template_path) => template_path.clone(),
                    None => return Err(EditorError::GeneratedFile(generated).into()),
                };
                update_control_template(&template_path, &path, changes)
            }
            Err(err) => Err(err.into()),
        }
    }
}

type FieldList = Vec<(String, String)>;

fn field_value<'a>(fields: &'a [(String, String)], name: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn paragraphs_by_key(
    paragraphs: impl Iterator<Item = Paragraph>,
) -> std::collections::HashMap<(String, String), FieldList> {
    let mut ret = std::collections::HashMap::new();
    for paragraph in paragraphs {
        let fields: FieldList = paragraph.items().collect();
        if fields.is_empty() {
            continue;
        }
        let key = if let Some(name) = paragraph.get("Source") {
            ("Source".to_string(), name)
        } else if let Some(name) = paragraph.get("Package") {
            ("Package".to_string(), name)
        } else {
            continue;
        };
        ret.insert(key, fields);
    }
    ret
}

/// Run callbacks over the source and binary paragraphs of a control file and
/// commit the result.
pub fn update_control(
    path: impl AsRef<Path>,
    mut source_cb: impl FnMut(&mut Paragraph),
    mut binary_cb: impl FnMut(&mut Paragraph),
) -> Result<ControlOutcome, ControlError> {
    let editor = ControlEditor::open(path)?;
    let paragraphs: Vec<Paragraph> = editor.paragraphs().collect();
    for mut paragraph in paragraphs {
        if paragraph.get("Source").filter(|s| !s.is_empty()).is_some() {
            source_cb(&mut paragraph);
        } else {
            binary_cb(&mut paragraph);
        }
    }
    editor.commit()
}

/// Parse a Standards-Version value into its numeric components.
pub fn parse_standards_version(value: &str) -> Result<Vec<u32>, std::num::ParseIntError> {
    value.split('.').map(str::parse).collect()
}

/// Scoped editor for a single relationship field of a paragraph.
///
/// Reads the field on construction, applies relation-algebra operations to
/// the string value, and writes the field back on [`commit`] only if it
/// changed.
///
/// [`commit`]: PkgRelationFieldEditor::commit
pub struct PkgRelationFieldEditor {
    paragraph: Paragraph,
    name: String,
    original: Option<String>,
    value: Option<String>,
}

impl PkgRelationFieldEditor {
    /// Start editing the named field of `paragraph`.
    pub fn new(paragraph: Paragraph, name: &str) -> Self {
        let value = paragraph.get(name);
        PkgRelationFieldEditor {
            paragraph,
            name: name.to_string(),
            original: value.clone(),
            value,
        }
    }

    /// The current value of the field.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Drop a dependency. Returns whether anything was removed.
    pub fn drop_relation(&mut self, package: &str) -> bool {
        let value = match &self.value {
            Some(value) => value,
            None => return false,
        };
        let new_value = drop_dependency(value, package);
        let changed = &new_value != value;
        self.value = Some(new_value);
        changed
    }

    /// Add a dependency.
    ///
    /// # Errors
    /// [`RelationError::PositionOutOfRange`] for an invalid `position`.
    pub fn add_relation(
        &mut self,
        relation: &str,
        position: Option<usize>,
    ) -> Result<(), RelationError> {
        self.value = Some(add_dependency(
            self.value.as_deref().unwrap_or(""),
            relation,
            position,
        )?);
        Ok(())
    }

    /// Iterate over the entries mentioning a package.
    pub fn iter_relations(&self, package: &str) -> Vec<(usize, Vec<PkgRelation>)> {
        match &self.value {
            Some(value) => iter_relations(value, package),
            None => vec![],
        }
    }

    /// Retrieve the simple relation for a package.
    ///
    /// # Errors
    /// See [`get_relation`].
    pub fn get_relation(&self, package: &str) -> Result<(usize, Vec<PkgRelation>), LookupError> {
        match &self.value {
            Some(value) => get_relation(value, package),
            None => Err(LookupError::NotFound(package.to_string())),
        }
    }

    /// Check whether there is a simple relation for a package.
    pub fn has_relation(&self, package: &str) -> bool {
        self.get_relation(package).is_ok()
    }

    /// Write the field back to the paragraph. Returns whether it changed.
    pub fn commit(mut self) -> bool {
        if self.value == self.original {
            return false;
        }
        match &self.value {
            None => self.paragraph.remove(&self.name),
            Some(value) => self.paragraph.set(&self.name, value),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn write(path: &Path, contents: &str) {
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_list_binaries_and_source() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("control");
        write(
            &path,
            indoc! {"
                Source: blah
                Build-Depends: debhelper (>= 9)

                Package: blah-tools
                Architecture: any
            "},
        );
        let mut editor = ControlEditor::open(&path).unwrap();
        assert_eq!(
            editor.source().unwrap().get("Source").as_deref(),
            Some("blah")
        );
        let binaries: Vec<_> = editor
            .binaries()
            .filter_map(|paragraph| paragraph.get("Package"))
            .collect();
        assert_eq!(binaries, vec!["blah-tools"]);
        assert!(!editor.commit().unwrap().changed);
    }

    #[test]
    fn test_no_source_paragraph() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("control");
        write(&path, "Package: blah\nArchitecture: any\n");
        let mut editor = ControlEditor::open(&path).unwrap();
        assert!(matches!(
            editor.source(),
            Err(ControlError::MissingSourceParagraph)
        ));
    }

    #[test]
    fn test_create() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("control");
        let mut editor = ControlEditor::create(&path).unwrap();
        let mut source = editor.source().unwrap();
        source.set("Source", "blah");
        let outcome = editor.commit().unwrap();
        assert!(outcome.changed);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Source: blah\n");
    }

    #[test]
    fn test_add_binary() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("control");
        write(&path, "Source: blah\n");
        let mut editor = ControlEditor::open(&path).unwrap();
        editor.add_binary(&[("Package", "blah-tools"), ("Architecture", "any")]);
        let outcome = editor.commit().unwrap();
        assert!(outcome.changed);
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("Package: blah-tools"), "{}", written);
    }

    #[test]
    fn test_sort_binaries() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("control");
        write(
            &path,
            indoc! {"
                Source: blah

                Package: zzz
                Architecture: any

                Package: aaa
                Architecture: any
            "},
        );
        let mut editor = ControlEditor::open(&path).unwrap();
        editor.sort_binary_packages(false);
        editor.commit().unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        let zzz = written.find("Package: zzz").unwrap();
        let aaa = written.find("Package: aaa").unwrap();
        assert!(aaa < zzz, "{}", written);
    }

    #[test]
    fn test_description_stays_last() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("control");
        write(
            &path,
            indoc! {"
                Source: blah

                Package: blah
                Architecture: any
                Description: A package
            "},
        );
        let mut editor = ControlEditor::open(&path).unwrap();
        let mut binary = editor.binaries().next().unwrap();
        binary.set("Multi-Arch", "foreign");
        editor.commit().unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        let description = written.find("Description:").unwrap();
        let multi_arch = written.find("Multi-Arch:").unwrap();
        assert!(multi_arch < description, "{}", written);
    }

    #[test]
    fn test_do_not_edit_blocks_changes() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("control");
        write(&path, "# DO NOT EDIT\nSource: blah\n");
        let mut editor = ControlEditor::open(&path).unwrap();
        let mut source = editor.source().unwrap();
        source.set("Homepage", "https://example.com");
        let err = editor.commit().unwrap_err();
        assert!(matches!(
            err,
            ControlError::Editor(EditorError::GeneratedFile(_))
        ));
    }

    #[test]
    fn test_do_not_edit_no_change() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("control");
        write(&path, "# DO NOT EDIT\nSource: blah\n");
        let editor = ControlEditor::open(&path).unwrap();
        let outcome = editor.commit().unwrap();
        assert!(!outcome.changed);
    }

    #[test]
    fn test_unknown_template_type_raises_generated_file() {
        let td = tempfile::tempdir().unwrap();
        let debian = td.path().join("debian");
        std::fs::create_dir(&debian).unwrap();
        let path = debian.join("control");
        write(&path, "Source: blah\nBuild-Depends: debhelper\n");
        write(&debian.join("control.in"), "Source: blah\nBuild-Depends: debhelper\n");
        let mut editor = ControlEditor::open(&path).unwrap();
        let mut source = editor.source().unwrap();
        source.set("Homepage", "https://example.com");
        let err = editor.commit().unwrap_err();
        match err {
            ControlError::Editor(EditorError::GeneratedFile(generated)) => {
                assert_eq!(generated.template_path, Some(debian.join("control.in")));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_update_template() {
        let td = tempfile::tempdir().unwrap();
        let debian = td.path().join("debian");
        std::fs::create_dir(&debian).unwrap();
        write(
            &debian.join("rules"),
            "%:\n\tdh $@\n\ndebian/control: debian/control.in\n\tcp $< $@\n",
        );
        let contents = "Source: blah\nBuild-Depends: debhelper\n";
        let path = debian.join("control");
        write(&path, contents);
        write(&debian.join("control.in"), contents);
        let mut editor = ControlEditor::open(&path).unwrap();
        let mut source = editor.source().unwrap();
        source.set("Homepage", "https://example.com");
        let outcome = editor.commit().unwrap();
        assert!(outcome.changed);
        assert_eq!(
            outcome.pending_expansion,
            Some(TemplateExpansion {
                template_path: debian.join("control.in"),
                template_type: TemplateType::Rules,
            })
        );
        // the edit landed in the template, not the generated file
        assert_eq!(std::fs::read_to_string(&path).unwrap(), contents);
        let template = std::fs::read_to_string(debian.join("control.in")).unwrap();
        assert!(template.contains("Homepage: https://example.com"), "{}", template);
    }

    #[test]
    fn test_update_cdbs_template() {
        let td = tempfile::tempdir().unwrap();
        let debian = td.path().join("debian");
        std::fs::create_dir(&debian).unwrap();
        let path = debian.join("control");
        write(
            &path,
            "Source: blah\nBuild-Depends: debhelper (>= 9), cdbs\n",
        );
        write(
            &debian.join("control.in"),
            "Source: blah\nBuild-Depends: @cdbs@\n",
        );
        let mut editor = ControlEditor::open(&path).unwrap();
        let mut source = editor.source().unwrap();
        let build_depends = source.get("Build-Depends").unwrap();
        source.set(
            "Build-Depends",
            &add_dependency(&build_depends, "libc6-dev", None).unwrap(),
        );
        let outcome = editor.commit().unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.pending_expansion, None);
        let template = std::fs::read_to_string(debian.join("control.in")).unwrap();
        assert!(template.contains("@cdbs@, libc6-dev"), "{}", template);
        let control = std::fs::read_to_string(&path).unwrap();
        assert!(
            control.contains("debhelper (>= 9), cdbs, libc6-dev"),
            "{}",
            control
        );
    }

    #[test]
    fn test_missing_control_with_template() {
        let td = tempfile::tempdir().unwrap();
        let debian = td.path().join("debian");
        std::fs::create_dir(&debian).unwrap();
        write(&debian.join("control.in"), "Source: blah\n");
        let err = ControlEditor::open(debian.join("control")).unwrap_err();
        match err {
            ControlError::Editor(EditorError::GeneratedFile(generated)) => {
                assert_eq!(generated.template_path, Some(debian.join("control.in")));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_resolve_cdbs_conflict() {
        let key = ("Source".to_string(), "libnetsds-perl".to_string());
        let val = resolve_cdbs_conflict(
            &key,
            "Build-Depends",
            Some("debhelper (>= 6), foo"),
            Some("@cdbs@"),
            Some("debhelper (>= 10), foo"),
        )
        .unwrap();
        assert_eq!(val.as_deref(), Some("@cdbs@, debhelper (>= 10)"));
        let val = resolve_cdbs_conflict(
            &key,
            "Build-Depends",
            Some("debhelper (>= 6), foo"),
            Some("@cdbs@, foo"),
            Some("debhelper (>= 10), foo"),
        )
        .unwrap();
        assert_eq!(val.as_deref(), Some("@cdbs@, foo, debhelper (>= 10)"));
        let val = resolve_cdbs_conflict(
            &key,
            "Build-Depends",
            Some("debhelper (>= 6), foo"),
            Some("@cdbs@, debhelper (>= 9)"),
            Some("debhelper (>= 10), foo"),
        )
        .unwrap();
        assert_eq!(val.as_deref(), Some("@cdbs@, debhelper (>= 10)"));
    }

    #[test]
    fn test_guess_template_type() {
        let td = tempfile::tempdir().unwrap();
        let debian = td.path().join("debian");
        std::fs::create_dir(&debian).unwrap();

        let template = debian.join("control.in");
        write(&template, "Source: blah\nBuild-Depends: gnome-pkg-tools\n");
        assert_eq!(
            guess_template_type(&template, Some(&debian)),
            Some(TemplateType::Gnome)
        );

        write(&template, "Source: blah\nBuild-Depends: cdbs\n");
        assert_eq!(
            guess_template_type(&template, Some(&debian)),
            Some(TemplateType::Cdbs)
        );

        write(&template, "Source: blah\nBuild-Depends: @cdbs@\n");
        assert_eq!(
            guess_template_type(&template, Some(&debian)),
            Some(TemplateType::Cdbs)
        );

        write(&template, "Source: blah\nBuild-Depends: PGVERSION\n");
        assert_eq!(
            guess_template_type(&template, Some(&debian)),
            Some(TemplateType::Postgresql)
        );

        write(&template, "Source: blah\nBuild-Depends: debhelper\n");
        assert_eq!(guess_template_type(&template, Some(&debian)), None);

        write(&debian.join("debcargo.toml"), "maintainer = \"blah\"\n");
        assert_eq!(
            guess_template_type(&template, Some(&debian)),
            Some(TemplateType::Debcargo)
        );
        std::fs::remove_file(debian.join("debcargo.toml")).unwrap();

        write(
            &debian.join("rules"),
            "debian/control: debian/control.in\n\tcp $< $@\n",
        );
        assert_eq!(
            guess_template_type(&template, Some(&debian)),
            Some(TemplateType::Rules)
        );
    }

    #[test]
    fn test_update_control_helper() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("control");
        write(
            &path,
            indoc! {"
                Source: blah

                Package: blah
                Architecture: any
            "},
        );
        let outcome = update_control(
            &path,
            |source| source.set("Standards-Version", "4.6.2"),
            |binary| binary.set("Multi-Arch", "foreign"),
        )
        .unwrap();
        assert!(outcome.changed);
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("Standards-Version: 4.6.2"), "{}", written);
        assert!(written.contains("Multi-Arch: foreign"), "{}", written);
    }

    #[test]
    fn test_relation_field_editor() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("control");
        write(&path, "Source: blah\nBuild-Depends: debhelper (>= 9), quilt\n");
        let mut editor = ControlEditor::open(&path).unwrap();
        let source = editor.source().unwrap();
        let mut field = PkgRelationFieldEditor::new(source, "Build-Depends");
        assert!(field.has_relation("quilt"));
        assert!(field.drop_relation("quilt"));
        field.add_relation("dh-autoreconf", None).unwrap();
        assert!(field.commit());
        editor.commit().unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Source: blah\nBuild-Depends: debhelper (>= 9), dh-autoreconf\n"
        );
    }

    #[test]
    fn test_parse_standards_version() {
        assert_eq!(parse_standards_version("4.5.0").unwrap(), vec![4, 5, 0]);
    }
}
