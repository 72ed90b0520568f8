//! Editing of deb822-style files.
//!
//! Tokenizing is delegated to the `deb822-lossless` crate, which preserves
//! comments and whitespace exactly; [`Deb822Editor`] contributes the
//! format-preserving edit protocol around it, plus a primitive for applying
//! a recorded set of field changes to another file (used to propagate edits
//! from a generated control file to its template).

use crate::reformatting::{edit_formatted_file, EditorError};
use deb822_lossless::{Deb822, Paragraph};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Field-level changes, keyed by the identifying field of each paragraph:
/// `("Source", name)` for source paragraphs, `("Package", name)` for binary
/// paragraphs. Each change is `(field, old_value, new_value)`, with `None`
/// for "absent".
pub type FieldChanges = HashMap<(String, String), Vec<(String, Option<String>, Option<String>)>>;

/// A proposed change did not match what was found in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeConflict {
    /// Identifying `(field, value)` pair of the paragraph.
    pub paragraph_key: (String, String),
    /// Field the change applies to.
    pub field: String,
    /// The old value the change expected.
    pub expected_old_value: Option<String>,
    /// The value actually present.
    pub actual_old_value: Option<String>,
    /// The proposed new value.
    pub new_value: Option<String>,
}

impl std::fmt::Display for ChangeConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "conflict applying change to {} of {} {}: expected {:?}, found {:?}",
            self.field, self.paragraph_key.0, self.paragraph_key.1,
            self.expected_old_value, self.actual_old_value
        )
    }
}

impl std::error::Error for ChangeConflict {}

/// Reformat deb822 contents to canonical form, accepting error tokens.
pub fn reformat_deb822(contents: &str) -> String {
    let (deb822, _errors) = Deb822::from_str_relaxed(contents);
    deb822.to_string()
}

/// Options controlling a [`Deb822Editor`] session.
#[derive(Debug, Clone, Default)]
pub struct Deb822EditorOptions {
    /// Write to the file even if it is detected as generated.
    pub allow_generated: bool,
    /// Permit writes that lose the original formatting.
    pub allow_reformatting: bool,
    /// Start from an empty file when the path does not exist.
    pub allow_missing: bool,
    /// Accept files that contain unparseable lines.
    pub accept_files_with_error_tokens: bool,
}

/// Format-preserving editor for a deb822-style file.
#[derive(Debug)]
pub struct Deb822Editor {
    path: PathBuf,
    allow_generated: bool,
    allow_reformatting: bool,
    orig_content: Option<String>,
    rewritten_content: Option<String>,
    /// The parsed file, free to mutate.
    pub deb822: Deb822,
}

impl Deb822Editor {
    /// Open `path` for editing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EditorError> {
        Self::open_with(path, Deb822EditorOptions::default())
    }

    /// Open `path` for editing with explicit options.
    pub fn open_with(
        path: impl AsRef<Path>,
        options: Deb822EditorOptions,
    ) -> Result<Self, EditorError> {
        let path = path.as_ref().to_path_buf();
        let (orig_content, deb822) = match std::fs::read_to_string(&path) {
            Ok(content) => {
                let deb822 = if options.accept_files_with_error_tokens {
                    Deb822::from_str_relaxed(&content).0
                } else {
                    Deb822::from_str(&content).map_err(|err| EditorError::Parse(Box::new(err)))?
                };
                (Some(content), deb822)
            }
            Err(err) if err.kind() == ErrorKind::NotFound && options.allow_missing => {
                (None, Deb822::new())
            }
            Err(err) => return Err(err.into()),
        };
        let rewritten_content = Some(deb822.to_string());
        Ok(Deb822Editor {
            path,
            allow_generated: options.allow_generated,
            allow_reformatting: options.allow_reformatting,
            orig_content,
            rewritten_content,
            deb822,
        })
    }

    /// Path of the file being edited.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file contents as found on disk, or `None` if the file was absent.
    pub fn orig_content(&self) -> Option<&str> {
        self.orig_content.as_deref()
    }

    /// Iterate over the paragraphs in the file.
    pub fn paragraphs(&self) -> impl Iterator<Item = Paragraph> {
        self.deb822.paragraphs()
    }

    /// Check if any changes have been made so far.
    pub fn has_changed(&self) -> bool {
        let updated = self.deb822.to_string();
        Some(&updated) != self.rewritten_content.as_ref()
            && Some(&updated) != self.orig_content.as_ref()
    }

    /// Apply a set of field changes, failing on any mismatch.
    ///
    /// # Errors
    /// [`ChangeConflict`] when a change's expected old value does not match
    /// the value found in the file.
    pub fn apply_changes(&mut self, changes: FieldChanges) -> Result<(), ChangeConflict> {
        self.apply_changes_with(changes, |key, field, expected, actual, new_value| {
            Err(ChangeConflict {
                paragraph_key: key.clone(),
                field: field.to_string(),
                expected_old_value: expected.map(ToString::to_string),
                actual_old_value: actual.map(ToString::to_string),
                new_value: new_value.map(ToString::to_string),
            })
        })
    }

    /// Apply a set of field changes, consulting `resolve_conflict` whenever a
    /// change's expected old value does not match the file.
    ///
    /// The resolver receives `(paragraph_key, field, expected_old_value,
    /// actual_old_value, new_value)` and returns the value to store, `None`
    /// to delete the field.
    pub fn apply_changes_with<R>(
        &mut self,
        changes: FieldChanges,
        resolve_conflict: R,
    ) -> Result<(), ChangeConflict>
    where
        R: Fn(
            &(String, String),
            &str,
            Option<&str>,
            Option<&str>,
            Option<&str>,
        ) -> Result<Option<String>, ChangeConflict>,
    {
        let mut changes = changes;
        let mut paragraphs: Vec<Paragraph> = self.deb822.paragraphs().collect();
        for paragraph in paragraphs.iter_mut() {
            let items: Vec<(String, String)> = paragraph.items().collect();
            for item in items {
                let fields = match changes.remove(&item) {
                    Some(fields) => fields,
                    None => continue,
                };
                for (field, old_value, new_value) in fields {
                    let actual = paragraph.get(&field);
                    let new_value = if actual.as_deref() != old_value.as_deref() {
                        resolve_conflict(
                            &item,
                            &field,
                            old_value.as_deref(),
                            actual.as_deref(),
                            new_value.as_deref(),
                        )?
                    } else {
                        new_value
                    };
                    match new_value {
                        None => paragraph.remove(&field),
                        Some(value) => paragraph.set(&field, &value),
                    }
                }
            }
        }
        // Whatever is left describes paragraphs that do not exist yet.
        let mut leftover: Vec<_> = changes.into_iter().collect();
        leftover.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, fields) in leftover {
            let mut paragraph = self.deb822.add_paragraph();
            for (field, old_value, new_value) in fields {
                let new_value = if old_value.is_some() {
                    resolve_conflict(&key, &field, old_value.as_deref(), None, new_value.as_deref())?
                } else {
                    new_value
                };
                if let Some(value) = new_value {
                    paragraph.set(&field, &value);
                }
            }
        }
        Ok(())
    }

    /// Reconcile the session against the file on disk.
    ///
    /// Returns whether the file was modified.
    ///
    /// # Errors
    /// See [`edit_formatted_file`].
    pub fn commit(self) -> Result<bool, EditorError> {
        let updated = self.deb822.to_string();
        edit_formatted_file(
            &self.path,
            self.orig_content.as_deref(),
            self.rewritten_content.as_deref(),
            &updated,
            self.allow_generated,
            self.allow_reformatting,
        )
    }
}
