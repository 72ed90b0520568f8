//! Support for editing files while preserving their formatting.
//!
//! The [`Editor`] type implements the edit protocol shared by all file
//! editors in this crate:
//!
//! 1. On open, the file is read and parsed, and immediately re-serialized.
//!    The re-serialized text is the *round-trip baseline*: it captures
//!    whatever normalization the parser/serializer pair applies before any
//!    change is made.
//! 2. The caller mutates the parsed value.
//! 3. On [`Editor::commit`], the parsed value is serialized again. If the
//!    result matches the baseline or the original file, nothing is written.
//!    Otherwise the target is checked for being a generated file, and the
//!    original formatting is reconciled: if the baseline differs from the
//!    original text (the serializer cannot reproduce the file exactly), a
//!    three-way merge of (baseline, original, updated) is attempted so that
//!    formatting in regions the caller did not touch survives. A merge
//!    conflict surfaces as [`EditorError::FormattingUnpreservable`] instead
//!    of a lossy write.
//!
//! ```rust,no_run
//! use debmutate::reformatting::Editor;
//! use debmutate::lintian_overrides::LintianOverrides;
//!
//! let mut editor: Editor<LintianOverrides> = Editor::open("debian/source/lintian-overrides")?;
//! assert!(!editor.has_changed());
//! let changed = editor.commit()?;
//! assert!(!changed);
//! # Ok::<_, debmutate::reformatting::EditorError>(())
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Contract between the [`Editor`] and a file format.
pub trait FileFormat: Sized {
    /// Error returned when the raw file contents cannot be interpreted.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Parse raw file contents into the structured representation.
    fn from_text(text: &str) -> Result<Self, Self::Error>;

    /// Serialize the structured representation back to text.
    ///
    /// Returning `None` means "no content": on commit the file is removed
    /// rather than written.
    fn to_text(&self) -> Option<String>;

    /// Value to start from when the file does not exist.
    ///
    /// The default propagates the not-found error to the caller; formats for
    /// which an absent file is equivalent to an empty one return an empty
    /// value here.
    fn missing() -> Option<Self> {
        None
    }
}

/// The edit target is generated from another file.
///
/// This is a control-flow signal rather than a fatal error: callers that know
/// about the template can redirect the edit there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Path of the generated file.
    pub path: PathBuf,
    /// Path of the template it is generated from, if known.
    pub template_path: Option<PathBuf>,
    /// Kind of template, if known.
    pub template_type: Option<String>,
}

impl std::fmt::Display for GeneratedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.template_path {
            Some(template) => write!(
                f,
                "{} is generated from {}",
                self.path.display(),
                template.display()
            ),
            None => write!(f, "{} is generated", self.path.display()),
        }
    }
}

impl std::error::Error for GeneratedFile {}

/// The serializer cannot reproduce the file's formatting, and a three-way
/// merge of the change did not resolve cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattingUnpreservable {
    /// Path of the file being edited.
    pub path: PathBuf,
    /// The contents as found on disk.
    pub original_contents: Option<String>,
    /// The contents as re-serialized from the unmodified parse.
    pub rewritten_contents: Option<String>,
}

impl FormattingUnpreservable {
    /// Unified diff between the original and re-serialized contents,
    /// showing what formatting would be lost.
    pub fn diff(&self) -> String {
        diffy::create_patch(
            self.original_contents.as_deref().unwrap_or(""),
            self.rewritten_contents.as_deref().unwrap_or(""),
        )
        .to_string()
    }
}

impl std::fmt::Display for FormattingUnpreservable {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "unable to preserve formatting while editing {}",
            self.path.display()
        )
    }
}

impl std::error::Error for FormattingUnpreservable {}

/// Error editing a file.
#[derive(Debug)]
pub enum EditorError {
    /// An I/O error was encountered while reading or writing the file.
    Io(std::io::Error),

    /// The file contents could not be parsed.
    Parse(Box<dyn std::error::Error + Send + Sync>),

    /// The edit target is generated from a template.
    GeneratedFile(GeneratedFile),

    /// The file's formatting could not be preserved.
    FormattingUnpreservable(FormattingUnpreservable),
}

impl std::fmt::Display for EditorError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            EditorError::Io(err) => write!(f, "{}", err),
            EditorError::Parse(err) => write!(f, "{}", err),
            EditorError::GeneratedFile(err) => write!(f, "{}", err),
            EditorError::FormattingUnpreservable(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for EditorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EditorError::Io(err) => Some(err),
            EditorError::Parse(err) => Some(err.as_ref()),
            EditorError::GeneratedFile(err) => Some(err),
            EditorError::FormattingUnpreservable(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for EditorError {
    fn from(err: std::io::Error) -> Self {
        EditorError::Io(err)
    }
}

impl From<GeneratedFile> for EditorError {
    fn from(err: GeneratedFile) -> Self {
        EditorError::GeneratedFile(err)
    }
}

impl From<FormattingUnpreservable> for EditorError {
    fn from(err: FormattingUnpreservable) -> Self {
        EditorError::FormattingUnpreservable(err)
    }
}

/// Check that a serializer reproduces the original file contents.
///
/// # Errors
/// [`FormattingUnpreservable`] when the texts differ and reformatting is not
/// allowed.
pub fn check_preserve_formatting(
    rewritten_text: &str,
    text: &str,
    path: &Path,
    allow_reformatting: bool,
) -> Result<(), FormattingUnpreservable> {
    if rewritten_text == text || allow_reformatting {
        return Ok(());
    }
    Err(FormattingUnpreservable {
        path: path.to_path_buf(),
        original_contents: Some(text.to_string()),
        rewritten_contents: Some(rewritten_text.to_string()),
    })
}

const DO_NOT_EDIT_SCAN_LINES: usize = 20;

/// Check whether a file is generated from another file.
///
/// A file is considered generated when a sibling template (`<path>.in` or
/// `<path>.m4`) exists, or when one of its first lines contains a literal
/// `DO NOT EDIT` marker.
///
/// # Errors
/// [`EditorError::GeneratedFile`] when the file is generated.
pub fn check_generated_file(path: &Path) -> Result<(), EditorError> {
    for ext in [".in", ".m4"] {
        let mut template = path.as_os_str().to_owned();
        template.push(ext);
        let template = PathBuf::from(template);
        if template.exists() {
            return Err(GeneratedFile {
                path: path.to_path_buf(),
                template_path: Some(template),
                template_type: None,
            }
            .into());
        }
    }
    let contents = match std::fs::read(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };
    let marker = b"DO NOT EDIT";
    for line in contents.split(|&b| b == b'\n').take(DO_NOT_EDIT_SCAN_LINES) {
        if line.windows(marker.len()).any(|w| w == marker) {
            return Err(GeneratedFile {
                path: path.to_path_buf(),
                template_path: None,
                template_type: None,
            }
            .into());
        }
    }
    Ok(())
}

/// Write updated contents to a formatted file.
///
/// `rewritten_contents` must be the serialization of the *unmodified* parse
/// of `original_contents`; it serves as the merge base when the serializer
/// cannot reproduce the original formatting.
///
/// Returns whether the file was written.
///
/// # Errors
/// [`EditorError::GeneratedFile`] when the target is generated and
/// `allow_generated` is false; [`EditorError::FormattingUnpreservable`] when
/// formatting would be lost and the three-way merge fallback conflicts.
pub fn edit_formatted_file(
    path: &Path,
    original_contents: Option<&str>,
    rewritten_contents: Option<&str>,
    updated_contents: &str,
    allow_generated: bool,
    allow_reformatting: bool,
) -> Result<bool, EditorError> {
    if Some(updated_contents) == rewritten_contents || Some(updated_contents) == original_contents {
        return Ok(false);
    }
    if !allow_generated {
        check_generated_file(path)?;
    }
    // An absent file and an empty serialization are equivalent as far as
    // preservation is concerned.
    let preserved = match (rewritten_contents, original_contents) {
        (None, None) => true,
        (Some(rewritten), Some(original)) => rewritten.trim() == original.trim(),
        (None, Some(original)) => original.trim().is_empty(),
        (Some(rewritten), None) => rewritten.trim().is_empty(),
    };
    let mut contents_to_write = updated_contents.to_string();
    if !preserved && !allow_reformatting {
        let unpreservable = FormattingUnpreservable {
            path: path.to_path_buf(),
            original_contents: original_contents.map(ToString::to_string),
            rewritten_contents: rewritten_contents.map(ToString::to_string),
        };
        match (rewritten_contents, original_contents) {
            (Some(rewritten), Some(original)) => {
                tracing::debug!(
                    "unable to preserve formatting of {}; falling back to three-way merge",
                    path.display()
                );
                match diffy::merge(rewritten, original, updated_contents) {
                    Ok(merged) => contents_to_write = merged,
                    Err(_conflicts) => return Err(unpreservable.into()),
                }
            }
            _ => return Err(unpreservable.into()),
        }
    }
    std::fs::write(path, contents_to_write)?;
    Ok(true)
}

/// Options controlling an [`Editor`] session.
#[derive(Debug, Clone, Default)]
pub struct EditorOptions {
    /// Write to the file even if it is detected as generated.
    pub allow_generated: bool,
    /// Permit writes that lose the original formatting.
    pub allow_reformatting: bool,
}

/// A scoped edit session for a single file.
///
/// Obtained from [`Editor::open`]; dereferences to the parsed value for
/// mutation, and is consumed by [`Editor::commit`], which reconciles the
/// mutation against the file on disk.
pub struct Editor<F: FileFormat> {
    path: PathBuf,
    options: EditorOptions,
    orig_content: Option<String>,
    rewritten_content: Option<String>,
    parsed: F,
}

impl<F: FileFormat> Editor<F> {
    /// Open `path` for editing.
    ///
    /// # Errors
    /// I/O and parse errors; a missing file is an error unless the format
    /// provides a [`FileFormat::missing`] value.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EditorError> {
        Self::open_with(path, EditorOptions::default())
    }

    /// Open `path` for editing with explicit options.
    pub fn open_with(path: impl AsRef<Path>, options: EditorOptions) -> Result<Self, EditorError> {
        Self::open_inner(path.as_ref(), options, |err| {
            F::missing().ok_or(EditorError::Io(err))
        })
    }

    /// Open `path` for editing, starting from the default value if the file
    /// does not exist. Reformatting is implicitly allowed for files created
    /// this way.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, EditorError>
    where
        F: Default,
    {
        let options = EditorOptions {
            allow_reformatting: true,
            ..EditorOptions::default()
        };
        Self::open_inner(path.as_ref(), options, |_err| Ok(F::default()))
    }

    fn open_inner(
        path: &Path,
        options: EditorOptions,
        on_missing: impl FnOnce(std::io::Error) -> Result<F, EditorError>,
    ) -> Result<Self, EditorError> {
        let (orig_content, parsed) = match std::fs::read_to_string(path) {
            Ok(content) => {
                let parsed =
                    F::from_text(&content).map_err(|err| EditorError::Parse(Box::new(err)))?;
                (Some(content), parsed)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => (None, on_missing(err)?),
            Err(err) => return Err(err.into()),
        };
        let rewritten_content = parsed.to_text();
        Ok(Editor {
            path: path.to_path_buf(),
            options,
            orig_content,
            rewritten_content,
            parsed,
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

    fn updated_content(&self) -> Option<String> {
        self.parsed.to_text()
    }

    /// Check whether any changes have been made so far.
    pub fn has_changed(&self) -> bool {
        let updated = self.updated_content();
        updated != self.rewritten_content && updated != self.orig_content
    }

    /// Reconcile the session against the file on disk.
    ///
    /// Returns whether the file was modified.
    ///
    /// # Errors
    /// See [`edit_formatted_file`].
    pub fn commit(self) -> Result<bool, EditorError> {
        let updated = self.updated_content();
        if updated == self.rewritten_content || updated == self.orig_content {
            return Ok(false);
        }
        match updated {
            None => {
                if self.path.exists() {
                    std::fs::remove_file(&self.path)?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Some(updated) => edit_formatted_file(
                &self.path,
                self.orig_content.as_deref(),
                self.rewritten_content.as_deref(),
                &updated,
                self.options.allow_generated,
                self.options.allow_reformatting,
            ),
        }
    }
}

impl<F: FileFormat> std::ops::Deref for Editor<F> {
    type Target = F;

    fn deref(&self) -> &F {
        &self.parsed
    }
}

impl<F: FileFormat> std::ops::DerefMut for Editor<F> {
    fn deref_mut(&mut self) -> &mut F {
        &mut self.parsed
    }
}

/// Apply `f` to the parsed contents of `path` and commit the result.
///
/// Returns the closure's result together with whether the file changed.
pub fn edit_file<F: FileFormat, R>(
    path: impl AsRef<Path>,
    options: EditorOptions,
    f: impl FnOnce(&mut F) -> R,
) -> Result<(R, bool), EditorError> {
    let mut editor = Editor::open_with(path, options)?;
    let ret = f(&mut editor);
    let changed = editor.commit()?;
    Ok((ret, changed))
}
