#![deny(missing_docs)]
//! Format-preserving editing of Debian packaging metadata.
//!
//! This crate provides editors for the files that make up a Debian source
//! package: control files, changelogs, watch files, lintian overrides, quilt
//! series files, maintscripts. All editors share the same contract: a file is
//! parsed into a structured representation, can be freely modified, and is
//! only written back if it actually changed. Formatting that the caller did
//! not touch (comments, whitespace, line wrapping) is preserved; when a
//! format's serializer cannot reproduce it exactly, the editor falls back to
//! a three-way merge and refuses the edit rather than discard it silently.
//!
//! Files that are generated from a template (a `control.in`, or anything
//! carrying a `DO NOT EDIT` marker) are detected and never overwritten
//! directly; the edit is redirected to the template instead.
//!
//! # Examples
//!
//! Manipulating a dependency field while keeping its formatting:
//!
//! ```rust
//! use debmutate::relations::{drop_dependency, ensure_minimum_version};
//!
//! let value = "debhelper (>= 9),\n dh-autoreconf";
//! assert_eq!(
//!     ensure_minimum_version(value, "debhelper", &"12".parse().unwrap()),
//!     "debhelper (>= 12),\n dh-autoreconf",
//! );
//! assert_eq!(drop_dependency(value, "dh-autoreconf"), "debhelper (>= 9)");
//! ```
//!
//! Editing a file on disk:
//!
//! ```rust,no_run
//! use debmutate::control::ControlEditor;
//!
//! let mut editor = ControlEditor::open("debian/control")?;
//! let mut source = editor.source()?;
//! source.set("Standards-Version", "4.6.2");
//! let outcome = editor.commit()?;
//! assert!(outcome.changed);
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```

pub mod changelog;
pub mod control;
pub mod deb822;
pub mod debhelper;
pub mod lintian_overrides;
pub mod patch;
pub mod reformatting;
pub mod relations;
pub mod versions;
pub mod watch;

pub use reformatting::{Editor, EditorError, FileFormat};
pub use relations::PkgRelation;
