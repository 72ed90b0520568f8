//! Parsing and manipulation of package relationship fields.
//!
//! A relationship field (`Depends`, `Build-Depends`, …) is a comma-separated
//! list of entries, each of which is a `|`-separated group of alternative
//! [`PkgRelation`]s. [`parse_relations`] keeps the whitespace around every
//! entry so that a list that is not semantically changed formats back to the
//! original string; the mutation helpers in this module
//! ([`ensure_minimum_version`], [`drop_dependency`], …) return the input
//! string unchanged whenever no change was needed.
//!
//! Atoms that do not match the relationship grammar (substitution variables
//! like `${misc:Depends}`, mostly) are never an error; they are carried as a
//! relation whose name is the raw text.
//!
//! # Example
//! ```rust
//! use debmutate::relations::{ensure_minimum_version, is_relation_implied, parse_relation};
//!
//! assert_eq!(
//!     ensure_minimum_version("debhelper (>= 9), dh-autoreconf", "debhelper", &"12".parse().unwrap()),
//!     "debhelper (>= 12), dh-autoreconf",
//! );
//! assert!(is_relation_implied(
//!     &parse_relation("bzr (>= 3)"),
//!     &parse_relation("bzr (= 3)"),
//! ));
//! ```

use debversion::Version;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// A version constraint operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionConstraint {
    /// `>=`
    GreaterThanEqual,
    /// `<=`
    LessThanEqual,
    /// `=`
    Equal,
    /// `>>`
    GreaterThan,
    /// `<<`
    LessThan,
}

impl std::fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            VersionConstraint::GreaterThanEqual => ">=",
            VersionConstraint::LessThanEqual => "<=",
            VersionConstraint::Equal => "=",
            VersionConstraint::GreaterThan => ">>",
            VersionConstraint::LessThan => "<<",
        })
    }
}

impl std::str::FromStr for VersionConstraint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ">=" => Ok(VersionConstraint::GreaterThanEqual),
            "<=" => Ok(VersionConstraint::LessThanEqual),
            "=" => Ok(VersionConstraint::Equal),
            ">>" => Ok(VersionConstraint::GreaterThan),
            "<<" => Ok(VersionConstraint::LessThan),
            _ => Err(format!("invalid version constraint: {}", s)),
        }
    }
}

/// An architecture restriction, e.g. `linux-any` or `!hurd-i386`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchRestriction {
    /// Whether the restriction is positive or negated.
    pub enabled: bool,
    /// Architecture name.
    pub arch: String,
}

/// A build profile restriction term, e.g. `!nocheck`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildRestriction {
    /// Whether the restriction is positive or negated.
    pub enabled: bool,
    /// Profile name.
    pub profile: String,
}

/// A single package requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkgRelation {
    /// Package name, or the raw atom text if it did not match the grammar.
    pub name: String,
    /// Architecture qualifier (the `any` in `foo:any`).
    pub archqual: Option<String>,
    /// Version constraint.
    pub version: Option<(VersionConstraint, Version)>,
    /// Architecture restriction list (`[linux-any !hurd-i386]`).
    pub arch: Option<Vec<ArchRestriction>>,
    /// Build profile restriction formula (`<!nocheck> <cross>`), an OR of
    /// AND-groups.
    pub restrictions: Option<Vec<Vec<BuildRestriction>>>,
}

fn dep_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            ^\s*(?P<name>[a-zA-Z0-9.+\-]{2,})
            (:(?P<archqual>[a-zA-Z0-9][a-zA-Z0-9-]*))?
            (\s*\(\s*(?P<relop>[>=<]+)\s*(?P<version>[0-9a-zA-Z:\-+~.]+)\s*\))?
            (\s*\[(?P<archs>[\s!\w\-]+)\])?\s*
            (?P<restrictions><.+>)?\s*
            $",
        )
        .unwrap()
    })
}

fn restriction_sep_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r">\s*<").unwrap())
}

fn parse_archs(raw: &str) -> Vec<ArchRestriction> {
    raw.split_whitespace()
        .map(|arch| match arch.strip_prefix('!') {
            Some(arch) => ArchRestriction {
                enabled: false,
                arch: arch.to_string(),
            },
            None => ArchRestriction {
                enabled: true,
                arch: arch.to_string(),
            },
        })
        .collect()
}

fn parse_restrictions(raw: &str) -> Vec<Vec<BuildRestriction>> {
    let raw = raw.to_lowercase();
    let trimmed = raw.trim_matches(|c| c == '<' || c == '>' || c == ' ');
    restriction_sep_re()
        .split(trimmed)
        .map(|group| {
            group
                .split_whitespace()
                .map(|term| match term.strip_prefix('!') {
                    Some(profile) => BuildRestriction {
                        enabled: false,
                        profile: profile.to_string(),
                    },
                    None => BuildRestriction {
                        enabled: true,
                        profile: term.to_string(),
                    },
                })
                .collect()
        })
        .collect()
}

impl PkgRelation {
    /// A relation on a package without any constraints.
    pub fn simple(name: &str) -> Self {
        PkgRelation {
            name: name.to_string(),
            archqual: None,
            version: None,
            arch: None,
            restrictions: None,
        }
    }

    /// A relation on a package with an optional version constraint.
    pub fn new(name: &str, version: Option<(VersionConstraint, Version)>) -> Self {
        PkgRelation {
            version,
            ..Self::simple(name)
        }
    }

    /// Parse a single relation atom.
    ///
    /// Parsing never fails: text that does not match the grammar (such as a
    /// substitution variable) is returned as a relation with only the name
    /// set to the raw text.
    pub fn parse_atom(text: &str) -> Self {
        let captures = match dep_re().captures(text) {
            Some(captures) => captures,
            None => {
                tracing::debug!("cannot parse package relationship {:?}, returning it raw", text);
                return Self::simple(text);
            }
        };
        let version = match (captures.name("relop"), captures.name("version")) {
            (Some(relop), Some(version)) => {
                match (
                    relop.as_str().parse::<VersionConstraint>(),
                    version.as_str().parse::<Version>(),
                ) {
                    (Ok(constraint), Ok(version)) => Some((constraint, version)),
                    _ => {
                        tracing::debug!(
                            "cannot parse version constraint in {:?}, returning it raw",
                            text
                        );
                        return Self::simple(text);
                    }
                }
            }
            _ => None,
        };
        PkgRelation {
            name: captures["name"].to_string(),
            archqual: captures.name("archqual").map(|m| m.as_str().to_string()),
            version,
            arch: captures.name("archs").map(|m| parse_archs(m.as_str())),
            restrictions: captures
                .name("restrictions")
                .map(|m| parse_restrictions(m.as_str())),
        }
    }
}

impl std::fmt::Display for PkgRelation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.name)?;
        if let Some(archqual) = &self.archqual {
            write!(f, ":{}", archqual)?;
        }
        if let Some((constraint, version)) = &self.version {
            write!(f, " ({} {})", constraint, version)?;
        }
        if let Some(arch) = &self.arch {
            let archs = arch
                .iter()
                .map(|a| format!("{}{}", if a.enabled { "" } else { "!" }, a.arch))
                .collect::<Vec<_>>()
                .join(" ");
            write!(f, " [{}]", archs)?;
        }
        if let Some(restrictions) = &self.restrictions {
            for group in restrictions {
                let terms = group
                    .iter()
                    .map(|r| format!("{}{}", if r.enabled { "" } else { "!" }, r.profile))
                    .collect::<Vec<_>>()
                    .join(" ");
                write!(f, " <{}>", terms)?;
            }
        }
        Ok(())
    }
}

/// Parse a `|`-separated group of alternative relations.
pub fn parse_relation(text: &str) -> Vec<PkgRelation> {
    if text.is_empty() {
        return vec![];
    }
    text.split('|')
        .map(|alternative| PkgRelation::parse_atom(alternative.trim()))
        .collect()
}

/// One entry in a relationship field: an OR-group of alternatives together
/// with the whitespace that surrounded it in the original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationsEntry {
    /// Whitespace before the entry.
    pub head_whitespace: String,
    /// The alternatives; empty for a whitespace-only entry.
    pub alternatives: Vec<PkgRelation>,
    /// Whitespace after the entry.
    pub tail_whitespace: String,
}

impl RelationsEntry {
    /// Construct an entry with no surrounding whitespace.
    pub fn new(alternatives: Vec<PkgRelation>) -> Self {
        RelationsEntry {
            head_whitespace: String::new(),
            alternatives,
            tail_whitespace: String::new(),
        }
    }

    fn names(&self) -> Vec<&str> {
        self.alternatives.iter().map(|r| r.name.as_str()).collect()
    }
}

/// Parse a package relations string (e.g. a `Depends` or `Build-Depends`
/// field value), preserving the whitespace around each entry.
pub fn parse_relations(text: &str) -> Vec<RelationsEntry> {
    let mut ret = Vec::new();
    for top_level in text.split(',') {
        if top_level.is_empty() && !text.contains(',') {
            return vec![];
        }
        if !top_level.is_empty() && top_level.chars().all(char::is_whitespace) {
            ret.push(RelationsEntry {
                head_whitespace: top_level.to_string(),
                alternatives: vec![],
                tail_whitespace: String::new(),
            });
            continue;
        }
        let after_head = top_level.trim_start();
        let head_whitespace = top_level[..top_level.len() - after_head.len()].to_string();
        let stripped = after_head.trim_end();
        let tail_whitespace = after_head[stripped.len()..].to_string();
        ret.push(RelationsEntry {
            head_whitespace,
            alternatives: parse_relation(stripped),
            tail_whitespace,
        });
    }
    ret
}

/// Format a package relations string; the inverse of [`parse_relations`].
pub fn format_relations(relations: &[RelationsEntry]) -> String {
    let formatted = relations
        .iter()
        .map(|entry| {
            let alternatives = entry
                .alternatives
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" | ");
            format!(
                "{}{}{}",
                entry.head_whitespace, alternatives, entry.tail_whitespace
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    // The first line can be whitespace only, the subsequent ones can not.
    let mut lines = Vec::new();
    for (i, line) in formatted.split('\n').enumerate() {
        if i == 0 || !line.trim().is_empty() {
            lines.push(line);
        }
    }
    lines.join("\n")
}

/// Failure to look up a simple dependency on a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// No entry consists of just the named package.
    NotFound(String),
    /// The package only occurs inside a multi-package OR-group; editing it
    /// there would change the meaning of the alternatives.
    Complex(String),
}

impl std::fmt::Display for LookupError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            LookupError::NotFound(package) => write!(f, "no dependency on {}", package),
            LookupError::Complex(package) => {
                write!(f, "complex rule for {}, aborting", package)
            }
        }
    }
}

impl std::error::Error for LookupError {}

/// Error applying a mutation to a relations string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationError {
    /// The package occurs inside a multi-package OR-group; refusing to guess
    /// which alternative to change.
    ComplexRule(String),
    /// An explicit insert position was out of range.
    PositionOutOfRange(usize, usize),
}

impl std::fmt::Display for RelationError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RelationError::ComplexRule(package) => {
                write!(f, "complex rule for {}, aborting", package)
            }
            RelationError::PositionOutOfRange(position, len) => {
                write!(f, "position {} out of range for {} entries", position, len)
            }
        }
    }
}

impl std::error::Error for RelationError {}

/// Iterate over the entries that mention a particular package.
///
/// Returns `(entry index, alternatives)` pairs.
pub fn iter_relations(relationstr: &str, package: &str) -> Vec<(usize, Vec<PkgRelation>)> {
    parse_relations(relationstr)
        .into_iter()
        .enumerate()
        .filter(|(_, entry)| entry.names().contains(&package))
        .map(|(i, entry)| (i, entry.alternatives))
        .collect()
}

/// Retrieve the relation for a particular package.
///
/// Returns the entry index and the (single-element) OR-group.
///
/// # Errors
/// [`LookupError::NotFound`] when the package has no entry of its own;
/// [`LookupError::Complex`] when it only occurs in a multi-package OR-group.
pub fn get_relation(
    relationstr: &str,
    package: &str,
) -> Result<(usize, Vec<PkgRelation>), LookupError> {
    for (offset, relation) in iter_relations(relationstr, package) {
        let names = relation.iter().map(|r| r.name.as_str()).collect::<Vec<_>>();
        if names.len() > 1 && names.contains(&package) {
            return Err(LookupError::Complex(package.to_string()));
        }
        if names == [package] {
            return Ok((offset, relation));
        }
    }
    Err(LookupError::NotFound(package.to_string()))
}

/// Pick the most common whitespace style among `values`; `None` when there
/// is no clear winner.
fn majority_whitespace<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values {
        *counts.entry(value).or_default() += 1;
    }
    let best = counts.iter().max_by_key(|(_, &count)| count)?;
    let tied = counts.values().filter(|&&count| count == *best.1).count();
    if tied == 1 {
        Some(best.0.to_string())
    } else {
        None
    }
}

/// Append or insert a new OR-group, inferring surrounding whitespace from the
/// style of the existing entries. An out-of-range `position` is clamped.
fn push_relation(
    relations: &mut Vec<RelationsEntry>,
    relation: Vec<PkgRelation>,
    position: Option<usize>,
) {
    // A trailing whitespace-only entry (from a trailing comma) stays last.
    let pointless_tail = if relations
        .last()
        .is_some_and(|entry| entry.alternatives.is_empty())
    {
        relations.pop()
    } else {
        None
    };
    let (head_whitespace, tail_whitespace) = if relations.is_empty() {
        (String::new(), String::new())
    } else if relations.len() == 1 {
        let head = if relations[0].head_whitespace.is_empty() {
            " ".to_string()
        } else {
            relations[0].head_whitespace.clone()
        };
        (head, String::new())
    } else {
        let head = majority_whitespace(
            relations[1..].iter().map(|entry| entry.head_whitespace.as_str()),
        )
        .unwrap_or_else(|| relations[relations.len() - 1].head_whitespace.clone());
        let tail = majority_whitespace(
            relations[..relations.len() - 1]
                .iter()
                .map(|entry| entry.tail_whitespace.as_str()),
        )
        .unwrap_or_else(|| relations[0].tail_whitespace.clone());
        (head, tail)
    };
    let position = position.unwrap_or(relations.len()).min(relations.len());
    if position == relations.len() {
        match relations.last_mut() {
            None => relations.push(RelationsEntry {
                head_whitespace,
                alternatives: relation,
                tail_whitespace: String::new(),
            }),
            Some(last) => {
                let last_tail = std::mem::replace(&mut last.tail_whitespace, tail_whitespace);
                relations.push(RelationsEntry {
                    head_whitespace,
                    alternatives: relation,
                    tail_whitespace: last_tail,
                });
            }
        }
    } else if position == 0 {
        let first_head = relations[0].head_whitespace.clone();
        relations.insert(
            0,
            RelationsEntry {
                head_whitespace: first_head,
                alternatives: relation,
                tail_whitespace,
            },
        );
        relations[1].head_whitespace = head_whitespace;
    } else {
        relations.insert(
            position,
            RelationsEntry {
                head_whitespace,
                alternatives: relation,
                tail_whitespace,
            },
        );
    }
    if let Some(tail) = pointless_tail {
        relations.push(tail);
    }
}

/// Update a relation string to ensure a particular minimum version is
/// required.
///
/// OR-groups that mention the package are never edited in place, but groups
/// made redundant by the new constraint are dropped. Returns the input
/// unchanged when the constraint is already satisfied.
pub fn ensure_minimum_version(relationstr: &str, package: &str, minimum_version: &Version) -> String {
    let is_obsolete = |alternatives: &[PkgRelation]| {
        alternatives.iter().any(|r| {
            r.name == package
                && match &r.version {
                    Some((VersionConstraint::GreaterThan, version)) => version < minimum_version,
                    Some((VersionConstraint::GreaterThanEqual, version)) => {
                        version <= minimum_version
                    }
                    _ => false,
                }
        })
    };

    let mut relations = parse_relations(relationstr);
    let mut found = false;
    let mut changed = false;
    let mut obsolete_relations = Vec::new();
    for (i, entry) in relations.iter_mut().enumerate() {
        if entry.alternatives.is_empty() {
            continue;
        }
        let names = entry.names();
        if names.len() > 1 && names.contains(&package) && is_obsolete(&entry.alternatives) {
            obsolete_relations.push(i);
        }
        if names != [package] {
            continue;
        }
        found = true;
        let relation = &mut entry.alternatives[0];
        let needs_update = match &relation.version {
            None => true,
            Some((_, version)) => version < minimum_version,
        };
        if needs_update {
            relation.version = Some((
                VersionConstraint::GreaterThanEqual,
                minimum_version.clone(),
            ));
            changed = true;
        }
    }
    if !found {
        changed = true;
        push_relation(
            &mut relations,
            vec![PkgRelation::new(
                package,
                Some((
                    VersionConstraint::GreaterThanEqual,
                    minimum_version.clone(),
                )),
            )],
            None,
        );
    }
    for i in obsolete_relations.into_iter().rev() {
        relations.remove(i);
    }
    if changed {
        format_relations(&relations)
    } else {
        relationstr.to_string()
    }
}

/// Update a relation string to depend on an exact version.
///
/// # Errors
/// [`RelationError::ComplexRule`] when the package occurs in a multi-package
/// OR-group; [`RelationError::PositionOutOfRange`] for an invalid `position`.
pub fn ensure_exact_version(
    relationstr: &str,
    package: &str,
    version: &Version,
    position: Option<usize>,
) -> Result<String, RelationError> {
    let mut relations = parse_relations(relationstr);
    let mut found = false;
    let mut changed = false;
    for entry in relations.iter_mut() {
        if entry.alternatives.is_empty() {
            continue;
        }
        let names = entry.names();
        if names.len() > 1 && names.contains(&package) {
            return Err(RelationError::ComplexRule(package.to_string()));
        }
        if names != [package] {
            continue;
        }
        found = true;
        let relation = &mut entry.alternatives[0];
        let already_exact = matches!(
            &relation.version,
            Some((VersionConstraint::Equal, current)) if current == version
        );
        if !already_exact {
            relation.version = Some((VersionConstraint::Equal, version.clone()));
            changed = true;
        }
    }
    if !found {
        if let Some(position) = position {
            if position > relations.len() {
                return Err(RelationError::PositionOutOfRange(position, relations.len()));
            }
        }
        changed = true;
        push_relation(
            &mut relations,
            vec![PkgRelation::new(
                package,
                Some((VersionConstraint::Equal, version.clone())),
            )],
            position,
        );
    }
    if changed {
        Ok(format_relations(&relations))
    } else {
        Ok(relationstr.to_string())
    }
}

/// Add a dependency on a package unless one is already present.
///
/// # Errors
/// [`RelationError::ComplexRule`] when the package occurs in a multi-package
/// OR-group.
pub fn ensure_some_version(relationstr: &str, package: &str) -> Result<String, RelationError> {
    let mut relations = parse_relations(relationstr);
    for entry in &relations {
        if entry.alternatives.is_empty() {
            continue;
        }
        let names = entry.names();
        if names.len() > 1 && names.contains(&package) {
            return Err(RelationError::ComplexRule(package.to_string()));
        }
        if names == [package] {
            return Ok(relationstr.to_string());
        }
    }
    push_relation(&mut relations, parse_relation(package), None);
    Ok(format_relations(&relations))
}

/// Ensure that a relation exists, either by verifying that an existing entry
/// already implies it or by upgrading/adding an entry.
pub fn ensure_relation(relationstr: &str, new_relation: Vec<PkgRelation>) -> String {
    let mut relations = parse_relations(relationstr);
    let mut added = false;
    let mut to_remove = Vec::new();
    for i in 0..relations.len() {
        if relations[i].alternatives.is_empty() {
            continue;
        }
        if is_relation_implied(&new_relation, &relations[i].alternatives) {
            return relationstr.to_string();
        }
        if is_relation_implied(&relations[i].alternatives, &new_relation) {
            if added {
                to_remove.push(i);
            } else {
                relations[i].alternatives = new_relation.clone();
                added = true;
            }
        }
    }
    if !added {
        push_relation(&mut relations, new_relation, None);
    }
    for i in to_remove.into_iter().rev() {
        relations.remove(i);
    }
    format_relations(&relations)
}

/// Add a dependency to a relations string.
///
/// # Errors
/// [`RelationError::PositionOutOfRange`] for an invalid `position`.
pub fn add_dependency(
    relationstr: &str,
    relation: &str,
    position: Option<usize>,
) -> Result<String, RelationError> {
    let mut relations = parse_relations(relationstr);
    if let Some(position) = position {
        if position > relations.len() {
            return Err(RelationError::PositionOutOfRange(position, relations.len()));
        }
    }
    push_relation(&mut relations, parse_relation(relation), position);
    Ok(format_relations(&relations))
}

/// Filter out entries that `keep` rejects. Whitespace-only entries are always
/// kept; when the first entry is dropped, its spacing moves to its successor.
pub fn filter_dependencies(
    mut relations: Vec<RelationsEntry>,
    keep: impl Fn(&[PkgRelation]) -> bool,
) -> Vec<RelationsEntry> {
    let total = relations.len();
    let mut ret = Vec::new();
    for i in 0..total {
        let entry = relations[i].clone();
        if entry.alternatives.is_empty() || keep(&entry.alternatives) {
            ret.push(entry);
            continue;
        }
        if i == 0 && total > 1 {
            relations[1].head_whitespace = entry.head_whitespace.clone();
            relations[1].tail_whitespace = entry.tail_whitespace.clone();
        }
    }
    ret
}

/// Drop a dependency from a relations string. Returns the input unchanged if
/// the package is not present.
pub fn drop_dependency(relationstr: &str, package: &str) -> String {
    let relations = parse_relations(relationstr);
    let ret = filter_dependencies(relations.clone(), |alternatives| {
        !(alternatives.iter().all(|r| r.name == package))
    });
    if relations != ret {
        format_relations(&ret)
    } else {
        relationstr.to_string()
    }
}

/// Delete items from a comma-separated list, preserving the whitespace of the
/// remaining items.
pub fn delete_from_list(liststr: &str, items_to_delete: &[&str]) -> String {
    let items_to_delete = items_to_delete
        .iter()
        .map(|item| item.trim())
        .collect::<Vec<_>>();
    let mut items = liststr.split(',').map(String::from).collect::<Vec<_>>();
    let mut i = 0;
    while i < items.len() {
        if !items_to_delete.contains(&items[i].trim()) {
            i += 1;
            continue;
        }
        let deleted = items.remove(i);
        let head_whitespace = deleted
            .chars()
            .take_while(|c| c.is_whitespace())
            .collect::<String>();
        if i == 0 && !items.is_empty() {
            // copy the removed head's whitespace to the new first item
            items[0] = format!("{}{}", head_whitespace, items[0].trim_start());
        } else if i == items.len() && i > 1 {
            items[i - 1] = items[i - 1].trim_end().to_string();
        }
    }
    items.join(",")
}

/// Check whether `dep` is implied by `outer`: any package satisfying `outer`
/// also satisfies `dep`.
pub fn is_dep_implied(dep: &PkgRelation, outer: &PkgRelation) -> bool {
    use VersionConstraint::*;
    if dep.name != outer.name {
        return false;
    }
    let (dep_constraint, dep_version) = match &dep.version {
        None => return true,
        Some((constraint, version)) => (*constraint, version),
    };
    if outer.version.as_ref() == dep.version.as_ref() {
        return true;
    }
    let (outer_constraint, outer_version) = match &outer.version {
        None => return false,
        Some((constraint, version)) => (*constraint, version),
    };
    match dep_constraint {
        GreaterThanEqual => match outer_constraint {
            GreaterThan => outer_version > dep_version,
            GreaterThanEqual | Equal => outer_version >= dep_version,
            LessThan | LessThanEqual => false,
        },
        Equal => outer_constraint == Equal && outer_version == dep_version,
        LessThan => match outer_constraint {
            LessThan => outer_version <= dep_version,
            LessThanEqual | Equal => outer_version < dep_version,
            GreaterThan | GreaterThanEqual => false,
        },
        LessThanEqual => match outer_constraint {
            LessThanEqual | Equal | LessThan => outer_version <= dep_version,
            GreaterThan | GreaterThanEqual => false,
        },
        GreaterThan => match outer_constraint {
            GreaterThan => outer_version >= dep_version,
            Equal | GreaterThanEqual => outer_version > dep_version,
            LessThan | LessThanEqual => false,
        },
    }
}

/// Check whether the OR-group `inner` is implied by the OR-group `outer`.
///
/// `inner` is implied when any of its alternatives is implied by any
/// alternative of `outer`.
pub fn is_relation_implied(inner: &[PkgRelation], outer: &[PkgRelation]) -> bool {
    if inner == outer {
        return true;
    }
    // "bzr >= 1.3" is implied by "bzr >= 1.3 | libc6"
    inner
        .iter()
        .any(|inner_dep| outer.iter().any(|outer_dep| is_dep_implied(inner_dep, outer_dep)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    fn atom(s: &str) -> PkgRelation {
        let parsed = parse_relation(s);
        assert_eq!(parsed.len(), 1, "expected a single atom in {:?}", s);
        parsed.into_iter().next().unwrap()
    }

    #[test]
    fn test_parse_atom_simple() {
        let rel = atom("debhelper");
        assert_eq!(rel.name, "debhelper");
        assert_eq!(rel.version, None);
        assert_eq!(rel.to_string(), "debhelper");
    }

    #[test]
    fn test_parse_atom_version() {
        let rel = atom("debhelper (>= 9)");
        assert_eq!(rel.name, "debhelper");
        assert_eq!(
            rel.version,
            Some((VersionConstraint::GreaterThanEqual, v("9")))
        );
        assert_eq!(rel.to_string(), "debhelper (>= 9)");
    }

    #[test]
    fn test_parse_atom_full() {
        let rel = atom("foo:any (>= 1.0) [linux-any !hurd-i386] <!nocheck> <cross>");
        assert_eq!(rel.name, "foo");
        assert_eq!(rel.archqual.as_deref(), Some("any"));
        assert_eq!(
            rel.version,
            Some((VersionConstraint::GreaterThanEqual, v("1.0")))
        );
        assert_eq!(
            rel.arch,
            Some(vec![
                ArchRestriction {
                    enabled: true,
                    arch: "linux-any".to_string()
                },
                ArchRestriction {
                    enabled: false,
                    arch: "hurd-i386".to_string()
                },
            ])
        );
        assert_eq!(
            rel.restrictions,
            Some(vec![
                vec![BuildRestriction {
                    enabled: false,
                    profile: "nocheck".to_string()
                }],
                vec![BuildRestriction {
                    enabled: true,
                    profile: "cross".to_string()
                }],
            ])
        );
        assert_eq!(
            rel.to_string(),
            "foo:any (>= 1.0) [linux-any !hurd-i386] <!nocheck> <cross>"
        );
    }

    #[test]
    fn test_parse_atom_substvar_degrades() {
        let rel = atom("${misc:Depends}");
        assert_eq!(rel.name, "${misc:Depends}");
        assert_eq!(rel.version, None);
        assert_eq!(rel.to_string(), "${misc:Depends}");
    }

    #[test]
    fn test_parse_relations_empty() {
        assert_eq!(parse_relations(""), vec![]);
        assert_eq!(
            parse_relations("\n"),
            vec![RelationsEntry {
                head_whitespace: "\n".to_string(),
                alternatives: vec![],
                tail_whitespace: String::new(),
            }]
        );
    }

    #[test]
    fn test_parse_relations_simple() {
        assert_eq!(
            parse_relations("debhelper"),
            vec![RelationsEntry::new(vec![PkgRelation::simple("debhelper")])]
        );
        assert_eq!(
            parse_relations("  \ndebhelper"),
            vec![RelationsEntry {
                head_whitespace: "  \n".to_string(),
                alternatives: vec![PkgRelation::simple("debhelper")],
                tail_whitespace: String::new(),
            }]
        );
        assert_eq!(
            parse_relations("  \ndebhelper \n"),
            vec![RelationsEntry {
                head_whitespace: "  \n".to_string(),
                alternatives: vec![PkgRelation::simple("debhelper")],
                tail_whitespace: " \n".to_string(),
            }]
        );
    }

    #[test]
    fn test_format_relations_empty() {
        assert_eq!(format_relations(&[RelationsEntry::new(vec![])]), "");
        assert_eq!(
            format_relations(&[RelationsEntry {
                head_whitespace: "\n ".to_string(),
                alternatives: vec![],
                tail_whitespace: String::new(),
            }]),
            ""
        );
    }

    #[test]
    fn test_format_relations_simple() {
        assert_eq!(
            format_relations(&[RelationsEntry::new(vec![PkgRelation::simple("debhelper")])]),
            "debhelper"
        );
        assert_eq!(
            format_relations(&[RelationsEntry {
                head_whitespace: "  \n".to_string(),
                alternatives: vec![PkgRelation::simple("debhelper")],
                tail_whitespace: " \n".to_string(),
            }]),
            "  \ndebhelper "
        );
    }

    #[test]
    fn test_format_relations_multiple() {
        assert_eq!(
            format_relations(&[
                RelationsEntry::new(vec![PkgRelation::simple("debhelper")]),
                RelationsEntry {
                    head_whitespace: " ".to_string(),
                    alternatives: vec![PkgRelation::simple("blah")],
                    tail_whitespace: String::new(),
                },
            ]),
            "debhelper, blah"
        );
    }

    #[test]
    fn test_round_trip() {
        for s in [
            "debhelper (>= 9), dh-autoreconf",
            "debhelper (>= 9),\n dh-autoreconf,\n libc6-dev",
            "foo:any (>= 1.0) [linux-any] <!nocheck>",
            "python3 | python3-all",
            "\n foo,\n bar",
        ] {
            assert_eq!(format_relations(&parse_relations(s)), s, "{:?}", s);
        }
    }

    #[test]
    fn test_ensure_minimum_version_added() {
        assert_eq!(
            ensure_minimum_version("", "debhelper", &v("9")),
            "debhelper (>= 9)"
        );
        assert_eq!(
            ensure_minimum_version("blah", "debhelper", &v("9")),
            "blah, debhelper (>= 9)"
        );
    }

    #[test]
    fn test_ensure_minimum_version_unchanged() {
        assert_eq!(
            ensure_minimum_version("debhelper (>= 9)", "debhelper", &v("9")),
            "debhelper (>= 9)"
        );
        assert_eq!(
            ensure_minimum_version("debhelper (= 9)", "debhelper", &v("9")),
            "debhelper (= 9)"
        );
        assert_eq!(
            ensure_minimum_version("debhelper (>= 9)", "debhelper", &v("9~")),
            "debhelper (>= 9)"
        );
    }

    #[test]
    fn test_ensure_minimum_version_updated() {
        assert_eq!(
            ensure_minimum_version("debhelper", "debhelper", &v("9")),
            "debhelper (>= 9)"
        );
        assert_eq!(
            ensure_minimum_version("blah, debhelper", "debhelper", &v("9")),
            "blah, debhelper (>= 9)"
        );
        assert_eq!(
            ensure_minimum_version("blah, debhelper (>= 8)", "debhelper", &v("9")),
            "blah, debhelper (>= 9)"
        );
    }

    #[test]
    fn test_ensure_minimum_version_idempotent() {
        let updated = ensure_minimum_version("blah", "debhelper", &v("9"));
        assert_eq!(updated, ensure_minimum_version(&updated, "debhelper", &v("9")));
        assert_eq!(updated, ensure_minimum_version(&updated, "debhelper", &v("8")));
    }

    #[test]
    fn test_ensure_minimum_version_drops_obsolete_or_group() {
        assert_eq!(
            ensure_minimum_version(
                "blah, debhelper (>= 8), debhelper (>= 8.1) | dh-systemd",
                "debhelper",
                &v("9")
            ),
            "blah, debhelper (>= 9)"
        );
        assert_eq!(
            ensure_minimum_version(
                "blah, debhelper (>= 8), debhelper (>= 10) | dh-systemd",
                "debhelper",
                &v("9")
            ),
            "blah, debhelper (>= 9), debhelper (>= 10) | dh-systemd"
        );
    }

    #[test]
    fn test_ensure_exact_version() {
        assert_eq!(
            ensure_exact_version("", "debhelper", &v("9"), None).unwrap(),
            "debhelper (= 9)"
        );
        assert_eq!(
            ensure_exact_version("blah", "debhelper", &v("9"), None).unwrap(),
            "blah, debhelper (= 9)"
        );
        assert_eq!(
            ensure_exact_version("debhelper (= 9)", "debhelper", &v("9"), None).unwrap(),
            "debhelper (= 9)"
        );
        assert_eq!(
            ensure_exact_version("debhelper (>= 9)", "debhelper", &v("9"), None).unwrap(),
            "debhelper (= 9)"
        );
        assert_eq!(
            ensure_exact_version("blah, debhelper (= 10)", "debhelper", &v("9"), None).unwrap(),
            "blah, debhelper (= 9)"
        );
    }

    #[test]
    fn test_ensure_exact_version_multiline() {
        assert_eq!(
            ensure_exact_version(
                "\n debhelper-compat (= 11),\n pkg-config,\n uuid-dev",
                "debhelper-compat",
                &v("12"),
                None
            )
            .unwrap(),
            "\n debhelper-compat (= 12),\n pkg-config,\n uuid-dev"
        );
    }

    #[test]
    fn test_ensure_exact_version_complex() {
        let err = ensure_exact_version("foo | bar", "foo", &v("2"), None).unwrap_err();
        assert_eq!(err, RelationError::ComplexRule("foo".to_string()));
        let err = ensure_exact_version("bar | foo", "foo", &v("2"), None).unwrap_err();
        assert_eq!(err, RelationError::ComplexRule("foo".to_string()));
    }

    #[test]
    fn test_ensure_some_version() {
        assert_eq!(ensure_some_version("", "debhelper").unwrap(), "debhelper");
        assert_eq!(
            ensure_some_version("blah", "debhelper").unwrap(),
            "blah, debhelper"
        );
        assert_eq!(
            ensure_some_version("debhelper (>= 9)", "debhelper").unwrap(),
            "debhelper (>= 9)"
        );
        assert_eq!(
            ensure_some_version("debhelper", "debhelper").unwrap(),
            "debhelper"
        );
    }

    #[test]
    fn test_ensure_relation() {
        assert_eq!(
            ensure_relation("", parse_relation("debhelper (>= 9)")),
            "debhelper (>= 9)"
        );
        assert_eq!(
            ensure_relation("blah", parse_relation("debhelper (>= 9)")),
            "blah, debhelper (>= 9)"
        );
        assert_eq!(
            ensure_relation("debhelper (= 9)", parse_relation("debhelper (>= 9)")),
            "debhelper (= 9)"
        );
        assert_eq!(
            ensure_relation("debhelper (>= 9)", parse_relation("debhelper (>= 9~)")),
            "debhelper (>= 9)"
        );
        assert_eq!(
            ensure_relation(
                "blah, debhelper (>= 8), debhelper (>= 8.1) | dh-systemd",
                parse_relation("debhelper (>= 9)")
            ),
            "blah, debhelper (>= 9)"
        );
    }

    #[test]
    fn test_drop_dependency() {
        assert_eq!(
            drop_dependency("debhelper (>= 9), dh-autoreconf", "dh-autoreconf"),
            "debhelper (>= 9)"
        );
        assert_eq!(
            drop_dependency("debhelper (>= 9), dh-autoreconf", "debhelper"),
            "dh-autoreconf"
        );
        assert_eq!(drop_dependency("debhelper (>= 9)", "debhelper"), "");
        assert_eq!(
            drop_dependency("debhelper (>= 9), debhelper-compat (= 12)", "debhelper"),
            "debhelper-compat (= 12)"
        );
    }

    #[test]
    fn test_add_dependency() {
        assert_eq!(
            add_dependency("debhelper (>= 9)", "dh-autoreconf", None).unwrap(),
            "debhelper (>= 9), dh-autoreconf"
        );
        assert_eq!(
            add_dependency("debhelper (>= 9)", "${misc:Depends}", None).unwrap(),
            "debhelper (>= 9), ${misc:Depends}"
        );
        assert_eq!(
            add_dependency("debhelper (>= 9),", "blah", None).unwrap(),
            "debhelper (>= 9), blah,"
        );
    }

    #[test]
    fn test_add_dependency_indentation() {
        assert_eq!(
            add_dependency("foo,\n    bar", "blah", None).unwrap(),
            "foo,\n    bar,\n    blah"
        );
        assert_eq!(
            add_dependency("foo,\n bar", "blah", None).unwrap(),
            "foo,\n bar,\n blah"
        );
        assert_eq!(
            add_dependency("foo,\n bar\n", "blah", None).unwrap(),
            "foo,\n bar,\n blah"
        );
    }

    #[test]
    fn test_add_dependency_insert() {
        assert_eq!(
            add_dependency("foo,\n    bar", "blah", Some(0)).unwrap(),
            "blah,\n    foo,\n    bar"
        );
        assert_eq!(
            add_dependency("foo,\n    bar", "blah", Some(1)).unwrap(),
            "foo,\n    blah,\n    bar"
        );
    }

    #[test]
    fn test_add_dependency_odd_syntax() {
        assert_eq!(
            add_dependency("\n foo\n , bar\n", "blah", None).unwrap(),
            "\n foo\n , bar\n , blah"
        );
        assert_eq!(
            add_dependency("\n foo\n , bar\n", "blah", Some(1)).unwrap(),
            "\n foo\n , blah\n , bar"
        );
    }

    #[test]
    fn test_get_relation() {
        assert_eq!(
            get_relation("", "debhelper"),
            Err(LookupError::NotFound("debhelper".to_string()))
        );
        assert_eq!(
            get_relation("blah", "debhelper"),
            Err(LookupError::NotFound("debhelper".to_string()))
        );
        assert_eq!(
            get_relation("debhelper (>= 9)", "debhelper"),
            Ok((0, parse_relation("debhelper (>= 9)")))
        );
        assert_eq!(
            get_relation("blah, debhelper (= 9)", "debhelper"),
            Ok((1, parse_relation("debhelper (= 9)")))
        );
        assert_eq!(
            get_relation("blah | debhelper (= 9)", "debhelper"),
            Err(LookupError::Complex("debhelper".to_string()))
        );
        assert_eq!(
            get_relation("blah, debhelper (= 9) | debhelper (<< 10)", "debhelper"),
            Err(LookupError::Complex("debhelper".to_string()))
        );
    }

    #[test]
    fn test_iter_relations() {
        assert_eq!(iter_relations("", "debhelper"), vec![]);
        assert_eq!(iter_relations("blah", "debhelper"), vec![]);
        assert_eq!(
            iter_relations("blah, debhelper (= 9)", "debhelper"),
            vec![(1, parse_relation("debhelper (= 9)"))]
        );
        assert_eq!(
            iter_relations("blah | debhelper (= 9)", "debhelper"),
            vec![(0, parse_relation("blah | debhelper (= 9)"))]
        );
    }

    #[test]
    fn test_delete_from_list() {
        assert_eq!(delete_from_list("a, b, c", &["b"]), "a, c");
        assert_eq!(delete_from_list("a, b, c", &["b "]), "a, c");
        assert_eq!(delete_from_list("a, b, c", &["a"]), "b, c");
        assert_eq!(delete_from_list(" a, b, c", &["a"]), " b, c");
        assert_eq!(delete_from_list("a, b, c", &["c"]), "a, b");
        assert_eq!(delete_from_list("a, b , c", &["c"]), "a, b");
        assert_eq!(delete_from_list("a", &["c"]), "a");
        assert_eq!(delete_from_list("a", &["a"]), "");
    }

    #[test]
    fn test_is_dep_implied_no_version() {
        assert!(is_dep_implied(&atom("bzr"), &atom("bzr")));
        assert!(is_dep_implied(&atom("bzr"), &atom("bzr (>= 3)")));
        assert!(is_dep_implied(&atom("bzr"), &atom("bzr (<< 3)")));
    }

    #[test]
    fn test_is_dep_implied_wrong_package() {
        assert!(!is_dep_implied(&atom("bzr"), &atom("foo (<< 3)")));
    }

    #[test]
    fn test_is_dep_implied_versions() {
        assert!(!is_dep_implied(&atom("bzr (>= 3)"), &atom("bzr (<< 3)")));
        assert!(is_dep_implied(&atom("bzr (>= 3)"), &atom("bzr (= 3)")));
        assert!(!is_dep_implied(&atom("bzr (= 3)"), &atom("bzr (>= 3)")));
        assert!(!is_dep_implied(&atom("bzr (>= 3)"), &atom("bzr (>> 3)")));
        assert!(!is_dep_implied(&atom("bzr (= 3)"), &atom("bzr (= 4)")));
        assert!(!is_dep_implied(&atom("bzr (>= 3)"), &atom("bzr (>= 2)")));
        assert!(is_dep_implied(&atom("bzr (>= 3)"), &atom("bzr (>= 3)")));
        assert!(is_dep_implied(&atom("bzr (<< 3)"), &atom("bzr (<< 3)")));
        assert!(is_dep_implied(&atom("bzr (<= 3)"), &atom("bzr (<< 3)")));
        assert!(!is_dep_implied(&atom("bzr (>= 2)"), &atom("bzr (<< 3)")));
        assert!(!is_dep_implied(&atom("bzr (<< 2)"), &atom("bzr (<< 3)")));
        assert!(!is_dep_implied(&atom("bzr (<= 2)"), &atom("bzr (<< 3)")));
        assert!(is_dep_implied(&atom("bzr (<= 5)"), &atom("bzr (<< 3)")));
        assert!(is_dep_implied(&atom("bzr (<= 5)"), &atom("bzr (= 3)")));
        assert!(!is_dep_implied(&atom("bzr (<= 5)"), &atom("bzr (>= 3)")));
        assert!(is_dep_implied(&atom("bzr (>> 5)"), &atom("bzr (>> 6)")));
        assert!(is_dep_implied(&atom("bzr (>> 5)"), &atom("bzr (>> 5)")));
        assert!(!is_dep_implied(&atom("bzr (>> 5)"), &atom("bzr (>> 4)")));
        assert!(is_dep_implied(&atom("bzr (>> 5)"), &atom("bzr (= 6)")));
        assert!(!is_dep_implied(&atom("bzr (>> 5)"), &atom("bzr (= 5)")));
    }

    #[test]
    fn test_is_relation_implied_reflexive() {
        for s in ["bzr", "bzr (= 3)", "bzr (>= 3) | foo", "${misc:Depends}"] {
            let relation = parse_relation(s);
            assert!(is_relation_implied(&relation, &relation), "{:?}", s);
        }
    }

    #[test]
    fn test_is_relation_implied() {
        assert!(!is_relation_implied(
            &parse_relation("bzr"),
            &parse_relation("bar")
        ));
        assert!(!is_relation_implied(
            &parse_relation("bzr (= 3)"),
            &parse_relation("bzr")
        ));
        assert!(!is_relation_implied(
            &parse_relation("bzr (= 3)"),
            &parse_relation("bzr (>= 2)")
        ));
        assert!(!is_relation_implied(
            &parse_relation("bzr (= 3)"),
            &parse_relation("bzr | foo")
        ));
        assert!(!is_relation_implied(
            &parse_relation("bzr"),
            &parse_relation("bzr | foo")
        ));
        assert!(is_relation_implied(
            &parse_relation("bzr | foo"),
            &parse_relation("bzr | foo")
        ));
        assert!(is_relation_implied(
            &parse_relation("bzr (>= 3)"),
            &parse_relation("bzr (>= 4)")
        ));
        assert!(is_relation_implied(
            &parse_relation("bzr | foo"),
            &parse_relation("bzr")
        ));
        assert!(!is_relation_implied(
            &parse_relation("bzr (= 3)"),
            &parse_relation("bzr (>= 3)")
        ));
    }
}
