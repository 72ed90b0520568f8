//! Helpers for manipulating Debian version strings.

use chrono::NaiveDate;
use debversion::Version;
use regex::Regex;
use std::sync::OnceLock;

/// Vendors with their own revision conventions.
pub const COMMON_VENDORS: &[&str] = &["debian", "ubuntu", "kali"];

fn re(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).unwrap())
}

/// Extract git snapshot information from an upstream version string.
///
/// Returns `(git id, date)`, either of which may be absent.
pub fn git_snapshot_data_from_version(version: &str) -> (Option<String>, Option<String>) {
    static FULL: OnceLock<Regex> = OnceLock::new();
    static COUNTED: OnceLock<Regex> = OnceLock::new();
    static DATE_ONLY: OnceLock<Regex> = OnceLock::new();
    static NEXT: OnceLock<Regex> = OnceLock::new();
    let mut git_id = None;
    let mut date = None;
    if version.contains("+git") || version.contains("~git") || version.contains("-git") {
        let m = re(
            &FULL,
            r".*[~+-]git([0-9]{4})([0-9]{2})([0-9]{2})\.([0-9a-f]{7}).*",
        )
        .captures(version)
        .or_else(|| {
            re(
                &COUNTED,
                r".*[~+-]git([0-9]{4})([0-9]{2})([0-9]{2})\.[0-9+]\.([0-9a-f]{7}).*",
            )
            .captures(version)
        });
        if let Some(m) = m {
            git_id = Some(m[4].to_string());
            date = Some(format!("{}-{}-{}", &m[1], &m[2], &m[3]));
        } else if let Some(m) = re(&DATE_ONLY, r".*[~+]git([0-9]{4})([0-9]{2})([0-9]{2}).*")
            .captures(version)
        {
            date = Some(format!("{}-{}-{}", &m[1], &m[2], &m[3]));
        }
    }
    if let Some(m) = re(&NEXT, r".*\+next\.([0-9]{4})([0-9]{2})([0-9]{2}).*").captures(version) {
        date = Some(format!("{}-{}-{}", &m[1], &m[2], &m[3]));
    }
    (git_id, date)
}

/// Mangle a Debian version string into a git ref name, following DEP-14.
pub fn mangle_version_for_git(version: &str) -> String {
    let mut manipulated = version
        .replace('~', "_")
        .replace(':', "%")
        .replace("..", ".#.");
    if manipulated.ends_with('.') {
        manipulated.push('#');
    }
    if manipulated.ends_with(".lock") {
        manipulated.truncate(manipulated.len() - 4);
        manipulated.push_str("#lock");
    }
    manipulated
}

/// The debian revision to use for the first upload to a distribution.
pub fn initial_debian_revision(distribution_name: &str) -> &'static str {
    if distribution_name == "ubuntu" {
        "0ubuntu1"
    } else {
        "1"
    }
}

/// Build a package version from an upstream version and revision.
pub fn new_upstream_package_version(
    upstream_version: &str,
    debian_revision: &str,
    epoch: Option<u32>,
) -> Version {
    Version {
        epoch,
        upstream_version: upstream_version.to_string(),
        debian_revision: Some(debian_revision.to_string()),
    }
}

/// Determine the package version for a new upstream release.
pub fn new_package_version(
    upstream_version: &str,
    distribution_name: &str,
    epoch: Option<u32>,
) -> Version {
    new_upstream_package_version(
        upstream_version,
        initial_debian_revision(distribution_name),
        epoch,
    )
}

/// An upstream VCS revision encoded in a version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotRevision {
    /// A bzr revision number.
    Bzr(String),
    /// A svn revision number.
    Svn(String),
    /// A git commit id.
    Git(String),
    /// A snapshot date (`YYYYMMDD`) without a commit id.
    Date(String),
}

/// Return the upstream revision specifier if the upstream version appears to
/// be a VCS snapshot.
pub fn get_snapshot_revision(upstream_version: &str) -> Option<SnapshotRevision> {
    static BZR: OnceLock<Regex> = OnceLock::new();
    static SVN: OnceLock<Regex> = OnceLock::new();
    static GIT: OnceLock<Regex> = OnceLock::new();
    static DATE: OnceLock<Regex> = OnceLock::new();
    if let Some(m) = re(&BZR, r"(?:~|\+)bzr([0-9]+)$").captures(upstream_version) {
        return Some(SnapshotRevision::Bzr(m[1].to_string()));
    }
    if let Some(m) = re(&SVN, r"(?:~|\+)svn([0-9]+)$").captures(upstream_version) {
        return Some(SnapshotRevision::Svn(m[1].to_string()));
    }
    if let Some(m) = re(&GIT, r"^(.*)([\+~])git(\d{8})\.([a-f0-9]{7})$").captures(upstream_version)
    {
        return Some(SnapshotRevision::Git(m[4].to_string()));
    }
    if let Some(m) = re(&DATE, r"^(.*)([\+~])git(\d{8})$").captures(upstream_version) {
        return Some(SnapshotRevision::Date(m[3].to_string()));
    }
    None
}

/// A new upstream revision to encode into a version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamRevision {
    /// A git commit (id is truncated to 7 characters) and its commit date.
    Git {
        /// Commit id.
        id: String,
        /// Commit date.
        date: NaiveDate,
    },
    /// A bzr revision number.
    Bzr(String),
    /// A svn revision number.
    Svn(u64),
}

/// Update the VCS revision in an upstream version string, bumping an
/// existing snapshot marker or appending one separated by `sep`.
pub fn upstream_version_add_revision(
    version_string: &str,
    sep: char,
    revision: &UpstreamRevision,
) -> String {
    static BZR: OnceLock<Regex> = OnceLock::new();
    static GIT_PLAIN: OnceLock<Regex> = OnceLock::new();
    static GIT_COUNTED: OnceLock<Regex> = OnceLock::new();
    static GIT_DATE: OnceLock<Regex> = OnceLock::new();
    static SVN: OnceLock<Regex> = OnceLock::new();
    let mut version_string = version_string;
    for known_suffix in ["+dfsg", "+ds"] {
        if let Some(stripped) = version_string.strip_suffix(known_suffix) {
            version_string = stripped;
        }
    }
    match revision {
        UpstreamRevision::Bzr(revno) => {
            if let Some(m) = re(&BZR, r"^(.*)([\+~])bzr(\d+)$").captures(version_string) {
                format!("{}{}bzr{}", &m[1], &m[2], revno)
            } else {
                format!("{}{}bzr{}", version_string, sep, revno)
            }
        }
        UpstreamRevision::Git { id, date } => {
            let id: String = id.chars().take(7).collect();
            let date = date.format("%Y%m%d").to_string();
            if let Some(m) =
                re(&GIT_PLAIN, r"^(.*)([\+~-])git(\d{8})\.([a-f0-9]{7})$").captures(version_string)
            {
                return format!("{}{}git{}.{}", &m[1], &m[2], date, id);
            }
            if let Some(m) = re(&GIT_COUNTED, r"^(.*)([\+~-])git(\d{8})\.(\d+)\.([a-f0-9]{7})$")
                .captures(version_string)
            {
                let snapshot = if m[3] == date {
                    m[4].parse::<u64>().map(|n| n + 1).unwrap_or(0)
                } else {
                    0
                };
                return format!("{}{}git{}.{}.{}", &m[1], &m[2], date, snapshot, id);
            }
            if let Some(m) = re(&GIT_DATE, r"^(.*)([\+~-])git(\d{8})$").captures(version_string) {
                return format!("{}{}git{}", &m[1], &m[2], date);
            }
            format!("{}{}git{}.1.{}", version_string, sep, date, id)
        }
        UpstreamRevision::Svn(revno) => {
            if let Some(m) = re(&SVN, r"^(.*)([\+~])svn(\d+)$").captures(version_string) {
                format!("{}{}svn{}", &m[1], &m[2], revno)
            } else {
                format!("{}{}svn{}", version_string, sep, revno)
            }
        }
    }
}

/// Make an upstream version string suitable for use in a Debian version.
pub fn debianize_upstream_version(version: &str) -> String {
    let mut version = version.to_string();
    if version.matches('_').count() == 1 && version.contains('.') {
        // perl-style versions just drop the underscore
        version = version.replace('_', "");
    }
    if version.contains('_') && !version.contains('.') {
        version = version.replace('_', ".");
    }
    version = version.replace("-rc", "~rc");
    version = version.replace("-beta", "~beta");
    version = version.replace("-alpha", "~alpha");
    version
}

/// Check whether an upstream version string matches an upstream release,
/// ignoring dfsg/snapshot suffixes.
pub fn matches_release(upstream_version: &str, release_version: &str) -> bool {
    static SUFFIXED: OnceLock<Regex> = OnceLock::new();
    static SEPARATED: OnceLock<Regex> = OnceLock::new();
    let release_version = release_version.to_lowercase();
    let upstream_version = upstream_version.to_lowercase();
    if let Some(m) = re(&SUFFIXED, r"(.*)([~+-])(ds|dfsg|git|bzr|svn|hg).*")
        .captures(&upstream_version)
    {
        if &m[1] == release_version {
            return true;
        }
    }
    if let Some(m) = re(&SEPARATED, r"(.*)([~+-]).*").captures(&upstream_version) {
        if &m[1] == release_version {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_snapshot_data_from_version() {
        assert_eq!(
            git_snapshot_data_from_version("1.0~git20200101.abcdef1"),
            (Some("abcdef1".to_string()), Some("2020-01-01".to_string()))
        );
        assert_eq!(
            git_snapshot_data_from_version("1.0+git20200101"),
            (None, Some("2020-01-01".to_string()))
        );
        assert_eq!(git_snapshot_data_from_version("1.0"), (None, None));
        assert_eq!(
            git_snapshot_data_from_version("1.0+next.20200101"),
            (None, Some("2020-01-01".to_string()))
        );
    }

    #[test]
    fn test_mangle_version_for_git() {
        assert_eq!(mangle_version_for_git("1.0~rc1"), "1.0_rc1");
        assert_eq!(mangle_version_for_git("1:1.0"), "1%1.0");
        assert_eq!(mangle_version_for_git("1.0."), "1.0.#");
        assert_eq!(mangle_version_for_git("1.0..1"), "1.0.#.1");
        assert_eq!(mangle_version_for_git("1.0.lock"), "1.0.#lock");
    }

    #[test]
    fn test_new_package_version() {
        assert_eq!(
            new_package_version("1.0", "debian", None).to_string(),
            "1.0-1"
        );
        assert_eq!(
            new_package_version("1.0", "ubuntu", None).to_string(),
            "1.0-0ubuntu1"
        );
        assert_eq!(
            new_package_version("1.0", "debian", Some(1)).to_string(),
            "1:1.0-1"
        );
    }

    #[test]
    fn test_get_snapshot_revision() {
        assert_eq!(
            get_snapshot_revision("1.0+bzr42"),
            Some(SnapshotRevision::Bzr("42".to_string()))
        );
        assert_eq!(
            get_snapshot_revision("1.0~svn1234"),
            Some(SnapshotRevision::Svn("1234".to_string()))
        );
        assert_eq!(
            get_snapshot_revision("1.0+git20200101.abcdef1"),
            Some(SnapshotRevision::Git("abcdef1".to_string()))
        );
        assert_eq!(
            get_snapshot_revision("1.0+git20200101"),
            Some(SnapshotRevision::Date("20200101".to_string()))
        );
        assert_eq!(get_snapshot_revision("1.0"), None);
    }

    #[test]
    fn test_upstream_version_add_revision_git() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let git = UpstreamRevision::Git {
            id: "abcdef1deadbeef".to_string(),
            date,
        };
        assert_eq!(
            upstream_version_add_revision("1.0", '+', &git),
            "1.0+git20200101.1.abcdef1"
        );
        assert_eq!(
            upstream_version_add_revision("1.0+git20190101", '+', &git),
            "1.0+git20200101"
        );
        assert_eq!(
            upstream_version_add_revision("1.0+git20190101.aaaaaaa", '+', &git),
            "1.0+git20200101.abcdef1"
        );
        assert_eq!(
            upstream_version_add_revision("1.0+git20200101.1.aaaaaaa", '+', &git),
            "1.0+git20200101.2.abcdef1"
        );
        assert_eq!(
            upstream_version_add_revision("1.0+git20190101.1.aaaaaaa", '+', &git),
            "1.0+git20200101.0.abcdef1"
        );
        assert_eq!(
            upstream_version_add_revision("1.0+dfsg", '+', &git),
            "1.0+git20200101.1.abcdef1"
        );
    }

    #[test]
    fn test_upstream_version_add_revision_bzr() {
        let bzr = UpstreamRevision::Bzr("43".to_string());
        assert_eq!(upstream_version_add_revision("1.0+bzr42", '+', &bzr), "1.0+bzr43");
        assert_eq!(upstream_version_add_revision("1.0", '+', &bzr), "1.0+bzr43");
    }

    #[test]
    fn test_upstream_version_add_revision_svn() {
        let svn = UpstreamRevision::Svn(4);
        assert_eq!(upstream_version_add_revision("1.0+svn3", '+', &svn), "1.0+svn4");
        assert_eq!(upstream_version_add_revision("1.0", '~', &svn), "1.0~svn4");
    }

    #[test]
    fn test_debianize_upstream_version() {
        assert_eq!(debianize_upstream_version("1.0"), "1.0");
        assert_eq!(debianize_upstream_version("1.0-rc1"), "1.0~rc1");
        assert_eq!(debianize_upstream_version("1.0-beta2"), "1.0~beta2");
        assert_eq!(debianize_upstream_version("5.30_1"), "5.301");
        assert_eq!(debianize_upstream_version("1_0"), "1.0");
    }

    #[test]
    fn test_matches_release() {
        assert!(matches_release("1.0+git20200101", "1.0"));
        assert!(matches_release("1.0+dfsg", "1.0"));
        assert!(matches_release("1.0~rc1", "1.0"));
        assert!(!matches_release("1.1+dfsg", "1.0"));
        assert!(!matches_release("1.0", "1.0"));
    }
}
