use std::cmp::Ordering;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref DOTTED_VERSION_REGEX: Regex =
        Regex::new(r"^[vV]?(\d+(?:\.\d+)*)(?:-([0-9A-Za-z.-]+))?(?:\+[0-9A-Za-z.-]+)?$").unwrap();
}

/// A version with any number of dotted numeric segments, as compared by the `$v*` operators.
///
/// Segments compare numerically, with missing trailing segments counting as zero, so `1.2` equals
/// `1.2.0` and `1.2.3.5` is greater than `1.2.3`. A prerelease sorts before the release it
/// belongs to and prereleases are ordered by semver precedence. Build metadata is ignored.
#[derive(Clone, Debug)]
pub struct DottedVersion {
    segments: Vec<u64>,
    prerelease: Option<semver::Prerelease>,
}

impl DottedVersion {
    /// Parse a version string, tolerating a leading `v`. Returns None if it is not a version.
    pub fn parse(raw: &str) -> Option<DottedVersion> {
        let captures = DOTTED_VERSION_REGEX.captures(raw.trim())?;
        let segments = captures
            .get(1)?
            .as_str()
            .split('.')
            .map(|segment| segment.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;
        let prerelease = match captures.get(2) {
            Some(pre) => Some(semver::Prerelease::new(pre.as_str()).ok()?),
            None => None,
        };
        Some(DottedVersion {
            segments,
            prerelease,
        })
    }

    fn segment(&self, i: usize) -> u64 {
        self.segments.get(i).copied().unwrap_or(0)
    }
}

impl Ord for DottedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        (0..len)
            .map(|i| self.segment(i).cmp(&other.segment(i)))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or_else(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(l), Some(r)) => l.cmp(r),
            })
    }
}

impl PartialOrd for DottedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DottedVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DottedVersion {}
