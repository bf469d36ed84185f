use std::sync::Arc;

// other structures use HashSet or HashMap with a fast hasher
use core::hash::{BuildHasherDefault, Hasher};
use seahash::SeaHasher;

// custom made ordering for paths
use std::cmp::Ordering;
// used to print out readable forms of a construct
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::Error as SerdeDeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::datatype::{CellValue, Date};
use crate::error::{CellbaseError, Result};

pub type PathHasher = BuildHasherDefault<SeaHasher>;
pub type OtherHasher = BuildHasherDefault<SeaHasher>;

lazy_static! {
    // either a quoted segment with doubled quotes as escapes, or a bare run without dots and quotes
    static ref SEGMENT: Regex = Regex::new(r#"^(?:"((?:[^"]|"")*)"|([^."]+))"#).unwrap();
}

// ------------- Path -------------
/// An ordered, hierarchical identifier. Equality, ordering and hashing are
/// structural over the segments; a shorter path sorts before its descendants.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Path {
    segments: Arc<[String]>,
}

/// Identifies an entity (a row).
pub type RowPath = Path;
/// Identifies an attribute (a column).
pub type ColumnPath = Path;

impl Path {
    pub fn new<S: Into<String>, I: IntoIterator<Item = S>>(segments: I) -> Self {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }
    pub fn root() -> Self {
        Self::default()
    }
    /// Parses the dotted text form, e.g. `user.1` or `"a.b".c`.
    pub fn parse(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Ok(Self::root());
        }
        let mut segments = Vec::new();
        let mut rest = text;
        loop {
            let captures = SEGMENT.captures(rest).ok_or_else(|| {
                CellbaseError::InvalidArgument(format!("'{}' is not a valid path", text))
            })?;
            let consumed = captures.get(0).map_or(0, |m| m.end());
            match (captures.get(1), captures.get(2)) {
                (Some(quoted), _) => segments.push(quoted.as_str().replace("\"\"", "\"")),
                (None, Some(bare)) => segments.push(bare.as_str().to_owned()),
                _ => unreachable!("segment pattern has exactly two alternatives"),
            }
            rest = &rest[consumed..];
            if rest.is_empty() {
                break;
            }
            rest = rest.strip_prefix('.').ok_or_else(|| {
                CellbaseError::InvalidArgument(format!("'{}' is not a valid path", text))
            })?;
        }
        Ok(Self::new(segments))
    }
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
    pub fn len(&self) -> usize {
        self.segments.len()
    }
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
    pub fn head(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }
    /// Everything after the first segment.
    pub fn tail(&self) -> Path {
        Self::new(self.segments.iter().skip(1).cloned())
    }
    pub fn parent(&self) -> Option<Path> {
        match self.segments.len() {
            0 => None,
            n => Some(Self::new(self.segments[..n - 1].iter().cloned())),
        }
    }
    pub fn join(&self, other: &Path) -> Path {
        Self::new(self.segments.iter().chain(other.segments.iter()).cloned())
    }
    pub fn push<S: Into<String>>(&self, segment: S) -> Path {
        let mut segments = self.segments.to_vec();
        segments.push(segment.into());
        Self::new(segments)
    }
    /// Descendant-or-self test: `a.b` starts with `a` and with `a.b`.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.segments.starts_with(&prefix.segments)
    }
    pub fn is_descendant_of(&self, ancestor: &Path) -> bool {
        self.len() > ancestor.len() && self.starts_with(ancestor)
    }
    /// Shard selection and similar spreading, stable across runs.
    pub fn stable_hash(&self) -> u64 {
        let mut hasher = SeaHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}
impl Ord for Path {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments.iter().cmp(other.segments.iter())
    }
}
impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for segment in self.segments.iter() {
            if !first {
                write!(f, ".")?;
            }
            first = false;
            if segment.is_empty() || segment.contains(['.', '"']) {
                write!(f, "\"{}\"", segment.replace('"', "\"\""))?;
            } else {
                write!(f, "{}", segment)?;
            }
        }
        Ok(())
    }
}
impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Path({})", self)
    }
}
impl FromStr for Path {
    type Err = CellbaseError;
    fn from_str(s: &str) -> Result<Path> {
        Path::parse(s)
    }
}
impl From<&str> for Path {
    /// A single segment, taken literally.
    fn from(segment: &str) -> Self {
        Self::new([segment])
    }
}
impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Path::parse(&text).map_err(D::Error::custom)
    }
}

// ------------- Observation -------------
/// "Column had value at time", as recorded under a row.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize)]
pub struct Observation {
    pub column: ColumnPath,
    pub value: CellValue,
    pub ts: Date,
}
impl Observation {
    pub fn new<C: Into<ColumnPath>, V: Into<CellValue>>(column: C, value: V, ts: Date) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
            ts,
        }
    }
}

/// "Row had value at time", as recorded under a column.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize)]
pub struct ColumnObservation {
    pub row: RowPath,
    pub value: CellValue,
    pub ts: Date,
}
impl ColumnObservation {
    pub fn new<R: Into<RowPath>, V: Into<CellValue>>(row: R, value: V, ts: Date) -> Self {
        Self {
            row: row.into(),
            value: value.into(),
            ts,
        }
    }
}

/// The full quadruple, independent of which view it was read from.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize)]
pub struct Fact {
    pub row: RowPath,
    pub column: ColumnPath,
    pub ts: Date,
    pub value: CellValue,
}
impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}, {}, {}, {}]", self.row, self.column, self.value, self.ts)
    }
}

// ------------- Row / Column -------------
/// The row-major ingestion unit.
#[derive(Clone, Debug, Default)]
pub struct Row {
    pub path: RowPath,
    pub observations: Vec<Observation>,
}
impl Row {
    pub fn new(path: RowPath, observations: Vec<Observation>) -> Self {
        Self { path, observations }
    }
}

/// The column-major ingestion unit; the transpose of a set of rows.
#[derive(Clone, Debug, Default)]
pub struct Column {
    pub path: ColumnPath,
    pub observations: Vec<ColumnObservation>,
}
impl Column {
    pub fn new(path: ColumnPath, observations: Vec<ColumnObservation>) -> Self {
        Self { path, observations }
    }
}
