// used for persistence
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};

// used for timestamps in the database
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

// used to (de)serialize values to and from the JSON representation
use serde::de::Error as SerdeDeError;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// used to print out readable forms of a data type
use std::fmt;
// used to indicate that data types need to be hashable
use std::hash::{Hash, Hasher};
// custom made ordering across variants
use std::cmp::Ordering;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{CellbaseError, Result};

lazy_static! {
    static ref INTERVAL: Regex = Regex::new(r"^(-?\d+)M(-?\d+)D(.+)S$").unwrap();
}

// ------------- Date -------------
/// A point in time, kept as microseconds since the Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Date(i64);

impl Date {
    pub const MIN: Date = Date(i64::MIN);
    pub const MAX: Date = Date(i64::MAX);
    pub const EPOCH: Date = Date(0);

    pub fn from_micros(micros: i64) -> Self {
        Self(micros)
    }
    pub fn micros(&self) -> i64 {
        self.0
    }
    pub fn now() -> Self {
        Self(Utc::now().timestamp_micros())
    }
    pub fn from_datetime(moment: DateTime<Utc>) -> Self {
        Self(moment.timestamp_micros())
    }
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_micros(self.0)
    }
    /// Seconds since the epoch, as scripting hosts usually hand them over.
    pub fn from_secs_f64(seconds: f64) -> Result<Self> {
        let micros = (seconds * 1_000_000f64).round();
        if !micros.is_finite() || micros < i64::MIN as f64 || micros > i64::MAX as f64 {
            return Err(CellbaseError::InvalidArgument(format!(
                "{} is not a representable timestamp",
                seconds
            )));
        }
        Ok(Self(micros as i64))
    }
    /// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]`, `YYYY-MM-DDTHH:MM:SS[.f]` and `YYYY-MM-DD`.
    /// Moments outside the calendar range are written and read as `@{micros}us`.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if let Some(micros) = text.strip_prefix('@').and_then(|t| t.strip_suffix("us")) {
            return micros.parse().map(Self).map_err(|_| {
                CellbaseError::InvalidArgument(format!("'{}' is not a recognized timestamp", text))
            });
        }
        if let Ok(moment) = DateTime::parse_from_rfc3339(text) {
            return Ok(Self::from_datetime(moment.with_timezone(&Utc)));
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(moment) = NaiveDateTime::parse_from_str(text, format) {
                return Ok(Self::from_datetime(moment.and_utc()));
            }
        }
        if let Ok(day) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
            if let Some(moment) = day.and_hms_opt(0, 0, 0) {
                return Ok(Self::from_datetime(moment.and_utc()));
            }
        }
        Err(CellbaseError::InvalidArgument(format!(
            "'{}' is not a recognized timestamp",
            text
        )))
    }
}
impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.to_datetime() {
            Some(moment) => write!(f, "{}", moment.to_rfc3339_opts(SecondsFormat::Micros, true)),
            None => write!(f, "@{}us", self.0),
        }
    }
}
impl From<DateTime<Utc>> for Date {
    fn from(moment: DateTime<Utc>) -> Self {
        Self::from_datetime(moment)
    }
}
impl Serialize for Date {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
impl<'de> Deserialize<'de> for Date {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(s) => Date::parse(&s).map_err(D::Error::custom),
            serde_json::Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| D::Error::custom("timestamp out of range"))
                .and_then(|s| Date::from_secs_f64(s).map_err(D::Error::custom)),
            other => Err(D::Error::custom(format!("{} is not a timestamp", other))),
        }
    }
}

// ------------- TimestampRange -------------
/// An inclusive `[earliest, latest]` span. The empty range has `earliest > latest`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TimestampRange {
    earliest: Date,
    latest: Date,
}

impl TimestampRange {
    pub const EMPTY: TimestampRange = TimestampRange {
        earliest: Date::MAX,
        latest: Date::MIN,
    };

    pub fn new(earliest: Date, latest: Date) -> Self {
        if earliest > latest {
            Self::EMPTY
        } else {
            Self { earliest, latest }
        }
    }
    pub fn single(moment: Date) -> Self {
        Self {
            earliest: moment,
            latest: moment,
        }
    }
    pub fn is_empty(&self) -> bool {
        self.earliest > self.latest
    }
    pub fn earliest(&self) -> Option<Date> {
        (!self.is_empty()).then_some(self.earliest)
    }
    pub fn latest(&self) -> Option<Date> {
        (!self.is_empty()).then_some(self.latest)
    }
    pub fn contains(&self, moment: Date) -> bool {
        self.earliest <= moment && moment <= self.latest
    }
    pub fn extend(&mut self, moment: Date) {
        if moment < self.earliest {
            self.earliest = moment;
        }
        if moment > self.latest {
            self.latest = moment;
        }
    }
    pub fn union(&self, other: &TimestampRange) -> TimestampRange {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self {
            earliest: self.earliest.min(other.earliest),
            latest: self.latest.max(other.latest),
        }
    }
}
impl Default for TimestampRange {
    fn default() -> Self {
        Self::EMPTY
    }
}
impl Serialize for TimestampRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("earliest", &self.earliest())?;
        map.serialize_entry("latest", &self.latest())?;
        map.end()
    }
}

// ------------- Interval -------------
#[derive(Clone, Copy, Debug)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub seconds: f64,
}

impl Interval {
    pub fn new(months: i32, days: i32, seconds: f64) -> Self {
        Self {
            months,
            days,
            seconds,
        }
    }
}
impl PartialEq for Interval {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Interval {}
impl Ord for Interval {
    fn cmp(&self, other: &Self) -> Ordering {
        self.months
            .cmp(&other.months)
            .then(self.days.cmp(&other.days))
            .then(self.seconds.total_cmp(&other.seconds))
    }
}
impl PartialOrd for Interval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Hash for Interval {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.months.hash(state);
        self.days.hash(state);
        self.seconds.to_bits().hash(state);
    }
}
impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}M{}D{}S", self.months, self.days, self.seconds)
    }
}
impl FromStr for Interval {
    type Err = CellbaseError;
    fn from_str(s: &str) -> Result<Interval> {
        let malformed = || CellbaseError::InvalidArgument(format!("'{}' is not an interval", s));
        let captures = INTERVAL.captures(s.trim()).ok_or_else(malformed)?;
        Ok(Interval {
            months: captures[1].parse().map_err(|_| malformed())?,
            days: captures[2].parse().map_err(|_| malformed())?,
            seconds: captures[3].parse().map_err(|_| malformed())?,
        })
    }
}

// ------------- CellValue -------------
/// An immutable scalar stored in a cell.
///
/// Values of different variants order by variant rank:
/// `Null < Integer < Float < String < Blob < Timestamp < Interval`.
/// Floats compare with [`f64::total_cmp`], so `NaN == NaN` and `-0.0 != 0.0`.
#[derive(Clone, Debug, Default)]
pub enum CellValue {
    #[default]
    Null,
    Integer(i64),
    Float(f64),
    String(String),
    Blob(Vec<u8>),
    Timestamp(Date),
    Interval(Interval),
}

impl CellValue {
    // stable identities, also used as type identities in the persistence layer
    pub const NULL_UID: u8 = 0;
    pub const INTEGER_UID: u8 = 1;
    pub const FLOAT_UID: u8 = 2;
    pub const STRING_UID: u8 = 3;
    pub const BLOB_UID: u8 = 4;
    pub const TIMESTAMP_UID: u8 = 5;
    pub const INTERVAL_UID: u8 = 6;

    pub const ALL_TYPES: [(u8, &'static str); 7] = [
        (Self::NULL_UID, "Null"),
        (Self::INTEGER_UID, "Integer"),
        (Self::FLOAT_UID, "Float"),
        (Self::STRING_UID, "String"),
        (Self::BLOB_UID, "Blob"),
        (Self::TIMESTAMP_UID, "Timestamp"),
        (Self::INTERVAL_UID, "Interval"),
    ];

    pub fn uid(&self) -> u8 {
        match self {
            CellValue::Null => Self::NULL_UID,
            CellValue::Integer(_) => Self::INTEGER_UID,
            CellValue::Float(_) => Self::FLOAT_UID,
            CellValue::String(_) => Self::STRING_UID,
            CellValue::Blob(_) => Self::BLOB_UID,
            CellValue::Timestamp(_) => Self::TIMESTAMP_UID,
            CellValue::Interval(_) => Self::INTERVAL_UID,
        }
    }
    pub fn type_name(&self) -> &'static str {
        Self::ALL_TYPES[self.uid() as usize].1
    }
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Integer(i) => Some(*i),
            _ => None,
        }
    }
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Integer(i) => Some(*i as f64),
            CellValue::Float(x) => Some(*x),
            _ => None,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Converts a JSON value as handed over by a host runtime.
    ///
    /// Plain scalars map directly; the tagged objects produced by serialization
    /// (`{"blob": [..]}`, `{"timestamp": ".."}`, `{"interval": ".."}`) map back to their variant.
    pub fn from_json(value: &serde_json::Value) -> Result<CellValue> {
        use serde_json::Value as Json;
        match value {
            Json::Null => Ok(CellValue::Null),
            Json::Bool(b) => Ok(CellValue::Integer(*b as i64)),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Ok(CellValue::Integer(i)),
                None => n.as_f64().map(CellValue::Float).ok_or_else(|| {
                    CellbaseError::InvalidArgument(format!("number {} is out of range", n))
                }),
            },
            Json::String(s) => Ok(CellValue::String(s.clone())),
            Json::Object(map) if map.len() == 1 => {
                if let Some(Json::Array(bytes)) = map.get("blob") {
                    let blob = bytes
                        .iter()
                        .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                        .collect::<Option<Vec<u8>>>()
                        .ok_or_else(|| {
                            CellbaseError::InvalidArgument(format!("{} is not a blob", value))
                        })?;
                    Ok(CellValue::Blob(blob))
                } else if let Some(Json::String(ts)) = map.get("timestamp") {
                    Ok(CellValue::Timestamp(Date::parse(ts)?))
                } else if let Some(Json::String(interval)) = map.get("interval") {
                    Ok(CellValue::Interval(interval.parse()?))
                } else {
                    Err(CellbaseError::InvalidArgument(format!(
                        "{} is not a scalar value",
                        value
                    )))
                }
            }
            _ => Err(CellbaseError::InvalidArgument(format!(
                "{} is not a scalar value",
                value
            ))),
        }
    }

    /// Rebuilds a value from its persisted form and type identity.
    pub fn from_sql(uid: u8, value: ValueRef<'_>) -> Result<CellValue> {
        let mismatch = || {
            CellbaseError::DataCorruption {
                message: format!("stored value does not match cell type {}", uid),
            }
        };
        Ok(match (uid, value) {
            (Self::NULL_UID, _) => CellValue::Null,
            (Self::INTEGER_UID, ValueRef::Integer(i)) => CellValue::Integer(i),
            (Self::FLOAT_UID, ValueRef::Integer(bits)) => CellValue::Float(f64::from_bits(bits as u64)),
            (Self::FLOAT_UID, ValueRef::Real(x)) => CellValue::Float(x),
            (Self::STRING_UID, ValueRef::Text(t)) => {
                CellValue::String(String::from_utf8(t.to_vec()).map_err(|_| mismatch())?)
            }
            (Self::BLOB_UID, ValueRef::Blob(b)) => CellValue::Blob(b.to_vec()),
            (Self::TIMESTAMP_UID, ValueRef::Integer(i)) => CellValue::Timestamp(Date(i)),
            (Self::INTERVAL_UID, ValueRef::Text(t)) => {
                let text = std::str::from_utf8(t).map_err(|_| mismatch())?;
                CellValue::Interval(text.parse().map_err(|_| mismatch())?)
            }
            _ => return Err(mismatch()),
        })
    }

    fn rank(&self) -> u8 {
        self.uid()
    }
}
impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for CellValue {}
impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (CellValue::Null, CellValue::Null) => Ordering::Equal,
            (CellValue::Integer(a), CellValue::Integer(b)) => a.cmp(b),
            (CellValue::Float(a), CellValue::Float(b)) => a.total_cmp(b),
            (CellValue::String(a), CellValue::String(b)) => a.cmp(b),
            (CellValue::Blob(a), CellValue::Blob(b)) => a.cmp(b),
            (CellValue::Timestamp(a), CellValue::Timestamp(b)) => a.cmp(b),
            (CellValue::Interval(a), CellValue::Interval(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}
impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Hash for CellValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            CellValue::Null => (),
            CellValue::Integer(i) => i.hash(state),
            CellValue::Float(x) => x.to_bits().hash(state),
            CellValue::String(s) => s.hash(state),
            CellValue::Blob(b) => b.hash(state),
            CellValue::Timestamp(d) => d.hash(state),
            CellValue::Interval(i) => i.hash(state),
        }
    }
}
impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CellValue::Null => write!(f, "null"),
            CellValue::Integer(i) => write!(f, "{}", i),
            CellValue::Float(x) => write!(f, "{}", x),
            CellValue::String(s) => write!(f, "\"{}\"", s),
            CellValue::Blob(b) => write!(f, "<blob of {} bytes>", b.len()),
            CellValue::Timestamp(d) => write!(f, "{}", d),
            CellValue::Interval(i) => write!(f, "{}", i),
        }
    }
}
impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Integer(i)
    }
}
impl From<i32> for CellValue {
    fn from(i: i32) -> Self {
        CellValue::Integer(i as i64)
    }
}
impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Integer(b as i64)
    }
}
impl From<f64> for CellValue {
    fn from(x: f64) -> Self {
        CellValue::Float(x)
    }
}
impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_owned())
    }
}
impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(s)
    }
}
impl From<Vec<u8>> for CellValue {
    fn from(b: Vec<u8>) -> Self {
        CellValue::Blob(b)
    }
}
impl From<Date> for CellValue {
    fn from(d: Date) -> Self {
        CellValue::Timestamp(d)
    }
}
impl From<Interval> for CellValue {
    fn from(i: Interval) -> Self {
        CellValue::Interval(i)
    }
}
impl ToSql for CellValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            CellValue::Null => ToSqlOutput::Owned(Value::Null),
            CellValue::Integer(i) => ToSqlOutput::from(*i),
            // bit pattern, so NaN and -0.0 survive the round trip
            CellValue::Float(x) => ToSqlOutput::from(x.to_bits() as i64),
            CellValue::String(s) => ToSqlOutput::from(s.as_str()),
            CellValue::Blob(b) => ToSqlOutput::from(b.as_slice()),
            CellValue::Timestamp(d) => ToSqlOutput::from(d.micros()),
            CellValue::Interval(i) => ToSqlOutput::from(i.to_string()),
        })
    }
}
impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            CellValue::Null => serializer.serialize_unit(),
            CellValue::Integer(i) => serializer.serialize_i64(*i),
            CellValue::Float(x) => serializer.serialize_f64(*x),
            CellValue::String(s) => serializer.serialize_str(s),
            CellValue::Blob(b) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("blob", b)?;
                map.end()
            }
            CellValue::Timestamp(d) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("timestamp", d)?;
                map.end()
            }
            CellValue::Interval(i) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("interval", &i.to_string())?;
                map.end()
            }
        }
    }
}
impl<'de> Deserialize<'de> for CellValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        CellValue::from_json(&value).map_err(D::Error::custom)
    }
}
