// Some data base helpers

use app_core::{DbError, DbResult};
use chrono::{DateTime, Utc};
use std::str::FromStr;
use uuid::Uuid;

/// escaping wild cards in like query strings
pub fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// timestamps are stored as RFC 3339 text so they sort lexicographically
pub(crate) fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub(crate) fn opt_ts(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(ts)
}

pub(crate) fn parse_ts(s: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| DbError::Decode(format!("bad timestamp {s:?}: {e}")))
}

pub(crate) fn parse_opt_ts(s: Option<&str>) -> DbResult<Option<DateTime<Utc>>> {
    s.map(parse_ts).transpose()
}

pub(crate) fn parse_uid(s: &str) -> DbResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DbError::Decode(format!("bad uuid {s:?}: {e}")))
}

pub(crate) fn opt_uid(u: Option<Uuid>) -> Option<String> {
    u.map(|u| u.to_string())
}

pub(crate) fn parse_opt_uid(s: Option<&str>) -> DbResult<Option<Uuid>> {
    s.map(parse_uid).transpose()
}

/// enum columns hold the canonical snake_case name; unknown values are a
/// decode error, never a default
pub(crate) fn parse_enum<T>(s: &str) -> DbResult<T>
where
    T: FromStr<Err = String>,
{
    s.parse::<T>().map_err(DbError::Decode)
}
