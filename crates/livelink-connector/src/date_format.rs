//! Date text encodings used by checkpoints, queries and document properties.
//!
//! All routines are pure functions over [`NaiveDateTime`]; repository
//! timestamps carry no zone, and nothing here holds formatter state.
//!
//! | Encoding | Example |
//! |---|---|
//! | checkpoint | `2020-01-01 13:45:00` (fraction appended when sub-second) |
//! | SQL | `2020-01-01T13:45:00` |
//! | SQL with fraction | `2020-01-01T13:45:00.250` |
//!
//! Fractions are never rounded: an audit cursor that lost precision would
//! sort below its own row and fetch it again on every call.
//! | ISO 8601 | `2020-01-01T13:45:00Z` |
//! | RFC 822 | `Wed, 01 Jan 2020 13:45:00 GMT` |

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};

const CHECKPOINT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const SQL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const ISO8601_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const RFC822_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";
const DATE_ONLY_FORMAT: &str = "%Y-%m-%d";

/// Parses a timestamp in checkpoint form.
///
/// Accepts `yyyy-MM-dd HH:mm:ss` with an optional fractional second, and
/// the `T`-separated SQL form. Returns `None` when nothing matches.
#[must_use]
pub fn parse(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

/// Parses a configured start date: either a full timestamp or a bare
/// `yyyy-MM-dd`, which means midnight.
#[must_use]
pub fn parse_start_date(text: &str) -> Option<NaiveDateTime> {
    parse(text).or_else(|| {
        NaiveDate::parse_from_str(text.trim(), DATE_ONLY_FORMAT)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    })
}

/// The Unix epoch, used as the delete cursor when the audit trail is empty.
#[must_use]
pub fn epoch() -> NaiveDateTime {
    DateTime::<Utc>::UNIX_EPOCH.naive_utc()
}

/// Sub-second digits with a leading dot: at least three, trailing zeros
/// beyond that trimmed, empty for a whole second.
fn fraction(ts: &NaiveDateTime) -> String {
    let nanos = ts.nanosecond() % 1_000_000_000;
    if nanos == 0 {
        return String::new();
    }
    let digits = format!("{nanos:09}");
    let keep = digits.trim_end_matches('0').len().max(3);
    format!(".{}", &digits[..keep])
}

/// Formats a timestamp for a checkpoint string.
///
/// Sub-second precision is kept in full only when present, so
/// second-resolution values keep the short legacy form.
#[must_use]
pub fn to_checkpoint_string(ts: &NaiveDateTime) -> String {
    format!("{}{}", ts.format(CHECKPOINT_FORMAT), fraction(ts))
}

/// Formats a timestamp at second resolution for a SQL literal body.
#[must_use]
pub fn to_sql_string(ts: &NaiveDateTime) -> String {
    ts.format(SQL_FORMAT).to_string()
}

/// Formats a timestamp with its fraction for a SQL literal body: at
/// least milliseconds, more digits when the value carries them.
#[must_use]
pub fn to_sql_millis_string(ts: &NaiveDateTime) -> String {
    let fraction = fraction(ts);
    if fraction.is_empty() {
        format!("{}.000", ts.format(SQL_FORMAT))
    } else {
        format!("{}{fraction}", ts.format(SQL_FORMAT))
    }
}

/// Formats a timestamp as ISO 8601 in UTC.
#[must_use]
pub fn to_iso8601(ts: &NaiveDateTime) -> String {
    ts.format(ISO8601_FORMAT).to_string()
}

/// Formats a timestamp as an RFC 822 date, as used for `lastmodified`.
#[must_use]
pub fn to_rfc822(ts: &NaiveDateTime) -> String {
    ts.format(RFC822_FORMAT).to_string()
}
