//! Traversal checkpoint.
//!
//! A checkpoint records two cursors: the last inserted/modified item seen
//! and the last delete event seen. Each cursor is a `(timestamp, id)`
//! [`Position`]; timestamps alone do not order items because several can
//! share a second.
//!
//! # Format
//!
//! ```text
//! insertTimestamp,insertId[,deleteTimestamp,deleteId]
//! 2011-10-16 14:13:52,12345,2011-10-16 14:13:52,543
//! ```
//!
//! Either timestamp may be empty. The delete half is optional so that
//! checkpoints written before delete tracking still parse.

use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDateTime;
use tracing::warn;

use crate::client::Value;
use crate::date_format;
use crate::error::ConnectorError;

/// Largest delete event id the audit table can hold. Ids that arrive in
/// an unrecognized representation are clamped to this so traversal keeps
/// moving, at the cost of possibly skipping some delete notifications.
pub const MAX_EVENT_ID: i64 = 9_999_999_999;

/// Maximum number of comma-separated segments read from a checkpoint.
const MAX_SEGMENTS: usize = 5;

/// A totally ordered cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    /// Modification or event timestamp.
    pub timestamp: NaiveDateTime,
    /// Item id or event id, breaking timestamp ties.
    pub id: i64,
}

impl Position {
    /// Creates a position.
    #[must_use]
    pub fn new(timestamp: NaiveDateTime, id: i64) -> Self {
        Self { timestamp, id }
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then(self.id.cmp(&other.id))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{}",
            date_format::to_checkpoint_string(&self.timestamp),
            self.id
        )
    }
}

/// The four primary fields, kept together so they can be snapshotted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Fields {
    insert_timestamp: Option<NaiveDateTime>,
    insert_id: i64,
    delete_timestamp: Option<NaiveDateTime>,
    delete_id: i64,
}

/// Traversal checkpoint with backup/restore for retries.
///
/// Every `set_*_checkpoint` call first copies the current primary fields
/// into a backup, so [`restore`](Self::restore) undoes exactly the last
/// mutation.
#[derive(Debug, Clone, Default)]
pub struct Checkpoint {
    current: Fields,
    backup: Fields,
    advance: Option<Position>,
}

impl Checkpoint {
    /// Creates an empty checkpoint (no progress yet).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a persisted checkpoint string.
    ///
    /// At most five segments are read; anything past the fourth is
    /// ignored so that later additions stay readable.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::MalformedCheckpoint` if there are fewer than
    /// two segments or a date or integer segment does not parse.
    pub fn parse(text: &str) -> Result<Self, ConnectorError> {
        let segments: Vec<&str> = text.splitn(MAX_SEGMENTS, ',').collect();
        if segments.len() < 2 {
            return Err(ConnectorError::malformed(
                text,
                "expected at least 2 comma-separated fields",
            ));
        }

        let mut fields = Fields {
            insert_timestamp: parse_timestamp(text, segments[0])?,
            insert_id: parse_id(text, segments[1])?,
            ..Fields::default()
        };
        if let Some(segment) = segments.get(2) {
            fields.delete_timestamp = parse_timestamp(text, segment)?;
        }
        if let Some(segment) = segments.get(3) {
            fields.delete_id = parse_id(text, segment)?;
        }

        Ok(Self {
            current: fields,
            backup: fields,
            advance: None,
        })
    }

    /// Returns `true` for a checkpoint that has no delete half, i.e. at
    /// most one comma. Callers use this to seed a default delete position
    /// before resuming.
    #[must_use]
    pub fn is_old_style(text: &str) -> bool {
        text.matches(',').count() <= 1
    }

    /// The insert cursor, if an insert timestamp is set.
    #[must_use]
    pub fn insert_position(&self) -> Option<Position> {
        self.current
            .insert_timestamp
            .map(|ts| Position::new(ts, self.current.insert_id))
    }

    /// The delete cursor, if a delete timestamp is set.
    #[must_use]
    pub fn delete_position(&self) -> Option<Position> {
        self.current
            .delete_timestamp
            .map(|ts| Position::new(ts, self.current.delete_id))
    }

    /// The insert timestamp.
    #[must_use]
    pub fn insert_timestamp(&self) -> Option<NaiveDateTime> {
        self.current.insert_timestamp
    }

    /// The insert item id.
    #[must_use]
    pub fn insert_id(&self) -> i64 {
        self.current.insert_id
    }

    /// The delete timestamp.
    #[must_use]
    pub fn delete_timestamp(&self) -> Option<NaiveDateTime> {
        self.current.delete_timestamp
    }

    /// The delete event id.
    #[must_use]
    pub fn delete_id(&self) -> i64 {
        self.current.delete_id
    }

    /// The pending advance position, if one was recorded.
    #[must_use]
    pub fn advance_position(&self) -> Option<Position> {
        self.advance
    }

    /// Moves the insert cursor.
    pub fn set_insert_checkpoint(&mut self, timestamp: NaiveDateTime, id: i64) {
        self.backup = self.current;
        self.current.insert_timestamp = Some(timestamp);
        self.current.insert_id = id;
    }

    /// Moves the delete cursor.
    ///
    /// Event ids arrive as 32-bit, 64-bit or floating-point values depending
    /// on the backend. Anything else is clamped to [`MAX_EVENT_ID`] with a
    /// warning.
    pub fn set_delete_checkpoint(&mut self, timestamp: NaiveDateTime, event_id: &Value) {
        self.backup = self.current;
        self.current.delete_timestamp = Some(timestamp);
        self.current.delete_id = normalize_event_id(event_id);
    }

    /// Records a position to jump to once the current batch is known to
    /// be done with, without committing it yet.
    pub fn set_advance_checkpoint(&mut self, timestamp: NaiveDateTime, id: i64) {
        self.advance = Some(Position::new(timestamp, id));
    }

    /// Commits the advance position into the insert cursor.
    ///
    /// No-op if no advance position was recorded or it would move the
    /// cursor backwards.
    pub fn advance_to_end(&mut self) {
        if let Some(advance) = self.advance.take() {
            if self.insert_position().map_or(true, |current| advance > current) {
                self.set_insert_checkpoint(advance.timestamp, advance.id);
            }
        }
    }

    /// Returns `true` if any primary field differs from its backup.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.current != self.backup
    }

    /// Reverts the primary fields to the snapshot taken by the last
    /// mutation.
    pub fn restore(&mut self) {
        self.current = self.backup;
    }

    /// Serializes the checkpoint, or `None` if neither timestamp is set.
    #[must_use]
    pub fn serialize(&self) -> Option<String> {
        let Fields {
            insert_timestamp,
            insert_id,
            delete_timestamp,
            delete_id,
        } = self.current;
        if insert_timestamp.is_none() && delete_timestamp.is_none() {
            return None;
        }

        let mut out = String::new();
        if let Some(ts) = insert_timestamp {
            out.push_str(&date_format::to_checkpoint_string(&ts));
        }
        out.push(',');
        out.push_str(&insert_id.to_string());
        if let Some(ts) = delete_timestamp {
            out.push(',');
            out.push_str(&date_format::to_checkpoint_string(&ts));
            out.push(',');
            out.push_str(&delete_id.to_string());
        }
        Some(out)
    }
}

impl PartialEq for Checkpoint {
    fn eq(&self, other: &Self) -> bool {
        self.current == other.current
    }
}

impl Eq for Checkpoint {}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.serialize().as_deref().unwrap_or("(none)"))
    }
}

fn parse_timestamp(text: &str, segment: &str) -> Result<Option<NaiveDateTime>, ConnectorError> {
    let segment = segment.trim();
    if segment.is_empty() {
        return Ok(None);
    }
    date_format::parse(segment)
        .map(Some)
        .ok_or_else(|| ConnectorError::malformed(text, format!("invalid date '{segment}'")))
}

fn parse_id(text: &str, segment: &str) -> Result<i64, ConnectorError> {
    let segment = segment.trim();
    if segment.is_empty() {
        return Ok(0);
    }
    segment
        .parse::<i64>()
        .map_err(|_| ConnectorError::malformed(text, format!("invalid id '{segment}'")))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)] // range checked before the cast
fn normalize_event_id(value: &Value) -> i64 {
    match value {
        Value::Integer(v) => i64::from(*v),
        Value::Long(v) => *v,
        Value::Double(v) if v.is_finite() && v.abs() <= MAX_EVENT_ID as f64 => *v as i64,
        other => {
            warn!(
                kind = other.kind(),
                value = %other,
                clamped = MAX_EVENT_ID,
                "unrecognized delete event id representation"
            );
            MAX_EVENT_ID
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        date_format::parse(s).unwrap()
    }

    #[test]
    fn test_new_checkpoint_serializes_to_none() {
        let cp = Checkpoint::new();
        assert_eq!(cp.serialize(), None);
        assert!(!cp.has_changed());
        assert!(cp.insert_position().is_none());
    }

    #[test]
    fn test_parse_two_field_form() {
        let cp = Checkpoint::parse("2020-01-01 00:00:00,5").unwrap();
        assert_eq!(cp.insert_timestamp(), Some(ts("2020-01-01 00:00:00")));
        assert_eq!(cp.insert_id(), 5);
        assert_eq!(cp.delete_timestamp(), None);
        assert_eq!(cp.delete_id(), 0);
    }

    #[test]
    fn test_parse_four_field_form() {
        let cp = Checkpoint::parse("2020-01-01 00:00:00,5,2020-01-02 00:00:00,9").unwrap();
        assert_eq!(
            cp.delete_position(),
            Some(Position::new(ts("2020-01-02 00:00:00"), 9))
        );
    }

    #[test]
    fn test_parse_ignores_extra_segments() {
        let cp =
            Checkpoint::parse("2020-01-01 00:00:00,5,2020-01-02 00:00:00,9,future,stuff").unwrap();
        assert_eq!(cp.insert_id(), 5);
        assert_eq!(cp.delete_id(), 9);
    }

    #[test]
    fn test_parse_empty_fields() {
        let cp = Checkpoint::parse(",0,2020-01-02 00:00:00,9").unwrap();
        assert_eq!(cp.insert_timestamp(), None);
        assert_eq!(cp.delete_id(), 9);
    }

    #[test]
    fn test_parse_malformed() {
        for bad in [
            "",
            "2020-01-01 00:00:00",
            "not a date,5",
            "2020-01-01 00:00:00,five",
            "2020-01-01 00:00:00,5,2020-01-02 00:00:00,nine",
        ] {
            let err = Checkpoint::parse(bad).unwrap_err();
            assert!(
                matches!(err, ConnectorError::MalformedCheckpoint { .. }),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_round_trip_two_and_four_fields() {
        for text in [
            "2020-01-01 00:00:00,5",
            "2020-01-01 00:00:00,5,2020-01-02 00:00:00,9",
            "2020-01-01 00:00:00,5,2020-01-02 00:00:00.125,9",
            ",0,2020-01-02 00:00:00,9",
        ] {
            let cp = Checkpoint::parse(text).unwrap();
            let serialized = cp.serialize().unwrap();
            assert_eq!(serialized, text);
            assert_eq!(Checkpoint::parse(&serialized).unwrap(), cp);
        }
    }

    #[test]
    fn test_is_old_style() {
        assert!(Checkpoint::is_old_style("2020-01-01 00:00:00,5"));
        assert!(Checkpoint::is_old_style("2020-01-01 00:00:00"));
        assert!(!Checkpoint::is_old_style(
            "2020-01-01 00:00:00,5,2020-01-02 00:00:00,9"
        ));
    }

    #[test]
    fn test_monotonic_updates_and_restore() {
        let mut cp = Checkpoint::new();
        let steps = [
            ("2020-01-01 00:00:00", 1),
            ("2020-01-01 00:00:00", 2),
            ("2020-01-01 00:00:01", 1),
        ];
        for (i, (t, id)) in steps.iter().enumerate() {
            let before = cp.clone();
            cp.set_insert_checkpoint(ts(t), *id);
            assert!(cp.has_changed());

            let after = cp.clone();
            cp.restore();
            assert_eq!(cp, before, "step {i}");
            cp = after;
        }

        let before = cp.clone();
        cp.set_delete_checkpoint(ts("2020-01-05 00:00:00"), &Value::Integer(4));
        assert!(cp.has_changed());
        assert_eq!(cp.delete_id(), 4);
        cp.restore();
        assert_eq!(cp, before);
        assert!(!cp.has_changed());
    }

    #[test]
    fn test_delete_event_id_kinds() {
        let t = ts("2020-01-01 00:00:00");
        let mut cp = Checkpoint::new();

        cp.set_delete_checkpoint(t, &Value::Integer(17));
        assert_eq!(cp.delete_id(), 17);

        cp.set_delete_checkpoint(t, &Value::Long(8_000_000_000));
        assert_eq!(cp.delete_id(), 8_000_000_000);

        cp.set_delete_checkpoint(t, &Value::Double(12345.0));
        assert_eq!(cp.delete_id(), 12345);
    }

    #[test]
    fn test_delete_event_id_clamped() {
        let t = ts("2020-01-01 00:00:00");
        let mut cp = Checkpoint::new();

        cp.set_delete_checkpoint(t, &Value::Text("abc".into()));
        assert_eq!(cp.delete_id(), MAX_EVENT_ID);

        cp.set_delete_checkpoint(t, &Value::Double(f64::NAN));
        assert_eq!(cp.delete_id(), MAX_EVENT_ID);

        cp.set_delete_checkpoint(t, &Value::Null);
        assert_eq!(cp.delete_id(), MAX_EVENT_ID);
    }

    #[test]
    fn test_advance_to_end() {
        let mut cp = Checkpoint::parse("2020-01-01 00:00:00,5").unwrap();

        cp.advance_to_end();
        assert!(!cp.has_changed(), "no advance recorded");

        cp.set_advance_checkpoint(ts("2020-01-03 00:00:00"), 40);
        assert_eq!(cp.insert_id(), 5, "advance is not committed yet");

        cp.advance_to_end();
        assert!(cp.has_changed());
        assert_eq!(
            cp.insert_position(),
            Some(Position::new(ts("2020-01-03 00:00:00"), 40))
        );
        assert_eq!(cp.advance_position(), None);
    }

    #[test]
    fn test_advance_never_moves_backwards() {
        let mut cp = Checkpoint::parse("2020-01-05 00:00:00,5").unwrap();
        cp.set_advance_checkpoint(ts("2020-01-03 00:00:00"), 40);
        cp.advance_to_end();
        assert_eq!(cp.insert_timestamp(), Some(ts("2020-01-05 00:00:00")));
    }

    #[test]
    fn test_position_ordering() {
        let a = Position::new(ts("2020-01-01 00:00:00"), 9);
        let b = Position::new(ts("2020-01-01 00:00:00"), 10);
        let c = Position::new(ts("2020-01-01 00:00:01"), 1);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(a.to_string(), "2020-01-01 00:00:00,9");
    }
}
