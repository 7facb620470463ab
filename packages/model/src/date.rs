//! Date and time values as templates see them.
//!
//! A wrapped date carries an instant plus a flavor telling the formatter
//! which parts are meaningful: the date part, the time part, both, or
//! unknown (the host type didn't say, and no default was configured).

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which parts of a date value are meaningful.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateKind {
    /// Date part only (a calendar day).
    Date,
    /// Time part only (a wall-clock time).
    Time,
    /// Both date and time.
    DateTime,
    /// The host type didn't distinguish; formatting it is an error the
    /// execution engine reports, not this layer.
    Unknown,
}

impl fmt::Display for DateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DateKind::Date => "date",
            DateKind::Time => "time",
            DateKind::DateTime => "datetime",
            DateKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A template-visible date/time value: an instant tagged with a [`DateKind`].
///
/// The kind is fixed at wrap time and never changes afterwards.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DateValue {
    instant: DateTime<Utc>,
    kind: DateKind,
}

impl DateValue {
    /// Wrap an instant with an explicit kind.
    pub fn new(instant: DateTime<Utc>, kind: DateKind) -> Self {
        DateValue { instant, kind }
    }

    /// A date-only value; the instant is midnight UTC of that day.
    pub fn from_date(date: NaiveDate) -> Self {
        let instant = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
        DateValue {
            instant,
            kind: DateKind::Date,
        }
    }

    /// A time-only value; the instant is that time on the epoch day.
    pub fn from_time(time: NaiveTime) -> Self {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch date is valid");
        let instant = Utc.from_utc_datetime(&epoch.and_time(time));
        DateValue {
            instant,
            kind: DateKind::Time,
        }
    }

    /// A full timestamp value.
    pub fn from_timestamp(instant: DateTime<Utc>) -> Self {
        DateValue {
            instant,
            kind: DateKind::DateTime,
        }
    }

    /// The instant this value represents.
    pub fn instant(&self) -> DateTime<Utc> {
        self.instant
    }

    /// Which parts of the instant are meaningful.
    pub fn kind(&self) -> DateKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_flavor_is_midnight_utc() {
        let d = NaiveDate::from_ymd_opt(2021, 3, 14).unwrap();
        let v = DateValue::from_date(d);
        assert_eq!(v.kind(), DateKind::Date);
        assert_eq!(v.instant().date_naive(), d);
        assert_eq!(v.instant().time(), NaiveTime::MIN);
    }

    #[test]
    fn time_flavor_sits_on_epoch_day() {
        let t = NaiveTime::from_hms_opt(13, 30, 0).unwrap();
        let v = DateValue::from_time(t);
        assert_eq!(v.kind(), DateKind::Time);
        assert_eq!(v.instant().time(), t);
        assert_eq!(
            v.instant().date_naive(),
            NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
        );
    }

    #[test]
    fn kind_is_fixed_at_construction() {
        let v = DateValue::new(Utc::now(), DateKind::Unknown);
        assert_eq!(v.kind(), DateKind::Unknown);
    }

    #[test]
    fn date_kind_serializes_as_lowercase_token() {
        assert_eq!(
            serde_json::to_string(&DateKind::DateTime).unwrap(),
            "\"datetime\""
        );
        let k: DateKind = serde_json::from_str("\"time\"").unwrap();
        assert_eq!(k, DateKind::Time);
    }
}
