//! Timezone-independent calendar date, encoded as signed days-since-epoch
//! (spec §9's design note), backed by the `time` crate rather than a
//! hand-rolled calendar (the same crate `milli` already pulls in for this
//! purpose).

use crate::error::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::macros::date;
use time::Date as TimeDate;

const EPOCH: TimeDate = date!(1970 - 01 - 01);

/// A calendar date, stored internally as days since 1970-01-01.
///
/// Total ordering matches calendar order, which is what `Position`'s total
/// order (spec §3) requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Epoch(i32);

impl Epoch {
    pub fn from_days_since_epoch(days: i32) -> Self {
        Epoch(days)
    }

    pub fn days_since_epoch(self) -> i32 {
        self.0
    }

    /// Parse a strict `YYYY-MM-DD` string, rejecting anything that isn't a
    /// legal calendar date (spec §4.2: "must match `YYYY-MM-DD` and be a
    /// legal calendar date, else `InvalidDate`").
    pub fn parse(s: &str) -> Result<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
            return Err(IndexError::Config(format!("not a YYYY-MM-DD date: {s:?}")));
        }
        let year: i32 = s[0..4]
            .parse()
            .map_err(|_| IndexError::Config(format!("invalid year in {s:?}")))?;
        let month: u8 = s[5..7]
            .parse()
            .map_err(|_| IndexError::Config(format!("invalid month in {s:?}")))?;
        let day: u8 = s[8..10]
            .parse()
            .map_err(|_| IndexError::Config(format!("invalid day in {s:?}")))?;
        let month = time::Month::try_from(month)
            .map_err(|_| IndexError::Config(format!("invalid month in {s:?}")))?;
        let date = TimeDate::from_calendar_date(year, month, day)
            .map_err(|_| IndexError::Config(format!("not a legal calendar date: {s:?}")))?;
        Ok(Epoch((date - EPOCH).whole_days() as i32))
    }

    /// Render as `YYYYMMDD`, the NER_DATE key format (spec §4.7).
    pub fn to_yyyymmdd(self) -> String {
        let date = EPOCH + time::Duration::days(self.0 as i64);
        format!("{:04}{:02}{:02}", date.year(), u8::from(date.month()), date.day())
    }

    /// Render as `YYYY-MM-DD`.
    pub fn to_iso(self) -> String {
        let date = EPOCH + time::Duration::days(self.0 as i64);
        format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_iso())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_dates() {
        let d = Epoch::parse("2024-01-01").unwrap();
        assert_eq!(d.to_iso(), "2024-01-01");
        assert_eq!(d.to_yyyymmdd(), "20240101");
    }

    #[test]
    fn rejects_impossible_dates() {
        assert!(Epoch::parse("2024-02-30").is_err());
        assert!(Epoch::parse("2024-13-01").is_err());
        assert!(Epoch::parse("not-a-date").is_err());
        assert!(Epoch::parse("2024-1-1").is_err());
    }

    #[test]
    fn round_trips_through_days_since_epoch() {
        let d = Epoch::parse("2000-03-15").unwrap();
        let days = d.days_since_epoch();
        let d2 = Epoch::from_days_since_epoch(days);
        assert_eq!(d, d2);
        assert_eq!(d2.to_iso(), "2000-03-15");
    }

    #[test]
    fn epoch_is_zero_days() {
        let d = Epoch::parse("1970-01-01").unwrap();
        assert_eq!(d.days_since_epoch(), 0);
    }

    #[test]
    fn orders_chronologically() {
        let a = Epoch::parse("2020-01-01").unwrap();
        let b = Epoch::parse("2020-01-02").unwrap();
        assert!(a < b);
    }
}
