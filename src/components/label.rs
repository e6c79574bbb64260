use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use std::{
    cmp::Ordering,
    fmt::Display,
    hash::{Hash, Hasher},
    sync::Arc,
};

use crate::errors::{CubeError, Result};

/// Value stored in a [Coordinate](super::Coordinate).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Label {
    Int(i64),
    Float(f64),
    Time(NaiveDateTime),
    Text(Arc<str>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelKind {
    Int,
    Float,
    Time,
    Text,
}

impl Label {
    pub fn kind(&self) -> LabelKind {
        match self {
            Label::Int(_) => LabelKind::Int,
            Label::Float(_) => LabelKind::Float,
            Label::Time(_) => LabelKind::Time,
            Label::Text(_) => LabelKind::Text,
        }
    }

    /// Parses a full datetime, `"2020-12-25"` is midnight of that day.
    pub fn time(value: &str) -> Result<Self> {
        TimeSpan::parse(value).map(|span| Label::Time(span.start))
    }

    pub fn as_time(&self) -> Option<&NaiveDateTime> {
        match self {
            Label::Time(time) => Some(time),
            _ => None,
        }
    }

    /// Numeric position of the label on its axis.
    ///
    /// Datetimes map to seconds since the unix epoch.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Label::Int(value) => Some(*value as f64),
            Label::Float(value) => Some(*value),
            Label::Time(time) => {
                let time = time.and_utc();
                Some(time.timestamp() as f64 + time.timestamp_subsec_nanos() as f64 * 1e-9)
            }
            Label::Text(_) => None,
        }
    }

    /// Label rendered as a variable name, text without quotes.
    pub fn to_name(&self) -> String {
        match self {
            Label::Text(text) => text.to_string(),
            label => label.to_string(),
        }
    }

    /// Ordering by value, `Int` and `Float` compare numerically.
    ///
    /// `None` for labels of unrelated kinds.
    pub fn compare(&self, other: &Label) -> Option<Ordering> {
        match (self, other) {
            (Label::Int(_), Label::Float(_)) | (Label::Float(_), Label::Int(_)) => {
                Some(self.as_f64()?.total_cmp(&other.as_f64()?))
            }
            (lhs, rhs) if lhs.kind() == rhs.kind() => Some(lhs.cmp(rhs)),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Label::Int(_) => 0,
            Label::Float(_) => 1,
            Label::Time(_) => 2,
            Label::Text(_) => 3,
        }
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Label {}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Label {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Label::Int(lhs), Label::Int(rhs)) => lhs.cmp(rhs),
            (Label::Float(lhs), Label::Float(rhs)) => lhs.total_cmp(rhs),
            (Label::Time(lhs), Label::Time(rhs)) => lhs.cmp(rhs),
            (Label::Text(lhs), Label::Text(rhs)) => lhs.cmp(rhs),
            (lhs, rhs) => lhs.rank().cmp(&rhs.rank()),
        }
    }
}

impl Hash for Label {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Label::Int(value) => value.hash(state),
            Label::Float(value) => value.to_bits().hash(state),
            Label::Time(time) => time.hash(state),
            Label::Text(text) => text.hash(state),
        }
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Label::Int(value) => write!(f, "{value}"),
            Label::Float(value) => write!(f, "{value}"),
            Label::Time(time) => write!(f, "{}", time.format("%Y-%m-%dT%H:%M:%S")),
            Label::Text(text) => write!(f, "{text:?}"),
        }
    }
}

impl From<i64> for Label {
    fn from(value: i64) -> Self {
        Label::Int(value)
    }
}

impl From<i32> for Label {
    fn from(value: i32) -> Self {
        Label::Int(value.into())
    }
}

impl From<f64> for Label {
    fn from(value: f64) -> Self {
        Label::Float(value)
    }
}

impl From<NaiveDateTime> for Label {
    fn from(value: NaiveDateTime) -> Self {
        Label::Time(value)
    }
}

impl From<NaiveDate> for Label {
    fn from(value: NaiveDate) -> Self {
        Label::Time(midnight(value))
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Label::Text(Arc::from(value))
    }
}

impl From<String> for Label {
    fn from(value: String) -> Self {
        Label::Text(Arc::from(value))
    }
}

pub(crate) fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Resolution {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

/// Inclusive period covered by a partial datetime string.
///
/// `"2020-12"` spans every instant of December 2020.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSpan {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub resolution: Resolution,
}

impl TimeSpan {
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || CubeError::InvalidDatetime(value.to_string());
        let trimmed = value.trim();
        let (date, time) = match trimmed.split_once(['T', ' ']) {
            Some((date, time)) => (date, Some(time)),
            None => (trimmed, None),
        };
        let fields = date
            .split('-')
            .map(str::parse::<u32>)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| invalid())?;

        let ymd = |year: u32, month: u32, day: u32| {
            i32::try_from(year)
                .ok()
                .and_then(|year| NaiveDate::from_ymd_opt(year, month, day))
                .map(midnight)
                .ok_or_else(invalid)
        };
        let after = |start: NaiveDateTime, step: TimeDelta| {
            start.checked_add_signed(step).ok_or_else(invalid)
        };
        let (start, next, resolution) = match (fields.as_slice(), time) {
            ([year], None) => {
                let next_year = year.checked_add(1).ok_or_else(invalid)?;
                (ymd(*year, 1, 1)?, ymd(next_year, 1, 1)?, Resolution::Year)
            }
            ([year, month], None) => {
                let start = ymd(*year, *month, 1)?;
                let (next_year, next_month) = if *month == 12 {
                    (year.checked_add(1).ok_or_else(invalid)?, 1)
                } else {
                    (*year, month + 1)
                };
                (start, ymd(next_year, next_month, 1)?, Resolution::Month)
            }
            ([year, month, day], None) => {
                let start = ymd(*year, *month, *day)?;
                (start, after(start, TimeDelta::days(1))?, Resolution::Day)
            }
            ([year, month, day], Some(time)) => {
                let date = ymd(*year, *month, *day)?.date();
                let (time, resolution, step) = match time.matches(':').count() {
                    0 => (
                        NaiveTime::parse_from_str(&format!("{time}:00"), "%H:%M"),
                        Resolution::Hour,
                        TimeDelta::hours(1),
                    ),
                    1 => (
                        NaiveTime::parse_from_str(time, "%H:%M"),
                        Resolution::Minute,
                        TimeDelta::minutes(1),
                    ),
                    _ => (
                        NaiveTime::parse_from_str(time, "%H:%M:%S%.f"),
                        Resolution::Second,
                        TimeDelta::zero(),
                    ),
                };
                let start = date.and_time(time.map_err(|_| invalid())?);
                (start, after(start, step)?, resolution)
            }
            _ => return Err(invalid()),
        };
        let end = if resolution == Resolution::Second {
            start
        } else {
            next - TimeDelta::nanoseconds(1)
        };
        Ok(Self {
            start,
            end,
            resolution,
        })
    }

    pub fn contains(&self, time: &NaiveDateTime) -> bool {
        (self.start..=self.end).contains(time)
    }

    /// A second resolution span names one instant.
    pub fn is_instant(&self) -> bool {
        self.start == self.end
    }
}

/// Calendar component derived from datetime labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatetimeComponent {
    Year,
    Month,
    Day,
    DayOfYear,
    Season,
}

impl DatetimeComponent {
    pub fn name(&self) -> &'static str {
        match self {
            DatetimeComponent::Year => "year",
            DatetimeComponent::Month => "month",
            DatetimeComponent::Day => "day",
            DatetimeComponent::DayOfYear => "dayofyear",
            DatetimeComponent::Season => "season",
        }
    }

    pub fn apply(&self, label: &Label) -> Option<Label> {
        let time = label.as_time()?;
        Some(match self {
            DatetimeComponent::Year => Label::Int(time.year().into()),
            DatetimeComponent::Month => Label::Int(time.month().into()),
            DatetimeComponent::Day => Label::Int(time.day().into()),
            DatetimeComponent::DayOfYear => Label::Int(time.ordinal().into()),
            DatetimeComponent::Season => Label::from(season(time.month())),
        })
    }
}

fn season(month: u32) -> &'static str {
    match month {
        12 | 1 | 2 => "DJF",
        3..=5 => "MAM",
        6..=8 => "JJA",
        _ => "SON",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn at(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").unwrap()
    }

    #[rstest]
    #[case("2020", "2020-01-01T00:00:00", "2020-12-31T23:59:59", Resolution::Year)]
    #[case("2020-12", "2020-12-01T00:00:00", "2020-12-31T23:59:59", Resolution::Month)]
    #[case("2020-02", "2020-02-01T00:00:00", "2020-02-29T23:59:59", Resolution::Month)]
    #[case("2020-12-25", "2020-12-25T00:00:00", "2020-12-25T23:59:59", Resolution::Day)]
    #[case("2020-12-25T10", "2020-12-25T10:00:00", "2020-12-25T10:59:59", Resolution::Hour)]
    fn partial_strings_cover_their_period(
        #[case] value: &str,
        #[case] start: &str,
        #[case] last_second: &str,
        #[case] resolution: Resolution,
    ) {
        let span = TimeSpan::parse(value).unwrap();
        assert_eq!(span.start, at(start));
        assert_eq!(span.resolution, resolution);
        assert!(span.contains(&at(last_second)));
        assert!(!span.contains(&(at(last_second) + TimeDelta::seconds(1))));
    }

    #[rstest]
    fn full_timestamp_is_an_instant() {
        let span = TimeSpan::parse("2020-12-25T10:30:00").unwrap();
        assert!(span.is_instant());
        assert_eq!(span.start, at("2020-12-25T10:30:00"));
    }

    #[rstest]
    #[case("december")]
    #[case("2020-13")]
    #[case("2020-02-30")]
    #[case("2020-12T10")]
    #[case("4294967295")]
    #[case("4294967295-12")]
    #[case("2020-4294967295")]
    #[case("2147483647")]
    #[case("262143")]
    #[case("262143-12-31")]
    #[case("262143-12-31T23")]
    fn garbage_is_rejected(#[case] value: &str) {
        assert!(matches!(
            TimeSpan::parse(value),
            Err(CubeError::InvalidDatetime(_))
        ));
    }

    #[rstest]
    #[case(DatetimeComponent::Year, Label::Int(2020))]
    #[case(DatetimeComponent::Month, Label::Int(12))]
    #[case(DatetimeComponent::DayOfYear, Label::Int(360))]
    #[case(DatetimeComponent::Season, Label::from("DJF"))]
    fn datetime_components(#[case] component: DatetimeComponent, #[case] expected: Label) {
        let label = Label::time("2020-12-25").unwrap();
        assert_eq!(component.apply(&label), Some(expected));
    }

    #[rstest]
    fn labels_order_within_kind() {
        assert!(Label::Float(-1.5) < Label::Float(2.0));
        assert!(Label::time("2020-01-01").unwrap() < Label::time("2020-01-02").unwrap());
        assert_eq!(Label::Int(3).as_f64(), Some(3.0));
        assert_eq!(Label::from("x").as_f64(), None);
        assert_eq!(Label::from("red").to_name(), "red");
    }
}
