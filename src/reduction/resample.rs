use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, TimeDelta};
use itertools::Itertools;
use std::collections::HashMap;

use crate::{
    components::{label::midnight, DataArray, Dataset, Label, Lookup},
    errors::{CubeError, Result},
    reduction::GroupBy,
};

/// Fixed-width time buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Frequency {
    /// Buckets of `n` days counted from the day of the first label.
    Days(u32),
    Month,
    Year,
}

impl Frequency {
    fn floor(&self, origin: NaiveDateTime, time: NaiveDateTime) -> NaiveDateTime {
        match self {
            Frequency::Days(days) => {
                let elapsed = (time - origin).num_days();
                let days = i64::from(*days);
                origin + TimeDelta::days(elapsed - elapsed.rem_euclid(days))
            }
            Frequency::Month => first_of(time.year(), time.month()),
            Frequency::Year => first_of(time.year(), 1),
        }
    }

    fn next(&self, start: NaiveDateTime) -> Result<NaiveDateTime> {
        let next = match self {
            Frequency::Days(days) => start.checked_add_signed(TimeDelta::days(i64::from(*days))),
            Frequency::Month => start.checked_add_months(Months::new(1)),
            Frequency::Year => start.checked_add_months(Months::new(12)),
        };
        next.ok_or_else(|| CubeError::InvalidFrequency(format!("{self:?} overflows after {start}")))
    }
}

fn first_of(year: i32, month: u32) -> NaiveDateTime {
    // day one exists in every month
    midnight(NaiveDate::from_ymd_opt(year, month, 1).unwrap_or_default())
}

impl Dataset {
    /// Buckets `axis` chronologically, empty buckets between samples included.
    ///
    /// The axis keeps its name and is labelled by bucket starts.
    pub fn resample(&self, axis: &str, frequency: Frequency) -> Result<GroupBy> {
        if frequency == Frequency::Days(0) {
            return Err(CubeError::InvalidFrequency("buckets need at least one day".into()));
        }
        let source = self.axis(axis)?;
        let times = source
            .labels()
            .iter()
            .map(|label| {
                label
                    .as_time()
                    .copied()
                    .ok_or_else(|| CubeError::NotTemporal(axis.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut groups = Vec::new();
        if let Some((first, last)) = times.iter().copied().minmax().into_option() {
            let origin = midnight(first.date());
            let starts = times
                .iter()
                .map(|time| frequency.floor(origin, *time))
                .collect_vec();
            let mut slots = HashMap::new();
            let mut start = frequency.floor(origin, first);
            let end = frequency.floor(origin, last);
            while start <= end {
                slots.insert(start, groups.len());
                groups.push((Label::Time(start), Vec::new()));
                start = frequency.next(start)?;
            }
            for (position, start) in starts.iter().enumerate() {
                if let Some(slot) = slots.get(start) {
                    groups[*slot].1.push(position);
                }
            }
        }
        Ok(GroupBy::new(self.clone(), axis, axis, groups))
    }
}

impl DataArray {
    pub fn resample(&self, axis: &str, frequency: Frequency) -> Result<GroupBy> {
        self.clone().into_dataset().resample(axis, frequency)
    }
}
