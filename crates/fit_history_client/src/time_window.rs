//! Query windows expressed as UTC instants but anchored on local calendar days.

use chrono::{
    DateTime, Days, LocalResult, NaiveDate, NaiveTime, SecondsFormat, TimeDelta, TimeZone, Utc,
};
use serde::Serialize;

use crate::FitError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, FitError> {
        if start > end {
            return Err(FitError::InvalidInput(format!(
                "window start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Window from the start of the local day `days` days before `now`, through `now`.
    ///
    /// With `now` = 2024-06-15T12:00 local and `days` = 10 the window starts at
    /// 2024-06-05T00:00 local.
    pub fn last_days<Tz: TimeZone>(now: &DateTime<Tz>, days: u32) -> Self {
        let first_day = now
            .date_naive()
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MIN);
        let start = start_of_day(&now.timezone(), first_day);
        Self {
            start: start.with_timezone(&Utc),
            end: now.with_timezone(&Utc),
        }
    }

    pub fn start_millis(&self) -> i64 {
        self.start.timestamp_millis()
    }

    pub fn end_millis(&self) -> i64 {
        self.end.timestamp_millis()
    }

    pub fn start_rfc3339(&self) -> String {
        self.start.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn end_rfc3339(&self) -> String {
        self.end.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// First instant of `day` in `tz`. Midnight may fall into a DST gap, in which
/// case the first valid local time after it is used.
fn start_of_day<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> DateTime<Tz> {
    let midnight = day.and_time(NaiveTime::MIN);
    let mut candidate = midnight;
    while candidate.date() == day {
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(t) => return t,
            LocalResult::Ambiguous(earliest, _) => return earliest,
            LocalResult::None => candidate += TimeDelta::minutes(15),
        }
    }
    tz.from_utc_datetime(&midnight)
}
