//! Weekly time period calendars evaluated in an IANA time zone.
//!
//! A period lists time ranges per weekday (`"09:00-17:00,20:00-24:00"`).
//! Instants are checked against local wall-clock time, so the same period
//! follows DST changes of the zone it is evaluated in.

use chrono::{Datelike, Days, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::Timestamp;
use crate::error::ConfigError;

/// Maximum number of days searched for the next valid instant
const SEARCH_DAYS: u64 = 366;

/// Half-open range of seconds since local midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: u32,
    pub end: u32,
}

impl TimeRange {
    /// Parses `HH:MM-HH:MM`; `24:00` is accepted as an end of day.
    pub fn parse(text: &str) -> Option<TimeRange> {
        let (start, end) = text.trim().split_once('-')?;
        let start = parse_clock(start)?;
        let end = parse_clock(end)?;
        (start < end).then_some(TimeRange { start, end })
    }

    fn contains(&self, seconds: u32) -> bool {
        seconds >= self.start && seconds < self.end
    }
}

fn parse_clock(text: &str) -> Option<u32> {
    let (hours, minutes) = text.trim().split_once(':')?;
    let hours: u32 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    if minutes >= 60 || hours > 24 || (hours == 24 && minutes != 0) {
        return None;
    }
    Some(hours * 3600 + minutes * 60)
}

/// Definition as written in the objects file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimePeriodDefinition {
    pub name: String,
    pub alias: String,
    pub monday: Option<String>,
    pub tuesday: Option<String>,
    pub wednesday: Option<String>,
    pub thursday: Option<String>,
    pub friday: Option<String>,
    pub saturday: Option<String>,
    pub sunday: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TimePeriod {
    pub name: String,
    pub alias: String,
    /// Index 0 is Monday
    days: [Vec<TimeRange>; 7],
}

impl TimePeriod {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// A period that is valid all day, every day
    pub fn always(name: impl Into<String>) -> Self {
        let mut period = Self::new(name);
        for day in 0..7 {
            period.days[day].push(TimeRange { start: 0, end: 86_400 });
        }
        period
    }

    /// Adds ranges to a weekday (0 is Monday)
    pub fn with_ranges(mut self, weekday: usize, ranges: &[TimeRange]) -> Self {
        if let Some(day) = self.days.get_mut(weekday) {
            day.extend_from_slice(ranges);
            day.sort_by_key(|range| range.start);
        }
        self
    }

    pub fn from_definition(definition: &TimePeriodDefinition) -> Result<Self, ConfigError> {
        let mut period = Self::new(definition.name.clone());
        period.alias = definition.alias.clone();

        let days = [
            &definition.monday,
            &definition.tuesday,
            &definition.wednesday,
            &definition.thursday,
            &definition.friday,
            &definition.saturday,
            &definition.sunday,
        ];
        for (index, day) in days.into_iter().enumerate() {
            let Some(spec) = day else { continue };
            for part in spec.split(',').filter(|part| !part.trim().is_empty()) {
                let range = TimeRange::parse(part).ok_or_else(|| ConfigError::InvalidTimeRange {
                    object: format!("timeperiod '{}'", definition.name),
                    range: part.trim().to_string(),
                })?;
                period.days[index].push(range);
            }
            period.days[index].sort_by_key(|range| range.start);
        }
        Ok(period)
    }

    pub fn is_empty(&self) -> bool {
        self.days.iter().all(Vec::is_empty)
    }

    /// Is the instant inside one of the ranges, in local time of `tz`?
    pub fn is_valid_time(&self, at: Timestamp, tz: Tz) -> bool {
        let Some(local) = tz.timestamp_opt(at, 0).single() else {
            return false;
        };
        let weekday = local.weekday().num_days_from_monday() as usize;
        let seconds = local.num_seconds_from_midnight();
        self.days[weekday].iter().any(|range| range.contains(seconds))
    }

    /// First instant at or after `preferred` that lies inside the period.
    ///
    /// Returns `None` when nothing opens within the next year.
    pub fn next_valid_time(&self, preferred: Timestamp, tz: Tz) -> Option<Timestamp> {
        if self.is_valid_time(preferred, tz) {
            return Some(preferred);
        }
        if self.is_empty() {
            return None;
        }

        let local = tz.timestamp_opt(preferred, 0).single()?;
        let start_date = local.date_naive();
        for offset in 0..=SEARCH_DAYS {
            let date = start_date.checked_add_days(Days::new(offset))?;
            let weekday = date.weekday().num_days_from_monday() as usize;
            for range in &self.days[weekday] {
                let Some(candidate) = resolve_local(tz, date, range.start) else {
                    continue;
                };
                // A range that already started earlier today but is still
                // open would have made `preferred` valid above.
                if candidate > preferred {
                    trace!("next valid time for period '{}' is {}", self.name, candidate);
                    return Some(candidate);
                }
            }
        }
        None
    }
}

/// Converts local wall-clock time to a timestamp. Times skipped by a DST
/// gap resolve to the first instant after the gap.
fn resolve_local(tz: Tz, date: NaiveDate, seconds: u32) -> Option<Timestamp> {
    let naive: NaiveDateTime = date.and_hms_opt(0, 0, 0)? + chrono::Duration::seconds(seconds as i64);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(at) => Some(at.timestamp()),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.timestamp()),
        LocalResult::None => {
            let mut candidate = naive;
            for _ in 0..4 {
                candidate += chrono::Duration::minutes(30);
                if let Some(at) = tz.from_local_datetime(&candidate).earliest() {
                    return Some(at.timestamp());
                }
            }
            None
        }
    }
}

/// Resolves an IANA time zone name
pub fn parse_timezone(name: &str) -> Option<Tz> {
    name.parse::<Tz>().ok()
}
