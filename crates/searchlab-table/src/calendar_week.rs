//! Searchlab Calendar Week
//!
//! ISO-8601 calendar-week arithmetic over an explicit table of 53-week
//! years, plus business-calendar "same week last year" mappings that keep
//! movable holidays aligned by anchoring on the Easter Sunday week.
//!
//! Key Features:
//! - Week stepping across year boundaries
//! - Numeric, date-based and Easter-anchored previous-year mappings
//! - First/last day, Saturday and Europe/Paris start instant of a week
//! - `YYYYWW` labels and human-readable week labels
//!
//! The 53-week year table is valid for 1993 through 2070 and the Easter
//! table covers 2015 through 2034; outside those ranges the results follow
//! the fallback rules and are not guaranteed to match the ISO calendar.
//!
//! @version 0.1.0
//! @author Searchlab Development Team

use chrono::{Datelike, Duration, NaiveDate, TimeZone, Weekday};
use chrono_tz::Europe::Paris;
use searchlab_common::{Result, SearchlabError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Calendar Tables
// =============================================================================

/// Years with 53 ISO weeks.
const WEEK53_YEARS: [i32; 13] = [
    1998, 2004, 2009, 2015, 2020, 2026, 2032, 2037, 2043, 2048, 2054, 2060, 2065,
];

/// ISO week holding Easter Sunday, per year.
const EASTER_SUNDAY_WEEKS: [(i32, u32); 20] = [
    (2015, 14),
    (2016, 12),
    (2017, 15),
    (2018, 13),
    (2019, 16),
    (2020, 15),
    (2021, 13),
    (2022, 15),
    (2023, 14),
    (2024, 13),
    (2025, 16),
    (2026, 14),
    (2027, 12),
    (2028, 15),
    (2029, 13),
    (2030, 16),
    (2031, 15),
    (2032, 13),
    (2033, 15),
    (2034, 14),
];

/// Week offsets relative to Easter Sunday that are mapped by holiday rather
/// than by date. Notable members: -7 women's thursday, -6 rose monday,
/// 0 easter sunday, 1 easter monday, 6 ascension, 7 pentecost, 8 whit monday,
/// 9 corpus christi.
const EASTER_OFFSETS: std::ops::RangeInclusive<i32> = -10..=12;

/// Number of calendar weeks in `year`.
pub fn weeks_in_year(year: i32) -> u32 {
    if WEEK53_YEARS.contains(&year) {
        53
    } else {
        52
    }
}

fn easter_sunday_week(year: i32) -> Option<u32> {
    EASTER_SUNDAY_WEEKS
        .iter()
        .find(|(y, _)| *y == year)
        .map(|(_, w)| *w)
}

// =============================================================================
// Calendar Week
// =============================================================================

/// A `(year, week)` pair, ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CalendarWeek {
    year: i32,
    week: u32,
}

impl CalendarWeek {
    /// Create a week; `week` must lie in `1..=weeks_in_year(year)`.
    pub fn new(year: i32, week: u32) -> Result<Self> {
        if !(1..=9999).contains(&year) {
            return Err(SearchlabError::InvalidValue(format!(
                "year {} out of range",
                year
            )));
        }
        if week == 0 || week > weeks_in_year(year) {
            return Err(SearchlabError::InvalidValue(format!(
                "week {} does not exist in {}",
                week, year
            )));
        }
        Ok(Self { year, week })
    }

    /// ISO week of a date.
    pub fn from_date(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }

    /// Parse a `YYYYWW` label.
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || SearchlabError::InvalidValue(format!("not a YYYYWW week: '{}'", text));
        if text.len() != 6 || !text.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let year = text[..4].parse::<i32>().map_err(|_| invalid())?;
        let week = text[4..].parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, week)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn week(&self) -> u32 {
        self.week
    }

    /// Zero-padded two-digit week.
    pub fn ww(&self) -> String {
        format!("{:02}", self.week)
    }

    /// `YYYYWW` label.
    pub fn yyyyww(&self) -> String {
        format!("{}{:02}", self.year, self.week)
    }

    // -------------------------------------------------------------------------
    // Days and instants
    // -------------------------------------------------------------------------

    /// Monday of the week.
    pub fn first_day_of_week(&self) -> NaiveDate {
        let week1 = NaiveDate::from_isoywd_opt(self.year, 1, Weekday::Mon).unwrap_or_default();
        week1 + Duration::days(7 * (i64::from(self.week) - 1))
    }

    /// Sunday of the week.
    pub fn last_day_of_week(&self) -> NaiveDate {
        self.first_day_of_week() + Duration::days(6)
    }

    pub fn saturday_of_week(&self) -> NaiveDate {
        self.first_day_of_week() + Duration::days(5)
    }

    /// Start of the Monday in Europe/Paris, as epoch milliseconds.
    pub fn start_millis(&self) -> i64 {
        let midnight = self.first_day_of_week().and_time(chrono::NaiveTime::MIN);
        Paris
            .from_local_datetime(&midnight)
            .earliest()
            .map(|t| t.timestamp_millis())
            .unwrap_or_else(|| midnight.and_utc().timestamp_millis())
    }

    /// Label like `2023 KW10 6.3.-12.3.`.
    pub fn print_label(&self) -> String {
        let first = self.first_day_of_week();
        let last = self.last_day_of_week();
        format!(
            "{} KW{:02} {}.{}.-{}.{}.",
            self.year,
            self.week,
            first.day(),
            first.month(),
            last.day(),
            last.month()
        )
    }

    // -------------------------------------------------------------------------
    // Stepping
    // -------------------------------------------------------------------------

    /// The following week.
    pub fn inc(&self) -> Self {
        if self.week < weeks_in_year(self.year) {
            Self {
                year: self.year,
                week: self.week + 1,
            }
        } else {
            Self {
                year: self.year + 1,
                week: 1,
            }
        }
    }

    /// The preceding week.
    pub fn dec(&self) -> Self {
        if self.week > 1 {
            Self {
                year: self.year,
                week: self.week - 1,
            }
        } else {
            Self {
                year: self.year - 1,
                week: weeks_in_year(self.year - 1),
            }
        }
    }

    /// Same week number one year earlier, clamped to the previous year's
    /// week count; week 52 maps to week 53 when the previous year has one.
    pub fn dec_year_numeric(&self) -> Self {
        let year = self.year - 1;
        let previous_weeks = weeks_in_year(year);
        let week = match self.week {
            53 if previous_weeks == 52 => 52,
            52 if previous_weeks == 53 => 53,
            w => w,
        };
        Self { year, week }
    }

    /// Week holding the same calendar date one year earlier, using the
    /// Saturday of this week as reference. Falls back to
    /// [`dec_year_numeric`](Self::dec_year_numeric) when the date has no
    /// counterpart (Feb 29) or lands outside the previous year.
    pub fn week_of_prev_year(&self) -> Self {
        let saturday = self.saturday_of_week();
        let Some(date) = NaiveDate::from_ymd_opt(saturday.year() - 1, saturday.month(), saturday.day())
        else {
            return self.dec_year_numeric();
        };
        let previous = Self::from_date(date);
        if previous.year == self.year - 1 {
            previous
        } else {
            self.dec_year_numeric()
        }
    }

    /// Business-calendar week of the previous year. Weeks near Easter map to
    /// the week with the same offset from Easter Sunday in the previous year,
    /// so that movable holidays line up; all other weeks use
    /// [`week_of_prev_year`](Self::week_of_prev_year).
    pub fn dec_year_business(&self) -> Self {
        let (Some(easter), Some(previous_easter)) = (
            easter_sunday_week(self.year),
            easter_sunday_week(self.year - 1),
        ) else {
            return self.week_of_prev_year();
        };
        for offset in EASTER_OFFSETS {
            if i64::from(easter) + i64::from(offset) == i64::from(self.week) {
                let week = (i64::from(previous_easter) + i64::from(offset)) as u32;
                return Self {
                    year: self.year - 1,
                    week,
                };
            }
        }
        self.week_of_prev_year()
    }
}

impl fmt::Display for CalendarWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:02}", self.year, self.week)
    }
}

impl FromStr for CalendarWeek {
    type Err = SearchlabError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
