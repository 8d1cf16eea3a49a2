//! Report schedules and period arithmetic
//!
//! A report period runs from one trigger time to the next: a daily schedule
//! at `"09:00"` yields periods `[D 09:00, D+1 09:00)`. Alerts are
//! deduplicated per period and a report triggered at time `T` covers the
//! period that ends at `T`.

use adcomply_core::{Error, Result};
use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ReportScheduleConfig;

/// Report cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodKind {
    Daily,
    Weekly,
}

impl PeriodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            _ => None,
        }
    }

    fn length(&self) -> Duration {
        match self {
            Self::Daily => Duration::days(1),
            Self::Weekly => Duration::weeks(1),
        }
    }
}

impl fmt::Display for PeriodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Half-open reporting window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub kind: PeriodKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    /// The period immediately before this one
    pub fn previous(&self) -> Self {
        let length = self.kind.length();
        Self {
            kind: self.kind,
            start: self.start - length,
            end: self.start,
        }
    }

    /// `REP_<start yyyymmdd>_<end yyyymmdd>`
    pub fn report_id(&self) -> String {
        format!("REP_{}_{}", self.start.format("%Y%m%d"), self.end.format("%Y%m%d"))
    }
}

/// A parsed trigger time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    kind: PeriodKind,
    weekday: Weekday,
    at: NaiveTime,
}

impl Schedule {
    /// `"HH:MM"`, UTC
    pub fn daily(raw: &str) -> Result<Self> {
        Ok(Self {
            kind: PeriodKind::Daily,
            weekday: Weekday::Mon,
            at: parse_time(raw)?,
        })
    }

    /// `"MON HH:MM"`, UTC
    pub fn weekly(raw: &str) -> Result<Self> {
        let mut parts = raw.split_whitespace();
        let (Some(day), Some(time), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(Error::config(format!("weekly schedule {raw:?} must look like \"MON HH:MM\"")));
        };
        let weekday = day
            .parse::<Weekday>()
            .map_err(|_| Error::config(format!("unknown weekday {day:?} in schedule {raw:?}")))?;
        Ok(Self {
            kind: PeriodKind::Weekly,
            weekday,
            at: parse_time(time)?,
        })
    }

    pub fn kind(&self) -> PeriodKind {
        self.kind
    }

    /// Period that contains `at`
    pub fn period_containing(&self, at: DateTime<Utc>) -> Period {
        let days_back = match self.kind {
            PeriodKind::Daily => 0,
            PeriodKind::Weekly => {
                (at.weekday().num_days_from_monday() + 7 - self.weekday.num_days_from_monday()) % 7
            }
        };
        let mut start = (at.date_naive() - Duration::days(i64::from(days_back)))
            .and_time(self.at)
            .and_utc();
        if start > at {
            start -= self.kind.length();
        }
        Period {
            kind: self.kind,
            start,
            end: start + self.kind.length(),
        }
    }

    /// Most recent period that has fully elapsed at `now`
    pub fn last_completed(&self, now: DateTime<Utc>) -> Period {
        self.period_containing(now).previous()
    }

    /// First trigger strictly after `after`
    pub fn next_trigger(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        self.period_containing(after).end
    }
}

fn parse_time(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|e| Error::config(format!("invalid schedule time {raw:?}: {e}")))
}

/// Configured daily and weekly schedules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedules {
    daily: Option<Schedule>,
    weekly: Option<Schedule>,
}

impl Schedules {
    pub fn from_config(config: &ReportScheduleConfig) -> Result<Self> {
        Ok(Self {
            daily: config.daily.as_deref().map(Schedule::daily).transpose()?,
            weekly: config.weekly.as_deref().map(Schedule::weekly).transpose()?,
        })
    }

    /// Configured schedules in trigger priority order (daily first)
    pub fn configured(&self) -> impl Iterator<Item = Schedule> {
        self.daily.into_iter().chain(self.weekly)
    }

    pub fn is_configured(&self, kind: PeriodKind) -> bool {
        match kind {
            PeriodKind::Daily => self.daily.is_some(),
            PeriodKind::Weekly => self.weekly.is_some(),
        }
    }

    /// Schedule for `kind`, falling back to midnight (Monday for weekly)
    pub fn get(&self, kind: PeriodKind) -> Schedule {
        let fallback = Schedule {
            kind,
            weekday: Weekday::Mon,
            at: NaiveTime::MIN,
        };
        match kind {
            PeriodKind::Daily => self.daily.unwrap_or(fallback),
            PeriodKind::Weekly => self.weekly.unwrap_or(fallback),
        }
    }

    /// Alert deduplication period: daily when configured, otherwise weekly
    pub fn alert_period(&self, at: DateTime<Utc>) -> Period {
        match (self.daily, self.weekly) {
            (None, Some(weekly)) => weekly.period_containing(at),
            _ => self.get(PeriodKind::Daily).period_containing(at),
        }
    }

    /// Delivering a report of this kind archives the alerts it covers
    pub fn archiving_kind(&self) -> PeriodKind {
        if self.weekly.is_some() {
            PeriodKind::Weekly
        } else {
            PeriodKind::Daily
        }
    }

    /// Start of the last completed weekly period: nothing submitted before
    /// it can appear in a report generated or previewed at `now`
    pub fn retention_horizon(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let weekly = self.get(PeriodKind::Weekly).last_completed(now).start;
        let daily = self.get(PeriodKind::Daily).last_completed(now).start;
        weekly.min(daily)
    }

    /// Earliest configured trigger strictly after `after`
    pub fn next_due(&self, after: DateTime<Utc>) -> Option<(DateTime<Utc>, PeriodKind)> {
        self.configured()
            .map(|schedule| (schedule.next_trigger(after), schedule.kind()))
            .min()
    }
}
