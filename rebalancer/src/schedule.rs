//! Trading windows, macro-date blackouts and the scheduler's run marker.
//!
//! All wall-clock reasoning happens in America/New_York; the broker clock
//! and stored timestamps stay in UTC.

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use chrono_tz::America::New_York;
use chrono_tz::Tz;
use serde::Serialize;

use crate::config::ScheduleConfig;
use crate::error::{Error, Result};

/// Convert a UTC instant to exchange-local time.
pub fn to_eastern(now: DateTime<Utc>) -> DateTime<Tz> {
    now.with_timezone(&New_York)
}

/// `am` before noon ET, `pm` after.
pub fn window_tag(now: DateTime<Utc>) -> &'static str {
    if to_eastern(now).hour() < 12 { "am" } else { "pm" }
}

/// Parse a strict `HH:MM` window.
pub fn parse_window(s: &str) -> Result<NaiveTime> {
    let s = s.trim();
    if s.len() != 5 {
        return Err(Error::Config(format!("window {s:?} is not HH:MM")));
    }
    NaiveTime::parse_from_str(s, "%H:%M")
        .map_err(|e| Error::Config(format!("window {s:?} is not HH:MM: {e}")))
}

/// Parse a `YYYY-MM-DD` macro date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| Error::Config(format!("macro date {s:?} is not YYYY-MM-DD: {e}")))
}

/// Validated schedule settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub enabled: bool,
    pub windows: Vec<NaiveTime>,
    pub tolerance_min: u32,
    pub avoid_near_close_min: i64,
    pub macro_dates: Vec<NaiveDate>,
}

impl Schedule {
    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        let windows = config
            .windows_et
            .iter()
            .map(|w| parse_window(w))
            .collect::<Result<Vec<_>>>()?;
        let macro_dates = config
            .macro_dates
            .iter()
            .map(|d| parse_date(d))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            enabled: config.enabled,
            windows,
            tolerance_min: config.window_tolerance_min,
            avoid_near_close_min: config.avoid_near_close_min,
            macro_dates,
        })
    }

    /// The window `now` falls in, if any: the first configured window within
    /// `tolerance_min` minutes of the current ET minute.
    pub fn matching_window(&self, now: DateTime<Utc>) -> Option<NaiveTime> {
        let et = to_eastern(now);
        let minute = i64::from(et.hour() * 60 + et.minute());
        let tol = i64::from(self.tolerance_min);
        self.windows.iter().copied().find(|w| {
            let wm = i64::from(w.hour() * 60 + w.minute());
            (minute - wm).abs() <= tol
        })
    }

    /// True when the ET date of `now` is a configured macro-event day.
    pub fn is_macro_day(&self, now: DateTime<Utc>) -> bool {
        self.macro_dates.contains(&to_eastern(now).date_naive())
    }
}

/// Identifies one scheduled run: ET date plus `HH:MM`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MinuteMarker {
    pub date: NaiveDate,
    pub minute: String,
}

impl MinuteMarker {
    /// Marker for the ET minute containing `now`.
    pub fn of(now: DateTime<Utc>) -> Self {
        let et = to_eastern(now);
        Self {
            date: et.date_naive(),
            minute: et.format("%H:%M").to_string(),
        }
    }

    /// Marker for `window` on the ET date of `now`.
    pub fn for_window(now: DateTime<Utc>, window: NaiveTime) -> Self {
        Self {
            date: to_eastern(now).date_naive(),
            minute: window.format("%H:%M").to_string(),
        }
    }
}

/// Dedupe state for the scheduler loop.
///
/// A window fires at most once per ET date. With a non-zero tolerance the
/// marker is keyed on the matched window rather than the current minute, so
/// the whole tolerance band counts as one run.
#[derive(Debug, Default)]
pub struct RunGuard {
    last: Option<MinuteMarker>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// The marker to run under, or `None` when disabled, outside every
    /// window, or already run for this window today.
    pub fn due(&mut self, now: DateTime<Utc>, schedule: &Schedule) -> Option<MinuteMarker> {
        let today = to_eastern(now).date_naive();
        if self.last.as_ref().is_some_and(|m| m.date != today) {
            log::info!("New trading day {today}, resetting run marker");
            self.last = None;
        }
        if !schedule.enabled {
            return None;
        }
        let window = schedule.matching_window(now)?;
        let marker = MinuteMarker::for_window(now, window);
        if self.last.as_ref() == Some(&marker) {
            return None;
        }
        Some(marker)
    }

    /// Record that a run happened under `marker`.
    pub fn mark(&mut self, marker: MinuteMarker) {
        self.last = Some(marker);
    }

    pub fn last(&self) -> Option<&MinuteMarker> {
        self.last.as_ref()
    }
}
