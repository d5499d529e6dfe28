//! US equity regular-session calendar (09:30–16:00 America/New_York).
//!
//! Weekends are closed. Holidays and early closes come from the market data
//! source's calendar; [`SessionWindow::regular`] is the fallback when that
//! calendar is unavailable.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};

const OPEN_HOUR: u32 = 9;
const OPEN_MINUTE: u32 = 30;
const CLOSE_HOUR: u32 = 16;

/// Open/close boundaries of one trading session, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub date: NaiveDate,
    pub open: DateTime<Utc>,
    pub close: DateTime<Utc>,
}

impl SessionWindow {
    /// Regular session for `date`, or `None` on weekends.
    #[must_use]
    pub fn regular(date: NaiveDate) -> Option<Self> {
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            return None;
        }
        Self::eastern(
            date,
            NaiveTime::from_hms_opt(OPEN_HOUR, OPEN_MINUTE, 0)?,
            NaiveTime::from_hms_opt(CLOSE_HOUR, 0, 0)?,
        )
    }

    /// Session from New York wall-clock open/close times, as exchange
    /// calendars publish them. `None` if `close` is not after `open`.
    #[must_use]
    pub fn eastern(date: NaiveDate, open: NaiveTime, close: NaiveTime) -> Option<Self> {
        let open = eastern_to_utc(date, open)?;
        let close = eastern_to_utc(date, close)?;
        (close > open).then_some(Self { date, open, close })
    }

    /// Session with explicit boundaries (half-days, tests).
    #[must_use]
    pub const fn new(date: NaiveDate, open: DateTime<Utc>, close: DateTime<Utc>) -> Self {
        Self { date, open, close }
    }

    /// `open <= now < close`
    #[must_use]
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.open <= now && now < self.close
    }

    /// Last instant (exclusive) at which new positions may be opened.
    #[must_use]
    pub fn entry_window_end(&self, entry_window_minutes: u32) -> DateTime<Utc> {
        self.open + Duration::minutes(i64::from(entry_window_minutes))
    }

    /// `open <= now < open + entry_window_minutes`
    #[must_use]
    pub fn within_entry_window(&self, now: DateTime<Utc>, entry_window_minutes: u32) -> bool {
        self.open <= now && now < self.entry_window_end(entry_window_minutes)
    }

    /// Time at which any open position is force-closed.
    #[must_use]
    pub fn flatten_time(&self, buffer_minutes: u32) -> DateTime<Utc> {
        self.close - Duration::minutes(i64::from(buffer_minutes))
    }

    #[must_use]
    pub fn length_minutes(&self) -> i64 {
        (self.close - self.open).num_minutes()
    }
}

/// New York calendar date for `now`. Sessions roll over on this date.
#[must_use]
pub fn trading_date(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&New_York).date_naive()
}

/// Start of the next regular session strictly after `now`'s session close,
/// or today's open if `now` is before it.
#[must_use]
pub fn next_session_open(now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let mut date = trading_date(now);
    for _ in 0..7 {
        if let Some(window) = SessionWindow::regular(date) {
            if now < window.open {
                return Some(window.open);
            }
        }
        date = date.succ_opt()?;
    }
    None
}

fn eastern_to_utc(date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    New_York
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
