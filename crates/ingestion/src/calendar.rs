//! Market calendar filtering.
//!
//! Keeps only the trading days that run the regular session, dropping
//! half-days and other shortened sessions.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use spread_core::config::SessionConfig;
use spread_core::Result;
use tracing::debug;

/// One trading day's session as published by the exchange calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSession {
    pub date: NaiveDate,
    /// Local open time.
    pub open: NaiveTime,
    /// Local close time.
    pub close: NaiveTime,
}

impl MarketSession {
    /// Whether this session matches the configured regular session.
    pub fn is_regular(&self, session: &SessionConfig) -> bool {
        self.open == session.open && self.close == session.close
    }
}

/// Source of exchange sessions between two dates (inclusive).
pub trait CalendarSource {
    fn sessions(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<MarketSession>>;
}

impl CalendarSource for [MarketSession] {
    fn sessions(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<MarketSession>> {
        Ok(self
            .iter()
            .filter(|s| s.date >= start && s.date <= end)
            .copied()
            .collect())
    }
}

impl CalendarSource for Vec<MarketSession> {
    fn sessions(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<MarketSession>> {
        self.as_slice().sessions(start, end)
    }
}

/// Dates in `[start, end]` whose session is the regular one, ascending.
pub fn valid_trading_days<C: CalendarSource + ?Sized>(
    calendar: &C,
    session: &SessionConfig,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<NaiveDate>> {
    let sessions = calendar.sessions(start, end)?;
    let total = sessions.len();

    let mut days: Vec<NaiveDate> = sessions
        .into_iter()
        .filter(|s| s.is_regular(session))
        .map(|s| s.date)
        .collect();
    days.sort_unstable();
    days.dedup();

    debug!(%start, %end, total, regular = days.len(), "filtered trading calendar");
    Ok(days)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_session(day: u32, open: (u32, u32), close: (u32, u32)) -> MarketSession {
        MarketSession {
            date: NaiveDate::from_ymd_opt(2019, 12, day).unwrap(),
            open: NaiveTime::from_hms_opt(open.0, open.1, 0).unwrap(),
            close: NaiveTime::from_hms_opt(close.0, close.1, 0).unwrap(),
        }
    }

    #[test]
    fn test_half_day_excluded() {
        let calendar = vec![
            make_session(23, (9, 30), (16, 0)),
            make_session(24, (9, 30), (13, 0)),
            make_session(26, (9, 30), (16, 0)),
        ];
        let days = valid_trading_days(
            &calendar,
            &SessionConfig::default(),
            NaiveDate::from_ymd_opt(2019, 12, 1).unwrap(),
            NaiveDate::from_ymd_opt(2019, 12, 31).unwrap(),
        )
        .unwrap();

        assert_eq!(
            days,
            vec![
                NaiveDate::from_ymd_opt(2019, 12, 23).unwrap(),
                NaiveDate::from_ymd_opt(2019, 12, 26).unwrap(),
            ]
        );
    }

    #[test]
    fn test_range_is_inclusive_and_sorted() {
        let calendar = vec![
            make_session(27, (9, 30), (16, 0)),
            make_session(20, (9, 30), (16, 0)),
            make_session(23, (9, 30), (16, 0)),
        ];
        let days = valid_trading_days(
            calendar.as_slice(),
            &SessionConfig::default(),
            NaiveDate::from_ymd_opt(2019, 12, 23).unwrap(),
            NaiveDate::from_ymd_opt(2019, 12, 27).unwrap(),
        )
        .unwrap();

        assert_eq!(days.len(), 2);
        assert!(days[0] < days[1]);
    }

    #[test]
    fn test_sessions_from_json() {
        let json = r#"[
            {"date": "2019-11-29", "open": "09:30:00", "close": "13:00:00"},
            {"date": "2019-12-02", "open": "09:30:00", "close": "16:00:00"}
        ]"#;
        let calendar: Vec<MarketSession> = serde_json::from_str(json).unwrap();
        let days = valid_trading_days(
            &calendar,
            &SessionConfig::default(),
            NaiveDate::from_ymd_opt(2019, 11, 1).unwrap(),
            NaiveDate::from_ymd_opt(2019, 12, 31).unwrap(),
        )
        .unwrap();
        assert_eq!(days, vec![NaiveDate::from_ymd_opt(2019, 12, 2).unwrap()]);
    }

    #[test]
    fn test_late_open_excluded() {
        let calendar = vec![make_session(23, (10, 0), (16, 0))];
        let days = valid_trading_days(
            &calendar,
            &SessionConfig::default(),
            NaiveDate::from_ymd_opt(2019, 12, 1).unwrap(),
            NaiveDate::from_ymd_opt(2019, 12, 31).unwrap(),
        )
        .unwrap();
        assert!(days.is_empty());
    }
}
