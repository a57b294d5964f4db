//! Session clock.
//!
//! Maps absolute UTC quote timestamps onto seconds after the local session
//! open of a trading date.

use chrono::offset::LocalResult;
use chrono::{NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;
use spread_core::config::SessionConfig;
use spread_core::{Error, OffsetSeconds, Result, TimestampNs};

const NANOS_PER_SECOND: f64 = 1e9;

/// Exchange session in a fixed IANA time zone.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    tz: Tz,
    open: NaiveTime,
    close: NaiveTime,
}

impl SessionClock {
    /// Build a clock from the session configuration.
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let tz: Tz = config
            .timezone
            .parse()
            .map_err(|e| Error::config(format!("unknown time zone {}: {e}", config.timezone)))?;
        if config.open >= config.close {
            return Err(Error::config(format!(
                "session open {} must be before close {}",
                config.open, config.close
            )));
        }
        Ok(Self {
            tz,
            open: config.open,
            close: config.close,
        })
    }

    /// UTC nanoseconds of a local wall-clock time on `date`.
    fn local_to_ns(&self, date: NaiveDate, time: NaiveTime) -> Result<TimestampNs> {
        let naive = date.and_time(time);
        let dt = match self.tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => dt,
            LocalResult::Ambiguous(..) => {
                return Err(Error::config(format!("{naive} is ambiguous in {}", self.tz)))
            }
            LocalResult::None => {
                return Err(Error::config(format!("{naive} does not exist in {}", self.tz)))
            }
        };
        dt.timestamp_nanos_opt()
            .ok_or_else(|| Error::data(format!("{naive} is outside the nanosecond range")))
    }

    /// Session open of `date` in UTC nanoseconds.
    pub fn open_ns(&self, date: NaiveDate) -> Result<TimestampNs> {
        self.local_to_ns(date, self.open)
    }

    /// `[open, close)` of `date` in UTC nanoseconds.
    pub fn window_ns(&self, date: NaiveDate) -> Result<(TimestampNs, TimestampNs)> {
        Ok((self.local_to_ns(date, self.open)?, self.local_to_ns(date, self.close)?))
    }

    /// Seconds from `open_ns` to `ts_ns`.
    #[inline]
    pub fn offset_seconds(open_ns: TimestampNs, ts_ns: TimestampNs) -> OffsetSeconds {
        (ts_ns - open_ns) as f64 / NANOS_PER_SECOND
    }
}
