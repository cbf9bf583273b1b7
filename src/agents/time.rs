/// Run clock - the timestamp and calendar day a run is keyed on.
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeContext {
    pub now: DateTime<Utc>,
    pub date: NaiveDate,
}

impl TimeContext {
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            date: now.date_naive(),
        }
    }

    /// Calendar day in `YYYY-MM-DD` form, as hashed into cache keys.
    pub fn day_key(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn day_key_ignores_time_of_day() {
        let morning = TimeContext::at(Utc.with_ymd_and_hms(2024, 3, 9, 0, 5, 0).unwrap());
        let night = TimeContext::at(Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 59).unwrap());
        assert_eq!(morning.day_key(), "2024-03-09");
        assert_eq!(morning.day_key(), night.day_key());
        assert_ne!(morning.now, night.now);
    }
}
