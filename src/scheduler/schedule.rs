//! Schedule expressions.
//!
//! Supported forms:
//! - six-field cron with seconds: `sec min hour day-of-month month day-of-week`
//!   (e.g. `0 * * * * *` fires at second 0 of every minute); an optional
//!   seventh year field is accepted
//! - `@minutely`, `@hourly`, `@daily`, `@weekly`, `@monthly`, `@yearly`
//! - `@every <n><unit>` with unit `ms`, `s`, `m` or `h` (e.g. `@every 30s`)
//!
//! Cron times are evaluated in UTC.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("invalid schedule '{0}'")]
    InvalidSchedule(String),

    #[error("duplicate job name '{0}'")]
    DuplicateJob(String),
}

#[derive(Debug, Clone)]
enum Kind {
    Every(Duration),
    Cron(Box<cron::Schedule>),
}

/// When a job fires.
#[derive(Debug, Clone)]
pub struct Schedule {
    kind: Kind,
    source: String,
}

impl Schedule {
    /// Time to wait from `now` until the next run, or `None` if the
    /// schedule never fires again.
    pub fn next_delay(&self, now: DateTime<Utc>) -> Option<Duration> {
        match &self.kind {
            Kind::Every(period) => Some(*period),
            Kind::Cron(cron) => {
                let next = cron.after(&now).next()?;
                Some((next - now).to_std().unwrap_or_default())
            }
        }
    }
}

fn named(spec: &str) -> Option<&'static str> {
    match spec {
        "@minutely" => Some("0 * * * * *"),
        "@hourly" => Some("0 0 * * * *"),
        "@daily" | "@midnight" => Some("0 0 0 * * *"),
        "@weekly" => Some("0 0 0 * * Sun"),
        "@monthly" => Some("0 0 0 1 * *"),
        "@yearly" | "@annually" => Some("0 0 0 1 1 *"),
        _ => None,
    }
}

impl FromStr for Schedule {
    type Err = SchedulerError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let invalid = || SchedulerError::InvalidSchedule(spec.to_string());
        let trimmed = spec.trim();

        if let Some(interval) = trimmed.strip_prefix("@every ") {
            let period = parse_interval(interval.trim()).ok_or_else(invalid)?;
            if period.is_zero() {
                return Err(invalid());
            }
            return Ok(Self {
                kind: Kind::Every(period),
                source: trimmed.to_string(),
            });
        }

        let expression = named(trimmed).unwrap_or(trimmed);
        // Seconds are mandatory
        let fields = expression.split_whitespace().count();
        if !(6..=7).contains(&fields) {
            return Err(invalid());
        }
        let cron = cron::Schedule::from_str(expression).map_err(|_| invalid())?;
        Ok(Self {
            kind: Kind::Cron(Box::new(cron)),
            source: trimmed.to_string(),
        })
    }
}

fn parse_interval(s: &str) -> Option<Duration> {
    let split = s.find(|c: char| !c.is_ascii_digit())?;
    let (digits, unit) = s.split_at(split);
    let n: u64 = digits.parse().ok()?;

    match unit {
        "ms" => Some(Duration::from_millis(n)),
        "s" => Some(Duration::from_secs(n)),
        "m" => Some(Duration::from_secs(n.checked_mul(60)?)),
        "h" => Some(Duration::from_secs(n.checked_mul(60 * 60)?)),
        _ => None,
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, h, m, s).unwrap()
    }

    fn delay(spec: &str, now: DateTime<Utc>) -> Duration {
        spec.parse::<Schedule>().unwrap().next_delay(now).unwrap()
    }

    #[test]
    fn test_parse_every() {
        let now = at(0, 0, 0);
        assert_eq!(delay("@every 250ms", now), Duration::from_millis(250));
        assert_eq!(delay("@every 30s", now), Duration::from_secs(30));
        assert_eq!(delay("@every 5m", now), Duration::from_secs(300));
        assert_eq!(delay("@every 2h", now), Duration::from_secs(7200));
    }

    #[test]
    fn test_cron_with_seconds() {
        // Second 0 of every minute
        assert_eq!(delay("0 * * * * *", at(10, 15, 42)), Duration::from_secs(18));
        assert_eq!(delay("0 * * * * *", at(10, 15, 0)), Duration::from_secs(60));
        // Every 15 seconds
        assert_eq!(delay("*/15 * * * * *", at(10, 15, 16)), Duration::from_secs(14));
        // 03:30:00 daily
        assert_eq!(delay("0 30 3 * * *", at(3, 0, 0)), Duration::from_secs(30 * 60));
    }

    #[test]
    fn test_named_schedules_align_to_boundaries() {
        assert_eq!(delay("@minutely", at(10, 15, 42)), Duration::from_secs(18));
        assert_eq!(delay("@hourly", at(10, 59, 0)), Duration::from_secs(60));
        assert_eq!(delay("@daily", at(23, 0, 0)), Duration::from_secs(3600));
    }

    #[test]
    fn test_display_keeps_source() {
        assert_eq!("0 * * * * *".parse::<Schedule>().unwrap().to_string(), "0 * * * * *");
        assert_eq!("@every 30s".parse::<Schedule>().unwrap().to_string(), "@every 30s");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for spec in [
            "",
            "@every",
            "@every 0s",
            "@every 10",
            "@every s",
            "@every 3d",
            "*/5 * * * *",
            "61 * * * * *",
            "@fortnightly",
        ] {
            assert!(spec.parse::<Schedule>().is_err(), "accepted {spec:?}");
        }
    }
}
