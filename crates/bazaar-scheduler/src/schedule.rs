//! Cron expressions for recurring triggers.
//!
//! Accepts standard 5-field Unix expressions (minute, hour, day-of-month,
//! month, day-of-week) and 6-field expressions with a leading seconds field.
//! The `cron` crate wants seconds, so 5-field input gets `0` prepended.

use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::{Result, SchedulerError};

/// A parsed cron expression.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: cron::Schedule,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let normalized = normalize_cron_expr(expression);
        let schedule = cron::Schedule::from_str(&normalized).map_err(|e| {
            SchedulerError::InvalidSchedule(format!("invalid cron expression '{expression}': {e}"))
        })?;
        Ok(Self {
            expression: expression.to_string(),
            schedule,
        })
    }

    /// The expression as originally written.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First occurrence strictly after `from`, `None` if the expression never
    /// fires again.
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }
}

fn normalize_cron_expr(expression: &str) -> String {
    let trimmed = expression.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn five_field_daily_expression() {
        let cron = CronSchedule::parse("0 2 * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2026, 5, 1, 3, 0, 0).unwrap();
        assert_eq!(
            cron.next_after(from).unwrap(),
            Utc.with_ymd_and_hms(2026, 5, 2, 2, 0, 0).unwrap()
        );
    }

    #[test]
    fn six_field_expression_is_used_as_is() {
        let cron = CronSchedule::parse("*/10 * * * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2026, 5, 1, 3, 0, 5).unwrap();
        assert_eq!(
            cron.next_after(from).unwrap(),
            Utc.with_ymd_and_hms(2026, 5, 1, 3, 0, 10).unwrap()
        );
    }

    #[test]
    fn next_is_strictly_after_from() {
        let cron = CronSchedule::parse("0 8 * * *").unwrap();
        let at_fire = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();
        assert_eq!(
            cron.next_after(at_fire).unwrap(),
            Utc.with_ymd_and_hms(2026, 5, 2, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn garbage_is_rejected() {
        let err = CronSchedule::parse("every tuesday").unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule(_)));
    }
}
