//! Minimal cron-style next-fire computation for the two C6 timers.
//!
//! Not a general cron engine: it understands exactly the subset
//! `fx-config`'s `dailyTrainCron`/`weeklyTrainCron` strings need — a fixed
//! minute and hour, an optional fixed day-of-week, and `*` everywhere else.
//! That subset replaces the source's `setInterval` + manual-clearing timers
//! (design note, SPEC_FULL §"Periodic work") without pulling in a full cron
//! parser for two call sites.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc, Weekday};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CronParseError {
    #[error("cron expression must have 5 space-separated fields, got {0:?}")]
    WrongFieldCount(String),
    #[error("unsupported cron field {field:?} in {expr:?}: only digits or '*' are understood")]
    UnsupportedField { field: String, expr: String },
}

/// A parsed `minute hour * * dow` expression. `day_of_month` and `month`
/// fields must be `*` — the two configured schedules never use them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronSchedule {
    minute: u32,
    hour: u32,
    day_of_week: Option<u32>,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self, CronParseError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronParseError::WrongFieldCount(expr.to_string()));
        }

        let minute = parse_fixed(fields[0], expr)?;
        let hour = parse_fixed(fields[1], expr)?;
        if fields[2] != "*" || fields[3] != "*" {
            return Err(CronParseError::UnsupportedField {
                field: format!("{} {}", fields[2], fields[3]),
                expr: expr.to_string(),
            });
        }
        let day_of_week = if fields[4] == "*" {
            None
        } else {
            Some(parse_fixed(fields[4], expr)?)
        };

        let minute = minute.ok_or_else(|| CronParseError::UnsupportedField {
            field: fields[0].to_string(),
            expr: expr.to_string(),
        })?;
        let hour = hour.ok_or_else(|| CronParseError::UnsupportedField {
            field: fields[1].to_string(),
            expr: expr.to_string(),
        })?;

        Ok(Self {
            minute,
            hour,
            day_of_week,
        })
    }

    /// The next UTC instant strictly after `after` that this schedule fires.
    pub fn next_after(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let mut candidate = Utc
            .with_ymd_and_hms(after.year(), after.month(), after.day(), self.hour, self.minute, 0)
            .single()
            .unwrap_or(after);

        if candidate <= after {
            candidate += Duration::days(1);
        }

        if let Some(dow) = self.day_of_week {
            while weekday_index(candidate.weekday()) != dow {
                candidate += Duration::days(1);
            }
        }

        candidate
    }
}

fn parse_fixed(field: &str, expr: &str) -> Result<Option<u32>, CronParseError> {
    if field == "*" {
        return Ok(None);
    }
    field
        .parse::<u32>()
        .map(Some)
        .map_err(|_| CronParseError::UnsupportedField {
            field: field.to_string(),
            expr: expr.to_string(),
        })
}

/// Cron's day-of-week is 0 (Sunday) through 6 (Saturday).
fn weekday_index(weekday: Weekday) -> u32 {
    match weekday {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_schedule_fires_next_day_when_past_today() {
        let schedule = CronSchedule::parse("0 2 * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 7, 28, 10, 0, 0).unwrap();
        let next = schedule.next_after(after);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 7, 29, 2, 0, 0).unwrap());
    }

    #[test]
    fn daily_schedule_fires_later_today_when_still_ahead() {
        let schedule = CronSchedule::parse("0 2 * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap();
        let next = schedule.next_after(after);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 7, 28, 2, 0, 0).unwrap());
    }

    #[test]
    fn weekly_schedule_lands_on_the_configured_weekday() {
        // "0 1 * * 0" = Sunday 01:00 UTC.
        let schedule = CronSchedule::parse("0 1 * * 0").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap(); // a Tuesday
        let next = schedule.next_after(after);
        assert_eq!(next.weekday(), Weekday::Sun);
        assert_eq!(next.hour(), 1);
        assert!(next > after);
    }

    #[test]
    fn rejects_expressions_with_a_fixed_day_of_month() {
        assert!(CronSchedule::parse("0 2 1 * *").is_err());
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(CronSchedule::parse("0 2 * *").is_err());
    }
}
