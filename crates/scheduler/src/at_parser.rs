//! Parser for `at`-style schedule expressions.
//!
//! Supports `now + N <unit>` (`seconds|minutes|hours|days`) and two
//! fixed absolute formats: `YYYY-MM-DD HH:MM[:SS]` and a bare `HH:MM`
//! that resolves to today if still in the future, else tomorrow. A full
//! natural-language date parser was deliberately not introduced — no
//! crate in the dependency stack covers it, and adding one here would
//! be the one dependency-alignment exception in this codebase.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

use sa_domain::error::{Error, Result};

pub fn parse_at_expression(expr: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let expr = expr.trim();
    if let Some(rest) = expr.strip_prefix("now + ").or_else(|| expr.strip_prefix("now+")) {
        return parse_relative(rest.trim(), now);
    }
    if let Ok(dt) = parse_absolute_datetime(expr) {
        return Ok(dt);
    }
    if let Ok(time) = NaiveTime::parse_from_str(expr, "%H:%M") {
        return Ok(resolve_time_today_or_tomorrow(time, now));
    }
    Err(Error::ScheduleParseError(format!(
        "unrecognized `at` expression: '{expr}'"
    )))
}

fn parse_relative(rest: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let mut parts = rest.split_whitespace();
    let amount: i64 = parts
        .next()
        .ok_or_else(|| Error::ScheduleParseError(format!("missing amount in 'now + {rest}'")))?
        .parse()
        .map_err(|_| Error::ScheduleParseError(format!("invalid amount in 'now + {rest}'")))?;
    let unit = parts
        .next()
        .ok_or_else(|| Error::ScheduleParseError(format!("missing unit in 'now + {rest}'")))?;
    let duration = match unit.trim_end_matches('s') {
        "second" => Duration::seconds(amount),
        "minute" => Duration::minutes(amount),
        "hour" => Duration::hours(amount),
        "day" => Duration::days(amount),
        other => {
            return Err(Error::ScheduleParseError(format!(
                "unknown unit '{other}' in 'now + {rest}'"
            )))
        }
    };
    Ok(now + duration)
}

fn parse_absolute_datetime(expr: &str) -> std::result::Result<DateTime<Utc>, ()> {
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(expr, "%Y-%m-%d %H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(expr, "%Y-%m-%d %H:%M") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(expr, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    Err(())
}

fn resolve_time_today_or_tomorrow(time: NaiveTime, now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();
    let candidate = Utc.from_utc_datetime(&today.and_time(time));
    if candidate > now {
        candidate
    } else {
        Utc.from_utc_datetime(&(today + Duration::days(1)).and_time(time))
    }
}
