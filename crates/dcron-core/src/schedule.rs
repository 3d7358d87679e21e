//! Schedule parser — normalizes a user-supplied schedule string into the form the cron wheel
//! accepts, and flags one-shot jobs.
//!
//! Stateless by construction: unlike the original's `cron.Parser` value (which the Go service
//! guards with a mutex purely because it's shared mutable state on a struct field), every
//! function here takes its own arguments and holds nothing across calls, so there is nothing to
//! protect for concurrent callers.

use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::{DateTime, TimeZone};
use chrono_tz::Tz;
use cron::Schedule;

use crate::error::{DcronError, DcronResult};

pub const EVERY_PREFIX: &str = "@every ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSchedule {
    /// Normalized cron expression (or `@every <dur>`, passed through unchanged).
    pub cron_expr: String,
    /// True if the input was a pure decimal epoch (one-shot).
    pub is_one_shot: bool,
}

/// Parses a user schedule string: a decimal epoch, an `@every <duration>` descriptor, or a
/// standard cron expression (5- or 6-field) / named descriptor (`@hourly`, `@daily`, `@weekly`,
/// `@monthly`, `@yearly`, `@midnight`). Named descriptors and 5-field expressions are expanded to
/// the 6-field form `cron::Schedule` actually parses before validation.
pub fn parse_schedule(input: &str, tz: Tz) -> DcronResult<ParsedSchedule> {
    let trimmed = input.trim();

    if let Ok(epoch) = trimmed.parse::<i64>() {
        let cron_expr = format_epoch_as_cron(epoch, tz);
        // Validate round-trip through the cron evaluator, same as any other expression.
        Schedule::from_str(&cron_expr)
            .map_err(|e| DcronError::InvalidSchedule(e.to_string()))?;
        return Ok(ParsedSchedule {
            cron_expr,
            is_one_shot: true,
        });
    }

    if let Some(dur) = trimmed.strip_prefix(EVERY_PREFIX) {
        parse_duration(dur)?;
        return Ok(ParsedSchedule {
            cron_expr: trimmed.to_string(),
            is_one_shot: false,
        });
    }

    let expanded = expand_descriptor(trimmed).unwrap_or(trimmed);
    let normalized = add_seconds_field_if_missing(expanded);

    Schedule::from_str(&normalized).map_err(|e| DcronError::InvalidSchedule(e.to_string()))?;
    Ok(ParsedSchedule {
        cron_expr: normalized,
        is_one_shot: false,
    })
}

/// Expands a named descriptor to its 6-field cron equivalent. `cron::Schedule` has no grammar for
/// `@`-descriptors other than the hand-rolled `@every` case above, so these must be spelled out
/// before being handed to it.
fn expand_descriptor(pattern: &str) -> Option<&'static str> {
    Some(match pattern {
        "@yearly" | "@annually" => "0 0 0 1 1 *",
        "@monthly" => "0 0 0 1 * *",
        "@weekly" => "0 0 0 * * 0",
        "@daily" | "@midnight" => "0 0 0 * * *",
        "@hourly" => "0 0 * * * *",
        _ => return None,
    })
}

/// Prepends a `0` seconds field to a bare 5-field crontab expression, matching the original's
/// `cron.SecondOptional` parser option. 6- and 7-field expressions pass through unchanged.
fn add_seconds_field_if_missing(pattern: &str) -> String {
    if pattern.split_whitespace().count() == 5 {
        format!("0 {pattern}")
    } else {
        pattern.to_string()
    }
}

/// Formats a decimal epoch as a cron expression pinned to that instant's
/// second/minute/hour/day/month, any year: `"<sec> <min> <hour> <dom> <month> *"`.
pub fn format_epoch_as_cron(epoch: i64, tz: Tz) -> String {
    let t = tz.timestamp_opt(epoch, 0).single().unwrap_or_else(|| {
        tz.from_utc_datetime(&DateTime::from_timestamp(epoch, 0).unwrap_or_default().naive_utc())
    });
    use chrono::{Datelike, Timelike};
    format!(
        "{} {} {} {} {} *",
        t.second(),
        t.minute(),
        t.hour(),
        t.day(),
        t.month()
    )
}

/// True iff `pattern` is an `@every <duration>` descriptor.
pub fn is_every(pattern: &str) -> bool {
    pattern.starts_with(EVERY_PREFIX)
}

/// Extracts the duration from an `@every <duration>` pattern.
pub fn every_duration(pattern: &str) -> DcronResult<StdDuration> {
    let dur = pattern
        .strip_prefix(EVERY_PREFIX)
        .ok_or_else(|| DcronError::InvalidSchedule(pattern.to_string()))?;
    parse_duration(dur)
}

/// Parses a Go-`time.ParseDuration`-style string: a sequence of `<number><unit>` pairs where unit
/// is one of `ms`, `s`, `m`, `h`. `"1h30m10s"`, `"5s"`, `"500ms"` are all valid.
pub fn parse_duration(s: &str) -> DcronResult<StdDuration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(DcronError::InvalidSchedule("empty duration".into()));
    }

    let mut total = StdDuration::ZERO;
    let mut chars = s.char_indices().peekable();
    let mut start = 0usize;

    while let Some(&(idx, ch)) = chars.peek() {
        if ch.is_ascii_digit() || ch == '.' {
            chars.next();
            continue;
        }
        // Found the start of a unit suffix; consume the number portion first.
        let num_str = &s[start..idx];
        if num_str.is_empty() {
            return Err(DcronError::InvalidSchedule(s.to_string()));
        }
        let value: f64 = num_str
            .parse()
            .map_err(|_| DcronError::InvalidSchedule(s.to_string()))?;

        // Consume unit letters (up to 2: "ms", or 1: "s"/"m"/"h").
        let unit_start = idx;
        let mut unit_end = idx;
        while let Some(&(i2, c2)) = chars.peek() {
            if c2.is_alphabetic() {
                unit_end = i2 + c2.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let unit = &s[unit_start..unit_end];
        let millis = match unit {
            "ms" => value,
            "s" => value * 1_000.0,
            "m" => value * 60_000.0,
            "h" => value * 3_600_000.0,
            other => {
                return Err(DcronError::InvalidSchedule(format!(
                    "unknown duration unit: {other}"
                )));
            }
        };
        total += StdDuration::from_millis(millis as u64);
        start = unit_end;
    }

    if start != s.len() {
        return Err(DcronError::InvalidSchedule(s.to_string()));
    }

    Ok(total)
}
