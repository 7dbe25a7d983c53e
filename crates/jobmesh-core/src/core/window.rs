// jobmesh-core/src/core/window.rs
// ============================================================================
// Module: Jobmesh Execution Windows
// Description: Window configuration and boundary computation (v1 and v2).
// Purpose: Validate windows per spec version and compute DSTART/DEND.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! A window is the triple `(size, offset, truncate_to)` attached to a job
//! spec. Its interpretation depends on the spec version: version 1 uses
//! [`WindowV1`] where months are approximated as thirty days, version 2 and
//! later use [`WindowV2`] with calendar-aware month arithmetic.
//!
//! Durations follow the `72h`, `1h30m`, `-24h` grammar; month components are
//! written with an upper-case `M` prefix segment such as `1M` or `-2M12h`.
//! All computation happens in UTC.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::Date;
use time::Duration;
use time::Month;
use time::OffsetDateTime;
use time::Time;

use crate::core::errors::DomainError;
use crate::core::errors::ENTITY_WINDOW;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Days used to approximate one month in v1 windows.
const V1_DAYS_PER_MONTH: i64 = 30;
/// Valid v1 truncation units.
const V1_TRUNCATE_OPTIONS: [&str; 5] = ["h", "d", "w", "m", "M"];
/// Valid v2 truncation units; empty is also accepted.
const V2_TRUNCATE_OPTIONS: [&str; 4] = ["h", "d", "w", "M"];

// ============================================================================
// SECTION: Window Config
// ============================================================================

/// Declared window triple as authored in a spec.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window size, for example `24h` or `1M`.
    #[serde(default)]
    pub size: String,
    /// Window end offset relative to the truncated schedule time.
    #[serde(default)]
    pub offset: String,
    /// Truncation unit applied to the schedule time.
    #[serde(default)]
    pub truncate_to: String,
}

impl WindowConfig {
    /// Creates a window config.
    #[must_use]
    pub fn new(
        size: impl Into<String>,
        offset: impl Into<String>,
        truncate_to: impl Into<String>,
    ) -> Self {
        Self {
            size: size.into(),
            offset: offset.into(),
            truncate_to: truncate_to.into(),
        }
    }

    /// Interprets the config for a spec version.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error when the config is not valid for the
    /// requested version.
    pub fn for_version(&self, version: u32) -> Result<Window, DomainError> {
        if version <= 1 {
            WindowV1::parse(self).map(Window::V1)
        } else {
            WindowV2::parse(self).map(Window::V2)
        }
    }
}

// ============================================================================
// SECTION: Window
// ============================================================================

/// Version-specific window interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Window {
    /// Thirty-day month approximation.
    V1(WindowV1),
    /// Calendar-aware months.
    V2(WindowV2),
}

impl Window {
    /// Computes `(start, end)` for a schedule time.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error when the boundaries overflow the
    /// supported date range.
    pub fn bounds(
        &self,
        schedule_time: OffsetDateTime,
    ) -> Result<(OffsetDateTime, OffsetDateTime), DomainError> {
        match self {
            Self::V1(window) => window.bounds(schedule_time),
            Self::V2(window) => window.bounds(schedule_time),
        }
    }
}

/// Parsed v1 window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowV1 {
    /// Truncation unit.
    truncate_to: String,
    /// Window size.
    size: Duration,
    /// End offset.
    offset: Duration,
}

impl WindowV1 {
    /// Parses and validates a v1 window.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error on an unknown truncation unit or an
    /// unparseable duration.
    pub fn parse(config: &WindowConfig) -> Result<Self, DomainError> {
        if !V1_TRUNCATE_OPTIONS.contains(&config.truncate_to.as_str()) {
            return Err(window_error(format!(
                "invalid option provided, provide one of : [{}]",
                V1_TRUNCATE_OPTIONS.join(" ")
            )));
        }
        let size = if config.size.is_empty() {
            Duration::days(1)
        } else {
            parse_v1_duration(&config.size).map_err(|err| {
                window_error(format!(
                    "failed to parse task window with size {}: {err}",
                    config.size
                ))
            })?
        };
        let offset = if config.offset.is_empty() {
            Duration::ZERO
        } else {
            parse_v1_duration(&config.offset).map_err(|err| {
                window_error(format!(
                    "failed to parse task window with offset {}: {err}",
                    config.offset
                ))
            })?
        };
        Ok(Self {
            truncate_to: config.truncate_to.clone(),
            size,
            offset,
        })
    }

    /// Computes `(start, end)` for a schedule time.
    fn bounds(
        &self,
        schedule_time: OffsetDateTime,
    ) -> Result<(OffsetDateTime, OffsetDateTime), DomainError> {
        let schedule_time = schedule_time.to_offset(time::UtcOffset::UTC);
        if matches!(self.truncate_to.as_str(), "m" | "M") {
            let month_span = Duration::days(V1_DAYS_PER_MONTH);
            let offset_months = self.offset.whole_days() / V1_DAYS_PER_MONTH;
            let first = first_of_month(schedule_time.date())?;
            let shifted = add_months(first, offset_months)?;
            let last_day = add_months(shifted, 1)?
                .previous_day()
                .ok_or_else(|| window_error("window end out of range"))?;
            let end = last_day.midnight().assume_utc();
            let size_months = (self.size.whole_seconds() / month_span.whole_seconds()) - 1;
            let mut start = first_of_month(last_day)?;
            if size_months > 0 {
                start = add_months(start, -size_months)?;
            }
            return Ok((start.midnight().assume_utc(), end));
        }
        let floating_end = match self.truncate_to.as_str() {
            "h" => truncate_hour(schedule_time),
            "d" => truncate_day(schedule_time),
            "w" => {
                let days_to_sunday =
                    i64::from(6 - schedule_time.weekday().number_days_from_sunday()) + 1;
                truncate_day(checked_add(schedule_time, Duration::days(days_to_sunday))?)
            }
            _ => schedule_time,
        };
        let end = checked_add(floating_end, self.offset)?;
        let start = checked_add(end, -self.size)?;
        Ok((start, end))
    }
}

/// Parsed v2 window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowV2 {
    /// Truncation unit; empty disables truncation.
    truncate_to: String,
    /// End offset as months plus a duration.
    offset: (i64, Duration),
    /// Window size as months plus a duration.
    size: (i64, Duration),
}

impl WindowV2 {
    /// Parses and validates a v2 window.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error on an unknown truncation unit, an
    /// unparseable duration, or a negative size.
    pub fn parse(config: &WindowConfig) -> Result<Self, DomainError> {
        if !config.truncate_to.is_empty()
            && !V2_TRUNCATE_OPTIONS.contains(&config.truncate_to.as_str())
        {
            return Err(window_error(format!(
                "error validating truncate_to: invalid option provided, provide one of: [{}]",
                V2_TRUNCATE_OPTIONS.join(" ")
            )));
        }
        let offset = parse_months_and_duration(&config.offset)
            .map_err(|err| window_error(format!("error validating offset: {err}")))?;
        let size = parse_months_and_duration(&config.size)
            .map_err(|err| window_error(format!("error validating size: {err}")))?;
        if size.0 < 0 || config.size.starts_with('-') {
            return Err(window_error("error validating size: size cannot be negative"));
        }
        Ok(Self {
            truncate_to: config.truncate_to.clone(),
            offset,
            size,
        })
    }

    /// Computes `(start, end)` for a schedule time.
    fn bounds(
        &self,
        schedule_time: OffsetDateTime,
    ) -> Result<(OffsetDateTime, OffsetDateTime), DomainError> {
        let schedule_time = schedule_time.to_offset(time::UtcOffset::UTC);
        let truncated = match self.truncate_to.as_str() {
            "h" => truncate_hour(schedule_time),
            "d" => truncate_day(schedule_time),
            "w" => {
                let days_from_monday = i64::from(schedule_time.weekday().number_days_from_monday());
                checked_add(truncate_day(schedule_time), -Duration::days(days_from_monday))?
            }
            "M" => first_of_month(schedule_time.date())?.midnight().assume_utc(),
            _ => schedule_time,
        };
        let end = add_months_to_time(checked_add(truncated, self.offset.1)?, self.offset.0)?;
        let start = add_months_to_time(checked_add(end, -self.size.1)?, -self.size.0)?;
        Ok((start, end))
    }
}

// ============================================================================
// SECTION: Duration Parsing
// ============================================================================

/// Parses a signed duration such as `1h30m`, `-24h`, `0`, or `1.5h`.
///
/// # Errors
///
/// Returns a description of the failure for malformed input.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let trimmed = input.trim();
    let (negative, body) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    if body == "0" {
        return Ok(Duration::ZERO);
    }
    if body.is_empty() {
        return Err(format!("invalid duration \"{input}\""));
    }
    let mut total_ns: i128 = 0;
    let mut rest = body;
    while !rest.is_empty() {
        let number_len =
            rest.find(|ch: char| !(ch.is_ascii_digit() || ch == '.')).unwrap_or(rest.len());
        if number_len == 0 {
            return Err(format!("invalid duration \"{input}\""));
        }
        let number = &rest[..number_len];
        rest = &rest[number_len..];
        let unit_len = rest.find(|ch: char| ch.is_ascii_digit() || ch == '.').unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];
        let unit_ns: i128 = match unit {
            "ns" => 1,
            "us" | "\u{b5}s" | "\u{3bc}s" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            "" => return Err(format!("missing unit in duration \"{input}\"")),
            other => return Err(format!("unknown unit \"{other}\" in duration \"{input}\"")),
        };
        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        let whole: i128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| format!("invalid duration \"{input}\""))?
        };
        total_ns += whole * unit_ns;
        if !fraction.is_empty() {
            let exponent =
                u32::try_from(fraction.len()).map_err(|_| "fraction too long".to_string())?;
            let scale = 10_i128
                .checked_pow(exponent)
                .ok_or_else(|| format!("invalid duration \"{input}\""))?;
            let digits: i128 =
                fraction.parse().map_err(|_| format!("invalid duration \"{input}\""))?;
            total_ns += digits * unit_ns / scale;
        }
    }
    if negative {
        total_ns = -total_ns;
    }
    let total_ns = i64::try_from(total_ns).map_err(|_| format!("invalid duration \"{input}\""))?;
    Ok(Duration::nanoseconds(total_ns))
}

/// Parses a v1 duration where a leading `<n>M` segment counts thirty days.
fn parse_v1_duration(input: &str) -> Result<Duration, String> {
    let Some((months, remainder)) = split_months(input)? else {
        return parse_duration(input);
    };
    let mut total = Duration::days(V1_DAYS_PER_MONTH * months);
    let remainder = remainder.trim();
    if !remainder.is_empty() {
        total += parse_duration(remainder)?;
    }
    Ok(total)
}

/// Parses a v2 value into `(months, duration)`; empty yields zero.
fn parse_months_and_duration(input: &str) -> Result<(i64, Duration), String> {
    if input.is_empty() {
        return Ok((0, Duration::ZERO));
    }
    let Some((months, remainder)) = split_months(input)? else {
        return Ok((0, parse_duration(input)?));
    };
    if remainder.is_empty() {
        return Ok((months, Duration::ZERO));
    }
    let duration = parse_duration(remainder)?;
    Ok((months, if months < 0 { -duration } else { duration }))
}

/// Splits a leading `[+-]<digits>M` segment; `None` when there is no month part.
fn split_months(input: &str) -> Result<Option<(i64, &str)>, String> {
    let Some((head, tail)) = input.split_once('M') else {
        return Ok(None);
    };
    let months: i64 =
        head.trim().parse().map_err(|_| format!("invalid month value in \"{input}\""))?;
    Ok(Some((months, tail)))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a window validation error.
fn window_error(message: impl Into<String>) -> DomainError {
    DomainError::invalid_argument(ENTITY_WINDOW, message)
}

/// Adds a duration, failing on overflow.
fn checked_add(value: OffsetDateTime, duration: Duration) -> Result<OffsetDateTime, DomainError> {
    value.checked_add(duration).ok_or_else(|| window_error("window boundary out of range"))
}

/// Truncates to the start of the hour.
fn truncate_hour(value: OffsetDateTime) -> OffsetDateTime {
    value.replace_time(Time::from_hms(value.hour(), 0, 0).unwrap_or(Time::MIDNIGHT))
}

/// Truncates to midnight.
fn truncate_day(value: OffsetDateTime) -> OffsetDateTime {
    value.replace_time(Time::MIDNIGHT)
}

/// Returns the first day of the date's month.
fn first_of_month(date: Date) -> Result<Date, DomainError> {
    Date::from_calendar_date(date.year(), date.month(), 1)
        .map_err(|err| window_error(format!("invalid month start: {err}")))
}

/// Adds calendar months, normalizing day overflow into the following month.
fn add_months(date: Date, months: i64) -> Result<Date, DomainError> {
    let month_index = i64::from(date.year()) * 12 + i64::from(u8::from(date.month())) - 1 + months;
    let year = i32::try_from(month_index.div_euclid(12))
        .map_err(|_| window_error("window boundary out of range"))?;
    let month = u8::try_from(month_index.rem_euclid(12) + 1)
        .ok()
        .and_then(|value| Month::try_from(value).ok())
        .ok_or_else(|| window_error("window boundary out of range"))?;
    let first = Date::from_calendar_date(year, month, 1)
        .map_err(|err| window_error(format!("window boundary out of range: {err}")))?;
    first
        .checked_add(Duration::days(i64::from(date.day()) - 1))
        .ok_or_else(|| window_error("window boundary out of range"))
}

/// Adds calendar months to a timestamp, keeping the time of day.
fn add_months_to_time(value: OffsetDateTime, months: i64) -> Result<OffsetDateTime, DomainError> {
    if months == 0 {
        return Ok(value);
    }
    Ok(value.replace_date(add_months(value.date(), months)?))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
