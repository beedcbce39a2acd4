//! Duration strings in the `1h30m` / `300ms` / `1.5h` notation used by
//! build definitions

use std::time::Duration;
use thiserror::Error;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SECOND: u128 = 1_000_000_000;
const NANOS_PER_MINUTE: u128 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MINUTE;

/// Largest representable duration, matching a signed 64-bit nanosecond count
const MAX_NANOS: u128 = i64::MAX as u128;

/// Duration parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DurationError {
    #[error("invalid duration {0:?}")]
    Invalid(String),

    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),

    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },

    #[error("negative duration {0:?}")]
    Negative(String),

    #[error("duration {0:?} is out of range")]
    Overflow(String),
}

/// Parse a duration string such as `5m`, `1h30m`, `2.5s` or `300ms`.
///
/// A duration is a sequence of decimal numbers, each with an optional fraction
/// and a mandatory unit suffix. Valid units are `ns`, `us` (or `µs`), `ms`,
/// `s`, `m` and `h`. The bare string `0` is accepted without a unit.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let invalid = || DurationError::Invalid(input.to_string());
    let overflow = || DurationError::Overflow(input.to_string());

    let mut s = input;
    let mut negative = false;
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }

    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total: u128 = 0;
    while !s.is_empty() {
        let int_len = s.bytes().take_while(u8::is_ascii_digit).count();
        let (int_part, rest) = s.split_at(int_len);
        s = rest;

        let mut frac_part = "";
        if let Some(rest) = s.strip_prefix('.') {
            let frac_len = rest.bytes().take_while(u8::is_ascii_digit).count();
            frac_part = &rest[..frac_len];
            s = &rest[frac_len..];
            if int_part.is_empty() && frac_part.is_empty() {
                return Err(invalid());
            }
        } else if int_part.is_empty() {
            return Err(invalid());
        }

        let unit_len = s
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(s.len());
        if unit_len == 0 {
            return Err(DurationError::MissingUnit(input.to_string()));
        }
        let (unit, rest) = s.split_at(unit_len);
        s = rest;

        let unit_nanos = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => NANOS_PER_MICRO,
            "ms" => NANOS_PER_MILLI,
            "s" => NANOS_PER_SECOND,
            "m" => NANOS_PER_MINUTE,
            "h" => NANOS_PER_HOUR,
            _ => {
                return Err(DurationError::UnknownUnit {
                    unit: unit.to_string(),
                    input: input.to_string(),
                })
            }
        };

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| overflow())?
        };
        let mut nanos = whole.checked_mul(unit_nanos).ok_or_else(overflow)?;

        if !frac_part.is_empty() {
            // Digits beyond nanosecond precision for any unit cannot change the result
            let digits = &frac_part[..frac_part.len().min(18)];
            let frac: u128 = digits.parse().map_err(|_| invalid())?;
            let scale = 10u128.pow(digits.len() as u32);
            nanos = nanos
                .checked_add(frac * unit_nanos / scale)
                .ok_or_else(overflow)?;
        }

        total = total.checked_add(nanos).ok_or_else(overflow)?;
        if total > MAX_NANOS {
            return Err(overflow());
        }
    }

    if negative && total != 0 {
        return Err(DurationError::Negative(input.to_string()));
    }

    Ok(Duration::from_nanos(total as u64))
}

/// Render a duration in the same notation `parse_duration` accepts, e.g.
/// `5m0s` or `1h30m0s`.
pub fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        return "0s".to_string();
    }

    let total_secs = duration.as_secs();
    let subsec = duration.subsec_nanos();

    if total_secs == 0 {
        return if subsec % 1_000_000 == 0 {
            format!("{}ms", subsec / 1_000_000)
        } else if subsec % 1_000 == 0 {
            format!("{}µs", subsec / 1_000)
        } else {
            format!("{}ns", subsec)
        };
    }

    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    let mut seconds_str = seconds.to_string();
    if subsec != 0 {
        let frac = format!("{:09}", subsec);
        seconds_str.push('.');
        seconds_str.push_str(frac.trim_end_matches('0'));
    }

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds_str)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds_str)
    } else {
        format!("{}s", seconds_str)
    }
}
