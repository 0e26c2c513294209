//! PDF (`D:YYYYMMDDHHmmSSOHH'mm'`) and W3C/XMP date syntax

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use regex::{Captures, Regex};
use std::sync::OnceLock;

fn pdf_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"^(?:D:)?(\d{4})(\d{2})?(\d{2})?(\d{2})?(\d{2})?(\d{2})?(?:([Zz+\-])(?:(\d{2})'?(?:(\d{2})'?)?)?)?$",
            )
            .ok()
        })
        .as_ref()
}

fn w3c_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"^(\d{4})(?:-(\d{2})(?:-(\d{2})(?:T(\d{2}):(\d{2})(?::(\d{2})(?:\.\d+)?)?(Z|[+\-]\d{2}:\d{2})?)?)?)?$",
            )
            .ok()
        })
        .as_ref()
}

fn number(caps: &Captures<'_>, idx: usize, default: u32) -> Option<u32> {
    match caps.get(idx) {
        Some(m) => m.as_str().parse().ok(),
        None => Some(default),
    }
}

fn build(
    date: (i32, u32, u32),
    time: (u32, u32, u32),
    offset_seconds: i32,
) -> Option<DateTime<FixedOffset>> {
    let offset = FixedOffset::east_opt(offset_seconds)?;
    let naive = NaiveDate::from_ymd_opt(date.0, date.1, date.2)?.and_hms_opt(time.0, time.1, time.2)?;
    offset.from_local_datetime(&naive).single()
}

/// Parse a PDF date string; missing trailing components default to their minimum
pub fn parse_pdf_date(input: &str) -> Option<DateTime<FixedOffset>> {
    let caps = pdf_pattern()?.captures(input.trim())?;
    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    let month = number(&caps, 2, 1)?;
    let day = number(&caps, 3, 1)?;
    let hour = number(&caps, 4, 0)?;
    let minute = number(&caps, 5, 0)?;
    let second = number(&caps, 6, 0)?;

    let offset = match caps.get(7).map(|m| m.as_str()) {
        Some(sign @ ("+" | "-")) => {
            let hours = number(&caps, 8, 0)? as i32;
            let minutes = number(&caps, 9, 0)? as i32;
            let seconds = hours * 3600 + minutes * 60;
            if sign == "-" {
                -seconds
            } else {
                seconds
            }
        }
        _ => 0,
    };

    build((year, month, day), (hour, minute, second), offset)
}

/// Format as `D:YYYYMMDDHHmmSS` followed by `Z` or `+HH'mm'`
pub fn format_pdf_date(date: &DateTime<FixedOffset>) -> String {
    let offset = date.offset().local_minus_utc();
    let zone = if offset == 0 {
        "Z".to_string()
    } else {
        let sign = if offset < 0 { '-' } else { '+' };
        let abs = offset.abs();
        format!("{}{:02}'{:02}'", sign, abs / 3600, (abs % 3600) / 60)
    };
    format!("D:{}{}", date.format("%Y%m%d%H%M%S"), zone)
}

/// Parse any of the W3C date profiles XMP allows (`YYYY` through full date-time)
pub fn parse_w3c_date(input: &str) -> Option<DateTime<FixedOffset>> {
    let input = input.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(input) {
        return Some(date);
    }

    let caps = w3c_pattern()?.captures(input)?;
    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    let month = number(&caps, 2, 1)?;
    let day = number(&caps, 3, 1)?;
    let hour = number(&caps, 4, 0)?;
    let minute = number(&caps, 5, 0)?;
    let second = number(&caps, 6, 0)?;

    let offset = match caps.get(7).map(|m| m.as_str()) {
        None | Some("Z") => 0,
        Some(zone) => {
            let sign = if zone.starts_with('-') { -1 } else { 1 };
            let hours: i32 = zone.get(1..3)?.parse().ok()?;
            let minutes: i32 = zone.get(4..6)?.parse().ok()?;
            sign * (hours * 3600 + minutes * 60)
        }
    };

    build((year, month, day), (hour, minute, second), offset)
}

pub fn format_w3c_date(date: &DateTime<FixedOffset>) -> String {
    date.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}

/// Convert a PDF date to W3C syntax, passing anything unparseable through
pub fn pdf_to_w3c(input: &str) -> String {
    parse_pdf_date(input)
        .map(|d| format_w3c_date(&d))
        .unwrap_or_else(|| input.to_string())
}

/// Convert a W3C date to PDF syntax, passing anything unparseable through
pub fn w3c_to_pdf(input: &str) -> String {
    parse_w3c_date(input)
        .map(|d| format_pdf_date(&d))
        .unwrap_or_else(|| input.to_string())
}
