use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{AppError, Result};

enum Layout {
    Rfc2822,
    Rfc3339,
    /// chrono format string that carries its own offset.
    WithOffset(&'static str),
    /// chrono format string followed by a zone abbreviation. The zone name is
    /// dropped and the time read as UTC.
    NamedZone(&'static str),
    /// chrono format string without an offset, read as UTC.
    Naive(&'static str),
}

/// Tried in order; the first layout that parses wins.
const LAYOUTS: &[Layout] = &[
    Layout::Rfc2822,
    Layout::NamedZone("%a, %d %b %Y %H:%M:%S"),
    Layout::NamedZone("%d %b %y %H:%M"),
    Layout::Rfc3339,
    Layout::WithOffset("%a, %d %b %Y %H:%M:%S %z"),
    Layout::WithOffset("%a, %d %b %Y %H:%M %z"),
    Layout::WithOffset("%Y-%m-%dT%H:%M:%S%z"),
    Layout::Naive("%Y-%m-%d %H:%M:%S"),
    Layout::Naive("%Y-%m-%dT%H:%M:%S"),
];

impl Layout {
    fn parse(&self, text: &str) -> Option<DateTime<Utc>> {
        let parsed = match self {
            Layout::Rfc2822 => DateTime::parse_from_rfc2822(text).ok()?,
            Layout::Rfc3339 => DateTime::parse_from_rfc3339(text).ok()?,
            Layout::WithOffset(fmt) => DateTime::parse_from_str(text, fmt).ok()?,
            Layout::NamedZone(fmt) => {
                let (rest, zone) = text.rsplit_once(char::is_whitespace)?;
                if zone.is_empty() || !zone.chars().all(|c| c.is_ascii_alphabetic()) {
                    return None;
                }
                return NaiveDateTime::parse_from_str(rest.trim_end(), fmt)
                    .ok()
                    .map(|naive| naive.and_utc());
            }
            Layout::Naive(fmt) => {
                return NaiveDateTime::parse_from_str(text, fmt)
                    .ok()
                    .map(|naive| naive.and_utc())
            }
        };
        Some(parsed.with_timezone(&Utc))
    }
}

/// Turn an item's published-date text into an absolute time.
pub fn normalize(text: &str) -> Result<DateTime<Utc>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AppError::Date(text.to_string()));
    }

    LAYOUTS
        .iter()
        .find_map(|layout| layout.parse(trimmed))
        .ok_or_else(|| AppError::Date(text.to_string()))
}
