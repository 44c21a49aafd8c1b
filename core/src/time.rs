use chrono::{DateTime, Duration, Local, NaiveDate, SecondsFormat, TimeZone, Utc};

use crate::error::{Result, TaskflowError};

/// Serialized form of every persisted timestamp.
pub fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TaskflowError::CorruptState(format!("bad timestamp '{}': {}", raw, e)))
}

/// Parses a due date typed by a person: `today`, `tomorrow`, `+3d`, `+2w`,
/// `2025-03-01` (end of that local day) or an RFC 3339 timestamp.
pub fn parse_due_date(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    let today = Local::now().date_naive();

    match input.to_lowercase().as_str() {
        "today" | "tod" => return end_of_day(today),
        "tomorrow" | "tom" => return end_of_day(today + Duration::days(1)),
        _ => {}
    }

    if let Some(rest) = input.strip_prefix('+') {
        let invalid = || TaskflowError::validation(format!("invalid relative date: {}", input));
        let date = today.checked_add_signed(parse_offset(rest)?).ok_or_else(invalid)?;
        return end_of_day(date);
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return end_of_day(date);
    }

    DateTime::parse_from_rfc3339(input)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| TaskflowError::validation(format!("could not parse date: {}", input)))
}

fn parse_offset(raw: &str) -> Result<Duration> {
    let invalid = || TaskflowError::validation(format!("invalid relative date: +{}", raw));
    let (split, unit) = raw.char_indices().last().ok_or_else(invalid)?;
    let count: i64 = raw[..split].parse().map_err(|_| invalid())?;
    let offset = match unit {
        'd' => Duration::try_days(count),
        'w' => Duration::try_weeks(count),
        _ => None,
    };
    offset.ok_or_else(invalid)
}

fn end_of_day(date: NaiveDate) -> Result<DateTime<Utc>> {
    let local = date
        .and_hms_opt(23, 59, 59)
        .and_then(|dt| Local.from_local_datetime(&dt).earliest())
        .ok_or_else(|| TaskflowError::validation(format!("no such local time on {}", date)))?;
    Ok(local.with_timezone(&Utc))
}
