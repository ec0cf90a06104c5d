//! Contracting-time conversion.
//!
//! The contracting runtime serializes datetimes as a six-element array
//! `[year, month, day, hour, minute, second]` with a 1-based month.
//! All timestamps in the engine are Unix seconds (UTC).

use chrono::NaiveDate;

/// Converts a contracting-time array to Unix seconds.
///
/// Returns `None` when the parts do not form a valid calendar datetime
/// (month 0 or 13, day 32, ...).
pub fn to_unix_seconds(parts: [i64; 6]) -> Option<i64> {
    let year = i32::try_from(parts[0]).ok()?;
    let month = u32::try_from(parts[1]).ok()?;
    let day = u32::try_from(parts[2]).ok()?;
    let hour = u32::try_from(parts[3]).ok()?;
    let minute = u32::try_from(parts[4]).ok()?;
    let second = u32::try_from(parts[5]).ok()?;

    let datetime = NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_opt(hour, minute, second)?;
    Some(datetime.and_utc().timestamp())
}
