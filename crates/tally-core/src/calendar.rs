//! Calendar-day helpers. "Today" is always the calendar date in the operator's
//! configured timezone, never a rolling 24 hour window.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Parses an IANA timezone name such as `Europe/Berlin` or `UTC`.
pub fn parse_timezone(raw: &str) -> Result<Tz, String> {
    raw.trim()
        .parse::<Tz>()
        .map_err(|error| format!("invalid timezone '{}': {error}", raw.trim()))
}

/// Calendar date of `instant` as observed in `tz`.
pub fn local_date(tz: Tz, instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// First instant of `date` in `tz`, expressed in UTC.
///
/// When local midnight does not exist (a DST gap at 00:00) the first valid
/// local time after it is used.
pub fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    for offset_minutes in (0..=180).step_by(30) {
        let candidate = midnight + Duration::minutes(offset_minutes);
        if let Some(resolved) = tz.from_local_datetime(&candidate).earliest() {
            return resolved.with_timezone(&Utc);
        }
    }
    Utc.from_utc_datetime(&midnight)
}

/// Half-open `[start, end)` UTC range covering the local calendar day that
/// contains `now`.
pub fn local_day_bounds(tz: Tz, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = local_date(tz, now);
    let tomorrow = today.succ_opt().unwrap_or(today);
    (local_midnight(tz, today), local_midnight(tz, tomorrow))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_local_date_uses_timezone_not_utc() {
        let tz = parse_timezone("America/New_York").expect("tz");
        let instant = Utc.with_ymd_and_hms(2024, 3, 5, 2, 30, 0).unwrap();
        assert_eq!(
            local_date(tz, instant),
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
        );
    }

    #[test]
    fn unit_local_day_bounds_cover_calendar_day() {
        let tz = parse_timezone("Europe/Berlin").expect("tz");
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        let (start, end) = local_day_bounds(tz, now);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 6, 9, 22, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 6, 10, 22, 0, 0).unwrap());
    }

    #[test]
    fn regression_local_day_bounds_handle_dst_transition_day() {
        let tz = parse_timezone("Europe/Berlin").expect("tz");
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        let (start, end) = local_day_bounds(tz, now);
        assert_eq!(end - start, Duration::hours(23));
    }

    #[test]
    fn unit_parse_timezone_rejects_unknown_names() {
        assert!(parse_timezone("Mars/Olympus").is_err());
        assert_eq!(parse_timezone(" UTC ").expect("utc"), Tz::UTC);
    }
}
