use crate::domain::errors::ParseError;
use chrono::{DateTime, Datelike, Days, Duration, Months, NaiveDate, Utc};

/// Resolve a duration token against the window start.
///
/// Grammar: `<N>h|d|w|m` (hours, days, weeks, calendar months) or an
/// end-of-period token: `eod`/`eom`/`eoy` resolve to the start of the next
/// day/month/year after `from`, `eond`/`eonm`/`eony` one period further.
pub fn parse_duration(token: &str, from: DateTime<Utc>) -> Result<DateTime<Utc>, ParseError> {
    let invalid = || ParseError::InvalidDuration {
        duration: token.to_string(),
    };
    let lowered = token.trim().to_lowercase();

    match lowered.as_str() {
        "eod" => return end_of_days(from, 1).ok_or_else(invalid),
        "eond" => return end_of_days(from, 2).ok_or_else(invalid),
        "eom" => return end_of_months(from, 1).ok_or_else(invalid),
        "eonm" => return end_of_months(from, 2).ok_or_else(invalid),
        "eoy" => return end_of_years(from, 1).ok_or_else(invalid),
        "eony" => return end_of_years(from, 2).ok_or_else(invalid),
        _ => {}
    }

    // Split on a char boundary; the unit is not guaranteed to be ASCII.
    let mut chars = lowered.chars();
    let unit = chars.next_back().ok_or_else(invalid)?;
    let count: u32 = chars.as_str().parse().map_err(|_| invalid())?;
    if count == 0 {
        return Err(invalid());
    }
    match unit {
        'h' => Ok(from + Duration::hours(count as i64)),
        'd' => from.checked_add_days(Days::new(count as u64)).ok_or_else(invalid),
        'w' => from
            .checked_add_days(Days::new(count as u64 * 7))
            .ok_or_else(invalid),
        'm' => from.checked_add_months(Months::new(count)).ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

fn end_of_days(from: DateTime<Utc>, days: u64) -> Option<DateTime<Utc>> {
    let date = from.date_naive().checked_add_days(Days::new(days))?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

fn end_of_months(from: DateTime<Utc>, months: u32) -> Option<DateTime<Utc>> {
    let first = NaiveDate::from_ymd_opt(from.year(), from.month(), 1)?;
    let date = first.checked_add_months(Months::new(months))?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

fn end_of_years(from: DateTime<Utc>, years: i32) -> Option<DateTime<Utc>> {
    let date = NaiveDate::from_ymd_opt(from.year() + years, 1, 1)?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_eoy_one_second_before_year_end() {
        // A one-second window is still a valid window.
        let to = parse_duration("eoy", at("2020-12-31T23:59:59Z")).unwrap();
        assert_eq!(to, at("2021-01-01T00:00:00Z"));
    }

    #[test]
    fn test_end_of_period_tokens() {
        let from = at("2021-02-03T10:30:00Z");
        assert_eq!(parse_duration("eod", from).unwrap(), at("2021-02-04T00:00:00Z"));
        assert_eq!(parse_duration("eond", from).unwrap(), at("2021-02-05T00:00:00Z"));
        assert_eq!(parse_duration("eom", from).unwrap(), at("2021-03-01T00:00:00Z"));
        assert_eq!(parse_duration("eonm", from).unwrap(), at("2021-04-01T00:00:00Z"));
        assert_eq!(parse_duration("eoy", from).unwrap(), at("2022-01-01T00:00:00Z"));
        assert_eq!(parse_duration("eony", from).unwrap(), at("2023-01-01T00:00:00Z"));
    }

    #[test]
    fn test_counted_units() {
        let from = at("2021-01-31T12:00:00Z");
        assert_eq!(parse_duration("2h", from).unwrap(), at("2021-01-31T14:00:00Z"));
        assert_eq!(parse_duration("3d", from).unwrap(), at("2021-02-03T12:00:00Z"));
        assert_eq!(parse_duration("2w", from).unwrap(), at("2021-02-14T12:00:00Z"));
        // Calendar months clamp to the last valid day.
        assert_eq!(parse_duration("1m", from).unwrap(), at("2021-02-28T12:00:00Z"));
        assert_eq!(parse_duration("3m", from).unwrap(), at("2021-04-30T12:00:00Z"));
    }

    #[test]
    fn test_invalid_tokens_rejected() {
        let from = at("2021-01-01T00:00:00Z");
        for bad in ["", "m", "10", "5x", "0d", "-3d", "eoq", "3µ", "µ"] {
            assert!(parse_duration(bad, from).is_err(), "{:?} should fail", bad);
        }
    }
}
