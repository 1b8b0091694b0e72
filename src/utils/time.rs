use chrono::{DateTime, Local, NaiveDate, TimeZone};

const DAY_FORMAT: &str = "%Y-%m-%d";

/// This is the standard way of converting a date to a string in keytally.
pub fn format_day(date: NaiveDate) -> String {
    date.format(DAY_FORMAT).to_string()
}

/// Parses a canonical `YYYY-MM-DD` day. Non padded forms like `2024-3-1` are rejected so that
/// every calendar day has exactly one spelling.
pub fn parse_day(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, DAY_FORMAT)
        .ok()
        .filter(|date| format_day(*date) == value)
}

/// Suffix used when moving a damaged file aside, e.g. `20240704-101530.125`.
pub fn quarantine_stamp<Tz: TimeZone>(moment: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    moment.format("%Y%m%d-%H%M%S%.3f").to_string()
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{format_day, parse_day};

    #[test]
    fn test_parse_day_canonical() {
        let date = NaiveDate::from_ymd_opt(2018, 7, 4).unwrap();
        assert_eq!(format_day(date), "2018-07-04");
        assert_eq!(parse_day("2018-07-04"), Some(date));
    }

    #[test]
    fn test_parse_day_rejects_other_spellings() {
        assert_eq!(parse_day("2018-7-4"), None);
        assert_eq!(parse_day("04/07/2018"), None);
        assert_eq!(parse_day("2018-02-30"), None);
        assert_eq!(parse_day(""), None);
    }
}
