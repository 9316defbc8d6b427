use chrono::{Datelike, NaiveDate, Weekday};

/// Years accepted for report generation. Rejecting out-of-range input here
/// keeps bad dates out of every downstream query and formula.
pub const YEAR_MIN: i32 = 2000;
pub const YEAR_MAX: i32 = 2100;

pub fn validate_year_month(year: i32, month: u32) -> Result<(), String> {
    if !(YEAR_MIN..=YEAR_MAX).contains(&year) {
        return Err(format!("year must be between {} and {}", YEAR_MIN, YEAR_MAX));
    }
    if !(1..=12).contains(&month) {
        return Err("month must be between 1 and 12".to_string());
    }
    Ok(())
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    match next {
        Some(d) => d.pred_opt().map(|p| p.day()).unwrap_or(30),
        None => 30,
    }
}

/// Ordered day-of-month numbers whose weekday is Monday through Friday.
/// Every weekday is a school day; there is no holiday calendar.
pub fn school_days(year: i32, month: u32) -> Vec<u32> {
    let mut days = Vec::new();
    for day in 1..=days_in_month(year, month) {
        let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
            continue;
        };
        if is_school_day(date) {
            days.push(day);
        }
    }
    days
}

pub fn is_school_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Header abbreviation for the weekday row of the SF2 day columns.
pub fn weekday_abbrev(year: i32, month: u32, day: u32) -> &'static str {
    match NaiveDate::from_ymd_opt(year, month, day).map(|d| d.weekday()) {
        Some(Weekday::Mon) => "M",
        Some(Weekday::Tue) => "T",
        Some(Weekday::Wed) => "W",
        Some(Weekday::Thu) => "TH",
        Some(Weekday::Fri) => "F",
        Some(Weekday::Sat) => "S",
        Some(Weekday::Sun) => "SU",
        None => "",
    }
}

pub fn month_name(month: u32) -> &'static str {
    match month {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        12 => "December",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn january_2024_has_23_school_days() {
        let days = school_days(2024, 1);
        assert_eq!(days.len(), 23);
        // Jan 1 2024 is a Monday; the first weekend is the 6th/7th.
        assert_eq!(&days[..5], &[1, 2, 3, 4, 5]);
        assert!(!days.contains(&6));
        assert!(!days.contains(&7));
    }

    #[test]
    fn march_2024_has_21_school_days() {
        assert_eq!(school_days(2024, 3).len(), 21);
    }

    #[test]
    fn sequence_is_strictly_ascending_without_duplicates() {
        for (year, month) in [(2024, 2), (2023, 2), (2024, 12), (2025, 6)] {
            let days = school_days(year, month);
            assert!(
                days.windows(2).all(|w| w[0] < w[1]),
                "{}-{} not ascending",
                year,
                month
            );
            assert!(*days.last().unwrap() <= days_in_month(year, month));
        }
    }

    #[test]
    fn days_in_month_handles_short_and_leap_months() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(2100, 2), 28);
        assert_eq!(days_in_month(2024, 4), 30);
        assert_eq!(days_in_month(2024, 12), 31);
    }

    #[test]
    fn weekday_abbrevs_match_known_dates() {
        // March 2024: the 1st is a Friday, the 4th a Monday.
        assert_eq!(weekday_abbrev(2024, 3, 1), "F");
        assert_eq!(weekday_abbrev(2024, 3, 4), "M");
        assert_eq!(weekday_abbrev(2024, 3, 7), "TH");
    }

    #[test]
    fn validate_rejects_out_of_range_input() {
        assert!(validate_year_month(2024, 0).is_err());
        assert!(validate_year_month(2024, 13).is_err());
        assert!(validate_year_month(1999, 6).is_err());
        assert!(validate_year_month(2101, 6).is_err());
        assert!(validate_year_month(2024, 6).is_ok());
    }
}
