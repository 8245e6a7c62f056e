//! Date and timestamp helpers

use chrono::{DateTime, Datelike, Local, NaiveDate, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Today's date on the server's local calendar
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// First and last day of the calendar month containing `date`
pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = date.with_day(1).unwrap_or(date);
    let next_month_first = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    let last = next_month_first
        .and_then(|d| d.pred_opt())
        .unwrap_or(first);
    (first, last)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_now_returns_recent_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after 2000, before 2100)
        assert!(timestamp.timestamp() > 946_684_800);
        assert!(timestamp.timestamp() < 4_102_444_800);
    }

    #[test]
    fn test_month_bounds_mid_month() {
        assert_eq!(month_bounds(ymd(2024, 3, 17)), (ymd(2024, 3, 1), ymd(2024, 3, 31)));
    }

    #[test]
    fn test_month_bounds_december_rolls_year() {
        assert_eq!(month_bounds(ymd(2023, 12, 5)), (ymd(2023, 12, 1), ymd(2023, 12, 31)));
    }

    #[test]
    fn test_month_bounds_leap_february() {
        assert_eq!(month_bounds(ymd(2024, 2, 29)), (ymd(2024, 2, 1), ymd(2024, 2, 29)));
        assert_eq!(month_bounds(ymd(2023, 2, 1)), (ymd(2023, 2, 1), ymd(2023, 2, 28)));
    }
}
