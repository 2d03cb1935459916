use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};

#[must_use]
pub fn second_friday(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, Weekday::Fri, 2)
}

#[must_use]
pub fn is_second_friday(date: NaiveDate) -> bool {
    second_friday(date.year(), date.month()) == Some(date)
}

/// The first second Friday on or after `date`.
#[must_use]
pub fn next_second_friday(date: NaiveDate) -> Option<NaiveDate> {
    let this_month = second_friday(date.year(), date.month())?;
    if this_month >= date {
        return Some(this_month);
    }
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    second_friday(year, month)
}

/// Fires once on the second Friday of each month, at or after `hour`.
#[derive(Debug, Clone)]
pub struct MonthlyTrigger {
    hour: u32,
    last_run: Option<NaiveDate>,
}

impl MonthlyTrigger {
    #[must_use]
    pub const fn new(hour: u32) -> Self {
        Self {
            hour,
            last_run: None,
        }
    }

    /// Whether the export should run now; a `true` answer is remembered for the day.
    pub fn due(&mut self, now: NaiveDateTime) -> bool {
        let today = now.date();
        if self.last_run == Some(today) || !is_second_friday(today) || now.hour() < self.hour {
            return false;
        }
        self.last_run = Some(today);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn finds_second_fridays() {
        assert_eq!(second_friday(2025, 7), Some(date(2025, 7, 11)));
        assert_eq!(second_friday(2026, 10), Some(date(2026, 10, 9)));
        // month starting on a Friday
        assert_eq!(second_friday(2024, 3), Some(date(2024, 3, 8)));
    }

    #[test]
    fn other_fridays_do_not_count() {
        assert!(is_second_friday(date(2025, 7, 11)));
        assert!(!is_second_friday(date(2025, 7, 4)));
        assert!(!is_second_friday(date(2025, 7, 18)));
        assert!(!is_second_friday(date(2025, 7, 10)));
    }

    #[test]
    fn next_run_date() {
        assert_eq!(next_second_friday(date(2026, 10, 9)), Some(date(2026, 10, 9)));
        assert_eq!(next_second_friday(date(2026, 10, 16)), Some(date(2026, 11, 13)));
        assert_eq!(next_second_friday(date(2025, 12, 20)), Some(date(2026, 1, 9)));
    }

    #[test]
    fn trigger_fires_once_after_the_hour() {
        let mut trigger = MonthlyTrigger::new(2);
        let day = date(2026, 10, 9);
        assert!(!trigger.due(day.and_hms_opt(1, 0, 0).unwrap()));
        assert!(trigger.due(day.and_hms_opt(2, 30, 0).unwrap()));
        assert!(!trigger.due(day.and_hms_opt(3, 30, 0).unwrap()));
        assert!(!trigger.due(date(2026, 10, 16).and_hms_opt(3, 0, 0).unwrap()));
        assert!(trigger.due(date(2026, 11, 13).and_hms_opt(2, 0, 0).unwrap()));
    }
}
