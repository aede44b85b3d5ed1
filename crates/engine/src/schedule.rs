//! Monthly date generation for recurring series.

use chrono::{Datelike, NaiveDate};

use crate::Period;

/// Months generated ahead for a recurring series.
pub const SERIES_HORIZON_MONTHS: u32 = 12;

/// One date per month for `count` months starting at `first`.
///
/// The day of month is clamped once, to the length of the shortest month in
/// the range, and used for every date: a 31st series spanning February lands
/// on the 28th (or 29th) every month.
pub fn monthly_dates(day: u32, first: Period, count: u32) -> Vec<NaiveDate> {
    let shortest = (0..count)
        .map(|offset| first.add_months(offset).days())
        .min()
        .unwrap_or(28);
    let day = day.clamp(1, shortest);
    (0..count)
        .filter_map(|offset| first.add_months(offset).day(day))
        .collect()
}

/// Dates of a fresh series starting at `start`.
pub fn series_dates(start: NaiveDate) -> Vec<NaiveDate> {
    monthly_dates(
        start.day(),
        Period::from_date(start),
        SERIES_HORIZON_MONTHS,
    )
}

/// Day of month a series started at `start` runs on.
pub fn series_day(start: NaiveDate) -> u32 {
    series_dates(start)
        .first()
        .map_or(start.day(), |first| first.day())
}

/// Dates missing after `last` to keep the series `SERIES_HORIZON_MONTHS`
/// ahead of `today`.
pub fn extension_dates(anchor_day: u32, last: NaiveDate, today: NaiveDate) -> Vec<NaiveDate> {
    let next = Period::from_date(last).succ();
    let end = Period::from_date(today).add_months(SERIES_HORIZON_MONTHS - 1);
    let count = next.months_until(end) + 1;
    if count <= 0 {
        return Vec::new();
    }
    monthly_dates(anchor_day, next, count as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn twelve_monthly_dates() {
        let dates = series_dates(date(2026, 3, 5));
        assert_eq!(dates.len(), 12);
        assert_eq!(dates[0], date(2026, 3, 5));
        assert_eq!(dates[11], date(2027, 2, 5));
    }

    #[test]
    fn day_clamped_to_shortest_month() {
        let dates = series_dates(date(2026, 1, 31));
        assert!(dates.iter().all(|d| d.day() == 28));
        assert_eq!(dates[1], date(2026, 2, 28));
    }

    #[test]
    fn short_range_without_february_keeps_thirtieth() {
        let dates = monthly_dates(31, Period::new(2026, 4).unwrap(), 3);
        assert_eq!(dates, vec![date(2026, 4, 30), date(2026, 5, 30), date(2026, 6, 30)]);
    }

    #[test]
    fn extension_fills_up_to_horizon() {
        let dates = extension_dates(10, date(2026, 6, 10), date(2026, 3, 1));
        // horizon ends 2027-02
        assert_eq!(dates.len(), 8);
        assert_eq!(dates[0], date(2026, 7, 10));
        assert_eq!(dates[7], date(2027, 2, 10));
    }

    #[test]
    fn extension_keeps_clamped_day() {
        let dates = series_dates(date(2026, 1, 31));
        let last = *dates.last().unwrap();
        let day = series_day(date(2026, 1, 31));
        assert_eq!(day, 28);
        assert_eq!(extension_dates(day, last, date(2026, 2, 1)), vec![date(2027, 1, 28)]);
    }

    #[test]
    fn extension_of_full_series_is_empty() {
        assert!(extension_dates(10, date(2027, 2, 10), date(2026, 3, 1)).is_empty());
    }
}
