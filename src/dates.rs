//! Report date periods — generic, schema-agnostic date-range arithmetic
//! feeding the query engine's convenience `period` parameter (SPEC_FULL §4.9).

use chrono::{Datelike, Duration, NaiveDate};

pub type DateRange = (NaiveDate, NaiveDate);
pub type Comparison = (DateRange, DateRange);

pub struct ReportDates {
    today: NaiveDate,
}

impl ReportDates {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    fn month_end(year: i32, month: u32) -> NaiveDate {
        let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
        NaiveDate::from_ymd_opt(next_year, next_month, 1).unwrap() - Duration::days(1)
    }

    fn quarter_start(d: NaiveDate) -> NaiveDate {
        let q_month = ((d.month0() / 3) * 3) + 1;
        NaiveDate::from_ymd_opt(d.year(), q_month, 1).unwrap()
    }

    fn prev_month_start(d: NaiveDate) -> NaiveDate {
        if d.month() == 1 {
            NaiveDate::from_ymd_opt(d.year() - 1, 12, 1).unwrap()
        } else {
            NaiveDate::from_ymd_opt(d.year(), d.month() - 1, 1).unwrap()
        }
    }

    fn same_day_or_month_end(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap_or_else(|| Self::month_end(year, month))
    }

    pub fn daily(&self) -> DateRange {
        (self.today, self.today)
    }

    pub fn yesterday(&self) -> DateRange {
        let y = self.today - Duration::days(1);
        (y, y)
    }

    pub fn wtd(&self) -> DateRange {
        let monday = self.today - Duration::days(self.today.weekday().num_days_from_monday() as i64);
        (monday, self.today)
    }

    pub fn mtd(&self) -> DateRange {
        (NaiveDate::from_ymd_opt(self.today.year(), self.today.month(), 1).unwrap(), self.today)
    }

    pub fn full_month(&self) -> DateRange {
        let start = NaiveDate::from_ymd_opt(self.today.year(), self.today.month(), 1).unwrap();
        (start, Self::month_end(self.today.year(), self.today.month()))
    }

    pub fn qtd(&self) -> DateRange {
        (Self::quarter_start(self.today), self.today)
    }

    pub fn ytd(&self) -> DateRange {
        (NaiveDate::from_ymd_opt(self.today.year(), 1, 1).unwrap(), self.today)
    }

    pub fn dod(&self) -> Comparison {
        (self.daily(), self.yesterday())
    }

    pub fn wow(&self) -> Comparison {
        let current = self.wtd();
        let monday = self.today - Duration::days(self.today.weekday().num_days_from_monday() as i64);
        let prev_monday = monday - Duration::days(7);
        let prev_end = prev_monday + (self.today - monday);
        (current, (prev_monday, prev_end))
    }

    pub fn mom(&self) -> Comparison {
        let current = self.full_month();
        let prev_start = Self::prev_month_start(self.today);
        let prev_end = Self::month_end(prev_start.year(), prev_start.month());
        (current, (prev_start, prev_end))
    }

    pub fn cmtd_vs_pmtd(&self) -> Comparison {
        let current = self.mtd();
        let prev_start = Self::prev_month_start(self.today);
        let prev_month_end = Self::month_end(prev_start.year(), prev_start.month());
        let prev_day = self.today.day().min(prev_month_end.day());
        let prev_end = NaiveDate::from_ymd_opt(prev_start.year(), prev_start.month(), prev_day).unwrap();
        (current, (prev_start, prev_end))
    }

    pub fn mtd_cy_vs_py(&self) -> Comparison {
        let current = self.mtd();
        let prev_start = NaiveDate::from_ymd_opt(self.today.year() - 1, self.today.month(), 1).unwrap();
        let prev_day = self.today.day().min(Self::month_end(prev_start.year(), prev_start.month()).day());
        let prev_end = NaiveDate::from_ymd_opt(prev_start.year(), self.today.month(), prev_day).unwrap();
        (current, (prev_start, prev_end))
    }

    pub fn ytd_cy_vs_py(&self) -> Comparison {
        let current = self.ytd();
        let prev_start = NaiveDate::from_ymd_opt(self.today.year() - 1, 1, 1).unwrap();
        let prev_end = Self::same_day_or_month_end(self.today.year() - 1, self.today.month(), self.today.day());
        (current, (prev_start, prev_end))
    }

    pub fn qtd_cq_vs_pq(&self) -> Comparison {
        let current_q_start = Self::quarter_start(self.today);
        let current = self.qtd();
        let offset_days = (self.today - current_q_start).num_days();
        let prev_q_start = if current_q_start.month() == 1 {
            NaiveDate::from_ymd_opt(self.today.year() - 1, 10, 1).unwrap()
        } else {
            NaiveDate::from_ymd_opt(self.today.year(), current_q_start.month() - 3, 1).unwrap()
        };
        let prev_end = prev_q_start + Duration::days(offset_days);
        (current, (prev_q_start, prev_end))
    }

    pub fn qtd_cq_vs_pq_py(&self) -> Comparison {
        let current = self.qtd();
        let current_q_start = Self::quarter_start(self.today);
        let prev_q_start = NaiveDate::from_ymd_opt(self.today.year() - 1, current_q_start.month(), 1).unwrap();
        let prev_end = Self::same_day_or_month_end(self.today.year() - 1, self.today.month(), self.today.day());
        (current, (prev_q_start, prev_end))
    }
}

/// Resolve a named single-range period (the query engine's `period`
/// convenience parameter) against `today`. Comparison periods like `mom` or
/// `wow` produce two ranges and have no single-filter reading, so they are
/// not resolvable here — they're for callers building their own comparisons.
pub fn resolve_period(name: &str, today: NaiveDate) -> Option<DateRange> {
    let rd = ReportDates::new(today);
    Some(match name {
        "daily" | "today" => rd.daily(),
        "yesterday" => rd.yesterday(),
        "wtd" => rd.wtd(),
        "mtd" => rd.mtd(),
        "full_month" => rd.full_month(),
        "qtd" => rd.qtd(),
        "ytd" => rd.ytd(),
        _ => return None,
    })
}

/// Build an OData filter expression for a date range (§4.9, §8 invariant).
pub fn build_period_filter(date_field: &str, start: NaiveDate, end: NaiveDate) -> String {
    if start == end {
        format!("{date_field} eq {start}")
    } else {
        format!("{date_field} ge {start} and {date_field} le {end}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn rd() -> ReportDates {
        ReportDates::new(d("2026-02-20")) // a Friday
    }

    #[test]
    fn daily_is_today_today() {
        assert_eq!(rd().daily(), (d("2026-02-20"), d("2026-02-20")));
    }

    #[test]
    fn wtd_starts_monday() {
        assert_eq!(rd().wtd(), (d("2026-02-16"), d("2026-02-20")));
    }

    #[test]
    fn mtd_starts_first_of_month() {
        assert_eq!(rd().mtd(), (d("2026-02-01"), d("2026-02-20")));
    }

    #[test]
    fn full_month_covers_whole_month() {
        assert_eq!(rd().full_month(), (d("2026-02-01"), d("2026-02-28")));
    }

    #[test]
    fn qtd_starts_at_quarter_boundary() {
        assert_eq!(rd().qtd(), (d("2026-01-01"), d("2026-02-20")));
    }

    #[test]
    fn ytd_starts_jan_1() {
        assert_eq!(rd().ytd(), (d("2026-01-01"), d("2026-02-20")));
    }

    #[test]
    fn mom_compares_full_months() {
        let (current, prev) = rd().mom();
        assert_eq!(current, (d("2026-02-01"), d("2026-02-28")));
        assert_eq!(prev, (d("2026-01-01"), d("2026-01-31")));
    }

    #[test]
    fn ytd_cy_vs_py_handles_leap_day_gracefully() {
        let leap_today = ReportDates::new(d("2024-02-29"));
        let (_, prev) = leap_today.ytd_cy_vs_py();
        // 2023-02-29 doesn't exist; falls back to month end.
        assert_eq!(prev.1, d("2023-02-28"));
    }

    #[test]
    fn build_period_filter_single_day_uses_eq() {
        assert_eq!(build_period_filter("ServiceDate", d("2026-02-20"), d("2026-02-20")), "ServiceDate eq 2026-02-20");
    }

    #[test]
    fn build_period_filter_range_uses_ge_le() {
        assert_eq!(
            build_period_filter("ServiceDate", d("2026-02-16"), d("2026-02-20")),
            "ServiceDate ge 2026-02-16 and ServiceDate le 2026-02-20"
        );
    }

    #[test]
    fn resolve_period_matches_named_range() {
        assert_eq!(resolve_period("wtd", d("2026-02-20")), Some((d("2026-02-16"), d("2026-02-20"))));
        assert_eq!(resolve_period("mtd", d("2026-02-20")), Some((d("2026-02-01"), d("2026-02-20"))));
    }

    #[test]
    fn resolve_period_rejects_comparison_names() {
        assert_eq!(resolve_period("mom", d("2026-02-20")), None);
        assert_eq!(resolve_period("bogus", d("2026-02-20")), None);
    }
}
