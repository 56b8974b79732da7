//! Date-bound extraction from an OData filter, scoped to one field (§4.6).
//!
//! `eq X` is treated as both the lower and upper bound. The extractor is
//! deliberately scoped to a single, caller-named field — per §9's flagged
//! hazard, applying it to a field whose values merely resemble dates would
//! be unsound, so callers must always pass the table's actual date field.

use chrono::NaiveDate;
use regex::Regex;

fn clause_regex(field: &str, op: &str) -> Regex {
    let escaped = regex::escape(field);
    Regex::new(&format!(r#"(?:^|\s)"?{escaped}"?\s+{op}\s+(\d{{4}}-\d{{2}}-\d{{2}})"#)).unwrap()
}

/// Extract the lower and upper date bounds for `field` from a normalized,
/// quoted or unquoted filter expression.
pub fn extract_date_range(filter: &str, field: &str) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let mut lower = None;
    let mut upper = None;

    if let Some(caps) = clause_regex(field, "eq").captures(filter) {
        let d = parse_date(&caps[1]);
        return (d, d);
    }
    if let Some(caps) = clause_regex(field, "ge").captures(filter) {
        lower = parse_date(&caps[1]);
    }
    if let Some(caps) = clause_regex(field, "gt").captures(filter) {
        lower = lower.or_else(|| parse_date(&caps[1]));
    }
    if let Some(caps) = clause_regex(field, "le").captures(filter) {
        upper = parse_date(&caps[1]);
    }
    if let Some(caps) = clause_regex(field, "lt").captures(filter) {
        upper = upper.or_else(|| parse_date(&caps[1]));
    }

    (lower, upper)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::build_period_filter;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn eq_is_both_lower_and_upper() {
        let (lo, hi) = extract_date_range("ServiceDate eq 2026-02-14", "ServiceDate");
        assert_eq!(lo, Some(d("2026-02-14")));
        assert_eq!(hi, Some(d("2026-02-14")));
    }

    #[test]
    fn ge_and_le_are_distinct_bounds() {
        let (lo, hi) = extract_date_range("ServiceDate ge 2026-02-16 and ServiceDate le 2026-02-20", "ServiceDate");
        assert_eq!(lo, Some(d("2026-02-16")));
        assert_eq!(hi, Some(d("2026-02-20")));
    }

    #[test]
    fn round_trips_through_build_period_filter() {
        let a = d("2026-02-16");
        let b = d("2026-02-20");
        let filter = build_period_filter("ServiceDate", a, b);
        assert_eq!(extract_date_range(&filter, "ServiceDate"), (Some(a), Some(b)));
    }

    #[test]
    fn scenario_1_weekly_report() {
        let filter = build_period_filter("ServiceDate", d("2026-02-16"), d("2026-02-20"));
        assert_eq!(filter, "ServiceDate ge 2026-02-16 and ServiceDate le 2026-02-20");
        assert_eq!(extract_date_range(&filter, "ServiceDate"), (Some(d("2026-02-16")), Some(d("2026-02-20"))));
    }

    #[test]
    fn unrelated_field_does_not_match() {
        let (lo, hi) = extract_date_range("OtherDate eq 2026-02-14", "ServiceDate");
        assert_eq!((lo, hi), (None, None));
    }
}
