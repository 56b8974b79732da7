//! Table cache: per-table frames keyed by PK, tracked by date-range bounds
//! (§4.5). Pure gap computation and merge logic, no I/O.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;

pub const DEFAULT_ROW_CAP: usize = 50_000;

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Text(String),
    Number(f64),
    Boolean(bool),
    Date(NaiveDate),
}

impl CellValue {
    pub fn as_display(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 { format!("{}", *n as i64) } else { n.to_string() }
            }
            CellValue::Boolean(b) => b.to_string(),
            CellValue::Date(d) => d.to_string(),
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            CellValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// A row is an ordered field list so `$select` projection can preserve
/// caller-requested column order (§4.6).
pub type Record = Vec<(String, CellValue)>;

pub fn record_get<'a>(record: &'a Record, field: &str) -> Option<&'a CellValue> {
    record.iter().find(|(k, _)| k == field).map(|(_, v)| v)
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub rows: Vec<Record>,
    pub date_field: Option<String>,
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
    pub pk_field: String,
    pub last_refresh: DateTime<Utc>,
    pub row_cap: usize,
}

impl CacheEntry {
    pub fn new(pk_field: impl Into<String>, date_field: Option<String>) -> Self {
        Self {
            rows: Vec::new(),
            date_field,
            min_date: None,
            max_date: None,
            pk_field: pk_field.into(),
            last_refresh: Utc::now(),
            row_cap: DEFAULT_ROW_CAP,
        }
    }

    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.min_date, self.max_date) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        }
    }

    /// Merge new rows into the cache entry: dedup by PK keeping the newest
    /// occurrence, enforce the row cap, union the date bounds (§4.5).
    pub fn merge(&mut self, new_rows: Vec<Record>) {
        let mut order: Vec<String> = Vec::new();
        let mut by_key: HashMap<String, Record> = HashMap::new();

        for row in self.rows.drain(..).chain(new_rows.into_iter()) {
            let key = record_get(&row, &self.pk_field).map(CellValue::as_display).unwrap_or_default();
            if !by_key.contains_key(&key) {
                order.push(key.clone());
            }
            by_key.insert(key, row);
        }

        let mut merged: Vec<Record> = order.into_iter().filter_map(|k| by_key.remove(&k)).collect();

        if merged.len() > self.row_cap {
            if let Some(date_field) = self.date_field.clone() {
                merged.sort_by(|a, b| {
                    let da = record_get(a, &date_field).and_then(CellValue::as_date);
                    let db = record_get(b, &date_field).and_then(CellValue::as_date);
                    db.cmp(&da)
                });
                merged.truncate(self.row_cap);
            } else {
                let start = merged.len() - self.row_cap;
                merged = merged.split_off(start);
            }
        }

        if let Some(date_field) = &self.date_field {
            for row in &merged {
                if let Some(d) = record_get(row, date_field).and_then(CellValue::as_date) {
                    self.min_date = Some(self.min_date.map_or(d, |m| m.min(d)));
                    self.max_date = Some(self.max_date.map_or(d, |m| m.max(d)));
                }
            }
        }

        self.rows = merged;
        self.last_refresh = Utc::now();
    }
}

#[derive(Debug, Default)]
pub struct TableCache {
    entries: DashMap<String, CacheEntry>,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, table: &str) -> Option<CacheEntry> {
        self.entries.get(table).map(|e| e.clone())
    }

    pub fn entry_or_insert(&self, table: &str, pk_field: &str, date_field: Option<String>) -> CacheEntry {
        self.entries
            .entry(table.to_string())
            .or_insert_with(|| CacheEntry::new(pk_field, date_field))
            .clone()
    }

    pub fn merge_into(&self, table: &str, pk_field: &str, date_field: Option<String>, rows: Vec<Record>) {
        self.merge_into_with_cap(table, pk_field, date_field, rows, DEFAULT_ROW_CAP);
    }

    /// Same as [`merge_into`](Self::merge_into) but lets the caller apply a
    /// configured row cap when the table is first cached.
    pub fn merge_into_with_cap(&self, table: &str, pk_field: &str, date_field: Option<String>, rows: Vec<Record>, row_cap: usize) {
        let mut entry = self.entries.entry(table.to_string()).or_insert_with(|| {
            let mut e = CacheEntry::new(pk_field, date_field);
            e.row_cap = row_cap;
            e
        });
        entry.merge(rows);
    }

    pub fn flush(&self, table: &str) {
        self.entries.remove(table);
    }

    pub fn flush_all(&self) {
        self.entries.clear();
    }
}

/// Compute the minimal set of gaps that, fetched and merged, make the cache
/// cover the union of the existing and requested ranges (§4.5).
pub fn compute_date_gaps(
    existing: Option<(NaiveDate, NaiveDate)>,
    requested_min: Option<NaiveDate>,
    requested_max: Option<NaiveDate>,
) -> Vec<(Option<NaiveDate>, Option<NaiveDate>)> {
    let Some((e_min, e_max)) = existing else {
        return vec![(requested_min, requested_max)];
    };

    let mut gaps = Vec::new();

    match requested_min {
        Some(r_min) if r_min < e_min => gaps.push((Some(r_min), Some(e_min - chrono::Duration::days(1)))),
        None => gaps.push((None, Some(e_min - chrono::Duration::days(1)))),
        _ => {}
    }

    match requested_max {
        Some(r_max) if r_max > e_max => gaps.push((Some(e_max + chrono::Duration::days(1)), Some(r_max))),
        None => gaps.push((Some(e_max + chrono::Duration::days(1)), None)),
        _ => {}
    }

    gaps
}

/// Add the today-refresh gap when the requested range touches today and a
/// cache already exists, deduplicating against gaps already present (§4.5).
pub fn apply_today_refresh(
    mut gaps: Vec<(Option<NaiveDate>, Option<NaiveDate>)>,
    existing: Option<(NaiveDate, NaiveDate)>,
    requested_max: Option<NaiveDate>,
    today: NaiveDate,
) -> Vec<(Option<NaiveDate>, Option<NaiveDate>)> {
    let touches_today = requested_max.is_none_or(|m| m >= today);
    if touches_today && existing.is_some() {
        let today_gap = (Some(today), Some(today));
        if !gaps.contains(&today_gap) {
            gaps.push(today_gap);
        }
    }
    gaps
}
