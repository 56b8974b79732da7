//! Analytics engine: named datasets plus groupby/aggregate/pivot/time-series
//! over cached or loaded record sets (§4.7).

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use dashmap::DashMap;

use crate::cache::{record_get, CellValue, Record};
use crate::error::BridgeError;
use crate::schema_store::SchemaStore;
use crate::types::{ContextKey, ContextType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Sum,
    Count,
    Mean,
    Min,
    Max,
    Median,
    Nunique,
    Std,
}

impl AggregateFn {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "sum" => AggregateFn::Sum,
            "count" => AggregateFn::Count,
            "mean" => AggregateFn::Mean,
            "min" => AggregateFn::Min,
            "max" => AggregateFn::Max,
            "median" => AggregateFn::Median,
            "nunique" => AggregateFn::Nunique,
            "std" => AggregateFn::Std,
            _ => return None,
        })
    }

    fn label(&self) -> &'static str {
        match self {
            AggregateFn::Sum => "sum",
            AggregateFn::Count => "count",
            AggregateFn::Mean => "mean",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
            AggregateFn::Median => "median",
            AggregateFn::Nunique => "nunique",
            AggregateFn::Std => "std",
        }
    }
}

/// Parse a comma-separated `func:field` aggregate spec (§4.7).
pub fn parse_aggregates(spec: &str) -> Vec<(AggregateFn, String)> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|clause| {
            let (func, field) = clause.split_once(':')?;
            Some((AggregateFn::parse(func.trim())?, field.trim().to_string()))
        })
        .collect()
}

fn numeric_values(rows: &[Record], field: &str) -> Vec<f64> {
    rows.iter().filter_map(|r| record_get(r, field)).filter_map(CellValue::as_f64).collect()
}

fn display_values(rows: &[Record], field: &str) -> Vec<String> {
    rows.iter().filter_map(|r| record_get(r, field)).map(CellValue::as_display).collect()
}

fn compute(func: AggregateFn, rows: &[Record], field: &str) -> f64 {
    match func {
        AggregateFn::Count => rows.iter().filter(|r| record_get(r, field).is_some()).count() as f64,
        AggregateFn::Nunique => {
            let mut vals = display_values(rows, field);
            vals.sort();
            vals.dedup();
            vals.len() as f64
        }
        _ => {
            let vals = numeric_values(rows, field);
            if vals.is_empty() {
                return 0.0;
            }
            match func {
                AggregateFn::Sum => vals.iter().sum(),
                AggregateFn::Mean => vals.iter().sum::<f64>() / vals.len() as f64,
                AggregateFn::Min => vals.iter().cloned().fold(f64::INFINITY, f64::min),
                AggregateFn::Max => vals.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                AggregateFn::Median => median(&vals),
                AggregateFn::Std => std_dev(&vals),
                AggregateFn::Count | AggregateFn::Nunique => unreachable!(),
            }
        }
    }
}

fn median(vals: &[f64]) -> f64 {
    let mut sorted = vals.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 { (sorted[mid - 1] + sorted[mid]) / 2.0 } else { sorted[mid] }
}

fn std_dev(vals: &[f64]) -> f64 {
    if vals.len() < 2 {
        return 0.0;
    }
    let mean = vals.iter().sum::<f64>() / vals.len() as f64;
    let variance = vals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (vals.len() - 1) as f64;
    variance.sqrt()
}

#[derive(Debug, Clone, Default)]
pub struct AnalyzeParams {
    pub groupby: Vec<String>,
    pub aggregate: Option<String>,
    pub period: Option<String>,
    pub pivot: Option<String>,
    pub sort: Option<String>,
    pub limit: Option<usize>,
}

fn period_label(date: NaiveDate, period: &str) -> String {
    match period {
        "week" => {
            let monday = date - chrono::Duration::days(date.weekday().num_days_from_monday() as i64);
            format!("{:04}-{:02}", monday.year(), monday.month())
        }
        "quarter" => {
            let q_month = ((date.month0() / 3) * 3) + 1;
            format!("{:04}-{:02}", date.year(), q_month)
        }
        _ => format!("{:04}-{:02}", date.year(), date.month()),
    }
}

fn group_key(row: &Record, fields: &[&str]) -> String {
    fields.iter().map(|f| record_get(row, f).map(CellValue::as_display).unwrap_or_default()).collect::<Vec<_>>().join("\u{1}")
}

/// Replace values in `field` per the table's `value_map` context entry,
/// returning the rewritten rows and how many cells changed. The input is
/// never mutated (§4.7).
pub fn normalize_value_map(rows: &[Record], table: &str, field: &str, store: &SchemaStore) -> (Vec<Record>, usize) {
    let key = ContextKey { table: table.to_string(), field: field.to_string(), context_type: ContextType::ValueMap };
    let Some(mapping) = store.context_value(&key) else { return (rows.to_vec(), 0) };

    let map: HashMap<String, String> = mapping
        .split(';')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            let (k, v) = (k.trim(), v.trim());
            if k.is_empty() || v.is_empty() { None } else { Some((k.to_string(), v.to_string())) }
        })
        .collect();

    if map.is_empty() {
        return (rows.to_vec(), 0);
    }

    let mut replaced = 0;
    let out = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|(k, v)| {
                    if k == field {
                        if let CellValue::Text(s) = v {
                            if let Some(repl) = map.get(s) {
                                replaced += 1;
                                return (k.clone(), CellValue::Text(repl.clone()));
                            }
                        }
                    }
                    (k.clone(), v.clone())
                })
                .collect()
        })
        .collect();

    (out, replaced)
}

fn sort_and_limit(mut rows: Vec<Record>, sort: Option<&str>, limit: Option<usize>) -> Vec<Record> {
    if let Some(spec) = sort {
        let (field, desc) = match spec.strip_suffix(" desc") {
            Some(f) => (f.trim(), true),
            None => (spec.trim().strip_suffix(" asc").unwrap_or(spec.trim()), false),
        };
        rows.sort_by(|a, b| {
            let av = record_get(a, field);
            let bv = record_get(b, field);
            let ord = match (av.and_then(CellValue::as_f64), bv.and_then(CellValue::as_f64)) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
                _ => av.map(CellValue::as_display).cmp(&bv.map(CellValue::as_display)),
            };
            if desc { ord.reverse() } else { ord }
        });
    }
    if let Some(n) = limit {
        rows.truncate(n);
    }
    rows
}

/// One analysis result plus the value-map normalization trailer, if any
/// columns were rewritten before grouping (§4.7).
pub struct AnalyzeResult {
    pub rows: Vec<Record>,
    pub normalized: Vec<(String, usize)>,
}

/// Dispatch to describe / scalar-aggregate / value-count-groupby /
/// grouped-aggregate / time-series / pivot based on which of
/// groupby/aggregate/period/pivot were supplied (§4.7).
pub fn analyze(rows: &[Record], table: &str, store: &SchemaStore, params: &AnalyzeParams) -> Result<AnalyzeResult, BridgeError> {
    if let Some(pivot_field) = &params.pivot {
        let (out, normalized) = pivot(rows, table, store, params, pivot_field);
        return Ok(AnalyzeResult { rows: out, normalized });
    }
    if let Some(period) = &params.period {
        return Ok(AnalyzeResult { rows: time_series(rows, table, store, params, period), normalized: Vec::new() });
    }
    if params.groupby.is_empty() {
        let out = match &params.aggregate {
            Some(spec) => vec![scalar_aggregate(rows, spec)],
            None => describe(rows),
        };
        return Ok(AnalyzeResult { rows: out, normalized: Vec::new() });
    }
    let (out, normalized) = match &params.aggregate {
        Some(spec) => grouped_aggregate(rows, table, store, params, spec),
        None => value_count_groupby(rows, table, store, params),
    };
    Ok(AnalyzeResult { rows: out, normalized })
}

/// Render the `Normalized:` trailer documenting per-field replacement
/// counts from value-map normalization (§4.7, §8 Scenario 7). Empty when
/// nothing was rewritten.
pub fn format_normalized_trailer(normalized: &[(String, usize)]) -> String {
    if normalized.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = normalized.iter().map(|(field, count)| format!("{field} ({count} replaced)")).collect();
    format!("\nNormalized: {}\n", parts.join(", "))
}

fn scalar_aggregate(rows: &[Record], spec: &str) -> Record {
    parse_aggregates(spec)
        .into_iter()
        .map(|(func, field)| (format!("{}:{field}", func.label()), CellValue::Number(compute(func, rows, &field))))
        .collect()
}

fn describe(rows: &[Record]) -> Vec<Record> {
    let mut fields: Vec<String> = Vec::new();
    for row in rows {
        for (k, v) in row {
            if matches!(v, CellValue::Number(_)) && !fields.contains(k) {
                fields.push(k.clone());
            }
        }
    }
    fields
        .into_iter()
        .map(|field| {
            let vals = numeric_values(rows, &field);
            vec![
                ("field".to_string(), CellValue::Text(field.clone())),
                ("count".to_string(), CellValue::Number(vals.len() as f64)),
                ("mean".to_string(), CellValue::Number(compute(AggregateFn::Mean, rows, &field))),
                ("min".to_string(), CellValue::Number(compute(AggregateFn::Min, rows, &field))),
                ("max".to_string(), CellValue::Number(compute(AggregateFn::Max, rows, &field))),
                ("std".to_string(), CellValue::Number(compute(AggregateFn::Std, rows, &field))),
            ]
        })
        .collect()
}

fn apply_value_maps(rows: &[Record], table: &str, store: &SchemaStore, fields: &[&str]) -> (Vec<Record>, Vec<(String, usize)>) {
    let mut current = rows.to_vec();
    let mut trailers = Vec::new();
    for field in fields {
        let (next, count) = normalize_value_map(&current, table, field, store);
        if count > 0 {
            trailers.push((field.to_string(), count));
        }
        current = next;
    }
    (current, trailers)
}

fn value_count_groupby(rows: &[Record], table: &str, store: &SchemaStore, params: &AnalyzeParams) -> (Vec<Record>, Vec<(String, usize)>) {
    let field = params.groupby[0].as_str();
    let (normalized, trailers) = apply_value_maps(rows, table, store, &[field]);

    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for row in &normalized {
        let key = record_get(row, field).map(CellValue::as_display).unwrap_or_default();
        if !counts.contains_key(&key) {
            order.push(key.clone());
        }
        *counts.entry(key).or_insert(0) += 1;
    }

    let out: Vec<Record> = order
        .into_iter()
        .map(|key| {
            vec![
                (field.to_string(), CellValue::Text(key.clone())),
                ("count".to_string(), CellValue::Number(*counts.get(&key).unwrap() as f64)),
            ]
        })
        .collect();

    (sort_and_limit(out, params.sort.as_deref().or(Some("count desc")), params.limit), trailers)
}

fn grouped_aggregate(rows: &[Record], table: &str, store: &SchemaStore, params: &AnalyzeParams, spec: &str) -> (Vec<Record>, Vec<(String, usize)>) {
    let groupby: Vec<&str> = params.groupby.iter().map(String::as_str).collect();
    let (normalized, trailers) = apply_value_maps(rows, table, store, &groupby);
    let aggregates = parse_aggregates(spec);

    let mut groups: HashMap<String, Vec<&Record>> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for row in &normalized {
        let key = group_key(row, &groupby);
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(row);
    }

    let out: Vec<Record> = order
        .into_iter()
        .map(|key| {
            let members = &groups[&key];
            let owned: Vec<Record> = members.iter().map(|r| (**r).clone()).collect();
            let mut record: Record = groupby
                .iter()
                .map(|f| (f.to_string(), record_get(&owned[0], f).cloned().unwrap_or(CellValue::Null)))
                .collect();
            for (func, field) in &aggregates {
                record.push((format!("{}:{field}", func.label()), CellValue::Number(compute(*func, &owned, field))));
            }
            record
        })
        .collect();

    (sort_and_limit(out, params.sort.as_deref(), params.limit), trailers)
}

fn time_series(rows: &[Record], _table: &str, _store: &SchemaStore, params: &AnalyzeParams, period: &str) -> Vec<Record> {
    let Some(date_field) = params.groupby.first() else { return Vec::new() };
    let aggregates = params.aggregate.as_deref().map(parse_aggregates).unwrap_or_else(|| vec![(AggregateFn::Count, date_field.clone())]);

    let mut groups: HashMap<String, Vec<Record>> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for row in rows {
        let Some(date) = record_get(row, date_field).and_then(CellValue::as_date) else { continue };
        let label = period_label(date, period);
        if !groups.contains_key(&label) {
            order.push(label.clone());
        }
        groups.entry(label).or_default().push(row.clone());
    }
    order.sort();

    order
        .into_iter()
        .map(|label| {
            let members = &groups[&label];
            let mut record: Record = vec![("period".to_string(), CellValue::Text(label))];
            for (func, field) in &aggregates {
                record.push((format!("{}:{field}", func.label()), CellValue::Number(compute(*func, members, field))));
            }
            record
        })
        .collect()
}

fn pivot(rows: &[Record], table: &str, store: &SchemaStore, params: &AnalyzeParams, pivot_field: &str) -> (Vec<Record>, Vec<(String, usize)>) {
    let Some(row_field) = params.groupby.first().map(String::as_str) else { return (Vec::new(), Vec::new()) };
    let (normalized, trailers) = apply_value_maps(rows, table, store, &[row_field, pivot_field]);
    let (func, value_field) = params
        .aggregate
        .as_deref()
        .and_then(|s| parse_aggregates(s).into_iter().next())
        .unwrap_or((AggregateFn::Count, row_field.to_string()));

    let mut row_keys: Vec<String> = Vec::new();
    let mut col_keys: Vec<String> = Vec::new();
    for r in &normalized {
        let rk = record_get(r, row_field).map(CellValue::as_display).unwrap_or_default();
        let ck = record_get(r, pivot_field).map(CellValue::as_display).unwrap_or_default();
        if !row_keys.contains(&rk) {
            row_keys.push(rk);
        }
        if !col_keys.contains(&ck) {
            col_keys.push(ck);
        }
    }
    row_keys.sort();
    col_keys.sort();

    let rows_out: Vec<Record> = row_keys
        .into_iter()
        .map(|rk| {
            let mut record: Record = vec![(row_field.to_string(), CellValue::Text(rk.clone()))];
            for ck in &col_keys {
                let matching: Vec<Record> = normalized
                    .iter()
                    .filter(|r| {
                        record_get(r, row_field).map(CellValue::as_display).as_deref() == Some(rk.as_str())
                            && record_get(r, pivot_field).map(CellValue::as_display).as_deref() == Some(ck.as_str())
                    })
                    .cloned()
                    .collect();
                let value = if matching.is_empty() { 0.0 } else { compute(func, &matching, &value_field) };
                record.push((ck.clone(), CellValue::Number(value)));
            }
            record
        })
        .collect();

    (rows_out, trailers)
}

/// Named, manually-loaded datasets that persist independently of the table
/// cache (§4.7).
#[derive(Debug, Default)]
pub struct DatasetStore {
    datasets: DashMap<String, Vec<Record>>,
}

impl DatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self, name: impl Into<String>, rows: Vec<Record>) {
        self.datasets.insert(name.into(), rows);
    }

    pub fn get(&self, name: &str) -> Option<Vec<Record>> {
        self.datasets.get(name).map(|r| r.clone())
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.datasets.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn flush(&self, name: &str) {
        self.datasets.remove(name);
    }

    pub fn flush_all(&self) {
        self.datasets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContextKey, ContextType};

    fn text_row(field: &str, value: &str) -> Record {
        vec![(field.to_string(), CellValue::Text(value.to_string()))]
    }

    #[test]
    fn parse_aggregates_reads_func_field_pairs() {
        let parsed = parse_aggregates("sum:Amount, mean:Score");
        assert_eq!(parsed, vec![(AggregateFn::Sum, "Amount".to_string()), (AggregateFn::Mean, "Score".to_string())]);
    }

    #[test]
    fn compute_sum_and_mean() {
        let rows = vec![
            vec![("Amount".to_string(), CellValue::Number(10.0))],
            vec![("Amount".to_string(), CellValue::Number(20.0))],
        ];
        assert_eq!(compute(AggregateFn::Sum, &rows, "Amount"), 30.0);
        assert_eq!(compute(AggregateFn::Mean, &rows, "Amount"), 15.0);
    }

    #[test]
    fn scenario_value_map_normalizes_sales_rep_names() {
        let mut store = SchemaStore::new();
        store.upsert_context(
            ContextKey { table: "Sales".into(), field: "Rep".into(), context_type: ContextType::ValueMap },
            "Jake=Jacob Owens;Mike=Michael Owens".into(),
        );
        let rows = vec![text_row("Rep", "Jake"), text_row("Rep", "Jacob Owens"), text_row("Rep", "Mike")];
        let (normalized, count) = normalize_value_map(&rows, "Sales", "Rep", &store);
        let names: Vec<String> = normalized.iter().map(|r| record_get(r, "Rep").unwrap().as_display()).collect();
        assert_eq!(names, vec!["Jacob Owens", "Jacob Owens", "Michael Owens"]);
        assert_eq!(count, 2);
        // original untouched
        assert_eq!(record_get(&rows[0], "Rep").unwrap().as_display(), "Jake");
    }

    #[test]
    fn value_count_groupby_counts_and_sorts_desc_by_default() {
        let store = SchemaStore::new();
        let rows = vec![text_row("Zone", "East"), text_row("Zone", "East"), text_row("Zone", "West")];
        let params = AnalyzeParams { groupby: vec!["Zone".into()], ..Default::default() };
        let (out, trailers) = value_count_groupby(&rows, "T", &store, &params);
        assert_eq!(record_get(&out[0], "Zone").unwrap().as_display(), "East");
        assert_eq!(record_get(&out[0], "count").unwrap().as_f64(), Some(2.0));
        assert!(trailers.is_empty());
    }

    #[test]
    fn grouped_aggregate_sums_per_group() {
        let store = SchemaStore::new();
        let rows = vec![
            vec![("Zone".to_string(), CellValue::Text("East".into())), ("Amount".to_string(), CellValue::Number(10.0))],
            vec![("Zone".to_string(), CellValue::Text("East".into())), ("Amount".to_string(), CellValue::Number(5.0))],
            vec![("Zone".to_string(), CellValue::Text("West".into())), ("Amount".to_string(), CellValue::Number(1.0))],
        ];
        let params = AnalyzeParams { groupby: vec!["Zone".into()], ..Default::default() };
        let (out, _) = grouped_aggregate(&rows, "T", &store, &params, "sum:Amount");
        let east = out.iter().find(|r| record_get(r, "Zone").unwrap().as_display() == "East").unwrap();
        assert_eq!(record_get(east, "sum:Amount").unwrap().as_f64(), Some(15.0));
    }

    #[test]
    fn grouped_aggregate_reports_value_map_trailer() {
        let mut store = SchemaStore::new();
        store.upsert_context(
            ContextKey { table: "Sales".into(), field: "Technician".into(), context_type: ContextType::ValueMap },
            "Jake=Jacob Owens".into(),
        );
        let rows = vec![
            vec![("Technician".to_string(), CellValue::Text("Jake".into())), ("Amount".to_string(), CellValue::Number(100.0))],
            vec![("Technician".to_string(), CellValue::Text("Jacob Owens".into())), ("Amount".to_string(), CellValue::Number(150.0))],
            vec![("Technician".to_string(), CellValue::Text("Mike".into())), ("Amount".to_string(), CellValue::Number(300.0))],
        ];
        let params = AnalyzeParams { groupby: vec!["Technician".into()], ..Default::default() };
        let (out, trailers) = grouped_aggregate(&rows, "Sales", &store, &params, "sum:Amount");
        assert_eq!(out.len(), 2);
        let jacob = out.iter().find(|r| record_get(r, "Technician").unwrap().as_display() == "Jacob Owens").unwrap();
        assert_eq!(record_get(jacob, "sum:Amount").unwrap().as_f64(), Some(250.0));
        assert_eq!(trailers, vec![("Technician".to_string(), 1)]);
        assert_eq!(format_normalized_trailer(&trailers), "\nNormalized: Technician (1 replaced)\n");
    }

    #[test]
    fn time_series_buckets_by_month() {
        let store = SchemaStore::new();
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        let rows = vec![
            vec![("D".to_string(), CellValue::Date(d("2026-01-05"))), ("Amount".to_string(), CellValue::Number(10.0))],
            vec![("D".to_string(), CellValue::Date(d("2026-01-20"))), ("Amount".to_string(), CellValue::Number(5.0))],
            vec![("D".to_string(), CellValue::Date(d("2026-02-01"))), ("Amount".to_string(), CellValue::Number(1.0))],
        ];
        let params = AnalyzeParams { groupby: vec!["D".into()], aggregate: Some("sum:Amount".into()), period: Some("month".into()), ..Default::default() };
        let out = time_series(&rows, "T", &store, &params, "month");
        assert_eq!(out.len(), 2);
        assert_eq!(record_get(&out[0], "period").unwrap().as_display(), "2026-01");
        assert_eq!(record_get(&out[0], "sum:Amount").unwrap().as_f64(), Some(15.0));
    }

    #[test]
    fn pivot_fills_missing_cells_with_zero() {
        let store = SchemaStore::new();
        let rows = vec![
            vec![("Zone".to_string(), CellValue::Text("East".into())), ("Status".to_string(), CellValue::Text("Open".into())), ("Amount".to_string(), CellValue::Number(10.0))],
            vec![("Zone".to_string(), CellValue::Text("West".into())), ("Status".to_string(), CellValue::Text("Closed".into())), ("Amount".to_string(), CellValue::Number(3.0))],
        ];
        let params = AnalyzeParams { groupby: vec!["Zone".into()], aggregate: Some("sum:Amount".into()), ..Default::default() };
        let (out, _) = pivot(&rows, "T", &store, &params, "Status");
        let east = out.iter().find(|r| record_get(r, "Zone").unwrap().as_display() == "East").unwrap();
        assert_eq!(record_get(east, "Closed").unwrap().as_f64(), Some(0.0));
        assert_eq!(record_get(east, "Open").unwrap().as_f64(), Some(10.0));
    }

    #[test]
    fn describe_reports_numeric_summary() {
        let rows = vec![
            vec![("Amount".to_string(), CellValue::Number(10.0))],
            vec![("Amount".to_string(), CellValue::Number(20.0))],
        ];
        let out = describe(&rows);
        let row = out.iter().find(|r| record_get(r, "field").unwrap().as_display() == "Amount").unwrap();
        assert_eq!(record_get(row, "mean").unwrap().as_f64(), Some(15.0));
    }

    #[test]
    fn dataset_store_round_trips() {
        let store = DatasetStore::new();
        store.load("mydata", vec![text_row("A", "1")]);
        assert_eq!(store.list(), vec!["mydata".to_string()]);
        assert!(store.get("mydata").is_some());
        store.flush("mydata");
        assert!(store.get("mydata").is_none());
    }

    #[test]
    fn sort_and_limit_honors_desc_suffix_and_limit() {
        let rows = vec![
            vec![("count".to_string(), CellValue::Number(1.0))],
            vec![("count".to_string(), CellValue::Number(5.0))],
            vec![("count".to_string(), CellValue::Number(3.0))],
        ];
        let out = sort_and_limit(rows, Some("count desc"), Some(2));
        assert_eq!(out.len(), 2);
        assert_eq!(record_get(&out[0], "count").unwrap().as_f64(), Some(5.0));
    }
}
