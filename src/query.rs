//! Query engine: in-memory filter/orderby/select evaluation and result
//! formatting (§4.6). Pure functions over already-fetched records; the
//! decision tree that decides what to fetch lives in `engine.rs`.

use std::cmp::Ordering;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value as Json;

use crate::cache::{record_get, CellValue, Record};
use crate::schema_store::SchemaStore;
use crate::types::{SemanticType, TableDescriptor};

const MAX_STRING_LEN: usize = 500;
const MAX_TOP: u32 = 10_000;

pub fn clamp_top(top: Option<u32>) -> u32 {
    top.unwrap_or(MAX_TOP).min(MAX_TOP)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone)]
pub struct Clause {
    pub field: String,
    pub op: CompareOp,
    pub value: String,
}

#[derive(Debug, Clone)]
enum Token {
    Clause(Clause),
    Bool(BoolOp),
}

static CLAUSE_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\s+(?:and|or)\s+)").unwrap());
static COMPARISON_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.*?)\s+(eq|ne|gt|ge|lt|le)\s+(.*)$").unwrap());

fn strip_quotes(s: &str) -> String {
    let t = s.trim();
    if t.len() >= 2 && t.starts_with('"') && t.ends_with('"') {
        t[1..t.len() - 1].to_string()
    } else {
        t.to_string()
    }
}

/// Parse a flat (no-parentheses) filter expression into clauses joined by
/// top-level `and`/`or` (§4.6 — no grouping required or supported).
pub fn parse_filter(filter: &str) -> Vec<Clause> {
    if filter.trim().is_empty() {
        return Vec::new();
    }
    let parts: Vec<&str> = CLAUSE_SPLIT_RE.split(filter).collect();
    let mut clauses = Vec::new();
    for part in parts {
        let trimmed = part.trim();
        if trimmed.is_empty() || trimmed == "and" || trimmed == "or" {
            continue;
        }
        if let Some(caps) = COMPARISON_RE.captures(trimmed) {
            let op = match &caps[2] {
                "eq" => CompareOp::Eq,
                "ne" => CompareOp::Ne,
                "gt" => CompareOp::Gt,
                "ge" => CompareOp::Ge,
                "lt" => CompareOp::Lt,
                "le" => CompareOp::Le,
                _ => continue,
            };
            clauses.push(Clause { field: strip_quotes(&caps[1]), op, value: strip_quotes(&caps[3]) });
        }
    }
    clauses
}

fn tokenize(filter: &str) -> Vec<Token> {
    let parts: Vec<&str> = CLAUSE_SPLIT_RE.split(filter).collect();
    let connectives: Vec<&str> = CLAUSE_SPLIT_RE.find_iter(filter).map(|m| m.as_str().trim()).collect();
    let mut tokens = Vec::new();
    for (i, part) in parts.iter().enumerate() {
        let trimmed = part.trim();
        if !trimmed.is_empty() {
            if let Some(caps) = COMPARISON_RE.captures(trimmed) {
                let op = match &caps[2] {
                    "eq" => CompareOp::Eq,
                    "ne" => CompareOp::Ne,
                    "gt" => CompareOp::Gt,
                    "ge" => CompareOp::Ge,
                    "lt" => CompareOp::Lt,
                    "le" => CompareOp::Le,
                    _ => continue,
                };
                tokens.push(Token::Clause(Clause { field: strip_quotes(&caps[1]), op, value: strip_quotes(&caps[3]) }));
            }
        }
        if let Some(conn) = connectives.get(i) {
            tokens.push(Token::Bool(if *conn == "and" { BoolOp::And } else { BoolOp::Or }));
        }
    }
    tokens
}

/// Evaluate `filter` against one record. Boolean `and`/`or` are combined
/// left to right at the top level; comparisons that can't be represented
/// (type mismatch) are skipped rather than failing the row (§4.6).
pub fn matches_filter(filter: &str, record: &Record) -> bool {
    if filter.trim().is_empty() {
        return true;
    }
    let tokens = tokenize(filter);
    let mut acc: Option<bool> = None;
    let mut pending: Option<BoolOp> = None;
    for token in tokens {
        match token {
            Token::Clause(c) => {
                let v = eval_clause(&c, record);
                acc = Some(match (acc, pending.take()) {
                    (None, _) => v,
                    (Some(a), Some(BoolOp::And)) => a && v,
                    (Some(a), Some(BoolOp::Or)) => a || v,
                    (Some(a), None) => a,
                });
            }
            Token::Bool(op) => pending = Some(op),
        }
    }
    acc.unwrap_or(true)
}

fn eval_clause(clause: &Clause, record: &Record) -> bool {
    let Some(cell) = record_get(record, &clause.field) else { return true };

    if let (Some(a), Ok(b)) = (cell.as_date(), NaiveDate::parse_from_str(&clause.value, "%Y-%m-%d")) {
        return compare(a.cmp(&b), clause.op);
    }
    if let (Some(a), Ok(b)) = (cell.as_f64(), clause.value.parse::<f64>()) {
        return compare(a.partial_cmp(&b).unwrap_or(Ordering::Equal), clause.op);
    }
    match clause.op {
        CompareOp::Eq => cell.as_display() == clause.value,
        CompareOp::Ne => cell.as_display() != clause.value,
        // Ordering comparators on non-numeric/non-date columns are
        // unrepresentable here; skip rather than fail the row.
        _ => true,
    }
}

fn compare(ord: Ordering, op: CompareOp) -> bool {
    match op {
        CompareOp::Eq => ord == Ordering::Equal,
        CompareOp::Ne => ord != Ordering::Equal,
        CompareOp::Gt => ord == Ordering::Greater,
        CompareOp::Ge => ord != Ordering::Less,
        CompareOp::Lt => ord == Ordering::Less,
        CompareOp::Le => ord != Ordering::Greater,
    }
}

/// Stable sort by each orderby key, respecting direction; missing columns
/// are ignored (§4.6).
pub fn apply_orderby(rows: &mut [Record], orderby: &str) {
    let clauses = parse_orderby(orderby);
    for (field, desc) in clauses.iter().rev() {
        rows.sort_by(|a, b| {
            let (Some(ca), Some(cb)) = (record_get(a, field), record_get(b, field)) else {
                return Ordering::Equal;
            };
            let ord = compare_values(ca, cb);
            if *desc { ord.reverse() } else { ord }
        });
    }
}

fn parse_orderby(orderby: &str) -> Vec<(String, bool)> {
    orderby
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|clause| {
            let lower = clause.to_lowercase();
            if let Some(field) = lower.strip_suffix(" desc") {
                (strip_quotes(clause[..field.len()].trim()), true)
            } else if let Some(field) = lower.strip_suffix(" asc") {
                (strip_quotes(clause[..field.len()].trim()), false)
            } else {
                (strip_quotes(clause), false)
            }
        })
        .collect()
}

fn compare_values(a: &CellValue, b: &CellValue) -> Ordering {
    match (a, b) {
        (CellValue::Number(x), CellValue::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (CellValue::Date(x), CellValue::Date(y)) => x.cmp(y),
        _ => a.as_display().cmp(&b.as_display()),
    }
}

/// Keep the named columns in the order given; missing columns are dropped.
pub fn apply_select(rows: &[Record], select: &str) -> Vec<Record> {
    if select.trim().is_empty() {
        return rows.to_vec();
    }
    let fields: Vec<String> = select.split(',').map(str::trim).map(strip_quotes).filter(|f| !f.is_empty()).collect();
    rows.iter()
        .map(|row| {
            fields
                .iter()
                .filter_map(|f| record_get(row, f).map(|v| (f.clone(), v.clone())))
                .collect()
        })
        .collect()
}

/// Convert a JSON array of OData records into typed `Record`s, coercing
/// date/datetime columns per the schema's semantic types (§4.6 step 4).
pub fn json_rows_to_records(rows: &[Json], schema: Option<&TableDescriptor>) -> Vec<Record> {
    rows.iter().map(|row| json_row_to_record(row, schema)).collect()
}

fn json_row_to_record(row: &Json, schema: Option<&TableDescriptor>) -> Record {
    let Json::Object(map) = row else { return Vec::new() };
    map.iter()
        .map(|(key, value)| {
            let semantic = schema.and_then(|s| s.fields.get(key)).map(|f| f.semantic_type);
            (key.clone(), json_value_to_cell(value, semantic))
        })
        .collect()
}

fn json_value_to_cell(value: &Json, semantic: Option<SemanticType>) -> CellValue {
    if value.is_null() {
        return CellValue::Null;
    }
    match semantic {
        Some(SemanticType::Date) | Some(SemanticType::Datetime) => value
            .as_str()
            .and_then(|s| {
                let date_part = s.split('T').next().unwrap_or(s);
                NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
            })
            .map(CellValue::Date)
            .unwrap_or_else(|| value_to_fallback_cell(value)),
        Some(SemanticType::Number) | Some(SemanticType::Decimal) => {
            value.as_f64().map(CellValue::Number).unwrap_or_else(|| value_to_fallback_cell(value))
        }
        Some(SemanticType::Boolean) => value.as_bool().map(CellValue::Boolean).unwrap_or_else(|| value_to_fallback_cell(value)),
        _ => value_to_fallback_cell(value),
    }
}

fn value_to_fallback_cell(value: &Json) -> CellValue {
    match value {
        Json::String(s) => CellValue::Text(s.clone()),
        Json::Number(n) => CellValue::Number(n.as_f64().unwrap_or_default()),
        Json::Bool(b) => CellValue::Boolean(*b),
        Json::Null => CellValue::Null,
        other => CellValue::Text(other.to_string()),
    }
}

/// Format the leading summary line plus one `--- Record N ---` block per
/// row (§4.6 "Result formatting").
pub fn format_records(rows: &[Record], table: &str, total_count: Option<i64>) -> String {
    if rows.is_empty() {
        return match total_count {
            Some(c) if c > 0 => format!("Found {c} total records in {table} (none returned — check top/skip)."),
            _ => format!("No records found in {table} matching your query."),
        };
    }

    let mut out = String::new();
    match total_count {
        Some(c) => out.push_str(&format!("Found {c} total records in {table} (showing {}):\n\n", rows.len())),
        None => out.push_str(&format!("Showing {} records from {table}:\n\n", rows.len())),
    }

    for (i, row) in rows.iter().enumerate() {
        out.push_str(&format!("--- Record {} ---\n", i + 1));
        for (name, value) in row {
            if name.starts_with('@') {
                continue;
            }
            let display = format_value(value);
            if display.is_empty() {
                continue;
            }
            out.push_str(&format!("  {name}: {display}\n"));
        }
    }
    out
}

fn format_value(value: &CellValue) -> String {
    let s = value.as_display();
    if s.chars().count() > MAX_STRING_LEN {
        let truncated: String = s.chars().take(MAX_STRING_LEN).collect();
        format!("{truncated}... [truncated]")
    } else {
        s
    }
}

/// Append the optional `--- Context ---` and `--- Cache ---` sections
/// (§4.6 "Enrichment").
pub fn enrich(base: &str, rows: &[Record], table: &str, store: &SchemaStore, cached_rows: Option<(usize, Option<(NaiveDate, NaiveDate)>)>) -> String {
    let mut out = base.to_string();

    let mut fields: Vec<String> = Vec::new();
    for row in rows {
        for (name, _) in row {
            if !fields.contains(name) {
                fields.push(name.clone());
            }
        }
    }
    fields.sort();

    let mut context_lines = Vec::new();
    for field in &fields {
        let hints = store.field_context(table, field);
        if !hints.is_empty() {
            context_lines.push(format!("  {field}: {}", hints.join("; ")));
        }
    }
    if !context_lines.is_empty() {
        out.push_str("\n--- Context ---\n");
        out.push_str(&context_lines.join("\n"));
        out.push('\n');
    }

    if let Some((count, bounds)) = cached_rows {
        out.push_str("\n--- Cache ---\n");
        out.push_str(&format!("  {count} row(s) cached"));
        if let Some((min, max)) = bounds {
            out.push_str(&format!(" ({min} to {max})"));
        }
        out.push_str(".\n  Use analyze() to run aggregations over cached data without a remote round-trip.\n");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_store::SchemaStore;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn record(pairs: &[(&str, CellValue)]) -> Record {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn matches_simple_eq() {
        let r = record(&[("Zone", CellValue::Text("East".into()))]);
        assert!(matches_filter("Zone eq East", &r));
        assert!(!matches_filter("Zone eq West", &r));
    }

    #[test]
    fn matches_and_both_clauses() {
        let r = record(&[("Zone", CellValue::Text("East".into())), ("Amount", CellValue::Number(100.0))]);
        assert!(matches_filter("Zone eq East and Amount gt 50", &r));
        assert!(!matches_filter("Zone eq East and Amount gt 500", &r));
    }

    #[test]
    fn matches_or_either_clause() {
        let r = record(&[("Zone", CellValue::Text("West".into()))]);
        assert!(matches_filter("Zone eq East or Zone eq West", &r));
    }

    #[test]
    fn matches_date_eq() {
        let r = record(&[("ServiceDate", CellValue::Date(d("2026-02-14")))]);
        assert!(matches_filter("ServiceDate eq 2026-02-14", &r));
    }

    #[test]
    fn unrepresentable_comparison_is_skipped_not_failed() {
        let r = record(&[("Zone", CellValue::Text("East".into()))]);
        assert!(matches_filter("Zone gt East", &r));
    }

    #[test]
    fn missing_field_clause_is_skipped() {
        let r = record(&[("Zone", CellValue::Text("East".into()))]);
        assert!(matches_filter("Ghost eq 1", &r));
    }

    #[test]
    fn orderby_sorts_by_key_respecting_direction() {
        let mut rows = vec![
            record(&[("Name", CellValue::Text("Bob".into()))]),
            record(&[("Name", CellValue::Text("Alice".into()))]),
        ];
        apply_orderby(&mut rows, "Name asc");
        assert_eq!(record_get(&rows[0], "Name").unwrap().as_display(), "Alice");
    }

    #[test]
    fn orderby_desc_reverses() {
        let mut rows = vec![
            record(&[("Amount", CellValue::Number(1.0))]),
            record(&[("Amount", CellValue::Number(2.0))]),
        ];
        apply_orderby(&mut rows, "Amount desc");
        assert_eq!(record_get(&rows[0], "Amount").unwrap().as_f64(), Some(2.0));
    }

    #[test]
    fn select_keeps_order_and_drops_missing() {
        let rows = vec![record(&[
            ("A", CellValue::Text("1".into())),
            ("B", CellValue::Text("2".into())),
        ])];
        let out = apply_select(&rows, "B,Ghost,A");
        assert_eq!(out[0].iter().map(|(k, _)| k.clone()).collect::<Vec<_>>(), vec!["B", "A"]);
    }

    #[test]
    fn format_records_omits_at_prefixed_fields() {
        let rows = vec![record(&[("@odata.id", CellValue::Text("x".into())), ("Name", CellValue::Text("Bob".into()))])];
        let out = format_records(&rows, "Invoices", None);
        assert!(!out.contains("@odata.id"));
        assert!(out.contains("Name: Bob"));
    }

    #[test]
    fn format_records_truncates_long_strings() {
        let long = "x".repeat(600);
        let rows = vec![record(&[("Notes", CellValue::Text(long))])];
        let out = format_records(&rows, "Invoices", None);
        assert!(out.contains("[truncated]"));
    }

    #[test]
    fn format_records_omits_empty_values() {
        let rows = vec![record(&[("Notes", CellValue::Null)])];
        let out = format_records(&rows, "Invoices", None);
        assert!(!out.contains("Notes:"));
    }

    #[test]
    fn enrich_adds_context_section_when_hints_present() {
        let mut store = SchemaStore::new();
        store.upsert_context(
            crate::types::ContextKey {
                table: "Invoices".into(),
                field: "Status".into(),
                context_type: crate::types::ContextType::FieldValues,
            },
            "1=paid".into(),
        );
        let rows = vec![record(&[("Status", CellValue::Text("1".into()))])];
        let base = format_records(&rows, "Invoices", None);
        let out = enrich(&base, &rows, "Invoices", &store, None);
        assert!(out.contains("--- Context ---"));
        assert!(out.contains("1=paid"));
    }

    #[test]
    fn enrich_omits_sections_when_empty() {
        let store = SchemaStore::new();
        let rows = vec![record(&[("Status", CellValue::Text("1".into()))])];
        let base = format_records(&rows, "Invoices", None);
        let out = enrich(&base, &rows, "Invoices", &store, None);
        assert!(!out.contains("--- Context ---"));
        assert!(!out.contains("--- Cache ---"));
    }

    #[test]
    fn clamp_top_caps_at_10000() {
        assert_eq!(clamp_top(Some(50_000)), 10_000);
        assert_eq!(clamp_top(None), 10_000);
        assert_eq!(clamp_top(Some(5)), 5);
    }
}
