//! OData request shaper — pure string transforms, no I/O (§4.1).

use std::sync::LazyLock;

use regex::Regex;

static ISO_QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['"](\d{4}-\d{2}-\d{2})(?:T[^'"]*)?['"]"#).unwrap());
static ISO_TIMESTAMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})T\d{2}:\d{2}:\d{2}[Z\d:.+\-]*").unwrap());
static US_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{4})(?:\s+\d{1,2}:\d{2}:\d{2}\s*(?:AM|PM)?)?").unwrap()
});
static ISO_BARE_QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['"](\d{4}-\d{2}-\d{2})['"]"#).unwrap());
static FUNC_FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(contains|startswith|endswith)\(([^,]+),(.*?)\)").unwrap());
static CLAUSE_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\s+(?:and|or)\s+)").unwrap());
static COMPARISON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\s+(eq|ne|gt|ge|lt|le)\s+(.*)$").unwrap());

/// Normalize date literals in a filter expression to bare ISO-8601, applying
/// the four transformations in order (§4.1). Idempotent.
pub fn normalize_dates_in_filter(filter: &str) -> String {
    if filter.is_empty() {
        return String::new();
    }

    let step1 = ISO_QUOTED_RE.replace_all(filter, "$1").into_owned();
    let step2 = ISO_TIMESTAMP_RE.replace_all(&step1, "$1").into_owned();
    let step3 = US_DATE_RE
        .replace_all(&step2, |caps: &regex::Captures| {
            let month: u32 = caps[1].parse().unwrap_or(1);
            let day: u32 = caps[2].parse().unwrap_or(1);
            let year = &caps[3];
            format!("{year}-{month:02}-{day:02}")
        })
        .into_owned();
    ISO_BARE_QUOTED_RE.replace_all(&step3, "$1").into_owned()
}

/// Wrap each field in a comma-separated `$select` list in double quotes.
pub fn quote_fields_in_select(select: &str) -> String {
    if select.is_empty() {
        return String::new();
    }
    select
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(quote_identifier)
        .collect::<Vec<_>>()
        .join(",")
}

/// Wrap identifiers in a comma-separated `$orderby` list, preserving trailing
/// ` asc`/` desc` direction verbatim.
pub fn quote_fields_in_orderby(orderby: &str) -> String {
    if orderby.is_empty() {
        return String::new();
    }
    orderby
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|clause| {
            let lower = clause.to_lowercase();
            for suffix in [" asc", " desc"] {
                if lower.ends_with(suffix) {
                    let split_at = clause.len() - (suffix.len() - 1);
                    let (field, direction) = clause.split_at(split_at);
                    return format!("{} {}", quote_identifier(field.trim()), direction.trim());
                }
            }
            quote_identifier(clause)
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn quote_identifier(field: &str) -> String {
    if field.starts_with('"') {
        field.to_string()
    } else {
        format!("\"{field}\"")
    }
}

/// Double-quote field identifiers in a filter expression while leaving
/// literals, operators, and connectives untouched (§4.1).
pub fn quote_fields_in_filter(filter: &str) -> String {
    if filter.is_empty() {
        return String::new();
    }

    let with_funcs = FUNC_FIELD_RE
        .replace_all(filter, |caps: &regex::Captures| {
            let func = &caps[1];
            let field = caps[2].trim();
            let rest = &caps[3];
            format!("{func}({},{rest})", quote_identifier(field))
        })
        .into_owned();

    let clauses: Vec<&str> = CLAUSE_SPLIT_RE.split(&with_funcs).collect();
    let connectives: Vec<&str> = CLAUSE_SPLIT_RE
        .find_iter(&with_funcs)
        .map(|m| m.as_str())
        .collect();

    let mut out = String::new();
    for (i, clause) in clauses.iter().enumerate() {
        out.push_str(&quote_comparison_clause(clause));
        if let Some(conn) = connectives.get(i) {
            out.push_str(conn);
        }
    }
    out
}

fn quote_comparison_clause(clause: &str) -> String {
    let trimmed = clause.trim();
    if let Some(caps) = COMPARISON_RE.captures(trimmed) {
        let field = caps[1].trim();
        let op = &caps[2];
        let value = caps[3].trim();
        let leading = &clause[..clause.len() - clause.trim_start().len()];
        format!("{leading}{} {op} {value}", quote_identifier(field))
    } else {
        clause.to_string()
    }
}

/// Percent-encode a query-string value the way the server demands: spaces as
/// `%20` (never `+`), and `$`, `,`, `/`, `'` passed through unencoded.
pub fn encode_query_param(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            ' ' => out.push_str("%20"),
            '$' | ',' | '/' | '\'' => out.push(ch),
            c if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~') => out.push(c),
            c => out.push_str(&percent_encode_char(c)),
        }
    }
    out
}

fn percent_encode_char(c: char) -> String {
    let mut buf = [0u8; 4];
    let bytes = c.encode_utf8(&mut buf).as_bytes();
    bytes.iter().map(|b| format!("%{b:02X}")).collect()
}
