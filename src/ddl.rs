//! DDL parsing: `CREATE TABLE` blocks from the DDL script into field
//! descriptors, with tier assignment (§4.4).

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::metadata::FieldAnnotations;
use crate::types::{FieldDescriptor, SemanticType, Tier};

static CREATE_TABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)CREATE\s+TABLE\s+"([^"]+)"\s*\((.*?)\);"#).unwrap());
static FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)"([^"]+)"\s+(varchar\(\d+\)|int|datetime|varbinary\(\d+\))"#).unwrap());
static PK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)PRIMARY\s+KEY\s*\(([^)]+)\)").unwrap());
static FK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)FOREIGN\s+KEY\s*\(([^)]+)\)").unwrap());

fn map_type(sql_type: &str) -> SemanticType {
    let base = sql_type.split('(').next().unwrap_or(sql_type).to_lowercase();
    match base.as_str() {
        "varchar" => SemanticType::Text,
        "int" => SemanticType::Number,
        "datetime" => SemanticType::Datetime,
        "varbinary" => SemanticType::Binary,
        _ => SemanticType::Text,
    }
}

/// Tier assignment, first match wins (§4.4).
pub fn assign_tier(field_name: &str, annotations: Option<&FieldAnnotations>) -> Tier {
    if field_name.starts_with("_kp_") || field_name.starts_with("_kf_") {
        return Tier::Key;
    }
    if let Some(a) = annotations {
        if a.calculation || a.summary || a.global {
            return Tier::Internal;
        }
    }
    if field_name.starts_with("_sp_") {
        return Tier::Internal;
    }
    let mut chars = field_name.chars();
    if let Some(first) = chars.next() {
        if first == 'g' {
            if let Some(second) = chars.next() {
                if second.is_uppercase() {
                    return Tier::Internal;
                }
            }
        }
    }
    if field_name.starts_with("G_") {
        return Tier::Internal;
    }
    Tier::Standard
}

/// Parse one or more `CREATE TABLE "name" ( ... );` blocks into field
/// descriptors per table, attaching annotations where provided.
pub fn parse_ddl(
    ddl_text: &str,
    annotations: &HashMap<String, HashMap<String, FieldAnnotations>>,
) -> HashMap<String, HashMap<String, FieldDescriptor>> {
    let mut tables = HashMap::new();
    if ddl_text.trim().is_empty() {
        return tables;
    }

    for caps in CREATE_TABLE_RE.captures_iter(ddl_text) {
        let table_name = caps[1].to_string();
        let body = &caps[2];

        let pk_fields: HashSet<String> = PK_RE
            .captures_iter(body)
            .flat_map(|m| m[1].split(',').map(|s| s.trim().trim_matches('"').to_string()).collect::<Vec<_>>())
            .collect();
        let fk_fields: HashSet<String> = FK_RE
            .captures_iter(body)
            .flat_map(|m| m[1].split(',').map(|s| s.trim().trim_matches('"').to_string()).collect::<Vec<_>>())
            .collect();

        let table_ann = annotations.get(&table_name);
        let mut fields = HashMap::new();

        for field_caps in FIELD_RE.captures_iter(body) {
            let field_name = field_caps[1].to_string();
            let sql_type = &field_caps[2];
            let field_ann = table_ann.and_then(|m| m.get(&field_name));

            let mut field = FieldDescriptor::new(
                field_name.clone(),
                map_type(sql_type),
                assign_tier(&field_name, field_ann),
            );

            if let Some(ann) = field_ann {
                if let Some(comment) = &ann.comment {
                    field.description = Some(comment.clone());
                }
            }

            if pk_fields.contains(&field_name) {
                field.is_pk = true;
            }
            if fk_fields.contains(&field_name) {
                field.is_fk = true;
            }
            // _kp_/_kf_ fields always carry the flag even without a matching
            // constraint clause (§3 invariant).
            if field_name.starts_with("_kp_") {
                field.is_pk = true;
            }
            if field_name.starts_with("_kf_") {
                field.is_fk = true;
            }

            fields.insert(field_name, field);
        }

        tables.insert(table_name, fields);
    }

    tables
}

/// Extract `CREATE TABLE "name"` names from a DDL blob (bootstrap step 3).
pub fn extract_table_names(ddl_text: &str) -> HashSet<String> {
    CREATE_TABLE_RE.captures_iter(ddl_text).map(|c| c[1].to_string()).collect()
}
