//! Core data model: tables, fields, context entries, cache policy, tenants.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Text,
    Number,
    Decimal,
    Boolean,
    Date,
    Datetime,
    Binary,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Key,
    Standard,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub semantic_type: SemanticType,
    pub tier: Tier,
    pub is_pk: bool,
    pub is_fk: bool,
    pub description: Option<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, semantic_type: SemanticType, tier: Tier) -> Self {
        Self {
            name: name.into(),
            semantic_type,
            tier,
            is_pk: false,
            is_fk: false,
            description: None,
        }
    }
}

/// Cache policy for a table, resolved from `cache_config` context entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachePolicy {
    None,
    DateRange { date_field: String },
    CacheAll,
}

#[derive(Debug, Clone)]
pub struct TableDescriptor {
    pub name: String,
    pub fields: HashMap<String, FieldDescriptor>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), fields: HashMap::new() }
    }

    /// First field carrying the PK flag; falls back to the literal name
    /// `PrimaryKey` when the DDL is silent on the key (§4.3).
    pub fn primary_key_field(&self) -> String {
        let mut names: Vec<&String> = self.fields.iter().filter(|(_, f)| f.is_pk).map(|(n, _)| n).collect();
        names.sort();
        names.into_iter().next().cloned().unwrap_or_else(|| "PrimaryKey".to_string())
    }
}

/// The open vocabulary of context-entry kinds (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    FieldValues,
    SyntaxRule,
    QueryPattern,
    Relationship,
    ValueMap,
    CacheConfig,
    ReportSelect,
    ClassificationSource,
    RuleOverride,
    FieldClass,
}

impl ContextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextType::FieldValues => "field_values",
            ContextType::SyntaxRule => "syntax_rule",
            ContextType::QueryPattern => "query_pattern",
            ContextType::Relationship => "relationship",
            ContextType::ValueMap => "value_map",
            ContextType::CacheConfig => "cache_config",
            ContextType::ReportSelect => "report_select",
            ContextType::ClassificationSource => "classification_source",
            ContextType::RuleOverride => "rule_override",
            ContextType::FieldClass => "field_class",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "field_values" => ContextType::FieldValues,
            "syntax_rule" => ContextType::SyntaxRule,
            "query_pattern" => ContextType::QueryPattern,
            "relationship" => ContextType::Relationship,
            "value_map" => ContextType::ValueMap,
            "cache_config" => ContextType::CacheConfig,
            "report_select" => ContextType::ReportSelect,
            "classification_source" => ContextType::ClassificationSource,
            "rule_override" => ContextType::RuleOverride,
            "field_class" => ContextType::FieldClass,
            _ => return None,
        })
    }
}

/// Key for a context entry: table, field (empty for table-level), context type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextKey {
    pub table: String,
    pub field: String,
    pub context_type: ContextType,
}

#[derive(Debug, Clone)]
pub struct TenantCredentials {
    pub name: String,
    pub host: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub verify_tls: bool,
    pub timeout_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_key_falls_back_to_literal_name() {
        let t = TableDescriptor::new("Invoices");
        assert_eq!(t.primary_key_field(), "PrimaryKey");
    }

    #[test]
    fn primary_key_uses_flagged_field() {
        let mut t = TableDescriptor::new("Invoices");
        let mut f = FieldDescriptor::new("_kp_InvoiceID", SemanticType::Number, Tier::Key);
        f.is_pk = true;
        t.fields.insert(f.name.clone(), f);
        assert_eq!(t.primary_key_field(), "_kp_InvoiceID");
    }

    #[test]
    fn context_type_round_trips_through_str() {
        for ct in [
            ContextType::FieldValues,
            ContextType::ValueMap,
            ContextType::CacheConfig,
            ContextType::RuleOverride,
        ] {
            assert_eq!(ContextType::parse(ct.as_str()), Some(ct));
        }
    }
}
