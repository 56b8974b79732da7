//! Schema store: tables, fields, annotations, and operational context (§4.3).
//!
//! Lookups never raise; missing entries return sentinel-empty values (§7).

use std::collections::{HashMap, HashSet};

use crate::types::{CachePolicy, ContextKey, ContextType, TableDescriptor};

/// Tri-state cache of "is the server-side DDL script available?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptAvailability {
    #[default]
    Unknown,
    Available,
    Unavailable,
}

#[derive(Debug, Default)]
pub struct SchemaStore {
    context: HashMap<ContextKey, String>,
    tables: HashMap<String, TableDescriptor>,
    exposed_tables: HashSet<String>,
    script_available: ScriptAvailability,
    bootstrap_error: Option<String>,
}

impl SchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all process-wide state, as happens on tenant switch (§4.8).
    pub fn clear(&mut self) {
        self.context.clear();
        self.tables.clear();
        self.exposed_tables.clear();
        self.script_available = ScriptAvailability::Unknown;
        self.bootstrap_error = None;
    }

    pub fn script_availability(&self) -> ScriptAvailability {
        self.script_available
    }

    pub fn set_script_availability(&mut self, available: ScriptAvailability) {
        self.script_available = available;
    }

    pub fn bootstrap_error(&self) -> Option<&str> {
        self.bootstrap_error.as_deref()
    }

    pub fn set_bootstrap_error(&mut self, message: impl Into<String>) {
        self.bootstrap_error = Some(message.into());
    }

    pub fn exposed_tables(&self) -> &HashSet<String> {
        &self.exposed_tables
    }

    pub fn set_exposed_tables(&mut self, names: impl IntoIterator<Item = String>) {
        self.exposed_tables = names.into_iter().collect();
    }

    pub fn merge_exposed_tables(&mut self, names: impl IntoIterator<Item = String>) {
        self.exposed_tables.extend(names);
    }

    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.get(name)
    }

    pub fn upsert_table(&mut self, table: TableDescriptor) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    /// Bulk replace the context map (used after bootstrap step 6).
    pub fn replace_context(&mut self, entries: impl IntoIterator<Item = (ContextKey, String)>) {
        self.context = entries.into_iter().collect();
    }

    pub fn upsert_context(&mut self, key: ContextKey, value: String) {
        self.context.insert(key, value);
    }

    pub fn remove_context(&mut self, key: &ContextKey) {
        self.context.remove(key);
    }

    pub fn context_value(&self, key: &ContextKey) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }

    /// All context entries for a (table, field) pair, across context types,
    /// joined for display with `; ` at the call site.
    pub fn field_context(&self, table: &str, field: &str) -> Vec<&str> {
        let mut hints: Vec<(&ContextType, &str)> = self
            .context
            .iter()
            .filter(|(k, _)| k.table == table && k.field == field)
            .map(|(k, v)| (&k.context_type, v.as_str()))
            .collect();
        hints.sort_by_key(|(ct, _)| ct.as_str());
        hints.into_iter().map(|(_, v)| v).collect()
    }

    /// All context entries scoped to a table, across every field.
    pub fn table_context(&self, table: &str) -> Vec<&ContextKey> {
        let mut keys: Vec<&ContextKey> = self.context.keys().filter(|k| k.table == table).collect();
        keys.sort_by(|a, b| (a.field.as_str(), a.context_type.as_str()).cmp(&(b.field.as_str(), b.context_type.as_str())));
        keys
    }

    /// Resolve a table's cache policy from its `cache_config` context entries (§4.3).
    pub fn cache_policy(&self, table: &str) -> CachePolicy {
        for (key, value) in &self.context {
            if key.table != table || key.context_type != ContextType::CacheConfig {
                continue;
            }
            if key.field.is_empty() && value == "cache_all" {
                return CachePolicy::CacheAll;
            }
            if !key.field.is_empty() && value == "date_key" {
                return CachePolicy::DateRange { date_field: key.field.clone() };
            }
        }
        CachePolicy::None
    }

    pub fn primary_key_field(&self, table: &str) -> String {
        self.table(table).map(|t| t.primary_key_field()).unwrap_or_else(|| "PrimaryKey".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldDescriptor, SemanticType, Tier};

    fn ctx(table: &str, field: &str, ct: ContextType) -> ContextKey {
        ContextKey { table: table.into(), field: field.into(), context_type: ct }
    }

    #[test]
    fn cache_policy_defaults_to_none() {
        let store = SchemaStore::new();
        assert_eq!(store.cache_policy("Invoices"), CachePolicy::None);
    }

    #[test]
    fn cache_policy_date_range_from_context() {
        let mut store = SchemaStore::new();
        store.upsert_context(ctx("Invoices", "ServiceDate", ContextType::CacheConfig), "date_key".into());
        assert_eq!(store.cache_policy("Invoices"), CachePolicy::DateRange { date_field: "ServiceDate".into() });
    }

    #[test]
    fn cache_policy_cache_all_from_context() {
        let mut store = SchemaStore::new();
        store.upsert_context(ctx("Lookups", "", ContextType::CacheConfig), "cache_all".into());
        assert_eq!(store.cache_policy("Lookups"), CachePolicy::CacheAll);
    }

    #[test]
    fn primary_key_field_falls_back_when_table_unknown() {
        let store = SchemaStore::new();
        assert_eq!(store.primary_key_field("Ghost"), "PrimaryKey");
    }

    #[test]
    fn primary_key_field_uses_descriptor_flag() {
        let mut store = SchemaStore::new();
        let mut table = TableDescriptor::new("Invoices");
        let mut field = FieldDescriptor::new("_kp_InvoiceID", SemanticType::Number, Tier::Key);
        field.is_pk = true;
        table.fields.insert(field.name.clone(), field);
        store.upsert_table(table);
        assert_eq!(store.primary_key_field("Invoices"), "_kp_InvoiceID");
    }

    #[test]
    fn clear_resets_everything() {
        let mut store = SchemaStore::new();
        store.upsert_context(ctx("T", "", ContextType::CacheConfig), "cache_all".into());
        store.set_exposed_tables(["T".to_string()]);
        store.set_script_availability(ScriptAvailability::Available);
        store.clear();
        assert_eq!(store.cache_policy("T"), CachePolicy::None);
        assert!(store.exposed_tables().is_empty());
        assert_eq!(store.script_availability(), ScriptAvailability::Unknown);
    }

    #[test]
    fn field_context_joins_across_types_sorted() {
        let mut store = SchemaStore::new();
        store.upsert_context(ctx("Invoices", "Status", ContextType::FieldValues), "1=paid".into());
        store.upsert_context(ctx("Invoices", "Status", ContextType::SyntaxRule), "no ne support".into());
        let hints = store.field_context("Invoices", "Status");
        assert_eq!(hints, vec!["1=paid", "no ne support"]);
    }
}
