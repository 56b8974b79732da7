//! Composition root: wires the schema store, table cache, datasets, and the
//! active tenant's remote client behind the handful of operations exposed
//! to callers (§4.6, §4.7, §4.8).

use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::analytics::{self, AnalyzeParams, DatasetStore};
use crate::bootstrap;
use crate::bounds;
use crate::cache::{CacheEntry, Record, TableCache};
use crate::client::RemoteClient;
use crate::credentials::CredentialProvider;
use crate::dates;
use crate::error::BridgeError;
use crate::query;
use crate::schema_store::SchemaStore;
use crate::shaper;
use crate::types::{CachePolicy, ContextKey, ContextType, TableDescriptor};

const PAGE_SIZE: u32 = 10_000;

pub struct Engine {
    credentials: Box<dyn CredentialProvider>,
    schema: RwLock<SchemaStore>,
    cache: TableCache,
    datasets: DatasetStore,
    client: RwLock<Option<RemoteClient>>,
    active_tenant: RwLock<Option<String>>,
    row_cap: usize,
}

impl Engine {
    pub fn new(credentials: Box<dyn CredentialProvider>) -> Self {
        Self::with_row_cap(credentials, crate::cache::DEFAULT_ROW_CAP)
    }

    pub fn with_row_cap(credentials: Box<dyn CredentialProvider>, row_cap: usize) -> Self {
        Self {
            credentials,
            schema: RwLock::new(SchemaStore::new()),
            cache: TableCache::new(),
            datasets: DatasetStore::new(),
            client: RwLock::new(None),
            active_tenant: RwLock::new(None),
            row_cap,
        }
    }

    /// Build an engine already "connected" to a given client, skipping
    /// credential resolution and bootstrap, so tests can mock the remote
    /// side directly.
    #[cfg(test)]
    fn for_test(client: RemoteClient) -> Self {
        struct NoCredentials;
        impl CredentialProvider for NoCredentials {
            fn list_tenant_names(&self) -> Vec<String> {
                Vec::new()
            }
            fn get_credentials(&self, _name: &str) -> Option<crate::types::TenantCredentials> {
                None
            }
            fn default_tenant_name(&self) -> Option<String> {
                None
            }
        }
        Self {
            credentials: Box::new(NoCredentials),
            schema: RwLock::new(SchemaStore::new()),
            cache: TableCache::new(),
            datasets: DatasetStore::new(),
            client: RwLock::new(Some(client)),
            active_tenant: RwLock::new(Some("test".to_string())),
            row_cap: crate::cache::DEFAULT_ROW_CAP,
        }
    }

    /// Connect to the provider's default tenant, if one can be resolved.
    pub async fn bootstrap_default_tenant(&self) -> Result<String, BridgeError> {
        let name = self.credentials.default_tenant_name().ok_or_else(|| BridgeError::Query {
            message: "no default tenant configured; call use_tenant explicitly".into(),
            field_hint: None,
        })?;
        self.use_tenant(&name).await
    }

    pub fn list_tenants(&self) -> Vec<String> {
        self.credentials.list_tenant_names()
    }

    /// Tenant controller: clear schema, clear cache, rebuild the HTTP
    /// client, run bootstrap against the new tenant (§4.8).
    pub async fn use_tenant(&self, name: &str) -> Result<String, BridgeError> {
        if self.active_tenant.read().await.as_deref() == Some(name) {
            return Ok(format!("Already using tenant '{name}'."));
        }

        let creds = self.credentials.get_credentials(name).ok_or_else(|| {
            let available = self.credentials.list_tenant_names().join(", ");
            BridgeError::NotFound { what: format!("tenant '{name}' (available: {available})") }
        })?;

        self.schema.write().await.clear();
        self.cache.flush_all();

        let new_client = RemoteClient::new(&creds)?;
        {
            let mut schema = self.schema.write().await;
            bootstrap::run(&new_client, &mut schema).await;
        }
        *self.client.write().await = Some(new_client);
        *self.active_tenant.write().await = Some(name.to_string());
        info!(tenant = name, "switched active tenant");
        Ok(format!("Switched to tenant '{name}'."))
    }

    async fn require_client(&self) -> Result<(), BridgeError> {
        if self.client.read().await.is_none() {
            return Err(BridgeError::Query { message: "no active tenant; call use_tenant first".into(), field_hint: None });
        }
        Ok(())
    }

    pub async fn list_tables(&self) -> String {
        let schema = self.schema.read().await;
        if let Some(err) = schema.bootstrap_error() {
            return format!("Error: bootstrap failed — {err}. Call use_tenant to retry.");
        }
        let curated = schema.table_names();
        let exposed = schema.exposed_tables();
        let mut discovered: Vec<&String> = exposed.iter().filter(|t| !curated.contains(t)).collect();
        discovered.sort();

        let mut out = String::new();
        if curated.is_empty() && discovered.is_empty() {
            return "No tables available. Call use_tenant to connect.".to_string();
        }
        if !curated.is_empty() {
            out.push_str("Tables with known schema:\n");
            for name in &curated {
                out.push_str(&format!("  {name}\n"));
            }
        }
        if !discovered.is_empty() {
            out.push_str("\nOther exposed tables (schema not yet parsed):\n");
            for name in discovered {
                out.push_str(&format!("  {name}\n"));
            }
        }
        out
    }

    pub async fn get_schema(&self, table: &str) -> String {
        let schema = self.schema.read().await;
        let Some(desc) = schema.table(table) else {
            return BridgeError::NotFound { what: format!("table '{table}'") }.to_message(Some(table));
        };
        let mut out = format!("Schema for {table}:\n");
        let mut fields: Vec<&String> = desc.fields.keys().collect();
        fields.sort();
        for name in fields {
            let f = &desc.fields[name];
            let mut flags = Vec::new();
            if f.is_pk {
                flags.push("PK");
            }
            if f.is_fk {
                flags.push("FK");
            }
            let flag_str = if flags.is_empty() { String::new() } else { format!(" [{}]", flags.join(",")) };
            out.push_str(&format!("  {name}: {:?} ({:?}){flag_str}\n", f.semantic_type, f.tier));
            let hints = schema.field_context(table, name);
            if !hints.is_empty() {
                out.push_str(&format!("    context: {}\n", hints.join("; ")));
            }
        }
        out
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn query(
        &self,
        table: &str,
        filter: &str,
        select: &str,
        orderby: &str,
        top: Option<u32>,
        skip: Option<u32>,
        period: Option<&str>,
    ) -> String {
        match self.query_inner(table, filter, select, orderby, top, skip, period).await {
            Ok(s) => s,
            Err(e) => e.to_message(Some(table)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn query_inner(
        &self,
        table: &str,
        filter: &str,
        select: &str,
        orderby: &str,
        top: Option<u32>,
        skip: Option<u32>,
        period: Option<&str>,
    ) -> Result<String, BridgeError> {
        self.require_client().await?;

        let (schema_desc, cache_policy, pk_field) = {
            let schema = self.schema.read().await;
            (schema.table(table).cloned(), schema.cache_policy(table), schema.primary_key_field(table))
        };

        let with_period = apply_period(filter, &cache_policy, period)?;
        let normalized_filter = shaper::normalize_dates_in_filter(&with_period);

        let guard = self.client.read().await;
        let client = guard.as_ref().expect("checked by require_client");

        let rows = match &cache_policy {
            CachePolicy::DateRange { date_field } => {
                let (requested_min, requested_max) = bounds::extract_date_range(&normalized_filter, date_field);
                let has_cache_entry = self.cache.get(table).is_some();
                if requested_min.is_none() && requested_max.is_none() && !has_cache_entry {
                    // Neither bound is present and nothing is cached yet: a
                    // full-table fetch here would be unbounded and the server
                    // would time out, so bypass the cache entirely.
                    return self.query_passthrough(client, table, &normalized_filter, select, orderby, top, skip, schema_desc.as_ref()).await;
                }
                self.query_date_range(client, table, date_field, &pk_field, &normalized_filter, schema_desc.as_ref()).await?
            }
            CachePolicy::CacheAll => self.query_cache_all(client, table, &pk_field, schema_desc.as_ref()).await?,
            CachePolicy::None => {
                return self.query_passthrough(client, table, &normalized_filter, select, orderby, top, skip, schema_desc.as_ref()).await;
            }
        };
        drop(guard);

        let mut filtered: Vec<Record> = rows.into_iter().filter(|r| query::matches_filter(&normalized_filter, r)).collect();
        if !orderby.is_empty() {
            query::apply_orderby(&mut filtered, orderby);
        }
        let total = filtered.len();
        let skip_n = skip.unwrap_or(0) as usize;
        let top_n = query::clamp_top(top) as usize;
        let page: Vec<Record> = filtered.into_iter().skip(skip_n).take(top_n).collect();
        let projected = if select.trim().is_empty() { page } else { query::apply_select(&page, select) };

        let base = query::format_records(&projected, table, Some(total as i64));
        let schema = self.schema.read().await;
        let cached = self.cache.get(table).map(|e: CacheEntry| (e.rows.len(), e.date_bounds()));
        Ok(query::enrich(&base, &projected, table, &schema, cached))
    }

    async fn query_passthrough(
        &self,
        client: &RemoteClient,
        table: &str,
        filter: &str,
        select: &str,
        orderby: &str,
        top: Option<u32>,
        skip: Option<u32>,
        schema: Option<&TableDescriptor>,
    ) -> Result<String, BridgeError> {
        let remote_filter = shaper::quote_fields_in_filter(filter);
        let remote_select = shaper::quote_fields_in_select(select);
        let remote_orderby = shaper::quote_fields_in_orderby(orderby);
        let top_s = query::clamp_top(top).to_string();
        let skip_s = skip.unwrap_or(0).to_string();

        let mut params: Vec<(&str, &str)> = vec![("$top", &top_s), ("$skip", &skip_s)];
        if !remote_filter.is_empty() {
            params.push(("$filter", &remote_filter));
        }
        if !remote_select.is_empty() {
            params.push(("$select", &remote_select));
        }
        if !remote_orderby.is_empty() {
            params.push(("$orderby", &remote_orderby));
        }

        let body = client.get(table, &params).await?;
        let json_rows = body.get("value").and_then(Value::as_array).cloned().unwrap_or_default();
        let records = query::json_rows_to_records(&json_rows, schema);
        Ok(query::format_records(&records, table, None))
    }

    async fn query_date_range(
        &self,
        client: &RemoteClient,
        table: &str,
        date_field: &str,
        pk_field: &str,
        filter: &str,
        schema: Option<&TableDescriptor>,
    ) -> Result<Vec<Record>, BridgeError> {
        let (requested_min, requested_max) = bounds::extract_date_range(filter, date_field);
        let existing = self.cache.get(table).and_then(|e| e.date_bounds());
        let mut gaps = crate::cache::compute_date_gaps(existing, requested_min, requested_max);
        let today = Utc::now().date_naive();
        gaps = crate::cache::apply_today_refresh(gaps, existing, requested_max, today);

        for (lo, hi) in &gaps {
            let gap_filter = match (lo, hi) {
                (Some(a), Some(b)) => dates::build_period_filter(date_field, *a, *b),
                (Some(a), None) => format!("{date_field} ge {a}"),
                (None, Some(b)) => format!("{date_field} le {b}"),
                (None, None) => String::new(),
            };
            let remote_filter = if gap_filter.is_empty() { None } else { Some(shaper::quote_fields_in_filter(&gap_filter)) };

            match self.fetch_all(client, table, remote_filter.as_deref(), schema).await {
                Ok(rows) => self.cache.merge_into_with_cap(table, pk_field, Some(date_field.to_string()), rows, self.row_cap),
                Err(e) => {
                    warn!(error = %e, table, "gap fetch failed, falling back to direct remote call");
                    let remote_filter_full = shaper::quote_fields_in_filter(filter);
                    let direct = self.fetch_all(client, table, Some(&remote_filter_full), schema).await?;
                    return Ok(direct);
                }
            }
        }

        Ok(self.cache.get(table).map(|e| e.rows).unwrap_or_default())
    }

    async fn query_cache_all(&self, client: &RemoteClient, table: &str, pk_field: &str, schema: Option<&TableDescriptor>) -> Result<Vec<Record>, BridgeError> {
        if self.cache.get(table).is_none() {
            let rows = self.fetch_all(client, table, None, schema).await?;
            self.cache.merge_into_with_cap(table, pk_field, None, rows, self.row_cap);
        }
        Ok(self.cache.get(table).map(|e| e.rows).unwrap_or_default())
    }

    /// Fetch every page of `table` (optionally filtered), paginating in
    /// chunks of 10,000 rows (§4.5, §4.6).
    async fn fetch_all(&self, client: &RemoteClient, table: &str, filter: Option<&str>, schema: Option<&TableDescriptor>) -> Result<Vec<Record>, BridgeError> {
        let mut out = Vec::new();
        let mut skip = 0u32;
        loop {
            let top_s = PAGE_SIZE.to_string();
            let skip_s = skip.to_string();
            let mut params: Vec<(&str, &str)> = vec![("$top", &top_s), ("$skip", &skip_s)];
            if let Some(f) = filter {
                params.push(("$filter", f));
            }
            let body = client.get(table, &params).await?;
            let json_rows = body.get("value").and_then(Value::as_array).cloned().unwrap_or_default();
            let n = json_rows.len();
            out.extend(query::json_rows_to_records(&json_rows, schema));
            if n < PAGE_SIZE as usize {
                break;
            }
            skip += PAGE_SIZE;
        }
        Ok(out)
    }

    pub async fn get_record(&self, table: &str, pk_value: &str) -> String {
        let pk_field = self.schema.read().await.primary_key_field(table);
        let filter = format!("{pk_field} eq {pk_value}");
        match self.query_inner(table, &filter, "", "", Some(1), None, None).await {
            Ok(s) => s,
            Err(e) => e.to_message(Some(table)),
        }
    }

    pub async fn count_records(&self, table: &str, filter: &str) -> String {
        match self.count_records_inner(table, filter).await {
            Ok(n) => format!("{table}: {n} record(s) match."),
            Err(e) => e.to_message(Some(table)),
        }
    }

    async fn count_records_inner(&self, table: &str, filter: &str) -> Result<i64, BridgeError> {
        self.require_client().await?;
        let pk_field = self.schema.read().await.primary_key_field(table);
        let normalized = shaper::normalize_dates_in_filter(filter);
        let remote_filter = shaper::quote_fields_in_filter(&normalized);
        let remote_select = shaper::quote_fields_in_select(&pk_field);

        let guard = self.client.read().await;
        let client = guard.as_ref().expect("checked by require_client");

        let mut params: Vec<(&str, &str)> = vec![("$top", "1"), ("$count", "true"), ("$select", &remote_select)];
        if !remote_filter.is_empty() {
            params.push(("$filter", &remote_filter));
        }
        let body = client.get(table, &params).await?;
        let count = body
            .get("@odata.count")
            .or_else(|| body.get("@count"))
            .and_then(Value::as_i64)
            .ok_or_else(|| BridgeError::Unexpected { kind: "missing_count".into(), message: "server did not return a count".into() })?;
        Ok(count)
    }

    pub async fn load_dataset(&self, name: &str, table: &str, filter: &str) -> String {
        match self.load_dataset_inner(name, table, filter).await {
            Ok(n) => format!("Loaded {n} row(s) into dataset '{name}'."),
            Err(e) => e.to_message(Some(table)),
        }
    }

    async fn load_dataset_inner(&self, name: &str, table: &str, filter: &str) -> Result<usize, BridgeError> {
        self.require_client().await?;
        let schema_desc = self.schema.read().await.table(table).cloned();
        let normalized = shaper::normalize_dates_in_filter(filter);
        let remote_filter = if normalized.trim().is_empty() { None } else { Some(shaper::quote_fields_in_filter(&normalized)) };

        let guard = self.client.read().await;
        let client = guard.as_ref().expect("checked by require_client");
        let rows = self.fetch_all(client, table, remote_filter.as_deref(), schema_desc.as_ref()).await?;
        let n = rows.len();
        self.datasets.load(name, rows);
        Ok(n)
    }

    pub fn list_datasets(&self) -> Vec<String> {
        self.datasets.list()
    }

    pub fn flush_datasets(&self, name: Option<&str>) {
        match name {
            Some(n) => self.datasets.flush(n),
            None => self.datasets.flush_all(),
        }
    }

    pub async fn analyze(&self, source: &str, params: &AnalyzeParams) -> String {
        match self.analyze_inner(source, params).await {
            Ok(result) => {
                let base = query::format_records(&result.rows, source, None);
                base + &analytics::format_normalized_trailer(&result.normalized)
            }
            Err(e) => e.to_message(Some(source)),
        }
    }

    async fn analyze_inner(&self, source: &str, params: &AnalyzeParams) -> Result<analytics::AnalyzeResult, BridgeError> {
        let rows = match self.datasets.get(source) {
            Some(rows) => rows,
            None => match self.cache.get(source) {
                Some(entry) => entry.rows,
                None => {
                    return Err(BridgeError::NotFound {
                        what: format!("dataset or cached table '{source}' — call load_dataset or query first"),
                    });
                }
            },
        };
        let schema = self.schema.read().await;
        analytics::analyze(&rows, source, &schema, params)
    }

    pub async fn save_context(&self, table: &str, field: &str, context_type: &str, value: &str) -> String {
        let Some(ctype) = ContextType::parse(context_type) else {
            return format!("Error: unknown context type '{context_type}'.");
        };
        self.schema.write().await.upsert_context(ContextKey { table: table.to_string(), field: field.to_string(), context_type: ctype }, value.to_string());

        if let Ok(()) = self.require_client().await {
            let guard = self.client.read().await;
            let client = guard.as_ref().expect("checked above");
            let body = serde_json::json!({
                "TableName": table,
                "FieldName": field,
                "ContextType": context_type,
                "Context": value,
            });
            if let Err(e) = client.post(bootstrap::CONTEXT_TABLE, &body).await {
                warn!(error = %e, "failed to persist context remotely, kept locally only");
            }
        }
        format!("Saved {context_type} context for {table}.{field}.")
    }

    pub async fn delete_context(&self, table: &str, field: &str, context_type: &str) -> String {
        let Some(ctype) = ContextType::parse(context_type) else {
            return format!("Error: unknown context type '{context_type}'.");
        };
        self.schema.write().await.remove_context(&ContextKey { table: table.to_string(), field: field.to_string(), context_type: ctype });
        format!("Removed {context_type} context for {table}.{field}.")
    }
}

/// Resolve the convenience `period` parameter (§4.9) into a filter clause
/// scoped to the table's date-range cache-policy field, then AND it onto
/// the caller's own filter.
fn apply_period(filter: &str, cache_policy: &CachePolicy, period: Option<&str>) -> Result<String, BridgeError> {
    let Some(period) = period else { return Ok(filter.to_string()) };
    let CachePolicy::DateRange { date_field } = cache_policy else {
        return Err(BridgeError::Query {
            message: format!("period '{period}' requires a table with a date-range cache policy"),
            field_hint: None,
        });
    };
    let (start, end) = dates::resolve_period(period, Utc::now().date_naive())
        .ok_or_else(|| BridgeError::Query { message: format!("unknown period '{period}'"), field_hint: None })?;
    let period_filter = dates::build_period_filter(date_field, start, end);
    Ok(if filter.trim().is_empty() { period_filter } else { format!("{filter} and {period_filter}") })
}
