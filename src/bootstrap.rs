//! Bootstrap pipeline: discover tables, fetch DDL, reconcile, parse metadata
//! annotations, install schema, load operational context (§4.4).

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::RemoteClient;
use crate::ddl;
use crate::metadata::{self, FieldAnnotations};
use crate::schema_store::{SchemaStore, ScriptAvailability};
use crate::types::{ContextKey, ContextType, TableDescriptor};

pub const DDL_SCRIPT_NAME: &str = "SCR_DDL_GetTableDDL";
pub const CONTEXT_TABLE: &str = "TBL_DDL_Context";

/// Run all six bootstrap steps against a freshly-targeted tenant, installing
/// results into `store`. Step 1 failure aborts; every later step is
/// best-effort (§4.4).
pub async fn run(client: &RemoteClient, store: &mut SchemaStore) {
    store.clear();

    let step1_tables = match step1_discover(client).await {
        Ok(names) => names,
        Err(e) => {
            warn!(error = %e, "bootstrap step 1 failed");
            store.set_bootstrap_error(e);
            return;
        }
    };
    store.set_exposed_tables(step1_tables.clone());

    let ddl_text = match step2_fetch_ddl(client, store).await {
        Some(text) => text,
        None => {
            info!("bootstrap: DDL script unavailable, using service-document table list only");
            return;
        }
    };

    let base_tables = step3_reconcile(&ddl_text, &step1_tables);
    store.set_exposed_tables(base_tables.clone());

    let annotations = step4_metadata(client).await;

    step5_install_schema(store, &ddl_text, &annotations, &base_tables);

    step6_load_context(client, store).await;
}

async fn step1_discover(client: &RemoteClient) -> Result<Vec<String>, String> {
    let body = client
        .get("", &[("$format", "JSON")])
        .await
        .map_err(|e| e.to_message(None))?;
    Ok(parse_service_document(&body))
}

fn parse_service_document(body: &Value) -> Vec<String> {
    body.get("value")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| e.get("name").and_then(Value::as_str).map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

async fn step2_fetch_ddl(client: &RemoteClient, store: &mut SchemaStore) -> Option<String> {
    let body = serde_json::json!({ "scriptParameterValue": "" });
    match client.post(&format!("Script.{DDL_SCRIPT_NAME}"), &body).await {
        Ok(resp) => {
            store.set_script_availability(ScriptAvailability::Available);
            resp.get("scriptResult")
                .and_then(|r| r.get("resultParameter"))
                .and_then(Value::as_str)
                .map(str::to_string)
        }
        Err(e) => {
            debug!(error = %e, "DDL script call failed");
            store.set_script_availability(ScriptAvailability::Unavailable);
            None
        }
    }
}

fn step3_reconcile(ddl_text: &str, step1_tables: &[String]) -> Vec<String> {
    let base_tables = ddl::extract_table_names(ddl_text);
    if base_tables.is_empty() {
        return step1_tables.to_vec();
    }
    step1_tables.iter().filter(|t| base_tables.contains(*t)).cloned().collect()
}

async fn step4_metadata(client: &RemoteClient) -> HashMap<String, HashMap<String, FieldAnnotations>> {
    match client.get_metadata_xml().await {
        Ok(xml) => metadata::parse_metadata_annotations(&xml),
        Err(e) => {
            debug!(error = %e, "metadata fetch failed, continuing without annotations");
            HashMap::new()
        }
    }
}

fn step5_install_schema(
    store: &mut SchemaStore,
    ddl_text: &str,
    annotations: &HashMap<String, HashMap<String, FieldAnnotations>>,
    exposed: &[String],
) {
    let parsed = ddl::parse_ddl(ddl_text, annotations);
    for (table_name, fields) in parsed {
        if !exposed.contains(&table_name) {
            continue;
        }
        let mut table = TableDescriptor::new(table_name);
        table.fields = fields;
        store.upsert_table(table);
    }
}

async fn step6_load_context(client: &RemoteClient, store: &mut SchemaStore) {
    let params = [("$orderby", "TableName,FieldName")];
    let body = match client.get(CONTEXT_TABLE, &params).await {
        Ok(b) => b,
        Err(e) => {
            debug!(error = %e, "context table load failed, continuing with empty context");
            return;
        }
    };

    let Some(rows) = body.get("value").and_then(Value::as_array) else { return };
    let mut entries = Vec::new();
    for row in rows {
        let table = row.get("TableName").and_then(Value::as_str).unwrap_or_default();
        let field = row.get("FieldName").and_then(Value::as_str).unwrap_or_default();
        let ctype_str = row.get("ContextType").and_then(Value::as_str).unwrap_or_default();
        let value = row.get("Context").and_then(Value::as_str).unwrap_or_default();
        let Some(context_type) = ContextType::parse(ctype_str) else { continue };
        entries.push((
            ContextKey { table: table.to_string(), field: field.to_string(), context_type },
            value.to_string(),
        ));
    }
    store.replace_context(entries);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_service_document_names() {
        let body = serde_json::json!({
            "value": [{"name": "Invoices", "url": "Invoices"}, {"name": "Customers", "url": "Customers"}]
        });
        assert_eq!(parse_service_document(&body), vec!["Invoices".to_string(), "Customers".to_string()]);
    }

    #[test]
    fn reconcile_intersects_ddl_and_service_document() {
        let ddl = r#"CREATE TABLE "Invoices" ( "Field" varchar(10) );"#;
        let step1 = vec!["Invoices".to_string(), "Invoices_TO".to_string()];
        let result = step3_reconcile(ddl, &step1);
        assert_eq!(result, vec!["Invoices".to_string()]);
    }

    #[test]
    fn reconcile_falls_back_to_step1_when_ddl_has_no_tables() {
        let step1 = vec!["Invoices".to_string()];
        let result = step3_reconcile("", &step1);
        assert_eq!(result, step1);
    }

    #[test]
    fn install_schema_skips_tables_not_in_exposed_set() {
        let mut store = SchemaStore::new();
        let ddl = r#"
CREATE TABLE "Invoices" ( "_kp_ID" int );
CREATE TABLE "Hidden" ( "_kp_ID" int );
"#;
        step5_install_schema(&mut store, ddl, &HashMap::new(), &["Invoices".to_string()]);
        assert!(store.table("Invoices").is_some());
        assert!(store.table("Hidden").is_none());
    }
}
