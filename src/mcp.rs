//! Thin MCP tool-call wrapper around `Engine`. No business logic lives
//! here — every handler parses its request, calls one `Engine` method,
//! and wraps the resulting text.

use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::analytics::AnalyzeParams;
use crate::engine::Engine;

fn ok_text(text: String) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TableRequest {
    pub table: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct QueryRequest {
    pub table: String,
    #[serde(default)]
    pub filter: String,
    #[serde(default)]
    pub select: String,
    #[serde(default)]
    pub orderby: String,
    pub top: Option<u32>,
    pub skip: Option<u32>,
    /// Named convenience range (e.g. `"wtd"`, `"mtd"`) applied on top of
    /// `filter` for tables with a date-range cache policy.
    pub period: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetRecordRequest {
    pub table: String,
    pub primary_key: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CountRequest {
    pub table: String,
    #[serde(default)]
    pub filter: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LoadDatasetRequest {
    pub name: String,
    pub table: String,
    #[serde(default)]
    pub filter: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AnalyzeRequest {
    pub source: String,
    #[serde(default)]
    pub groupby: Vec<String>,
    pub aggregate: Option<String>,
    pub period: Option<String>,
    pub pivot: Option<String>,
    pub sort: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FlushDatasetRequest {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ContextRequest {
    pub table: String,
    #[serde(default)]
    pub field: String,
    pub context_type: String,
    pub value: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TenantRequest {
    pub name: String,
}

#[derive(Clone)]
pub struct BridgeMcpServer {
    engine: Arc<Engine>,
    tool_router: ToolRouter<BridgeMcpServer>,
}

#[tool_router]
impl BridgeMcpServer {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine, tool_router: Self::tool_router() }
    }

    #[tool(description = "List tables exposed by the active FileMaker tenant")]
    async fn list_tables(&self) -> Result<CallToolResult, McpError> {
        ok_text(self.engine.list_tables().await)
    }

    #[tool(description = "Get the field schema and context notes for one table")]
    async fn get_schema(&self, Parameters(req): Parameters<TableRequest>) -> Result<CallToolResult, McpError> {
        ok_text(self.engine.get_schema(&req.table).await)
    }

    #[tool(description = "Query records from a table with an OData-style filter/select/orderby")]
    async fn query(&self, Parameters(req): Parameters<QueryRequest>) -> Result<CallToolResult, McpError> {
        ok_text(self.engine.query(&req.table, &req.filter, &req.select, &req.orderby, req.top, req.skip, req.period.as_deref()).await)
    }

    #[tool(description = "Fetch a single record by primary key")]
    async fn get_record(&self, Parameters(req): Parameters<GetRecordRequest>) -> Result<CallToolResult, McpError> {
        ok_text(self.engine.get_record(&req.table, &req.primary_key).await)
    }

    #[tool(description = "Count records matching an optional filter")]
    async fn count_records(&self, Parameters(req): Parameters<CountRequest>) -> Result<CallToolResult, McpError> {
        ok_text(self.engine.count_records(&req.table, &req.filter).await)
    }

    #[tool(description = "Load a named, in-memory dataset from a table query for later analysis")]
    async fn load_dataset(&self, Parameters(req): Parameters<LoadDatasetRequest>) -> Result<CallToolResult, McpError> {
        ok_text(self.engine.load_dataset(&req.name, &req.table, &req.filter).await)
    }

    #[tool(description = "List currently loaded named datasets")]
    async fn list_datasets(&self) -> Result<CallToolResult, McpError> {
        ok_text(self.engine.list_datasets().join("\n"))
    }

    #[tool(description = "Flush one named dataset, or all of them when no name is given")]
    async fn flush_datasets(&self, Parameters(req): Parameters<FlushDatasetRequest>) -> Result<CallToolResult, McpError> {
        self.engine.flush_datasets(req.name.as_deref());
        ok_text("Flushed.".to_string())
    }

    #[tool(description = "Run a groupby/aggregate/pivot/time-series analysis over a dataset or cached table")]
    async fn analyze(&self, Parameters(req): Parameters<AnalyzeRequest>) -> Result<CallToolResult, McpError> {
        let params = AnalyzeParams {
            groupby: req.groupby,
            aggregate: req.aggregate,
            period: req.period,
            pivot: req.pivot,
            sort: req.sort,
            limit: req.limit,
        };
        ok_text(self.engine.analyze(&req.source, &params).await)
    }

    #[tool(description = "Save a context note (field values, syntax rule, value map, ...) for a table/field")]
    async fn save_context(&self, Parameters(req): Parameters<ContextRequest>) -> Result<CallToolResult, McpError> {
        let value = req.value.unwrap_or_default();
        ok_text(self.engine.save_context(&req.table, &req.field, &req.context_type, &value).await)
    }

    #[tool(description = "Delete a previously saved context note")]
    async fn delete_context(&self, Parameters(req): Parameters<ContextRequest>) -> Result<CallToolResult, McpError> {
        ok_text(self.engine.delete_context(&req.table, &req.field, &req.context_type).await)
    }

    #[tool(description = "List configured tenant names")]
    async fn list_tenants(&self) -> Result<CallToolResult, McpError> {
        ok_text(self.engine.list_tenants().join("\n"))
    }

    #[tool(description = "Switch the active tenant, clearing schema and cache and re-running bootstrap")]
    async fn use_tenant(&self, Parameters(req): Parameters<TenantRequest>) -> Result<CallToolResult, McpError> {
        match self.engine.use_tenant(&req.name).await {
            Ok(msg) => ok_text(msg),
            Err(e) => ok_text(e.to_message(None)),
        }
    }
}

#[tool_handler]
impl ServerHandler for BridgeMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "fm-bridge".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            instructions: Some(
                "Read-only access to a FileMaker database via OData. Call list_tables first, then get_schema before filtering unfamiliar fields.".into(),
            ),
            ..Default::default()
        }
    }
}
