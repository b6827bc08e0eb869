/// MCP Tool handlers for sentirag.
///
/// 1. query      – ranked chunks for a natural-language question
/// 2. get_config – static configuration and chunk counts
use crate::context::AppContext;
use crate::retriever::RetrievalError;
use rmcp::handler::server::ServerHandler;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, handler::server::tool::ToolRouter, model::*, tool, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;

// ── Parameter structs ────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
pub struct QueryParams {
    /// Question about the customer feedback (natural language)
    pub query: String,
    /// Max results, 1 to 10 (default from config)
    pub top_k: Option<usize>,
    /// Minimum similarity score, 0.0 to 1.0 (default from config)
    pub min_score: Option<f64>,
}

// ── Response helpers ─────────────────────────────────────────────────

fn json_result<T: serde::Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("serialization failed: {e}"), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn error_result(msg: &str) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(msg.to_string())]))
}

// ── Tool implementations ─────────────────────────────────────────────

#[derive(Clone)]
pub struct AppTools {
    pub ctx: Arc<AppContext>,
    pub tool_router: ToolRouter<Self>,
}

impl ServerHandler for AppTools {}

#[tool_router]
impl AppTools {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    // ── Tool 1: query ───────────────────────────────────────────────

    #[tool(
        description = "Semantic search over the customer sentiment dataset. Returns up to top_k chunks scoring at least min_score, best first, each with its source record metadata."
    )]
    pub async fn query(&self, params: Parameters<QueryParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let (top_k, min_score) = match self.ctx.resolve_params(p.top_k, p.min_score) {
            Ok(resolved) => resolved,
            Err(e) => return error_result(&e.0),
        };

        let ctx = self.ctx.clone();
        let text = p.query.clone();
        let outcome = tokio::task::spawn_blocking(move || ctx.retriever.query(&text, top_k, min_score))
            .await
            .map_err(|e| McpError::internal_error(format!("query task failed: {e}"), None))?;

        match outcome {
            Ok(results) => json_result(&serde_json::json!({
                "query": p.query,
                "results": results,
            })),
            Err(e @ (RetrievalError::InvalidQuery | RetrievalError::NotReady)) => {
                error_result(&e.to_string())
            }
            Err(e) => Err(McpError::internal_error(format!("query failed: {e}"), None)),
        }
    }

    // ── Tool 2: get_config ──────────────────────────────────────────

    #[tool(description = "Show the dataset path, chunking parameters, chunk count and embedding model in use")]
    pub async fn get_config(&self) -> Result<CallToolResult, McpError> {
        json_result(&self.ctx.config_summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::index::VectorIndex;
    use crate::embedder::mock::MockEmbedder;

    fn make_tools(build: bool) -> (tempfile::TempDir, AppTools) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.csv");
        std::fs::write(
            &path,
            "Text,Sentiment\nGreat service,Positive\nApp keeps crashing,Negative\n",
        )
        .unwrap();
        let config = Config {
            dataset_path: path.to_string_lossy().into_owned(),
            vector_dir: None,
            ..Config::default()
        };
        let ctx = Arc::new(AppContext::new(
            config,
            Arc::new(VectorIndex::in_memory("mcp")),
            Arc::new(MockEmbedder::new(128)),
            None,
        ));
        if build {
            ctx.rebuild().unwrap();
        }
        (dir, AppTools::new(ctx))
    }

    fn params(query: &str, top_k: Option<usize>, min_score: Option<f64>) -> Parameters<QueryParams> {
        Parameters(QueryParams {
            query: query.to_string(),
            top_k,
            min_score,
        })
    }

    #[tokio::test]
    async fn test_query_tool() {
        let (_dir, tools) = make_tools(true);
        let result = tools
            .query(params("app crashing", Some(1), Some(0.0)))
            .await
            .unwrap();
        assert_ne!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn test_query_tool_reports_caller_errors() {
        let (_dir, tools) = make_tools(true);
        let result = tools.query(params("  ", None, None)).await.unwrap();
        assert_eq!(result.is_error, Some(true));

        let result = tools.query(params("x", Some(0), None)).await.unwrap();
        assert_eq!(result.is_error, Some(true));

        let (_dir, unbuilt) = make_tools(false);
        let result = unbuilt.query(params("service", None, None)).await.unwrap();
        assert_eq!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn test_get_config_tool() {
        let (_dir, tools) = make_tools(true);
        let result = tools.get_config().await.unwrap();
        assert_ne!(result.is_error, Some(true));
    }

    #[test]
    fn test_tools_registered() {
        let (_dir, tools) = make_tools(false);
        let names: Vec<String> = tools
            .tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        assert!(names.contains(&"query".to_string()));
        assert!(names.contains(&"get_config".to_string()));
    }
}
