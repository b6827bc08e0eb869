/// MCP Server setup using `rmcp` with stdio transport.
use crate::context::AppContext;
use crate::mcp::tools::AppTools;
use anyhow::{Context, Result};
use rmcp::{ServiceExt, handler::server::router::Router, transport::io::stdio};
use std::sync::Arc;
use tracing::info;

/// MCP Server wrapping the shared context and serving via stdio.
#[derive(Clone)]
pub struct McpServer {
    pub ctx: Arc<AppContext>,
}

impl McpServer {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// Start the MCP server on stdio transport (blocks until the client disconnects).
    pub async fn start(self) -> Result<()> {
        info!("Starting MCP server on stdio...");
        let (stdin, stdout) = stdio();

        let app_tools = AppTools::new(self.ctx.clone());
        let router = Router::new(app_tools.clone()).with_tools(app_tools.tool_router.clone());

        let service = router
            .serve((stdin, stdout))
            .await
            .context("MCP Server failed to start on stdio transport")?;
        service
            .waiting()
            .await
            .context("MCP Server encountered an error during stdio transport")?;

        Ok(())
    }
}
