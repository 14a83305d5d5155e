//! MCP server implementation and tool registration
//!
//! Implements the `ServerHandler` trait and assembles the tool router from
//! three groups: email read tools, email write tools, and submission tools.
//! Write tools are left out entirely when the server runs read-only.

use std::time::Instant;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::model::{CallToolResult, Content, ErrorData, ServerCapabilities, ServerInfo};
use rmcp::{ServerHandler, tool_handler};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::errors::{AppResult, format_error};
use crate::jmap::JmapClient;

/// JMAP MCP server
///
/// Holds the account-scoped JMAP client and the read-only flag, both fixed
/// for the life of the process. Tool handlers live in [`crate::email`] and
/// [`crate::submission`].
#[derive(Clone)]
pub struct JmapMcpServer {
    /// Account-scoped JMAP client
    pub(crate) client: JmapClient,
    /// Whether mutating email tools were omitted at registration
    pub(crate) read_only: bool,
    /// Tool router for dispatching MCP tool calls
    tool_router: ToolRouter<Self>,
}

impl JmapMcpServer {
    /// Create a new MCP server instance and register its tools
    ///
    /// `mark_emails`, `move_emails`, and `delete_emails` are registered only
    /// when `read_only` is false; every other tool is always registered.
    pub fn new(client: JmapClient, read_only: bool) -> Self {
        let mut tool_router = Self::email_read_router() + Self::submission_router();
        if !read_only {
            tool_router = tool_router + Self::email_write_router();
        }
        info!(
            account_id = client.account_id(),
            read_only,
            tools = tool_router.list_all().len(),
            "tools registered"
        );
        Self {
            client,
            read_only,
            tool_router,
        }
    }
}

/// MCP server handler implementation
///
/// Provides server info and capabilities to MCP client.
#[tool_handler(router = self.tool_router)]
impl ServerHandler for JmapMcpServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = if self.read_only {
            "JMAP email MCP server (read-only). Search, read, and send email; mark, move, and delete tools are disabled."
        } else {
            "JMAP email MCP server. Search, read, mark, move, delete, send, and reply to email."
        };
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_instructions(instructions)
    }
}

/// Milliseconds elapsed since `started`, saturating at `u64::MAX`
pub(crate) fn duration_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

/// Build the text envelope returned by every tool
///
/// Success payloads are pretty-printed JSON. Failures become
/// `"<label>: <message>"`. Both are returned as a successful tool call with a
/// single text item, so the MCP layer always receives a well-formed result.
pub(crate) fn finalize_tool(
    tool: &str,
    label: &str,
    started: Instant,
    result: AppResult<Value>,
) -> Result<CallToolResult, ErrorData> {
    let duration_ms = duration_ms(started);
    let text = match result {
        Ok(data) => {
            debug!(tool, duration_ms, "tool call succeeded");
            serde_json::to_string_pretty(&data)
                .unwrap_or_else(|e| format!("{label}: serialization failure: {e}"))
        }
        Err(e) => {
            warn!(tool, duration_ms, code = e.code(), error = %e, "tool call failed");
            format!("{label}: {}", format_error(&e))
        }
    };
    Ok(CallToolResult::success(vec![Content::text(text)]))
}
