//! Tool-call convenience layer over [`RpcClient::request`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use wsrpc_core::prelude::*;

use crate::client::RpcClient;

pub const TOOLS_CALL_METHOD: &str = "tools/call";
pub const TOOLS_LIST_METHOD: &str = "tools/list";

/// Result field that, when present, supersedes the raw result payload.
pub const STRUCTURED_CONTENT_FIELD: &str = "structuredContent";

/// One entry of a `tools/list` result.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
}

impl RpcClient {
    /// Invoke the remote tool `name` with `args`.
    ///
    /// Returns the result's `structuredContent` when the server provides one,
    /// otherwise the raw result.
    pub async fn call_tool(&self, name: &str, args: Value) -> Result<Value> {
        let result = self
            .request(TOOLS_CALL_METHOD, json!({ "name": name, "arguments": args }))
            .await?;
        Ok(normalize_tool_result(result))
    }

    /// [`call_tool`](Self::call_tool) followed by deserialization into `T`.
    pub async fn call_tool_as<T: DeserializeOwned>(&self, name: &str, args: Value) -> Result<T> {
        let value = self.call_tool(name, args).await?;
        serde_json::from_value(value)
            .with_context(|| format!("Unexpected result from tool '{name}'"))
    }

    /// List the tools the server exposes.
    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        let result = self.request(TOOLS_LIST_METHOD, json!({})).await?;
        parse_tool_list(result)
    }
}

/// Prefer `structuredContent` over the raw result when it is present and
/// not null.
pub fn normalize_tool_result(mut result: Value) -> Value {
    let has_structured = result
        .get(STRUCTURED_CONTENT_FIELD)
        .is_some_and(|v| !v.is_null());
    if has_structured {
        if let Some(structured) = result.get_mut(STRUCTURED_CONTENT_FIELD) {
            return structured.take();
        }
    }
    result
}

fn parse_tool_list(mut result: Value) -> Result<Vec<ToolInfo>> {
    let tools = match result.get_mut("tools") {
        Some(tools) => tools.take(),
        None => return Ok(Vec::new()),
    };
    Ok(serde_json::from_value(tools)?)
}
