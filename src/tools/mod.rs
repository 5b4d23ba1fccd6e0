//! Tools the agent can call: web search and image download.

mod assets;
mod web;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

pub use assets::{classify_mime, Asset, FetchError, FetchImage, ImageKind, MAX_IMAGE_BYTES};
pub use web::{compact_search_response, WebSearch};

/// A tool the agent can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> Value;

    /// Run the tool. `workspace` is the run's output directory.
    async fn execute(&self, args: Value, workspace: &Path) -> anyhow::Result<String>;
}

/// Name and description, for prompts.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// Tools available to the agent, keyed by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    /// Registry with `web_search` (Tavily) and `fetch_image`.
    pub fn new(tavily_api_key: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self::with_tools(vec![
            Arc::new(WebSearch::new(tavily_api_key)?),
            Arc::new(FetchImage::new()?),
        ]))
    }

    pub fn with_tools(tools: Vec<Arc<dyn Tool>>) -> Self {
        let mut registry = Self::default();
        for tool in tools {
            registry.register(tool);
        }
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect()
    }

    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        workspace: &Path,
    ) -> anyhow::Result<String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("Tool '{}' not found", name))?;
        tool.execute(args, workspace).await
    }
}

/// Object keys accepted as the tool input, in order of preference.
const INPUT_KEYS: [&str; 2] = ["query", "url"];

/// Read the single string input a tool takes.
///
/// `"rust"`, `{"query": "rust"}` and `{"url": "rust"}` all yield `rust`, for
/// either tool; any other non-null value yields its JSON text.
pub(crate) fn string_arg(args: &Value) -> Option<String> {
    let value = match args {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Object(map) => match INPUT_KEYS
            .iter()
            .find_map(|key| map.get(*key).filter(|v| !v.is_null()))
        {
            Some(Value::String(s)) => Some(s.trim().to_string()),
            Some(other) => Some(other.to_string()),
            None => Some(args.to_string()),
        },
        other => Some(other.to_string()),
    };
    value.filter(|s| !s.is_empty())
}
