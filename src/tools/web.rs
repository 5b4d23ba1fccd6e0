//! Web search via the Tavily API.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use super::{string_arg, Tool};
use crate::llm::truncate;

const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";
const MAX_RESULTS: usize = 5;
const MAX_IMAGES: usize = 6;
const SNIPPET_CHARS: usize = 600;

/// Search the web and collect candidate images.
pub struct WebSearch {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
    include_images: bool,
    include_image_descriptions: bool,
}

impl<'a> SearchRequest<'a> {
    fn new(query: &'a str) -> Self {
        Self {
            query,
            max_results: MAX_RESULTS,
            search_depth: "basic",
            include_images: true,
            include_image_descriptions: true,
        }
    }
}

impl WebSearch {
    pub fn new(api_key: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; BlogAgent/1.0)")
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: TAVILY_SEARCH_URL.to_string(),
        })
    }
}

#[async_trait]
impl Tool for WebSearch {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web. Input: query string. Output: compact JSON {query, results, images} \
         with page snippets and image URLs."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value, _workspace: &Path) -> anyhow::Result<String> {
        let query =
            string_arg(&args).ok_or_else(|| anyhow::anyhow!("Missing 'query' argument"))?;

        tracing::info!("Searching the web: {}", query);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&SearchRequest::new(&query))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Search API error {}: {}",
                status,
                truncate(&body, 300)
            ));
        }

        let data: Value = response.json().await?;
        Ok(compact_search_response(&query, &data).to_string())
    }
}

/// Reduce a raw search response to `{query, results, images}`.
///
/// Keeps the first 5 results with snippets cut to 600 characters and the
/// first 6 images. Images may be bare URL strings or `{url, description}`.
pub fn compact_search_response(query: &str, data: &Value) -> Value {
    let str_field = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);

    let results: Vec<Value> = data
        .get("results")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .take(MAX_RESULTS)
                .map(|r| {
                    let content = str_field(r, "content").unwrap_or_default();
                    json!({
                        "title": str_field(r, "title"),
                        "url": str_field(r, "url"),
                        "content": truncate(&content, SNIPPET_CHARS),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let images: Vec<Value> = data
        .get("images")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .take(MAX_IMAGES)
                .map(|im| match im {
                    Value::String(url) => json!({"url": url, "description": ""}),
                    other => json!({
                        "url": str_field(other, "url"),
                        "description": str_field(other, "description").unwrap_or_default(),
                    }),
                })
                .collect()
        })
        .unwrap_or_default();

    json!({
        "query": query,
        "results": results,
        "images": images,
    })
}
