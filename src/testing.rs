//! Test doubles for the LLM and the tools.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use image::RgbImage;
use serde_json::{json, Value};

use crate::llm::{CompletionOptions, LlmClient};
use crate::tools::{Asset, FetchError, Tool};

pub const VALID_DOC: &str = r#"{
  "title": "Retrieval-Augmented Generation",
  "subtitle": "Grounding language models in documents",
  "sections": [
    {
      "heading": "What is RAG",
      "paragraphs": ["RAG pairs a retriever with a generator."],
      "images": [{"asset_id": "img_0", "caption": "A typical RAG pipeline"}]
    },
    {"heading": "Retrieval", "paragraphs": ["Dense retrieval embeds queries and passages."]},
    {"heading": "Generation", "paragraphs": ["The generator conditions on retrieved passages."]}
  ],
  "references": [{"title": "RAG paper", "url": "https://arxiv.org/abs/2005.11401"}]
}"#;

/// LLM that replays canned replies and records the prompts it saw.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<anyhow::Result<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<anyhow::Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompt(&self, index: usize) -> String {
        self.prompts.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, prompt: &str, _options: CompletionOptions) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("no scripted reply")))
    }
}

/// `web_search` stand-in returning one result and the given image URLs.
#[derive(Default)]
pub struct FakeSearch {
    images: Vec<String>,
    fail: bool,
}

impl FakeSearch {
    pub fn with_images(urls: &[&str]) -> Self {
        Self {
            images: urls.iter().map(|u| u.to_string()).collect(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            images: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl Tool for FakeSearch {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn execute(&self, args: Value, _workspace: &Path) -> anyhow::Result<String> {
        if self.fail {
            return Err(anyhow::anyhow!("search backend unavailable"));
        }
        let images: Vec<Value> = self
            .images
            .iter()
            .map(|url| json!({"url": url, "description": ""}))
            .collect();
        Ok(json!({
            "query": args,
            "results": [{
                "title": "RAG paper",
                "url": "https://arxiv.org/abs/2005.11401",
                "content": concat!(
                    "Retrieval-augmented generation combines parametric ",
                    "and non-parametric memory."
                )
            }],
            "images": images,
        })
        .to_string())
    }
}

/// `fetch_image` stand-in writing small PNGs as `img_0`, `img_1`, ...
///
/// URLs ending in `.gif` fail like an unsupported content type.
#[derive(Default)]
pub struct FakeFetch {
    next: AtomicUsize,
}

#[async_trait]
impl Tool for FakeFetch {
    fn name(&self) -> &str {
        "fetch_image"
    }

    fn description(&self) -> &str {
        "Download an image"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn execute(&self, args: Value, workspace: &Path) -> anyhow::Result<String> {
        let url = crate::tools::string_arg(&args).unwrap_or_default();
        if url.ends_with(".gif") {
            return Err(FetchError::UnsupportedType("image/gif".to_string()).into());
        }

        let n = self.next.fetch_add(1, Ordering::SeqCst);
        let dir = workspace.join("assets");
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("img_{n}.png"));
        RgbImage::new(8, 4).save(&path)?;

        let asset = Asset {
            asset_id: format!("img_{n}"),
            path: path.canonicalize()?,
            source_url: url,
        };
        Ok(serde_json::to_string(&asset)?)
    }
}
