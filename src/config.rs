//! Configuration management for blog-agent.
//!
//! Configuration can be set via environment variables:
//! - `GROQ_API_KEY` - Required. API key for the LLM provider.
//! - `GROQ_MODEL` - Optional. Chat model. Defaults to `llama-3.3-70b-versatile`.
//! - `GROQ_BASE_URL` - Optional. OpenAI-compatible API base. Defaults to Groq.
//! - `TAVILY_API_KEY` - Required. API key for web search.
//! - `OUTPUT_DIR` - Optional. Where the document and assets go. Defaults to `output`.
//! - `MAX_TOOL_STEPS` - Optional. Tool steps before the agent must finish. Defaults to `6`.
//! - `MAX_ITERATIONS` - Optional. Hard cap on reason/act rounds. Defaults to `30`.
//! - `LLM_TIMEOUT_SECS` - Optional. LLM request timeout. Defaults to `60`.
//!
//! Variables not set in the environment are read from `.env` in the working
//! directory, if present.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// LLM API key
    pub llm_api_key: String,

    /// LLM model identifier
    pub model: String,

    /// OpenAI-compatible base URL
    pub llm_base_url: String,

    /// Per-request LLM timeout
    pub llm_timeout: Duration,

    /// Web search API key
    pub tavily_api_key: String,

    /// Output directory; downloaded images go to `<output_dir>/assets`
    pub output_dir: PathBuf,

    /// Tool steps allowed before a forced finish
    pub max_tool_steps: usize,

    /// Maximum reason/act rounds
    pub max_iterations: usize,

    /// Images fetched automatically after each search
    pub max_images: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `GROQ_API_KEY` or
    /// `TAVILY_API_KEY` is not set, and `ConfigError::InvalidValue` if a
    /// numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_file(Path::new(".env"))
    }

    /// Load from the environment, falling back to a dotenv file for unset
    /// variables. A missing or unreadable file is ignored.
    pub fn from_env_with_file(path: &Path) -> Result<Self, ConfigError> {
        let file = read_dotenv(path);
        Self::from_lookup(|name| std::env::var(name).ok().or_else(|| file.get(name).cloned()))
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
        };

        let llm_api_key = required("GROQ_API_KEY")?;
        let tavily_api_key = required("TAVILY_API_KEY")?;

        let model = lookup("GROQ_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let llm_base_url = lookup("GROQ_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let output_dir = lookup("OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("output"));

        let max_tool_steps = parse_var(&lookup, "MAX_TOOL_STEPS", 6)?;
        let max_iterations = parse_var(&lookup, "MAX_ITERATIONS", 30)?;
        let llm_timeout = Duration::from_secs(parse_var(&lookup, "LLM_TIMEOUT_SECS", 60)?);

        Ok(Self {
            llm_api_key,
            model,
            llm_base_url,
            llm_timeout,
            tavily_api_key,
            output_dir,
            max_tool_steps,
            max_iterations,
            max_images: 2,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(llm_api_key: String, tavily_api_key: String, output_dir: PathBuf) -> Self {
        Self {
            llm_api_key,
            model: DEFAULT_MODEL.to_string(),
            llm_base_url: DEFAULT_BASE_URL.to_string(),
            llm_timeout: Duration::from_secs(60),
            tavily_api_key,
            output_dir,
            max_tool_steps: 6,
            max_iterations: 30,
            max_images: 2,
        }
    }

    /// Default path of the rendered document.
    pub fn default_output_path(&self) -> PathBuf {
        self.output_dir.join("blog.docx")
    }
}

fn read_dotenv(path: &Path) -> HashMap<String, String> {
    match dotenvy::from_path_iter(path) {
        Ok(iter) => iter.filter_map(Result::ok).collect(),
        Err(e) => {
            if !e.not_found() {
                tracing::warn!("Ignoring {}: {}", path.display(), e);
            }
            HashMap::new()
        }
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
    }
}
