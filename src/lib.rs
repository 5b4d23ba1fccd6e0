//! # blog-agent
//!
//! Writes a blog post about a topic and saves it as a Word document.
//!
//! This library provides:
//! - A reason/act agent loop that searches the web, downloads images and
//!   asks an LLM for a structured document
//! - Validation of that document against a fixed schema, with a forced
//!   fallback whenever the model misbehaves
//! - A `.docx` writer that embeds the downloaded images
//!
//! ## Architecture
//!
//! 1. Bootstrap with a web search for the topic (images are fetched automatically)
//! 2. Let the LLM pick further tool calls or finish with a JSON document
//! 3. Force a document once the step budget is spent
//! 4. Expand the document if it is well short of the target length
//! 5. Render to `.docx`
//!
//! ## Example
//!
//! ```rust,ignore
//! use blog_agent::{config::Config, pipeline};
//!
//! let config = Config::from_env()?;
//! let out = config.default_output_path();
//! let report = pipeline::run(&config, "Vector databases", 1200, &out).await?;
//! ```

pub mod agent;
pub mod config;
pub mod doc_spec;
pub mod llm;
pub mod pipeline;
pub mod render;
pub mod tools;

#[cfg(test)]
mod testing;

pub use config::Config;
