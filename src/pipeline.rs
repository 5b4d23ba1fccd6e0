//! One end-to-end run: topic in, `.docx` out.

use std::path::{Path, PathBuf};

use crate::agent::{enforce_length, Agent};
use crate::config::Config;
use crate::render::{list_embedded_media, render_docx};

/// What a run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub out_path: PathBuf,
    /// Approximate word count of the rendered document.
    pub words: usize,
    /// Embedded picture parts, e.g. `word/media/image1.png`.
    pub media: Vec<String>,
    /// Images downloaded during the run.
    pub assets: usize,
}

/// Generate a blog document for `topic` and write it to `out_path`.
pub async fn run(
    config: &Config,
    topic: &str,
    target_words: usize,
    out_path: &Path,
) -> anyhow::Result<RunReport> {
    let agent = Agent::new(config)?;
    run_with_agent(&agent, topic, target_words, out_path).await
}

pub async fn run_with_agent(
    agent: &Agent,
    topic: &str,
    target_words: usize,
    out_path: &Path,
) -> anyhow::Result<RunReport> {
    let (finish, state) = agent.run(topic, target_words).await;

    let doc = enforce_length(
        agent.llm(),
        finish.doc,
        target_words,
        &state.assets,
        agent.limits().max_images,
    )
    .await;

    let words = doc.word_count();
    let asset_count = state.assets.len();

    // Zip writing and image decoding are blocking work.
    let path = out_path.to_path_buf();
    let media = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<String>> {
        render_docx(&doc, &state.assets, &path)?;
        list_embedded_media(&path)
    })
    .await??;

    Ok(RunReport {
        out_path: out_path.to_path_buf(),
        words,
        media,
        assets: asset_count,
    })
}
