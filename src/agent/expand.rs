//! Length enforcement: ask the model to grow a short document.

use crate::doc_spec::{extract_json_object, DocSpec};
use crate::llm::{CompletionOptions, LlmClient};
use crate::tools::Asset;

use super::prompt::build_expand_prompt;
use super::state::assets_brief;

const EXPAND_MAX_TOKENS: u32 = 2000;
const EXPANSION_ROUNDS: usize = 2;

/// Documents at or above this share of the target are long enough.
pub const LENGTH_TOLERANCE: f64 = 0.9;

pub fn min_words(target_words: usize) -> usize {
    (target_words as f64 * LENGTH_TOLERANCE) as usize
}

/// Expand `doc` until it reaches 90% of `target_words`, at most twice.
///
/// A failed or invalid expansion keeps the previous document.
pub async fn enforce_length(
    llm: &dyn LlmClient,
    mut doc: DocSpec,
    target_words: usize,
    assets: &[Asset],
    max_images: usize,
) -> DocSpec {
    let threshold = min_words(target_words);
    let brief = assets_brief(assets);

    for round in 1..=EXPANSION_ROUNDS {
        let words = doc.word_count();
        if words >= threshold {
            break;
        }

        tracing::info!(
            "Document has {} words (< {}), expansion round {}",
            words,
            threshold,
            round
        );

        let prompt = build_expand_prompt(&doc, target_words, &brief, max_images);
        match expand_once(llm, &prompt).await {
            Ok(expanded) => doc = expanded,
            Err(e) => tracing::warn!("Expansion round {} discarded: {}", round, e),
        }
    }

    doc
}

async fn expand_once(llm: &dyn LlmClient, prompt: &str) -> anyhow::Result<DocSpec> {
    let text = llm
        .complete(prompt, CompletionOptions::deterministic(EXPAND_MAX_TOKENS))
        .await?;
    let raw = extract_json_object(&text).unwrap_or_else(|| text.trim());
    Ok(DocSpec::parse(raw)?)
}
