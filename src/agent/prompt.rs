//! Prompt templates for the agent.

use serde_json::Value;

use super::state::{AgentState, Step};
use crate::doc_spec::{DocSpec, SCHEMA_HINT};
use crate::llm::truncate;
use crate::tools::ToolRegistry;

/// Observations longer than this are cut before they reach the model.
pub const OBSERVATION_CHARS: usize = 1200;

/// How many recent steps the model sees.
pub const STEPS_IN_CONTEXT: usize = 3;

pub fn truncate_observation(s: &str) -> String {
    let cut = truncate(s, OBSERVATION_CHARS);
    if cut.len() == s.len() {
        s.to_string()
    } else {
        format!("{}...[truncated]", cut)
    }
}

/// The last few steps in `Action / Action Input / Observation` form.
pub fn scratchpad(steps: &[Step]) -> String {
    let recent = &steps[steps.len().saturating_sub(STEPS_IN_CONTEXT)..];
    if recent.is_empty() {
        return "(none)".to_string();
    }

    recent
        .iter()
        .map(|step| {
            format!(
                "Action: {}\nAction Input: {}\nObservation: {}",
                step.action.tool,
                step.action.tool_input,
                truncate_observation(&step.observation)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Prompt for one reasoning step: pick a tool or finish.
pub fn build_reason_prompt(state: &AgentState, tools: &ToolRegistry, max_images: usize) -> String {
    let tool_descriptions = tools
        .list_tools()
        .iter()
        .map(|t| format!("- {}: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a minimal ReAct agent that produces a Word-blog JSON spec.

Tools:
{tool_descriptions}

Rules:
- If no assets exist yet, call fetch_image for up to {max_images} image URLs seen in a web_search observation.
- Then output Final Answer as JSON matching the schema.
- If assets exist, you MUST use EXACT asset_id values from "Available assets".
- Output either ONE action or a Final Answer, nothing else.

Schema:
{SCHEMA_HINT}

Tool call format:
Action: web_search
Action Input: "your query"

Action: fetch_image
Action Input: "https://...png"

Final:
Final Answer: {{...doc_spec json...}}

Topic: {topic}
Target length: about {target_words} words

Available assets:
{assets}

Previous steps:
{steps}
"#,
        topic = state.topic,
        target_words = state.target_words,
        assets = state.assets_brief(),
        steps = scratchpad(&state.steps),
    )
}

/// Prompt used when the loop must stop and produce a document now.
pub fn build_force_final_prompt(state: &AgentState, max_images: usize) -> String {
    format!(
        r#"Return ONLY valid JSON (no markdown). Must match schema exactly.

Schema:
{SCHEMA_HINT}

Topic: {topic}

Available assets:
{assets}

Recent tool observations:
{steps}

Rules:
- Minimum 3 sections.
- If assets exist, reference up to {max_images} images using EXACT asset_id values above.
- Add 3-6 references from the search results.
"#,
        topic = state.topic,
        assets = state.assets_brief(),
        steps = scratchpad(&state.steps),
    )
}

/// Prompt asking the model to lengthen an existing document.
pub fn build_expand_prompt(
    doc: &DocSpec,
    target_words: usize,
    assets_brief: &Value,
    max_images: usize,
) -> String {
    format!(
        r#"You must return ONLY valid JSON (no markdown). Expand the blog to be ~{target_words} words (+/-10%).
Keep the same schema.

Schema:
{SCHEMA_HINT}

Rules:
- Make content longer by adding paragraphs and detail (not fluff).
- Aim for 4-6 sections.
- Each section should have 2-5 paragraphs, ~60-110 words each.
- If assets exist, reference up to {max_images} images using EXACT asset_id values:
{assets_brief}

Here is the current JSON to expand:
{current}
"#,
        current = doc.to_json(),
    )
}
