//! Turn a model reply into an action or a finished document.
//!
//! Accepted shapes, checked in order:
//! 1. a bare JSON document (`{ ... }`),
//! 2. `Final Answer: { ... }` at the end of the reply,
//! 3. `Action: <tool>` followed by `Action Input: <input>`.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use super::state::{AgentAction, AgentOutcome, Finish};
use crate::doc_spec::{DocSpec, DocSpecError};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("model returned an invalid document: {0}")]
    InvalidDocument(#[from] DocSpecError),

    #[error("could not parse model output: {0}")]
    Unrecognized(String),
}

fn final_answer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)Final Answer:\s*(\{[\s\S]*\})\s*$").expect("valid final answer regex")
    })
}

fn action_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)Action:\s*(\w+)\s*[\r\n]+Action Input:\s*([\s\S]+)$")
            .expect("valid action regex")
    })
}

fn observation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*Observation:").expect("valid observation regex"))
}

pub fn parse_model_output(text: &str) -> Result<AgentOutcome, ParseError> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        let doc = DocSpec::parse(trimmed)?;
        return Ok(finish(doc, text));
    }

    if let Some(caps) = final_answer_re().captures(text) {
        let doc = DocSpec::parse(caps[1].trim())?;
        return Ok(finish(doc, text));
    }

    let caps = action_re()
        .captures(text)
        .ok_or_else(|| ParseError::Unrecognized(crate::llm::truncate(trimmed, 200).to_string()))?;

    let tool = caps[1].trim().to_string();
    let mut input_raw = &caps[2];
    // Models sometimes keep going and invent the observation themselves.
    if let Some(m) = observation_re().find(input_raw) {
        input_raw = &input_raw[..m.start()];
    }
    let input_raw = input_raw.trim();

    let tool_input = serde_json::from_str::<Value>(input_raw)
        .unwrap_or_else(|_| Value::String(input_raw.to_string()));

    Ok(AgentOutcome::Action(AgentAction {
        tool,
        tool_input,
        log: text.to_string(),
    }))
}

fn finish(doc: DocSpec, text: &str) -> AgentOutcome {
    AgentOutcome::Finish(Finish {
        doc,
        log: text.to_string(),
    })
}
