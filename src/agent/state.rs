//! Loop state: what the agent has done and what it has collected.

use serde_json::{json, Value};

use crate::doc_spec::DocSpec;
use crate::tools::Asset;

/// A tool invocation chosen by the model (or by the loop itself).
#[derive(Debug, Clone, PartialEq)]
pub struct AgentAction {
    pub tool: String,
    pub tool_input: Value,
    /// Text that produced this action.
    pub log: String,
}

/// The loop's terminal result.
#[derive(Debug, Clone, PartialEq)]
pub struct Finish {
    pub doc: DocSpec,
    pub log: String,
}

/// Result of one reasoning step.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutcome {
    Action(AgentAction),
    Finish(Finish),
}

/// An executed action and what it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub action: AgentAction,
    pub observation: String,
}

#[derive(Debug, Clone)]
pub struct AgentState {
    pub topic: String,
    pub target_words: usize,
    pub steps: Vec<Step>,
    pub assets: Vec<Asset>,
}

impl AgentState {
    pub fn new(topic: impl Into<String>, target_words: usize) -> Self {
        Self {
            topic: topic.into(),
            target_words,
            steps: Vec::new(),
            assets: Vec::new(),
        }
    }

    /// Asset ids and source URLs, as shown to the model.
    pub fn assets_brief(&self) -> Value {
        assets_brief(&self.assets)
    }
}

pub(crate) fn assets_brief(assets: &[Asset]) -> Value {
    Value::Array(
        assets
            .iter()
            .map(|a| json!({"asset_id": a.asset_id, "source_url": a.source_url}))
            .collect(),
    )
}
