//! Core agent loop implementation.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::Config;
use crate::doc_spec::{extract_json_object, DocSpec};
use crate::llm::{CompletionOptions, GroqClient, LlmClient};
use crate::tools::{Asset, ToolRegistry};

use super::parse::parse_model_output;
use super::prompt::{build_force_final_prompt, build_reason_prompt, truncate_observation};
use super::state::{AgentAction, AgentOutcome, AgentState, Finish, Step};

const REASON_MAX_TOKENS: u32 = 600;
const FINAL_MAX_TOKENS: u32 = 1200;

/// Bounds on how long the agent may keep calling tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentLimits {
    /// Recorded steps after which the agent must finish.
    pub max_tool_steps: usize,
    /// Reason/act rounds after which the agent must finish.
    pub max_iterations: usize,
    /// Images downloaded automatically after a search.
    pub max_images: usize,
}

impl Default for AgentLimits {
    fn default() -> Self {
        Self {
            max_tool_steps: 6,
            max_iterations: 30,
            max_images: 2,
        }
    }
}

/// The blog-writing agent.
pub struct Agent {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    limits: AgentLimits,
    workspace: PathBuf,
}

impl Agent {
    /// Create an agent backed by the configured LLM and search providers.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let llm = Arc::new(GroqClient::new(
            config.llm_api_key.clone(),
            config.model.clone(),
            config.llm_base_url.clone(),
            config.llm_timeout,
        )?);
        let tools = ToolRegistry::new(config.tavily_api_key.clone())?;
        let limits = AgentLimits {
            max_tool_steps: config.max_tool_steps,
            max_iterations: config.max_iterations,
            max_images: config.max_images,
        };

        Ok(Self::with_parts(llm, tools, limits, config.output_dir.clone()))
    }

    pub fn with_parts(
        llm: Arc<dyn LlmClient>,
        tools: ToolRegistry,
        limits: AgentLimits,
        workspace: PathBuf,
    ) -> Self {
        Self {
            llm,
            tools,
            limits,
            workspace,
        }
    }

    pub fn llm(&self) -> &dyn LlmClient {
        self.llm.as_ref()
    }

    pub fn limits(&self) -> AgentLimits {
        self.limits
    }

    /// Run the loop for `topic` until a document is produced.
    ///
    /// Always finishes: model and tool failures fall back to a forced
    /// document, and the forced document falls back to a stub.
    pub async fn run(&self, topic: &str, target_words: usize) -> (Finish, AgentState) {
        let mut state = AgentState::new(topic, target_words);
        tracing::info!("Agent started: topic={:?} target_words={}", topic, target_words);

        for iteration in 0..self.limits.max_iterations {
            tracing::debug!("Agent iteration {}", iteration + 1);

            match self.reason(&state).await {
                AgentOutcome::Finish(finish) => {
                    tracing::info!(
                        "Agent finished after {} steps with {} assets",
                        state.steps.len(),
                        state.assets.len()
                    );
                    return (finish, state);
                }
                AgentOutcome::Action(action) => self.act(&mut state, action).await,
            }
        }

        tracing::warn!(
            "Max iterations ({}) reached without completion, forcing a final document",
            self.limits.max_iterations
        );
        let finish = self.force_finish(&state).await;
        (finish, state)
    }

    /// Decide the next move.
    pub async fn reason(&self, state: &AgentState) -> AgentOutcome {
        if state.steps.is_empty() && state.assets.is_empty() {
            return AgentOutcome::Action(AgentAction {
                tool: "web_search".to_string(),
                tool_input: json!(format!("{} diagram pipeline png", state.topic)),
                log: "bootstrap web_search".to_string(),
            });
        }

        if state.steps.len() >= self.limits.max_tool_steps {
            tracing::info!(
                "Tool step limit ({}) reached, forcing a final document",
                self.limits.max_tool_steps
            );
            return AgentOutcome::Finish(self.force_finish(state).await);
        }

        let prompt = build_reason_prompt(state, &self.tools, self.limits.max_images);
        let text = match self
            .llm
            .complete(&prompt, CompletionOptions::deterministic(REASON_MAX_TOKENS))
            .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("LLM call failed during reasoning: {}", e);
                return AgentOutcome::Finish(self.force_finish(state).await);
            }
        };

        match parse_model_output(&text) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("{}", e);
                AgentOutcome::Finish(self.force_finish(state).await)
            }
        }
    }

    /// Ask for a document one last time; never fails.
    pub async fn force_finish(&self, state: &AgentState) -> Finish {
        let prompt = build_force_final_prompt(state, self.limits.max_images);
        let reply = self
            .llm
            .complete(&prompt, CompletionOptions::deterministic(FINAL_MAX_TOKENS))
            .await;

        match reply {
            Ok(text) => {
                let raw = extract_json_object(&text).unwrap_or_else(|| text.trim());
                match DocSpec::parse(raw) {
                    Ok(doc) => Finish { doc, log: text },
                    Err(e) => {
                        tracing::warn!("Forced document was invalid ({}), using fallback", e);
                        Finish {
                            doc: DocSpec::fallback(&state.topic),
                            log: text,
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!("LLM call failed while forcing a document ({}), using fallback", e);
                Finish {
                    doc: DocSpec::fallback(&state.topic),
                    log: e.to_string(),
                }
            }
        }
    }

    /// Execute `action` and record what happened.
    pub async fn act(&self, state: &mut AgentState, action: AgentAction) {
        let name = action.tool.clone();
        tracing::info!("Calling tool: {} with args: {}", name, action.tool_input);

        if !self.tools.contains(&name) {
            state.steps.push(Step {
                action,
                observation: format!("Tool '{}' not found", name),
            });
            return;
        }

        let raw = match self
            .tools
            .execute(&name, action.tool_input.clone(), &self.workspace)
            .await
        {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("Tool '{}' failed: {}", name, e);
                state.steps.push(Step {
                    action,
                    observation: format!("Tool '{}' failed: {}", name, e),
                });
                return;
            }
        };

        let mut observation = truncate_observation(&raw);
        let mut follow_up = Vec::new();

        match name.as_str() {
            "web_search" => {
                match self.auto_fetch_images(&raw, state, &mut follow_up).await {
                    Ok(ids) if !ids.is_empty() => {
                        observation.push_str(&format!("\nDownloaded assets: {}", json!(ids)));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Auto image download skipped: {}", e);
                        observation.push_str(&format!("\n(auto image download skipped: {})", e));
                    }
                }
            }
            "fetch_image" => match serde_json::from_str::<Asset>(&raw) {
                Ok(asset) => state.assets.push(asset),
                Err(e) => tracing::debug!("fetch_image output was not an asset: {}", e),
            },
            _ => {}
        }

        state.steps.push(Step {
            action,
            observation,
        });
        state.steps.extend(follow_up);
    }

    /// Download the first images of a search result.
    ///
    /// Assets fetched before a failure are kept.
    async fn auto_fetch_images(
        &self,
        search_output: &str,
        state: &mut AgentState,
        follow_up: &mut Vec<Step>,
    ) -> anyhow::Result<Vec<String>> {
        let data: Value = serde_json::from_str(search_output)?;
        let urls = data
            .get("images")
            .and_then(Value::as_array)
            .map(|images| {
                images
                    .iter()
                    .take(self.limits.max_images)
                    .filter_map(|im| im.get("url").and_then(Value::as_str))
                    .filter(|url| !url.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let mut downloaded = Vec::new();
        for url in urls {
            let output = self
                .tools
                .execute("fetch_image", json!(url), &self.workspace)
                .await?;
            let asset: Asset = serde_json::from_str(&output)?;

            follow_up.push(Step {
                action: AgentAction {
                    tool: "fetch_image".to_string(),
                    tool_input: json!(url),
                    log: format!("auto fetch {}", url),
                },
                observation: format!("downloaded {} from {}", asset.asset_id, url),
            });
            downloaded.push(asset.asset_id.clone());
            state.assets.push(asset);
        }

        Ok(downloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use crate::doc_spec::FALLBACK_NOTICE;
    use crate::testing::{FakeFetch, FakeSearch, ScriptedLlm, VALID_DOC};

    fn agent(llm: Arc<ScriptedLlm>, search: FakeSearch, fetch: FakeFetch, dir: &Path) -> Agent {
        let tools = ToolRegistry::with_tools(vec![Arc::new(search), Arc::new(fetch)]);
        Agent::with_parts(llm, tools, AgentLimits::default(), dir.to_path_buf())
    }

    #[tokio::test]
    async fn first_step_is_a_bootstrap_search_without_the_llm() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let agent = agent(llm.clone(), FakeSearch::default(), FakeFetch::default(), dir.path());

        let outcome = agent.reason(&AgentState::new("RAG", 1000)).await;
        match outcome {
            AgentOutcome::Action(a) => {
                assert_eq!(a.tool, "web_search");
                assert_eq!(a.tool_input, json!("RAG diagram pipeline png"));
            }
            other => panic!("expected bootstrap action, got {other:?}"),
        }
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn search_downloads_images_then_model_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(format!("Final Answer: {VALID_DOC}"))]));
        let search = FakeSearch::with_images(&[
            "https://img.test/a.png",
            "https://img.test/b.png",
            "https://img.test/c.png",
        ]);
        let agent = agent(llm.clone(), search, FakeFetch::default(), dir.path());

        let (finish, state) = agent.run("RAG", 1000).await;

        assert_eq!(finish.doc.title, "Retrieval-Augmented Generation");
        assert_eq!(state.assets.len(), 2);
        assert_eq!(state.steps.len(), 3);
        assert!(state.steps[0].observation.contains("Downloaded assets: [\"img_0\",\"img_1\"]"));
        assert_eq!(state.steps[1].observation, "downloaded img_0 from https://img.test/a.png");
        assert_eq!(llm.calls(), 1);
        assert!(llm.prompt(0).contains("img_1"));
    }

    #[tokio::test]
    async fn unparsable_reply_forces_a_document() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok("I am not sure what to do.".to_string()),
            Ok(format!("Here you go:\n```json\n{VALID_DOC}\n```")),
        ]));
        let agent = agent(llm.clone(), FakeSearch::default(), FakeFetch::default(), dir.path());

        let (finish, _) = agent.run("RAG", 1000).await;

        assert_eq!(finish.doc.sections.len(), 3);
        assert_eq!(llm.calls(), 2);
        assert!(llm.prompt(1).starts_with("Return ONLY valid JSON"));
    }

    #[tokio::test]
    async fn failed_forced_document_falls_back_to_stub() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new(vec![
            Err(anyhow::anyhow!("rate limited")),
            Ok("{\"title\": \"missing everything\"}".to_string()),
        ]));
        let agent = agent(llm, FakeSearch::default(), FakeFetch::default(), dir.path());

        let (finish, _) = agent.run("Rust error handling", 1000).await;

        assert_eq!(finish.doc, DocSpec::fallback("Rust error handling"));
        assert_eq!(finish.doc.sections[0].paragraphs[0], FALLBACK_NOTICE);
    }

    #[tokio::test]
    async fn step_limit_forces_a_document() {
        let dir = tempfile::tempdir().unwrap();
        let mut replies: Vec<anyhow::Result<String>> = (0..5)
            .map(|i| Ok(format!("Action: web_search\nAction Input: \"more {i}\"")))
            .collect();
        replies.push(Ok(VALID_DOC.to_string()));
        let llm = Arc::new(ScriptedLlm::new(replies));
        let agent = agent(llm.clone(), FakeSearch::default(), FakeFetch::default(), dir.path());

        let (finish, state) = agent.run("RAG", 1000).await;

        assert_eq!(state.steps.len(), 6);
        assert_eq!(llm.calls(), 6);
        assert!(llm.prompt(5).starts_with("Return ONLY valid JSON"));
        assert_eq!(finish.doc.title, "Retrieval-Augmented Generation");
    }

    #[tokio::test]
    async fn iteration_cap_forces_a_document() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(VALID_DOC.to_string())]));
        let tools = ToolRegistry::with_tools(vec![
            Arc::new(FakeSearch::default()),
            Arc::new(FakeFetch::default()),
        ]);
        let limits = AgentLimits {
            max_iterations: 1,
            ..AgentLimits::default()
        };
        let agent = Agent::with_parts(llm.clone(), tools, limits, dir.path().to_path_buf());

        let (finish, state) = agent.run("RAG", 1000).await;

        assert_eq!(state.steps.len(), 1);
        assert_eq!(llm.calls(), 1);
        assert_eq!(finish.doc.title, "Retrieval-Augmented Generation");
    }

    #[tokio::test]
    async fn unknown_and_failing_tools_are_recorded_as_observations() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let agent = agent(llm, FakeSearch::failing(), FakeFetch::default(), dir.path());
        let mut state = AgentState::new("RAG", 1000);

        agent
            .act(
                &mut state,
                AgentAction {
                    tool: "calculator".to_string(),
                    tool_input: json!("1+1"),
                    log: String::new(),
                },
            )
            .await;
        agent
            .act(
                &mut state,
                AgentAction {
                    tool: "web_search".to_string(),
                    tool_input: json!("rag"),
                    log: String::new(),
                },
            )
            .await;

        assert_eq!(state.steps[0].observation, "Tool 'calculator' not found");
        assert_eq!(
            state.steps[1].observation,
            "Tool 'web_search' failed: search backend unavailable"
        );
        assert!(state.assets.is_empty());
    }

    #[tokio::test]
    async fn partial_auto_download_keeps_earlier_assets() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let search =
            FakeSearch::with_images(&["https://img.test/a.png", "https://img.test/broken.gif"]);
        let agent = agent(llm, search, FakeFetch::default(), dir.path());
        let mut state = AgentState::new("RAG", 1000);

        agent
            .act(
                &mut state,
                AgentAction {
                    tool: "web_search".to_string(),
                    tool_input: json!({"query": "rag"}),
                    log: String::new(),
                },
            )
            .await;

        assert_eq!(state.assets.len(), 1);
        assert_eq!(state.steps.len(), 2);
        assert!(state.steps[0]
            .observation
            .contains("(auto image download skipped: Unsupported image type: image/gif)"));
    }

    #[tokio::test]
    async fn explicit_fetch_registers_asset() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let agent = agent(llm, FakeSearch::default(), FakeFetch::default(), dir.path());
        let mut state = AgentState::new("RAG", 1000);

        agent
            .act(
                &mut state,
                AgentAction {
                    tool: "fetch_image".to_string(),
                    tool_input: json!("https://img.test/x.png"),
                    log: String::new(),
                },
            )
            .await;

        assert_eq!(state.assets.len(), 1);
        assert_eq!(state.assets[0].source_url, "https://img.test/x.png");
        assert!(state.steps[0].observation.contains("\"asset_id\":\"img_0\""));
    }
}
