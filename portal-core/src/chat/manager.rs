//! Conversation orchestration with tool-augmented LLM capabilities.
//!
//! # Tool Calling Flow
//!
//! ```text
//! History → LLM → Function calls?
//!                  ↓          ↓
//!               Text      Execute tools locally
//!                            ↓
//!                  LLM with results → ...
//! ```
//!
//! The loop is explicit: every step is one provider call whose response is
//! either final text, a batch of function calls, or nothing. Function calls
//! are executed through the [`PluginRegistry`] and their outputs appended to
//! the conversation before the next step. The number of tool rounds per
//! answer is bounded by `llm.max_tool_rounds`.

use crate::config::Config;
use crate::provider::{ChatRequest, Message, Provider, Tool, ToolCall, ToolFunction};
use anyhow::{Context, Result};
use portal_plugin::PluginRegistry;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Returned to the user when the model kept asking for tools past the round limit.
pub const PENDING_TOOL_CALL_FALLBACK: &str = "I need to perform an action with my tools to answer that, but I can't provide a direct text response for it yet. Can you please rephrase?";

/// Returned to the user when the model produced neither text nor tool calls.
pub const EMPTY_RESPONSE_FALLBACK: &str =
    "I couldn't generate a text response for that. Can you please rephrase or provide more details?";

/// How a generation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    /// The model answered with text.
    FinalText(String),
    /// The model still wanted these calls executed when the round limit was hit.
    ToolCallPending(Vec<ToolCall>),
    /// The model returned no text and no calls.
    Empty,
}

impl GenerationOutcome {
    /// Text to show the user, substituting the fixed fallbacks.
    pub fn into_text(self) -> String {
        match self {
            GenerationOutcome::FinalText(text) => text,
            GenerationOutcome::ToolCallPending(_) => PENDING_TOOL_CALL_FALLBACK.to_string(),
            GenerationOutcome::Empty => EMPTY_RESPONSE_FALLBACK.to_string(),
        }
    }
}

/// Answers analyst questions with the model and the registered tools.
///
/// The provider and the registry are injected so front ends (and tests) decide
/// which backend and which tools are in play.
///
/// # Examples
///
/// ```no_run
/// use portal_core::{ChatManager, Config, GeminiProvider};
/// use portal_plugin::{Permission, PluginRegistry};
/// use std::sync::Arc;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::load_or_default().with_env();
/// let provider = Arc::new(GeminiProvider::new(&config.llm));
/// let manager = ChatManager::new(config, provider, PluginRegistry::new(Permission::READ_ONLY));
///
/// let answer = manager.query("What was HPG's revenue last quarter?").await?;
/// println!("{}", answer);
/// # Ok(())
/// # }
/// ```
pub struct ChatManager {
    config: Config,
    provider: Arc<dyn Provider>,
    registry: Arc<PluginRegistry>,
}

impl ChatManager {
    pub fn new(config: Config, provider: Arc<dyn Provider>, registry: PluginRegistry) -> Self {
        Self {
            config,
            provider,
            registry: Arc::new(registry),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Answers a single free-text question.
    pub async fn query(&self, user_message: &str) -> Result<String> {
        self.respond(vec![Message::user(user_message)]).await
    }

    /// Answers the last turn of `history`, falling back to a fixed apology
    /// when the model produced no usable text.
    pub async fn respond(&self, history: Vec<Message>) -> Result<String> {
        Ok(self.generate(history).await?.into_text())
    }

    /// Runs the tool loop over `history` and reports how it ended.
    ///
    /// # Errors
    ///
    /// Returns an error if a provider call fails. Tool failures are not
    /// errors: they are reported back to the model as the tool's output.
    pub async fn generate(&self, history: Vec<Message>) -> Result<GenerationOutcome> {
        info!(history_len = history.len(), "Generating response");
        if let Some(last) = history.last() {
            debug!(role = %last.role, content = %last.content, "Last message in history");
        }

        let tools = self.build_tools();
        let mut messages = history;
        let mut rounds = 0;

        loop {
            let mut request = ChatRequest::new(&self.config.llm.model, messages.clone())
                .with_system(&self.config.system_prompt)
                .with_temperature(self.config.llm.temperature)
                .with_max_output_tokens(self.config.llm.max_output_tokens);
            if !tools.is_empty() {
                request = request.with_tools(tools.clone());
            }
            debug!(message_count = messages.len(), tool_count = tools.len(), "Sending request to provider");

            let response = match self.provider.chat(request).await {
                Ok(response) => response,
                Err(e) => {
                    error!(error = %e, "Error generating AI response");
                    return Err(e).context("Failed to get LLM response");
                }
            };

            let tool_calls = response.tool_calls().to_vec();
            if tool_calls.is_empty() {
                let text = response.message.content;
                if text.trim().is_empty() {
                    warn!(finish_reason = ?response.finish_reason, "Model returned an empty response");
                    return Ok(GenerationOutcome::Empty);
                }
                info!(chars = text.len(), "Model produced a text response");
                return Ok(GenerationOutcome::FinalText(text));
            }

            if rounds >= self.config.llm.max_tool_rounds {
                if !response.message.content.trim().is_empty() {
                    warn!(rounds, "Tool round limit reached, returning the text alongside pending calls");
                    return Ok(GenerationOutcome::FinalText(response.message.content));
                }
                warn!(
                    rounds,
                    pending = ?tool_calls.iter().map(|c| c.function.name.as_str()).collect::<Vec<_>>(),
                    "Tool round limit reached with calls still pending"
                );
                return Ok(GenerationOutcome::ToolCallPending(tool_calls));
            }
            rounds += 1;

            info!(tool_call_count = tool_calls.len(), round = rounds, "Processing tool calls from LLM");
            messages.push(Message::assistant_tool_calls(
                response.message.content,
                tool_calls.clone(),
            ));
            for tool_call in &tool_calls {
                messages.push(self.run_tool(tool_call).await);
            }
        }
    }

    /// Executes one call and wraps its output (or error) as a tool message.
    async fn run_tool(&self, tool_call: &ToolCall) -> Message {
        let tool_name = &tool_call.function.name;
        let arguments = match &tool_call.function.arguments {
            serde_json::Value::Null => serde_json::json!({}),
            other => other.clone(),
        };
        info!(tool_name = %tool_name, "Executing tool");

        match self.registry.execute(tool_name, arguments).await {
            Ok(output) => Message::tool(tool_name, output.content),
            Err(e) => {
                warn!(tool_name = %tool_name, error = %e, "Tool execution failed");
                Message::tool(tool_name, format!("Error: {}", e))
            }
        }
    }

    /// Converts registered plugins into function declarations.
    fn build_tools(&self) -> Vec<Tool> {
        self.registry
            .all()
            .iter()
            .map(|plugin| Tool {
                tool_type: "function".to_string(),
                function: ToolFunction {
                    name: plugin.name().to_string(),
                    description: plugin.description().to_string(),
                    parameters: plugin.parameter_schema(),
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChatResponse, ProviderError};
    use async_trait::async_trait;
    use portal_plugin::{Permission, Plugin, PluginOutput};
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses and records every request it receives.
    struct ScriptedProvider {
        responses: Mutex<VecDeque<crate::provider::Result<ChatResponse>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<crate::provider::Result<ChatResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn chat(&self, request: ChatRequest) -> crate::provider::Result<ChatResponse> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::Other("script exhausted".to_string())))
        }

        async fn embed(&self, _text: &str, _model: &str) -> crate::provider::Result<Vec<f32>> {
            Err(ProviderError::Other("not scripted".to_string()))
        }
    }

    struct FixedDatePlugin;

    #[async_trait]
    impl Plugin for FixedDatePlugin {
        fn name(&self) -> &str {
            "get_current_date"
        }

        fn description(&self) -> &str {
            "Returns a fixed date"
        }

        fn parameter_schema(&self) -> Option<Value> {
            None
        }

        fn required_permission(&self) -> Permission {
            Permission::NONE
        }

        async fn execute(&self, _input: Value) -> portal_plugin::Result<PluginOutput> {
            Ok(PluginOutput::new("June 16th 2025"))
        }
    }

    fn text(content: &str) -> crate::provider::Result<ChatResponse> {
        Ok(ChatResponse {
            model: "test".to_string(),
            message: Message::assistant(content),
            finish_reason: Some("STOP".to_string()),
        })
    }

    fn calls(names: &[&str]) -> crate::provider::Result<ChatResponse> {
        Ok(ChatResponse {
            model: "test".to_string(),
            message: Message::assistant_tool_calls(
                "",
                names.iter().map(|n| ToolCall::new(*n, json!({}))).collect(),
            ),
            finish_reason: None,
        })
    }

    fn manager(provider: Arc<ScriptedProvider>, max_tool_rounds: usize) -> ChatManager {
        let mut config = Config::default();
        config.llm.max_tool_rounds = max_tool_rounds;
        let mut registry = PluginRegistry::new(Permission::READ_ONLY);
        registry.register(Arc::new(FixedDatePlugin));
        ChatManager::new(config, provider, registry)
    }

    #[tokio::test]
    async fn returns_final_text_without_tools() {
        let provider = ScriptedProvider::new(vec![text("Revenue grew 12%.")]);
        let manager = manager(provider.clone(), 5);

        let outcome = manager.generate(vec![Message::user("How did HPG do?")]).await.unwrap();

        assert_eq!(outcome, GenerationOutcome::FinalText("Revenue grew 12%.".to_string()));
        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].system.as_deref().unwrap().contains("financial analyst"));
        assert_eq!(requests[0].max_output_tokens, Some(2048));
        let tools = requests[0].tools.as_ref().unwrap();
        assert_eq!(tools[0].function.name, "get_current_date");
    }

    #[tokio::test]
    async fn executes_tool_and_resubmits_result() {
        let provider = ScriptedProvider::new(vec![
            calls(&["get_current_date"]),
            text("Today is June 16th 2025."),
        ]);
        let manager = manager(provider.clone(), 5);

        let answer = manager.query("What is the date?").await.unwrap();

        assert_eq!(answer, "Today is June 16th 2025.");
        let requests = provider.requests();
        assert_eq!(requests.len(), 2);

        let followup = &requests[1].messages;
        assert_eq!(followup.len(), 3);
        assert_eq!(followup[1].role, "assistant");
        assert_eq!(followup[1].tool_calls.as_ref().unwrap()[0].function.name, "get_current_date");
        assert_eq!(followup[2], Message::tool("get_current_date", "June 16th 2025"));
    }

    #[tokio::test]
    async fn unknown_tool_error_is_fed_back_to_model() {
        let provider = ScriptedProvider::new(vec![calls(&["delete_everything"]), text("Sorry.")]);
        let manager = manager(provider.clone(), 5);

        let answer = manager.query("Clean up").await.unwrap();

        assert_eq!(answer, "Sorry.");
        let tool_message = &provider.requests()[1].messages[2];
        assert_eq!(tool_message.role, "tool");
        assert_eq!(tool_message.content, "Error: Unknown tool: delete_everything");
    }

    #[tokio::test]
    async fn stops_after_round_limit_with_pending_calls() {
        let provider = ScriptedProvider::new(vec![
            calls(&["get_current_date"]),
            calls(&["get_current_date"]),
            calls(&["get_current_date"]),
        ]);
        let manager = manager(provider.clone(), 2);

        let outcome = manager.generate(vec![Message::user("Loop forever")]).await.unwrap();

        match &outcome {
            GenerationOutcome::ToolCallPending(pending) => {
                assert_eq!(pending[0].function.name, "get_current_date");
            }
            other => panic!("expected pending tool call, got {:?}", other),
        }
        assert_eq!(provider.requests().len(), 3);
        assert_eq!(outcome.into_text(), PENDING_TOOL_CALL_FALLBACK);
    }

    #[tokio::test]
    async fn text_alongside_calls_at_round_limit_is_kept() {
        let provider = ScriptedProvider::new(vec![Ok(ChatResponse {
            model: "test".to_string(),
            message: Message::assistant_tool_calls(
                "Partial answer",
                vec![ToolCall::new("get_current_date", json!({}))],
            ),
            finish_reason: None,
        })]);
        let manager = manager(provider.clone(), 0);

        let outcome = manager.generate(vec![Message::user("What day is it?")]).await.unwrap();

        assert_eq!(outcome, GenerationOutcome::FinalText("Partial answer".to_string()));
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn empty_response_maps_to_apology() {
        let provider = ScriptedProvider::new(vec![text("   ")]);
        let manager = manager(provider, 5);

        let outcome = manager.generate(vec![Message::user("?")]).await.unwrap();
        assert_eq!(outcome, GenerationOutcome::Empty);
        assert_eq!(outcome.into_text(), EMPTY_RESPONSE_FALLBACK);
    }

    #[tokio::test]
    async fn provider_errors_propagate_with_cause() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::Api("quota exceeded".to_string()))]);
        let manager = manager(provider, 5);

        let err = manager.query("Anything").await.unwrap_err();
        let rendered = format!("{:#}", err);

        assert!(rendered.contains("Failed to get LLM response"));
        assert!(rendered.contains("quota exceeded"));
        assert!(matches!(err.downcast_ref::<ProviderError>(), Some(ProviderError::Api(_))));
    }

    #[tokio::test]
    async fn no_tools_declared_when_registry_is_empty() {
        let provider = ScriptedProvider::new(vec![text("Hi")]);
        let manager = ChatManager::new(
            Config::default(),
            provider.clone(),
            PluginRegistry::new(Permission::NONE),
        );

        manager.query("Hello").await.unwrap();
        assert!(provider.requests()[0].tools.is_none());
    }
}
