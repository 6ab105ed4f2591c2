//! Gemini provider implementation.
//!
//! This module provides a client for the Generative Language REST API
//! (`generateContent` / `embedContent`) that implements the Provider trait.

use super::types::*;
use crate::config::{LlmConfig, GEMINI_API_KEY_VAR};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Gemini HTTP API provider.
///
/// The API key is optional at construction time: a missing key surfaces as
/// [`ProviderError::MissingApiKey`] on the first call, so a server can start
/// and report the misconfiguration per request.
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    base_url: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            http_client: reqwest::Client::new(),
        }
    }

    /// Share an existing HTTP client (connection pool) with other components.
    pub fn with_http_client(mut self, http_client: reqwest::Client) -> Self {
        self.http_client = http_client;
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingApiKey(GEMINI_API_KEY_VAR.to_string()))
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/{}:{}", self.base_url, model_path(model), method)
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(&self, url: &str, body: &B) -> Result<R> {
        let response = self
            .http_client
            .post(url)
            .header("x-goog-api-key", self.api_key()?)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(ProviderError::Api(api_error_message(status, &error_text)));
        }

        Ok(response.json::<R>().await?)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let url = self.endpoint(&request.model, "generateContent");
        let body = to_gemini_request(&request);
        debug!(model = %request.model, contents = body.contents.len(), "Sending generateContent request");

        let response: GenerateContentResponse = self.post(&url, &body).await?;
        Ok(from_gemini_response(&request.model, response))
    }

    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>> {
        let url = self.endpoint(model, "embedContent");
        let body = EmbedContentRequest {
            model: model_path(model),
            content: Content {
                role: None,
                parts: vec![Part::text(text)],
            },
        };

        let response: EmbedContentResponse = self.post(&url, &body).await?;
        let values = response.embedding.map(|e| e.values).unwrap_or_default();
        if values.is_empty() {
            return Err(ProviderError::Other("No embeddings returned".to_string()));
        }
        Ok(values)
    }
}

fn model_path(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

fn api_error_message(status: reqwest::StatusCode, body: &str) -> String {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.to_string());
    format!("{} {}", status, message)
}

/// Converts a provider-neutral request into the `generateContent` body.
///
/// System messages are folded into the system instruction, assistant turns
/// become `model` turns, and consecutive tool messages are merged into a
/// single turn of `functionResponse` parts.
fn to_gemini_request(request: &ChatRequest) -> GenerateContentRequest {
    let mut system_parts: Vec<Part> = request.system.iter().map(Part::text).collect();
    let mut contents: Vec<Content> = Vec::new();
    let mut last_was_tool = false;

    for message in &request.messages {
        match message.role.as_str() {
            "system" => {
                system_parts.push(Part::text(&message.content));
                last_was_tool = false;
            }
            "tool" => {
                let part = Part {
                    function_response: Some(FunctionResponse {
                        name: message.tool_name.clone().unwrap_or_default(),
                        response: serde_json::json!({ "result": message.content }),
                    }),
                    ..Part::default()
                };
                match contents.last_mut() {
                    Some(content) if last_was_tool => content.parts.push(part),
                    _ => contents.push(Content {
                        role: Some("user".to_string()),
                        parts: vec![part],
                    }),
                }
                last_was_tool = true;
            }
            role => {
                let gemini_role = if role == "assistant" || role == "model" { "model" } else { "user" };
                let mut parts = Vec::new();
                if !message.content.is_empty() {
                    parts.push(Part::text(&message.content));
                }
                for attachment in message.attachments.iter().flatten() {
                    parts.push(Part {
                        inline_data: Some(Blob {
                            mime_type: attachment.mime_type.clone(),
                            data: attachment.data.clone(),
                        }),
                        ..Part::default()
                    });
                }
                for call in message.tool_calls.iter().flatten() {
                    parts.push(Part {
                        function_call: Some(FunctionCall {
                            name: call.function.name.clone(),
                            args: call.function.arguments.clone(),
                        }),
                        ..Part::default()
                    });
                }
                // The API rejects turns without parts.
                if !parts.is_empty() {
                    contents.push(Content {
                        role: Some(gemini_role.to_string()),
                        parts,
                    });
                }
                last_was_tool = false;
            }
        }
    }

    let tools = request.tools.as_ref().filter(|t| !t.is_empty()).map(|tools| {
        vec![GeminiTool {
            function_declarations: tools
                .iter()
                .map(|t| FunctionDeclaration {
                    name: t.function.name.clone(),
                    description: t.function.description.clone(),
                    parameters: t.function.parameters.clone(),
                })
                .collect(),
        }]
    });

    GenerateContentRequest {
        system_instruction: (!system_parts.is_empty()).then(|| Content {
            role: None,
            parts: system_parts,
        }),
        contents,
        tools,
        generation_config: Some(GenerationConfig {
            temperature: Some(request.temperature),
            max_output_tokens: request.max_output_tokens,
        }),
    }
}

/// Reads the first candidate: text parts are concatenated, function calls kept in order.
fn from_gemini_response(model: &str, response: GenerateContentResponse) -> ChatResponse {
    let candidate = response.candidates.into_iter().next();
    let finish_reason = candidate.as_ref().and_then(|c| c.finish_reason.clone());
    let parts = candidate
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .unwrap_or_default();

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for part in parts {
        if part.thought == Some(true) {
            continue;
        }
        if let Some(t) = part.text {
            text.push_str(&t);
        }
        if let Some(call) = part.function_call {
            let args = if call.args.is_null() { serde_json::json!({}) } else { call.args };
            tool_calls.push(ToolCall::new(call.name, args));
        }
    }

    let message = if tool_calls.is_empty() {
        Message::assistant(text)
    } else {
        Message::assistant_tool_calls(text, tool_calls)
    };

    ChatResponse {
        model: response.model_version.unwrap_or_else(|| model.to_string()),
        message,
        finish_reason,
    }
}

// Gemini-specific request/response types (internal)

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<Blob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct EmbedContentRequest {
    model: String,
    content: Content,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbedContentResponse {
    #[serde(default)]
    embedding: Option<ContentEmbedding>,
}

#[derive(Debug, Clone, Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiErrorDetail {
    message: String,
}
