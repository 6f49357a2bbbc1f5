use serde::{Deserialize, Serialize};

use crate::config::LLMConfig;

const MOCK_FIELD_SUGGESTION: &str = r#"{"fieldName":"Phone Number","fieldDescription":"A phone number we can use to reach the person"}"#;
const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct LlmProvider {
    config: LLMConfig,
    client: reqwest::Client,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A function the model may call. `parameters` is a JSON schema object.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub name: String,
    /// Raw JSON text as produced by the model; not guaranteed to parse.
    pub arguments: String,
}

#[derive(Debug, Clone, Default)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm is disabled")]
    Disabled,
    #[error("llm request timed out")]
    Timeout,
    #[error("llm network error: {0}")]
    Network(String),
    #[error("llm api error: status={status}, message={message}")]
    ApiError { status: u16, message: String },
    #[error("llm returned an unusable response: {0}")]
    InvalidResponse(String),
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    temperature: f32,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDefinition,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl LlmProvider {
    pub fn new(config: &LLMConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config: config.clone(),
            client,
        }
    }

    /// Validate LLM configuration at startup.
    /// Panics if the real API is selected without an endpoint, key or model.
    pub fn validate_config(config: &LLMConfig) {
        if !config.enabled || config.mock {
            return;
        }
        let missing: Vec<&str> = [
            ("LLM_API_URL", config.api_url.trim().is_empty()),
            ("LLM_API_KEY", config.api_key.trim().is_empty()),
            ("LLM_MODEL", config.model.trim().is_empty()),
        ]
        .into_iter()
        .filter_map(|(name, empty)| empty.then_some(name))
        .collect();

        if !missing.is_empty() {
            panic!(
                "Invalid LLM configuration: enabled=true and mock=false, but {} not set. \
                 Set them, or use LLM_MOCK=true / LLM_ENABLED=false.",
                missing.join(", ")
            );
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Plain completion, returns the assistant text.
    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, LlmError> {
        let completion = self.complete(&messages, &[]).await?;
        Ok(completion.content.unwrap_or_default())
    }

    /// Completion where the model may answer with a call to one of `tools`.
    pub async fn chat_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatCompletion, LlmError> {
        self.complete(messages, tools).await
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatCompletion, LlmError> {
        if !self.config.enabled {
            return Err(LlmError::Disabled);
        }
        if self.config.mock {
            return Ok(mock_completion(messages, tools));
        }

        let request = ChatRequest {
            model: &self.config.model,
            messages,
            tools: (!tools.is_empty()).then(|| {
                tools
                    .iter()
                    .map(|function| WireTool {
                        kind: "function",
                        function,
                    })
                    .collect()
            }),
            tool_choice: (!tools.is_empty()).then_some("auto"),
            temperature: self.config.temperature,
        };

        let url = format!(
            "{}/chat/completions",
            self.config.api_url.trim_end_matches('/')
        );
        let started = std::time::Instant::now();
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let body: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::InvalidResponse(e.to_string())
            }
        })?;
        tracing::debug!(
            model = %self.config.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            tools = tools.len(),
            "Chat completion finished"
        );

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;

        Ok(ChatCompletion {
            content: choice.message.content,
            tool_calls: choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|call| ToolCall {
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect(),
        })
    }
}

fn map_transport_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Network(e.to_string())
    }
}

/// Deterministic stand-in for the completion API.
///
/// With tools, it walks the required parameters of the first tool: one question
/// per unanswered parameter, then a call that maps parameters to the user's
/// answers in order. Without tools it suggests a field.
fn mock_completion(messages: &[ChatMessage], tools: &[ToolDefinition]) -> ChatCompletion {
    let Some(tool) = tools.first() else {
        return ChatCompletion {
            content: Some(MOCK_FIELD_SUGGESTION.to_string()),
            tool_calls: Vec::new(),
        };
    };

    let required: Vec<String> = tool.parameters["required"]
        .as_array()
        .map(|names| {
            names
                .iter()
                .filter_map(|n| n.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let answers: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == "user")
        .map(|m| m.content.trim())
        .collect();

    if answers.len() >= required.len() {
        let arguments: serde_json::Map<String, serde_json::Value> = required
            .iter()
            .zip(answers.iter())
            .map(|(name, answer)| (name.clone(), serde_json::Value::from(*answer)))
            .collect();
        return ChatCompletion {
            content: None,
            tool_calls: vec![ToolCall {
                name: tool.name.clone(),
                arguments: serde_json::Value::Object(arguments).to_string(),
            }],
        };
    }

    let next = &required[answers.len()];
    let question = if answers.is_empty() {
        format!("Hello! Thanks for stopping by. What is your {next}?")
    } else {
        format!("Thanks! What is your {next}?")
    };
    ChatCompletion {
        content: Some(question),
        tool_calls: Vec::new(),
    }
}
