use super::scrub::sanitize_api_error;
use super::traits::ReasoningBackend;
use super::types::{ActionArguments, BackendTurn, ConversationMessage, ProposedAction};
use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::tools::ToolSpec;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Chat-completions client with function calling, for any endpoint that
/// speaks the OpenAI wire format (xAI by default).
pub struct OpenAiCompatBackend {
    endpoint: String,
    model: String,
    temperature: f64,
    system_prompt: String,
    /// Pre-computed `"Bearer <key>"` header value.
    cached_auth_header: Option<String>,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
}

impl Message {
    fn text(role: &'static str, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_call_id: None,
            tool_calls: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    r#type: &'static str,
    function: WireToolDefinition<'a>,
}

#[derive(Debug, Serialize)]
struct WireToolDefinition<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: WireToolCallFunction,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCallFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

impl OpenAiCompatBackend {
    pub fn new(config: &BackendConfig, system_prompt: impl Into<String>) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            system_prompt: system_prompt.into(),
            cached_auth_header: config
                .api_key
                .as_deref()
                .filter(|k| !k.trim().is_empty())
                .map(|k| format!("Bearer {k}")),
            client: Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .connect_timeout(Duration::from_secs(10))
                .pool_idle_timeout(Duration::from_secs(90))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn map_message(message: &ConversationMessage) -> Message {
        match message {
            ConversationMessage::User(text) => Message::text("user", text.clone()),
            ConversationMessage::Assistant { text, actions } => Message {
                role: "assistant",
                content: text.clone(),
                tool_call_id: None,
                tool_calls: (!actions.is_empty()).then(|| {
                    actions
                        .iter()
                        .map(|action| WireToolCall {
                            id: action.call_id.clone(),
                            r#type: function_type(),
                            function: WireToolCallFunction {
                                name: action.tool_name.clone(),
                                arguments: action.arguments.to_wire(),
                            },
                        })
                        .collect()
                }),
            },
            ConversationMessage::ToolResult { call_id, content } => Message {
                role: "tool",
                content: Some(content.clone()),
                tool_call_id: Some(call_id.clone()),
                tool_calls: None,
            },
        }
    }

    fn build_request<'a>(
        &'a self,
        conversation: &[ConversationMessage],
        tools: &'a [ToolSpec],
    ) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        messages.push(Message::text("system", self.system_prompt.clone()));
        messages.extend(conversation.iter().map(Self::map_message));

        ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            tools: tools
                .iter()
                .map(|tool| WireTool {
                    r#type: "function",
                    function: WireToolDefinition {
                        name: &tool.name,
                        description: &tool.description,
                        parameters: &tool.parameters,
                    },
                })
                .collect(),
        }
    }

    fn parse_turn(response: ChatResponse) -> Result<BackendTurn, BackendError> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Malformed("response has no choices".into()))?;

        let text = choice.message.content.filter(|t| !t.trim().is_empty());
        let calls = choice.message.tool_calls.unwrap_or_default();
        if calls.is_empty() {
            return Ok(BackendTurn::Final {
                text: text.unwrap_or_default(),
            });
        }

        let actions = calls
            .into_iter()
            .map(|call| {
                let call_id = if call.id.is_empty() {
                    format!("call_{}", uuid::Uuid::new_v4().simple())
                } else {
                    call.id
                };
                ProposedAction {
                    call_id,
                    tool_name: call.function.name,
                    arguments: ActionArguments::from_json_str(&call.function.arguments),
                }
            })
            .collect();
        Ok(BackendTurn::Actions { text, actions })
    }

    async fn call_api(&self, request: &ChatRequest<'_>) -> Result<ChatResponse, BackendError> {
        let auth_header = self
            .cached_auth_header
            .as_ref()
            .ok_or(BackendError::MissingApiKey)?;

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", auth_header)
            .json(request)
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read error body>".to_string());
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: sanitize_api_error(&body),
            });
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))
    }
}

impl ReasoningBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.model
    }

    fn next_turn<'a>(
        &'a self,
        conversation: &'a [ConversationMessage],
        tools: &'a [ToolSpec],
    ) -> Pin<Box<dyn Future<Output = Result<BackendTurn, BackendError>> + Send + 'a>> {
        Box::pin(async move {
            let request = self.build_request(conversation, tools);
            tracing::debug!(
                model = %self.model,
                messages = request.messages.len(),
                tools = request.tools.len(),
                "sending chat completion request"
            );
            let response = self.call_api(&request).await?;
            Self::parse_turn(response)
        })
    }
}
