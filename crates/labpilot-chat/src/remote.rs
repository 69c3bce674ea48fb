//! LanguageModel backed by an OpenAI-compatible chat-completions endpoint.
//!
//! Classification sends the tool definitions and reads the first tool call;
//! generation sends the conversation plus the executed tool's result and reads
//! the text reply. Works with any provider speaking the chat-completions
//! format (Mistral, OpenAI, local gateways).

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use labpilot_core::config::LlmConfig;
use labpilot_core::error::LabpilotError;
use labpilot_core::types::Role;

use crate::model::{Action, Classification, GenerationRequest, LanguageModel, RoutingContext};

/// Upper bound on the tool-result details forwarded to the model.
const MAX_DETAILS_CHARS: usize = 4000;

/// Remote model over HTTP.
#[derive(Clone)]
pub struct OpenAiCompatibleModel {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for OpenAiCompatibleModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleModel")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiCompatibleModel {
    /// Creates a model client with an explicit key.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LabpilotError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LabpilotError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Creates a model client from configuration, reading the key from the
    /// configured environment variable.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LabpilotError> {
        let api_key = env::var(&config.api_key_env).map_err(|_| {
            LabpilotError::Config(format!(
                "{} is not set; export it or use provider = \"rules\"",
                config.api_key_env
            ))
        })?;
        Self::new(
            &config.base_url,
            api_key,
            &config.model,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn conversation(&self, message: &str, context: &RoutingContext) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::new("system", build_system_prompt(context))];
        messages.extend(context.history.iter().map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            ChatMessage::new(role, m.content.clone())
        }));
        messages.push(ChatMessage::new("user", message));
        messages
    }

    async fn send_request(
        &self,
        body: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, LabpilotError> {
        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    LabpilotError::Collaborator("language model request timed out".to_string())
                } else {
                    LabpilotError::Collaborator(format!("language model request failed: {}", err))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(map_http_error(status, &body_text));
        }

        response.json().await.map_err(|err| {
            LabpilotError::Collaborator(format!("Failed to parse language model response: {}", err))
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn classify(
        &self,
        text: &str,
        context: &RoutingContext,
    ) -> Result<Classification, LabpilotError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: self.conversation(text, context),
            tools: Some(tool_definitions()),
            tool_choice: Some("auto"),
        };
        let response = self.send_request(&request).await?;
        parse_classification(response, text)
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, LabpilotError> {
        let mut messages = self.conversation(&request.message, &request.context);
        if let Some(result) = &request.result {
            messages.push(ChatMessage::new("system", tool_result_prompt(result)));
        }
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            tools: None,
            tool_choice: None,
        };
        extract_text(self.send_request(&body).await?)
    }
}

// =============================================================================
// Prompts and tools
// =============================================================================

/// System prompt describing the assistant and what is currently loaded.
pub fn build_system_prompt(context: &RoutingContext) -> String {
    let mut prompt = String::from(
        "You are Lab Co-Pilot, a helpful assistant for laboratory researchers. \
         You help analyze experimental data and answer questions about scientific documents.\n\n\
         Use the available tools to filter, aggregate, describe, or plot the active dataset, \
         and to search uploaded documents. Answer directly when no tool is needed.\n",
    );

    match &context.active_dataset {
        Some(active) => {
            let columns: Vec<String> = active
                .columns
                .iter()
                .map(|c| format!("{} ({})", c.name, format!("{:?}", c.column_type).to_lowercase()))
                .collect();
            prompt.push_str(&format!(
                "\nActive dataset: {}\nRows: {}\nColumns: {}\n",
                active.name,
                active.row_count,
                columns.join(", ")
            ));
        }
        None => prompt.push_str("\nNo dataset is loaded.\n"),
    }
    if context.dataset_names.len() > 1 {
        prompt.push_str(&format!(
            "Other datasets: {}\n",
            context.dataset_names.join(", ")
        ));
    }
    if !context.document_names.is_empty() {
        prompt.push_str(&format!(
            "Uploaded documents: {}\n",
            context.document_names.join(", ")
        ));
    }
    prompt
}

fn tool_result_prompt(result: &crate::model::ToolResult) -> String {
    let mut prompt = format!("Result of {}: {}", result.action, result.summary);
    if let Some(details) = &result.details {
        let mut text = details.to_string();
        if text.len() > MAX_DETAILS_CHARS {
            let cut = (0..=MAX_DETAILS_CHARS)
                .rev()
                .find(|i| text.is_char_boundary(*i))
                .unwrap_or(0);
            text.truncate(cut);
            text.push_str("...");
        }
        prompt.push_str(&format!("\nDetails: {}", text));
    }
    prompt.push_str("\nAnswer the user's last message using this result. Be concise.");
    prompt
}

/// Function-calling definitions for the five capabilities.
pub fn tool_definitions() -> Value {
    let dataset = json!({
        "type": "string",
        "description": "Name of the dataset to use; defaults to the active dataset"
    });
    json!([
        {
            "type": "function",
            "function": {
                "name": "filter_data",
                "description": "Filter the dataset rows with a boolean expression",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "conditions": {
                            "type": "string",
                            "description": "Expression such as `expression > 2 and gene == 'TP53'`"
                        },
                        "dataset": dataset
                    },
                    "required": ["conditions"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "aggregate_data",
                "description": "Group by one column and aggregate another",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "group_column": {"type": "string"},
                        "value_column": {"type": "string"},
                        "agg_func": {
                            "type": "string",
                            "enum": ["mean", "sum", "count", "min", "max", "median", "std"]
                        },
                        "dataset": dataset
                    },
                    "required": ["group_column", "value_column", "agg_func"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "describe_data",
                "description": "Summary statistics for every column",
                "parameters": {
                    "type": "object",
                    "properties": {"dataset": dataset}
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "generate_plot",
                "description": "Create a chart of the dataset",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "plot_type": {
                            "type": "string",
                            "enum": ["bar", "pie", "scatter", "line", "histogram", "box"]
                        },
                        "x_column": {"type": "string"},
                        "y_column": {"type": "string"},
                        "title": {"type": "string"},
                        "dataset": dataset
                    },
                    "required": ["plot_type", "x_column"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "search_documents",
                "description": "Search the uploaded documents for relevant passages",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": {"type": "string"},
                        "top_k": {"type": "integer", "default": 5},
                        "document": {
                            "type": "string",
                            "description": "Restrict the search to one document by name"
                        }
                    },
                    "required": ["query"]
                }
            }
        }
    ])
}

// =============================================================================
// Response handling
// =============================================================================

fn parse_classification(
    response: ChatCompletionResponse,
    text: &str,
) -> Result<Classification, LabpilotError> {
    let call = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.tool_calls)
        .and_then(|calls| calls.into_iter().next());

    match call {
        Some(call) => classification_from_tool_call(&call.function.name, &call.function.arguments, text),
        None => {
            debug!("Model answered without a tool call");
            Ok(Classification::converse())
        }
    }
}

/// Convert one tool call into a classification.
pub fn classification_from_tool_call(
    name: &str,
    arguments: &str,
    text: &str,
) -> Result<Classification, LabpilotError> {
    let args: Value = if arguments.trim().is_empty() {
        json!({})
    } else {
        serde_json::from_str(arguments).map_err(|e| {
            LabpilotError::Collaborator(format!("Invalid arguments for {}: {}", name, e))
        })?
    };
    let string = |key: &str| {
        args.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    };

    let action = match name {
        "filter_data" => Action::Filter {
            conditions: string("conditions").unwrap_or_default(),
        },
        "aggregate_data" => Action::Aggregate {
            group_column: string("group_column").unwrap_or_default(),
            value_column: string("value_column").unwrap_or_default(),
            agg_func: string("agg_func"),
        },
        "describe_data" => Action::Describe,
        "generate_plot" => Action::Plot {
            plot_type: string("plot_type").unwrap_or_else(|| "bar".to_string()),
            x_column: string("x_column").unwrap_or_default(),
            y_column: string("y_column"),
            title: string("title"),
        },
        "search_documents" => Action::Search {
            query: string("query").unwrap_or_else(|| text.to_string()),
            top_k: args.get("top_k").and_then(Value::as_u64).map(|k| k as usize),
        },
        other => {
            warn!(tool = %other, "Model called an unknown tool");
            Action::Converse
        }
    };

    Ok(Classification::new(action)
        .with_dataset(string("dataset"))
        .with_document(string("document")))
}

fn extract_text(response: ChatCompletionResponse) -> Result<String, LabpilotError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| {
            LabpilotError::Collaborator("language model returned no content".to_string())
        })
}

fn map_http_error(status: StatusCode, body: &str) -> LabpilotError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or_else(|_| body.to_string());
    LabpilotError::Collaborator(format!(
        "language model returned {}: {}",
        status.as_u16(),
        message
    ))
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

impl ChatMessage {
    fn new(role: &'static str, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}
