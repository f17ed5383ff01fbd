//! OpenRouter client: streaming chat completions and the model catalog

use crate::provider::{
    ChunkStream, CompletionProvider, CompletionRequest, ProviderMessage, StreamChunk,
    ToolCallFragment,
};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use orchat_common::config::ENV_OPENROUTER_API_KEY;
use orchat_common::constants::provider::TOOLS_PARAMETER;
use orchat_common::{
    ChatError, ModelDescriptor, ModelPricing, ProviderConfig, Result, TOKENS_PER_PRICING_UNIT,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use std::pin::pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, trace, warn};

const DONE_SENTINEL: &str = "[DONE]";
const CLIENT_TITLE: &str = "Orchat";

/// OpenRouter API client
#[derive(Clone)]
pub struct OpenRouterClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    referer: Option<String>,
    timeout: Duration,
}

impl OpenRouterClient {
    /// Client against the public OpenRouter endpoint
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::from_config(&ProviderConfig {
            api_key: Some(api_key.into()),
            ..ProviderConfig::default()
        })
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                ChatError::Config(format!(
                    "No OpenRouter API key configured (set {} or provider.api_key)",
                    ENV_OPENROUTER_API_KEY
                ))
            })?;

        let timeout = Duration::from_secs(config.timeout_seconds);
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ChatError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            referer: config.referer.clone(),
            timeout,
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .bearer_auth(&self.api_key)
            .header("X-Title", CLIENT_TITLE);
        match &self.referer {
            Some(referer) => request.header("HTTP-Referer", referer),
            None => request,
        }
    }

    /// Fetch the model catalog
    pub async fn fetch_models(&self) -> Result<Vec<ModelDescriptor>> {
        let response = self
            .authorized(self.http.get(format!("{}/models", self.base_url)))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ChatError::Transport(format!("Failed to fetch models: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ChatError::Transport(format!("Failed to read models response: {}", e)))?;

        if !status.is_success() {
            return Err(ChatError::Transport(format!(
                "Model catalog request returned {}: {}",
                status, body
            )));
        }

        let models = parse_models(&body)?;
        debug!("Fetched {} models", models.len());
        Ok(models)
    }

    /// A key is considered valid when the catalog can be fetched with it
    pub async fn validate_api_key(&self) -> bool {
        match self.fetch_models().await {
            Ok(_) => true,
            Err(e) => {
                warn!("API key validation failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenRouterClient {
    async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream> {
        debug!(
            "Opening completion stream: model={}, messages={}, tools={}",
            request.model,
            request.messages.len(),
            request.tools.len()
        );

        let response = self
            .authorized(self.http.post(format!("{}/chat/completions", self.base_url)))
            .json(&build_request_body(&request))
            .send()
            .await
            .map_err(|e| ChatError::Transport(format!("Completion request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ChatError::Transport(format!(
                "OpenRouter returned {}: {}",
                status, detail
            )));
        }

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(pump_events(response.bytes_stream(), tx));
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Forward parsed SSE events until `[DONE]`, an error, or the receiver goes away
/// Forward parsed SSE chunks to `tx` until the stream ends or the consumer goes away
async fn pump_events<S, B, E>(body: S, tx: mpsc::Sender<Result<StreamChunk>>)
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    let mut events = pin!(body.eventsource());

    loop {
        let event = tokio::select! {
            _ = tx.closed() => {
                debug!("Stream consumer dropped; closing connection");
                return;
            }
            event = events.next() => match event {
                Some(event) => event,
                None => return,
            },
        };

        let item = match event {
            Ok(event) => {
                let data = event.data.trim();
                trace!("SSE data: {}", data);
                if data.is_empty() {
                    continue;
                }
                if data == DONE_SENTINEL {
                    debug!("Completion stream finished");
                    return;
                }
                match parse_chunk(data) {
                    Ok(Some(chunk)) => Ok(chunk),
                    Ok(None) => continue,
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(ChatError::Transport(format!("SSE stream error: {}", e))),
        };

        let failed = item.is_err();
        if let Err(e) = &item {
            error!("{}", e);
        }
        if tx.send(item).await.is_err() {
            debug!("Stream consumer dropped; stopping");
            return;
        }
        if failed {
            return;
        }
    }
}

#[derive(Debug, Deserialize)]
struct SseEnvelope {
    #[serde(default)]
    choices: Vec<SseChoice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SseChoice {
    #[serde(default)]
    delta: Option<SseDelta>,
}

#[derive(Debug, Deserialize)]
struct SseDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<SseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct SseToolCall {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<SseFunction>,
}

#[derive(Debug, Deserialize)]
struct SseFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Parse one SSE `data:` payload. `Ok(None)` for chunks with nothing to apply
/// (role-only deltas, finish markers, usage records).
pub(crate) fn parse_chunk(data: &str) -> Result<Option<StreamChunk>> {
    let envelope: SseEnvelope = serde_json::from_str(data)
        .map_err(|e| ChatError::Transport(format!("Malformed stream chunk: {} ({})", e, data)))?;

    if let Some(err) = envelope.error {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| err.as_str())
            .unwrap_or("An error occurred during streaming")
            .to_string();
        return Err(ChatError::Transport(format!("Provider error: {}", message)));
    }

    let Some(delta) = envelope.choices.into_iter().next().and_then(|c| c.delta) else {
        return Ok(None);
    };

    let tool_calls = delta
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(position, call)| {
            let (name, arguments) = match call.function {
                Some(function) => (function.name, function.arguments),
                None => (None, None),
            };
            ToolCallFragment {
                index: call.index.unwrap_or(position),
                id: call.id,
                name,
                arguments,
            }
        })
        .collect();

    let chunk = StreamChunk {
        content: delta.content,
        tool_calls,
    };
    Ok((!chunk.is_empty()).then_some(chunk))
}

fn wire_message(message: &ProviderMessage) -> Value {
    match message {
        ProviderMessage::System(content) => json!({ "role": "system", "content": content }),
        ProviderMessage::User(content) => json!({ "role": "user", "content": content }),
        ProviderMessage::Assistant {
            content,
            tool_calls,
        } if !tool_calls.is_empty() => {
            let calls: Vec<Value> = tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": { "name": call.name, "arguments": call.arguments }
                    })
                })
                .collect();
            let content = if content.is_empty() {
                Value::Null
            } else {
                Value::String(content.clone())
            };
            json!({ "role": "assistant", "content": content, "tool_calls": calls })
        }
        ProviderMessage::Assistant { content, .. } => {
            json!({ "role": "assistant", "content": content })
        }
        ProviderMessage::Tool { call_id, content } => {
            json!({ "role": "tool", "tool_call_id": call_id, "content": content })
        }
    }
}

pub(crate) fn build_request_body(request: &CompletionRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "messages": request.messages.iter().map(wire_message).collect::<Vec<_>>(),
        "stream": true,
    });

    if !request.tools.is_empty() {
        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect();
        body["tools"] = Value::Array(tools);
    }

    body
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    context_length: Option<u64>,
    #[serde(default)]
    pricing: Option<ModelEntryPricing>,
    #[serde(default)]
    supported_parameters: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ModelEntryPricing {
    #[serde(default)]
    prompt: Value,
    #[serde(default)]
    completion: Value,
}

/// Per-token price (string or number) to a per-million rate
fn per_million(price: &Value) -> f64 {
    let per_token = match price {
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    };
    per_token * TOKENS_PER_PRICING_UNIT
}

/// Parse an OpenRouter `/models` response body into model descriptors
pub fn parse_models(body: &str) -> Result<Vec<ModelDescriptor>> {
    let response: ModelsResponse = serde_json::from_str(body)?;

    Ok(response
        .data
        .into_iter()
        .map(|entry| {
            let pricing = entry
                .pricing
                .map(|p| ModelPricing::new(per_million(&p.prompt), per_million(&p.completion)))
                .unwrap_or_default();
            let supports_tools = entry
                .supported_parameters
                .unwrap_or_default()
                .iter()
                .any(|p| p == TOOLS_PARAMETER);

            ModelDescriptor {
                name: entry.name.unwrap_or_else(|| entry.id.clone()),
                id: entry.id,
                context_length: entry.context_length.unwrap_or_default(),
                pricing,
                supports_tools,
            }
        })
        .collect())
}
