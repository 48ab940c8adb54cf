use std::time::Duration;

use async_trait::async_trait;
use bookbuddy_core::config::{LlmConfig, LlmProvider};
use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::llm::{AgentClient, AgentError, InvocationRequest};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 1024;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(8);

/// `AgentClient` backed by a hosted or local chat completion API.
#[derive(Clone, Debug)]
pub struct HttpAgentClient {
    client: reqwest::Client,
    provider: LlmProvider,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    max_retries: u32,
}

impl HttpAgentClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| AgentError::Configuration(error.to_string()))?;

        let base_url = config
            .base_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| default_base_url(config.provider).to_string());

        Ok(Self {
            client,
            provider: config.provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    async fn with_retries<F, Fut>(
        &self,
        operation: &'static str,
        mut call: F,
    ) -> Result<Value, AgentError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<Value, AgentError>>,
    {
        let mut attempt = 0u32;
        loop {
            match call().await {
                Ok(body) => return Ok(body),
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "agent.http.retry",
                        operation,
                        attempt,
                        max_retries = self.max_retries,
                        error = %error,
                        "retrying agent request"
                    );
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> Result<RequestBuilder, AgentError> {
        match self.provider {
            LlmProvider::Ollama => Ok(builder),
            LlmProvider::OpenAi => Ok(builder.bearer_auth(self.api_key()?)),
            LlmProvider::Anthropic => Ok(builder
                .header("x-api-key", self.api_key()?)
                .header("anthropic-version", ANTHROPIC_VERSION)),
        }
    }

    fn api_key(&self) -> Result<&str, AgentError> {
        self.api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AgentError::Configuration(format!("{:?} requires an api key", self.provider))
            })
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Value, AgentError> {
        let response = self
            .authorize(builder)?
            .send()
            .await
            .map_err(|error| AgentError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Status { status: status.as_u16(), body });
        }

        response
            .json::<Value>()
            .await
            .map_err(|error| AgentError::MalformedResponse(error.to_string()))
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn invoke(&self, request: &InvocationRequest) -> Result<String, AgentError> {
        let endpoint = format!("{}{}", self.base_url, chat_path(self.provider));
        let payload = chat_payload(self.provider, &self.model, request);

        debug!(
            event_name = "agent.http.invoke",
            session_id = %request.session_id,
            provider = ?self.provider,
            prior_turns = request.history.len(),
            "sending agent request"
        );

        let body = self
            .with_retries("invoke", || self.send(self.client.post(&endpoint).json(&payload)))
            .await?;

        completion_text(self.provider, &body)
            .filter(|text| !text.trim().is_empty())
            .ok_or(AgentError::EmptyCompletion)
    }

    async fn verify_model(&self) -> Result<(), AgentError> {
        let endpoint = format!("{}{}", self.base_url, models_path(self.provider));
        let body =
            self.with_retries("verify_model", || self.send(self.client.get(&endpoint))).await?;

        let available = listed_models(self.provider, &body);
        if model_is_listed(&self.model, &available) {
            Ok(())
        } else {
            Err(AgentError::ModelUnavailable { model: self.model.clone(), available })
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Doubles from `RETRY_BASE_DELAY` per attempt, capped at `RETRY_MAX_DELAY`.
fn backoff_delay(attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    RETRY_BASE_DELAY.saturating_mul(factor).min(RETRY_MAX_DELAY)
}

fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "https://api.openai.com",
        LlmProvider::Anthropic => "https://api.anthropic.com",
        LlmProvider::Ollama => "http://localhost:11434",
    }
}

fn chat_path(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "/v1/chat/completions",
        LlmProvider::Anthropic => "/v1/messages",
        LlmProvider::Ollama => "/api/chat",
    }
}

fn models_path(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => "/v1/models",
        LlmProvider::Ollama => "/api/tags",
    }
}

fn conversation_messages(request: &InvocationRequest) -> Vec<Value> {
    let mut messages = Vec::with_capacity(request.history.len() * 2 + 1);
    for turn in &request.history {
        messages.push(json!({ "role": "user", "content": turn.query }));
        messages.push(json!({ "role": "assistant", "content": turn.reply }));
    }
    messages.push(json!({ "role": "user", "content": request.input }));
    messages
}

fn chat_payload(provider: LlmProvider, model: &str, request: &InvocationRequest) -> Value {
    let conversation = conversation_messages(request);
    match provider {
        LlmProvider::Anthropic => json!({
            "model": model,
            "max_tokens": ANTHROPIC_MAX_TOKENS,
            "system": request.instruction,
            "messages": conversation,
        }),
        LlmProvider::OpenAi | LlmProvider::Ollama => {
            let mut messages = vec![json!({ "role": "system", "content": request.instruction })];
            messages.extend(conversation);
            let mut payload = json!({ "model": model, "messages": messages });
            if provider == LlmProvider::Ollama {
                payload["stream"] = Value::Bool(false);
            }
            payload
        }
    }
}

fn completion_text(provider: LlmProvider, body: &Value) -> Option<String> {
    match provider {
        LlmProvider::OpenAi => body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .map(ToString::to_string),
        LlmProvider::Ollama => body
            .get("message")
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .map(ToString::to_string),
        LlmProvider::Anthropic => {
            let blocks = body.get("content").and_then(Value::as_array)?;
            let text = blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect::<String>();
            Some(text)
        }
    }
}

fn listed_models(provider: LlmProvider, body: &Value) -> Vec<String> {
    let (collection, key) = match provider {
        LlmProvider::Ollama => ("models", "name"),
        LlmProvider::OpenAi | LlmProvider::Anthropic => ("data", "id"),
    };

    let mut models = body
        .get(collection)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(key).and_then(Value::as_str))
                .map(ToString::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    models.sort();
    models.dedup();
    models
}

/// Ollama lists tagged names (`llama3.1:latest`), so an untagged model matches any tag.
fn model_is_listed(model: &str, available: &[String]) -> bool {
    available.iter().any(|listed| {
        listed == model
            || listed.strip_prefix(model).is_some_and(|rest| rest.starts_with(':'))
    })
}
