use super::{ChatModel, Decision, ModelFuture};
use crate::api::client::{ChatClient, ChatCompletion, ChatRequest};
use crate::api::retry::{RetryConfig, retry_call};
use crate::{Message, ToolDef};
use tracing::{debug, warn};

/// [`ChatModel`] backed by an OpenAI-compatible HTTP endpoint.
pub struct RemoteModel {
    client: ChatClient,
    model: String,
    system_prompt: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    retry: RetryConfig,
}

impl RemoteModel {
    pub fn new(client: ChatClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            system_prompt: None,
            max_tokens: None,
            temperature: None,
            retry: RetryConfig::default(),
        }
    }

    /// Prepend a system prompt to every request. It is not stored in history.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn request(&self, history: &[Message], tools: &[ToolDef]) -> ChatRequest {
        ChatRequest {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            ..ChatRequest::new(&self.model, self.system_prompt.as_deref(), history, tools)
        }
    }
}

/// Map a completion onto a decision. Tool calls win over text.
pub(crate) fn decision_from(completion: ChatCompletion) -> Decision {
    if completion.tool_calls.is_empty() {
        let text = completion.content.unwrap_or_default();
        if text.is_empty() {
            warn!(
                "Model returned neither text nor tool calls (finish_reason={:?})",
                completion.finish_reason
            );
        }
        Decision::Reply(text)
    } else {
        if let Some(text) = completion.content.as_deref()
            && !text.trim().is_empty()
        {
            debug!("Dropping text alongside tool calls: {text}");
        }
        Decision::ToolRequest(completion.tool_calls)
    }
}

impl ChatModel for RemoteModel {
    fn decide<'a>(&'a self, history: &'a [Message], tools: &'a [ToolDef]) -> ModelFuture<'a> {
        Box::pin(async move {
            let body = self.request(history, tools);
            let completion = retry_call(&self.retry, || self.client.chat(&body)).await?;
            Ok(decision_from(completion))
        })
    }

    fn name(&self) -> &str {
        &self.model
    }
}
