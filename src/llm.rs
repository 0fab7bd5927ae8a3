use crate::{config::LlmEndpoint, log_internal};
use anyhow::{anyhow, Result};

/// Chat-completion endpoint.  One request per conversation turn.
#[serenity::async_trait]
pub trait ChatLlm: Send + Sync {
    /// Send the prompt and return the text of the first choice.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub role: ChatMessageRole,
    pub content: String,
}

#[allow(non_camel_case_types)] // Serialized literally; case matters
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ChatMessageRole {
    system,
    user,
    assistant,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatMessageRole::system,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatMessageRole::user,
            content: content.into(),
        }
    }
}

#[derive(serde::Serialize)]
struct LlmChatRequest<'a> {
    /// Chat conversation to continue.
    messages: &'a [ChatMessage],
    /// Sampling options, e.g. temperature or max_tokens, sent as top level fields.
    #[serde(flatten)]
    model_params: &'a serde_json::Map<String, serde_json::Value>,
}

#[derive(serde::Deserialize)]
struct LlmChatResponse {
    choices: Vec<LlmChatChoice>,
}

#[derive(serde::Deserialize)]
struct LlmChatChoice {
    message: ChatMessage,
}

impl LlmChatResponse {
    fn first_choice_text(self) -> Result<String> {
        self.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(anyhow!("LLM response contained no choices"))
    }
}

/// HTTP client for a llama.cpp server's OpenAI-compatible chat route
pub struct LlmClient {
    client: reqwest::Client,
    chat_url: String,
    model_params: serde_json::Map<String, serde_json::Value>,
}

impl LlmClient {
    pub fn new(
        endpoint: &LlmEndpoint,
        model_params: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            chat_url: chat_url(&endpoint.base_url),
            model_params,
        }
    }
}

fn chat_url(base_url: &str) -> String {
    format!("{}/v1/chat/completions", base_url.trim_end_matches('/'))
}

#[serenity::async_trait]
impl ChatLlm for LlmClient {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = LlmChatRequest {
            messages,
            model_params: &self.model_params,
        };

        log_internal!("Sending request to chat endpoint {}... ", self.chat_url);
        let response = self
            .client
            .post(&self.chat_url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<LlmChatResponse>()
            .await?;
        log_internal!("Sending request to chat endpoint {}... done", self.chat_url);

        response.first_choice_text()
    }
}
