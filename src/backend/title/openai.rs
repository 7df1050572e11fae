use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{TitleGenerator, normalize_title};
use crate::{
    backend::repo::message::{Message, Role},
    config::Config,
};

const SYSTEM_PROMPT: &str = "You generate titles for conversations in a chat application. \
Find the most concise title that captures the essence of the conversation. \
Titles should be at most 30 characters. \
Capitalize the first letter of each word and do not end with a period. \
Use no punctuation or emojis. Keep acronyms used in the conversation. \
Use formal words like troubleshooting, support, options or research. \
Do not use the words chat, conversation or discussion. \
Return only the title.";

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatCompletionMessage>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatCompletionMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

/// Title generator backed by any OpenAI compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiTitleGenerator {
    http_client: Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiTitleGenerator {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.title_api_base.clone(),
            config.title_api_key.clone(),
            config.title_model.clone(),
        )
    }

    fn request_messages(messages: &[Message]) -> Vec<ChatCompletionMessage> {
        let mut out = vec![ChatCompletionMessage {
            role: Role::System.to_string(),
            content: SYSTEM_PROMPT.to_string(),
        }];
        out.extend(
            messages
                .iter()
                .filter(|message| message.role != Role::System)
                .map(|message| ChatCompletionMessage {
                    role: message.role.to_string(),
                    content: message.text(),
                })
                .filter(|message| !message.content.trim().is_empty()),
        );
        out
    }
}

impl TitleGenerator for OpenAiTitleGenerator {
    async fn generate_title(&self, messages: &[Message]) -> anyhow::Result<String> {
        let request_messages = Self::request_messages(messages);
        if request_messages.len() == 1 {
            anyhow::bail!("no text to generate a title from");
        }

        let mut request = self
            .http_client
            .post(format!("{}/chat/completions", self.api_base))
            .json(&ChatCompletionRequest {
                model: &self.model,
                messages: request_messages,
                max_tokens: 20,
                stream: false,
            });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "title completion failed with status {status}: {body}"
            ));
        }

        let completion = serde_json::from_str::<ChatCompletionResponse>(&body).map_err(|err| {
            anyhow::anyhow!("title completion returned unexpected body: {err}; body={body}")
        })?;
        let raw = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("title completion returned no choices"))?;

        normalize_title(&raw)
    }
}
