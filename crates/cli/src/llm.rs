use anyhow::{anyhow, Context as AnyhowContext, Result};
use async_trait::async_trait;
use reelqa_search::{GenerationOptions, Generator};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;

pub(crate) const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub(crate) const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
const SYSTEM_PROMPT: &str = "You are a precise, context-grounded assistant.";
const ERROR_BODY_CHARS: usize = 300;

/// OpenAI-compatible `POST {base}/chat/completions` client.
pub(crate) struct ChatCompletionsGenerator {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl ChatCompletionsGenerator {
    pub(crate) fn new(base_url: &str, model: &str, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint(base_url),
            model: model.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    /// `REELQA_LLM_BASE_URL`, `REELQA_LLM_MODEL`, and `REELQA_LLM_API_KEY` (or `GROQ_API_KEY`).
    pub(crate) fn from_env() -> Result<Self> {
        let base_url = env::var("REELQA_LLM_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = env::var("REELQA_LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let api_key = env::var("REELQA_LLM_API_KEY")
            .or_else(|_| env::var("GROQ_API_KEY"))
            .ok();
        if api_key.is_none() {
            log::warn!("No REELQA_LLM_API_KEY or GROQ_API_KEY set; sending unauthenticated requests");
        }
        Self::new(&base_url, &model, api_key)
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(crate) fn model(&self) -> &str {
        &self.model
    }

    pub(crate) const fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let body = request_body(&self.model, prompt, options);
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Request to {} failed", self.endpoint))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read chat completions response")?;
        if !status.is_success() {
            let snippet: String = text.chars().take(ERROR_BODY_CHARS).collect();
            anyhow::bail!("{} returned {status}: {snippet}", self.endpoint);
        }
        parse_content(&text)
    }
}

fn endpoint(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim().trim_end_matches('/'))
}

fn request_body<'a>(model: &'a str, prompt: &'a str, options: &GenerationOptions) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: [
            ChatMessage {
                role: "system",
                content: SYSTEM_PROMPT,
            },
            ChatMessage {
                role: "user",
                content: prompt,
            },
        ],
        temperature: options.temperature,
        max_tokens: options.max_tokens,
    }
}

fn parse_content(body: &str) -> Result<String> {
    let parsed: ChatResponse =
        serde_json::from_str(body).context("Invalid chat completions response")?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .ok_or_else(|| anyhow!("Chat completions response has no message content"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn endpoint_joins_base_url() {
        assert_eq!(
            endpoint("https://api.groq.com/openai/v1/"),
            "https://api.groq.com/openai/v1/chat/completions"
        );
        assert_eq!(
            endpoint("http://127.0.0.1:8080/v1"),
            "http://127.0.0.1:8080/v1/chat/completions"
        );
    }

    #[test]
    fn request_carries_system_and_user_messages() {
        let options = GenerationOptions::default();
        let body = serde_json::to_value(request_body(DEFAULT_MODEL, "Question?", &options)).unwrap();
        assert_eq!(body["model"], "llama-3.3-70b-versatile");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(
            body["messages"],
            json!([
                {"role": "system", "content": "You are a precise, context-grounded assistant."},
                {"role": "user", "content": "Question?"}
            ])
        );
    }

    #[test]
    fn parses_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  Michael Mann\n"}}]}"#;
        assert_eq!(parse_content(body).unwrap(), "Michael Mann");

        assert!(parse_content(r#"{"choices":[]}"#).is_err());
        assert!(parse_content(r#"{"choices":[{"message":{"content":null}}]}"#).is_err());
        assert!(parse_content("<html>").is_err());
    }

    #[test]
    fn blank_api_key_is_dropped() {
        let generator = ChatCompletionsGenerator::new("http://localhost:9/v1", "m", Some("  ".into()))
            .unwrap();
        assert!(!generator.has_api_key());
        assert_eq!(generator.model(), "m");
        assert_eq!(generator.endpoint(), "http://localhost:9/v1/chat/completions");
    }
}
