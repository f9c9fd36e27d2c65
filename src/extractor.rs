//! Extraction client: prompts a multimodal model to transcribe an image
//! of a mathematical expression into LaTeX.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Fixed instruction steering the model to emit a bare LaTeX expression.
const SYSTEM_PROMPT: &str = r#"
Extract the equation from the image in valid latex without any delimiters.
Do not include any other text besides the extracted formula.

Examples:
"y = mx + b"
"x^2 + y^2 = r^2"
"\int_{0}^{1} x^2 dx"
"#;

const USER_PROMPT: &str = "Extract the formula";

/// Boundary between the request handler and the model provider.
///
/// The handler only sees this trait, so tests can substitute a stub model.
#[async_trait::async_trait]
pub trait FormulaExtractor: Send + Sync {
    /// Transcribe the image into a LaTeX formula.
    ///
    /// The model's response text is returned unmodified: no delimiter
    /// stripping, no LaTeX validation, no retry on malformed output.
    async fn extract_formula(&self, image: &[u8]) -> Result<String>;
}

/// OpenRouter chat-completions client.
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    model: String,
}

impl OpenRouterClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    async fn send_request(&self, request: ChatCompletionRequest) -> Result<String> {
        debug!("Sending request to OpenRouter: model={}", request.model);

        let response = self
            .client
            .post(OPENROUTER_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send request to OpenRouter")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenRouter API error ({}): {}", status, error_text);
        }

        let response: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse OpenRouter response")?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        info!(
            "OpenRouter response: {} tokens (prompt: {}, completion: {})",
            response.usage.total_tokens,
            response.usage.prompt_tokens,
            response.usage.completion_tokens
        );

        Ok(content)
    }
}

#[async_trait::async_trait]
impl FormulaExtractor for OpenRouterClient {
    async fn extract_formula(&self, image: &[u8]) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(SYSTEM_PROMPT),
                Message::user_with_image(USER_PROMPT, image),
            ],
            max_tokens: Some(1024),
        };

        self.send_request(request).await
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// ============================================================================
// Message types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: Role,
    content: MessageContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
enum Role {
    System,
    User,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
struct ImageUrl {
    url: String,
}

impl Message {
    fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(content.into()),
        }
    }

    /// User message with text and one image attached as a base64 data URL.
    fn user_with_image(text: impl Into<String>, image: &[u8]) -> Self {
        let base64_data = BASE64.encode(image);
        // Assume PNG for now, could detect from magic bytes
        let data_url = format!("data:image/png;base64,{}", base64_data);

        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: data_url },
                },
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_forbids_delimiters() {
        assert!(SYSTEM_PROMPT.contains("without any delimiters"));
        assert!(SYSTEM_PROMPT.contains(r"\int_{0}^{1} x^2 dx"));
    }

    #[test]
    fn test_system_message_serializes_as_plain_text() {
        let msg = Message::system("instructions");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(json["content"], "instructions");
    }

    #[test]
    fn test_user_message_attaches_image_as_data_url() {
        let msg = Message::user_with_image("Extract the formula", b"validpng");
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["role"], "user");
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][0]["text"], "Extract the formula");
        assert_eq!(json["content"][1]["type"], "image_url");
        assert_eq!(
            json["content"][1]["image_url"]["url"],
            format!("data:image/png;base64,{}", BASE64.encode(b"validpng"))
        );
    }

    #[test]
    fn test_request_omits_max_tokens_when_unset() {
        let request = ChatCompletionRequest {
            model: "anthropic/claude-3.5-sonnet".to_string(),
            messages: vec![Message::system("s")],
            max_tokens: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("max_tokens").is_none());
    }
}
