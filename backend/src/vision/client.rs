use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use shared::Finding;
use url::Url;

use super::prompt::{SYSTEM_PROMPT, user_instruction};
use super::reply::interpret_reply;
use crate::analysis::AnalysisRequest;
use crate::config::VisionConfig;
use crate::imaging::{self, EncodedImage, ImageError};

pub const TRANSPORT_ERROR: &str = "Error communicating with the AI service";

#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("AI service returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("AI service returned no content")]
    EmptyReply,
    #[error("AI reply was truncated at the token limit ({0} chars)")]
    Truncated(usize),
    #[error("Could not prepare the image: {0}")]
    Image(#[from] ImageError),
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat-completion endpoint with vision
/// support (Azure AI inference, GitHub models, OpenAI itself).
#[derive(Clone)]
pub struct VisionClient {
    http_client: HttpClient,
    completions_url: Url,
    api_key: String,
    model: String,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    max_dimension: u32,
}

impl VisionClient {
    pub fn new(config: &VisionConfig) -> Result<Self, VisionError> {
        let http_client = HttpClient::builder().timeout(config.timeout).build()?;

        let mut completions_url = config.endpoint.clone();
        let path = format!(
            "{}/chat/completions",
            config.endpoint.path().trim_end_matches('/')
        );
        completions_url.set_path(&path);

        if config.api_key.is_empty() {
            log::warn!("AZURE_API_KEY is empty; requests to {} will likely be rejected", completions_url);
        }

        Ok(Self {
            http_client,
            completions_url,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
            max_dimension: config.max_dimension,
        })
    }

    pub fn completions_url(&self) -> &Url {
        &self.completions_url
    }

    /// Analyzes one image. Transport and parsing failures are folded into
    /// the canonical error record.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Finding {
        let image = match imaging::prepare_for_upload(&request.image, self.max_dimension) {
            Ok(image) => image,
            Err(e) => {
                log::error!("[{}] Could not prepare image for upload: {}", request.id, e);
                return Finding::failure(format!("Error: {}", e), TRANSPORT_ERROR);
            }
        };

        log::info!("[{}] Sending image to {} for analysis", request.id, self.model);
        match self
            .complete(
                &image,
                request.category_hint.as_deref(),
                request.description.as_deref(),
            )
            .await
        {
            Ok(reply) => {
                log::info!("[{}] Received analysis reply", request.id);
                log::debug!("[{}] Raw reply: {}", request.id, reply);
                interpret_reply(&reply, request.hint_department())
            }
            Err(e) => {
                log::error!("[{}] Image analysis failed: {}", request.id, e);
                Finding::failure(format!("Error: {}", e), TRANSPORT_ERROR)
            }
        }
    }

    /// Sends the prompt and image, returning the assistant's raw text.
    pub async fn complete(
        &self,
        image: &EncodedImage,
        category_hint: Option<&str>,
        description: Option<&str>,
    ) -> Result<String, VisionError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(SYSTEM_PROMPT.to_string()),
                },
                ChatMessage {
                    role: "user",
                    content: MessageContent::Parts(vec![
                        ContentPart::Text {
                            text: user_instruction(category_hint, description),
                        },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: image.data_url(),
                            },
                        },
                    ]),
                },
            ],
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
        };

        let response = self
            .http_client
            .post(self.completions_url.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(VisionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let completion: ChatCompletion = response.json().await?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or(VisionError::EmptyReply)?;
        let content = choice
            .message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or(VisionError::EmptyReply)?;

        if choice.finish_reason.as_deref() == Some("length") {
            log::warn!("AI reply hit max_tokens={}", self.max_tokens);
            return Err(VisionError::Truncated(content.len()));
        }
        Ok(content)
    }
}
