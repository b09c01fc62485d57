//! Image description
//!
//! One image per document session is turned into a single `image`-tagged
//! chunk so it can be retrieved like text.
use crate::error::{DocentError, ProviderError, Result};
use crate::generation::{ChatMessage, ChatRequest, ChatResponse};
use crate::http::JsonClient;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// Default vision model
pub const DEFAULT_VISION_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";

/// Instruction sent with every image
pub const DESCRIBE_PROMPT: &str = "Describe this image clearly.";

/// Image-to-text capability
pub trait ImageDescriber: Send + Sync {
    /// Describe the image in plain text
    fn describe(&self, image: &[u8], mime: &str) -> std::result::Result<String, ProviderError>;

    fn name(&self) -> &str;
}

/// Raw image supplied alongside a document
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ImageInput {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    /// Read an image file, inferring the MIME type from its extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let mime = mime_for_path(path).ok_or_else(|| {
            DocentError::UnsupportedContent(format!(
                "{} is not a supported image (png, jpg, jpeg)",
                path.display()
            ))
        })?;

        let bytes = std::fs::read(path).map_err(|e| DocentError::Io {
            source: e,
            context: format!("Failed to read image {}", path.display()),
        })?;

        if bytes.is_empty() {
            return Err(DocentError::UnsupportedContent(format!(
                "{} is empty",
                path.display()
            )));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self::new(name, mime, bytes))
    }
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

/// Encode image bytes as a `data:` URL
pub fn data_url(image: &[u8], mime: &str) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(image))
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

/// Groq multimodal chat completions
pub struct GroqVisionProvider {
    client: JsonClient,
    url: String,
    model: String,
}

impl GroqVisionProvider {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> std::result::Result<Self, ProviderError> {
        Ok(Self {
            client: JsonClient::new("Groq", api_key, timeout)?,
            url: crate::generation::GROQ_CHAT_URL.to_string(),
            model: DEFAULT_VISION_MODEL.to_string(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

impl ImageDescriber for GroqVisionProvider {
    fn describe(&self, image: &[u8], mime: &str) -> std::result::Result<String, ProviderError> {
        tracing::debug!(
            "Requesting description of {} byte image from {} ({})",
            image.len(),
            self.client.provider(),
            self.model
        );

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: DESCRIBE_PROMPT,
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: data_url(image, mime),
                        },
                    },
                ],
            }],
            temperature: 0.0,
        };
        let response: ChatResponse = self.client.post(&self.url, &request)?;

        Ok(response.into_text(self.client.provider())?.trim().to_string())
    }

    fn name(&self) -> &str {
        self.client.provider()
    }
}
