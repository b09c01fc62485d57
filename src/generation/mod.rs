//! Grounded answer generation
//!
//! [`GroundedAnswerer`] owns the prompt and response trimming; the actual
//! completion is delegated to a [`GenerationProvider`].
use crate::error::ProviderError;
use crate::http::JsonClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Groq OpenAI-compatible chat completions endpoint
pub const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Default generation model
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

/// Models offered for selection, default first
pub const SUPPORTED_MODELS: &[&str] = &[DEFAULT_MODEL, "openai/gpt-oss-120b"];

/// Reply the model is told to give when the context lacks the answer
pub const NOT_ENOUGH_INFORMATION: &str = "Not enough information in the provided context.";

/// Text generation capability
pub trait GenerationProvider: Send + Sync {
    /// Complete `prompt` with the given model
    fn generate(&self, prompt: &str, model: &str) -> Result<String, ProviderError>;

    fn name(&self) -> &str;
}

/// Whether `model` is one of the offered models
pub fn is_supported_model(model: &str) -> bool {
    SUPPORTED_MODELS.contains(&model)
}

#[derive(Serialize)]
pub(crate) struct ChatRequest<'a, C: Serialize> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<C>>,
    pub temperature: f32,
}

#[derive(Serialize)]
pub(crate) struct ChatMessage<C: Serialize> {
    pub role: &'static str,
    pub content: C,
}

#[derive(Deserialize)]
pub(crate) struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    /// Content of the first choice
    pub(crate) fn into_text(self, provider: &str) -> Result<String, ProviderError> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::Response {
                provider: provider.to_string(),
                message: "Response contained no message content".to_string(),
            })
    }
}

/// Groq chat completions over HTTPS
pub struct GroqChatProvider {
    client: JsonClient,
    url: String,
    temperature: f32,
}

impl GroqChatProvider {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: JsonClient::new("Groq", api_key, timeout)?,
            url: GROQ_CHAT_URL.to_string(),
            temperature: 0.0,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

impl GenerationProvider for GroqChatProvider {
    fn generate(&self, prompt: &str, model: &str) -> Result<String, ProviderError> {
        tracing::debug!("Requesting completion from {} ({})", self.client.provider(), model);

        let request = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };
        let response: ChatResponse = self.client.post(&self.url, &request)?;

        response.into_text(self.client.provider())
    }

    fn name(&self) -> &str {
        self.client.provider()
    }
}

/// Builds context-constrained prompts and returns trimmed answers
pub struct GroundedAnswerer {
    provider: Arc<dyn GenerationProvider>,
    fallback_phrase: String,
}

impl GroundedAnswerer {
    pub fn new(provider: Arc<dyn GenerationProvider>, fallback_phrase: impl Into<String>) -> Self {
        Self {
            provider,
            fallback_phrase: fallback_phrase.into(),
        }
    }

    pub fn fallback_phrase(&self) -> &str {
        &self.fallback_phrase
    }

    pub fn build_prompt(&self, context: &str, question: &str) -> String {
        format!(
            "Answer only using the context below.\n\
             If the answer is not present, respond with: \"{}\"\n\
             \n\
             Context:\n\
             {}\n\
             \n\
             Question: {}\n\
             \n\
             Answer:",
            self.fallback_phrase, context, question
        )
    }

    /// Generate an answer to `question` from `context` alone
    ///
    /// Provider failures are returned unchanged; nothing is retried.
    pub fn answer(&self, context: &str, question: &str, model: &str) -> Result<String, ProviderError> {
        let prompt = self.build_prompt(context, question);
        let raw = self.provider.generate(&prompt, model)?;
        Ok(raw.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct EchoProvider {
        prompts: Mutex<Vec<(String, String)>>,
        reply: Result<String, ProviderError>,
    }

    impl EchoProvider {
        fn replying(reply: &str) -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                reply: Ok(reply.to_string()),
            }
        }
    }

    impl GenerationProvider for EchoProvider {
        fn generate(&self, prompt: &str, model: &str) -> Result<String, ProviderError> {
            self.prompts
                .lock()
                .unwrap()
                .push((prompt.to_string(), model.to_string()));
            self.reply.clone()
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    #[test]
    fn test_prompt_layout() {
        let answerer = GroundedAnswerer::new(
            Arc::new(EchoProvider::replying("")),
            NOT_ENOUGH_INFORMATION,
        );
        let prompt = answerer.build_prompt("Cats purr.", "Do cats purr?");

        assert!(prompt.starts_with("Answer only using the context below.\n"));
        assert!(prompt.contains(
            "respond with: \"Not enough information in the provided context.\"\n\nContext:\nCats purr.\n\n"
        ));
        assert!(prompt.ends_with("Question: Do cats purr?\n\nAnswer:"));
    }

    #[test]
    fn test_answer_is_trimmed_and_model_forwarded() {
        let provider = Arc::new(EchoProvider::replying("  \n Yes, they purr.\n"));
        let answerer = GroundedAnswerer::new(provider.clone(), NOT_ENOUGH_INFORMATION);

        let answer = answerer
            .answer("Cats purr.", "Do cats purr?", "openai/gpt-oss-120b")
            .unwrap();

        assert_eq!(answer, "Yes, they purr.");
        let prompts = provider.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].1, "openai/gpt-oss-120b");
        assert!(prompts[0].0.contains("Cats purr."));
    }

    #[test]
    fn test_provider_error_propagates() {
        let provider = Arc::new(EchoProvider {
            prompts: Mutex::new(Vec::new()),
            reply: Err(ProviderError::RateLimit {
                provider: "echo".to_string(),
                message: "slow down".to_string(),
            }),
        });
        let answerer = GroundedAnswerer::new(provider, NOT_ENOUGH_INFORMATION);

        let result = answerer.answer("ctx", "q", DEFAULT_MODEL);
        assert!(matches!(result, Err(ProviderError::RateLimit { .. })));
    }

    #[test]
    fn test_supported_models() {
        assert!(is_supported_model("llama-3.1-8b-instant"));
        assert!(is_supported_model("openai/gpt-oss-120b"));
        assert!(!is_supported_model("gpt-4"));
        assert_eq!(SUPPORTED_MODELS[0], DEFAULT_MODEL);
    }

    #[test]
    fn test_chat_response_parsing() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"Hi"}}]}"#;
        let response: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.into_text("Groq").unwrap(), "Hi");

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            empty.into_text("Groq"),
            Err(ProviderError::Response { .. })
        ));
    }

    #[test]
    #[ignore] // Requires GROQ_API_KEY and network access
    fn test_groq_generate() {
        let key = std::env::var("GROQ_API_KEY").unwrap();
        let provider = GroqChatProvider::new(key, Duration::from_secs(30)).unwrap();
        let reply = provider.generate("Say hello.", DEFAULT_MODEL).unwrap();
        assert!(!reply.is_empty());
    }
}
