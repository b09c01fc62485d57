//! Blocking HTTP plumbing shared by the provider clients
//!
//! Every call is a single request with a bounded timeout. Failures are
//! classified into [`ProviderError`] kinds so callers can tell auth, rate
//! limit and network problems apart.
use crate::error::ProviderError;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest error body excerpt kept in a [`ProviderError`] message
const MAX_ERROR_BODY: usize = 300;

/// JSON-over-HTTPS client for one provider
#[derive(Debug, Clone)]
pub struct JsonClient {
    client: Client,
    provider: String,
    api_key: String,
}

impl JsonClient {
    pub fn new(
        provider: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let provider = provider.into();
        let api_key = api_key.into();

        if api_key.trim().is_empty() {
            return Err(ProviderError::Auth {
                provider,
                message: "API key must not be empty".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Network {
                provider: provider.clone(),
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            provider,
            api_key,
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// POST `body` as JSON with bearer auth and decode the JSON response
    pub fn post<B, R>(&self, url: &str, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .map_err(|e| classify_transport(&self.provider, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_else(|e| {
                tracing::debug!("Failed to read {} error body: {}", self.provider, e);
                String::new()
            });
            tracing::debug!("{} returned {}: {}", self.provider, status, body);
            return Err(classify_status(&self.provider, status, &body));
        }

        response.json::<R>().map_err(|e| ProviderError::Response {
            provider: self.provider.clone(),
            message: format!("Failed to decode response: {}", e),
        })
    }
}

/// Map a non-success HTTP status to a provider error kind
pub fn classify_status(provider: &str, status: StatusCode, body: &str) -> ProviderError {
    let message = format!("HTTP {}: {}", status.as_u16(), error_detail(body));
    let provider = provider.to_string();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth { provider, message },
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimit { provider, message },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            ProviderError::Network { provider, message }
        }
        s if s.is_server_error() => ProviderError::Network { provider, message },
        _ => ProviderError::Response { provider, message },
    }
}

/// Map a transport-level failure (no HTTP response) to a provider error kind
pub fn classify_transport(provider: &str, error: &reqwest::Error) -> ProviderError {
    let provider = provider.to_string();

    if error.is_decode() || error.is_body() {
        return ProviderError::Response {
            provider,
            message: error.to_string(),
        };
    }

    let message = if error.is_timeout() {
        format!("Request timed out: {}", error)
    } else if error.is_connect() {
        format!("Connection failed: {}", error)
    } else {
        error.to_string()
    };

    ProviderError::Network { provider, message }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Detailed { message: String },
    Plain(String),
}

#[derive(Deserialize)]
struct DetailEnvelope {
    detail: String,
}

/// Pull a readable message out of an error body (OpenAI style or `{"detail": ..}`)
fn error_detail(body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        return match envelope.error {
            ErrorBody::Detailed { message } => message,
            ErrorBody::Plain(message) => message,
        };
    }
    if let Ok(envelope) = serde_json::from_str::<DetailEnvelope>(body) {
        return envelope.detail;
    }

    let body = body.trim();
    if body.chars().count() > MAX_ERROR_BODY {
        let truncated: String = body.chars().take(MAX_ERROR_BODY).collect();
        format!("{}...", truncated)
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_auth() {
        let body = r#"{"error": {"message": "Invalid API Key", "type": "invalid_request_error"}}"#;
        let err = classify_status("Groq", StatusCode::UNAUTHORIZED, body);
        assert_eq!(
            err,
            ProviderError::Auth {
                provider: "Groq".to_string(),
                message: "HTTP 401: Invalid API Key".to_string(),
            }
        );
    }

    #[test]
    fn test_classify_rate_limit() {
        let err = classify_status("Jina", StatusCode::TOO_MANY_REQUESTS, "");
        assert!(matches!(err, ProviderError::RateLimit { .. }));
    }

    #[test]
    fn test_classify_server_error_as_network() {
        let err = classify_status("Groq", StatusCode::SERVICE_UNAVAILABLE, "upstream down");
        assert!(matches!(err, ProviderError::Network { .. }));
    }

    #[test]
    fn test_classify_bad_request_as_response() {
        let body = r#"{"detail": "input must not be empty"}"#;
        let err = classify_status("Jina", StatusCode::BAD_REQUEST, body);
        match err {
            ProviderError::Response { message, .. } => {
                assert_eq!(message, "HTTP 400: input must not be empty")
            }
            other => panic!("unexpected error kind: {:?}", other),
        }
    }

    #[test]
    fn test_long_error_body_truncated() {
        let body = "x".repeat(1000);
        let detail = error_detail(&body);
        assert_eq!(detail.len(), MAX_ERROR_BODY + 3);
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let result = JsonClient::new("Groq", "  ", Duration::from_secs(5));
        assert!(matches!(result, Err(ProviderError::Auth { .. })));
    }
}
