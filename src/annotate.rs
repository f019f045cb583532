//! Annotation request handling.
//!
//! Validates inbound text, forwards it to the configured LLM, and maps the
//! outcome to a fixed error taxonomy. The returned HTML is deliberately left
//! raw: sanitizing is the caller's job before the result is stored or shown.

use crate::config::Config;
use crate::llm::{LlmClient, LlmError};
use crate::sanitize::RawHtml;

/// Everything that can go wrong with an annotation request.
#[derive(Debug, thiserror::Error)]
pub enum AnnotateError {
    /// The submitted text was empty or whitespace-only.
    #[error("Missing or empty text")]
    EmptyInput,

    /// The submitted text exceeded the configured length cap.
    #[error("Text exceeds maximum length of {limit} characters")]
    TooLong { limit: usize },

    /// No usable LLM provider or credential is configured.
    #[error("LLM service not configured")]
    ServiceUnavailable,

    /// The LLM call itself failed (transport or API error).
    #[error("{0}")]
    Upstream(String),

    /// The LLM answered, but not with the agreed `{"html": ...}` shape.
    #[error("{0}")]
    InvalidResponse(String),
}

impl AnnotateError {
    /// True for errors caused by the request itself rather than by the
    /// service or its configuration.
    pub fn is_client_error(&self) -> bool {
        matches!(self, AnnotateError::EmptyInput | AnnotateError::TooLong { .. })
    }
}

/// Validates annotation requests and drives the LLM call.
pub struct Annotator {
    client: LlmClient,
    max_text_length: usize,
}

impl Annotator {
    pub fn new(config: Config) -> Self {
        Self {
            max_text_length: config.annotate.max_text_length,
            client: LlmClient::new(config),
        }
    }

    /// Annotate Japanese text with ruby readings.
    ///
    /// Validation happens in order, first failure wins. One best-effort
    /// outbound call, no retry.
    pub async fn annotate(&self, text: &str) -> Result<RawHtml, AnnotateError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AnnotateError::EmptyInput);
        }

        // The cap counts UTF-16 code units, the unit web clients measure
        // text length in.
        if text.encode_utf16().count() > self.max_text_length {
            return Err(AnnotateError::TooLong {
                limit: self.max_text_length,
            });
        }

        if !self.client.is_available() {
            return Err(AnnotateError::ServiceUnavailable);
        }

        let html = self
            .client
            .annotate_furigana(text)
            .await
            .map_err(|e| match e {
                LlmError::NotConfigured => AnnotateError::ServiceUnavailable,
                LlmError::Connection(msg) | LlmError::Api(msg) => AnnotateError::Upstream(msg),
                LlmError::InvalidResponse(msg) => AnnotateError::InvalidResponse(msg),
            })?;

        Ok(RawHtml::new(html))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::LlmConfig;

    fn unconfigured_annotator() -> Annotator {
        Annotator::new(Config::default())
    }

    fn configured_annotator() -> Annotator {
        let config = Config {
            llm: LlmConfig {
                provider: "claude".to_string(),
                api_key: Some("test-key".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        Annotator::new(config)
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let result = configured_annotator().annotate("").await;
        assert!(matches!(result, Err(AnnotateError::EmptyInput)));
    }

    #[tokio::test]
    async fn test_whitespace_only_text_rejected() {
        let result = configured_annotator().annotate("  \n\t  ").await;
        assert!(matches!(result, Err(AnnotateError::EmptyInput)));
    }

    #[tokio::test]
    async fn test_over_limit_text_rejected() {
        let text = "あ".repeat(10_001);
        let result = configured_annotator().annotate(&text).await;
        match result {
            Err(AnnotateError::TooLong { limit }) => assert_eq!(limit, 10_000),
            other => panic!("expected TooLong, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_text_at_limit_passes_validation() {
        // Exactly at the cap: validation passes and the request fails later
        // on the missing provider instead.
        let text = "あ".repeat(10_000);
        let result = unconfigured_annotator().annotate(&text).await;
        assert!(matches!(result, Err(AnnotateError::ServiceUnavailable)));
    }

    #[tokio::test]
    async fn test_unconfigured_service_rejected() {
        let result = unconfigured_annotator().annotate("日本語").await;
        assert!(matches!(result, Err(AnnotateError::ServiceUnavailable)));
    }

    #[test]
    fn test_error_messages_name_the_limit() {
        let err = AnnotateError::TooLong { limit: 10_000 };
        assert_eq!(err.to_string(), "Text exceeds maximum length of 10000 characters");

        assert_eq!(AnnotateError::EmptyInput.to_string(), "Missing or empty text");
        assert_eq!(
            AnnotateError::ServiceUnavailable.to_string(),
            "LLM service not configured"
        );
    }

    #[test]
    fn test_client_error_classification() {
        assert!(AnnotateError::EmptyInput.is_client_error());
        assert!(AnnotateError::TooLong { limit: 1 }.is_client_error());
        assert!(!AnnotateError::ServiceUnavailable.is_client_error());
        assert!(!AnnotateError::Upstream("x".into()).is_client_error());
        assert!(!AnnotateError::InvalidResponse("x".into()).is_client_error());
    }

    #[tokio::test]
    async fn test_validation_order_empty_wins_over_unconfigured() {
        // EmptyInput is checked before provider availability.
        let result = unconfigured_annotator().annotate("   ").await;
        assert!(matches!(result, Err(AnnotateError::EmptyInput)));
    }
}
