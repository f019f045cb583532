//! LLM client for furigana annotation.
//!
//! Supports Claude (Anthropic) and OpenAI APIs. Both providers are asked
//! for a strictly shaped JSON object `{"html": "..."}`; anything else is
//! rejected as an invalid response.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::Config;

/// System instruction sent with every annotation request.
pub const FURIGANA_SYSTEM_PROMPT: &str = r#"You are a Japanese language expert. Given a Japanese paragraph, return a single HTML string for furigana display using ruby tags.

CRITICAL REQUIREMENTS:
- You MUST wrap EVERY kanji character or kanji word/phrase in <ruby>KANJI<rt>READING</rt></ruby>.
- Do NOT skip any kanji—every single kanji character must have furigana.
- Even single kanji characters need ruby tags. Example: 本 → <ruby>本<rt>ほん</rt></ruby>.
- For multi-kanji words, wrap the entire word: 今日 → <ruby>今日<rt>きょう</rt></ruby>.
- For kanji mixed with kana, wrap only the kanji parts: 食べる → <ruby>食<rt>た</rt></ruby>べる (wrap the kanji 食, leave kana べる as plain text).
- Use the reading in hiragana or katakana (e.g. <rt>きょう</rt> for 今日).
- Do NOT wrap kana-only text (hiragana/katakana), punctuation, or spaces—leave them as plain text outside ruby tags.
- Preserve the exact original characters; do not normalize or change the text.
- Be thorough: check every character and ensure no kanji is left unwrapped.
- Return only the HTML string: no markdown, no code fences, no explanation."#;

/// Errors from the annotation call. Transport/API failures and
/// wrong-shape replies are distinct variants.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM service not configured")]
    NotConfigured,
    #[error("LLM request failed: {0}")]
    Connection(String),
    #[error("LLM API error: {0}")]
    Api(String),
    #[error("invalid LLM response: {0}")]
    InvalidResponse(String),
}

/// LLM client for making API requests
pub struct LlmClient {
    client: Client,
    config: Config,
}

// Claude API types
#[derive(Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<ClaudeMessage>,
}

#[derive(Serialize)]
struct ClaudeMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
}

#[derive(Deserialize)]
struct ClaudeContent {
    text: String,
}

// OpenAI API types
#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
    response_format: serde_json::Value,
}

#[derive(Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessageResponse,
}

#[derive(Deserialize)]
struct OpenAiMessageResponse {
    content: String,
}

/// The one shape the model is allowed to answer with.
#[derive(Deserialize)]
struct FuriganaPayload {
    html: String,
}

/// OpenAI structured-output schema constraining the response to
/// `{"html": string}` with no extra fields.
fn output_schema() -> serde_json::Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "furigana_html",
            "description": "HTML string with ruby/rt tags for furigana",
            "strict": true,
            "schema": {
                "type": "object",
                "properties": {
                    "html": {
                        "type": "string",
                        "description": "HTML with <ruby>kanji<rt>reading</rt></ruby> for every kanji character, word, or phrase"
                    }
                },
                "required": ["html"],
                "additionalProperties": false
            }
        }
    })
}

impl LlmClient {
    /// Create a new LLM client with the given configuration
    pub fn new(config: Config) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Check if LLM integration is available
    pub fn is_available(&self) -> bool {
        self.config.is_llm_enabled()
    }

    /// Annotate Japanese text, returning the raw ruby HTML produced by the
    /// model. The caller is responsible for sanitizing it.
    pub async fn annotate_furigana(&self, text: &str) -> Result<String, LlmError> {
        let response = match self.config.llm.provider.as_str() {
            "claude" => self.call_claude(text).await?,
            "openai" => self.call_openai(text).await?,
            _ => return Err(LlmError::NotConfigured),
        };

        self.parse_response(&response)
    }

    /// Call Claude API
    async fn call_claude(&self, text: &str) -> Result<String, LlmError> {
        let api_key = self.config.get_api_key().ok_or(LlmError::NotConfigured)?;

        let base_url = self
            .config
            .llm
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.anthropic.com".to_string());

        // No schema-constrained output mode here; the shape requirement
        // rides along in the system prompt.
        let request = ClaudeRequest {
            model: self.config.get_model(),
            max_tokens: self.config.llm.max_tokens,
            system: format!(
                "{FURIGANA_SYSTEM_PROMPT}\n\nRespond with a JSON object of the form {{\"html\": \"...\"}} and output the JSON only."
            ),
            messages: vec![ClaudeMessage {
                role: "user".to_string(),
                content: text.to_string(),
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("Claude API error: {} - {}", status, body)));
        }

        let claude_response: ClaudeResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        claude_response
            .content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| LlmError::InvalidResponse("Empty response from Claude".to_string()))
    }

    /// Call OpenAI API
    async fn call_openai(&self, text: &str) -> Result<String, LlmError> {
        let api_key = self.config.get_api_key().ok_or(LlmError::NotConfigured)?;

        let base_url = self
            .config
            .llm
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".to_string());

        let request = OpenAiRequest {
            model: self.config.get_model(),
            messages: vec![
                OpenAiMessage {
                    role: "system".to_string(),
                    content: FURIGANA_SYSTEM_PROMPT.to_string(),
                },
                OpenAiMessage {
                    role: "user".to_string(),
                    content: text.to_string(),
                },
            ],
            max_tokens: self.config.llm.max_tokens,
            response_format: output_schema(),
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("OpenAI API error: {} - {}", status, body)));
        }

        let openai_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        openai_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| LlmError::InvalidResponse("Empty response from OpenAI".to_string()))
    }

    /// Parse the model reply into the annotated HTML string.
    fn parse_response(&self, response: &str) -> Result<String, LlmError> {
        let json_str = self.extract_json(response)?;

        let parsed: FuriganaPayload = serde_json::from_str(&json_str).map_err(|e| {
            LlmError::InvalidResponse(format!("Failed to parse LLM response: {} - Response: {}", e, json_str))
        })?;

        Ok(parsed.html)
    }

    /// Extract JSON from potentially wrapped response
    fn extract_json(&self, response: &str) -> Result<String, LlmError> {
        let trimmed = response.trim();

        // If it starts with {, assume it's JSON
        if trimmed.starts_with('{') {
            // Find the matching closing brace
            let mut depth = 0;
            let mut end_idx = 0;
            for (i, c) in trimmed.char_indices() {
                match c {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            end_idx = i + 1;
                            break;
                        }
                    }
                    _ => {}
                }
            }
            if end_idx > 0 {
                return Ok(trimmed[..end_idx].to_string());
            }
        }

        // Try to find JSON in code blocks
        if let Some(start) = trimmed.find("```json") {
            let json_start = start + 7;
            if let Some(end) = trimmed[json_start..].find("```") {
                return Ok(trimmed[json_start..json_start + end].trim().to_string());
            }
        }

        // Try to find any JSON object
        if let Some(start) = trimmed.find('{') {
            if let Some(end) = trimmed.rfind('}') {
                return Ok(trimmed[start..=end].to_string());
            }
        }

        Err(LlmError::InvalidResponse(format!(
            "Could not extract JSON from response: {}",
            response
        )))
    }
}
