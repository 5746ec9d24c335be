//! Connection settings for the external collaborators.
//!
//! The binary fills these from flags and environment variables; the library
//! never reads the environment itself.

use std::time::Duration;

pub const DEFAULT_GMAIL_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_NEO4J_URL: &str = "http://localhost:7474";

#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub base_url: String,
    pub user_id: String,
    pub access_token: String,
}

impl GmailConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_GMAIL_BASE_URL.to_string(),
            user_id: "me".to_string(),
            access_token: access_token.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    pub endpoint: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_NEO4J_URL.to_string(),
            database: "neo4j".to_string(),
            username: "neo4j".to_string(),
            password: "password".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OcrEndpointConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl OcrEndpointConfig {
    /// `None` when the endpoint is blank; blank keys are dropped.
    pub fn from_parts(endpoint: Option<String>, api_key: Option<String>) -> Option<Self> {
        let endpoint = endpoint?.trim().to_string();
        if endpoint.is_empty() {
            return None;
        }

        let api_key = api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        Some(Self { endpoint, api_key })
    }
}

#[cfg(test)]
mod tests {
    use super::OcrEndpointConfig;

    #[test]
    fn blank_ocr_endpoint_disables_ocr() {
        assert!(OcrEndpointConfig::from_parts(Some("  ".to_string()), None).is_none());
        assert!(OcrEndpointConfig::from_parts(None, Some("key".to_string())).is_none());
    }

    #[test]
    fn blank_ocr_key_is_dropped() {
        let config = OcrEndpointConfig::from_parts(
            Some(" http://ocr.local/render ".to_string()),
            Some(" ".to_string()),
        )
        .expect("endpoint is set");

        assert_eq!(config.endpoint, "http://ocr.local/render");
        assert_eq!(config.api_key, None);
    }
}
