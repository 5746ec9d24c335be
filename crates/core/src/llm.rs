//! Prompt templating, the chat-completion client, and structured extraction on top of it.

use crate::config::OpenAiConfig;
use crate::error::{ExtractionError, IngestError};
use crate::traits::ChatModel;
use crate::turtle::TurtleDocument;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

pub const DEFAULT_SYSTEM_MESSAGE: &str = "Extract structured information from the document.";

/// Variable holding the document text in every template.
pub const DOCUMENT_VARIABLE: &str = "document";

/// A prompt with `{name}` placeholders. `{{` and `}}` produce literal braces;
/// any other brace that does not open a well-formed placeholder is kept as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn variables(&self) -> Vec<String> {
        let mut names = Vec::new();
        for segment in segments(&self.template) {
            if let Segment::Variable(name) = segment {
                if !names.iter().any(|known| known == name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }

    pub fn format(&self, values: &BTreeMap<String, String>) -> Result<String, ExtractionError> {
        let mut rendered = String::with_capacity(self.template.len());

        for segment in segments(&self.template) {
            match segment {
                Segment::Literal(text) => rendered.push_str(text),
                Segment::Variable(name) => {
                    let value = values.get(name).ok_or_else(|| {
                        ExtractionError::Template(format!("no value for placeholder {{{name}}}"))
                    })?;
                    rendered.push_str(value);
                }
            }
        }

        Ok(rendered)
    }
}

enum Segment<'a> {
    Literal(&'a str),
    Variable(&'a str),
}

fn segments(template: &str) -> Vec<Segment<'_>> {
    let bytes = template.as_bytes();
    let mut out = Vec::new();
    let mut literal_start = 0;
    let mut index = 0;

    while index < bytes.len() {
        match bytes[index] {
            b'{' if bytes.get(index + 1) == Some(&b'{') => {
                out.push(Segment::Literal(&template[literal_start..index + 1]));
                index += 2;
                literal_start = index;
            }
            b'}' if bytes.get(index + 1) == Some(&b'}') => {
                out.push(Segment::Literal(&template[literal_start..index + 1]));
                index += 2;
                literal_start = index;
            }
            b'{' => match placeholder_end(bytes, index + 1) {
                Some(end) => {
                    out.push(Segment::Literal(&template[literal_start..index]));
                    out.push(Segment::Variable(&template[index + 1..end]));
                    index = end + 1;
                    literal_start = index;
                }
                None => index += 1,
            },
            _ => index += 1,
        }
    }

    out.push(Segment::Literal(&template[literal_start..]));
    out
}

/// Index of the closing brace when `start` begins an identifier followed by `}`.
fn placeholder_end(bytes: &[u8], start: usize) -> Option<usize> {
    let first = *bytes.get(start)?;
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return None;
    }

    let mut index = start + 1;
    while let Some(&byte) = bytes.get(index) {
        match byte {
            b'}' => return Some(index),
            b if b.is_ascii_alphanumeric() || b == b'_' => index += 1,
            _ => return None,
        }
    }
    None
}

/// The prompts folder: system message, user template, and example extractions.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub system_message: String,
    pub template: PromptTemplate,
    /// Template variable name (file stem) to the example's compact JSON.
    pub examples: BTreeMap<String, String>,
}

impl PromptSet {
    pub const SYSTEM_FILE: &'static str = "system_message.txt";
    pub const TEMPLATE_FILE: &'static str = "chatgpt_prompt.txt";
    pub const EXAMPLE_PREFIX: &'static str = "json_data";

    /// The template file is required; the system message and examples are optional.
    pub fn load(folder: &Path) -> Result<Self, IngestError> {
        let template = std::fs::read_to_string(folder.join(Self::TEMPLATE_FILE))?;

        let system_path = folder.join(Self::SYSTEM_FILE);
        let system_message = if system_path.is_file() {
            std::fs::read_to_string(system_path)?
        } else {
            DEFAULT_SYSTEM_MESSAGE.to_string()
        };

        let mut examples = BTreeMap::new();
        for entry in std::fs::read_dir(folder)? {
            let path = entry?.path();
            let is_json = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
            let stem = match path.file_stem().and_then(|stem| stem.to_str()) {
                Some(stem) if is_json && stem.starts_with(Self::EXAMPLE_PREFIX) => stem.to_string(),
                _ => continue,
            };

            let example: Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
            examples.insert(stem, example.to_string());
        }

        Ok(Self {
            system_message,
            template: PromptTemplate::new(template),
            examples,
        })
    }

    pub fn inline(template: impl Into<String>) -> Self {
        Self {
            system_message: DEFAULT_SYSTEM_MESSAGE.to_string(),
            template: PromptTemplate::new(template),
            examples: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiChatModel {
    base_url: String,
    model: String,
    api_key: String,
    client: Client,
}

impl OpenAiChatModel {
    pub fn new(config: OpenAiConfig) -> Result<Self, ExtractionError> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model,
            api_key: config.api_key,
            client,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String, ExtractionError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        debug!(model = %self.model, prompt_chars = user.len(), "requesting completion");
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::BackendResponse {
                backend: "openai".to_string(),
                details: format!("{status}: {body}"),
            });
        }

        let reply: ChatResponse = response.json().await?;
        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ExtractionError::BackendResponse {
                backend: "openai".to_string(),
                details: "completion had no message content".to_string(),
            })
    }
}

/// Fills the prompt set with a document and asks the model for structured output.
/// Holds no state between calls.
pub struct ExtractionClient<M> {
    model: M,
    prompts: PromptSet,
}

impl<M> ExtractionClient<M>
where
    M: ChatModel + Send + Sync,
{
    pub fn new(model: M, prompts: PromptSet) -> Self {
        Self { model, prompts }
    }

    pub fn render_prompt(&self, document_text: &str) -> Result<String, ExtractionError> {
        let mut values = self.prompts.examples.clone();
        values.insert(DOCUMENT_VARIABLE.to_string(), document_text.to_string());
        self.prompts.template.format(&values)
    }

    pub async fn complete(&self, document_text: &str) -> Result<String, ExtractionError> {
        let prompt = self.render_prompt(document_text)?;
        self.model
            .complete(&self.prompts.system_message, &prompt)
            .await
    }

    /// The reply must be JSON as returned; nothing is repaired.
    pub async fn extract_json(&self, document_text: &str) -> Result<Value, ExtractionError> {
        let reply = self.complete(document_text).await?;
        Ok(serde_json::from_str(&reply)?)
    }

    pub async fn extract_turtle(
        &self,
        document_text: &str,
    ) -> Result<(String, TurtleDocument), ExtractionError> {
        let reply = self.complete(document_text).await?;
        let parsed = TurtleDocument::parse(&reply)?;
        Ok((reply, parsed))
    }
}
