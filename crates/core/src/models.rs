use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Entry returned by a message listing call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// Entry returned by a thread listing call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ThreadRef {
    pub id: String,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub history_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PartBody {
    #[serde(default)]
    pub size: Option<u64>,
    /// base64url-encoded content, present for inline leaves.
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub attachment_id: Option<String>,
}

/// One node of a message's body tree: a leaf carrying content or a container of child parts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub part_id: Option<String>,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: PartBody,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

impl MessagePart {
    pub fn is_container(&self) -> bool {
        !self.parts.is_empty()
    }

    /// Mime type without parameters, lowercased.
    pub fn essence(&self) -> String {
        self.mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|header| header.name.eq_ignore_ascii_case(name))
            .map(|header| header.value.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MailMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub history_id: Option<String>,
    /// Milliseconds since the unix epoch, serialized by the mail API as a string.
    #[serde(default)]
    pub internal_date: Option<String>,
    #[serde(default)]
    pub size_estimate: Option<u64>,
    #[serde(default)]
    pub payload: MessagePart,
}

impl MailMessage {
    pub fn internal_date_millis(&self) -> Option<i64> {
        self.internal_date
            .as_deref()
            .and_then(|value| value.trim().parse::<i64>().ok())
    }

    pub fn from_header(&self) -> Option<&str> {
        self.payload.header("From")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MailThread {
    pub id: String,
    #[serde(default)]
    pub history_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<MailMessage>,
}

/// Listing parameters shared by message and thread listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailQuery {
    pub label_ids: Vec<String>,
    pub max_results: u32,
}

impl Default for MailQuery {
    fn default() -> Self {
        Self {
            label_ids: Vec::new(),
            max_results: 10,
        }
    }
}

/// Contents of `metadata.json` written next to each email.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmailMetadata {
    pub id: String,
    pub snippet: Option<String>,
    pub history_id: Option<String>,
    pub internal_date: String,
    pub size_estimate: Option<u64>,
    pub thread_id: Option<String>,
    pub label_ids: Vec<String>,
    pub headers: BTreeMap<String, String>,
}

/// A downloaded attachment ready to be written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Fields pulled out of one structured extraction reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub document_name: Option<String>,
    pub sender: Option<String>,
    pub company: Option<String>,
    pub date: Option<String>,
    pub body: Option<String>,
}

impl ExtractedDocument {
    /// Reads a record leniently: `sender`/`company` may be a plain string or an
    /// object with a `name`; empty strings and nulls count as absent.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;

        Some(Self {
            document_name: scalar_field(object, "document_name"),
            sender: named_field(object, "sender"),
            company: named_field(object, "company"),
            date: scalar_field(object, "date"),
            body: scalar_field(object, "body").or_else(|| scalar_field(object, "text")),
        })
    }

    /// Accepts either a single record or an array of records.
    pub fn all_from_value(value: &Value) -> Vec<Self> {
        match value {
            Value::Array(entries) => entries.iter().filter_map(Self::from_value).collect(),
            other => Self::from_value(other).into_iter().collect(),
        }
    }
}

fn scalar_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    let text = match object.get(key)? {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => return None,
    };

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn named_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::Object(nested) => scalar_field(nested, "name"),
        _ => scalar_field(object, key),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeLabel {
    Document,
    Sender,
    Company,
}

impl NodeLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeLabel::Document => "Document",
            NodeLabel::Sender => "Sender",
            NodeLabel::Company => "Company",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RelationKind {
    Sent,
    RelatedTo,
}

impl RelationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::Sent => "SENT",
            RelationKind::RelatedTo => "RELATED_TO",
        }
    }
}

/// A node identified by its label and name; the name is the merge key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GraphNode {
    pub label: NodeLabel,
    pub name: String,
}

impl GraphNode {
    pub fn new(label: NodeLabel, name: impl Into<String>) -> Self {
        Self {
            label,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Relationship {
    pub from: GraphNode,
    pub kind: RelationKind,
    pub to: GraphNode,
}
