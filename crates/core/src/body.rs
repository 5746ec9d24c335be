//! Plain-text extraction from a message's body tree.

use crate::error::IngestError;
use crate::models::MessagePart;
use base64::alphabet::URL_SAFE;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use regex::Regex;
use tracing::warn;

/// Body trees deeper than this are not searched any further.
pub const MAX_PART_DEPTH: usize = 64;

/// Lines starting with a run of hyphens or a French reply header open a quoted message.
pub const QUOTED_REPLY_MARKER: &str = r"^(-{2,}|De :|Envoyé :|À :|Objet :)";

/// The mail API pads some payloads and not others.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuoteHandling {
    /// Return the text part as sent.
    #[default]
    Keep,
    /// Cut the text at the first quoted-reply marker line.
    StripPrevious,
}

#[derive(Debug, Clone)]
pub struct BodyExtractor {
    quotes: QuoteHandling,
    marker: Regex,
}

impl BodyExtractor {
    pub fn new(quotes: QuoteHandling) -> Result<Self, IngestError> {
        Ok(Self {
            quotes,
            marker: Regex::new(QUOTED_REPLY_MARKER)?,
        })
    }

    /// Returns the first `text/plain` leaf in depth-first, first-child-first
    /// order, decoded. An empty string means the message has no text body.
    pub fn extract(&self, payload: &MessagePart) -> Result<String, IngestError> {
        let text = match find_plain_text(payload, 0) {
            Some(encoded) => decode_base64url_text(encoded)?,
            None => return Ok(String::new()),
        };

        Ok(match self.quotes {
            QuoteHandling::Keep => text,
            QuoteHandling::StripPrevious => self.strip_quoted(&text),
        })
    }

    /// Drops the first marker line and everything after it.
    pub fn strip_quoted(&self, text: &str) -> String {
        text.split('\n')
            .take_while(|line| !self.marker.is_match(line))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn find_plain_text(part: &MessagePart, depth: usize) -> Option<&str> {
    if depth > MAX_PART_DEPTH {
        warn!(depth, "body tree exceeds maximum depth, branch ignored");
        return None;
    }

    if !part.is_container() {
        return match part.body.data.as_deref() {
            Some(data) if part.essence() == "text/plain" => Some(data),
            _ => None,
        };
    }

    part.parts
        .iter()
        .find_map(|child| find_plain_text(child, depth + 1))
}

pub fn decode_base64url(encoded: &str) -> Result<Vec<u8>, IngestError> {
    URL_SAFE_LENIENT
        .decode(encoded.trim())
        .map_err(|error| IngestError::Decode(error.to_string()))
}

pub fn decode_base64url_text(encoded: &str) -> Result<String, IngestError> {
    let bytes = decode_base64url(encoded)?;
    String::from_utf8(bytes).map_err(|error| IngestError::Decode(error.to_string()))
}
