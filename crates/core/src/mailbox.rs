//! Fetches messages or threads and writes one folder per email.

use crate::body::{decode_base64url, BodyExtractor};
use crate::error::IngestError;
use crate::ingest::BatchReport;
use crate::models::{Attachment, EmailMetadata, MessagePart};
use crate::output::OutputWriter;
use crate::traits::MailSource;
use crate::{MailMessage, MailQuery};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub const UNKNOWN_SENDER: &str = "Unknown";

const FOLDER_TIMESTAMP_FORMAT: &str = "%Y-%m-%d--%H-%M-%S";
const METADATA_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The address between `<` and `>` in a `From` header, or the whole header when
/// there are no brackets.
pub fn extract_sender_address(from: &str) -> String {
    let from = from.trim();
    let address = match (from.find('<'), from.rfind('>')) {
        (Some(start), Some(end)) if start < end => &from[start + 1..end],
        _ => from,
    };

    let address = address.trim();
    if address.is_empty() {
        UNKNOWN_SENDER.to_string()
    } else {
        address.to_string()
    }
}

fn timestamp(millis: i64) -> Result<DateTime<Utc>, IngestError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| IngestError::InvalidArgument(format!("internal date out of range: {millis}")))
}

/// `{sender}:{YYYY-MM-DD}--{HH-MM-SS}` in UTC.
pub fn email_folder_name(sender: &str, millis: i64) -> Result<String, IngestError> {
    let when = timestamp(millis)?;
    Ok(format!("{sender}:{}", when.format(FOLDER_TIMESTAMP_FORMAT)))
}

pub fn email_metadata(message: &MailMessage, millis: i64) -> Result<EmailMetadata, IngestError> {
    let when = timestamp(millis)?;

    Ok(EmailMetadata {
        id: message.id.clone(),
        snippet: message.snippet.clone(),
        history_id: message.history_id.clone(),
        internal_date: when.format(METADATA_TIMESTAMP_FORMAT).to_string(),
        size_estimate: message.size_estimate,
        thread_id: message.thread_id.clone(),
        label_ids: message.label_ids.clone(),
        headers: message
            .payload
            .headers
            .iter()
            .map(|header| (header.name.clone(), header.value.clone()))
            .collect(),
    })
}

/// Top-level parts that carry a file name.
fn attachment_parts(payload: &MessagePart) -> impl Iterator<Item = &MessagePart> {
    payload
        .parts
        .iter()
        .filter(|part| part.filename.as_deref().is_some_and(|name| !name.is_empty()))
}

pub struct MailPipeline<S> {
    source: S,
    extractor: BodyExtractor,
    writer: OutputWriter,
}

impl<S> MailPipeline<S>
where
    S: MailSource + Send + Sync,
{
    pub fn new(source: S, extractor: BodyExtractor, writer: OutputWriter) -> Self {
        Self {
            source,
            extractor,
            writer,
        }
    }

    /// One folder per listed message directly under the output root.
    /// Listing failures end the run; per-message failures are skipped.
    pub async fn run_messages(&self, query: &MailQuery) -> Result<BatchReport, IngestError> {
        let refs = self.source.list_messages(query).await?;
        info!(count = refs.len(), "messages listed");

        let mut report = BatchReport::default();
        for message_ref in refs {
            let saved = match self.source.get_message(&message_ref.id).await {
                Ok(message) => self.save_message(&message, &[]).await,
                Err(error) => Err(error),
            };

            match saved {
                Ok(folder) => report.written.push(folder),
                Err(error) => report.skip(message_ref.id, error.to_string()),
            }
        }

        Ok(report)
    }

    /// One folder per message, grouped under a folder per thread.
    pub async fn run_threads(&self, query: &MailQuery) -> Result<BatchReport, IngestError> {
        let refs = self.source.list_threads(query).await?;
        info!(count = refs.len(), "threads listed");

        let mut report = BatchReport::default();
        for thread_ref in refs {
            let thread = match self.source.get_thread(&thread_ref.id).await {
                Ok(thread) => thread,
                Err(error) => {
                    report.skip(thread_ref.id, error.to_string());
                    continue;
                }
            };

            debug!(thread = %thread.id, messages = thread.messages.len(), "thread fetched");
            for message in &thread.messages {
                match self.save_message(message, &[thread.id.as_str()]).await {
                    Ok(folder) => report.written.push(folder),
                    Err(error) => report.skip(message.id.clone(), error.to_string()),
                }
            }
        }

        Ok(report)
    }

    async fn save_message(&self, message: &MailMessage, parents: &[&str]) -> Result<PathBuf, IngestError> {
        let millis = message.internal_date_millis().ok_or_else(|| {
            IngestError::InvalidArgument(format!("message {} has no internal date", message.id))
        })?;
        let sender = extract_sender_address(message.from_header().unwrap_or_default());

        let text = self.extractor.extract(&message.payload)?;
        let metadata = email_metadata(message, millis)?;
        let folder = self
            .writer
            .ensure_folder(parents, &email_folder_name(&sender, millis)?)?;
        self.writer.write_email(&folder, &text, &metadata)?;

        for part in attachment_parts(&message.payload) {
            let filename = part.filename.clone().unwrap_or_default();
            let saved = match self.attachment_data(message, part).await {
                Ok(data) => self.writer.write_attachment(&folder, &Attachment { filename, data }),
                Err(error) => Err(error),
            };

            if let Err(error) = saved {
                warn!(message = %message.id, %error, "attachment not saved");
            }
        }

        debug!(message = %message.id, folder = %folder.display(), "email saved");
        Ok(folder)
    }

    async fn attachment_data(&self, message: &MailMessage, part: &MessagePart) -> Result<Vec<u8>, IngestError> {
        if let Some(data) = part.body.data.as_deref() {
            return decode_base64url(data);
        }

        match part.body.attachment_id.as_deref() {
            Some(attachment_id) => self.source.get_attachment(&message.id, attachment_id).await,
            None => Err(IngestError::InvalidArgument(format!(
                "attachment part {} has neither data nor an attachment id",
                part.part_id.as_deref().unwrap_or("?")
            ))),
        }
    }
}
