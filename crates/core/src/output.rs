//! Deterministic on-disk layout for extraction results and fetched emails.

use crate::error::IngestError;
use crate::models::{Attachment, EmailMetadata};
use crate::turtle::{DocumentFields, TurtleDocument};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

pub const RAW_TEXT_FILE: &str = "raw_text.txt";
pub const ORIGINAL_TEXT_FILE: &str = "original_text.txt";
pub const JSON_OUTPUT_FILE: &str = "json_output.json";
pub const RDF_OUTPUT_FILE: &str = "rdf_output.ttl";
pub const EMAIL_TEXT_FILE: &str = "email.txt";
pub const METADATA_FILE: &str = "metadata.json";

pub const UNKNOWN_DOCUMENT: &str = "Unknown";

/// A structured model reply, ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredOutput {
    Json(Value),
    Turtle { raw: String, fields: DocumentFields },
}

impl StructuredOutput {
    pub fn from_turtle(raw: String, document: &TurtleDocument) -> Self {
        StructuredOutput::Turtle {
            fields: document.document_fields(),
            raw,
        }
    }

    pub fn document_fields(&self) -> DocumentFields {
        match self {
            StructuredOutput::Json(value) => DocumentFields {
                name: json_text(value, "document_name"),
                date: json_text(value, "date"),
            },
            StructuredOutput::Turtle { fields, .. } => fields.clone(),
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            StructuredOutput::Json(_) => JSON_OUTPUT_FILE,
            StructuredOutput::Turtle { .. } => RDF_OUTPUT_FILE,
        }
    }
}

fn json_text(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(text) => Some(text.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Spaces and path separators become underscores.
pub fn sanitize_folder_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            other => other,
        })
        .collect()
}

/// `{name}:{date}`, or just the name without a date. A missing or blank name is `Unknown`.
pub fn document_folder_name(fields: &DocumentFields) -> String {
    let name = fields
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN_DOCUMENT);
    let date = fields.date.as_deref().map(str::trim).unwrap_or_default();

    let folder = if date.is_empty() {
        name.to_string()
    } else {
        format!("{name}:{date}")
    };
    sanitize_folder_name(&folder)
}

/// JSON with four-space indentation and unescaped non-ASCII text.
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>, IngestError> {
    let mut buffer = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut serializer)?;
    Ok(buffer)
}

#[derive(Debug, Clone)]
pub struct OutputWriter {
    root: PathBuf,
}

impl OutputWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates (or reuses) `root/<folder>`, nesting under `parents` first.
    pub fn ensure_folder(&self, parents: &[&str], folder: &str) -> Result<PathBuf, IngestError> {
        let mut path = self.root.clone();
        for parent in parents {
            path.push(sanitize_folder_name(parent));
        }
        path.push(sanitize_folder_name(folder));
        fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Writes the structured payload plus whichever texts are present and non-empty;
    /// existing files are overwritten.
    pub fn write_extraction(
        &self,
        output: &StructuredOutput,
        raw_text: Option<&str>,
        original_text: Option<&str>,
    ) -> Result<PathBuf, IngestError> {
        let folder = self.ensure_folder(&[], &document_folder_name(&output.document_fields()))?;

        if let Some(raw_text) = raw_text.filter(|text| !text.is_empty()) {
            fs::write(folder.join(RAW_TEXT_FILE), raw_text)?;
        }
        if let Some(original_text) = original_text.filter(|text| !text.is_empty()) {
            fs::write(folder.join(ORIGINAL_TEXT_FILE), original_text)?;
        }

        let payload = match output {
            StructuredOutput::Json(value) => to_pretty_json(value)?,
            StructuredOutput::Turtle { raw, .. } => raw.clone().into_bytes(),
        };
        fs::write(folder.join(output.file_name()), payload)?;

        Ok(folder)
    }

    pub fn write_email(
        &self,
        folder: &Path,
        text: &str,
        metadata: &EmailMetadata,
    ) -> Result<(), IngestError> {
        fs::write(folder.join(EMAIL_TEXT_FILE), text)?;
        fs::write(folder.join(METADATA_FILE), to_pretty_json(metadata)?)?;
        Ok(())
    }

    /// Writes an attachment under its file name, stripped of any directory part.
    pub fn write_attachment(&self, folder: &Path, attachment: &Attachment) -> Result<PathBuf, IngestError> {
        let file_name = Path::new(&attachment.filename)
            .file_name()
            .and_then(|name| name.to_str())
            .map(sanitize_folder_name)
            .filter(|name| !name.is_empty() && name != "..")
            .ok_or_else(|| IngestError::MissingFileName(attachment.filename.clone()))?;

        let path = folder.join(file_name);
        fs::write(&path, &attachment.data)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn fields(name: Option<&str>, date: Option<&str>) -> DocumentFields {
        DocumentFields {
            name: name.map(str::to_string),
            date: date.map(str::to_string),
        }
    }

    #[test]
    fn folder_name_replaces_spaces_and_slashes() {
        assert_eq!(
            document_folder_name(&fields(Some("Invoice/2024 Q1"), Some("2024-05-01"))),
            "Invoice_2024_Q1:2024-05-01"
        );
    }

    #[test]
    fn folder_name_defaults() {
        assert_eq!(document_folder_name(&fields(None, None)), "Unknown");
        assert_eq!(document_folder_name(&DocumentFields::default()), "Unknown");
        assert_eq!(document_folder_name(&fields(Some("  "), Some("2024"))), "Unknown:2024");
        assert_eq!(document_folder_name(&fields(Some("Bail"), None)), "Bail");
        assert_eq!(document_folder_name(&fields(Some("Bail"), Some("  "))), "Bail");
    }

    #[test]
    fn json_fields_tolerate_null_and_non_strings() {
        let output = StructuredOutput::Json(json!({"document_name": null, "date": 2024}));
        assert_eq!(output.document_fields(), fields(None, Some("2024")));
    }

    #[test]
    fn writes_json_payload_and_texts() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let writer = OutputWriter::new(dir.path());
        let output = StructuredOutput::Json(json!({
            "document_name": "Facture Été",
            "date": "2024-05-01"
        }));

        let folder = writer.write_extraction(&output, Some("ocr text"), None)?;

        assert_eq!(folder, dir.path().join("Facture_Été:2024-05-01"));
        assert_eq!(fs::read_to_string(folder.join(RAW_TEXT_FILE))?, "ocr text");
        assert!(!folder.join(ORIGINAL_TEXT_FILE).exists());

        let written = fs::read_to_string(folder.join(JSON_OUTPUT_FILE))?;
        assert!(written.contains("\n    \"date\": \"2024-05-01\""));
        assert!(written.contains("Facture Été"));
        Ok(())
    }

    #[test]
    fn rewriting_the_same_document_overwrites() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let writer = OutputWriter::new(dir.path());
        let output = StructuredOutput::Json(json!({"document_name": "Bail"}));

        writer.write_extraction(&output, None, Some("first"))?;
        let folder = writer.write_extraction(&output, None, Some("second"))?;

        assert_eq!(fs::read_to_string(folder.join(ORIGINAL_TEXT_FILE))?, "second");
        Ok(())
    }

    #[test]
    fn turtle_payload_is_written_verbatim() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let raw = "@prefix ex: <http://e/> .\nex:Devis a ex:Document .\n".to_string();
        let document = TurtleDocument::parse(&raw)?;
        let output = StructuredOutput::from_turtle(raw.clone(), &document);

        let folder = OutputWriter::new(dir.path()).write_extraction(&output, None, None)?;

        assert_eq!(folder, dir.path().join("Devis"));
        assert_eq!(fs::read_to_string(folder.join(RDF_OUTPUT_FILE))?, raw);
        Ok(())
    }

    #[test]
    fn email_files_and_attachments() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let writer = OutputWriter::new(dir.path());
        let folder = writer.ensure_folder(&["t1"], "ana@example.com:2024-05-01--09-00-00")?;
        let metadata = EmailMetadata {
            id: "m1".to_string(),
            snippet: None,
            history_id: None,
            internal_date: "2024-05-01 09:00:00".to_string(),
            size_estimate: Some(10),
            thread_id: Some("t1".to_string()),
            label_ids: vec!["INBOX".to_string()],
            headers: BTreeMap::from([("Subject".to_string(), "Hi".to_string())]),
        };

        writer.write_email(&folder, "Hello", &metadata)?;
        let saved = writer.write_attachment(
            &folder,
            &Attachment {
                filename: "../../evil name.pdf".to_string(),
                data: b"%PDF".to_vec(),
            },
        )?;

        assert_eq!(fs::read_to_string(folder.join(EMAIL_TEXT_FILE))?, "Hello");
        let metadata_back: EmailMetadata =
            serde_json::from_str(&fs::read_to_string(folder.join(METADATA_FILE))?)?;
        assert_eq!(metadata_back, metadata);
        assert_eq!(saved, folder.join("evil_name.pdf"));
        Ok(())
    }
}
