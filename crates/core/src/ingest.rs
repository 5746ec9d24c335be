use crate::digitizer::{Digitizer, ScanKind};
use crate::error::{ExtractionError, IngestError};
use crate::graph::{GraphLoader, LoadSummary};
use crate::llm::ExtractionClient;
use crate::output::{OutputWriter, StructuredOutput};
use crate::traits::{ChatModel, GraphStore, OcrEngine};
use crate::ExtractedDocument;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Plain text, used as the original text.
    Text,
    /// PDF or image that needs digitizing.
    Scanned,
    /// Previously extracted records.
    Records,
}

impl SourceKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        if ScanKind::from_path(path).is_some() {
            return Some(SourceKind::Scanned);
        }

        let ext = path.extension().and_then(|ext| ext.to_str())?;
        if ext.eq_ignore_ascii_case("txt") {
            Some(SourceKind::Text)
        } else if ext.eq_ignore_ascii_case("json") {
            Some(SourceKind::Records)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Turtle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    pub item: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub written: Vec<PathBuf>,
    pub skipped: Vec<SkippedItem>,
    pub graph: LoadSummary,
}

impl BatchReport {
    pub fn skip(&mut self, item: impl Into<String>, reason: impl Into<String>) {
        let skipped = SkippedItem {
            item: item.into(),
            reason: reason.into(),
        };
        warn!(item = %skipped.item, reason = %skipped.reason, "skipped");
        self.skipped.push(skipped);
    }
}

/// Files directly inside `folder`, sorted. A missing folder has no files.
pub fn discover_files(folder: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();

    files.sort_unstable();
    files
}

/// Email folders laid out as `threads/<thread>/<email>/`, sorted.
pub fn discover_email_folders(threads_root: &Path) -> Vec<PathBuf> {
    let mut folders: Vec<PathBuf> = WalkDir::new(threads_root)
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.into_path())
        .collect();

    folders.sort_unstable();
    folders
}

/// The documents folder followed by every email folder under the threads root.
pub fn source_folders(documents: &Path, threads_root: &Path) -> Vec<PathBuf> {
    let mut folders = vec![documents.to_path_buf()];
    folders.extend(discover_email_folders(threads_root));
    folders
}

/// Malformed model output ends the run; everything else only skips the file.
fn is_fatal(error: &ExtractionError) -> bool {
    matches!(
        error,
        ExtractionError::Parse(_) | ExtractionError::Turtle { .. } | ExtractionError::Template(_)
    )
}

/// Text of one source file: (raw OCR text, original text). `None` when unusable.
async fn read_source<E>(
    digitizer: &Digitizer<E>,
    path: &Path,
    kind: SourceKind,
) -> Result<Option<(Option<String>, Option<String>)>, std::io::Error>
where
    E: OcrEngine + Send + Sync,
{
    match kind {
        SourceKind::Text => {
            let text = tokio::fs::read_to_string(path).await?;
            Ok(Some((None, Some(text))))
        }
        SourceKind::Scanned => Ok(digitizer.digitize(path).await.map(|raw| (Some(raw), None))),
        SourceKind::Records => Ok(None),
    }
}

/// Documents and email folders → model → one output folder per document.
pub struct DocumentPipeline<E, M> {
    digitizer: Digitizer<E>,
    extraction: ExtractionClient<M>,
    writer: OutputWriter,
    format: OutputFormat,
}

impl<E, M> DocumentPipeline<E, M>
where
    E: OcrEngine + Send + Sync,
    M: ChatModel + Send + Sync,
{
    pub fn new(
        digitizer: Digitizer<E>,
        extraction: ExtractionClient<M>,
        writer: OutputWriter,
        format: OutputFormat,
    ) -> Self {
        Self {
            digitizer,
            extraction,
            writer,
            format,
        }
    }

    pub async fn run(&self, folders: &[PathBuf]) -> Result<BatchReport, ExtractionError> {
        let mut report = BatchReport::default();

        for folder in folders {
            for path in discover_files(folder) {
                let item = path.display().to_string();
                match self.process_file(&path).await {
                    Ok(Some(written)) => {
                        info!(source = %item, output = %written.display(), "document extracted");
                        report.written.push(written);
                    }
                    Ok(None) => {}
                    Err(error) if is_fatal(&error) => return Err(error),
                    Err(error) => report.skip(item, error.to_string()),
                }
            }
        }

        Ok(report)
    }

    async fn process_file(&self, path: &Path) -> Result<Option<PathBuf>, ExtractionError> {
        let kind = match SourceKind::from_path(path) {
            Some(SourceKind::Records) | None => {
                debug!(path = %path.display(), "not a document, ignored");
                return Ok(None);
            }
            Some(kind) => kind,
        };

        let texts = read_source(&self.digitizer, path, kind).await?;
        let Some((raw_text, original_text)) = texts else {
            return Ok(None);
        };

        let document_text = original_text
            .as_deref()
            .or(raw_text.as_deref())
            .unwrap_or_default();

        let output = match self.format {
            OutputFormat::Json => StructuredOutput::Json(self.extraction.extract_json(document_text).await?),
            OutputFormat::Turtle => {
                let (raw, parsed) = self.extraction.extract_turtle(document_text).await?;
                StructuredOutput::from_turtle(raw, &parsed)
            }
        };

        let written = self
            .writer
            .write_extraction(&output, raw_text.as_deref(), original_text.as_deref())?;

        Ok(Some(written))
    }
}

/// Record files and text files → graph store.
pub struct GraphPipeline<M, S> {
    extraction: ExtractionClient<M>,
    loader: GraphLoader<S>,
}

impl<M, S> GraphPipeline<M, S>
where
    M: ChatModel + Send + Sync,
    S: GraphStore + Send + Sync,
{
    pub fn new(extraction: ExtractionClient<M>, loader: GraphLoader<S>) -> Self {
        Self { extraction, loader }
    }

    pub fn into_loader(self) -> GraphLoader<S> {
        self.loader
    }

    pub async fn run(&self, folders: &[PathBuf]) -> Result<BatchReport, ExtractionError> {
        let mut report = BatchReport::default();

        for folder in folders {
            for path in discover_files(folder) {
                let item = path.display().to_string();
                let records = match self.records_for(&path).await {
                    Ok(Some(records)) => records,
                    Ok(None) => continue,
                    Err(error) if is_fatal(&error) => return Err(error),
                    Err(error) => {
                        report.skip(item, error.to_string());
                        continue;
                    }
                };

                match self.loader.load_all(&records).await {
                    Ok(summary) => {
                        report.graph.absorb(summary);
                        if summary.documents > 0 {
                            report.written.push(path);
                        } else {
                            debug!(path = %item, "no record with a document name");
                        }
                    }
                    Err(error) => report.skip(item, error.to_string()),
                }
            }
        }

        info!(summary = ?report.graph, "graph load finished");
        Ok(report)
    }

    async fn records_for(&self, path: &Path) -> Result<Option<Vec<ExtractedDocument>>, ExtractionError> {
        match SourceKind::from_path(path) {
            Some(SourceKind::Records) => {
                let value = read_records_file(path).await?;
                Ok(Some(ExtractedDocument::all_from_value(&value)))
            }
            Some(SourceKind::Text) => {
                let text = tokio::fs::read_to_string(path).await?;
                let value = self.extraction.extract_json(&text).await?;
                Ok(Some(ExtractedDocument::all_from_value(&value)))
            }
            _ => Ok(None),
        }
    }
}

/// A records file that fails to parse is a bad local input and only skips that file.
async fn read_records_file(path: &Path) -> Result<Value, IngestError> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::PromptSet;
    use crate::stores::InMemoryGraph;
    use crate::{GraphNode, NodeLabel};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    struct QueuedModel {
        replies: Mutex<VecDeque<String>>,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    impl QueuedModel {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|reply| reply.to_string()).collect()),
                prompts: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl ChatModel for QueuedModel {
        async fn complete(&self, _system: &str, user: &str) -> Result<String, ExtractionError> {
            self.prompts.lock().expect("lock").push(user.to_string());
            self.replies
                .lock()
                .expect("lock")
                .pop_front()
                .ok_or_else(|| ExtractionError::BackendResponse {
                    backend: "test".to_string(),
                    details: "no reply queued".to_string(),
                })
        }
    }

    struct StaticOcr(&'static str);

    #[async_trait]
    impl OcrEngine for StaticOcr {
        async fn render(&self, path: &Path) -> Result<String, IngestError> {
            let is_blank = path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().contains("blank"));
            if is_blank {
                return Ok("   ".to_string());
            }
            Ok(self.0.to_string())
        }
    }

    type Prompts = Arc<Mutex<Vec<String>>>;

    fn document_pipeline(
        replies: &[&str],
        output: &Path,
        format: OutputFormat,
    ) -> (DocumentPipeline<StaticOcr, QueuedModel>, Prompts) {
        let model = QueuedModel::new(replies);
        let prompts = Arc::clone(&model.prompts);
        let pipeline = DocumentPipeline::new(
            Digitizer::new(StaticOcr("FACTURE 42 - ACME - total 120 EUR")),
            ExtractionClient::new(model, PromptSet::inline("Extract:\n{document}")),
            OutputWriter::new(output),
            format,
        );
        (pipeline, prompts)
    }

    #[test]
    fn discovers_sorted_files_and_email_folders() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let documents = dir.path().join("Documents");
        let threads = dir.path().join("threads");
        fs::create_dir_all(documents.join("nested"))?;
        fs::create_dir_all(threads.join("t2").join("b@x:2024-01-01--10-00-00"))?;
        fs::create_dir_all(threads.join("t1").join("a@x:2024-01-01--09-00-00"))?;
        fs::write(documents.join("b.txt"), "b")?;
        fs::write(documents.join("a.pdf"), "a")?;
        fs::write(documents.join("nested").join("c.txt"), "c")?;
        fs::write(threads.join("t1").join("stray.txt"), "x")?;

        let files = discover_files(&documents);
        assert_eq!(files, vec![documents.join("a.pdf"), documents.join("b.txt")]);

        let folders = source_folders(&documents, &threads);
        assert_eq!(folders.len(), 3);
        assert_eq!(folders[1], threads.join("t1").join("a@x:2024-01-01--09-00-00"));
        assert!(discover_files(&dir.path().join("missing")).is_empty());
        Ok(())
    }

    #[test]
    fn source_kinds() {
        assert_eq!(SourceKind::from_path(Path::new("a.TXT")), Some(SourceKind::Text));
        assert_eq!(SourceKind::from_path(Path::new("a.jpg")), Some(SourceKind::Scanned));
        assert_eq!(SourceKind::from_path(Path::new("a.json")), Some(SourceKind::Records));
        assert_eq!(SourceKind::from_path(Path::new("metadata")), None);
    }

    #[tokio::test]
    async fn extracts_text_and_scans_into_output_folders() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let documents = dir.path().join("Documents");
        fs::create_dir_all(&documents)?;
        fs::write(documents.join("a_scan.pdf"), b"%PDF")?;
        fs::write(documents.join("b_note.txt"), "Bail signé le 1er mai")?;
        fs::write(documents.join("c_blank.png"), b"png")?;
        fs::write(documents.join("d_ignored.docx"), b"doc")?;

        let output = dir.path().join("outputs");
        let (pipeline, prompts) = document_pipeline(
            &[
                r#"{"document_name": "Facture 42", "date": "2024-05-01"}"#,
                r#"{"document_name": "Bail"}"#,
            ],
            &output,
            OutputFormat::Json,
        );

        let report = pipeline.run(&[documents]).await?;

        assert_eq!(report.written.len(), 2);
        assert!(report.skipped.is_empty());
        let scan_folder = output.join("Facture_42:2024-05-01");
        assert_eq!(
            fs::read_to_string(scan_folder.join("raw_text.txt"))?,
            "FACTURE 42 - ACME - total 120 EUR"
        );
        assert_eq!(
            fs::read_to_string(output.join("Bail").join("original_text.txt"))?,
            "Bail signé le 1er mai"
        );

        let prompts = prompts.lock().expect("lock").clone();
        assert_eq!(prompts, vec![
            "Extract:\nFACTURE 42 - ACME - total 120 EUR".to_string(),
            "Extract:\nBail signé le 1er mai".to_string(),
        ]);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_reply_aborts_the_run() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("note.txt"), "text")?;

        let (pipeline, _) = document_pipeline(&["not json"], &dir.path().join("out"), OutputFormat::Json);
        let result = pipeline.run(&[dir.path().to_path_buf()]).await;

        assert!(matches!(result, Err(ExtractionError::Parse(_))));
        Ok(())
    }

    #[tokio::test]
    async fn model_outage_skips_only_that_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.txt"), "first")?;
        fs::write(dir.path().join("b.txt"), "second")?;

        let (pipeline, _) = document_pipeline(&[r#"{"document_name": "A"}"#], &dir.path().join("out"), OutputFormat::Json);
        let report = pipeline.run(&[dir.path().to_path_buf()]).await?;

        assert_eq!(report.written.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].item.ends_with("b.txt"));
        Ok(())
    }

    #[tokio::test]
    async fn turtle_output_is_named_from_parsed_fields() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("devis.txt"), "Devis ACME")?;

        let reply = "@prefix ex: <http://example.org/> .\nex:Devis_ACME a ex:Document ; ex:date \"2024-06-01\" .";
        let output = dir.path().join("out");
        let (pipeline, _) = document_pipeline(&[reply], &output, OutputFormat::Turtle);
        pipeline.run(&[dir.path().to_path_buf()]).await?;

        let folder = output.join("Devis_ACME:2024-06-01");
        assert_eq!(fs::read_to_string(folder.join("rdf_output.ttl"))?, reply);
        assert_eq!(fs::read_to_string(folder.join("original_text.txt"))?, "Devis ACME");
        Ok(())
    }

    #[tokio::test]
    async fn turtle_collections_do_not_stop_the_run() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.txt"), "Devis")?;
        fs::write(dir.path().join("b.txt"), "Facture")?;

        let devis = "@prefix ex: <http://e/> .\nex:Devis a ex:Document ; ex:items (\"a\" \"b\") .";
        let facture = "@prefix ex: <http://e/> .\nex:Facture a ex:Document ; ex:ref ex:F\\-12 ; ex:date \"2024-06-02\" .";
        let output = dir.path().join("out");
        let (pipeline, _) = document_pipeline(&[devis, facture], &output, OutputFormat::Turtle);

        let report = pipeline.run(&[dir.path().to_path_buf()]).await?;

        assert_eq!(report.written.len(), 2);
        assert_eq!(fs::read_to_string(output.join("Devis").join("rdf_output.ttl"))?, devis);
        assert!(output.join("Facture:2024-06-02").join("rdf_output.ttl").exists());
        Ok(())
    }

    #[tokio::test]
    async fn graph_pipeline_loads_record_files_and_extracted_text() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("a.json"),
            r#"[{"document_name": "Contrat", "sender": {"name": "Ana"}}, {"document_name": "Devis", "company": {"name": "ACME"}}]"#,
        )?;
        fs::write(dir.path().join("b.txt"), "Facture de ACME")?;
        fs::write(dir.path().join("c.json"), "{ broken")?;
        fs::write(dir.path().join("d.pdf"), b"%PDF")?;
        fs::write(dir.path().join("metadata.json"), r#"{"id": "m1", "labelIds": ["INBOX"]}"#)?;

        let pipeline = GraphPipeline::new(
            ExtractionClient::new(
                QueuedModel::new(&[r#"{"document_name": "Facture", "company": "ACME"}"#]),
                PromptSet::inline("{document}"),
            ),
            GraphLoader::new(InMemoryGraph::new()),
        );

        let report = pipeline.run(&[dir.path().to_path_buf()]).await?;
        assert_eq!(report.written.len(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.graph.documents, 3);
        assert_eq!(report.graph.skipped, 1);
        assert!(!report.written.contains(&dir.path().join("metadata.json")));

        let graph = pipeline.into_loader().into_store();
        assert_eq!(graph.node_count(), 5);
        assert_eq!(graph.relationship_count(), 3);
        assert!(graph.nodes().contains(&GraphNode::new(NodeLabel::Company, "ACME")));
        Ok(())
    }
}
