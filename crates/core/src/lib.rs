pub mod body;
pub mod config;
pub mod digitizer;
pub mod error;
pub mod gmail;
pub mod graph;
pub mod ingest;
pub mod llm;
pub mod mailbox;
pub mod models;
pub mod output;
pub mod stores;
pub mod traits;
pub mod turtle;

pub use body::{decode_base64url, BodyExtractor, QuoteHandling};
pub use config::{GmailConfig, Neo4jConfig, OcrEndpointConfig, OpenAiConfig};
pub use digitizer::{ConfiguredEngine, Digitizer, HttpOcrEngine, PdfTextLayer};
pub use error::{ExtractionError, GraphError, IngestError};
pub use gmail::GmailClient;
pub use graph::{GraphLoader, LoadSummary};
pub use ingest::{
    source_folders, BatchReport, DocumentPipeline, GraphPipeline, OutputFormat, SkippedItem,
};
pub use llm::{ExtractionClient, OpenAiChatModel, PromptSet, PromptTemplate};
pub use mailbox::{extract_sender_address, MailPipeline};
pub use models::{
    Attachment, EmailMetadata, ExtractedDocument, GraphNode, MailMessage, MailQuery, MailThread,
    MessagePart, MessageRef, NodeLabel, RelationKind, Relationship, ThreadRef,
};
pub use output::{OutputWriter, StructuredOutput};
pub use stores::{InMemoryGraph, Neo4jStore};
pub use traits::{ChatModel, GraphStore, MailSource, OcrEngine};
pub use turtle::TurtleDocument;
