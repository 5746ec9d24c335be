use crate::{
    ExtractionError, GraphError, GraphNode, IngestError, MailMessage, MailQuery, MailThread,
    MessageRef, Relationship, ThreadRef,
};
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait MailSource {
    async fn list_messages(&self, query: &MailQuery) -> Result<Vec<MessageRef>, IngestError>;

    async fn list_threads(&self, query: &MailQuery) -> Result<Vec<ThreadRef>, IngestError>;

    async fn get_message(&self, message_id: &str) -> Result<MailMessage, IngestError>;

    async fn get_thread(&self, thread_id: &str) -> Result<MailThread, IngestError>;

    /// Raw bytes of an attachment body.
    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, IngestError>;
}

#[async_trait]
pub trait OcrEngine {
    /// Text rendering of a PDF or raster image.
    async fn render(&self, path: &Path) -> Result<String, IngestError>;
}

#[async_trait]
pub trait ChatModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String, ExtractionError>;
}

#[async_trait]
pub trait GraphStore {
    async fn merge_node(&self, node: &GraphNode) -> Result<(), GraphError>;

    /// Merges both endpoints and the directed edge between them.
    async fn merge_relationship(&self, relationship: &Relationship) -> Result<(), GraphError>;
}
