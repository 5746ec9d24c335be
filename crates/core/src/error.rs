use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("pdf text layer error: {0}")]
    PdfParse(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("model reply is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("model reply is not valid Turtle (line {line}): {details}")]
    Turtle { line: usize, details: String },

    #[error("prompt template error: {0}")]
    Template(String),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Local(#[from] IngestError),
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
