use crate::config::OcrEndpointConfig;
use crate::error::IngestError;
use crate::traits::OcrEngine;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::Document;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Renders shorter than this, after trimming, are treated as failed scans.
pub const MIN_USABLE_CHARS: usize = 20;

pub const SCANNED_EXTENSIONS: [&str; 4] = ["pdf", "png", "jpg", "jpeg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    Pdf,
    Image,
}

impl ScanKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension().and_then(|ext| ext.to_str())?;
        if ext.eq_ignore_ascii_case("pdf") {
            Some(ScanKind::Pdf)
        } else if SCANNED_EXTENSIONS[1..]
            .iter()
            .any(|known| ext.eq_ignore_ascii_case(known))
        {
            Some(ScanKind::Image)
        } else {
            None
        }
    }

    fn media_type(self, path: &Path) -> &'static str {
        match self {
            ScanKind::Pdf => "application/pdf",
            ScanKind::Image => {
                let is_png = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
                if is_png {
                    "image/png"
                } else {
                    "image/jpeg"
                }
            }
        }
    }
}

/// Whether a rendered scan carries enough text to be worth extracting from.
pub fn is_usable_render(text: &str) -> bool {
    text.trim().chars().count() >= MIN_USABLE_CHARS
}

/// Wraps an OCR engine so that no scan can abort a batch.
pub struct Digitizer<E> {
    engine: E,
}

impl<E> Digitizer<E>
where
    E: OcrEngine + Send + Sync,
{
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    /// `None` means "no usable text": unknown extension, engine failure, or a
    /// render below [`MIN_USABLE_CHARS`].
    pub async fn digitize(&self, path: &Path) -> Option<String> {
        if ScanKind::from_path(path).is_none() {
            debug!(path = %path.display(), "not a scanned document");
            return None;
        }

        match self.engine.render(path).await {
            Ok(text) if is_usable_render(&text) => Some(text),
            Ok(text) => {
                warn!(
                    path = %path.display(),
                    chars = text.trim().chars().count(),
                    "scan rendered too little text, skipping"
                );
                None
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "OCR failed, skipping");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct OcrRequest {
    document_base64: String,
    media_type: String,
    source_path: String,
}

#[derive(Debug, Clone, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    pages: Option<Vec<OcrPage>>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OcrPage {
    #[serde(default)]
    text: Option<String>,
}

/// Remote OCR model behind a JSON endpoint.
pub struct HttpOcrEngine {
    config: OcrEndpointConfig,
    client: Client,
}

impl HttpOcrEngine {
    pub fn new(config: OcrEndpointConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl OcrEngine for HttpOcrEngine {
    async fn render(&self, path: &Path) -> Result<String, IngestError> {
        let kind = ScanKind::from_path(path).ok_or_else(|| {
            IngestError::InvalidArgument(format!("unsupported scan type: {}", path.display()))
        })?;

        let document = tokio::fs::read(path).await?;
        let payload = OcrRequest {
            document_base64: STANDARD.encode(document),
            media_type: kind.media_type(path).to_string(),
            source_path: path.to_string_lossy().to_string(),
        };

        let mut request = self.client.post(&self.config.endpoint).json(&payload);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(IngestError::OcrFailed(format!(
                "OCR request to {} returned {}",
                self.config.endpoint,
                response.status()
            )));
        }

        let payload: OcrResponse = response.json().await?;
        render_payload(&payload, path)
    }
}

/// Pages are joined with blank lines; a flat `text` field is used when no page has text.
fn render_payload(payload: &OcrResponse, path: &Path) -> Result<String, IngestError> {
    if let Some(pages) = &payload.pages {
        let rendered = pages
            .iter()
            .filter_map(|page| page.text.as_deref())
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>();

        if !rendered.is_empty() {
            return Ok(rendered.join("\n\n"));
        }
    }

    match payload.text.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(IngestError::OcrFailed(format!(
            "OCR response was empty for {}",
            path.display()
        ))),
    }
}

/// Reads the embedded text layer of a PDF. Images have no text layer.
#[derive(Debug, Default)]
pub struct PdfTextLayer;

impl PdfTextLayer {
    fn extract(path: &Path) -> Result<String, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for page_no in document.get_pages().into_keys() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;
            let text = text.trim();
            if !text.is_empty() {
                pages.push(text.to_string());
            }
        }

        Ok(pages.join("\n\n"))
    }
}

#[async_trait]
impl OcrEngine for PdfTextLayer {
    async fn render(&self, path: &Path) -> Result<String, IngestError> {
        if ScanKind::from_path(path) != Some(ScanKind::Pdf) {
            return Err(IngestError::OcrFailed(format!(
                "no OCR endpoint configured for image {}",
                path.display()
            )));
        }

        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || PdfTextLayer::extract(&path))
            .await
            .map_err(|error| IngestError::PdfParse(error.to_string()))?
    }
}

/// Tries the primary engine and falls back when it errors or renders unusable text.
pub struct FallbackEngine<P, F> {
    primary: P,
    fallback: F,
}

impl<P, F> FallbackEngine<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl<P, F> OcrEngine for FallbackEngine<P, F>
where
    P: OcrEngine + Send + Sync,
    F: OcrEngine + Send + Sync,
{
    async fn render(&self, path: &Path) -> Result<String, IngestError> {
        match self.primary.render(path).await {
            Ok(text) if is_usable_render(&text) => Ok(text),
            Ok(_) => self.fallback.render(path).await,
            Err(primary_error) => self.fallback.render(path).await.map_err(|fallback_error| {
                IngestError::OcrFailed(format!("{primary_error}; fallback failed: {fallback_error}"))
            }),
        }
    }
}

/// The engine stack used by the binary: text layer first, then the OCR endpoint when configured.
pub enum ConfiguredEngine {
    TextLayerOnly(PdfTextLayer),
    WithOcr(FallbackEngine<PdfTextLayer, HttpOcrEngine>),
}

impl ConfiguredEngine {
    pub fn new(ocr: Option<OcrEndpointConfig>) -> Self {
        match ocr {
            Some(config) => ConfiguredEngine::WithOcr(FallbackEngine::new(
                PdfTextLayer,
                HttpOcrEngine::new(config),
            )),
            None => ConfiguredEngine::TextLayerOnly(PdfTextLayer),
        }
    }
}

#[async_trait]
impl OcrEngine for ConfiguredEngine {
    async fn render(&self, path: &Path) -> Result<String, IngestError> {
        match self {
            ConfiguredEngine::TextLayerOnly(engine) => engine.render(path).await,
            ConfiguredEngine::WithOcr(engine) => engine.render(path).await,
        }
    }
}
