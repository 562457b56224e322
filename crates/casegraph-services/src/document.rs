use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use casegraph_core::config::IngestionConfig;
use casegraph_core::error::{CaseGraphError, Result};
use casegraph_core::traits::DocumentReader;

/// File extensions the pipeline accepts.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["pdf", "txt"];

pub fn extension_of(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

pub fn is_accepted(filename: &str) -> bool {
    extension_of(filename).is_some_and(|ext| ACCEPTED_EXTENSIONS.contains(&ext.as_str()))
}

fn non_empty(filename: &str, text: String) -> Result<String> {
    if text.trim().is_empty() {
        return Err(CaseGraphError::Fatal(format!(
            "document '{}' contains no text",
            filename
        )));
    }
    Ok(text)
}

/// Reads UTF-8 text files. Anything else needs an extraction service.
pub struct PlainTextReader;

impl PlainTextReader {
    fn decode(filename: &str, bytes: Vec<u8>) -> Result<String> {
        match extension_of(filename).as_deref() {
            Some("txt") => {
                let text = String::from_utf8(bytes).map_err(|_| {
                    CaseGraphError::Fatal(format!("document '{}' is not valid UTF-8", filename))
                })?;
                non_empty(filename, text)
            }
            _ => Err(CaseGraphError::Fatal(format!(
                "no extraction service configured for '{}'",
                filename
            ))),
        }
    }
}

impl DocumentReader for PlainTextReader {
    fn read(&self, filename: String, bytes: Vec<u8>) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move { Self::decode(&filename, bytes) })
    }
}

/// Sends binary documents to an extraction service as a multipart `file`
/// upload; plain text is decoded locally.
pub struct HttpDocumentReader {
    client: reqwest::Client,
    url: String,
}

impl HttpDocumentReader {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[derive(Deserialize)]
struct ExtractionResponse {
    text: String,
}

fn mime_for(filename: &str) -> &'static str {
    match extension_of(filename).as_deref() {
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

impl DocumentReader for HttpDocumentReader {
    fn read(&self, filename: String, bytes: Vec<u8>) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            if extension_of(&filename).as_deref() == Some("txt") {
                return PlainTextReader::decode(&filename, bytes);
            }

            let size = bytes.len();
            let part = reqwest::multipart::Part::bytes(bytes)
                .file_name(filename.clone())
                .mime_str(mime_for(&filename))
                .map_err(|e| CaseGraphError::Fatal(format!("invalid MIME type: {}", e)))?;
            let form = reqwest::multipart::Form::new().part("file", part);

            let resp = self
                .client
                .post(&self.url)
                .multipart(form)
                .send()
                .await
                .map_err(|e| CaseGraphError::transient("extraction", e.to_string()))?;

            if !resp.status().is_success() {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                return Err(CaseGraphError::from_status("extraction", status, &body));
            }

            let body: ExtractionResponse = resp
                .json()
                .await
                .map_err(|e| CaseGraphError::invalid_response("extraction", e.to_string()))?;
            debug!(filename = %filename, bytes = size, chars = body.text.len(), "Extracted document text");
            non_empty(&filename, body.text)
        })
    }
}

/// Build the configured reader.
pub fn create_reader(config: &IngestionConfig) -> Arc<dyn DocumentReader> {
    match &config.extraction_url {
        Some(url) => Arc::new(HttpDocumentReader::new(url.clone())),
        None => Arc::new(PlainTextReader),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_extensions() {
        assert!(is_accepted("FIR_123.pdf"));
        assert!(is_accepted("fir.PDF"));
        assert!(is_accepted("notes.txt"));
        assert!(!is_accepted("scan.docx"));
        assert!(!is_accepted("noextension"));
        assert!(!is_accepted("trailingdot."));
    }

    #[tokio::test]
    async fn test_plain_text_reader() {
        let reader = PlainTextReader;
        let text = reader
            .read("fir.txt".into(), "Accused found with 2 kg ganja".as_bytes().to_vec())
            .await
            .unwrap();
        assert_eq!(text, "Accused found with 2 kg ganja");
    }

    #[tokio::test]
    async fn test_plain_text_reader_rejects() {
        let reader = PlainTextReader;
        for (name, bytes) in [
            ("fir.txt", vec![0xff, 0xfe, 0x00]),
            ("fir.txt", b"   \n".to_vec()),
            ("fir.pdf", b"%PDF-1.7".to_vec()),
        ] {
            let err = reader.read(name.into(), bytes).await.unwrap_err();
            assert!(!err.is_retryable(), "{name} should be fatal");
        }
    }

    #[tokio::test]
    async fn test_http_reader_decodes_text_locally() {
        // The URL is never contacted for .txt files.
        let reader = HttpDocumentReader::new("http://127.0.0.1:9/extract");
        let text = reader.read("fir.txt".into(), b"hello".to_vec()).await.unwrap();
        assert_eq!(text, "hello");
    }
}
