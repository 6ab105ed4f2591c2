//! Report documents and PDF extraction.
//!
//! A report is a dated list of titled paragraphs. Reports live on disk as
//! JSON, one file per source document; the file name is the report's identity.

use crate::provider::{Attachment, ChatRequest, Message, Provider, ProviderError};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid report JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Model returned no content for {0}")]
    EmptyResponse(String),
}

pub type Result<T> = std::result::Result<T, ReportError>;

/// Prompt sent alongside a PDF to turn it into a [`Report`].
pub const EXTRACTION_PROMPT: &str = r#"Task:
Extract paragraph titles and their corresponding text from the provided PDF document.

Instructions:
- Include only:
  - Paragraph titles (if available) and their associated paragraph text
  - Any bullet-point summaries associated with each paragraph
- Exclude:
  - Tables
  - Charts or graphs
  - Footers and headers
  - Legal disclaimers or notices

Formatting Guidelines:
- Paragraph text must be in valid Markdown syntax.
- Bullet points should be formatted as Markdown list items (e.g., "- Item").
- All output must use ASCII characters only (no Unicode or special symbols).

Output Format:
Return a single JSON object structured as follows:
{
  "report_date": "DD/MM/YYYY",
  "content": [
    {
      "title": "Title of the paragraph",
      "paragraph": "Markdown-formatted paragraph text."
    }
  ]
}

Constraints:
- The output must be valid JSON.
- Use only ASCII characters in both keys and values.
- Do not include any explanatory text, comments, or metadata outside the JSON object.
"#;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(default)]
    pub report_date: Option<String>,
    #[serde(default)]
    pub content: Vec<Paragraph>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub paragraph: String,
}

impl Report {
    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Name of a report file without its `.json` suffix.
pub fn report_name(file_name: &str) -> &str {
    file_name.strip_suffix(".json").unwrap_or(file_name)
}

/// Turns report PDFs into [`Report`] JSON with the chat model.
pub struct ReportExtractor {
    provider: Arc<dyn Provider>,
    model: String,
}

impl ReportExtractor {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Sends the PDF inline with [`EXTRACTION_PROMPT`] and parses the reply.
    pub async fn extract(&self, pdf_path: &Path) -> Result<Report> {
        let bytes = fs::read(pdf_path)?;
        info!(path = %pdf_path.display(), bytes = bytes.len(), "Extracting report from PDF");

        let message = Message::user(EXTRACTION_PROMPT).with_attachment(Attachment {
            mime_type: "application/pdf".to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(&bytes),
        });
        let request = ChatRequest::new(&self.model, vec![message]).with_temperature(0.0);
        let response = self.provider.chat(request).await?;

        let text = response.message.content;
        if text.trim().is_empty() {
            return Err(ReportError::EmptyResponse(pdf_path.display().to_string()));
        }
        debug!(chars = text.len(), "Received extraction response");

        Report::parse(strip_code_fence(&text))
    }

    /// Extracts `pdf_path` and writes `<out_dir>/<stem>.json`.
    pub async fn extract_to_dir(&self, pdf_path: &Path, out_dir: &Path) -> Result<PathBuf> {
        let report = self.extract(pdf_path).await?;
        fs::create_dir_all(out_dir)?;

        let stem = pdf_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report".to_string());
        let out_path = out_dir.join(format!("{}.json", stem));
        report.save(&out_path)?;

        info!(path = %out_path.display(), paragraphs = report.content.len(), "Saved extracted report");
        Ok(out_path)
    }
}

/// Removes a surrounding Markdown code fence (```json ... ```), if any.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ChatResponse;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct CannedProvider {
        reply: String,
        seen: Mutex<Option<ChatRequest>>,
    }

    #[async_trait]
    impl Provider for CannedProvider {
        async fn chat(&self, request: ChatRequest) -> crate::provider::Result<ChatResponse> {
            *self.seen.lock().unwrap() = Some(request);
            Ok(ChatResponse {
                model: "test".to_string(),
                message: Message::assistant(self.reply.clone()),
                finish_reason: None,
            })
        }

        async fn embed(&self, _text: &str, _model: &str) -> crate::provider::Result<Vec<f32>> {
            Ok(vec![])
        }
    }

    #[test]
    fn missing_fields_take_defaults() {
        let report = Report::parse(r#"{"content": [{"paragraph": "Hello"}, {}]}"#).unwrap();

        assert_eq!(report.report_date, None);
        assert_eq!(report.content.len(), 2);
        assert_eq!(report.content[0].title, "");
        assert_eq!(report.content[0].paragraph, "Hello");
        assert_eq!(report.content[1], Paragraph::default());

        let empty = Report::parse("{}").unwrap();
        assert!(empty.content.is_empty());
    }

    #[test]
    fn report_name_strips_json_suffix() {
        assert_eq!(report_name("company_report_HPG.json"), "company_report_HPG");
        assert_eq!(report_name("notes.txt"), "notes.txt");
    }

    #[test]
    fn strips_fenced_json() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n{}\n```\n"), "{}");
        assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[tokio::test]
    async fn extracts_and_saves_report() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("company_report_HPG.pdf");
        fs::write(&pdf, b"%PDF-1.4").unwrap();

        let provider = Arc::new(CannedProvider {
            reply: "```json\n{\"report_date\": \"16/06/2025\", \"content\": [{\"title\": \"Outlook\", \"paragraph\": \"- Steady\"}]}\n```".to_string(),
            seen: Mutex::new(None),
        });
        let extractor = ReportExtractor::new(provider.clone(), "gemini-test");

        let out_dir = dir.path().join("json");
        let out_path = extractor.extract_to_dir(&pdf, &out_dir).await.unwrap();

        assert_eq!(out_path, out_dir.join("company_report_HPG.json"));
        let saved = Report::load(&out_path).unwrap();
        assert_eq!(saved.report_date.as_deref(), Some("16/06/2025"));
        assert_eq!(saved.content[0].title, "Outlook");

        let request = provider.seen.lock().unwrap().clone().unwrap();
        let attachment = &request.messages[0].attachments.as_ref().unwrap()[0];
        assert_eq!(attachment.mime_type, "application/pdf");
        assert_eq!(attachment.data, "JVBERi0xLjQ=");
    }

    #[tokio::test]
    async fn empty_reply_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("empty.pdf");
        fs::write(&pdf, b"%PDF").unwrap();

        let provider = Arc::new(CannedProvider {
            reply: String::new(),
            seen: Mutex::new(None),
        });
        let extractor = ReportExtractor::new(provider, "gemini-test");

        let result = extractor.extract(&pdf).await;
        assert!(matches!(result, Err(ReportError::EmptyResponse(_))));
    }
}
