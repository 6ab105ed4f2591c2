//! Offline embedding batch jobs.
//!
//! Each record is written to its own JSON file named after its id, and a
//! record whose file already exists is never embedded again. Re-running a
//! job after a crash or rate-limit therefore resumes where it stopped.

use super::embedder::{Embedder, EmbedderError};
use super::types::{EmbeddingRecord, GenerationSummary, QuestionEmbedding, RecordMetadata};
use super::Result;
use crate::provider::ProviderError;
use crate::report::{report_name, Report};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, error, info, warn};

/// Sentence embedded by [`EmbeddingGenerator::test_embedding`] when none is given.
pub const SAMPLE_SENTENCE: &str = "How does alphafold work?";

/// Result of embedding a single sample sentence.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingSample {
    pub text: String,
    pub dimension: usize,
    pub head: Vec<f32>,
}

pub struct EmbeddingGenerator {
    embedder: Embedder,
    request_delay: Duration,
}

impl EmbeddingGenerator {
    pub fn new(embedder: Embedder, request_delay: Duration) -> Self {
        Self {
            embedder,
            request_delay,
        }
    }

    /// Embeds every paragraph of every `*.json` report in `source_dir`.
    ///
    /// Reports are visited in file-name order. Records land in
    /// `save_dir/<report_name>-<index>.json`; blank paragraphs are skipped
    /// but still consume their index.
    ///
    /// # Errors
    ///
    /// Returns an error if `source_dir` cannot be listed, `save_dir` cannot be
    /// created, or no API key is configured. Failures on individual
    /// paragraphs are logged and counted instead.
    pub async fn generate_report_embeddings(&self, source_dir: &Path, save_dir: &Path) -> Result<GenerationSummary> {
        fs::create_dir_all(save_dir).await?;
        let reports = json_files(source_dir).await?;
        info!(count = reports.len(), source = %source_dir.display(), "Generating report embeddings");

        let mut summary = GenerationSummary::default();
        for path in reports {
            let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            let name = report_name(&file_name).to_string();

            let parsed = fs::read_to_string(&path)
                .await
                .map_err(|e| e.to_string())
                .and_then(|s| Report::parse(&s).map_err(|e| e.to_string()));
            let report = match parsed {
                Ok(report) => report,
                Err(e) => {
                    warn!(file = %file_name, error = %e, "Skipping unreadable report");
                    continue;
                }
            };

            for (index, paragraph) in report.content.iter().enumerate() {
                let id = EmbeddingRecord::paragraph_id(&name, index);
                let out_path = save_dir.join(format!("{}.json", id));

                if fs::try_exists(&out_path).await.unwrap_or(false) {
                    debug!(id = %id, "Embedding already exists");
                    summary.skipped_existing += 1;
                    continue;
                }
                if paragraph.paragraph.trim().is_empty() {
                    debug!(id = %id, "Skipping blank paragraph");
                    summary.skipped_blank += 1;
                    continue;
                }

                let values = match self.embed_paced(&paragraph.paragraph).await {
                    Ok(values) => values,
                    Err(e) if is_missing_key(&e) => return Err(e.into()),
                    Err(e) => {
                        error!(id = %id, error = %e, "Failed to embed paragraph");
                        summary.failed += 1;
                        continue;
                    }
                };

                let record = EmbeddingRecord::new(
                    id.clone(),
                    values,
                    RecordMetadata {
                        report_date: report.report_date.clone(),
                        report_name: name.clone(),
                        paragraph_title: paragraph.title.clone(),
                        paragraph_text: paragraph.paragraph.clone(),
                    },
                );
                if self.write_record(&out_path, &record).await {
                    info!(id = %id, "Saved embedding");
                    summary.generated += 1;
                } else {
                    summary.failed += 1;
                }
            }
        }

        info!(%summary, "Report embeddings done");
        Ok(summary)
    }

    /// Embeds each question of the JSON string list at `questions_path` into
    /// `save_dir/q<index>.json`.
    ///
    /// A missing or malformed questions file is logged and generates nothing.
    pub async fn generate_question_embeddings(
        &self,
        questions_path: &Path,
        save_dir: &Path,
    ) -> Result<GenerationSummary> {
        let mut summary = GenerationSummary::default();

        let questions: Vec<String> = match fs::read_to_string(questions_path)
            .await
            .map_err(|e| e.to_string())
            .and_then(|s| serde_json::from_str(&s).map_err(|e| e.to_string()))
        {
            Ok(questions) => questions,
            Err(e) => {
                error!(path = %questions_path.display(), error = %e, "Could not load questions");
                return Ok(summary);
            }
        };

        fs::create_dir_all(save_dir).await?;
        info!(count = questions.len(), "Generating question embeddings");

        for (index, question) in questions.into_iter().enumerate() {
            let out_path = save_dir.join(format!("q{}.json", index));
            if fs::try_exists(&out_path).await.unwrap_or(false) {
                summary.skipped_existing += 1;
                continue;
            }

            match self.embed_paced(&question).await {
                Ok(values) => {
                    let record = QuestionEmbedding { values, text: question };
                    if self.write_record(&out_path, &record).await {
                        summary.generated += 1;
                    } else {
                        summary.failed += 1;
                    }
                }
                Err(e) if is_missing_key(&e) => return Err(e.into()),
                Err(e) => {
                    error!(index, error = %e, "Failed to embed question");
                    summary.failed += 1;
                }
            }
        }

        info!(%summary, "Question embeddings done");
        Ok(summary)
    }

    /// Embeds one sentence and reports its dimension and first ten values.
    pub async fn test_embedding(&self, text: &str) -> Result<EmbeddingSample> {
        let values = self.embedder.embed(text).await?;
        Ok(EmbeddingSample {
            text: text.to_string(),
            dimension: values.len(),
            head: values.iter().take(10).copied().collect(),
        })
    }

    /// One embedding call followed by the configured pause. A missing key
    /// returns immediately since the batch stops on it.
    async fn embed_paced(&self, text: &str) -> std::result::Result<Vec<f32>, EmbedderError> {
        let result = self.embedder.embed(text).await;
        if matches!(&result, Err(e) if is_missing_key(e)) {
            return result;
        }
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
        result
    }

    async fn write_record<T: Serialize>(&self, path: &Path, record: &T) -> bool {
        let written = match serde_json::to_string_pretty(record) {
            Ok(json) => fs::write(path, json).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = &written {
            error!(path = %path.display(), error = %e, "Failed to write embedding file");
        }
        written.is_ok()
    }
}

/// A missing key fails every call the same way, so it ends the batch.
fn is_missing_key(error: &EmbedderError) -> bool {
    matches!(error, EmbedderError::Provider(ProviderError::MissingApiKey(_)))
}

/// `*.json` files directly under `dir`, sorted by name.
async fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::RagError;
    use crate::provider::{ChatRequest, ChatResponse, Provider};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Returns `[len, 1.0]` for every text and counts calls.
    #[derive(Default)]
    struct CountingProvider {
        calls: AtomicUsize,
        fail_on: Option<&'static str>,
        missing_key: bool,
    }

    #[async_trait]
    impl Provider for CountingProvider {
        async fn chat(&self, _request: ChatRequest) -> crate::provider::Result<ChatResponse> {
            Err(ProviderError::Other("chat not supported".to_string()))
        }

        async fn embed(&self, text: &str, _model: &str) -> crate::provider::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.missing_key {
                return Err(ProviderError::MissingApiKey("GEMINI_API_KEY".to_string()));
            }
            if self.fail_on == Some(text) {
                return Err(ProviderError::Api("rate limited".to_string()));
            }
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    fn generator(provider: Arc<CountingProvider>) -> EmbeddingGenerator {
        EmbeddingGenerator::new(Embedder::new(provider, "test-embed"), Duration::ZERO)
    }

    fn write_report(dir: &Path, name: &str, json: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(name), json).unwrap();
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn blank_paragraphs_are_skipped_but_keep_their_index() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("reports");
        let save = dir.path().join("embeddings");
        write_report(
            &source,
            "company_report_HPG.json",
            r#"{"report_date": "16/06/2025", "content": [
                {"title": "Intro", "paragraph": ""},
                {"title": "Outlook", "paragraph": "Hello world"}
            ]}"#,
        );

        let provider = Arc::new(CountingProvider::default());
        let summary = generator(provider.clone())
            .generate_report_embeddings(&source, &save)
            .await
            .unwrap();

        assert_eq!(summary.generated, 1);
        assert_eq!(summary.skipped_blank, 1);
        assert_eq!(file_names(&save), vec!["company_report_HPG-1.json"]);

        let record: EmbeddingRecord =
            serde_json::from_str(&std::fs::read_to_string(save.join("company_report_HPG-1.json")).unwrap()).unwrap();
        assert_eq!(record.id, "company_report_HPG-1");
        assert_eq!(record.values, vec![11.0, 1.0]);
        assert_eq!(record.metadata.report_date.as_deref(), Some("16/06/2025"));
        assert_eq!(record.metadata.paragraph_title, "Outlook");
        assert_eq!(record.metadata.report_name, "company_report_HPG");
    }

    #[tokio::test]
    async fn second_run_makes_no_embedding_calls() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("reports");
        let save = dir.path().join("embeddings");
        write_report(&source, "a.json", r#"{"content": [{"paragraph": "one"}, {"paragraph": "two"}]}"#);
        write_report(&source, "b.json", r#"{"content": [{"paragraph": "three"}]}"#);

        let provider = Arc::new(CountingProvider::default());
        let generator = generator(provider.clone());

        let first = generator.generate_report_embeddings(&source, &save).await.unwrap();
        assert_eq!(first.generated, 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);

        let second = generator.generate_report_embeddings(&source, &save).await.unwrap();
        assert_eq!(second.generated, 0);
        assert_eq!(second.skipped_existing, 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(file_names(&save), vec!["a-0.json", "a-1.json", "b-0.json"]);
    }

    #[tokio::test]
    async fn failures_are_counted_and_malformed_reports_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("reports");
        let save = dir.path().join("embeddings");
        write_report(&source, "bad.json", "{not json");
        write_report(&source, "good.json", r#"{"content": [{"paragraph": "flaky"}, {"paragraph": "fine"}]}"#);
        write_report(&source, "notes.txt", "ignored");

        let provider = Arc::new(CountingProvider {
            fail_on: Some("flaky"),
            ..Default::default()
        });
        let summary = generator(provider).generate_report_embeddings(&source, &save).await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.generated, 1);
        assert_eq!(file_names(&save), vec!["good-1.json"]);
    }

    #[tokio::test]
    async fn missing_api_key_stops_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("reports");
        write_report(&source, "a.json", r#"{"content": [{"paragraph": "one"}, {"paragraph": "two"}]}"#);

        let provider = Arc::new(CountingProvider {
            missing_key: true,
            ..Default::default()
        });
        let result = generator(provider.clone())
            .generate_report_embeddings(&source, &dir.path().join("out"))
            .await;

        assert!(matches!(
            result,
            Err(RagError::Embedder(EmbedderError::Provider(ProviderError::MissingApiKey(_))))
        ));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_api_key_skips_the_request_delay() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("reports");
        write_report(&source, "a.json", r#"{"content": [{"paragraph": "one"}]}"#);

        let provider = Arc::new(CountingProvider {
            missing_key: true,
            ..Default::default()
        });
        let generator = EmbeddingGenerator::new(Embedder::new(provider, "test-embed"), Duration::from_secs(60));

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            generator.generate_report_embeddings(&source, &dir.path().join("out")),
        )
        .await
        .expect("missing key should not wait out the request delay");

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn question_embeddings_are_numbered() {
        let dir = tempfile::tempdir().unwrap();
        let questions = dir.path().join("questions.json");
        std::fs::write(&questions, r#"["What is HPG's outlook?", "Who leads steel?"]"#).unwrap();
        let save = dir.path().join("questions");

        let provider = Arc::new(CountingProvider::default());
        let summary = generator(provider)
            .generate_question_embeddings(&questions, &save)
            .await
            .unwrap();

        assert_eq!(summary.generated, 2);
        assert_eq!(file_names(&save), vec!["q0.json", "q1.json"]);
        let q1: QuestionEmbedding =
            serde_json::from_str(&std::fs::read_to_string(save.join("q1.json")).unwrap()).unwrap();
        assert_eq!(q1.text, "Who leads steel?");
    }

    #[tokio::test]
    async fn blank_questions_are_still_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let questions = dir.path().join("questions.json");
        std::fs::write(&questions, r#"["", "Who leads steel?"]"#).unwrap();
        let save = dir.path().join("questions");

        let provider = Arc::new(CountingProvider::default());
        let summary = generator(provider.clone())
            .generate_question_embeddings(&questions, &save)
            .await
            .unwrap();

        assert_eq!(summary.generated, 2);
        assert_eq!(summary.skipped_blank, 0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(file_names(&save), vec!["q0.json", "q1.json"]);
    }

    #[tokio::test]
    async fn missing_questions_file_generates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(CountingProvider::default());

        let summary = generator(provider.clone())
            .generate_question_embeddings(&dir.path().join("missing.json"), &dir.path().join("out"))
            .await
            .unwrap();

        assert_eq!(summary, GenerationSummary::default());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_embedding_reports_dimension_and_head() {
        let provider = Arc::new(CountingProvider::default());
        let sample = generator(provider).test_embedding(SAMPLE_SENTENCE).await.unwrap();

        assert_eq!(sample.dimension, 2);
        assert_eq!(sample.head, vec![SAMPLE_SENTENCE.len() as f32, 1.0]);
    }
}
