use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One embedded report paragraph, as cached on disk and sent to the index.
///
/// `id` is `<report_name>-<paragraph_index>` and doubles as the cache file
/// stem, so regenerating never duplicates a record.
///
/// # Example
///
/// ```
/// # use portal_core::rag::{EmbeddingRecord, RecordMetadata};
/// let record = EmbeddingRecord::new(
///     EmbeddingRecord::paragraph_id("company_report_HPG", 3),
///     vec![0.1, 0.2, 0.3],
///     RecordMetadata {
///         report_date: Some("16/06/2025".to_string()),
///         report_name: "company_report_HPG".to_string(),
///         paragraph_title: "Outlook".to_string(),
///         paragraph_text: "Steel demand recovers.".to_string(),
///     },
/// );
/// assert_eq!(record.id, "company_report_HPG-3");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: String,
    pub values: Vec<f32>,
    #[serde(default)]
    pub metadata: RecordMetadata,
}

impl EmbeddingRecord {
    pub fn new(id: impl Into<String>, values: Vec<f32>, metadata: RecordMetadata) -> Self {
        Self {
            id: id.into(),
            values,
            metadata,
        }
    }

    pub fn paragraph_id(report_name: &str, index: usize) -> String {
        format!("{}-{}", report_name, index)
    }
}

/// Provenance of an embedded paragraph.
///
/// The index rejects null metadata values, so a missing date is omitted
/// rather than serialized as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_date: Option<String>,
    pub report_name: String,
    #[serde(alias = "paragraph_name")]
    pub paragraph_title: String,
    pub paragraph_text: String,
}

/// Embedded evaluation question, cached as `q<index>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionEmbedding {
    pub values: Vec<f32>,
    pub text: String,
}

/// Nearest-neighbour hit returned by a vector query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RecordMetadata>,
}

/// Index-wide statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IndexStats {
    pub dimension: u32,
    pub total_vector_count: u64,
    pub namespaces: HashMap<String, NamespaceStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NamespaceStats {
    pub vector_count: u64,
}

/// Counts from one embedding batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationSummary {
    pub generated: usize,
    pub skipped_existing: usize,
    pub skipped_blank: usize,
    pub failed: usize,
}

impl std::fmt::Display for GenerationSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} generated, {} already present, {} blank, {} failed",
            self.generated, self.skipped_existing, self.skipped_blank, self.failed
        )
    }
}
