use async_trait::async_trait;
use portal_plugin::{Permission, Plugin, PluginError, PluginOutput, Result};
use serde::Deserialize;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error};

/// Read-only access to the report directory.
///
/// Names handed to [`ReportStore::read_file`] are reduced to their final path
/// component, so nothing outside the root can be reached. Failures come back
/// as text for the model to read rather than as errors.
#[derive(Debug, Clone)]
pub struct ReportStore {
    root: PathBuf,
    allowed: Vec<String>,
}

impl ReportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            allowed: Vec::new(),
        }
    }

    /// Restricts reads (and listings) to these file names. Empty means no restriction.
    pub fn with_allowed(mut self, allowed: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed = allowed.into_iter().map(Into::into).collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_allowed(&self, name: &str) -> bool {
        self.allowed.is_empty() || self.allowed.iter().any(|a| a == name)
    }

    /// Report file names in the root, sorted. Empty if the root cannot be read.
    pub async fn list_reports(&self) -> Vec<String> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                error!(dir = %self.root.display(), "Reports directory not found");
                return Vec::new();
            }
            Err(e) => {
                error!(dir = %self.root.display(), error = %e, "Error listing reports");
                return Vec::new();
            }
        };

        let mut names = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                        let name = entry.file_name().to_string_lossy().into_owned();
                        if self.is_allowed(&name) {
                            names.push(name);
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!(dir = %self.root.display(), error = %e, "Error listing reports");
                    return Vec::new();
                }
            }
        }

        names.sort();
        names
    }

    /// Contents of `filename` inside the root, or an `Error: ...` message.
    pub async fn read_file(&self, filename: &str) -> String {
        let Some(basename) = Path::new(filename).file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return not_found(filename);
        };

        if !self.is_allowed(&basename) {
            return format!("Error: Access to file '{}' is not allowed.", filename);
        }

        let path = self.root.join(&basename);
        debug!(path = %path.display(), "Reading report");
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => not_found(filename),
            Err(e) => format!("Error reading file '{}': {}", filename, e),
        }
    }
}

fn not_found(filename: &str) -> String {
    format!("Error: File '{}' not found in the allowed directory.", filename)
}

/// Tool listing the available report files.
pub struct ListReportsPlugin {
    store: Arc<ReportStore>,
}

impl ListReportsPlugin {
    pub fn new(store: Arc<ReportStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Plugin for ListReportsPlugin {
    fn name(&self) -> &str {
        "list_reports"
    }

    fn description(&self) -> &str {
        "List the names of the reports available. Returns a JSON array of file names."
    }

    fn parameter_schema(&self) -> Option<Value> {
        None
    }

    fn required_permission(&self) -> Permission {
        Permission::READ_ONLY
    }

    async fn execute(&self, _input: Value) -> Result<PluginOutput> {
        let names = self.store.list_reports().await;
        let content = serde_json::to_string(&names).map_err(|e| PluginError::ExecutionFailed(e.to_string()))?;
        Ok(PluginOutput::new(content).with_metadata(serde_json::json!({ "count": names.len() })))
    }
}

#[derive(Debug, Deserialize)]
struct ReadReportParams {
    filename: String,
}

/// Tool returning the raw contents of one report file.
pub struct ReadReportPlugin {
    store: Arc<ReportStore>,
}

impl ReadReportPlugin {
    pub fn new(store: Arc<ReportStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Plugin for ReadReportPlugin {
    fn name(&self) -> &str {
        "read_file_content"
    }

    fn description(&self) -> &str {
        "Reads the content of a report file and returns it as a string. Only files in the reports directory can be read."
    }

    fn parameter_schema(&self) -> Option<Value> {
        Some(serde_json::json!({
            "type": "object",
            "required": ["filename"],
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "Exact report file name as returned by list_reports"
                }
            }
        }))
    }

    fn required_permission(&self) -> Permission {
        Permission::READ_ONLY
    }

    async fn execute(&self, input: Value) -> Result<PluginOutput> {
        let params: ReadReportParams = serde_json::from_value(input)
            .map_err(|e| PluginError::InvalidInput(format!("Invalid parameters: {}", e)))?;

        Ok(PluginOutput::new(self.store.read_file(&params.filename).await))
    }
}
