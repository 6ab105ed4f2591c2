//! Pinecone REST client.
//!
//! Index management goes through the control plane; reads and writes go to
//! the index's own data-plane host, which the control plane reports.

use super::store::{Result, VectorStore, VectorStoreError};
use super::types::{EmbeddingRecord, IndexStats, QueryMatch};
use crate::config::{VectorDbConfig, PINECONE_API_KEY_VAR};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);
const READY_POLL_ATTEMPTS: usize = 60;

/// Shape of a serverless index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: u32,
    pub metric: String,
    pub cloud: String,
    pub region: String,
}

impl From<&VectorDbConfig> for IndexSpec {
    fn from(config: &VectorDbConfig) -> Self {
        Self {
            name: config.index_name.clone(),
            dimension: config.dimension,
            metric: config.metric.clone(),
            cloud: config.cloud.clone(),
            region: config.region.clone(),
        }
    }
}

/// Control-plane client.
#[derive(Clone)]
pub struct PineconeClient {
    control_plane_url: String,
    api_version: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl PineconeClient {
    pub fn new(config: &VectorDbConfig) -> Self {
        Self {
            control_plane_url: config.control_plane_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            api_key: config.api_key.clone(),
            http_client: reqwest::Client::new(),
        }
    }

    pub fn with_http_client(mut self, http_client: reqwest::Client) -> Self {
        self.http_client = http_client;
        self
    }

    /// Returns a handle to the index, creating it first if it does not exist.
    ///
    /// Waits for a newly created index to report ready.
    pub async fn ensure_index(&self, spec: &IndexSpec, namespace: &str) -> Result<PineconeIndex> {
        info!(index = %spec.name, "Checking if index exists");

        let description = match self.describe_index(&spec.name).await? {
            Some(description) => {
                info!(index = %spec.name, "Index already exists");
                description
            }
            None => {
                info!(index = %spec.name, dimension = spec.dimension, metric = %spec.metric, "Index not found, creating it");
                let created = self.create_index(spec).await?;
                let ready = if created.is_ready() {
                    created
                } else {
                    self.wait_until_ready(&spec.name).await?
                };
                info!(index = %spec.name, "Index created successfully");
                ready
            }
        };

        Ok(self.index(&description.host, namespace))
    }

    /// Handle to a data-plane host without touching the control plane.
    pub fn index(&self, host: &str, namespace: &str) -> PineconeIndex {
        PineconeIndex {
            host_url: host_url(host),
            namespace: namespace.to_string(),
            client: self.clone(),
        }
    }

    /// `None` when the index does not exist.
    pub async fn describe_index(&self, name: &str) -> Result<Option<IndexDescription>> {
        let url = format!("{}/indexes/{}", self.control_plane_url, name);
        let response = self.request(reqwest::Method::GET, &url)?.send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(read_json(response).await?))
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<IndexDescription> {
        let url = format!("{}/indexes", self.control_plane_url);
        let body = CreateIndexRequest {
            name: &spec.name,
            dimension: spec.dimension,
            metric: &spec.metric,
            spec: ServerlessSpecBody {
                serverless: ServerlessSpec {
                    cloud: &spec.cloud,
                    region: &spec.region,
                },
            },
        };

        let response = self.request(reqwest::Method::POST, &url)?.json(&body).send().await?;
        read_json(response).await
    }

    async fn wait_until_ready(&self, name: &str) -> Result<IndexDescription> {
        for attempt in 0..READY_POLL_ATTEMPTS {
            if let Some(description) = self.describe_index(name).await? {
                if description.is_ready() {
                    return Ok(description);
                }
                debug!(index = %name, attempt, state = %description.status.state, "Waiting for index");
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
        Err(VectorStoreError::NotReady(name.to_string()))
    }

    fn request(&self, method: reqwest::Method, url: &str) -> Result<reqwest::RequestBuilder> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| VectorStoreError::MissingApiKey(PINECONE_API_KEY_VAR.to_string()))?;

        Ok(self
            .http_client
            .request(method, url)
            .header("Api-Key", api_key)
            .header("X-Pinecone-API-Version", &self.api_version))
    }
}

/// Data-plane handle for one index namespace.
#[derive(Clone)]
pub struct PineconeIndex {
    host_url: String,
    namespace: String,
    client: PineconeClient,
}

impl PineconeIndex {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(&self, path: &str, body: &B) -> Result<R> {
        let url = format!("{}{}", self.host_url, path);
        let response = self
            .client
            .request(reqwest::Method::POST, &url)?
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }
}

#[async_trait]
impl VectorStore for PineconeIndex {
    async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<usize> {
        let body = UpsertRequest {
            vectors: records,
            namespace: &self.namespace,
        };
        let response: UpsertResponse = self.post("/vectors/upsert", &body).await?;
        Ok(response.upserted_count)
    }

    async fn query(&self, vector: &[f32], top_k: usize, include_metadata: bool) -> Result<Vec<QueryMatch>> {
        let body = QueryRequest {
            vector,
            top_k,
            include_metadata,
            include_values: false,
            namespace: &self.namespace,
        };
        let response: QueryResponse = self.post("/query", &body).await?;
        Ok(response.matches)
    }

    async fn describe_stats(&self) -> Result<IndexStats> {
        self.post("/describe_index_stats", &serde_json::json!({})).await
    }
}

/// Data-plane hosts are reported without a scheme.
fn host_url(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

async fn read_json<R: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<R> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(VectorStoreError::Api {
            status: status.as_u16(),
            message: api_error_message(&text),
        });
    }
    Ok(serde_json::from_str(&text)?)
}

fn api_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }

    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexDescription {
    pub name: String,
    #[serde(default)]
    pub dimension: u32,
    #[serde(default)]
    pub metric: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub status: IndexStatus,
}

impl IndexDescription {
    /// Ready for data-plane traffic.
    pub fn is_ready(&self) -> bool {
        self.status.ready && !self.host.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub state: String,
}

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: u32,
    metric: &'a str,
    spec: ServerlessSpecBody<'a>,
}

#[derive(Serialize)]
struct ServerlessSpecBody<'a> {
    serverless: ServerlessSpec<'a>,
}

#[derive(Serialize)]
struct ServerlessSpec<'a> {
    cloud: &'a str,
    region: &'a str,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [EmbeddingRecord],
    namespace: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    namespace: &'a str,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}
