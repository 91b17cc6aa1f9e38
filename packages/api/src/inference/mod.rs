use std::{sync::Arc, time::Duration};

mod document;
mod grpc;
pub mod proto;

pub use document::{ExtractedImage, ExtractedPage, ExtractionDocument, PageEntry};
pub use grpc::GrpcInference;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("invalid inference endpoint '{0}'")]
    InvalidEndpoint(String),
    #[error("could not connect to inference backend after {attempts} attempts: {message}")]
    Connect { attempts: u32, message: String },
    #[error("inference call exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),
    #[error("inference backend returned {code}: {message}")]
    Status { code: String, message: String },
    #[error("malformed extraction result: {0}")]
    MalformedResult(String),
}

impl From<tonic::Status> for InferenceError {
    fn from(status: tonic::Status) -> Self {
        InferenceError::Status {
            code: format!("{:?}", status.code()),
            message: status.message().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionOutput {
    pub result_json: String,
}

impl ExtractionOutput {
    pub fn document(&self) -> Result<ExtractionDocument, InferenceError> {
        serde_json::from_str(&self.result_json)
            .map_err(|e| InferenceError::MalformedResult(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RagAnswer {
    pub response: String,
    pub image_ids: Vec<i32>,
}

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub url: String,
    pub call_timeout: Duration,
    pub connect_timeout: Duration,
    pub connect_retries: u32,
    pub retry_delay: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:50051".to_string(),
            call_timeout: Duration::from_secs(60 * 60),
            connect_timeout: Duration::from_secs(2 * 60),
            connect_retries: 5,
            retry_delay: Duration::from_secs(10),
        }
    }
}

/// Remote model server: PDF extraction, retrieval-augmented answers and summaries.
#[async_trait::async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn extract_pdf(&self, bucket_reference: &str)
    -> Result<ExtractionOutput, InferenceError>;

    /// `device_id` scopes retrieval to one device's documents.
    async fn rag_query(
        &self,
        query: &str,
        device_id: Option<i32>,
    ) -> Result<RagAnswer, InferenceError>;

    async fn summarize(&self, query: &str) -> Result<String, InferenceError>;
}

pub type DynInference = Arc<dyn InferenceBackend>;
