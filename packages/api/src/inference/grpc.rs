use std::{future::Future, time::Duration};

use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

use super::{
    ExtractionOutput, InferenceBackend, InferenceConfig, InferenceError, RagAnswer,
    proto::{
        ExtractPdfRequest, RagRequest, RagWithDeviceIdRequest, SummarizeRequest,
        extract_pdf_service_client::ExtractPdfServiceClient, rag_service_client::RagServiceClient,
        rag_service_with_device_id_client::RagServiceWithDeviceIdClient,
        summarize_query_service_client::SummarizeQueryServiceClient,
    },
};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(5 * 60);
const KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Clients for the four backend services, all on one channel.
#[derive(Debug, Clone)]
pub struct GrpcInference {
    extract: ExtractPdfServiceClient<Channel>,
    rag: RagServiceClient<Channel>,
    rag_with_device: RagServiceWithDeviceIdClient<Channel>,
    summarize: SummarizeQueryServiceClient<Channel>,
    call_timeout: Duration,
}

impl GrpcInference {
    /// Dials the backend, retrying while it is still starting up.
    pub async fn connect(config: &InferenceConfig) -> Result<Self, InferenceError> {
        let endpoint = endpoint(config)?;
        let attempts = config.connect_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match endpoint.connect().await {
                Ok(channel) => {
                    tracing::info!(url = %config.url, attempt, "Connected to inference backend");
                    return Ok(Self::from_channel(channel, config.call_timeout));
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(
                        url = %config.url,
                        attempt,
                        attempts,
                        error = %last_error,
                        "Inference backend not reachable"
                    );
                    if attempt < attempts {
                        tokio::time::sleep(config.retry_delay).await;
                    }
                }
            }
        }

        Err(InferenceError::Connect {
            attempts,
            message: last_error,
        })
    }

    pub fn from_channel(channel: Channel, call_timeout: Duration) -> Self {
        Self {
            extract: ExtractPdfServiceClient::new(channel.clone()),
            rag: RagServiceClient::new(channel.clone()),
            rag_with_device: RagServiceWithDeviceIdClient::new(channel.clone()),
            summarize: SummarizeQueryServiceClient::new(channel),
            call_timeout,
        }
    }

    fn request<T>(&self, message: T) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        request.set_timeout(self.call_timeout);
        request
    }

    async fn with_deadline<T, F>(&self, call: F) -> Result<T, InferenceError>
    where
        F: Future<Output = Result<tonic::Response<T>, tonic::Status>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(Ok(response)) => Ok(response.into_inner()),
            Ok(Err(status)) if status.code() == tonic::Code::DeadlineExceeded => {
                Err(InferenceError::DeadlineExceeded(self.call_timeout))
            }
            Ok(Err(status)) => Err(status.into()),
            Err(_) => Err(InferenceError::DeadlineExceeded(self.call_timeout)),
        }
    }
}

fn endpoint(config: &InferenceConfig) -> Result<Endpoint, InferenceError> {
    let mut endpoint = Endpoint::from_shared(config.url.clone())
        .map_err(|_| InferenceError::InvalidEndpoint(config.url.clone()))?
        .connect_timeout(config.connect_timeout)
        .http2_keep_alive_interval(KEEP_ALIVE_INTERVAL)
        .keep_alive_timeout(KEEP_ALIVE_TIMEOUT)
        .keep_alive_while_idle(true);

    if config.url.starts_with("https://") {
        endpoint = endpoint
            .tls_config(ClientTlsConfig::new().with_webpki_roots())
            .map_err(|e| InferenceError::InvalidEndpoint(format!("{}: {e}", config.url)))?;
    }

    Ok(endpoint)
}

#[async_trait::async_trait]
impl InferenceBackend for GrpcInference {
    #[tracing::instrument(name = "inference.extract_pdf", skip(self))]
    async fn extract_pdf(
        &self,
        bucket_reference: &str,
    ) -> Result<ExtractionOutput, InferenceError> {
        let request = self.request(ExtractPdfRequest {
            gcs_pdf_bucket_name: bucket_reference.to_string(),
        });
        let mut client = self.extract.clone();
        let response = self.with_deadline(client.extract(request)).await?;

        Ok(ExtractionOutput {
            result_json: response.result_json,
        })
    }

    #[tracing::instrument(name = "inference.rag_query", skip(self, query))]
    async fn rag_query(
        &self,
        query: &str,
        device_id: Option<i32>,
    ) -> Result<RagAnswer, InferenceError> {
        let response = match device_id {
            Some(device_id) => {
                let request = self.request(RagWithDeviceIdRequest {
                    query: query.to_string(),
                    device_id,
                });
                let mut client = self.rag_with_device.clone();
                self.with_deadline(client.query(request)).await?
            }
            None => {
                let request = self.request(RagRequest {
                    query: query.to_string(),
                });
                let mut client = self.rag.clone();
                self.with_deadline(client.query(request)).await?
            }
        };

        Ok(RagAnswer {
            response: response.response,
            image_ids: response.images_ids,
        })
    }

    #[tracing::instrument(name = "inference.summarize", skip(self, query))]
    async fn summarize(&self, query: &str) -> Result<String, InferenceError> {
        let request = self.request(SummarizeRequest {
            query: query.to_string(),
        });
        let mut client = self.summarize.clone();
        let response = self.with_deadline(client.summarize(request)).await?;
        Ok(response.summary)
    }
}
