use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, routes::Envelope, state::AppState, store::StoreError};

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractParams {
    pub pdf_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionSummary {
    pub pdf_id: i32,
    pub number_of_pages: i32,
    pub pages_stored: usize,
}

fn parse_pdf_id(raw: Option<&str>) -> Result<i32, ApiError> {
    let raw = raw
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing pdf_id parameter"))?;
    raw.parse()
        .map_err(|_| ApiError::bad_request("Invalid pdf_id parameter"))
}

/// Runs one extraction on the inference backend and persists its pages.
///
/// Only one extraction runs per process. A concurrent request is rejected with
/// `409 EXTRACTION_BUSY` instead of waiting. The job keeps running and is saved
/// even if the client goes away before it finishes.
#[tracing::instrument(name = "GET /pdf_process/extract_pdf", skip(state))]
pub async fn extract_pdf(
    State(state): State<AppState>,
    Query(params): Query<ExtractParams>,
) -> Result<Json<Envelope<ExtractionSummary>>, ApiError> {
    let pdf_id = parse_pdf_id(params.pdf_id.as_deref())?;

    let pdf = match state.pdfs.find_pdf(pdf_id).await {
        Ok(pdf) => pdf,
        Err(StoreError::NotFound) => return Err(ApiError::not_found("PDF not found")),
        Err(err) => return Err(err.into()),
    };

    let job = {
        let state = state.clone();
        move || async move {
            let output = state.inference.extract_pdf(&pdf.gcs_bucket).await?;
            let document = output.document()?;
            state.pdfs.save_extraction(pdf_id, &document).await?;
            tracing::info!(pdf_id, pages = document.pages.len(), "Extraction stored");
            Ok::<_, ApiError>(document)
        }
    };
    let document = state.extraction.try_acquire_and_run(job).await?;

    Ok(Envelope::with_data(
        "PDF extraction and database update successful",
        ExtractionSummary {
            pdf_id,
            number_of_pages: document.pdf_number_of_pages,
            pages_stored: document.pages.len(),
        },
    ))
}
