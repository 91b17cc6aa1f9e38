use serde::{Deserialize, Serialize};

/// Result payload of the extraction procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionDocument {
    #[serde(default)]
    pub pages: Vec<PageEntry>,
    pub pdf_number_of_pages: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageEntry {
    pub page: ExtractedPage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedPage {
    pub page_number: i32,
    #[serde(default)]
    pub paragraph: String,
    #[serde(default)]
    pub imgs: Vec<ExtractedImage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedImage {
    pub gcs_bucket_name: String,
    pub order: i32,
    #[serde(default)]
    pub retrieved_path: String,
}
