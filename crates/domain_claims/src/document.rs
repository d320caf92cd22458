//! Documents attached to a claim

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use core_kernel::{ClaimId, DocumentId};

/// A stored claim document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimDocument {
    pub id: DocumentId,
    pub claim_id: ClaimId,
    pub file_name: String,
    pub content_type: String,
    pub file_size: i64,
    /// SHA-256 of the file bytes, lower-case hex
    pub file_hash: String,
    /// Kind of document such as `bill`, `eob` or `rx`
    pub document_type: Option<String>,
    pub ocr_quality_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// A file handed to document intake
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub file_name: String,
    pub content_type: String,
    pub document_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl DocumentUpload {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            document_type: None,
            bytes,
        }
    }

    /// Tags the upload with a document type
    pub fn with_document_type(mut self, document_type: impl Into<String>) -> Self {
        self.document_type = Some(document_type.into());
        self
    }

    /// Images and PDFs go through extraction; everything else is stored as-is
    pub fn is_extractable(&self) -> bool {
        self.content_type.starts_with("image/") || self.content_type == "application/pdf"
    }
}

impl ClaimDocument {
    /// Builds the stored record for an upload
    pub fn from_upload(claim_id: ClaimId, upload: &DocumentUpload, ocr_quality_score: Option<f64>) -> Self {
        Self {
            id: DocumentId::new_v7(),
            claim_id,
            file_name: upload.file_name.clone(),
            content_type: upload.content_type.clone(),
            file_size: upload.bytes.len() as i64,
            file_hash: content_hash(&upload.bytes),
            document_type: upload.document_type.clone(),
            ocr_quality_score,
            created_at: Utc::now(),
        }
    }
}

/// SHA-256 of the given bytes as lower-case hex
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Document types present among the given documents
pub fn uploaded_types(documents: &[ClaimDocument]) -> Vec<&str> {
    documents
        .iter()
        .filter_map(|doc| doc.document_type.as_deref())
        .collect()
}

/// Required types with no matching upload, in the order they were required
pub fn missing_types<'a>(required: &'a [String], documents: &[ClaimDocument]) -> Vec<&'a str> {
    let uploaded = uploaded_types(documents);
    required
        .iter()
        .map(String::as_str)
        .filter(|required| !uploaded.contains(required))
        .collect()
}
