//! Data models for DocSign API

use chrono::{DateTime, Utc};
use docsign_core::{RawPosition, SignerInfo, SubmissionMetadata};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Document status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Completed,
}

impl DocumentStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "completed" => DocumentStatus::Completed,
            _ => DocumentStatus::Pending,
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentStatus::Pending => write!(f, "pending"),
            DocumentStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Template stored in database
#[derive(Debug, Clone, FromRow)]
pub struct DbTemplate {
    pub id: String,
    pub name: String,
    pub pdf_data: Vec<u8>,
    pub page_count: i64,
    pub coordinates_json: String,
    pub created_at: DateTime<Utc>,
}

/// Document stored in database
#[derive(Debug, Clone, FromRow)]
pub struct DbDocument {
    pub id: String,
    pub template_id: String,
    pub document_name: String,
    pub signer_name: String,
    pub signer_email: String,
    pub document_hash: String,
    pub pdf_data: Vec<u8>,
    pub signed_pdf: Option<Vec<u8>>,
    pub signed_hash: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Signing session stored in database
#[derive(Debug, Clone, FromRow)]
pub struct DbSession {
    pub token: String,
    pub document_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Request to register a template
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTemplateRequest {
    pub name: String,
    #[serde(alias = "pdf_base64")]
    pub pdf_base64: String,
    #[serde(default)]
    pub coordinates: Vec<RawPosition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateResponse {
    pub id: String,
    pub name: String,
    pub page_count: usize,
    pub coordinate_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatesResponse {
    pub template_id: String,
    pub coordinates: Vec<RawPosition>,
}

/// Request to create a document from a template
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentRequest {
    #[serde(alias = "template_id")]
    pub template_id: String,
    #[serde(default)]
    pub signer: SignerInfo,
    #[serde(default, alias = "document_name")]
    pub document_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub id: String,
    pub template_id: String,
    pub document_name: String,
    pub document_hash: String,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub token: String,
    pub document_id: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Signed document sent by the editor
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    #[serde(alias = "pdf_base64")]
    pub pdf_base64: String,
    #[serde(default)]
    pub metadata: Option<SubmissionMetadata>,
}
