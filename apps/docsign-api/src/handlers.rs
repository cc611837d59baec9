//! HTTP handlers for DocSign API

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use docsign_core::{DocumentId, RawPosition, SubmissionReceipt};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::*;
use crate::state::AppState;

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

/// Decode a base64 PDF payload and check that it parses.
///
/// Returns the bytes and their page count.
pub fn decode_pdf(pdf_base64: &str) -> Result<(Vec<u8>, usize), ApiError> {
    let bytes = BASE64
        .decode(pdf_base64.trim())
        .map_err(|e| ApiError::InvalidRequest(format!("Invalid PDF base64: {}", e)))?;
    let pages = docsign_core::page_count(&bytes)?;
    Ok((bytes, pages))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Register a template PDF and its signing coordinates
pub async fn create_template(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTemplateRequest>,
) -> Result<Json<TemplateResponse>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::InvalidRequest("Template name is required".into()));
    }
    let (pdf_data, page_count) = decode_pdf(&req.pdf_base64)?;
    let coordinates_json = serde_json::to_string(&req.coordinates)
        .map_err(|e| ApiError::InvalidRequest(format!("Invalid coordinates: {}", e)))?;

    let template_id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO templates (id, name, pdf_data, page_count, coordinates_json, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&template_id)
    .bind(&req.name)
    .bind(&pdf_data)
    .bind(page_count as i64)
    .bind(&coordinates_json)
    .bind(now.to_rfc3339())
    .execute(&state.db)
    .await?;

    tracing::info!(
        "Created template {} ({} pages, {} coordinates)",
        template_id,
        page_count,
        req.coordinates.len()
    );

    Ok(Json(TemplateResponse {
        id: template_id,
        name: req.name,
        page_count,
        coordinate_count: req.coordinates.len(),
        created_at: now,
    }))
}

/// Raw coordinates of a template
pub async fn get_coordinates(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CoordinatesResponse>, ApiError> {
    let template = fetch_template(&state.db, &id).await?;
    let coordinates: Vec<RawPosition> = serde_json::from_str(&template.coordinates_json)
        .map_err(|e| ApiError::Internal(e.into()))?;

    Ok(Json(CoordinatesResponse {
        template_id: template.id,
        coordinates,
    }))
}

/// Create a signer's document from a template
pub async fn create_document(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDocumentRequest>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let template = fetch_template(&state.db, &req.template_id).await?;

    let document_id = Uuid::new_v4().to_string();
    let document_name = req
        .document_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("{}.pdf", template.name));
    let document_hash = sha256_hex(&template.pdf_data);
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO documents (id, template_id, document_name, signer_name, signer_email,
                               document_hash, pdf_data, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?)
        "#,
    )
    .bind(&document_id)
    .bind(&template.id)
    .bind(&document_name)
    .bind(&req.signer.name)
    .bind(&req.signer.email)
    .bind(&document_hash)
    .bind(&template.pdf_data)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(&state.db)
    .await?;

    tracing::info!("Created document {} from template {}", document_id, template.id);

    Ok(Json(DocumentResponse {
        id: document_id,
        template_id: template.id,
        document_name,
        document_hash,
        status: DocumentStatus::Pending,
        created_at: now,
    }))
}

/// Open a signing session for a document
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let document = fetch_document(&state.db, &id).await?;
    if DocumentStatus::parse(&document.status) == DocumentStatus::Completed {
        return Err(ApiError::AlreadyCompleted(document.id));
    }

    let token = Uuid::new_v4().to_string();
    let now = Utc::now();
    let expires_at = now + chrono::Duration::hours(state.session_ttl_hours);

    sqlx::query(
        r#"
        INSERT INTO sessions (token, document_id, created_at, expires_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&token)
    .bind(&document.id)
    .bind(now.to_rfc3339())
    .bind(expires_at.to_rfc3339())
    .execute(&state.db)
    .await?;

    tracing::info!("Created session for document {}", document.id);

    Ok(Json(SessionResponse {
        token,
        document_id: document.id,
        expires_at: Some(expires_at),
    }))
}

/// Current PDF of a document, signed once submitted
pub async fn get_document_view(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, [(String, String); 2], Vec<u8>), ApiError> {
    let document = fetch_document(&state.db, &id).await?;
    let bytes = document.signed_pdf.unwrap_or(document.pdf_data);

    Ok((
        StatusCode::OK,
        [
            ("Content-Type".to_string(), "application/pdf".to_string()),
            (
                "Content-Disposition".to_string(),
                format!("inline; filename=\"{}\"", document.document_name),
            ),
        ],
        bytes,
    ))
}

/// Document-scoped submission
pub async fn submit_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmissionReceipt>, ApiError> {
    store_submission(&state.db, &id, req).await.map(Json)
}

/// Session-scoped submission
pub async fn submit_session(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmissionReceipt>, ApiError> {
    let session: Option<DbSession> = sqlx::query_as(
        r#"
        SELECT token, document_id, created_at, expires_at
        FROM sessions
        WHERE token = ?
        "#,
    )
    .bind(&token)
    .fetch_optional(&state.db)
    .await?;

    let session = session.ok_or_else(|| ApiError::SessionNotFound(token.clone()))?;

    // Check expiry
    if let Some(expires) = &session.expires_at {
        if expires < &Utc::now() {
            return Err(ApiError::SessionExpired);
        }
    }

    store_submission(&state.db, &session.document_id, req)
        .await
        .map(Json)
}

/// Store a signed PDF and complete the document.
///
/// Resubmitting the bytes that completed the document returns the original
/// receipt; any other payload for a completed document is a conflict.
async fn store_submission(
    db: &SqlitePool,
    document_id: &str,
    req: SubmitRequest,
) -> Result<SubmissionReceipt, ApiError> {
    let document = fetch_document(db, document_id).await?;
    let (signed_pdf, page_count) = decode_pdf(&req.pdf_base64)?;
    let signed_hash = sha256_hex(&signed_pdf);

    if DocumentStatus::parse(&document.status) == DocumentStatus::Completed {
        return completed_receipt(document.id, document.signed_hash, signed_hash);
    }

    let (signer_name, signer_email) = match &req.metadata {
        Some(meta) => (meta.signer_name.clone(), meta.signer_email.clone()),
        None => (document.signer_name.clone(), document.signer_email.clone()),
    };

    let completed = DocumentStatus::Completed.to_string();
    let result = sqlx::query(
        r#"
        UPDATE documents
        SET signed_pdf = ?, signed_hash = ?, signer_name = ?, signer_email = ?,
            status = ?, updated_at = ?
        WHERE id = ? AND status != ?
        "#,
    )
    .bind(&signed_pdf)
    .bind(&signed_hash)
    .bind(&signer_name)
    .bind(&signer_email)
    .bind(&completed)
    .bind(Utc::now().to_rfc3339())
    .bind(&document.id)
    .bind(&completed)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        // Completed by a concurrent submission since the read above
        let current = fetch_document(db, document_id).await?;
        return completed_receipt(current.id, current.signed_hash, signed_hash);
    }

    tracing::info!(
        "Stored signed document {} ({} pages, sha256 {})",
        document.id,
        page_count,
        signed_hash
    );

    Ok(SubmissionReceipt {
        document_id: Some(DocumentId(document.id)),
        status: completed,
        signed_hash: Some(signed_hash),
    })
}

fn completed_receipt(
    document_id: String,
    stored_hash: Option<String>,
    submitted_hash: String,
) -> Result<SubmissionReceipt, ApiError> {
    if stored_hash.as_deref() != Some(submitted_hash.as_str()) {
        return Err(ApiError::AlreadyCompleted(document_id));
    }
    tracing::info!("Document {} resubmitted with identical bytes", document_id);
    Ok(SubmissionReceipt {
        document_id: Some(DocumentId(document_id)),
        status: DocumentStatus::Completed.to_string(),
        signed_hash: Some(submitted_hash),
    })
}

async fn fetch_template(db: &SqlitePool, id: &str) -> Result<DbTemplate, ApiError> {
    let template: Option<DbTemplate> = sqlx::query_as(
        r#"
        SELECT id, name, pdf_data, page_count, coordinates_json, created_at
        FROM templates
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;

    template.ok_or_else(|| ApiError::TemplateNotFound(id.to_string()))
}

async fn fetch_document(db: &SqlitePool, id: &str) -> Result<DbDocument, ApiError> {
    let document: Option<DbDocument> = sqlx::query_as(
        r#"
        SELECT id, template_id, document_name, signer_name, signer_email, document_hash,
               pdf_data, signed_pdf, signed_hash, status, created_at, updated_at
        FROM documents
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;

    document.ok_or_else(|| ApiError::DocumentNotFound(id.to_string()))
}
