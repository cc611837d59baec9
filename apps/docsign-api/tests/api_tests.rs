//! Route-level tests for docsign-api, driven through `tower::ServiceExt::oneshot`.

mod common;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::Router;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use common::*;
use docsign_core::{
    CoordinateSource, DocumentId, DocumentService, DocumentSourceConfig, EditorConfig, LoadError,
    RawPosition, SessionToken, SignerInfo, SigningSession, SubmissionError, SubmissionReceipt,
    SubmissionRequest, SubmissionSink, SubmissionTarget,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;

async fn create_template(app: &Router, coordinates: Value) -> String {
    let (status, body) = send_json(
        app,
        post_json(
            "/api/templates",
            &json!({
                "name": "lease",
                "pdfBase64": BASE64.encode(blank_pdf(2)),
                "coordinates": coordinates,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pageCount"], 2);
    body["id"].as_str().unwrap().to_string()
}

async fn create_document(app: &Router, template_id: &str) -> String {
    let (status, body) = send_json(
        app,
        post_json(
            "/api/documents",
            &json!({
                "templateId": template_id,
                "signer": {"name": "Ada Lovelace", "email": "ada@example.com"},
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["documentName"], "lease.pdf");
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_check() {
    let (app, _) = test_app().await;
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn template_coordinates_round_trip() {
    let (app, _) = test_app().await;
    let template_id = create_template(
        &app,
        json!([
            {"x": 10, "y": 80, "width": 30, "height": 10, "pageNumber": 2},
            {"x": 10, "y": 92, "pageNumber": 2, "type": "name"},
        ]),
    )
    .await;

    let (status, body) = send_json(
        &app,
        get(&format!("/api/templates/{}/coordinates", template_id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let coordinates: Vec<RawPosition> =
        serde_json::from_value(body["coordinates"].clone()).unwrap();
    assert_eq!(coordinates.len(), 2);
    assert_eq!(coordinates[0].page_number, Some(2));
    assert_eq!(coordinates[0].width, Some(30.0));
    assert_eq!(coordinates[1].effective_type(), docsign_core::FieldType::Name);
}

#[tokio::test]
async fn template_rejects_non_pdf() {
    let (app, _) = test_app().await;
    let (status, body) = send_json(
        &app,
        post_json(
            "/api/templates",
            &json!({"name": "bad", "pdfBase64": BASE64.encode(b"<html></html>")}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);

    let (status, _) = send_json(
        &app,
        post_json(
            "/api/templates",
            &json!({"name": "bad", "pdfBase64": "not base64!!"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let (app, _) = test_app().await;

    let (status, _) = send(&app, get("/api/templates/missing/coordinates")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get("/api/documents/missing/view")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, post_json("/api/documents/missing/session", &json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        post_json(
            "/api/sessions/missing/submit",
            &json!({"pdfBase64": BASE64.encode(blank_pdf(1))}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        post_json("/api/documents", &json!({"templateId": "missing"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn document_view_serves_pdf() {
    let (app, _) = test_app().await;
    let template_id = create_template(&app, json!([])).await;
    let document_id = create_document(&app, &template_id).await;

    let response = {
        use tower::ServiceExt;
        app.clone()
            .oneshot(get(&format!("/api/documents/{}/view", document_id)))
            .await
            .unwrap()
    };
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/pdf");

    let (_, body) = send(&app, get(&format!("/api/documents/{}/view", document_id))).await;
    assert_eq!(body, blank_pdf(2));
}

#[tokio::test]
async fn session_tokens_are_uuids() {
    let (app, _) = test_app().await;
    let template_id = create_template(&app, json!([])).await;
    let document_id = create_document(&app, &template_id).await;

    let (status, body) = send_json(
        &app,
        post_json(&format!("/api/documents/{}/session", document_id), &json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["documentId"], document_id.as_str());

    let uuid = regex::Regex::new(
        r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$",
    )
    .unwrap();
    assert!(uuid.is_match(body["token"].as_str().unwrap()));
}

#[tokio::test]
async fn document_submission_completes_once_and_accepts_identical_resubmit() {
    let (app, _) = test_app().await;
    let template_id = create_template(&app, json!([])).await;
    let document_id = create_document(&app, &template_id).await;
    let signed = blank_pdf(2);
    let submit_uri = format!("/api/documents/{}/submit", document_id);

    let (status, body) = send_json(
        &app,
        post_json(&submit_uri, &json!({"pdfBase64": BASE64.encode(&signed)})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let receipt: SubmissionReceipt = serde_json::from_value(body).unwrap();
    assert_eq!(receipt.status, "completed");
    assert_eq!(receipt.document_id, Some(DocumentId(document_id.clone())));
    assert_eq!(
        receipt.signed_hash,
        Some(hex::encode(Sha256::digest(&signed)))
    );

    // Same bytes again: same receipt
    let (status, body) = send_json(
        &app,
        post_json(&submit_uri, &json!({"pdfBase64": BASE64.encode(&signed)})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let again: SubmissionReceipt = serde_json::from_value(body).unwrap();
    assert_eq!(again, receipt);

    // Different bytes for a completed document
    let (status, _) = send(
        &app,
        post_json(&submit_uri, &json!({"pdfBase64": BASE64.encode(blank_pdf(3))})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // The stored PDF is still the first submission
    let (status, view) = send(&app, get(&format!("/api/documents/{}/view", document_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view, signed);

    let (status, _) = send(
        &app,
        post_json(&format!("/api/documents/{}/session", document_id), &json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn submission_rejects_invalid_payloads() {
    let (app, _) = test_app().await;
    let template_id = create_template(&app, json!([])).await;
    let document_id = create_document(&app, &template_id).await;
    let submit_uri = format!("/api/documents/{}/submit", document_id);

    let (status, _) = send(&app, post_json(&submit_uri, &json!({"pdfBase64": "%%%"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        post_json(&submit_uri, &json!({"pdfBase64": BASE64.encode(b"%PDF-1.7 truncated")})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Still pending after rejected attempts
    let (status, _) = send(
        &app,
        post_json(&submit_uri, &json!({"pdfBase64": BASE64.encode(blank_pdf(1))})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn expired_session_is_gone() {
    let (app, state) = test_app().await;
    let template_id = create_template(&app, json!([])).await;
    let document_id = create_document(&app, &template_id).await;

    let expired = (chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339();
    sqlx::query("INSERT INTO sessions (token, document_id, created_at, expires_at) VALUES (?, ?, ?, ?)")
        .bind("stale-token")
        .bind(&document_id)
        .bind(&expired)
        .bind(&expired)
        .execute(&state.db)
        .await
        .unwrap();

    let (status, body) = send_json(
        &app,
        post_json(
            "/api/sessions/stale-token/submit",
            &json!({"pdfBase64": BASE64.encode(blank_pdf(1))}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"], "Session has expired");
}

// ============================================================
// Signing session against the HTTP backend
// ============================================================

/// Collaborator contracts implemented by calling the router in-process.
struct RouterBackend {
    app: Router,
}

impl RouterBackend {
    async fn json(&self, request: axum::http::Request<axum::body::Body>) -> Result<Value, String> {
        let (status, body) = send_json(&self.app, request).await;
        if status.is_success() {
            Ok(body)
        } else {
            Err(format!("HTTP {}: {}", status, body["error"]))
        }
    }
}

#[async_trait]
impl CoordinateSource for RouterBackend {
    async fn fetch_coordinates(&self, template_id: &str) -> Result<Vec<RawPosition>, LoadError> {
        let body = self
            .json(get(&format!("/api/templates/{}/coordinates", template_id)))
            .await
            .map_err(LoadError::Fetch)?;
        serde_json::from_value(body["coordinates"].clone()).map_err(|e| LoadError::Fetch(e.to_string()))
    }
}

#[async_trait]
impl DocumentService for RouterBackend {
    async fn create_document(
        &self,
        template_id: &str,
        signer: &SignerInfo,
    ) -> Result<DocumentId, LoadError> {
        let body = self
            .json(post_json(
                "/api/documents",
                &json!({"templateId": template_id, "signer": signer}),
            ))
            .await
            .map_err(LoadError::Fetch)?;
        Ok(DocumentId(body["id"].as_str().unwrap_or_default().to_string()))
    }

    async fn create_session(&self, document_id: &DocumentId) -> Result<SessionToken, LoadError> {
        let body = self
            .json(post_json(
                &format!("/api/documents/{}/session", document_id),
                &json!({}),
            ))
            .await
            .map_err(LoadError::Fetch)?;
        Ok(SessionToken(body["token"].as_str().unwrap_or_default().to_string()))
    }

    async fn fetch_document_view(&self, document_id: &DocumentId) -> Result<Vec<u8>, LoadError> {
        let (status, body) = send(&self.app, get(&format!("/api/documents/{}/view", document_id))).await;
        if !status.is_success() {
            return Err(LoadError::Fetch(format!("HTTP {}", status)));
        }
        Ok(body)
    }

    async fn fetch_url(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        Err(LoadError::Fetch(format!("external URL not reachable: {}", url)))
    }
}

#[async_trait]
impl SubmissionSink for RouterBackend {
    async fn submit(&self, request: SubmissionRequest) -> Result<SubmissionReceipt, SubmissionError> {
        let uri = match &request.target {
            SubmissionTarget::Session(token) => format!("/api/sessions/{}/submit", token),
            SubmissionTarget::Document(id) => format!("/api/documents/{}/submit", id),
        };
        let body = self
            .json(post_json(
                &uri,
                &json!({"pdfBase64": request.pdf_base64, "metadata": request.metadata}),
            ))
            .await
            .map_err(SubmissionError::Rejected)?;
        serde_json::from_value(body).map_err(|e| SubmissionError::Transport(e.to_string()))
    }
}

#[tokio::test]
async fn signing_session_end_to_end() {
    let (app, _) = test_app().await;
    let template_id = create_template(
        &app,
        json!([
            {"x": 10, "y": 80, "width": 30, "height": 10, "pageNumber": 2},
            {"x": 10, "y": 92, "pageNumber": 2, "type": "date"},
        ]),
    )
    .await;

    let backend = Arc::new(RouterBackend { app: app.clone() });
    let config = EditorConfig::new(DocumentSourceConfig::Template {
        template_id: template_id.clone(),
    })
    .with_signer(SignerInfo::new("Ada Lovelace", "ada@example.com"))
    .with_coordinate_template(template_id.clone());
    let session = SigningSession::new(config)
        .with_document_service(backend.clone())
        .with_coordinate_source(backend.clone())
        .with_submission_sink(backend);

    assert_eq!(session.load().await.unwrap(), 2);
    let report = session.commit_signature(&signature_png()).await.unwrap();
    assert_eq!(report.images_drawn, 1);
    assert_eq!(report.texts_drawn, 1);

    let signed = session.export_pdf().await.unwrap();
    let receipt = session.submit().await.unwrap();
    assert_eq!(receipt.status, "completed");
    assert_eq!(
        receipt.signed_hash,
        Some(hex::encode(Sha256::digest(&signed)))
    );

    let document_id = session.document_id().await.unwrap();
    let (_, view) = send(&app, get(&format!("/api/documents/{}/view", document_id))).await;
    assert_eq!(view, signed);
}
