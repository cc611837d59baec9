//! Collaborator contracts
//!
//! A signing session talks to three outside services: a source of template
//! coordinates, a document backend (create, open a session, fetch bytes) and
//! a submission endpoint. Each is an async trait so the HTTP client lives in
//! the embedding application. The in-memory implementations here back tests
//! and offline embeddings.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::SignerInfo;
use crate::error::{LoadError, SubmissionError};
use crate::position::RawPosition;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(pub String);

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<DocumentId>,
    pub document_name: String,
    pub signer_name: String,
    pub signer_email: String,
}

/// Which backend endpoint receives the signed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum SubmissionTarget {
    Session(SessionToken),
    Document(DocumentId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    pub target: SubmissionTarget,
    /// Signed PDF, standard base64
    pub pdf_base64: String,
    pub metadata: SubmissionMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub document_id: Option<DocumentId>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_hash: Option<String>,
}

#[async_trait]
pub trait CoordinateSource: Send + Sync {
    async fn fetch_coordinates(&self, template_id: &str) -> Result<Vec<RawPosition>, LoadError>;
}

#[async_trait]
pub trait DocumentService: Send + Sync {
    async fn create_document(
        &self,
        template_id: &str,
        signer: &SignerInfo,
    ) -> Result<DocumentId, LoadError>;

    async fn create_session(&self, document_id: &DocumentId) -> Result<SessionToken, LoadError>;

    /// PDF bytes of a backend document.
    async fn fetch_document_view(&self, document_id: &DocumentId) -> Result<Vec<u8>, LoadError>;

    async fn fetch_url(&self, url: &str) -> Result<Vec<u8>, LoadError>;
}

#[async_trait]
pub trait SubmissionSink: Send + Sync {
    async fn submit(&self, request: SubmissionRequest) -> Result<SubmissionReceipt, SubmissionError>;
}

/// Coordinates keyed by template id, with optional per-template latency.
#[derive(Debug, Default)]
pub struct InMemoryCoordinateSource {
    templates: HashMap<String, Vec<RawPosition>>,
    delays: HashMap<String, Duration>,
}

impl InMemoryCoordinateSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, template_id: impl Into<String>, positions: Vec<RawPosition>) -> Self {
        self.templates.insert(template_id.into(), positions);
        self
    }

    pub fn with_delay(mut self, template_id: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(template_id.into(), delay);
        self
    }
}

#[async_trait]
impl CoordinateSource for InMemoryCoordinateSource {
    async fn fetch_coordinates(&self, template_id: &str) -> Result<Vec<RawPosition>, LoadError> {
        if let Some(delay) = self.delays.get(template_id) {
            tokio::time::sleep(*delay).await;
        }
        self.templates
            .get(template_id)
            .cloned()
            .ok_or_else(|| LoadError::Fetch(format!("template {} not found", template_id)))
    }
}

#[derive(Debug, Default)]
struct DocumentStore {
    documents: HashMap<DocumentId, Vec<u8>>,
    sessions: HashMap<SessionToken, DocumentId>,
    calls: Vec<String>,
}

/// Document backend holding templates, documents and URLs in memory.
///
/// Every call is recorded by name so callers can check ordering.
#[derive(Debug, Default)]
pub struct InMemoryDocumentService {
    templates: HashMap<String, Vec<u8>>,
    urls: HashMap<String, Vec<u8>>,
    store: Mutex<DocumentStore>,
    next_id: AtomicU64,
}

impl InMemoryDocumentService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, template_id: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.templates.insert(template_id.into(), bytes);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.urls.insert(url.into(), bytes);
        self
    }

    /// Register an existing document.
    pub async fn insert_document(&self, document_id: DocumentId, bytes: Vec<u8>) {
        self.store.lock().await.documents.insert(document_id, bytes);
    }

    pub async fn calls(&self) -> Vec<String> {
        self.store.lock().await.calls.clone()
    }

    fn next(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl DocumentService for InMemoryDocumentService {
    async fn create_document(
        &self,
        template_id: &str,
        signer: &SignerInfo,
    ) -> Result<DocumentId, LoadError> {
        let bytes = self
            .templates
            .get(template_id)
            .cloned()
            .ok_or_else(|| LoadError::Fetch(format!("template {} not found", template_id)))?;
        let id = DocumentId(self.next("doc"));

        let mut store = self.store.lock().await;
        store.calls.push("create_document".into());
        store.documents.insert(id.clone(), bytes);
        debug!("Created document {} for {}", id, signer.email);
        Ok(id)
    }

    async fn create_session(&self, document_id: &DocumentId) -> Result<SessionToken, LoadError> {
        let token = SessionToken(self.next("session"));

        let mut store = self.store.lock().await;
        store.calls.push("create_session".into());
        if !store.documents.contains_key(document_id) {
            return Err(LoadError::Fetch(format!("document {} not found", document_id)));
        }
        store.sessions.insert(token.clone(), document_id.clone());
        Ok(token)
    }

    async fn fetch_document_view(&self, document_id: &DocumentId) -> Result<Vec<u8>, LoadError> {
        let mut store = self.store.lock().await;
        store.calls.push("fetch_document_view".into());
        store
            .documents
            .get(document_id)
            .cloned()
            .ok_or_else(|| LoadError::Fetch(format!("document {} not found", document_id)))
    }

    async fn fetch_url(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        self.store.lock().await.calls.push("fetch_url".into());
        self.urls
            .get(url)
            .cloned()
            .ok_or_else(|| LoadError::Fetch(format!("{} returned 404", url)))
    }
}

/// Submission endpoint that keeps every request it accepts.
#[derive(Debug, Default)]
pub struct RecordingSubmissionSink {
    requests: Mutex<Vec<SubmissionRequest>>,
    reject_with: Option<String>,
}

impl RecordingSubmissionSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that refuses every submission with `reason`.
    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self {
            requests: Mutex::default(),
            reject_with: Some(reason.into()),
        }
    }

    pub async fn requests(&self) -> Vec<SubmissionRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl SubmissionSink for RecordingSubmissionSink {
    async fn submit(&self, request: SubmissionRequest) -> Result<SubmissionReceipt, SubmissionError> {
        if let Some(reason) = &self.reject_with {
            return Err(SubmissionError::Rejected(reason.clone()));
        }
        let document_id = match &request.target {
            SubmissionTarget::Document(id) => Some(id.clone()),
            SubmissionTarget::Session(_) => request.metadata.document_id.clone(),
        };
        info!("Recorded submission for {:?}", request.target);
        self.requests.lock().await.push(request);

        Ok(SubmissionReceipt {
            document_id,
            status: "completed".into(),
            signed_hash: None,
        })
    }
}
