//! Signing session orchestration
//!
//! A [`SigningSession`] is one editor instance: it obtains the document,
//! fetches template coordinates, commits signatures through the mutation
//! pipeline, keeps the undo history and hands the result to the submission
//! endpoint.
//!
//! Async results are tagged with the generation that was current when their
//! task started. [`SigningSession::cancel`] and template changes bump the
//! generation, so late results are dropped instead of published.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{DocumentSourceConfig, EditorConfig, SignerInfo};
use crate::coords::{self, ResolvedTargets};
use crate::error::{
    EditorError, LoadError, PlacementError, Result, SubmissionError, ValidationError,
};
use crate::events::{EditorEvents, Notice, NoopEvents};
use crate::history::{DocumentSnapshot, HistoryManager, SnapshotKind, UndoOutcome};
use crate::image::SignatureImage;
use crate::pdf::{LopdfEngine, PdfEngine};
use crate::pipeline::{apply_plan, SkippedPlacement};
use crate::placement::{plan_placements, MetadataValues, PlacementRequest};
use crate::position::{PageSize, RawPosition};
use crate::renderer;
use crate::services::{
    CoordinateSource, DocumentId, DocumentService, SessionToken, SubmissionMetadata,
    SubmissionReceipt, SubmissionRequest, SubmissionSink, SubmissionTarget,
};

/// What one successful commit did.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitReport {
    pub images_drawn: usize,
    pub texts_drawn: usize,
    pub skipped: Vec<SkippedPlacement>,
    pub history_depth: usize,
}

#[derive(Debug, Default)]
struct SessionState {
    history: HistoryManager,
    pages: Vec<PageSize>,
    template_id: Option<String>,
    template_positions: Vec<RawPosition>,
    document_id: Option<DocumentId>,
    session_token: Option<SessionToken>,
    signer: SignerInfo,
    rendered: BTreeSet<usize>,
    all_rendered_reported: bool,
}

struct FetchedDocument {
    bytes: Vec<u8>,
    document_id: Option<DocumentId>,
    session_token: Option<SessionToken>,
}

impl FetchedDocument {
    fn detached(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            document_id: None,
            session_token: None,
        }
    }
}

pub struct SigningSession {
    config: EditorConfig,
    engine: Arc<dyn PdfEngine>,
    documents: Option<Arc<dyn DocumentService>>,
    coordinates: Option<Arc<dyn CoordinateSource>>,
    submissions: Option<Arc<dyn SubmissionSink>>,
    events: Arc<dyn EditorEvents>,
    generation: AtomicU64,
    state: Mutex<SessionState>,
}

impl SigningSession {
    pub fn new(config: EditorConfig) -> Self {
        let state = SessionState {
            history: HistoryManager::new(config.enable_undo),
            template_id: config.coordinate_template_id.clone(),
            signer: config.signer.clone(),
            ..SessionState::default()
        };
        Self {
            config,
            engine: Arc::new(LopdfEngine),
            documents: None,
            coordinates: None,
            submissions: None,
            events: Arc::new(NoopEvents),
            generation: AtomicU64::new(0),
            state: Mutex::new(state),
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn PdfEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_document_service(mut self, service: Arc<dyn DocumentService>) -> Self {
        self.documents = Some(service);
        self
    }

    pub fn with_coordinate_source(mut self, source: Arc<dyn CoordinateSource>) -> Self {
        self.coordinates = Some(source);
        self
    }

    pub fn with_submission_sink(mut self, sink: Arc<dyn SubmissionSink>) -> Self {
        self.submissions = Some(sink);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EditorEvents>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Obtain the document and the template coordinates, then publish both.
    ///
    /// Backend bootstrap (create document, create session, fetch view) runs
    /// in sequence; coordinates are fetched concurrently with it.
    pub async fn load(&self) -> Result<usize> {
        renderer::ensure_initialized();
        let generation = self.generation.load(Ordering::SeqCst);
        let template_id = self.state.lock().await.template_id.clone();

        let (document, coordinates) = tokio::join!(
            self.fetch_document(),
            self.fetch_coordinates(template_id.as_deref())
        );
        let result = self.publish_load(generation, document, coordinates).await;

        match &result {
            Ok(page_count) => self.events.on_load_success(*page_count),
            Err(EditorError::Load(LoadError::Cancelled)) => {
                debug!("Load discarded after cancellation");
            }
            Err(e) => {
                self.events.on_load_error(e);
                self.notify(e.notice());
            }
        }
        result
    }

    async fn fetch_document(&self) -> std::result::Result<FetchedDocument, LoadError> {
        let source = self.config.source.as_ref().ok_or(LoadError::MissingSource)?;
        source.validate()?;

        match source {
            DocumentSourceConfig::Inline { bytes } => Ok(FetchedDocument::detached(bytes.clone())),
            DocumentSourceConfig::Url { url } => {
                let bytes = self.document_service()?.fetch_url(url).await?;
                Ok(FetchedDocument::detached(bytes))
            }
            DocumentSourceConfig::Document { document_id } => {
                let service = self.document_service()?;
                let document_id = DocumentId(document_id.clone());
                let token = service.create_session(&document_id).await?;
                let bytes = service.fetch_document_view(&document_id).await?;
                Ok(FetchedDocument {
                    bytes,
                    document_id: Some(document_id),
                    session_token: Some(token),
                })
            }
            DocumentSourceConfig::Template { template_id } => {
                let service = self.document_service()?;
                let document_id = service
                    .create_document(template_id, &self.config.signer)
                    .await?;
                let token = service.create_session(&document_id).await?;
                let bytes = service.fetch_document_view(&document_id).await?;
                info!("Bootstrapped document {} from template {}", document_id, template_id);
                Ok(FetchedDocument {
                    bytes,
                    document_id: Some(document_id),
                    session_token: Some(token),
                })
            }
        }
    }

    async fn fetch_coordinates(
        &self,
        template_id: Option<&str>,
    ) -> std::result::Result<Vec<RawPosition>, LoadError> {
        let Some(template_id) = template_id else {
            return Ok(Vec::new());
        };
        let source = self
            .coordinates
            .as_ref()
            .ok_or_else(|| LoadError::Fetch("no coordinate source configured".into()))?;
        let positions = source.fetch_coordinates(template_id).await?;
        debug!("Fetched {} coordinates for template {}", positions.len(), template_id);
        Ok(positions)
    }

    async fn publish_load(
        &self,
        generation: u64,
        document: std::result::Result<FetchedDocument, LoadError>,
        coordinates: std::result::Result<Vec<RawPosition>, LoadError>,
    ) -> Result<usize> {
        self.check_generation(generation)?;
        let document = document?;
        let pages = self.engine.page_sizes(&document.bytes)?;

        let template_positions = coordinates.unwrap_or_else(|e| {
            warn!("Template coordinates unavailable: {}", e);
            self.notify(Notice::warning(format!(
                "Could not load template coordinates: {}",
                e
            )));
            Vec::new()
        });

        let mut state = self.state.lock().await;
        self.check_generation(generation)?;

        let page_count = pages.len();
        state
            .history
            .load(DocumentSnapshot::original(document.bytes));
        state.pages = pages;
        state.template_positions = template_positions;
        state.document_id = document.document_id;
        state.session_token = document.session_token;
        state.rendered.clear();
        state.all_rendered_reported = false;

        info!("Loaded document with {} pages", page_count);
        Ok(page_count)
    }

    /// Switch to another template's coordinates, or drop them with `None`.
    ///
    /// Supersedes any load or template fetch still in flight.
    pub async fn set_template(&self, template_id: Option<String>) -> Result<usize> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let fetched = self.fetch_coordinates(template_id.as_deref()).await;

        let result = async {
            self.check_generation(generation)?;
            let positions = fetched?;
            let mut state = self.state.lock().await;
            self.check_generation(generation)?;
            let count = positions.len();
            state.template_id = template_id;
            state.template_positions = positions;
            Ok(count)
        }
        .await;

        match &result {
            Err(EditorError::Load(LoadError::Cancelled)) | Ok(_) => {}
            Err(e) => self.notify(e.notice()),
        }
        result
    }

    fn check_generation(&self, generation: u64) -> std::result::Result<(), LoadError> {
        let current = self.generation.load(Ordering::SeqCst);
        if current != generation {
            warn!(
                "Discarding stale result (generation {} superseded by {})",
                generation, current
            );
            return Err(LoadError::Cancelled);
        }
        Ok(())
    }

    fn document_service(&self) -> std::result::Result<&Arc<dyn DocumentService>, LoadError> {
        self.documents
            .as_ref()
            .ok_or_else(|| LoadError::Fetch("no document service configured".into()))
    }

    /// Tear down: every pending async result is discarded.
    pub fn cancel(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Session cancelled (generation {})", generation);
        self.events.on_cancel();
    }

    /// Record that a page finished rendering. Returns true on the call that
    /// completes the document.
    pub async fn mark_page_rendered(&self, page_index: usize) -> bool {
        let mut state = self.state.lock().await;
        let page_count = state.pages.len();
        if page_index >= page_count {
            warn!("Rendered page {} is out of range ({} pages)", page_index, page_count);
            return false;
        }
        state.rendered.insert(page_index);
        if state.rendered.len() < page_count || state.all_rendered_reported {
            return false;
        }
        state.all_rendered_reported = true;
        drop(state);

        self.events.on_all_pages_rendered(page_count);
        true
    }

    // ------------------------------------------------------------------
    // Signing
    // ------------------------------------------------------------------

    pub async fn set_signer(&self, signer: SignerInfo) {
        self.state.lock().await.signer = signer;
    }

    /// Stamp the signature (PNG bytes or a `data:` URL) onto every signature
    /// target, plus the enabled metadata fields.
    pub async fn commit_signature(&self, signature: &[u8]) -> Result<CommitReport> {
        let result = self.try_commit(signature).await;
        match &result {
            Ok(report) => {
                for skipped in &report.skipped {
                    self.notify(Notice::warning(skipped.error.to_string()));
                }
                self.notify(Notice::success("Signature added to document"));
            }
            Err(e) => self.notify(e.notice()),
        }
        result
    }

    async fn try_commit(&self, signature: &[u8]) -> Result<CommitReport> {
        let mut state = self
            .state
            .try_lock()
            .map_err(|_| ValidationError::MutationInProgress)?;
        if state.history.active().is_none() {
            return Err(ValidationError::DocumentNotLoaded.into());
        }

        let image = SignatureImage::decode(signature)?;
        let targets = self.resolve_targets(&state)?;
        let values = self.metadata_values(&state.signer);
        let plan = plan_placements(PlacementRequest {
            image: &image,
            signatures: &targets.signatures,
            values: &values,
            display: &self.config.display,
            targets: &targets.metadata,
            style: &self.config.style,
        })?;

        let guard = state.history.begin_mutation()?;
        let source = guard.source().clone();
        let engine = Arc::clone(&self.engine);
        let applied = tokio::task::spawn_blocking(move || {
            apply_plan(engine.as_ref(), &source, &image, &plan)
        })
        .await
        .map_err(|e| PlacementError::Draw(format!("mutation task failed: {}", e)))
        .and_then(std::convert::identity);

        let outcome = match applied {
            Ok(outcome) => outcome,
            Err(e) => {
                guard.rollback();
                return Err(e.into());
            }
        };
        guard.commit(outcome.snapshot);

        let report = CommitReport {
            images_drawn: outcome.images_drawn,
            texts_drawn: outcome.texts_drawn,
            skipped: outcome.skipped,
            history_depth: state.history.depth(),
        };
        info!(
            "Committed signature: {} images, {} text runs, history depth {}",
            report.images_drawn, report.texts_drawn, report.history_depth
        );
        Ok(report)
    }

    fn resolve_targets(
        &self,
        state: &SessionState,
    ) -> std::result::Result<ResolvedTargets, PlacementError> {
        let fixed = coords::resolve_targets(
            &self.config.fixed_positions,
            &self.config.fixed_space,
            &state.pages,
        )?;
        let template = coords::resolve_targets(
            &state.template_positions,
            &self.config.template_space,
            &state.pages,
        )?;
        let targets = fixed.merge(template);
        for (raw, error) in &targets.rejected {
            self.notify(Notice::warning(format!(
                "Skipped {:?} field: {}",
                raw.effective_type(),
                error
            )));
        }
        Ok(targets)
    }

    fn metadata_values(&self, signer: &SignerInfo) -> MetadataValues {
        MetadataValues::new(signer.name.clone(), signer.email.clone())
            .with_today(&self.config.date_format)
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    pub fn undo(&self) -> Result<UndoOutcome> {
        let result = self.try_undo();
        match &result {
            Ok(UndoOutcome::NothingToUndo) => self.notify(Notice::info("Nothing to undo")),
            Ok(UndoOutcome::Restored {
                kind: SnapshotKind::Original,
                ..
            }) => self.notify(Notice::info("Signature removed")),
            Ok(UndoOutcome::Restored { .. }) => self.notify(Notice::info("Undid last signature")),
            Err(e) => self.notify(e.notice()),
        }
        result
    }

    fn try_undo(&self) -> Result<UndoOutcome> {
        let mut state = self
            .state
            .try_lock()
            .map_err(|_| ValidationError::MutationInProgress)?;
        if state.history.active().is_none() {
            return Err(ValidationError::DocumentNotLoaded.into());
        }
        Ok(state.history.undo()?)
    }

    /// Discard every committed signature.
    pub fn reset(&self) -> Result<()> {
        let result = self.try_reset();
        match &result {
            Ok(()) => self.notify(Notice::info("Document reset to original")),
            Err(e) => self.notify(e.notice()),
        }
        result
    }

    fn try_reset(&self) -> Result<()> {
        let mut state = self
            .state
            .try_lock()
            .map_err(|_| ValidationError::MutationInProgress)?;
        state.history.reset()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    /// Send the signed document to the backend.
    ///
    /// Refused before any network call when nothing has been signed.
    pub async fn submit(&self) -> Result<SubmissionReceipt> {
        let result = self.try_submit().await;
        match &result {
            Ok(receipt) => {
                self.events.on_submit_success(receipt);
                self.notify(Notice::success("Document submitted successfully"));
            }
            Err(e) => {
                if !e.is_validation() {
                    self.events.on_submit_error(e);
                }
                self.notify(e.notice());
            }
        }
        result
    }

    async fn try_submit(&self) -> Result<SubmissionReceipt> {
        let (snapshot, target, metadata) = {
            let state = self.state.lock().await;
            let snapshot = state
                .history
                .active()
                .cloned()
                .ok_or(ValidationError::DocumentNotLoaded)?;
            if !state.history.has_signature() {
                return Err(ValidationError::SignatureRequired.into());
            }
            let target = match (&state.session_token, &state.document_id) {
                (Some(token), _) => SubmissionTarget::Session(token.clone()),
                (None, Some(id)) => SubmissionTarget::Document(id.clone()),
                (None, None) => return Err(SubmissionError::NotConfigured.into()),
            };
            let metadata = SubmissionMetadata {
                document_id: state.document_id.clone(),
                document_name: self.config.document_name.clone(),
                signer_name: state.signer.name.clone(),
                signer_email: state.signer.email.clone(),
            };
            (snapshot, target, metadata)
        };

        let sink = self
            .submissions
            .as_ref()
            .ok_or(SubmissionError::NotConfigured)?;
        info!("Submitting {} ({} bytes) to {:?}", metadata.document_name, snapshot.len(), target);

        let receipt = sink
            .submit(SubmissionRequest {
                target,
                pdf_base64: BASE64.encode(snapshot.bytes()),
                metadata,
            })
            .await?;
        Ok(receipt)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub async fn page_count(&self) -> usize {
        self.state.lock().await.pages.len()
    }

    pub async fn page_sizes(&self) -> Vec<PageSize> {
        self.state.lock().await.pages.clone()
    }

    pub async fn has_signature(&self) -> bool {
        self.state.lock().await.history.has_signature()
    }

    pub async fn has_modifications(&self) -> bool {
        self.state.lock().await.history.has_modifications()
    }

    pub async fn can_undo(&self) -> bool {
        self.state.lock().await.history.can_undo()
    }

    pub async fn history_depth(&self) -> usize {
        self.state.lock().await.history.depth()
    }

    pub async fn active_snapshot(&self) -> Option<DocumentSnapshot> {
        self.state.lock().await.history.active().cloned()
    }

    /// Bytes of the active snapshot.
    pub async fn export_pdf(&self) -> Result<Vec<u8>> {
        self.active_snapshot()
            .await
            .map(|snapshot| snapshot.bytes().to_vec())
            .ok_or_else(|| ValidationError::DocumentNotLoaded.into())
    }

    pub async fn document_id(&self) -> Option<DocumentId> {
        self.state.lock().await.document_id.clone()
    }

    pub async fn session_token(&self) -> Option<SessionToken> {
        self.state.lock().await.session_token.clone()
    }

    pub async fn template_id(&self) -> Option<String> {
        self.state.lock().await.template_id.clone()
    }

    fn notify(&self, notice: Notice) {
        self.events.on_notice(&notice);
    }
}
