//! DocSign API - Backend for signature placement
//!
//! Provides REST endpoints for:
//! - Template registration and template coordinates
//! - Document and signing session creation
//! - Document delivery
//! - Session- and document-scoped submission of signed PDFs

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod error;
pub mod handlers;
pub mod models;
pub mod state;

pub use state::AppState;

/// Build the application router
pub fn app(state: Arc<AppState>) -> Router {
    // CORS configuration for web clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Templates and their coordinates
        .route("/api/templates", post(handlers::create_template))
        .route("/api/templates/:id/coordinates", get(handlers::get_coordinates))
        // Documents
        .route("/api/documents", post(handlers::create_document))
        .route("/api/documents/:id/session", post(handlers::create_session))
        .route("/api/documents/:id/view", get(handlers::get_document_view))
        // Submission
        .route("/api/documents/:id/submit", post(handlers::submit_document))
        .route("/api/sessions/:token/submit", post(handlers::submit_session))
        // Add middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
