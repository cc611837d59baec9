use thiserror::Error;

use crate::events::Notice;

/// Failures while obtaining the document or its coordinates.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("No document source configured")]
    MissingSource,

    #[error("Missing identifier: {0}")]
    MissingIdentifier(&'static str),

    #[error("Not a valid PDF file (missing %PDF- header)")]
    InvalidHeader,

    #[error("Failed to parse PDF: {0}")]
    Decode(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Load was cancelled")]
    Cancelled,
}

/// Preconditions that stop an operation before anything changes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Please draw your signature first")]
    EmptySignature,

    #[error("Signature positions not set")]
    NoSignaturePositions,

    #[error("PDF not loaded yet")]
    DocumentNotLoaded,

    #[error("Another change is still being applied")]
    MutationInProgress,

    #[error("Please add your signature first")]
    SignatureRequired,

    #[error("Invalid signature image: {0}")]
    InvalidImage(String),
}

/// Failures while stamping content onto pages.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlacementError {
    #[error("Failed to open document: {0}")]
    Source(#[from] LoadError),

    #[error("Invalid target page {page} (document has {page_count} pages)")]
    InvalidTargetPage { page: i64, page_count: usize },

    #[error("Failed to embed image: {0}")]
    Embed(String),

    #[error("Failed to draw on page: {0}")]
    Draw(String),

    #[error("Failed to save PDF: {0}")]
    Encode(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubmissionError {
    #[error("No submission endpoint configured")]
    NotConfigured,

    #[error("Submission transport failed: {0}")]
    Transport(String),

    #[error("Submission rejected: {0}")]
    Rejected(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Placement(#[from] PlacementError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),
}

impl EditorError {
    /// Short user-facing notice for this error.
    pub fn notice(&self) -> Notice {
        match self {
            EditorError::Validation(e) => Notice::warning(e.to_string()),
            EditorError::Load(LoadError::Cancelled) => Notice::info("Loading cancelled"),
            EditorError::Load(e) => Notice::error(format!("Failed to load document: {}", e)),
            EditorError::Placement(e) => Notice::error(format!("Failed to place signature: {}", e)),
            EditorError::Submission(e) => Notice::error(format!("Failed to submit document: {}", e)),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, EditorError::Validation(_))
    }
}

pub type Result<T, E = EditorError> = std::result::Result<T, E>;
