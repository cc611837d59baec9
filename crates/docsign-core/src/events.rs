//! Callbacks fired by a signing session
//!
//! The embedding application implements [`EditorEvents`] to react to load,
//! render, submission and cancellation outcomes. Every method has a no-op
//! default so implementors only override what they need.

use serde::Serialize;

use crate::error::EditorError;
use crate::services::SubmissionReceipt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Short human-readable message meant for a toast or status line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

pub trait EditorEvents: Send + Sync {
    fn on_load_success(&self, _page_count: usize) {}

    fn on_load_error(&self, _error: &EditorError) {}

    fn on_all_pages_rendered(&self, _page_count: usize) {}

    fn on_submit_success(&self, _receipt: &SubmissionReceipt) {}

    fn on_submit_error(&self, _error: &EditorError) {}

    fn on_cancel(&self) {}

    fn on_notice(&self, _notice: &Notice) {}
}

/// Event sink that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvents;

impl EditorEvents for NoopEvents {}
