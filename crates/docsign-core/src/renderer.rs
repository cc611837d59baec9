//! One-time page renderer setup
//!
//! The page renderer (a PDF.js worker in the browser, a rasterizer
//! elsewhere) is process-wide. It is configured exactly once; later calls
//! observe the options that won.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererOptions {
    /// Location of the renderer worker script, when the host needs one
    pub worker_src: Option<String>,
    /// Pages rendered concurrently
    pub max_concurrent_pages: usize,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            worker_src: None,
            max_concurrent_pages: 4,
        }
    }
}

static RENDERER: OnceLock<RendererOptions> = OnceLock::new();

/// Configure the renderer. The first call wins.
pub fn initialize(options: RendererOptions) -> &'static RendererOptions {
    RENDERER.get_or_init(|| {
        info!("Renderer initialized: {:?}", options);
        options
    })
}

/// Initialize with defaults unless the host already did.
pub fn ensure_initialized() -> &'static RendererOptions {
    initialize(RendererOptions::default())
}

pub fn is_initialized() -> bool {
    RENDERER.get().is_some()
}

pub fn options() -> Option<&'static RendererOptions> {
    RENDERER.get()
}
