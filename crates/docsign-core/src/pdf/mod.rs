//! PDF object model used by the mutation pipeline
//!
//! The pipeline only needs a handful of capabilities: load bytes, list page
//! sizes, embed an image, draw images and text on pages, and save. These are
//! expressed as the [`PdfEngine`] and [`EditableDocument`] traits so the
//! backing library stays swappable. [`LopdfEngine`] is the default backend.

mod lopdf_engine;
pub mod page_info;

pub use lopdf_engine::{LopdfDocument, LopdfEngine};

#[cfg(test)]
pub(crate) use lopdf_engine::test_support::{blank_pdf, image_origins};

use crate::error::{LoadError, PlacementError};
use crate::image::{self, SignatureImage};
use crate::position::PageSize;
use crate::style::TextStyle;

/// Image embedded in a document, ready to be drawn on any of its pages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageHandle {
    pub(crate) slot: usize,
    pub width: f64,
    pub height: f64,
}

impl ImageHandle {
    pub fn scale_to_fit(&self, max_width: f64, max_height: f64) -> (f64, f64) {
        image::scale_to_fit(self.width, self.height, max_width, max_height)
    }
}

pub trait PdfEngine: Send + Sync {
    /// Decode bytes into an editable document.
    fn load(&self, bytes: &[u8]) -> Result<Box<dyn EditableDocument>, LoadError>;

    /// Page sizes of a document without keeping it open.
    fn page_sizes(&self, bytes: &[u8]) -> Result<Vec<PageSize>, LoadError> {
        Ok(self.load(bytes)?.page_sizes())
    }
}

pub trait EditableDocument: Send {
    fn page_sizes(&self) -> Vec<PageSize>;

    fn page_count(&self) -> usize {
        self.page_sizes().len()
    }

    fn embed_image(&mut self, image: &SignatureImage) -> Result<ImageHandle, PlacementError>;

    fn draw_image(
        &mut self,
        page_index: usize,
        image: &ImageHandle,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> Result<(), PlacementError>;

    fn draw_text(
        &mut self,
        page_index: usize,
        text: &str,
        x: f64,
        y: f64,
        style: &TextStyle,
    ) -> Result<(), PlacementError>;

    fn save(self: Box<Self>) -> Result<Vec<u8>, PlacementError>;
}

/// Page count of a PDF using the default backend.
pub fn page_count(bytes: &[u8]) -> Result<usize, LoadError> {
    Ok(LopdfEngine.load(bytes)?.page_count())
}
