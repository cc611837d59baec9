//! Document mutation pipeline
//!
//! Applies a [`PlacementPlan`] to a snapshot and yields a new snapshot. The
//! input snapshot is never touched; on any error nothing is produced.

use tracing::{info, warn};

use crate::error::PlacementError;
use crate::history::DocumentSnapshot;
use crate::image::SignatureImage;
use crate::pdf::PdfEngine;
use crate::placement::{DrawOperation, PlacementPlan};

/// A text placement that was skipped because its page does not exist.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedPlacement {
    pub operation: DrawOperation,
    pub error: PlacementError,
}

#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub snapshot: DocumentSnapshot,
    pub images_drawn: usize,
    pub texts_drawn: usize,
    pub skipped: Vec<SkippedPlacement>,
}

/// Load `snapshot`, execute `plan` in order and save the result.
///
/// An image operation on a missing page aborts the whole mutation. A text
/// operation on a missing page is skipped and reported.
pub fn apply_plan(
    engine: &dyn PdfEngine,
    snapshot: &DocumentSnapshot,
    image: &SignatureImage,
    plan: &PlacementPlan,
) -> Result<MutationOutcome, PlacementError> {
    let mut doc = engine.load(snapshot.bytes())?;
    let page_count = doc.page_count();

    let handle = if plan.image_count() > 0 {
        Some(doc.embed_image(image)?)
    } else {
        None
    };

    let mut images_drawn = 0;
    let mut texts_drawn = 0;
    let mut skipped = Vec::new();

    for op in plan.operations() {
        if op.page_index() >= page_count {
            let error = PlacementError::InvalidTargetPage {
                page: op.page_index() as i64 + 1,
                page_count,
            };
            if op.is_image() {
                return Err(error);
            }
            warn!("Skipping text placement: {}", error);
            skipped.push(SkippedPlacement {
                operation: op.clone(),
                error,
            });
            continue;
        }

        match op {
            DrawOperation::DrawImage {
                page_index,
                x,
                y,
                width,
                height,
            } => {
                let handle = handle
                    .as_ref()
                    .ok_or_else(|| PlacementError::Embed("signature image not embedded".into()))?;
                doc.draw_image(*page_index, handle, *x, *y, *width, *height)?;
                images_drawn += 1;
            }
            DrawOperation::DrawText {
                page_index,
                x,
                y,
                text,
                style,
                ..
            } => {
                doc.draw_text(*page_index, text, *x, *y, style)?;
                texts_drawn += 1;
            }
        }
    }

    let bytes = doc.save()?;
    info!(
        "Applied {} images and {} text runs ({} skipped), {} bytes",
        images_drawn,
        texts_drawn,
        skipped.len(),
        bytes.len()
    );

    Ok(MutationOutcome {
        snapshot: DocumentSnapshot::derived(bytes),
        images_drawn,
        texts_drawn,
        skipped,
    })
}
