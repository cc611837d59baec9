//! Signature placement engine
//!
//! This crate turns a drawn signature plus signer details into content
//! stamped onto an existing PDF:
//! - `coords`: resolves caller and template positions into PDF points
//! - `placement`: plans image and text draws for one signing action
//! - `pipeline`: applies a plan to an immutable document snapshot
//! - `history`: undo stack and reset to the original document
//! - `session`: the editor instance wiring loading, signing and submission
//!
//! PDF access goes through the [`pdf::PdfEngine`] trait; [`pdf::LopdfEngine`]
//! is the bundled implementation.

pub mod config;
pub mod coords;
pub mod error;
pub mod events;
pub mod history;
pub mod image;
pub mod pdf;
pub mod pipeline;
pub mod placement;
pub mod position;
pub mod renderer;
pub mod services;
pub mod session;
pub mod style;

pub use config::{DocumentSourceConfig, EditorConfig, SignerInfo};
pub use coords::{resolve_position, resolve_targets, CoordinateMode, CoordinateSpace, Origin, PageNumbering};
pub use error::{EditorError, LoadError, PlacementError, SubmissionError, ValidationError};
pub use events::{EditorEvents, Notice, NoticeLevel};
pub use history::{DocumentSnapshot, HistoryManager, SnapshotKind, UndoOutcome};
pub use image::SignatureImage;
pub use pdf::{page_count, LopdfEngine, PdfEngine};
pub use pipeline::{apply_plan, MutationOutcome};
pub use placement::{plan_placements, DrawOperation, MetadataDisplay, MetadataValues, PlacementPlan};
pub use position::{ElementPosition, FieldType, MetadataTargetMap, PageSize, RawPosition};
pub use services::{
    CoordinateSource, DocumentId, DocumentService, SessionToken, SubmissionMetadata,
    SubmissionReceipt, SubmissionRequest, SubmissionSink, SubmissionTarget,
};
pub use session::{CommitReport, SigningSession};
pub use style::{PlacementStyle, TextStyle};

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::image::test_support::signature_png;
    use crate::pdf::blank_pdf;
    use crate::placement::PlacementRequest;
    use proptest::prelude::*;

    // ============================================================
    // Placement plans
    // ============================================================

    fn signature_target() -> impl Strategy<Value = ElementPosition> {
        (0usize..3, 0.0f64..612.0, 0.0f64..792.0).prop_map(|(page_index, x, y)| ElementPosition {
            page_index,
            x,
            y,
            width: None,
            height: None,
            field_type: FieldType::Signature,
        })
    }

    fn display() -> impl Strategy<Value = MetadataDisplay> {
        (any::<bool>(), any::<bool>(), any::<bool>()).prop_map(|(show_name, show_email, show_date)| {
            MetadataDisplay {
                show_name,
                show_email,
                show_date,
            }
        })
    }

    proptest! {
        /// Property: every image draw precedes every text draw
        #[test]
        fn images_precede_text(
            signatures in prop::collection::vec(signature_target(), 1..6),
            display in display(),
        ) {
            let image = SignatureImage::decode(&signature_png()).unwrap();
            let plan = plan_placements(PlacementRequest {
                image: &image,
                signatures: &signatures,
                values: &MetadataValues::new("Ada", "ada@example.com").with_date("01/02/2026"),
                display: &display,
                targets: &MetadataTargetMap::new(),
                style: &PlacementStyle::default(),
            }).unwrap();

            let first_text = plan.operations().iter().position(|op| !op.is_image());
            let last_image = plan.operations().iter().rposition(|op| op.is_image());
            prop_assert_eq!(plan.image_count(), signatures.len());
            if let (Some(first_text), Some(last_image)) = (first_text, last_image) {
                prop_assert!(last_image < first_text);
            }
        }

        /// Property: the fallback block has one line per shown field per signature
        #[test]
        fn fallback_line_count(
            signatures in prop::collection::vec(signature_target(), 1..4),
            display in display(),
        ) {
            let image = SignatureImage::decode(&signature_png()).unwrap();
            let plan = plan_placements(PlacementRequest {
                image: &image,
                signatures: &signatures,
                values: &MetadataValues::new("Ada", "ada@example.com").with_date("01/02/2026"),
                display: &display,
                targets: &MetadataTargetMap::new(),
                style: &PlacementStyle::default(),
            }).unwrap();

            let shown = [display.show_name, display.show_email, display.show_date]
                .iter()
                .filter(|s| **s)
                .count();
            prop_assert_eq!(plan.text_operations().count(), shown * signatures.len());
        }
    }

    // ============================================================
    // History
    // ============================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// Property: undoing every commit restores the original bytes exactly
        #[test]
        fn undo_all_restores_original(commits in 1usize..5) {
            let original = blank_pdf(1);
            let image = SignatureImage::decode(&signature_png()).unwrap();
            let signature = [ElementPosition {
                page_index: 0,
                x: 100.0,
                y: 200.0,
                width: None,
                height: None,
                field_type: FieldType::Signature,
            }];
            let plan = plan_placements(PlacementRequest {
                image: &image,
                signatures: &signature,
                values: &MetadataValues::default(),
                display: &MetadataDisplay::none(),
                targets: &MetadataTargetMap::new(),
                style: &PlacementStyle::default(),
            }).unwrap();

            let mut history = HistoryManager::new(true);
            history.load(DocumentSnapshot::original(original.clone()));
            for _ in 0..commits {
                let guard = history.begin_mutation().unwrap();
                let outcome = apply_plan(&LopdfEngine, guard.source(), &image, &plan).unwrap();
                guard.commit(outcome.snapshot);
            }
            prop_assert_eq!(history.depth(), commits);

            let mut last = UndoOutcome::NothingToUndo;
            for _ in 0..commits {
                last = history.undo().unwrap();
            }
            prop_assert_eq!(last, UndoOutcome::Restored { kind: SnapshotKind::Original, remaining: 0 });
            prop_assert_eq!(history.active().unwrap().bytes(), &original[..]);
            prop_assert!(!history.has_signature());
        }
    }
}
