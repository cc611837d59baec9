//! Coordinate resolution from source positions to PDF points
//!
//! Every data source declares how its numbers are meant through a
//! [`CoordinateSpace`]: the unit of `x`/`y`/`width`/`height`, which edge the
//! y axis starts from, and whether page numbers count from 0 or 1. Nothing
//! here guesses a format from the data unless the source explicitly asks for
//! [`CoordinateMode::InferFromMagnitude`].

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PlacementError;
use crate::position::{ElementPosition, MetadataTargetMap, PageSize, RawPosition};

/// Values at or below this are percentages under magnitude inference.
pub const PERCENT_THRESHOLD: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateMode {
    /// 0..=100, percent of the page span
    PercentOfSpan,
    /// 0..=1, fraction of the page span
    NormalizedUnit,
    /// Literal PDF points
    AbsolutePoints,
    /// Each value <= 100 is a percentage, anything larger is points.
    ///
    /// Ambiguous for real coordinates under 100pt; sources supplying such
    /// coordinates must use [`CoordinateMode::AbsolutePoints`] instead.
    InferFromMagnitude,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    TopLeft,
    BottomLeft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageNumbering {
    OneBased,
    ZeroBased,
    /// Raw values >= 1 count from 1, anything lower is already an index.
    Infer,
}

/// How one data source expresses its positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateSpace {
    pub mode: CoordinateMode,
    pub origin: Origin,
    pub numbering: PageNumbering,
}

impl CoordinateSpace {
    /// Literal PDF points, bottom-left origin, 1-based pages.
    pub fn points() -> Self {
        Self {
            mode: CoordinateMode::AbsolutePoints,
            origin: Origin::BottomLeft,
            numbering: PageNumbering::OneBased,
        }
    }

    /// Percent of the page, measured from the top-left corner, 1-based pages.
    pub fn template() -> Self {
        Self {
            mode: CoordinateMode::PercentOfSpan,
            origin: Origin::TopLeft,
            numbering: PageNumbering::OneBased,
        }
    }

    pub fn with_mode(mut self, mode: CoordinateMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_numbering(mut self, numbering: PageNumbering) -> Self {
        self.numbering = numbering;
        self
    }

    /// Scale a single value against a page span.
    fn scale(&self, value: f64, span: f64) -> f64 {
        match self.mode {
            CoordinateMode::PercentOfSpan => value / 100.0 * span,
            CoordinateMode::NormalizedUnit => value * span,
            CoordinateMode::AbsolutePoints => value,
            CoordinateMode::InferFromMagnitude => {
                if value <= PERCENT_THRESHOLD {
                    value / 100.0 * span
                } else {
                    value
                }
            }
        }
    }

    /// Map a raw page reference to a 0-based index (not bounds-checked).
    pub fn page_index(&self, raw: Option<i64>) -> i64 {
        let Some(raw) = raw else {
            return 0;
        };
        match self.numbering {
            PageNumbering::OneBased => raw.saturating_sub(1),
            PageNumbering::ZeroBased => raw,
            PageNumbering::Infer => {
                if raw >= 1 {
                    raw.saturating_sub(1)
                } else {
                    raw
                }
            }
        }
    }
}

impl Default for CoordinateSpace {
    fn default() -> Self {
        Self::points()
    }
}

/// Check a 0-based index against the document's pages.
pub fn check_page_index(index: i64, page_count: usize) -> Result<usize, PlacementError> {
    if index < 0 || index as u64 >= page_count as u64 {
        return Err(PlacementError::InvalidTargetPage {
            page: index.saturating_add(1),
            page_count,
        });
    }
    Ok(index as usize)
}

/// Resolve one raw entry against the page metrics of the document.
pub fn resolve_position(
    raw: &RawPosition,
    space: &CoordinateSpace,
    pages: &[PageSize],
) -> Result<ElementPosition, PlacementError> {
    let page_index = check_page_index(space.page_index(raw.page_number), pages.len())?;
    let page = pages[page_index];

    let width = raw.width.map(|w| space.scale(w, page.width));
    let height = raw.height.map(|h| space.scale(h, page.height));

    let x = space.scale(raw.x, page.width);
    let offset_y = space.scale(raw.y, page.height);
    let y = match space.origin {
        Origin::BottomLeft => offset_y,
        // Anchor on the element's lower edge; unknown height anchors on its top.
        Origin::TopLeft => (page.height - offset_y - height.unwrap_or(0.0)).max(0.0),
    };

    Ok(ElementPosition {
        page_index,
        x,
        y,
        width,
        height,
        field_type: raw.effective_type(),
    })
}

/// Resolved targets for one data source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedTargets {
    pub signatures: Vec<ElementPosition>,
    pub metadata: MetadataTargetMap,
    /// Metadata entries dropped because their page does not exist
    pub rejected: Vec<(RawPosition, PlacementError)>,
}

impl ResolvedTargets {
    /// Combine targets from two sources. Signatures keep their order, this
    /// source first.
    pub fn merge(mut self, other: ResolvedTargets) -> Self {
        self.signatures.extend(other.signatures);
        let metadata: Vec<ElementPosition> = self
            .metadata
            .positions()
            .chain(other.metadata.positions())
            .cloned()
            .collect();
        self.metadata = MetadataTargetMap::from_positions(metadata);
        self.rejected.extend(other.rejected);
        self
    }
}

/// Resolve and bucket a batch of entries.
///
/// A metadata entry on a missing page is dropped and reported; a signature
/// entry on a missing page fails the whole batch since the signature is
/// mandatory.
pub fn resolve_targets(
    entries: &[RawPosition],
    space: &CoordinateSpace,
    pages: &[PageSize],
) -> Result<ResolvedTargets, PlacementError> {
    let mut signatures = Vec::new();
    let mut metadata = Vec::new();
    let mut rejected = Vec::new();

    for raw in entries {
        match resolve_position(raw, space, pages) {
            Ok(position) if position.field_type.is_metadata() => metadata.push(position),
            Ok(position) => signatures.push(position),
            Err(e) if raw.effective_type().is_metadata() => {
                warn!("Dropping {:?} target: {}", raw.effective_type(), e);
                rejected.push((raw.clone(), e));
            }
            Err(e) => return Err(e),
        }
    }

    debug!(
        "Resolved {} signature and {} metadata targets ({} rejected)",
        signatures.len(),
        metadata.len(),
        rejected.len()
    );

    Ok(ResolvedTargets {
        signatures,
        metadata: MetadataTargetMap::from_positions(metadata),
        rejected,
    })
}
