//! Placement planning
//!
//! Turns one "commit signature" action into an ordered list of draw
//! operations. Planning is pure: it reads resolved targets and field values
//! and returns a [`PlacementPlan`] without touching the document.

use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ValidationError;
use crate::image::SignatureImage;
use crate::position::{ElementPosition, FieldType, MetadataTargetMap};
use crate::style::{PlacementStyle, TextStyle};

pub const DEFAULT_DATE_FORMAT: &str = "%m/%d/%Y";

/// Whether chrono can render `format` as a strftime pattern.
pub fn is_valid_date_format(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

/// Today's local date; invalid patterns fall back to [`DEFAULT_DATE_FORMAT`].
fn format_today(format: &str) -> String {
    let format = if is_valid_date_format(format) {
        format
    } else {
        warn!("Invalid date format {:?}, using {}", format, DEFAULT_DATE_FORMAT);
        DEFAULT_DATE_FORMAT
    };

    let now = Local::now();
    let mut date = String::new();
    if write!(date, "{}", now.format(format)).is_err() {
        date.clear();
        let _ = write!(date, "{}", now.format(DEFAULT_DATE_FORMAT));
    }
    date
}

/// Which metadata fields are rendered automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataDisplay {
    pub show_name: bool,
    pub show_email: bool,
    pub show_date: bool,
}

impl Default for MetadataDisplay {
    fn default() -> Self {
        Self {
            show_name: true,
            show_email: true,
            show_date: true,
        }
    }
}

impl MetadataDisplay {
    pub fn none() -> Self {
        Self {
            show_name: false,
            show_email: false,
            show_date: false,
        }
    }

    pub fn shows(&self, field: FieldType) -> bool {
        match field {
            FieldType::Name => self.show_name,
            FieldType::Email => self.show_email,
            FieldType::Date => self.show_date,
            FieldType::Signature => true,
        }
    }
}

/// Current values of the metadata fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataValues {
    pub name: Option<String>,
    pub email: Option<String>,
    pub date: Option<String>,
}

impl MetadataValues {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: Some(email.into()),
            date: None,
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    /// Fill in today's local date unless a date is already set.
    pub fn with_today(mut self, format: &str) -> Self {
        if self.value(FieldType::Date).is_none() {
            self.date = Some(format_today(format));
        }
        self
    }

    /// Trimmed, non-empty value of a field.
    pub fn value(&self, field: FieldType) -> Option<&str> {
        let raw = match field {
            FieldType::Name => self.name.as_deref(),
            FieldType::Email => self.email.as_deref(),
            FieldType::Date => self.date.as_deref(),
            FieldType::Signature => None,
        };
        raw.map(str::trim).filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum DrawOperation {
    DrawImage {
        page_index: usize,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    DrawText {
        page_index: usize,
        x: f64,
        y: f64,
        text: String,
        field: FieldType,
        style: TextStyle,
    },
}

impl DrawOperation {
    pub fn page_index(&self) -> usize {
        match self {
            DrawOperation::DrawImage { page_index, .. } => *page_index,
            DrawOperation::DrawText { page_index, .. } => *page_index,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, DrawOperation::DrawImage { .. })
    }
}

/// Ordered draw operations for one signing action. Images always come first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlacementPlan {
    operations: Vec<DrawOperation>,
}

impl PlacementPlan {
    pub fn operations(&self) -> &[DrawOperation] {
        &self.operations
    }

    pub fn image_count(&self) -> usize {
        self.operations.iter().filter(|op| op.is_image()).count()
    }

    pub fn text_operations(&self) -> impl Iterator<Item = &DrawOperation> {
        self.operations.iter().filter(|op| !op.is_image())
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Everything the planner reads for one commit.
#[derive(Debug, Clone, Copy)]
pub struct PlacementRequest<'a> {
    pub image: &'a SignatureImage,
    pub signatures: &'a [ElementPosition],
    pub values: &'a MetadataValues,
    pub display: &'a MetadataDisplay,
    pub targets: &'a MetadataTargetMap,
    pub style: &'a PlacementStyle,
}

pub fn plan_placements(req: PlacementRequest<'_>) -> Result<PlacementPlan, ValidationError> {
    if req.image.is_blank() || req.image.width == 0 || req.image.height == 0 {
        return Err(ValidationError::EmptySignature);
    }
    if req.signatures.is_empty() {
        return Err(ValidationError::NoSignaturePositions);
    }

    let mut operations = Vec::new();

    for target in req.signatures {
        let max_w = target.width.unwrap_or(req.style.default_signature_width);
        let max_h = target.height.unwrap_or(req.style.default_signature_height);
        let (width, height) = req.image.scale_to_fit(max_w, max_h);
        operations.push(DrawOperation::DrawImage {
            page_index: target.page_index,
            x: target.x,
            y: target.y,
            width,
            height,
        });
    }

    let enabled: Vec<(FieldType, &str)> = FieldType::METADATA
        .iter()
        .filter(|field| req.display.shows(**field))
        .filter_map(|field| req.values.value(*field).map(|v| (*field, v)))
        .collect();

    if req.targets.is_empty() {
        // No dedicated metadata coordinates: stack the lines under each signature.
        for target in req.signatures {
            let mut y = target.y - req.style.fallback_gap;
            for (field, text) in &enabled {
                operations.push(DrawOperation::DrawText {
                    page_index: target.page_index,
                    x: target.x,
                    y,
                    text: text.to_string(),
                    field: *field,
                    style: req.style.fallback_text.clone(),
                });
                y -= req.style.fallback_line_height;
            }
        }
    } else {
        for (field, text) in &enabled {
            for target in req.targets.targets_for(*field) {
                operations.push(DrawOperation::DrawText {
                    page_index: target.page_index,
                    x: target.x,
                    y: target.y,
                    text: text.to_string(),
                    field: *field,
                    style: req.style.metadata_text.clone(),
                });
            }
        }
    }

    debug!(
        "Planned {} operations ({} images)",
        operations.len(),
        req.signatures.len()
    );

    Ok(PlacementPlan { operations })
}
