//! Placement targets and page metrics
//!
//! [`RawPosition`] is what callers and template sources hand us. The
//! coordinate resolver turns it into an [`ElementPosition`], which is always
//! expressed in PDF points with a bottom-left origin on a concrete page.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// What a target receives: the signature image or one metadata text run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Signature,
    Name,
    Email,
    Date,
}

impl FieldType {
    /// Metadata fields in the order they stack in a fallback block.
    pub const METADATA: [FieldType; 3] = [FieldType::Name, FieldType::Email, FieldType::Date];

    /// Case-insensitive parse of a type tag. Unknown tags yield `None`.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "signature" => Some(FieldType::Signature),
            "name" => Some(FieldType::Name),
            "email" => Some(FieldType::Email),
            "date" => Some(FieldType::Date),
            _ => None,
        }
    }

    pub fn is_metadata(self) -> bool {
        !matches!(self, FieldType::Signature)
    }
}

fn lenient_field_type<'de, D>(deserializer: D) -> Result<Option<FieldType>, D::Error>
where
    D: Deserializer<'de>,
{
    let tag: Option<String> = Option::deserialize(deserializer)?;
    Ok(tag.as_deref().and_then(FieldType::parse))
}

/// Unresolved position entry as supplied by a caller or a coordinate source.
///
/// How `x`, `y`, `width`, `height` and `page_number` are interpreted is decided
/// by the [`CoordinateSpace`](crate::coords::CoordinateSpace) of the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPosition {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, alias = "page", skip_serializing_if = "Option::is_none")]
    pub page_number: Option<i64>,
    #[serde(
        default,
        rename = "type",
        deserialize_with = "lenient_field_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub field_type: Option<FieldType>,
}

impl RawPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            width: None,
            height: None,
            page_number: None,
            field_type: None,
        }
    }

    pub fn on_page(mut self, page_number: i64) -> Self {
        self.page_number = Some(page_number);
        self
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_type(mut self, field_type: FieldType) -> Self {
        self.field_type = Some(field_type);
        self
    }

    /// Entries without a recognised type are signature targets.
    pub fn effective_type(&self) -> FieldType {
        self.field_type.unwrap_or(FieldType::Signature)
    }
}

/// Resolved placement target in PDF points (bottom-left origin).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementPosition {
    /// 0-based page index
    pub page_index: usize,
    pub x: f64,
    pub y: f64,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub field_type: FieldType,
}

/// Page dimensions in points (1 point = 1/72 inch)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn letter() -> Self {
        Self::new(612.0, 792.0)
    }

    pub fn a4() -> Self {
        Self::new(595.0, 842.0)
    }
}

/// Metadata field type to its ordered list of targets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataTargetMap {
    targets: BTreeMap<FieldType, Vec<ElementPosition>>,
}

impl MetadataTargetMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the map from resolved positions, ignoring signature targets.
    pub fn from_positions<I>(positions: I) -> Self
    where
        I: IntoIterator<Item = ElementPosition>,
    {
        let mut targets: BTreeMap<FieldType, Vec<ElementPosition>> = BTreeMap::new();
        for position in positions {
            if position.field_type.is_metadata() {
                targets.entry(position.field_type).or_default().push(position);
            }
        }
        Self { targets }
    }

    pub fn targets_for(&self, field: FieldType) -> &[ElementPosition] {
        self.targets.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True when no metadata field has a single target.
    pub fn is_empty(&self) -> bool {
        self.targets.values().all(Vec::is_empty)
    }

    pub fn len(&self) -> usize {
        self.targets.values().map(Vec::len).sum()
    }

    /// All targets, grouped by field in stacking order.
    pub fn positions(&self) -> impl Iterator<Item = &ElementPosition> {
        self.targets.values().flatten()
    }
}
