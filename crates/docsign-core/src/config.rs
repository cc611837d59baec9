//! Editor configuration
//!
//! [`EditorConfig`] is read once when a session is created and never changes
//! afterwards. Every field except the document source has a default, so a
//! config deserialized from `{"source": {...}}` is complete.

use serde::{Deserialize, Serialize};

use crate::coords::CoordinateSpace;
use crate::error::LoadError;
use crate::placement::{is_valid_date_format, MetadataDisplay, DEFAULT_DATE_FORMAT};
use crate::position::RawPosition;
use crate::style::PlacementStyle;

pub const DEFAULT_DOCUMENT_NAME: &str = "document.pdf";

/// Where the document comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentSourceConfig {
    /// Bytes supplied by the caller (base64 on the wire)
    Inline {
        #[serde(with = "base64_bytes")]
        bytes: Vec<u8>,
    },
    Url {
        url: String,
    },
    /// Existing backend document; a session is created for it
    Document {
        document_id: String,
    },
    /// A document is created from this template, then a session for it
    Template {
        template_id: String,
    },
}

impl DocumentSourceConfig {
    /// Reject sources whose identifier is blank.
    pub fn validate(&self) -> Result<(), LoadError> {
        let (value, name) = match self {
            DocumentSourceConfig::Inline { .. } => return Ok(()),
            DocumentSourceConfig::Url { url } => (url, "url"),
            DocumentSourceConfig::Document { document_id } => (document_id, "document_id"),
            DocumentSourceConfig::Template { template_id } => (template_id, "template_id"),
        };
        if value.trim().is_empty() {
            return Err(LoadError::MissingIdentifier(name));
        }
        Ok(())
    }
}

/// Pre-filled signer details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerInfo {
    pub name: String,
    pub email: String,
}

impl SignerInfo {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Loading fails with [`LoadError::MissingSource`] when unset
    pub source: Option<DocumentSourceConfig>,
    pub document_name: String,
    pub signer: SignerInfo,
    pub display: MetadataDisplay,
    /// Signature and metadata positions supplied directly by the caller
    pub fixed_positions: Vec<RawPosition>,
    pub fixed_space: CoordinateSpace,
    pub template_space: CoordinateSpace,
    /// Template whose coordinates are fetched alongside the document
    pub coordinate_template_id: Option<String>,
    pub enable_undo: bool,
    pub style: PlacementStyle,
    /// chrono format string for the date field
    pub date_format: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            source: None,
            document_name: DEFAULT_DOCUMENT_NAME.to_string(),
            signer: SignerInfo::default(),
            display: MetadataDisplay::default(),
            fixed_positions: Vec::new(),
            fixed_space: CoordinateSpace::points(),
            template_space: CoordinateSpace::template(),
            coordinate_template_id: None,
            enable_undo: true,
            style: PlacementStyle::default(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }
}

impl EditorConfig {
    pub fn new(source: DocumentSourceConfig) -> Self {
        Self {
            source: Some(source),
            ..Self::default()
        }
    }

    pub fn inline(bytes: Vec<u8>) -> Self {
        Self::new(DocumentSourceConfig::Inline { bytes })
    }

    /// Parse a config, rejecting a `date_format` chrono cannot render.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        if !is_valid_date_format(&config.date_format) {
            return Err(serde::de::Error::custom(format!(
                "invalid date_format {:?}",
                config.date_format
            )));
        }
        Ok(config)
    }

    pub fn with_signer(mut self, signer: SignerInfo) -> Self {
        self.signer = signer;
        self
    }

    pub fn with_fixed_positions(mut self, positions: Vec<RawPosition>) -> Self {
        self.fixed_positions = positions;
        self
    }

    pub fn with_coordinate_template(mut self, template_id: impl Into<String>) -> Self {
        self.coordinate_template_id = Some(template_id.into());
        self
    }

    pub fn with_display(mut self, display: MetadataDisplay) -> Self {
        self.display = display;
        self
    }

    pub fn with_undo(mut self, enable_undo: bool) -> Self {
        self.enable_undo = enable_undo;
        self
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.trim())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{CoordinateMode, Origin, PageNumbering};
    use crate::position::FieldType;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_minimal_json_gets_defaults() {
        let config =
            EditorConfig::from_json(r#"{"source": {"kind": "template", "template_id": "t-1"}}"#)
                .unwrap();

        assert_eq!(
            config.source,
            Some(DocumentSourceConfig::Template {
                template_id: "t-1".into()
            })
        );
        assert_eq!(config.document_name, "document.pdf");
        assert_eq!(config.date_format, "%m/%d/%Y");
        assert!(config.enable_undo);
        assert!(config.display.show_name && config.display.show_email && config.display.show_date);
        assert_eq!(config.fixed_space, CoordinateSpace::points());
        assert_eq!(config.template_space, CoordinateSpace::template());
        assert_eq!(config.style, PlacementStyle::default());
    }

    #[test]
    fn test_inline_bytes_are_base64() {
        let config = EditorConfig::inline(b"%PDF-1.7".to_vec());
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("JVBERi0xLjc="));

        let back = EditorConfig::from_json(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_fixed_positions_and_space_from_json() {
        let config = EditorConfig::from_json(
            r#"{
                "source": {"kind": "url", "url": "https://example.com/a.pdf"},
                "fixed_positions": [
                    {"x": 10, "y": 20, "pageNumber": 2, "type": "SIGNATURE"},
                    {"x": 10, "y": 5, "page": 2, "type": "date"}
                ],
                "fixed_space": {"mode": "percent_of_span", "origin": "top_left", "numbering": "zero_based"},
                "display": {"show_email": false}
            }"#,
        )
        .unwrap();

        assert_eq!(config.fixed_positions.len(), 2);
        assert_eq!(config.fixed_positions[0].page_number, Some(2));
        assert_eq!(config.fixed_positions[1].effective_type(), FieldType::Date);
        assert_eq!(config.fixed_space.mode, CoordinateMode::PercentOfSpan);
        assert_eq!(config.fixed_space.origin, Origin::TopLeft);
        assert_eq!(config.fixed_space.numbering, PageNumbering::ZeroBased);
        assert!(!config.display.show_email);
        assert!(config.display.show_name);
    }

    #[test]
    fn test_invalid_date_format_rejected() {
        let err = EditorConfig::from_json(
            r#"{"source": {"kind": "document", "document_id": "d-1"}, "date_format": "%Q"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid date_format"));

        let config = EditorConfig::from_json(
            r#"{"source": {"kind": "document", "document_id": "d-1"}, "date_format": "%Y-%m-%d"}"#,
        )
        .unwrap();
        assert_eq!(config.date_format, "%Y-%m-%d");
    }

    #[test]
    fn test_blank_identifiers_rejected() {
        let source = DocumentSourceConfig::Document {
            document_id: "  ".into(),
        };
        assert_eq!(
            source.validate(),
            Err(LoadError::MissingIdentifier("document_id"))
        );
        assert!(DocumentSourceConfig::Inline { bytes: Vec::new() }
            .validate()
            .is_ok());
    }
}
