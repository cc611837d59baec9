//! Text and layout styling for stamped content

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStyle {
    pub font_size: f64,
    /// Hex colour, e.g. "#000000"
    pub color: String,
    /// Font family; mapped to one of the PDF standard 14 fonts
    pub font_name: Option<String>,
    pub is_bold: bool,
    pub is_italic: bool,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 12.0,
            color: "#000000".to_string(),
            font_name: None,
            is_bold: false,
            is_italic: false,
        }
    }
}

impl TextStyle {
    pub fn sized(font_size: f64) -> Self {
        Self {
            font_size,
            ..Self::default()
        }
    }

    /// Standard 14 font matching the family and bold/italic flags.
    pub fn pdf_font_name(&self) -> &'static str {
        let base = self
            .font_name
            .as_deref()
            .map(map_font_family_to_base)
            .unwrap_or("Helvetica");

        match base {
            "Times-Roman" => match (self.is_bold, self.is_italic) {
                (true, true) => "Times-BoldItalic",
                (true, false) => "Times-Bold",
                (false, true) => "Times-Italic",
                (false, false) => "Times-Roman",
            },
            "Courier" => match (self.is_bold, self.is_italic) {
                (true, true) => "Courier-BoldOblique",
                (true, false) => "Courier-Bold",
                (false, true) => "Courier-Oblique",
                (false, false) => "Courier",
            },
            _ => match (self.is_bold, self.is_italic) {
                (true, true) => "Helvetica-BoldOblique",
                (true, false) => "Helvetica-Bold",
                (false, true) => "Helvetica-Oblique",
                (false, false) => "Helvetica",
            },
        }
    }

    pub fn rgb(&self) -> (f32, f32, f32) {
        parse_hex_color(&self.color)
    }
}

/// Map font family name to base PDF font (without style variants)
fn map_font_family_to_base(name: &str) -> &'static str {
    let lower = name.to_lowercase();

    match lower.as_str() {
        "serif" => return "Times-Roman",
        "monospace" => return "Courier",
        _ => {}
    }

    if lower.contains("times") || lower.contains("georgia") || lower.contains("garamond") {
        return "Times-Roman";
    }

    if lower.contains("courier")
        || lower.contains("mono")
        || lower.contains("consolas")
        || lower.contains("monaco")
    {
        return "Courier";
    }

    "Helvetica"
}

/// Parse hex color string (e.g., "#FF0000" or "FF0000") to RGB floats (0-1 range)
pub fn parse_hex_color(color: &str) -> (f32, f32, f32) {
    let hex = color.trim_start_matches('#');
    if hex.len() >= 6 && hex.is_ascii() {
        let r = u8::from_str_radix(&hex[0..2], 16).unwrap_or(0) as f32 / 255.0;
        let g = u8::from_str_radix(&hex[2..4], 16).unwrap_or(0) as f32 / 255.0;
        let b = u8::from_str_radix(&hex[4..6], 16).unwrap_or(0) as f32 / 255.0;
        (r, g, b)
    } else {
        (0.0, 0.0, 0.0)
    }
}

/// Sizes and layout constants used by the placement planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementStyle {
    /// Signature box used when a target has no width (points)
    pub default_signature_width: f64,
    /// Signature box used when a target has no height (points)
    pub default_signature_height: f64,
    /// Style for text placed on dedicated metadata targets
    pub metadata_text: TextStyle,
    /// Style for the stacked block under a signature
    pub fallback_text: TextStyle,
    /// Distance from the signature anchor down to the first fallback line
    pub fallback_gap: f64,
    /// Distance between consecutive fallback lines
    pub fallback_line_height: f64,
}

impl Default for PlacementStyle {
    fn default() -> Self {
        Self {
            default_signature_width: 150.0,
            default_signature_height: 50.0,
            metadata_text: TextStyle::sized(12.0),
            fallback_text: TextStyle::sized(10.0),
            fallback_gap: 14.0,
            fallback_line_height: 12.0,
        }
    }
}
