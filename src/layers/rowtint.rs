//! Row-Tint: a Rendering layer that tints an entire row's background when
//! a pattern matches anywhere in its post-transform content.

use regex::{Regex, RegexBuilder};
use std::collections::HashMap;

use crate::layers::{
    missing_field, HighlightSpan, LayerCategory, LayerConfig, LayerIdentity, RenderingLayer, RowStyle, UiInput,
};

pub const TYPE_ID: &str = "ROWTINT";

pub struct RowTintLayer {
    id: String,
    enabled: bool,
    pattern_raw: String,
    is_regex: bool,
    case_sensitive: bool,
    color: String,
    opacity: f32,
    compiled: Regex,
}

fn hex_to_rgba(hex: &str, opacity: f32) -> String {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 {
        return format!("rgba(255, 255, 0, {opacity})");
    }
    let r = u8::from_str_radix(&hex[0..2], 16).unwrap_or(0);
    let g = u8::from_str_radix(&hex[2..4], 16).unwrap_or(0);
    let b = u8::from_str_radix(&hex[4..6], 16).unwrap_or(0);
    format!("rgba({r}, {g}, {b}, {opacity})")
}

impl RowTintLayer {
    pub fn from_config(config: &LayerConfig) -> crate::error::EngineResult<Self> {
        let pattern_raw = config
            .string("pattern")
            .ok_or_else(|| missing_field(TYPE_ID, "pattern"))?;
        let is_regex = config.bool("isRegex").unwrap_or(false);
        let case_sensitive = config.bool("caseSensitive").unwrap_or(false);
        let color = config.string("color").unwrap_or_else(|| "#ff0000".to_string());
        let opacity = config
            .fields
            .get("opacity")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.2) as f32;

        let pattern = if is_regex {
            pattern_raw.clone()
        } else {
            regex::escape(&pattern_raw)
        };
        let compiled = RegexBuilder::new(&pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| crate::error::EngineError::InvalidLayerConfig {
                type_id: TYPE_ID.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            id: config.id.clone(),
            enabled: config.enabled,
            pattern_raw,
            is_regex,
            case_sensitive,
            color,
            opacity,
            compiled,
        })
    }

    pub fn category() -> LayerCategory {
        LayerCategory::Rendering
    }

    pub fn ui_schema() -> Vec<UiInput> {
        vec![
            UiInput::Search {
                key: "pattern".to_string(),
                label: "Pattern".to_string(),
            },
            UiInput::Color {
                key: "color".to_string(),
                label: "Tint color".to_string(),
                default: "#ff0000".to_string(),
            },
        ]
    }
}

impl LayerIdentity for RowTintLayer {
    fn id(&self) -> &str {
        &self.id
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn type_id(&self) -> &'static str {
        TYPE_ID
    }
}

impl RenderingLayer for RowTintLayer {
    fn se_query(&self) -> Option<crate::se::SeQuery> {
        let mode = if self.is_regex {
            crate::se::MatchMode::Regex
        } else {
            crate::se::MatchMode::Fixed
        };
        Some(crate::se::SeQuery::new(
            self.pattern_raw.clone(),
            mode,
            crate::se::SeFlags {
                case_insensitive: !self.case_sensitive,
                whole_word: false,
                invert: false,
            },
        ))
    }

    fn highlight_line(&self, _content: &str) -> Vec<HighlightSpan> {
        Vec::new()
    }

    fn row_style(&self, _physical_index: usize, content: &str) -> Option<RowStyle> {
        if self.compiled.is_match(content) {
            Some(RowStyle {
                background_color: Some(hex_to_rgba(&self.color, self.opacity)),
                ..Default::default()
            })
        } else {
            None
        }
    }

    fn ui_schema(&self) -> Vec<UiInput> {
        vec![
            UiInput::Search {
                key: "pattern".to_string(),
                label: "Pattern".to_string(),
            },
            UiInput::Color {
                key: "color".to_string(),
                label: "Tint color".to_string(),
                default: "#ff0000".to_string(),
            },
        ]
    }

    fn to_config(&self) -> LayerConfig {
        let mut fields = HashMap::new();
        fields.insert("pattern".to_string(), serde_json::json!(self.pattern_raw));
        fields.insert("isRegex".to_string(), serde_json::json!(self.is_regex));
        fields.insert("caseSensitive".to_string(), serde_json::json!(self.case_sensitive));
        fields.insert("color".to_string(), serde_json::json!(self.color));
        fields.insert("opacity".to_string(), serde_json::json!(self.opacity));
        LayerConfig {
            id: self.id.clone(),
            enabled: self.enabled,
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tints_rows_that_match() {
        let mut fields = HashMap::new();
        fields.insert("pattern".to_string(), json!("ERROR"));
        fields.insert("color".to_string(), json!("#ff0000"));
        let cfg = LayerConfig {
            id: "rt1".to_string(),
            enabled: true,
            fields,
        };
        let layer = RowTintLayer::from_config(&cfg).unwrap();
        assert!(layer.row_style(0, "ERROR happened").is_some());
        assert!(layer.row_style(0, "all fine").is_none());
    }

    #[test]
    fn hex_to_rgba_converts_correctly() {
        assert_eq!(hex_to_rgba("#ff0000", 0.5), "rgba(255, 0, 0, 0.5)");
    }
}
