//! Highlight: a Rendering layer that returns colored spans for each match
//! of a pattern within a line's post-transform content.

use regex::{Regex, RegexBuilder};
use std::collections::HashMap;

use crate::layers::{
    missing_field, HighlightSpan, LayerCategory, LayerConfig, LayerIdentity, RenderingLayer, UiInput,
};

pub const TYPE_ID: &str = "HIGHLIGHT";

pub struct HighlightLayer {
    id: String,
    enabled: bool,
    pattern_raw: String,
    is_regex: bool,
    case_sensitive: bool,
    color: String,
    opacity: f32,
    compiled: Regex,
}

impl HighlightLayer {
    pub fn from_config(config: &LayerConfig) -> crate::error::EngineResult<Self> {
        let pattern_raw = config
            .string("pattern")
            .ok_or_else(|| missing_field(TYPE_ID, "pattern"))?;
        let is_regex = config.bool("isRegex").unwrap_or(false);
        let case_sensitive = config.bool("caseSensitive").unwrap_or(false);
        let color = config.string("color").unwrap_or_else(|| "#ffff00".to_string());
        let opacity = config
            .fields
            .get("opacity")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.4) as f32;

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
                label: "Color".to_string(),
                default: "#ffff00".to_string(),
            },
            UiInput::Range {
                key: "opacity".to_string(),
                label: "Opacity".to_string(),
                min: 0,
                max: 100,
                default: 40,
            },
        ]
    }
}

impl LayerIdentity for HighlightLayer {
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

impl RenderingLayer for HighlightLayer {
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

    fn highlight_line(&self, content: &str) -> Vec<HighlightSpan> {
        self.compiled
            .find_iter(content)
            .map(|m| HighlightSpan {
                start: m.start(),
                end: m.end(),
                color: self.color.clone(),
                opacity: self.opacity,
                is_search: false,
            })
            .collect()
    }

    fn ui_schema(&self) -> Vec<UiInput> {
        vec![
            UiInput::Search {
                key: "pattern".to_string(),
                label: "Pattern".to_string(),
            },
            UiInput::Color {
                key: "color".to_string(),
                label: "Color".to_string(),
                default: "#ffff00".to_string(),
            },
            UiInput::Range {
                key: "opacity".to_string(),
                label: "Opacity".to_string(),
                min: 0,
                max: 100,
                default: 40,
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
