//! Time-Range: a Logic-stage Processing layer that extracts a timestamp
//! from each line via a regex capture group, parses it against a format
//! string, and keeps only lines whose timestamp falls within `[start, end]`.

use chrono::NaiveDateTime;
use regex::Regex;

use crate::layers::{missing_field, LayerCategory, LayerConfig, LayerIdentity, LayerStage, ProcessingLayer};

pub const TYPE_ID: &str = "TIME_RANGE";

pub struct TimeRangeLayer {
    id: String,
    enabled: bool,
    pattern: Regex,
    format: String,
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl TimeRangeLayer {
    pub fn from_config(config: &LayerConfig) -> crate::error::EngineResult<Self> {
        let pattern_str = config
            .string("pattern")
            .ok_or_else(|| missing_field(TYPE_ID, "pattern"))?;
        let format = config
            .string("format")
            .ok_or_else(|| missing_field(TYPE_ID, "format"))?;
        let start_str = config
            .string("start")
            .ok_or_else(|| missing_field(TYPE_ID, "start"))?;
        let end_str = config
            .string("end")
            .ok_or_else(|| missing_field(TYPE_ID, "end"))?;

        let pattern = Regex::new(&pattern_str).map_err(|e| crate::error::EngineError::InvalidLayerConfig {
            type_id: TYPE_ID.to_string(),
            message: e.to_string(),
        })?;
        let start = NaiveDateTime::parse_from_str(&start_str, &format).map_err(|e| {
            crate::error::EngineError::InvalidLayerConfig {
                type_id: TYPE_ID.to_string(),
                message: format!("invalid start timestamp: {e}"),
            }
        })?;
        let end = NaiveDateTime::parse_from_str(&end_str, &format).map_err(|e| {
            crate::error::EngineError::InvalidLayerConfig {
                type_id: TYPE_ID.to_string(),
                message: format!("invalid end timestamp: {e}"),
            }
        })?;

        Ok(Self {
            id: config.id.clone(),
            enabled: config.enabled,
            pattern,
            format,
            start,
            end,
        })
    }

    pub fn category() -> LayerCategory {
        LayerCategory::Processing
    }

    pub fn ui_schema() -> Vec<crate::layers::UiInput> {
        vec![
            crate::layers::UiInput::Str {
                key: "pattern".to_string(),
                label: "Timestamp pattern".to_string(),
                default: r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})".to_string(),
            },
            crate::layers::UiInput::Str {
                key: "format".to_string(),
                label: "strptime format".to_string(),
                default: "%Y-%m-%d %H:%M:%S".to_string(),
            },
            crate::layers::UiInput::Str {
                key: "start".to_string(),
                label: "Start".to_string(),
                default: String::new(),
            },
            crate::layers::UiInput::Str {
                key: "end".to_string(),
                label: "End".to_string(),
                default: String::new(),
            },
        ]
    }
}

impl LayerIdentity for TimeRangeLayer {
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

impl ProcessingLayer for TimeRangeLayer {
    fn stage(&self) -> LayerStage {
        LayerStage::Logic
    }

    fn filter_line(&mut self, content: &str, _physical_index: usize) -> bool {
        let Some(captures) = self.pattern.captures(content) else {
            return false;
        };
        let Some(group) = captures.get(1) else {
            return false;
        };
        let Ok(stamp) = NaiveDateTime::parse_from_str(group.as_str(), &self.format) else {
            return false;
        };
        stamp >= self.start && stamp <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn config() -> LayerConfig {
        let mut fields = HashMap::new();
        fields.insert(
            "pattern".to_string(),
            json!(r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})"),
        );
        fields.insert("format".to_string(), json!("%Y-%m-%d %H:%M:%S"));
        fields.insert("start".to_string(), json!("2024-01-01 00:00:00"));
        fields.insert("end".to_string(), json!("2024-01-01 12:00:00"));
        LayerConfig {
            id: "t1".to_string(),
            enabled: true,
            fields,
        }
    }

    #[test]
    fn keeps_lines_within_window() {
        let mut layer = TimeRangeLayer::from_config(&config()).unwrap();
        assert!(layer.filter_line("2024-01-01 06:00:00 hello", 0));
        assert!(!layer.filter_line("2024-01-01 23:00:00 hello", 1));
        assert!(!layer.filter_line("no timestamp here", 2));
    }
}
