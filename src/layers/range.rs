//! Range: a Logic-stage Processing layer that keeps only the nth..mth rows
//! reaching it, counted from 1 over whatever upstream layers have already
//! let through (not over physical line number).

use crate::layers::{missing_field, LayerCategory, LayerConfig, LayerIdentity, LayerStage, ProcessingLayer};

pub const TYPE_ID: &str = "RANGE";

pub struct RangeLayer {
    id: String,
    enabled: bool,
    start_line: i64,
    end_line: i64,
    current_count: i64,
}

impl RangeLayer {
    pub fn from_config(config: &LayerConfig) -> crate::error::EngineResult<Self> {
        let start_line = config
            .i64("startLine")
            .ok_or_else(|| missing_field(TYPE_ID, "startLine"))?;
        let end_line = config
            .i64("endLine")
            .ok_or_else(|| missing_field(TYPE_ID, "endLine"))?;
        Ok(Self {
            id: config.id.clone(),
            enabled: config.enabled,
            start_line,
            end_line,
            current_count: 0,
        })
    }

    pub fn category() -> LayerCategory {
        LayerCategory::Processing
    }

    pub fn ui_schema() -> Vec<crate::layers::UiInput> {
        vec![
            crate::layers::UiInput::Int {
                key: "startLine".to_string(),
                label: "Start line".to_string(),
                default: 1,
            },
            crate::layers::UiInput::Int {
                key: "endLine".to_string(),
                label: "End line".to_string(),
                default: 100,
            },
        ]
    }
}

impl LayerIdentity for RangeLayer {
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

impl ProcessingLayer for RangeLayer {
    fn stage(&self) -> LayerStage {
        LayerStage::Logic
    }

    fn filter_line(&mut self, _content: &str, _physical_index: usize) -> bool {
        self.current_count += 1;
        self.current_count >= self.start_line && self.current_count <= self.end_line
    }

    fn reset(&mut self) {
        self.current_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn config(start: i64, end: i64) -> LayerConfig {
        let mut fields = HashMap::new();
        fields.insert("startLine".to_string(), json!(start));
        fields.insert("endLine".to_string(), json!(end));
        LayerConfig {
            id: "r1".to_string(),
            enabled: true,
            fields,
        }
    }

    #[test]
    fn keeps_only_the_nth_through_mth_line_seen() {
        let mut layer = RangeLayer::from_config(&config(2, 3)).unwrap();
        let kept: Vec<bool> = (0..5)
            .map(|i| layer.filter_line("line", i))
            .collect();
        assert_eq!(kept, vec![false, true, true, false, false]);
    }

    #[test]
    fn reset_restarts_the_counter() {
        let mut layer = RangeLayer::from_config(&config(1, 1)).unwrap();
        assert!(layer.filter_line("a", 0));
        assert!(!layer.filter_line("b", 1));
        layer.reset();
        assert!(layer.filter_line("c", 0));
    }
}
