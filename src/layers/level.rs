//! Level-Filter: a Native-stage Processing layer that keeps lines matching
//! any of a set of named log levels (an OR of literal tokens), or hides
//! every line when no level is selected.

use crate::layers::{LayerCategory, LayerConfig, LayerIdentity, LayerStage, ProcessingLayer};
use crate::se::{MatchMode, SeFlags, SeQuery};

pub const TYPE_ID: &str = "LEVEL";

pub struct LevelLayer {
    id: String,
    enabled: bool,
    levels: Vec<String>,
}

impl LevelLayer {
    pub fn from_config(config: &LayerConfig) -> crate::error::EngineResult<Self> {
        Ok(Self {
            id: config.id.clone(),
            enabled: config.enabled,
            levels: config.string_vec("levels"),
        })
    }

    pub fn category() -> LayerCategory {
        LayerCategory::Processing
    }

    pub fn ui_schema() -> Vec<crate::layers::UiInput> {
        vec![crate::layers::UiInput::MultiSelect {
            key: "levels".to_string(),
            label: "Levels".to_string(),
            options: vec![
                "TRACE".to_string(),
                "DEBUG".to_string(),
                "INFO".to_string(),
                "WARN".to_string(),
                "ERROR".to_string(),
                "FATAL".to_string(),
            ],
        }]
    }
}

impl LayerIdentity for LevelLayer {
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

impl ProcessingLayer for LevelLayer {
    fn stage(&self) -> LayerStage {
        LayerStage::Native
    }

    fn se_query(&self) -> Option<SeQuery> {
        if self.levels.is_empty() {
            // No level selected: hide everything, matching the original's
            // `["-v", ".*"]` fallback.
            return Some(SeQuery::new(
                ".*",
                MatchMode::Regex,
                SeFlags {
                    invert: true,
                    ..Default::default()
                },
            ));
        }

        let pattern = self
            .levels
            .iter()
            .map(|l| regex::escape(l))
            .collect::<Vec<_>>()
            .join("|");

        Some(SeQuery::new(
            pattern,
            MatchMode::Regex,
            SeFlags {
                case_insensitive: true,
                ..Default::default()
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn config(levels: &[&str]) -> LayerConfig {
        let mut fields = HashMap::new();
        fields.insert(
            "levels".to_string(),
            json!(levels.iter().map(|s| s.to_string()).collect::<Vec<_>>()),
        );
        LayerConfig {
            id: "l1".to_string(),
            enabled: true,
            fields,
        }
    }

    #[test]
    fn ors_selected_levels() {
        let layer = LevelLayer::from_config(&config(&["ERROR", "WARN"])).unwrap();
        let query = layer.se_query().unwrap();
        assert_eq!(query.pattern, "ERROR|WARN");
        assert!(!query.flags.invert);
        assert!(query.flags.case_insensitive);
    }

    #[test]
    fn no_levels_hides_everything() {
        let layer = LevelLayer::from_config(&config(&[])).unwrap();
        let query = layer.se_query().unwrap();
        assert_eq!(query.pattern, ".*");
        assert!(query.flags.invert);
    }
}
