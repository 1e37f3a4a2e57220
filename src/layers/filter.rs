//! Substring-Filter: a Native-stage Processing layer. Keeps or drops lines
//! based on a single pattern; compiles directly to a substring-engine
//! query rather than evaluating anything in-process.

use crate::layers::{missing_field, LayerCategory, LayerConfig, LayerIdentity, LayerStage, ProcessingLayer};
use crate::se::{MatchMode, SeFlags, SeQuery};

pub const TYPE_ID: &str = "FILTER";

pub struct FilterLayer {
    id: String,
    enabled: bool,
    pattern: String,
    is_regex: bool,
    case_sensitive: bool,
    whole_word: bool,
    invert: bool,
}

impl FilterLayer {
    pub fn from_config(config: &LayerConfig) -> crate::error::EngineResult<Self> {
        let pattern = config
            .string("pattern")
            .ok_or_else(|| missing_field(TYPE_ID, "pattern"))?;
        Ok(Self {
            id: config.id.clone(),
            enabled: config.enabled,
            pattern,
            is_regex: config.bool("isRegex").unwrap_or(false),
            case_sensitive: config.bool("caseSensitive").unwrap_or(false),
            whole_word: config.bool("wholeWord").unwrap_or(false),
            invert: config.bool("invert").unwrap_or(false),
        })
    }

    pub fn category() -> LayerCategory {
        LayerCategory::Processing
    }

    pub fn ui_schema() -> Vec<crate::layers::UiInput> {
        vec![
            crate::layers::UiInput::Search {
                key: "pattern".to_string(),
                label: "Pattern".to_string(),
            },
            crate::layers::UiInput::Bool {
                key: "invert".to_string(),
                label: "Invert".to_string(),
                default: false,
            },
        ]
    }
}

impl LayerIdentity for FilterLayer {
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

impl ProcessingLayer for FilterLayer {
    fn stage(&self) -> LayerStage {
        LayerStage::Native
    }

    fn se_query(&self) -> Option<SeQuery> {
        Some(SeQuery::new(
            self.pattern.clone(),
            if self.is_regex {
                MatchMode::Regex
            } else {
                MatchMode::Fixed
            },
            SeFlags {
                case_insensitive: !self.case_sensitive,
                whole_word: self.whole_word,
                invert: self.invert,
            },
        ))
    }
}
