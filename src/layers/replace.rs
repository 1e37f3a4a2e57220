//! Substring-Transform: a Logic-stage Processing layer that rewrites
//! content via regex substitution. Never filters; a malformed pattern
//! degrades to a no-op rather than erroring mid-pipeline, matching the
//! original's defensive behavior.

use regex::Regex;

use crate::layers::{missing_field, LayerCategory, LayerConfig, LayerIdentity, LayerStage, ProcessingLayer};

pub const TYPE_ID: &str = "REPLACE";

pub struct ReplaceLayer {
    id: String,
    enabled: bool,
    find: Option<Regex>,
    replace: String,
}

impl ReplaceLayer {
    pub fn from_config(config: &LayerConfig) -> crate::error::EngineResult<Self> {
        let find_pattern = config
            .string("find")
            .ok_or_else(|| missing_field(TYPE_ID, "find"))?;
        // A pattern that fails to compile is tolerated: the layer becomes
        // an identity transform rather than aborting the pipeline.
        let find = Regex::new(&find_pattern).ok();
        Ok(Self {
            id: config.id.clone(),
            enabled: config.enabled,
            find,
            replace: config.string("replace").unwrap_or_default(),
        })
    }

    pub fn category() -> LayerCategory {
        LayerCategory::Processing
    }

    pub fn ui_schema() -> Vec<crate::layers::UiInput> {
        vec![
            crate::layers::UiInput::Str {
                key: "find".to_string(),
                label: "Find (regex)".to_string(),
                default: String::new(),
            },
            crate::layers::UiInput::Str {
                key: "replace".to_string(),
                label: "Replace".to_string(),
                default: String::new(),
            },
        ]
    }
}

impl LayerIdentity for ReplaceLayer {
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

impl ProcessingLayer for ReplaceLayer {
    fn stage(&self) -> LayerStage {
        LayerStage::Logic
    }

    fn process_line(&mut self, content: &str) -> String {
        match &self.find {
            Some(re) => re.replace_all(content, self.replace.as_str()).into_owned(),
            None => content.to_string(),
        }
    }
}
