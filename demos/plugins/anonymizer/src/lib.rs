//! Anonymizer: an example Logic-stage Processing layer shipped as a
//! compiled plugin rather than built into the engine, demonstrating the
//! plugin ABI. Masks matches of a pattern (by default, IPv4 addresses)
//! with a fixed replacement token.

use regex::Regex;

use loglayer_engine::error::EngineResult;
use loglayer_engine::layers::{missing_field, LayerCategory, LayerConfig, LayerIdentity, LayerInstance, LayerStage, ProcessingLayer, UiInput};
use loglayer_engine::loglayer_plugin;
use loglayer_engine::plugin_abi::PluginLayerDescriptor;

pub const TYPE_ID: &str = "ANONYMIZER";
const DEFAULT_PATTERN: &str = r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}";
const MASK: &str = "[MASKED]";

pub struct AnonymizerLayer {
    id: String,
    enabled: bool,
    pattern: Option<Regex>,
}

impl AnonymizerLayer {
    fn from_config(config: &LayerConfig) -> EngineResult<Self> {
        let pattern_raw = config.string("pattern").unwrap_or_else(|| DEFAULT_PATTERN.to_string());
        if pattern_raw.is_empty() {
            return Err(missing_field(TYPE_ID, "pattern"));
        }
        // A pattern that fails to compile degrades to a no-op, matching
        // the engine's own built-in Logic-stage layers.
        let pattern = Regex::new(&pattern_raw).ok();
        Ok(Self {
            id: config.id.clone(),
            enabled: config.enabled,
            pattern,
        })
    }

    fn ui_schema() -> Vec<UiInput> {
        vec![UiInput::Search {
            key: "pattern".to_string(),
            label: "Pattern to Mask".to_string(),
        }]
    }

    fn construct(config: &LayerConfig) -> EngineResult<LayerInstance> {
        let layer = Self::from_config(config)?;
        Ok(LayerInstance::Processing(Box::new(layer)))
    }
}

impl LayerIdentity for AnonymizerLayer {
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

impl ProcessingLayer for AnonymizerLayer {
    fn stage(&self) -> LayerStage {
        LayerStage::Logic
    }

    fn process_line(&mut self, content: &str) -> String {
        match &self.pattern {
            Some(re) => re.replace_all(content, MASK).into_owned(),
            None => content.to_string(),
        }
    }
}

loglayer_plugin!(PluginLayerDescriptor {
    type_id: TYPE_ID.to_string(),
    category: LayerCategory::Processing,
    schema: AnonymizerLayer::ui_schema(),
    factory: AnonymizerLayer::construct,
});

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn config(pattern: &str) -> LayerConfig {
        let mut fields = HashMap::new();
        fields.insert("pattern".to_string(), json!(pattern));
        LayerConfig {
            id: "anon1".to_string(),
            enabled: true,
            fields,
        }
    }

    #[test]
    fn masks_ipv4_addresses() {
        let mut layer = AnonymizerLayer::from_config(&config(DEFAULT_PATTERN)).unwrap();
        assert_eq!(
            layer.process_line("connection from 10.0.0.1 refused"),
            "connection from [MASKED] refused"
        );
    }

    #[test]
    fn invalid_pattern_is_identity() {
        let mut layer = AnonymizerLayer::from_config(&config("(unterminated")).unwrap();
        assert_eq!(layer.process_line("unchanged"), "unchanged");
    }

    #[test]
    fn entry_point_registers_one_descriptor() {
        let descriptors = register_loglayer_plugin();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].type_id, TYPE_ID);
    }
}
