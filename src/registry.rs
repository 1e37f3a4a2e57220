//! Layer Registry (§4.3): holds every known layer type keyed by its string
//! type id, whether built in or plugin-provided, and constructs instances
//! from validated config. `BOOKMARK` is deliberately absent from the
//! listing: it is system-managed (§9) and never appears in a UI-driven
//! `create_instance` call.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use libloading::Library;

use crate::error::{EngineError, EngineResult};
use crate::layers::{self, LayerCategory, LayerConfig, LayerInstance, UiInput};
use crate::plugin_abi::{self, LayerFactory};

/// One registered layer type: how to list it in the UI and how to build
/// an instance from config.
struct LayerDescriptor {
    category: LayerCategory,
    schema: Vec<UiInput>,
    factory: LayerFactory,
    plugin_flag: bool,
}

/// A type id plus the schema the UI needs to render its configuration
/// form, as exposed by [`LayerRegistry::list`].
#[derive(Debug, Clone)]
pub struct LayerTypeInfo {
    pub type_id: String,
    pub category: LayerCategory,
    pub schema: Vec<UiInput>,
}

pub struct LayerRegistry {
    descriptors: HashMap<String, LayerDescriptor>,
    plugin_dir: Option<PathBuf>,
    /// Kept alive so factory function pointers borrowed from a plugin stay
    /// valid for as long as the registry exists.
    plugin_libs: Vec<Library>,
}

fn filter_factory(config: &LayerConfig) -> EngineResult<LayerInstance> {
    Ok(LayerInstance::Processing(Box::new(layers::filter::FilterLayer::from_config(config)?)))
}

fn level_factory(config: &LayerConfig) -> EngineResult<LayerInstance> {
    Ok(LayerInstance::Processing(Box::new(layers::level::LevelLayer::from_config(config)?)))
}

fn range_factory(config: &LayerConfig) -> EngineResult<LayerInstance> {
    Ok(LayerInstance::Processing(Box::new(layers::range::RangeLayer::from_config(config)?)))
}

fn time_range_factory(config: &LayerConfig) -> EngineResult<LayerInstance> {
    Ok(LayerInstance::Processing(Box::new(layers::time_range::TimeRangeLayer::from_config(config)?)))
}

fn replace_factory(config: &LayerConfig) -> EngineResult<LayerInstance> {
    Ok(LayerInstance::Processing(Box::new(layers::replace::ReplaceLayer::from_config(config)?)))
}

fn highlight_factory(config: &LayerConfig) -> EngineResult<LayerInstance> {
    Ok(LayerInstance::Rendering(Box::new(layers::highlight::HighlightLayer::from_config(config)?)))
}

fn rowtint_factory(config: &LayerConfig) -> EngineResult<LayerInstance> {
    Ok(LayerInstance::Rendering(Box::new(layers::rowtint::RowTintLayer::from_config(config)?)))
}

impl LayerRegistry {
    /// A registry with every built-in layer type registered and no plugin
    /// directory configured.
    pub fn new() -> Self {
        let mut registry = Self {
            descriptors: HashMap::new(),
            plugin_dir: None,
            plugin_libs: Vec::new(),
        };
        registry.register_builtins();
        registry
    }

    /// Like [`Self::new`] but also performs an initial plugin-directory
    /// scan.
    pub fn with_plugin_dir(plugin_dir: impl Into<PathBuf>) -> EngineResult<Self> {
        let mut registry = Self::new();
        registry.plugin_dir = Some(plugin_dir.into());
        registry.reload_plugins()?;
        Ok(registry)
    }

    fn register_builtins(&mut self) {
        self.descriptors.insert(
            layers::filter::TYPE_ID.to_string(),
            LayerDescriptor {
                category: LayerCategory::Processing,
                schema: layers::filter::FilterLayer::ui_schema(),
                factory: filter_factory,
                plugin_flag: false,
            },
        );
        self.descriptors.insert(
            layers::level::TYPE_ID.to_string(),
            LayerDescriptor {
                category: LayerCategory::Processing,
                schema: layers::level::LevelLayer::ui_schema(),
                factory: level_factory,
                plugin_flag: false,
            },
        );
        self.descriptors.insert(
            layers::range::TYPE_ID.to_string(),
            LayerDescriptor {
                category: LayerCategory::Processing,
                schema: layers::range::RangeLayer::ui_schema(),
                factory: range_factory,
                plugin_flag: false,
            },
        );
        self.descriptors.insert(
            layers::time_range::TYPE_ID.to_string(),
            LayerDescriptor {
                category: LayerCategory::Processing,
                schema: layers::time_range::TimeRangeLayer::ui_schema(),
                factory: time_range_factory,
                plugin_flag: false,
            },
        );
        self.descriptors.insert(
            layers::replace::TYPE_ID.to_string(),
            LayerDescriptor {
                category: LayerCategory::Processing,
                schema: layers::replace::ReplaceLayer::ui_schema(),
                factory: replace_factory,
                plugin_flag: false,
            },
        );
        self.descriptors.insert(
            layers::highlight::TYPE_ID.to_string(),
            LayerDescriptor {
                category: LayerCategory::Rendering,
                schema: layers::highlight::HighlightLayer::ui_schema(),
                factory: highlight_factory,
                plugin_flag: false,
            },
        );
        self.descriptors.insert(
            layers::rowtint::TYPE_ID.to_string(),
            LayerDescriptor {
                category: LayerCategory::Rendering,
                schema: layers::rowtint::RowTintLayer::ui_schema(),
                factory: rowtint_factory,
                plugin_flag: false,
            },
        );
    }

    /// Scans the configured plugin directory, loading every file whose
    /// name doesn't start with `_`. Existing plugin-provided types are
    /// replaced wholesale; built-ins are untouched.
    pub fn reload_plugins(&mut self) -> EngineResult<()> {
        let Some(dir) = self.plugin_dir.clone() else {
            return Ok(());
        };
        self.descriptors.retain(|_, d| !d.is_plugin());
        self.plugin_libs.clear();

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(()),
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if file_name.starts_with('_') {
                continue;
            }
            if !is_plugin_file(&path) {
                continue;
            }
            self.load_plugin_file(&path)?;
        }
        Ok(())
    }

    fn load_plugin_file(&mut self, path: &Path) -> EngineResult<()> {
        let (lib, descriptors) = plugin_abi::load_plugin(path)?;
        for d in descriptors {
            self.descriptors.insert(
                d.type_id,
                LayerDescriptor {
                    category: d.category,
                    schema: d.schema,
                    factory: d.factory,
                    plugin_flag: false,
                }
                .mark_plugin(),
            );
        }
        self.plugin_libs.push(lib);
        Ok(())
    }

    /// UI-facing listing of every non-system layer type.
    pub fn list(&self) -> Vec<LayerTypeInfo> {
        let mut out: Vec<LayerTypeInfo> = self
            .descriptors
            .iter()
            .map(|(type_id, d)| LayerTypeInfo {
                type_id: type_id.clone(),
                category: d.category,
                schema: d.schema.clone(),
            })
            .collect();
        out.sort_by(|a, b| a.type_id.cmp(&b.type_id));
        out
    }

    /// Constructs a layer instance for `type_id` from `config`.
    pub fn create_instance(&self, type_id: &str, config: &LayerConfig) -> EngineResult<LayerInstance> {
        let descriptor = self
            .descriptors
            .get(type_id)
            .ok_or_else(|| EngineError::InvalidLayerConfig {
                type_id: type_id.to_string(),
                message: "unknown layer type".to_string(),
            })?;
        (descriptor.factory)(config)
    }
}

impl Default for LayerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerDescriptor {
    fn is_plugin(&self) -> bool {
        self.plugin_flag
    }

    fn mark_plugin(mut self) -> Self {
        self.plugin_flag = true;
        self
    }
}

fn is_plugin_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("so") | Some("dll") | Some("dylib")
    )
}
