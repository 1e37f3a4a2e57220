//! Layer type system: the common interface every Processing and Rendering
//! layer implements, plus the UI-schema types used to describe a layer's
//! configuration surface to a host application.

pub mod bookmark;
pub mod filter;
pub mod highlight;
pub mod level;
pub mod range;
pub mod replace;
pub mod rowtint;
pub mod time_range;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::EngineResult;

/// Whether a layer affects visibility/content, or only decoration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerCategory {
    Processing,
    Rendering,
}

/// Where a Processing layer's work happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerStage {
    /// Delegates to the substring engine.
    Native,
    /// Implemented in-process; may cascade a transform into the next layer.
    Logic,
}

/// Raw, validated configuration for a layer instance, as handed to a
/// `from_config` constructor. Keys are the layer type's UI-schema field
/// names; values are already-parsed JSON.
#[derive(Debug, Clone, Default)]
pub struct LayerConfig {
    pub id: String,
    pub enabled: bool,
    pub fields: HashMap<String, Value>,
}

impl LayerConfig {
    pub fn string(&self, key: &str) -> Option<String> {
        self.fields.get(key)?.as_str().map(|s| s.to_string())
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.fields.get(key)?.as_bool()
    }

    pub fn i64(&self, key: &str) -> Option<i64> {
        self.fields.get(key)?.as_i64()
    }

    pub fn string_vec(&self, key: &str) -> Vec<String> {
        self.fields
            .get(key)
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A typed UI input, mirroring the original registry's `Input` subclasses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum UiInput {
    Str { key: String, label: String, default: String },
    Int { key: String, label: String, default: i64 },
    Range { key: String, label: String, min: i64, max: i64, default: i64 },
    Bool { key: String, label: String, default: bool },
    Dropdown { key: String, label: String, options: Vec<String>, default: String },
    Color { key: String, label: String, default: String },
    MultiSelect { key: String, label: String, options: Vec<String> },
    Search { key: String, label: String },
}

/// One highlight span produced for a line's post-transform content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighlightSpan {
    pub start: usize,
    pub end: usize,
    pub color: String,
    pub opacity: f32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_search: bool,
}

/// Row-level decoration a rendering layer may contribute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowStyle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub border_left: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_marked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookmark_comment: Option<String>,
}

impl RowStyle {
    pub fn merge(&mut self, other: RowStyle) {
        if other.background_color.is_some() {
            self.background_color = other.background_color;
        }
        if other.border_left.is_some() {
            self.border_left = other.border_left;
        }
        if other.is_marked.is_some() {
            self.is_marked = other.is_marked;
        }
        if other.bookmark_comment.is_some() {
            self.bookmark_comment = other.bookmark_comment;
        }
    }
}

/// Common identity every layer instance exposes regardless of category.
pub trait LayerIdentity {
    fn id(&self) -> &str;
    fn enabled(&self) -> bool;
    fn type_id(&self) -> &'static str;
}

/// A Processing layer: may filter visibility (via `filter_line`) and/or
/// transform content (via `process_line`). Native-stage layers compile
/// their filter behavior to a substring-engine query instead of
/// implementing `filter_line` directly; see [`LayerStage`].
pub trait ProcessingLayer: LayerIdentity + Send {
    fn stage(&self) -> LayerStage;

    /// Substring-engine query for a Native-stage layer. Only called when
    /// `stage() == LayerStage::Native`.
    fn se_query(&self) -> Option<crate::se::SeQuery> {
        None
    }

    /// Transform the line's content. Default: identity.
    fn process_line(&mut self, content: &str) -> String {
        content.to_string()
    }

    /// Decide whether a (possibly already-transformed) line survives.
    /// Only called for Logic-stage layers; Native-stage layers filter via
    /// their `se_query`.
    fn filter_line(&mut self, _content: &str, _physical_index: usize) -> bool {
        true
    }

    /// Reset any internal per-run state (e.g. Range's line counter).
    fn reset(&mut self) {}
}

/// A Rendering layer: contributes highlight spans and/or a row style but
/// never affects which rows are visible.
pub trait RenderingLayer: LayerIdentity + Send {
    /// Substring-engine query equivalent to this layer's pattern, used by
    /// the Stats Worker to measure match counts/distribution alongside
    /// Native Processing layers. `None` for layers with no single pattern
    /// (e.g. row tint driven by something other than a plain match).
    fn se_query(&self) -> Option<crate::se::SeQuery> {
        None
    }

    fn highlight_line(&self, _content: &str) -> Vec<HighlightSpan> {
        Vec::new()
    }

    fn row_style(&self, _physical_index: usize, _content: &str) -> Option<RowStyle> {
        None
    }

    fn ui_schema(&self) -> Vec<UiInput> {
        Vec::new()
    }

    fn to_config(&self) -> LayerConfig;
}

/// Construction error shorthand used by every layer's `from_config`.
pub fn missing_field(type_id: &str, field: &str) -> crate::error::EngineError {
    crate::error::EngineError::InvalidLayerConfig {
        type_id: type_id.to_string(),
        message: format!("missing required field `{field}`"),
    }
}

pub type LayerResult<T> = EngineResult<T>;

/// A constructed layer, one or the other category. The registry and
/// session juggle these uniformly; individual layer types never appear
/// outside their own module and this enum.
pub enum LayerInstance {
    Processing(Box<dyn ProcessingLayer>),
    Rendering(Box<dyn RenderingLayer>),
}

impl LayerInstance {
    pub fn category(&self) -> LayerCategory {
        match self {
            LayerInstance::Processing(_) => LayerCategory::Processing,
            LayerInstance::Rendering(_) => LayerCategory::Rendering,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            LayerInstance::Processing(l) => l.id(),
            LayerInstance::Rendering(l) => l.id(),
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            LayerInstance::Processing(l) => l.enabled(),
            LayerInstance::Rendering(l) => l.enabled(),
        }
    }

    pub fn type_id(&self) -> &'static str {
        match self {
            LayerInstance::Processing(l) => l.type_id(),
            LayerInstance::Rendering(l) => l.type_id(),
        }
    }

    /// Substring-engine query this layer contributes to the Stats Worker,
    /// regardless of category. Native Processing layers and queryable
    /// Rendering layers return `Some`; everything else `None`.
    pub fn stats_query(&self) -> Option<crate::se::SeQuery> {
        match self {
            LayerInstance::Processing(l) if l.stage() == LayerStage::Native => l.se_query(),
            LayerInstance::Processing(_) => None,
            LayerInstance::Rendering(l) => l.se_query(),
        }
    }

    pub fn into_processing(self) -> Option<Box<dyn ProcessingLayer>> {
        match self {
            LayerInstance::Processing(l) => Some(l),
            LayerInstance::Rendering(_) => None,
        }
    }

    pub fn into_rendering(self) -> Option<Box<dyn RenderingLayer>> {
        match self {
            LayerInstance::Rendering(l) => Some(l),
            LayerInstance::Processing(_) => None,
        }
    }
}
