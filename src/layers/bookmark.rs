//! Bookmark: the one system-managed Rendering layer. A session keeps a
//! single hidden instance of this layer that a `sync_decorations` call
//! never replaces; it is mutated only through the dedicated bookmark
//! verbs (`toggle_bookmark`, `update_bookmark_comment`, `clear_bookmarks`).

use std::collections::BTreeMap;

use crate::layers::{HighlightSpan, LayerConfig, LayerIdentity, RenderingLayer, RowStyle, UiInput};

pub const TYPE_ID: &str = "BOOKMARK";

/// Direction for a nearest-bookmark query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Prev,
}

/// Physical line index -> optional comment. Presence in the map means the
/// line is bookmarked; the value is `None` for a bookmark with no comment.
pub struct BookmarkLayer {
    id: String,
    marks: BTreeMap<usize, Option<String>>,
}

impl BookmarkLayer {
    pub fn new() -> Self {
        Self {
            id: "system:bookmark".to_string(),
            marks: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &LayerConfig) -> Self {
        let mut marks = BTreeMap::new();
        if let Some(obj) = config.fields.get("marks").and_then(|v| v.as_object()) {
            for (k, v) in obj {
                if let Ok(idx) = k.parse::<usize>() {
                    marks.insert(idx, v.as_str().map(|s| s.to_string()));
                }
            }
        }
        Self {
            id: config.id.clone(),
            marks,
        }
    }

    /// Flips the bookmark on `line`. Returns the new state (`true` = now
    /// bookmarked). Calling this twice in a row is a no-op on the set.
    pub fn toggle(&mut self, line: usize) -> bool {
        if self.marks.remove(&line).is_some() {
            false
        } else {
            self.marks.insert(line, None);
            true
        }
    }

    pub fn set_comment(&mut self, line: usize, text: Option<String>) {
        self.marks.insert(line, text);
    }

    pub fn clear(&mut self) {
        self.marks.clear();
    }

    pub fn is_marked(&self, line: usize) -> bool {
        self.marks.contains_key(&line)
    }

    pub fn all(&self) -> Vec<(usize, Option<String>)> {
        self.marks.iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    /// Nearest bookmarked physical line relative to `current`, wrapping
    /// around the ends of the set. `None` if no bookmarks exist.
    pub fn nearest(&self, current: usize, direction: Direction) -> Option<usize> {
        if self.marks.is_empty() {
            return None;
        }
        match direction {
            Direction::Next => self
                .marks
                .range((std::ops::Bound::Excluded(current), std::ops::Bound::Unbounded))
                .next()
                .map(|(k, _)| *k)
                .or_else(|| self.marks.keys().next().copied()),
            Direction::Prev => self
                .marks
                .range(..current)
                .next_back()
                .map(|(k, _)| *k)
                .or_else(|| self.marks.keys().next_back().copied()),
        }
    }
}

impl Default for BookmarkLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerIdentity for BookmarkLayer {
    fn id(&self) -> &str {
        &self.id
    }

    fn enabled(&self) -> bool {
        true
    }

    fn type_id(&self) -> &'static str {
        TYPE_ID
    }
}

impl RenderingLayer for BookmarkLayer {
    fn highlight_line(&self, _content: &str) -> Vec<HighlightSpan> {
        Vec::new()
    }

    fn row_style(&self, physical_index: usize, _content: &str) -> Option<RowStyle> {
        let comment = self.marks.get(&physical_index)?;
        Some(RowStyle {
            is_marked: Some(true),
            bookmark_comment: comment.clone(),
            ..Default::default()
        })
    }

    fn ui_schema(&self) -> Vec<UiInput> {
        Vec::new()
    }

    fn to_config(&self) -> LayerConfig {
        let mut fields = std::collections::HashMap::new();
        let marks_json: serde_json::Map<String, serde_json::Value> = self
            .marks
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    v.clone().map(serde_json::Value::String).unwrap_or(serde_json::Value::Null),
                )
            })
            .collect();
        fields.insert("marks".to_string(), serde_json::Value::Object(marks_json));
        LayerConfig {
            id: self.id.clone(),
            enabled: true,
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_twice_is_a_no_op() {
        let mut layer = BookmarkLayer::new();
        assert!(layer.toggle(10));
        assert!(!layer.toggle(10));
        assert!(!layer.is_marked(10));
    }

    #[test]
    fn nearest_wraps_around() {
        let mut layer = BookmarkLayer::new();
        layer.toggle(5);
        layer.toggle(20);
        assert_eq!(layer.nearest(5, Direction::Next), Some(20));
        assert_eq!(layer.nearest(20, Direction::Next), Some(5));
        assert_eq!(layer.nearest(5, Direction::Prev), Some(20));
        assert_eq!(layer.nearest(20, Direction::Prev), Some(5));
    }

    #[test]
    fn comment_round_trips_through_config() {
        let mut layer = BookmarkLayer::new();
        layer.toggle(3);
        layer.set_comment(3, Some("needs review".to_string()));
        let config = layer.to_config();
        let restored = BookmarkLayer::from_config(&config);
        assert!(restored.is_marked(3));
        assert_eq!(restored.marks.get(&3).unwrap().as_deref(), Some("needs review"));
    }
}
