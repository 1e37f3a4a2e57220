//! Per-file session state (§3 "File Session"): the mmap'd line index,
//! active layer instances, the visible/search tables, the decoration
//! cache, and the worker-cancellation table a session's own pipeline and
//! stats workers are tracked under.
//!
//! A session is always accessed through `Arc<Session>`; workers hold
//! `Weak<Session>` handles (§9 "mmap lifetime across threads") so a
//! `close_file` while a worker is mid-run leaves the worker with nothing
//! to write back into rather than a dangling pointer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;

use crate::cache::{CachedRow, DecorationCache};
use crate::index::line_index::LineIndex;
use crate::layers::bookmark::BookmarkLayer;
use crate::layers::{HighlightSpan, LayerStage, ProcessingLayer, RenderingLayer, RowStyle};
use crate::se::{self, MatchMode, SeFlags, SeQuery};

/// Truncation ceiling for a single displayed row (§4.4 "Edge cases"). The
/// substring engine still matches against the untruncated raw bytes; only
/// the text handed back to the UI is cut.
pub const TRUNCATE_BYTES: usize = 10_000;
const TRUNCATE_SENTINEL: &str = "... [truncated]";

/// Search configuration active on a session, or absent (§3).
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub query: String,
    pub is_regex: bool,
    pub case_sensitive: bool,
    pub whole_word: bool,
}

impl SearchConfig {
    pub fn to_se_query(&self) -> SeQuery {
        SeQuery::new(
            self.query.clone(),
            if self.is_regex { MatchMode::Regex } else { MatchMode::Fixed },
            SeFlags {
                case_insensitive: !self.case_sensitive,
                whole_word: self.whole_word,
                invert: false,
            },
        )
    }
}

/// Which background role a worker fills for a session. At most one worker
/// per `(session, role)` is observable at a time (§5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerRole {
    Pipeline,
    Stats,
}

/// One fully-decorated row as handed back by `read_processed_lines` (§4.8).
#[derive(Debug, Clone, Serialize)]
pub struct RenderedRow {
    pub index: u64,
    pub content: String,
    pub highlights: Vec<HighlightSpan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_style: Option<RowStyle>,
}

/// Outcome of one Pipeline Worker run (§4.4), applied atomically.
pub struct PipelineOutcome {
    pub visible_indices: Option<Vec<u64>>,
    pub search_matches: Vec<u64>,
}

pub struct Session {
    pub file_id: String,
    pub path: PathBuf,
    pub name: String,

    line_index: RwLock<Option<Arc<LineIndex>>>,
    visible_indices: RwLock<Option<Arc<Vec<u64>>>>,
    search_matches: RwLock<Arc<Vec<u64>>>,
    search_config: RwLock<Option<SearchConfig>>,

    processing_layers: Mutex<Vec<Box<dyn ProcessingLayer>>>,
    rendering_layers: RwLock<Vec<Box<dyn RenderingLayer>>>,
    bookmark: RwLock<BookmarkLayer>,

    cache: Mutex<DecorationCache>,

    /// Cancellation flags for whichever worker currently owns each role.
    /// Starting a replacement worker flips the old flag and installs a new
    /// one under the same key (§4.7 "Worker retirement").
    workers: Mutex<HashMap<WorkerRole, Arc<AtomicBool>>>,

    closed: AtomicBool,
    generation: AtomicU64,
}

impl Session {
    pub fn new(file_id: String, path: PathBuf, cache_capacity: usize) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self {
            file_id,
            path,
            name,
            line_index: RwLock::new(None),
            visible_indices: RwLock::new(None),
            search_matches: RwLock::new(Arc::new(Vec::new())),
            search_config: RwLock::new(None),
            processing_layers: Mutex::new(Vec::new()),
            rendering_layers: RwLock::new(Vec::new()),
            bookmark: RwLock::new(BookmarkLayer::new()),
            cache: Mutex::new(DecorationCache::new(cache_capacity)),
            workers: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
        *self.line_index.write().unwrap() = None;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn set_line_index(&self, index: LineIndex) {
        *self.line_index.write().unwrap() = Some(Arc::new(index));
        *self.visible_indices.write().unwrap() = None;
        *self.search_matches.write().unwrap() = Arc::new(Vec::new());
        self.cache.lock().unwrap().clear();
    }

    /// A cheap snapshot of the line index an external caller or worker can
    /// hold onto without re-acquiring the session lock. `None` once the
    /// session has been closed or before indexing completes.
    pub fn line_index_snapshot(&self) -> Option<Arc<LineIndex>> {
        self.line_index.read().unwrap().clone()
    }

    pub fn line_count(&self) -> usize {
        self.line_index_snapshot().map(|li| li.line_count()).unwrap_or(0)
    }

    pub fn size(&self) -> u64 {
        self.line_index_snapshot().map(|li| li.size).unwrap_or(0)
    }

    pub fn visible_count(&self) -> usize {
        match &*self.visible_indices.read().unwrap() {
            Some(v) => v.len(),
            None => self.line_count(),
        }
    }

    pub fn match_count(&self) -> usize {
        self.search_matches.read().unwrap().len()
    }

    pub fn visible_indices_snapshot(&self) -> Option<Arc<Vec<u64>>> {
        self.visible_indices.read().unwrap().clone()
    }

    pub fn search_matches_snapshot(&self) -> Arc<Vec<u64>> {
        self.search_matches.read().unwrap().clone()
    }

    pub fn search_config(&self) -> Option<SearchConfig> {
        self.search_config.read().unwrap().clone()
    }

    pub fn set_search_config(&self, config: Option<SearchConfig>) {
        *self.search_config.write().unwrap() = config;
    }

    pub fn processing_layers(&self) -> &Mutex<Vec<Box<dyn ProcessingLayer>>> {
        &self.processing_layers
    }

    pub fn set_processing_layers(&self, layers: Vec<Box<dyn ProcessingLayer>>) {
        *self.processing_layers.lock().unwrap() = layers;
    }

    pub fn set_rendering_layers(&self, layers: Vec<Box<dyn RenderingLayer>>) {
        *self.rendering_layers.write().unwrap() = layers;
        self.cache.lock().unwrap().clear();
    }

    /// `(id, enabled, se_query)` for every Rendering layer, for the Stats
    /// Worker.
    pub fn rendering_layers_snapshot(&self) -> Vec<(String, bool, Option<SeQuery>)> {
        self.rendering_layers
            .read()
            .unwrap()
            .iter()
            .map(|l| (l.id().to_string(), l.enabled(), l.se_query()))
            .collect()
    }

    pub fn bookmark(&self) -> &RwLock<BookmarkLayer> {
        &self.bookmark
    }

    pub fn clear_decoration_cache(&self) {
        self.cache.lock().unwrap().clear();
    }

    /// Applies a completed Pipeline Worker run atomically: new tables
    /// replace the old ones, and the decoration cache (whose content
    /// depends on which physical rows are visible) is invalidated.
    pub fn apply_pipeline_outcome(&self, outcome: PipelineOutcome) {
        *self.visible_indices.write().unwrap() = outcome.visible_indices.map(Arc::new);
        *self.search_matches.write().unwrap() = Arc::new(outcome.search_matches);
        self.cache.lock().unwrap().clear();
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    /// Cancels and replaces whichever cancellation flag is registered for
    /// `role`, returning the fresh flag the newly-started worker should
    /// poll. The previous flag (if any) is returned so the caller can fold
    /// it into a zombie-list entry.
    pub fn begin_worker(&self, role: WorkerRole) -> (Arc<AtomicBool>, Option<Arc<AtomicBool>>) {
        let mut workers = self.workers.lock().unwrap();
        let previous = workers.get(&role).cloned();
        if let Some(prev) = &previous {
            prev.store(true, Ordering::Relaxed);
        }
        let flag = Arc::new(AtomicBool::new(false));
        workers.insert(role, flag.clone());
        (flag, previous)
    }

    /// Cancels every active worker without installing a replacement; used
    /// by `close_file`.
    pub fn cancel_all_workers(&self) {
        let workers = self.workers.lock().unwrap();
        for flag in workers.values() {
            flag.store(true, Ordering::Relaxed);
        }
    }

    /// Windowed read with decorations (§4.8). Always returns in-range,
    /// valid-UTF-8 rows even if the session is mid-update; never blocks on
    /// a worker.
    pub fn read_processed_lines(&self, start: u64, count: u64) -> Vec<RenderedRow> {
        let Some(line_index) = self.line_index_snapshot() else {
            return Vec::new();
        };
        let visible = self.visible_indices_snapshot();
        let search_config = self.search_config();
        let mut cache = self.cache.lock().unwrap();
        let mut processing = self.processing_layers.lock().unwrap();
        let rendering = self.rendering_layers.read().unwrap();
        let bookmark = self.bookmark.read().unwrap();

        let mut out = Vec::with_capacity(count as usize);
        for v in start..start.saturating_add(count) {
            let phys = match &visible {
                Some(vi) => match vi.get(v as usize) {
                    Some(p) => *p,
                    None => break,
                },
                None => {
                    if v as usize >= line_index.line_count() {
                        break;
                    }
                    v
                }
            };

            if let Some(cached) = cache.get(v) {
                out.push(RenderedRow {
                    index: v,
                    content: cached.content,
                    highlights: cached.highlights,
                    row_style: cached.row_style,
                });
                continue;
            }

            let Some((s, e)) = line_index.line_span(phys as usize) else {
                break;
            };
            let raw = &line_index.mmap[s as usize..e as usize];
            let mut text = String::from_utf8_lossy(raw).into_owned();
            while matches!(text.as_bytes().last(), Some(b'\n') | Some(b'\r')) {
                text.pop();
            }
            if text.len() > TRUNCATE_BYTES {
                let mut cut = TRUNCATE_BYTES;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
                text.push_str(TRUNCATE_SENTINEL);
            }

            for layer in processing.iter_mut() {
                if layer.stage() == LayerStage::Logic {
                    text = layer.process_line(&text);
                }
            }

            let mut highlights = Vec::new();
            let mut row_style = RowStyle::default();
            for layer in rendering.iter().rev() {
                highlights.extend(layer.highlight_line(&text));
                if let Some(rs) = layer.row_style(phys as usize, &text) {
                    row_style.merge(rs);
                }
            }
            if let Some(rs) = bookmark.row_style(phys as usize, &text) {
                row_style.merge(rs);
            }

            if let Some(cfg) = &search_config {
                let query = cfg.to_se_query();
                if let Ok(re) = se::embedded::compile(&query) {
                    for m in re.find_iter(&text) {
                        highlights.push(HighlightSpan {
                            start: m.start(),
                            end: m.end(),
                            color: "#ffeb3b".to_string(),
                            opacity: 0.5,
                            is_search: true,
                        });
                    }
                }
            }

            let row_style = if row_style == RowStyle::default() { None } else { Some(row_style) };
            cache.put(
                v,
                CachedRow {
                    content: text.clone(),
                    highlights: highlights.clone(),
                    row_style: row_style.clone(),
                },
            );
            out.push(RenderedRow {
                index: v,
                content: text,
                highlights,
                row_style,
            });
        }
        out
    }
}
