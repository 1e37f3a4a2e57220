//! Bridge (§4.7): the engine's full request/event surface. Owns every open
//! session, the shared layer registry, and the worker-lifecycle bookkeeping
//! (disconnect-before-replace, zombie list, periodic sweep) that keeps a
//! retired worker's late callback from touching a session it no longer
//! belongs to.
//!
//! Grounded on `backend/bridge.py`'s `FileBridge`: a thin dispatcher in
//! front of `LogSession`, `IndexingWorker`, `PipelineWorker` and
//! `StatsWorker`, with a zombie-worker retirement scheme instead of this
//! crate's `Weak<Session>` substitute for Qt's signal disconnection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::index::line_index;
use crate::layers::bookmark::Direction as BookmarkDirection;
use crate::layers::{LayerConfig, LayerInstance};
use crate::pipeline::{self, WorkerHandle};
use crate::registry::{LayerRegistry, LayerTypeInfo};
use crate::search_facade;
use crate::se::SubstringEngine;
use crate::session::{PipelineOutcome, RenderedRow, SearchConfig, Session, WorkerRole};
use crate::stats::{self, LayerStat, StatsLayerQuery};

/// A small text snippet returned by [`Bridge::get_lines_by_indices`]. Uses
/// its own truncation ceiling (200 chars), distinct from the 10,000-byte
/// ceiling `read_processed_lines` applies to a full windowed read — this
/// call exists for lightweight previews (e.g. a bookmark panel), not the
/// main viewport.
const PREVIEW_TRUNCATE_CHARS: usize = 200;
const PREVIEW_SENTINEL: &str = "...";
const MAX_PREVIEW_INDICES: usize = 100;

/// Sweep the zombie list every N retirements, mirroring the original's
/// `_zombie_cleanup_counter >= 10` check.
const ZOMBIE_SWEEP_INTERVAL: u64 = 10;
const ZOMBIE_WARN_THRESHOLD: usize = 20;

/// Events the bridge emits as a side effect of a request or a background
/// worker completing (§6). A host application drains these off the
/// returned channel and forwards them to its own UI/RPC layer.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    FileLoaded {
        file_id: String,
        name: String,
        size: u64,
        line_count: u64,
    },
    PipelineFinished {
        file_id: String,
        visible_count: u64,
        match_count: u64,
    },
    StatsFinished {
        file_id: String,
        stats: HashMap<String, LayerStat>,
    },
    OperationStarted {
        file_id: String,
        operation: String,
    },
    OperationProgress {
        file_id: String,
        operation: String,
        fraction: f32,
    },
    OperationError {
        file_id: String,
        operation: String,
        message: String,
    },
    OperationStatusChanged {
        file_id: String,
        status: String,
        percent: u8,
    },
}

/// A layer description as handed in from the host's UI: a type id plus raw
/// config fields. `sync_layers`/`sync_decorations` turn a list of these into
/// constructed [`LayerInstance`]s via the registry.
#[derive(Debug, Clone)]
pub struct LayerSpec {
    pub type_id: String,
    pub config: LayerConfig,
}

/// One text row from [`Bridge::get_lines_by_indices`].
#[derive(Debug, Clone)]
pub struct PreviewLine {
    pub index: u64,
    pub text: String,
}

struct ZombieEntry {
    handle: WorkerHandle,
}

struct FileSession {
    session: Arc<Session>,
}

/// Entry point of the session engine (§4.7). One `Bridge` serves every open
/// file for the lifetime of the embedding host process.
pub struct Bridge {
    sessions: RwLock<HashMap<String, FileSession>>,
    registry: Arc<RwLock<LayerRegistry>>,
    se: Arc<dyn SubstringEngine>,
    stats_pool: Arc<rayon::ThreadPool>,
    decoration_cache_capacity: usize,

    events_tx: Sender<EngineEvent>,
    events_rx: Mutex<Receiver<EngineEvent>>,

    zombies: Mutex<Vec<ZombieEntry>>,
    zombie_cleanup_counter: AtomicU64,
}

impl Bridge {
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        let registry = match &config.plugin_dir {
            Some(dir) => LayerRegistry::with_plugin_dir(dir)?,
            None => LayerRegistry::new(),
        };
        let se: Arc<dyn SubstringEngine> = match &config.se_binary {
            Some(bin) => Arc::new(crate::se::spawned::SpawnedRipgrepEngine::new(Some(bin.as_str()))),
            None => Arc::new(crate::se::embedded::EmbeddedRegexEngine::new()),
        };
        let stats_pool = Arc::new(
            rayon::ThreadPoolBuilder::new()
                .num_threads(config.stats_worker_threads)
                .build()
                .map_err(|e| EngineError::PipelineFailure { message: e.to_string() })?,
        );
        let (events_tx, events_rx) = mpsc::channel();

        Ok(Self {
            sessions: RwLock::new(HashMap::new()),
            registry: Arc::new(RwLock::new(registry)),
            se,
            stats_pool,
            decoration_cache_capacity: config.decoration_cache_capacity,
            events_tx,
            events_rx: Mutex::new(events_rx),
            zombies: Mutex::new(Vec::new()),
            zombie_cleanup_counter: AtomicU64::new(0),
        })
    }

    /// Blocks up to `timeout` for the next event (§6). A host application
    /// calls this in a loop on a dedicated thread and forwards whatever it
    /// gets to its own UI/RPC layer; `None` means the wait elapsed with
    /// nothing pending, not that the bridge is done.
    pub fn recv_event(&self, timeout: Duration) -> Option<EngineEvent> {
        self.events_rx.lock().unwrap().recv_timeout(timeout).ok()
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events_tx.send(event);
    }

    fn session(&self, file_id: &str) -> EngineResult<Arc<Session>> {
        self.sessions
            .read()
            .unwrap()
            .get(file_id)
            .map(|fs| fs.session.clone())
            .ok_or_else(|| EngineError::SessionNotFound(file_id.to_string()))
    }

    // ---- lifecycle -------------------------------------------------

    /// Opens `path` under `file_id`, replacing any existing session with
    /// that id (§4.7 "open_file"). Indexing runs on a background thread;
    /// `FileLoaded` fires once it completes. A zero-byte file short-circuits
    /// straight to `FileLoaded` with `line_count: 0`, matching the original
    /// (no point spinning up an indexing worker for nothing to index).
    pub fn open_file(&self, file_id: &str, path: std::path::PathBuf) -> EngineResult<()> {
        self.close_file(file_id);

        let metadata = std::fs::metadata(&path).map_err(|source| EngineError::OpenFailure {
            path: path.clone(),
            source,
        })?;
        let session = Arc::new(Session::new(file_id.to_string(), path.clone(), self.decoration_cache_capacity));
        let name = session.name.clone();

        self.sessions
            .write()
            .unwrap()
            .insert(file_id.to_string(), FileSession { session: session.clone() });

        if metadata.len() == 0 {
            self.emit(EngineEvent::FileLoaded {
                file_id: file_id.to_string(),
                name,
                size: 0,
                line_count: 0,
            });
            return Ok(());
        }

        self.emit(EngineEvent::OperationStarted {
            file_id: file_id.to_string(),
            operation: "indexing".to_string(),
        });

        let (cancel, _previous) = session.begin_worker(WorkerRole::Pipeline);

        let weak = Arc::downgrade(&session);
        let file_id_owned = file_id.to_string();
        let events_tx = self.events_tx.clone();
        std::thread::spawn(move || {
            let result = (|| -> EngineResult<Option<()>> {
                let Some(built) = line_index::build_line_index(&path, &cancel)? else {
                    return Ok(None);
                };
                let Some(session) = weak.upgrade() else { return Ok(None) };
                let name = session.name.clone();
                let size = built.size;
                session.set_line_index(built);
                let line_count = session.line_count() as u64;
                let _ = events_tx.send(EngineEvent::FileLoaded {
                    file_id: file_id_owned.clone(),
                    name,
                    size,
                    line_count,
                });
                Ok(Some(()))
            })();
            if let Err(e) = result {
                let _ = events_tx.send(EngineEvent::OperationError {
                    file_id: file_id_owned,
                    operation: "indexing".to_string(),
                    message: e.to_string(),
                });
            }
        });

        Ok(())
    }

    /// Closes `file_id`'s session, cancelling every worker it owns. A
    /// missing `file_id` is not an error (matches `close_file` on an id
    /// that was never opened, or was already closed).
    pub fn close_file(&self, file_id: &str) {
        if let Some(fs) = self.sessions.write().unwrap().remove(file_id) {
            fs.session.cancel_all_workers();
            fs.session.mark_closed();
        }
    }

    // ---- layer registry ---------------------------------------------

    pub fn layer_registry(&self) -> Vec<LayerTypeInfo> {
        self.registry.read().unwrap().list()
    }

    pub fn reload_plugins(&self) -> EngineResult<()> {
        self.registry.write().unwrap().reload_plugins()
    }

    // ---- layers & pipeline -------------------------------------------

    /// Replaces both Processing and Rendering layers and re-runs the
    /// pipeline (§4.7 "sync_layers"). A bookmark layer is always
    /// system-managed and is never part of `specs` — it is preserved
    /// automatically.
    pub fn sync_layers(&self, file_id: &str, specs: Vec<LayerSpec>) -> EngineResult<()> {
        let session = self.session(file_id)?;
        let (processing, rendering) = self.build_instances(&specs)?;
        session.set_processing_layers(processing);
        session.set_rendering_layers(rendering);
        self.start_pipeline(file_id, &session);
        Ok(())
    }

    /// Replaces only the Rendering layers, leaving visibility/search tables
    /// untouched (§4.7 "sync_decorations"). Emits `PipelineFinished` with
    /// unchanged counts purely to let the host re-render decorations, then
    /// kicks off a stats pass if any layer (Processing or Rendering) has a
    /// query.
    pub fn sync_decorations(&self, file_id: &str, specs: Vec<LayerSpec>) -> EngineResult<()> {
        let session = self.session(file_id)?;
        let (_, rendering) = self.build_instances(&specs)?;
        session.set_rendering_layers(rendering);

        self.emit(EngineEvent::PipelineFinished {
            file_id: file_id.to_string(),
            visible_count: session.visible_count() as u64,
            match_count: session.match_count() as u64,
        });

        self.start_stats(file_id, &session);
        Ok(())
    }

    fn build_instances(
        &self,
        specs: &[LayerSpec],
    ) -> EngineResult<(Vec<Box<dyn crate::layers::ProcessingLayer>>, Vec<Box<dyn crate::layers::RenderingLayer>>)> {
        let registry = self.registry.read().unwrap();
        let mut processing = Vec::new();
        let mut rendering = Vec::new();
        for spec in specs {
            match registry.create_instance(&spec.type_id, &spec.config)? {
                LayerInstance::Processing(p) => processing.push(p),
                LayerInstance::Rendering(r) => rendering.push(r),
            }
        }
        Ok((processing, rendering))
    }

    fn start_pipeline(&self, file_id: &str, session: &Arc<Session>) {
        self.retire_worker(session, WorkerRole::Pipeline);
        self.retire_worker(session, WorkerRole::Stats);

        let has_layers = !session.processing_layers().lock().unwrap().is_empty();
        let has_search = session.search_config().is_some();

        if !has_layers && !has_search {
            session.apply_pipeline_outcome(PipelineOutcome {
                visible_indices: None,
                search_matches: Vec::new(),
            });
            self.emit(EngineEvent::PipelineFinished {
                file_id: file_id.to_string(),
                visible_count: session.line_count() as u64,
                match_count: 0,
            });
            self.emit(EngineEvent::OperationStatusChanged {
                file_id: file_id.to_string(),
                status: "ready".to_string(),
                percent: 100,
            });
            self.start_stats(file_id, session);
            return;
        }

        self.emit(EngineEvent::OperationStarted {
            file_id: file_id.to_string(),
            operation: "pipeline".to_string(),
        });

        let (cancel, _) = session.begin_worker(WorkerRole::Pipeline);
        let file_id_owned = file_id.to_string();
        let events_tx = self.events_tx.clone();
        let events_tx_err = self.events_tx.clone();
        let se = self.se.clone();
        let handle = pipeline::spawn(
            Arc::downgrade(session),
            cancel,
            se,
            move |session, outcome| {
                session.apply_pipeline_outcome(outcome);
                let _ = events_tx.send(EngineEvent::PipelineFinished {
                    file_id: file_id_owned.clone(),
                    visible_count: session.visible_count() as u64,
                    match_count: session.match_count() as u64,
                });
                let _ = events_tx.send(EngineEvent::OperationStatusChanged {
                    file_id: file_id_owned.clone(),
                    status: "ready".to_string(),
                    percent: 100,
                });
            },
            move |_session, message| {
                let _ = events_tx_err.send(EngineEvent::OperationError {
                    file_id: file_id_owned.clone(),
                    operation: "pipeline".to_string(),
                    message,
                });
            },
        );
        self.track_worker(handle);

        self.start_stats(file_id, session);
    }

    fn start_stats(&self, file_id: &str, session: &Arc<Session>) {
        let processing = session.processing_layers().lock().unwrap();
        let mut queries: Vec<StatsLayerQuery> = processing
            .iter()
            .filter(|l| l.enabled())
            .map(|l| StatsLayerQuery {
                id: l.id().to_string(),
                query: if l.stage() == crate::layers::LayerStage::Native {
                    l.se_query()
                } else {
                    None
                },
                extends_prefix: matches!(l.type_id(), crate::layers::filter::TYPE_ID | crate::layers::level::TYPE_ID),
            })
            .collect();
        drop(processing);

        let rendering = session.rendering_layers_snapshot();
        queries.extend(
            rendering
                .into_iter()
                .filter(|(_, enabled, _)| *enabled)
                .map(|(id, _, query)| StatsLayerQuery {
                    id,
                    query,
                    extends_prefix: false,
                }),
        );

        if queries.iter().all(|q| q.query.is_none()) {
            self.emit(EngineEvent::StatsFinished {
                file_id: file_id.to_string(),
                stats: HashMap::new(),
            });
            return;
        }

        let (cancel, _) = session.begin_worker(WorkerRole::Stats);
        let path = session.path().to_path_buf();
        let total_lines = session.line_count() as u64;
        let se = self.se.clone();
        let pool = self.stats_pool.clone();
        let events_tx = self.events_tx.clone();
        let file_id_owned = file_id.to_string();
        let weak = Arc::downgrade(session);

        // Dispatch from a dedicated thread so `sync_decorations` itself
        // never blocks on the rayon pool, the same way the pipeline worker
        // runs off the calling thread.
        std::thread::spawn(move || {
            let Some(_session) = weak.upgrade() else { return };
            let retirement_check = cancel.clone();
            let cancel_fn = move || cancel.load(Ordering::Relaxed);
            let results = stats::run(&path, se.as_ref(), total_lines.max(1), &queries, &pool, &cancel_fn);
            // Same late-completion guard as the pipeline worker: a finished
            // run whose flag has since been flipped by a newer `start_stats`
            // call must not emit a stale `StatsFinished`.
            if retirement_check.load(Ordering::Relaxed) {
                return;
            }
            let stats_map: HashMap<String, LayerStat> = results.into_iter().collect();
            let _ = events_tx.send(EngineEvent::StatsFinished {
                file_id: file_id_owned,
                stats: stats_map,
            });
        });
    }

    // ---- worker lifecycle (zombie list) --------------------------------

    fn track_worker(&self, handle: WorkerHandle) {
        let mut zombies = self.zombies.lock().unwrap();
        zombies.push(ZombieEntry { handle });
        self.maybe_sweep(&mut zombies);
    }

    /// Cancels whatever worker currently holds `role` without starting a
    /// replacement. The worker's own `JoinHandle` (if any) was already
    /// pushed into `zombies` by [`Self::track_worker`] when it started;
    /// this just flips its flag and opportunistically sweeps the list.
    fn retire_worker(&self, session: &Arc<Session>, role: WorkerRole) {
        session.begin_worker(role);
        let mut zombies = self.zombies.lock().unwrap();
        self.maybe_sweep(&mut zombies);
    }

    fn maybe_sweep(&self, zombies: &mut Vec<ZombieEntry>) {
        let count = self.zombie_cleanup_counter.fetch_add(1, Ordering::Relaxed) + 1;
        if count % ZOMBIE_SWEEP_INTERVAL != 0 {
            return;
        }
        zombies.retain(|z| !z.handle.is_finished());
        if zombies.len() > ZOMBIE_WARN_THRESHOLD {
            tracing::warn!(count = zombies.len(), "zombie worker list still growing");
        }
    }

    // ---- windowed read & preview ---------------------------------------

    pub fn read_processed_lines(&self, file_id: &str, start: u64, count: u64) -> EngineResult<Vec<RenderedRow>> {
        let session = self.session(file_id)?;
        Ok(session.read_processed_lines(start, count))
    }

    /// Up to `MAX_PREVIEW_INDICES` raw, lightly-truncated lines by physical
    /// index, with no layer processing applied — a cheap preview path
    /// distinct from the full windowed read (§4.7 "get_lines_by_indices").
    pub fn get_lines_by_indices(&self, file_id: &str, indices: &[u64]) -> EngineResult<Vec<PreviewLine>> {
        let session = self.session(file_id)?;
        let Some(line_index) = session.line_index_snapshot() else {
            return Err(EngineError::MmapClosed);
        };
        let mut out = Vec::new();
        for &idx in indices.iter().take(MAX_PREVIEW_INDICES) {
            let Some((s, e)) = line_index.line_span(idx as usize) else {
                continue;
            };
            let raw = &line_index.mmap[s as usize..e as usize];
            let mut text = String::from_utf8_lossy(raw).into_owned();
            text = text.replace(['\r', '\n'], " ");
            let trimmed = text.trim();
            let mut text = trimmed.to_string();
            if text.chars().count() > PREVIEW_TRUNCATE_CHARS {
                text = text.chars().take(PREVIEW_TRUNCATE_CHARS).collect();
                text.push_str(PREVIEW_SENTINEL);
            }
            out.push(PreviewLine { index: idx, text });
        }
        Ok(out)
    }

    // ---- search ---------------------------------------------------------

    pub fn search(&self, file_id: &str, query: Option<SearchConfig>) -> EngineResult<()> {
        let session = self.session(file_id)?;
        session.set_search_config(query);
        self.start_pipeline(file_id, &session);
        Ok(())
    }

    pub fn search_match_index(&self, file_id: &str, rank: usize) -> EngineResult<Option<u64>> {
        let session = self.session(file_id)?;
        let matches = session.search_matches_snapshot();
        Ok(search_facade::match_index(&matches, rank))
    }

    pub fn search_matches_range(&self, file_id: &str, start: usize, count: usize) -> EngineResult<Vec<u64>> {
        let session = self.session(file_id)?;
        let matches = session.search_matches_snapshot();
        Ok(search_facade::matches_range(&matches, start, count))
    }

    pub fn nearest_search_rank(
        &self,
        file_id: &str,
        current_visual: u64,
        direction: search_facade::Direction,
    ) -> EngineResult<Option<usize>> {
        let session = self.session(file_id)?;
        let matches = session.search_matches_snapshot();
        Ok(search_facade::nearest(&matches, current_visual, direction))
    }

    pub fn physical_to_visual_index(&self, file_id: &str, phys: u64) -> EngineResult<u64> {
        let session = self.session(file_id)?;
        let visible = session.visible_indices_snapshot();
        Ok(search_facade::physical_to_visual(visible.as_deref().map(|v| v.as_slice()), phys))
    }

    // ---- bookmarks --------------------------------------------------------

    pub fn toggle_bookmark(&self, file_id: &str, physical_line: usize) -> EngineResult<bool> {
        let session = self.session(file_id)?;
        let marked = session.bookmark().write().unwrap().toggle(physical_line);
        session.clear_decoration_cache();
        Ok(marked)
    }

    pub fn update_bookmark_comment(
        &self,
        file_id: &str,
        physical_line: usize,
        comment: Option<String>,
    ) -> EngineResult<()> {
        let session = self.session(file_id)?;
        session.bookmark().write().unwrap().set_comment(physical_line, comment);
        session.clear_decoration_cache();
        Ok(())
    }

    pub fn clear_bookmarks(&self, file_id: &str) -> EngineResult<()> {
        let session = self.session(file_id)?;
        session.bookmark().write().unwrap().clear();
        session.clear_decoration_cache();
        Ok(())
    }

    pub fn bookmarks(&self, file_id: &str) -> EngineResult<Vec<(usize, Option<String>)>> {
        let session = self.session(file_id)?;
        Ok(session.bookmark().read().unwrap().all())
    }

    pub fn nearest_bookmark_index(
        &self,
        file_id: &str,
        current: usize,
        direction: BookmarkDirection,
    ) -> EngineResult<Option<usize>> {
        let session = self.session(file_id)?;
        Ok(session.bookmark().read().unwrap().nearest(current, direction))
    }

    // ---- workspace config (opaque passthrough, §3.1/§6) ------------------

    /// Writes `bytes` verbatim to `<folder>/.loglayer/config.json`, creating
    /// the `.loglayer` directory if it doesn't exist yet. The engine never
    /// parses this file — its contents are the host's own workspace config,
    /// opaque to everything below the Bridge.
    pub fn save_workspace_config(&self, folder: &std::path::Path, bytes: &[u8]) -> EngineResult<()> {
        let dir = folder.join(".loglayer");
        std::fs::create_dir_all(&dir).map_err(|source| EngineError::OpenFailure { path: dir.clone(), source })?;
        let path = dir.join("config.json");
        std::fs::write(&path, bytes).map_err(|source| EngineError::OpenFailure { path, source })
    }

    /// Reads `<folder>/.loglayer/config.json` verbatim. `None` if no
    /// workspace config has been saved for this folder yet.
    pub fn load_workspace_config(&self, folder: &std::path::Path) -> EngineResult<Option<Vec<u8>>> {
        let path = folder.join(".loglayer").join("config.json");
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(EngineError::OpenFailure { path, source }),
        }
    }
}
