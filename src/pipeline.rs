//! Pipeline Worker (§4.4): partitions active Processing layers into
//! Native/Logic stages, runs the Native chain through the substring
//! engine, streams the remainder through the Logic layers, and produces a
//! new `visible_indices` / `search_matches` pair. Results are discarded
//! entirely on cancellation (§4.4 "Edge cases" / §5).

use std::io::{BufRead, BufReader, Cursor};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crate::layers::{LayerStage, ProcessingLayer};
use crate::se::{MatchMode, SeFlags, SeInput, SeQuery, SubstringEngine};
use crate::session::{PipelineOutcome, SearchConfig, Session};
use crate::wire;

/// Bounded wait for the independent search-hit scan (§4.4 "Failure
/// semantics"); past this the hit set is treated as empty rather than
/// blocking the pipeline.
const SEARCH_HIT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct WorkerHandle {
    cancel: Arc<AtomicBool>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn retire(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map(|j| j.is_finished()).unwrap_or(true)
    }

    pub fn join(mut self) {
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Spawns the pipeline worker. `on_done`/`on_error` run on the worker
/// thread once the run finishes; they are expected to swap the session's
/// tables and emit the matching bridge event. Nothing is called on
/// cancellation.
pub fn spawn(
    session: Weak<Session>,
    cancel: Arc<AtomicBool>,
    se: Arc<dyn SubstringEngine>,
    on_done: impl FnOnce(&Session, PipelineOutcome) + Send + 'static,
    on_error: impl FnOnce(&Session, String) + Send + 'static,
) -> WorkerHandle {
    let thread_cancel = cancel.clone();
    let retirement_check = cancel.clone();
    let join = std::thread::spawn(move || {
        let Some(session) = session.upgrade() else { return };
        let cancel_fn = move || thread_cancel.load(Ordering::Relaxed);
        let result = run(&session, se.as_ref(), &cancel_fn);
        // The run may finish without ever observing `cancel` turn true
        // between its last check and returning. Re-check here, right
        // before touching session state: if a newer worker has since
        // retired this one, its outcome must be dropped rather than
        // overwrite the newer run's tables or emit a stale event.
        if retirement_check.load(Ordering::Relaxed) {
            return;
        }
        match result {
            Ok(Some(outcome)) => on_done(&session, outcome),
            Ok(None) => {}
            Err(message) => on_error(&session, message),
        }
    });
    WorkerHandle {
        cancel,
        join: Some(join),
    }
}

type RunResult = Result<Option<PipelineOutcome>, String>;

fn run(session: &Session, se: &dyn SubstringEngine, cancel: &dyn Fn() -> bool) -> RunResult {
    let Some(line_index) = session.line_index_snapshot() else {
        return Ok(Some(PipelineOutcome {
            visible_indices: None,
            search_matches: Vec::new(),
        }));
    };
    if line_index.line_count() == 0 {
        return Ok(Some(PipelineOutcome {
            visible_indices: None,
            search_matches: Vec::new(),
        }));
    }

    let search_config = session.search_config();
    let hit_set = match &search_config {
        Some(cfg) => Some(compute_search_hits(&session.path, se, cfg, cancel)?),
        None => None,
    };

    let mut processing = session.processing_layers().lock().unwrap();
    let native: Vec<usize> = processing
        .iter()
        .enumerate()
        .filter(|(_, l)| l.enabled() && l.stage() == LayerStage::Native)
        .map(|(i, _)| i)
        .collect();
    let logic: Vec<usize> = processing
        .iter()
        .enumerate()
        .filter(|(_, l)| l.enabled() && l.stage() == LayerStage::Logic)
        .map(|(i, _)| i)
        .collect();

    if native.is_empty() && logic.is_empty() {
        if cancel() {
            return Ok(None);
        }
        return Ok(Some(match hit_set {
            Some(hits) => PipelineOutcome {
                visible_indices: None,
                search_matches: hits,
            },
            None => PipelineOutcome {
                visible_indices: None,
                search_matches: Vec::new(),
            },
        }));
    }

    let Some(chain_output) = run_native_chain(&session.path, se, &processing, &native, cancel)? else {
        return Ok(None);
    };

    let hit_lookup: std::collections::HashSet<u64> = hit_set.iter().flatten().copied().collect();
    let text = String::from_utf8_lossy(&chain_output);

    let mut visible_indices = Vec::new();
    let mut search_matches = Vec::new();
    let mut v: u64 = 0;

    for line in text.lines() {
        if cancel() {
            for idx in &logic {
                processing[*idx].reset();
            }
            return Ok(None);
        }
        let Some((num, raw_content)) = wire::split_prefixed(line) else {
            continue;
        };
        let phys = num.saturating_sub(1);
        let mut content = raw_content.to_string();
        let mut keep = true;
        for &idx in &logic {
            content = processing[idx].process_line(&content);
            if !processing[idx].filter_line(&content, phys as usize) {
                keep = false;
                break;
            }
        }
        if keep {
            if hit_set.is_some() && hit_lookup.contains(&phys) {
                search_matches.push(v);
            }
            visible_indices.push(phys);
            v += 1;
        }
    }

    for idx in &logic {
        processing[*idx].reset();
    }

    Ok(Some(PipelineOutcome {
        visible_indices: Some(visible_indices),
        search_matches,
    }))
}

/// Runs the independent search-hit scan (§4.4 step 2): physical indices
/// matching the query, regardless of what the Processing chain keeps.
fn compute_search_hits(
    path: &Path,
    se: &dyn SubstringEngine,
    cfg: &SearchConfig,
    cancel: &dyn Fn() -> bool,
) -> Result<Vec<u64>, String> {
    let query = cfg.to_se_query();
    let deadline = Instant::now() + SEARCH_HIT_TIMEOUT;
    let bounded_cancel = || cancel() || Instant::now() >= deadline;

    let mut buf = Vec::new();
    if se.run(&query, SeInput::File(path), &mut buf, &bounded_cancel).is_err() {
        return Ok(Vec::new());
    }
    if Instant::now() >= deadline {
        return Ok(Vec::new());
    }

    let mut hits = Vec::new();
    for line in String::from_utf8_lossy(&buf).lines() {
        if let Some((num, _)) = wire::split_prefixed(line) {
            hits.push(num.saturating_sub(1));
        }
    }
    hits.sort_unstable();
    Ok(hits)
}

/// Builds and runs the Native-stage SE chain (§4.4 step 3): stage 0 reads
/// the file, later stages read the previous stage's `LINE:content` output.
/// Returns `Ok(None)` if cancelled mid-chain.
fn run_native_chain(
    path: &Path,
    se: &dyn SubstringEngine,
    processing: &[Box<dyn ProcessingLayer>],
    native: &[usize],
    cancel: &dyn Fn() -> bool,
) -> Result<Option<Vec<u8>>, String> {
    let mut buf = Vec::new();

    if native.is_empty() {
        let match_all = SeQuery::new(".*", MatchMode::Regex, SeFlags::default());
        se.run(&match_all, SeInput::File(path), &mut buf, cancel)
            .map_err(|e| e.to_string())?;
    } else {
        let first = processing[native[0]]
            .se_query()
            .ok_or_else(|| "native layer missing a substring-engine query".to_string())?;
        se.run(&first, SeInput::File(path), &mut buf, cancel)
            .map_err(|e| e.to_string())?;

        for &idx in &native[1..] {
            if cancel() {
                return Ok(None);
            }
            let query = processing[idx]
                .se_query()
                .ok_or_else(|| "native layer missing a substring-engine query".to_string())?;
            let upstream: Box<dyn BufRead + Send> = Box::new(BufReader::new(Cursor::new(std::mem::take(&mut buf))));
            let mut next = Vec::new();
            se.run(&query, SeInput::Piped(upstream), &mut next, cancel)
                .map_err(|e| e.to_string())?;
            buf = next;
        }
    }

    if cancel() {
        return Ok(None);
    }
    Ok(Some(buf))
}
