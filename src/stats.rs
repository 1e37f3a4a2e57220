//! Stats Worker (§4.6): per-layer match counts and a 20-bucket physical-
//! index distribution, honoring sequential filter stacking. Grounded on
//! `backend/bridge.py`'s `StatsWorker`: each queryable layer gets its own
//! substring-engine chain — the *cumulative prefix* of enabled Native
//! Processing layers (Filter/Level) declared before it, feeding into the
//! layer's own query as the final stage — so a layer only ever sees the
//! rows its predecessors let through. Chains for different layers share no
//! state and run in parallel on a rayon pool, same as the original's
//! `ThreadPoolExecutor` fan-out.

use std::path::Path;

use rayon::prelude::*;

use crate::se::{SeInput, SeQuery, SubstringEngine};
use crate::wire;

/// One layer's stats contribution to a `sync_layers`/`sync_decorations` run.
#[derive(Debug, Clone)]
pub struct StatsLayerQuery {
    pub id: String,
    /// The layer's own substring-engine query, if it has a queryable form
    /// (Filter, Level, Highlight, RowTint). `None` for Range/Time-Range/
    /// Replace/Bookmark, which contribute `count=0, distribution=[]`.
    pub query: Option<SeQuery>,
    /// Whether this layer extends the cumulative prefix later layers are
    /// measured against — true only for enabled Native-stage Processing
    /// layers (Filter, Level), matching the original's `FilterLayer`/
    /// `LevelLayer` class check.
    pub extends_prefix: bool,
}

/// Count plus 20-bucket physical-index distribution, normalized so the
/// largest bucket is `1.0` (or all zero if there were no matches).
#[derive(Debug, Clone, PartialEq)]
pub struct LayerStat {
    pub count: u64,
    pub distribution: Vec<f64>,
}

impl LayerStat {
    fn empty() -> Self {
        Self {
            count: 0,
            distribution: Vec::new(),
        }
    }
}

/// Runs every queryable layer's stats chain on `pool`, respecting the
/// cumulative Native-filter prefix each layer saw in declared order.
/// Returns one entry per layer in `layers`, including non-queryable ones
/// (as [`LayerStat::empty`]).
pub fn run(
    path: &Path,
    se: &dyn SubstringEngine,
    total_lines: u64,
    layers: &[StatsLayerQuery],
    pool: &rayon::ThreadPool,
    cancel: &dyn Fn() -> bool,
) -> Vec<(String, LayerStat)> {
    let total_lines = total_lines.max(1);

    // Sequential pass: snapshot, for each layer, the prefix of queries it
    // should be measured behind. Cheap — these are just query clones.
    let mut prefix: Vec<SeQuery> = Vec::new();
    let mut tasks: Vec<(String, SeQuery, Vec<SeQuery>)> = Vec::new();
    for layer in layers {
        if let Some(q) = &layer.query {
            tasks.push((layer.id.clone(), q.clone(), prefix.clone()));
        }
        if layer.extends_prefix {
            if let Some(q) = &layer.query {
                prefix.push(q.clone());
            }
        }
    }

    let computed: Vec<(String, LayerStat)> = pool.install(|| {
        tasks
            .par_iter()
            .filter_map(|(id, query, prefix)| {
                if cancel() {
                    return None;
                }
                let stat = run_one(path, se, total_lines, query, prefix, cancel);
                Some((id.clone(), stat))
            })
            .collect()
    });

    let mut by_id: std::collections::HashMap<String, LayerStat> = computed.into_iter().collect();
    layers
        .iter()
        .map(|l| {
            let stat = by_id.remove(&l.id).unwrap_or_else(LayerStat::empty);
            (l.id.clone(), stat)
        })
        .collect()
}

fn run_one(
    path: &Path,
    se: &dyn SubstringEngine,
    total_lines: u64,
    query: &SeQuery,
    prefix: &[SeQuery],
    cancel: &dyn Fn() -> bool,
) -> LayerStat {
    let mut buf = Vec::new();
    let chain: &[SeQuery] = prefix;

    if chain.is_empty() {
        if se.run(query, SeInput::File(path), &mut buf, cancel).is_err() {
            return LayerStat::empty();
        }
    } else {
        if se.run(&chain[0], SeInput::File(path), &mut buf, cancel).is_err() {
            return LayerStat::empty();
        }
        for q in &chain[1..] {
            if cancel() {
                return LayerStat::empty();
            }
            let reader: Box<dyn std::io::BufRead + Send> =
                Box::new(std::io::BufReader::new(std::io::Cursor::new(std::mem::take(&mut buf))));
            let mut next = Vec::new();
            if se.run(q, SeInput::Piped(reader), &mut next, cancel).is_err() {
                return LayerStat::empty();
            }
            buf = next;
        }
        if cancel() {
            return LayerStat::empty();
        }
        let reader: Box<dyn std::io::BufRead + Send> =
            Box::new(std::io::BufReader::new(std::io::Cursor::new(std::mem::take(&mut buf))));
        let mut final_buf = Vec::new();
        if se.run(query, SeInput::Piped(reader), &mut final_buf, cancel).is_err() {
            return LayerStat::empty();
        }
        buf = final_buf;
    }

    let mut count = 0u64;
    let mut distribution = vec![0u64; 20];
    for line in String::from_utf8_lossy(&buf).lines() {
        let Some((num, _)) = wire::split_prefixed(line) else {
            continue;
        };
        let phys = num.saturating_sub(1);
        let bucket = ((phys * 20 / total_lines) as usize).min(19);
        distribution[bucket] += 1;
        count += 1;
    }

    let max_bucket = distribution.iter().copied().max().unwrap_or(0);
    let normalized = if max_bucket > 0 {
        distribution.iter().map(|&v| v as f64 / max_bucket as f64).collect()
    } else {
        vec![0.0; 20]
    };

    LayerStat {
        count,
        distribution: normalized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::se::embedded::EmbeddedRegexEngine;
    use crate::se::{MatchMode, SeFlags};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn pool() -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    fn no_cancel() -> impl Fn() -> bool {
        || false
    }

    fn write_temp(content: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn counts_independent_layer_without_prefix() {
        let f = write_temp(b"ERROR a\nINFO b\nERROR c\nERROR d\n");
        let engine = EmbeddedRegexEngine::new();
        let layers = vec![StatsLayerQuery {
            id: "l1".to_string(),
            query: Some(SeQuery::new("ERROR", MatchMode::Fixed, SeFlags::default())),
            extends_prefix: true,
        }];
        let stats = run(f.path(), &engine, 4, &layers, &pool(), &no_cancel());
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].1.count, 3);
    }

    #[test]
    fn later_layer_is_measured_behind_earlier_filters_prefix() {
        let f = write_temp(b"ERROR db timeout\nERROR db\nINFO db\nERROR timeout\n");
        let engine = EmbeddedRegexEngine::new();
        let layers = vec![
            StatsLayerQuery {
                id: "filter".to_string(),
                query: Some(SeQuery::new("ERROR", MatchMode::Fixed, SeFlags::default())),
                extends_prefix: true,
            },
            StatsLayerQuery {
                id: "highlight".to_string(),
                query: Some(SeQuery::new("timeout", MatchMode::Fixed, SeFlags::default())),
                extends_prefix: false,
            },
        ];
        let stats = run(f.path(), &engine, 4, &layers, &pool(), &no_cancel());
        let highlight = stats.iter().find(|(id, _)| id == "highlight").unwrap();
        // Only rows surviving the ERROR prefix (0,1,3) are considered, of
        // which row 0 matches "timeout".
        assert_eq!(highlight.1.count, 1);
    }

    #[test]
    fn non_queryable_layer_is_empty() {
        let f = write_temp(b"a\nb\n");
        let engine = EmbeddedRegexEngine::new();
        let layers = vec![StatsLayerQuery {
            id: "range".to_string(),
            query: None,
            extends_prefix: false,
        }];
        let stats = run(f.path(), &engine, 2, &layers, &pool(), &no_cancel());
        assert_eq!(stats[0].1, LayerStat::empty());
    }
}
