//! End-to-end integration tests against the [`Bridge`] request/event
//! surface (§6), exercising full session lifecycles rather than individual
//! component internals (those live alongside each module's own source).

use std::collections::HashMap;
use std::io::Write;
use std::time::{Duration, Instant};

use loglayer_engine::bridge::{Bridge, EngineEvent, LayerSpec};
use loglayer_engine::config::EngineConfig;
use loglayer_engine::error::EngineError;
use loglayer_engine::layers::LayerConfig;
use loglayer_engine::search_facade::Direction;
use loglayer_engine::session::SearchConfig;
use tempfile::NamedTempFile;

fn config() -> EngineConfig {
    EngineConfig {
        se_binary: None,
        plugin_dir: None,
        decoration_cache_capacity: 500,
        stats_worker_threads: 2,
    }
}

fn write_temp(content: &[u8]) -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    f.write_all(content).unwrap();
    f.flush().unwrap();
    f
}

fn filter_spec(pattern: &str) -> LayerSpec {
    let mut fields = HashMap::new();
    fields.insert("pattern".to_string(), serde_json::json!(pattern));
    LayerSpec {
        type_id: "FILTER".to_string(),
        config: LayerConfig {
            id: format!("filter:{pattern}"),
            enabled: true,
            fields,
        },
    }
}

fn drain_until<F: Fn(&EngineEvent) -> bool>(bridge: &Bridge, predicate: F) -> EngineEvent {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(event) = bridge.recv_event(Duration::from_millis(100)) {
            if predicate(&event) {
                return event;
            }
        }
        assert!(Instant::now() < deadline, "timed out waiting for expected event");
    }
}

fn open_and_wait(bridge: &Bridge, file_id: &str, content: &[u8]) -> NamedTempFile {
    let f = write_temp(content);
    bridge.open_file(file_id, f.path().to_path_buf()).unwrap();
    drain_until(bridge, |e| matches!(e, EngineEvent::FileLoaded { file_id: id, .. } if id == file_id));
    f
}

// ---- end-to-end scenarios from the design doc -------------------------

#[test]
fn scenario_filter_then_search_surfaces_virtual_rank_matches() {
    let bridge = Bridge::new(&config()).unwrap();
    let content = b"ERROR Database Timeout\nERROR Database\nINFO Database\nERROR Timeout\nERROR Other\n";
    let _f = open_and_wait(&bridge, "f1", content);

    bridge.sync_layers("f1", vec![filter_spec("ERROR")]).unwrap();
    drain_until(&bridge, |e| matches!(e, EngineEvent::PipelineFinished { .. }));

    bridge
        .search(
            "f1",
            Some(SearchConfig {
                query: "Timeout".to_string(),
                is_regex: false,
                case_sensitive: false,
                whole_word: false,
            }),
        )
        .unwrap();
    let event = drain_until(&bridge, |e| matches!(e, EngineEvent::PipelineFinished { .. }));
    match event {
        EngineEvent::PipelineFinished { visible_count, match_count, .. } => {
            assert_eq!(visible_count, 4);
            assert_eq!(match_count, 2);
        }
        _ => unreachable!(),
    }

    let rows = bridge.read_processed_lines("f1", 0, 10).unwrap();
    assert_eq!(rows.iter().map(|r| r.content.clone()).collect::<Vec<_>>(), vec![
        "ERROR Database Timeout".to_string(),
        "ERROR Database".to_string(),
        "ERROR Timeout".to_string(),
        "ERROR Other".to_string(),
    ]);
    assert_eq!(bridge.search_matches_range("f1", 0, 10).unwrap(), vec![0, 2]);
}

#[test]
fn scenario_search_only_reports_physical_matches_unfiltered() {
    let bridge = Bridge::new(&config()).unwrap();
    let content = b"ERROR Database Timeout\nERROR Database\nINFO Database\nERROR Timeout\nERROR Other\n";
    let _f = open_and_wait(&bridge, "f1", content);

    bridge
        .search(
            "f1",
            Some(SearchConfig {
                query: "Database".to_string(),
                is_regex: false,
                case_sensitive: false,
                whole_word: false,
            }),
        )
        .unwrap();
    let event = drain_until(&bridge, |e| matches!(e, EngineEvent::PipelineFinished { .. }));
    match event {
        EngineEvent::PipelineFinished { visible_count, match_count, .. } => {
            assert_eq!(visible_count, 5);
            assert_eq!(match_count, 3);
        }
        _ => unreachable!(),
    }
    assert_eq!(bridge.search_matches_range("f1", 0, 10).unwrap(), vec![0, 1, 2]);
}

#[test]
fn sync_decorations_leaves_visible_and_match_counts_untouched() {
    let bridge = Bridge::new(&config()).unwrap();
    let content = b"ERROR a\nINFO b\nERROR c\n";
    let _f = open_and_wait(&bridge, "f1", content);

    bridge.sync_layers("f1", vec![filter_spec("ERROR")]).unwrap();
    let first = drain_until(&bridge, |e| matches!(e, EngineEvent::PipelineFinished { .. }));
    let (visible_before, matches_before) = match first {
        EngineEvent::PipelineFinished { visible_count, match_count, .. } => (visible_count, match_count),
        _ => unreachable!(),
    };

    let mut fields = HashMap::new();
    fields.insert("pattern".to_string(), serde_json::json!("ERROR"));
    fields.insert("color".to_string(), serde_json::json!("#ff0000"));
    let highlight = LayerSpec {
        type_id: "HIGHLIGHT".to_string(),
        config: LayerConfig {
            id: "hl1".to_string(),
            enabled: true,
            fields,
        },
    };
    bridge.sync_decorations("f1", vec![highlight]).unwrap();
    let second = drain_until(&bridge, |e| matches!(e, EngineEvent::PipelineFinished { .. }));
    match second {
        EngineEvent::PipelineFinished { visible_count, match_count, .. } => {
            assert_eq!(visible_count, visible_before);
            assert_eq!(match_count, matches_before);
        }
        _ => unreachable!(),
    }

    let rows = bridge.read_processed_lines("f1", 0, 10).unwrap();
    assert!(!rows[0].highlights.is_empty());
}

#[test]
fn bookmark_round_trip_and_nearest_navigation() {
    let bridge = Bridge::new(&config()).unwrap();
    let _f = open_and_wait(&bridge, "f1", b"a\nb\nc\nd\ne\n");

    assert!(bridge.toggle_bookmark("f1", 1).unwrap());
    assert!(bridge.toggle_bookmark("f1", 3).unwrap());
    bridge.update_bookmark_comment("f1", 1, Some("check this".to_string())).unwrap();

    let marks = bridge.bookmarks("f1").unwrap();
    assert_eq!(marks, vec![(1, Some("check this".to_string())), (3, None)]);

    assert_eq!(
        bridge
            .nearest_bookmark_index("f1", 1, loglayer_engine::layers::bookmark::Direction::Next)
            .unwrap(),
        Some(3)
    );
    assert_eq!(
        bridge
            .nearest_bookmark_index("f1", 3, loglayer_engine::layers::bookmark::Direction::Next)
            .unwrap(),
        Some(1)
    );

    assert!(!bridge.toggle_bookmark("f1", 1).unwrap());
    bridge.clear_bookmarks("f1").unwrap();
    assert!(bridge.bookmarks("f1").unwrap().is_empty());
}

#[test]
fn rapid_resync_converges_on_the_most_recent_layers() {
    // Mirrors the design doc's cancellation-cleanliness scenario: firing a
    // second `sync_layers` shortly after the first must retire the first
    // worker, and whichever `PipelineFinished` is last for this file must
    // reflect the second call's layers, not the first's.
    let bridge = Bridge::new(&config()).unwrap();
    let lines: Vec<String> = (0..200_000)
        .map(|i| if i % 2 == 0 { format!("ERROR row {i}") } else { format!("INFO row {i}") })
        .collect();
    let content = lines.join("\n") + "\n";
    let _f = open_and_wait(&bridge, "f1", content.as_bytes());

    bridge.sync_layers("f1", vec![filter_spec("ERROR")]).unwrap();
    bridge.sync_layers("f1", vec![filter_spec("INFO")]).unwrap();

    // Drain every event for a while and remember the last PipelineFinished
    // seen; no OperationError may appear for a clean retirement.
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut last_visible_count = None;
    while Instant::now() < deadline {
        match bridge.recv_event(Duration::from_millis(200)) {
            Some(EngineEvent::PipelineFinished { visible_count, .. }) => {
                last_visible_count = Some(visible_count);
            }
            Some(EngineEvent::OperationError { message, .. }) => {
                panic!("unexpected pipeline error during resync: {message}");
            }
            Some(_) => {}
            None => {
                if last_visible_count.is_some() {
                    break;
                }
            }
        }
    }

    assert_eq!(last_visible_count, Some(100_000));
}

#[test]
fn close_file_then_requests_return_session_not_found() {
    let bridge = Bridge::new(&config()).unwrap();
    let _f = open_and_wait(&bridge, "f1", b"a\nb\n");
    bridge.close_file("f1");

    assert!(matches!(
        bridge.read_processed_lines("f1", 0, 1),
        Err(EngineError::SessionNotFound(_))
    ));
    assert!(matches!(
        bridge.sync_layers("f1", vec![filter_spec("a")]),
        Err(EngineError::SessionNotFound(_))
    ));
}

#[test]
fn nearest_search_rank_wraps_and_skips_current_match() {
    let bridge = Bridge::new(&config()).unwrap();
    let _f = open_and_wait(&bridge, "f1", b"hit\nmiss\nhit\nmiss\nhit\n");

    bridge
        .search(
            "f1",
            Some(SearchConfig {
                query: "hit".to_string(),
                is_regex: false,
                case_sensitive: false,
                whole_word: false,
            }),
        )
        .unwrap();
    drain_until(&bridge, |e| matches!(e, EngineEvent::PipelineFinished { .. }));

    // Unfiltered search-only mode: matches are physical rows 0, 2, 4.
    assert_eq!(bridge.nearest_search_rank("f1", 0, Direction::Next).unwrap(), Some(1));
    assert_eq!(bridge.nearest_search_rank("f1", 4, Direction::Next).unwrap(), Some(0));
    assert_eq!(bridge.nearest_search_rank("f1", 0, Direction::Prev).unwrap(), Some(2));
}

#[test]
fn layer_registry_lists_every_builtin_without_the_system_bookmark_layer() {
    let bridge = Bridge::new(&config()).unwrap();
    let ids: Vec<String> = bridge.layer_registry().into_iter().map(|t| t.type_id).collect();
    for expected in ["FILTER", "LEVEL", "RANGE", "TIME_RANGE", "REPLACE", "HIGHLIGHT", "ROWTINT"] {
        assert!(ids.contains(&expected.to_string()), "missing {expected}");
    }
    assert!(!ids.contains(&"BOOKMARK".to_string()));
}

#[test]
fn transform_cascades_into_filter_end_to_end() {
    let bridge = Bridge::new(&config()).unwrap();
    let _f = open_and_wait(&bridge, "f1", b"foo 12\nbar 34\nfoo baz\n");

    let mut replace_fields = HashMap::new();
    replace_fields.insert("find".to_string(), serde_json::json!(r"\d+"));
    replace_fields.insert("replace".to_string(), serde_json::json!("N"));
    let replace = LayerSpec {
        type_id: "REPLACE".to_string(),
        config: LayerConfig {
            id: "t1".to_string(),
            enabled: true,
            fields: replace_fields,
        },
    };

    bridge.sync_layers("f1", vec![replace, filter_spec("foo N")]).unwrap();
    drain_until(&bridge, |e| matches!(e, EngineEvent::PipelineFinished { .. }));

    let rows = bridge.read_processed_lines("f1", 0, 10).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].content, "foo N");
}

#[test]
fn empty_file_opens_with_zero_lines_and_no_rows() {
    let bridge = Bridge::new(&config()).unwrap();
    let _f = open_and_wait(&bridge, "f1", b"");
    assert!(bridge.read_processed_lines("f1", 0, 10).unwrap().is_empty());
}
