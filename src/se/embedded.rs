//! In-process substring engine backed by the `regex` crate.
//!
//! Used whenever no external substring-engine binary is configured, and
//! for Logic-stage layers that must run in-process regardless (they need
//! direct access to per-line transform state that an external process
//! cannot hold). Literal-prefix extraction mirrors the teacher's
//! `RegexAnalysis` in spirit: a compiled-once regex is reused across every
//! line rather than rebuilt per call.

use std::io::{BufRead, Write};

use regex::{Regex, RegexBuilder};

use crate::error::{EngineError, EngineResult};
use crate::se::{MatchMode, SeFlags, SeInput, SeQuery, SubstringEngine};
use crate::wire;

/// Builds a [`Regex`] from a query, applying fixed-string escaping and
/// case/word-boundary flags the way the CLI-facing SE contract specifies.
pub fn compile(query: &SeQuery) -> EngineResult<Regex> {
    let mut pattern = match query.mode {
        MatchMode::Fixed => regex::escape(&query.pattern),
        MatchMode::Regex => query.pattern.clone(),
    };

    if query.flags.whole_word {
        pattern = format!(r"\b(?:{})\b", pattern);
    }

    RegexBuilder::new(&pattern)
        .case_insensitive(query.flags.case_insensitive)
        .build()
        .map_err(|e| EngineError::InvalidLayerConfig {
            type_id: "SUBSTRING_ENGINE".to_string(),
            message: e.to_string(),
        })
}

/// Embedded-regex [`SubstringEngine`] implementation.
pub struct EmbeddedRegexEngine;

impl EmbeddedRegexEngine {
    pub fn new() -> Self {
        Self
    }

    fn line_matches(regex: &Regex, content: &str, invert: bool) -> bool {
        let found = regex.is_match(content);
        found != invert
    }
}

impl Default for EmbeddedRegexEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SubstringEngine for EmbeddedRegexEngine {
    fn run(
        &self,
        query: &SeQuery,
        input: SeInput<'_>,
        out: &mut dyn Write,
        cancel: &dyn Fn() -> bool,
    ) -> EngineResult<()> {
        let regex = compile(query)?;

        match input {
            SeInput::File(path) => {
                let bytes = std::fs::read(path).map_err(|source| EngineError::OpenFailure {
                    path: path.to_path_buf(),
                    source,
                })?;
                let text = String::from_utf8_lossy(&bytes);
                for (idx, line) in text.lines().enumerate() {
                    if cancel() {
                        return Ok(());
                    }
                    if Self::line_matches(&regex, line, query.flags.invert) {
                        writeln!(out, "{}", wire::join_prefixed((idx + 1) as u64, line))
                            .map_err(|e| EngineError::PipelineFailure {
                                message: e.to_string(),
                            })?;
                    }
                }
            }
            SeInput::Piped(mut reader) => {
                let mut line = String::new();
                loop {
                    if cancel() {
                        return Ok(());
                    }
                    line.clear();
                    let n = reader
                        .read_line(&mut line)
                        .map_err(|e| EngineError::PipelineFailure {
                            message: e.to_string(),
                        })?;
                    if n == 0 {
                        break;
                    }
                    let trimmed = line.trim_end_matches(['\n', '\r']);
                    let Some((num, content)) = wire::split_prefixed(trimmed) else {
                        continue;
                    };
                    if Self::line_matches(&regex, content, query.flags.invert) {
                        writeln!(out, "{}", wire::join_prefixed(num, content)).map_err(|e| {
                            EngineError::PipelineFailure {
                                message: e.to_string(),
                            }
                        })?;
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn no_cancel() -> impl Fn() -> bool {
        let flag = AtomicBool::new(false);
        move || flag.load(Ordering::Relaxed)
    }

    #[test]
    fn matches_fixed_pattern_over_piped_input() {
        let engine = EmbeddedRegexEngine::new();
        let query = SeQuery::new("ERROR", MatchMode::Fixed, SeFlags::default());
        let input = "1:ERROR a\n2:INFO b\n3:ERROR c\n";
        let reader: Box<dyn BufRead + Send> = Box::new(Cursor::new(input.as_bytes().to_vec()));
        let mut out = Vec::new();
        engine
            .run(&query, SeInput::Piped(reader), &mut out, &no_cancel())
            .unwrap();
        let result = String::from_utf8(out).unwrap();
        assert_eq!(result, "1:ERROR a\n3:ERROR c\n");
    }

    #[test]
    fn invert_flag_keeps_non_matches() {
        let engine = EmbeddedRegexEngine::new();
        let query = SeQuery::new(
            "ERROR",
            MatchMode::Fixed,
            SeFlags {
                invert: true,
                ..Default::default()
            },
        );
        let input = "1:ERROR a\n2:INFO b\n";
        let reader: Box<dyn BufRead + Send> = Box::new(Cursor::new(input.as_bytes().to_vec()));
        let mut out = Vec::new();
        engine
            .run(&query, SeInput::Piped(reader), &mut out, &no_cancel())
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "2:INFO b\n");
    }

    #[test]
    fn invalid_utf8_file_is_decoded_lossily_instead_of_failing() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut f, b"ERROR ok\n\xFF\xFEbad\nERROR fine\n").unwrap();
        std::io::Write::flush(&mut f).unwrap();

        let engine = EmbeddedRegexEngine::new();
        let query = SeQuery::new("ERROR", MatchMode::Fixed, SeFlags::default());
        let mut out = Vec::new();
        engine
            .run(&query, SeInput::File(f.path()), &mut out, &no_cancel())
            .unwrap();
        let result = String::from_utf8(out).unwrap();
        assert!(result.contains("ERROR ok"));
        assert!(result.contains("ERROR fine"));
    }

    #[test]
    fn leading_dash_pattern_is_not_treated_as_a_flag() {
        let engine = EmbeddedRegexEngine::new();
        let query = SeQuery::new("-v", MatchMode::Fixed, SeFlags::default());
        let input = "1:-v enabled\n2:nothing\n";
        let reader: Box<dyn BufRead + Send> = Box::new(Cursor::new(input.as_bytes().to_vec()));
        let mut out = Vec::new();
        engine
            .run(&query, SeInput::Piped(reader), &mut out, &no_cancel())
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1:-v enabled\n");
    }
}
