//! Substring Engine: the abstract contract every native-stage layer compiles
//! down to. Given a pattern and a set of flags plus an input source, a
//! `SubstringEngine` emits one output line per match in the wire format
//! `<1-based line number>:<original line>\n`.
//!
//! Two implementations share the contract: [`embedded::EmbeddedRegexEngine`]
//! runs in-process against an already-open byte stream, and
//! [`spawned::SpawnedRipgrepEngine`] shells out to an external `rg`-compatible
//! binary. Callers pick one at construction time; both implement the same
//! trait so a pipeline stage never needs to know which it is talking to.

pub mod embedded;
pub mod spawned;

use std::io::{BufRead, Write};

use crate::error::EngineResult;

/// Match mode for a substring-engine query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Fixed,
    Regex,
}

/// Flags shared by every substring-engine invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeFlags {
    pub case_insensitive: bool,
    pub whole_word: bool,
    pub invert: bool,
}

/// A single substring-engine query.
#[derive(Debug, Clone)]
pub struct SeQuery {
    pub pattern: String,
    pub mode: MatchMode,
    pub flags: SeFlags,
}

impl SeQuery {
    pub fn new(pattern: impl Into<String>, mode: MatchMode, flags: SeFlags) -> Self {
        Self {
            pattern: pattern.into(),
            mode,
            flags,
        }
    }
}

/// Source the engine reads matched input from.
pub enum SeInput<'a> {
    /// Read directly from a file path (stage 0 of a chain).
    File(&'a std::path::Path),
    /// Read `LINE:content\n` rows from an already-open reader (a later
    /// stage in a chain). The query is matched against `content` only;
    /// the `LINE:` prefix passes through untouched.
    Piped(Box<dyn BufRead + Send>),
}

/// Abstract substring-engine contract. Implementations may run in-process
/// or as an external child process; callers observe only this trait.
pub trait SubstringEngine: Send {
    /// Runs the query against `input`, writing each surviving
    /// `LINE:content\n` row to `out` as it is produced. Returns once the
    /// input is exhausted or `cancel` reports true.
    fn run(
        &self,
        query: &SeQuery,
        input: SeInput<'_>,
        out: &mut dyn Write,
        cancel: &dyn Fn() -> bool,
    ) -> EngineResult<()>;
}
