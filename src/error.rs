//! Typed error kinds for the session engine.
//!
//! Internal APIs return `Result<T, EngineError>`; the CLI boundary wraps
//! these in `anyhow::Result` with additional context. `Cancelled` is
//! deliberately absent here: a cancelled worker produces no event at all,
//! it is not an error.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to open {path}: {source}")]
    OpenFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("indexing failed for {path}: {message}")]
    IndexingFailure { path: PathBuf, message: String },

    #[error("pipeline failed: {message}")]
    PipelineFailure { message: String },

    #[error("no session for file id {0}")]
    SessionNotFound(String),

    #[error("mmap closed during read")]
    MmapClosed,

    #[error("invalid layer config for type {type_id}: {message}")]
    InvalidLayerConfig { type_id: String, message: String },

    #[error("plugin load error: {0}")]
    PluginLoad(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
