//! Backend session engine for an interactive large-log-file viewer.
//!
//! The engine owns mmap'd line indexes, a two-stage filter/transform/render
//! pipeline per open file, and windowed reads with cached decorations. It
//! is designed to sit behind a thin UI-facing shell: [`bridge`] is the
//! single orchestration surface a host application talks to.

pub mod bridge;
pub mod cache;
pub mod config;
pub mod error;
pub mod index;
pub mod layers;
pub mod plugin_abi;
pub mod registry;
pub mod search_facade;
pub mod se;
pub mod session;
pub mod stats;
pub mod telemetry;
pub mod wire;

mod pipeline;

pub use bridge::{Bridge, EngineEvent};
pub use error::{EngineError, EngineResult};
