//! ABI contract between the engine and compiled layer plugins (§4.3,
//! §9 "dynamic attribute binding... replace with an explicit typed config
//! struct and a declarative UI-schema accessor").
//!
//! A plugin is a `cdylib` exporting one entry point, [`PLUGIN_ENTRY_SYMBOL`],
//! matching [`PluginEntryFn`]. The registry calls it once per loaded
//! library and keeps the returned descriptors — and the `Library` handle
//! itself, so the code backing each factory function pointer stays mapped
//! — for the registry's lifetime.

use std::path::Path;

use libloading::{Library, Symbol};

use crate::error::{EngineError, EngineResult};
use crate::layers::{LayerCategory, LayerConfig, LayerInstance, UiInput};

/// Constructs a layer instance from validated config. Implemented by a
/// plain function pointer rather than a trait object: plugin and host are
/// built against the same `LayerInstance`/`LayerConfig` definitions, so a
/// bare `fn` pointer is both simple and sufficiently stable for a
/// same-toolchain plugin load.
pub type LayerFactory = fn(&LayerConfig) -> EngineResult<LayerInstance>;

/// Everything the registry needs to expose and instantiate one
/// plugin-provided layer type.
pub struct PluginLayerDescriptor {
    pub type_id: String,
    pub category: LayerCategory,
    pub schema: Vec<UiInput>,
    pub factory: LayerFactory,
}

/// Symbol name every plugin library must export.
pub const PLUGIN_ENTRY_SYMBOL: &[u8] = b"register_loglayer_plugin";

/// Signature of the exported entry point.
pub type PluginEntryFn = unsafe fn() -> Vec<PluginLayerDescriptor>;

/// Loads `path` as a plugin library and calls its entry point once.
///
/// # Safety
/// This calls into arbitrary native code supplied by the plugin file.
/// Callers are trusted to only point this at plugins built against this
/// crate's ABI (the registry's plugin-directory scan is the only caller).
pub fn load_plugin(path: &Path) -> EngineResult<(Library, Vec<PluginLayerDescriptor>)> {
    let lib = unsafe { Library::new(path) }
        .map_err(|e| EngineError::PluginLoad(format!("{}: {e}", path.display())))?;
    let descriptors = unsafe {
        let entry: Symbol<PluginEntryFn> = lib
            .get(PLUGIN_ENTRY_SYMBOL)
            .map_err(|e| EngineError::PluginLoad(format!("{}: {e}", path.display())))?;
        entry()
    };
    Ok((lib, descriptors))
}

/// Builds a plugin's `register_loglayer_plugin` entry point from a list of
/// descriptor expressions. A plugin crate invokes this once at its root.
#[macro_export]
macro_rules! loglayer_plugin {
    ($($descriptor:expr),* $(,)?) => {
        #[no_mangle]
        pub extern "Rust" fn register_loglayer_plugin() -> Vec<$crate::plugin_abi::PluginLayerDescriptor> {
            vec![$($descriptor),*]
        }
    };
}
