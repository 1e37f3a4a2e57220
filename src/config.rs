//! Configuration management for the session engine.
//!
//! Supports loading configuration from TOML files with CLI overrides,
//! following the same layered-resolution shape as other engine-embedding
//! binaries in this line: environment variable, then local file, then
//! user config directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

/// Front-end-facing server configuration, used only by the thin CLI entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port the UI-facing event/request surface listens on, if any.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Tunables owned by the engine itself, never the per-workspace opaque JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to an external substring-engine binary (e.g. ripgrep). When
    /// absent, native-stage layers fall back to the embedded regex engine.
    #[serde(default)]
    pub se_binary: Option<String>,

    /// Directory scanned for layer plugins (compiled `cdylib` files).
    #[serde(default)]
    pub plugin_dir: Option<String>,

    /// Maximum entries retained in the windowed-read decoration cache.
    #[serde(default = "default_decoration_cache_capacity")]
    pub decoration_cache_capacity: usize,

    /// Worker threads reserved for the stats worker's rayon pool.
    #[serde(default = "default_stats_worker_threads")]
    pub stats_worker_threads: usize,
}

fn default_port() -> u16 {
    7800
}

fn default_decoration_cache_capacity() -> usize {
    5000
}

fn default_stats_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8))
        .unwrap_or(4)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            se_binary: None,
            plugin_dir: None,
            decoration_cache_capacity: default_decoration_cache_capacity(),
            stats_worker_threads: default_stats_worker_threads(),
        }
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from default locations.
    ///
    /// Search order:
    /// 1. `LOGLAYER_CONFIG` environment variable
    /// 2. `./loglayer.toml` (current directory)
    /// 3. `~/.config/loglayer/config.toml` (user config)
    pub fn from_default_locations() -> Result<Option<(Self, PathBuf)>> {
        if let Ok(env_path) = std::env::var("LOGLAYER_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                let config = Self::from_file(&path)?;
                return Ok(Some((config, path)));
            }
        }

        let local_path = PathBuf::from("loglayer.toml");
        if local_path.exists() {
            let config = Self::from_file(&local_path)?;
            return Ok(Some((config, local_path)));
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_path = config_dir.join("loglayer").join("config.toml");
            if user_path.exists() {
                let config = Self::from_file(&user_path)?;
                return Ok(Some((config, user_path)));
            }
        }

        Ok(None)
    }

    /// Generate a template configuration file.
    pub fn generate_template() -> String {
        r#"# Log Layer Engine Configuration
# Generated template - customize as needed

[server]
# Port the UI-facing event/request surface listens on
port = 7800

[engine]
# Path to an external substring-engine binary (e.g. ripgrep).
# When absent, native-stage layers fall back to the embedded regex engine.
# se_binary = "/usr/bin/rg"

# Directory scanned for layer plugins (compiled cdylib files)
# plugin_dir = "/home/user/.config/loglayer/plugins"

# Maximum entries retained in the windowed-read decoration cache
decoration_cache_capacity = 5000

# Worker threads reserved for the stats worker's rayon pool
stats_worker_threads = 4
"#
        .to_string()
    }

    /// Write template config to the specified path.
    pub fn write_template(path: &Path) -> Result<()> {
        let template = Self::generate_template();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        std::fs::write(path, template)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Merge CLI overrides into the configuration.
    pub fn with_overrides(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.server.port = port;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = Config::default();
        assert_eq!(config.server.port, 7800);
        assert!(config.engine.se_binary.is_none());
        assert_eq!(config.engine.decoration_cache_capacity, 5000);
    }

    #[test]
    fn parses_minimal_toml() {
        let toml = r#"
[server]
port = 9100

[engine]
se_binary = "/usr/bin/rg"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.engine.se_binary.as_deref(), Some("/usr/bin/rg"));
        assert_eq!(config.engine.decoration_cache_capacity, 5000);
    }

    #[test]
    fn overrides_apply_port_only() {
        let config = Config::default().with_overrides(Some(9999));
        assert_eq!(config.server.port, 9999);
    }
}
