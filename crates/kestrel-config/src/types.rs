//! Configuration types.
//!
//! Every struct implements [`Default`], so a bare `[section]` header in TOML
//! produces a working configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration, consumed once when the kernel is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The kernel's own identity and boot-time artifacts.
    pub kernel: KernelSection,
    /// Local artifact repositories, searched in order.
    pub repositories: Vec<RepositoryDescriptor>,
    /// Local artifact cache.
    pub cache: CacheSection,
    /// Logging level, format and per-crate directives.
    pub logging: LoggingSection,
    /// Restart supervision.
    pub launcher: LauncherSection,
}

/// `[kernel]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelSection {
    /// Coordinate of the kernel's own artifact (`group:artifact:version`).
    pub artifact: String,
    /// Artifacts loaded right after the kernel starts.
    pub preload: Vec<PreloadEntry>,
}

impl Default for KernelSection {
    fn default() -> Self {
        Self {
            artifact: "io.kestrel:kernel:0.1.0".to_string(),
            preload: Vec::new(),
        }
    }
}

/// One `[[kernel.preload]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadEntry {
    /// Coordinate to load.
    pub coordinate: String,
    /// Isolation policy name: `none`, `partial` or `full`.
    #[serde(default = "default_isolation")]
    pub isolation: String,
}

fn default_isolation() -> String {
    "full".to_string()
}

/// One `[[repositories]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    /// Unique repository id.
    pub id: String,
    /// Root directory laid out by coordinate path.
    pub path: PathBuf,
    /// Disabled repositories are skipped.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// `[cache]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Cache directory. Defaults to `$KESTREL_HOME/cache/artifacts`.
    pub path: Option<PathBuf>,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Base level filter.
    pub level: String,
    /// `pretty`, `compact` or `json`.
    pub format: String,
    /// Per-target overrides, e.g. `kestrel_artifact=debug`.
    pub directives: Vec<String>,
    /// Write to `$KESTREL_HOME/logs` instead of stderr.
    pub to_file: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
            directives: Vec::new(),
            to_file: false,
        }
    }
}

/// `[launcher]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherSection {
    /// Upper bound on consecutive relaunches by the supervisor.
    pub max_restarts: u32,
}

impl Default for LauncherSection {
    fn default() -> Self {
        Self { max_restarts: 16 }
    }
}
