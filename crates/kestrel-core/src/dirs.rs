//! On-disk layout of a Kestrel installation.
//!
//! ```text
//! ~/.kestrel/                 (KestrelHome, or $KESTREL_HOME)
//! ├── cache/artifacts/          (local artifact cache, cleared by CLEAN)
//! ├── logs/                     (launcher log files)
//! ├── config.toml               (user configuration)
//! └── handoff.toml              (restart handoff written before exit)
//! ```

use std::io;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the home directory.
pub const HOME_ENV_VAR: &str = "KESTREL_HOME";

/// Root directory of a Kestrel installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KestrelHome {
    root: PathBuf,
}

impl KestrelHome {
    /// Resolve the home directory.
    ///
    /// Checks `$KESTREL_HOME` first, then falls back to `$HOME/.kestrel/`.
    ///
    /// # Errors
    ///
    /// Returns an error if `$KESTREL_HOME` is relative, or if neither
    /// variable is set.
    pub fn resolve() -> io::Result<Self> {
        let root = if let Ok(custom) = std::env::var(HOME_ENV_VAR) {
            let p = PathBuf::from(&custom);
            if !p.is_absolute() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "KESTREL_HOME must be an absolute path",
                ));
            }
            p
        } else {
            let home = std::env::var("HOME").map_err(|_| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    "neither KESTREL_HOME nor HOME environment variable is set",
                )
            })?;
            PathBuf::from(home).join(".kestrel")
        };

        Ok(Self { root })
    }

    /// Create from an explicit path.
    #[must_use]
    pub fn from_path(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the directory skeleton.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn ensure(&self) -> io::Result<()> {
        std::fs::create_dir_all(self.cache_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }

    /// Root directory path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Default artifact cache (`~/.kestrel/cache/artifacts/`).
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache").join("artifacts")
    }

    /// Log directory (`~/.kestrel/logs/`).
    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// User configuration file (`~/.kestrel/config.toml`).
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Restart handoff file (`~/.kestrel/handoff.toml`).
    #[must_use]
    pub fn handoff_path(&self) -> PathBuf {
        self.root.join("handoff.toml")
    }
}
