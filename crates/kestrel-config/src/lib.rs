#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Configuration for the Kestrel kernel and launcher.
//!
//! # Usage
//!
//! ```rust,no_run
//! use kestrel_config::Config;
//!
//! // defaults → ~/.kestrel/config.toml → explicit file → env fallbacks
//! let resolved = Config::load(None).unwrap();
//! for repo in &resolved.config.repositories {
//!     println!("{} -> {}", repo.id, repo.path.display());
//! }
//! ```
//!
//! # Configuration Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **Explicit file** (`--config <path>`)
//! 2. **User** (`$KESTREL_HOME/config.toml`, default `~/.kestrel/config.toml`)
//! 3. **Environment variables** (`KESTREL_*`), fallback only for unset fields
//! 4. **Embedded defaults** (`defaults.toml` compiled into the binary)
//!
//! # Design
//!
//! This crate has **no dependencies on other internal kestrel crates**.
//! Coordinates and isolation names stay strings here; the kernel builder
//! turns them into domain types.

/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::ResolvedConfig;
pub use types::*;

impl Config {
    /// Load with the full precedence chain.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any config file is malformed or the final
    /// configuration fails validation.
    pub fn load(explicit: Option<&std::path::Path>) -> ConfigResult<ResolvedConfig> {
        loader::load(explicit, None)
    }

    /// Load with an explicit home directory instead of `$KESTREL_HOME`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any config file is malformed or the final
    /// configuration fails validation.
    pub fn load_with_home(
        explicit: Option<&std::path::Path>,
        home_dir: &std::path::Path,
    ) -> ConfigResult<ResolvedConfig> {
        loader::load(explicit, Some(home_dir))
    }

    /// Load a single file, without layering.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }

    /// Parse and validate a TOML document on top of the embedded defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the document does not parse or fails
    /// validation.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        loader::from_toml_str(content)
    }
}
