//! Config file discovery and layered loading.
//!
//! Implements the `Config::load()` algorithm:
//! 1. Parse `defaults.toml` → base
//! 2. Apply `KESTREL_*` env var fallbacks
//! 3. Merge `$KESTREL_HOME/config.toml` (user)
//! 4. Merge the explicit `--config` file
//! 5. Deserialize merged tree → `Config`
//! 6. Fill the cache path from the home directory if still unset
//! 7. Validate
//!
//! Env fallbacks are applied before the file layers, so a value written in
//! any file wins over the environment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Env var → dotted config path.
const ENV_FALLBACKS: &[(&str, &str)] = &[
    ("KESTREL_ARTIFACT", "kernel.artifact"),
    ("KESTREL_CACHE_PATH", "cache.path"),
    ("KESTREL_LOG_LEVEL", "logging.level"),
    ("KESTREL_LOG_FORMAT", "logging.format"),
];

/// A loaded configuration together with where it came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The final, validated configuration.
    pub config: Config,
    /// Kestrel home directory used for discovery.
    pub home: PathBuf,
    /// Files merged on top of the embedded defaults, in merge order.
    pub loaded_files: Vec<String>,
}

/// Load the configuration with layered file precedence.
///
/// `home_override` replaces `$KESTREL_HOME` / `~/.kestrel` for user config
/// discovery.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is malformed, or if the
/// final merged configuration fails validation.
pub fn load(explicit: Option<&Path>, home_override: Option<&Path>) -> ConfigResult<ResolvedConfig> {
    load_with_env(explicit, home_override, &collect_env_vars())
}

pub(crate) fn load_with_env(
    explicit: Option<&Path>,
    home_override: Option<&Path>,
    env_vars: &HashMap<String, String>,
) -> ConfigResult<ResolvedConfig> {
    let home = match home_override {
        Some(h) => h.to_path_buf(),
        None => kestrel_home(env_vars)?,
    };

    let mut merged = parse_defaults()?;
    let mut loaded_files = Vec::new();

    let env_count = apply_env_fallbacks(&mut merged, env_vars);
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    let user_path = home.join("config.toml");
    if let Some(overlay) = try_load_file(&user_path)? {
        deep_merge(&mut merged, &overlay);
        loaded_files.push(user_path.display().to_string());
        info!(path = %user_path.display(), "loaded user config");
    }

    if let Some(path) = explicit {
        // An explicit file that does not exist is an error, unlike the user layer.
        let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
            path: path.display().to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;
        deep_merge(&mut merged, &overlay);
        loaded_files.push(path.display().to_string());
        info!(path = %path.display(), "loaded explicit config");
    }

    let mut config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    if config.cache.path.is_none() {
        config.cache.path = Some(home.join("cache").join("artifacts"));
    }

    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        home,
        loaded_files,
    })
}

/// Load a config from a specific file path (no layering, no env).
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read or parsed.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let metadata = std::fs::metadata(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    check_size(path, metadata.len())?;

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_over_defaults(&content, &path.display().to_string())
}

/// Parse a TOML document merged over the embedded defaults.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the document does not parse or fails
/// validation.
pub fn from_toml_str(content: &str) -> ConfigResult<Config> {
    parse_over_defaults(content, "<string>")
}

fn parse_over_defaults(content: &str, origin: &str) -> ConfigResult<Config> {
    let overlay: toml::Value = toml::from_str(content).map_err(|e| ConfigError::ParseError {
        path: origin.to_owned(),
        source: e,
    })?;
    let mut merged = parse_defaults()?;
    deep_merge(&mut merged, &overlay);

    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: origin.to_owned(),
                source: e,
            })?;
    validate::validate(&config)?;
    Ok(config)
}

fn parse_defaults() -> ConfigResult<toml::Value> {
    toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
        path: "<embedded defaults>".to_owned(),
        source: e,
    })
}

fn check_size(path: &Path, len: u64) -> ConfigResult<()> {
    if len > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {len} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit"
            ),
        });
    }
    Ok(())
}

/// Try to load a file, returning `None` if the file doesn't exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    check_size(path, content.len() as u64)?;

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(Some(value))
}

/// Recursively merge `overlay` into `base`. Tables merge key by key; any
/// other value, arrays included, replaces the base value.
pub(crate) fn deep_merge(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_table.insert(key.clone(), value.clone());
                    },
                }
            }
        },
        (base, overlay) => *base = overlay.clone(),
    }
}

fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with("KESTREL_"))
        .collect()
}

/// Write env values into the tree. Returns how many were applied.
fn apply_env_fallbacks(merged: &mut toml::Value, env_vars: &HashMap<String, String>) -> usize {
    let mut applied: usize = 0;
    for (var, dotted) in ENV_FALLBACKS {
        let Some(value) = env_vars.get(*var) else {
            continue;
        };
        if value.trim().is_empty() {
            continue;
        }
        if set_path(merged, dotted, toml::Value::String(value.clone())) {
            debug!(var = *var, field = *dotted, "env fallback applied");
            applied = applied.saturating_add(1);
        }
    }
    applied
}

fn set_path(root: &mut toml::Value, dotted: &str, value: toml::Value) -> bool {
    let mut segments: Vec<&str> = dotted.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return false;
    };
    let mut cursor = root;
    for segment in segments {
        let toml::Value::Table(table) = cursor else {
            return false;
        };
        cursor = table
            .entry(segment.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
    match cursor {
        toml::Value::Table(table) => {
            table.insert(leaf.to_owned(), value);
            true
        },
        _ => false,
    }
}

fn kestrel_home(env_vars: &HashMap<String, String>) -> ConfigResult<PathBuf> {
    if let Some(home) = env_vars.get("KESTREL_HOME").filter(|h| !h.trim().is_empty()) {
        return Ok(PathBuf::from(home));
    }
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".kestrel"))
        .ok_or(ConfigError::NoHomeDir)
}
