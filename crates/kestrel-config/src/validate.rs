//! Post-merge configuration validation.
//!
//! Coordinates are shape-checked here as strings; full parsing happens in
//! the kernel builder.

use std::collections::HashSet;

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Upper bound for `launcher.max_restarts`.
const MAX_RESTARTS_UPPER_BOUND: u32 = 1000;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_kernel(config)?;
    validate_repositories(config)?;
    validate_cache(config)?;
    validate_logging(config)?;
    validate_launcher(config)?;
    Ok(())
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

/// `group:artifact[:version]` with non-empty group segments.
fn coordinate_shape_ok(raw: &str) -> bool {
    let parts: Vec<&str> = raw.split(':').collect();
    let (group, artifact, version) = match parts.as_slice() {
        [g, a] => (*g, *a, None),
        [g, a, v] => (*g, *a, Some(*v)),
        _ => return false,
    };
    if group.is_empty() || group.split('.').any(str::is_empty) {
        return false;
    }
    if raw.chars().any(|c| c.is_whitespace() || c == '/' || c == '\\') {
        return false;
    }
    match version {
        Some(v) => !v.is_empty() && !artifact.is_empty(),
        None => true,
    }
}

fn validate_kernel(config: &Config) -> ConfigResult<()> {
    let k = &config.kernel;
    if !coordinate_shape_ok(&k.artifact) {
        return Err(invalid(
            "kernel.artifact",
            format!("'{}' is not a valid group:artifact[:version] coordinate", k.artifact),
        ));
    }
    for (i, entry) in k.preload.iter().enumerate() {
        if !coordinate_shape_ok(&entry.coordinate) {
            return Err(invalid(
                format!("kernel.preload[{i}].coordinate"),
                format!("'{}' is not a valid coordinate", entry.coordinate),
            ));
        }
        if !matches!(entry.isolation.as_str(), "none" | "partial" | "full") {
            return Err(invalid(
                format!("kernel.preload[{i}].isolation"),
                format!(
                    "unknown isolation '{}'; expected one of: none, partial, full",
                    entry.isolation
                ),
            ));
        }
    }
    Ok(())
}

fn validate_repositories(config: &Config) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for (i, repo) in config.repositories.iter().enumerate() {
        if repo.id.trim().is_empty() {
            return Err(invalid(format!("repositories[{i}].id"), "id must not be empty"));
        }
        if !seen.insert(repo.id.as_str()) {
            return Err(invalid(
                format!("repositories[{i}].id"),
                format!("duplicate repository id '{}'", repo.id),
            ));
        }
        if repo.path.as_os_str().is_empty() {
            return Err(invalid(
                format!("repositories[{i}].path"),
                "path must not be empty",
            ));
        }
    }
    Ok(())
}

fn validate_cache(config: &Config) -> ConfigResult<()> {
    if let Some(path) = &config.cache.path
        && path.as_os_str().is_empty()
    {
        return Err(invalid("cache.path", "cache path must not be empty"));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;
    if !matches!(l.format.as_str(), "pretty" | "compact" | "json") {
        return Err(invalid(
            "logging.format",
            format!(
                "unknown log format '{}'; expected one of: pretty, compact, json",
                l.format
            ),
        ));
    }
    if l.level.trim().is_empty() {
        return Err(invalid("logging.level", "level must not be empty"));
    }
    Ok(())
}

fn validate_launcher(config: &Config) -> ConfigResult<()> {
    if config.launcher.max_restarts > MAX_RESTARTS_UPPER_BOUND {
        return Err(invalid(
            "launcher.max_restarts",
            format!("max_restarts must be at most {MAX_RESTARTS_UPPER_BOUND}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::types::{PreloadEntry, RepositoryDescriptor};

    fn field_of(err: ConfigError) -> String {
        match err {
            ConfigError::ValidationError { field, .. } => field,
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_rejects_bad_kernel_artifact() {
        for bad in ["", "nogroup", "org..example:a:1", "org:a:", "org::1", "a:b:c:d"] {
            let mut config = Config::default();
            config.kernel.artifact = bad.to_owned();
            let err = validate(&config).unwrap_err();
            assert_eq!(field_of(err), "kernel.artifact", "input {bad:?}");
        }
    }

    #[test]
    fn test_accepts_unversioned_kernel_artifact() {
        let mut config = Config::default();
        config.kernel.artifact = "io.kestrel:kernel".to_owned();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_rejects_unknown_preload_isolation() {
        let mut config = Config::default();
        config.kernel.preload.push(PreloadEntry {
            coordinate: "org.example:widgets:1.0".to_owned(),
            isolation: "sandboxed".to_owned(),
        });
        let err = validate(&config).unwrap_err();
        assert_eq!(field_of(err), "kernel.preload[0].isolation");
    }

    #[test]
    fn test_rejects_duplicate_repository_ids() {
        let mut config = Config::default();
        for path in ["/a", "/b"] {
            config.repositories.push(RepositoryDescriptor {
                id: "local".to_owned(),
                path: PathBuf::from(path),
                enabled: true,
            });
        }
        let err = validate(&config).unwrap_err();
        assert_eq!(field_of(err), "repositories[1].id");
    }

    #[test]
    fn test_rejects_empty_cache_path() {
        let mut config = Config::default();
        config.cache.path = Some(PathBuf::new());
        let err = validate(&config).unwrap_err();
        assert_eq!(field_of(err), "cache.path");
    }

    #[test]
    fn test_rejects_unknown_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_owned();
        let err = validate(&config).unwrap_err();
        assert_eq!(field_of(err), "logging.format");
    }

    #[test]
    fn test_max_restarts_bound() {
        let mut config = Config::default();
        config.launcher.max_restarts = 1000;
        assert!(validate(&config).is_ok());
        config.launcher.max_restarts = 1001;
        let err = validate(&config).unwrap_err();
        assert_eq!(field_of(err), "launcher.max_restarts");
    }
}
