//! Bridge from `kestrel_config` sections to runtime types.

use kestrel_config::Config;
use kestrel_telemetry::{LogConfig, LogFormat};

/// Logging setup described by the `[logging]` section.
///
/// `logs_dir` is used when `to_file` is set.
pub(crate) fn to_log_config(config: &Config, logs_dir: &std::path::Path) -> LogConfig {
    let logging = &config.logging;
    let format = logging.format.parse().unwrap_or(LogFormat::Compact);
    let mut log_config = LogConfig::new(logging.level.clone()).with_format(format);
    for directive in &logging.directives {
        log_config = log_config.with_directive(directive.clone());
    }
    if logging.to_file {
        log_config = log_config.with_file_logging(logs_dir);
    }
    log_config
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use kestrel_telemetry::LogTarget;

    use super::*;

    #[test]
    fn test_logging_section_maps_to_log_config() {
        let config = Config::from_toml_str(
            r#"
            [logging]
            level = "debug"
            format = "json"
            directives = ["kestrel_artifact=trace"]
            to_file = true
            "#,
        )
        .unwrap();

        let log_config = to_log_config(&config, Path::new("/var/log/kestrel"));
        assert_eq!(log_config.level, "debug");
        assert_eq!(log_config.format, LogFormat::Json);
        assert_eq!(log_config.directives, vec!["kestrel_artifact=trace".to_string()]);
        assert_eq!(
            log_config.target,
            LogTarget::File("/var/log/kestrel".into())
        );
    }
}
