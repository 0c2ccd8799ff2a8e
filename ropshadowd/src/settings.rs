//! Monitor configuration for the driver: file loading and command-line
//! overrides.

use std::{
    fs,
    path::Path,
};

use anyhow::{
    Context,
    Result,
    anyhow,
};
use ropshadow_core::{
    DetectionMode,
    MonitorConfig,
};
use ropshadow_logging::LogLevel;
use tracing::debug;

/// Values given on the command line, applied over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    /// Detection mode
    pub mode:            Option<DetectionMode>,
    /// Short sequence threshold
    pub short_threshold: Option<u32>,
    /// Gadget chain threshold
    pub chain_threshold: Option<u32>,
    /// Diagnostic level
    pub log_level:       Option<LogLevel>,
    /// Only print warnings and worse
    pub quiet:           bool,
    /// Disable colour
    pub no_colour:       bool,
    /// Pending unwind contexts per thread
    pub max_pending:     Option<usize>,
}

impl Overrides {
    /// Apply to `config`. `quiet` wins over an explicit level.
    pub fn apply(&self, config: &mut MonitorConfig) {
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(short) = self.short_threshold {
            config.short_sequence_threshold = short;
        }
        if let Some(chain) = self.chain_threshold {
            config.gadget_chain_threshold = chain;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if self.quiet {
            config.log_level = config.log_level.max(LogLevel::Warn);
            config.trace_calls = false;
        }
        if self.no_colour {
            config.colour = false;
        }
        if let Some(max_pending) = self.max_pending {
            config.max_pending_unwinds = max_pending;
        }
    }
}

/// Read a configuration file, TOML unless it ends in `.json`.
///
/// # Errors
///
/// If the file cannot be read or does not parse. Parser messages are kept.
pub fn read_config_file(path: &Path) -> Result<MonitorConfig> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let config: MonitorConfig = if is_json {
        serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))?
    } else {
        toml::from_str(&text).with_context(|| format!("invalid TOML in {}", path.display()))?
    };
    debug!(path = %path.display(), json = is_json, "loaded configuration file");
    Ok(config)
}

/// Build the effective configuration: defaults, then `path`, then
/// `overrides`, then validation.
///
/// # Errors
///
/// If the file cannot be loaded or the result is out of range.
pub fn resolve(path: Option<&Path>, overrides: &Overrides) -> Result<MonitorConfig> {
    let mut config = match path {
        Some(path) => read_config_file(path)?,
        None => MonitorConfig::default(),
    };
    overrides.apply(&mut config);
    config.validate().map_err(|e| anyhow!("invalid configuration: {}", e.message))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_win_over_defaults() {
        let overrides = Overrides {
            mode: Some(DetectionMode::Combined),
            chain_threshold: Some(4),
            no_colour: true,
            ..Overrides::default()
        };
        let config = resolve(None, &overrides).unwrap();
        assert_eq!(config.mode, DetectionMode::Combined);
        assert_eq!(config.gadget_chain_threshold, 4);
        assert!(!config.colour);
    }

    #[test]
    fn test_quiet_raises_level_and_stops_tracing() {
        let overrides = Overrides {
            log_level: Some(LogLevel::Debug),
            quiet: true,
            ..Overrides::default()
        };
        let config = resolve(None, &overrides).unwrap();
        assert_eq!(config.log_level, LogLevel::Warn);
        assert!(!config.trace_calls);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let overrides = Overrides {
            short_threshold: Some(1),
            ..Overrides::default()
        };
        let error = resolve(None, &overrides).unwrap_err();
        assert!(error.to_string().contains("short_sequence_threshold"));
    }
}
