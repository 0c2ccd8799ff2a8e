// ropshadow - ropshadow-core
// Module: Configuration
//
// Copyright (c) 2025 The ropshadow Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Monitor configuration.
//!
//! ```toml
//! mode = "combined"
//! short_sequence_threshold = 5
//! gadget_chain_threshold = 3
//! trace_calls = true
//! log_level = "debug"
//! colour = false
//! max_pending_unwinds = 16
//! ```

use core::{
    fmt,
    str::FromStr,
};
use std::path::Path;

use ropshadow_error::{
    Error,
    Result,
};
use ropshadow_logging::LogLevel;
use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    exception::PendingUnwinds,
    heuristic::HeuristicThresholds,
};

/// Which detectors run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMode {
    /// Shadow stack verification only
    #[default]
    ShadowStack,
    /// Gadget-chain heuristic only
    GadgetHeuristic,
    /// Both
    Combined,
}

impl DetectionMode {
    /// Whether calls and returns are verified against the shadow stack
    #[must_use]
    pub const fn shadow_stack(self) -> bool {
        matches!(self, Self::ShadowStack | Self::Combined)
    }

    /// Whether instructions feed the gadget-chain heuristic
    #[must_use]
    pub const fn heuristic(self) -> bool {
        matches!(self, Self::GadgetHeuristic | Self::Combined)
    }

    /// Name as used in configuration files
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ShadowStack => "shadow-stack",
            Self::GadgetHeuristic => "gadget-heuristic",
            Self::Combined => "combined",
        }
    }
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "shadow-stack" | "shadow" => Ok(Self::ShadowStack),
            "gadget-heuristic" | "heuristic" | "rop" => Ok(Self::GadgetHeuristic),
            "combined" | "both" => Ok(Self::Combined),
            _ => Err(Error::invalid_argument(
                "mode must be shadow-stack, gadget-heuristic or combined",
            )),
        }
    }
}

/// Monitor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// Detectors to run
    pub mode:                     DetectionMode,
    /// A sequence is short when fewer than this minus one instructions
    /// precede its return
    pub short_sequence_threshold: u32,
    /// Detection fires after this minus one short sequences in a row
    pub gadget_chain_threshold:   u32,
    /// Print a line for every call and return
    pub trace_calls:              bool,
    /// Lowest diagnostic level printed; call and return lines are `trace`
    pub log_level:                LogLevel,
    /// Colour diagnostic lines
    pub colour:                   bool,
    /// Unresolved unwind contexts kept per thread
    pub max_pending_unwinds:      usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            mode:                     DetectionMode::default(),
            short_sequence_threshold: HeuristicThresholds::DEFAULT_SHORT_SEQUENCE,
            gadget_chain_threshold:   HeuristicThresholds::DEFAULT_GADGET_CHAIN,
            trace_calls:              true,
            log_level:                LogLevel::Trace,
            colour:                   true,
            max_pending_unwinds:      PendingUnwinds::DEFAULT_LIMIT,
        }
    }
}

impl MonitorConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// A parse error for malformed TOML or unknown keys, a validation error
    /// for out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|_| Error::config_parse_error("Invalid TOML configuration"))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// As for [`MonitorConfig::from_toml_str`].
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|_| Error::config_parse_error("Invalid JSON configuration"))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a file, as JSON if its extension is `.json` and TOML otherwise.
    ///
    /// # Errors
    ///
    /// An I/O error if the file cannot be read, otherwise as for the string
    /// parsers.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) {
            Self::from_json_str(&text)
        } else {
            Self::from_toml_str(&text)
        }
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// A validation error naming the first offending value.
    pub fn validate(&self) -> Result<()> {
        if self.short_sequence_threshold < 2 {
            return Err(Error::invalid_configuration(
                "short_sequence_threshold must be at least 2",
            ));
        }
        if self.gadget_chain_threshold < 2 {
            return Err(Error::invalid_configuration(
                "gadget_chain_threshold must be at least 2",
            ));
        }
        if self.max_pending_unwinds == 0 {
            return Err(Error::invalid_configuration(
                "max_pending_unwinds must be at least 1",
            ));
        }
        Ok(())
    }

    /// Heuristic thresholds
    #[must_use]
    pub const fn thresholds(&self) -> HeuristicThresholds {
        HeuristicThresholds {
            short_sequence: self.short_sequence_threshold,
            gadget_chain:   self.gadget_chain_threshold,
        }
    }
}
