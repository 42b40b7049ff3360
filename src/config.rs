//! Layered configuration using Figment.
//!
//! Configuration is assembled from, in increasing precedence:
//! 1. built-in defaults,
//! 2. a TOML file (default: `config/spec_an.toml`, optional),
//! 3. environment variables prefixed with `SPECAN_`.
//!
//! Nested keys use a double underscore in environment variables:
//!
//! ```text
//! SPECAN_APPLICATION__LOG_LEVEL=debug
//! SPECAN_INSTRUMENT__TIMEOUT_MS=2000
//! SPECAN_SIMULATION__ENABLED=true
//! ```
//!
//! # Example
//!
//! ```no_run
//! use spec_an::config::SpecAnConfig;
//!
//! let config = SpecAnConfig::load()?;
//! println!("Looking for: {}", config.instrument.identity);
//! # Ok::<(), spec_an::SpecAnError>(())
//! ```

use crate::error::AppResult;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/spec_an.toml";

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "SPECAN_";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A provider failed or a value had the wrong type.
    #[error("Configuration load error: {0}")]
    Load(#[from] figment::Error),
    /// Values parsed but are not usable.
    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecAnConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// How the analyzer is located and talked to
    #[serde(default)]
    pub instrument: InstrumentConfig,
    /// Settings applied by the walkthrough
    #[serde(default)]
    pub walkthrough: WalkthroughConfig,
    /// Trace viewer appearance
    #[serde(default)]
    pub plot: PlotConfig,
    /// Simulated bus used instead of VISA
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "spec_an".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Instrument discovery and transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// VISA resource expression used to enumerate candidates
    pub resource_filter: String,
    /// Substring expected in the `ID?` reply
    pub identity: String,
    /// Read/write timeout in milliseconds
    pub timeout_ms: u64,
    /// Appended to every command written to the bus
    pub write_terminator: String,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            resource_filter: "GPIB?*INSTR".to_string(),
            identity: crate::instrument::hp8563e::IDENTITY.to_string(),
            timeout_ms: 5000,
            write_terminator: "\n".to_string(),
        }
    }
}

/// Values the walkthrough programs into the analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkthroughConfig {
    /// Center frequency in Hz
    pub center_frequency_hz: f64,
    /// Span in Hz
    pub span_hz: f64,
    /// Reference level in dBm
    pub reference_level_dbm: f64,
}

impl Default for WalkthroughConfig {
    fn default() -> Self {
        Self {
            center_frequency_hz: 8_400_000_000.0,
            span_hz: 1_000_000.0,
            reference_level_dbm: -10.0,
        }
    }
}

/// Trace viewer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotConfig {
    /// Window and plot title
    pub title: String,
    /// Initial window width in points
    pub width: f32,
    /// Initial window height in points
    pub height: f32,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            title: "Spectrum Analyzer Trace Data".to_string(),
            width: 900.0,
            height: 600.0,
        }
    }
}

/// Simulated analyzer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Use the simulated bus instead of VISA
    pub enabled: bool,
    /// Frequency of the synthetic tone in Hz
    pub tone_frequency_hz: f64,
    /// Level of the synthetic tone in dBm
    pub tone_amplitude_dbm: f64,
    /// Mean noise floor in dBm
    pub noise_floor_dbm: f64,
    /// Seed for sweep noise
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tone_frequency_hz: 8_400_000_000.0,
            tone_amplitude_dbm: -25.0,
            noise_floor_dbm: -90.0,
            seed: 8563,
        }
    }
}

impl SpecAnConfig {
    /// Load configuration from `config/spec_an.toml` and environment variables.
    ///
    /// # Errors
    ///
    /// Returns `SpecAnError::Config` if a provider fails or validation rejects
    /// a value.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file is not an error; defaults and environment overrides
    /// still apply.
    ///
    /// # Errors
    ///
    /// Returns `SpecAnError::Config` if the file is malformed or invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(ConfigError::from)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` describing the first offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.instrument.identity.trim().is_empty() {
            return Err(ConfigError::Validation(
                "instrument.identity cannot be empty".to_string(),
            ));
        }

        if self.instrument.resource_filter.trim().is_empty() {
            return Err(ConfigError::Validation(
                "instrument.resource_filter cannot be empty".to_string(),
            ));
        }

        if self.instrument.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "instrument.timeout_ms must be greater than 0".to_string(),
            ));
        }

        let walk = &self.walkthrough;
        if !walk.center_frequency_hz.is_finite() || walk.center_frequency_hz < 0.0 {
            return Err(ConfigError::Validation(format!(
                "walkthrough.center_frequency_hz must be a non-negative number, got {}",
                walk.center_frequency_hz
            )));
        }
        if !walk.span_hz.is_finite() || walk.span_hz < 0.0 {
            return Err(ConfigError::Validation(format!(
                "walkthrough.span_hz must be a non-negative number, got {}",
                walk.span_hz
            )));
        }
        if !walk.reference_level_dbm.is_finite() {
            return Err(ConfigError::Validation(
                "walkthrough.reference_level_dbm must be finite".to_string(),
            ));
        }

        if self.plot.width <= 0.0 || self.plot.height <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "plot size must be positive, got {}x{}",
                self.plot.width, self.plot.height
            )));
        }

        Ok(())
    }
}
