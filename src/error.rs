//! Custom error types for the library.
//!
//! `SpecAnError` is the single error type surfaced by the driver, the trace
//! model, the configuration layer and the viewer. Transport adapters work in
//! `anyhow::Result` so they can attach `.context(..)` to every VISA call; the
//! driver folds those chains into [`SpecAnError::Transport`] at the boundary.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: loading or validating the layered configuration failed.
//! - **`Io`**: writing walkthrough status lines failed.
//! - **`Transport`**: the bus or an open session reported a failure.
//! - **`InvalidResponse`**: the analyzer answered, but not with what was asked for.
//! - **`InvalidSetting`**: a setter was given a value the analyzer cannot take.
//!   Nothing is sent in that case.
//! - **`TraceLengthMismatch`** / **`EmptyTrace`**: a trace violated its shape.
//! - **`Render`**: the trace viewer could not be started.
//! - **`FeatureNotEnabled`**: the code path needs a cargo feature that was
//!   compiled out.

use crate::config::ConfigError;
use thiserror::Error;

/// Convenience alias for results using the library error type.
pub type AppResult<T> = std::result::Result<T, SpecAnError>;

/// Errors raised by the spectrum analyzer library.
#[derive(Error, Debug)]
pub enum SpecAnError {
    /// Configuration could not be loaded or failed validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Writing output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The instrument bus or session reported a failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The instrument replied with something that could not be interpreted.
    #[error("Invalid response to '{command}': '{response}'")]
    InvalidResponse {
        /// Command that produced the reply
        command: String,
        /// Raw reply text
        response: String,
    },

    /// A setter was called with a value outside what the analyzer accepts.
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    /// Frequency and amplitude sequences of a trace differ in length.
    #[error("Trace length mismatch: {frequencies} frequencies vs {amplitudes} amplitudes")]
    TraceLengthMismatch {
        /// Number of frequency samples
        frequencies: usize,
        /// Number of amplitude samples
        amplitudes: usize,
    },

    /// A trace with no samples was used where a sweep was required.
    #[error("Trace contains no samples")]
    EmptyTrace,

    /// The trace viewer failed.
    #[error("Render error: {0}")]
    Render(String),

    /// Functionality was compiled out.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl From<anyhow::Error> for SpecAnError {
    fn from(err: anyhow::Error) -> Self {
        SpecAnError::Transport(format!("{err:#}"))
    }
}
