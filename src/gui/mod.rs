//! Trace viewer built on eframe/egui.
//!
//! [`show_trace`] opens a native window holding one egui_plot line of the
//! sweep (x = frequency in Hz, y = amplitude in dBm) with the peak marked,
//! and returns when the window is closed.
//!
//! The window needs the `gui` feature. Without it [`show_trace`] returns
//! `SpecAnError::FeatureNotEnabled`.

#[cfg(feature = "gui")]
mod trace_plot;

#[cfg(feature = "gui")]
pub use trace_plot::TraceViewer;

use crate::config::PlotConfig;
use crate::error::AppResult;
use crate::instrument::Trace;

/// Label of the frequency axis.
pub const FREQUENCY_AXIS_LABEL: &str = "Frequency (Hz)";

/// Label of the amplitude axis.
pub const AMPLITUDE_AXIS_LABEL: &str = "Amplitude (dBm)";

/// Appearance of the trace viewer.
#[derive(Debug, Clone, PartialEq)]
pub struct TracePlotOptions {
    /// Window title and plot heading
    pub title: String,
    /// X axis label
    pub x_label: String,
    /// Y axis label
    pub y_label: String,
    /// Initial window size in points
    pub size: [f32; 2],
}

impl Default for TracePlotOptions {
    fn default() -> Self {
        Self::from(&PlotConfig::default())
    }
}

impl From<&PlotConfig> for TracePlotOptions {
    fn from(config: &PlotConfig) -> Self {
        Self {
            title: config.title.clone(),
            x_label: FREQUENCY_AXIS_LABEL.to_string(),
            y_label: AMPLITUDE_AXIS_LABEL.to_string(),
            size: [config.width, config.height],
        }
    }
}

/// Trace samples as `[frequency_hz, amplitude_dbm]` plot points.
pub fn plot_points(trace: &Trace) -> Vec<[f64; 2]> {
    trace.points().map(|(f, a)| [f, a]).collect()
}

/// Open the viewer and block until it is closed.
///
/// Must be called from the main thread.
#[cfg(feature = "gui")]
pub fn show_trace(trace: Trace, options: TracePlotOptions) -> AppResult<()> {
    trace_plot::run(trace, options)
}

/// Open the viewer and block until it is closed.
#[cfg(not(feature = "gui"))]
pub fn show_trace(_trace: Trace, _options: TracePlotOptions) -> AppResult<()> {
    Err(crate::error::SpecAnError::FeatureNotEnabled(
        "gui".to_string(),
    ))
}
