//! Guided walkthrough of the analyzer driver.
//!
//! Finds an analyzer, programs center frequency, span and reference level,
//! takes one single sweep, reads every setting and measurement back, and
//! prints one status line per reading. The trace is returned to the caller
//! for plotting.

use crate::adapters::InstrumentBus;
use crate::config::{SpecAnConfig, WalkthroughConfig};
use crate::error::AppResult;
use crate::instrument::{Peak, SpectrumAnalyzerHP8563E, Trace};
use std::io::Write;
use tracing::{info, warn};

/// Line printed when discovery comes back empty.
pub const NOT_FOUND_MESSAGE: &str = "No spectrum analyzer found.";

/// Everything the walkthrough read back from the analyzer.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkthroughReport {
    /// Resource the analyzer was found on
    pub resource: String,
    /// Center frequency read back, Hz
    pub center_frequency_hz: f64,
    /// Span read back, Hz
    pub span_hz: f64,
    /// Reference level read back, dBm
    pub reference_level_dbm: f64,
    /// Amplitude at the center frequency, dBm
    pub center_frequency_amplitude_dbm: f64,
    /// Sweep maximum
    pub peak: Peak,
    /// Full sweep
    pub trace: Trace,
}

/// Discover an analyzer on `bus` and run the walkthrough against it.
///
/// Returns `Ok(None)` after printing [`NOT_FOUND_MESSAGE`] when no analyzer
/// answers; no command beyond discovery is sent in that case.
pub async fn discover_and_run<W: Write>(
    bus: &dyn InstrumentBus,
    config: &SpecAnConfig,
    out: &mut W,
) -> AppResult<Option<WalkthroughReport>> {
    let Some(spec_an) = SpectrumAnalyzerHP8563E::find(bus, &config.instrument.identity).await?
    else {
        warn!("Discovery on {} found no analyzer", bus.describe());
        writeln!(out, "{}", NOT_FOUND_MESSAGE)?;
        return Ok(None);
    };

    run(&spec_an, &config.walkthrough, out).await.map(Some)
}

/// Program the analyzer and read everything back.
pub async fn run<W: Write>(
    spec_an: &SpectrumAnalyzerHP8563E,
    settings: &WalkthroughConfig,
    out: &mut W,
) -> AppResult<WalkthroughReport> {
    info!(
        "Running walkthrough on {} ({})",
        spec_an.resource(),
        spec_an.identity()
    );

    spec_an
        .set_center_frequency(settings.center_frequency_hz)
        .await?;
    spec_an.set_span(settings.span_hz).await?;
    spec_an
        .set_reference_level(settings.reference_level_dbm)
        .await?;

    // One single sweep feeds the marker read, the peak and the plotted trace
    spec_an.take_sweep().await?;

    let center_frequency = spec_an.get_center_frequency().await?;
    writeln!(out, "The center frequency is {} Hz.", center_frequency)?;

    let span = spec_an.get_span().await?;
    writeln!(out, "The span is {} Hz.", span)?;

    let reference_level = spec_an.get_reference_level().await?;
    writeln!(out, "The reference level is {} dBm.", reference_level)?;

    let center_frequency_amplitude = spec_an.get_center_frequency_amplitude().await?;
    writeln!(
        out,
        "The center frequency amplitude is {} dBm at {} Hz.",
        center_frequency_amplitude, center_frequency
    )?;

    let (peak_frequency, peak_amplitude) = spec_an.get_peak_frequency_and_amplitude().await?;
    writeln!(
        out,
        "The peak amplitude is {} dBm at {} Hz.",
        peak_amplitude, peak_frequency
    )?;

    let (trace_frequencies, trace_amplitudes) =
        spec_an.get_trace_frequencies_and_amplitudes().await?;
    let trace = Trace::new(trace_frequencies, trace_amplitudes)?;
    info!("Acquired trace with {} points", trace.len());

    Ok(WalkthroughReport {
        resource: spec_an.resource().to_string(),
        center_frequency_hz: center_frequency,
        span_hz: span,
        reference_level_dbm: reference_level,
        center_frequency_amplitude_dbm: center_frequency_amplitude,
        peak: Peak {
            frequency_hz: peak_frequency,
            amplitude_dbm: peak_amplitude,
        },
        trace,
    })
}
