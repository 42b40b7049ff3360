//! HP 8563E spectrum analyzer driver
//!
//! Talks to the analyzer with its HP-IB mnemonic command set through any
//! [`ScpiTransport`]. Commands are `;`-terminated, frequencies are sent in Hz
//! and amplitudes in dBm.
//!
//! | Operation | Command |
//! |---|---|
//! | identity | `ID?` |
//! | center frequency | `CF <hz>HZ;` / `CF?;` |
//! | span | `SP <hz>HZ;` / `SP?;` |
//! | reference level | `RL <dbm>DM;` / `RL?;` |
//! | sweep bounds | `FA?;` / `FB?;` |
//! | marker amplitude | `MKN <hz>HZ;` then `MKA?;` |
//! | trace A | `TDF P;` then `TRA?;` |
//!
//! # Example Usage
//!
//! ```no_run
//! use spec_an::adapters::VisaBus;
//! use spec_an::instrument::SpectrumAnalyzerHP8563E;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bus = VisaBus::new("GPIB?*INSTR");
//!     let Some(spec_an) = SpectrumAnalyzerHP8563E::find(&bus, "HP8563E").await? else {
//!         println!("No spectrum analyzer found.");
//!         return Ok(());
//!     };
//!
//!     spec_an.set_center_frequency(8_400_000_000.0).await?;
//!     let (freq, amp) = spec_an.get_peak_frequency_and_amplitude().await?;
//!     println!("Peak: {} dBm at {} Hz", amp, freq);
//!     Ok(())
//! }
//! ```

use crate::adapters::{InstrumentBus, ScpiTransport};
use crate::error::{AppResult, SpecAnError};
use crate::instrument::trace::{Peak, Trace};
use tracing::{debug, info, warn};

/// Substring of the `ID?` reply identifying the analyzer.
pub const IDENTITY: &str = "HP8563E";

/// Number of points in one HP 8563E trace.
pub const TRACE_POINTS: usize = 601;

/// Open session to an HP 8563E.
pub struct SpectrumAnalyzerHP8563E {
    transport: Box<dyn ScpiTransport>,
    identity: String,
}

impl SpectrumAnalyzerHP8563E {
    /// Wrap an already open transport.
    ///
    /// `identity` is the `ID?` reply, if known.
    pub fn new(transport: Box<dyn ScpiTransport>, identity: impl Into<String>) -> Self {
        Self {
            transport,
            identity: identity.into(),
        }
    }

    /// Scan `bus` for an analyzer whose `ID?` reply contains `identity`.
    ///
    /// Resources are tried in bus order; the first match wins. Resources that
    /// fail to open, do not answer, or answer with another identity are
    /// skipped. `Ok(None)` means nothing matched.
    ///
    /// # Errors
    /// Only when the bus itself cannot be enumerated.
    pub async fn find(bus: &dyn InstrumentBus, identity: &str) -> AppResult<Option<Self>> {
        let resources = bus.list_resources().await?;
        debug!("{} lists {} resource(s)", bus.describe(), resources.len());

        for resource in resources {
            let transport = match bus.open(&resource).await {
                Ok(transport) => transport,
                Err(e) => {
                    warn!("Skipping {}: {:#}", resource, e);
                    continue;
                }
            };

            match transport.query("ID?").await {
                Ok(reply) if reply.trim().contains(identity) => {
                    info!("Found {} at {}", reply.trim(), resource);
                    return Ok(Some(Self::new(transport, reply.trim())));
                }
                Ok(reply) => {
                    debug!("{} identifies as '{}', not {}", resource, reply.trim(), identity);
                }
                Err(e) => {
                    warn!("Skipping {}: no reply to ID? ({:#})", resource, e);
                }
            }
        }

        info!("No {} found on {}", identity, bus.describe());
        Ok(None)
    }

    /// Resource name of the session.
    pub fn resource(&self) -> &str {
        self.transport.resource_name()
    }

    /// `ID?` reply captured when the session was created.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Query the instrument identity.
    pub async fn identify(&self) -> AppResult<String> {
        Ok(self.query("ID?").await?.trim().to_string())
    }

    /// Instrument preset (`IP`).
    pub async fn preset(&self) -> AppResult<()> {
        self.write("IP;").await
    }

    /// Switch to single sweep and take one sweep.
    pub async fn take_sweep(&self) -> AppResult<()> {
        self.write("SNGLS;TS;").await
    }

    /// Set the center frequency in Hz.
    pub async fn set_center_frequency(&self, hz: f64) -> AppResult<()> {
        check_frequency("center frequency", hz)?;
        self.write(&format!("CF {:.0}HZ;", hz)).await
    }

    /// Center frequency in Hz.
    pub async fn get_center_frequency(&self) -> AppResult<f64> {
        self.query_number("CF?;").await
    }

    /// Set the span in Hz. Zero selects zero span.
    pub async fn set_span(&self, hz: f64) -> AppResult<()> {
        check_frequency("span", hz)?;
        self.write(&format!("SP {:.0}HZ;", hz)).await
    }

    /// Span in Hz.
    pub async fn get_span(&self) -> AppResult<f64> {
        self.query_number("SP?;").await
    }

    /// Set the reference level in dBm.
    pub async fn set_reference_level(&self, dbm: f64) -> AppResult<()> {
        if !dbm.is_finite() {
            return Err(SpecAnError::InvalidSetting(format!(
                "reference level must be finite, got {}",
                dbm
            )));
        }
        self.write(&format!("RL {:.2}DM;", dbm)).await
    }

    /// Reference level in dBm.
    pub async fn get_reference_level(&self) -> AppResult<f64> {
        self.query_number("RL?;").await
    }

    /// Sweep start frequency in Hz.
    pub async fn get_start_frequency(&self) -> AppResult<f64> {
        self.query_number("FA?;").await
    }

    /// Sweep stop frequency in Hz.
    pub async fn get_stop_frequency(&self) -> AppResult<f64> {
        self.query_number("FB?;").await
    }

    /// Amplitude in dBm at the current center frequency.
    ///
    /// Places the normal marker on the center frequency and reads it.
    pub async fn get_center_frequency_amplitude(&self) -> AppResult<f64> {
        let center = self.get_center_frequency().await?;
        self.write(&format!("MKN {:.0}HZ;", center)).await?;
        self.query_number("MKA?;").await
    }

    /// Frequency (Hz) and amplitude (dBm) of the sweep maximum.
    ///
    /// Computed from the acquired trace; equal maxima resolve to the lowest
    /// frequency.
    pub async fn get_peak(&self) -> AppResult<Peak> {
        self.get_trace().await?.peak().ok_or(SpecAnError::EmptyTrace)
    }

    /// `(frequency_hz, amplitude_dbm)` of the sweep maximum.
    pub async fn get_peak_frequency_and_amplitude(&self) -> AppResult<(f64, f64)> {
        Ok(self.get_peak().await?.into())
    }

    /// Read trace A with its frequency axis.
    pub async fn get_trace(&self) -> AppResult<Trace> {
        self.write("TDF P;").await?;
        let command = "TRA?;";
        let reply = self.query(command).await?;
        let amplitudes = parse_trace(command, &reply)?;

        let start = self.get_start_frequency().await?;
        let stop = self.get_stop_frequency().await?;
        debug!(
            "Trace: {} points from {} Hz to {} Hz",
            amplitudes.len(),
            start,
            stop
        );
        Trace::from_sweep(start, stop, amplitudes)
    }

    /// Trace A as `(frequencies_hz, amplitudes_dbm)`.
    pub async fn get_trace_frequencies_and_amplitudes(&self) -> AppResult<(Vec<f64>, Vec<f64>)> {
        Ok(self.get_trace().await?.into_parts())
    }

    async fn write(&self, cmd: &str) -> AppResult<()> {
        debug!("-> {}", cmd);
        self.transport.write(cmd).await?;
        Ok(())
    }

    async fn query(&self, cmd: &str) -> AppResult<String> {
        debug!("-> {}", cmd);
        Ok(self.transport.query(cmd).await?)
    }

    async fn query_number(&self, cmd: &str) -> AppResult<f64> {
        let reply = self.query(cmd).await?;
        parse_number(cmd, &reply)
    }
}

fn check_frequency(name: &str, hz: f64) -> AppResult<()> {
    if !hz.is_finite() || hz < 0.0 {
        return Err(SpecAnError::InvalidSetting(format!(
            "{} must be a non-negative number of Hz, got {}",
            name, hz
        )));
    }
    Ok(())
}

/// Parse a numeric reply such as `8400000000`, `8.4E+09` or `-10.00;`.
fn parse_number(command: &str, reply: &str) -> AppResult<f64> {
    let trimmed = reply.trim().trim_end_matches(';').trim();
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(SpecAnError::InvalidResponse {
            command: command.to_string(),
            response: reply.to_string(),
        }),
    }
}

/// Parse a comma separated `TRA?` reply. Any bad element fails the trace.
fn parse_trace(command: &str, reply: &str) -> AppResult<Vec<f64>> {
    let trimmed = reply.trim().trim_end_matches(';').trim();
    if trimmed.is_empty() {
        return Err(SpecAnError::EmptyTrace);
    }
    trimmed
        .split(',')
        .map(|value| parse_number(command, value))
        .collect()
}
