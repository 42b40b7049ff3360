//! Simulated GPIB bus and HP 8563E
//!
//! Provides an in-process spectrum analyzer for testing without hardware.
//! The simulator understands the subset of the HP 8563E mnemonic set the
//! driver uses and keeps the same reportable precision as the instrument.
//!
//! # Available Mocks
//!
//! - `SimulatedAnalyzer` - HP 8563E answering `ID?`, `CF`, `SP`, `RL`,
//!   `FA?`, `FB?`, `MKN`, `MKA?`, `MKF?`, `TDF`, `TRA?`, `SNGLS`, `TS`, `IP`
//! - `SimulatedBus` - ordered set of simulated resources, some of which can
//!   refuse to open
//!
//! # Sweep Model
//!
//! 601 bins across `CF ± SP/2`. Each bin is the power sum of a noise floor
//! (seeded jitter of ±1.5 dB) and one tone with a Gaussian RBW shape,
//! RBW = max(SP/100, 10 Hz).

use crate::adapters::{InstrumentBus, ScpiTransport};
use crate::config::SimulationConfig;
use crate::instrument::hp8563e::{IDENTITY, TRACE_POINTS};
use crate::instrument::trace::{sweep_frequencies, Trace};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tokio::sync::Mutex;

/// GPIB address an HP 8563E ships with.
pub const DEFAULT_RESOURCE: &str = "GPIB0::18::INSTR";

const PRESET_CENTER_HZ: f64 = 13_250_000_000.0;
const PRESET_SPAN_HZ: f64 = 26_500_000_000.0;
const PRESET_REFERENCE_DBM: f64 = 0.0;
const NOISE_JITTER_DB: f64 = 1.5;

/// One command received by a simulated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Resource the command was sent to
    pub resource: String,
    /// Command text as received
    pub command: String,
}

type Journal = Arc<Mutex<Vec<JournalEntry>>>;

struct AnalyzerState {
    center_hz: f64,
    span_hz: f64,
    reference_dbm: f64,
    marker_hz: Option<f64>,
    sweep: Option<Vec<f64>>,
    rng: StdRng,
}

impl AnalyzerState {
    fn preset(seed: u64) -> Self {
        Self {
            center_hz: PRESET_CENTER_HZ,
            span_hz: PRESET_SPAN_HZ,
            reference_dbm: PRESET_REFERENCE_DBM,
            marker_hz: None,
            sweep: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn start_hz(&self) -> f64 {
        self.center_hz - self.span_hz / 2.0
    }

    fn stop_hz(&self) -> f64 {
        self.center_hz + self.span_hz / 2.0
    }
}

/// Simulated HP 8563E spectrum analyzer
///
/// Clones share state, so a clone handed out by [`SimulatedBus::open`]
/// observes and mutates the same instrument.
///
/// # Example
///
/// ```rust,ignore
/// let analyzer = SimulatedAnalyzer::new(&SimulationConfig::default());
/// analyzer.write("CF 8400000000HZ;").await?;
/// assert_eq!(analyzer.query("CF?;").await?, "8400000000");
/// ```
#[derive(Clone)]
pub struct SimulatedAnalyzer {
    resource_name: String,
    identity: String,
    settings: SimulationConfig,
    trace_override: Option<Vec<f64>>,
    state: Arc<Mutex<AnalyzerState>>,
    journal: Journal,
}

impl SimulatedAnalyzer {
    /// Create an analyzer in preset state
    pub fn new(settings: &SimulationConfig) -> Self {
        Self {
            resource_name: DEFAULT_RESOURCE.to_string(),
            identity: IDENTITY.to_string(),
            settings: settings.clone(),
            trace_override: None,
            state: Arc::new(Mutex::new(AnalyzerState::preset(settings.seed))),
            journal: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answer `ID?` with something else, e.g. to pose as another instrument
    pub fn with_identity(mut self, identity: &str) -> Self {
        self.identity = identity.to_string();
        self
    }

    /// Replace synthesized sweeps with a fixed amplitude vector (dBm)
    ///
    /// Frequencies still follow `CF ± SP/2`, one bin per amplitude.
    pub fn with_trace(mut self, amplitudes_dbm: Vec<f64>) -> Self {
        self.trace_override = Some(amplitudes_dbm);
        self
    }

    /// Commands received so far, oldest first
    pub async fn journal(&self) -> Vec<JournalEntry> {
        self.journal.lock().await.clone()
    }

    fn synthesize(&self, state: &mut AnalyzerState) -> Vec<f64> {
        if let Some(trace) = &self.trace_override {
            return trace.clone();
        }

        let rbw_hz = (state.span_hz / 100.0).max(10.0);
        let tone_hz = self.settings.tone_frequency_hz;
        let tone_dbm = self.settings.tone_amplitude_dbm;
        let floor_dbm = self.settings.noise_floor_dbm;

        sweep_frequencies(state.start_hz(), state.stop_hz(), TRACE_POINTS)
            .into_iter()
            .map(|f| {
                let noise_dbm = floor_dbm + state.rng.gen_range(-NOISE_JITTER_DB..NOISE_JITTER_DB);
                // -3 dB at +/- RBW/2
                let offset = 2.0 * (f - tone_hz) / rbw_hz;
                let signal_dbm = tone_dbm - 3.0103 * offset * offset;
                let total_mw = 10f64.powf(noise_dbm / 10.0) + 10f64.powf(signal_dbm / 10.0);
                (10.0 * total_mw.log10() * 100.0).round() / 100.0
            })
            .collect()
    }

    fn current_sweep(&self, state: &mut AnalyzerState) -> Vec<f64> {
        match &state.sweep {
            Some(sweep) => sweep.clone(),
            None => {
                let sweep = self.synthesize(state);
                state.sweep = Some(sweep.clone());
                sweep
            }
        }
    }

    /// Execute one `;`-separated command string, returning the last reply.
    async fn execute(&self, cmd: &str) -> Result<Option<String>> {
        self.journal.lock().await.push(JournalEntry {
            resource: self.resource_name.clone(),
            command: cmd.to_string(),
        });

        let mut state = self.state.lock().await;
        let mut reply = None;

        for token in cmd.split(';').map(str::trim).filter(|t| !t.is_empty()) {
            let token = token.to_ascii_uppercase();
            let (mnemonic, arg) = match token.split_once(char::is_whitespace) {
                Some((m, a)) => (m.to_string(), a.trim().to_string()),
                None => (token.clone(), String::new()),
            };

            match mnemonic.as_str() {
                "ID?" => reply = Some(self.identity.clone()),
                "IP" => {
                    *state = AnalyzerState::preset(self.settings.seed);
                }
                "CF" => {
                    state.center_hz = parse_value(&arg)?.round();
                    state.sweep = None;
                }
                "CF?" => reply = Some(format!("{:.0}", state.center_hz)),
                "SP" => {
                    let span = parse_value(&arg)?;
                    if span < 0.0 {
                        bail!("Span must not be negative: {}", arg);
                    }
                    state.span_hz = span.round();
                    state.sweep = None;
                }
                "SP?" => reply = Some(format!("{:.0}", state.span_hz)),
                "RL" => {
                    state.reference_dbm = (parse_value(&arg)? * 10.0).round() / 10.0;
                }
                "RL?" => reply = Some(format!("{:.2}", state.reference_dbm)),
                "FA?" => reply = Some(format!("{:.0}", state.start_hz())),
                "FB?" => reply = Some(format!("{:.0}", state.stop_hz())),
                "MKN" => {
                    state.marker_hz = Some(if arg.is_empty() {
                        state.center_hz
                    } else {
                        parse_value(&arg)?
                    });
                }
                "MKF?" => {
                    let marker = state.marker_hz.unwrap_or(state.center_hz);
                    reply = Some(format!("{:.0}", marker));
                }
                "MKA?" => {
                    let marker = state.marker_hz.unwrap_or(state.center_hz);
                    let sweep = self.current_sweep(&mut state);
                    let amplitude = Trace::from_sweep(state.start_hz(), state.stop_hz(), sweep)
                        .ok()
                        .and_then(|trace| trace.amplitude_near(marker))
                        .ok_or_else(|| anyhow!("No trace data for marker"))?;
                    reply = Some(format!("{:.2}", amplitude));
                }
                "TDF" => {
                    if arg != "P" {
                        bail!("Unsupported trace data format: {}", arg);
                    }
                }
                "SNGLS" | "CONTS" => {}
                "TS" => {
                    let sweep = self.synthesize(&mut state);
                    state.sweep = Some(sweep);
                }
                "TRA?" => {
                    let sweep = self.current_sweep(&mut state);
                    let values: Vec<String> = sweep.iter().map(|v| format!("{:.2}", v)).collect();
                    reply = Some(values.join(","));
                }
                other => bail!("Unknown command: {}", other),
            }
        }

        Ok(reply)
    }
}

#[async_trait]
impl ScpiTransport for SimulatedAnalyzer {
    async fn query(&self, cmd: &str) -> Result<String> {
        let reply = self
            .execute(cmd)
            .await
            .with_context(|| format!("Simulated query failed for: {}", cmd))?;
        debug!("Simulated query '{}' on {}", cmd, self.resource_name);
        reply.ok_or_else(|| anyhow!("Command '{}' produced no reply", cmd))
    }

    async fn write(&self, cmd: &str) -> Result<()> {
        self.execute(cmd)
            .await
            .with_context(|| format!("Simulated write failed for: {}", cmd))?;
        debug!("Simulated command sent: {}", cmd);
        Ok(())
    }

    fn resource_name(&self) -> &str {
        &self.resource_name
    }
}

/// Parse a numeric argument with an optional HP unit suffix.
///
/// Frequencies scale to Hz; amplitude suffixes are accepted and ignored.
fn parse_value(arg: &str) -> Result<f64> {
    const SUFFIXES: [(&str, f64); 10] = [
        ("GHZ", 1e9),
        ("MHZ", 1e6),
        ("KHZ", 1e3),
        ("HZ", 1.0),
        ("GZ", 1e9),
        ("MZ", 1e6),
        ("KZ", 1e3),
        ("DBM", 1.0),
        ("DM", 1.0),
        ("DB", 1.0),
    ];

    let arg = arg.trim();
    let (number, scale) = SUFFIXES
        .iter()
        .find_map(|(suffix, scale)| arg.strip_suffix(suffix).map(|n| (n, *scale)))
        .unwrap_or((arg, 1.0));

    let value: f64 = number
        .trim()
        .parse()
        .with_context(|| format!("Invalid numeric argument: '{}'", arg))?;
    Ok(value * scale)
}

enum SimulatedDevice {
    Online(SimulatedAnalyzer),
    Unreachable(String),
}

/// Simulated instrument bus
///
/// Lists its devices in insertion order. All devices write into one shared
/// journal.
///
/// # Example
///
/// ```rust,ignore
/// let bus = SimulatedBus::new()
///     .with_device("GPIB0::5::INSTR", SimulatedAnalyzer::new(&cfg).with_identity("HP3478A"))
///     .with_analyzer(&cfg);
/// assert_eq!(bus.list_resources().await?.len(), 2);
/// ```
pub struct SimulatedBus {
    devices: Vec<SimulatedDevice>,
    journal: Journal,
}

impl SimulatedBus {
    /// Create an empty bus (nothing plugged in)
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            journal: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add an HP 8563E at [`DEFAULT_RESOURCE`]
    pub fn with_analyzer(self, settings: &SimulationConfig) -> Self {
        self.with_device(DEFAULT_RESOURCE, SimulatedAnalyzer::new(settings))
    }

    /// Add a simulated device at `resource`
    pub fn with_device(mut self, resource: &str, mut device: SimulatedAnalyzer) -> Self {
        device.resource_name = resource.to_string();
        device.journal = Arc::clone(&self.journal);
        self.devices.push(SimulatedDevice::Online(device));
        self
    }

    /// Add a resource that is listed but cannot be opened
    pub fn with_unreachable(mut self, resource: &str) -> Self {
        self.devices
            .push(SimulatedDevice::Unreachable(resource.to_string()));
        self
    }

    /// Commands received by any device, oldest first
    pub async fn journal(&self) -> Vec<JournalEntry> {
        self.journal.lock().await.clone()
    }
}

impl Default for SimulatedBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstrumentBus for SimulatedBus {
    async fn list_resources(&self) -> Result<Vec<String>> {
        Ok(self
            .devices
            .iter()
            .map(|device| match device {
                SimulatedDevice::Online(analyzer) => analyzer.resource_name.clone(),
                SimulatedDevice::Unreachable(resource) => resource.clone(),
            })
            .collect())
    }

    async fn open(&self, resource: &str) -> Result<Box<dyn ScpiTransport>> {
        for device in &self.devices {
            match device {
                SimulatedDevice::Online(analyzer) if analyzer.resource_name == resource => {
                    return Ok(Box::new(analyzer.clone()));
                }
                SimulatedDevice::Unreachable(name) if name == resource => {
                    bail!("Simulated resource {} did not respond", resource);
                }
                _ => {}
            }
        }
        Err(anyhow!("No simulated resource named {}", resource))
    }

    fn describe(&self) -> String {
        format!("SimulatedBus({} device(s))", self.devices.len())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
