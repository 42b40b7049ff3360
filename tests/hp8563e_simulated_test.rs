//! Integration tests for the HP 8563E driver against the simulated bus
//!
//! These tests verify that the driver:
//! - Finds the analyzer and skips other or dead resources
//! - Round-trips center frequency, span and reference level
//! - Reads the center amplitude, the peak and full traces
//! - Refuses bad settings and bad replies

use anyhow::Result;
use async_trait::async_trait;
use spec_an::adapters::mock::DEFAULT_RESOURCE;
use spec_an::adapters::{ScpiTransport, SimulatedAnalyzer, SimulatedBus};
use spec_an::config::SimulationConfig;
use spec_an::instrument::hp8563e::TRACE_POINTS;
use spec_an::{SpecAnError, SpectrumAnalyzerHP8563E};

fn settings() -> SimulationConfig {
    SimulationConfig::default()
}

async fn connect(bus: &SimulatedBus) -> SpectrumAnalyzerHP8563E {
    SpectrumAnalyzerHP8563E::find(bus, "HP8563E")
        .await
        .expect("discovery failed")
        .expect("analyzer not found")
}

fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {} ± {}, got {}",
        expected,
        tolerance,
        actual
    );
}

/// An empty bus is "not found", not an error
#[tokio::test]
async fn test_find_on_empty_bus() {
    let bus = SimulatedBus::new();
    let found = SpectrumAnalyzerHP8563E::find(&bus, "HP8563E").await.unwrap();
    assert!(found.is_none());
    assert!(bus.journal().await.is_empty());
}

/// Only other instruments on the bus
#[tokio::test]
async fn test_find_ignores_other_instruments() {
    let bus = SimulatedBus::new()
        .with_device(
            "GPIB0::7::INSTR",
            SimulatedAnalyzer::new(&settings()).with_identity("HP3478A"),
        )
        .with_unreachable("GPIB0::9::INSTR");

    let found = SpectrumAnalyzerHP8563E::find(&bus, "HP8563E").await.unwrap();
    assert!(found.is_none());

    // Only the identity query went out
    let journal = bus.journal().await;
    assert_eq!(journal.len(), 1);
    assert_eq!(journal[0].command, "ID?");
}

/// Dead and foreign resources before the analyzer are skipped
#[tokio::test]
async fn test_find_skips_to_first_match() {
    let bus = SimulatedBus::new()
        .with_unreachable("GPIB0::2::INSTR")
        .with_device(
            "GPIB0::7::INSTR",
            SimulatedAnalyzer::new(&settings()).with_identity("HP3478A"),
        )
        .with_analyzer(&settings())
        .with_device("GPIB0::20::INSTR", SimulatedAnalyzer::new(&settings()));

    let spec_an = connect(&bus).await;
    assert_eq!(spec_an.resource(), DEFAULT_RESOURCE);
    assert_eq!(spec_an.identity(), "HP8563E");
    assert_eq!(spec_an.identify().await.unwrap(), "HP8563E");
}

#[tokio::test]
async fn test_center_frequency_round_trip() {
    let bus = SimulatedBus::new().with_analyzer(&settings());
    let spec_an = connect(&bus).await;

    spec_an.set_center_frequency(8_400_000_000.0).await.unwrap();
    assert_close(spec_an.get_center_frequency().await.unwrap(), 8.4e9, 1.0);
}

#[tokio::test]
async fn test_span_and_reference_level_round_trip() {
    let bus = SimulatedBus::new().with_analyzer(&settings());
    let spec_an = connect(&bus).await;

    spec_an.set_span(1_000_000.0).await.unwrap();
    spec_an.set_reference_level(-10.0).await.unwrap();

    assert_close(spec_an.get_span().await.unwrap(), 1e6, 1.0);
    assert_close(spec_an.get_reference_level().await.unwrap(), -10.0, 0.05);
}

#[tokio::test]
async fn test_sweep_bounds_follow_settings() {
    let bus = SimulatedBus::new().with_analyzer(&settings());
    let spec_an = connect(&bus).await;

    spec_an.set_center_frequency(8.4e9).await.unwrap();
    spec_an.set_span(1e6).await.unwrap();

    assert_close(spec_an.get_start_frequency().await.unwrap(), 8.3995e9, 1.0);
    assert_close(spec_an.get_stop_frequency().await.unwrap(), 8.4005e9, 1.0);
}

#[tokio::test]
async fn test_trace_is_consistent() {
    let bus = SimulatedBus::new().with_analyzer(&settings());
    let spec_an = connect(&bus).await;

    spec_an.set_center_frequency(8.4e9).await.unwrap();
    spec_an.set_span(1e6).await.unwrap();
    spec_an.take_sweep().await.unwrap();

    let (frequencies, amplitudes) = spec_an.get_trace_frequencies_and_amplitudes().await.unwrap();
    assert_eq!(frequencies.len(), TRACE_POINTS);
    assert_eq!(amplitudes.len(), frequencies.len());

    assert_close(frequencies[0], 8.3995e9, 1.0);
    assert_close(frequencies[TRACE_POINTS - 1], 8.4005e9, 1.0);
    assert!(frequencies.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_center_amplitude_and_peak_on_tone() {
    let bus = SimulatedBus::new().with_analyzer(&settings());
    let spec_an = connect(&bus).await;

    spec_an.set_center_frequency(8.4e9).await.unwrap();
    spec_an.set_span(1e6).await.unwrap();
    spec_an.set_reference_level(-10.0).await.unwrap();

    let center_amplitude = spec_an.get_center_frequency_amplitude().await.unwrap();
    assert_close(center_amplitude, -25.0, 0.1);

    let (peak_frequency, peak_amplitude) =
        spec_an.get_peak_frequency_and_amplitude().await.unwrap();
    assert_close(peak_frequency, 8.4e9, 2_000.0);
    assert_close(peak_amplitude, -25.0, 0.1);

    // Peak agrees with the trace it came from
    let trace = spec_an.get_trace().await.unwrap();
    let max = trace
        .amplitudes()
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(peak_amplitude, max);
}

/// Trace [(1e9,-50),(2e9,-10),(3e9,-30)] peaks at (2e9, -10)
#[tokio::test]
async fn test_peak_of_injected_trace() {
    let bus = SimulatedBus::new().with_device(
        DEFAULT_RESOURCE,
        SimulatedAnalyzer::new(&settings()).with_trace(vec![-50.0, -10.0, -30.0]),
    );
    let spec_an = connect(&bus).await;

    spec_an.set_center_frequency(2e9).await.unwrap();
    spec_an.set_span(2e9).await.unwrap();

    let (frequencies, amplitudes) = spec_an.get_trace_frequencies_and_amplitudes().await.unwrap();
    assert_eq!(frequencies, vec![1e9, 2e9, 3e9]);
    assert_eq!(amplitudes, vec![-50.0, -10.0, -30.0]);

    assert_eq!(
        spec_an.get_peak_frequency_and_amplitude().await.unwrap(),
        (2e9, -10.0)
    );
}

/// Equal maxima resolve to the lowest frequency
#[tokio::test]
async fn test_peak_tie_takes_first() {
    let bus = SimulatedBus::new().with_device(
        DEFAULT_RESOURCE,
        SimulatedAnalyzer::new(&settings()).with_trace(vec![-40.0, -20.0, -60.0, -20.0, -45.0]),
    );
    let spec_an = connect(&bus).await;

    spec_an.set_center_frequency(3e6).await.unwrap();
    spec_an.set_span(4e6).await.unwrap();

    let peak = spec_an.get_peak().await.unwrap();
    assert_eq!(peak.frequency_hz, 2e6);
    assert_eq!(peak.amplitude_dbm, -20.0);
}

/// Bad values are refused before anything reaches the bus
#[tokio::test]
async fn test_invalid_settings_send_nothing() {
    let bus = SimulatedBus::new().with_analyzer(&settings());
    let spec_an = connect(&bus).await;
    let sent_before = bus.journal().await.len();

    assert!(matches!(
        spec_an.set_center_frequency(f64::NAN).await,
        Err(SpecAnError::InvalidSetting(_))
    ));
    assert!(matches!(
        spec_an.set_span(-1.0).await,
        Err(SpecAnError::InvalidSetting(_))
    ));
    assert!(matches!(
        spec_an.set_reference_level(f64::INFINITY).await,
        Err(SpecAnError::InvalidSetting(_))
    ));

    assert_eq!(bus.journal().await.len(), sent_before);
}

#[tokio::test]
async fn test_commands_on_the_wire() {
    let bus = SimulatedBus::new().with_analyzer(&settings());
    let spec_an = connect(&bus).await;

    spec_an.set_center_frequency(8.4e9).await.unwrap();
    spec_an.set_span(1e6).await.unwrap();
    spec_an.set_reference_level(-10.0).await.unwrap();

    let commands: Vec<String> = bus
        .journal()
        .await
        .into_iter()
        .map(|entry| entry.command)
        .collect();
    assert_eq!(
        commands,
        vec!["ID?", "CF 8400000000HZ;", "SP 1000000HZ;", "RL -10.00DM;"]
    );
}

#[tokio::test]
async fn test_preset_restores_defaults() {
    let bus = SimulatedBus::new().with_analyzer(&settings());
    let spec_an = connect(&bus).await;

    spec_an.set_span(1e6).await.unwrap();
    spec_an.preset().await.unwrap();
    assert_close(spec_an.get_span().await.unwrap(), 26.5e9, 1.0);
}

/// Session whose replies are never numbers
struct Garbled;

#[async_trait]
impl ScpiTransport for Garbled {
    async fn query(&self, _cmd: &str) -> Result<String> {
        Ok("?? OVER ??".to_string())
    }

    async fn write(&self, _cmd: &str) -> Result<()> {
        Ok(())
    }

    fn resource_name(&self) -> &str {
        "GPIB0::1::INSTR"
    }
}

#[tokio::test]
async fn test_malformed_replies_are_reported() {
    let spec_an = SpectrumAnalyzerHP8563E::new(Box::new(Garbled), "HP8563E");

    match spec_an.get_center_frequency().await {
        Err(SpecAnError::InvalidResponse { command, response }) => {
            assert_eq!(command, "CF?;");
            assert_eq!(response, "?? OVER ??");
        }
        other => panic!("expected InvalidResponse, got {:?}", other),
    }
    assert!(spec_an.get_trace().await.is_err());
}

/// Session that fails every exchange
struct Disconnected;

#[async_trait]
impl ScpiTransport for Disconnected {
    async fn query(&self, cmd: &str) -> Result<String> {
        anyhow::bail!("GPIB timeout waiting for reply to {}", cmd)
    }

    async fn write(&self, cmd: &str) -> Result<()> {
        anyhow::bail!("GPIB timeout sending {}", cmd)
    }

    fn resource_name(&self) -> &str {
        "GPIB0::18::INSTR"
    }
}

#[tokio::test]
async fn test_transport_failures_propagate() {
    let spec_an = SpectrumAnalyzerHP8563E::new(Box::new(Disconnected), "HP8563E");

    let err = spec_an.set_span(1e6).await.unwrap_err();
    assert!(matches!(err, SpecAnError::Transport(_)));
    assert!(err.to_string().contains("GPIB timeout"));

    assert!(matches!(
        spec_an.get_trace_frequencies_and_amplitudes().await,
        Err(SpecAnError::Transport(_))
    ));
}
