//! Spectrum analyzer driver and trace model.

pub mod hp8563e;
pub mod trace;

pub use hp8563e::SpectrumAnalyzerHP8563E;
pub use trace::{Peak, Trace};
