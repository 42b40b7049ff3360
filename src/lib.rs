//! Core library for the spec_an application.
//!
//! Control of an HP 8563E spectrum analyzer over GPIB: discovery, center
//! frequency / span / reference level configuration, marker and peak reads,
//! and trace acquisition, plus a trace viewer and a guided walkthrough that
//! exercises all of it.
//!
//! - [`adapters`]: bus and session seams, with VISA and simulated backends
//! - [`instrument`]: the HP 8563E driver and the trace model
//! - [`walkthrough`]: the fixed configure-read-print sequence
//! - [`gui`]: egui_plot trace viewer
//! - [`config`] / [`error`]: layered configuration and the error type
//!
//! # Features
//!
//! - `gui` (default) - trace viewer window
//! - `instrument_visa` - VISA transport via visa-rs

pub mod adapters;
pub mod config;
pub mod error;
pub mod gui;
pub mod instrument;
pub mod walkthrough;

pub use error::{AppResult, SpecAnError};
pub use instrument::{Peak, SpectrumAnalyzerHP8563E, Trace};
