//! Instrument bus and transport adapters
//!
//! Two seams separate the analyzer driver from the wire:
//!
//! - [`InstrumentBus`] enumerates the resources reachable on a bus and opens
//!   one of them.
//! - [`ScpiTransport`] is a single open session: write a command, or write a
//!   query and read the reply.
//!
//! Implementations:
//! - [`VisaBus`] / [`VisaAdapter`]: GPIB (or any VISA resource) through
//!   `visa-rs`, behind the `instrument_visa` feature.
//! - [`SimulatedBus`] / [`SimulatedAnalyzer`]: an in-process HP 8563E used by
//!   tests and by `--simulate`.
//!
//! Commands are passed without line terminator; adapters append their own.
//! Replies are returned trimmed.

pub mod mock;
pub mod visa_adapter;

pub use mock::{SimulatedAnalyzer, SimulatedBus};
pub use visa_adapter::{VisaAdapter, VisaBus};

use anyhow::Result;
use async_trait::async_trait;

/// One open instrument session.
#[async_trait]
pub trait ScpiTransport: Send + Sync {
    /// Send a command and read the reply.
    ///
    /// # Errors
    /// - Bus communication error or timeout
    async fn query(&self, cmd: &str) -> Result<String>;

    /// Send a command without reading a reply.
    ///
    /// # Errors
    /// - Bus communication error
    async fn write(&self, cmd: &str) -> Result<()>;

    /// Resource name this session was opened on (e.g. "GPIB0::18::INSTR").
    fn resource_name(&self) -> &str;
}

/// A bus that can list and open instrument resources.
#[async_trait]
pub trait InstrumentBus: Send + Sync {
    /// Resource names currently reachable, in bus order.
    ///
    /// An empty bus is `Ok(vec![])`, not an error.
    async fn list_resources(&self) -> Result<Vec<String>>;

    /// Open a session on `resource`.
    ///
    /// # Errors
    /// - The resource does not exist or refuses the connection
    async fn open(&self, resource: &str) -> Result<Box<dyn ScpiTransport>>;

    /// Short human readable description for logs.
    fn describe(&self) -> String;
}
