//! VISA bus and session adapter for GPIB instruments
//!
//! Wraps the visa-rs crate. VISA calls are synchronous, so every call runs on
//! Tokio's blocking pool, bounded by the configured timeout.
//!
//! Supports resource expressions and names like:
//! - "GPIB?*INSTR" (every GPIB instrument, the default discovery filter)
//! - "GPIB0::18::INSTR" (one GPIB address)
//! - "TCPIP0::192.168.1.100::gpib0,18::INSTR" (LAN/GPIB gateway)

use crate::config::InstrumentConfig;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::time::Duration;

use super::{InstrumentBus, ScpiTransport};

#[cfg(feature = "instrument_visa")]
use anyhow::Context;
#[cfg(feature = "instrument_visa")]
use log::debug;
#[cfg(feature = "instrument_visa")]
use std::ffi::CString;
#[cfg(feature = "instrument_visa")]
use std::io::{BufRead, BufReader, Write};
#[cfg(feature = "instrument_visa")]
use std::sync::{Arc, Mutex};
#[cfg(feature = "instrument_visa")]
use visa_rs::enums::attribute::AttrTmoValue;
#[cfg(feature = "instrument_visa")]
use visa_rs::enums::status::ErrorCode;
#[cfg(feature = "instrument_visa")]
use visa_rs::prelude::*;

#[cfg(not(feature = "instrument_visa"))]
const VISA_DISABLED: &str = "VISA support not enabled. Rebuild with --features instrument_visa";

/// Shared, lazily created VISA resource manager.
///
/// Sessions opened through a resource manager close when it is dropped, so
/// every adapter keeps a handle to it.
#[cfg(feature = "instrument_visa")]
type SharedRm = Arc<Mutex<Option<DefaultRM>>>;

#[cfg(feature = "instrument_visa")]
fn with_rm<T>(rm: &SharedRm, f: impl FnOnce(&DefaultRM) -> Result<T>) -> Result<T> {
    let mut guard = rm
        .lock()
        .map_err(|_| anyhow!("VISA resource manager lock poisoned"))?;
    let manager = match guard.take() {
        Some(manager) => manager,
        None => DefaultRM::new()
            .map_err(|e| anyhow!("Failed to create VISA resource manager: {:?}", e))?,
    };
    let result = f(&manager);
    *guard = Some(manager);
    result
}

/// VISA reports an expression that matched nothing as an error status.
#[cfg(feature = "instrument_visa")]
fn matched_nothing(err: &visa_rs::Error) -> bool {
    matches!(err.0, ErrorCode::ErrorRsrcNfound)
}

/// VISA session timeout attribute for `timeout`, saturating at `u32::MAX` ms.
#[cfg(feature = "instrument_visa")]
fn session_timeout_ms(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}

/// Run a blocking VISA operation with a deadline.
#[cfg(feature = "instrument_visa")]
async fn run_blocking<T, F>(timeout: Duration, what: String, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Ok(joined) => joined.with_context(|| format!("VISA task panicked: {}", what))?,
        Err(_) => Err(anyhow!(
            "VISA operation timed out after {}ms: {}",
            timeout.as_millis(),
            what
        )),
    }
}

/// VISA bus used for instrument discovery
///
/// Lists resources matching `resource_filter` and opens sessions on them.
pub struct VisaBus {
    /// VISA resource expression (e.g., "GPIB?*INSTR")
    pub(crate) resource_filter: String,

    /// Timeout for every VISA operation
    pub(crate) timeout: Duration,

    /// Line terminator appended to commands
    pub(crate) write_terminator: String,

    #[cfg(feature = "instrument_visa")]
    rm: SharedRm,
}

impl VisaBus {
    /// Create a bus with default timeout (5s) and "\n" terminator
    ///
    /// # Arguments
    /// * `resource_filter` - VISA resource expression used for discovery
    pub fn new(resource_filter: impl Into<String>) -> Self {
        Self {
            resource_filter: resource_filter.into(),
            timeout: Duration::from_secs(5),
            write_terminator: "\n".to_string(),
            #[cfg(feature = "instrument_visa")]
            rm: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a bus from the `[instrument]` configuration section
    pub fn from_config(config: &InstrumentConfig) -> Self {
        Self::new(config.resource_filter.clone())
            .with_timeout(Duration::from_millis(config.timeout_ms))
            .with_write_terminator(config.write_terminator.clone())
    }

    /// Set timeout for VISA operations
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set line terminator for commands
    pub fn with_write_terminator(mut self, terminator: String) -> Self {
        self.write_terminator = terminator;
        self
    }
}

#[async_trait]
impl InstrumentBus for VisaBus {
    #[cfg(feature = "instrument_visa")]
    async fn list_resources(&self) -> Result<Vec<String>> {
        let rm = Arc::clone(&self.rm);
        let filter = self.resource_filter.clone();

        run_blocking(self.timeout, format!("find {}", filter), move || {
            with_rm(&rm, |rm| {
                let expr: visa_rs::VisaString = CString::new(filter.as_str())
                    .context("Resource filter contains a NUL byte")?
                    .into();

                let mut list = match rm.find_res_list(&expr) {
                    Ok(list) => list,
                    Err(e) if matched_nothing(&e) => {
                        debug!("No VISA resources match '{}'", filter);
                        return Ok(Vec::new());
                    }
                    Err(e) => return Err(anyhow!("VISA resource enumeration failed: {:?}", e)),
                };

                let mut found = Vec::new();
                while let Some(name) = list
                    .find_next()
                    .map_err(|e| anyhow!("VISA resource enumeration failed: {:?}", e))?
                {
                    found.push(name.to_string());
                }
                debug!("VISA '{}' matched {} resource(s)", filter, found.len());
                Ok(found)
            })
        })
        .await
    }

    #[cfg(not(feature = "instrument_visa"))]
    async fn list_resources(&self) -> Result<Vec<String>> {
        Err(anyhow!(VISA_DISABLED))
    }

    #[cfg(feature = "instrument_visa")]
    async fn open(&self, resource: &str) -> Result<Box<dyn ScpiTransport>> {
        let rm = Arc::clone(&self.rm);
        let name = resource.to_string();
        let timeout_ms = session_timeout_ms(self.timeout);

        let instrument = run_blocking(self.timeout, format!("open {}", name), move || {
            with_rm(&rm, |rm| {
                let rsc: visa_rs::VisaString = CString::new(name.as_str())
                    .context("Resource name contains a NUL byte")?
                    .into();
                let instr = rm
                    .open(&rsc, AccessMode::NO_LOCK, TIMEOUT_IMMEDIATE)
                    .map_err(|e| anyhow!("Failed to open VISA resource {}: {:?}", name, e))?;

                // Bounds blocking reads left running after the async deadline
                let tmo = AttrTmoValue::new_checked(timeout_ms)
                    .ok_or_else(|| anyhow!("Invalid VISA timeout: {}ms", timeout_ms))?;
                instr
                    .set_attr(tmo)
                    .map_err(|e| anyhow!("Failed to set VISA timeout on {}: {:?}", name, e))?;
                Ok(instr)
            })
        })
        .await?;

        debug!(
            "VISA resource '{}' opened with {}ms timeout",
            resource,
            self.timeout.as_millis()
        );

        Ok(Box::new(VisaAdapter {
            inner: Arc::new(Mutex::new(instrument)),
            _rm: Arc::clone(&self.rm),
            resource_name: resource.to_string(),
            timeout: self.timeout,
            write_terminator: self.write_terminator.clone(),
        }))
    }

    #[cfg(not(feature = "instrument_visa"))]
    async fn open(&self, _resource: &str) -> Result<Box<dyn ScpiTransport>> {
        Err(anyhow!(VISA_DISABLED))
    }

    fn describe(&self) -> String {
        format!(
            "VisaBus({} @ {}ms timeout)",
            self.resource_filter,
            self.timeout.as_millis()
        )
    }
}

/// Open VISA session
///
/// Created by [`VisaBus::open`]. The instrument sits behind a mutex so a
/// command and its reply are never interleaved with another command.
pub struct VisaAdapter {
    #[cfg(feature = "instrument_visa")]
    inner: Arc<Mutex<Instrument>>,

    #[cfg(feature = "instrument_visa")]
    _rm: SharedRm,

    /// VISA resource name (e.g., "GPIB0::18::INSTR")
    pub(crate) resource_name: String,

    /// Read/write timeout
    pub(crate) timeout: Duration,

    /// Line terminator appended to commands
    pub(crate) write_terminator: String,
}

#[async_trait]
impl ScpiTransport for VisaAdapter {
    #[cfg(feature = "instrument_visa")]
    async fn query(&self, cmd: &str) -> Result<String> {
        let instrument = Arc::clone(&self.inner);
        let command_str = format!("{}{}", cmd, self.write_terminator);
        let command_for_log = cmd.to_string();

        let response = run_blocking(self.timeout, cmd.to_string(), move || {
            let instr = instrument
                .lock()
                .map_err(|_| anyhow!("VISA session lock poisoned"))?;

            (&*instr)
                .write_all(command_str.as_bytes())
                .with_context(|| format!("VISA write failed for: {}", command_for_log))?;

            let mut line = String::new();
            BufReader::new(&*instr)
                .read_line(&mut line)
                .with_context(|| format!("VISA read failed for: {}", command_for_log))?;

            Ok(line.trim().to_string())
        })
        .await?;

        debug!("VISA query '{}' -> '{}'", cmd, abbreviate(&response));
        Ok(response)
    }

    #[cfg(not(feature = "instrument_visa"))]
    async fn query(&self, _cmd: &str) -> Result<String> {
        Err(anyhow!(VISA_DISABLED))
    }

    #[cfg(feature = "instrument_visa")]
    async fn write(&self, cmd: &str) -> Result<()> {
        let instrument = Arc::clone(&self.inner);
        let command_str = format!("{}{}", cmd, self.write_terminator);
        let command_for_log = cmd.to_string();

        run_blocking(self.timeout, cmd.to_string(), move || {
            let instr = instrument
                .lock()
                .map_err(|_| anyhow!("VISA session lock poisoned"))?;

            (&*instr)
                .write_all(command_str.as_bytes())
                .with_context(|| format!("VISA write failed for: {}", command_for_log))
        })
        .await?;

        debug!("VISA command sent: {}", cmd);
        Ok(())
    }

    #[cfg(not(feature = "instrument_visa"))]
    async fn write(&self, _cmd: &str) -> Result<()> {
        Err(anyhow!(VISA_DISABLED))
    }

    fn resource_name(&self) -> &str {
        &self.resource_name
    }
}

/// Trace replies run to several kilobytes; keep log lines short.
#[cfg(feature = "instrument_visa")]
fn abbreviate(response: &str) -> String {
    const LIMIT: usize = 64;
    if response.len() <= LIMIT {
        response.to_string()
    } else {
        let cut = response
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|&i| i <= LIMIT)
            .last()
            .unwrap_or(0);
        format!("{}... ({} bytes)", &response[..cut], response.len())
    }
}
