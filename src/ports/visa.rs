//! Seam for a VISA runtime.
//!
//! sweepme does not link a VISA library. A host application that has one
//! registers a [`VisaBackend`]; GPIB, PXI, USBTMC and TCPIP instrument
//! resources are then opened through it.

use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use super::properties::PortProperties;
use super::transport::{ReadOutcome, ReadRequest, Transport};
use crate::error::{Result, SweepMeError};

/// Session settings handed to the backend when a resource is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct VisaOptions {
    pub timeout: Duration,
    pub write_termination: String,
    pub read_termination: String,
}

impl From<&PortProperties> for VisaOptions {
    fn from(properties: &PortProperties) -> Self {
        VisaOptions {
            timeout: properties.timeout_duration(),
            write_termination: properties.write_terminator().to_string(),
            read_termination: properties.read_terminator().to_string(),
        }
    }
}

/// A VISA resource manager.
pub trait VisaBackend: Send + Sync {
    /// Resources matching a VISA query such as `GPIB?*`.
    fn list_resources(&self, query: &str) -> Result<Vec<String>>;

    /// Opens a session; the returned transport is already open.
    fn open_resource(&self, resource: &str, options: &VisaOptions) -> Result<Box<dyn Transport>>;
}

fn slot() -> &'static RwLock<Option<Arc<dyn VisaBackend>>> {
    static BACKEND: OnceLock<RwLock<Option<Arc<dyn VisaBackend>>>> = OnceLock::new();
    BACKEND.get_or_init(|| RwLock::new(None))
}

pub fn register_backend(backend: Arc<dyn VisaBackend>) {
    if let Ok(mut current) = slot().write() {
        *current = Some(backend);
    }
}

pub fn clear_backend() {
    if let Ok(mut current) = slot().write() {
        *current = None;
    }
}

/// The registered backend, if any.
pub fn backend() -> Option<Arc<dyn VisaBackend>> {
    slot().read().ok().and_then(|current| current.clone())
}

pub fn is_available() -> bool {
    backend().is_some()
}

fn require_backend() -> Result<Arc<dyn VisaBackend>> {
    backend().ok_or_else(|| SweepMeError::port("no VISA runtime available"))
}

/// Lists VISA resources for `query`; GPIB interface entries are dropped.
pub fn list_resources(query: &str) -> Result<Vec<String>> {
    let resources = require_backend()?.list_resources(query)?;
    Ok(resources
        .into_iter()
        .filter(|resource| !resource.contains("INTFC"))
        .collect())
}

/// Transport whose session is opened through the registered backend.
#[derive(Default)]
pub struct VisaTransport {
    session: Option<Box<dyn Transport>>,
}

impl VisaTransport {
    pub fn new() -> Self {
        VisaTransport::default()
    }

    fn session(&mut self) -> Result<&mut Box<dyn Transport>> {
        self.session
            .as_mut()
            .ok_or_else(|| SweepMeError::port("VISA session is not open"))
    }
}

impl Transport for VisaTransport {
    fn open(&mut self, properties: &PortProperties) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            session.close()?;
        }
        let backend = require_backend()?;
        self.session = Some(backend.open_resource(&properties.id, &VisaOptions::from(properties))?);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            session.close()?;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.session()?.clear()
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.session()?.write(data)
    }

    fn read(&mut self, request: ReadRequest<'_>) -> Result<ReadOutcome> {
        self.session()?.read(request)
    }

    fn in_waiting(&mut self) -> Result<usize> {
        self.session()?.in_waiting()
    }

    fn frames_messages(&self) -> bool {
        self.session
            .as_ref()
            .map(|session| session.frames_messages())
            .unwrap_or(false)
    }
}
