use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::kind::PortKind;
use super::prologix::{self, PrologixTransport};
use super::properties::PortProperties;
use super::serial::SerialTransport;
use super::tcpip::{is_socket_resource, TcpTransport};
use super::transport::{ReadOutcome, ReadRequest, Transport};
use super::visa::VisaTransport;
use crate::error::{Result, SweepMeError};

/// Text encodings a port can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Latin1,
    Utf8,
    Ascii,
}

impl Encoding {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().replace('_', "-").as_str() {
            "latin-1" | "latin1" | "iso-8859-1" => Ok(Encoding::Latin1),
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "ascii" | "us-ascii" => Ok(Encoding::Ascii),
            other => Err(SweepMeError::port(format!("Unsupported encoding '{}'", other))),
        }
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        match self {
            Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
            Encoding::Latin1 | Encoding::Ascii => {
                let limit = if *self == Encoding::Ascii { 0x7f } else { 0xff };
                text.chars()
                    .map(|c| {
                        u8::try_from(u32::from(c))
                            .ok()
                            .filter(|b| u32::from(*b) <= limit)
                            .ok_or_else(|| {
                                SweepMeError::port(format!("Cannot encode character {:?}", c))
                            })
                    })
                    .collect()
            }
        }
    }

    /// Decodes `bytes`; `None` if they are not valid in this encoding.
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            Encoding::Latin1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
            Encoding::Ascii => bytes
                .is_ascii()
                .then(|| bytes.iter().map(|&b| char::from(b)).collect()),
            Encoding::Utf8 => String::from_utf8(bytes.to_vec()).ok(),
        }
    }
}

/// Transport for a resource, chosen by its kind.
pub fn transport_for(resource: &str, kind: PortKind) -> Result<Box<dyn Transport>> {
    Ok(match kind {
        PortKind::Com | PortKind::Asrl => Box::new(SerialTransport::new()),
        PortKind::Gpib if prologix::parse_resource(resource).is_some() => {
            Box::new(PrologixTransport::for_resource(resource)?)
        }
        PortKind::Tcpip if is_socket_resource(resource) => Box::new(TcpTransport::new()),
        PortKind::Gpib | PortKind::Pxi | PortKind::Usbtmc | PortKind::Tcpip => {
            Box::new(VisaTransport::new())
        }
    })
}

/// A communication channel to an instrument.
pub struct Port {
    properties: PortProperties,
    transport: Box<dyn Transport>,
    open: bool,
    last_write: Option<Instant>,
}

impl Port {
    /// Port for `resource` with default properties of its kind.
    pub fn new(resource: &str) -> Result<Self> {
        let kind = PortKind::from_resource(resource).ok_or_else(|| {
            SweepMeError::port(format!("Port type of '{}' is not supported", resource))
        })?;
        let transport = transport_for(resource, kind)?;
        Ok(Self::with_transport(resource, kind, transport))
    }

    pub fn with_transport(resource: &str, kind: PortKind, transport: Box<dyn Transport>) -> Self {
        Port {
            properties: PortProperties::defaults(kind, resource),
            transport,
            open: false,
            last_write: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.properties.id
    }

    pub fn kind(&self) -> PortKind {
        self.properties.kind
    }

    pub fn properties(&self) -> &PortProperties {
        &self.properties
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Resets the properties to the defaults of the port's kind.
    ///
    /// Logging is kept.
    pub fn initialize_port_properties(&mut self) {
        let debug = self.properties.debug;
        self.properties = PortProperties::defaults(self.properties.kind, &self.properties.id);
        self.properties.debug = debug;
    }

    /// Applies `overrides` and returns the keys that were not understood.
    pub fn update_properties(&mut self, overrides: &toml::Table) -> Result<Vec<String>> {
        self.properties.apply(overrides)
    }

    pub fn set_logging(&mut self, state: bool) {
        self.properties.debug = state;
    }

    pub fn get_logging(&self) -> bool {
        self.properties.debug
    }

    fn log(&self, direction: &str, message: &str) {
        if self.properties.debug {
            info!("{} {}: {:?}", self.properties.id, direction, message);
        }
    }

    pub fn open(&mut self) -> Result<()> {
        self.transport.open(&self.properties)?;
        self.open = true;
        self.last_write = None;
        debug!(port = %self.properties.id, "opened");
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.open = false;
        self.transport.close()?;
        debug!(port = %self.properties.id, "closed");
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.transport.clear()
    }

    pub fn in_waiting(&mut self) -> Result<usize> {
        self.transport.in_waiting()
    }

    fn encoding(&self) -> Result<Encoding> {
        Encoding::from_name(&self.properties.encoding)
    }

    fn wait_for_delay(&self) {
        if let Some(last) = self.last_write {
            let delay = Duration::from_secs_f64(self.properties.delay.max(0.0));
            let elapsed = last.elapsed();
            if elapsed < delay {
                thread::sleep(delay - elapsed);
            }
        }
    }

    /// Sends a command. Empty commands are not sent.
    pub fn write(&mut self, command: &str) -> Result<()> {
        if command.is_empty() {
            return Ok(());
        }
        self.log("write", command);
        let payload = self.encoding()?.encode(command)?;
        self.send(payload)
    }

    /// Sends bytes without encoding them, followed by the terminator like
    /// [`Port::write`].
    pub fn write_raw(&mut self, payload: &[u8]) -> Result<()> {
        if payload.is_empty() {
            return Ok(());
        }
        self.log("write", &String::from_utf8_lossy(payload));
        self.send(payload.to_vec())
    }

    fn send(&mut self, mut payload: Vec<u8>) -> Result<()> {
        self.wait_for_delay();
        if !self.transport.frames_messages() {
            let terminator = self.encoding()?.encode(self.properties.write_terminator())?;
            payload.extend(terminator);
        }
        self.transport.write(&payload)?;
        self.last_write = Some(Instant::now());
        Ok(())
    }

    fn receive(&mut self, digits: usize) -> Result<ReadOutcome> {
        if digits > 0 {
            return self.transport.read(ReadRequest::Exact(digits));
        }
        let terminator = self.encoding()?.encode(self.properties.read_terminator())?;
        self.transport.read(ReadRequest::Until(&terminator))
    }

    fn not_responding(&mut self) -> SweepMeError {
        let kind = self.properties.kind;
        let id = self.properties.id.clone();
        if let Err(e) = self.close() {
            debug!(port = %id, "closing unresponsive port failed: {}", e);
        }
        SweepMeError::port(format!(
            "Port '{}' with ID '{}' does not respond.\nCheck port properties, e.g. timeout, EOL,.. via Port -> PortManager -> {}",
            kind, id, kind
        ))
    }

    /// Reads an answer.
    ///
    /// With `digits == 0` reads up to the terminator, otherwise up to that
    /// many bytes. A fixed-length read counts as terminated, so it returns
    /// what arrived, even nothing, without failing. Trailing whitespace is
    /// removed when `rstrip` is set.
    pub fn read(&mut self, digits: usize) -> Result<String> {
        if self.properties.raw_read {
            let raw = self.read_raw(digits)?;
            return Ok(String::from_utf8_lossy(&raw).into_owned());
        }

        let outcome = self.receive(digits)?;
        let mut answer = self.encoding()?.decode(&outcome.data).ok_or_else(|| {
            SweepMeError::port(format!(
                "Unable to decode the reading from {}. Please check whether the baudrate and the terminator are correct. You can get the raw reading by setting the port property 'raw_read' to true",
                self.properties.id
            ))
        })?;

        if self.properties.rstrip {
            answer.truncate(answer.trim_end().len());
        }
        self.log("read", &answer);

        let terminated = outcome.complete || digits > 0;
        if answer.is_empty() && !terminated && self.properties.exception {
            return Err(self.not_responding());
        }
        Ok(answer)
    }

    /// Reads bytes without decoding or stripping them.
    pub fn read_raw(&mut self, digits: usize) -> Result<Vec<u8>> {
        let outcome = self.receive(digits)?;
        self.log("read", &String::from_utf8_lossy(&outcome.data));
        let terminated = outcome.complete || digits > 0;
        if outcome.data.is_empty() && !terminated && self.properties.exception {
            return Err(self.not_responding());
        }
        Ok(outcome.data)
    }

    /// Answer to `*IDN?`, or "not available" for ports without it.
    pub fn get_identification(&mut self) -> Result<String> {
        if !self.properties.kind.supports_identification() {
            return Ok("not available".to_string());
        }
        self.write("*IDN?")?;
        self.read(0)
    }

    /// Writes `command` and reads the answer.
    pub fn query(&mut self, command: &str) -> Result<String> {
        self.write(command)?;
        self.read(0)
    }
}

impl std::fmt::Debug for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Port")
            .field("id", &self.properties.id)
            .field("kind", &self.properties.kind)
            .field("open", &self.open)
            .finish()
    }
}
