//! Prologix GPIB-USB controllers.
//!
//! A controller sits on a serial port and addresses up to 30 GPIB instruments.
//! Each instrument is exposed as a `GPIB::<address>::Prologix@<serial port>`
//! resource whose port talks through a [`PrologixTransport`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Instant;

use tracing::{debug, warn};

use super::kind::PortKind;
use super::properties::PortProperties;
use super::serial::SerialTransport;
use super::transport::{ReadOutcome, ReadRequest, Transport};
use crate::error::{Result, SweepMeError};
use crate::warning::Warning;

/// Baud rate of the controller link; the adapter detects it automatically.
pub const LINK_BAUDRATE: u32 = 115_200;

const ESC: u8 = 27;

/// Shared handle to a controller.
pub type SharedController = Arc<Mutex<PrologixController>>;

/// `++eos` index of a GPIB terminator.
pub fn eos_index(terminator: &str) -> Option<u8> {
    match terminator {
        "\r\n" => Some(0),
        "\r" => Some(1),
        "\n" => Some(2),
        "" => Some(3),
        _ => None,
    }
}

/// Escapes bytes the controller would otherwise interpret.
///
/// ESC goes first so that escapes added for the other characters are kept.
pub fn escape(payload: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(payload.len());
    for &byte in payload {
        if matches!(byte, ESC | b'\r' | b'\n' | b'+') {
            escaped.push(ESC);
        }
        escaped.push(byte);
    }
    escaped
}

/// Splits `GPIB::<address>::Prologix@<controller>` into address and
/// controller.
pub fn parse_resource(resource: &str) -> Option<(String, String)> {
    let mut parts = resource.split("::");
    if parts.next()? != "GPIB" {
        return None;
    }
    let address = parts.next()?;
    let controller = parts.next()?.strip_prefix("Prologix@")?;
    if parts.next().is_some() || address.is_empty() || controller.is_empty() {
        return None;
    }
    Some((address.to_string(), controller.to_string()))
}

#[derive(Debug, Clone)]
struct AddressSettings {
    timeout: f64,
    encoding: String,
}

/// One Prologix controller and the link to it.
pub struct PrologixController {
    address: String,
    link: Box<dyn Transport>,
    link_open: bool,
    current_gpib: Option<String>,
    settings: HashMap<String, AddressSettings>,
}

impl PrologixController {
    /// Controller on the serial port `address`.
    pub fn new(address: &str) -> Self {
        Self::with_link(address, Box::new(SerialTransport::new()))
    }

    pub fn with_link(address: &str, link: Box<dyn Transport>) -> Self {
        PrologixController {
            address: address.to_string(),
            link,
            link_open: false,
            current_gpib: None,
            settings: HashMap::new(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn set_address(&mut self, address: &str) {
        self.address = address.to_string();
    }

    /// The 30 GPIB resources reachable through this controller.
    pub fn list_resources(&self) -> Vec<String> {
        (1..=30)
            .map(|i| format!("GPIB::{}::Prologix@{}", i, self.address))
            .collect()
    }

    fn link_properties(&self) -> PortProperties {
        let mut properties = PortProperties::defaults(PortKind::Com, &self.address);
        properties.baudrate = LINK_BAUDRATE;
        properties.timeout = 0.1;
        properties
    }

    /// Opens the link and sets the controller up for the instrument of `properties`.
    pub fn open(&mut self, properties: &PortProperties) -> Result<()> {
        let gpib = parse_resource(&properties.id)
            .map(|(address, _)| address)
            .ok_or_else(|| {
                SweepMeError::port(format!("'{}' is not a Prologix resource", properties.id))
            })?;

        self.settings.insert(
            gpib.clone(),
            AddressSettings {
                timeout: properties.timeout,
                encoding: properties.encoding.clone(),
            },
        );

        if !self.link_open {
            let link_properties = self.link_properties();
            self.link.open(&link_properties)?;
            self.link_open = true;
        }
        self.link.clear()?;

        self.set_controller_in_charge()?;
        self.set_mode(1)?;

        let terminator = properties
            .gpib_eol_read
            .as_deref()
            .or(properties.gpib_eol_write.as_deref())
            .unwrap_or("\r\n");
        let index = match eos_index(terminator) {
            Some(index) => index,
            None => {
                let warning = Warning::UnsupportedTerminator {
                    terminator: terminator.to_string(),
                    resource: properties.id.clone(),
                };
                warn!("{}", warning);
                0
            }
        };
        self.set_eos(index)?;
        self.set_eoi(1)?;
        self.set_auto(0)?;
        self.set_read_timeout(0.05)?;
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        if self.link_open {
            self.link.clear()?;
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        if self.link_open {
            self.link.close()?;
            self.link_open = false;
            self.current_gpib = None;
        }
        Ok(())
    }

    /// Sends a controller command such as `++ver`.
    pub fn command(&mut self, command: &str) -> Result<()> {
        let mut message = command.as_bytes().to_vec();
        message.push(b'\n');
        self.link.write(&message)
    }

    /// Sends `payload` to the instrument at `gpib`, switching the
    /// controller's address first if needed.
    pub fn write_to(&mut self, gpib: &str, payload: &[u8]) -> Result<()> {
        if payload.is_empty() {
            return Ok(());
        }
        if self.current_gpib.as_deref() != Some(gpib) {
            self.command(&format!("++addr {}", gpib))?;
            self.current_gpib = Some(gpib.to_string());
        }
        let mut message = escape(payload);
        message.push(b'\n');
        self.link.write(&message)
    }

    /// Requests an answer from the instrument at `gpib`.
    ///
    /// Keeps asking until a line arrives or the instrument's timeout elapses.
    /// The line feed is not part of the returned bytes.
    pub fn read_from(&mut self, gpib: &str) -> Result<ReadOutcome> {
        let timeout = self
            .settings
            .get(gpib)
            .map(|settings| settings.timeout)
            .unwrap_or(2.0);

        let start = Instant::now();
        let mut data = Vec::new();
        loop {
            self.command("++read eoi")?;
            let outcome = self.link.read(ReadRequest::Until(b"\n"))?;
            data.extend(outcome.data);
            if outcome.complete {
                return Ok(ReadOutcome {
                    data,
                    complete: true,
                });
            }
            if start.elapsed().as_secs_f64() >= timeout {
                debug!(controller = %self.address, gpib, "no answer before timeout");
                return Ok(ReadOutcome {
                    data,
                    complete: false,
                });
            }
        }
    }

    /// Encoding configured for the instrument at `gpib`.
    pub fn encoding(&self, gpib: &str) -> Option<&str> {
        self.settings.get(gpib).map(|s| s.encoding.as_str())
    }

    fn query_line(&mut self, command: &str) -> Result<String> {
        self.command(command)?;
        let outcome = self.link.read(ReadRequest::Until(b"\n"))?;
        Ok(String::from_utf8_lossy(&outcome.data).trim_end().to_string())
    }

    pub fn set_controller_in_charge(&mut self) -> Result<()> {
        self.command("++ifc")
    }

    /// 1 = controller, 0 = device.
    pub fn set_mode(&mut self, mode: u8) -> Result<()> {
        self.command(&format!("++mode {}", mode))
    }

    pub fn get_mode(&mut self) -> Result<String> {
        self.query_line("++mode")
    }

    /// 0 CR+LF, 1 CR, 2 LF, 3 none.
    pub fn set_eos(&mut self, eos: u8) -> Result<()> {
        self.command(&format!("++eos {}", eos))
    }

    pub fn get_eos(&mut self) -> Result<String> {
        self.query_line("++eos")
    }

    pub fn set_eoi(&mut self, eoi: u8) -> Result<()> {
        self.command(&format!("++eoi {}", eoi))
    }

    pub fn get_eoi(&mut self) -> Result<String> {
        self.query_line("++eoi")
    }

    /// 0 = no read-after-write.
    pub fn set_auto(&mut self, auto: u8) -> Result<()> {
        self.command(&format!("++auto {}", auto))
    }

    pub fn get_auto(&mut self) -> Result<String> {
        self.query_line("++auto")
    }

    /// Read timeout in seconds, clamped to 1..=3000 ms.
    pub fn set_read_timeout(&mut self, seconds: f64) -> Result<()> {
        let ms = (seconds * 1000.0).clamp(1.0, 3000.0) as u32;
        self.command(&format!("++read_tmo_ms {}", ms))
    }

    pub fn get_read_timeout(&mut self) -> Result<f64> {
        let answer = self.query_line("++read_tmo_ms")?;
        answer
            .parse::<f64>()
            .map(|ms| ms / 1000.0)
            .map_err(|_| SweepMeError::port(format!("Unexpected read timeout '{}'", answer)))
    }

    /// Listen-only is only supported in device mode.
    pub fn set_listen_only(&mut self, listen_only: u8) -> Result<()> {
        self.command(&format!("++lon {}", listen_only))
    }

    pub fn get_listen_only(&mut self) -> Result<String> {
        self.query_line("++lon")
    }

    pub fn get_version(&mut self) -> Result<String> {
        self.query_line("++ver")
    }
}

fn registry() -> MutexGuard<'static, BTreeMap<String, SharedController>> {
    static CONTROLLERS: OnceLock<Mutex<BTreeMap<String, SharedController>>> = OnceLock::new();
    CONTROLLERS
        .get_or_init(|| Mutex::new(BTreeMap::new()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

/// Registers a controller on the serial port `address` unless one exists.
pub fn add_controller(address: &str) -> SharedController {
    registry()
        .entry(address.to_string())
        .or_insert_with(|| Arc::new(Mutex::new(PrologixController::new(address))))
        .clone()
}

/// Registers `controller`, replacing any on the same address.
pub fn register_controller(controller: PrologixController) -> SharedController {
    let address = controller.address().to_string();
    let shared = Arc::new(Mutex::new(controller));
    registry().insert(address, shared.clone());
    shared
}

pub fn remove_controller(address: &str) -> Option<SharedController> {
    registry().remove(address)
}

pub fn controller(address: &str) -> Option<SharedController> {
    registry().get(address).cloned()
}

/// Serial port addresses occupied by controllers.
pub fn controller_addresses() -> Vec<String> {
    registry().keys().cloned().collect()
}

/// Resources of all registered controllers.
pub fn list_resources() -> Vec<String> {
    let controllers: Vec<SharedController> = registry().values().cloned().collect();
    controllers
        .iter()
        .flat_map(|controller| lock(controller).list_resources())
        .collect()
}

fn lock(controller: &SharedController) -> MutexGuard<'_, PrologixController> {
    controller.lock().unwrap_or_else(|e| e.into_inner())
}

/// Transport of one instrument behind a Prologix controller.
pub struct PrologixTransport {
    controller: SharedController,
    gpib: String,
}

impl PrologixTransport {
    /// Transport for `resource`, using the registered controller it names.
    pub fn for_resource(resource: &str) -> Result<Self> {
        let (gpib, address) = parse_resource(resource).ok_or_else(|| {
            SweepMeError::port(format!("'{}' is not a Prologix resource", resource))
        })?;
        let controller = controller(&address).ok_or_else(|| {
            SweepMeError::port(format!("No Prologix controller registered at {}", address))
        })?;
        Ok(PrologixTransport { controller, gpib })
    }
}

impl Transport for PrologixTransport {
    fn open(&mut self, properties: &PortProperties) -> Result<()> {
        lock(&self.controller).open(properties)
    }

    /// The link stays open for the other instruments on the bus.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        lock(&self.controller).clear()
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        lock(&self.controller).write_to(&self.gpib, data)
    }

    fn read(&mut self, _request: ReadRequest<'_>) -> Result<ReadOutcome> {
        lock(&self.controller).read_from(&self.gpib)
    }

    fn frames_messages(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mock::MockTransport;

    fn props(resource: &str) -> PortProperties {
        PortProperties::defaults(PortKind::Gpib, resource)
    }

    #[test]
    fn test_parse_resource() {
        assert_eq!(
            parse_resource("GPIB::12::Prologix@COM4"),
            Some(("12".to_string(), "COM4".to_string()))
        );
        assert_eq!(parse_resource("GPIB0::12::INSTR"), None);
        assert_eq!(parse_resource("GPIB::12::Prologix@"), None);
    }

    #[test]
    fn test_list_resources() {
        let controller = PrologixController::with_link("COM4", Box::new(MockTransport::new()));
        let resources = controller.list_resources();
        assert_eq!(resources.len(), 30);
        assert_eq!(resources[0], "GPIB::1::Prologix@COM4");
        assert_eq!(resources[29], "GPIB::30::Prologix@COM4");
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape(b"A+B"), b"A\x1b+B".to_vec());
        assert_eq!(escape(b"\x1b\r\n"), b"\x1b\x1b\x1b\r\x1b\n".to_vec());
        assert_eq!(escape(b"*IDN?"), b"*IDN?".to_vec());
    }

    #[test]
    fn test_open_sequence() {
        let link = MockTransport::new();
        let mut controller = PrologixController::with_link("COM4", Box::new(link.clone()));
        let mut properties = props("GPIB::5::Prologix@COM4");
        properties.gpib_eol_read = Some("\n".to_string());

        controller.open(&properties).unwrap();

        assert_eq!(
            link.written_text(),
            vec![
                "++ifc\n",
                "++mode 1\n",
                "++eos 2\n",
                "++eoi 1\n",
                "++auto 0\n",
                "++read_tmo_ms 50\n"
            ]
        );
    }

    #[test]
    fn test_unknown_terminator_falls_back_to_crlf() {
        let link = MockTransport::new();
        let mut controller = PrologixController::with_link("COM4", Box::new(link.clone()));
        let mut properties = props("GPIB::5::Prologix@COM4");
        properties.gpib_eol_write = Some("#".to_string());

        controller.open(&properties).unwrap();
        assert!(link.written_text().contains(&"++eos 0\n".to_string()));
    }

    #[test]
    fn test_address_switching() {
        let link = MockTransport::new();
        let mut controller = PrologixController::with_link("COM4", Box::new(link.clone()));
        controller.open(&props("GPIB::5::Prologix@COM4")).unwrap();
        let before = link.written().len();

        controller.write_to("5", b"*RST").unwrap();
        controller.write_to("5", b"VOLT 1").unwrap();
        controller.write_to("7", b"*CLS").unwrap();

        assert_eq!(
            link.written_text()[before..].to_vec(),
            vec!["++addr 5\n", "*RST\n", "VOLT 1\n", "++addr 7\n", "*CLS\n"]
        );
    }

    #[test]
    fn test_read_answer() {
        let link = MockTransport::new();
        let mut controller = PrologixController::with_link("COM4", Box::new(link.clone()));
        controller.open(&props("GPIB::5::Prologix@COM4")).unwrap();
        link.reply(b"++read eoi\n", b"1.5E-3\r\n");

        let outcome = controller.read_from("5").unwrap();
        assert!(outcome.complete);
        assert_eq!(outcome.data, b"1.5E-3\r");
    }

    #[test]
    fn test_read_times_out() {
        let link = MockTransport::new();
        let mut controller = PrologixController::with_link("COM4", Box::new(link.clone()));
        let mut properties = props("GPIB::5::Prologix@COM4");
        properties.timeout = 0.0;
        controller.open(&properties).unwrap();

        let outcome = controller.read_from("5").unwrap();
        assert!(!outcome.complete);
        assert!(outcome.data.is_empty());
    }

    #[test]
    fn test_read_timeout_clamped() {
        let link = MockTransport::new();
        let mut controller = PrologixController::with_link("COM4", Box::new(link.clone()));
        controller.open(&props("GPIB::1::Prologix@COM4")).unwrap();
        controller.set_read_timeout(10.0).unwrap();
        controller.set_read_timeout(0.0).unwrap();

        let written = link.written_text();
        assert!(written.contains(&"++read_tmo_ms 3000\n".to_string()));
        assert!(written.contains(&"++read_tmo_ms 1\n".to_string()));
    }

    #[test]
    fn test_get_version() {
        let link = MockTransport::new();
        let mut controller = PrologixController::with_link("COM4", Box::new(link.clone()));
        controller.open(&props("GPIB::1::Prologix@COM4")).unwrap();
        link.reply(b"++ver\n", b"Prologix GPIB-USB Controller version 6.0\r\n");

        assert_eq!(
            controller.get_version().unwrap(),
            "Prologix GPIB-USB Controller version 6.0"
        );
    }
}
