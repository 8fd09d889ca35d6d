use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use super::kind::PortKind;
use super::port::Port;
use super::prologix;
use super::properties::unknown_keys;
use super::serial;
use super::visa;
use crate::config::Config;
use crate::error::{Result, SweepMeError};
use crate::logging;
use crate::warning::Warning;

/// A port shared by all drivers using the same resource.
pub type SharedPort = Arc<Mutex<Port>>;

/// Locks a shared port, recovering from a poisoned lock.
pub fn lock_port(port: &SharedPort) -> MutexGuard<'_, Port> {
    port.lock().unwrap_or_else(|e| e.into_inner())
}

/// Lists resources of one kind.
pub fn find_resources_of(kind: PortKind) -> Result<Vec<String>> {
    match kind {
        PortKind::Com => {
            let controllers = prologix::controller_addresses();
            Ok(serial::available_ports()?
                .into_iter()
                .filter(|port| !controllers.contains(port))
                .collect())
        }
        PortKind::Gpib => {
            let mut resources = prologix::list_resources();
            if visa::is_available() {
                resources.extend(visa::list_resources("GPIB?*")?);
            }
            Ok(resources)
        }
        other => match other.visa_query() {
            Some(query) if visa::is_available() => visa::list_resources(query),
            _ => Ok(Vec::new()),
        },
    }
}

/// Keeps the ports of a measurement open and shared between drivers.
pub struct PortManager {
    config: Config,
    ports: BTreeMap<String, SharedPort>,
}

impl PortManager {
    /// Port manager that registers the Prologix controllers of `config`.
    pub fn new(config: Config) -> Self {
        for address in &config.prologix.controllers {
            prologix::add_controller(address);
        }
        PortManager {
            config,
            ports: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Port types that can be searched for resources.
    pub fn get_port_types(&self) -> Vec<PortKind> {
        PortKind::supported()
    }

    /// Resources found per kind. A kind whose search fails is logged and
    /// reported without resources.
    pub fn find_resources(&self, kinds: &[PortKind]) -> BTreeMap<PortKind, Vec<String>> {
        kinds
            .iter()
            .map(|&kind| {
                let resources = find_resources_of(kind).unwrap_or_else(|e| {
                    logging::error(&format!("Unable to find {} resources", kind), &e);
                    Vec::new()
                });
                (kind, resources)
            })
            .collect()
    }

    /// Resources of `kinds` a driver can use.
    ///
    /// Registered ports that are closed and no longer found are dropped.
    /// Open USBTMC ports are listed only when their identification matches
    /// one of `identifications`, if any are given.
    pub fn get_resources_available(
        &mut self,
        kinds: &[PortKind],
        identifications: &[String],
    ) -> Vec<String> {
        let mut available: Vec<String> = Vec::new();
        for resources in self.find_resources(kinds).into_values() {
            for resource in resources {
                if !available.contains(&resource) {
                    available.push(resource);
                }
            }
        }

        self.ports.retain(|resource, port| {
            let port = lock_port(port);
            !kinds.contains(&port.kind()) || port.is_open() || available.contains(resource)
        });

        for (resource, port) in &self.ports {
            if available.contains(resource) {
                continue;
            }
            let port = lock_port(port);
            if !kinds.contains(&port.kind()) {
                continue;
            }
            let matches = match (&port.properties().identification, port.kind()) {
                (Some(id), PortKind::Usbtmc) if !identifications.is_empty() => {
                    identifications.iter().any(|wanted| id.contains(wanted.as_str()))
                }
                _ => true,
            };
            if matches {
                available.push(resource.clone());
            }
        }

        available
    }

    /// Shared, open port for `resource`.
    ///
    /// The port is reset to its defaults, then `properties` and the
    /// configured overrides for the resource are applied, the latter taking
    /// precedence.
    pub fn get_port(&mut self, resource: &str, properties: &toml::Table) -> Result<SharedPort> {
        for key in unknown_keys(properties) {
            warn!(
                "{}",
                Warning::UnknownProperty {
                    key,
                    resource: resource.to_string(),
                }
            );
        }

        let mut merged = properties.clone();
        merged.extend(self.config.port_overrides(resource));

        let shared = match self.ports.get(resource) {
            Some(port) => port.clone(),
            None => Arc::new(Mutex::new(Port::new(resource)?)),
        };

        {
            let mut port = lock_port(&shared);
            port.initialize_port_properties();
            port.update_properties(&merged)?;
            if !port.is_open() {
                port.open()?;
            }
        }

        self.ports.insert(resource.to_string(), shared.clone());
        Ok(shared)
    }

    /// The registered port for `resource`, if any.
    pub fn port(&self, resource: &str) -> Option<SharedPort> {
        self.ports.get(resource).cloned()
    }

    /// Closes and forgets the port of `resource`.
    pub fn remove_port(&mut self, resource: &str) -> Result<bool> {
        match self.ports.remove(resource) {
            Some(port) => {
                let mut port = lock_port(&port);
                if port.is_open() {
                    port.close()?;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn registered(&self, resource: &str) -> Result<SharedPort> {
        self.ports
            .get(resource)
            .cloned()
            .ok_or_else(|| SweepMeError::port(format!("Port '{}' is not registered", resource)))
    }

    fn registered_or_new(&mut self, resource: &str) -> Result<SharedPort> {
        if let Some(port) = self.ports.get(resource) {
            return Ok(port.clone());
        }
        let port = Arc::new(Mutex::new(Port::new(resource)?));
        self.ports.insert(resource.to_string(), port.clone());
        Ok(port)
    }

    /// Switches logging of read and written messages of a port.
    pub fn set_port_logging(&mut self, resource: &str, state: bool) -> Result<()> {
        let port = self.registered_or_new(resource)?;
        lock_port(&port).set_logging(state);
        Ok(())
    }

    /// Opens the port, asks for `*IDN?` and closes it again.
    pub fn get_identification(&mut self, resource: &str) -> Result<String> {
        let port = self.registered_or_new(resource)?;
        let mut port = lock_port(&port);
        if !port.is_open() {
            port.open()?;
        }
        let identification = port.get_identification();
        port.close()?;
        identification
    }

    pub fn open_port(&mut self, resource: &str) -> Result<()> {
        let port = self.registered(resource)?;
        let mut port = lock_port(&port);
        port.open()
    }

    pub fn close_port(&mut self, resource: &str) -> Result<()> {
        let port = self.registered(resource)?;
        let mut port = lock_port(&port);
        port.close()
    }

    /// Closes every open port. Failures are logged.
    pub fn close_all_ports(&mut self) {
        for (resource, port) in &self.ports {
            let mut port = lock_port(port);
            if !port.is_open() {
                continue;
            }
            if let Err(e) = port.close() {
                logging::error(&format!("Unable to close port {}", resource), &e);
            }
        }
    }

    pub fn add_prologix_controller(&mut self, address: &str) {
        prologix::add_controller(address);
        if !self.config.prologix.controllers.iter().any(|a| a == address) {
            self.config.prologix.controllers.push(address.to_string());
        }
    }

    /// Forgets the controller and closes its serial link.
    pub fn remove_prologix_controller(&mut self, address: &str) -> Result<()> {
        self.config.prologix.controllers.retain(|a| a != address);
        if let Some(controller) = prologix::remove_controller(address) {
            controller
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .close()?;
        }
        Ok(())
    }

    /// Called before a measurement starts.
    pub fn prepare_run(&mut self) {
        if !visa::is_available() {
            debug!("no VISA runtime registered, only COM, Prologix and socket ports usable");
        }
    }

    /// Called when a measurement ends.
    pub fn prepare_stop(&mut self) {
        self.close_all_ports();
    }
}

impl Drop for PortManager {
    fn drop(&mut self) {
        self.close_all_ports();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mock::MockTransport;

    fn manager_with(resource: &str, mock: &MockTransport) -> PortManager {
        let mut manager = PortManager::new(Config::default());
        let kind = PortKind::from_resource(resource).unwrap();
        let port = Port::with_transport(resource, kind, Box::new(mock.clone()));
        manager
            .ports
            .insert(resource.to_string(), Arc::new(Mutex::new(port)));
        manager
    }

    #[test]
    fn test_get_port_opens_and_shares() {
        let mock = MockTransport::new();
        let mut manager = manager_with("COM5", &mock);

        let first = manager.get_port("COM5", &toml::Table::new()).unwrap();
        let second = manager.get_port("COM5", &toml::Table::new()).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(mock.is_open());
        assert_eq!(mock.open_count(), 1);
    }

    #[test]
    fn test_get_port_resets_properties() {
        let mock = MockTransport::new();
        let mut manager = manager_with("COM5", &mock);

        let port = manager
            .get_port("COM5", &toml::from_str("baudrate = 115200").unwrap())
            .unwrap();
        assert_eq!(lock_port(&port).properties().baudrate, 115200);

        let port = manager.get_port("COM5", &toml::Table::new()).unwrap();
        assert_eq!(lock_port(&port).properties().baudrate, 9600);
    }

    #[test]
    fn test_configured_overrides_win() {
        let mock = MockTransport::new();
        let mut manager = manager_with("COM5", &mock);
        manager.config.ports.insert(
            "COM5".to_string(),
            toml::from_str("baudrate = 57600").unwrap(),
        );

        let port = manager
            .get_port("COM5", &toml::from_str("baudrate = 115200\ntimeout = 1").unwrap())
            .unwrap();
        let port = lock_port(&port);
        assert_eq!(port.properties().baudrate, 57600);
        assert_eq!(port.properties().timeout, 1.0);
    }

    #[test]
    fn test_unknown_resource() {
        let mut manager = PortManager::new(Config::default());
        assert!(manager.get_port("LPT1", &toml::Table::new()).is_err());
        assert!(manager.open_port("COM99").is_err());
        assert!(!manager.remove_port("COM99").unwrap());
    }

    #[test]
    fn test_close_all_ports() {
        let mock = MockTransport::new();
        let mut manager = manager_with("COM5", &mock);
        manager.get_port("COM5", &toml::Table::new()).unwrap();

        manager.prepare_stop();
        assert!(!mock.is_open());
    }

    #[test]
    fn test_identification_closes_port() {
        let mock = MockTransport::new();
        mock.reply(b"*IDN?\n", b"ACME,Meter,1,2\n");
        let mut manager = manager_with("TCPIP0::127.0.0.1::5025::SOCKET", &mock);

        let idn = manager
            .get_identification("TCPIP0::127.0.0.1::5025::SOCKET")
            .unwrap();
        assert_eq!(idn, "ACME,Meter,1,2");
        assert!(!mock.is_open());
    }

    #[test]
    fn test_closed_unlisted_ports_are_dropped() {
        let mock = MockTransport::new();
        let mut manager = manager_with("TCPIP0::127.0.0.1::5025::SOCKET", &mock);

        manager.get_resources_available(&[PortKind::Tcpip], &[]);
        assert!(manager.port("TCPIP0::127.0.0.1::5025::SOCKET").is_none());
    }

    #[test]
    fn test_open_ports_stay_listed() {
        let mock = MockTransport::new();
        let mut manager = manager_with("TCPIP0::127.0.0.1::5025::SOCKET", &mock);
        manager
            .get_port("TCPIP0::127.0.0.1::5025::SOCKET", &toml::Table::new())
            .unwrap();

        let available = manager.get_resources_available(&[PortKind::Tcpip], &[]);
        assert!(available.contains(&"TCPIP0::127.0.0.1::5025::SOCKET".to_string()));
    }

    #[test]
    fn test_port_logging() {
        let mock = MockTransport::new();
        let mut manager = manager_with("COM5", &mock);
        manager.set_port_logging("COM5", true).unwrap();
        let port = manager.port("COM5").unwrap();
        assert!(lock_port(&port).get_logging());
    }
}
