//! Finding, creating and connecting drivers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock};

use tracing::debug;

use super::{Device, Driver, Parameters, ScriptedDriver};
use crate::arch::ArchInfo;
use crate::config::Config;
use crate::error::{Result, SweepMeError};
use crate::logging;
use crate::ports::PortManager;

/// Creates a new instance of a compiled driver.
pub type DriverFactory = Arc<dyn Fn() -> Box<dyn Driver> + Send + Sync>;

fn registry() -> &'static RwLock<BTreeMap<String, DriverFactory>> {
    static REGISTRY: OnceLock<RwLock<BTreeMap<String, DriverFactory>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(BTreeMap::new()))
}

/// Makes a compiled driver available under `name`.
///
/// Registered drivers are found before definition files of the same name.
pub fn register_driver<F>(name: &str, factory: F)
where
    F: Fn() -> Box<dyn Driver> + Send + Sync + 'static,
{
    if let Ok(mut drivers) = registry().write() {
        drivers.insert(name.to_string(), Arc::new(factory));
    }
}

/// Removes a compiled driver; returns whether it was registered.
pub fn unregister_driver(name: &str) -> bool {
    registry()
        .write()
        .map(|mut drivers| drivers.remove(name).is_some())
        .unwrap_or(false)
}

/// Names of the compiled drivers.
pub fn registered_drivers() -> Vec<String> {
    registry()
        .read()
        .map(|drivers| drivers.keys().cloned().collect())
        .unwrap_or_default()
}

fn registered(name: &str) -> Option<DriverFactory> {
    registry().read().ok()?.get(name).cloned()
}

/// Definition file of the driver `name` in `folder`.
///
/// A file for the running architecture, `driver_<os>_<bits>.toml`, is
/// preferred over the generic `driver.toml`.
pub fn get_driver_path(folder: &Path, name: &str) -> PathBuf {
    let driver_folder = folder.join(name);
    let specific = driver_folder.join(format!("driver_{}.toml", ArchInfo::current().suffix()));
    if specific.is_file() {
        return specific;
    }
    driver_folder.join("driver.toml")
}

/// Creates the driver `name` found in `folder`.
pub fn instantiate_device(folder: &Path, name: &str) -> Result<Device> {
    let driver_folder = folder.join(name);

    if let Some(factory) = registered(name) {
        debug!("using compiled driver '{}'", name);
        return Ok(Device::new(name, factory()).with_folder(driver_folder));
    }

    let path = get_driver_path(folder, name);
    let driver = ScriptedDriver::load(name, &path).map_err(|e| {
        logging::error(&format!("Loading {} failed", path.display()), &e);
        SweepMeError::driver(format!(
            "Cannot load Driver '{}' from folder {}. Please change folder or copy Driver to your project.",
            name,
            folder.display()
        ))
    })?;
    debug!("loaded driver '{}' from {}", name, path.display());
    Ok(Device::new(name, Box::new(driver)).with_folder(driver_folder))
}

/// Creates drivers and connects them to shared ports.
pub struct DeviceManager {
    port_manager: PortManager,
}

impl DeviceManager {
    pub fn new(config: Config) -> Self {
        DeviceManager {
            port_manager: PortManager::new(config),
        }
    }

    pub fn with_port_manager(port_manager: PortManager) -> Self {
        DeviceManager { port_manager }
    }

    pub fn port_manager(&mut self) -> &mut PortManager {
        &mut self.port_manager
    }

    /// Driver `name` from `folder`, set up for `port`.
    ///
    /// An empty folder means the working directory. With a port, a driver
    /// that uses the port manager gets the shared port opened with its port
    /// properties, and `Device` and `Port` are set as parameters. Without a
    /// port only `Device` is set.
    pub fn get_driver(&mut self, name: &str, folder: &str, port: &str) -> Result<Device> {
        let folder = if folder.is_empty() { "." } else { folder };
        let name = name.trim_matches(|c| c == '/' || c == std::path::MAIN_SEPARATOR);

        let mut device = instantiate_device(Path::new(folder), name)?;

        let mut parameters = Parameters::new();
        parameters.insert("Device".to_string(), name.into());
        if !port.is_empty() {
            let description = device.description();
            if description.port_manager {
                let shared = self
                    .port_manager
                    .get_port(port, &description.port_properties)?;
                device.set_port(shared);
            }
            parameters.insert("Port".to_string(), port.into());
        }
        device.set_parameters(Some(&parameters))?;
        Ok(device)
    }

    /// Same as [`DeviceManager::get_driver`].
    pub fn get_device(&mut self, name: &str, folder: &str, port: &str) -> Result<Device> {
        self.get_driver(name, folder, port)
    }
}
