use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard};

use tracing::debug;

use super::store::{self, DeviceCommunication};
use super::{default_choice, Driver, DriverDescription, Parameters, Phase};
use crate::config_file::{ConfigFile, Sections};
use crate::error::{Result, SweepMeError};
use crate::folders;
use crate::ports::{lock_port, Port, SharedPort};
use crate::ui;

/// Parameters every driver accepts besides its GUI parameters.
pub const HOST_PARAMETERS: [&str; 4] = ["Port", "Label", "Channel", "Device"];

/// What a driver can reach while it runs.
#[derive(Debug)]
pub struct DeviceContext {
    name: String,
    folder: Option<PathBuf>,
    pub port: Option<SharedPort>,
    /// The sweep value to apply
    pub value: Option<toml::Value>,
    run_stopped: Arc<AtomicBool>,
}

impl DeviceContext {
    pub fn new(name: &str) -> Self {
        DeviceContext {
            name: name.to_string(),
            folder: None,
            port: None,
            value: None,
            run_stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Name of the driver, which is also the name of its folder.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Locks the driver's port.
    pub fn port(&self) -> Result<MutexGuard<'_, Port>> {
        self.port
            .as_ref()
            .map(lock_port)
            .ok_or_else(|| SweepMeError::driver(format!("Driver '{}' has no port", self.name)))
    }

    /// Whether a stop of the run was requested. Long running phases check it
    /// to return early.
    pub fn is_run_stopped(&self) -> bool {
        self.run_stopped.load(Ordering::SeqCst)
    }

    /// Path of a folder identifier. `SELF` is the driver's own folder.
    pub fn get_folder(&self, identifier: &str) -> Option<PathBuf> {
        if identifier == "SELF" {
            return self.folder.clone();
        }
        folders::get_path(identifier)
    }

    /// The driver's config file, `<CUSTOMFILES>/<name>.toml`.
    pub fn config_file(&self) -> Option<ConfigFile> {
        let folder = folders::get_path("CUSTOMFILES")?;
        Some(ConfigFile::new(folder.join(format!("{}.toml", self.name))))
    }

    pub fn is_configfile(&self) -> bool {
        self.config_file().map(|file| file.is_file()).unwrap_or(false)
    }

    /// Sections of the config file, none if there is no file.
    pub fn get_configsections(&self) -> Vec<String> {
        match self.config_file() {
            Some(mut file) if file.is_file() => file.get_sections(),
            _ => Vec::new(),
        }
    }

    pub fn get_configoptions(&self, section: &str) -> BTreeMap<String, String> {
        match self.config_file() {
            Some(mut file) if file.is_file() => file.get_options(section),
            _ => BTreeMap::new(),
        }
    }

    /// The whole config file, section by section.
    pub fn get_config(&self) -> Sections {
        match self.config_file() {
            Some(mut file) if file.is_file() => file.get_values(),
            _ => Sections::new(),
        }
    }

    pub fn store_parameter<T: std::any::Any + Send + Sync>(&self, key: &str, value: T) {
        store::store_parameter(key, value)
    }

    pub fn restore_parameter<T: std::any::Any + Clone>(&self, key: &str) -> Option<T> {
        store::restore_parameter(key)
    }

    pub fn device_communication(&self) -> DeviceCommunication {
        DeviceCommunication
    }

    pub fn message_log(&self, message: &str) {
        ui::message_log(message)
    }

    pub fn message_info(&self, message: &str) {
        ui::message_info(message)
    }

    pub fn message_box(&self, message: &str, blocking: bool) {
        ui::message_box(message, blocking)
    }

    pub fn message_balloon(&self, message: &str) {
        ui::message_balloon(message)
    }
}

/// A driver instance together with its context and parameters.
pub struct Device {
    driver: Box<dyn Driver>,
    context: DeviceContext,
    latest_parameters: Option<Parameters>,
}

impl Device {
    pub fn new(name: &str, driver: Box<dyn Driver>) -> Self {
        Device {
            driver,
            context: DeviceContext::new(name),
            latest_parameters: None,
        }
    }

    /// Sets the folder the driver was loaded from.
    pub fn with_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.context.folder = Some(folder.into());
        self
    }

    pub fn name(&self) -> &str {
        self.context.name()
    }

    pub fn folder(&self) -> Option<&Path> {
        self.context.folder.as_deref()
    }

    pub fn description(&self) -> DriverDescription {
        self.driver.describe()
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    pub fn driver_mut(&mut self) -> &mut dyn Driver {
        self.driver.as_mut()
    }

    pub fn context(&self) -> &DeviceContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut DeviceContext {
        &mut self.context
    }

    pub fn set_port(&mut self, port: SharedPort) {
        self.context.port = Some(port);
    }

    pub fn get_port(&self) -> Option<SharedPort> {
        self.context.port.clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.driver.actions()
    }

    /// Resets the saved parameters to the driver's defaults.
    ///
    /// List defaults select their first element. `Device` and `Port` are
    /// never part of the defaults and are kept.
    pub fn reset_latest_parameters(&mut self) -> Result<()> {
        let previous = self.latest_parameters.take().unwrap_or_default();
        let mut latest: Parameters = self
            .driver
            .update_gui_parameters(None)?
            .iter()
            .map(|(key, value)| (key.clone(), default_choice(value)))
            .collect();

        for key in ["Device", "Port"] {
            if let Some(value) = previous.get(key) {
                latest.insert(key.to_string(), value.clone());
            }
        }
        self.latest_parameters = Some(latest);
        Ok(())
    }

    fn latest_parameters(&mut self) -> Result<&mut Parameters> {
        if self.latest_parameters.is_none() {
            self.reset_latest_parameters()?;
        }
        Ok(self.latest_parameters.get_or_insert_with(Parameters::new))
    }

    /// The parameters currently saved for the device.
    pub fn get_parameters(&mut self) -> Result<Parameters> {
        Ok(self.latest_parameters()?.clone())
    }

    /// Overwrites saved parameters and hands all of them to the driver.
    ///
    /// Keys must be GUI parameters of the driver or one of `Port`, `Label`,
    /// `Channel` and `Device`. Without parameters the saved ones are only
    /// initialized.
    pub fn set_parameters(&mut self, parameters: Option<&Parameters>) -> Result<()> {
        let latest = self.latest_parameters()?;
        let Some(parameters) = parameters.filter(|p| !p.is_empty()) else {
            return Ok(());
        };

        let supported: Vec<String> = latest
            .keys()
            .cloned()
            .chain(HOST_PARAMETERS.iter().map(|key| key.to_string()))
            .collect();
        for (key, value) in parameters {
            if !supported.contains(key) {
                return Err(SweepMeError::parameter(format!(
                    "Keyword '{}' not supported as parameter. Supported parameters are: {}",
                    key,
                    supported.join(", ")
                )));
            }
            latest.insert(key.clone(), value.clone());
        }

        let latest = latest.clone();
        self.driver.update_gui_parameters(Some(&latest))?;
        Ok(())
    }

    /// Like [`Driver::update_gui_parameters`], with keys missing in
    /// `parameters` filled in from the driver's defaults.
    ///
    /// Parameters left over from another driver are handed on as well.
    pub fn update_gui_parameters_with_defaults(
        &mut self,
        parameters: Option<&Parameters>,
    ) -> Result<Parameters> {
        let Some(parameters) = parameters else {
            return self.driver.update_gui_parameters(None);
        };
        let mut merged: Parameters = self
            .driver
            .update_gui_parameters(None)?
            .iter()
            .map(|(key, value)| (key.clone(), default_choice(value)))
            .collect();
        merged.extend(parameters.clone());
        self.driver.update_gui_parameters(Some(&merged))
    }

    /// Runs one phase of the driver.
    pub fn run(&mut self, phase: Phase) -> Result<()> {
        debug!(driver = %self.context.name, "{}", phase);
        let ctx = &mut self.context;
        match phase {
            Phase::Connect => self.driver.connect(ctx),
            Phase::Disconnect => self.driver.disconnect(ctx),
            Phase::Initialize => self.driver.initialize(ctx),
            Phase::Deinitialize => self.driver.deinitialize(ctx),
            Phase::Configure => self.driver.configure(ctx),
            Phase::Unconfigure => self.driver.unconfigure(ctx),
            Phase::Poweron => self.driver.poweron(ctx),
            Phase::Poweroff => self.driver.poweroff(ctx),
            Phase::Signin => self.driver.signin(ctx),
            Phase::Signout => self.driver.signout(ctx),
            Phase::Start => self.driver.start(ctx),
            Phase::Apply => self.driver.apply(ctx),
            Phase::Reach => self.driver.reach(ctx),
            Phase::Adapt => self.driver.adapt(ctx),
            Phase::AdaptReady => self.driver.adapt_ready(ctx),
            Phase::TriggerReady => self.driver.trigger_ready(ctx),
            Phase::Measure => self.driver.measure(ctx),
            Phase::RequestResult => self.driver.request_result(ctx),
            Phase::ReadResult => self.driver.read_result(ctx),
            Phase::ProcessData => self.driver.process_data(ctx),
            Phase::Finish => self.driver.finish(ctx),
        }
    }

    pub fn reconfigure(&mut self, parameters: &Parameters, keys: &[String]) -> Result<()> {
        self.driver.reconfigure(&mut self.context, parameters, keys)
    }

    pub fn call(&mut self) -> Result<Vec<f64>> {
        self.driver.call(&mut self.context)
    }

    pub fn set_value(&mut self, value: toml::Value) {
        self.context.value = Some(value);
    }

    /// Sets the sweep value and applies it.
    pub fn apply_value(&mut self, value: toml::Value) -> Result<()> {
        self.set_value(value);
        self.run(Phase::Apply)
    }

    /// Applies `value` and waits until it is reached.
    pub fn write(&mut self, value: toml::Value) -> Result<()> {
        self.run(Phase::Start)?;
        self.apply_value(value)?;
        self.run(Phase::Reach)
    }

    /// Runs the measurement phases and returns the values of
    /// [`Device::get_variables`].
    pub fn read(&mut self) -> Result<Vec<f64>> {
        for phase in [
            Phase::Adapt,
            Phase::AdaptReady,
            Phase::TriggerReady,
            Phase::Measure,
            Phase::RequestResult,
            Phase::ReadResult,
            Phase::ProcessData,
        ] {
            self.run(phase)?;
        }
        self.call()
    }

    pub fn get_variables(&self) -> Vec<String> {
        self.driver.describe().variables
    }

    pub fn get_units(&self) -> Vec<String> {
        self.driver.describe().units
    }

    /// Variables paired with their units.
    pub fn get_variables_units(&self) -> Vec<(String, String)> {
        let description = self.driver.describe();
        description
            .variables
            .into_iter()
            .zip(description.units)
            .collect()
    }

    /// Marks the start of a run.
    pub fn on_run(&self) {
        self.context.run_stopped.store(false, Ordering::SeqCst);
    }

    /// Requests the run to stop.
    pub fn on_stop(&self) {
        self.context.run_stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_run_stopped(&self) -> bool {
        self.context.is_run_stopped()
    }

    /// Flag another thread can set to stop the run.
    pub fn run_stop_handle(&self) -> Arc<AtomicBool> {
        self.context.run_stopped.clone()
    }

    pub fn get_folder(&self, identifier: &str) -> Option<PathBuf> {
        self.context.get_folder(identifier)
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.context.name)
            .field("folder", &self.context.folder)
            .field("latest_parameters", &self.latest_parameters)
            .finish()
    }
}
