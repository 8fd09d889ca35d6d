//! Instrument drivers.
//!
//! A [`Driver`] implements the phases of a measurement (connect, initialize,
//! configure, apply, measure, call, ...) for one kind of instrument. Every
//! phase has a default that does nothing, so a driver only implements the
//! phases its instrument needs.
//!
//! A [`Device`] wraps a driver with the state the driver shares with its
//! host: port, sweep value, run-stop flag, GUI parameters. Drivers are
//! found and created by [`manager`], either from a registry of compiled
//! drivers or from a driver definition file ([`definition`]).

pub mod definition;
pub mod device;
pub mod manager;
pub mod store;

pub use definition::ScriptedDriver;
pub use device::{Device, DeviceContext};
pub use manager::{get_driver_path, instantiate_device, register_driver, DeviceManager};
pub use store::{restore_parameter, store_parameter, DeviceCommunication};

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SweepMeError};
use crate::ports::PortKind;

/// GUI parameter name -> value.
pub type Parameters = toml::Table;

/// Static information about a driver.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DriverDescription {
    pub description: String,
    pub shortname: String,
    pub variables: Vec<String>,
    pub units: Vec<String>,
    pub plottype: Vec<bool>,
    pub savetype: Vec<bool>,
    /// Whether the port is opened through the port manager
    pub port_manager: bool,
    pub port_types: Vec<PortKind>,
    /// Parts of `*IDN?` answers of supported instruments
    pub port_identifications: Vec<String>,
    pub port_properties: toml::Table,
}

/// Phases of a measurement that take no arguments and return nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    Connect,
    Disconnect,
    Initialize,
    Deinitialize,
    Configure,
    Unconfigure,
    Poweron,
    Poweroff,
    Signin,
    Signout,
    Start,
    Apply,
    Reach,
    Adapt,
    AdaptReady,
    TriggerReady,
    Measure,
    RequestResult,
    ReadResult,
    ProcessData,
    Finish,
}

impl Phase {
    pub const ALL: [Phase; 21] = [
        Phase::Connect,
        Phase::Disconnect,
        Phase::Initialize,
        Phase::Deinitialize,
        Phase::Configure,
        Phase::Unconfigure,
        Phase::Poweron,
        Phase::Poweroff,
        Phase::Signin,
        Phase::Signout,
        Phase::Start,
        Phase::Apply,
        Phase::Reach,
        Phase::Adapt,
        Phase::AdaptReady,
        Phase::TriggerReady,
        Phase::Measure,
        Phase::RequestResult,
        Phase::ReadResult,
        Phase::ProcessData,
        Phase::Finish,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Connect => "connect",
            Phase::Disconnect => "disconnect",
            Phase::Initialize => "initialize",
            Phase::Deinitialize => "deinitialize",
            Phase::Configure => "configure",
            Phase::Unconfigure => "unconfigure",
            Phase::Poweron => "poweron",
            Phase::Poweroff => "poweroff",
            Phase::Signin => "signin",
            Phase::Signout => "signout",
            Phase::Start => "start",
            Phase::Apply => "apply",
            Phase::Reach => "reach",
            Phase::Adapt => "adapt",
            Phase::AdaptReady => "adapt_ready",
            Phase::TriggerReady => "trigger_ready",
            Phase::Measure => "measure",
            Phase::RequestResult => "request_result",
            Phase::ReadResult => "read_result",
            Phase::ProcessData => "process_data",
            Phase::Finish => "finish",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = SweepMeError;

    fn from_str(s: &str) -> Result<Self> {
        Phase::ALL
            .iter()
            .find(|phase| phase.as_str() == s)
            .copied()
            .ok_or_else(|| SweepMeError::driver(format!("Unknown phase '{}'", s)))
    }
}

/// Behaviour of an instrument driver.
///
/// All phases default to doing nothing. [`Driver::call`] defaults to one
/// NaN per variable.
#[allow(unused_variables)]
pub trait Driver: Send {
    fn describe(&self) -> DriverDescription;

    /// GUI parameters with their defaults. A list offers a choice whose
    /// first element is the default.
    fn set_gui_parameter(&self) -> Parameters {
        Parameters::new()
    }

    /// Receives the GUI parameters selected by the user.
    fn get_gui_parameter(&mut self, parameters: &Parameters) -> Result<()> {
        Ok(())
    }

    /// Hands `parameters` to the driver, if any are given, and returns the
    /// GUI parameters for the new state.
    ///
    /// Drivers whose GUI changes with the selected values override this and
    /// complete partial `parameters` themselves.
    fn update_gui_parameters(&mut self, parameters: Option<&Parameters>) -> Result<Parameters> {
        if let Some(parameters) = parameters.filter(|p| !p.is_empty()) {
            self.get_gui_parameter(parameters)?;
        }
        Ok(self.set_gui_parameter())
    }

    /// Names of functions a user can trigger besides the phases.
    fn actions(&self) -> Vec<String> {
        Vec::new()
    }

    fn connect(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        Ok(())
    }

    fn disconnect(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        Ok(())
    }

    fn initialize(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        Ok(())
    }

    fn deinitialize(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        Ok(())
    }

    fn configure(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        Ok(())
    }

    fn unconfigure(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        Ok(())
    }

    /// Called when GUI parameters changed during a run. `keys` names the
    /// parameters that changed.
    fn reconfigure(
        &mut self,
        ctx: &mut DeviceContext,
        parameters: &Parameters,
        keys: &[String],
    ) -> Result<()> {
        self.update_gui_parameters(Some(parameters))?;
        self.configure(ctx)
    }

    fn poweron(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        Ok(())
    }

    fn poweroff(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        Ok(())
    }

    fn signin(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        Ok(())
    }

    fn signout(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        Ok(())
    }

    fn start(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        Ok(())
    }

    fn apply(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        Ok(())
    }

    /// Waits until the applied value is reached.
    fn reach(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        Ok(())
    }

    fn adapt(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        Ok(())
    }

    fn adapt_ready(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        Ok(())
    }

    fn trigger_ready(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        Ok(())
    }

    fn measure(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        Ok(())
    }

    fn request_result(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        Ok(())
    }

    fn read_result(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        Ok(())
    }

    fn process_data(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        Ok(())
    }

    /// Measured values, one per variable.
    fn call(&mut self, ctx: &mut DeviceContext) -> Result<Vec<f64>> {
        Ok(vec![f64::NAN; self.describe().variables.len()])
    }

    fn finish(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        Ok(())
    }
}

/// The value of a GUI parameter default: the first choice of a list, the
/// value itself otherwise.
pub fn default_choice(value: &toml::Value) -> toml::Value {
    match value {
        toml::Value::Array(choices) if !choices.is_empty() => choices[0].clone(),
        other => other.clone(),
    }
}

/// Text of a parameter or sweep value as sent to an instrument.
pub fn value_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;

    impl Driver for Silent {
        fn describe(&self) -> DriverDescription {
            DriverDescription {
                variables: vec!["Voltage".to_string(), "Current".to_string()],
                units: vec!["V".to_string(), "A".to_string()],
                ..DriverDescription::default()
            }
        }
    }

    #[test]
    fn test_default_call_gives_nan_per_variable() {
        let mut driver = Silent;
        let mut ctx = DeviceContext::new("Silent");
        let values = driver.call(&mut ctx).unwrap();
        assert_eq!(values.len(), 2);
        assert!(values.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_phase_names() {
        for phase in Phase::ALL {
            assert_eq!(phase.as_str().parse::<Phase>().unwrap(), phase);
        }
        assert!("call".parse::<Phase>().is_err());
        assert_eq!(Phase::AdaptReady.to_string(), "adapt_ready");
    }

    #[test]
    fn test_default_choice() {
        let list = toml::Value::Array(vec!["A".into(), "B".into()]);
        assert_eq!(default_choice(&list), toml::Value::from("A"));
        assert_eq!(default_choice(&toml::Value::from(3)), toml::Value::from(3));
        let empty = toml::Value::Array(Vec::new());
        assert_eq!(default_choice(&empty), empty);
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(&toml::Value::from("VOLT")), "VOLT");
        assert_eq!(value_to_string(&toml::Value::from(1.5)), "1.5");
        assert_eq!(value_to_string(&toml::Value::from(true)), "true");
    }
}
