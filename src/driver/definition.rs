//! Drivers described by a definition file instead of code.
//!
//! A definition file is a TOML document:
//!
//! ```toml
//! [driver]
//! description = "Source meter"
//! variables = ["Voltage", "Current"]
//! units = ["V", "A"]
//! port_manager = true
//! port_types = ["COM", "GPIB"]
//! compatibility = ["any"]
//!
//! [port_properties]
//! baudrate = 9600
//! EOL = "\r"
//!
//! [gui_parameters]
//! SweepMode = ["Voltage in V", "Current in A"]
//! Compliance = 0.1
//!
//! [phases]
//! initialize = ["*RST"]
//! apply = [":SOUR:VOLT {value}"]
//! call = [":MEAS:VOLT?", ":MEAS:CURR?"]
//! ```
//!
//! Each phase sends its commands in order. `{value}` is replaced by the sweep
//! value, `{<Parameter>}` by the GUI parameter of that name. Commands ending
//! in `?` are queries whose answer is read back. The answers to the `call`
//! commands are split at commas and parsed as the measured values.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use super::{value_to_string, DeviceContext, Driver, DriverDescription, Parameters, Phase};
use crate::arch::ArchInfo;
use crate::error::{Result, SweepMeError};
use crate::ports::PortKind;

/// Key of the phase that returns the measured values.
pub const CALL: &str = "call";

#[derive(Debug, Clone, Deserialize, Default)]
struct DriverSection {
    #[serde(default)]
    description: String,
    #[serde(default)]
    shortname: String,
    #[serde(default)]
    variables: Vec<String>,
    #[serde(default)]
    units: Vec<String>,
    #[serde(default)]
    plottype: Vec<bool>,
    #[serde(default)]
    savetype: Vec<bool>,
    #[serde(default)]
    port_manager: bool,
    #[serde(default)]
    port_types: Vec<PortKind>,
    #[serde(default)]
    port_identifications: Vec<String>,
    #[serde(default)]
    compatibility: Vec<String>,
    #[serde(default)]
    actions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Definition {
    driver: DriverSection,
    #[serde(default)]
    port_properties: toml::Table,
    #[serde(default)]
    gui_parameters: Parameters,
    #[serde(default)]
    phases: BTreeMap<String, Vec<String>>,
}

/// `{value}` or `{<Parameter>}` in a command.
const PLACEHOLDER: &str = r"\{([A-Za-z_][A-Za-z0-9_ ]*)\}";

/// Driver running the command lists of a definition file.
#[derive(Debug, Clone)]
pub struct ScriptedDriver {
    name: String,
    description: DriverDescription,
    actions: Vec<String>,
    gui_parameters: Parameters,
    phases: BTreeMap<Phase, Vec<String>>,
    call: Vec<String>,
    parameters: Parameters,
    placeholder: Regex,
}

impl ScriptedDriver {
    /// Reads the definition file at `path`.
    pub fn load(name: &str, path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(name, &content, &ArchInfo::current())
    }

    /// Driver from the content of a definition file, for the architecture
    /// `arch`.
    pub fn parse(name: &str, content: &str, arch: &ArchInfo) -> Result<Self> {
        let definition: Definition = toml::from_str(content).map_err(|e| {
            SweepMeError::driver(format!("Invalid definition of driver '{}': {}", name, e))
        })?;

        if !arch.is_compatible(&definition.driver.compatibility) {
            return Err(SweepMeError::driver(format!(
                "Driver '{}' does not support {} (compatible with: {})",
                name,
                arch.suffix(),
                definition.driver.compatibility.join(", ")
            )));
        }

        let placeholder =
            Regex::new(PLACEHOLDER).map_err(|e| SweepMeError::driver(e.to_string()))?;

        let mut phases = BTreeMap::new();
        let mut call = Vec::new();
        for (key, commands) in definition.phases {
            if key == CALL {
                call = commands;
                continue;
            }
            let phase: Phase = key.parse().map_err(|_| {
                SweepMeError::driver(format!("Unknown phase '{}' in driver '{}'", key, name))
            })?;
            phases.insert(phase, commands);
        }

        let section = definition.driver;
        let description = DriverDescription {
            description: section.description,
            shortname: if section.shortname.is_empty() {
                name.to_string()
            } else {
                section.shortname
            },
            variables: section.variables,
            units: section.units,
            plottype: section.plottype,
            savetype: section.savetype,
            port_manager: section.port_manager,
            port_types: section.port_types,
            port_identifications: section.port_identifications,
            port_properties: definition.port_properties,
        };

        Ok(ScriptedDriver {
            name: name.to_string(),
            description,
            actions: section.actions,
            gui_parameters: definition.gui_parameters,
            phases,
            call,
            parameters: Parameters::new(),
            placeholder,
        })
    }

    /// Commands of `phase`, empty if the definition has none.
    pub fn commands(&self, phase: Phase) -> &[String] {
        self.phases.get(&phase).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `command` with its placeholders filled in.
    pub fn substitute(&self, command: &str, value: Option<&toml::Value>) -> Result<String> {
        let mut missing = None;
        let result = self.placeholder.replace_all(command, |caps: &regex::Captures| {
            let key = &caps[1];
            let found = if key == "value" {
                value.map(value_to_string)
            } else {
                self.parameters.get(key).map(value_to_string)
            };
            found.unwrap_or_else(|| {
                missing.get_or_insert_with(|| key.to_string());
                String::new()
            })
        });

        match missing {
            Some(key) => Err(SweepMeError::driver(format!(
                "Driver '{}' has no value for '{{{}}}' in command '{}'",
                self.name, key, command
            ))),
            None => Ok(result.into_owned()),
        }
    }

    /// Sends the commands of one phase and returns the answers of its queries.
    fn execute(&self, commands: &[String], ctx: &mut DeviceContext) -> Result<Vec<String>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }

        let mut answers = Vec::new();
        let mut port = ctx.port()?;
        for command in commands {
            let command = self.substitute(command, ctx.value.as_ref())?;
            port.write(&command)?;
            if command.trim_end().ends_with('?') {
                let answer = port.read(0)?;
                debug!(driver = %self.name, "{} -> {}", command, answer);
                answers.push(answer);
            }
        }
        Ok(answers)
    }

    fn run_phase(&mut self, phase: Phase, ctx: &mut DeviceContext) -> Result<()> {
        self.execute(self.commands(phase), ctx)?;
        Ok(())
    }
}

/// Numbers in a comma separated answer.
pub fn parse_values(answer: &str) -> Result<Vec<f64>> {
    answer
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<f64>().map_err(|_| {
                SweepMeError::driver(format!("Unable to read '{}' as a number", part))
            })
        })
        .collect()
}

impl Driver for ScriptedDriver {
    fn describe(&self) -> DriverDescription {
        self.description.clone()
    }

    fn set_gui_parameter(&self) -> Parameters {
        self.gui_parameters.clone()
    }

    fn get_gui_parameter(&mut self, parameters: &Parameters) -> Result<()> {
        self.parameters = parameters.clone();
        Ok(())
    }

    fn actions(&self) -> Vec<String> {
        self.actions.clone()
    }

    fn connect(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        self.run_phase(Phase::Connect, ctx)
    }

    fn disconnect(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        self.run_phase(Phase::Disconnect, ctx)
    }

    fn initialize(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        self.run_phase(Phase::Initialize, ctx)
    }

    fn deinitialize(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        self.run_phase(Phase::Deinitialize, ctx)
    }

    fn configure(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        self.run_phase(Phase::Configure, ctx)
    }

    fn unconfigure(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        self.run_phase(Phase::Unconfigure, ctx)
    }

    fn poweron(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        self.run_phase(Phase::Poweron, ctx)
    }

    fn poweroff(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        self.run_phase(Phase::Poweroff, ctx)
    }

    fn signin(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        self.run_phase(Phase::Signin, ctx)
    }

    fn signout(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        self.run_phase(Phase::Signout, ctx)
    }

    fn start(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        self.run_phase(Phase::Start, ctx)
    }

    fn apply(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        self.run_phase(Phase::Apply, ctx)
    }

    fn reach(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        self.run_phase(Phase::Reach, ctx)
    }

    fn adapt(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        self.run_phase(Phase::Adapt, ctx)
    }

    fn adapt_ready(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        self.run_phase(Phase::AdaptReady, ctx)
    }

    fn trigger_ready(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        self.run_phase(Phase::TriggerReady, ctx)
    }

    fn measure(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        self.run_phase(Phase::Measure, ctx)
    }

    fn request_result(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        self.run_phase(Phase::RequestResult, ctx)
    }

    fn read_result(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        self.run_phase(Phase::ReadResult, ctx)
    }

    fn process_data(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        self.run_phase(Phase::ProcessData, ctx)
    }

    fn finish(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        self.run_phase(Phase::Finish, ctx)
    }

    fn call(&mut self, ctx: &mut DeviceContext) -> Result<Vec<f64>> {
        if self.call.is_empty() {
            return Ok(vec![f64::NAN; self.description.variables.len()]);
        }

        let mut values = Vec::new();
        for answer in self.execute(&self.call, ctx)? {
            values.extend(parse_values(&answer)?);
        }
        if values.len() != self.description.variables.len() {
            return Err(SweepMeError::driver(format!(
                "Driver '{}' read {} values for {} variables",
                self.name,
                values.len(),
                self.description.variables.len()
            )));
        }
        Ok(values)
    }
}
