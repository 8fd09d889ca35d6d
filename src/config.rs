use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Name of the program configuration file.
pub const CONFIG_FILE_NAME: &str = "sweepme.toml";

/// Represents the complete program configuration of sweepme.
///
/// Contains Prologix controllers, folder overrides, per-resource port overrides
/// and the release-branch settings used by the release checks.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub prologix: PrologixConfig,

    /// Folder identifier -> path, overriding the defaults of the folder manager.
    #[serde(default)]
    pub folders: HashMap<String, String>,

    /// Resource name -> port properties that take precedence over the driver's.
    #[serde(default)]
    pub ports: BTreeMap<String, toml::Table>,

    #[serde(default)]
    pub release: ReleaseConfig,
}

/// Prologix GPIB-USB controllers, listed by the serial port they occupy.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct PrologixConfig {
    #[serde(default)]
    pub controllers: Vec<String>,
}

/// Returns the default ordered list of release branches, newest first.
fn default_release_branches() -> Vec<String> {
    vec![
        "main".to_string(),
        "1.5.6".to_string(),
        "v1.5.5.x".to_string(),
    ]
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_tag_pattern() -> String {
    "v{version}".to_string()
}

/// Configuration of the release checks.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ReleaseConfig {
    #[serde(default = "default_release_branches")]
    pub branches: Vec<String>,

    #[serde(default = "default_remote")]
    pub remote: String,

    #[serde(default = "default_tag_pattern")]
    pub tag_pattern: String,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        ReleaseConfig {
            branches: default_release_branches(),
            remote: default_remote(),
            tag_pattern: default_tag_pattern(),
        }
    }
}

impl Config {
    /// Port properties configured for a resource, empty if none are.
    pub fn port_overrides(&self, resource: &str) -> toml::Table {
        self.ports.get(resource).cloned().unwrap_or_default()
    }
}

/// Loads configuration from file or returns defaults.
///
/// Attempts to load configuration in the following order:
/// 1. Custom path provided as parameter
/// 2. `sweepme.toml` in current directory
/// 3. `sweepme/sweepme.toml` in the user config directory
/// 4. Default configuration if no file found
///
/// # Arguments
/// * `config_path` - Optional path to custom configuration file
///
/// # Returns
/// * `Ok(Config)` - Loaded or default configuration
/// * `Err` - If file exists but cannot be read or parsed
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    let config_str = if let Some(path) = config_path {
        fs::read_to_string(path)?
    } else if Path::new(CONFIG_FILE_NAME).exists() {
        fs::read_to_string(CONFIG_FILE_NAME)?
    } else if let Some(config_dir) = dirs::config_dir() {
        let config_path = config_dir.join("sweepme").join(CONFIG_FILE_NAME);
        if config_path.exists() {
            fs::read_to_string(config_path)?
        } else {
            return Ok(Config::default());
        }
    } else {
        return Ok(Config::default());
    };

    let config: Config = toml::from_str(&config_str)?;
    Ok(config)
}
