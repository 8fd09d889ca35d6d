pub mod arch;
pub mod config;
pub mod config_file;
pub mod driver;
pub mod error;
pub mod folders;
pub mod git;
pub mod logging;
pub mod ports;
pub mod release;
pub mod ui;
pub mod version;
pub mod warning;

pub use error::{Result, SweepMeError};
