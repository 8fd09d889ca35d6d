use anyhow::Result;
use clap::{Parser, Subcommand};

use sweepme::config::{self, Config};
use sweepme::driver::{Device, DeviceManager, Phase};
use sweepme::folders::FolderManager;
use sweepme::git::Git2Repository;
use sweepme::ports::{lock_port, PortKind, PortManager};
use sweepme::release::{self, MergeCheckOptions};
use sweepme::version::PACKAGE_VERSION;
use sweepme::{logging, ui};

#[derive(Parser)]
#[command(
    name = "sweepme",
    version,
    about = "Talk to instruments through sweepme drivers and check releases"
)]
struct Args {
    #[arg(short, long, global = true, help = "Custom configuration file path")]
    config: Option<String>,

    #[arg(long, global = true, help = "Print debug messages")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Find and talk to ports
    #[command(subcommand)]
    Ports(PortsCommand),

    /// Load drivers and measure with them
    #[command(subcommand)]
    Driver(DriverCommand),

    /// Checks to run before merging or publishing
    #[command(subcommand)]
    Release(ReleaseCommand),
}

#[derive(Subcommand)]
enum PortsCommand {
    /// List the resources of all or selected port types
    List {
        #[arg(short = 't', long = "type", help = "Port type, e.g. COM or GPIB")]
        types: Vec<PortKind>,
    },
    /// Ask an instrument for its identification
    Identify { resource: String },
    /// Send a command and print the answer
    Query { resource: String, command: String },
}

#[derive(Subcommand)]
enum DriverCommand {
    /// Show variables, parameters and port settings of a driver
    Info {
        name: String,
        #[arg(short, long, default_value = ".", help = "Folder containing the driver")]
        folder: String,
    },
    /// Measure once and print the values
    Read {
        name: String,
        #[arg(short, long, default_value = ".", help = "Folder containing the driver")]
        folder: String,
        #[arg(short, long, default_value = "", help = "Port resource, e.g. COM3")]
        port: String,
    },
    /// Apply a sweep value
    Write {
        name: String,
        value: String,
        #[arg(short, long, default_value = ".", help = "Folder containing the driver")]
        folder: String,
        #[arg(short, long, default_value = "", help = "Port resource, e.g. COM3")]
        port: String,
    },
}

#[derive(Subcommand)]
enum ReleaseCommand {
    /// Check that a branch can be merged keeping the history semilinear
    CheckMerge {
        #[arg(long, help = "Branch to merge into")]
        target: String,
        #[arg(long, help = "Branch to merge")]
        source: String,
        #[arg(long, help = "Remote to compare with")]
        remote: Option<String>,
        #[arg(long, help = "Use local data without fetching")]
        no_fetch: bool,
    },
    /// Check that a version has not been published yet
    CheckVersion {
        #[arg(long, help = "Version to check, defaults to this package's version")]
        version: Option<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.debug);

    let config = match config::load_config(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            ui::display_error(&format!("Error loading config: {}", e));
            std::process::exit(1);
        }
    };

    if !config.folders.is_empty() {
        if let Ok(mut folders) = FolderManager::global().write() {
            folders.apply_overrides(&config.folders);
        }
    }

    let outcome = match args.command {
        Command::Ports(command) => run_ports(command, config),
        Command::Driver(command) => run_driver(command, config),
        Command::Release(command) => run_release(command, config),
    };

    if let Err(e) = outcome {
        ui::display_error(&e.to_string());
        std::process::exit(1);
    }
    Ok(())
}

fn run_ports(command: PortsCommand, config: Config) -> Result<()> {
    let mut manager = PortManager::new(config);

    match command {
        PortsCommand::List { types } => {
            let kinds = if types.is_empty() {
                manager.get_port_types()
            } else {
                types
            };
            for (kind, resources) in manager.find_resources(&kinds) {
                ui::display_resources(kind, &resources);
            }
        }
        PortsCommand::Identify { resource } => {
            let identification = manager.get_identification(&resource)?;
            println!("{}", identification);
        }
        PortsCommand::Query { resource, command } => {
            let port = manager.get_port(&resource, &toml::Table::new())?;
            let answer = lock_port(&port).query(&command)?;
            println!("{}", answer);
        }
    }

    manager.close_all_ports();
    Ok(())
}

fn run_driver(command: DriverCommand, config: Config) -> Result<()> {
    let mut manager = DeviceManager::new(config);

    match command {
        DriverCommand::Info { name, folder } => {
            let mut device = manager.get_driver(&name, &folder, "")?;
            print_driver_info(&mut device)?;
        }
        DriverCommand::Read { name, folder, port } => {
            let mut device = manager.get_driver(&name, &folder, &port)?;
            let values = with_connected(&mut device, |device| device.read())?;
            ui::display_measurement(&device.get_variables(), &device.get_units(), &values);
        }
        DriverCommand::Write {
            name,
            value,
            folder,
            port,
        } => {
            let mut device = manager.get_driver(&name, &folder, &port)?;
            let value = parse_sweep_value(&value);
            let shown = value.to_string();
            with_connected(&mut device, |device| device.write(value))?;
            ui::display_success(&format!("Applied {} with driver '{}'", shown, name));
        }
    }

    manager.port_manager().prepare_stop();
    Ok(())
}

/// Runs `action` between the setup and teardown phases of a measurement.
///
/// Teardown runs even when `action` fails.
fn with_connected<T>(
    device: &mut Device,
    action: impl FnOnce(&mut Device) -> sweepme::Result<T>,
) -> Result<T> {
    device.on_run();
    for phase in [Phase::Connect, Phase::Initialize, Phase::Configure] {
        device.run(phase)?;
    }

    let outcome = action(device);

    for phase in [Phase::Unconfigure, Phase::Deinitialize, Phase::Disconnect] {
        if let Err(e) = device.run(phase) {
            logging::error(&format!("Phase {} failed", phase), &e);
        }
    }
    Ok(outcome?)
}

fn parse_sweep_value(value: &str) -> toml::Value {
    value
        .parse::<f64>()
        .map(toml::Value::from)
        .unwrap_or_else(|_| toml::Value::from(value))
}

fn print_driver_info(device: &mut Device) -> Result<()> {
    let description = device.description();
    println!("Driver: {}", device.name());
    if !description.description.is_empty() {
        println!("  {}", description.description);
    }

    println!("Variables:");
    for (variable, unit) in device.get_variables_units() {
        println!("  {} [{}]", variable, unit);
    }

    if !description.port_types.is_empty() {
        let types: Vec<&str> = description.port_types.iter().map(|k| k.as_str()).collect();
        println!("Port types: {}", types.join(", "));
    }

    println!("Parameters:");
    for (key, value) in device.get_parameters()? {
        println!("  {} = {}", key, value);
    }

    let actions = device.actions();
    if !actions.is_empty() {
        println!("Actions: {}", actions.join(", "));
    }
    Ok(())
}

fn run_release(command: ReleaseCommand, config: Config) -> Result<()> {
    let repo = Git2Repository::open(".")?;

    match command {
        ReleaseCommand::CheckMerge {
            target,
            source,
            remote,
            no_fetch,
        } => {
            let mut options = MergeCheckOptions::from(&config.release);
            if let Some(remote) = remote {
                options.remote = remote;
            }
            options.fetch = !no_fetch;

            if options.fetch {
                ui::display_status(&format!("Fetching latest data from {}...", options.remote));
            }
            let report = release::check_merge(&repo, &target, &source, &options)?;
            for warning in &report.warnings {
                ui::display_warning(warning);
            }
            ui::display_merge_report(&report);
            ui::display_success(&format!("'{}' can be merged into '{}'", source, target));
        }
        ReleaseCommand::CheckVersion { version } => {
            let version = version.unwrap_or_else(|| PACKAGE_VERSION.to_string());
            let tag =
                release::check_version_unique(&repo, &version, &config.release.tag_pattern)?;
            ui::display_success(&format!(
                "Version {} is not published yet, it will be tagged '{}'",
                version, tag
            ));
        }
    }
    Ok(())
}
