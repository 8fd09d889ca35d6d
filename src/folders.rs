//! Well-known folders and files, addressed by identifier.
//!
//! A single process-wide [`FolderManager`] is created on first use. Nothing in
//! the crate creates it eagerly, so a host can still adjust paths (see
//! [`FolderManager::has_instance`]) before the first lookup.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{OnceLock, RwLock};

use tracing::warn;
use walkdir::WalkDir;

use crate::error::{Result, SweepMeError};
use crate::logging;

const APP_DIR: &str = "SweepMe!";

/// Root folders every other folder is derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct BasePaths {
    pub main: PathBuf,
    pub public: PathBuf,
    pub roaming: PathBuf,
    pub local: PathBuf,
    pub program_data: PathBuf,
}

impl BasePaths {
    /// Detects the root folders of the current user.
    ///
    /// Falls back to the working directory where the platform has no
    /// equivalent folder.
    pub fn detect() -> Self {
        let main = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let under = |dir: Option<PathBuf>| {
            dir.map(|d| d.join(APP_DIR))
                .unwrap_or_else(|| PathBuf::from("."))
        };

        BasePaths {
            public: under(dirs::document_dir()),
            roaming: under(dirs::config_dir()),
            local: under(dirs::data_local_dir()),
            program_data: under(dirs::data_dir()),
            main,
        }
    }

    /// All root folders placed inside one directory, as used in portable setups.
    pub fn portable(root: &Path) -> Self {
        BasePaths {
            main: root.to_path_buf(),
            public: root.join("public"),
            roaming: root.join("roaming"),
            local: root.join("local"),
            program_data: root.join("programdata"),
        }
    }
}

/// Resolves folder and file identifiers to paths.
#[derive(Debug, Clone)]
pub struct FolderManager {
    base: BasePaths,
    folders: BTreeMap<String, PathBuf>,
    files: BTreeMap<String, Option<PathBuf>>,
    temporary_folder: Option<PathBuf>,
}

fn instance() -> &'static OnceLock<RwLock<FolderManager>> {
    static INSTANCE: OnceLock<RwLock<FolderManager>> = OnceLock::new();
    &INSTANCE
}

impl FolderManager {
    pub fn new(base: BasePaths) -> Self {
        let main = base.main.clone();
        let public = base.public.clone();
        let roaming = base.roaming.clone();
        let local = base.local.clone();
        let program_data = base.program_data.clone();

        let config = program_data.join("configuration");
        let custom_resources = public.join("Resources");
        let temp = local.join("temp");

        let folders: BTreeMap<String, PathBuf> = [
            ("MAIN", main.clone()),
            ("TEMP", temp.clone()),
            ("RESOURCES", main.join("resources")),
            ("DATA", public.join("Measurement")),
            ("SETTINGS", public.join("Settings")),
            ("ROAMINGSETTINGS", roaming.join("Settings")),
            ("EXAMPLES", main.join("examples")),
            ("PROFILES", roaming.join("profiles")),
            ("PROGRAMDATA", program_data.clone()),
            ("DEVICES", main.join("Devices")),
            ("MODULES", main.join("Modules")),
            ("WIDGETS", main.join("Widgets")),
            ("INTERFACES", main.join("libs").join("interfaces")),
            ("SHAREDDEVICES", program_data.join("Devices")),
            ("SHAREDMODULES", program_data.join("Modules")),
            ("VERSIONS", program_data.join("Versions")),
            ("CONFIG", config.clone()),
            ("SERVER", config.join("server")),
            ("CUSTOMDEVICESOLD", public.join("CustomDeviceClasses")),
            ("CUSTOMDEVICES", public.join("CustomDevices")),
            ("CUSTOMMODULES", public.join("CustomModules")),
            ("DATAMODULES", public.join("DataModules")),
            ("DATADEVICES", public.join("DataDevices")),
            ("LOCAL", local.clone()),
            ("ROAMING", roaming.clone()),
            ("PUBLIC", public.clone()),
            ("CALIBRATIONS", public.join("CalibrationFiles")),
            ("CUSTOM", public.join("CustomFiles")),
            ("CUSTOMFILES", public.join("CustomFiles")),
            ("CUSTOMRESOURCES", custom_resources.clone()),
            ("CUSTOMCOLORMAPS", custom_resources.join("colormaps")),
            ("CUSTOMSTYLES", custom_resources.join("styles")),
            ("CUSTOMICONS", custom_resources.join("icons")),
            ("EXTLIBS", public.join("ExternalLibraries")),
        ]
        .into_iter()
        .map(|(key, path)| (key.to_string(), path))
        .collect();

        let files: BTreeMap<String, Option<PathBuf>> = [
            // unknown until a profile is selected
            ("PROFILEINI", None),
            ("OSUSERINI", Some(roaming.join("OSuser.ini"))),
            ("CONFIG", Some(config.join(crate::config::CONFIG_FILE_NAME))),
            (
                "SWEEPMEICON",
                Some(main.join("resources").join("icons").join("SweepMeS_icon.ico")),
            ),
            ("TEXTEDITOR", None),
            ("LOGBOOK", Some(temp.join("temp_logbook.txt"))),
            ("DEBUG", Some(public.join("debug.log"))),
            ("DEBUGFH", Some(public.join("debug_fh.log"))),
        ]
        .into_iter()
        .map(|(key, path)| (key.to_string(), path))
        .collect();

        FolderManager {
            base,
            folders,
            files,
            temporary_folder: None,
        }
    }

    /// The process-wide folder manager, created on first use.
    pub fn global() -> &'static RwLock<FolderManager> {
        instance().get_or_init(|| RwLock::new(FolderManager::new(BasePaths::detect())))
    }

    /// Installs `manager` as the process-wide instance.
    ///
    /// Fails if the instance was already created.
    pub fn install(manager: FolderManager) -> Result<()> {
        instance()
            .set(RwLock::new(manager))
            .map_err(|_| SweepMeError::folder("Folder manager is already initialized"))
    }

    /// Whether the process-wide instance has been created.
    pub fn has_instance() -> bool {
        instance().get().is_some()
    }

    pub fn base(&self) -> &BasePaths {
        &self.base
    }

    pub fn folder_identifiers(&self) -> Vec<String> {
        self.folders.keys().cloned().collect()
    }

    /// Applies `identifier -> path` overrides, ignoring unknown identifiers.
    pub fn apply_overrides(&mut self, overrides: &HashMap<String, String>) {
        for (identifier, path) in overrides {
            self.set_path(identifier, PathBuf::from(path));
        }
    }

    /// Path of a folder, created on the fly if it is missing.
    pub fn get_path(&self, identifier: &str) -> Option<PathBuf> {
        match self.folders.get(identifier) {
            Some(path) => {
                if !path.exists() {
                    if let Err(e) = fs::create_dir_all(path) {
                        warn!("Cannot create folder {} for {}: {}", path.display(), identifier, e);
                    }
                }
                Some(path.clone())
            }
            None => {
                logging::debug(&format!("FolderManager: Folder {} unknown", identifier), false);
                None
            }
        }
    }

    /// Changes the path of a known folder. Returns `false` for unknown identifiers.
    pub fn set_path(&mut self, identifier: &str, path: PathBuf) -> bool {
        match self.folders.get_mut(identifier) {
            Some(entry) => {
                *entry = path;
                true
            }
            None => {
                logging::debug(&format!("FolderManager: Folder {} unknown", identifier), false);
                false
            }
        }
    }

    pub fn get_file(&self, identifier: &str) -> Option<PathBuf> {
        match self.files.get(identifier) {
            Some(path) => path.clone(),
            None => {
                logging::debug(&format!("FolderManager: File {} unknown", identifier), false);
                None
            }
        }
    }

    pub fn set_file(&mut self, identifier: &str, path: PathBuf) -> bool {
        match self.files.get_mut(identifier) {
            Some(entry) => {
                *entry = Some(path);
                true
            }
            None => false,
        }
    }

    /// Creates every known folder that does not exist yet.
    ///
    /// PROGRAMDATA is never created here as it would only be writable by the
    /// user who created it first; CUSTOMDEVICESOLD is no longer in use.
    pub fn create_folders(&self) -> Result<()> {
        for (identifier, path) in &self.folders {
            if identifier == "CUSTOMDEVICESOLD" || identifier == "PROGRAMDATA" {
                continue;
            }
            if !path.exists() {
                if let Err(e) = fs::create_dir_all(path) {
                    logging::error(&format!("Cannot create folder {}", path.display()), &e);
                }
            }
        }
        Ok(())
    }

    /// Remembers a folder to be added to `PATH` when no explicit one is given.
    pub fn set_temporary_folder(&mut self, path: Option<PathBuf>) {
        self.temporary_folder = path;
    }

    pub fn temporary_folder(&self) -> Option<&Path> {
        self.temporary_folder.as_deref()
    }
}

/// Path of a folder of the process-wide manager.
pub fn get_path(identifier: &str) -> Option<PathBuf> {
    FolderManager::global().read().ok()?.get_path(identifier)
}

pub fn set_path(identifier: &str, path: impl Into<PathBuf>) -> bool {
    FolderManager::global()
        .write()
        .map(|mut manager| manager.set_path(identifier, path.into()))
        .unwrap_or(false)
}

pub fn get_file(identifier: &str) -> Option<PathBuf> {
    FolderManager::global().read().ok()?.get_file(identifier)
}

pub fn set_file(identifier: &str, path: impl Into<PathBuf>) -> bool {
    FolderManager::global()
        .write()
        .map(|mut manager| manager.set_file(identifier, path.into()))
        .unwrap_or(false)
}

/// Prepends a folder and all of its subfolders to `PATH`.
///
/// Without an explicit folder the temporary folder of the process-wide
/// manager is used. Returns `false` if there is no such folder.
pub fn add_folder_to_path(folder: Option<&Path>) -> Result<bool> {
    let main_path = match folder {
        Some(path) => path.to_path_buf(),
        None => match FolderManager::global()
            .read()
            .ok()
            .and_then(|m| m.temporary_folder().map(Path::to_path_buf))
        {
            Some(path) => path,
            None => return Ok(false),
        },
    };

    if !main_path.exists() {
        return Ok(false);
    }

    let mut to_add = vec![main_path.clone()];
    for entry in WalkDir::new(&main_path).min_depth(1).into_iter().filter_entry(|e| {
        let name = e.file_name().to_string_lossy();
        !name.starts_with('.') && name != "__pycache__" && name != "target"
    }) {
        let entry = entry.map_err(|e| SweepMeError::folder(e.to_string()))?;
        if entry.file_type().is_dir() {
            to_add.push(entry.into_path());
        }
    }

    let current: Vec<PathBuf> = env::var_os("PATH")
        .map(|value| env::split_paths(&value).collect())
        .unwrap_or_default();
    let mut new_paths: Vec<PathBuf> = to_add
        .into_iter()
        .filter(|folder| !current.contains(folder))
        .collect();
    new_paths.extend(current);

    let joined: OsString =
        env::join_paths(new_paths).map_err(|e| SweepMeError::folder(e.to_string()))?;
    env::set_var("PATH", joined);
    Ok(true)
}
