//! Section/option configuration files used by drivers.
//!
//! Files are TOML documents whose top-level tables are sections holding
//! string options. Reading and writing goes through a [`FileIo`] so that a
//! host application can route file access through its own layer.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock};

use crate::error::Result;

/// Section name -> option name -> value.
pub type Sections = BTreeMap<String, BTreeMap<String, String>>;

/// File access used by [`ConfigFile`].
pub trait FileIo: Send + Sync {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Called after a file was read completely.
    ///
    /// Lets implementations that watch for external modifications know that
    /// the latest content has been seen.
    fn set_full_read(&self, _path: &Path) {}
}

/// Plain filesystem access.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileIo;

impl FileIo for StdFileIo {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        fs::write(path, contents)
    }
}

fn custom_default() -> &'static RwLock<Option<Arc<dyn FileIo>>> {
    static CUSTOM: OnceLock<RwLock<Option<Arc<dyn FileIo>>>> = OnceLock::new();
    CUSTOM.get_or_init(|| RwLock::new(None))
}

/// Registers the file access used by config files created afterwards.
pub fn register_default_file_io(file_io: Arc<dyn FileIo>) {
    if let Ok(mut slot) = custom_default().write() {
        *slot = Some(file_io);
    }
}

/// Falls back to plain filesystem access for new config files.
pub fn clear_default_file_io() {
    if let Ok(mut slot) = custom_default().write() {
        *slot = None;
    }
}

/// File access for new config files: the registered one, or [`StdFileIo`].
pub fn default_file_io() -> Arc<dyn FileIo> {
    custom_default()
        .read()
        .ok()
        .and_then(|slot| slot.clone())
        .unwrap_or_else(|| Arc::new(StdFileIo))
}

/// A configuration file with sections of string options.
pub struct ConfigFile {
    file_name: PathBuf,
    file_io: Arc<dyn FileIo>,
    sections: Sections,
}

impl ConfigFile {
    /// Config file using the current default file access.
    pub fn new(file_name: impl Into<PathBuf>) -> Self {
        Self::with_file_io(file_name, default_file_io())
    }

    pub fn with_file_io(file_name: impl Into<PathBuf>, file_io: Arc<dyn FileIo>) -> Self {
        ConfigFile {
            file_name: file_name.into(),
            file_io,
            sections: Sections::new(),
        }
    }

    pub fn file_name(&self) -> &Path {
        &self.file_name
    }

    pub fn set_file_name(&mut self, file_name: impl Into<PathBuf>) {
        self.file_name = file_name.into();
    }

    pub fn file_io(&self) -> &Arc<dyn FileIo> {
        &self.file_io
    }

    pub fn is_file(&self) -> bool {
        self.file_name.is_file()
    }

    /// Reads the file into memory.
    ///
    /// When the file name does not point to a file, it is parsed as the
    /// content itself. Options read are merged over the ones in memory.
    pub fn load_file(&mut self) -> Result<()> {
        let content = if self.is_file() {
            let content = self.file_io.read_to_string(&self.file_name)?;
            self.file_io.set_full_read(&self.file_name);
            content
        } else {
            self.file_name.to_string_lossy().into_owned()
        };

        let table: toml::Table = toml::from_str(&content)?;
        for (section, value) in table {
            let options = self.sections.entry(section).or_default();
            if let toml::Value::Table(entries) = value {
                for (key, value) in entries {
                    options.insert(key, value_to_string(&value));
                }
            }
        }
        Ok(())
    }

    /// Writes the in-memory sections to a new file.
    ///
    /// Returns `false` if the file already exists.
    pub fn create_file(&self) -> Result<bool> {
        if self.is_file() {
            return Ok(false);
        }
        if let Some(parent) = self.file_name.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        self.write_file()?;
        Ok(true)
    }

    fn write_file(&self) -> Result<()> {
        let content = toml::to_string(&self.sections)?;
        self.file_io.write(&self.file_name, &content)?;
        Ok(())
    }

    pub fn set_section(&mut self, section: &str) -> Result<()> {
        self.load_file()?;
        self.sections.entry(section.to_string()).or_default();
        self.write_file()
    }

    pub fn set_option(&mut self, section: &str, option: &str, value: &str) -> Result<()> {
        self.set_section(section)?;
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(option.to_string(), value.to_string());
        self.write_file()
    }

    /// Removes an option; returns whether it existed.
    pub fn remove_option(&mut self, section: &str, option: &str) -> Result<bool> {
        self.load_file()?;
        let removed = self
            .sections
            .get_mut(section)
            .map(|options| options.remove(option).is_some())
            .unwrap_or(false);
        if removed {
            self.write_file()?;
        }
        Ok(removed)
    }

    pub fn get_sections(&mut self) -> Vec<String> {
        if self.load_file().is_err() {
            return Vec::new();
        }
        self.sections.keys().cloned().collect()
    }

    /// Looks up an option, trying its lowercase spelling first.
    pub fn get_value(&mut self, section: &str, option: &str) -> Option<String> {
        self.load_file().ok()?;
        let options = self.sections.get(section)?;
        options
            .get(&option.to_lowercase())
            .or_else(|| options.get(option))
            .cloned()
    }

    pub fn get_options(&mut self, section: &str) -> BTreeMap<String, String> {
        if self.load_file().is_err() {
            return BTreeMap::new();
        }
        self.sections.get(section).cloned().unwrap_or_default()
    }

    pub fn get_values(&mut self) -> Sections {
        if self.load_file().is_err() {
            return Sections::new();
        }
        self.sections.clone()
    }
}

fn value_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct MemoryFileIo {
        written: Mutex<Vec<(PathBuf, String)>>,
    }

    impl FileIo for MemoryFileIo {
        fn read_to_string(&self, _path: &Path) -> io::Result<String> {
            Ok(String::new())
        }

        fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
            self.written
                .lock()
                .unwrap()
                .push((path.to_path_buf(), contents.to_string()));
            Ok(())
        }
    }

    #[test]
    fn test_set_and_get_option() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Driver.toml");

        let mut config = ConfigFile::with_file_io(&path, Arc::new(StdFileIo));
        config.create_file().unwrap();
        config.set_option("Calibration", "offset", "0.25").unwrap();

        let mut reread = ConfigFile::with_file_io(&path, Arc::new(StdFileIo));
        assert_eq!(reread.get_sections(), vec!["Calibration"]);
        assert_eq!(
            reread.get_value("Calibration", "offset"),
            Some("0.25".to_string())
        );
        assert_eq!(reread.get_value("Calibration", "missing"), None);
    }

    #[test]
    fn test_lowercase_lookup_first() {
        let mut config = ConfigFile::with_file_io(
            "[Main]\nport = \"lower\"\nPort = \"upper\"\nBaud = \"9600\"\n",
            Arc::new(StdFileIo),
        );
        assert_eq!(config.get_value("Main", "Port"), Some("lower".to_string()));
        assert_eq!(config.get_value("Main", "Baud"), Some("9600".to_string()));
    }

    #[test]
    fn test_inline_content_non_string_values() {
        let mut config =
            ConfigFile::with_file_io("[Limits]\nmax = 10\nenabled = true\n", Arc::new(StdFileIo));
        let options = config.get_options("Limits");
        assert_eq!(options.get("max"), Some(&"10".to_string()));
        assert_eq!(options.get("enabled"), Some(&"true".to_string()));
    }

    #[test]
    fn test_remove_option() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub").join("Driver.toml");

        let mut config = ConfigFile::with_file_io(&path, Arc::new(StdFileIo));
        assert!(config.create_file().unwrap());
        assert!(!config.create_file().unwrap());
        config.set_option("A", "x", "1").unwrap();
        config.set_option("A", "y", "2").unwrap();

        assert!(config.remove_option("A", "x").unwrap());
        assert!(!config.remove_option("A", "x").unwrap());
        assert!(!config.remove_option("B", "x").unwrap());

        let mut reread = ConfigFile::with_file_io(&path, Arc::new(StdFileIo));
        let values = reread.get_values();
        assert_eq!(values["A"].len(), 1);
        assert_eq!(values["A"]["y"], "2");
    }

    #[test]
    fn test_invalid_inline_content_gives_empty_results() {
        let mut config = ConfigFile::with_file_io("not = = toml", Arc::new(StdFileIo));
        assert!(config.get_sections().is_empty());
        assert!(config.get_values().is_empty());
    }

    #[test]
    #[serial]
    fn test_registered_default_file_io() {
        let memory = Arc::new(MemoryFileIo::default());
        register_default_file_io(memory.clone());

        let config = ConfigFile::new("/nonexistent/sweepme/memory.toml");
        assert!(Arc::ptr_eq(
            &(config.file_io().clone()),
            &(memory.clone() as Arc<dyn FileIo>)
        ));

        clear_default_file_io();
        let config = ConfigFile::new("other.toml");
        assert!(!Arc::ptr_eq(
            &(config.file_io().clone()),
            &(memory as Arc<dyn FileIo>)
        ));
    }
}
