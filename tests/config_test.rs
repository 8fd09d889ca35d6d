// tests/config_test.rs
use std::io::Write;
use sweepme::config::{load_config, Config};
use sweepme::release::MergeCheckOptions;
use tempfile::NamedTempFile;

#[test]
fn test_load_default_config() {
    let config = Config::default();
    assert_eq!(config.release.branches, vec!["main", "1.5.6", "v1.5.5.x"]);
    assert_eq!(config.release.tag_pattern, "v{version}");
    assert!(config.prologix.controllers.is_empty());
    assert!(config.ports.is_empty());
}

#[test]
fn test_load_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();
    let toml_content = r#"
[prologix]
controllers = ["COM5"]

[folders]
CUSTOMFILES = "/opt/sweepme/custom"

[ports."GPIB0::22::INSTR"]
timeout = 5.0
GPIB_EOLread = "\r\n"

[release]
branches = ["main", "v2.0.x", "v1.9.x"]
remote = "upstream"
"#;
    temp_file.write_all(toml_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = load_config(Some(temp_file.path().to_str().unwrap())).unwrap();
    assert_eq!(config.prologix.controllers, vec!["COM5"]);
    assert_eq!(
        config.folders.get("CUSTOMFILES").map(String::as_str),
        Some("/opt/sweepme/custom")
    );

    let overrides = config.port_overrides("GPIB0::22::INSTR");
    assert_eq!(overrides["timeout"].as_float(), Some(5.0));
    assert!(config.port_overrides("COM1").is_empty());

    assert_eq!(config.release.remote, "upstream");
    assert_eq!(config.release.tag_pattern, "v{version}");

    let options = MergeCheckOptions::from(&config.release);
    assert_eq!(options.remote, "upstream");
    assert_eq!(options.release_branches, vec!["main", "v2.0.x", "v1.9.x"]);
    assert!(options.fetch);
}

#[test]
fn test_invalid_config_is_an_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[release]\nbranches = \"main\"\n").unwrap();
    temp_file.flush().unwrap();

    let err = load_config(Some(temp_file.path().to_str().unwrap())).unwrap_err();
    assert!(err.to_string().starts_with("Configuration error"));
}

#[test]
fn test_missing_explicit_config_is_an_error() {
    let err = load_config(Some("/nonexistent/sweepme.toml")).unwrap_err();
    assert!(err.to_string().contains("I/O error"));
}
