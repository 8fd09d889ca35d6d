use serde::{Deserialize, Serialize};

use super::kind::PortKind;
use crate::error::{Result, SweepMeError};

/// Keys a property override may carry.
pub const KNOWN_KEYS: &[&str] = &[
    "type",
    "active",
    "Name",
    "NrDevices",
    "debug",
    "ID",
    "VID",
    "PID",
    "RegID",
    "Manufacturer",
    "Product",
    "Description",
    "identification",
    "query",
    "Exception",
    "EOL",
    "EOLwrite",
    "EOLread",
    "timeout",
    "delay",
    "rstrip",
    "baudrate",
    "bytesize",
    "parity",
    "stopbits",
    "xonxoff",
    "rtscts",
    "dsrdtr",
    "rts",
    "dtr",
    "raw_write",
    "raw_read",
    "encoding",
    "GPIB_EOLwrite",
    "GPIB_EOLread",
    "TCPIP_EOLwrite",
    "TCPIP_EOLread",
    "resource",
];

/// Settings of a port, named the way drivers spell them in overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortProperties {
    #[serde(rename = "type")]
    pub kind: PortKind,
    pub active: bool,
    #[serde(rename = "Name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "NrDevices")]
    pub nr_devices: u32,
    pub debug: bool,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "VID", default, skip_serializing_if = "Option::is_none")]
    pub vid: Option<String>,
    #[serde(rename = "PID", default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<String>,
    #[serde(rename = "RegID", default, skip_serializing_if = "Option::is_none")]
    pub reg_id: Option<String>,
    #[serde(rename = "Manufacturer", default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(rename = "Product", default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Raise "does not respond" instead of returning an empty answer.
    #[serde(rename = "Exception")]
    pub exception: bool,
    #[serde(rename = "EOL")]
    pub eol: String,
    #[serde(rename = "EOLwrite", default, skip_serializing_if = "Option::is_none")]
    pub eol_write: Option<String>,
    #[serde(rename = "EOLread", default, skip_serializing_if = "Option::is_none")]
    pub eol_read: Option<String>,
    /// Seconds.
    pub timeout: f64,
    /// Minimum seconds between two writes.
    pub delay: f64,
    pub rstrip: bool,
    pub baudrate: u32,
    pub bytesize: u8,
    pub parity: String,
    pub stopbits: f64,
    pub xonxoff: bool,
    pub rtscts: bool,
    pub dsrdtr: bool,
    pub rts: bool,
    pub dtr: bool,
    pub raw_write: bool,
    pub raw_read: bool,
    pub encoding: String,
    #[serde(rename = "GPIB_EOLwrite", default, skip_serializing_if = "Option::is_none")]
    pub gpib_eol_write: Option<String>,
    #[serde(rename = "GPIB_EOLread", default, skip_serializing_if = "Option::is_none")]
    pub gpib_eol_read: Option<String>,
    #[serde(rename = "TCPIP_EOLwrite", default, skip_serializing_if = "Option::is_none")]
    pub tcpip_eol_write: Option<String>,
    #[serde(rename = "TCPIP_EOLread", default, skip_serializing_if = "Option::is_none")]
    pub tcpip_eol_read: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl PortProperties {
    /// Default properties of a port of `kind` opened under `id`.
    pub fn defaults(kind: PortKind, id: &str) -> Self {
        PortProperties {
            kind,
            active: true,
            name: None,
            nr_devices: 0,
            debug: false,
            id: id.to_string(),
            vid: None,
            pid: None,
            reg_id: None,
            manufacturer: None,
            product: None,
            description: None,
            identification: None,
            query: None,
            exception: true,
            eol: "\n".to_string(),
            eol_write: None,
            eol_read: None,
            timeout: 2.0,
            delay: 0.0,
            rstrip: true,
            baudrate: 9600,
            bytesize: 8,
            parity: "N".to_string(),
            stopbits: 1.0,
            xonxoff: false,
            rtscts: false,
            dsrdtr: false,
            rts: true,
            dtr: true,
            raw_write: false,
            raw_read: false,
            encoding: "latin-1".to_string(),
            gpib_eol_write: None,
            gpib_eol_read: None,
            tcpip_eol_write: None,
            tcpip_eol_read: None,
            resource: None,
        }
    }

    /// Applies `overrides` and returns the keys that were not understood.
    ///
    /// Unknown keys are skipped, known keys with a value of the wrong type
    /// fail. The port identity (`type`, `ID`) cannot be changed this way.
    pub fn apply(&mut self, overrides: &toml::Table) -> Result<Vec<String>> {
        let mut table = toml::Table::try_from(&*self)?;
        let mut unknown = Vec::new();

        for (key, value) in overrides {
            match key.as_str() {
                "type" | "ID" => continue,
                k if KNOWN_KEYS.contains(&k) => {
                    table.insert(key.clone(), value.clone());
                }
                _ => unknown.push(key.clone()),
            }
        }

        *self = table.try_into().map_err(|e: toml::de::Error| {
            SweepMeError::port(format!(
                "Invalid port properties for '{}': {}",
                self.id,
                e.message()
            ))
        })?;
        Ok(unknown)
    }

    /// Terminator appended to written messages.
    pub fn write_terminator(&self) -> &str {
        let specific = match self.kind {
            PortKind::Tcpip => self.tcpip_eol_write.as_deref(),
            PortKind::Gpib => self.gpib_eol_write.as_deref(),
            _ => None,
        };
        specific
            .or(self.eol_write.as_deref())
            .unwrap_or(&self.eol)
    }

    /// Terminator that ends an answer.
    pub fn read_terminator(&self) -> &str {
        let specific = match self.kind {
            PortKind::Tcpip => self.tcpip_eol_read.as_deref(),
            PortKind::Gpib => self.gpib_eol_read.as_deref(),
            _ => None,
        };
        specific.or(self.eol_read.as_deref()).unwrap_or(&self.eol)
    }

    pub fn timeout_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.timeout.max(0.0))
    }
}

/// Keys of `overrides` that no port understands.
pub fn unknown_keys(overrides: &toml::Table) -> Vec<String> {
    overrides
        .keys()
        .filter(|key| !KNOWN_KEYS.contains(&key.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides(src: &str) -> toml::Table {
        toml::from_str(src).unwrap()
    }

    #[test]
    fn test_defaults() {
        let props = PortProperties::defaults(PortKind::Com, "COM1");
        assert_eq!(props.eol, "\n");
        assert_eq!(props.timeout, 2.0);
        assert_eq!(props.baudrate, 9600);
        assert_eq!(props.encoding, "latin-1");
        assert!(props.rstrip);
        assert!(props.exception);
        assert_eq!(props.write_terminator(), "\n");
    }

    #[test]
    fn test_apply_known_and_unknown_keys() {
        let mut props = PortProperties::defaults(PortKind::Com, "COM1");
        let unknown = props
            .apply(&overrides(
                "baudrate = 115200\ntimeout = 5\nEOL = \"\\r\\n\"\nspeed = 3\n",
            ))
            .unwrap();

        assert_eq!(unknown, vec!["speed"]);
        assert_eq!(props.baudrate, 115200);
        assert_eq!(props.timeout, 5.0);
        assert_eq!(props.eol, "\r\n");
        assert_eq!(props.id, "COM1");
    }

    #[test]
    fn test_apply_keeps_identity() {
        let mut props = PortProperties::defaults(PortKind::Com, "COM1");
        props
            .apply(&overrides("ID = \"COM9\"\ntype = \"GPIB\"\n"))
            .unwrap();
        assert_eq!(props.id, "COM1");
        assert_eq!(props.kind, PortKind::Com);
    }

    #[test]
    fn test_apply_wrong_type_fails() {
        let mut props = PortProperties::defaults(PortKind::Com, "COM1");
        let err = props.apply(&overrides("baudrate = \"fast\"")).unwrap_err();
        assert!(err.to_string().contains("COM1"));
    }

    #[test]
    fn test_kind_specific_terminators() {
        let mut props = PortProperties::defaults(PortKind::Tcpip, "TCPIP0::h::1::SOCKET");
        props
            .apply(&overrides(
                "EOLwrite = \"\\r\"\nTCPIP_EOLwrite = \"\\r\\n\"\nGPIB_EOLread = \"x\"\n",
            ))
            .unwrap();
        assert_eq!(props.write_terminator(), "\r\n");
        assert_eq!(props.read_terminator(), "\n");

        let mut props = PortProperties::defaults(PortKind::Com, "COM1");
        props.apply(&overrides("TCPIP_EOLwrite = \"\\r\\n\"")).unwrap();
        assert_eq!(props.write_terminator(), "\n");
    }

    #[test]
    fn test_unknown_keys() {
        let table = overrides("baudrate = 1\nfoo = 2\nbar = 3\n");
        assert_eq!(unknown_keys(&table), vec!["bar", "foo"]);
    }
}
