use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SweepMeError;

/// Transport family of a port, derived from the resource name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PortKind {
    Com,
    Gpib,
    Pxi,
    Asrl,
    Usbtmc,
    Tcpip,
}

/// Resource prefixes in the order they are tried.
///
/// ASRL is absent: serial resources are always handled as COM ports.
const DISPATCH: &[(&str, PortKind)] = &[
    ("COM", PortKind::Com),
    ("GPIB", PortKind::Gpib),
    ("PXI", PortKind::Pxi),
    ("USBTMC", PortKind::Usbtmc),
    ("USB", PortKind::Usbtmc),
    ("TCPIP", PortKind::Tcpip),
];

impl PortKind {
    /// Port types that can be searched for resources and opened.
    pub fn supported() -> Vec<PortKind> {
        vec![
            PortKind::Com,
            PortKind::Gpib,
            PortKind::Pxi,
            PortKind::Usbtmc,
            PortKind::Tcpip,
        ]
    }

    /// Kind of the port a resource name refers to, by prefix.
    ///
    /// # Example
    /// ```ignore
    /// assert_eq!(PortKind::from_resource("GPIB0::1::INSTR"), Some(PortKind::Gpib));
    /// assert_eq!(PortKind::from_resource("USB0::0x0957::INSTR"), Some(PortKind::Usbtmc));
    /// assert_eq!(PortKind::from_resource("LPT1"), None);
    /// ```
    pub fn from_resource(resource: &str) -> Option<PortKind> {
        DISPATCH
            .iter()
            .find(|(prefix, _)| resource.starts_with(prefix))
            .map(|(_, kind)| *kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PortKind::Com => "COM",
            PortKind::Gpib => "GPIB",
            PortKind::Pxi => "PXI",
            PortKind::Asrl => "ASRL",
            PortKind::Usbtmc => "USBTMC",
            PortKind::Tcpip => "TCPIP",
        }
    }

    /// VISA resource query listing resources of this kind, if VISA handles it.
    pub fn visa_query(&self) -> Option<&'static str> {
        match self {
            PortKind::Com => None,
            PortKind::Gpib => Some("GPIB?*"),
            PortKind::Pxi => Some("PXI?*"),
            PortKind::Asrl => Some("ASRL?*"),
            PortKind::Usbtmc => Some("USB?*"),
            PortKind::Tcpip => Some("TCPIP?*"),
        }
    }

    /// Whether instruments on this kind of port answer `*IDN?`.
    pub fn supports_identification(&self) -> bool {
        !matches!(self, PortKind::Com | PortKind::Asrl)
    }

    /// Choices offered to the user when editing properties of this kind.
    pub fn gui_choices(&self) -> Vec<(&'static str, Vec<&'static str>)> {
        match self {
            PortKind::Com => vec![
                (
                    "baudrate",
                    vec![
                        "115200", "57600", "38400", "19200", "9600", "4800", "2400", "1800",
                        "1200", "600", "300", "200", "150", "134", "110", "75", "50",
                    ],
                ),
                ("terminator", vec![r"\n", r"\r", r"\r\n", r"\n\r"]),
                ("parity", vec!["N", "O", "E", "M", "S"]),
            ],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PortKind {
    type Err = SweepMeError;

    /// Parses a port type name; `USB` is accepted as an alias of `USBTMC`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "COM" => Ok(PortKind::Com),
            "GPIB" => Ok(PortKind::Gpib),
            "PXI" => Ok(PortKind::Pxi),
            "ASRL" => Ok(PortKind::Asrl),
            "USB" | "USBTMC" => Ok(PortKind::Usbtmc),
            "TCPIP" => Ok(PortKind::Tcpip),
            other => Err(SweepMeError::port(format!("Unknown port type '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_by_prefix() {
        assert_eq!(PortKind::from_resource("COM3"), Some(PortKind::Com));
        assert_eq!(PortKind::from_resource("GPIB0::22::INSTR"), Some(PortKind::Gpib));
        assert_eq!(
            PortKind::from_resource("GPIB::5::Prologix@COM7"),
            Some(PortKind::Gpib)
        );
        assert_eq!(PortKind::from_resource("PXI0::1::INSTR"), Some(PortKind::Pxi));
        assert_eq!(PortKind::from_resource("USBTMC0::1"), Some(PortKind::Usbtmc));
        assert_eq!(
            PortKind::from_resource("USB0::0x0957::0x1796::MY1::INSTR"),
            Some(PortKind::Usbtmc)
        );
        assert_eq!(
            PortKind::from_resource("TCPIP0::192.168.0.2::5025::SOCKET"),
            Some(PortKind::Tcpip)
        );
    }

    #[test]
    fn test_asrl_is_not_dispatched() {
        assert_eq!(PortKind::from_resource("ASRL1::INSTR"), None);
        assert!(!PortKind::supported().contains(&PortKind::Asrl));
    }

    #[test]
    fn test_from_str_aliases() {
        assert_eq!("usb".parse::<PortKind>().unwrap(), PortKind::Usbtmc);
        assert_eq!("TCPIP".parse::<PortKind>().unwrap(), PortKind::Tcpip);
        assert!("LPT".parse::<PortKind>().is_err());
    }

    #[test]
    fn test_serde_names() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            kinds: Vec<PortKind>,
        }
        let parsed: Wrapper = toml::from_str(r#"kinds = ["COM", "USBTMC"]"#).unwrap();
        assert_eq!(parsed.kinds, vec![PortKind::Com, PortKind::Usbtmc]);
    }

    #[test]
    fn test_identification_support() {
        assert!(!PortKind::Com.supports_identification());
        assert!(PortKind::Gpib.supports_identification());
        assert!(PortKind::Tcpip.supports_identification());
    }
}
