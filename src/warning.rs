use std::fmt;

/// Non-fatal issues met while setting up ports and running release checks.
/// They are reported to the user, the operation goes on.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// A property override no port understands
    UnknownProperty { key: String, resource: String },
    /// GPIB terminator a Prologix controller cannot be set to
    UnsupportedTerminator { terminator: String, resource: String },
    /// Fetching a branch failed, local refs are used instead
    FetchFailed { remote: String, reason: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::UnknownProperty { key, resource } => {
                write!(
                    f,
                    "Port property '{}' requested for '{}' is unknown and ignored",
                    key, resource
                )
            }
            Warning::UnsupportedTerminator {
                terminator,
                resource,
            } => {
                write!(
                    f,
                    "Terminator {:?} cannot be set for Prologix adapter at {}. Fallback to CR/LF.",
                    terminator, resource
                )
            }
            Warning::FetchFailed { remote, reason } => {
                write!(
                    f,
                    "Fetching from remote '{}' failed, using local refs: {}",
                    remote, reason
                )
            }
        }
    }
}
