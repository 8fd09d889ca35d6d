//! Communication ports to instruments.
//!
//! A resource name such as `COM3`, `GPIB0::22::INSTR` or
//! `TCPIP0::192.168.0.2::5025::SOCKET` selects the [`PortKind`] and with it
//! the [`Transport`] the [`Port`] talks through:
//!
//! - [serial::SerialTransport]: COM ports, via the `serialport` crate
//! - [tcpip::TcpTransport]: raw TCP sockets
//! - [prologix::PrologixTransport]: GPIB instruments behind a Prologix controller
//! - [visa::VisaTransport]: everything else, through a registered VISA backend
//! - [mock::MockTransport]: in-memory transport for tests
//!
//! Drivers normally get their ports from a [`PortManager`], which shares one
//! port between all drivers using the same resource.

pub mod kind;
pub mod manager;
pub mod mock;
pub mod port;
pub mod prologix;
pub mod properties;
pub mod serial;
pub mod tcpip;
pub mod transport;
pub mod visa;

pub use kind::PortKind;
pub use manager::{lock_port, PortManager, SharedPort};
pub use port::{Encoding, Port};
pub use properties::PortProperties;
pub use transport::{ReadOutcome, ReadRequest, Transport};

use crate::error::Result;
use tracing::warn;

/// Opens a standalone port for `resource`, not shared through a manager.
///
/// The port starts from the defaults of its kind with `properties` applied.
pub fn get_port(resource: &str, properties: &toml::Table) -> Result<Port> {
    let mut port = Port::new(resource)?;
    for key in port.update_properties(properties)? {
        warn!(
            "{}",
            crate::warning::Warning::UnknownProperty {
                key,
                resource: resource.to_string(),
            }
        );
    }
    if !port.is_open() {
        port.open()?;
    }
    Ok(port)
}

/// Closes `port` if it is open.
pub fn close_port(port: &mut Port) -> Result<()> {
    if port.is_open() {
        port.close()?;
    }
    Ok(())
}
