use std::io::Write;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::properties::PortProperties;
use super::transport::{read_stream, ReadOutcome, ReadRequest, Transport};
use crate::error::{Result, SweepMeError};

/// Whether a TCPIP resource is a raw socket rather than a VISA instrument.
pub fn is_socket_resource(resource: &str) -> bool {
    resource.ends_with("::SOCKET")
}

/// Host and port of a `TCPIP[board]::host::port::SOCKET` resource.
pub fn socket_address(resource: &str) -> Result<(String, u16)> {
    let parts: Vec<&str> = resource.split("::").collect();
    match parts.as_slice() {
        [prefix, host, port, "SOCKET"] if prefix.starts_with("TCPIP") => {
            let port = port.parse::<u16>().map_err(|_| {
                SweepMeError::port(format!("Invalid socket port in resource '{}'", resource))
            })?;
            Ok((host.to_string(), port))
        }
        _ => Err(SweepMeError::port(format!(
            "'{}' is not a TCPIP socket resource",
            resource
        ))),
    }
}

/// Raw TCP socket transport.
#[derive(Debug, Default)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    timeout: Option<Duration>,
}

impl TcpTransport {
    pub fn new() -> Self {
        TcpTransport::default()
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| SweepMeError::port("Socket is not connected"))
    }
}

impl Transport for TcpTransport {
    fn open(&mut self, properties: &PortProperties) -> Result<()> {
        self.stream = None;

        let (host, port) = socket_address(&properties.id)?;
        let timeout = properties.timeout_duration();
        let address = (host.as_str(), port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| SweepMeError::port(format!("Cannot resolve host '{}'", host)))?;

        let stream = if timeout.is_zero() {
            TcpStream::connect(address)?
        } else {
            TcpStream::connect_timeout(&address, timeout)?
        };
        if !timeout.is_zero() {
            stream.set_read_timeout(Some(timeout))?;
            stream.set_write_timeout(Some(timeout))?;
        }
        self.timeout = Some(timeout).filter(|timeout| !timeout.is_zero());
        stream.set_nodelay(true)?;

        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            // the peer may already be gone
            let _ = stream.shutdown(Shutdown::Both);
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream()?;
        stream.write_all(data)?;
        stream.flush()?;
        Ok(())
    }

    fn read(&mut self, request: ReadRequest<'_>) -> Result<ReadOutcome> {
        let timeout = self.timeout;
        let stream = self.stream()?;
        Ok(read_stream(stream, request, timeout)?)
    }
}
