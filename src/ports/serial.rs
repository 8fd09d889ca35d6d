use std::io::{self, Write};
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::debug;

use super::properties::PortProperties;
use super::transport::{read_stream, ReadOutcome, ReadRequest, TimedRead, Transport};
use crate::error::{Result, SweepMeError};

/// Serial port transport used by COM ports and Prologix controllers.
#[derive(Default)]
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    timeout: Option<Duration>,
}

impl SerialTransport {
    pub fn new() -> Self {
        SerialTransport::default()
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| SweepMeError::port("Serial port is not open"))
    }
}

impl TimedRead for dyn SerialPort {
    fn set_read_limit(&mut self, limit: Duration) -> io::Result<()> {
        Ok(self.set_timeout(limit)?)
    }
}

/// Serial port names available on this machine.
pub fn available_ports() -> Result<Vec<String>> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|info| info.port_name)
        .collect())
}

fn data_bits(bytesize: u8) -> Result<DataBits> {
    match bytesize {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        other => Err(SweepMeError::port(format!("Unsupported bytesize {}", other))),
    }
}

fn parity(parity: &str) -> Result<Parity> {
    match parity {
        "N" => Ok(Parity::None),
        "O" => Ok(Parity::Odd),
        "E" => Ok(Parity::Even),
        other => Err(SweepMeError::port(format!(
            "Parity '{}' is not supported by the serial backend",
            other
        ))),
    }
}

fn stop_bits(stopbits: f64) -> Result<StopBits> {
    if (stopbits - 1.0).abs() < f64::EPSILON {
        Ok(StopBits::One)
    } else if (stopbits - 2.0).abs() < f64::EPSILON {
        Ok(StopBits::Two)
    } else {
        Err(SweepMeError::port(format!(
            "Stopbits {} are not supported by the serial backend",
            stopbits
        )))
    }
}

fn flow_control(properties: &PortProperties) -> FlowControl {
    if properties.rtscts {
        FlowControl::Hardware
    } else if properties.xonxoff {
        FlowControl::Software
    } else {
        FlowControl::None
    }
}

impl Transport for SerialTransport {
    fn open(&mut self, properties: &PortProperties) -> Result<()> {
        self.port = None;

        if properties.dsrdtr {
            debug!(port = %properties.id, "DSR/DTR flow control is not supported, ignored");
        }

        let mut port = serialport::new(properties.id.as_str(), properties.baudrate)
            .timeout(properties.timeout_duration())
            .data_bits(data_bits(properties.bytesize)?)
            .parity(parity(&properties.parity)?)
            .stop_bits(stop_bits(properties.stopbits)?)
            .flow_control(flow_control(properties))
            .open()?;

        if !properties.rtscts {
            port.write_request_to_send(properties.rts)?;
        }
        if !properties.dsrdtr {
            port.write_data_terminal_ready(properties.dtr)?;
        }
        port.clear(ClearBuffer::All)?;

        let timeout = properties.timeout_duration();
        self.timeout = Some(timeout).filter(|timeout| !timeout.is_zero());
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.port = None;
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        if let Some(port) = self.port.as_mut() {
            port.clear(ClearBuffer::All)?;
        }
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port()?;
        port.write_all(data)?;
        port.flush()?;
        Ok(())
    }

    fn read(&mut self, request: ReadRequest<'_>) -> Result<ReadOutcome> {
        let timeout = self.timeout;
        let port = self.port()?;
        Ok(read_stream(port.as_mut(), request, timeout)?)
    }

    fn in_waiting(&mut self) -> Result<usize> {
        Ok(self.port()?.bytes_to_read()? as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PortKind;

    #[test]
    fn test_setting_conversions() {
        assert_eq!(data_bits(7).unwrap(), DataBits::Seven);
        assert!(data_bits(9).is_err());
        assert_eq!(parity("E").unwrap(), Parity::Even);
        assert!(parity("M").unwrap_err().to_string().contains("'M'"));
        assert_eq!(stop_bits(2.0).unwrap(), StopBits::Two);
        assert!(stop_bits(1.5).is_err());
    }

    #[test]
    fn test_flow_control() {
        let mut props = PortProperties::defaults(PortKind::Com, "COM1");
        assert_eq!(flow_control(&props), FlowControl::None);
        props.xonxoff = true;
        assert_eq!(flow_control(&props), FlowControl::Software);
        props.rtscts = true;
        assert_eq!(flow_control(&props), FlowControl::Hardware);
    }

    #[test]
    fn test_write_on_closed_port_fails() {
        let mut transport = SerialTransport::new();
        assert!(!transport.is_open());
        assert!(transport.write(b"x").is_err());
        transport.clear().unwrap();
    }
}
