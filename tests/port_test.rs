// tests/port_test.rs
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serial_test::serial;
use sweepme::config::Config;
use sweepme::ports::visa::{self, VisaBackend, VisaOptions};
use sweepme::ports::{self, lock_port, PortKind, PortManager, PortProperties, Transport};

/// Instrument answering `*IDN?` and echoing other lines in upper case.
/// Lines starting with `SILENT` get no answer.
fn spawn_instrument() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            thread::spawn(move || {
                let mut writer = stream.try_clone().unwrap();
                for line in BufReader::new(stream).lines() {
                    let Ok(line) = line else { break };
                    let answer = if line == "*IDN?" {
                        "Sweep,Echo,0,1.0".to_string()
                    } else if line.starts_with("SILENT") {
                        continue;
                    } else {
                        line.to_uppercase()
                    };
                    if writer.write_all(format!("{}  \n", answer).as_bytes()).is_err() {
                        break;
                    }
                }
            });
        }
    });

    format!("TCPIP0::127.0.0.1::{}::SOCKET", port)
}

#[test]
fn test_socket_port_query() {
    let resource = spawn_instrument();
    let mut port = ports::get_port(&resource, &toml::Table::new()).unwrap();
    assert!(port.is_open());
    assert_eq!(port.kind(), PortKind::Tcpip);

    assert_eq!(port.get_identification().unwrap(), "Sweep,Echo,0,1.0");
    assert_eq!(port.query("volt?").unwrap(), "VOLT?");

    ports::close_port(&mut port).unwrap();
    assert!(!port.is_open());
}

#[test]
fn test_socket_port_without_rstrip() {
    let resource = spawn_instrument();
    let overrides: toml::Table = toml::from_str("rstrip = false").unwrap();
    let mut port = ports::get_port(&resource, &overrides).unwrap();

    assert_eq!(port.query("abc").unwrap(), "ABC  ");
}

#[test]
fn test_silent_instrument_closes_port() {
    let resource = spawn_instrument();
    let overrides: toml::Table = toml::from_str("timeout = 0.2").unwrap();
    let mut port = ports::get_port(&resource, &overrides).unwrap();

    port.write("SILENT").unwrap();
    let err = port.read(0).unwrap_err();
    assert!(err.to_string().contains("does not respond"));
    assert!(!port.is_open());
}

#[test]
fn test_silent_instrument_without_exception() {
    let resource = spawn_instrument();
    let overrides: toml::Table = toml::from_str("timeout = 0.2\nException = false").unwrap();
    let mut port = ports::get_port(&resource, &overrides).unwrap();

    port.write("SILENT").unwrap();
    assert_eq!(port.read(0).unwrap(), "");
    assert!(port.is_open());
}

/// Instrument that keeps sending `x` every 30 ms and never a terminator.
fn spawn_trickling_instrument() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            for _ in 0..100 {
                if stream.write_all(b"x").is_err() {
                    break;
                }
                thread::sleep(Duration::from_millis(30));
            }
        }
    });

    format!("TCPIP0::127.0.0.1::{}::SOCKET", port)
}

#[test]
fn test_timeout_bounds_trickling_answer() {
    let resource = spawn_trickling_instrument();
    let overrides: toml::Table = toml::from_str("timeout = 0.2").unwrap();
    let mut port = ports::get_port(&resource, &overrides).unwrap();

    let started = Instant::now();
    let answer = port.read(0).unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!answer.is_empty());
    assert!(answer.chars().all(|c| c == 'x'));
    assert!(port.is_open());
}

#[test]
fn test_manager_shares_ports() {
    let resource = spawn_instrument();
    let mut manager = PortManager::new(Config::default());

    let first = manager.get_port(&resource, &toml::Table::new()).unwrap();
    let second = manager.get_port(&resource, &toml::Table::new()).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    assert_eq!(lock_port(&first).query("ping").unwrap(), "PING");

    manager.close_port(&resource).unwrap();
    assert!(!lock_port(&second).is_open());

    assert!(manager.remove_port(&resource).unwrap());
    assert!(!manager.remove_port(&resource).unwrap());
}

#[test]
fn test_manager_applies_configured_overrides() {
    let resource = spawn_instrument();
    let mut config = Config::default();
    config
        .ports
        .insert(resource.clone(), toml::from_str("timeout = 0.5").unwrap());
    let mut manager = PortManager::new(config);

    let driver_properties: toml::Table = toml::from_str("timeout = 9.0\ndelay = 0.01").unwrap();
    let port = manager.get_port(&resource, &driver_properties).unwrap();
    let port = lock_port(&port);
    assert_eq!(port.properties().timeout, 0.5);
    assert_eq!(port.properties().delay, 0.01);
}

#[test]
fn test_manager_identification_closes_port() {
    let resource = spawn_instrument();
    let mut manager = PortManager::new(Config::default());

    assert_eq!(
        manager.get_identification(&resource).unwrap(),
        "Sweep,Echo,0,1.0"
    );
    let port = manager.port(&resource).unwrap();
    assert!(!lock_port(&port).is_open());
}

/// VISA runtime that knows one instrument and answers with canned text.
struct FakeVisa;

impl VisaBackend for FakeVisa {
    fn list_resources(&self, query: &str) -> sweepme::Result<Vec<String>> {
        let all = ["GPIB0::22::INSTR", "GPIB0::INTFC", "USB0::0x0957::0x1796::MY1::INSTR"];
        let prefix = query.trim_end_matches("?*");
        Ok(all
            .iter()
            .filter(|r| r.starts_with(prefix))
            .map(|r| r.to_string())
            .collect())
    }

    fn open_resource(
        &self,
        resource: &str,
        _options: &VisaOptions,
    ) -> sweepme::Result<Box<dyn Transport>> {
        let mock = ports::mock::MockTransport::new().with_message_framing();
        mock.reply(b"*IDN?", b"Fake,Meter,1,2\n");
        let mut session: Box<dyn Transport> = Box::new(mock);
        session.open(&PortProperties::defaults(PortKind::Gpib, resource))?;
        Ok(session)
    }
}

#[test]
#[serial]
fn test_visa_backend() {
    visa::clear_backend();
    let err = ports::get_port("GPIB0::22::INSTR", &toml::Table::new()).unwrap_err();
    assert!(err.to_string().contains("no VISA runtime available"));

    visa::register_backend(Arc::new(FakeVisa));
    let manager = PortManager::new(Config::default());
    let found = manager.find_resources(&[PortKind::Gpib, PortKind::Usbtmc]);
    assert!(found[&PortKind::Gpib].contains(&"GPIB0::22::INSTR".to_string()));
    assert!(!found[&PortKind::Gpib].iter().any(|r| r.contains("INTFC")));
    assert_eq!(found[&PortKind::Usbtmc].len(), 1);

    let mut port = ports::get_port("GPIB0::22::INSTR", &toml::Table::new()).unwrap();
    assert_eq!(port.get_identification().unwrap(), "Fake,Meter,1,2");

    visa::clear_backend();
}
