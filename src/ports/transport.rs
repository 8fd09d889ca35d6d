use std::io::{self, Read};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use super::properties::PortProperties;
use crate::error::Result;

/// How much to read from a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadRequest<'a> {
    /// Read until the terminator arrives; it is not part of the answer.
    Until(&'a [u8]),
    /// Read exactly this many bytes.
    Exact(usize),
}

/// Bytes returned by a transport and whether the read completed before the
/// timeout elapsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOutcome {
    pub data: Vec<u8>,
    pub complete: bool,
}

/// Byte pipe a [`Port`](super::Port) talks through.
pub trait Transport: Send {
    /// Applies `properties` and opens the connection. Opening an open
    /// transport reconfigures it.
    fn open(&mut self, properties: &PortProperties) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    /// Discards pending input and output.
    fn clear(&mut self) -> Result<()>;

    fn write(&mut self, data: &[u8]) -> Result<()>;

    fn read(&mut self, request: ReadRequest<'_>) -> Result<ReadOutcome>;

    /// Bytes waiting to be read.
    fn in_waiting(&mut self) -> Result<usize> {
        Ok(0)
    }

    /// Transports that frame messages themselves get no terminator appended.
    fn frames_messages(&self) -> bool {
        false
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

/// Stream whose blocking reads can be limited in time.
pub(crate) trait TimedRead: Read {
    /// Longest time the next read may block. `limit` is never zero.
    fn set_read_limit(&mut self, limit: Duration) -> io::Result<()>;
}

impl TimedRead for TcpStream {
    fn set_read_limit(&mut self, limit: Duration) -> io::Result<()> {
        self.set_read_timeout(Some(limit))
    }
}

/// Reads from a stream one byte at a time.
///
/// `timeout` bounds the whole read: once it has passed, the bytes read so far
/// are returned as an incomplete outcome. Without a timeout the stream's own
/// read behaviour applies.
pub(crate) fn read_stream<R: TimedRead + ?Sized>(
    stream: &mut R,
    request: ReadRequest<'_>,
    timeout: Option<Duration>,
) -> io::Result<ReadOutcome> {
    let deadline = timeout.map(|timeout| Instant::now() + timeout);
    let mut data = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        match request {
            ReadRequest::Exact(count) if data.len() >= count => {
                return Ok(ReadOutcome {
                    data,
                    complete: true,
                })
            }
            ReadRequest::Until(terminator)
                if !terminator.is_empty() && data.ends_with(terminator) =>
            {
                data.truncate(data.len() - terminator.len());
                return Ok(ReadOutcome {
                    data,
                    complete: true,
                });
            }
            _ => {}
        }

        if let Some(deadline) = deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            stream.set_read_limit(remaining)?;
        }

        match stream.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => data.push(byte[0]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_timeout(&e) => break,
            Err(e) => return Err(e),
        }
    }

    Ok(ReadOutcome {
        data,
        complete: false,
    })
}
