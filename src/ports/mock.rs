//! In-memory transport for testing without hardware.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::properties::PortProperties;
use super::transport::{ReadOutcome, ReadRequest, Transport};
use crate::error::{Result, SweepMeError};

#[derive(Debug, Default)]
struct MockState {
    open: bool,
    opened: usize,
    cleared: usize,
    input: VecDeque<u8>,
    written: Vec<Vec<u8>>,
    /// Canned answers keyed by the exact bytes written.
    replies: Vec<(Vec<u8>, Vec<u8>)>,
    echo: bool,
    fail_open: Option<String>,
    frames_messages: bool,
}

/// Transport backed by memory.
///
/// Clones share state, so a test can keep one clone for inspection while a
/// port owns another.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Writes are fed back as input.
    pub fn with_echo(self) -> Self {
        self.state().echo = true;
        self
    }

    /// Marks the transport as one that terminates messages itself.
    pub fn with_message_framing(self) -> Self {
        self.state().frames_messages = true;
        self
    }

    /// Opening fails with `message`.
    pub fn failing_open(self, message: &str) -> Self {
        self.state().fail_open = Some(message.to_string());
        self
    }

    /// Queues bytes to be read.
    pub fn push_input(&self, data: &[u8]) {
        self.state().input.extend(data.iter().copied());
    }

    /// Queues `answer` whenever exactly `request` is written.
    pub fn reply(&self, request: &[u8], answer: &[u8]) {
        self.state()
            .replies
            .push((request.to_vec(), answer.to_vec()));
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state().written.clone()
    }

    /// Everything written, as text.
    pub fn written_text(&self) -> Vec<String> {
        self.state()
            .written
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }

    pub fn is_open(&self) -> bool {
        self.state().open
    }

    pub fn open_count(&self) -> usize {
        self.state().opened
    }

    pub fn clear_count(&self) -> usize {
        self.state().cleared
    }
}

impl Transport for MockTransport {
    fn open(&mut self, _properties: &PortProperties) -> Result<()> {
        let mut state = self.state();
        if let Some(message) = &state.fail_open {
            return Err(SweepMeError::port(message.clone()));
        }
        state.open = true;
        state.opened += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state().open = false;
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        let mut state = self.state();
        state.input.clear();
        state.cleared += 1;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.state();
        if !state.open {
            return Err(SweepMeError::port("Mock transport is not open"));
        }
        state.written.push(data.to_vec());
        if state.echo {
            state.input.extend(data.iter().copied());
        }
        let reply = state
            .replies
            .iter()
            .find(|(request, _)| request.as_slice() == data)
            .map(|(_, answer)| answer.clone());
        if let Some(answer) = reply {
            state.input.extend(answer);
        }
        Ok(())
    }

    fn read(&mut self, request: ReadRequest<'_>) -> Result<ReadOutcome> {
        let mut state = self.state();
        if !state.open {
            return Err(SweepMeError::port("Mock transport is not open"));
        }

        let mut data = Vec::new();
        while let Some(byte) = state.input.pop_front() {
            data.push(byte);
            match request {
                ReadRequest::Exact(count) if data.len() == count => {
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
        }

        let complete = matches!(request, ReadRequest::Exact(0));
        Ok(ReadOutcome { data, complete })
    }

    fn in_waiting(&mut self) -> Result<usize> {
        Ok(self.state().input.len())
    }

    fn frames_messages(&self) -> bool {
        self.state().frames_messages
    }
}
