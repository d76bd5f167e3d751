//! Scripted transport for tests

use bytes::Bytes;

use super::{CardTransport, TransportError};

/// Transport that replays queued responses and records every command it was given
#[derive(Debug, Clone)]
pub struct MockTransport {
    /// Mock responses to return
    pub responses: Vec<Result<Bytes, TransportError>>,
    /// Commands that were sent
    pub commands: Vec<Bytes>,
    /// Whether the transport is connected
    pub connected: bool,
}

impl MockTransport {
    /// Create a new mock transport with the given responses
    pub fn new(responses: Vec<Bytes>) -> Self {
        Self {
            responses: responses.into_iter().map(Ok).collect(),
            commands: Vec::new(),
            connected: true,
        }
    }

    /// Create a new mock transport that always returns the given response
    pub fn with_response(response: Bytes) -> Self {
        Self::new(vec![response])
    }

    /// Create a new mock transport that always returns success (90 00)
    pub fn with_success() -> Self {
        Self::with_response(Bytes::from_static(&[0x90, 0x00]))
    }

    /// Queue a response
    pub fn push_response(&mut self, response: impl Into<Bytes>) -> &mut Self {
        self.responses.push(Ok(response.into()));
        self
    }

    /// Queue a transport failure
    pub fn push_error(&mut self, error: TransportError) -> &mut Self {
        self.responses.push(Err(error));
        self
    }
}

impl CardTransport for MockTransport {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        if !self.connected {
            return Err(TransportError::Connection);
        }

        self.commands.push(Bytes::copy_from_slice(command));

        // Either clone the single response or take the next one
        match self.responses.len() {
            0 => Err(TransportError::Transmission),
            1 => self.responses[0].clone(),
            _ => self.responses.remove(0),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        self.connected = true;
        self.commands.clear();
        Ok(())
    }
}
