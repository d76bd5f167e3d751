//! Executor for APDU command execution
//!
//! The executor frames a command, pushes it through the transport once and splits the
//! answer into a [`Response`]. It does not interpret status words.

use std::fmt;

use bytes::Bytes;
use tracing::{debug, instrument, trace};

use crate::command::ApduCommand;
use crate::response::Response;
use crate::transport::CardTransport;
use crate::Result;

/// Trait for APDU command execution
pub trait Executor: Send + fmt::Debug {
    /// Transmit raw command bytes and return the raw response
    #[instrument(level = "trace", skip(self), fields(executor = std::any::type_name::<Self>()))]
    fn transmit(&mut self, command: &[u8]) -> Result<Bytes> {
        trace!(command = %hex::encode(command), "Transmitting command");
        let response = self.do_transmit(command);
        if let Err(err) = &response {
            debug!(error = ?err, "Error during transmission");
        }
        response
    }

    /// Internal implementation of transmit
    fn do_transmit(&mut self, command: &[u8]) -> Result<Bytes>;

    /// Send a typed command and decode the answer into payload and status word
    fn send<C: ApduCommand + ?Sized>(&mut self, command: &C) -> Result<Response> {
        let raw = self.transmit(&command.to_bytes())?;
        let response = Response::from_bytes(&raw)?;
        trace!(status = %response.status(), "Command answered");
        Ok(response)
    }

    /// Whether the underlying link is still up
    fn is_connected(&self) -> bool;

    /// Reset the executor, including the transport
    fn reset(&mut self) -> Result<()>;
}

/// Card executor implementation over a single transport
#[derive(Debug)]
pub struct CardExecutor<T: CardTransport> {
    /// The transport used for communication
    transport: T,
    /// The last response received
    last_response: Option<Bytes>,
}

impl<T: CardTransport> CardExecutor<T> {
    /// Create a new card executor with the given transport
    pub const fn new(transport: T) -> Self {
        Self {
            transport,
            last_response: None,
        }
    }

    /// Get a reference to the underlying transport
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the underlying transport
    pub const fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Take ownership of the transport and return it
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Get the last response received
    pub const fn last_response(&self) -> Option<&Bytes> {
        self.last_response.as_ref()
    }
}

impl<T: CardTransport> Executor for CardExecutor<T> {
    fn do_transmit(&mut self, command: &[u8]) -> Result<Bytes> {
        let response = self.transport.transmit_raw(command)?;
        self.last_response = Some(response.clone());
        Ok(response)
    }

    fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    fn reset(&mut self) -> Result<()> {
        self.last_response = None;
        self.transport.reset()?;
        Ok(())
    }
}
