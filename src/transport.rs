//! The channel towards the compositor
//!
//! The session never encodes anything itself, it hands typed [`Request`]s to a [`Transport`].
//! Requests for a given object are handed over in the order the application issued them, and
//! a failure is reported back to the caller of the operation that triggered the send. There is
//! no retry at this level.

use std::io;

use thiserror::Error;

use crate::protocol::{ObjectId, Request};

/// Failure of the underlying channel
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection to the compositor is gone
    #[error("the connection to the compositor has been lost")]
    Disconnected,
    /// The channel failed with an io error
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Outbound half of the compositor connection
pub trait Transport {
    /// Queue `request` for the object `object`
    fn send_request(&mut self, object: ObjectId, request: Request) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send_request(&mut self, object: ObjectId, request: Request) -> Result<(), TransportError> {
        (**self).send_request(object, request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send_request(&mut self, object: ObjectId, request: Request) -> Result<(), TransportError> {
        (**self).send_request(object, request)
    }
}

/// A [`Transport`] keeping every request in memory
///
/// Useful to test code driving an [`XdgShellSession`](crate::shell::xdg::XdgShellSession)
/// without a compositor.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Vec<(ObjectId, Request)>,
    disconnected: bool,
}

impl RecordingTransport {
    /// Create an empty, connected transport
    pub fn new() -> RecordingTransport {
        RecordingTransport::default()
    }

    /// All requests sent so far, in order
    pub fn sent(&self) -> &[(ObjectId, Request)] {
        &self.sent
    }

    /// The last request sent, if any
    pub fn last(&self) -> Option<&(ObjectId, Request)> {
        self.sent.last()
    }

    /// Forget all recorded requests
    pub fn clear(&mut self) {
        self.sent.clear();
    }

    /// Make every following send fail (or succeed again)
    pub fn set_disconnected(&mut self, disconnected: bool) {
        self.disconnected = disconnected;
    }
}

impl Transport for RecordingTransport {
    fn send_request(&mut self, object: ObjectId, request: Request) -> Result<(), TransportError> {
        if self.disconnected {
            return Err(TransportError::Disconnected);
        }
        self.sent.push((object, request));
        Ok(())
    }
}
