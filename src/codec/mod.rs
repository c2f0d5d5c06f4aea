// Codec engines: the contract the stream adapter drives, and the built-in
// VCDIFF implementation of it.
//
// An engine owns one encode or decode session. Each dispatch hands it a
// chunk and an `is_last` flag and yields `(output, finished)`, either
// inline (`dispatch_sync`) or through a `PendingRequest` resolved from a
// worker thread (`dispatch_async`). A failing dispatch moves the engine to
// `Errored` for good and fires the registered error handler first.

mod coder;
mod decoder;
mod encoder;
mod engine;

use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::config::Mode;
use crate::error::VcdiffError;

pub use coder::Phase;
pub use engine::VcdiffEngine;

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Open,
    Closed,
    /// Failed; no further dispatch is valid.
    Errored,
}

/// Result of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub output: Bytes,
    /// The session has produced all of its output.
    pub finished: bool,
}

pub type Completion = Result<Dispatched, VcdiffError>;

/// Invoked once, from whichever thread ran the failing dispatch.
pub type ErrorHandler = Box<dyn FnMut(&VcdiffError) + Send>;

/// A delta codec session as seen by the stream adapter.
pub trait CodecEngine: Send {
    fn mode(&self) -> Mode;

    fn state(&self) -> EngineState;

    fn set_error_handler(&mut self, handler: ErrorHandler);

    /// Start processing `chunk` off the calling thread.
    ///
    /// At most one request may be outstanding per engine.
    fn dispatch_async(&mut self, chunk: Bytes, is_last: bool) -> Result<PendingRequest, VcdiffError>;

    /// Process `chunk` on the calling thread.
    fn dispatch_sync(&mut self, chunk: &[u8], is_last: bool) -> Completion;

    /// Release the session. A request still in flight completes normally.
    fn close(&mut self);
}

// ---------------------------------------------------------------------------
// Pending request
// ---------------------------------------------------------------------------

/// One in-flight asynchronous dispatch.
#[derive(Debug)]
pub struct PendingRequest {
    rx: Receiver<Completion>,
    chunk: Bytes,
    is_last: bool,
}

impl PendingRequest {
    /// `rx` receives exactly one completion.
    pub fn new(rx: Receiver<Completion>, chunk: Bytes, is_last: bool) -> Self {
        Self { rx, chunk, is_last }
    }

    /// A request that has already completed.
    pub fn resolved(result: Completion, chunk: Bytes, is_last: bool) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let _ = tx.send(result);
        Self::new(rx, chunk, is_last)
    }

    pub fn chunk(&self) -> &Bytes {
        &self.chunk
    }

    pub fn is_last(&self) -> bool {
        self.is_last
    }

    /// The completion, if it has arrived.
    pub fn try_complete(&self) -> Option<Completion> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(abandoned())),
        }
    }

    /// Block until the completion arrives.
    pub fn wait(&self) -> Completion {
        self.rx.recv().unwrap_or_else(|_| Err(abandoned()))
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<Completion> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(abandoned())),
        }
    }
}

fn abandoned() -> VcdiffError {
    VcdiffError::closed("engine dropped a dispatch before completing it")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_request_completes_immediately() {
        let done = Dispatched {
            output: Bytes::from_static(b"out"),
            finished: true,
        };
        let req = PendingRequest::resolved(Ok(done.clone()), Bytes::from_static(b"in"), true);
        assert!(req.is_last());
        assert_eq!(req.chunk().as_ref(), b"in");
        assert_eq!(req.try_complete(), Some(Ok(done)));
    }

    #[test]
    fn dropped_sender_is_reported() {
        let (tx, rx) = crossbeam_channel::bounded::<Completion>(1);
        let req = PendingRequest::new(rx, Bytes::new(), false);
        assert_eq!(req.try_complete(), None);
        drop(tx);
        let err = req.wait().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ClosedSession);
    }
}
