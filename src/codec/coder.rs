// Session lifecycle shared by the encode and decode coders.
//
// Idle -> Processing -> Finalizing -> Done. The first dispatch starts the
// coder, every dispatch processes its chunk, the `is_last` dispatch
// finishes it. Dispatching after Done is a no-op that reports finished.

use bytes::Bytes;

use super::Dispatched;
use crate::error::VcdiffError;

/// One direction of the codec.
pub(crate) trait Coder: Send {
    fn start(&mut self, out: &mut Vec<u8>) -> Result<(), VcdiffError>;
    fn process(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> Result<(), VcdiffError>;
    fn finish(&mut self, out: &mut Vec<u8>) -> Result<(), VcdiffError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Processing,
    Finalizing,
    Done,
}

pub(crate) struct Session {
    coder: Box<dyn Coder>,
    phase: Phase,
}

impl Session {
    pub(crate) fn new(coder: Box<dyn Coder>) -> Self {
        Self {
            coder,
            phase: Phase::Idle,
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn dispatch(&mut self, chunk: &[u8], is_last: bool) -> Result<Dispatched, VcdiffError> {
        if self.phase == Phase::Done {
            return Ok(Dispatched {
                output: Bytes::new(),
                finished: true,
            });
        }

        let mut out = Vec::new();
        if self.phase == Phase::Idle {
            self.coder.start(&mut out)?;
            self.phase = Phase::Processing;
        }
        self.coder.process(chunk, &mut out)?;
        if is_last {
            self.phase = Phase::Finalizing;
            self.coder.finish(&mut out)?;
            self.phase = Phase::Done;
        }

        Ok(Dispatched {
            output: Bytes::from(out),
            finished: self.phase == Phase::Done,
        })
    }
}
