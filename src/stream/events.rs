// Stream notifications, broadcast over crossbeam channels.

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::error::VcdiffError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// New output can be read.
    Readable,
    /// Queued input and unread output fell below the high-water mark.
    Drain,
    /// All output has been produced and read.
    End,
    Error(VcdiffError),
    Close,
}

/// Fans events out to subscribers. `End`, `Error` and `Close` go out at
/// most once each.
#[derive(Debug, Default)]
pub(crate) struct Notifier {
    subscribers: Vec<Sender<Event>>,
    ended: bool,
    errored: bool,
    closed: bool,
}

impl Notifier {
    pub(crate) fn subscribe(&mut self) -> Receiver<Event> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    fn broadcast(&mut self, event: Event) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub(crate) fn readable(&mut self) {
        self.broadcast(Event::Readable);
    }

    pub(crate) fn drain(&mut self) {
        self.broadcast(Event::Drain);
    }

    pub(crate) fn end(&mut self) {
        if !std::mem::replace(&mut self.ended, true) {
            self.broadcast(Event::End);
        }
    }

    pub(crate) fn error(&mut self, err: &VcdiffError) {
        if !std::mem::replace(&mut self.errored, true) {
            self.broadcast(Event::Error(err.clone()));
        }
    }

    pub(crate) fn close(&mut self) {
        if !std::mem::replace(&mut self.closed, true) {
            self.broadcast(Event::Close);
        }
    }

    pub(crate) fn has_ended(&self) -> bool {
        self.ended
    }
}
