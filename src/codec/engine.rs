// Built-in VCDIFF engine.
//
// The session lives in a mutex-guarded slot shared with the dispatch
// workers. An async dispatch moves the session out of the slot onto a
// pool thread and puts it back when done, so the slot is empty exactly
// while a request is in flight. Closing during that time only marks the
// slot; the worker drops the session instead of putting it back.

use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::coder::{Phase, Session};
use super::decoder::DecoderCoder;
use super::encoder::EncoderCoder;
use super::{CodecEngine, Completion, EngineState, ErrorHandler, PendingRequest};
use crate::config::{DecodeConfig, EncodeConfig, Mode, SessionConfig};
use crate::error::VcdiffError;

// ---------------------------------------------------------------------------
// Dispatch pool
// ---------------------------------------------------------------------------

static POOL: LazyLock<Option<ThreadPool>> = LazyLock::new(|| {
    match ThreadPoolBuilder::new()
        .thread_name(|i| format!("vcdiff-dispatch-{i}"))
        .build()
    {
        Ok(pool) => Some(pool),
        Err(e) => {
            log::warn!("could not build the dispatch pool, using rayon's global pool: {e}");
            None
        }
    }
});

fn spawn(job: impl FnOnce() + Send + 'static) {
    match POOL.as_ref() {
        Some(pool) => pool.spawn(job),
        None => rayon::spawn(job),
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct Slot {
    session: Option<Session>,
    state: EngineState,
    in_flight: bool,
    /// Close requested while a dispatch was in flight.
    pending_close: bool,
}

struct Shared {
    slot: Mutex<Slot>,
    handler: Mutex<Option<ErrorHandler>>,
}

impl Shared {
    fn notify_error(&self, err: &VcdiffError) {
        log::warn!("codec session failed: {err}");
        if let Some(handler) = lock(&self.handler).as_mut() {
            handler(err);
        }
    }

    /// Put a session back after a dispatch, or record its failure.
    fn complete(&self, session: Session, result: Completion) -> Completion {
        let mut slot = lock(&self.slot);
        slot.in_flight = false;
        match result {
            Ok(done) => {
                if slot.pending_close {
                    log::debug!("releasing session after deferred close");
                } else {
                    slot.session = Some(session);
                }
                Ok(done)
            }
            Err(err) => {
                let was_open = slot.state == EngineState::Open;
                if was_open {
                    slot.state = EngineState::Errored;
                }
                drop(slot);
                if was_open {
                    self.notify_error(&err);
                }
                Err(err)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The crate's own VCDIFF codec behind [`CodecEngine`].
pub struct VcdiffEngine {
    mode: Mode,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for VcdiffEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VcdiffEngine")
            .field("mode", &self.mode)
            .field("state", &self.state())
            .finish()
    }
}

impl VcdiffEngine {
    pub fn new(config: &SessionConfig) -> Result<Self, VcdiffError> {
        match config {
            SessionConfig::Encode(c) => Ok(Self::encoder(c)),
            SessionConfig::Decode(c) => Ok(Self::decoder(c)),
        }
    }

    pub fn encoder(config: &EncodeConfig) -> Self {
        log::debug!(
            "new encoder: dictionary {} bytes, flags {:?}",
            config.dictionary().len(),
            config.flags()
        );
        Self::with_session(Mode::Encode, Session::new(Box::new(EncoderCoder::new(config))))
    }

    pub fn decoder(config: &DecodeConfig) -> Self {
        log::debug!(
            "new decoder: dictionary {} bytes, limits {:?}",
            config.dictionary().len(),
            config.limits()
        );
        Self::with_session(Mode::Decode, Session::new(Box::new(DecoderCoder::new(config))))
    }

    fn with_session(mode: Mode, session: Session) -> Self {
        Self {
            mode,
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    session: Some(session),
                    state: EngineState::Open,
                    in_flight: false,
                    pending_close: false,
                }),
                handler: Mutex::new(None),
            }),
        }
    }

    /// Lifecycle phase of the session, or `None` once it has been released
    /// or while a dispatch holds it.
    pub fn phase(&self) -> Option<Phase> {
        lock(&self.shared.slot).session.as_ref().map(Session::phase)
    }

    /// Move the session out of the slot for one dispatch.
    fn checkout(&self) -> Result<Session, VcdiffError> {
        let mut slot = lock(&self.shared.slot);
        match slot.state {
            EngineState::Open => {}
            EngineState::Closed => return Err(VcdiffError::closed("dispatch on a closed session")),
            EngineState::Errored => return Err(VcdiffError::closed("dispatch on a failed session")),
        }
        assert!(!slot.in_flight, "only one dispatch may be in flight per session");
        let session = slot.session.take();
        slot.in_flight = session.is_some();
        session.ok_or_else(|| VcdiffError::closed("session already released"))
    }
}

impl CodecEngine for VcdiffEngine {
    fn mode(&self) -> Mode {
        self.mode
    }

    fn state(&self) -> EngineState {
        lock(&self.shared.slot).state
    }

    fn set_error_handler(&mut self, handler: ErrorHandler) {
        *lock(&self.shared.handler) = Some(handler);
    }

    fn dispatch_async(&mut self, chunk: Bytes, is_last: bool) -> Result<PendingRequest, VcdiffError> {
        let mut session = self.checkout()?;
        let (tx, rx) = crossbeam_channel::bounded(1);
        let shared = Arc::clone(&self.shared);
        let data = chunk.clone();
        spawn(move || {
            let result = session.dispatch(&data, is_last);
            let result = shared.complete(session, result);
            let _ = tx.send(result);
        });
        Ok(PendingRequest::new(rx, chunk, is_last))
    }

    fn dispatch_sync(&mut self, chunk: &[u8], is_last: bool) -> Completion {
        let mut session = self.checkout()?;
        let result = session.dispatch(chunk, is_last);
        self.shared.complete(session, result)
    }

    fn close(&mut self) {
        let mut slot = lock(&self.shared.slot);
        if slot.state != EngineState::Open {
            return;
        }
        slot.state = EngineState::Closed;
        if slot.in_flight {
            slot.pending_close = true;
        } else {
            slot.session = None;
        }
        log::debug!("{} session closed", self.mode);
    }
}

impl Drop for VcdiffEngine {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::{DecodeOptions, EncodeOptions};
    use crate::error::ErrorKind;
    use crate::hash::HashedDictionary;

    const DICT: &[u8] = b"the dictionary holds reference bytes for COPY instructions";

    fn encoder() -> VcdiffEngine {
        let dict = Arc::new(HashedDictionary::new(DICT).unwrap());
        VcdiffEngine::encoder(&EncodeOptions::new(dict).validate().unwrap())
    }

    fn decoder() -> VcdiffEngine {
        VcdiffEngine::decoder(&DecodeOptions::new(DICT).validate().unwrap())
    }

    #[test]
    fn sync_round_trip() {
        let payload = b"reference bytes for the dictionary, again and again";
        let delta = encoder().dispatch_sync(payload, true).unwrap();
        assert!(delta.finished);
        let plain = decoder().dispatch_sync(&delta.output, true).unwrap();
        assert!(plain.finished);
        assert_eq!(plain.output.as_ref(), payload);
    }

    #[test]
    fn async_dispatches_resolve_in_order() {
        let mut enc = encoder();
        let first = enc.dispatch_async(Bytes::from_static(b"holds reference"), false).unwrap();
        let a = first.wait().unwrap();
        assert!(!a.finished);
        let second = enc.dispatch_async(Bytes::from_static(b" bytes"), true).unwrap();
        let b = second.wait().unwrap();
        assert!(b.finished);

        let delta = [a.output, b.output].concat();
        let plain = decoder().dispatch_sync(&delta, true).unwrap();
        assert_eq!(plain.output.as_ref(), b"holds reference bytes");
    }

    #[test]
    fn failure_fires_handler_once_and_poisons_the_session() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut dec = decoder();
        let seen = Arc::clone(&calls);
        dec.set_error_handler(Box::new(move |e| {
            assert_eq!(e.kind(), ErrorKind::Decode);
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        let err = dec.dispatch_sync(b"not a delta", false).unwrap_err();
        assert_eq!(err.native_code(), Some(3));
        assert_eq!(dec.state(), EngineState::Errored);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let again = dec.dispatch_sync(b"more", true).unwrap_err();
        assert_eq!(again.kind(), ErrorKind::ClosedSession);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn async_failure_reports_through_the_request() {
        let mut dec = decoder();
        let req = dec.dispatch_async(Bytes::from_static(b"garbage!"), true).unwrap();
        assert_eq!(req.wait().unwrap_err().kind(), ErrorKind::Decode);
        assert_eq!(dec.state(), EngineState::Errored);
    }

    #[test]
    fn close_is_idempotent_and_rejects_dispatch() {
        let mut enc = encoder();
        enc.close();
        enc.close();
        assert_eq!(enc.state(), EngineState::Closed);
        assert_eq!(enc.phase(), None);
        let err = enc.dispatch_sync(b"x", true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClosedSession);
    }

    #[test]
    fn close_during_dispatch_is_deferred() {
        let mut enc = encoder();
        let req = enc.dispatch_async(Bytes::from(vec![b'q'; 100_000]), true).unwrap();
        enc.close();
        assert_eq!(enc.state(), EngineState::Closed);
        // The in-flight request still completes.
        assert!(req.wait().unwrap().finished);
        assert_eq!(enc.phase(), None);
    }

    #[test]
    fn phase_tracks_the_session() {
        let mut enc = encoder();
        assert_eq!(enc.phase(), Some(Phase::Idle));
        enc.dispatch_sync(b"abc", false).unwrap();
        assert_eq!(enc.phase(), Some(Phase::Processing));
        enc.dispatch_sync(b"", true).unwrap();
        assert_eq!(enc.phase(), Some(Phase::Done));
    }
}
