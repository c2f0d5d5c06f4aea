// Streaming adapter over a codec engine.
//
// Writes are queued in order and fed into the input window one at a time,
// and only while no dispatch is in flight. An encoder dispatches once the
// window reaches the minimum encode window size, a decoder on every
// write, and both when a flush or the end of input asks for it. Exactly
// one dispatch carries `is_last`. Its resolution, once all output has been
// read, ends the stream and closes it.
//
// Unread output counts against the high-water mark just like queued input:
// while the consumer lags, queued writes stay queued and flush callbacks
// wait until the output of their dispatch has been read.
//
// Nothing here spawns threads: progress happens inside the calling
// methods (`write`, `read`, `poll`, `wait`), and deferred callbacks run
// there too.

mod events;
mod window;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use crossbeam_channel::Receiver;

use crate::codec::{CodecEngine, Completion, PendingRequest, VcdiffEngine};
use crate::config::{DecodeOptions, EncodeOptions, Mode, SessionConfig};
use crate::error::VcdiffError;

pub use events::Event;
use events::Notifier;
pub use window::WindowAccumulator;

/// Completion callback for `flush_then` / `close_then`.
pub type Callback = Box<dyn FnOnce(Result<(), VcdiffError>) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Open, nothing in flight.
    Buffering,
    /// Open, one dispatch in flight.
    Dispatching,
    /// Input ended; the final dispatch or its output is still pending.
    Flushing,
    Closed,
    Errored,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub bytes_written: u64,
    pub bytes_emitted: u64,
    pub dispatches: u64,
}

struct QueuedWrite {
    chunk: Bytes,
    /// Dispatch whatever is buffered, even below the threshold.
    force: bool,
    last: bool,
    done: Option<Callback>,
}

pub struct VcdiffStream<E: CodecEngine = VcdiffEngine> {
    engine: E,
    mode: Mode,
    threshold: usize,
    high_water_mark: usize,

    window: WindowAccumulator,
    queue: VecDeque<QueuedWrite>,
    queued_bytes: usize,
    pending: Option<(PendingRequest, Option<Callback>)>,
    output: VecDeque<Bytes>,
    output_bytes: usize,
    bytes_read: u64,
    /// Flush callbacks keyed by the emitted-byte count they wait to see read.
    flush_waiters: VecDeque<(u64, Callback)>,

    ended: bool,
    finished: bool,
    closed: bool,
    error: Option<VcdiffError>,
    /// Written by the engine's error handler.
    latched: Arc<Mutex<Option<VcdiffError>>>,

    notifier: Notifier,
    deferred: VecDeque<(Callback, Result<(), VcdiffError>)>,
    end_waiters: Vec<Callback>,
    drain_waiters: Vec<Option<Callback>>,
    close_waiters: Vec<Callback>,
    drain_wanted: bool,
    stats: StreamStats,
}

impl<E: CodecEngine> std::fmt::Debug for VcdiffStream<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VcdiffStream")
            .field("mode", &self.mode)
            .field("state", &self.state())
            .field("buffered", &self.window.len())
            .field("queued", &self.queue.len())
            .field("unread", &self.output_bytes)
            .field("stats", &self.stats)
            .finish()
    }
}

impl VcdiffStream {
    /// Stream over the built-in engine.
    pub fn new(config: impl Into<SessionConfig>) -> Result<Self, VcdiffError> {
        let config = config.into();
        let engine = VcdiffEngine::new(&config)?;
        Self::with_engine(engine, config)
    }

    pub fn encoder(options: &EncodeOptions) -> Result<Self, VcdiffError> {
        Self::new(options.validate()?)
    }

    pub fn decoder(options: &DecodeOptions) -> Result<Self, VcdiffError> {
        Self::new(options.validate()?)
    }
}

impl<E: CodecEngine> VcdiffStream<E> {
    /// Wrap `engine`, which must be open and in the mode of `config`.
    pub fn with_engine(mut engine: E, config: SessionConfig) -> Result<Self, VcdiffError> {
        if engine.mode() != config.mode() {
            return Err(VcdiffError::validation(format!(
                "{} engine given a {} configuration",
                engine.mode(),
                config.mode()
            )));
        }

        let latched = Arc::new(Mutex::new(None));
        let latch = Arc::clone(&latched);
        engine.set_error_handler(Box::new(move |err: &VcdiffError| {
            *latch.lock().unwrap_or_else(PoisonError::into_inner) = Some(err.clone());
        }));

        log::debug!("new {} stream", config.mode());
        Ok(Self {
            engine,
            mode: config.mode(),
            threshold: config.dispatch_threshold(),
            high_water_mark: config.high_water_mark(),
            window: WindowAccumulator::new(),
            queue: VecDeque::new(),
            queued_bytes: 0,
            pending: None,
            output: VecDeque::new(),
            output_bytes: 0,
            bytes_read: 0,
            flush_waiters: VecDeque::new(),
            ended: false,
            finished: false,
            closed: false,
            error: None,
            latched,
            notifier: Notifier::default(),
            deferred: VecDeque::new(),
            end_waiters: Vec::new(),
            drain_waiters: Vec::new(),
            close_waiters: Vec::new(),
            drain_wanted: false,
            stats: StreamStats::default(),
        })
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn state(&self) -> StreamState {
        if self.error.is_some() {
            StreamState::Errored
        } else if self.closed {
            StreamState::Closed
        } else if self.ended {
            StreamState::Flushing
        } else if self.pending.is_some() {
            StreamState::Dispatching
        } else {
            StreamState::Buffering
        }
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// The error that failed the stream.
    pub fn error(&self) -> Option<&VcdiffError> {
        self.error.as_ref()
    }

    /// Bytes sitting in the input window.
    pub fn buffered_len(&self) -> usize {
        self.window.len()
    }

    /// End-of-output has been signalled.
    pub fn is_ended(&self) -> bool {
        self.notifier.has_ended()
    }

    /// Output produced but not yet read.
    pub fn unread_len(&self) -> usize {
        self.output_bytes
    }

    /// Queued input or unread output is at or above the high-water mark.
    /// Read and wait until `Drain`.
    pub fn needs_drain(&self) -> bool {
        self.queued_bytes >= self.high_water_mark || self.output_bytes >= self.high_water_mark
    }

    pub fn subscribe(&mut self) -> Receiver<Event> {
        self.notifier.subscribe()
    }

    // -----------------------------------------------------------------------
    // Input
    // -----------------------------------------------------------------------

    /// Queue `chunk`. Returns `false` when the caller should wait for
    /// `Drain` before writing more.
    pub fn write(&mut self, chunk: impl Into<Bytes>) -> Result<bool, VcdiffError> {
        self.check_writable()?;
        let chunk = chunk.into();
        log::trace!("write of {} bytes", chunk.len());
        self.stats.bytes_written += chunk.len() as u64;
        self.enqueue(QueuedWrite {
            chunk,
            force: false,
            last: false,
            done: None,
        });
        let ok = !self.needs_drain();
        if !ok {
            self.drain_wanted = true;
        }
        self.run_deferred();
        Ok(ok)
    }

    /// Signal the end of input. Calling it again is a no-op.
    pub fn end(&mut self) -> Result<(), VcdiffError> {
        if self.ended {
            return Ok(());
        }
        self.end_with(Bytes::new())
    }

    /// Write `chunk` as the final piece of input.
    pub fn end_with(&mut self, chunk: impl Into<Bytes>) -> Result<(), VcdiffError> {
        self.check_writable()?;
        let chunk = chunk.into();
        self.stats.bytes_written += chunk.len() as u64;
        self.ended = true;
        log::debug!("end of input, {} bytes buffered", self.window.len() + self.queued_bytes + chunk.len());
        self.enqueue(QueuedWrite {
            chunk,
            force: true,
            last: true,
            done: None,
        });
        self.run_deferred();
        Ok(())
    }

    /// Dispatch buffered bytes now, without ending the stream.
    pub fn flush(&mut self) {
        self.flush_inner(None);
        self.run_deferred();
    }

    /// Like [`flush`](Self::flush), calling `done` once the flushed bytes
    /// have been processed and everything emitted so far has been read.
    /// After `end`, `done` waits for end-of-output.
    pub fn flush_then(&mut self, done: impl FnOnce(Result<(), VcdiffError>) + Send + 'static) {
        self.flush_inner(Some(Box::new(done)));
        self.run_deferred();
    }

    fn flush_inner(&mut self, done: Option<Callback>) {
        if let Some(err) = &self.error {
            let err = err.clone();
            self.defer(done, Err(err));
        } else if self.closed {
            self.defer(done, Ok(()));
        } else if self.ended {
            if let Some(done) = done {
                self.end_waiters.push(done);
            }
        } else if self.needs_drain() {
            log::trace!("flush waits for drain");
            self.drain_wanted = true;
            self.drain_waiters.push(done);
        } else {
            self.enqueue(QueuedWrite {
                chunk: Bytes::new(),
                force: true,
                last: false,
                done,
            });
        }
    }

    fn check_writable(&self) -> Result<(), VcdiffError> {
        if let Some(err) = &self.error {
            return Err(VcdiffError::closed(format!("stream failed: {}", err.message())));
        }
        if self.closed {
            return Err(VcdiffError::closed("write after close"));
        }
        if self.ended {
            return Err(VcdiffError::closed("write after end"));
        }
        Ok(())
    }

    fn enqueue(&mut self, write: QueuedWrite) {
        self.queued_bytes += write.chunk.len();
        self.queue.push_back(write);
        self.pump();
    }

    // -----------------------------------------------------------------------
    // Output and progress
    // -----------------------------------------------------------------------

    /// Next output chunk, if any. Never blocks.
    pub fn read(&mut self) -> Option<Bytes> {
        self.pump();
        let chunk = self.output.pop_front();
        if let Some(chunk) = &chunk {
            self.output_bytes -= chunk.len();
            self.bytes_read += chunk.len() as u64;
            self.release_flushes();
            self.pump();
        }
        self.run_deferred();
        chunk
    }

    /// Make whatever progress is possible without blocking.
    pub fn poll(&mut self) -> StreamState {
        self.pump();
        self.run_deferred();
        self.state()
    }

    /// Block until the in-flight dispatch (if any) resolves, then make
    /// progress.
    pub fn wait(&mut self) -> StreamState {
        if self.error.is_none() && !self.closed {
            let result = self.pending.as_ref().map(|(req, _)| req.wait());
            if let Some(result) = result {
                self.complete(result);
            }
        }
        self.pump();
        self.run_deferred();
        self.state()
    }

    fn pump(&mut self) {
        while self.error.is_none() && !self.closed {
            if let Some((req, _)) = &self.pending {
                match req.try_complete() {
                    Some(result) => self.complete(result),
                    None => break,
                }
                continue;
            }
            if self.output_bytes >= self.high_water_mark {
                log::trace!("{} unread output bytes, holding {} queued writes", self.output_bytes, self.queue.len());
                break;
            }
            let Some(write) = self.queue.pop_front() else {
                break;
            };
            self.queued_bytes -= write.chunk.len();
            self.accept(write);
        }
        self.check_drain();
        self.check_end();
    }

    fn accept(&mut self, write: QueuedWrite) {
        self.window.push(write.chunk);
        let due = self.mode == Mode::Decode || self.window.len() >= self.threshold || write.force;
        if write.last || (due && !self.window.is_empty()) {
            self.dispatch(write.last, write.done);
        } else {
            self.settle(write.done);
        }
    }

    fn dispatch(&mut self, is_last: bool, done: Option<Callback>) {
        let chunk = self.window.take();
        self.stats.dispatches += 1;
        log::debug!("dispatch #{}: {} bytes, last={is_last}", self.stats.dispatches, chunk.len());
        match self.engine.dispatch_async(chunk, is_last) {
            Ok(req) => self.pending = Some((req, done)),
            Err(err) => {
                self.defer(done, Err(err.clone()));
                self.fail(err);
            }
        }
    }

    fn complete(&mut self, result: Completion) {
        let Some((req, done)) = self.pending.take() else {
            return;
        };
        match result {
            Ok(dispatched) => {
                if !dispatched.output.is_empty() {
                    self.stats.bytes_emitted += dispatched.output.len() as u64;
                    self.output_bytes += dispatched.output.len();
                    self.output.push_back(dispatched.output);
                    self.notifier.readable();
                }
                if req.is_last() {
                    if !dispatched.finished {
                        log::warn!("final dispatch resolved without finishing the session");
                    }
                    self.finished = true;
                }
                self.settle(done);
            }
            Err(err) => {
                self.defer(done, Err(err.clone()));
                self.fail(err);
            }
        }
    }

    fn check_drain(&mut self) {
        if !self.drain_wanted || self.needs_drain() || self.error.is_some() || self.closed {
            return;
        }
        self.drain_wanted = false;
        self.notifier.drain();
        for done in std::mem::take(&mut self.drain_waiters) {
            self.flush_inner(done);
        }
    }

    fn check_end(&mut self) {
        if !self.finished || !self.output.is_empty() || self.closed || self.error.is_some() {
            return;
        }
        log::debug!(
            "{} stream ended: {} bytes in, {} bytes out",
            self.mode,
            self.stats.bytes_written,
            self.stats.bytes_emitted
        );
        self.notifier.end();
        for done in std::mem::take(&mut self.end_waiters) {
            self.deferred.push_back((done, Ok(())));
        }
        self.close_inner();
    }

    /// Resolve a flush once everything emitted up to now has been read.
    fn settle(&mut self, done: Option<Callback>) {
        let Some(done) = done else {
            return;
        };
        if self.stats.bytes_emitted <= self.bytes_read {
            self.deferred.push_back((done, Ok(())));
        } else {
            self.flush_waiters.push_back((self.stats.bytes_emitted, done));
        }
    }

    fn release_flushes(&mut self) {
        while self.flush_waiters.front().is_some_and(|(mark, _)| *mark <= self.bytes_read) {
            if let Some((_, done)) = self.flush_waiters.pop_front() {
                self.deferred.push_back((done, Ok(())));
            }
        }
    }

    fn defer(&mut self, done: Option<Callback>, result: Result<(), VcdiffError>) {
        if let Some(done) = done {
            self.deferred.push_back((done, result));
        }
    }

    fn run_deferred(&mut self) {
        while let Some((done, result)) = self.deferred.pop_front() {
            done(result);
        }
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Release the engine. Idempotent; `Close` is signalled once.
    pub fn close(&mut self) {
        self.close_inner();
        self.run_deferred();
    }

    /// Like [`close`](Self::close), calling `done` once closed.
    pub fn close_then(&mut self, done: impl FnOnce(Result<(), VcdiffError>) + Send + 'static) {
        if self.closed || self.error.is_some() {
            self.deferred.push_back((Box::new(done), Ok(())));
        } else {
            self.close_waiters.push(Box::new(done));
            self.close_inner();
        }
        self.run_deferred();
    }

    fn close_inner(&mut self) {
        if self.closed || self.error.is_some() {
            return;
        }
        self.closed = true;
        let err = VcdiffError::closed("stream closed");
        self.abandon(&err);
        self.release();
    }

    fn fail(&mut self, err: VcdiffError) {
        if self.closed || self.error.is_some() {
            return;
        }
        log::warn!("{} stream failed: {err}", self.mode);
        self.abandon(&err);
        self.error = Some(err.clone());
        self.notifier.error(&err);
        self.release();
    }

    /// Drop buffered input and fail everything still waiting on it.
    fn abandon(&mut self, err: &VcdiffError) {
        self.window.clear();
        if let Some((_, done)) = self.pending.take() {
            self.defer(done, Err(err.clone()));
        }
        self.queued_bytes = 0;
        for write in std::mem::take(&mut self.queue) {
            self.defer(write.done, Err(err.clone()));
        }
        for (_, done) in std::mem::take(&mut self.flush_waiters) {
            self.deferred.push_back((done, Err(err.clone())));
        }
        for done in std::mem::take(&mut self.end_waiters) {
            self.deferred.push_back((done, Err(err.clone())));
        }
        for done in std::mem::take(&mut self.drain_waiters) {
            self.defer(done, Err(err.clone()));
        }
    }

    fn release(&mut self) {
        self.engine.close();
        self.notifier.close();
        for done in std::mem::take(&mut self.close_waiters) {
            self.deferred.push_back((done, Ok(())));
        }
    }

    // -----------------------------------------------------------------------
    // One-shot
    // -----------------------------------------------------------------------

    /// Process all of `input` in one engine call and close the stream.
    ///
    /// Only valid on a stream that has not been written to.
    pub fn process_sync(&mut self, input: impl AsRef<[u8]>) -> Result<Bytes, VcdiffError> {
        if self.error.is_some() || self.closed {
            return Err(VcdiffError::closed("synchronous call on a closed session"));
        }
        if self.ended || self.pending.is_some() || !self.queue.is_empty() || !self.window.is_empty() {
            return Err(VcdiffError::closed("synchronous call on a session already streaming"));
        }

        let input = input.as_ref();
        self.stats.bytes_written += input.len() as u64;
        self.stats.dispatches += 1;
        let result = self.engine.dispatch_sync(input, true);

        let latched = self.latched.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(err) = latched {
            self.fail(err.clone());
            self.run_deferred();
            return Err(err);
        }
        let done = match result {
            Ok(done) => done,
            Err(err) => {
                self.fail(err.clone());
                self.run_deferred();
                return Err(err);
            }
        };
        assert!(done.finished, "sync should finish in one pass");

        self.stats.bytes_emitted += done.output.len() as u64;
        self.ended = true;
        self.finished = true;
        self.close_inner();
        self.run_deferred();
        Ok(done.output)
    }
}
