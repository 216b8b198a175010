//! PTY reader thread
//!
//! Drains the child's output on a dedicated OS thread into a
//! [`ProtectedBuffer`], until the pty reaches end-of-stream or the owner
//! stops it. The blocking read is cancelled with a thread-directed wake
//! signal (see [`super::signals`]).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nix::sys::pthread::{pthread_kill, Pthread};
use std::os::unix::thread::JoinHandleExt;
use tracing::{debug, error, trace, warn};

use super::buffer::ProtectedBuffer;
use super::pty::PtySource;
use super::signals::{install_wake_handler, WAKE_SIGNAL};

/// Pause after each non-empty read so bursts of tiny reads don't spin a core
const READ_BACKOFF: Duration = Duration::from_micros(500);

/// How often `stop` re-sends the wake signal while waiting for the thread
const WAKE_RETRY: Duration = Duration::from_millis(20);

/// Lifecycle of a reader thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Running,
    Stopping,
    Terminated,
}

/// Handle that can interrupt a reader's blocking read from any thread
///
/// Safe to keep after the reader is gone: once the thread has been joined
/// the target is cleared and `interrupt` does nothing.
#[derive(Clone, Default)]
pub struct ReaderWaker {
    target: Arc<Mutex<Option<Pthread>>>,
}

impl ReaderWaker {
    /// Wake the reader thread if it is blocked in a read
    pub fn interrupt(&self) {
        let target = self.target.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(thread) = *target {
            if let Err(e) = pthread_kill(thread, WAKE_SIGNAL) {
                trace!("wake signal not delivered: {}", e);
            }
        }
    }

    fn arm(&self, thread: Pthread) {
        *self.target.lock().unwrap_or_else(|p| p.into_inner()) = Some(thread);
    }

    fn disarm(&self) {
        *self.target.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }
}

/// Background thread reading from a pty into a shared buffer
pub struct ReaderThread {
    thread: Option<JoinHandle<()>>,
    buffer: Arc<ProtectedBuffer>,
    done: Arc<AtomicBool>,
    waker: ReaderWaker,
}

impl ReaderThread {
    /// Start reading from `source` immediately
    pub fn spawn<S: PtySource>(source: S) -> std::io::Result<Self> {
        install_wake_handler();

        let buffer = Arc::new(ProtectedBuffer::new());
        let done = Arc::new(AtomicBool::new(false));

        let thread = {
            let buffer = buffer.clone();
            let done = done.clone();
            thread::Builder::new()
                .name("pty-reader".to_string())
                .spawn(move || read_loop(source, &buffer, &done))?
        };

        let waker = ReaderWaker::default();
        waker.arm(thread.as_pthread_t() as Pthread);

        Ok(Self {
            thread: Some(thread),
            buffer,
            done,
            waker,
        })
    }

    /// Output buffer filled by this reader
    pub fn buffer(&self) -> &ProtectedBuffer {
        &self.buffer
    }

    /// Whether the reader has been told to stop or hit end-of-stream
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ReaderState {
        match &self.thread {
            None => ReaderState::Terminated,
            Some(thread) if thread.is_finished() => ReaderState::Terminated,
            Some(_) if self.is_done() => ReaderState::Stopping,
            Some(_) => ReaderState::Running,
        }
    }

    /// A cloneable interrupt handle for out-of-band wakeups
    pub fn waker(&self) -> ReaderWaker {
        self.waker.clone()
    }

    /// Wake the blocking read, if any
    #[allow(dead_code)]
    pub fn interrupt(&self) {
        self.waker.interrupt();
    }

    /// Signal the thread to finish and wait until it has exited
    ///
    /// There is no timeout. The wake signal is re-sent periodically while
    /// waiting, since one sent just before the thread entered `read(2)` is
    /// lost; a read that ignores signals entirely would block this forever.
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        self.done.store(true, Ordering::Release);
        while !thread.is_finished() {
            self.waker.interrupt();
            thread::sleep(WAKE_RETRY);
        }

        // Finished but not yet joined, so the pthread id is still valid up
        // to here.
        self.waker.disarm();
        if thread.join().is_err() {
            error!("pty reader thread panicked");
        }
        debug!("pty reader stopped");
    }
}

impl Drop for ReaderThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_loop<S: PtySource>(mut source: S, buffer: &ProtectedBuffer, done: &AtomicBool) {
    while !done.load(Ordering::Acquire) {
        match source.read_chunk() {
            Ok(chunk) if !chunk.data.is_empty() => {
                buffer.append(&chunk.data);
                thread::sleep(READ_BACKOFF);
            }
            Ok(chunk) if chunk.eof => {
                debug!("pty reached end of stream");
                done.store(true, Ordering::Release);
            }
            Ok(_) => {}
            Err(e) => warn!("reading data from pty: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pty::tests::cloexec_pipe;
    use crate::core::pty::{PtyChunk, PtyError, PtyReader, Result as PtyResult};
    use std::collections::VecDeque;
    use std::fs::File;
    use std::io::{self, Write};
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    /// Replays a fixed script, then reports end-of-stream forever
    struct ScriptedSource {
        script: VecDeque<PtyResult<PtyChunk>>,
        reads: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(script: Vec<PtyResult<PtyChunk>>) -> (Self, Arc<AtomicUsize>) {
            let reads = Arc::new(AtomicUsize::new(0));
            let source = Self {
                script: script.into(),
                reads: reads.clone(),
            };
            (source, reads)
        }
    }

    impl PtySource for ScriptedSource {
        fn read_chunk(&mut self) -> PtyResult<PtyChunk> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.script.pop_front().unwrap_or(Ok(PtyChunk {
                data: Vec::new(),
                eof: true,
            }))
        }
    }

    fn data(bytes: &[u8]) -> PtyResult<PtyChunk> {
        Ok(PtyChunk {
            data: bytes.to_vec(),
            eof: false,
        })
    }

    fn eof() -> PtyResult<PtyChunk> {
        Ok(PtyChunk {
            data: Vec::new(),
            eof: true,
        })
    }

    fn pipe_reader() -> (PtyReader, File) {
        let (rx, tx) = cloexec_pipe();
        (PtyReader::from_fd(rx), File::from(tx))
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_eof_terminates_without_stop() {
        let (source, reads) = ScriptedSource::new(vec![data(b"x"), eof(), data(b"y")]);
        let reader = ReaderThread::spawn(source).unwrap();

        assert!(wait_for(|| reader.state() == ReaderState::Terminated));
        assert!(reader.is_done());
        assert_eq!(reader.buffer().read_and_clear(), b"x".to_vec());
        // Nothing is read past end-of-stream.
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_read_error_is_not_fatal() {
        let err = Err(PtyError::Read(io::Error::new(io::ErrorKind::Other, "boom")));
        let (source, _) = ScriptedSource::new(vec![err, data(b"after"), eof()]);
        let reader = ReaderThread::spawn(source).unwrap();

        assert!(wait_for(|| reader.is_done()));
        assert_eq!(reader.buffer().read_and_clear(), b"after".to_vec());
    }

    #[test]
    fn test_stop_while_blocked() {
        let (source, _tx) = pipe_reader();
        let mut reader = ReaderThread::spawn(source).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(reader.state(), ReaderState::Running);

        reader.stop();

        assert_eq!(reader.state(), ReaderState::Terminated);
        assert!(reader.is_done());
        assert!(reader.buffer().read_and_clear().is_empty());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (source, _tx) = pipe_reader();
        let mut reader = ReaderThread::spawn(source).unwrap();
        reader.stop();
        reader.stop();
        assert_eq!(reader.state(), ReaderState::Terminated);
    }

    #[test]
    fn test_interrupt_without_pending_read_is_harmless() {
        let (source, mut tx) = pipe_reader();
        let reader = ReaderThread::spawn(source).unwrap();

        reader.interrupt();
        reader.interrupt();
        assert_eq!(reader.state(), ReaderState::Running);

        tx.write_all(b"hello").unwrap();
        let mut received = Vec::new();
        assert!(wait_for(|| {
            received.extend(reader.buffer().read_and_clear());
            received == b"hello"
        }));
    }

    #[test]
    fn test_pipe_close_is_end_of_stream() {
        let (source, mut tx) = pipe_reader();
        let reader = ReaderThread::spawn(source).unwrap();

        tx.write_all(b"bye").unwrap();
        drop(tx);

        assert!(wait_for(|| reader.state() == ReaderState::Terminated));
        assert_eq!(reader.buffer().read_and_clear(), b"bye".to_vec());
    }

    #[test]
    fn test_waker_after_stop_is_noop() {
        let (source, _tx) = pipe_reader();
        let mut reader = ReaderThread::spawn(source).unwrap();
        let waker = reader.waker();
        reader.stop();
        drop(reader);

        waker.interrupt();
    }
}
