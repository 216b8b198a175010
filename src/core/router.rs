//! Routes child-exit notifications to the live session's reader
//!
//! The `SIGCHLD` watcher has no access to the session; it only knows this
//! process-wide registry. The main loop registers its reader when it starts
//! and clears the registration right before stopping the reader, so a late
//! notification during teardown finds nothing and does nothing.

use std::sync::{Mutex, MutexGuard};

use tracing::trace;

use super::reader::ReaderWaker;

static GLOBAL: CancellationRouter = CancellationRouter::new();

/// Lock-protected "currently active reader" slot
pub struct CancellationRouter {
    active: Mutex<Option<ReaderWaker>>,
}

impl CancellationRouter {
    pub const fn new() -> Self {
        Self {
            active: Mutex::new(None),
        }
    }

    /// The registry shared by the whole process
    pub fn global() -> &'static CancellationRouter {
        &GLOBAL
    }

    /// Make `waker` the target of future notifications
    pub fn register_active(&self, waker: ReaderWaker) {
        *self.lock() = Some(waker);
    }

    /// Interrupt the active reader, if there is one
    pub fn notify(&self) {
        match self.lock().as_ref() {
            Some(waker) => waker.interrupt(),
            None => trace!("notification with no active session"),
        }
    }

    /// Forget the active reader
    pub fn clear_active(&self) {
        self.lock().take();
    }

    /// Whether a reader is currently registered
    #[allow(dead_code)]
    pub fn has_active(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ReaderWaker>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for CancellationRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::pty::tests::cloexec_pipe;
    use crate::core::pty::{PtyChunk, PtyReader, PtySource, Result as PtyResult};
    use crate::core::reader::ReaderThread;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    /// Pipe-backed source that counts how many reads were started
    pub(crate) struct CountingSource {
        inner: PtyReader,
        reads: Arc<AtomicUsize>,
    }

    impl PtySource for CountingSource {
        fn read_chunk(&mut self) -> PtyResult<PtyChunk> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read_chunk()
        }
    }

    pub(crate) fn blocked_reader() -> (ReaderThread, Arc<AtomicUsize>, std::os::fd::OwnedFd) {
        let (rx, tx) = cloexec_pipe();
        let reads = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            inner: PtyReader::from_fd(rx),
            reads: reads.clone(),
        };
        let reader = ReaderThread::spawn(source).unwrap();
        wait_until(|| reads.load(Ordering::SeqCst) >= 1);
        // Give the thread time to actually enter read(2).
        thread::sleep(Duration::from_millis(50));
        (reader, reads, tx)
    }

    pub(crate) fn wait_until(condition: impl Fn() -> bool) -> bool {
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
    fn test_notify_without_session_is_noop() {
        let router = CancellationRouter::new();
        router.notify();
        router.clear_active();
        router.notify();
        assert!(!router.has_active());
    }

    #[test]
    fn test_notify_wakes_active_reader() {
        let router = CancellationRouter::new();
        let (reader, reads, _tx) = blocked_reader();
        let before = reads.load(Ordering::SeqCst);

        router.register_active(reader.waker());
        assert!(router.has_active());
        router.notify();

        // The interrupted read returns empty and the loop reads again.
        assert!(wait_until(|| reads.load(Ordering::SeqCst) > before));
        assert!(!reader.is_done());
    }

    #[test]
    fn test_clear_active_stops_delivery() {
        let router = CancellationRouter::new();
        let (mut reader, reads, _tx) = blocked_reader();

        router.register_active(reader.waker());
        router.clear_active();
        let before = reads.load(Ordering::SeqCst);
        router.notify();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(reads.load(Ordering::SeqCst), before);

        reader.stop();
    }

    #[test]
    fn test_stale_waker_after_teardown() {
        let router = CancellationRouter::new();
        let (mut reader, _reads, _tx) = blocked_reader();

        router.register_active(reader.waker());
        reader.stop();
        // Registration left in place; stop() disarmed the waker.
        router.notify();
        router.clear_active();
    }

    #[test]
    fn test_global_is_shared() {
        assert!(std::ptr::eq(CancellationRouter::global(), CancellationRouter::global()));
    }
}
