//! Process-level signal plumbing
//!
//! Two signals matter to a session:
//!
//! - `SIGUSR1` is the wake signal. Its handler does nothing; it exists so a
//!   thread blocked in `read(2)` returns `EINTR`. It is installed without
//!   `SA_RESTART`, otherwise the kernel would transparently restart the read.
//! - `SIGCHLD` means the shell exited. It is consumed on a dedicated thread
//!   via `signal-hook`, which reaps children and pokes the cancellation
//!   router. Nothing beyond the library's self-pipe write runs in the
//!   actual handler.

use std::io;
use std::sync::{Mutex, Once, PoisonError};
use std::thread::{self, JoinHandle};

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use signal_hook::consts::SIGCHLD;
use signal_hook::iterator::{Handle, Signals};
use tracing::{debug, error, info};

use super::router::CancellationRouter;

/// Signal used to knock a reader thread out of a blocking read
pub const WAKE_SIGNAL: Signal = Signal::SIGUSR1;

static WAKE_HANDLER: Once = Once::new();

/// Held while children are collected, so a pid cannot be reaped (and
/// reused) while someone else is about to signal it
static REAP_LOCK: Mutex<()> = Mutex::new(());

/// Run `f` while no child can be reaped by the watcher
pub fn with_reap_lock<R>(f: impl FnOnce() -> R) -> R {
    let _guard = REAP_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    f()
}

/// Install the no-op wake handler (idempotent)
pub fn install_wake_handler() {
    WAKE_HANDLER.call_once(|| {
        extern "C" fn wake_handler(_: libc::c_int) {}

        let action = SigAction::new(
            SigHandler::Handler(wake_handler),
            SaFlags::empty(),
            SigSet::empty(),
        );
        unsafe {
            if let Err(e) = sigaction(WAKE_SIGNAL, &action) {
                error!("Failed to set {} handler: {}", WAKE_SIGNAL, e);
            }
        }
    });
}

/// Background thread turning `SIGCHLD` into `CancellationRouter::notify`
pub struct ChildWatcher {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl ChildWatcher {
    pub fn spawn(router: &'static CancellationRouter) -> io::Result<Self> {
        let mut signals = Signals::new([SIGCHLD])?;
        let handle = signals.handle();

        let thread = thread::Builder::new()
            .name("sigchld".to_string())
            .spawn(move || {
                for _ in signals.forever() {
                    reap_children();
                    router.notify();
                }
                debug!("SIGCHLD watcher exiting");
            })?;

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    /// Stop listening and join the watcher thread
    pub fn close(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ChildWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

/// Collect every exited child without blocking
fn reap_children() {
    let _guard = REAP_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) | Err(_) => break,
            Ok(WaitStatus::Exited(pid, code)) => info!("Child {} exited with status {}", pid, code),
            Ok(WaitStatus::Signaled(pid, signal, _)) => info!("Child {} killed by {}", pid, signal),
            Ok(status) => debug!("Child status change: {:?}", status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::router::tests::{blocked_reader, wait_until};
    use std::process::Command;
    use std::sync::atomic::Ordering;
    use std::time::{Duration, Instant};

    #[test]
    fn test_install_wake_handler_is_idempotent() {
        install_wake_handler();
        install_wake_handler();
        // Delivering the wake signal to ourselves must not kill the process.
        nix::sys::pthread::pthread_kill(nix::sys::pthread::pthread_self(), WAKE_SIGNAL).unwrap();
    }

    #[test]
    fn test_child_watcher_reaps_exited_child() {
        let router: &'static CancellationRouter = Box::leak(Box::new(CancellationRouter::new()));
        let mut watcher = ChildWatcher::spawn(router).unwrap();

        let child = Command::new("/bin/sh").args(["-c", "exit 0"]).spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);

        // The watcher reaps the child; afterwards the pid is gone.
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut reaped = false;
        while Instant::now() < deadline {
            if nix::sys::signal::kill(pid, None).is_err() {
                reaped = true;
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(reaped, "exited child was never reaped");

        watcher.close();
        watcher.close();
    }

    #[test]
    fn test_child_exit_wakes_registered_reader() {
        install_wake_handler();
        let router: &'static CancellationRouter = Box::leak(Box::new(CancellationRouter::new()));
        let (mut reader, reads, _tx) = blocked_reader();
        router.register_active(reader.waker());
        let mut watcher = ChildWatcher::spawn(router).unwrap();

        let before = reads.load(Ordering::SeqCst);
        Command::new("/bin/sh").args(["-c", "exit 0"]).spawn().unwrap();

        // SIGCHLD -> reap -> notify -> EINTR, and the reader keeps going.
        assert!(wait_until(|| reads.load(Ordering::SeqCst) > before));
        assert!(!reader.is_done());

        router.clear_active();
        reader.stop();
        watcher.close();
    }
}
