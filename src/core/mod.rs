//! Core session plumbing.
//!
//! This module contains the pieces that move bytes from the child shell to
//! the main loop:
//!
//! - **pty**: Unix pseudo-terminal wrapper (spawn, read half, write half)
//! - **buffer**: lock-protected accumulator between reader and main loop
//! - **reader**: background thread performing interruptible blocking reads
//! - **router**: process-wide registry routing child-exit notifications
//! - **signals**: wake-signal handler and `SIGCHLD` watcher thread
//! - **term**: vt100 screen state plus the input side of the child
//!
//! # Architecture
//!
//! ```text
//! Pty ──read──▶ ReaderThread ──append──▶ ProtectedBuffer ──drain──▶ main loop
//!                    ▲
//!                    │ SIGUSR1 (pthread_kill)
//!                    │
//! SIGCHLD ──▶ ChildWatcher ──notify──▶ CancellationRouter
//! ```

pub mod buffer;
pub mod pty;
pub mod reader;
pub mod router;
pub mod signals;
pub mod term;
