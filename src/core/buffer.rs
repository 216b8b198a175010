//! Lock-protected output accumulator
//!
//! Shared between the PTY reader thread (sole producer) and the main loop
//! (sole consumer). The main loop drains it once per frame.

use std::sync::{Mutex, MutexGuard};

/// Byte accumulator guarded by a mutex
#[derive(Debug, Default)]
pub struct ProtectedBuffer {
    inner: Mutex<Vec<u8>>,
}

impl ProtectedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes to the accumulator
    pub fn append(&self, bytes: &[u8]) {
        self.lock().extend_from_slice(bytes);
    }

    /// Take everything appended since the previous call, leaving the buffer empty
    pub fn read_and_clear(&self) -> Vec<u8> {
        std::mem::take(&mut *self.lock())
    }

    // A panic on one side must not wedge the other; the bytes are still valid.
    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
