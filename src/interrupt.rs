//! Interruption state shared between the signal watcher and the build thread.
//!
//! The watcher never touches build resources. It records which signal arrived
//! and terminates the external tool currently running (if any), so the build
//! thread fails out of its current step and unwinds through its own guard.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct State {
    triggered: AtomicBool,
    signal: Mutex<Option<&'static str>>,
    /// PID of the running child tool, 0 when none.
    child: AtomicI32,
}

/// Cloneable handle to the shared interruption state.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    state: Arc<State>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an interruption and terminate the running child, if any.
    pub fn trigger(&self, signal: &'static str) {
        if let Ok(mut slot) = self.state.signal.lock() {
            slot.get_or_insert(signal);
        }
        self.state.triggered.store(true, Ordering::SeqCst);
        self.kill_child();
    }

    pub fn is_triggered(&self) -> bool {
        self.state.triggered.load(Ordering::SeqCst)
    }

    /// Name of the first signal received.
    pub fn signal(&self) -> Option<&'static str> {
        self.state.signal.lock().ok().and_then(|slot| *slot)
    }

    /// Register the child process that should be terminated on interruption.
    ///
    /// If the interruption already happened the child is terminated at once.
    pub fn register_child(&self, pid: u32) {
        self.state.child.store(pid as i32, Ordering::SeqCst);
        if self.is_triggered() {
            self.kill_child();
        }
    }

    pub fn clear_child(&self) {
        self.state.child.store(0, Ordering::SeqCst);
    }

    fn kill_child(&self) {
        let pid = self.state.child.load(Ordering::SeqCst);
        if pid > 0 {
            log::debug!("Terminating child process {}", pid);
            // SAFETY: kill(2) has no memory-safety preconditions.
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }
    }
}
