//! Task bookkeeping and signals
//!
//! A registry of live pipeline tasks behind one mutex, dumped to the log
//! when the process receives SIGHUP. The signal is informational only;
//! nothing is cancelled.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

static HUP_FLAG: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_hup(_signal: nix::libc::c_int) {
    HUP_FLAG.store(true, Ordering::Relaxed);
}

/// Install the process-wide SIGHUP handler.
///
/// Safe to call more than once; later calls replace the same handler.
pub fn install_hup_hook() -> nix::Result<()> {
    use nix::sys::signal::{signal, SigHandler, Signal};
    // SAFETY: the handler only stores to an atomic flag.
    unsafe { signal(Signal::SIGHUP, SigHandler::Handler(handle_hup)) }?;
    Ok(())
}

/// Consume a pending SIGHUP, if any
pub fn take_hup_request() -> bool {
    HUP_FLAG.swap(false, Ordering::Relaxed)
}

/// Live-task registry.
///
/// Tasks register a label for their lifetime; the guard removes the entry
/// on drop. `dump_status` logs every live task.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Mutex<BTreeMap<u64, String>>,
    next_id: AtomicU64,
}

/// Removes its task from the registry when dropped
pub struct TaskGuard<'a> {
    registry: &'a TaskRegistry,
    id: u64,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task; the returned guard unregisters it
    pub fn register(&self, label: impl Into<String>) -> TaskGuard<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.tasks
            .lock()
            .expect("task registry poisoned")
            .insert(id, label.into());
        TaskGuard { registry: self, id }
    }

    pub fn live_count(&self) -> usize {
        self.tasks.lock().expect("task registry poisoned").len()
    }

    /// Log every live task; wired to SIGHUP
    pub fn dump_status(&self) {
        let tasks = self.tasks.lock().expect("task registry poisoned");
        log::info!("{} live tasks", tasks.len());
        for label in tasks.values() {
            log::info!("  {}", label);
        }
    }

    /// Dump status if a SIGHUP arrived since the last check
    pub fn poll_hup(&self) {
        if take_hup_request() {
            self.dump_status();
        }
    }
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        self.registry
            .tasks
            .lock()
            .expect("task registry poisoned")
            .remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_tracks_guards() {
        let registry = TaskRegistry::new();
        assert_eq!(registry.live_count(), 0);

        let a = registry.register("read subgraph 0");
        let b = registry.register("read subgraph 1");
        assert_eq!(registry.live_count(), 2);

        drop(a);
        assert_eq!(registry.live_count(), 1);
        drop(b);
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_hup_flag_roundtrip() {
        HUP_FLAG.store(true, Ordering::Relaxed);
        assert!(take_hup_request());
        assert!(!take_hup_request());
    }
}
