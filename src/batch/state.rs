use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Shared, observable state of the current batch.
///
/// Flags and counters are lock-free; only the current filename needs a
/// mutex. Shared between the caller, the scheduler thread and the workers
/// through an `Arc`.
#[derive(Debug, Default)]
pub struct BatchState {
    running: AtomicBool,
    processed: AtomicU64,
    address_count: AtomicU64,
    file_count: AtomicUsize,
    current_address: AtomicU32,
    has_address: AtomicBool,
    current_file_index: AtomicUsize,
    current_file: Mutex<String>,
}

/// Point-in-time copy of [`BatchState`] for presentation layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProgress {
    pub running: bool,
    pub processed: u64,
    pub address_count: u64,
    pub file_count: usize,
    pub current_address: Option<Ipv4Addr>,
    pub current_file_index: usize,
    pub current_file: String,
}

impl BatchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Raises the running flag. Returns `false` if it was already raised.
    pub(crate) fn try_begin(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Lowers the running flag; the scheduler notices at its next check.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub(crate) fn reset(&self, address_count: u64, file_count: usize) {
        self.processed.store(0, Ordering::SeqCst);
        self.address_count.store(address_count, Ordering::SeqCst);
        self.file_count.store(file_count, Ordering::SeqCst);
        self.has_address.store(false, Ordering::SeqCst);
        self.current_file_index.store(0, Ordering::SeqCst);
        self.set_current_file_name("");
    }

    pub(crate) fn set_current_address(&self, addr: Ipv4Addr) {
        self.current_address.store(u32::from(addr), Ordering::SeqCst);
        self.has_address.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_current_file(&self, index: usize, name: &str) {
        self.current_file_index.store(index, Ordering::SeqCst);
        self.set_current_file_name(name);
    }

    fn set_current_file_name(&self, name: &str) {
        let mut current = self
            .current_file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        current.clear();
        current.push_str(name);
    }

    /// Increments the processed-address counter and returns the new value.
    pub(crate) fn address_done(&self) -> u64 {
        self.processed.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn address_count(&self) -> u64 {
        self.address_count.load(Ordering::SeqCst)
    }

    pub fn file_count(&self) -> usize {
        self.file_count.load(Ordering::SeqCst)
    }

    pub fn current_address(&self) -> Option<Ipv4Addr> {
        self.has_address
            .load(Ordering::SeqCst)
            .then(|| Ipv4Addr::from(self.current_address.load(Ordering::SeqCst)))
    }

    pub fn snapshot(&self) -> BatchProgress {
        let current_file = self
            .current_file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        BatchProgress {
            running: self.is_running(),
            processed: self.processed(),
            address_count: self.address_count(),
            file_count: self.file_count(),
            current_address: self.current_address(),
            current_file_index: self.current_file_index.load(Ordering::SeqCst),
            current_file,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_is_exclusive() {
        let state = BatchState::new();
        assert!(state.try_begin());
        assert!(!state.try_begin());
        state.stop();
        assert!(!state.is_running());
        assert!(state.try_begin());
    }

    #[test]
    fn test_reset_and_snapshot() {
        let state = BatchState::new();
        state.set_current_address("10.0.0.1".parse().unwrap());
        state.set_current_file(2, "a.cfg");
        state.address_done();

        state.reset(12, 3);
        let snap = state.snapshot();
        assert_eq!(snap.processed, 0);
        assert_eq!(snap.address_count, 12);
        assert_eq!(snap.file_count, 3);
        assert_eq!(snap.current_address, None);
        assert_eq!(snap.current_file, "");

        state.set_current_address("10.0.0.2".parse().unwrap());
        state.set_current_file(1, "b.cfg");
        assert_eq!(state.address_done(), 1);
        let snap = state.snapshot();
        assert_eq!(snap.current_address, Some("10.0.0.2".parse().unwrap()));
        assert_eq!(snap.current_file_index, 1);
        assert_eq!(snap.current_file, "b.cfg");
    }
}
