use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Process-wide bound on how many jobs may be tracked at once.
///
/// Slots are handed out as [`AdmissionSlot`] values; dropping a slot releases it, so
/// each acquired slot is released exactly once whichever path ends the job.
pub struct AdmissionGate {
    max_concurrent: usize,
    count: Mutex<usize>,
}

impl AdmissionGate {
    pub fn new(max_concurrent: usize) -> Arc<Self> {
        Arc::new(Self {
            max_concurrent,
            count: Mutex::new(0),
        })
    }

    /// Returns `None` when the gate is at capacity.
    pub fn try_acquire(self: &Arc<Self>) -> Option<AdmissionSlot> {
        let mut count = self.lock();
        if *count >= self.max_concurrent {
            return None;
        }
        *count += 1;
        Some(AdmissionSlot {
            gate: Arc::clone(self),
        })
    }

    pub fn capacity(&self) -> usize {
        self.max_concurrent
    }

    pub fn in_use(&self) -> usize {
        *self.lock()
    }

    fn release(&self) {
        let mut count = self.lock();
        debug_assert!(*count > 0, "admission slot released twice");
        *count = count.saturating_sub(1);
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        // The counter stays consistent even if a holder panicked.
        self.count.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("max_concurrent", &self.max_concurrent)
            .field("in_use", &self.in_use())
            .finish()
    }
}

/// One unit of the gate's capacity. Released on drop.
pub struct AdmissionSlot {
    gate: Arc<AdmissionGate>,
}

impl AdmissionSlot {
    /// True if this slot was handed out by `gate`.
    pub fn belongs_to(&self, gate: &Arc<AdmissionGate>) -> bool {
        Arc::ptr_eq(&self.gate, gate)
    }
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        self.gate.release();
    }
}

impl fmt::Debug for AdmissionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdmissionSlot")
    }
}
