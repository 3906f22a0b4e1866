//! Admission Controller
//!
//! Bounds how many export tasks exist at once. A bounded gate is a tokio
//! [`Semaphore`]; an unbounded gate admits immediately but still counts
//! in-flight permits, so callers never special-case "no limit".
//!
//! Permits release on drop. `drain()` is called once during shutdown after
//! every export task has finished; afterwards `acquire` fails.

use crate::error::GateClosed;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug)]
enum GateKind {
    Unbounded,
    Bounded {
        semaphore: Arc<Semaphore>,
        capacity: usize,
    },
}

/// Process-wide bounded-concurrency gate for export tasks.
#[derive(Debug)]
pub struct AdmissionGate {
    kind: GateKind,
    in_flight: Arc<AtomicUsize>,
    closed: AtomicBool,
}

impl AdmissionGate {
    /// `None` or `Some(0)` builds an unbounded gate.
    pub fn new(max_concurrent: Option<usize>) -> Self {
        match max_concurrent {
            Some(n) if n > 0 => Self::bounded(n),
            _ => Self::unbounded(),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            kind: GateKind::Unbounded,
            in_flight: Arc::new(AtomicUsize::new(0)),
            closed: AtomicBool::new(false),
        }
    }

    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn bounded(capacity: usize) -> Self {
        assert!(capacity > 0, "admission capacity must be positive");
        let capacity = capacity.min(Semaphore::MAX_PERMITS);
        Self {
            kind: GateKind::Bounded {
                semaphore: Arc::new(Semaphore::new(capacity)),
                capacity,
            },
            in_flight: Arc::new(AtomicUsize::new(0)),
            closed: AtomicBool::new(false),
        }
    }

    /// Waits for a free slot.
    pub async fn acquire(&self) -> Result<AdmissionPermit, GateClosed> {
        if self.closed.load(Ordering::Acquire) {
            return Err(GateClosed);
        }

        let permit = match &self.kind {
            GateKind::Unbounded => None,
            GateKind::Bounded { semaphore, .. } => Some(
                Arc::clone(semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|_| GateClosed)?,
            ),
        };

        let outstanding = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(capacity) = self.capacity() {
            debug_assert!(
                outstanding <= capacity,
                "admission bound violated: {} permits out of {}",
                outstanding,
                capacity
            );
        }

        Ok(AdmissionPermit {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Closes the gate. Waiting and future `acquire` calls fail.
    pub fn drain(&self) {
        self.closed.store(true, Ordering::Release);
        if let GateKind::Bounded { semaphore, .. } = &self.kind {
            semaphore.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// `None` for an unbounded gate.
    pub fn capacity(&self) -> Option<usize> {
        match &self.kind {
            GateKind::Unbounded => None,
            GateKind::Bounded { capacity, .. } => Some(*capacity),
        }
    }

    /// Permits currently held.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// One admitted export task. Dropping it frees the slot.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: Option<OwnedSemaphorePermit>,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
