//! # Source Slot
//!
//! A per-body cell that decouples module metadata from module bytes. When
//! an archive header is parsed, every module body starts as a pending
//! slot naming its offset and length in the bulk region; a loader task
//! later fills the slot, and any number of consumers may already be
//! waiting on it. A slot that never becomes ready is failed with the
//! cause, so waiters unblock instead of parking forever.
//!
//! ```text
//! Pending { offset, length } ──set_ready──► Ready(bytes) ──take──► Taken
//!          │
//!          └──fail──► Failed(cause)
//! ```
//!
//! Ready, Taken, and Failed are terminal for the readiness signal: the
//! first transition out of Pending latches it. At most one `take`
//! returns the bytes; later takes observe `Taken` and get `None`.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::ParseError;

#[derive(Debug)]
enum SlotState {
    Pending { offset: u32, length: u32 },
    Ready(Arc<[u8]>),
    Taken,
    Failed(ParseError),
}

/// A cell holding one module body (source or source map).
///
/// Shared between the archive facade and the loader task via `Arc`; all
/// methods take `&self`. Waits are cancel-safe: no lock is held across an
/// await point, so dropping a waiting future leaves the slot undisturbed.
#[derive(Debug)]
pub struct SourceSlot {
    state: Mutex<SlotState>,
    ready: Notify,
}

impl SourceSlot {
    /// A slot whose bytes are still in flight at `offset`/`length` of the
    /// bulk region.
    pub fn pending(offset: u32, length: u32) -> Self {
        Self {
            state: Mutex::new(SlotState::Pending { offset, length }),
            ready: Notify::new(),
        }
    }

    /// A slot born ready, used by the write side and for empty bodies,
    /// which never touch the bulk region.
    pub fn ready(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            state: Mutex::new(SlotState::Ready(bytes.into())),
            ready: Notify::new(),
        }
    }

    /// The `(offset, length)` a pending slot is waiting for.
    pub fn pending_location(&self) -> Option<(u32, u32)> {
        match *self.state.lock() {
            SlotState::Pending { offset, length } => Some((offset, length)),
            _ => None,
        }
    }

    /// Whether the slot currently holds bytes.
    pub fn is_ready(&self) -> bool {
        matches!(*self.state.lock(), SlotState::Ready(_))
    }

    /// The bytes of a ready slot, without waiting and without consuming.
    pub fn ready_bytes(&self) -> Option<Arc<[u8]>> {
        match &*self.state.lock() {
            SlotState::Ready(bytes) => Some(Arc::clone(bytes)),
            _ => None,
        }
    }

    /// Fill a pending slot and wake every waiter.
    ///
    /// A slot that already left Pending is not disturbed: readiness is
    /// monotonic, there is at most one transition to Ready.
    pub fn set_ready(&self, bytes: Arc<[u8]>) {
        {
            let mut state = self.state.lock();
            if !matches!(*state, SlotState::Pending { .. }) {
                return;
            }
            *state = SlotState::Ready(bytes);
        }
        self.ready.notify_waiters();
    }

    /// Fail a pending slot with `cause` and wake every waiter.
    ///
    /// Ready and Taken slots keep their bytes; only a slot that never
    /// became ready records the failure.
    pub fn fail(&self, cause: ParseError) {
        {
            let mut state = self.state.lock();
            if !matches!(*state, SlotState::Pending { .. }) {
                return;
            }
            *state = SlotState::Failed(cause);
        }
        self.ready.notify_waiters();
    }

    /// Wait for readiness and return a shared view of the bytes.
    ///
    /// Returns `Ok(None)` once the slot has been taken, and the recorded
    /// cause if the slot failed.
    pub async fn bytes(&self) -> Result<Option<Arc<[u8]>>, ParseError> {
        loop {
            let notified = self.ready.notified();
            {
                let state = self.state.lock();
                match &*state {
                    SlotState::Pending { .. } => {}
                    SlotState::Ready(bytes) => return Ok(Some(Arc::clone(bytes))),
                    SlotState::Taken => return Ok(None),
                    SlotState::Failed(cause) => return Err(cause.clone()),
                }
            }
            notified.await;
        }
    }

    /// Wait for readiness and take the bytes out.
    ///
    /// Exactly one take observes the bytes; later takes return
    /// `Ok(None)`. A failed slot returns the recorded cause.
    pub async fn take(&self) -> Result<Option<Arc<[u8]>>, ParseError> {
        loop {
            let notified = self.ready.notified();
            {
                let mut state = self.state.lock();
                match &*state {
                    SlotState::Pending { .. } => {}
                    SlotState::Ready(bytes) => {
                        let bytes = Arc::clone(bytes);
                        *state = SlotState::Taken;
                        return Ok(Some(bytes));
                    }
                    SlotState::Taken => return Ok(None),
                    SlotState::Failed(cause) => return Err(cause.clone()),
                }
            }
            notified.await;
        }
    }
}
