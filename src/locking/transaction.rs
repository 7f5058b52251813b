// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Transaction capability consumed by the lock manager.
//!
//! The lock manager never owns transactions. It only needs a stable identity and a
//! way to park the calling thread until another thread grants the queued request.

use log::trace;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

pub type TransactionId = u64;

/// Shared handle stored in wait queues so a releasing thread can wake the waiter.
pub type SharedTransaction = Arc<dyn Transaction>;

pub trait Transaction: Send + Sync {
    fn transaction_id(&self) -> TransactionId;

    /// Suspends the calling thread until a matching [`Transaction::unblock`].
    fn block(&self);

    /// Wakes the blocked call. May be invoked from any thread, including before
    /// `block` has started waiting.
    fn unblock(&self);

    /// Whether a thread is currently parked in [`Transaction::block`].
    fn is_blocked(&self) -> bool {
        false
    }
}

#[derive(Debug, Default)]
struct WaitState {
    blocked: bool,
    permits: usize,
}

/// Condition-variable backed transaction handle.
///
/// `unblock` leaves a permit behind, so a grant that races ahead of `block` is not
/// lost: the later `block` consumes the permit and returns immediately.
#[derive(Debug)]
pub struct TransactionHandle {
    id: TransactionId,
    state: Mutex<WaitState>,
    wakeup: Condvar,
}

impl TransactionHandle {
    pub fn new(id: TransactionId) -> Self {
        Self {
            id,
            state: Mutex::new(WaitState::default()),
            wakeup: Condvar::new(),
        }
    }

    pub fn shared(id: TransactionId) -> Arc<Self> {
        Arc::new(Self::new(id))
    }
}

impl Transaction for TransactionHandle {
    fn transaction_id(&self) -> TransactionId {
        self.id
    }

    fn block(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.permits == 0 {
            trace!("Transaction {} blocking", self.id);
            state.blocked = true;
            while state.permits == 0 {
                state = self
                    .wakeup
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            state.blocked = false;
        }
        state.permits -= 1;
    }

    fn unblock(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.permits += 1;
        trace!("Transaction {} unblocked", self.id);
        self.wakeup.notify_all();
    }

    /// Parked and not yet handed a permit. Turns false as soon as `unblock` runs,
    /// before the woken thread gets scheduled.
    fn is_blocked(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.blocked && state.permits == 0
    }
}
