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

//! Observer interfaces for lock table instrumentation.
//!
//! Observers decouple the `LockManager` from whoever wants to watch it (tests,
//! the replay command) so the manager does not have to know about event logs.
//! Hooks run while the manager's table lock is held: they must return quickly and
//! must never call back into the manager.

use crate::locking::lock::Lock;
use crate::locking::lock_type::LockType;
use crate::locking::resource::ResourceName;
use crate::locking::transaction::TransactionId;
use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// The mutating manager entry point that produced a request event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerCall {
    Acquire,
    Release,
    Promote,
    AcquireAndRelease,
}

impl fmt::Display for ManagerCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ManagerCall::Acquire => "acquire",
            ManagerCall::Release => "release",
            ManagerCall::Promote => "promote",
            ManagerCall::AcquireAndRelease => "acquire-and-release",
        };
        f.write_str(label)
    }
}

/// Observer hooks for lock table events.
pub trait LockObserver: Send + Sync {
    /// A mutating call passed validation and is about to change the table.
    fn on_request(&self, _call: ManagerCall, _lock: &Lock, _releases: &[ResourceName]) {}

    fn on_granted(&self, _lock: &Lock) {}

    fn on_queued(&self, _lock: &Lock, _front: bool) {}

    fn on_released(&self, _lock: &Lock) {}

    fn on_woken(&self, _transaction: TransactionId) {}
}

/// Observer implementation that performs no work.
#[derive(Debug, Default)]
pub struct NoopLockObserver;

impl LockObserver for NoopLockObserver {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LockEvent {
    Request {
        call: ManagerCall,
        transaction: TransactionId,
        resource: ResourceName,
        lock_type: LockType,
        releases: Vec<ResourceName>,
    },
    Granted {
        transaction: TransactionId,
        resource: ResourceName,
        lock_type: LockType,
    },
    Queued {
        transaction: TransactionId,
        resource: ResourceName,
        lock_type: LockType,
        front: bool,
    },
    Released {
        transaction: TransactionId,
        resource: ResourceName,
        lock_type: LockType,
    },
    Woken {
        transaction: TransactionId,
    },
}

impl fmt::Display for LockEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockEvent::Request {
                call,
                transaction,
                resource,
                lock_type,
                releases,
            } => {
                write!(f, "{call} T{transaction} {resource} {lock_type}")?;
                if !releases.is_empty() {
                    let names: Vec<String> = releases.iter().map(ToString::to_string).collect();
                    write!(f, " [{}]", names.join(", "))?;
                }
                Ok(())
            }
            LockEvent::Granted {
                transaction,
                resource,
                lock_type,
            } => write!(f, "granted T{transaction} {lock_type}({resource})"),
            LockEvent::Queued {
                transaction,
                resource,
                lock_type,
                front,
            } => {
                let position = if *front { "front" } else { "back" };
                write!(f, "queued T{transaction} {lock_type}({resource}) at {position}")
            }
            LockEvent::Released {
                transaction,
                resource,
                lock_type,
            } => write!(f, "released T{transaction} {lock_type}({resource})"),
            LockEvent::Woken { transaction } => write!(f, "woke T{transaction}"),
        }
    }
}

/// Observer that keeps every event in memory, in the order the manager emitted them.
#[derive(Debug, Default)]
pub struct RecordingLockObserver {
    events: Mutex<Vec<LockEvent>>,
}

impl RecordingLockObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LockEvent> {
        self.guard().clone()
    }

    /// Only the request events, i.e. one entry per successful mutating manager call.
    pub fn requests(&self) -> Vec<LockEvent> {
        self.guard()
            .iter()
            .filter(|event| matches!(event, LockEvent::Request { .. }))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.guard().clear();
    }

    fn record(&self, event: LockEvent) {
        self.guard().push(event);
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, Vec<LockEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LockObserver for RecordingLockObserver {
    fn on_request(&self, call: ManagerCall, lock: &Lock, releases: &[ResourceName]) {
        self.record(LockEvent::Request {
            call,
            transaction: lock.transaction,
            resource: lock.name.clone(),
            lock_type: lock.lock_type,
            releases: releases.to_vec(),
        });
    }

    fn on_granted(&self, lock: &Lock) {
        self.record(LockEvent::Granted {
            transaction: lock.transaction,
            resource: lock.name.clone(),
            lock_type: lock.lock_type,
        });
    }

    fn on_queued(&self, lock: &Lock, front: bool) {
        self.record(LockEvent::Queued {
            transaction: lock.transaction,
            resource: lock.name.clone(),
            lock_type: lock.lock_type,
            front,
        });
    }

    fn on_released(&self, lock: &Lock) {
        self.record(LockEvent::Released {
            transaction: lock.transaction,
            resource: lock.name.clone(),
            lock_type: lock.lock_type,
        });
    }

    fn on_woken(&self, transaction: TransactionId) {
        self.record(LockEvent::Woken { transaction });
    }
}
