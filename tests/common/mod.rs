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

#![allow(dead_code)]

use mglock::config::RunnerConfig;
use mglock::error::Result;
use mglock::locking::{
    Lock, LockContext, LockManager, LockType, ResourceName, SharedTransaction, TransactionHandle,
};
use std::sync::Arc;

pub fn runner_config() -> RunnerConfig {
    RunnerConfig {
        step_timeout_ms: 2000,
        poll_interval_ms: 1,
    }
}

pub fn handles(count: u64) -> Vec<Arc<TransactionHandle>> {
    (1..=count).map(TransactionHandle::shared).collect()
}

pub fn shared(handle: &Arc<TransactionHandle>) -> SharedTransaction {
    handle.clone()
}

pub fn name(path: &str) -> ResourceName {
    path.parse().unwrap()
}

pub fn summary(locks: &[Lock]) -> Vec<String> {
    locks.iter().map(ToString::to_string).collect()
}

/// Task that acquires `lock_type` on `resource` straight through the manager.
pub fn acquire(
    manager: &LockManager,
    handle: &Arc<TransactionHandle>,
    resource: &str,
    lock_type: LockType,
) -> impl FnOnce() -> Result<()> + Send + 'static {
    let manager = manager.clone();
    let transaction = shared(handle);
    let resource = name(resource);
    move || manager.acquire(&transaction, &resource, lock_type)
}

pub fn release(
    manager: &LockManager,
    handle: &Arc<TransactionHandle>,
    resource: &str,
) -> impl FnOnce() -> Result<()> + Send + 'static {
    let manager = manager.clone();
    let transaction = shared(handle);
    let resource = name(resource);
    move || manager.release(&transaction, &resource)
}

pub fn promote(
    manager: &LockManager,
    handle: &Arc<TransactionHandle>,
    resource: &str,
    lock_type: LockType,
) -> impl FnOnce() -> Result<()> + Send + 'static {
    let manager = manager.clone();
    let transaction = shared(handle);
    let resource = name(resource);
    move || manager.promote(&transaction, &resource, lock_type)
}

/// Task that acquires `lock_type` on `context` with the hierarchy checks applied.
pub fn context_acquire(
    context: &LockContext,
    handle: &Arc<TransactionHandle>,
    lock_type: LockType,
) -> impl FnOnce() -> Result<()> + Send + 'static {
    let context = context.clone();
    let transaction = shared(handle);
    move || context.acquire(&transaction, lock_type)
}
