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

//! Resource-centric lock bookkeeping.
//!
//! The manager treats every resource as independent: it knows nothing about the
//! database/table/page hierarchy, so a request that is valid when each resource is
//! considered on its own is always accepted here even if it would break
//! multigranularity rules. Those rules live in [`LockContext`].
//!
//! Each resource owns a FIFO queue of requests that could not be granted. Whenever a
//! lock on the resource is released the queue is processed from the front until the
//! first request that still conflicts. With a queue of `S(A) X(A) S(A)` only the first
//! request leaves the queue.
//!
//! All state lives behind one mutex. Callers that have to wait are parked through
//! [`Transaction::block`](crate::locking::Transaction::block) only after that mutex
//! has been released, and wake-ups produced while draining a queue are delivered after
//! it has been released too.

use crate::error::{LockError, Result};
use crate::locking::context::{ContextNode, LockContext};
use crate::locking::lock::{Lock, LockRequest};
use crate::locking::lock_type::LockType;
use crate::locking::observer::{LockObserver, ManagerCall, NoopLockObserver};
use crate::locking::resource::{DATABASE_RESOURCE, ResourceName};
use crate::locking::transaction::{SharedTransaction, TransactionId};
use log::{debug, trace, warn};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct ResourceEntry {
    /// Granted locks in acquisition order.
    locks: Vec<Lock>,
    waiting: VecDeque<LockRequest>,
}

impl ResourceEntry {
    fn conflicts_with(&self, lock_type: LockType, transaction: TransactionId) -> bool {
        self.locks
            .iter()
            .any(|lock| lock.transaction != transaction && !lock.lock_type.compatible(lock_type))
    }
}

#[derive(Default)]
pub(crate) struct LockTable {
    transaction_locks: HashMap<TransactionId, Vec<Lock>>,
    resource_entries: HashMap<ResourceName, ResourceEntry>,
    /// Per context: how many locks each transaction holds strictly below it.
    child_lock_counts: HashMap<ResourceName, HashMap<TransactionId, usize>>,
}

impl LockTable {
    fn held_lock(&self, transaction: TransactionId, name: &ResourceName) -> Option<&Lock> {
        self.transaction_locks
            .get(&transaction)?
            .iter()
            .find(|lock| &lock.name == name)
    }
}

/// Outcome of a mutating call made under the table lock.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    Granted,
    Queued,
}

impl Disposition {
    /// Parks the caller when its request was queued. Must only be called once the
    /// table session has been dropped.
    pub(crate) fn wait(self, transaction: &SharedTransaction) {
        if self == Disposition::Queued {
            debug!(
                "Transaction {} waiting for queued lock request",
                transaction.transaction_id()
            );
            transaction.block();
        }
    }
}

/// Transactions to wake once the table lock is gone.
#[derive(Default)]
struct PendingWakeups(Vec<SharedTransaction>);

impl Drop for PendingWakeups {
    fn drop(&mut self) {
        for transaction in self.0.drain(..) {
            transaction.unblock();
        }
    }
}

/// Exclusive access to the lock table for the duration of one operation.
///
/// Fields drop in declaration order, so the table guard is released before any
/// pending wake-up is delivered.
pub(crate) struct TableSession<'a> {
    table: MutexGuard<'a, LockTable>,
    wakeups: PendingWakeups,
    observer: &'a dyn LockObserver,
}

impl TableSession<'_> {
    pub(crate) fn lock_type(&self, transaction: TransactionId, name: &ResourceName) -> LockType {
        self.table
            .held_lock(transaction, name)
            .map(|lock| lock.lock_type)
            .unwrap_or(LockType::NL)
    }

    pub(crate) fn locks_on(&self, name: &ResourceName) -> Vec<Lock> {
        self.table
            .resource_entries
            .get(name)
            .map(|entry| entry.locks.clone())
            .unwrap_or_default()
    }

    pub(crate) fn locks_held_by(&self, transaction: TransactionId) -> Vec<Lock> {
        self.table
            .transaction_locks
            .get(&transaction)
            .cloned()
            .unwrap_or_default()
    }

    fn queue_len(&self, name: &ResourceName) -> usize {
        self.table
            .resource_entries
            .get(name)
            .map(|entry| entry.waiting.len())
            .unwrap_or(0)
    }

    pub(crate) fn acquire(
        &mut self,
        transaction: &SharedTransaction,
        name: &ResourceName,
        lock_type: LockType,
    ) -> Result<Disposition> {
        let id = transaction.transaction_id();
        if self.table.held_lock(id, name).is_some() {
            return Err(LockError::duplicate(id, name));
        }

        let lock = Lock::new(name.clone(), lock_type, id);
        self.observer.on_request(ManagerCall::Acquire, &lock, &[]);

        let entry = self.table.resource_entries.entry(name.clone()).or_default();
        if entry.conflicts_with(lock_type, id) || !entry.waiting.is_empty() {
            debug!(
                "Queueing {lock} behind {} waiting request(s)",
                entry.waiting.len()
            );
            entry
                .waiting
                .push_back(LockRequest::new(transaction.clone(), lock.clone()));
            self.observer.on_queued(&lock, false);
            return Ok(Disposition::Queued);
        }

        self.install(lock);
        Ok(Disposition::Granted)
    }

    pub(crate) fn release(&mut self, transaction: TransactionId, name: &ResourceName) -> Result<()> {
        let held = self
            .table
            .held_lock(transaction, name)
            .cloned()
            .ok_or_else(|| LockError::no_lock(transaction, name))?;
        self.observer.on_request(ManagerCall::Release, &held, &[]);
        self.release_held(transaction, name)
    }

    pub(crate) fn acquire_and_release(
        &mut self,
        transaction: &SharedTransaction,
        name: &ResourceName,
        lock_type: LockType,
        release_names: &[ResourceName],
    ) -> Result<Disposition> {
        let id = transaction.transaction_id();
        if self.table.held_lock(id, name).is_some() && !release_names.contains(name) {
            return Err(LockError::duplicate(id, name));
        }

        let mut releases: Vec<Lock> = Vec::with_capacity(release_names.len());
        for release_name in release_names {
            if releases.iter().any(|lock| &lock.name == release_name) {
                continue;
            }
            let held = self
                .table
                .held_lock(id, release_name)
                .ok_or_else(|| LockError::no_lock(id, release_name))?;
            releases.push(held.clone());
        }

        let lock = Lock::new(name.clone(), lock_type, id);
        self.observer
            .on_request(ManagerCall::AcquireAndRelease, &lock, release_names);
        self.grant_or_queue_front(transaction, lock, releases)
    }

    pub(crate) fn promote(
        &mut self,
        transaction: &SharedTransaction,
        name: &ResourceName,
        new_type: LockType,
    ) -> Result<Disposition> {
        let id = transaction.transaction_id();
        let held = self
            .table
            .held_lock(id, name)
            .cloned()
            .ok_or_else(|| LockError::no_lock(id, name))?;

        if held.lock_type == new_type {
            return Err(LockError::duplicate(id, name));
        }
        if !new_type.substitutable(held.lock_type) {
            return Err(LockError::InvalidLock(format!(
                "cannot promote {} to {new_type} on '{name}': {new_type} is not a substitute \
                 for {}",
                held.lock_type, held.lock_type
            )));
        }

        let lock = Lock::new(name.clone(), new_type, id);
        self.observer
            .on_request(ManagerCall::Promote, &lock, std::slice::from_ref(name));
        self.grant_or_queue_front(transaction, lock, vec![held])
    }

    /// Shared tail of promotions and acquire-and-release calls: grant right away when
    /// nothing conflicts, otherwise jump the queue.
    fn grant_or_queue_front(
        &mut self,
        transaction: &SharedTransaction,
        lock: Lock,
        releases: Vec<Lock>,
    ) -> Result<Disposition> {
        let entry = self
            .table
            .resource_entries
            .entry(lock.name.clone())
            .or_default();
        if entry.conflicts_with(lock.lock_type, lock.transaction) {
            debug!("Queueing {lock} at the front of its queue");
            entry.waiting.push_front(LockRequest::with_releases(
                transaction.clone(),
                lock.clone(),
                releases,
            ));
            self.observer.on_queued(&lock, true);
            return Ok(Disposition::Queued);
        }

        let transaction_id = lock.transaction;
        let target = lock.name.clone();
        self.install(lock);
        for released in releases.iter().filter(|held| held.name != target) {
            self.release_held(transaction_id, &released.name)?;
        }
        if releases.iter().any(|held| held.name == target) {
            // A replacement may have weakened the lock on the target.
            self.process_queue(&target);
        }
        Ok(Disposition::Granted)
    }

    /// Grants `lock`, replacing the owner's existing lock on the same resource in place
    /// so that an upgrade keeps its original acquisition position.
    fn install(&mut self, lock: Lock) {
        let table = &mut *self.table;
        let mut replaced = false;
        if let Some(held) = table
            .transaction_locks
            .get_mut(&lock.transaction)
            .and_then(|locks| locks.iter_mut().find(|held| held.name == lock.name))
        {
            held.lock_type = lock.lock_type;
            replaced = true;
        }

        let entry = table.resource_entries.entry(lock.name.clone()).or_default();
        if replaced {
            if let Some(held) = entry
                .locks
                .iter_mut()
                .find(|held| held.transaction == lock.transaction)
            {
                held.lock_type = lock.lock_type;
            }
            debug!("Upgraded in place: {lock}");
        } else {
            entry.locks.push(lock.clone());
            table
                .transaction_locks
                .entry(lock.transaction)
                .or_default()
                .push(lock.clone());
            debug!("Granted {lock}");
        }
        self.observer.on_granted(&lock);
    }

    fn release_held(&mut self, transaction: TransactionId, name: &ResourceName) -> Result<()> {
        let table = &mut *self.table;
        let position = table
            .transaction_locks
            .get(&transaction)
            .and_then(|locks| locks.iter().position(|lock| &lock.name == name))
            .ok_or_else(|| LockError::no_lock(transaction, name))?;
        let lock = match table.transaction_locks.get_mut(&transaction) {
            Some(locks) => locks.remove(position),
            None => return Err(LockError::no_lock(transaction, name)),
        };
        if let Some(entry) = table.resource_entries.get_mut(name) {
            entry.locks.retain(|held| held.transaction != transaction);
        }

        debug!("Released {lock}");
        self.observer.on_released(&lock);
        self.process_queue(name);
        Ok(())
    }

    /// Grants queued requests from the front until one conflicts.
    fn process_queue(&mut self, name: &ResourceName) {
        loop {
            let Some(entry) = self.table.resource_entries.get_mut(name) else {
                return;
            };
            let Some(head) = entry.waiting.front() else {
                return;
            };
            if entry.conflicts_with(head.lock.lock_type, head.lock.transaction) {
                trace!(
                    "Queue head {} on '{name}' still conflicts; {} request(s) keep waiting",
                    head.lock,
                    entry.waiting.len()
                );
                return;
            }
            let Some(request) = entry.waiting.pop_front() else {
                return;
            };
            self.grant_request(request);
        }
    }

    fn grant_request(&mut self, request: LockRequest) {
        let LockRequest {
            transaction,
            lock,
            releases,
        } = request;
        let transaction_id = lock.transaction;
        let target = lock.name.clone();

        trace!("Granting queued request {lock}");
        self.install(lock);
        for released in releases.iter().filter(|held| held.name != target) {
            if let Err(err) = self.release_held(transaction_id, &released.name) {
                warn!("Skipping release of {released} for queued request: {err}");
            }
        }

        debug!("Waking transaction {transaction_id}");
        self.observer.on_woken(transaction_id);
        self.wakeups.0.push(transaction);
    }

    pub(crate) fn child_lock_count(&self, name: &ResourceName, transaction: TransactionId) -> usize {
        self.table
            .child_lock_counts
            .get(name)
            .and_then(|counts| counts.get(&transaction))
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn increment_child_locks(&mut self, name: &ResourceName, transaction: TransactionId) {
        *self
            .table
            .child_lock_counts
            .entry(name.clone())
            .or_default()
            .entry(transaction)
            .or_insert(0) += 1;
    }

    pub(crate) fn decrement_child_locks(&mut self, name: &ResourceName, transaction: TransactionId) {
        if let Some(count) = self
            .table
            .child_lock_counts
            .get_mut(name)
            .and_then(|counts| counts.get_mut(&transaction))
        {
            *count = count.saturating_sub(1);
        }
    }

    /// Zeroes the counters of `name` and every context below it for `transaction`.
    pub(crate) fn clear_child_locks(&mut self, name: &ResourceName, transaction: TransactionId) {
        for (context, counts) in self.table.child_lock_counts.iter_mut() {
            if context == name || context.is_descendant_of(name) {
                counts.remove(&transaction);
            }
        }
    }
}

struct ManagerCore {
    table: Mutex<LockTable>,
    contexts: Mutex<HashMap<ResourceName, Arc<ContextNode>>>,
    observer: Arc<dyn LockObserver>,
}

/// Bookkeeping for which transactions hold which locks on which resources.
///
/// Code should generally go through [`LockContext`] (or
/// [`ensure_sufficient_lock_held`](crate::locking::ensure_sufficient_lock_held)) instead
/// of calling the manager directly; the manager does not enforce multigranularity
/// rules. Cloning is cheap and every clone shares the same table.
#[derive(Clone)]
pub struct LockManager {
    core: Arc<ManagerCore>,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self::with_observer(Arc::new(NoopLockObserver))
    }

    pub fn with_observer(observer: Arc<dyn LockObserver>) -> Self {
        Self {
            core: Arc::new(ManagerCore {
                table: Mutex::new(LockTable::default()),
                contexts: Mutex::new(HashMap::new()),
                observer,
            }),
        }
    }

    pub(crate) fn session(&self) -> TableSession<'_> {
        TableSession {
            table: self
                .core
                .table
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            wakeups: PendingWakeups::default(),
            observer: self.core.observer.as_ref(),
        }
    }

    /// Acquires a `lock_type` lock on `name`.
    ///
    /// The request waits at the back of the resource queue when it conflicts with
    /// another transaction's lock or when other requests are already waiting.
    pub fn acquire(
        &self,
        transaction: &SharedTransaction,
        name: &ResourceName,
        lock_type: LockType,
    ) -> Result<()> {
        let disposition = self.session().acquire(transaction, name, lock_type)?;
        disposition.wait(transaction);
        Ok(())
    }

    /// Releases the transaction's lock on `name` and processes the resource queue.
    pub fn release(&self, transaction: &SharedTransaction, name: &ResourceName) -> Result<()> {
        self.session().release(transaction.transaction_id(), name)
    }

    /// Acquires a lock on `name` and then releases every lock in `release_names`, as
    /// one atomic step.
    ///
    /// When the new lock conflicts the combined request goes to the **front** of the
    /// queue. Replacing an existing lock on `name` keeps its acquisition position: with
    /// `S(A), X(B)` held, acquiring `X(A)` while releasing `A` still counts the lock on
    /// `A` as acquired before the lock on `B`.
    pub fn acquire_and_release(
        &self,
        transaction: &SharedTransaction,
        name: &ResourceName,
        lock_type: LockType,
        release_names: &[ResourceName],
    ) -> Result<()> {
        let disposition =
            self.session()
                .acquire_and_release(transaction, name, lock_type, release_names)?;
        disposition.wait(transaction);
        Ok(())
    }

    /// Upgrades the transaction's lock on `name` to `new_type`, which must be a
    /// different, substitutable lock type. Conflicting promotions queue at the front.
    pub fn promote(
        &self,
        transaction: &SharedTransaction,
        name: &ResourceName,
        new_type: LockType,
    ) -> Result<()> {
        let disposition = self.session().promote(transaction, name, new_type)?;
        disposition.wait(transaction);
        Ok(())
    }

    /// Type of lock held on `name`, or `NL`.
    pub fn lock_type(&self, transaction: &SharedTransaction, name: &ResourceName) -> LockType {
        self.session().lock_type(transaction.transaction_id(), name)
    }

    /// Locks granted on `name`, in acquisition order.
    pub fn locks_on(&self, name: &ResourceName) -> Vec<Lock> {
        self.session().locks_on(name)
    }

    /// Locks held by the transaction, in acquisition order.
    pub fn locks_held_by(&self, transaction: &SharedTransaction) -> Vec<Lock> {
        self.session().locks_held_by(transaction.transaction_id())
    }

    /// Every granted lock, grouped by transaction id in ascending order.
    pub fn all_locks(&self) -> Vec<Lock> {
        let session = self.session();
        let mut transactions: Vec<&TransactionId> =
            session.table.transaction_locks.keys().collect();
        transactions.sort();
        transactions
            .into_iter()
            .flat_map(|id| session.table.transaction_locks[id].iter().cloned())
            .collect()
    }

    pub fn queue_len(&self, name: &ResourceName) -> usize {
        self.session().queue_len(name)
    }

    /// The context for the `database` resource, created on first use.
    pub fn database_context(&self) -> LockContext {
        self.root_context(ResourceName::database())
    }

    /// A parentless context for `name`. The name `database` is reserved.
    pub fn orphan_context(&self, name: &str) -> Result<LockContext> {
        if name == DATABASE_RESOURCE {
            return Err(LockError::InvalidResourceName(format!(
                "cannot create orphan context named '{DATABASE_RESOURCE}'"
            )));
        }
        Ok(self.root_context(ResourceName::root(name)?))
    }

    /// Resolves the context for a fully qualified name, creating every context on the
    /// way down from the root.
    pub fn context_for(&self, name: &ResourceName) -> Result<LockContext> {
        let mut segments = name.segments().iter();
        let mut context = match segments.next().map(String::as_str) {
            Some(DATABASE_RESOURCE) => self.database_context(),
            Some(root) => self.orphan_context(root)?,
            None => {
                return Err(LockError::InvalidResourceName(
                    "resource name has no segments".to_string(),
                ));
            }
        };
        for segment in segments {
            context = context.child_context(segment)?;
        }
        Ok(context)
    }

    fn root_context(&self, name: ResourceName) -> LockContext {
        let node = self.context_node(&name, || ContextNode::new(name.clone(), None, false));
        LockContext::new(self.clone(), node)
    }

    /// Looks up the node for `name`, inserting the one built by `create` if absent.
    /// `create` runs under the registry lock, so at most one node exists per name.
    pub(crate) fn context_node(
        &self,
        name: &ResourceName,
        create: impl FnOnce() -> ContextNode,
    ) -> Arc<ContextNode> {
        let mut contexts = self
            .core
            .contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        contexts
            .entry(name.clone())
            .or_insert_with(|| Arc::new(create()))
            .clone()
    }

    pub(crate) fn existing_context_node(&self, name: &ResourceName) -> Option<Arc<ContextNode>> {
        self.core
            .contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self.session();
        f.debug_struct("LockManager")
            .field("transactions", &session.table.transaction_locks.len())
            .field("resources", &session.table.resource_entries.len())
            .finish()
    }
}
