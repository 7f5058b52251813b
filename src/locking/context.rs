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

//! Hierarchy-aware locking on top of [`LockManager`].
//!
//! A [`LockContext`] is one node of the resource tree (`database`, a table, a page).
//! It checks the multigranularity rules before handing a request to the manager and
//! keeps track of how many locks each transaction holds directly below it. The
//! counters live in the manager's lock table and change in the same critical section
//! as the lock they describe.

use crate::error::{LockError, Result};
use crate::locking::lock::Lock;
use crate::locking::lock_type::LockType;
use crate::locking::manager::LockManager;
use crate::locking::resource::ResourceName;
use crate::locking::transaction::SharedTransaction;
use log::{debug, info};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Shared per-resource state. One node exists per name for the lifetime of the
/// manager.
#[derive(Debug)]
pub(crate) struct ContextNode {
    name: ResourceName,
    parent: Option<ResourceName>,
    readonly: bool,
    child_locks_disabled: AtomicBool,
    /// Explicit capacity; zero means "number of child contexts".
    capacity: AtomicUsize,
    children: AtomicUsize,
}

impl ContextNode {
    pub(crate) fn new(name: ResourceName, parent: Option<ResourceName>, readonly: bool) -> Self {
        Self {
            name,
            parent,
            readonly,
            child_locks_disabled: AtomicBool::new(readonly),
            capacity: AtomicUsize::new(0),
            children: AtomicUsize::new(0),
        }
    }
}

/// Handle to a node of the resource hierarchy.
///
/// Handles are cheap to clone; every handle for the same name shares one node.
#[derive(Clone)]
pub struct LockContext {
    manager: LockManager,
    node: Arc<ContextNode>,
}

impl LockContext {
    pub(crate) fn new(manager: LockManager, node: Arc<ContextNode>) -> Self {
        Self { manager, node }
    }

    pub fn name(&self) -> &ResourceName {
        &self.node.name
    }

    pub fn is_readonly(&self) -> bool {
        self.node.readonly
    }

    pub fn child_locks_disabled(&self) -> bool {
        self.node.child_locks_disabled.load(Ordering::SeqCst)
    }

    /// True when both handles refer to the same node.
    pub fn same_node(&self, other: &LockContext) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    fn ensure_writable(&self, operation: &str) -> Result<()> {
        if self.node.readonly {
            return Err(LockError::disallowed(operation, &self.node.name));
        }
        Ok(())
    }

    /// Acquires a `lock_type` lock on this resource.
    ///
    /// The parent context must already hold, explicitly, `lock_type.parent_lock()` or
    /// something substitutable for it. May block like [`LockManager::acquire`].
    pub fn acquire(&self, transaction: &SharedTransaction, lock_type: LockType) -> Result<()> {
        self.ensure_writable("acquire")?;
        let id = transaction.transaction_id();

        let mut session = self.manager.session();
        if let Some(parent) = &self.node.parent {
            let required = lock_type.parent_lock();
            let held = session.lock_type(id, parent);
            if !held.substitutable(required) {
                return Err(LockError::InvalidLock(format!(
                    "{lock_type} on '{}' requires {required} on '{parent}', but transaction \
                     {id} holds {held} there",
                    self.node.name
                )));
            }
        }

        let disposition = session.acquire(transaction, &self.node.name, lock_type)?;
        if let Some(parent) = &self.node.parent {
            session.increment_child_locks(parent, id);
        }
        drop(session);

        disposition.wait(transaction);
        Ok(())
    }

    /// Releases this transaction's lock on the resource. Locks below it must be
    /// released first.
    pub fn release(&self, transaction: &SharedTransaction) -> Result<()> {
        self.ensure_writable("release")?;
        let id = transaction.transaction_id();

        let mut session = self.manager.session();
        let below = session.child_lock_count(&self.node.name, id);
        if below > 0 {
            return Err(LockError::InvalidLock(format!(
                "transaction {id} still holds {below} lock(s) below '{}'",
                self.node.name
            )));
        }

        session.release(id, &self.node.name)?;
        if let Some(parent) = &self.node.parent {
            session.decrement_child_locks(parent, id);
        }
        Ok(())
    }

    /// Promotes the held lock to `new_type`; see [`LockManager::promote`].
    pub fn promote(&self, transaction: &SharedTransaction, new_type: LockType) -> Result<()> {
        self.ensure_writable("promote")?;
        let disposition = self
            .manager
            .session()
            .promote(transaction, &self.node.name, new_type)?;
        disposition.wait(transaction);
        Ok(())
    }

    /// Replaces every lock the transaction holds at and below this resource with a
    /// single `S` or `X` lock here.
    ///
    /// The result is `X` when any of the replaced locks is `IX`, `X` or `SIX`, and `S`
    /// otherwise. The swap is one manager call, so no other transaction can observe a
    /// half-escalated state. Escalating twice in a row makes no further manager call.
    pub fn escalate(&self, transaction: &SharedTransaction) -> Result<()> {
        if self.node.readonly || self.child_locks_disabled() {
            return Err(LockError::disallowed("escalate", &self.node.name));
        }
        let id = transaction.transaction_id();
        let name = &self.node.name;

        let mut session = self.manager.session();
        let covered: Vec<Lock> = session
            .locks_held_by(id)
            .into_iter()
            .filter(|lock| &lock.name == name || lock.name.is_descendant_of(name))
            .collect();
        if covered.is_empty() {
            return Err(LockError::no_lock(id, name));
        }

        let target = if covered
            .iter()
            .any(|lock| matches!(lock.lock_type, LockType::IX | LockType::X | LockType::SIX))
        {
            LockType::X
        } else {
            LockType::S
        };
        let here = session.lock_type(id, name);
        if here == target && covered.len() == 1 {
            debug!("Transaction {id} already holds {target} on '{name}' with nothing below");
            return Ok(());
        }

        let releases: Vec<ResourceName> = covered.into_iter().map(|lock| lock.name).collect();
        let disposition = session.acquire_and_release(transaction, name, target, &releases)?;
        session.clear_child_locks(name, id);
        if here == LockType::NL {
            if let Some(parent) = &self.node.parent {
                session.increment_child_locks(parent, id);
            }
        }
        drop(session);

        info!(
            "Escalated {} lock(s) of transaction {id} into {target}({name})",
            releases.len()
        );
        disposition.wait(transaction);
        Ok(())
    }

    /// The lock type actually granted here, including implicit locks inherited from
    /// ancestors: `S` and `X` cover the subtree, `SIX` covers it with `S`, and intent
    /// locks grant nothing below themselves.
    pub fn effective_lock_type(&self, transaction: &SharedTransaction) -> LockType {
        let id = transaction.transaction_id();
        let session = self.manager.session();
        let explicit = session.lock_type(id, &self.node.name);
        if explicit != LockType::NL {
            return explicit;
        }

        let mut ancestor = self.node.parent.clone();
        while let Some(name) = ancestor {
            match session.lock_type(id, &name) {
                LockType::NL => ancestor = name.parent(),
                LockType::IS | LockType::IX => return LockType::NL,
                LockType::SIX => return LockType::S,
                inherited => return inherited,
            }
        }
        LockType::NL
    }

    /// The lock type held directly on this resource, or `NL`.
    pub fn explicit_lock_type(&self, transaction: &SharedTransaction) -> LockType {
        self.manager.lock_type(transaction, &self.node.name)
    }

    /// Marks every child created from now on readonly. Used for indices and temporary
    /// tables where fine-grained locking is not wanted.
    pub fn disable_child_locks(&self) {
        self.node.child_locks_disabled.store(true, Ordering::SeqCst);
    }

    pub fn parent_context(&self) -> Option<LockContext> {
        let parent = self.node.parent.as_ref()?;
        self.manager
            .existing_context_node(parent)
            .map(|node| LockContext::new(self.manager.clone(), node))
    }

    /// Gets or creates the child context named `segment`.
    pub fn child_context(&self, segment: &str) -> Result<LockContext> {
        let child_name = self.node.name.child(segment)?;
        let readonly = self.node.readonly || self.child_locks_disabled();
        let node = self.manager.context_node(&child_name, || {
            self.node.children.fetch_add(1, Ordering::SeqCst);
            ContextNode::new(child_name.clone(), Some(self.node.name.clone()), readonly)
        });
        Ok(LockContext::new(self.manager.clone(), node))
    }

    /// Number of children, or the explicit value set through [`Self::set_capacity`].
    pub fn capacity(&self) -> usize {
        match self.node.capacity.load(Ordering::SeqCst) {
            0 => self.node.children.load(Ordering::SeqCst),
            explicit => explicit,
        }
    }

    pub fn set_capacity(&self, capacity: usize) {
        self.node.capacity.store(capacity, Ordering::SeqCst);
    }

    /// Fraction of this resource's children the transaction holds locks on.
    pub fn saturation(&self, transaction: &SharedTransaction) -> f64 {
        let capacity = self.capacity();
        if capacity == 0 {
            return 0.0;
        }
        self.num_child_locks(transaction) as f64 / capacity as f64
    }

    /// Locks the transaction holds on direct children of this resource.
    pub fn num_child_locks(&self, transaction: &SharedTransaction) -> usize {
        self.manager
            .session()
            .child_lock_count(&self.node.name, transaction.transaction_id())
    }
}

impl fmt::Display for LockContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LockContext({})", self.node.name)
    }
}

impl fmt::Debug for LockContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockContext")
            .field("name", &self.node.name)
            .field("readonly", &self.node.readonly)
            .field("child_locks_disabled", &self.child_locks_disabled())
            .finish()
    }
}
