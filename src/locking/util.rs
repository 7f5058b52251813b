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

use crate::error::{LockError, Result};
use crate::locking::context::LockContext;
use crate::locking::lock_type::LockType;
use crate::locking::transaction::SharedTransaction;
use log::debug;

/// Makes sure `transaction` can perform `lock_type` (`S` or `X`) work on `context`,
/// taking as few new locks as it can.
///
/// Intention locks are taken on every ancestor that needs one, the lock here is
/// acquired or promoted, and an invalid promotion falls back to escalating the
/// subtree. Calling this again once the lock is held does nothing. Passing no
/// transaction is a no-op.
pub fn ensure_sufficient_lock_held(
    transaction: Option<&SharedTransaction>,
    context: &LockContext,
    lock_type: LockType,
) -> Result<()> {
    let Some(transaction) = transaction else {
        return Ok(());
    };

    loop {
        if context.effective_lock_type(transaction).substitutable(lock_type) {
            return Ok(());
        }

        if let Some(parent) = context.parent_context() {
            ensure_sufficient_lock_held(Some(transaction), &parent, lock_type.parent_lock())?;
        }

        let explicit = context.explicit_lock_type(transaction);
        if explicit == LockType::NL {
            debug!("Acquiring {lock_type} on {context}");
            return context.acquire(transaction, lock_type);
        }

        match context.promote(transaction, lock_type) {
            Ok(()) => return Ok(()),
            Err(LockError::InvalidLock(reason)) => {
                debug!("Cannot promote {explicit} on {context} ({reason}); escalating");
                context.escalate(transaction)?;
                if context.explicit_lock_type(transaction) == explicit {
                    // Escalating a lone S lock leaves it as is. SIX covers both S and
                    // the intention lock being asked for.
                    debug!("Promoting {explicit} on {context} to SIX");
                    context.promote(transaction, LockType::SIX)?;
                }
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locking::manager::LockManager;
    use crate::locking::observer::RecordingLockObserver;
    use crate::test::fixtures::{lock_summary, transaction};
    use std::sync::Arc;

    #[test]
    fn none_transaction_is_noop() {
        let manager = LockManager::new();
        let page = manager
            .database_context()
            .child_context("t1")
            .unwrap()
            .child_context("p1")
            .unwrap();

        ensure_sufficient_lock_held(None, &page, LockType::X).unwrap();
        assert!(manager.all_locks().is_empty());
    }

    #[test]
    fn acquires_intention_locks_top_down() {
        let manager = LockManager::new();
        let t1 = transaction(1);
        let page = manager.context_for(&"database/t1/p1".parse().unwrap()).unwrap();

        ensure_sufficient_lock_held(Some(&t1), &page, LockType::X).unwrap();

        assert_eq!(
            lock_summary(&manager.locks_held_by(&t1)),
            vec!["T1: IX(database)", "T1: IX(database/t1)", "T1: X(database/t1/p1)"]
        );
    }

    #[test]
    fn second_call_makes_no_manager_calls() {
        let observer = Arc::new(RecordingLockObserver::new());
        let manager = LockManager::with_observer(observer.clone());
        let t1 = transaction(1);
        let page = manager.context_for(&"database/t1/p1".parse().unwrap()).unwrap();

        ensure_sufficient_lock_held(Some(&t1), &page, LockType::S).unwrap();
        observer.clear();
        ensure_sufficient_lock_held(Some(&t1), &page, LockType::S).unwrap();

        assert!(observer.requests().is_empty());
    }

    #[test]
    fn promotes_shared_page_to_exclusive() {
        let manager = LockManager::new();
        let t1 = transaction(1);
        let page = manager.context_for(&"database/t1/p1".parse().unwrap()).unwrap();

        ensure_sufficient_lock_held(Some(&t1), &page, LockType::S).unwrap();
        ensure_sufficient_lock_held(Some(&t1), &page, LockType::X).unwrap();

        assert_eq!(
            lock_summary(&manager.locks_held_by(&t1)),
            vec!["T1: IX(database)", "T1: IX(database/t1)", "T1: X(database/t1/p1)"]
        );
    }

    #[test]
    fn shared_table_becomes_six_for_exclusive_page() {
        let manager = LockManager::new();
        let t1 = transaction(1);
        let table = manager.context_for(&"database/t1".parse().unwrap()).unwrap();
        let page = table.child_context("p4").unwrap();

        ensure_sufficient_lock_held(Some(&t1), &table, LockType::S).unwrap();
        ensure_sufficient_lock_held(Some(&t1), &page, LockType::X).unwrap();

        assert_eq!(
            lock_summary(&manager.locks_held_by(&t1)),
            vec!["T1: IX(database)", "T1: SIX(database/t1)", "T1: X(database/t1/p4)"]
        );
    }

    #[test]
    fn intent_table_is_escalated_before_exclusive_promotion() {
        let manager = LockManager::new();
        let t1 = transaction(1);
        let table = manager.context_for(&"database/t1".parse().unwrap()).unwrap();
        let page = table.child_context("p0").unwrap();

        ensure_sufficient_lock_held(Some(&t1), &page, LockType::S).unwrap();
        ensure_sufficient_lock_held(Some(&t1), &table, LockType::X).unwrap();

        assert_eq!(
            lock_summary(&manager.locks_held_by(&t1)),
            vec!["T1: IX(database)", "T1: X(database/t1)"]
        );
        assert_eq!(table.num_child_locks(&t1), 0);
    }
}
