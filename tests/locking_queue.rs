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

mod common;

use common::{acquire, handles, name, promote, release, runner_config, shared, summary};
use mglock::error::LockError;
use mglock::locking::{LockEvent, LockManager, LockType, RecordingLockObserver};
use mglock::runner::DeterministicRunner;
use std::sync::Arc;

#[test]
fn queue_drains_in_order_and_stops_at_first_conflict() {
    let txns = handles(4);
    let manager = LockManager::new();
    let mut runner = DeterministicRunner::new(txns.clone(), &runner_config()).unwrap();

    assert!(runner.run(0, acquire(&manager, &txns[0], "A", LockType::X)).unwrap().is_ok());
    assert!(runner.run(1, acquire(&manager, &txns[1], "A", LockType::S)).unwrap().is_blocked());
    assert!(runner.run(2, acquire(&manager, &txns[2], "A", LockType::X)).unwrap().is_blocked());
    // Compatible with nothing granted yet, but it still waits its turn.
    assert!(runner.run(3, acquire(&manager, &txns[3], "A", LockType::S)).unwrap().is_blocked());
    assert_eq!(manager.queue_len(&name("A")), 3);

    assert!(runner.run(0, release(&manager, &txns[0], "A")).unwrap().is_ok());
    let woken = runner.collect_woken();
    assert_eq!(woken.len(), 1);
    assert_eq!(woken[0].0, 2);
    assert_eq!(summary(&manager.locks_on(&name("A"))), vec!["T2: S(A)"]);
    assert!(runner.is_blocked(2));
    assert!(runner.is_blocked(3));

    assert!(runner.run(1, release(&manager, &txns[1], "A")).unwrap().is_ok());
    assert_eq!(summary(&manager.locks_on(&name("A"))), vec!["T3: X(A)"]);
    assert!(runner.is_blocked(3));

    assert!(runner.run(2, release(&manager, &txns[2], "A")).unwrap().is_ok());
    assert_eq!(summary(&manager.locks_on(&name("A"))), vec!["T4: S(A)"]);
    assert_eq!(manager.queue_len(&name("A")), 0);

    let finished = runner.join().unwrap();
    assert!(finished.iter().all(|(_, result)| result.is_ok()));
}

#[test]
fn promotion_jumps_queue_and_keeps_acquisition_order() {
    let txns = handles(3);
    let manager = LockManager::new();
    let mut runner = DeterministicRunner::new(txns.clone(), &runner_config()).unwrap();

    runner.run(0, acquire(&manager, &txns[0], "A", LockType::S)).unwrap();
    runner.run(0, acquire(&manager, &txns[0], "B", LockType::S)).unwrap();
    runner.run(1, acquire(&manager, &txns[1], "A", LockType::S)).unwrap();
    assert!(runner.run(2, acquire(&manager, &txns[2], "A", LockType::X)).unwrap().is_blocked());

    assert!(runner.run(0, promote(&manager, &txns[0], "A", LockType::X)).unwrap().is_blocked());
    assert_eq!(manager.queue_len(&name("A")), 2);

    runner.run(1, release(&manager, &txns[1], "A")).unwrap();
    let woken = runner.collect_woken();
    assert_eq!(woken.len(), 1);
    assert_eq!(woken[0].0, 1);

    assert_eq!(
        summary(&manager.locks_held_by(&shared(&txns[0]))),
        vec!["T1: X(A)", "T1: S(B)"]
    );
    assert!(runner.is_blocked(2));

    runner.run(0, release(&manager, &txns[0], "A")).unwrap();
    assert_eq!(summary(&manager.locks_on(&name("A"))), vec!["T3: X(A)"]);
    runner.join().unwrap();
}

#[test]
fn acquire_and_release_goes_to_front_and_releases_after_grant() {
    let txns = handles(3);
    let observer = Arc::new(RecordingLockObserver::new());
    let manager = LockManager::with_observer(observer.clone());
    let mut runner = DeterministicRunner::new(txns.clone(), &runner_config()).unwrap();

    runner.run(0, acquire(&manager, &txns[0], "A", LockType::X)).unwrap();
    runner.run(1, acquire(&manager, &txns[1], "B", LockType::X)).unwrap();
    assert!(runner.run(2, acquire(&manager, &txns[2], "A", LockType::S)).unwrap().is_blocked());

    let swap = {
        let manager = manager.clone();
        let transaction = shared(&txns[1]);
        move || manager.acquire_and_release(&transaction, &name("A"), LockType::X, &[name("B")])
    };
    assert!(runner.run(1, swap).unwrap().is_blocked());
    // B stays held while the swap waits.
    assert_eq!(summary(&manager.locks_on(&name("B"))), vec!["T2: X(B)"]);

    runner.run(0, release(&manager, &txns[0], "A")).unwrap();

    assert_eq!(summary(&manager.locks_on(&name("A"))), vec!["T2: X(A)"]);
    assert!(manager.locks_on(&name("B")).is_empty());
    assert!(runner.is_blocked(2));
    assert!(observer.events().contains(&LockEvent::Woken { transaction: 2 }));

    runner.run(1, release(&manager, &txns[1], "A")).unwrap();
    assert_eq!(summary(&manager.locks_on(&name("A"))), vec!["T3: S(A)"]);
    runner.join().unwrap();
}

#[test]
fn failing_calls_leave_state_untouched() {
    let manager = LockManager::new();
    let t1 = common::shared(&handles(1)[0]);
    let a = name("database/t1");

    manager.acquire(&t1, &a, LockType::S).unwrap();
    let before = manager.all_locks();

    assert!(matches!(
        manager.acquire(&t1, &a, LockType::S),
        Err(LockError::DuplicateLockRequest { .. })
    ));
    assert!(matches!(
        manager.promote(&t1, &a, LockType::IS),
        Err(LockError::InvalidLock(_))
    ));
    assert!(matches!(
        manager.release(&t1, &name("database")),
        Err(LockError::NoLockHeld { .. })
    ));
    assert!(matches!(
        manager.acquire_and_release(&t1, &name("database"), LockType::S, &[name("database")]),
        Err(LockError::NoLockHeld { .. })
    ));

    assert_eq!(manager.all_locks(), before);
    assert_eq!(manager.queue_len(&a), 0);
}
