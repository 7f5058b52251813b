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

use crate::locking::lock_type::LockType;
use crate::locking::resource::ResourceName;
use crate::locking::transaction::{SharedTransaction, TransactionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A lock granted (or requested) on a single resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lock {
    pub name: ResourceName,
    pub lock_type: LockType,
    pub transaction: TransactionId,
}

impl Lock {
    pub fn new(name: ResourceName, lock_type: LockType, transaction: TransactionId) -> Self {
        Self {
            name,
            lock_type,
            transaction,
        }
    }
}

impl fmt::Display for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}: {}({})", self.transaction, self.lock_type, self.name)
    }
}

/// A request waiting in a resource queue. `releases` is empty for plain acquisitions
/// and lists the locks to drop once `lock` is granted for promotions and
/// acquire-and-release calls.
pub(crate) struct LockRequest {
    pub(crate) transaction: SharedTransaction,
    pub(crate) lock: Lock,
    pub(crate) releases: Vec<Lock>,
}

impl LockRequest {
    pub(crate) fn new(transaction: SharedTransaction, lock: Lock) -> Self {
        Self::with_releases(transaction, lock, Vec::new())
    }

    pub(crate) fn with_releases(
        transaction: SharedTransaction,
        lock: Lock,
        releases: Vec<Lock>,
    ) -> Self {
        Self {
            transaction,
            lock,
            releases,
        }
    }
}

impl fmt::Debug for LockRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockRequest")
            .field("transaction", &self.transaction.transaction_id())
            .field("lock", &self.lock)
            .field("releases", &self.releases)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_owner_and_type() {
        let lock = Lock::new("database/t1".parse().unwrap(), LockType::IX, 7);
        assert_eq!(lock.to_string(), "T7: IX(database/t1)");
    }
}
