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

pub mod context;
pub mod lock;
pub mod lock_type;
pub mod manager;
pub mod observer;
pub mod resource;
pub mod transaction;
pub mod util;

pub use context::LockContext;
pub use lock::Lock;
pub use lock_type::LockType;
pub use manager::LockManager;
pub use observer::{LockEvent, LockObserver, ManagerCall, NoopLockObserver, RecordingLockObserver};
pub use resource::{DATABASE_RESOURCE, ResourceName};
pub use transaction::{SharedTransaction, Transaction, TransactionHandle, TransactionId};
pub use util::ensure_sufficient_lock_held;
