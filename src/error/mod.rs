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

mod context;
mod exit_codes;
mod format;
#[cfg(test)]
mod tests;

pub use context::ErrorContext;
pub use exit_codes::get_exit_code;
pub use format::{format_error_chain, format_error_with_color};

use crate::locking::{ResourceName, TransactionId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Transaction {transaction} already holds a lock on '{resource}'")]
    DuplicateLockRequest {
        transaction: TransactionId,
        resource: String,
    },

    #[error("Transaction {transaction} holds no lock on '{resource}'")]
    NoLockHeld {
        transaction: TransactionId,
        resource: String,
    },

    #[error("Invalid lock request: {0}")]
    InvalidLock(String),

    #[error("Cannot {operation} on read-only context '{resource}'")]
    OperationDisallowed { operation: String, resource: String },

    #[error("Invalid resource name: {0}")]
    InvalidResourceName(String),

    #[error("Unknown lock type '{0}'")]
    InvalidLockType(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid scenario: {0}")]
    Scenario(String),

    #[error("Runner error: {0}")]
    Runner(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),
}

impl LockError {
    pub(crate) fn duplicate(transaction: TransactionId, resource: &ResourceName) -> Self {
        LockError::DuplicateLockRequest {
            transaction,
            resource: resource.to_string(),
        }
    }

    pub(crate) fn no_lock(transaction: TransactionId, resource: &ResourceName) -> Self {
        LockError::NoLockHeld {
            transaction,
            resource: resource.to_string(),
        }
    }

    pub(crate) fn disallowed(operation: &str, resource: &ResourceName) -> Self {
        LockError::OperationDisallowed {
            operation: operation.to_string(),
            resource: resource.to_string(),
        }
    }

    /// True for the four lock-protocol violations raised by the manager and contexts.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            LockError::DuplicateLockRequest { .. }
                | LockError::NoLockHeld { .. }
                | LockError::InvalidLock(_)
                | LockError::OperationDisallowed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LockError>;
