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

use crate::error::LockError;
use std::fmt;

pub struct ErrorContext<'a> {
    pub error: &'a LockError,
    pub suggestion: Option<String>,
    pub details: Option<String>,
}

impl<'a> ErrorContext<'a> {
    pub fn new(error: &'a LockError) -> Self {
        let (suggestion, details) = match error {
            LockError::DuplicateLockRequest {
                transaction,
                resource,
            } => {
                let suggestion = Some(format!(
                    "Use promote to upgrade the existing lock on '{resource}', or release it \
                     first."
                ));
                let details = Some(format!(
                    "A transaction holds at most one lock per resource; transaction \
                     {transaction} already has one."
                ));
                (suggestion, details)
            }
            LockError::NoLockHeld {
                transaction,
                resource,
            } => {
                let suggestion = Some(format!(
                    "Acquire a lock on '{resource}' before releasing, promoting or escalating \
                     it."
                ));
                let details = Some(format!(
                    "Transaction {transaction} holds nothing on '{resource}'."
                ));
                (suggestion, details)
            }
            LockError::InvalidLock(msg) => {
                let suggestion = Some(
                    "Lock the parent resource with the required intention lock first (IS for S, \
                     IX for X/IX/SIX), release child locks before their parent, and only \
                     promote to a substitutable lock type.\nensure_sufficient_lock_held plans \
                     these steps automatically."
                        .to_string(),
                );
                let details = Some(msg.clone());
                (suggestion, details)
            }
            LockError::OperationDisallowed {
                operation,
                resource,
            } => {
                let suggestion = Some(format!(
                    "Lock the nearest writable ancestor of '{resource}' instead."
                ));
                let details = Some(if operation == "escalate" {
                    format!(
                        "'{resource}' is read-only or has child locks disabled; neither can be \
                         escalated."
                    )
                } else {
                    format!("'{resource}' is read-only; {operation} is not allowed on it.")
                });
                (suggestion, details)
            }
            LockError::InvalidResourceName(msg) => {
                let suggestion = Some(
                    "Resource names are '/'-separated non-empty segments, e.g. \
                     'database/table1/page3'."
                        .to_string(),
                );
                let details = Some(msg.clone());
                (suggestion, details)
            }
            LockError::InvalidLockType(value) => {
                let suggestion = Some("Valid lock types: S, X, IS, IX, SIX, NL.".to_string());
                let details = Some(format!("Could not parse '{value}'."));
                (suggestion, details)
            }
            LockError::ConfigError(msg) => {
                let suggestion = Some(
                    "Check the configuration file syntax and any MGLOCK_* environment \
                     variables."
                        .to_string(),
                );
                let details = Some(msg.clone());
                (suggestion, details)
            }
            LockError::Scenario(msg) => {
                let suggestion = Some(
                    "Each step needs 'transaction', 'op' and 'resource'; acquire, promote, \
                     acquire_and_release and ensure also need 'lock'."
                        .to_string(),
                );
                let details = Some(msg.clone());
                (suggestion, details)
            }
            LockError::Runner(msg) => {
                let suggestion = Some(
                    "A step neither finished nor blocked in time. Raise \
                     runner.step_timeout_ms, or look for a cyclic wait: the lock manager does \
                     not detect deadlocks."
                        .to_string(),
                );
                let details = Some(msg.clone());
                (suggestion, details)
            }
            LockError::TomlDe(toml_err) => {
                let suggestion = Some("Fix the TOML syntax and try again.".to_string());
                let details = Some(format!("TOML error: {toml_err}"));
                (suggestion, details)
            }
            LockError::Io(io_err) => {
                let suggestion = match io_err.kind() {
                    std::io::ErrorKind::NotFound => Some(
                        "Ensure the file or directory exists and the path is correct.".to_string(),
                    ),
                    std::io::ErrorKind::PermissionDenied => {
                        Some("Check the file permissions.".to_string())
                    }
                    _ => None,
                };
                let details = Some(format!("I/O error: {io_err}"));
                (suggestion, details)
            }
            _ => (None, None),
        };

        ErrorContext {
            error,
            suggestion,
            details,
        }
    }

    pub fn with_suggestion(mut self, suggestion: String) -> Self {
        self.suggestion = Some(suggestion);
        self
    }
}

impl<'a> fmt::Display for ErrorContext<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error: {}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\n\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}
