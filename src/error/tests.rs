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

use crate::error::format::format_error_with_color;
use crate::error::*;

fn duplicate() -> LockError {
    LockError::DuplicateLockRequest {
        transaction: 4,
        resource: "database/table1".to_string(),
    }
}

#[test]
fn test_error_context_duplicate_request() {
    let error = duplicate();
    let context = ErrorContext::new(&error);

    assert!(context.suggestion.unwrap().contains("promote"));
    assert!(context.details.unwrap().contains("transaction 4"));
}

#[test]
fn test_error_context_no_lock_held() {
    let error = LockError::NoLockHeld {
        transaction: 2,
        resource: "database".to_string(),
    };
    let context = ErrorContext::new(&error);

    assert!(context.suggestion.unwrap().contains("'database'"));
    assert!(context.details.is_some());
}

#[test]
fn test_error_context_invalid_lock_mentions_intention_locks() {
    let error = LockError::InvalidLock("parent holds NL".to_string());
    let context = ErrorContext::new(&error);

    let suggestion = context.suggestion.unwrap();
    assert!(suggestion.contains("IS for S"));
    assert_eq!(context.details, Some("parent holds NL".to_string()));
}

#[test]
fn test_error_context_runner_mentions_deadlock() {
    let error = LockError::Runner("worker 1 stuck".to_string());
    let context = ErrorContext::new(&error);

    assert!(context.suggestion.unwrap().contains("deadlocks"));
}

#[test]
fn test_error_context_with_custom_suggestion() {
    let error = LockError::InvalidLock("x".to_string());
    let context = ErrorContext::new(&error).with_suggestion("Escalate instead.".to_string());

    assert_eq!(context.suggestion, Some("Escalate instead.".to_string()));
}

#[test]
fn test_error_context_display() {
    let error = duplicate();
    let context = ErrorContext::new(&error);
    let output = context.to_string();

    assert!(output.contains("Error:"));
    assert!(output.contains("Details:"));
    assert!(output.contains("Suggestion:"));
}

#[test]
fn test_error_context_disallowed_names_cause() {
    let escalate = LockError::OperationDisallowed {
        operation: "escalate".to_string(),
        resource: "database/t1".to_string(),
    };
    let context = ErrorContext::new(&escalate);
    assert!(context.details.unwrap().contains("child locks disabled"));
    assert!(context.suggestion.unwrap().contains("'database/t1'"));

    let acquire = LockError::OperationDisallowed {
        operation: "acquire".to_string(),
        resource: "database/idx".to_string(),
    };
    let details = ErrorContext::new(&acquire).details.unwrap();
    assert!(details.contains("read-only"));
    assert!(!details.contains("child locks"));
}

#[test]
fn test_exit_codes() {
    assert_eq!(
        get_exit_code(&LockError::InvalidResourceName("x".to_string())),
        2
    );
    assert_eq!(get_exit_code(&LockError::Scenario("x".to_string())), 2);
    assert_eq!(get_exit_code(&duplicate()), 3);
    assert_eq!(
        get_exit_code(&LockError::OperationDisallowed {
            operation: "acquire".to_string(),
            resource: "database/idx".to_string(),
        }),
        3
    );
    assert_eq!(get_exit_code(&LockError::Runner("x".to_string())), 4);
    let io_err = std::io::Error::other("disk");
    assert_eq!(get_exit_code(&LockError::Io(io_err)), 1);
}

#[test]
fn test_protocol_violation_classification() {
    assert!(duplicate().is_protocol_violation());
    assert!(LockError::InvalidLock("x".to_string()).is_protocol_violation());
    assert!(!LockError::Runner("x".to_string()).is_protocol_violation());
}

#[test]
fn test_io_error_not_found() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let error = LockError::Io(io_err);
    let context = ErrorContext::new(&error);

    assert!(context.suggestion.unwrap().contains("path is correct"));
}

#[test]
fn test_format_error_chain() {
    let error = LockError::InvalidLockType("Q".to_string());
    let formatted = format_error_chain(&error);

    assert!(formatted.contains("Error:"));
    assert!(formatted.contains("Unknown lock type 'Q'"));
}

#[test]
fn test_format_error_with_color_reset() {
    let error = duplicate();
    let formatted = format_error_with_color(&error, true);

    // The output should end with a reset code
    assert!(formatted.ends_with("\x1b[0m"));
    assert!(formatted.contains("Error:"));
    assert!(formatted.contains("Suggestions:"));
    assert!(formatted.contains("promote"));
}

#[test]
fn test_format_error_no_color_no_reset() {
    let error = duplicate();
    let formatted = format_error_with_color(&error, false);

    assert!(!formatted.contains("\x1b["));
    assert!(formatted.contains("Error:"));
    assert!(formatted.contains("Suggestions:"));
}
