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

//! TOML-described lock workloads and their replay.
//!
//! ```toml
//! transactions = [1, 2]
//!
//! [[steps]]
//! transaction = 1
//! op = "ensure"
//! resource = "database/t1/p1"
//! lock = "X"
//! ```

use crate::config::MglockConfig;
use crate::error::{LockError, Result};
use crate::locking::{
    Lock, LockContext, LockEvent, LockManager, LockObserver, LockType, NoopLockObserver,
    RecordingLockObserver, ResourceName, SharedTransaction, TransactionHandle, TransactionId,
    ensure_sufficient_lock_held,
};
use crate::runner::{DeterministicRunner, StepOutcome};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Acquire,
    Release,
    Promote,
    AcquireAndRelease,
    Escalate,
    Ensure,
}

impl Operation {
    fn needs_lock(self) -> bool {
        matches!(
            self,
            Operation::Acquire
                | Operation::Promote
                | Operation::AcquireAndRelease
                | Operation::Ensure
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Operation::Acquire => "acquire",
            Operation::Release => "release",
            Operation::Promote => "promote",
            Operation::AcquireAndRelease => "acquire_and_release",
            Operation::Escalate => "escalate",
            Operation::Ensure => "ensure",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub transaction: TransactionId,
    pub op: Operation,
    pub resource: ResourceName,

    #[serde(default)]
    pub lock: Option<LockType>,

    /// Call the lock manager directly instead of going through the resource's context.
    #[serde(default)]
    pub direct: bool,

    /// Resources released by an `acquire_and_release` step.
    #[serde(default)]
    pub release: Vec<ResourceName>,

    /// Capacity to set on the resource's context before the step runs.
    #[serde(default)]
    pub capacity: Option<usize>,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{} {} {}", self.transaction, self.op, self.resource)?;
        if let Some(lock) = self.lock {
            write!(f, " {lock}")?;
        }
        if !self.release.is_empty() {
            let names: Vec<String> = self.release.iter().map(ToString::to_string).collect();
            write!(f, " releasing [{}]", names.join(", "))?;
        }
        if self.direct {
            f.write_str(" (direct)")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub transactions: Vec<TransactionId>,

    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let scenario: Scenario = contents.parse()?;
        debug!(
            "Loaded scenario from {path:?}: {} transaction(s), {} step(s)",
            scenario.transactions.len(),
            scenario.steps.len()
        );
        Ok(scenario)
    }

    /// Rejects scenarios that cannot be replayed, naming the first offending step.
    pub fn validate(&self) -> Result<()> {
        if self.transactions.is_empty() {
            return Err(LockError::Scenario(
                "scenario declares no transactions".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for id in &self.transactions {
            if !seen.insert(*id) {
                return Err(LockError::Scenario(format!(
                    "transaction {id} is declared more than once"
                )));
            }
        }

        for (index, step) in self.steps.iter().enumerate() {
            let number = index + 1;
            let invalid = |reason: String| LockError::Scenario(format!("step {number}: {reason}"));

            if !seen.contains(&step.transaction) {
                return Err(invalid(format!(
                    "transaction {} is not declared",
                    step.transaction
                )));
            }
            match (step.op.needs_lock(), step.lock) {
                (true, None) => {
                    return Err(invalid(format!("'{}' needs a lock type", step.op)));
                }
                (false, Some(_)) => {
                    return Err(invalid(format!("'{}' does not take a lock type", step.op)));
                }
                _ => {}
            }
            if step.lock == Some(LockType::NL) {
                return Err(invalid(format!("'{}' does not accept NL", step.op)));
            }
            if step.op == Operation::Ensure
                && !matches!(step.lock, Some(LockType::S) | Some(LockType::X))
            {
                return Err(invalid("'ensure' only accepts S or X".to_string()));
            }
            if !step.release.is_empty() && step.op != Operation::AcquireAndRelease {
                return Err(invalid(format!("'{}' does not take a release list", step.op)));
            }
            if step.direct && matches!(step.op, Operation::Escalate | Operation::Ensure) {
                return Err(invalid(format!(
                    "'{}' always goes through the resource's context",
                    step.op
                )));
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for Scenario {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self> {
        let scenario: Scenario = toml::from_str(s)?;
        scenario.validate()?;
        Ok(scenario)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Blocked,
    Error { message: String },
}

impl StepStatus {
    fn from_result(result: &Result<()>) -> Self {
        match result {
            Ok(()) => StepStatus::Ok,
            Err(err) => StepStatus::Error {
                message: err.to_string(),
            },
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Ok => f.write_str("ok"),
            StepStatus::Blocked => f.write_str("blocked"),
            StepStatus::Error { message } => write!(f, "error: {message}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    /// One-based position in the scenario.
    pub step: usize,
    pub description: String,
    pub status: StepStatus,
    /// Blocked transactions whose earlier step finished as a result of this one.
    pub resumed: Vec<ResumedStep>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResumedStep {
    pub transaction: TransactionId,
    pub status: StepStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueReport {
    pub resource: ResourceName,
    pub waiting: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub steps: Vec<StepReport>,
    /// Final lock table, grouped by transaction.
    pub locks: Vec<Lock>,
    /// Non-empty queues on resources the scenario touched.
    pub queues: Vec<QueueReport>,
    /// Transactions still blocked after the last step.
    pub stuck: Vec<TransactionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<LockEvent>>,
}

impl ReplayReport {
    pub fn status_of(&self, step: usize) -> Option<&StepStatus> {
        self.steps
            .iter()
            .find(|report| report.step == step)
            .map(|report| &report.status)
    }
}

/// Replays `scenario` against a fresh lock manager, one worker thread per transaction.
///
/// Steps run strictly in file order. A step that has to wait is reported as blocked,
/// and the report of a later step lists the transactions it woke up. Transactions
/// that never wake up (for instance because of a cyclic wait) end up in
/// [`ReplayReport::stuck`] rather than failing the replay.
pub fn replay(scenario: &Scenario, config: &MglockConfig) -> Result<ReplayReport> {
    scenario.validate()?;

    let recorder = config
        .replay
        .record_events
        .then(|| Arc::new(RecordingLockObserver::new()));
    let observer: Arc<dyn LockObserver> = match &recorder {
        Some(recorder) => recorder.clone(),
        None => Arc::new(NoopLockObserver),
    };
    let manager = LockManager::with_observer(observer);

    let handles: Vec<Arc<TransactionHandle>> = scenario
        .transactions
        .iter()
        .map(|id| TransactionHandle::shared(*id))
        .collect();
    let mut runner = DeterministicRunner::new(handles.clone(), &config.runner)?;

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let worker = runner.index_of(step.transaction).ok_or_else(|| {
            LockError::Scenario(format!("step {}: unknown transaction", index + 1))
        })?;
        let transaction: SharedTransaction = handles[worker].clone();

        let status = if runner.is_blocked(worker) {
            StepStatus::Error {
                message: format!("transaction {} is still blocked", step.transaction),
            }
        } else {
            match prepare(&manager, step, transaction) {
                Ok(task) => match runner.run(worker, task) {
                    Ok(StepOutcome::Completed(result)) => StepStatus::from_result(&result),
                    Ok(StepOutcome::Blocked) => StepStatus::Blocked,
                    Err(err) => StepStatus::Error {
                        message: err.to_string(),
                    },
                },
                Err(err) => StepStatus::Error {
                    message: err.to_string(),
                },
            }
        };
        let resumed = runner
            .collect_woken()
            .into_iter()
            .map(|(transaction, result)| ResumedStep {
                transaction,
                status: StepStatus::from_result(&result),
            })
            .collect();

        debug!("Step {}: {step} -> {status}", index + 1);
        steps.push(StepReport {
            step: index + 1,
            description: step.to_string(),
            status,
            resumed,
        });
    }

    let stuck = runner.outstanding();
    if stuck.is_empty() {
        runner.join()?;
    } else {
        info!("{} transaction(s) still blocked after replay", stuck.len());
        drop(runner);
    }

    let touched: BTreeSet<&ResourceName> = scenario
        .steps
        .iter()
        .flat_map(|step| std::iter::once(&step.resource).chain(step.release.iter()))
        .collect();
    let queues = touched
        .into_iter()
        .map(|resource| QueueReport {
            resource: resource.clone(),
            waiting: manager.queue_len(resource),
        })
        .filter(|queue| queue.waiting > 0)
        .collect();

    Ok(ReplayReport {
        steps,
        locks: manager.all_locks(),
        queues,
        stuck,
        events: recorder.map(|recorder| recorder.events()),
    })
}

type StepTask = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// Resolves everything a step needs on the calling thread and returns the part that
/// may block, to be run on the transaction's worker.
fn prepare(manager: &LockManager, step: &Step, transaction: SharedTransaction) -> Result<StepTask> {
    if let Some(capacity) = step.capacity {
        manager.context_for(&step.resource)?.set_capacity(capacity);
    }
    // Direct steps leave the context tree alone so they do not change child counts.
    let context = if step.direct || step.op == Operation::AcquireAndRelease {
        None
    } else {
        Some(manager.context_for(&step.resource)?)
    };

    let lock = step.lock.unwrap_or(LockType::NL);
    let name = step.resource.clone();
    let manager = manager.clone();

    let task: StepTask = match (step.op, context) {
        (Operation::Acquire, None) => Box::new(move || manager.acquire(&transaction, &name, lock)),
        (Operation::Acquire, Some(context)) => Box::new(move || context.acquire(&transaction, lock)),
        (Operation::Release, None) => Box::new(move || manager.release(&transaction, &name)),
        (Operation::Release, Some(context)) => Box::new(move || context.release(&transaction)),
        (Operation::Promote, None) => Box::new(move || manager.promote(&transaction, &name, lock)),
        (Operation::Promote, Some(context)) => {
            Box::new(move || context.promote(&transaction, lock))
        }
        (Operation::AcquireAndRelease, _) => {
            let releases = step.release.clone();
            Box::new(move || manager.acquire_and_release(&transaction, &name, lock, &releases))
        }
        (Operation::Escalate, Some(context)) => Box::new(move || context.escalate(&transaction)),
        (Operation::Ensure, Some(context)) => {
            Box::new(move || ensure(&transaction, &context, lock))
        }
        (op @ (Operation::Escalate | Operation::Ensure), None) => {
            return Err(LockError::Scenario(format!(
                "'{op}' always goes through the resource's context"
            )));
        }
    };
    Ok(task)
}

fn ensure(transaction: &SharedTransaction, context: &LockContext, lock: LockType) -> Result<()> {
    ensure_sufficient_lock_held(Some(transaction), context, lock)
}
