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

//! Step-by-step execution of concurrent lock workloads.
//!
//! Each transaction gets its own worker thread. [`DeterministicRunner::run`] hands one
//! task to a worker and returns once the task has either finished or parked its thread
//! in [`Transaction::block`], so a test or scenario can interleave transactions in an
//! exact order and observe which steps had to wait.

use crate::config::RunnerConfig;
use crate::error::{LockError, Result};
use crate::locking::{Transaction, TransactionHandle, TransactionId};
use log::{debug, trace, warn};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub type Task = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// What happened to a step by the time [`DeterministicRunner::run`] returned.
#[derive(Debug)]
pub enum StepOutcome {
    Completed(Result<()>),
    Blocked,
}

impl StepOutcome {
    pub fn is_blocked(&self) -> bool {
        matches!(self, StepOutcome::Blocked)
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, StepOutcome::Completed(Ok(())))
    }
}

struct Worker {
    handle: Arc<TransactionHandle>,
    tasks: Option<Sender<Task>>,
    results: Receiver<Result<()>>,
    thread: Option<JoinHandle<()>>,
    /// A task was handed over and its result has not been collected yet.
    pending: bool,
}

impl Worker {
    fn spawn(handle: Arc<TransactionHandle>) -> Result<Self> {
        let (task_tx, task_rx) = mpsc::channel::<Task>();
        let (result_tx, result_rx) = mpsc::channel();
        let id = handle.transaction_id();

        let thread = thread::Builder::new()
            .name(format!("mglock-txn-{id}"))
            .spawn(move || {
                for task in task_rx {
                    if result_tx.send(task()).is_err() {
                        break;
                    }
                }
                trace!("Worker for transaction {id} exiting");
            })?;

        Ok(Self {
            handle,
            tasks: Some(task_tx),
            results: result_rx,
            thread: Some(thread),
            pending: false,
        })
    }

    fn id(&self) -> TransactionId {
        self.handle.transaction_id()
    }

    /// Waits for the pending task until it finishes, blocks, or `timeout` passes.
    fn settle(&mut self, timeout: Duration, poll_interval: Duration) -> Result<StepOutcome> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.results.recv_timeout(poll_interval) {
                Ok(result) => {
                    self.pending = false;
                    return Ok(StepOutcome::Completed(result));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.pending = false;
                    return Err(LockError::Runner(format!(
                        "worker for transaction {} terminated unexpectedly",
                        self.id()
                    )));
                }
                Err(RecvTimeoutError::Timeout) => {}
            }

            if self.handle.is_blocked() {
                return Ok(StepOutcome::Blocked);
            }
            if Instant::now() >= deadline {
                return Err(LockError::Runner(format!(
                    "step for transaction {} neither finished nor blocked within {timeout:?}",
                    self.id()
                )));
            }
        }
    }

    /// Waits for the pending task to finish; blocking does not count as settled.
    fn finish(&mut self, timeout: Duration) -> Option<Result<()>> {
        match self.results.recv_timeout(timeout) {
            Ok(result) => {
                self.pending = false;
                Some(result)
            }
            Err(_) => None,
        }
    }
}

/// Runs one worker thread per transaction and steps them one task at a time.
pub struct DeterministicRunner {
    workers: Vec<Worker>,
    step_timeout: Duration,
    poll_interval: Duration,
}

impl DeterministicRunner {
    pub fn new(handles: Vec<Arc<TransactionHandle>>, config: &RunnerConfig) -> Result<Self> {
        let workers = handles
            .into_iter()
            .map(Worker::spawn)
            .collect::<Result<Vec<_>>>()?;
        debug!("Started {} runner worker(s)", workers.len());
        Ok(Self {
            workers,
            step_timeout: config.step_timeout(),
            poll_interval: config.poll_interval(),
        })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Position of the worker that runs `transaction`.
    pub fn index_of(&self, transaction: TransactionId) -> Option<usize> {
        self.workers
            .iter()
            .position(|worker| worker.id() == transaction)
    }

    /// Runs `task` on worker `index`.
    ///
    /// If the worker's previous task is still blocked the runner first waits for it to
    /// be woken. A worker that stays blocked, or a task that neither finishes nor
    /// blocks within the step timeout, fails with [`LockError::Runner`].
    pub fn run<F>(&mut self, index: usize, task: F) -> Result<StepOutcome>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let step_timeout = self.step_timeout;
        let poll_interval = self.poll_interval;
        let worker = self.worker_mut(index)?;

        if worker.pending {
            trace!(
                "Waiting for previous step of transaction {} before running the next",
                worker.id()
            );
            match worker.finish(step_timeout) {
                Some(Ok(())) => {}
                Some(Err(err)) => {
                    warn!("Earlier step of transaction {} failed: {err}", worker.id());
                }
                None => {
                    return Err(LockError::Runner(format!(
                        "transaction {} is still blocked on an earlier step",
                        worker.id()
                    )));
                }
            }
        }

        let id = worker.id();
        let sent = worker
            .tasks
            .as_ref()
            .map(|tasks| tasks.send(Box::new(task)).is_ok())
            .unwrap_or(false);
        if !sent {
            return Err(LockError::Runner(format!(
                "worker for transaction {id} is no longer accepting tasks"
            )));
        }
        worker.pending = true;

        let outcome = worker.settle(step_timeout, poll_interval)?;
        debug!(
            "Transaction {id} step {}",
            if outcome.is_blocked() { "blocked" } else { "finished" }
        );
        Ok(outcome)
    }

    pub fn is_blocked(&self, index: usize) -> bool {
        self.workers
            .get(index)
            .is_some_and(|worker| worker.handle.is_blocked())
    }

    /// Collects the results of earlier blocked steps whose transactions have since been
    /// woken, in worker order.
    pub fn collect_woken(&mut self) -> Vec<(TransactionId, Result<()>)> {
        let timeout = self.step_timeout;
        let mut woken = Vec::new();
        for worker in &mut self.workers {
            if !worker.pending || worker.handle.is_blocked() {
                continue;
            }
            if let Some(result) = worker.finish(timeout) {
                woken.push((worker.id(), result));
            }
        }
        woken
    }

    /// Transactions whose last task has not finished yet.
    pub fn outstanding(&self) -> Vec<TransactionId> {
        self.workers
            .iter()
            .filter(|worker| worker.pending)
            .map(Worker::id)
            .collect()
    }

    /// Waits for every outstanding task and shuts the workers down. Returns the results
    /// of the tasks that were still outstanding, in worker order.
    pub fn join(mut self) -> Result<Vec<(TransactionId, Result<()>)>> {
        let mut finished = Vec::new();
        let mut stuck = Vec::new();
        for worker in &mut self.workers {
            if !worker.pending {
                continue;
            }
            match worker.finish(self.step_timeout) {
                Some(result) => finished.push((worker.id(), result)),
                None => stuck.push(worker.id()),
            }
        }

        self.shutdown();
        if !stuck.is_empty() {
            let ids: Vec<String> = stuck.iter().map(|id| format!("T{id}")).collect();
            return Err(LockError::Runner(format!(
                "transactions still blocked after the last step: {}",
                ids.join(", ")
            )));
        }
        Ok(finished)
    }

    fn worker_mut(&mut self, index: usize) -> Result<&mut Worker> {
        let count = self.workers.len();
        self.workers.get_mut(index).ok_or_else(|| {
            LockError::Runner(format!("no worker at index {index} ({count} running)"))
        })
    }

    fn shutdown(&mut self) {
        for worker in &mut self.workers {
            worker.tasks = None;
            if worker.pending {
                // Parked forever; joining would hang.
                worker.thread = None;
                continue;
            }
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    warn!("Worker for transaction {} panicked", worker.id());
                }
            }
        }
    }
}

impl Drop for DeterministicRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}
