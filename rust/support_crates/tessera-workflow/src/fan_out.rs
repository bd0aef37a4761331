//! Fan-out execution of independent fallible tasks.
//!
//! [`FanOut`] runs a batch of no-result tasks under one of two policies:
//!
//! - **Sequential**: tasks run in submission order on the calling thread and
//!   execution stops at the first error.
//! - **Bounded**: up to `max_concurrency` tasks run at a time on scoped worker
//!   threads. Once `failure_budget` tasks have failed, no further tasks are
//!   launched, but tasks already in flight run to completion.
//!
//! Under both policies the reported error is the failure with the lowest
//! submission index, and a task that has not been launched when the budget
//! trips is never launched at all: the launcher re-checks the failure count
//! after each permit acquisition, before spawning.

use std::{
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

use crate::permit_gate::PermitGate;

/// Execution policy for a batch of independent fallible tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOut {
    /// Run tasks in submission order, stopping at the first error.
    Sequential,
    /// Run up to `max_concurrency` tasks at a time; stop launching new tasks
    /// once `failure_budget` tasks have failed.
    Bounded {
        max_concurrency: usize,
        failure_budget: usize,
    },
}

impl FanOut {
    pub fn sequential() -> FanOut {
        FanOut::Sequential
    }

    /// Bounded-parallel policy. Both parameters are clamped to at least 1.
    pub fn bounded(max_concurrency: usize, failure_budget: usize) -> FanOut {
        FanOut::Bounded {
            max_concurrency: max_concurrency.max(1),
            failure_budget: failure_budget.max(1),
        }
    }

    /// Executes the given tasks under this policy.
    ///
    /// Returns `Ok(())` when every executed task succeeded, otherwise the
    /// error of the failed task with the lowest submission index. Tasks
    /// skipped by sequential stop-at-first-error or by the bounded failure
    /// budget are never executed.
    pub fn run<F, E>(&self, tasks: impl IntoIterator<Item = F>) -> Result<(), E>
    where
        F: FnOnce() -> Result<(), E> + Send,
        E: Send,
    {
        match *self {
            FanOut::Sequential => {
                for task in tasks {
                    task()?;
                }
                Ok(())
            }
            FanOut::Bounded {
                max_concurrency,
                failure_budget,
            } => run_bounded(max_concurrency, failure_budget, tasks),
        }
    }
}

fn run_bounded<F, E>(
    max_concurrency: usize,
    failure_budget: usize,
    tasks: impl IntoIterator<Item = F>,
) -> Result<(), E>
where
    F: FnOnce() -> Result<(), E> + Send,
    E: Send,
{
    let gate = PermitGate::new(max_concurrency);
    let failures = AtomicUsize::new(0);
    let first_failure: Mutex<Option<(usize, E)>> = Mutex::new(None);

    thread::scope(|scope| {
        for (index, task) in tasks.into_iter().enumerate() {
            if failures.load(Ordering::SeqCst) >= failure_budget {
                break;
            }
            let permit = gate.acquire();
            // The budget may have tripped while waiting for the permit;
            // a task that has not started must not start now.
            if failures.load(Ordering::SeqCst) >= failure_budget {
                break;
            }
            let failures = &failures;
            let first_failure = &first_failure;
            scope.spawn(move || {
                let _permit = permit;
                if let Err(err) = task() {
                    failures.fetch_add(1, Ordering::SeqCst);
                    let mut slot = first_failure.lock().expect("failure slot");
                    match slot.as_ref() {
                        Some((lowest, _)) if *lowest <= index => {}
                        _ => *slot = Some((index, err)),
                    }
                }
            });
        }
    });

    match first_failure.into_inner().expect("failure slot") {
        Some((_, err)) => Err(err),
        None => Ok(()),
    }
}
