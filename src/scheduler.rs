//! The cooperative single-threaded task queue (spec.md §4.6 "Scheduling
//! model", §5 "Concurrency model").
//!
//! No teacher implementation survives for this (see DESIGN.md); grounded on
//! the behavioural contract spec.md §4.6/§5 describes — a FIFO job queue, a
//! `PromiseCallDepth` re-entrancy counter guarding against thenable-induced
//! stack overflow, and an optional wall-clock deadline checked at task
//! boundaries — shaped in the teacher's `thiserror`-based error idiom
//! (`crate::error::EngineError`).

use crate::error::{EngineError, JsResult};
use crate::value::JsValue;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// The evaluator's function-call entry point, injected so this module
/// doesn't depend on `crate::exec`/`crate::context` (same seam as
/// `object::operations`'s `call_getter`).
pub type CallFn<'a> = dyn FnMut(&JsValue, &JsValue, &[JsValue]) -> JsResult<JsValue> + 'a;

/// A queued unit of work (a Promise reaction job, or a thenable-assimilation
/// job). Boxed so the queue can hold heterogeneous captured state.
pub struct Job {
    run: Box<dyn FnOnce(&mut CallFn<'_>, &Scheduler) -> JsResult<()>>,
}

impl Job {
    pub fn new(run: impl FnOnce(&mut CallFn<'_>, &Scheduler) -> JsResult<()> + 'static) -> Self {
        Self { run: Box::new(run) }
    }
}

/// Owns the task queue, the depth guard, and the execution deadline.
///
/// Lives on `Context` (spec.md §3.1's ambient configuration surface); this
/// type itself never touches a realm, matching `object::operations`'
/// dependency direction (lower-level modules stay realm-agnostic, higher
/// ones inject what they need).
pub struct Scheduler {
    queue: RefCell<VecDeque<Job>>,
    call_depth: Cell<u32>,
    max_call_depth: u32,
    deadline: Cell<Option<Instant>>,
}

impl Scheduler {
    pub fn new(max_call_depth: u32) -> Self {
        Self {
            queue: RefCell::new(VecDeque::new()),
            call_depth: Cell::new(0),
            max_call_depth,
            deadline: Cell::new(None),
        }
    }

    pub fn max_call_depth(&self) -> u32 {
        self.max_call_depth
    }

    pub fn set_max_call_depth(&mut self, depth: u32) {
        self.max_call_depth = depth;
    }

    /// Arms a deadline `timeout` from now; `None` disables the guard
    /// (spec.md §4.6 "Cancellation/timeout").
    pub fn arm_timeout(&self, timeout: Option<Duration>) {
        self.deadline.set(timeout.map(|d| Instant::now() + d));
    }

    pub fn check_timeout(&self) -> JsResult<()> {
        match self.deadline.get() {
            Some(deadline) if Instant::now() >= deadline => {
                Err(EngineError::ExecutionTimeout.into())
            }
            _ => Ok(()),
        }
    }

    pub fn enqueue(&self, job: Job) {
        self.queue.borrow_mut().push_back(job);
    }

    pub fn has_pending_jobs(&self) -> bool {
        !self.queue.borrow().is_empty()
    }

    /// §9.5 RunJobs-equivalent drain loop: pops and runs jobs FIFO until the
    /// queue is empty, checking the deadline at each task boundary and the
    /// depth guard around each job's own synchronous extent.
    ///
    /// A job failing is not fatal to the drain itself — jobs are expected to
    /// route failures into a Promise rejection internally; this only
    /// surfaces `EngineError`-class failures (timeout, depth) that abort the
    /// whole remaining queue per spec.md §4.6.
    pub fn drain(&self, call: &mut CallFn<'_>) -> JsResult<()> {
        loop {
            self.check_timeout()?;
            let job = self.queue.borrow_mut().pop_front();
            let Some(job) = job else { break };
            self.run_guarded(job, call)?;
        }
        Ok(())
    }

    fn run_guarded(&self, job: Job, call: &mut CallFn<'_>) -> JsResult<()> {
        let depth = self.call_depth.get() + 1;
        if depth > self.max_call_depth {
            return Err(EngineError::MaxCallDepthExceeded(self.max_call_depth).into());
        }
        self.call_depth.set(depth);
        let result = (job.run)(call, self);
        self.call_depth.set(depth - 1);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_call(_: &JsValue, _: &JsValue, _: &[JsValue]) -> JsResult<JsValue> {
        Ok(JsValue::undefined())
    }

    #[test]
    fn jobs_drain_in_fifo_order() {
        let scheduler = Scheduler::new(1024);
        let order = std::rc::Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            scheduler.enqueue(Job::new(move |_, _| {
                order.borrow_mut().push(i);
                Ok(())
            }));
        }
        let mut call = noop_call;
        scheduler.drain(&mut call).unwrap();
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn depth_guard_rejects_past_the_limit() {
        let scheduler = Scheduler::new(2);
        // Each job re-enqueues itself, simulating an unbounded thenable
        // chain that never lets call_depth drop back to zero between jobs.
        scheduler.call_depth.set(2);
        scheduler.enqueue(Job::new(|_, _| Ok(())));
        let mut call = noop_call;
        assert!(scheduler.drain(&mut call).is_err());
    }

    #[test]
    fn expired_deadline_aborts_before_running_jobs() {
        let scheduler = Scheduler::new(1024);
        scheduler.arm_timeout(Some(Duration::from_secs(0)));
        std::thread::sleep(Duration::from_millis(1));
        scheduler.enqueue(Job::new(|_, _| Ok(())));
        let mut call = noop_call;
        assert!(scheduler.drain(&mut call).is_err());
    }
}
