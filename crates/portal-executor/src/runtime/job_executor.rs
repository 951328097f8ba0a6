//! Boa job queue for the executor's script context
//!
//! Boa schedules promise reactions (`then` handlers, `await` continuations) as
//! jobs on the context's job executor. The [`JobQueue`] stores them until the
//! engine drains it.
//!
//! # Job Types
//!
//! - **PromiseJob**: microtasks for promise resolution
//! - **GenericJob**: general-purpose jobs
//!
//! Native async jobs are not accepted: the context exposes no native async
//! functions, so none can be scheduled.
//!
//! # Execution Model
//!
//! The engine drains the queue synchronously with [`JobQueue::run_until_idle`]
//! after every operation and whenever a pending promise is checked; it never
//! holds the context across an await point.

use boa_engine::{
    context::Context,
    job::{GenericJob, Job, JobExecutor, PromiseJob},
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Upper bound on jobs run by one [`JobQueue::run_until_idle`] call, so a
/// script that keeps scheduling microtasks cannot starve the other handlers.
const MAX_JOBS_PER_DRAIN: usize = 100_000;

/// Job executor for one script context.
pub struct JobQueue {
    promise_jobs: RefCell<VecDeque<PromiseJob>>,
    generic_jobs: RefCell<VecDeque<GenericJob>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            promise_jobs: RefCell::default(),
            generic_jobs: RefCell::default(),
        }
    }

    /// Returns true if jobs are waiting, e.g. after a drain hit its cap.
    pub fn has_pending_jobs(&self) -> bool {
        !self.promise_jobs.borrow().is_empty() || !self.generic_jobs.borrow().is_empty()
    }

    /// Runs promise and generic jobs until both queues are empty.
    ///
    /// Jobs enqueued while draining run in the same call. Returns the number
    /// of jobs that ran.
    pub fn run_until_idle(&self, context: &mut Context) -> usize {
        let mut ran = 0;
        while ran < MAX_JOBS_PER_DRAIN {
            let step = self.drain_jobs(context);
            if step == 0 {
                break;
            }
            ran += step;
        }
        ran
    }

    /// Runs at most one generic job, then every queued promise job.
    fn drain_jobs(&self, context: &mut Context) -> usize {
        let mut ran = 0;

        let generic = self.generic_jobs.borrow_mut().pop_front();
        if let Some(generic) = generic {
            ran += 1;
            if let Err(err) = generic.call(context) {
                tracing::error!("Uncaught error in generic job: {err}");
            }
        }

        let jobs = std::mem::take(&mut *self.promise_jobs.borrow_mut());
        for job in jobs {
            ran += 1;
            if let Err(e) = job.call(context) {
                tracing::error!("Uncaught error in promise job: {e}");
            }
        }

        context.clear_kept_objects();
        ran
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobExecutor for JobQueue {
    fn enqueue_job(self: Rc<Self>, job: Job, _context: &mut Context) {
        match job {
            Job::PromiseJob(job) => self.promise_jobs.borrow_mut().push_back(job),
            Job::GenericJob(g) => self.generic_jobs.borrow_mut().push_back(g),
            _ => {
                tracing::warn!("Unsupported job type enqueued, ignoring");
            }
        }
    }

    fn run_jobs(self: Rc<Self>, context: &mut Context) -> boa_engine::JsResult<()> {
        self.run_until_idle(context);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boa_engine::{JsValue, Source};
    use std::cell::Cell;

    fn counting_job(counter: &Rc<Cell<usize>>, context: &mut Context) -> Job {
        let counter = Rc::clone(counter);
        Job::GenericJob(GenericJob::new(
            move |_| {
                counter.set(counter.get() + 1);
                Ok(JsValue::undefined())
            },
            context.realm().clone(),
        ))
    }

    #[test]
    fn test_new_queue_is_empty() {
        assert!(!JobQueue::default().has_pending_jobs());
    }

    #[test]
    fn test_run_until_idle_on_empty_queue() {
        let queue = JobQueue::new();
        let mut context = Context::default();
        assert_eq!(queue.run_until_idle(&mut context), 0);
    }

    #[test]
    fn test_run_until_idle_runs_every_generic_job() {
        let queue = Rc::new(JobQueue::new());
        let mut context = Context::default();
        let counter = Rc::new(Cell::new(0));

        for _ in 0..5 {
            let job = counting_job(&counter, &mut context);
            queue.clone().enqueue_job(job, &mut context);
        }
        assert!(queue.has_pending_jobs());

        assert_eq!(queue.run_until_idle(&mut context), 5);
        assert_eq!(counter.get(), 5);
        assert!(!queue.has_pending_jobs());
    }

    #[test]
    fn test_promise_reactions_run_when_drained() {
        let queue = Rc::new(JobQueue::new());
        let mut context = Context::builder()
            .job_executor(queue.clone())
            .build()
            .unwrap();

        context
            .eval(Source::from_bytes(
                "globalThis.seen = 0; Promise.resolve(1).then(v => v + 1).then(v => { seen = v; });",
            ))
            .unwrap();
        assert!(queue.has_pending_jobs());

        queue.run_until_idle(&mut context);
        let seen = context
            .eval(Source::from_bytes("seen"))
            .unwrap();
        assert_eq!(seen.as_number(), Some(2.0));
        assert!(!queue.has_pending_jobs());
    }

    #[test]
    fn test_run_jobs_drains_queue() {
        let queue = Rc::new(JobQueue::new());
        let mut context = Context::default();
        let counter = Rc::new(Cell::new(0));

        let job = counting_job(&counter, &mut context);
        queue.clone().enqueue_job(job, &mut context);

        queue.clone().run_jobs(&mut context).unwrap();
        assert_eq!(counter.get(), 1);
        assert!(!queue.has_pending_jobs());
    }
}
