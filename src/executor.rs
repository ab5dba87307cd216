//! Execution contexts that continuations are scheduled onto.
//!
//! The promise core only needs [`Executor::schedule`]. Two implementations
//! ship with the crate: [`ThreadPool`], a set of worker threads draining a
//! FIFO queue, and [`ManualExecutor`], a queue that only runs when its owner
//! drives it (handy for event loops and tests).
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

use crate::error::{Error, Result};

/// A deferred zero-argument callable.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs jobs later, on its own thread(s) or loop.
///
/// `schedule` must enqueue and return immediately; it must never run the job
/// on the caller's stack. Jobs scheduled on the same executor start in the
/// order they were submitted.
pub trait Executor: Send + Sync {
    fn schedule(&self, job: Job);
}

impl<X: Executor + ?Sized> Executor for Arc<X> {
    fn schedule(&self, job: Job) {
        (**self).schedule(job)
    }
}

impl<X: Executor + ?Sized> Executor for Box<X> {
    fn schedule(&self, job: Job) {
        (**self).schedule(job)
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    pub workers: usize,
    pub thread_name_prefix: String,
    pub stack_size: Option<usize>,
}

impl Default for ThreadPoolConfig {
    /// One worker, so jobs also *finish* in submission order.
    fn default() -> Self {
        Self {
            workers: 1,
            thread_name_prefix: "promise-out-worker".to_string(),
            stack_size: None,
        }
    }
}

impl ThreadPoolConfig {
    pub fn builder() -> ThreadPoolConfigBuilder {
        ThreadPoolConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::config("workers must be > 0"));
        }
        if self.workers > 1024 {
            return Err(Error::config("workers too large (max 1024)"));
        }
        if self.thread_name_prefix.contains('\0') {
            return Err(Error::config("thread_name_prefix must not contain NUL"));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ThreadPoolConfigBuilder {
    config: ThreadPoolConfig,
}

impl ThreadPoolConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ThreadPoolConfig::default(),
        }
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n;
        self
    }

    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    pub fn build(self) -> Result<ThreadPoolConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Worker threads pulling jobs off one shared FIFO queue.
///
/// Dropping the pool closes the queue; jobs already queued still run, then
/// the workers are joined.
///
/// ```
/// use promise_out::executor::{Executor, ThreadPool};
/// use std::sync::mpsc::channel;
///
/// let pool = ThreadPool::with_workers(2).unwrap();
/// let (tx, rx) = channel();
/// pool.schedule(Box::new(move || tx.send(7).unwrap()));
/// assert_eq!(rx.recv().unwrap(), 7);
/// ```
#[derive(Debug)]
pub struct ThreadPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    pub fn new(config: ThreadPoolConfig) -> Result<Self> {
        config.validate()?;
        let (sender, receiver) = unbounded::<Job>();
        let mut workers = Vec::with_capacity(config.workers);

        for id in 0..config.workers {
            let receiver = receiver.clone();
            let mut builder =
                thread::Builder::new().name(format!("{}-{}", config.thread_name_prefix, id));
            if let Some(stack_size) = config.stack_size {
                builder = builder.stack_size(stack_size);
            }
            workers.push(builder.spawn(move || run_worker(id, receiver))?);
        }

        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    pub fn with_workers(workers: usize) -> Result<Self> {
        Self::new(ThreadPoolConfig::builder().workers(workers).build()?)
    }

    pub fn workers(&self) -> usize {
        self.workers.len()
    }
}

/// Runs one job; a panic is logged and does not take later jobs down with it.
fn run_job(job: Job) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
        error!("job panicked: {}", panic_message(&*payload));
    }
}

fn run_worker(id: usize, receiver: Receiver<Job>) {
    debug!("worker {} started", id);
    for job in receiver.iter() {
        run_job(job);
    }
    debug!("worker {} stopping", id);
}

impl Executor for ThreadPool {
    fn schedule(&self, job: Job) {
        let sent = match &self.sender {
            Some(sender) => sender.send(job).is_ok(),
            None => false,
        };
        if !sent {
            warn!("job scheduled on a thread pool that is shutting down; dropped");
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.sender.take();
        let current = thread::current().id();
        // the last handle may be released by a job running on the pool; the
        // workers then exit on their own once the queue is drained
        if self.workers.iter().any(|w| w.thread().id() == current) {
            debug!("thread pool dropped from one of its workers; detaching");
            return;
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("thread pool worker exited by panic");
            }
        }
    }
}

/// A job queue that only runs when driven by its owner.
///
/// Clones share the same queue.
#[derive(Clone, Default)]
pub struct ManualExecutor {
    queue: Arc<Mutex<VecDeque<Job>>>,
}

impl ManualExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs waiting to run.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Runs the jobs queued at the time of the call, in order. Jobs they
    /// schedule wait for the next call. A panicking job is logged and the
    /// rest of the batch still runs.
    pub fn run_pending(&self) -> usize {
        let batch = std::mem::take(&mut *self.queue.lock());
        let count = batch.len();
        for job in batch {
            run_job(job);
        }
        count
    }

    /// Runs jobs until the queue is empty, including ones scheduled along
    /// the way.
    pub fn run_until_idle(&self) -> usize {
        let mut count = 0;
        loop {
            let job = self.queue.lock().pop_front();
            match job {
                Some(job) => {
                    run_job(job);
                    count += 1;
                }
                None => return count,
            }
        }
    }
}

impl std::fmt::Debug for ManualExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualExecutor")
            .field("pending", &self.pending())
            .finish()
    }
}

impl Executor for ManualExecutor {
    fn schedule(&self, job: Job) {
        self.queue.lock().push_back(job);
    }
}
