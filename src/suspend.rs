//! Async bridge: writing promise-returning functions as `async` bodies, and
//! awaiting a [`Consumer`] without blocking a thread.
//!
//! ```
//! use promise_out::executor::ManualExecutor;
//! use promise_out::{pair, suspend, Consumer, Error};
//!
//! fn double(executor: ManualExecutor, input: Consumer<u32>) -> Consumer<u32> {
//!     let resume_on = executor.clone();
//!     suspend::launch(executor, async move {
//!         let value = input.resume_on(resume_on).await?;
//!         Ok::<_, Error>(value * 2)
//!     })
//! }
//!
//! let executor = ManualExecutor::new();
//! let (producer, consumer) = pair::new();
//! let doubled = double(executor.clone(), consumer);
//! producer.resolve_value(21).unwrap();
//! executor.run_until_idle();
//! assert_eq!(doubled.await_blocking().unwrap(), 42);
//! ```
use futures::future::{BoxFuture, FutureExt};
use futures::task::{waker_ref, ArcWake};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use tracing::{debug, trace};

use crate::error::{Error, Failure, Outcome, Result};
use crate::executor::{panic_message, Executor};
use crate::pair::{self, Consumer};

/// Runs `body` as a task and returns the consumer for its result.
///
/// The body starts immediately on the calling thread and runs until its
/// first pending `.await`; every later wake-up polls it again as a job on
/// `executor`. `Ok(v)` resolves the promise with `v`, `Err(e)` with
/// `e.into()`. A panic in the body resolves it with [`Error::Panicked`].
pub fn launch<T, E, F, X>(executor: X, body: F) -> Consumer<T>
where
    T: Send + 'static,
    E: Into<Failure> + 'static,
    F: Future<Output = std::result::Result<T, E>> + Send + 'static,
    X: Executor + 'static,
{
    let (producer, consumer) = pair::new();
    let future = AssertUnwindSafe(body).catch_unwind().map(move |result| {
        let resolved = match result {
            Ok(Ok(value)) => producer.resolve_value(value),
            Ok(Err(err)) => producer.resolve_failure(err),
            Err(payload) => {
                let msg = panic_message(&*payload);
                debug!("launched task panicked: {}", msg);
                producer.resolve_failure(Error::Panicked(msg))
            }
        };
        if let Err(err) = resolved {
            debug!("launched task could not resolve its promise: {}", err);
        }
    });

    let task = Arc::new(Task {
        future: Mutex::new(Some(future.boxed())),
        executor: Box::new(executor),
    });
    task.poll();
    consumer
}

struct Task {
    future: Mutex<Option<BoxFuture<'static, ()>>>,
    executor: Box<dyn Executor>,
}

impl Task {
    fn poll(self: &Arc<Self>) {
        let mut slot = self.future.lock();
        if let Some(mut future) = slot.take() {
            let waker = waker_ref(self);
            let mut cx = Context::from_waker(&waker);
            if future.as_mut().poll(&mut cx).is_pending() {
                *slot = Some(future);
            } else {
                trace!("launched task finished");
            }
        }
    }
}

impl ArcWake for Task {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        let task = arc_self.clone();
        arc_self.executor.schedule(Box::new(move || task.poll()));
    }
}

impl<T: Send + 'static> Consumer<T> {
    /// Awaits the result from inside an async task.
    ///
    /// The first poll subscribes a continuation on `executor` and suspends;
    /// the task is woken when that continuation runs. Local faults from
    /// subscribing (`MovedFrom`, `AlreadyConsumed`) are returned right away.
    pub fn resume_on<X: Executor + 'static>(self, executor: X) -> Resume<T> {
        Resume {
            state: ResumeState::Idle {
                consumer: self,
                executor: Box::new(executor),
            },
        }
    }
}

/// Future returned by [`Consumer::resume_on`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Resume<T> {
    state: ResumeState<T>,
}

enum ResumeState<T> {
    Idle {
        consumer: Consumer<T>,
        executor: Box<dyn Executor>,
    },
    Waiting(Arc<Mutex<Rendezvous<T>>>),
    Done,
}

struct Rendezvous<T> {
    outcome: Option<Outcome<T>>,
    waker: Option<Waker>,
}

impl<T: Send + 'static> Future for Resume<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match std::mem::replace(&mut this.state, ResumeState::Done) {
            ResumeState::Idle { consumer, executor } => {
                let rendezvous = Arc::new(Mutex::new(Rendezvous {
                    outcome: None,
                    waker: Some(cx.waker().clone()),
                }));
                let shared = rendezvous.clone();
                let subscribed = consumer.subscribe(
                    move |outcome| {
                        let waker = {
                            let mut rendezvous = shared.lock();
                            rendezvous.outcome = Some(outcome);
                            rendezvous.waker.take()
                        };
                        if let Some(waker) = waker {
                            waker.wake();
                        }
                    },
                    executor,
                );
                match subscribed {
                    Ok(()) => {
                        this.state = ResumeState::Waiting(rendezvous);
                        Poll::Pending
                    }
                    Err(err) => Poll::Ready(Err(err)),
                }
            }
            ResumeState::Waiting(rendezvous) => {
                let outcome = {
                    let mut guard = rendezvous.lock();
                    let outcome = guard.outcome.take();
                    if outcome.is_none() {
                        guard.waker = Some(cx.waker().clone());
                    }
                    outcome
                };
                match outcome {
                    Some(outcome) => Poll::Ready(outcome.map_err(Error::from)),
                    None => {
                        this.state = ResumeState::Waiting(rendezvous);
                        Poll::Pending
                    }
                }
            }
            ResumeState::Done => Poll::Ready(Err(Error::AlreadyConsumed)),
        }
    }
}

impl<T> fmt::Debug for Resume<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            ResumeState::Idle { .. } => "idle",
            ResumeState::Waiting(_) => "waiting",
            ResumeState::Done => "done",
        };
        f.debug_struct("Resume").field("state", &state).finish()
    }
}
