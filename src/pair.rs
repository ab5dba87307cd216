use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::{Error, Failure, Outcome, Result};
use crate::executor::Executor;

/// This `pair::Producer` promise has exactly one consumer, derived from it
/// once. The consumer gets the value by blocking, by subscribing a callback
/// that runs on an executor, or by `.await`ing it inside an async task (see
/// [`Consumer::resume_on`]).
///
/// # Examples
///
/// ```
/// use promise_out::pair::Producer;
/// use std::thread;
///
/// let promise = Producer::<String>::new();
/// let consumer = promise.derive_consumer().unwrap();
///
/// let task1 = thread::spawn(move || consumer.await_blocking().unwrap());
/// promise.resolve_value("Hi".into()).unwrap();
/// assert_eq!(task1.join().expect("The task1 thread has panicked."), "Hi");
/// ```
pub struct Producer<T> {
    promise: Option<Arc<Inner<T>>>,
}

pub struct Consumer<T> {
    promise: Option<Arc<Inner<T>>>,
}

/// Creates a producer together with its (already derived) consumer.
pub fn new<T>() -> (Producer<T>, Consumer<T>) {
    let inner = Arc::new(Inner::new(true));
    (
        Producer {
            promise: Some(inner.clone()),
        },
        Consumer {
            promise: Some(inner),
        },
    )
}

/// A subscribed callback bound to the executor it has to run on.
struct Continuation<T> {
    schedule: Box<dyn FnOnce(Outcome<T>) + Send + 'static>,
}

impl<T> Continuation<T> {
    fn new<F, X>(callback: F, executor: X) -> Self
    where
        T: Send + 'static,
        F: FnOnce(Outcome<T>) + Send + 'static,
        X: Executor + 'static,
    {
        Self {
            schedule: Box::new(move |outcome| {
                executor.schedule(Box::new(move || callback(outcome)));
            }),
        }
    }

    /// Hands the callback to its executor. Never called with the cell locked.
    fn dispatch(self, outcome: Outcome<T>) {
        trace!("scheduling continuation");
        (self.schedule)(outcome);
    }
}

enum Slot<T> {
    Empty,
    Full(Outcome<T>),
    /// Resolved, and the outcome has been handed out.
    Taken,
}

struct State<T> {
    slot: Slot<T>,
    consumed: bool,
    derived: bool,
    continuation: Option<Continuation<T>>,
}

impl<T> State<T> {
    fn is_resolved(&self) -> bool {
        !matches!(self.slot, Slot::Empty)
    }

    fn take_outcome(&mut self) -> Option<Outcome<T>> {
        match std::mem::replace(&mut self.slot, Slot::Taken) {
            Slot::Full(outcome) => Some(outcome),
            other => {
                self.slot = other;
                None
            }
        }
    }
}

struct Inner<T> {
    state: Mutex<State<T>>,
    resolution: Condvar,
}

impl<T> Inner<T> {
    fn new(derived: bool) -> Self {
        Self {
            state: Mutex::new(State {
                slot: Slot::Empty,
                consumed: false,
                derived,
                continuation: None,
            }),
            resolution: Condvar::new(),
        }
    }

    fn is_resolved(&self) -> bool {
        self.state.lock().is_resolved()
    }

    fn resolve(&self, outcome: Outcome<T>) -> Result<()> {
        let mut state = self.state.lock();
        if state.is_resolved() {
            debug!("resolve on an already resolved promise");
            return Err(Error::AlreadyResolved);
        }
        let pending = match state.continuation.take() {
            Some(continuation) => {
                state.slot = Slot::Taken;
                Some((continuation, outcome))
            }
            None => {
                state.slot = Slot::Full(outcome);
                None
            }
        };
        drop(state);

        if let Some((continuation, outcome)) = pending {
            continuation.dispatch(outcome);
        }
        self.resolution.notify_one();
        Ok(())
    }

    fn consume(&self) -> Result<parking_lot::MutexGuard<'_, State<T>>> {
        let mut state = self.state.lock();
        if state.consumed {
            debug!("promise result requested a second time");
            return Err(Error::AlreadyConsumed);
        }
        state.consumed = true;
        Ok(state)
    }
}

impl<T> fmt::Debug for Inner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Inner")
            .field("resolved", &state.is_resolved())
            .field("consumed", &state.consumed)
            .field("derived", &state.derived)
            .field("subscribed", &state.continuation.is_some())
            .finish()
    }
}

impl<T> Producer<T> {
    pub fn new() -> Self {
        Self {
            promise: Some(Arc::new(Inner::new(false))),
        }
    }

    fn inner(&self) -> Result<&Inner<T>> {
        self.promise.as_deref().ok_or(Error::MovedFrom)
    }

    ///promiseOut.resolve
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_out::pair;
    /// use std::thread;
    /// let (op, op_a) = pair::new::<String>();
    /// let task1 = thread::spawn(move || op_a.await_blocking().unwrap());
    /// let task2 = thread::spawn(move || op.resolve_value(String::from("🍓")));
    /// task2.join().expect("The task2 thread has panicked").unwrap();
    /// assert_eq!(task1.join().expect("The task1 thread has panicked"), "🍓");
    /// ```
    pub fn resolve_value(&self, value: T) -> Result<()> {
        let resolved = self.inner()?.resolve(Ok(value));
        if resolved.is_ok() {
            trace!("promise resolved with a value");
        }
        resolved
    }

    ///promiseOut.reject
    ///
    /// The failure is handed to the consumer as-is.
    pub fn resolve_failure<E: Into<Failure>>(&self, err: E) -> Result<()> {
        let resolved = self.inner()?.resolve(Err(err.into()));
        if resolved.is_ok() {
            trace!("promise resolved with a failure");
        }
        resolved
    }

    /// The single consumer for this promise. Fails with
    /// [`Error::AlreadyDerived`] the second time, even through a handle
    /// obtained with [`Producer::take`].
    pub fn derive_consumer(&self) -> Result<Consumer<T>> {
        let promise = self.promise.as_ref().ok_or(Error::MovedFrom)?;
        let mut state = promise.state.lock();
        if state.derived {
            return Err(Error::AlreadyDerived);
        }
        state.derived = true;
        Ok(Consumer {
            promise: Some(promise.clone()),
        })
    }

    /// Moves the promise out, leaving this handle empty.
    pub fn take(&mut self) -> Producer<T> {
        Producer {
            promise: self.promise.take(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.promise.as_ref().is_some_and(|p| p.is_resolved())
    }
}

impl<T> Default for Producer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Producer<T> {
    /// If this is an unresolved producer, resolve with `ProducerDropped` so
    /// the consumer never waits forever.
    fn drop(&mut self) {
        if let Some(promise) = self.promise.take() {
            if !promise.is_resolved() && promise.resolve(Err(Failure::producer_dropped())).is_ok()
            {
                debug!("producer dropped before resolving");
            }
        }
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer").field("promise", &self.promise).finish()
    }
}

impl<T> Consumer<T> {
    fn inner(&self) -> Result<&Inner<T>> {
        self.promise.as_deref().ok_or(Error::MovedFrom)
    }

    /// Blocks the calling thread until the promise is resolved.
    ///
    /// A failure passed to `resolve_failure` comes back as
    /// [`Error::Failed`]; an abandoned producer as [`Error::ProducerDropped`].
    pub fn await_blocking(&self) -> Result<T> {
        let inner = self.inner()?;
        let mut state = inner.consume()?;
        while !state.is_resolved() {
            inner.resolution.wait(&mut state);
        }
        match state.take_outcome() {
            Some(outcome) => outcome.map_err(Error::from),
            None => Err(Error::AlreadyConsumed),
        }
    }

    /// Registers `callback` to receive the outcome. The callback always runs
    /// as a job on `executor`, never on the caller's stack: right away if the
    /// promise is already resolved, otherwise once the producer resolves it.
    ///
    /// ```
    /// use promise_out::{executor::ManualExecutor, pair};
    /// use std::sync::mpsc::channel;
    ///
    /// let executor = ManualExecutor::new();
    /// let (producer, consumer) = pair::new::<u32>();
    /// let (tx, rx) = channel();
    /// consumer
    ///     .subscribe(move |outcome| tx.send(outcome.unwrap()).unwrap(), executor.clone())
    ///     .unwrap();
    /// producer.resolve_value(5).unwrap();
    /// assert!(rx.try_recv().is_err());
    /// executor.run_until_idle();
    /// assert_eq!(rx.try_recv().unwrap(), 5);
    /// ```
    pub fn subscribe<F, X>(&self, callback: F, executor: X) -> Result<()>
    where
        T: Send + 'static,
        F: FnOnce(Outcome<T>) + Send + 'static,
        X: Executor + 'static,
    {
        let inner = self.inner()?;
        let mut state = inner.consume()?;
        let continuation = Continuation::new(callback, executor);
        match state.take_outcome() {
            Some(outcome) => {
                drop(state);
                continuation.dispatch(outcome);
            }
            None => {
                trace!("continuation registered on unresolved promise");
                state.continuation = Some(continuation);
            }
        }
        Ok(())
    }

    /// Moves the consumer out, leaving this handle empty.
    pub fn take(&mut self) -> Consumer<T> {
        Consumer {
            promise: self.promise.take(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.promise.as_ref().is_some_and(|p| p.is_resolved())
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer").field("promise", &self.promise).finish()
    }
}
