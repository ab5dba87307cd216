//! Single-shot promise/future pair.
//!
//! A [`Producer`] resolves a value or a failure exactly once, from any thread.
//! Its one [`Consumer`] takes that result exactly once, in one of three ways:
//!
//! - [`Consumer::await_blocking`] parks the calling thread until resolution;
//! - [`Consumer::subscribe`] registers a callback that is scheduled onto an
//!   [`Executor`] once the result is there;
//! - [`Consumer::resume_on`] gives a future that suspends an async task
//!   until resolution, see [`suspend`].
//!
//! Dropping an unresolved producer resolves the promise with
//! [`Error::ProducerDropped`], so no consumer waits forever.
//!
//! ```
//! use promise_out::pair;
//! use std::thread;
//!
//! let (producer, consumer) = pair::new::<u32>();
//! let resolver = thread::spawn(move || producer.resolve_value(7));
//! assert_eq!(consumer.await_blocking().unwrap(), 7);
//! resolver.join().unwrap().unwrap();
//! ```
pub mod error;
pub mod executor;
pub mod pair;
pub mod suspend;

pub use error::{Error, Failure, Outcome, Result};
pub use executor::{Executor, Job};
pub use pair::{Consumer, Producer};
pub use suspend::{launch, Resume};
