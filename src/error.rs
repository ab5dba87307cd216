use std::error::Error as StdError;
use std::fmt::{self, Debug, Display};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// What a resolved cell hands to its consumer: the value, or the failure the
/// producer supplied.
pub type Outcome<T> = std::result::Result<T, Failure>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("handle no longer owns a promise (moved from)")]
    MovedFrom,

    #[error("consumer already derived from this producer")]
    AlreadyDerived,

    #[error("consumer already used; a result can only be taken once")]
    AlreadyConsumed,

    #[error("promise already resolved")]
    AlreadyResolved,

    #[error("producer dropped before resolving")]
    ProducerDropped,

    #[error("launched task panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Failed(Failure),

    #[error("config error: {0}")]
    Config(String),

    #[error("failed to spawn executor worker: {0}")]
    Spawn(#[from] std::io::Error),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }
}

impl From<Failure> for Error {
    /// `ProducerDropped` and `Panicked` come back out as themselves.
    /// Everything else, including a local fault a producer chose to resolve
    /// with, stays wrapped in `Failed`.
    fn from(failure: Failure) -> Self {
        match failure.0.downcast::<Error>() {
            Ok(err) => match *err {
                err @ (Error::ProducerDropped | Error::Panicked(_)) => err,
                other => Error::Failed(Failure(Box::new(other))),
            },
            Err(inner) => Error::Failed(Failure(inner)),
        }
    }
}

/// Opaque failure payload stored in a promise.
///
/// Any `std::error::Error + Send + Sync` converts into a `Failure`, so `?`
/// works inside launched bodies. The payload is carried verbatim to the
/// consumer; use [`Failure::downcast_ref`] to get at the original type.
pub struct Failure(Box<dyn StdError + Send + Sync + 'static>);

impl Failure {
    pub fn new<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        let boxed: Box<dyn StdError + Send + Sync> = Box::new(err);
        match boxed.downcast::<Error>() {
            // re-raising an awaited failure must not nest it
            Ok(err) => match *err {
                Error::Failed(inner) => inner,
                other => Failure(Box::new(other)),
            },
            Err(boxed) => Failure(boxed),
        }
    }

    /// A failure carrying only a message.
    pub fn msg<M>(msg: M) -> Self
    where
        M: Display + Debug + Send + Sync + 'static,
    {
        Failure(Box::new(Message(msg)))
    }

    pub(crate) fn producer_dropped() -> Self {
        Failure(Box::new(Error::ProducerDropped))
    }

    pub fn is_producer_dropped(&self) -> bool {
        matches!(self.downcast_ref::<Error>(), Some(Error::ProducerDropped))
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    pub fn into_inner(self) -> Box<dyn StdError + Send + Sync + 'static> {
        self.0
    }
}

impl<E> From<E> for Failure
where
    E: StdError + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Failure::new(err)
    }
}

impl Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Failure").field(&self.0).finish()
    }
}

impl Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

struct Message<M>(M);

impl<M: Display> Display for Message<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<M: Debug> Debug for Message<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl<M: Display + Debug> StdError for Message<M> {}
