//! Error types for ring management and remote calls

use crate::context::RingId;
use crate::marshal::MarshalError;
use crate::options::ConfigError;
use rings_engine::EngineError;
use thiserror::Error;

/// Errors of the management API.
///
/// These are signalled synchronously to whoever used the API wrongly (or
/// asked for a context that could not be created). Failures of the code a
/// remote call runs are never reported here; they come back as a
/// [`RemoteError`] inside a [`CallOutcome`](crate::CallOutcome).
#[derive(Debug, Error)]
pub enum RingsError {
    /// The ring has been closed
    #[error("{0} is closed")]
    Closed(RingId),

    /// The ring cannot be closed while a call into it is running
    #[error("{0} is busy: a call into it is still running")]
    Busy(RingId),

    /// Wrong argument to a management operation
    #[error("bad argument #{position} to '{function}' ({message})")]
    BadArgument {
        position: usize,
        function: &'static str,
        message: String,
    },

    /// A reverse call was made with nobody to call back into
    #[error("{0} has no active caller")]
    NoCaller(RingId),

    /// The `Rings` manager that owned the ring no longer exists
    #[error("the rings manager has been dropped")]
    ManagerDropped,

    /// The interpreter engine could not create a context
    #[error("rings: could not create new state: {0}")]
    Allocation(#[from] EngineError),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RingsError {
    /// True for misuse of the API, as opposed to resource failures.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            RingsError::Closed(_)
                | RingsError::Busy(_)
                | RingsError::BadArgument { .. }
                | RingsError::NoCaller(_)
                | RingsError::ManagerDropped
        )
    }
}

/// Why a remote call failed.
///
/// The `Display` text is the single message the caller's script sees as
/// the second result of a failed `dostring`.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// The source text did not compile
    #[error("{0}")]
    Compile(String),

    /// An argument or result could not be copied
    #[error(transparent)]
    Marshal(#[from] MarshalError),

    /// The callee raised an error (message with traceback)
    #[error("{0}")]
    Runtime(String),
}
