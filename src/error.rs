use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;

use thiserror::Error;

/// Query-builder capabilities the ORM driver refuses to provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// The query builder's own begin/commit/rollback lifecycle.
    Transactions,
    /// Incremental result delivery.
    StreamingQueries,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Transactions => f.write_str("transactions"),
            Capability::StreamingQueries => f.write_str("streaming queries"),
        }
    }
}

/// Coarse classification of a [`BridgeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Unsupported,
    Execution,
    Transaction,
    Connection,
    Parameter,
    Other,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("The ORM client is already extended with a query builder")]
    AlreadyExtended,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("orm-query-bridge does not support {0}")]
    Unsupported(Capability),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// An execution failure carrying the backtrace of the statement's caller.
    ///
    /// The failure itself is the error source; the message only carries the caller.
    #[error("From orm-query-bridge:\n{caller}")]
    Annotated {
        #[source]
        source: Box<BridgeError>,
        caller: String,
    },

    #[error("Other error: {0}")]
    Other(String),
}

impl BridgeError {
    /// Classify this error. Annotation never changes the classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            #[cfg(feature = "sqlite")]
            BridgeError::SqliteError(_) => ErrorKind::Execution,
            BridgeError::AlreadyExtended | BridgeError::ConfigError(_) => ErrorKind::Configuration,
            BridgeError::Unsupported(_) => ErrorKind::Unsupported,
            BridgeError::ConnectionError(_) => ErrorKind::Connection,
            BridgeError::ParameterError(_) => ErrorKind::Parameter,
            BridgeError::ExecutionError(_) => ErrorKind::Execution,
            BridgeError::TransactionError(_) => ErrorKind::Transaction,
            BridgeError::Annotated { source, .. } => source.kind(),
            BridgeError::Other(_) => ErrorKind::Other,
        }
    }

    /// The error with any caller annotations peeled off.
    #[must_use]
    pub fn root(&self) -> &BridgeError {
        match self {
            BridgeError::Annotated { source, .. } => source.root(),
            other => other,
        }
    }

    /// Attach a captured caller backtrace. Returns `self` untouched when nothing was captured.
    #[must_use]
    pub fn with_caller(self, caller: &Backtrace) -> Self {
        if caller.status() != BacktraceStatus::Captured {
            return self;
        }
        BridgeError::Annotated {
            source: Box::new(self),
            caller: caller.to_string(),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<bb8::RunError<BridgeError>> for BridgeError {
    fn from(err: bb8::RunError<BridgeError>) -> Self {
        match err {
            bb8::RunError::User(inner) => inner,
            bb8::RunError::TimedOut => {
                BridgeError::ConnectionError("timed out waiting for a pooled connection".into())
            }
        }
    }
}
