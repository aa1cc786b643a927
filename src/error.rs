use std::error::Error as StdError;

/// Boxed error carried across the data-source and caller boundaries.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Error type for unit-of-work operations
#[derive(Debug, thiserror::Error)]
pub enum UnitOfWorkError {
    #[error("transaction already started")]
    TransactionAlreadyActive,

    #[error("failed to start transaction: {0}")]
    TransactionStartFailed(#[source] BoxError),

    #[error("transaction commit failed: {0}")]
    CommitFailed(#[source] BoxError),

    #[error("transaction rollback failed: {0}")]
    RollbackFailed(#[source] BoxError),

    #[error("no active transaction")]
    NoActiveTransaction,

    /// A failed operation whose recovery rollback failed as well.
    ///
    /// Both causes are kept as values so callers can inspect or downcast each
    /// one independently.
    #[error("{primary}; {rollback}")]
    CombinedFailure {
        #[source]
        primary: BoxError,
        rollback: Box<UnitOfWorkError>,
    },

    #[error("repository not registered: {0}")]
    UnknownRepository(String),

    #[error("repository `{name}` is registered as {registered}, not {expected}")]
    RepositoryTypeMismatch {
        name: String,
        expected: &'static str,
        registered: &'static str,
    },

    #[error("transaction already committed or rolled back")]
    TransactionFinalized,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Failure raised by caller code running inside a unit of work.
    #[error(transparent)]
    Operation(BoxError),
}

/// Result type for unit-of-work operations
pub type UnitOfWorkResult<T> = Result<T, UnitOfWorkError>;

impl UnitOfWorkError {
    /// Wraps a caller-side failure so it can be returned from a unit of work.
    pub fn operation(err: impl Into<BoxError>) -> Self {
        Self::Operation(err.into())
    }

    /// The operation failure of a `CombinedFailure`.
    pub fn primary(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Self::CombinedFailure { primary, .. } => Some(primary.as_ref()),
            _ => None,
        }
    }

    /// The recovery rollback failure of a `CombinedFailure`.
    pub fn rollback_error(&self) -> Option<&UnitOfWorkError> {
        match self {
            Self::CombinedFailure { rollback, .. } => Some(rollback.as_ref()),
            _ => None,
        }
    }

    /// True when the transaction outcome is unknown and the handle was retained.
    pub fn is_uncertain(&self) -> bool {
        matches!(self, Self::RollbackFailed(_) | Self::CombinedFailure { .. })
    }

    pub(crate) fn combined(primary: impl Into<BoxError>, rollback: UnitOfWorkError) -> Self {
        Self::CombinedFailure {
            primary: primary.into(),
            rollback: Box::new(rollback),
        }
    }
}
