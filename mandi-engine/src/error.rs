use mandi_core::models::{BidRejection, DisputeRejection, PoolRejection};
use mandi_core::{ConflictError, SettlementFailure, ValidationError};
use thiserror::Error;

/// Everything an engine operation can fail with, generic over the
/// repository's infrastructure error.
#[derive(Debug, Error)]
pub enum MarketError<E: std::error::Error + 'static> {
    /// The request can never succeed as stated
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The request lost a race; retry with fresh state
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    /// An unknown id
    #[error("{kind} {id} not found")]
    NotFound {
        /// The kind of record
        kind: &'static str,
        /// The id that was looked up
        id: String,
    },
    /// A fill could not be settled
    #[error(transparent)]
    Settlement(#[from] SettlementFailure),
    /// The store failed
    #[error("store failure: {0}")]
    Transient(#[source] E),
}

impl<E: std::error::Error + 'static> MarketError<E> {
    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether retrying the same request later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Conflict(_))
    }
}

impl<E: std::error::Error + 'static> From<BidRejection> for MarketError<E> {
    fn from(value: BidRejection) -> Self {
        Self::Validation(value.into())
    }
}

impl<E: std::error::Error + 'static> From<PoolRejection> for MarketError<E> {
    fn from(value: PoolRejection) -> Self {
        Self::Validation(value.into())
    }
}

impl<E: std::error::Error + 'static> From<DisputeRejection> for MarketError<E> {
    fn from(value: DisputeRejection) -> Self {
        Self::Validation(value.into())
    }
}

/// Lift a repository result into the engine's error type.
pub(crate) trait Store<T, E: std::error::Error + 'static> {
    fn store(self) -> Result<T, MarketError<E>>;
}

impl<T, E: std::error::Error + 'static> Store<T, E> for Result<T, E> {
    fn store(self) -> Result<T, MarketError<E>> {
        self.map_err(MarketError::Transient)
    }
}
