use crate::ConflictError;
use crate::models::{Dispute, DisputeId, DisputeRejection, DisputeStatus, EntryState, TransactionId};
use std::future::Future;

/// What to do with a transaction's held entries when its dispute ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldRelease {
    /// Reverse them: the buyer is refunded, the seller's credit is cancelled
    /// and the transaction is marked refunded
    Reverse,
    /// Return them to the given state (final if paid, pending otherwise)
    Restore(EntryState),
}

/// Repository interface for disputes.
pub trait DisputeRepository: super::Repository {
    /// Insert an open dispute and hold the transaction's entries, atomically.
    ///
    /// Refused with `AlreadyDisputed` if the transaction has an unresolved
    /// dispute.
    fn open_dispute(
        &self,
        dispute: &Dispute,
    ) -> impl Future<Output = Result<Result<(), DisputeRejection>, Self::Error>> + Send;

    /// Retrieve a dispute
    fn get_dispute(
        &self,
        dispute_id: DisputeId,
    ) -> impl Future<Output = Result<Option<Dispute>, Self::Error>> + Send;

    /// Every dispute raised against a transaction, oldest first
    fn disputes_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> impl Future<Output = Result<Vec<Dispute>, Self::Error>> + Send;

    /// Overwrite a non-terminal dispute's status and evidence, provided it
    /// is still in `expected`. Returns false otherwise.
    fn update_dispute(
        &self,
        dispute: &Dispute,
        expected: DisputeStatus,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// Store the terminal dispute and apply `release` to the transaction's
    /// held entries, atomically. Conflicts if the dispute is no longer in
    /// `expected`.
    fn resolve_dispute(
        &self,
        dispute: &Dispute,
        expected: DisputeStatus,
        release: HoldRelease,
    ) -> impl Future<Output = Result<Result<(), ConflictError>, Self::Error>> + Send;
}
