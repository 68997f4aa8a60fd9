use crate::ValidationError;
use crate::models::{TransactionId, UserId, Wallet, WalletEntry};
use std::future::Future;

/// Repository interface for wallets and their ledgers.
///
/// Implementations must keep `Wallet::balance` equal to the sum of the
/// wallet's non-reversed entries, updating both in the same atomic write.
pub trait WalletRepository: super::Repository {
    /// The wallet of a user, if any entry was ever posted to it
    fn get_wallet(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<Wallet>, Self::Error>> + Send;

    /// A user's ledger, oldest first
    fn entries(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<WalletEntry>, Self::Error>> + Send;

    /// The entries posted for a marketplace transaction
    fn transaction_entries(
        &self,
        transaction_id: TransactionId,
    ) -> impl Future<Output = Result<Vec<WalletEntry>, Self::Error>> + Send;

    /// Append a standalone entry (deposit or withdrawal), creating the wallet
    /// if needed. Unless `allow_overdraft`, an entry that would take the
    /// balance below zero is refused with `InsufficientFunds`.
    fn post_entry(
        &self,
        entry: &WalletEntry,
        allow_overdraft: bool,
    ) -> impl Future<Output = Result<Result<Wallet, ValidationError>, Self::Error>> + Send;
}
