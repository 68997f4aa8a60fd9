use super::{Amount, EntryId, TransactionId, UserId, text_enum};
use time::OffsetDateTime;

/// What a ledger entry records.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Funds added from outside the marketplace
    Deposit,
    /// Funds paid out of the marketplace
    Withdrawal,
    /// The buyer's debit for a transaction
    Purchase,
    /// The seller's credit for a transaction
    Sale,
}

text_enum!(EntryKind {
    Deposit => "deposit",
    Withdrawal => "withdrawal",
    Purchase => "purchase",
    Sale => "sale",
});

/// The finality of a ledger entry.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryState {
    /// Posted at settlement, awaiting payment
    Pending,
    /// Settled and non-reversible
    Final,
    /// Frozen by an open dispute
    Held,
    /// Cancelled by a dispute decided for the buyer; excluded from the balance
    Reversed,
}

text_enum!(EntryState {
    Pending => "pending",
    Final => "final",
    Held => "held",
    Reversed => "reversed",
});

impl EntryState {
    /// Whether the entry counts toward the wallet balance
    pub fn counts(&self) -> bool {
        *self != Self::Reversed
    }
}

/// A per-user balance. The balance is a cache of the ledger: it always
/// equals the sum of the user's non-reversed entries.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Wallet {
    /// The owner
    pub user_id: UserId,
    /// The current balance
    pub balance: Amount,
    /// When the balance last moved
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub updated_at: OffsetDateTime,
}

/// One append-only line of a wallet's ledger.
///
/// Amounts never change once written; only the `state` moves.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct WalletEntry {
    /// The entry's id
    pub id: EntryId,
    /// The wallet owner
    pub user_id: UserId,
    /// Signed amount: credits positive, debits negative
    pub amount: Amount,
    /// What this entry records
    pub kind: EntryKind,
    /// Finality
    pub state: EntryState,
    /// The marketplace transaction this entry belongs to, if any
    pub transaction_id: Option<TransactionId>,
    /// Free-form description
    pub description: String,
    /// When the entry was posted
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub created_at: OffsetDateTime,
}

/// The balance implied by a set of ledger entries
pub fn ledger_balance<'a>(entries: impl IntoIterator<Item = &'a WalletEntry>) -> Amount {
    entries
        .into_iter()
        .filter(|entry| entry.state.counts())
        .map(|entry| entry.amount)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(amount: i64, state: EntryState) -> WalletEntry {
        WalletEntry {
            id: EntryId::random(),
            user_id: UserId::random(),
            amount: Amount(amount),
            kind: EntryKind::Sale,
            state,
            transaction_id: None,
            description: String::new(),
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn reversed_entries_do_not_count() {
        let entries = [
            entry(500, EntryState::Final),
            entry(300, EntryState::Held),
            entry(200, EntryState::Reversed),
            entry(-100, EntryState::Pending),
        ];
        assert_eq!(ledger_balance(&entries), Amount(700));
    }
}
