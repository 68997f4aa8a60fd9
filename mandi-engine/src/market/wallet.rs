use super::{Market, MarketResult};
use crate::clock::Clock;
use crate::error::Store as _;
use mandi_core::ValidationError;
use mandi_core::models::{
    Amount, EntryId, EntryKind, EntryState, UserId, Wallet, WalletEntry,
};
use mandi_core::ports::{MarketRepository, Notifier, WalletRepository};
use tracing::info;

impl<R: MarketRepository, N: Notifier, C: Clock> Market<R, N, C> {
    /// Credit funds to a user's wallet
    pub async fn deposit(&self, user_id: UserId, amount: Amount) -> MarketResult<Wallet, R> {
        self.post(user_id, amount, EntryKind::Deposit, "deposit").await
    }

    /// Take funds out of a user's wallet. The balance may not go negative.
    pub async fn withdraw_funds(&self, user_id: UserId, amount: Amount) -> MarketResult<Wallet, R> {
        self.post(user_id, -amount, EntryKind::Withdrawal, "withdrawal")
            .await
    }

    async fn post(
        &self,
        user_id: UserId,
        signed: Amount,
        kind: EntryKind,
        description: &str,
    ) -> MarketResult<Wallet, R> {
        let magnitude = if kind == EntryKind::Withdrawal { -signed } else { signed };
        if !magnitude.is_positive() {
            return Err(ValidationError::NonPositiveAmount(magnitude).into());
        }
        self.load_user(user_id).await?;

        let _wallet = self.lock_wallets([user_id]).await;
        let entry = WalletEntry {
            id: EntryId::random(),
            user_id,
            amount: signed,
            kind,
            state: EntryState::Final,
            transaction_id: None,
            description: description.to_owned(),
            created_at: self.now(),
        };
        let allow_overdraft = kind != EntryKind::Withdrawal;
        let wallet = self
            .repo
            .post_entry(&entry, allow_overdraft)
            .await
            .store()??;
        info!(%user_id, %kind, amount = %signed, balance = %wallet.balance, "wallet posted");
        Ok(wallet)
    }

    /// A user's wallet. A user who never transacted has an empty one.
    pub async fn wallet(&self, user_id: UserId) -> MarketResult<Wallet, R> {
        Ok(self
            .repo
            .get_wallet(user_id)
            .await
            .store()?
            .unwrap_or_else(|| Wallet {
                user_id,
                balance: Amount::ZERO,
                updated_at: self.now(),
            }))
    }

    /// A user's ledger, oldest first
    pub async fn entries(&self, user_id: UserId) -> MarketResult<Vec<WalletEntry>, R> {
        self.repo.entries(user_id).await.store()
    }
}
