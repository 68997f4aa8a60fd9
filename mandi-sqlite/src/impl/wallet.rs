use super::{balance_of, refresh_balance};
use crate::Db;
use crate::types::{DateTime, EntryRow, WalletRow, convert};
use mandi_core::ValidationError;
use mandi_core::models::{Amount, TransactionId, UserId, Wallet, WalletEntry};
use mandi_core::ports::WalletRepository;

macro_rules! select_entry {
    ($tail:literal) => {
        concat!(
            "select id, user_id, amount, kind, state, transaction_id, description, created_at \
             from wallet_entry ",
            $tail
        )
    };
}

impl WalletRepository for Db {
    async fn get_wallet(&self, user_id: UserId) -> Result<Option<Wallet>, Self::Error> {
        let row: Option<WalletRow> =
            sqlx::query_as("select user_id, balance, updated_at from wallet where user_id = $1")
                .bind(user_id.0)
                .fetch_optional(&self.reader)
                .await?;
        Ok(row.map(Wallet::from))
    }

    async fn entries(&self, user_id: UserId) -> Result<Vec<WalletEntry>, Self::Error> {
        let rows: Vec<EntryRow> =
            sqlx::query_as(select_entry!("where user_id = $1 order by created_at, rowid"))
                .bind(user_id.0)
                .fetch_all(&self.reader)
                .await?;
        convert(rows)
    }

    async fn transaction_entries(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<WalletEntry>, Self::Error> {
        let rows: Vec<EntryRow> =
            sqlx::query_as(select_entry!("where transaction_id = $1 order by created_at, rowid"))
                .bind(transaction_id.0)
                .fetch_all(&self.reader)
                .await?;
        convert(rows)
    }

    async fn post_entry(
        &self,
        entry: &WalletEntry,
        allow_overdraft: bool,
    ) -> Result<Result<Wallet, ValidationError>, Self::Error> {
        let mut tx = self.writer.begin().await?;

        if !allow_overdraft {
            let balance = balance_of(&mut tx, entry.user_id).await?;
            if balance.saturating_add(entry.amount.0) < 0 {
                return Ok(Err(ValidationError::InsufficientFunds {
                    balance: Amount(balance),
                    requested: -entry.amount,
                }));
            }
        }

        sqlx::query(
            r#"
            insert into
                wallet_entry (id, user_id, amount, kind, state, transaction_id, description, created_at)
            values
                ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id.0)
        .bind(entry.user_id.0)
        .bind(entry.amount.0)
        .bind(entry.kind.as_str())
        .bind(entry.state.as_str())
        .bind(entry.transaction_id.map(|id| id.0))
        .bind(&entry.description)
        .bind(DateTime::from(entry.created_at))
        .execute(&mut *tx)
        .await?;

        let wallet = refresh_balance(&mut tx, entry.user_id, DateTime::from(entry.created_at)).await?;

        tx.commit().await?;
        Ok(Ok(wallet.into()))
    }
}
