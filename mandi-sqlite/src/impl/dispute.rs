use super::refresh_balance;
use crate::Db;
use crate::types::{DateTime, DisputeRow, convert, parse};
use mandi_core::ConflictError;
use mandi_core::models::{
    Dispute, DisputeId, DisputeRejection, DisputeStatus, TransactionId, UserId,
};
use mandi_core::ports::{DisputeRepository, HoldRelease};
use sqlx::types::Json;

macro_rules! select_dispute {
    ($tail:literal) => {
        concat!(
            "select id, transaction_id, raised_by, reason, evidence, status, opened_at, \
             resolved_at, resolution_note from dispute ",
            $tail
        )
    };
}

impl DisputeRepository for Db {
    async fn open_dispute(
        &self,
        dispute: &Dispute,
    ) -> Result<Result<(), DisputeRejection>, Self::Error> {
        let mut tx = self.writer.begin().await?;

        let active: Option<uuid::Uuid> = sqlx::query_scalar(
            r#"
            select
                id
            from
                dispute
            where
                transaction_id = $1 and status in ('open', 'under_review')
            "#,
        )
        .bind(dispute.transaction_id.0)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(existing) = active {
            return Ok(Err(DisputeRejection::AlreadyDisputed(existing.into())));
        }

        sqlx::query(
            r#"
            insert into
                dispute (
                    id, transaction_id, raised_by, reason, evidence, status, opened_at,
                    resolved_at, resolution_note
                )
            values
                ($1, $2, $3, $4, $5, $6, $7, null, null)
            "#,
        )
        .bind(dispute.id.0)
        .bind(dispute.transaction_id.0)
        .bind(dispute.raised_by.0)
        .bind(&dispute.reason)
        .bind(Json(&dispute.evidence))
        .bind(dispute.status.as_str())
        .bind(DateTime::from(dispute.opened_at))
        .execute(&mut *tx)
        .await?;

        // Freeze the money; held entries still count towards the balance
        sqlx::query(
            r#"
            update
                wallet_entry
            set
                state = 'held'
            where
                transaction_id = $1 and state in ('pending', 'final')
            "#,
        )
        .bind(dispute.transaction_id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Ok(()))
    }

    async fn get_dispute(&self, dispute_id: DisputeId) -> Result<Option<Dispute>, Self::Error> {
        let row: Option<DisputeRow> = sqlx::query_as(select_dispute!("where id = $1"))
            .bind(dispute_id.0)
            .fetch_optional(&self.reader)
            .await?;
        row.map(Dispute::try_from).transpose()
    }

    async fn disputes_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<Dispute>, Self::Error> {
        let rows: Vec<DisputeRow> =
            sqlx::query_as(select_dispute!("where transaction_id = $1 order by opened_at, rowid"))
                .bind(transaction_id.0)
                .fetch_all(&self.reader)
                .await?;
        convert(rows)
    }

    async fn update_dispute(
        &self,
        dispute: &Dispute,
        expected: DisputeStatus,
    ) -> Result<bool, Self::Error> {
        let updated = sqlx::query(
            r#"
            update
                dispute
            set
                status = $2,
                evidence = $3
            where
                id = $1 and status = $4
            "#,
        )
        .bind(dispute.id.0)
        .bind(dispute.status.as_str())
        .bind(Json(&dispute.evidence))
        .bind(expected.as_str())
        .execute(&self.writer)
        .await?
        .rows_affected();
        Ok(updated == 1)
    }

    async fn resolve_dispute(
        &self,
        dispute: &Dispute,
        expected: DisputeStatus,
        release: HoldRelease,
    ) -> Result<Result<(), ConflictError>, Self::Error> {
        let at = DateTime::from(dispute.resolved_at.unwrap_or(dispute.opened_at));
        let mut tx = self.writer.begin().await?;

        let resolved = sqlx::query(
            r#"
            update
                dispute
            set
                status = $2,
                evidence = $3,
                resolved_at = $4,
                resolution_note = $5
            where
                id = $1 and status = $6
            "#,
        )
        .bind(dispute.id.0)
        .bind(dispute.status.as_str())
        .bind(Json(&dispute.evidence))
        .bind(at)
        .bind(dispute.resolution_note.as_deref())
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if resolved == 0 {
            let current: Option<String> =
                sqlx::query_scalar("select status from dispute where id = $1")
                    .bind(dispute.id.0)
                    .fetch_optional(&mut *tx)
                    .await?;
            let current = current.as_deref().map(parse::<DisputeStatus>).transpose()?;
            let conflict = match current.and_then(|status| status.resolution()) {
                Some(existing) => ConflictError::AlreadyResolved { existing },
                None => ConflictError::Stale,
            };
            return Ok(Err(conflict));
        }

        match release {
            HoldRelease::Reverse => {
                sqlx::query(
                    "update wallet_entry set state = 'reversed' where transaction_id = $1 and state = 'held'",
                )
                .bind(dispute.transaction_id.0)
                .execute(&mut *tx)
                .await?;
                sqlx::query("update sale set payment_status = 'refunded' where id = $1")
                    .bind(dispute.transaction_id.0)
                    .execute(&mut *tx)
                    .await?;

                let parties: Vec<uuid::Uuid> = sqlx::query_scalar(
                    "select distinct user_id from wallet_entry where transaction_id = $1",
                )
                .bind(dispute.transaction_id.0)
                .fetch_all(&mut *tx)
                .await?;
                for user_id in parties {
                    refresh_balance(&mut tx, UserId::from(user_id), at).await?;
                }
            }
            HoldRelease::Restore(state) => {
                sqlx::query(
                    "update wallet_entry set state = $2 where transaction_id = $1 and state = 'held'",
                )
                .bind(dispute.transaction_id.0)
                .bind(state.as_str())
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(Ok(()))
    }
}
