use super::{balance_of, lot_table, refresh_balance};
use crate::Db;
use crate::types::{DateTime, SaleRow, convert};
use mandi_core::models::{
    Amount, EntryId, EntryKind, EntryState, LotId, OrderStatus, PaymentStatus, Quantity,
    Transaction, TransactionId, UserId,
};
use mandi_core::ports::{FillPlan, SettlementRepository};
use mandi_core::{ConflictError, SettlementFailure};
use sqlx::SqliteConnection;
use time::OffsetDateTime;

macro_rules! select_sale {
    ($tail:literal) => {
        concat!(
            "select id, bid_id, lot_kind, lot_id, attempt_number, crop_id, farmer_id, \
             retailer_id, quantity, unit_price, amount, payment_status, order_status, \
             created_at, paid_at from sale ",
            $tail
        )
    };
}

impl SettlementRepository for Db {
    async fn settle_fill(
        &self,
        plan: &FillPlan,
    ) -> Result<Result<Vec<Transaction>, SettlementFailure>, Self::Error> {
        // Price everything up front so an overflow never touches the store
        let mut amounts = Vec::with_capacity(plan.slices.len());
        let mut total = Amount::ZERO;
        for slice in &plan.slices {
            let Some(amount) = plan.unit_price.checked_total(slice.quantity) else {
                return Ok(Err(SettlementFailure::Overflow));
            };
            let Some(sum) = total.checked_add(amount) else {
                return Ok(Err(SettlementFailure::Overflow));
            };
            amounts.push(amount);
            total = sum;
        }

        let at = DateTime::from(plan.at);
        let mut tx = self.writer.begin().await?;

        let bid_status: Option<String> = sqlx::query_scalar("select status from bid where id = $1")
            .bind(plan.bid_id.0)
            .fetch_optional(&mut *tx)
            .await?;
        if bid_status.as_deref() != Some("pending") {
            return Ok(Err(ConflictError::Stale.into()));
        }

        if plan.require_buyer_funds {
            let balance = balance_of(&mut tx, plan.retailer_id).await?;
            if balance < total.0 {
                return Ok(Err(SettlementFailure::InsufficientFunds {
                    balance: Amount(balance),
                    amount: total,
                }));
            }
        }

        let mut transactions = Vec::with_capacity(plan.slices.len());
        for (slice, amount) in plan.slices.iter().zip(amounts) {
            if let Err(conflict) = take(&mut tx, LotId::Crop(slice.crop_id), slice.quantity).await? {
                return Ok(Err(conflict.into()));
            }
            if let LotId::Pool(_) = plan.lot_id {
                if let Err(conflict) = take(&mut tx, plan.lot_id, slice.quantity).await? {
                    return Ok(Err(conflict.into()));
                }
            }

            let transaction = Transaction {
                id: slice.transaction_id,
                bid_id: plan.bid_id,
                lot_id: plan.lot_id,
                attempt_number: plan.attempt_number,
                crop_id: slice.crop_id,
                farmer_id: slice.farmer_id,
                retailer_id: plan.retailer_id,
                quantity: slice.quantity,
                unit_price: plan.unit_price,
                amount,
                payment_status: PaymentStatus::PendingPayment,
                order_status: OrderStatus::Confirmed,
                created_at: plan.at,
                paid_at: None,
            };
            insert_sale(&mut tx, &transaction).await?;

            let description = format!("{} x {} of {}", slice.quantity, plan.unit_price, plan.lot_id);
            post_pending(
                &mut tx,
                plan.retailer_id,
                -amount,
                EntryKind::Purchase,
                transaction.id,
                &description,
                at,
            )
            .await?;
            post_pending(
                &mut tx,
                slice.farmer_id,
                amount,
                EntryKind::Sale,
                transaction.id,
                &description,
                at,
            )
            .await?;

            transactions.push(transaction);
        }

        let accepted = sqlx::query(
            r#"
            update
                bid
            set
                status = 'accepted',
                filled_quantity = $2
            where
                id = $1 and status = 'pending'
            "#,
        )
        .bind(plan.bid_id.0)
        .bind(plan.quantity().0)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if accepted == 0 {
            return Ok(Err(ConflictError::Stale.into()));
        }

        refresh_balance(&mut tx, plan.retailer_id, at).await?;
        let mut farmers: Vec<UserId> = plan.slices.iter().map(|s| s.farmer_id).collect();
        farmers.sort();
        farmers.dedup();
        for farmer_id in farmers {
            refresh_balance(&mut tx, farmer_id, at).await?;
        }

        tx.commit().await?;
        Ok(Ok(transactions))
    }

    async fn get_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<Transaction>, Self::Error> {
        let row: Option<SaleRow> = sqlx::query_as(select_sale!("where id = $1"))
            .bind(transaction_id.0)
            .fetch_optional(&self.reader)
            .await?;
        row.map(Transaction::try_from).transpose()
    }

    async fn transactions_for_lot(&self, lot_id: LotId) -> Result<Vec<Transaction>, Self::Error> {
        let rows: Vec<SaleRow> = sqlx::query_as(select_sale!(
            "where lot_kind = $1 and lot_id = $2 order by created_at, rowid"
        ))
        .bind(lot_id.kind())
        .bind(lot_id.uuid())
        .fetch_all(&self.reader)
        .await?;
        convert(rows)
    }

    async fn confirm_payment(
        &self,
        transaction_id: TransactionId,
        at: OffsetDateTime,
    ) -> Result<bool, Self::Error> {
        let mut tx = self.writer.begin().await?;

        let paid = sqlx::query(
            r#"
            update
                sale
            set
                payment_status = 'paid',
                paid_at = $2
            where
                id = $1 and payment_status = 'pending_payment'
            "#,
        )
        .bind(transaction_id.0)
        .bind(DateTime::from(at))
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if paid == 0 {
            return Ok(false);
        }

        // Held entries stay held; the dispute decides where they go
        sqlx::query(
            "update wallet_entry set state = 'final' where transaction_id = $1 and state = 'pending'",
        )
        .bind(transaction_id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn advance_order(
        &self,
        transaction_id: TransactionId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, Self::Error> {
        let updated = sqlx::query("update sale set order_status = $3 where id = $1 and order_status = $2")
            .bind(transaction_id.0)
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&self.writer)
            .await?
            .rows_affected();
        Ok(updated == 1)
    }
}

// Guarded decrement of a crop's or pool's availability
async fn take(
    conn: &mut SqliteConnection,
    lot_id: LotId,
    quantity: Quantity,
) -> Result<Result<(), ConflictError>, sqlx::Error> {
    let table = lot_table(lot_id);
    let sql = format!(
        "update {table} set available_quantity = available_quantity - $2 \
         where id = $1 and available_quantity >= $2"
    );
    let updated = sqlx::query(&sql)
        .bind(lot_id.uuid())
        .bind(quantity.0)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    if updated == 1 {
        return Ok(Ok(()));
    }

    let sql = format!("select available_quantity from {table} where id = $1");
    let available: Option<i64> = sqlx::query_scalar(&sql)
        .bind(lot_id.uuid())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(Err(ConflictError::Oversell {
        requested: quantity,
        available: Quantity(available.unwrap_or(0)),
    }))
}

async fn insert_sale(conn: &mut SqliteConnection, sale: &Transaction) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        insert into
            sale (
                id, bid_id, lot_kind, lot_id, attempt_number, crop_id, farmer_id, retailer_id,
                quantity, unit_price, amount, payment_status, order_status, created_at, paid_at
            )
        values
            ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, null)
        "#,
    )
    .bind(sale.id.0)
    .bind(sale.bid_id.0)
    .bind(sale.lot_id.kind())
    .bind(sale.lot_id.uuid())
    .bind(i64::from(sale.attempt_number))
    .bind(sale.crop_id.0)
    .bind(sale.farmer_id.0)
    .bind(sale.retailer_id.0)
    .bind(sale.quantity.0)
    .bind(sale.unit_price.0)
    .bind(sale.amount.0)
    .bind(sale.payment_status.as_str())
    .bind(sale.order_status.as_str())
    .bind(DateTime::from(sale.created_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn post_pending(
    conn: &mut SqliteConnection,
    user_id: UserId,
    amount: Amount,
    kind: EntryKind,
    transaction_id: TransactionId,
    description: &str,
    at: DateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        insert into
            wallet_entry (id, user_id, amount, kind, state, transaction_id, description, created_at)
        values
            ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(EntryId::random().0)
    .bind(user_id.0)
    .bind(amount.0)
    .bind(kind.as_str())
    .bind(EntryState::Pending.as_str())
    .bind(transaction_id.0)
    .bind(description)
    .bind(at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
