use super::lot_table;
use crate::Db;
use crate::types::{BidRow, DateTime, convert, parse};
use mandi_core::models::{Bid, BidId, BidRejection, LotId, LotStatus, Quantity};
use mandi_core::ports::BidRepository;

#[derive(sqlx::FromRow)]
struct Capacity {
    lot_status: String,
    attempt_number: i64,
    available_quantity: i64,
}

impl BidRepository for Db {
    async fn place_bid(
        &self,
        bid: &Bid,
        supersedes: Option<BidId>,
    ) -> Result<Result<(), BidRejection>, Self::Error> {
        let mut tx = self.writer.begin().await?;

        let sql = format!(
            "select lot_status, attempt_number, available_quantity from {} where id = $1",
            lot_table(bid.lot_id)
        );
        let capacity: Option<Capacity> = sqlx::query_as(&sql)
            .bind(bid.lot_id.uuid())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(capacity) = capacity else {
            return Err(sqlx::Error::RowNotFound);
        };

        let status: LotStatus = parse(&capacity.lot_status)?;
        if status != LotStatus::Open {
            return Ok(Err(BidRejection::LotNotOpen(status)));
        }
        if capacity.attempt_number != i64::from(bid.attempt_number) {
            return Ok(Err(BidRejection::WindowClosed));
        }
        if capacity.available_quantity < bid.quantity.0 {
            return Ok(Err(BidRejection::ExceedsAvailable {
                requested: bid.quantity,
                available: Quantity(capacity.available_quantity),
            }));
        }

        if let Some(previous) = supersedes {
            sqlx::query("update bid set status = 'superseded' where id = $1 and status = 'pending'")
                .bind(previous.0)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            insert into
                bid (
                    id, lot_kind, lot_id, attempt_number, retailer_id, quantity, price,
                    placed_at, status, filled_quantity, rejection
                )
            values
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(bid.id.0)
        .bind(bid.lot_id.kind())
        .bind(bid.lot_id.uuid())
        .bind(i64::from(bid.attempt_number))
        .bind(bid.retailer_id.0)
        .bind(bid.quantity.0)
        .bind(bid.price.0)
        .bind(DateTime::from(bid.placed_at))
        .bind(bid.status.as_str())
        .bind(bid.filled_quantity.0)
        .bind(bid.rejection.as_deref())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Ok(()))
    }

    async fn get_bid(&self, bid_id: BidId) -> Result<Option<Bid>, Self::Error> {
        let row: Option<BidRow> = sqlx::query_as(
            r#"
            select
                id, lot_kind, lot_id, attempt_number, retailer_id, quantity, price,
                placed_at, status, filled_quantity, rejection
            from
                bid
            where
                id = $1
            "#,
        )
        .bind(bid_id.0)
        .fetch_optional(&self.reader)
        .await?;
        row.map(Bid::try_from).transpose()
    }

    async fn bids_for(&self, lot_id: LotId, attempt_number: u32) -> Result<Vec<Bid>, Self::Error> {
        let rows: Vec<BidRow> = sqlx::query_as(
            r#"
            select
                id, lot_kind, lot_id, attempt_number, retailer_id, quantity, price,
                placed_at, status, filled_quantity, rejection
            from
                bid
            where
                lot_kind = $1 and lot_id = $2 and attempt_number = $3
            order by
                placed_at, rowid
            "#,
        )
        .bind(lot_id.kind())
        .bind(lot_id.uuid())
        .bind(i64::from(attempt_number))
        .fetch_all(&self.reader)
        .await?;
        convert(rows)
    }

    async fn reject_bid(&self, bid_id: BidId, reason: BidRejection) -> Result<(), Self::Error> {
        sqlx::query(
            r#"
            update
                bid
            set
                status = 'rejected',
                rejection = $2
            where
                id = $1 and status = 'pending'
            "#,
        )
        .bind(bid_id.0)
        .bind(reason.code())
        .execute(&self.writer)
        .await?;
        Ok(())
    }
}
