use super::{fetch_pool, lot_table};
use crate::Db;
use crate::types::{ClosingRow, CropRow, DateTime, LotRef, attempt, convert, millis};
use mandi_core::ConflictError;
use mandi_core::models::{AuctionState, Crop, CropId, Lot, LotId, LotStatus, PoolId, UserId};
use mandi_core::ports::{ClosingRecord, LotRepository};
use sqlx::SqliteConnection;
use time::OffsetDateTime;

impl LotRepository for Db {
    async fn create_crop(&self, crop: &Crop) -> Result<(), Self::Error> {
        let auction = &crop.auction;
        sqlx::query(
            r#"
            insert into
                crop (
                    id, farmer_id, commodity, grade, pool_id, created_at,
                    lot_status, bidding_type, floor_price, total_quantity, available_quantity,
                    schedule_start, schedule_ms, window_start, window_end, attempt_number
                )
            values
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(crop.id.0)
        .bind(crop.farmer_id.0)
        .bind(&crop.commodity)
        .bind(crop.grade.as_str())
        .bind(crop.pool_id.map(|id| id.0))
        .bind(DateTime::from(crop.created_at))
        .bind(auction.status.as_str())
        .bind(auction.bidding_type.as_str())
        .bind(auction.floor_price.0)
        .bind(auction.total_quantity.0)
        .bind(auction.available_quantity.0)
        .bind(auction.schedule.map(|s| DateTime::from(s.start)))
        .bind(auction.schedule.map(|s| millis(s.duration)))
        .bind(auction.window.map(|w| DateTime::from(w.start)))
        .bind(auction.window.map(|w| DateTime::from(w.end)))
        .bind(i64::from(auction.attempt_number))
        .execute(&self.writer)
        .await?;
        Ok(())
    }

    async fn get_crop(&self, crop_id: CropId) -> Result<Option<Crop>, Self::Error> {
        let row: Option<CropRow> = sqlx::query_as(select_crop!("where id = $1"))
            .bind(crop_id.0)
            .fetch_optional(&self.reader)
            .await?;
        row.map(Crop::try_from).transpose()
    }

    async fn get_lot(&self, lot_id: LotId) -> Result<Option<Lot>, Self::Error> {
        match lot_id {
            LotId::Crop(crop_id) => Ok(self.get_crop(crop_id).await?.map(Lot::Crop)),
            LotId::Pool(pool_id) => {
                let mut conn = self.reader.acquire().await?;
                Ok(fetch_pool(&mut conn, pool_id).await?.map(Lot::Pool))
            }
        }
    }

    async fn crops_by_farmer(&self, farmer_id: UserId) -> Result<Vec<Crop>, Self::Error> {
        let rows: Vec<CropRow> = sqlx::query_as(select_crop!(
            "where farmer_id = $1 order by created_at desc, rowid desc"
        ))
        .bind(farmer_id.0)
        .fetch_all(&self.reader)
        .await?;
        convert(rows)
    }

    async fn update_auction(
        &self,
        lot_id: LotId,
        expected: (LotStatus, u32),
        state: &AuctionState,
    ) -> Result<Result<(), ConflictError>, Self::Error> {
        let mut tx = self.writer.begin().await?;
        if let Err(conflict) = write_auction(&mut tx, lot_id, expected, state).await? {
            return Ok(Err(conflict));
        }
        tx.commit().await?;
        Ok(Ok(()))
    }

    async fn finish_close(
        &self,
        record: &ClosingRecord,
        expected: (LotStatus, u32),
        state: &AuctionState,
    ) -> Result<Result<(), ConflictError>, Self::Error> {
        let mut tx = self.writer.begin().await?;

        let inserted = sqlx::query(
            r#"
            insert into
                lot_closing (lot_kind, lot_id, attempt_number, outcome, sold_quantity, closed_at)
            values
                ($1, $2, $3, $4, $5, $6)
            on conflict
                do nothing
            "#,
        )
        .bind(record.lot_id.kind())
        .bind(record.lot_id.uuid())
        .bind(i64::from(record.attempt_number))
        .bind(record.outcome.kind())
        .bind(record.outcome.sold().0)
        .bind(DateTime::from(record.closed_at))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Ok(Err(ConflictError::Stale));
        }
        if let Err(conflict) = write_auction(&mut tx, record.lot_id, expected, state).await? {
            return Ok(Err(conflict));
        }

        tx.commit().await?;
        Ok(Ok(()))
    }

    async fn get_closing(
        &self,
        lot_id: LotId,
        attempt_number: u32,
    ) -> Result<Option<ClosingRecord>, Self::Error> {
        let row: Option<ClosingRow> = sqlx::query_as(
            r#"
            select
                lot_kind, lot_id, attempt_number, outcome, sold_quantity, closed_at
            from
                lot_closing
            where
                lot_kind = $1 and lot_id = $2 and attempt_number = $3
            "#,
        )
        .bind(lot_id.kind())
        .bind(lot_id.uuid())
        .bind(i64::from(attempt_number))
        .fetch_optional(&self.reader)
        .await?;
        row.map(ClosingRecord::try_from).transpose()
    }

    async fn lots_due_to_open(
        &self,
        now: OffsetDateTime,
    ) -> Result<Vec<(LotId, u32)>, Self::Error> {
        let rows: Vec<LotRef> = sqlx::query_as(
            r#"
            select 'crop' as lot_kind, id as lot_id, attempt_number, schedule_start as due
            from crop
            where lot_status = 'scheduled' and schedule_start <= $1
            union all
            select 'pool' as lot_kind, id as lot_id, attempt_number, schedule_start as due
            from pool
            where lot_status = 'scheduled' and schedule_start <= $1
            order by due
            "#,
        )
        .bind(DateTime::from(now))
        .fetch_all(&self.reader)
        .await?;
        rows.into_iter().map(LotRef::parts).collect()
    }

    async fn lots_due_to_close(
        &self,
        now: OffsetDateTime,
    ) -> Result<Vec<(LotId, u32)>, Self::Error> {
        let rows: Vec<LotRef> = sqlx::query_as(
            r#"
            select 'crop' as lot_kind, id as lot_id, attempt_number, window_end as due
            from crop
            where lot_status = 'open' and window_end <= $1
            union all
            select 'pool' as lot_kind, id as lot_id, attempt_number, window_end as due
            from pool
            where lot_status = 'open' and window_end <= $1
            order by due
            "#,
        )
        .bind(DateTime::from(now))
        .fetch_all(&self.reader)
        .await?;
        rows.into_iter().map(LotRef::parts).collect()
    }
}

// The guarded auction write shared by `update_auction` and `finish_close`.
// The caller owns the transaction and rolls back on conflict.
async fn write_auction(
    conn: &mut SqliteConnection,
    lot_id: LotId,
    expected: (LotStatus, u32),
    state: &AuctionState,
) -> Result<Result<(), ConflictError>, sqlx::Error> {
    let table = lot_table(lot_id);
    let sql = format!(
        r#"
        update
            {table}
        set
            lot_status = $2,
            schedule_start = $3,
            schedule_ms = $4,
            window_start = $5,
            window_end = $6,
            attempt_number = $7
        where
            id = $1 and lot_status = $8 and attempt_number = $9
        "#
    );
    let updated = sqlx::query(&sql)
        .bind(lot_id.uuid())
        .bind(state.status.as_str())
        .bind(state.schedule.map(|s| DateTime::from(s.start)))
        .bind(state.schedule.map(|s| millis(s.duration)))
        .bind(state.window.map(|w| DateTime::from(w.start)))
        .bind(state.window.map(|w| DateTime::from(w.end)))
        .bind(i64::from(state.attempt_number))
        .bind(expected.0.as_str())
        .bind(i64::from(expected.1))
        .execute(&mut *conn)
        .await?
        .rows_affected();

    if updated == 0 {
        let sql = format!("select attempt_number from {table} where id = $1");
        let current: Option<i64> = sqlx::query_scalar(&sql)
            .bind(lot_id.uuid())
            .fetch_optional(&mut *conn)
            .await?;
        let conflict = match current {
            Some(current) if current != i64::from(expected.1) => ConflictError::StaleAttempt {
                requested: expected.1,
                current: attempt(current)?,
            },
            _ => ConflictError::Stale,
        };
        return Ok(Err(conflict));
    }

    if let LotId::Pool(pool_id) = lot_id {
        if state.status.is_terminal() {
            release_members(conn, pool_id).await?;
        }
    }
    Ok(Ok(()))
}

// Members of a finished pool leave it: sold-out ones are closed as sold,
// the rest become ordinary drafts again.
async fn release_members(conn: &mut SqliteConnection, pool_id: PoolId) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        update
            crop
        set
            lot_status = case when available_quantity = 0 then 'sold' else 'draft' end,
            pool_id = null
        where
            pool_id = $1 and lot_status = 'pooled'
        "#,
    )
    .bind(pool_id.0)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
