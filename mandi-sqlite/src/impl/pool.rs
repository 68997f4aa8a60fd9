use super::{fetch_pool, fetch_pools};
use crate::Db;
use crate::types::{DateTime, PoolRow, millis};
use mandi_core::ConflictError;
use mandi_core::models::{BiddingType, CropId, PoolId, PooledCrop, QualityGrade};
use mandi_core::ports::PoolRepository;
use sqlx::SqliteConnection;

impl PoolRepository for Db {
    async fn create_pool(&self, pool: &PooledCrop) -> Result<(), Self::Error> {
        let auction = &pool.auction;
        sqlx::query(
            r#"
            insert into
                pool (
                    id, commodity, grade, status, threshold, stale_at, created_at,
                    lot_status, bidding_type, floor_price, total_quantity, available_quantity,
                    schedule_start, schedule_ms, window_start, window_end, attempt_number
                )
            values
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, null, null, $15)
            "#,
        )
        .bind(pool.id.0)
        .bind(&pool.commodity)
        .bind(pool.grade.as_str())
        .bind(pool.status.as_str())
        .bind(pool.threshold.0)
        .bind(DateTime::from(pool.stale_at))
        .bind(DateTime::from(pool.created_at))
        .bind(auction.status.as_str())
        .bind(auction.bidding_type.as_str())
        .bind(auction.floor_price.0)
        .bind(auction.total_quantity.0)
        .bind(auction.available_quantity.0)
        .bind(auction.schedule.map(|s| DateTime::from(s.start)))
        .bind(auction.schedule.map(|s| millis(s.duration)))
        .bind(i64::from(auction.attempt_number))
        .execute(&self.writer)
        .await?;
        Ok(())
    }

    async fn find_forming_pool(
        &self,
        commodity: &str,
        grade: QualityGrade,
        bidding_type: BiddingType,
    ) -> Result<Option<PooledCrop>, Self::Error> {
        let mut conn = self.reader.acquire().await?;
        let rows: Vec<PoolRow> = sqlx::query_as(select_pool!(
            "where status = 'forming' and commodity = $1 and grade = $2 and bidding_type = $3 \
             order by created_at, rowid limit 1"
        ))
        .bind(commodity)
        .bind(grade.as_str())
        .bind(bidding_type.as_str())
        .fetch_all(&mut *conn)
        .await?;
        Ok(fetch_pools(&mut conn, rows).await?.pop())
    }

    async fn forming_pools(&self) -> Result<Vec<PooledCrop>, Self::Error> {
        let mut conn = self.reader.acquire().await?;
        let rows: Vec<PoolRow> =
            sqlx::query_as(select_pool!("where status = 'forming' order by created_at, rowid"))
                .fetch_all(&mut *conn)
                .await?;
        fetch_pools(&mut conn, rows).await
    }

    async fn join_pool(
        &self,
        pool: &PooledCrop,
        crop_id: CropId,
    ) -> Result<Result<(), ConflictError>, Self::Error> {
        let mut tx = self.writer.begin().await?;

        if !write_totals(&mut tx, pool).await? {
            return Ok(Err(ConflictError::Stale));
        }

        let joined = sqlx::query(
            r#"
            update
                crop
            set
                lot_status = 'pooled',
                pool_id = $2
            where
                id = $1
            and
                lot_status = 'draft'
            and
                pool_id is null
            and
                available_quantity = total_quantity
            "#,
        )
        .bind(crop_id.0)
        .bind(pool.id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if joined == 0 {
            return Ok(Err(ConflictError::Stale));
        }

        sqlx::query(
            r#"
            insert into
                pool_member (pool_id, crop_id, position)
            values (
                $1,
                $2,
                (select coalesce(max(position), 0) + 1 from pool_member where pool_id = $1)
            )
            "#,
        )
        .bind(pool.id.0)
        .bind(crop_id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Ok(()))
    }

    async fn leave_pool(
        &self,
        pool: &PooledCrop,
        crop_id: CropId,
    ) -> Result<Result<(), ConflictError>, Self::Error> {
        let mut tx = self.writer.begin().await?;

        if !write_totals(&mut tx, pool).await? {
            return Ok(Err(ConflictError::Stale));
        }

        let left = sqlx::query(
            r#"
            update
                crop
            set
                lot_status = 'draft',
                pool_id = null
            where
                id = $1 and pool_id = $2 and lot_status = 'pooled'
            "#,
        )
        .bind(crop_id.0)
        .bind(pool.id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if left == 0 {
            return Ok(Err(ConflictError::Stale));
        }

        sqlx::query("delete from pool_member where pool_id = $1 and crop_id = $2")
            .bind(pool.id.0)
            .bind(crop_id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Ok(()))
    }

    async fn lock_pool(&self, pool: &PooledCrop) -> Result<Result<(), ConflictError>, Self::Error> {
        let auction = &pool.auction;
        let locked = sqlx::query(
            r#"
            update
                pool
            set
                status = $2,
                lot_status = $3,
                schedule_start = $4,
                schedule_ms = $5,
                attempt_number = $6
            where
                id = $1 and status = 'forming' and lot_status = 'draft'
            "#,
        )
        .bind(pool.id.0)
        .bind(pool.status.as_str())
        .bind(auction.status.as_str())
        .bind(auction.schedule.map(|s| DateTime::from(s.start)))
        .bind(auction.schedule.map(|s| millis(s.duration)))
        .bind(i64::from(auction.attempt_number))
        .execute(&self.writer)
        .await?
        .rows_affected();

        if locked == 0 {
            Ok(Err(ConflictError::Stale))
        } else {
            Ok(Ok(()))
        }
    }

    async fn dissolve_pool(&self, pool_id: PoolId) -> Result<Result<(), ConflictError>, Self::Error> {
        let mut tx = self.writer.begin().await?;

        let dissolved = sqlx::query(
            "update pool set status = 'dissolved' where id = $1 and status = 'forming'",
        )
        .bind(pool_id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if dissolved == 0 {
            return Ok(Err(ConflictError::Stale));
        }

        sqlx::query(
            r#"
            update
                crop
            set
                lot_status = 'draft',
                pool_id = null
            where
                pool_id = $1 and lot_status = 'pooled'
            "#,
        )
        .bind(pool_id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Ok(()))
    }
}

// Store the quantities and floor a membership change produced, provided
// the pool is still forming.
async fn write_totals(conn: &mut SqliteConnection, pool: &PooledCrop) -> Result<bool, sqlx::Error> {
    let auction = &pool.auction;
    let updated = sqlx::query(
        r#"
        update
            pool
        set
            floor_price = $2,
            total_quantity = $3,
            available_quantity = $4
        where
            id = $1 and status = 'forming'
        "#,
    )
    .bind(pool.id.0)
    .bind(auction.floor_price.0)
    .bind(auction.total_quantity.0)
    .bind(auction.available_quantity.0)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    Ok(updated == 1)
}
