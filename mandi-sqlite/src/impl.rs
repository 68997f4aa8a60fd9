//! Repository trait implementations for the SQLite database.
//!
//! This module contains the implementations of all storage ports defined in
//! `mandi-core` for the SQLite backend.

use crate::Db;
use crate::types::{DateTime, MemberRow, PoolRow, WalletRow};
use mandi_core::models::{LotId, PoolId, PoolMember, PooledCrop, UserId};
use mandi_core::ports::Repository;
use sqlx::SqliteConnection;

// Crops and pools carry the same auction columns under the same names.
macro_rules! auction_columns {
    () => {
        "lot_status, bidding_type, floor_price, total_quantity, available_quantity, \
         schedule_start, schedule_ms, window_start, window_end, attempt_number"
    };
}

macro_rules! select_crop {
    ($tail:literal) => {
        concat!(
            "select id, farmer_id, commodity, grade, pool_id, created_at, ",
            auction_columns!(),
            " from crop ",
            $tail
        )
    };
}

macro_rules! select_pool {
    ($tail:literal) => {
        concat!(
            "select id, commodity, grade, status, threshold, stale_at, created_at, ",
            auction_columns!(),
            " from pool ",
            $tail
        )
    };
}

mod bid;
mod dispute;
mod identity;
mod lot;
mod pool;
mod settlement;
mod wallet;

impl Repository for Db {
    type Error = sqlx::Error;
}

/// The table holding a lot's auction state
pub(crate) fn lot_table(lot_id: LotId) -> &'static str {
    match lot_id {
        LotId::Crop(_) => "crop",
        LotId::Pool(_) => "pool",
    }
}

/// Load a pool together with its members in join order
pub(crate) async fn fetch_pool(
    conn: &mut SqliteConnection,
    pool_id: PoolId,
) -> Result<Option<PooledCrop>, sqlx::Error> {
    let row: Option<PoolRow> = sqlx::query_as(select_pool!("where id = $1"))
        .bind(pool_id.0)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(row) => Ok(fetch_pools(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// Attach the members to each pool row
pub(crate) async fn fetch_pools(
    conn: &mut SqliteConnection,
    rows: Vec<PoolRow>,
) -> Result<Vec<PooledCrop>, sqlx::Error> {
    let mut pools = Vec::with_capacity(rows.len());
    for row in rows {
        let members: Vec<MemberRow> = sqlx::query_as(
            r#"
            select
                m.crop_id,
                c.farmer_id,
                c.total_quantity as quantity,
                c.floor_price
            from
                pool_member m
            join
                crop c on c.id = m.crop_id
            where
                m.pool_id = $1
            order by
                m.position
            "#,
        )
        .bind(row.id)
        .fetch_all(&mut *conn)
        .await?;
        pools.push(row.into_pool(members.into_iter().map(PoolMember::from).collect())?);
    }
    Ok(pools)
}

/// Recompute a wallet's balance from its ledger and store it.
///
/// The balance column is only ever written here, which keeps it equal to the
/// sum of the non-reversed entries.
pub(crate) async fn refresh_balance(
    conn: &mut SqliteConnection,
    user_id: UserId,
    at: DateTime,
) -> Result<WalletRow, sqlx::Error> {
    sqlx::query_as(
        r#"
        insert into
            wallet (user_id, balance, updated_at)
        values (
            $1,
            (
                select coalesce(sum(amount), 0)
                from wallet_entry
                where user_id = $1 and state != 'reversed'
            ),
            $2
        )
        on conflict (user_id) do update set
            balance = excluded.balance,
            updated_at = excluded.updated_at
        returning
            user_id, balance, updated_at
        "#,
    )
    .bind(user_id.0)
    .bind(at)
    .fetch_one(&mut *conn)
    .await
}

/// The stored balance of a wallet, zero if it does not exist yet
pub(crate) async fn balance_of(
    conn: &mut SqliteConnection,
    user_id: UserId,
) -> Result<i64, sqlx::Error> {
    let balance: Option<i64> = sqlx::query_scalar("select balance from wallet where user_id = $1")
        .bind(user_id.0)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(balance.unwrap_or(0))
}
