#![warn(missing_docs)]
//! A SQLite implementation of the `mandi-core` storage ports.
//!
//! [`Db`] implements every repository trait the engine needs, so a
//! `Market<Db>` is a complete marketplace. Guarded writes (settlement,
//! closes, pool membership, dispute holds) each run inside a single write
//! transaction, and the single-connection writer pool serializes them.
//!
//! The schema lives in `schema/` and is applied on [`Db::open`].

use mandi_core::models::User;
use sqlx::sqlite;
use std::{str::FromStr, time::Duration};
use tokio::try_join;

pub mod config;
mod r#impl;
pub mod types;

use config::SqliteConfig;

/// SQLite database implementation of the marketplace repositories.
///
/// This struct provides separate reader and writer connection pools to a
/// SQLite database. Reads that need to be consistent with a write happen
/// inside the writer's transaction; everything else goes to the reader.
///
/// # Connection Management
///
/// - `reader`: A connection pool for read operations, allowing concurrent reads
/// - `writer`: A single-connection pool for write operations, ensuring serialized writes
///
/// # Example
///
/// ```no_run
/// # use mandi_sqlite::{Db, config::SqliteConfig};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let db = Db::open(&SqliteConfig::default()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Db {
    /// Connection pool for read operations
    pub reader: sqlx::Pool<sqlx::Sqlite>,
    /// Connection pool for write operations (limited to 1 connection)
    pub writer: sqlx::Pool<sqlx::Sqlite>,
}

impl Db {
    /// Open a connection to the specified SQLite database.
    ///
    /// Creates a new database if one doesn't exist (when `create_if_missing`
    /// is true) and applies all pending migrations.
    ///
    /// # Database Configuration
    ///
    /// - WAL mode for better concurrency
    /// - Foreign keys enabled for referential integrity
    /// - A busy timeout so that readers wait out the writer
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error` if the connection fails or a migration fails to
    /// apply.
    pub async fn open(config: &SqliteConfig) -> Result<Self, sqlx::Error> {
        let db_path = config
            .database_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());

        let options =
            sqlite::SqliteConnectOptions::from_str(db_path.as_deref().unwrap_or(":memory:"))?
                .busy_timeout(Duration::from_secs(5))
                .foreign_keys(true)
                .journal_mode(sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlite::SqliteSynchronous::Normal)
                .pragma("journal_size_limit", "27103364")
                .pragma("mmap_size", "134217728")
                .pragma("temp_store", "memory")
                .create_if_missing(config.create_if_missing);

        let reader = sqlite::SqlitePoolOptions::new().connect_with(options.clone());
        let writer = sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options);

        let (reader, writer) = try_join!(reader, writer)?;

        sqlx::migrate!("./schema").run(&writer).await?;

        Ok(Self { reader, writer })
    }

    /// Insert or update a user record.
    ///
    /// The engine treats identities as read-only; this is how an operator
    /// tool (or a test) provisions them.
    pub async fn register_user(&self, user: &User) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            insert into
                user (id, name, role)
            values
                ($1, $2, $3)
            on conflict (id) do update set
                name = excluded.name,
                role = excluded.role
            "#,
        )
        .bind(user.id.0)
        .bind(&user.name)
        .bind(user.role.as_str())
        .execute(&self.writer)
        .await?;
        Ok(())
    }
}
