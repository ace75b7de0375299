//! Storage layer: connection pool, row models, repositories, and the
//! concurrency-control services built on them.
//!
//! The services (`locks::LockManager`, `users::UserService`,
//! `sessions::SessionService`) are the only mutation surface the rest
//! of the system uses; repositories underneath them are plain CRUD.

use sqlx::postgres::PgPoolOptions;

pub mod background;
pub mod error;
pub mod locks;
pub mod models;
pub mod repositories;
pub mod sessions;
pub mod users;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Verify the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
