//! PostgreSQL connection.
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::Postgres;

pub const DEFAULT_CREDENTIALS: &str = "postgres";
pub const DEFAULT_DATABASE_NAME: &str = "bridge";
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// Connect using the `postgres` configuration entry.
pub async fn connect(config: &Postgres) -> Result<PgPool, sqlx::Error> {
    let username = config.username.as_deref().unwrap_or(DEFAULT_CREDENTIALS);
    let password = config.password.as_deref().unwrap_or(DEFAULT_CREDENTIALS);
    let db = config.database.as_deref().unwrap_or(DEFAULT_DATABASE_NAME);

    let addr = format!("postgres://{username}:{password}@{}/{db}", config.address);
    let pool = connect_url(&addr, config.pool_size.unwrap_or(DEFAULT_POOL_SIZE)).await?;

    tracing::info!(hostname = %config.address, %db, "postgres connected");

    Ok(pool)
}

/// Connect using a full connection URL.
pub async fn connect_url(url: &str, pool: u32) -> Result<PgPool, sqlx::Error> {
    let postgres = PgPoolOptions::new().max_connections(pool).connect(url).await?;

    // execute migrations scripts on start.
    sqlx::migrate!().run(&postgres).await?;

    Ok(postgres)
}
