//! Handle database requests.

use async_trait::async_trait;
use sqlx::postgres::PgQueryResult;
use sqlx::types::Json;
use sqlx::{Pool, Postgres};

use crate::crypto::check_key;
use crate::user::{
    CredentialStore, Partner, PublicKey, Result, StoreError, TokenField, User,
};

const USER_COLUMNS: &str = r#"id, uuid, hashpass, activated, is_free_tier,
    activator, deactivator, resetter, deactivated, created,
    bytes_uploaded, bytes_downloaded, payment_processors,
    referral_partner, preferences"#;

/// PostgreSQL implementation of [`CredentialStore`].
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: Pool<Postgres>,
}

impl PgCredentialStore {
    /// Create a new [`PgCredentialStore`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn find_by_token(&self, field: TokenField, token: &str) -> Result<User> {
        if token.is_empty() {
            return Err(StoreError::NotFound);
        }

        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE {field} = $1");

        sqlx::query_as::<_, User>(&query)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)
    }
}

/// Any update touching no row addressed an unknown user.
fn affected(result: PgQueryResult) -> Result<()> {
    if result.rows_affected() == 0 {
        Err(StoreError::NotFound)
    } else {
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn create_user(&self, user: User) -> Result<User> {
        let user = user.prepare()?;

        sqlx::query(
            r#"INSERT INTO users (id, uuid, hashpass, activated, is_free_tier,
                activator, deactivator, resetter, deactivated, created,
                bytes_uploaded, bytes_downloaded, payment_processors,
                referral_partner, preferences)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"#,
        )
        .bind(&user.id)
        .bind(&user.uuid)
        .bind(&user.hashpass)
        .bind(user.activated)
        .bind(user.is_free_tier)
        .bind(&user.activator)
        .bind(&user.deactivator)
        .bind(&user.resetter)
        .bind(user.deactivated)
        .bind(user.created)
        .bind(Json(&user.bytes_uploaded))
        .bind(Json(&user.bytes_downloaded))
        .bind(&user.payment_processors)
        .bind(&user.referral_partner)
        .bind(Json(&user.preferences))
        .execute(&self.pool)
        .await
        .map_err(|err| match err.as_database_error() {
            Some(db) if db.is_unique_violation() => StoreError::Conflict,
            _ => StoreError::Database(err),
        })?;

        Ok(user)
    }

    async fn get_user(&self, id: &str) -> Result<User> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn find_by_activator(&self, token: &str) -> Result<User> {
        self.find_by_token(TokenField::Activator, token).await
    }

    async fn find_by_deactivator(&self, token: &str) -> Result<User> {
        self.find_by_token(TokenField::Deactivator, token).await
    }

    async fn find_by_resetter(&self, token: &str) -> Result<User> {
        self.find_by_token(TokenField::Resetter, token).await
    }

    async fn set_activated(&self, id: &str) -> Result<()> {
        let result = sqlx::query(
            r#"UPDATE users SET activated = TRUE, activator = NULL, deactivated = FALSE
                WHERE id = $1"#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        affected(result)
    }

    async fn set_activator(&self, id: &str, token: &str) -> Result<()> {
        let result = sqlx::query(r#"UPDATE users SET activator = $1 WHERE id = $2"#)
            .bind(token)
            .bind(id)
            .execute(&self.pool)
            .await?;

        affected(result)
    }

    async fn set_deactivator(&self, id: &str, token: &str) -> Result<()> {
        let result = sqlx::query(r#"UPDATE users SET deactivator = $1 WHERE id = $2"#)
            .bind(token)
            .bind(id)
            .execute(&self.pool)
            .await?;

        affected(result)
    }

    async fn confirm_deactivation(&self, id: &str, activator: &str) -> Result<()> {
        let result = sqlx::query(
            r#"UPDATE users
                SET activated = FALSE, deactivated = TRUE, deactivator = NULL, activator = $1
                WHERE id = $2"#,
        )
        .bind(activator)
        .bind(id)
        .execute(&self.pool)
        .await?;

        affected(result)
    }

    async fn set_resetter(&self, id: &str, token: &str) -> Result<()> {
        let result = sqlx::query(r#"UPDATE users SET resetter = $1 WHERE id = $2"#)
            .bind(token)
            .bind(id)
            .execute(&self.pool)
            .await?;

        affected(result)
    }

    async fn reset_password(&self, id: &str, hashpass: &str) -> Result<()> {
        let result = sqlx::query(
            r#"UPDATE users SET resetter = NULL, hashpass = $1 WHERE id = $2"#,
        )
        .bind(hashpass)
        .bind(id)
        .execute(&self.pool)
        .await?;

        affected(result)
    }

    async fn get_partner(&self, name: &str) -> Result<Partner> {
        sqlx::query_as::<_, Partner>(
            r#"SELECT id, name, rev_share_total_percentage, created
                FROM partners WHERE name = $1"#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn create_public_key(&self, user_id: &str, key: &str) -> Result<()> {
        check_key(key)?;

        if self.public_key_exists(key).await? {
            tracing::debug!(%user_id, "public key already registered");
            return Ok(());
        }

        let result = sqlx::query(r#"INSERT INTO public_keys (id, user_id) VALUES ($1, $2)"#)
            .bind(key)
            .bind(user_id)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            // Lost a race against the same key, still a no-op.
            Err(err)
                if err
                    .as_database_error()
                    .is_some_and(|db| db.is_unique_violation()) =>
            {
                Ok(())
            },
            Err(err) => Err(err.into()),
        }
    }

    async fn public_key_exists(&self, key: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar(r#"SELECT EXISTS(SELECT 1 FROM public_keys WHERE id = $1)"#)
                .bind(key)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn get_public_key(&self, key: &str) -> Result<PublicKey> {
        sqlx::query_as::<_, PublicKey>(
            r#"SELECT id, user_id, label FROM public_keys WHERE id = $1"#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }
}
