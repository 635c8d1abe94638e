//! Database repository for password reset tokens.

use chrono::Utc;
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::password,
    config::Config,
    db::{
        errors::{DbError, Result},
        models::password_reset_tokens::{PasswordResetToken, PasswordResetTokenCreateRequest},
    },
    types::{abbrev_uuid, UserId},
};

pub struct PasswordResetTokens<'c> {
    db: &'c mut PgConnection,
}

impl<'c> PasswordResetTokens<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), err)]
    pub async fn create(&mut self, request: &PasswordResetTokenCreateRequest) -> Result<PasswordResetToken> {
        let token_hash = password::hash_string_with_params(&request.raw_token, Some(request.argon2_params))
            .map_err(|e| DbError::Other(anyhow::anyhow!(e)))?;

        let token = sqlx::query_as::<_, PasswordResetToken>(
            r#"
            INSERT INTO password_reset_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, token_hash, expires_at, created_at, used_at
            "#,
        )
        .bind(request.user_id)
        .bind(token_hash)
        .bind(request.expires_at)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(token)
    }

    /// Generate a fresh token for the user, returning the raw token (for the
    /// email) alongside the stored record.
    #[instrument(skip(self, config), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn create_for_user(&mut self, user_id: UserId, config: &Config) -> Result<(String, PasswordResetToken)> {
        let raw_token = password::generate_reset_token();
        let expires_at = Utc::now()
            + chrono::Duration::from_std(config.auth.native.password_reset_token_duration).unwrap_or(chrono::Duration::minutes(30));

        let request = PasswordResetTokenCreateRequest {
            user_id,
            raw_token: raw_token.clone(),
            expires_at,
            argon2_params: password::Argon2Params::default(),
        };

        let token = self.create(&request).await?;
        Ok((raw_token, token))
    }

    /// Find a valid token by ID and verify the raw token
    #[instrument(skip(self, raw_token), err)]
    pub async fn find_valid_token_by_id(&mut self, token_id: Uuid, raw_token: &str) -> Result<Option<PasswordResetToken>> {
        let token = sqlx::query_as::<_, PasswordResetToken>(
            "SELECT id, user_id, token_hash, expires_at, created_at, used_at FROM password_reset_tokens WHERE id = $1",
        )
        .bind(token_id)
        .fetch_optional(&mut *self.db)
        .await?;

        if let Some(token) = token {
            // Expired or already-used tokens are treated the same as missing ones
            if token.used_at.is_some() {
                return Ok(None);
            }
            if Utc::now() > token.expires_at {
                return Ok(None);
            }

            match password::verify_string(raw_token, &token.token_hash) {
                Ok(true) => Ok(Some(token)),
                Ok(false) => Ok(None),
                Err(e) => {
                    tracing::error!("Token verification error for token {}: {:?}", token_id, e);
                    Ok(None)
                }
            }
        } else {
            Ok(None)
        }
    }

    /// Invalidate all tokens for a user
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn invalidate_for_user(&mut self, user_id: UserId) -> Result<u64> {
        let result = sqlx::query("UPDATE password_reset_tokens SET used_at = NOW() WHERE user_id = $1 AND used_at IS NULL")
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }

    /// Remove expired and used tokens. Run by the maintenance sweeper.
    #[instrument(skip(self), err)]
    pub async fn sweep_expired(&mut self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE used_at IS NOT NULL OR expires_at < NOW()")
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::models::users::Role,
        db::{
            handlers::{Repository, Users},
            models::users::UserCreateDBRequest,
        },
        test_utils::create_test_config,
    };
    use sqlx::PgPool;

    async fn seed_user(conn: &mut PgConnection) -> UserId {
        let mut users = Users::new(conn);
        users
            .create(&UserCreateDBRequest {
                username: "resetter".to_string(),
                email: "resetter@example.com".to_string(),
                display_name: None,
                role: Role::Member,
                jlpt_goal: None,
                password_hash: None,
            })
            .await
            .unwrap()
            .id
    }

    #[sqlx::test]
    async fn test_token_roundtrip(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let user_id = seed_user(&mut conn).await;

        let mut repo = PasswordResetTokens::new(&mut conn);
        let (raw_token, token) = repo.create_for_user(user_id, &config).await.unwrap();

        // Correct token verifies
        let found = repo.find_valid_token_by_id(token.id, &raw_token).await.unwrap();
        assert!(found.is_some());

        // Wrong token does not
        let found = repo.find_valid_token_by_id(token.id, "wrong-token").await.unwrap();
        assert!(found.is_none());
    }

    #[sqlx::test]
    async fn test_invalidation_and_sweep(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let user_id = seed_user(&mut conn).await;

        let mut repo = PasswordResetTokens::new(&mut conn);
        let (raw_token, token) = repo.create_for_user(user_id, &config).await.unwrap();

        assert_eq!(repo.invalidate_for_user(user_id).await.unwrap(), 1);
        assert!(repo.find_valid_token_by_id(token.id, &raw_token).await.unwrap().is_none());

        // Used tokens are swept
        assert_eq!(repo.sweep_expired().await.unwrap(), 1);
    }
}
