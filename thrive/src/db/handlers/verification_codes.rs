//! Database repository for email verification codes.

use chrono::Utc;
use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    auth::password,
    config::Config,
    db::{
        errors::{DbError, Result},
        models::verification_codes::{VerificationCode, VerificationCodeCreateRequest},
    },
};

pub struct VerificationCodes<'c> {
    db: &'c mut PgConnection,
}

impl<'c> VerificationCodes<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(email = %request.email), err)]
    pub async fn create(&mut self, request: &VerificationCodeCreateRequest) -> Result<VerificationCode> {
        let code_hash = password::hash_string_with_params(&request.raw_code, Some(request.argon2_params))
            .map_err(|e| DbError::Other(anyhow::anyhow!(e)))?;

        let code = sqlx::query_as::<_, VerificationCode>(
            r#"
            INSERT INTO verification_codes (email, code_hash, expires_at)
            VALUES (lower($1), $2, $3)
            RETURNING id, email, code_hash, expires_at, consumed_at, created_at
            "#,
        )
        .bind(&request.email)
        .bind(code_hash)
        .bind(request.expires_at)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(code)
    }

    /// Generate and store a fresh code for an email address, invalidating any
    /// outstanding ones. Returns the raw code for the email body.
    #[instrument(skip(self, config), fields(email = %email), err)]
    pub async fn create_for_email(&mut self, email: &str, config: &Config) -> Result<String> {
        // One live code per address. Superseded codes are deleted outright;
        // only consume() may set consumed_at, which recently_verified trusts.
        sqlx::query("DELETE FROM verification_codes WHERE lower(email) = lower($1) AND consumed_at IS NULL")
            .bind(email)
            .execute(&mut *self.db)
            .await?;

        let raw_code = password::generate_verification_code();
        let expires_at = Utc::now()
            + chrono::Duration::from_std(config.auth.native.verification_code_duration).unwrap_or(chrono::Duration::minutes(15));

        self.create(&VerificationCodeCreateRequest {
            email: email.to_string(),
            raw_code: raw_code.clone(),
            expires_at,
            argon2_params: password::Argon2Params::default(),
        })
        .await?;

        Ok(raw_code)
    }

    /// Verify a code for an email address and consume it so it cannot be
    /// reused. Returns false when no live code matches.
    #[instrument(skip(self, raw_code), fields(email = %email), err)]
    pub async fn consume(&mut self, email: &str, raw_code: &str) -> Result<bool> {
        let candidate = sqlx::query_as::<_, VerificationCode>(
            r#"
            SELECT id, email, code_hash, expires_at, consumed_at, created_at
            FROM verification_codes
            WHERE lower(email) = lower($1) AND consumed_at IS NULL AND expires_at > NOW()
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(email)
        .fetch_optional(&mut *self.db)
        .await?;

        let Some(candidate) = candidate else {
            return Ok(false);
        };

        let matches = password::verify_string(raw_code, &candidate.code_hash).unwrap_or(false);
        if !matches {
            return Ok(false);
        }

        sqlx::query("UPDATE verification_codes SET consumed_at = NOW() WHERE id = $1")
            .bind(candidate.id)
            .execute(&mut *self.db)
            .await?;

        Ok(true)
    }

    /// Whether the email has a recently consumed code, used to gate registration.
    #[instrument(skip(self), fields(email = %email), err)]
    pub async fn recently_verified(&mut self, email: &str, config: &Config) -> Result<bool> {
        let window = chrono::Duration::from_std(config.auth.native.verification_code_duration).unwrap_or(chrono::Duration::minutes(15));

        let verified = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM verification_codes
                WHERE lower(email) = lower($1) AND consumed_at IS NOT NULL AND consumed_at > $2
            )
            "#,
        )
        .bind(email)
        .bind(Utc::now() - window)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(verified)
    }

    /// Remove expired and consumed codes. Run by the maintenance sweeper.
    #[instrument(skip(self), err)]
    pub async fn sweep_expired(&mut self) -> Result<u64> {
        // Keep consumed codes around for the verification window so
        // registration can still check them
        let result = sqlx::query(
            "DELETE FROM verification_codes WHERE expires_at < NOW() - interval '1 hour'",
        )
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected())
    }
}
