//! PostgreSQL Repository Implementations

use std::time::Duration;

use chrono::{DateTime, Utc};
use kernel::id::IdentityId;
use platform::kv::{KvStore, StoreError, StoreResult};
use platform::password::{DerivedKey, Iterations, Salt};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entity::identity::{Credentials, Identity};
use crate::domain::repository::CredentialStore;
use crate::domain::value_object::{email::Email, identity_ref::IdentityRef};
use crate::error::{AuthError, AuthResult};

/// PostgreSQL-backed credential store
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const IDENTITY_COLUMNS: &str = r#"
    identity_id,
    identity_ref,
    email,
    salt,
    iterations,
    password_hash,
    created_at,
    updated_at
"#;

impl CredentialStore for PgCredentialStore {
    async fn create(&self, identity: &Identity) -> AuthResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO identities (
                identity_id,
                identity_ref,
                email,
                salt,
                iterations,
                password_hash,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(identity.id.as_uuid())
        .bind(identity.identity_ref.as_str())
        .bind(identity.email.as_str())
        .bind(identity.credentials.salt.as_str())
        .bind(i64::from(identity.credentials.iterations.get()))
        .bind(identity.credentials.password_hash.to_stored())
        .bind(identity.created_at)
        .bind(identity.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(AuthError::EmailTaken)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_ref(&self, identity_ref: &IdentityRef) -> AuthResult<Option<Identity>> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities WHERE identity_ref = $1"
        ))
        .bind(identity_ref.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(IdentityRow::into_identity).transpose()
    }

    async fn find_by_email_or_ref(&self, identifier: &str) -> AuthResult<Option<Identity>> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities WHERE email = lower($1) OR identity_ref = $1 LIMIT 1"
        ))
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        row.map(IdentityRow::into_identity).transpose()
    }

    async fn exists_by_email(&self, email: &Email) -> AuthResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM identities WHERE email = $1)")
                .bind(email.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn update_credentials(
        &self,
        id: &IdentityId,
        credentials: &Credentials,
    ) -> AuthResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE identities
            SET salt = $2, iterations = $3, password_hash = $4, updated_at = $5
            WHERE identity_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(credentials.salt.as_str())
        .bind(i64::from(credentials.iterations.get()))
        .bind(credentials.password_hash.to_stored())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(AuthError::Internal(format!("identity {id} vanished during reset")));
        }

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct IdentityRow {
    identity_id: Uuid,
    identity_ref: String,
    email: String,
    salt: String,
    iterations: i64,
    password_hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl IdentityRow {
    fn into_identity(self) -> AuthResult<Identity> {
        let identity_ref = IdentityRef::parse_str(&self.identity_ref)
            .map_err(|e| AuthError::Internal(format!("Invalid identity_ref: {}", e)))?;
        let salt = Salt::new(self.salt)
            .map_err(|e| AuthError::Internal(format!("Invalid salt: {}", e)))?;

        Ok(Identity {
            id: IdentityId::from_uuid(self.identity_id),
            identity_ref,
            email: Email::from_db(self.email),
            credentials: Credentials {
                salt,
                iterations: Iterations::from_stored(self.iterations)?,
                password_hash: DerivedKey::from_stored(&self.password_hash)?,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// ============================================================================
// Key-Value Store (replay records, throttle counters)
// ============================================================================

/// PostgreSQL-backed key-value store
///
/// Each operation is a single statement, so atomicity per key comes from the
/// primary key constraint rather than from application-side locking.
#[derive(Clone)]
pub struct PgKvStore {
    pool: PgPool,
}

impl PgKvStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn expires_at(now_ms: i64, ttl: Option<Duration>) -> Option<i64> {
    ttl.map(|ttl| now_ms.saturating_add(ttl.as_millis() as i64))
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

impl KvStore for PgKvStore {
    async fn insert_if_absent(&self, key: &str, ttl: Option<Duration>) -> StoreResult<bool> {
        let now_ms = Utc::now().timestamp_millis();

        // The conditional update only fires for expired rows; a live row
        // makes the statement return nothing.
        let row = sqlx::query_scalar::<_, String>(
            r#"
            INSERT INTO auth_kv (key, value, expires_at_ms)
            VALUES ($1, 1, $2)
            ON CONFLICT (key)
            DO UPDATE SET value = 1, expires_at_ms = EXCLUDED.expires_at_ms
            WHERE auth_kv.expires_at_ms IS NOT NULL AND auth_kv.expires_at_ms <= $3
            RETURNING key
            "#,
        )
        .bind(key)
        .bind(expires_at(now_ms, ttl))
        .bind(now_ms)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(row.is_some())
    }

    async fn increment(&self, key: &str, ttl: Option<Duration>) -> StoreResult<u64> {
        let now_ms = Utc::now().timestamp_millis();

        let value = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO auth_kv (key, value, expires_at_ms)
            VALUES ($1, 1, $2)
            ON CONFLICT (key)
            DO UPDATE SET
                value = CASE
                    WHEN auth_kv.expires_at_ms IS NOT NULL AND auth_kv.expires_at_ms <= $3
                    THEN 1
                    ELSE auth_kv.value + 1
                END,
                expires_at_ms = CASE
                    WHEN auth_kv.expires_at_ms IS NOT NULL AND auth_kv.expires_at_ms <= $3
                    THEN EXCLUDED.expires_at_ms
                    ELSE auth_kv.expires_at_ms
                END
            RETURNING value
            "#,
        )
        .bind(key)
        .bind(expires_at(now_ms, ttl))
        .bind(now_ms)
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(value.max(0) as u64)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<u64>> {
        let now_ms = Utc::now().timestamp_millis();

        let value = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT value FROM auth_kv
            WHERE key = $1 AND (expires_at_ms IS NULL OR expires_at_ms > $2)
            "#,
        )
        .bind(key)
        .bind(now_ms)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(value.map(|v| v.max(0) as u64))
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        let now_ms = Utc::now().timestamp_millis();

        let deleted = sqlx::query(
            "DELETE FROM auth_kv WHERE expires_at_ms IS NOT NULL AND expires_at_ms <= $1",
        )
        .bind(now_ms)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?
        .rows_affected();

        tracing::info!(keys_deleted = deleted, "Purged expired auth keys");

        Ok(deleted)
    }
}
