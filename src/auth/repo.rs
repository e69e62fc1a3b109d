use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::codec::{CodecError, CredentialCodec};
use crate::auth::repo_types::{ProfileChanges, User, DEFAULT_NUM_TRIES, DEFAULT_TIMEOUT};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("no account with that email")]
    NotFound,
    #[error("credential codec failed")]
    Codec(#[from] CodecError),
    #[error("user store unavailable")]
    Unavailable(#[source] sqlx::Error),
}

/// Account persistence keyed by email. Every operation is atomic.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create an unconfirmed account. Fails with `DuplicateEmail` rather than
    /// overwriting an existing one.
    async fn create(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<User, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Returns `false` when no account matched `current_email`. A new password
    /// and, when the email changes, the return to the unconfirmed state are
    /// written in the same atomic step.
    async fn update_profile(
        &self,
        current_email: &str,
        changes: &ProfileChanges,
    ) -> Result<bool, StoreError>;

    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, StoreError>;

    async fn mark_authenticated(&self, email: &str) -> Result<User, StoreError>;

    async fn mark_unauthenticated(&self, email: &str) -> Result<User, StoreError>;

    async fn record_login(&self, email: &str) -> Result<User, StoreError>;

    async fn update_password(&self, email: &str, password: &str) -> Result<User, StoreError>;
}

/// Build a fresh account record with hashed password and pending confirmation.
pub(crate) fn new_user(
    codec: &CredentialCodec,
    default_project: &str,
    email: &str,
    password: &str,
    first_name: &str,
    last_name: &str,
) -> Result<User, StoreError> {
    let password_hash = codec.hash_password(password)?;
    let confirmation_code =
        codec.fresh_confirmation_code(&password_hash, email, first_name, last_name)?;
    Ok(User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        password_hash,
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        user_type: 0,
        authenticated: false,
        confirmation_code,
        timeout: DEFAULT_TIMEOUT,
        num_tries: DEFAULT_NUM_TRIES,
        current_project: default_project.to_string(),
        created_on: OffsetDateTime::now_utc(),
        last_login: None,
    })
}

/// Apply a profile edit to a loaded record. A changed email drops the
/// account back to unconfirmed with a code derived from the new fields.
pub(crate) fn apply_profile_changes(
    codec: &CredentialCodec,
    user: &mut User,
    changes: &ProfileChanges,
) -> Result<(), StoreError> {
    if let Some(password) = &changes.password {
        user.password_hash = codec.hash_password(password)?;
    }
    let email_changed = user.email != changes.email;
    user.email = changes.email.clone();
    user.first_name = changes.first_name.clone();
    user.last_name = changes.last_name.clone();
    user.timeout = changes.timeout;
    user.num_tries = changes.num_tries;
    if email_changed {
        user.confirmation_code = codec.fresh_confirmation_code(
            &user.password_hash,
            &user.email,
            &user.first_name,
            &user.last_name,
        )?;
        user.authenticated = false;
    }
    Ok(())
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn map_write_err(err: sqlx::Error) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::DuplicateEmail
    } else {
        StoreError::Unavailable(err)
    }
}

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, user_type, \
     authenticated, confirmation_code, timeout, num_tries, current_project, created_on, last_login";

/// Postgres-backed store over the `users` table.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
    codec: CredentialCodec,
    default_project: String,
}

impl PgUserStore {
    pub fn new(db: PgPool, codec: CredentialCodec, default_project: impl Into<String>) -> Self {
        Self {
            db,
            codec,
            default_project: default_project.into(),
        }
    }

    async fn update_returning(&self, sql: &str, email: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await
            .map_err(StoreError::Unavailable)?
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<User, StoreError> {
        let user = new_user(
            &self.codec,
            &self.default_project,
            email,
            password,
            first_name,
            last_name,
        )?;
        let sql = format!(
            r#"
            INSERT INTO users ({USER_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {USER_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.user_type)
            .bind(user.authenticated)
            .bind(&user.confirmation_code)
            .bind(user.timeout)
            .bind(user.num_tries)
            .bind(&user.current_project)
            .bind(user.created_on)
            .bind(user.last_login)
            .fetch_one(&self.db)
            .await
            .map_err(|e| {
                let err = map_write_err(e);
                if matches!(err, StoreError::DuplicateEmail) {
                    warn!(email = %email, "unique constraint rejected duplicate email");
                }
                err
            })?;
        debug!(user_id = %created.id, "user row inserted");
        Ok(created)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await
            .map_err(StoreError::Unavailable)
    }

    async fn update_profile(
        &self,
        current_email: &str,
        changes: &ProfileChanges,
    ) -> Result<bool, StoreError> {
        let mut tx = self.db.begin().await.map_err(StoreError::Unavailable)?;

        let select = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 FOR UPDATE");
        let Some(mut user) = sqlx::query_as::<_, User>(&select)
            .bind(current_email)
            .fetch_optional(&mut *tx)
            .await
            .map_err(StoreError::Unavailable)?
        else {
            return Ok(false);
        };

        apply_profile_changes(&self.codec, &mut user, changes)?;

        sqlx::query(
            r#"
            UPDATE users
               SET email = $2, first_name = $3, last_name = $4, timeout = $5, num_tries = $6,
                   password_hash = $7, authenticated = $8, confirmation_code = $9
             WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.timeout)
        .bind(user.num_tries)
        .bind(&user.password_hash)
        .bind(user.authenticated)
        .bind(&user.confirmation_code)
        .execute(&mut *tx)
        .await
        .map_err(map_write_err)?;

        tx.commit().await.map_err(StoreError::Unavailable)?;
        debug!(user_id = %user.id, reconfirm = !user.authenticated, "profile row updated");
        Ok(true)
    }

    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, StoreError> {
        let Some(user) = self.find_by_email(email).await? else {
            return Ok(None);
        };
        if self.codec.verify_password(password, &user.password_hash)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    async fn mark_authenticated(&self, email: &str) -> Result<User, StoreError> {
        let sql = format!(
            "UPDATE users SET authenticated = TRUE, confirmation_code = '' \
             WHERE email = $1 RETURNING {USER_COLUMNS}"
        );
        self.update_returning(&sql, email).await
    }

    async fn mark_unauthenticated(&self, email: &str) -> Result<User, StoreError> {
        let mut tx = self.db.begin().await.map_err(StoreError::Unavailable)?;

        let select = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 FOR UPDATE");
        let current = sqlx::query_as::<_, User>(&select)
            .bind(email)
            .fetch_optional(&mut *tx)
            .await
            .map_err(StoreError::Unavailable)?
            .ok_or(StoreError::NotFound)?;

        let code = self.codec.fresh_confirmation_code(
            &current.password_hash,
            &current.email,
            &current.first_name,
            &current.last_name,
        )?;

        let update = format!(
            "UPDATE users SET authenticated = FALSE, confirmation_code = $2 \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&update)
            .bind(current.id)
            .bind(&code)
            .fetch_one(&mut *tx)
            .await
            .map_err(StoreError::Unavailable)?;

        tx.commit().await.map_err(StoreError::Unavailable)?;
        Ok(user)
    }

    async fn record_login(&self, email: &str) -> Result<User, StoreError> {
        let sql =
            format!("UPDATE users SET last_login = now() WHERE email = $1 RETURNING {USER_COLUMNS}");
        self.update_returning(&sql, email).await
    }

    async fn update_password(&self, email: &str, password: &str) -> Result<User, StoreError> {
        let hash = self.codec.hash_password(password)?;
        let sql = format!(
            "UPDATE users SET password_hash = $2 WHERE email = $1 RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .bind(&hash)
            .fetch_optional(&self.db)
            .await
            .map_err(StoreError::Unavailable)?
            .ok_or(StoreError::NotFound)
    }
}
