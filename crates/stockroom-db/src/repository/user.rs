//! # User Repository
//!
//! Local accounts with argon2-hashed passwords.
//!
//! The `password` column only ever holds a PHC hash string
//! (`$argon2id$v=19$...`). Plaintext passwords are hashed on the way in and
//! verified in constant time on the way out; they are never stored, logged
//! or mirrored to the remote store.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use sqlx::SqlitePool;
use stockroom_core::validation::{validate_password, validate_username};
use stockroom_core::{Role, User};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    uid: Option<String>,
    username: String,
    password: String,
    role: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            uid: row.uid.unwrap_or_default(),
            username: row.username,
            role: Role::normalize(&row.role),
        }
    }
}

/// Hash a password for storage.
pub fn hash_password(password: &str) -> DbResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| DbError::Internal(format!("Failed to hash password: {e}")))?;
    Ok(hash.to_string())
}

/// Verify a password against its stored hash.
fn verify_password(password: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Repository for user accounts.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Creates a new UserRepository.
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    async fn row(&self, username: &str) -> DbResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, uid, username, password, role FROM users WHERE username = ?1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Creates a user. Fails with `UniqueViolation` if the username exists.
    pub async fn create(&self, username: &str, password: &str, role: Role) -> DbResult<User> {
        validate_username(username)?;
        validate_password(password)?;

        let hash = hash_password(password)?;
        let uid = Uuid::new_v4().to_string();

        let result = sqlx::query(
            "INSERT INTO users (username, password, role, uid) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(username)
        .bind(&hash)
        .bind(role.as_str())
        .bind(&uid)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } if field.contains("username") => {
                DbError::duplicate("username", username)
            }
            other => other,
        })?;

        info!(username, role = %role, "User created");

        Ok(User {
            id: result.last_insert_rowid(),
            uid,
            username: username.to_string(),
            role,
        })
    }

    /// Checks credentials. Returns the user when the password matches.
    pub async fn authenticate(&self, username: &str, password: &str) -> DbResult<Option<User>> {
        let Some(row) = self.row(username).await? else {
            debug!(username, "Login failed: unknown user");
            return Ok(None);
        };

        if verify_password(password, &row.password) {
            Ok(Some(row.into()))
        } else {
            debug!(username, "Login failed: wrong password");
            Ok(None)
        }
    }

    /// Replaces a user's password.
    pub async fn change_password(&self, username: &str, new_password: &str) -> DbResult<()> {
        validate_password(new_password)?;
        let hash = hash_password(new_password)?;

        let result = sqlx::query("UPDATE users SET password = ?2 WHERE username = ?1")
            .bind(username)
            .bind(&hash)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", username));
        }

        info!(username, "Password changed");
        Ok(())
    }

    /// Changes a user's role and returns the updated user.
    pub async fn set_role(&self, username: &str, role: Role) -> DbResult<User> {
        let result = sqlx::query("UPDATE users SET role = ?2 WHERE username = ?1")
            .bind(username)
            .bind(role.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", username));
        }

        info!(username, role = %role, "Role changed");
        self.get_by_username(username)
            .await?
            .ok_or_else(|| DbError::not_found("User", username))
    }

    /// Deletes a user and returns the removed account.
    pub async fn delete(&self, username: &str) -> DbResult<Option<User>> {
        let Some(user) = self.get_by_username(username).await? else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(user.id)
            .execute(&self.pool)
            .await?;

        info!(username, "User removed");
        Ok(Some(user))
    }

    /// Looks up a user by name.
    pub async fn get_by_username(&self, username: &str) -> DbResult<Option<User>> {
        Ok(self.row(username).await?.map(User::from))
    }

    /// All users, ordered by username.
    pub async fn list(&self) -> DbResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, uid, username, password, role FROM users ORDER BY username COLLATE NOCASE",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    /// Number of accounts.
    pub async fn count(&self) -> DbResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
