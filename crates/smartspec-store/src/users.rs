//! User table operations.

use chrono::Utc;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Role, User};
use crate::Store;

impl Store {
    /// Create a user. Balance starts at zero.
    ///
    /// # Errors
    /// [`StoreError::DuplicateEmail`] when the email is taken.
    pub async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<User, StoreError> {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            role,
            credit_balance: 0,
            is_active: true,
            created_at: Utc::now(),
        };
        let result = sqlx::query(
            "INSERT INTO users (id, email, password_hash, role, credit_balance, is_active, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(user.credit_balance)
        .bind(user.is_active)
        .bind(user.created_at)
        .execute(self.pool())
        .await;

        match result {
            Ok(_) => Ok(user),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::DuplicateEmail {
                    email: email.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch a user by id.
    ///
    /// # Errors
    /// [`StoreError::UserNotFound`] or database failure.
    pub async fn get_user(&self, id: Uuid) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(StoreError::UserNotFound { id })
    }

    /// Fetch a user by email.
    ///
    /// # Errors
    /// Database failure.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
                .bind(email)
                .fetch_optional(self.pool())
                .await?,
        )
    }

    /// Activate or deactivate a user.
    ///
    /// # Errors
    /// [`StoreError::UserNotFound`] or database failure.
    pub async fn set_user_active(&self, id: Uuid, active: bool) -> Result<(), StoreError> {
        let affected = sqlx::query("UPDATE users SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(self.pool())
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(StoreError::UserNotFound { id });
        }
        Ok(())
    }
}
