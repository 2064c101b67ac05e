//! User CRUD.

use cml_lab_core::UserId;

use crate::client::Client;
use crate::error::{ClientError, Result};
use crate::model::{User, UserSpec};

impl Client {
    /// List all users.
    ///
    /// # Errors
    ///
    /// Returns gate, transport or decode errors.
    pub async fn users(&self) -> Result<Vec<User>> {
        self.get_json("users").await
    }

    /// Read one user.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the user does not exist.
    pub async fn user(&self, id: &UserId) -> Result<User> {
        self.get_json(&format!("users/{id}")).await
    }

    /// Find a user by username.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ElementNotFound` if no user has that name.
    pub async fn user_by_name(&self, username: &str) -> Result<User> {
        self.users()
            .await?
            .into_iter()
            .find(|u| u.username == username)
            .ok_or_else(|| ClientError::ElementNotFound {
                kind: "user",
                key: username.to_string(),
            })
    }

    /// Create a user. The returned record carries the password just set.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidRequest` if username or password is
    /// missing, or any gate, transport, status or decode error.
    pub async fn user_create(&self, spec: &UserSpec) -> Result<User> {
        if spec.username.as_deref().unwrap_or_default().is_empty() {
            return Err(ClientError::InvalidRequest("username is required".into()));
        }
        if spec.password.is_none() {
            return Err(ClientError::InvalidRequest("password is required".into()));
        }

        let mut user: User = self.post_json("users", spec).await?;
        user.password.clone_from(&spec.password);
        tracing::info!(user_id = %user.id, username = %user.username, "Created user");
        Ok(user)
    }

    /// Update a user and return the fresh record.
    ///
    /// The password is the one in `spec` if set, else the one `current`
    /// carries.
    ///
    /// # Errors
    ///
    /// Returns gate, transport, status or decode errors.
    pub async fn user_update(&self, current: &User, spec: &UserSpec) -> Result<User> {
        self.patch_json(&format!("users/{}", current.id), spec).await?;
        let mut user = self.user(&current.id).await?;
        user.password = spec.password.clone().or_else(|| current.password.clone());
        tracing::debug!(user_id = %user.id, "Updated user");
        Ok(user)
    }

    /// Re-read a user, keeping the password `current` carries.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the user no longer exists.
    pub async fn user_refresh(&self, current: &User) -> Result<User> {
        let mut user = self.user(&current.id).await?;
        user.password.clone_from(&current.password);
        Ok(user)
    }

    /// Delete a user.
    ///
    /// # Errors
    ///
    /// Returns gate, transport or status errors.
    pub async fn user_destroy(&self, id: &UserId) -> Result<()> {
        self.delete(&format!("users/{id}")).await?;
        tracing::info!(user_id = %id, "Destroyed user");
        Ok(())
    }
}
