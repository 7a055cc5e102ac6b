use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Gateway account. Usernames are unique and case-sensitive; the password is
/// only ever stored as an Argon2id PHC hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: NaiveDateTime,
}

impl User {
    pub fn new(
        id: String,
        username: String,
        password_hash: String,
        is_admin: bool,
        created_at: NaiveDateTime,
    ) -> Self {
        Self {
            id,
            username,
            password_hash,
            is_admin,
            created_at,
        }
    }

    pub fn validate(&self) -> Result<(), crate::DomainError> {
        if self.username.trim().is_empty() {
            return Err(crate::DomainError::ValidationError(
                "Username cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
