use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Server-side session state behind the opaque `session` cookie.
///
/// Invariant: `last_activity <= expires_at <= created_at + MAX_AGE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub created_at: NaiveDateTime,
    pub last_activity: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl Session {
    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        self.expires_at < now
    }
}

/// Longer-lived token that can mint a fresh session after the session
/// cookie itself has expired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RememberToken {
    pub id: String,
    pub user_id: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub revoked: bool,
}

impl RememberToken {
    pub fn is_valid(&self, now: NaiveDateTime) -> bool {
        !self.revoked && self.expires_at >= now
    }
}

/// Bearer credential for programmatic access. The full value doubles as the
/// primary key so it can be looked up directly; listings only ever expose
/// `prefix`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub prefix: String,
    pub user_id: String,
    pub name: String,
    pub created_at: NaiveDateTime,
    pub last_used_at: Option<NaiveDateTime>,
    pub expires_at: Option<NaiveDateTime>,
    pub revoked: bool,
}

impl ApiKey {
    pub fn is_valid(&self, now: NaiveDateTime) -> bool {
        if self.revoked {
            return false;
        }
        match self.expires_at {
            Some(expires) => expires >= now,
            None => true,
        }
    }
}
