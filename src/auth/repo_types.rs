use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

pub const DEFAULT_TIMEOUT: i32 = 5;
pub const DEFAULT_NUM_TRIES: i32 = 3;

/// User record in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // codec output, never the plaintext
    pub first_name: String,
    pub last_name: String,
    pub user_type: i16, // see UserType
    pub authenticated: bool,
    #[serde(skip_serializing)]
    pub confirmation_code: String, // empty once confirmed
    pub timeout: i32,   // seconds
    pub num_tries: i32,
    pub current_project: String,
    pub created_on: OffsetDateTime,
    pub last_login: Option<OffsetDateTime>,
}

impl User {
    pub fn kind(&self) -> UserType {
        UserType::from_ordinal(self.user_type)
    }

    pub fn is_pending_confirmation(&self) -> bool {
        !self.authenticated && !self.confirmation_code.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Standard,
    SuperUser,
    Admin,
}

impl UserType {
    /// Unknown ordinals fall back to a standard user.
    pub fn from_ordinal(v: i16) -> Self {
        match v {
            1 => UserType::SuperUser,
            2 => UserType::Admin,
            _ => UserType::Standard,
        }
    }

    pub fn ordinal(self) -> i16 {
        match self {
            UserType::Standard => 0,
            UserType::SuperUser => 1,
            UserType::Admin => 2,
        }
    }
}

/// Fields replaced by a profile update. `password` is `None` when unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileChanges {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub timeout: i32,
    pub num_tries: i32,
    pub password: Option<String>,
}
