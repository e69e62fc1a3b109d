use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{User, UserType};

/// Registration form, urlencoded.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(rename = "g-recaptcha-response")]
    pub recaptcha: String,
}

/// Profile edit form, urlencoded. A blank password leaves it unchanged.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProfileForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub timeout: i32,
    pub num_tries: i32,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for confirming an account.
#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub email: String,
    pub code: String,
}

/// Response returned after login or a profile change.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub user: PublicUser,
}

/// Account view returned to the client. No credential fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub user_type: UserType,
    pub authenticated: bool,
    pub timeout: i32,
    pub num_tries: i32,
    pub current_project: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_on: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            user_type: u.kind(),
            id: u.id,
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name,
            authenticated: u.authenticated,
            timeout: u.timeout,
            num_tries: u.num_tries,
            current_project: u.current_project,
            created_on: u.created_on,
            last_login: u.last_login,
        }
    }
}
