// Wire types for the signup endpoint
use crate::account::{AccountId, Registration};
use serde::{Deserialize, Serialize};

pub const MSG_CREATED: &str = "User created";
pub const MSG_INVALID_INPUT: &str = "Username, password and name are required";
pub const MSG_DUPLICATE: &str = "Username or name already exists";
pub const MSG_INTERNAL: &str = "Internal server error";

/// `POST /signup` body. Missing and `null` fields deserialize to `None` and
/// are rejected by validation like empty strings.
///
/// No `Debug`: the password must not end up in logs.
#[derive(Deserialize)]
pub struct SignupRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
}

impl SignupRequest {
    pub fn into_registration(self) -> Registration {
        Registration::new(
            self.username.unwrap_or_default(),
            self.password.unwrap_or_default(),
            self.name.unwrap_or_default(),
        )
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse {
    pub message: String,
    pub user_id: AccountId,
}

#[derive(Serialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct HealthResponse {
    pub status: &'static str,
}
