//! Account type definitions

use serde::{Deserialize, Serialize};

/// Account identifier, generated by the store and never reused
pub type AccountId = u64;

/// A registered user identity as persisted by the store
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Account {
    pub id: AccountId,

    // Identity
    pub username: String,
    pub display_name: String,

    // Authentication
    pub credential_hash: String, // Argon2id PHC string

    pub created_at: u64, // ms since epoch, UTC
}

/// An account that has passed validation and hashing but has not been
/// written yet.
///
/// Holds the credential hash only; the plaintext password never reaches
/// the storage layer.
#[derive(Clone, Debug)]
pub struct NewAccount {
    pub username: String,
    pub display_name: String,
    pub credential_hash: String,
}

/// Which unique attribute a conflicting registration collided on
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniqueField {
    Username,
    DisplayName,
}

impl std::fmt::Display for UniqueField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UniqueField::Username => f.write_str("username"),
            UniqueField::DisplayName => f.write_str("display_name"),
        }
    }
}

impl NewAccount {
    /// Materialize the record that gets stored under `id`
    pub fn into_account(self, id: AccountId, created_at: u64) -> Account {
        Account {
            id,
            username: self.username,
            display_name: self.display_name,
            credential_hash: self.credential_hash,
            created_at,
        }
    }
}
