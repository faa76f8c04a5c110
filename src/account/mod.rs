//! Account module
//!
//! - Account records and the unique attributes they are keyed by
//! - Argon2id credential hashing
//! - The storage contract with its atomic unique insert
//! - Registration, the one operation that creates accounts

pub mod auth;
pub mod registration;
pub mod store;
pub mod types;

pub use auth::{Argon2Hasher, AuthError, CredentialHasher};
pub use registration::{Registration, RegistrationError, RegistrationService};
pub use store::{AccountStore, StoreError};
pub use types::{Account, AccountId, NewAccount, UniqueField};
