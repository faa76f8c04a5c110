//! Account storage contract

use super::types::{Account, AccountId, NewAccount, UniqueField};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("an account with this {0} already exists")]
    Duplicate(UniqueField),
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
}

/// Persistent account store shared by every request.
///
/// Implementations must make [`AccountStore::insert_unique`] a single atomic
/// step: the uniqueness check on both `username` and `display_name` and the
/// write either happen together or not at all, no matter how many callers
/// race on the same values. Callers add no locking of their own.
///
/// Methods are blocking; async callers run them on the blocking pool.
pub trait AccountStore: Send + Sync {
    /// Reserve `username` and `display_name` and write the account in one
    /// indivisible operation.
    ///
    /// Returns [`StoreError::Duplicate`] without writing anything if either
    /// value is already taken.
    fn insert_unique(&self, account: NewAccount) -> Result<AccountId, StoreError>;

    fn get(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError>;

    fn find_by_display_name(&self, display_name: &str) -> Result<Option<Account>, StoreError>;

    /// Number of accounts currently stored
    fn count(&self) -> Result<usize, StoreError>;
}
