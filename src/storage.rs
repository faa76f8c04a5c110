use crate::account::{Account, AccountId, AccountStore, NewAccount, StoreError, UniqueField};
use serde::{Deserialize, Serialize};
use sled::transaction::{abort, TransactionError};
use sled::{Db, Transactional, Tree};
use std::path::Path;

const ACCOUNTS_TREE: &str = "accounts";
const USERNAMES_TREE: &str = "usernames";
const DISPLAY_NAMES_TREE: &str = "display_names";

/// sled-backed account store.
///
/// Layout:
/// - `accounts`: big-endian id -> bincode `Account`
/// - `usernames`: username -> id
/// - `display_names`: display name -> id
///
/// The two index trees are what enforce uniqueness; they are only ever
/// written together with the account record inside one transaction.
pub struct Storage {
    db: Db,
    accounts: Tree,
    usernames: Tree,
    display_names: Tree,
}

impl Storage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(backend)?;
        Self::from_db(db)
    }

    /// In-memory database that is discarded on drop
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(backend)?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, StoreError> {
        Ok(Storage {
            accounts: db.open_tree(ACCOUNTS_TREE).map_err(backend)?,
            usernames: db.open_tree(USERNAMES_TREE).map_err(backend)?,
            display_names: db.open_tree(DISPLAY_NAMES_TREE).map_err(backend)?,
            db,
        })
    }

    /// Write all dirty buffers to disk. Returns the number of bytes flushed.
    pub fn flush(&self) -> Result<usize, StoreError> {
        self.db.flush().map_err(backend)
    }

    fn lookup_index(&self, index: &Tree, key: &str) -> Result<Option<Account>, StoreError> {
        match index.get(key.as_bytes()).map_err(backend)? {
            Some(raw_id) => {
                let id = decode_id(&raw_id)?;
                // Index entries are written in the same transaction as the
                // record, so a dangling entry means the database is damaged.
                self.get(id)?.map(Some).ok_or_else(|| {
                    StoreError::Corrupt(format!("index entry for missing account {}", id))
                })
            }
            None => Ok(None),
        }
    }
}

impl AccountStore for Storage {
    fn insert_unique(&self, account: NewAccount) -> Result<AccountId, StoreError> {
        // Ids burned by a conflicting attempt are simply skipped.
        let id = self.db.generate_id().map_err(backend)?;
        let key = id.to_be_bytes();
        let username = account.username.clone();
        let display_name = account.display_name.clone();
        let record = encode(&account.into_account(id, current_timestamp()))?;

        let result = (&self.accounts, &self.usernames, &self.display_names).transaction(
            |(accounts, usernames, display_names)| {
                if usernames.get(username.as_bytes())?.is_some() {
                    return abort(UniqueField::Username);
                }
                if display_names.get(display_name.as_bytes())?.is_some() {
                    return abort(UniqueField::DisplayName);
                }

                usernames.insert(username.as_bytes(), &key[..])?;
                display_names.insert(display_name.as_bytes(), &key[..])?;
                accounts.insert(&key[..], record.as_slice())?;
                Ok(())
            },
        );

        match result {
            Ok(()) => Ok(id),
            Err(TransactionError::Abort(field)) => Err(StoreError::Duplicate(field)),
            Err(TransactionError::Storage(e)) => Err(backend(e)),
        }
    }

    fn get(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        match self.accounts.get(id.to_be_bytes()).map_err(backend)? {
            Some(data) => Ok(Some(decode(&data)?)),
            None => Ok(None),
        }
    }

    fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        self.lookup_index(&self.usernames, username)
    }

    fn find_by_display_name(&self, display_name: &str) -> Result<Option<Account>, StoreError> {
        self.lookup_index(&self.display_names, display_name)
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.accounts.len())
    }
}

fn backend(err: sled::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn decode<T: for<'a> Deserialize<'a>>(data: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(data).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn decode_id(raw: &[u8]) -> Result<AccountId, StoreError> {
    let bytes: [u8; 8] = raw
        .try_into()
        .map_err(|_| StoreError::Corrupt(format!("account id has {} bytes", raw.len())))?;
    Ok(AccountId::from_be_bytes(bytes))
}

fn current_timestamp() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}
