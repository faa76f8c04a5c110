//! Account registration: validate, hash, then reserve-and-insert atomically.

use super::auth::{AuthError, CredentialHasher};
use super::store::{AccountStore, StoreError};
use super::types::{AccountId, NewAccount, UniqueField};
use crate::telemetry::spawn_blocking_with_tracing;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// A registration request as received from a caller.
#[derive(Debug)]
pub struct Registration {
    pub username: String,
    pub password: SecretString,
    pub display_name: String,
}

impl Registration {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
            display_name: display_name.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum RegistrationError {
    /// A required field is missing or empty. Names the first offending field.
    #[error("missing or empty field: {0}")]
    InvalidInput(&'static str),
    #[error("an account with this {0} already exists")]
    DuplicateAccount(UniqueField),
    #[error("account storage is unavailable")]
    StorageUnavailable(#[source] StoreError),
    #[error("credential hashing failed")]
    HashingFailure(#[source] AuthError),
}

impl RegistrationError {
    /// Whether the caller may retry the same request later
    #[cfg(test)]
    pub(crate) fn is_retryable(&self) -> bool {
        matches!(
            self,
            RegistrationError::StorageUnavailable(_) | RegistrationError::HashingFailure(_)
        )
    }
}

/// Creates accounts. Cheap to clone; every clone shares the same store and
/// hasher.
#[derive(Clone)]
pub struct RegistrationService {
    store: Arc<dyn AccountStore>,
    hasher: Arc<dyn CredentialHasher>,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn AccountStore>, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self { store, hasher }
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &Arc<dyn AccountStore> {
        &self.store
    }

    /// Register a new account and return its id.
    ///
    /// The password is hashed on the blocking pool before storage is touched,
    /// so no storage transaction is open while the hash runs. Uniqueness of
    /// both `username` and `display_name` is decided solely by
    /// [`AccountStore::insert_unique`].
    ///
    /// Dropping the returned future before the insert has been handed to the
    /// store means nothing is written. Once handed over, the insert runs to
    /// completion and a committed account stays committed.
    #[tracing::instrument(
        name = "Register account",
        skip_all,
        fields(username = %registration.username)
    )]
    pub async fn register(
        &self,
        registration: Registration,
    ) -> Result<AccountId, RegistrationError> {
        let Registration {
            username,
            password,
            display_name,
        } = registration;

        validate(&username, &password, &display_name)?;

        let hasher = Arc::clone(&self.hasher);
        let credential_hash = spawn_blocking_with_tracing(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Interrupted(e.to_string()))
            .and_then(|hashed| hashed)
            .map_err(|e| {
                error!(error = %e, "Credential hashing failed");
                RegistrationError::HashingFailure(e)
            })?;

        let account = NewAccount {
            username,
            display_name,
            credential_hash,
        };
        let store = Arc::clone(&self.store);
        let outcome = spawn_blocking_with_tracing(move || store.insert_unique(account))
            .await
            .map_err(|e| StoreError::Backend(format!("storage task did not complete: {}", e)))
            .and_then(|inserted| inserted);

        match outcome {
            Ok(id) => {
                info!(account_id = id, "Account created");
                Ok(id)
            }
            Err(StoreError::Duplicate(field)) => {
                info!(%field, "Registration conflicts with an existing account");
                Err(RegistrationError::DuplicateAccount(field))
            }
            Err(e) => {
                error!(error = %e, "Failed to persist account");
                Err(RegistrationError::StorageUnavailable(e))
            }
        }
    }
}

/// Reject missing fields before any hashing or storage work.
///
/// Names made only of whitespace count as empty; the password is checked
/// as-is.
fn validate(
    username: &str,
    password: &SecretString,
    display_name: &str,
) -> Result<(), RegistrationError> {
    if username.trim().is_empty() {
        return Err(RegistrationError::InvalidInput("username"));
    }
    if password.expose_secret().is_empty() {
        return Err(RegistrationError::InvalidInput("password"));
    }
    if display_name.trim().is_empty() {
        return Err(RegistrationError::InvalidInput("name"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::auth::Argon2Hasher;
    use crate::account::types::Account;
    use crate::storage::Storage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;
    use tracing_subscriber::fmt::format::FmtSpan;

    fn cheap_hasher() -> Arc<Argon2Hasher> {
        Arc::new(Argon2Hasher::with_cost(1024, 1, 1).unwrap())
    }

    fn service() -> RegistrationService {
        RegistrationService::new(Arc::new(Storage::temporary().unwrap()), cheap_hasher())
    }

    /// Records every call before delegating to a real store.
    struct CountingStore {
        inner: Storage,
        calls: AtomicUsize,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                inner: Storage::temporary().unwrap(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl AccountStore for CountingStore {
        fn insert_unique(&self, account: NewAccount) -> Result<AccountId, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.insert_unique(account)
        }
        fn get(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get(id)
        }
        fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.find_by_username(username)
        }
        fn find_by_display_name(&self, display_name: &str) -> Result<Option<Account>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.find_by_display_name(display_name)
        }
        fn count(&self) -> Result<usize, StoreError> {
            self.inner.count()
        }
    }

    struct UnreachableStore;

    impl AccountStore for UnreachableStore {
        fn insert_unique(&self, _account: NewAccount) -> Result<AccountId, StoreError> {
            Err(StoreError::Backend("connection refused".to_string()))
        }
        fn get(&self, _id: AccountId) -> Result<Option<Account>, StoreError> {
            Err(StoreError::Backend("connection refused".to_string()))
        }
        fn find_by_username(&self, _username: &str) -> Result<Option<Account>, StoreError> {
            Err(StoreError::Backend("connection refused".to_string()))
        }
        fn find_by_display_name(&self, _display_name: &str) -> Result<Option<Account>, StoreError> {
            Err(StoreError::Backend("connection refused".to_string()))
        }
        fn count(&self) -> Result<usize, StoreError> {
            Err(StoreError::Backend("connection refused".to_string()))
        }
    }

    struct BrokenHasher;

    impl CredentialHasher for BrokenHasher {
        fn hash(&self, _password: &SecretString) -> Result<String, AuthError> {
            Err(AuthError::Interrupted("out of memory".to_string()))
        }
        fn verify(&self, _password: &SecretString, _hash: &str) -> Result<bool, AuthError> {
            Ok(false)
        }
    }

    /// Real hashing, but slow enough to cancel a registration mid-hash.
    struct SlowHasher(Argon2Hasher);

    impl CredentialHasher for SlowHasher {
        fn hash(&self, password: &SecretString) -> Result<String, AuthError> {
            std::thread::sleep(Duration::from_millis(200));
            self.0.hash(password)
        }
        fn verify(&self, password: &SecretString, hash: &str) -> Result<bool, AuthError> {
            self.0.verify(password, hash)
        }
    }

    /// Signals when an insert starts, then holds the write long enough to
    /// cancel the caller while it is in flight.
    struct SlowInsertStore {
        inner: Storage,
        started: Arc<Notify>,
    }

    impl AccountStore for SlowInsertStore {
        fn insert_unique(&self, account: NewAccount) -> Result<AccountId, StoreError> {
            self.started.notify_one();
            std::thread::sleep(Duration::from_millis(200));
            self.inner.insert_unique(account)
        }
        fn get(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
            self.inner.get(id)
        }
        fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
            self.inner.find_by_username(username)
        }
        fn find_by_display_name(&self, display_name: &str) -> Result<Option<Account>, StoreError> {
            self.inner.find_by_display_name(display_name)
        }
        fn count(&self) -> Result<usize, StoreError> {
            self.inner.count()
        }
    }

    /// In-memory sink for formatted `tracing` output.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_registration_debug_redacts_password() {
        let debug = format!("{:?}", Registration::new("alice", "secret123", "Alice A"));

        assert!(debug.contains("alice"));
        assert!(!debug.contains("secret123"));
    }

    #[tokio::test]
    async fn test_password_never_logged() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::TRACE)
            .with_span_events(FmtSpan::FULL)
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let service = service();
        service
            .register(Registration::new("alice", "secret123", "Alice A"))
            .await
            .unwrap();
        service
            .register(Registration::new("alice", "hunter2-again", "Alice B"))
            .await
            .unwrap_err();
        let unreachable = RegistrationService::new(Arc::new(UnreachableStore), cheap_hasher());
        unreachable
            .register(Registration::new("bob", "pa55word", "Bob B"))
            .await
            .unwrap_err();

        let output = logs.contents();
        assert!(output.contains("Account created"));
        assert!(output.contains("alice"));
        assert!(output.contains("Failed to persist account"));
        for password in ["secret123", "hunter2-again", "pa55word"] {
            assert!(!output.contains(password), "password leaked: {}", output);
        }
    }

    #[tokio::test]
    async fn test_register_then_duplicate_username() {
        let service = service();

        let id = service
            .register(Registration::new("alice", "secret123", "Alice A"))
            .await
            .unwrap();
        assert_eq!(service.store().get(id).unwrap().unwrap().username, "alice");

        let err = service
            .register(Registration::new("alice", "other", "Someone Else"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::DuplicateAccount(UniqueField::Username)
        ));
        assert_eq!(service.store().count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_display_name() {
        let service = service();
        service
            .register(Registration::new("alice", "secret123", "Alice A"))
            .await
            .unwrap();

        let err = service
            .register(Registration::new("alice2", "secret456", "Alice A"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RegistrationError::DuplicateAccount(UniqueField::DisplayName)
        ));
        assert!(service.store().find_by_username("alice2").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_distinct_accounts_all_succeed() {
        let service = service();

        let mut ids = Vec::new();
        for (username, name) in [("alice", "Alice A"), ("bob", "Bob B"), ("carol", "Carol C")] {
            ids.push(
                service
                    .register(Registration::new(username, "pw", name))
                    .await
                    .unwrap(),
            );
        }

        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
        assert_eq!(service.store().count().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_stored_hash_verifies_and_is_not_plaintext() {
        let hasher = cheap_hasher();
        let storage = Arc::new(Storage::temporary().unwrap());
        let service = RegistrationService::new(storage, hasher.clone());

        service
            .register(Registration::new("alice", "secret123", "Alice A"))
            .await
            .unwrap();

        let stored = service.store().find_by_username("alice").unwrap().unwrap();
        assert_ne!(stored.credential_hash, "secret123");
        assert!(hasher
            .verify(&SecretString::from("secret123".to_string()), &stored.credential_hash)
            .unwrap());
    }

    #[tokio::test]
    async fn test_empty_fields_rejected_before_storage() {
        let store = Arc::new(CountingStore::new());
        let service = RegistrationService::new(store.clone(), cheap_hasher());

        let cases = [
            (Registration::new("", "x", "y"), "username"),
            (Registration::new("   ", "x", "y"), "username"),
            (Registration::new("alice", "", "Alice A"), "password"),
            (Registration::new("alice", "x", ""), "name"),
            (Registration::new("alice", "x", "\t"), "name"),
        ];

        for (registration, field) in cases {
            let err = service.register(registration).await.unwrap_err();
            assert!(matches!(err, RegistrationError::InvalidInput(f) if f == field));
            assert!(!err.is_retryable());
        }

        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_whitespace_password_is_accepted() {
        let service = service();

        assert!(service
            .register(Registration::new("alice", "   ", "Alice A"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_storage_failure_maps_to_unavailable() {
        let service = RegistrationService::new(Arc::new(UnreachableStore), cheap_hasher());

        let err = service
            .register(Registration::new("alice", "secret123", "Alice A"))
            .await
            .unwrap_err();

        assert!(matches!(err, RegistrationError::StorageUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_hashing_failure_writes_nothing() {
        let store = Arc::new(CountingStore::new());
        let service = RegistrationService::new(store.clone(), Arc::new(BrokenHasher));

        let err = service
            .register(Registration::new("alice", "secret123", "Alice A"))
            .await
            .unwrap_err();

        assert!(matches!(err, RegistrationError::HashingFailure(_)));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_username_single_winner() {
        let service = service();
        let attempts = 12;

        let handles: Vec<_> = (0..attempts)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .register(Registration::new("alice", "secret123", format!("Alice {}", i)))
                        .await
                })
            })
            .collect();

        let mut wins = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(RegistrationError::DuplicateAccount(UniqueField::Username)) => duplicates += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(wins, 1);
        assert_eq!(duplicates, attempts - 1);
        assert_eq!(service.store().count().unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_during_hashing_writes_nothing() {
        let store = Arc::new(CountingStore::new());
        let hasher = Arc::new(SlowHasher(Argon2Hasher::with_cost(1024, 1, 1).unwrap()));
        let service = RegistrationService::new(store.clone(), hasher);

        let pending = tokio::spawn(async move {
            service
                .register(Registration::new("alice", "secret123", "Alice A"))
                .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        pending.abort();
        assert!(pending.await.unwrap_err().is_cancelled());

        // Give the orphaned hash time to finish; its result must be discarded.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_display_name_single_winner() {
        let service = service();
        let attempts = 12;

        let handles: Vec<_> = (0..attempts)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .register(Registration::new(format!("user{}", i), "secret123", "Shared"))
                        .await
                })
            })
            .collect();

        let mut wins = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(RegistrationError::DuplicateAccount(UniqueField::DisplayName)) => {
                    duplicates += 1
                }
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(wins, 1);
        assert_eq!(duplicates, attempts - 1);
        assert_eq!(service.store().count().unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_during_insert_still_commits() {
        let started = Arc::new(Notify::new());
        let store = Arc::new(SlowInsertStore {
            inner: Storage::temporary().unwrap(),
            started: started.clone(),
        });
        let service = RegistrationService::new(store.clone(), cheap_hasher());

        let pending = tokio::spawn(async move {
            service
                .register(Registration::new("alice", "secret123", "Alice A"))
                .await
        });
        started.notified().await;
        pending.abort();
        assert!(pending.await.unwrap_err().is_cancelled());

        // The write was already handed to the store; it must land anyway.
        tokio::time::sleep(Duration::from_millis(400)).await;
        let account = store.find_by_username("alice").unwrap();
        assert_eq!(account.map(|a| a.display_name), Some("Alice A".to_string()));
        assert_eq!(store.count().unwrap(), 1);
    }
}
