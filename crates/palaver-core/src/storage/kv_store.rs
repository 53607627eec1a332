//! Key-value store trait.
//!
//! A small string store used for client-side session state such as the
//! anonymous session token. Implementations live in palaver-infra.

use std::time::Duration;

use palaver_types::error::RepositoryError;

/// Trait for string key-value storage with optional expiry.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key. Returns None if the key is missing or expired.
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>, RepositoryError>> + Send;

    /// Set a value (upsert). `ttl = None` never expires.
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete a key. No-op if the key does not exist.
    fn remove(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete every key.
    fn clear(&self) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}

/// Absolute expiry for a TTL starting now. `None` when the TTL is unset or
/// too large to represent.
pub fn expiry_from_now(ttl: Option<Duration>) -> Option<chrono::DateTime<chrono::Utc>> {
    let ttl = chrono::Duration::from_std(ttl?).ok()?;
    chrono::Utc::now().checked_add_signed(ttl)
}
