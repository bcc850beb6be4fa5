//! Expiring token stores.
//!
//! Both stores keep entries in a sled tree with an absolute expiry. Reads
//! treat expired entries as absent; [`ExpiringTree::purge_expired`] removes
//! them for good.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::StoreError;

/// Records session credentials that must no longer be honored.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Check whether `token` has been revoked.
    async fn is_revoked(&self, token: &str) -> Result<bool, StoreError>;

    /// Revoke `token` for at least `ttl`.
    async fn revoke(&self, token: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Delete expired entries, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize, StoreError>;
}

/// Maps single-use reset tokens to the email they were issued for.
#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    /// Store `token -> email` for `ttl`.
    async fn put(&self, token: &str, email: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Look up a live token without consuming it.
    async fn get(&self, token: &str) -> Result<Option<String>, StoreError>;

    /// Delete a token.
    async fn delete(&self, token: &str) -> Result<(), StoreError>;

    /// Atomically look up and delete a token.
    async fn take(&self, token: &str) -> Result<Option<String>, StoreError>;

    /// Delete expired entries, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize, StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Entry {
    value: String,
    /// Unix milliseconds.
    expires_at: i64,
}

impl Entry {
    const fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn decode(raw: &[u8]) -> Result<Entry, StoreError> {
    serde_json::from_slice(raw).map_err(|e| StoreError::Backend(format!("Corrupt entry: {e}")))
}

/// A sled tree whose entries expire.
#[derive(Debug, Clone)]
pub struct ExpiringTree {
    tree: sled::Tree,
}

impl ExpiringTree {
    /// Open (or create) the named tree.
    ///
    /// # Errors
    ///
    /// Returns error if the tree cannot be opened.
    pub fn open(db: &sled::Db, name: &str) -> Result<Self, StoreError> {
        Ok(Self {
            tree: db.open_tree(name)?,
        })
    }

    /// Insert or overwrite `key` with an expiry `ttl` from now.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    pub fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let entry = Entry {
            value: value.to_string(),
            expires_at: now_millis().saturating_add(ttl_ms),
        };
        let bytes = serde_json::to_vec(&entry)
            .map_err(|e| StoreError::Backend(format!("Serialization error: {e}")))?;
        self.tree.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    /// Read a live value.
    ///
    /// # Errors
    ///
    /// Returns error if the read fails or the entry is corrupt.
    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let Some(raw) = self.tree.get(key.as_bytes())? else {
            return Ok(None);
        };
        let entry = decode(&raw)?;
        if entry.is_expired(now_millis()) {
            // Only drop the version we read; a concurrent set wins.
            let _ = self
                .tree
                .compare_and_swap(key.as_bytes(), Some(&raw), None::<&[u8]>)?;
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    /// Check whether a live entry exists.
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    pub fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// Remove `key` and return its live value in one atomic step.
    ///
    /// # Errors
    ///
    /// Returns error if the removal fails or the entry is corrupt.
    pub fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let Some(raw) = self.tree.remove(key.as_bytes())? else {
            return Ok(None);
        };
        let entry = decode(&raw)?;
        Ok((!entry.is_expired(now_millis())).then_some(entry.value))
    }

    /// Remove `key`.
    ///
    /// # Errors
    ///
    /// Returns error if the removal fails.
    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.tree.remove(key.as_bytes())?;
        Ok(())
    }

    /// Delete expired and corrupt entries.
    ///
    /// # Errors
    ///
    /// Returns error if iteration or removal fails.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = now_millis();
        let mut removed = 0;

        for item in self.tree.iter() {
            let (key, raw) = item?;
            if decode(&raw).is_ok_and(|entry| !entry.is_expired(now)) {
                continue;
            }
            if self
                .tree
                .compare_and_swap(&key, Some(&raw), None::<&[u8]>)?
                .is_ok()
            {
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// Number of stored entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Check whether the tree holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

/// Revocation store over an [`ExpiringTree`].
#[derive(Debug, Clone)]
pub struct SledRevocationStore {
    tree: ExpiringTree,
}

impl SledRevocationStore {
    const TREE: &'static str = "revoked_sessions";
    const MARKER: &'static str = "revoked";

    /// Open the revocation tree in `db`.
    ///
    /// # Errors
    ///
    /// Returns error if the tree cannot be opened.
    pub fn open(db: &sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            tree: ExpiringTree::open(db, Self::TREE)?,
        })
    }
}

#[async_trait]
impl RevocationStore for SledRevocationStore {
    async fn is_revoked(&self, token: &str) -> Result<bool, StoreError> {
        self.tree.contains(token)
    }

    async fn revoke(&self, token: &str, ttl: Duration) -> Result<(), StoreError> {
        self.tree.set(token, Self::MARKER, ttl)
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        self.tree.purge_expired()
    }
}

/// Reset-token store over an [`ExpiringTree`].
#[derive(Debug, Clone)]
pub struct SledResetTokenStore {
    tree: ExpiringTree,
}

impl SledResetTokenStore {
    const TREE: &'static str = "reset_tokens";

    /// Open the reset-token tree in `db`.
    ///
    /// # Errors
    ///
    /// Returns error if the tree cannot be opened.
    pub fn open(db: &sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            tree: ExpiringTree::open(db, Self::TREE)?,
        })
    }

    /// Number of stored tokens, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Check whether no tokens are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

#[async_trait]
impl ResetTokenStore for SledResetTokenStore {
    async fn put(&self, token: &str, email: &str, ttl: Duration) -> Result<(), StoreError> {
        self.tree.set(token, email, ttl)
    }

    async fn get(&self, token: &str) -> Result<Option<String>, StoreError> {
        self.tree.get(token)
    }

    async fn delete(&self, token: &str) -> Result<(), StoreError> {
        self.tree.remove(token)
    }

    async fn take(&self, token: &str) -> Result<Option<String>, StoreError> {
        self.tree.take(token)
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        self.tree.purge_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_db() -> (TempDir, sled::Db) {
        let dir = TempDir::new().unwrap();
        let db = sled::open(dir.path()).unwrap();
        (dir, db)
    }

    #[test]
    fn test_set_get_remove() {
        let (_dir, db) = open_db();
        let tree = ExpiringTree::open(&db, "t").unwrap();

        tree.set("k", "v", Duration::from_secs(60)).unwrap();
        assert_eq!(tree.get("k").unwrap().as_deref(), Some("v"));
        assert!(tree.contains("k").unwrap());

        tree.remove("k").unwrap();
        assert!(tree.get("k").unwrap().is_none());
    }

    #[test]
    fn test_expired_entries_read_as_absent() {
        let (_dir, db) = open_db();
        let tree = ExpiringTree::open(&db, "t").unwrap();

        tree.set("gone", "v", Duration::ZERO).unwrap();
        assert!(tree.get("gone").unwrap().is_none());

        tree.set("taken", "v", Duration::ZERO).unwrap();
        assert!(tree.take("taken").unwrap().is_none());
    }

    #[test]
    fn test_take_is_single_use() {
        let (_dir, db) = open_db();
        let tree = ExpiringTree::open(&db, "t").unwrap();

        tree.set("once", "a@b.c", Duration::from_secs(60)).unwrap();
        assert_eq!(tree.take("once").unwrap().as_deref(), Some("a@b.c"));
        assert!(tree.take("once").unwrap().is_none());
    }

    #[test]
    fn test_purge_expired() {
        let (_dir, db) = open_db();
        let tree = ExpiringTree::open(&db, "t").unwrap();

        tree.set("old1", "v", Duration::ZERO).unwrap();
        tree.set("old2", "v", Duration::ZERO).unwrap();
        tree.set("live", "v", Duration::from_secs(60)).unwrap();

        assert_eq!(tree.purge_expired().unwrap(), 2);
        assert_eq!(tree.len(), 1);
        assert!(tree.contains("live").unwrap());
    }

    #[tokio::test]
    async fn test_revocation_store() {
        let (_dir, db) = open_db();
        let store = SledRevocationStore::open(&db).unwrap();

        assert!(!store.is_revoked("tok").await.unwrap());
        store.revoke("tok", Duration::from_secs(60)).await.unwrap();
        assert!(store.is_revoked("tok").await.unwrap());
        assert!(!store.is_revoked("other").await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_token_store() {
        let (_dir, db) = open_db();
        let store = SledResetTokenStore::open(&db).unwrap();

        store
            .put("abc", "john@doe.com", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            store.get("abc").await.unwrap().as_deref(),
            Some("john@doe.com")
        );
        assert_eq!(
            store.take("abc").await.unwrap().as_deref(),
            Some("john@doe.com")
        );
        assert!(store.get("abc").await.unwrap().is_none());

        store.put("def", "x@y.z", Duration::from_secs(60)).await.unwrap();
        store.delete("def").await.unwrap();
        assert!(store.take("def").await.unwrap().is_none());
    }
}
