//! Credential store: username to password-hash mapping
//!
//! Passwords are stored as bcrypt hashes, never in the clear. The durable
//! snapshot holds the hashes, so a leaked `users.json` does not leak
//! passwords.

use std::collections::HashMap;

use bcrypt::{hash, verify, DEFAULT_COST};
use tracing::warn;

use crate::error::{ChatError, Result};

/// In-memory credential store
///
/// Mutations go through the global server lock; this type itself does no
/// locking.
#[derive(Debug, Default)]
pub struct CredentialStore {
    /// Username -> bcrypt hash
    users: HashMap<String, String>,
}

impl CredentialStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            users: HashMap::new(),
        }
    }

    /// Rebuild the store from a loaded snapshot
    ///
    /// Entries with an empty username are dropped, matching the startup
    /// cleaning pass of earlier snapshot files.
    pub fn from_snapshot(snapshot: HashMap<String, String>) -> Self {
        let users = snapshot
            .into_iter()
            .filter(|(username, _)| !username.is_empty())
            .collect();
        Self { users }
    }

    /// Register a new credential record
    ///
    /// Records are immutable once created: re-registering an existing
    /// username fails rather than silently overwriting it.
    pub fn insert(&mut self, username: &str, password: &str) -> Result<()> {
        if username.is_empty() || password.is_empty() {
            return Err(ChatError::auth("Username and password cannot be empty"));
        }
        if self.users.contains_key(username) {
            return Err(ChatError::auth(format!(
                "User '{}' already exists",
                username
            )));
        }

        let hashed = hash(password, DEFAULT_COST)?;
        self.users.insert(username.to_string(), hashed);
        Ok(())
    }

    /// Check a username/password pair against the store
    pub fn verify(&self, username: &str, password: &str) -> bool {
        if username.is_empty() || password.is_empty() {
            return false;
        }

        let Some(stored) = self.users.get(username) else {
            return false;
        };

        match verify(password, stored) {
            Ok(ok) => ok,
            Err(e) => {
                warn!("Failed to verify password for '{}': {}", username, e);
                false
            }
        }
    }

    /// Check whether a username is registered
    pub fn contains(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    /// Number of registered users
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// The durable snapshot form: username -> bcrypt hash
    pub fn snapshot(&self) -> &HashMap<String, String> {
        &self.users
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_verify() {
        let mut store = CredentialStore::new();
        store.insert("alice", "pw1").unwrap();

        assert!(store.contains("alice"));
        assert!(store.verify("alice", "pw1"));
        assert!(!store.verify("alice", "wrong"));
        assert!(!store.verify("bob", "pw1"));
    }

    #[test]
    fn test_empty_credentials_rejected() {
        let mut store = CredentialStore::new();
        assert!(store.insert("", "pw").is_err());
        assert!(store.insert("alice", "").is_err());
        assert!(!store.verify("", ""));
    }

    #[test]
    fn test_reregistration_rejected() {
        let mut store = CredentialStore::new();
        store.insert("alice", "pw1").unwrap();

        assert!(store.insert("alice", "pw2").is_err());
        // Original password still verifies
        assert!(store.verify("alice", "pw1"));
        assert!(!store.verify("alice", "pw2"));
    }

    #[test]
    fn test_snapshot_is_hashed() {
        let mut store = CredentialStore::new();
        store.insert("alice", "pw1").unwrap();

        let snapshot = store.snapshot();
        assert_ne!(snapshot.get("alice").unwrap(), "pw1");
    }

    #[test]
    fn test_from_snapshot_drops_empty_usernames() {
        let mut snapshot = HashMap::new();
        snapshot.insert("".to_string(), "junk".to_string());
        snapshot.insert(
            "alice".to_string(),
            hash("pw1", DEFAULT_COST).unwrap(),
        );

        let store = CredentialStore::from_snapshot(snapshot);
        assert_eq!(store.len(), 1);
        assert!(store.verify("alice", "pw1"));
    }
}
