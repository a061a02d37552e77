// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Credential store (user directory) interface.
//!
//! The authentication core never hashes or compares passwords itself;
//! it asks the store. `MemoryCredentialStore` keeps Argon2id hashes in
//! process and is used by the binary's seed account and by tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use utoipa::ToSchema;

/// Account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalStatus {
    Disabled,
    Active,
    Locked,
}

impl std::fmt::Display for PrincipalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrincipalStatus::Disabled => write!(f, "disabled"),
            PrincipalStatus::Active => write!(f, "active"),
            PrincipalStatus::Locked => write!(f, "locked"),
        }
    }
}

/// A user account as seen by the authentication core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Principal {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub status: PrincipalStatus,
    pub failed_login_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
}

/// Error type for credential store calls.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Result type for store calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// User directory consumed by the authenticator.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a principal by login name.
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Principal>>;

    /// Look up a principal by email address.
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Principal>>;

    /// Compare a plaintext password with the stored credential.
    async fn verify_password(&self, username: &str, plaintext: &str) -> StoreResult<bool>;

    /// Replace the password of the account owning `email`.
    async fn update_password_by_email(&self, email: &str, new_password: &str) -> StoreResult<bool>;

    /// Atomically increment the failure counter and lock the account once
    /// it reaches `threshold`. Returns the updated principal.
    async fn record_failed_login(&self, username: &str, threshold: u32) -> StoreResult<Option<Principal>>;

    /// Record a correct password. Atomically clears the failure counter
    /// if the account is still active, and returns the principal as
    /// stored afterwards. A non-active status in the result means the
    /// login must fail.
    async fn record_successful_login(&self, username: &str) -> StoreResult<Option<Principal>>;
}

/// Hash a password with Argon2id.
pub fn hash_password(password: &str) -> StoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StoreError::Backend(format!("Password hashing failed: {e}")))
}

/// Verify a password against an Argon2 PHC string.
pub fn verify_password_hash(hash: &str, password: &str) -> StoreResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| StoreError::Backend(format!("Failed to parse password hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Account fields for [`MemoryCredentialStore::create`].
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub username: String,
    pub email: String,
    pub password: String,
    pub status: PrincipalStatus,
}

struct UserRecord {
    principal: Principal,
    password_hash: String,
}

/// In-process user directory.
pub struct MemoryCredentialStore {
    users: RwLock<HashMap<String, UserRecord>>,
    next_id: AtomicI64,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Create an account. Fails with `Conflict` on a duplicate username.
    pub async fn create(&self, new: NewPrincipal) -> StoreResult<Principal> {
        let password_hash = hash_blocking(new.password).await?;

        let mut users = self.users.write().await;
        if users.contains_key(&new.username) {
            return Err(StoreError::Conflict(format!("username {}", new.username)));
        }

        let principal = Principal {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            username: new.username.clone(),
            email: new.email.to_lowercase(),
            status: new.status,
            failed_login_count: 0,
            locked_at: None,
        };
        users.insert(
            new.username,
            UserRecord {
                principal: principal.clone(),
                password_hash,
            },
        );
        Ok(principal)
    }

    /// Administrative status change (disable, re-enable, unlock).
    pub async fn set_status(&self, username: &str, status: PrincipalStatus) -> StoreResult<Principal> {
        let mut users = self.users.write().await;
        let record = users
            .get_mut(username)
            .ok_or_else(|| StoreError::NotFound(format!("username {username}")))?;

        record.principal.status = status;
        if status == PrincipalStatus::Active {
            record.principal.failed_login_count = 0;
            record.principal.locked_at = None;
        }
        Ok(record.principal.clone())
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

async fn hash_blocking(password: String) -> StoreResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| StoreError::Backend(format!("Hashing task failed: {e}")))?
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Principal>> {
        let users = self.users.read().await;
        Ok(users.get(username).map(|record| record.principal.clone()))
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Principal>> {
        let email = email.to_lowercase();
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|record| record.principal.email == email)
            .map(|record| record.principal.clone()))
    }

    async fn verify_password(&self, username: &str, plaintext: &str) -> StoreResult<bool> {
        let hash = {
            let users = self.users.read().await;
            match users.get(username) {
                Some(record) => record.password_hash.clone(),
                None => return Ok(false),
            }
        };
        let plaintext = plaintext.to_string();
        tokio::task::spawn_blocking(move || verify_password_hash(&hash, &plaintext))
            .await
            .map_err(|e| StoreError::Backend(format!("Verification task failed: {e}")))?
    }

    async fn update_password_by_email(&self, email: &str, new_password: &str) -> StoreResult<bool> {
        let password_hash = hash_blocking(new_password.to_string()).await?;
        let email = email.to_lowercase();

        let mut users = self.users.write().await;
        match users.values_mut().find(|record| record.principal.email == email) {
            Some(record) => {
                record.password_hash = password_hash;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_failed_login(&self, username: &str, threshold: u32) -> StoreResult<Option<Principal>> {
        let mut users = self.users.write().await;
        let Some(record) = users.get_mut(username) else {
            return Ok(None);
        };

        let principal = &mut record.principal;
        principal.failed_login_count = principal.failed_login_count.saturating_add(1);
        if principal.failed_login_count >= threshold && principal.status == PrincipalStatus::Active {
            principal.status = PrincipalStatus::Locked;
            principal.locked_at = Some(Utc::now());
        }
        Ok(Some(principal.clone()))
    }

    async fn record_successful_login(&self, username: &str) -> StoreResult<Option<Principal>> {
        let mut users = self.users.write().await;
        let Some(record) = users.get_mut(username) else {
            return Ok(None);
        };

        if record.principal.status == PrincipalStatus::Active {
            record.principal.failed_login_count = 0;
        }
        Ok(Some(record.principal.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn alice() -> NewPrincipal {
        NewPrincipal {
            username: "alice".to_string(),
            email: "Alice@Example.com".to_string(),
            password: "correct horse".to_string(),
            status: PrincipalStatus::Active,
        }
    }

    #[tokio::test]
    async fn create_and_find() {
        let store = MemoryCredentialStore::new();
        let created = store.create(alice()).await.unwrap();

        let found = store.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(found, created);
        assert_eq!(found.email, "alice@example.com");
        assert!(store.find_by_email("ALICE@example.com").await.unwrap().is_some());
        assert!(store.find_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let store = MemoryCredentialStore::new();
        store.create(alice()).await.unwrap();
        assert!(matches!(store.create(alice()).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn verify_password_checks_hash() {
        let store = MemoryCredentialStore::new();
        store.create(alice()).await.unwrap();

        assert!(store.verify_password("alice", "correct horse").await.unwrap());
        assert!(!store.verify_password("alice", "wrong").await.unwrap());
        assert!(!store.verify_password("nobody", "correct horse").await.unwrap());
    }

    #[tokio::test]
    async fn update_password_by_email() {
        let store = MemoryCredentialStore::new();
        store.create(alice()).await.unwrap();

        assert!(store
            .update_password_by_email("alice@example.com", "new secret")
            .await
            .unwrap());
        assert!(store.verify_password("alice", "new secret").await.unwrap());
        assert!(!store
            .update_password_by_email("nobody@example.com", "x")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn failures_lock_at_threshold() {
        let store = MemoryCredentialStore::new();
        store.create(alice()).await.unwrap();

        for expected in 1..5 {
            let p = store.record_failed_login("alice", 5).await.unwrap().unwrap();
            assert_eq!(p.failed_login_count, expected);
            assert_eq!(p.status, PrincipalStatus::Active);
        }
        let p = store.record_failed_login("alice", 5).await.unwrap().unwrap();
        assert_eq!(p.status, PrincipalStatus::Locked);
        assert!(p.locked_at.is_some());
    }

    #[tokio::test]
    async fn concurrent_failures_are_not_lost() {
        let store = Arc::new(MemoryCredentialStore::new());
        store.create(alice()).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.record_failed_login("alice", 100).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let p = store.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(p.failed_login_count, 20);
    }

    #[tokio::test]
    async fn success_on_locked_account_keeps_lock_and_count() {
        let store = MemoryCredentialStore::new();
        store.create(alice()).await.unwrap();
        store.record_failed_login("alice", 5).await.unwrap();
        let p = store.record_successful_login("alice").await.unwrap().unwrap();
        assert_eq!(p.failed_login_count, 0);

        for _ in 0..2 {
            store.record_failed_login("alice", 2).await.unwrap();
        }
        let p = store.record_successful_login("alice").await.unwrap().unwrap();
        assert_eq!(p.status, PrincipalStatus::Locked);
        assert_eq!(p.failed_login_count, 2);
        assert!(store.record_successful_login("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_status_active_clears_lock() {
        let store = MemoryCredentialStore::new();
        store.create(alice()).await.unwrap();
        for _ in 0..3 {
            store.record_failed_login("alice", 3).await.unwrap();
        }

        let p = store.set_status("alice", PrincipalStatus::Active).await.unwrap();
        assert_eq!(p.failed_login_count, 0);
        assert!(p.locked_at.is_none());
    }
}
