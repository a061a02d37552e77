// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Permission resolution with a generation-checked cache.
//!
//! ## Cache entries
//!
//! Each cached permission set or menu tree records the principal's
//! invalidation generation (`perm:gen:{pid}`) read *before* the rebuild
//! started. A reader accepts an entry only if that generation is still
//! current. `invalidate` bumps the generation first, so a rebuild that
//! raced with it publishes an entry no reader will accept.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::models::{Menu, MenuKind, MenuNode, MenuSortKey, Role, ALL_PERMISSION};
use super::store::RbacStore;
use super::tree::build_menu_tree;
use crate::auth::credentials::StoreResult;
use crate::auth::AuthError;
use crate::storage::{get_json, set_json, KvError, KvStore};

#[derive(Debug, Serialize, Deserialize)]
struct Cached<T> {
    generation: i64,
    value: T,
}

/// Resolver settings.
#[derive(Debug, Clone, Copy)]
pub struct ResolverSettings {
    /// TTL of cached sets and trees, independent of the token TTL.
    pub cache_ttl: Duration,
    pub menu_sort: MenuSortKey,
    /// Deadline for each RBAC store call.
    pub store_timeout: Duration,
}

/// Answers "what may this principal do / see".
pub struct PermissionResolver {
    kv: Arc<dyn KvStore>,
    store: Arc<dyn RbacStore>,
    settings: ResolverSettings,
}

impl PermissionResolver {
    pub fn new(kv: Arc<dyn KvStore>, store: Arc<dyn RbacStore>, settings: ResolverSettings) -> Self {
        Self { kv, store, settings }
    }

    fn generation_key(principal_id: i64) -> String {
        format!("perm:gen:{principal_id}")
    }

    fn set_key(principal_id: i64) -> String {
        format!("perm:set:{principal_id}")
    }

    fn tree_key(principal_id: i64) -> String {
        format!("perm:tree:{principal_id}")
    }

    /// Permission strings granted to the principal.
    pub async fn get_permission_set(&self, principal_id: i64) -> Result<BTreeSet<String>, AuthError> {
        let key = Self::set_key(principal_id);
        let generation = self.generation(principal_id).await?;
        if let Some(hit) = self.cached(&key, generation).await? {
            return Ok(hit);
        }

        let (roles, menus) = self.load_grants(principal_id).await?;
        let set = if roles.iter().any(Role::is_super_admin) {
            BTreeSet::from([ALL_PERMISSION.to_string()])
        } else {
            menus
                .iter()
                .filter(|m| m.enabled)
                .flat_map(|m| m.permissions())
                .map(str::to_string)
                .collect()
        };

        self.publish(&key, generation, &set).await?;
        tracing::debug!(principal_id, generation, permissions = set.len(), "Permission set rebuilt");
        Ok(set)
    }

    /// Navigation tree visible to the principal.
    pub async fn get_menu_tree(&self, principal_id: i64) -> Result<Vec<MenuNode>, AuthError> {
        let key = Self::tree_key(principal_id);
        let generation = self.generation(principal_id).await?;
        if let Some(hit) = self.cached(&key, generation).await? {
            return Ok(hit);
        }

        let (_, menus) = self.load_grants(principal_id).await?;
        let visible = menus
            .into_iter()
            .filter(|m| m.enabled && m.visible && m.kind != MenuKind::Button)
            .collect();
        let tree = build_menu_tree(visible, self.settings.menu_sort);

        self.publish(&key, generation, &tree).await?;
        tracing::debug!(principal_id, generation, roots = tree.len(), "Menu tree rebuilt");
        Ok(tree)
    }

    /// Guard for protected operations. Call before any side effect.
    pub async fn require_permission(&self, principal_id: i64, permission: &str) -> Result<(), AuthError> {
        let granted = self.get_permission_set(principal_id).await?;
        if granted.contains(ALL_PERMISSION) || granted.contains(permission) {
            return Ok(());
        }
        tracing::warn!(principal_id, permission, "Permission denied");
        Err(AuthError::Forbidden(permission.to_string()))
    }

    /// Drop cached authorization data for the given principals.
    pub async fn invalidate(&self, principal_ids: &[i64]) -> Result<(), AuthError> {
        for &principal_id in principal_ids {
            let generation = self.kv.incr(&Self::generation_key(principal_id)).await?;
            self.kv.delete(&Self::set_key(principal_id)).await?;
            self.kv.delete(&Self::tree_key(principal_id)).await?;
            tracing::debug!(principal_id, generation, "Permission cache invalidated");
        }
        Ok(())
    }

    async fn generation(&self, principal_id: i64) -> Result<i64, AuthError> {
        match self.kv.get(&Self::generation_key(principal_id)).await? {
            Some(raw) => raw
                .parse()
                .map_err(|_| AuthError::Internal(format!("corrupt generation for principal {principal_id}"))),
            None => Ok(0),
        }
    }

    async fn cached<T: DeserializeOwned>(&self, key: &str, generation: i64) -> Result<Option<T>, AuthError> {
        match get_json::<Cached<T>>(self.kv.as_ref(), key).await {
            Ok(Some(entry)) if entry.generation == generation => Ok(Some(entry.value)),
            Ok(_) => Ok(None),
            Err(KvError::Codec { key, source }) => {
                tracing::warn!(key = %key, error = %source, "Discarding undecodable cache entry");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn publish<T: Serialize + Sync>(&self, key: &str, generation: i64, value: &T) -> Result<(), AuthError> {
        let entry = Cached { generation, value };
        set_json(self.kv.as_ref(), key, &entry, Some(self.settings.cache_ttl)).await?;
        Ok(())
    }

    /// Enabled roles of the principal and the menus they reach. Super
    /// admins reach every menu.
    async fn load_grants(&self, principal_id: i64) -> Result<(Vec<Role>, Vec<Menu>), AuthError> {
        let roles: Vec<Role> = self
            .store_call(self.store.roles_of(principal_id))
            .await?
            .into_iter()
            .filter(|r| r.enabled)
            .collect();

        let menus = if roles.iter().any(Role::is_super_admin) {
            self.store_call(self.store.list_menus()).await?
        } else if roles.is_empty() {
            Vec::new()
        } else {
            let role_ids: Vec<i64> = roles.iter().map(|r| r.id).collect();
            self.store_call(self.store.menus_of_roles(&role_ids)).await?
        };

        Ok((roles, menus))
    }

    async fn store_call<T>(&self, call: impl Future<Output = StoreResult<T>>) -> Result<T, AuthError> {
        tokio::time::timeout(self.settings.store_timeout, call)
            .await
            .map_err(|_| AuthError::DependencyTimeout(self.settings.store_timeout))?
            .map_err(AuthError::from)
    }
}
