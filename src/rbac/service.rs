// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! RBAC administration.
//!
//! Every mutation computes the principals whose grants it changes,
//! applies the change, then invalidates their cached permissions before
//! returning. If invalidation fails the operation fails.
//!
//! The affected set is read both before and after the change and the
//! union is invalidated, so a principal who gains the role while the
//! change is in flight is not left with a stale cache.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::models::{Menu, MenuFlags, NewMenu, NewRole, Role};
use super::resolver::PermissionResolver;
use super::store::RbacStore;
use crate::auth::credentials::StoreError;
use crate::auth::AuthError;
use crate::error::ApiError;

/// RBAC administration errors.
#[derive(Debug, thiserror::Error)]
pub enum RbacError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl From<StoreError> for RbacError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => RbacError::NotFound(what),
            StoreError::Conflict(what) => RbacError::Conflict(what),
            other => RbacError::Auth(other.into()),
        }
    }
}

impl From<RbacError> for ApiError {
    fn from(e: RbacError) -> Self {
        match e {
            RbacError::NotFound(what) => ApiError::not_found(format!("{what} not found")),
            RbacError::Conflict(what) => ApiError::conflict(what),
            RbacError::Auth(auth) => auth.into(),
        }
    }
}

/// Role/menu administration with cache invalidation.
pub struct RbacService {
    store: Arc<dyn RbacStore>,
    resolver: Arc<PermissionResolver>,
}

impl RbacService {
    pub fn new(store: Arc<dyn RbacStore>, resolver: Arc<PermissionResolver>) -> Self {
        Self { store, resolver }
    }

    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>, RbacError> {
        Ok(self.store.list_roles().await?)
    }

    pub async fn list_menus(&self) -> Result<Vec<Menu>, RbacError> {
        Ok(self.store.list_menus().await?)
    }

    pub async fn roles_of(&self, principal_id: i64) -> Result<Vec<Role>, RbacError> {
        Ok(self.store.roles_of(principal_id).await?)
    }

    pub async fn create_role(&self, role: NewRole) -> Result<Role, RbacError> {
        let created = self.store.create_role(role).await?;
        tracing::info!(role_id = created.id, key = %created.key, "Role created");
        Ok(created)
    }

    /// New menus appear immediately in super admins' trees.
    pub async fn create_menu(&self, menu: NewMenu) -> Result<Menu, RbacError> {
        let mut affected = self.super_admin_principals().await?;
        let created = self.store.create_menu(menu).await?;
        affected.extend(self.super_admin_principals().await?);
        self.invalidate(affected).await?;
        tracing::info!(menu_id = created.id, name = %created.name, "Menu created");
        Ok(created)
    }

    pub async fn assign_role(&self, principal_id: i64, role_id: i64) -> Result<bool, RbacError> {
        self.require_role(role_id).await?;
        let changed = self.store.assign_role(principal_id, role_id).await?;
        self.invalidate([principal_id]).await?;
        tracing::info!(principal_id, role_id, changed, "Role assigned");
        Ok(changed)
    }

    pub async fn unassign_role(&self, principal_id: i64, role_id: i64) -> Result<bool, RbacError> {
        let changed = self.store.unassign_role(principal_id, role_id).await?;
        self.invalidate([principal_id]).await?;
        tracing::info!(principal_id, role_id, changed, "Role unassigned");
        Ok(changed)
    }

    pub async fn grant_menu(&self, role_id: i64, menu_id: i64) -> Result<bool, RbacError> {
        self.require_role(role_id).await?;
        self.require_menu(menu_id).await?;
        let before = self.store.principals_with_role(role_id).await?;
        let changed = self.store.grant_menu(role_id, menu_id).await?;
        let affected = self.role_holders_since(role_id, before).await?;
        self.invalidate(affected).await?;
        Ok(changed)
    }

    pub async fn revoke_menu(&self, role_id: i64, menu_id: i64) -> Result<bool, RbacError> {
        let before = self.store.principals_with_role(role_id).await?;
        let changed = self.store.revoke_menu(role_id, menu_id).await?;
        let affected = self.role_holders_since(role_id, before).await?;
        self.invalidate(affected).await?;
        Ok(changed)
    }

    pub async fn update_menu_flags(&self, menu_id: i64, flags: MenuFlags) -> Result<Menu, RbacError> {
        let mut affected = self.principals_reaching_menu(menu_id).await?;
        let menu = self
            .store
            .update_menu_flags(menu_id, flags)
            .await?
            .ok_or_else(|| RbacError::NotFound(format!("menu {menu_id}")))?;
        affected.extend(self.principals_reaching_menu(menu_id).await?);
        self.invalidate(affected).await?;
        Ok(menu)
    }

    pub async fn set_role_enabled(&self, role_id: i64, enabled: bool) -> Result<Role, RbacError> {
        let before = self.store.principals_with_role(role_id).await?;
        let role = self
            .store
            .set_role_enabled(role_id, enabled)
            .await?
            .ok_or_else(|| RbacError::NotFound(format!("role {role_id}")))?;
        let affected = self.role_holders_since(role_id, before).await?;
        self.invalidate(affected).await?;
        tracing::info!(role_id, enabled, "Role status changed");
        Ok(role)
    }

    pub async fn delete_role(&self, role_id: i64) -> Result<(), RbacError> {
        let affected = self.store.principals_with_role(role_id).await?;
        if !self.store.delete_role(role_id).await? {
            return Err(RbacError::NotFound(format!("role {role_id}")));
        }
        self.invalidate(affected).await?;
        tracing::info!(role_id, "Role deleted");
        Ok(())
    }

    pub async fn delete_menu(&self, menu_id: i64) -> Result<(), RbacError> {
        let affected = self.principals_reaching_menu(menu_id).await?;
        if !self.store.delete_menu(menu_id).await? {
            return Err(RbacError::NotFound(format!("menu {menu_id}")));
        }
        self.invalidate(affected).await?;
        tracing::info!(menu_id, "Menu deleted");
        Ok(())
    }

    async fn require_role(&self, role_id: i64) -> Result<Role, RbacError> {
        self.store
            .find_role(role_id)
            .await?
            .ok_or_else(|| RbacError::NotFound(format!("role {role_id}")))
    }

    async fn require_menu(&self, menu_id: i64) -> Result<Menu, RbacError> {
        self.store
            .find_menu(menu_id)
            .await?
            .ok_or_else(|| RbacError::NotFound(format!("menu {menu_id}")))
    }

    /// `before` plus the role's current holders.
    async fn role_holders_since(&self, role_id: i64, before: Vec<i64>) -> Result<BTreeSet<i64>, RbacError> {
        let mut holders: BTreeSet<i64> = before.into_iter().collect();
        holders.extend(self.store.principals_with_role(role_id).await?);
        Ok(holders)
    }

    async fn super_admin_principals(&self) -> Result<BTreeSet<i64>, RbacError> {
        let mut principals = BTreeSet::new();
        for role in self.store.list_roles().await? {
            if role.is_super_admin() {
                principals.extend(self.store.principals_with_role(role.id).await?);
            }
        }
        Ok(principals)
    }

    /// Holders of any role granting the menu, plus super admins (who see
    /// every menu).
    async fn principals_reaching_menu(&self, menu_id: i64) -> Result<BTreeSet<i64>, RbacError> {
        let mut principals = self.super_admin_principals().await?;
        for role_id in self.store.roles_with_menu(menu_id).await? {
            principals.extend(self.store.principals_with_role(role_id).await?);
        }
        Ok(principals)
    }

    async fn invalidate(&self, principals: impl IntoIterator<Item = i64>) -> Result<(), RbacError> {
        let ids: Vec<i64> = principals.into_iter().collect();
        if !ids.is_empty() {
            self.resolver.invalidate(&ids).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::models::MenuKind;
    use crate::rbac::resolver::tests::{new_menu, new_role, settings};
    use crate::auth::credentials::StoreResult;
    use crate::rbac::store::MemoryRbacStore;
    use crate::storage::timeout::tests::StalledKv;
    use crate::storage::{KvStore, MemoryKv, TimeoutKv};
    use async_trait::async_trait;
    use std::time::Duration;

    fn service() -> RbacService {
        let store: Arc<dyn RbacStore> = Arc::new(MemoryRbacStore::new());
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new(128));
        let resolver = Arc::new(PermissionResolver::new(kv, store.clone(), settings()));
        RbacService::new(store, resolver)
    }

    const EDIT: &str = "system:role:edit";

    async fn role_with_edit(svc: &RbacService) -> (Role, Menu) {
        let menu = svc
            .create_menu(new_menu(0, "Roles", Some(EDIT), MenuKind::Menu, 1))
            .await
            .unwrap();
        let role = svc.create_role(new_role("editor")).await.unwrap();
        svc.grant_menu(role.id, menu.id).await.unwrap();
        (role, menu)
    }

    #[tokio::test]
    async fn assign_then_unassign_leaves_no_stale_permission() {
        let svc = service();
        let (role, _) = role_with_edit(&svc).await;

        // Warm the cache with the empty set.
        assert!(svc.resolver().get_permission_set(1).await.unwrap().is_empty());

        svc.assign_role(1, role.id).await.unwrap();
        assert!(svc.resolver().get_permission_set(1).await.unwrap().contains(EDIT));

        svc.unassign_role(1, role.id).await.unwrap();
        assert!(!svc.resolver().get_permission_set(1).await.unwrap().contains(EDIT));
    }

    #[tokio::test]
    async fn revoking_menu_reaches_every_holder() {
        let svc = service();
        let (role, menu) = role_with_edit(&svc).await;
        svc.assign_role(1, role.id).await.unwrap();
        svc.assign_role(2, role.id).await.unwrap();
        for pid in [1, 2] {
            svc.resolver().require_permission(pid, EDIT).await.unwrap();
        }

        svc.revoke_menu(role.id, menu.id).await.unwrap();
        for pid in [1, 2] {
            assert!(matches!(
                svc.resolver().require_permission(pid, EDIT).await,
                Err(AuthError::Forbidden(_))
            ));
        }
    }

    #[tokio::test]
    async fn disabling_role_and_hiding_menu_take_effect() {
        let svc = service();
        let (role, menu) = role_with_edit(&svc).await;
        svc.assign_role(1, role.id).await.unwrap();
        assert_eq!(svc.resolver().get_menu_tree(1).await.unwrap().len(), 1);

        svc.update_menu_flags(
            menu.id,
            MenuFlags {
                visible: Some(false),
                enabled: None,
            },
        )
        .await
        .unwrap();
        assert!(svc.resolver().get_menu_tree(1).await.unwrap().is_empty());
        assert!(svc.resolver().get_permission_set(1).await.unwrap().contains(EDIT));

        svc.set_role_enabled(role.id, false).await.unwrap();
        assert!(svc.resolver().get_permission_set(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_role_and_menu_invalidates_holders() {
        let svc = service();
        let (role, menu) = role_with_edit(&svc).await;
        svc.assign_role(1, role.id).await.unwrap();
        assert!(svc.resolver().get_permission_set(1).await.unwrap().contains(EDIT));

        svc.delete_menu(menu.id).await.unwrap();
        assert!(svc.resolver().get_permission_set(1).await.unwrap().is_empty());

        svc.delete_role(role.id).await.unwrap();
        assert!(svc.roles_of(1).await.unwrap().is_empty());
        assert!(matches!(svc.delete_role(role.id).await, Err(RbacError::NotFound(_))));
    }

    #[tokio::test]
    async fn new_menu_reaches_super_admin_tree() {
        let svc = service();
        let admin = svc.create_role(new_role("admin")).await.unwrap();
        svc.assign_role(1, admin.id).await.unwrap();
        assert!(svc.resolver().get_menu_tree(1).await.unwrap().is_empty());

        svc.create_menu(new_menu(0, "Audit", None, MenuKind::Directory, 1))
            .await
            .unwrap();
        assert_eq!(svc.resolver().get_menu_tree(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let svc = service();
        assert!(matches!(svc.assign_role(1, 99).await, Err(RbacError::NotFound(_))));
        assert!(matches!(
            svc.update_menu_flags(99, MenuFlags::default()).await,
            Err(RbacError::NotFound(_))
        ));
    }

    /// Assigns a role to `joiner` in the middle of every menu grant or
    /// revocation, as a concurrent admin request would.
    struct JoinDuringGrant {
        inner: MemoryRbacStore,
        joiner: i64,
    }

    impl JoinDuringGrant {
        async fn join(&self, role_id: i64) -> StoreResult<()> {
            self.inner.assign_role(self.joiner, role_id).await.map(|_| ())
        }
    }

    #[async_trait]
    impl RbacStore for JoinDuringGrant {
        async fn list_roles(&self) -> StoreResult<Vec<Role>> {
            self.inner.list_roles().await
        }
        async fn list_menus(&self) -> StoreResult<Vec<Menu>> {
            self.inner.list_menus().await
        }
        async fn find_role(&self, role_id: i64) -> StoreResult<Option<Role>> {
            self.inner.find_role(role_id).await
        }
        async fn find_menu(&self, menu_id: i64) -> StoreResult<Option<Menu>> {
            self.inner.find_menu(menu_id).await
        }
        async fn roles_of(&self, principal_id: i64) -> StoreResult<Vec<Role>> {
            self.inner.roles_of(principal_id).await
        }
        async fn menus_of_roles(&self, role_ids: &[i64]) -> StoreResult<Vec<Menu>> {
            self.inner.menus_of_roles(role_ids).await
        }
        async fn principals_with_role(&self, role_id: i64) -> StoreResult<Vec<i64>> {
            self.inner.principals_with_role(role_id).await
        }
        async fn roles_with_menu(&self, menu_id: i64) -> StoreResult<Vec<i64>> {
            self.inner.roles_with_menu(menu_id).await
        }
        async fn create_role(&self, role: NewRole) -> StoreResult<Role> {
            self.inner.create_role(role).await
        }
        async fn create_menu(&self, menu: NewMenu) -> StoreResult<Menu> {
            self.inner.create_menu(menu).await
        }
        async fn assign_role(&self, principal_id: i64, role_id: i64) -> StoreResult<bool> {
            self.inner.assign_role(principal_id, role_id).await
        }
        async fn unassign_role(&self, principal_id: i64, role_id: i64) -> StoreResult<bool> {
            self.inner.unassign_role(principal_id, role_id).await
        }
        async fn grant_menu(&self, role_id: i64, menu_id: i64) -> StoreResult<bool> {
            self.join(role_id).await?;
            self.inner.grant_menu(role_id, menu_id).await
        }
        async fn revoke_menu(&self, role_id: i64, menu_id: i64) -> StoreResult<bool> {
            self.join(role_id).await?;
            self.inner.revoke_menu(role_id, menu_id).await
        }
        async fn update_menu_flags(&self, menu_id: i64, flags: MenuFlags) -> StoreResult<Option<Menu>> {
            self.inner.update_menu_flags(menu_id, flags).await
        }
        async fn set_role_enabled(&self, role_id: i64, enabled: bool) -> StoreResult<Option<Role>> {
            self.inner.set_role_enabled(role_id, enabled).await
        }
        async fn delete_role(&self, role_id: i64) -> StoreResult<bool> {
            self.inner.delete_role(role_id).await
        }
        async fn delete_menu(&self, menu_id: i64) -> StoreResult<bool> {
            self.inner.delete_menu(menu_id).await
        }
    }

    #[tokio::test]
    async fn principal_joining_during_grant_is_invalidated() {
        let store: Arc<dyn RbacStore> = Arc::new(JoinDuringGrant {
            inner: MemoryRbacStore::new(),
            joiner: 3,
        });
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new(128));
        let resolver = Arc::new(PermissionResolver::new(kv, store.clone(), settings()));
        let svc = RbacService::new(store, resolver);

        let menu = svc
            .create_menu(new_menu(0, "Roles", Some(EDIT), MenuKind::Menu, 1))
            .await
            .unwrap();
        let role = svc.create_role(new_role("editor")).await.unwrap();

        // Warm the joiner's cache with the empty set.
        assert!(svc.resolver().get_permission_set(3).await.unwrap().is_empty());

        svc.grant_menu(role.id, menu.id).await.unwrap();
        assert!(svc.resolver().get_permission_set(3).await.unwrap().contains(EDIT));

        svc.revoke_menu(role.id, menu.id).await.unwrap();
        assert!(svc.resolver().get_permission_set(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mutation_fails_when_invalidation_fails() {
        let store: Arc<dyn RbacStore> = Arc::new(MemoryRbacStore::new());
        let menu = store
            .create_menu(new_menu(0, "Roles", Some(EDIT), MenuKind::Menu, 1))
            .await
            .unwrap();
        let role = store.create_role(new_role("editor")).await.unwrap();
        store.assign_role(1, role.id).await.unwrap();

        let kv: Arc<dyn KvStore> = Arc::new(TimeoutKv::new(Arc::new(StalledKv), Duration::from_millis(20)));
        let resolver = Arc::new(PermissionResolver::new(kv, store.clone(), settings()));
        let svc = RbacService::new(store, resolver);

        let err = svc.grant_menu(role.id, menu.id).await.unwrap_err();
        assert!(matches!(err, RbacError::Auth(AuthError::DependencyTimeout(_))));
        assert!(matches!(
            svc.set_role_enabled(role.id, false).await,
            Err(RbacError::Auth(AuthError::DependencyTimeout(_)))
        ));
        assert!(matches!(
            svc.assign_role(2, role.id).await,
            Err(RbacError::Auth(AuthError::DependencyTimeout(_)))
        ));
    }
}
