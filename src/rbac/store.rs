// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Role/menu storage.
//!
//! `menus_of_roles` returns one row per (role, menu) grant, so a menu
//! reachable through two roles comes back twice. Callers dedupe.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::models::{Menu, MenuFlags, NewMenu, NewRole, Role};
use crate::auth::credentials::{StoreError, StoreResult};

/// Role and menu directory.
#[async_trait]
pub trait RbacStore: Send + Sync {
    async fn list_roles(&self) -> StoreResult<Vec<Role>>;
    async fn list_menus(&self) -> StoreResult<Vec<Menu>>;
    async fn find_role(&self, role_id: i64) -> StoreResult<Option<Role>>;
    async fn find_menu(&self, menu_id: i64) -> StoreResult<Option<Menu>>;

    /// Roles held by a principal (enabled or not).
    async fn roles_of(&self, principal_id: i64) -> StoreResult<Vec<Role>>;

    /// Menus granted to any of the roles, one row per grant.
    async fn menus_of_roles(&self, role_ids: &[i64]) -> StoreResult<Vec<Menu>>;

    async fn principals_with_role(&self, role_id: i64) -> StoreResult<Vec<i64>>;
    async fn roles_with_menu(&self, menu_id: i64) -> StoreResult<Vec<i64>>;

    async fn create_role(&self, role: NewRole) -> StoreResult<Role>;
    async fn create_menu(&self, menu: NewMenu) -> StoreResult<Menu>;

    async fn assign_role(&self, principal_id: i64, role_id: i64) -> StoreResult<bool>;
    async fn unassign_role(&self, principal_id: i64, role_id: i64) -> StoreResult<bool>;
    async fn grant_menu(&self, role_id: i64, menu_id: i64) -> StoreResult<bool>;
    async fn revoke_menu(&self, role_id: i64, menu_id: i64) -> StoreResult<bool>;

    async fn update_menu_flags(&self, menu_id: i64, flags: MenuFlags) -> StoreResult<Option<Menu>>;
    async fn set_role_enabled(&self, role_id: i64, enabled: bool) -> StoreResult<Option<Role>>;

    /// Delete a role and all of its associations.
    async fn delete_role(&self, role_id: i64) -> StoreResult<bool>;

    /// Delete a leaf menu and its grants. Menus with children are refused.
    async fn delete_menu(&self, menu_id: i64) -> StoreResult<bool>;
}

#[derive(Default)]
struct Tables {
    roles: BTreeMap<i64, Role>,
    menus: BTreeMap<i64, Menu>,
    /// (principal_id, role_id)
    principal_roles: BTreeSet<(i64, i64)>,
    /// (role_id, menu_id)
    role_menus: BTreeSet<(i64, i64)>,
    next_role_id: i64,
    next_menu_id: i64,
}

/// In-process role/menu directory.
#[derive(Default)]
pub struct MemoryRbacStore {
    tables: RwLock<Tables>,
}

impl MemoryRbacStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RbacStore for MemoryRbacStore {
    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        Ok(self.tables.read().await.roles.values().cloned().collect())
    }

    async fn list_menus(&self) -> StoreResult<Vec<Menu>> {
        Ok(self.tables.read().await.menus.values().cloned().collect())
    }

    async fn find_role(&self, role_id: i64) -> StoreResult<Option<Role>> {
        Ok(self.tables.read().await.roles.get(&role_id).cloned())
    }

    async fn find_menu(&self, menu_id: i64) -> StoreResult<Option<Menu>> {
        Ok(self.tables.read().await.menus.get(&menu_id).cloned())
    }

    async fn roles_of(&self, principal_id: i64) -> StoreResult<Vec<Role>> {
        let t = self.tables.read().await;
        Ok(t.principal_roles
            .range((principal_id, i64::MIN)..=(principal_id, i64::MAX))
            .filter_map(|(_, role_id)| t.roles.get(role_id).cloned())
            .collect())
    }

    async fn menus_of_roles(&self, role_ids: &[i64]) -> StoreResult<Vec<Menu>> {
        let t = self.tables.read().await;
        Ok(role_ids
            .iter()
            .flat_map(|role_id| t.role_menus.range((*role_id, i64::MIN)..=(*role_id, i64::MAX)))
            .filter_map(|(_, menu_id)| t.menus.get(menu_id).cloned())
            .collect())
    }

    async fn principals_with_role(&self, role_id: i64) -> StoreResult<Vec<i64>> {
        let t = self.tables.read().await;
        Ok(t.principal_roles
            .iter()
            .filter(|(_, r)| *r == role_id)
            .map(|(p, _)| *p)
            .collect())
    }

    async fn roles_with_menu(&self, menu_id: i64) -> StoreResult<Vec<i64>> {
        let t = self.tables.read().await;
        Ok(t.role_menus
            .iter()
            .filter(|(_, m)| *m == menu_id)
            .map(|(r, _)| *r)
            .collect())
    }

    async fn create_role(&self, role: NewRole) -> StoreResult<Role> {
        let mut t = self.tables.write().await;
        if t.roles.values().any(|r| r.key == role.key) {
            return Err(StoreError::Conflict(format!("role key {}", role.key)));
        }
        t.next_role_id += 1;
        let created = Role {
            id: t.next_role_id,
            key: role.key,
            name: role.name,
            enabled: role.enabled,
        };
        t.roles.insert(created.id, created.clone());
        Ok(created)
    }

    async fn create_menu(&self, menu: NewMenu) -> StoreResult<Menu> {
        let mut t = self.tables.write().await;
        if menu.parent_id != 0 && !t.menus.contains_key(&menu.parent_id) {
            return Err(StoreError::NotFound(format!("parent menu {}", menu.parent_id)));
        }
        t.next_menu_id += 1;
        let created = Menu {
            id: t.next_menu_id,
            parent_id: menu.parent_id,
            name: menu.name,
            path: menu.path,
            perms: menu.perms,
            kind: menu.kind,
            order: menu.order,
            visible: menu.visible,
            enabled: menu.enabled,
        };
        t.menus.insert(created.id, created.clone());
        Ok(created)
    }

    async fn assign_role(&self, principal_id: i64, role_id: i64) -> StoreResult<bool> {
        Ok(self.tables.write().await.principal_roles.insert((principal_id, role_id)))
    }

    async fn unassign_role(&self, principal_id: i64, role_id: i64) -> StoreResult<bool> {
        Ok(self.tables.write().await.principal_roles.remove(&(principal_id, role_id)))
    }

    async fn grant_menu(&self, role_id: i64, menu_id: i64) -> StoreResult<bool> {
        Ok(self.tables.write().await.role_menus.insert((role_id, menu_id)))
    }

    async fn revoke_menu(&self, role_id: i64, menu_id: i64) -> StoreResult<bool> {
        Ok(self.tables.write().await.role_menus.remove(&(role_id, menu_id)))
    }

    async fn update_menu_flags(&self, menu_id: i64, flags: MenuFlags) -> StoreResult<Option<Menu>> {
        let mut t = self.tables.write().await;
        Ok(t.menus.get_mut(&menu_id).map(|menu| {
            if let Some(visible) = flags.visible {
                menu.visible = visible;
            }
            if let Some(enabled) = flags.enabled {
                menu.enabled = enabled;
            }
            menu.clone()
        }))
    }

    async fn set_role_enabled(&self, role_id: i64, enabled: bool) -> StoreResult<Option<Role>> {
        let mut t = self.tables.write().await;
        Ok(t.roles.get_mut(&role_id).map(|role| {
            role.enabled = enabled;
            role.clone()
        }))
    }

    async fn delete_role(&self, role_id: i64) -> StoreResult<bool> {
        let mut t = self.tables.write().await;
        if t.roles.remove(&role_id).is_none() {
            return Ok(false);
        }
        t.principal_roles.retain(|(_, r)| *r != role_id);
        t.role_menus.retain(|(r, _)| *r != role_id);
        Ok(true)
    }

    async fn delete_menu(&self, menu_id: i64) -> StoreResult<bool> {
        let mut t = self.tables.write().await;
        if t.menus.values().any(|m| m.parent_id == menu_id) {
            return Err(StoreError::Conflict(format!("menu {menu_id} has children")));
        }
        if t.menus.remove(&menu_id).is_none() {
            return Ok(false);
        }
        t.role_menus.retain(|(_, m)| *m != menu_id);
        Ok(true)
    }
}
