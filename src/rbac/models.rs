// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Role, menu and menu-tree types.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Role key whose holders are granted every permission.
pub const SUPER_ADMIN_ROLE_KEY: &str = "admin";

/// Permission string that satisfies every check.
pub const ALL_PERMISSION: &str = "*:*:*";

/// A named bundle of menu grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Role {
    pub id: i64,
    /// Stable key (e.g. `admin`, `auditor`)
    pub key: String,
    /// Display name
    pub name: String,
    pub enabled: bool,
}

impl Role {
    pub fn is_super_admin(&self) -> bool {
        self.key == SUPER_ADMIN_ROLE_KEY
    }
}

/// Menu entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MenuKind {
    Directory,
    Menu,
    /// Action-level entry; contributes permissions but never appears in the tree.
    Button,
}

/// A node of the navigation/permission hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Menu {
    pub id: i64,
    /// `0` for top-level entries
    pub parent_id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Comma-separated permission strings such as `system:user:list`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perms: Option<String>,
    pub kind: MenuKind,
    pub order: i32,
    pub visible: bool,
    pub enabled: bool,
}

impl Menu {
    /// Non-blank permission strings carried by this menu.
    pub fn permissions(&self) -> impl Iterator<Item = &str> {
        self.perms
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

/// Menu tree node returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MenuNode {
    pub id: i64,
    pub parent_id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub kind: MenuKind,
    pub order: i32,
    #[schema(no_recursion)]
    pub children: Vec<MenuNode>,
}

impl From<&Menu> for MenuNode {
    fn from(menu: &Menu) -> Self {
        Self {
            id: menu.id,
            parent_id: menu.parent_id,
            name: menu.name.clone(),
            path: menu.path.clone(),
            kind: menu.kind,
            order: menu.order,
            children: Vec::new(),
        }
    }
}

/// Sibling ordering for menu trees. Ties are always broken by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MenuSortKey {
    #[default]
    Order,
    Name,
    Id,
}

impl std::str::FromStr for MenuSortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "order" => Ok(MenuSortKey::Order),
            "name" => Ok(MenuSortKey::Name),
            "id" => Ok(MenuSortKey::Id),
            other => Err(format!("unknown menu sort key '{other}' (expected order, name or id)")),
        }
    }
}

/// Request to create a role.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewRole {
    pub key: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Request to create a menu.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewMenu {
    #[serde(default)]
    pub parent_id: i64,
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub perms: Option<String>,
    pub kind: MenuKind,
    #[serde(default)]
    pub order: i32,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Partial update of a menu's visibility/enabled flags.
#[derive(Debug, Clone, Copy, Default, Deserialize, ToSchema)]
pub struct MenuFlags {
    pub visible: Option<bool>,
    pub enabled: Option<bool>,
}

fn default_true() -> bool {
    true
}
