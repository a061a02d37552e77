// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Role-Based Access Control
//!
//! Principals hold roles; roles are granted menus; menus carry
//! permission strings and form the navigation tree.
//!
//! ## Components
//!
//! - `store` - `RbacStore` trait and the in-process directory
//! - `tree` - menu forest assembly
//! - `resolver` - cached permission sets / menu trees and the
//!   `require_permission` guard
//! - `service` - administrative mutations that invalidate affected
//!   principals before returning
//!
//! Holders of the `admin` role receive `*:*:*` and see every menu.

pub mod models;
pub mod resolver;
pub mod service;
pub mod store;
pub mod tree;

pub use models::{
    Menu, MenuFlags, MenuKind, MenuNode, MenuSortKey, NewMenu, NewRole, Role, ALL_PERMISSION,
    SUPER_ADMIN_ROLE_KEY,
};
pub use resolver::{PermissionResolver, ResolverSettings};
pub use service::{RbacError, RbacService};
pub use store::{MemoryRbacStore, RbacStore};
