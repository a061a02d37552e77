// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational Gatekeeper - Authentication Gateway & Permission Service
//!
//! Sits at the edge of the Relational backend. It authenticates bearer
//! tokens against a single-active-session registry, forwards verified
//! identity to upstream services, and resolves RBAC permissions and
//! navigation menus from role/menu assignments.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers and router (Axum)
//! - `auth` - Credentials, tokens, sessions, edge middleware, password reset
//! - `rbac` - Roles, menus, permission resolution and caching
//! - `gateway` - Prefix routing to upstream services
//! - `storage` - Key-value cache abstraction, timeouts and locks

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod rbac;
pub mod state;
pub mod storage;
pub mod telemetry;
