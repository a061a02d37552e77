// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Shared Cache Module
//!
//! The session registry and the permission cache live in a shared
//! key-value store. Components receive an `Arc<dyn KvStore>` at
//! construction; the concrete backend is chosen once in `main`.
//!
//! ## Key Layout
//!
//! ```text
//! session:{principal_id}        # live bearer token, TTL = session TTL
//! login:lock:{principal_id}     # login serialization lock (owner token)
//! perm:gen:{principal_id}       # invalidation generation counter
//! perm:set:{principal_id}       # cached permission set
//! perm:tree:{principal_id}      # cached menu tree
//! pwd:code:{email}              # one-time password reset code (HMAC)
//! ```
//!
//! ## Backends
//!
//! - `MemoryKv` - in-process LRU with per-key TTL
//! - `TimeoutKv` - deadline decorator applied on top of any backend

pub mod kv;
pub mod lock;
pub mod memory;
pub mod timeout;

pub use kv::{get_json, set_json, KvError, KvResult, KvStore};
pub use lock::{KeyLock, LockGuard};
pub use memory::MemoryKv;
pub use timeout::TimeoutKv;
