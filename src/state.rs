// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared application state.
//!
//! Every component is built once at startup and shared through `Arc`.
//! Backends (cache, user directory, RBAC directory, mailer) are
//! injected through [`Backends`]; the cache is always wrapped in
//! [`TimeoutKv`] so no request can hang on it.

use std::sync::Arc;

use crate::auth::{
    AuthError, Authenticator, AuthenticatorSettings, CredentialStore, EdgeConfig, LogMailer, Mailer,
    MemoryCredentialStore, NewPrincipal, PasswordReset, Principal, PrincipalStatus, ResetSettings, SessionRegistry,
    TokenCodec, TokenKeyError,
};
use crate::config::Config;
use crate::gateway::{Gateway, GatewayRoutes};
use crate::rbac::{
    MemoryRbacStore, MenuKind, NewMenu, NewRole, PermissionResolver, RbacError, RbacService, RbacStore,
    ResolverSettings, SUPER_ADMIN_ROLE_KEY,
};
use crate::storage::{KeyLock, KvStore, MemoryKv, TimeoutKv};

/// Startup failures.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid token secret: {0}")]
    TokenKey(#[from] TokenKeyError),

    #[error("failed to build upstream client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("seeding failed: {0}")]
    Seed(String),
}

/// Storage backends injected at startup.
pub struct Backends {
    pub kv: Arc<dyn KvStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub rbac: Arc<dyn RbacStore>,
    pub mailer: Arc<dyn Mailer>,
}

impl Backends {
    /// In-process backends.
    pub fn in_memory(config: &Config) -> (Self, Arc<MemoryCredentialStore>) {
        let credentials = Arc::new(MemoryCredentialStore::new());
        let backends = Self {
            kv: Arc::new(MemoryKv::new(config.cache_capacity)),
            credentials: credentials.clone(),
            rbac: Arc::new(MemoryRbacStore::new()),
            mailer: Arc::new(LogMailer),
        };
        (backends, credentials)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub edge: Arc<EdgeConfig>,
    pub kv: Arc<dyn KvStore>,
    pub codec: Arc<TokenCodec>,
    pub sessions: SessionRegistry,
    pub authenticator: Arc<Authenticator>,
    pub password_reset: Arc<PasswordReset>,
    pub permissions: Arc<PermissionResolver>,
    pub rbac: Arc<RbacService>,
    pub gateway: Arc<Gateway>,
}

impl AppState {
    pub fn new(config: &Config, backends: Backends) -> Result<Self, StartupError> {
        let kv: Arc<dyn KvStore> = Arc::new(TimeoutKv::new(backends.kv, config.dependency_timeout));
        let codec = Arc::new(TokenCodec::new(&config.token_secret)?);
        let sessions = SessionRegistry::new(kv.clone());

        let authenticator = Arc::new(Authenticator::new(
            backends.credentials.clone(),
            codec.clone(),
            sessions.clone(),
            KeyLock::new(kv.clone(), config.dependency_timeout),
            AuthenticatorSettings {
                max_failed_logins: config.max_failed_logins,
                token_ttl: config.token_ttl,
                session_ttl: config.session_ttl,
                store_timeout: config.dependency_timeout,
                token_type: config.token_prefix.clone(),
            },
        ));

        let password_reset = Arc::new(PasswordReset::new(
            kv.clone(),
            backends.credentials,
            sessions.clone(),
            backends.mailer,
            &config.token_secret,
            ResetSettings {
                code_ttl: config.password_reset_code_ttl,
                max_attempts: config.max_failed_logins,
                store_timeout: config.dependency_timeout,
            },
        )?);

        let permissions = Arc::new(PermissionResolver::new(
            kv.clone(),
            backends.rbac.clone(),
            ResolverSettings {
                cache_ttl: config.permission_cache_ttl,
                menu_sort: config.menu_sort,
                store_timeout: config.dependency_timeout,
            },
        ));
        let rbac = Arc::new(RbacService::new(backends.rbac, permissions.clone()));

        let gateway = Arc::new(Gateway::new(
            GatewayRoutes::new(config.gateway_routes.clone()),
            config.gateway_timeout,
        )?);

        Ok(Self {
            edge: Arc::new(EdgeConfig::from_config(config)),
            kv,
            codec,
            sessions,
            authenticator,
            password_reset,
            permissions,
            rbac,
            gateway,
        })
    }
}

/// Create the `admin` account, the super-admin role and the system menus.
pub async fn seed_admin(
    credentials: &MemoryCredentialStore,
    rbac: &RbacService,
    password: &str,
) -> Result<Principal, StartupError> {
    let admin = credentials
        .create(NewPrincipal {
            username: "admin".to_string(),
            email: "admin@localhost".to_string(),
            password: password.to_string(),
            status: PrincipalStatus::Active,
        })
        .await
        .map_err(|e| StartupError::Seed(e.to_string()))?;

    let seed = |e: RbacError| StartupError::Seed(e.to_string());
    let role = rbac
        .create_role(NewRole {
            key: SUPER_ADMIN_ROLE_KEY.to_string(),
            name: "Administrator".to_string(),
            enabled: true,
        })
        .await
        .map_err(seed)?;
    rbac.assign_role(admin.id, role.id).await.map_err(seed)?;

    let system = rbac
        .create_menu(seed_menu(0, "System", None, None, MenuKind::Directory, 1))
        .await
        .map_err(seed)?;
    let pages = [
        ("Roles", "/system/role", "system:role:list", 1),
        ("Menus", "/system/menu", "system:menu:list", 2),
    ];
    for (name, path, perms, order) in pages {
        rbac.create_menu(seed_menu(system.id, name, Some(path), Some(perms), MenuKind::Menu, order))
            .await
            .map_err(seed)?;
    }

    tracing::info!(principal_id = admin.id, "Seeded admin account");
    Ok(admin)
}

fn seed_menu(
    parent_id: i64,
    name: &str,
    path: Option<&str>,
    perms: Option<&str>,
    kind: MenuKind,
    order: i32,
) -> NewMenu {
    NewMenu {
        parent_id,
        name: name.to_string(),
        path: path.map(str::to_string),
        perms: perms.map(str::to_string),
        kind,
        order,
        visible: true,
        enabled: true,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::AUTH_TOKEN_SECRET_ENV;

    pub(crate) const ADMIN_PASSWORD: &str = "admin-password";

    pub(crate) fn test_config() -> Config {
        Config::from_lookup(|name| {
            (name == AUTH_TOKEN_SECRET_ENV).then(|| "0123456789abcdef0123456789abcdef".to_string())
        })
        .unwrap()
    }

    /// State over in-memory backends with the admin account seeded.
    pub(crate) async fn test_state() -> AppState {
        let config = test_config();
        let (backends, credentials) = Backends::in_memory(&config);
        let state = AppState::new(&config, backends).unwrap();
        seed_admin(&credentials, &state.rbac, ADMIN_PASSWORD).await.unwrap();
        state
    }

    #[tokio::test]
    async fn seeded_admin_holds_wildcard_and_system_tree() {
        let state = test_state().await;
        let session = state.authenticator.login("admin", ADMIN_PASSWORD).await.unwrap();

        state
            .permissions
            .require_permission(session.principal_id, "system:role:edit")
            .await
            .unwrap();
        let tree = state.permissions.get_menu_tree(session.principal_id).await.unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].children.len(), 2);
    }

    #[test]
    fn short_secret_fails_startup() {
        let config = Config::from_lookup(|name| (name == AUTH_TOKEN_SECRET_ENV).then(|| "short".to_string())).unwrap();
        let (backends, _) = Backends::in_memory(&config);
        assert!(matches!(AppState::new(&config, backends), Err(StartupError::TokenKey(_))));
    }
}
