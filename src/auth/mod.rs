// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer token authentication with a single live session per principal.
//!
//! ## Auth Flow
//!
//! 1. Client logs in with username/password (`Authenticator::login`)
//! 2. A signed HS256 token is issued and recorded in the session registry
//! 3. Client sends `Authorization: Bearer <token>`
//! 4. Edge middleware:
//!    - Verifies signature and expiry
//!    - Checks the token is still the principal's registered session
//!    - Injects the trust marker and principal headers
//! 5. Handlers read the principal with the `Auth` extractor
//!
//! ## Security
//!
//! - A later login replaces the earlier session; logout revokes it
//! - Repeated password failures lock the account
//! - Login failures share one public message

pub mod authenticator;
pub mod claims;
pub mod credentials;
pub mod error;
pub mod extractor;
pub mod middleware;
pub mod password_reset;
pub mod session;
pub mod token;

pub use authenticator::{Authenticator, AuthenticatorSettings, Credentials, LoginSession, Strategy};
pub use claims::AuthenticatedUser;
pub use credentials::{CredentialStore, MemoryCredentialStore, NewPrincipal, Principal, PrincipalStatus};
pub use error::AuthError;
pub use extractor::Auth;
pub use middleware::{edge_authenticate, AnonymousPaths, EdgeConfig};
pub use password_reset::{LogMailer, Mailer, PasswordReset, ResetSettings};
pub use session::{SessionRegistry, SessionStatus};
pub use token::{TokenCodec, TokenError, TokenKeyError};
