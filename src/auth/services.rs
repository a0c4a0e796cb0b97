use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use subtle::ConstantTimeEq;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        jwt::{IssuedToken, JwtKeys},
        password::{hash_password, verify_password},
        repo::{NewUser, Role, User, UserStore},
    },
    error::AuthError,
};

const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    // Verified against when the email is unknown so both failure paths cost one Argon2 run.
    static ref DUMMY_HASH: Option<String> = hash_password("authgate-timing-equalizer").ok();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Who is signing up: a regular user, or an admin presenting the admin secret.
#[derive(Debug, Clone, Copy)]
pub enum SignupKind<'a> {
    User,
    Admin { secret: &'a str },
}

/// Signup and credential checks on top of a [`UserStore`] and [`JwtKeys`].
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn UserStore>,
    keys: JwtKeys,
    admin_secret: String,
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, keys: JwtKeys, admin_secret: impl Into<String>) -> Self {
        Self {
            store,
            keys,
            admin_secret: admin_secret.into(),
        }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    /// Creates a user. Admin signups are refused before any hashing or store access
    /// when the secret does not match.
    #[instrument(skip(self, raw_password, kind))]
    pub async fn signup(
        &self,
        email: &str,
        raw_password: &str,
        kind: SignupKind<'_>,
    ) -> Result<User, AuthError> {
        let role = match kind {
            SignupKind::User => Role::User,
            SignupKind::Admin { secret } => {
                if !bool::from(secret.as_bytes().ct_eq(self.admin_secret.as_bytes())) {
                    warn!("admin signup with wrong secret");
                    return Err(AuthError::UnauthorizedAdmin);
                }
                Role::Admin
            }
        };

        let email = normalize_email(email);
        if !is_valid_email(&email) {
            warn!(%email, "invalid email");
            return Err(AuthError::validation("Invalid email"));
        }
        if raw_password.chars().count() < MIN_PASSWORD_LEN {
            warn!("password too short");
            return Err(AuthError::validation("Password too short"));
        }
        if raw_password.chars().count() > MAX_PASSWORD_LEN {
            warn!("password too long");
            return Err(AuthError::validation("Password too long"));
        }

        let password_hash = hash_password(raw_password)?;
        let user = self
            .store
            .create(NewUser {
                email,
                password_hash,
                role,
            })
            .await
            .map_err(|e| {
                let e = AuthError::from(e);
                if matches!(e, AuthError::DuplicateEmail) {
                    warn!("email already registered");
                }
                e
            })?;

        info!(user_id = %user.id, email = %user.email, role = %user.role, "user registered");
        Ok(user)
    }

    /// Verifies credentials and issues a token bound to the email.
    ///
    /// Unknown email and wrong password both yield [`AuthError::InvalidCredentials`].
    #[instrument(skip(self, raw_password))]
    pub async fn authenticate(
        &self,
        email: &str,
        raw_password: &str,
    ) -> Result<IssuedToken, AuthError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            warn!(%email, "invalid email");
            return Err(AuthError::validation("Invalid email"));
        }
        if raw_password.is_empty() {
            return Err(AuthError::validation("Password required"));
        }

        let user = match self.store.find_by_email(&email).await? {
            Some(u) => u,
            None => {
                if let Some(dummy) = DUMMY_HASH.as_deref() {
                    let _ = verify_password(raw_password, dummy);
                }
                warn!(%email, "authenticate unknown email");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !verify_password(raw_password, &user.password_hash) {
            warn!(%email, user_id = %user.id, "authenticate invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        let issued = self.keys.issue(&user.email, user.role)?;
        info!(user_id = %user.id, email = %user.email, "user authenticated");
        Ok(issued)
    }
}
