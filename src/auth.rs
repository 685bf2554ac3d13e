//! Manager password and session handling
//!
//! The manager password is stored in the remote `config` table. New values
//! are written as Argon2 hashes; values that do not parse as a PHC hash are
//! treated as legacy plaintext and compared directly.

use crate::error::AuthError;
use crate::model::UserRole;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Minimum manager password length
pub const MIN_PASSWORD_LEN: usize = 4;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "session";

const SESSION_DURATION: u64 = 24 * 60 * 60; // 24 hours in seconds

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles");
}

/// Loose syntactic check used before saving the manager email
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

/// Hash a password with Argon2 and a random salt
///
/// # Errors
/// * `AuthError::PasswordTooShort` if the password has fewer than four characters
/// * `AuthError::HashingFailed` if the hasher rejects the input
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::PasswordTooShort(MIN_PASSWORD_LEN));
    }
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::HashingFailed)
}

/// Verify a password against a stored value
///
/// # Arguments
/// * `password` - The plaintext password to verify
/// * `stored` - An Argon2 PHC string, or a legacy plaintext password
///
/// # Returns
/// * `bool` - True if the password matches
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => !stored.is_empty() && password == stored,
    }
}

/// An authenticated browser session
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub role: UserRole,
    /// Analyst name for analyst sessions
    pub user: Option<String>,
    pub expires_at: SystemTime,
}

impl Session {
    pub fn is_manager(&self) -> bool {
        self.role == UserRole::Manager
    }
}

/// Thread-safe map of live sessions keyed by opaque token
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    lifetime: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_lifetime(Duration::from_secs(SESSION_DURATION))
    }

    pub fn with_lifetime(lifetime: Duration) -> Self {
        SessionStore {
            sessions: RwLock::new(HashMap::new()),
            lifetime,
        }
    }

    /// Create a session and return its token
    pub fn create(&self, role: UserRole, user: Option<String>) -> String {
        let token = Uuid::new_v4().to_string();
        let session = Session {
            role,
            user,
            expires_at: SystemTime::now() + self.lifetime,
        };
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.retain(|_, s| s.expires_at > SystemTime::now());
            sessions.insert(token.clone(), session);
        }
        token
    }

    /// Look up a live session
    pub fn validate(&self, token: &str) -> Result<Session, AuthError> {
        let sessions = self.sessions.read().map_err(|_| AuthError::NoSession)?;
        match sessions.get(token) {
            Some(session) if session.expires_at > SystemTime::now() => Ok(session.clone()),
            _ => Err(AuthError::NoSession),
        }
    }

    /// Look up a live manager session
    pub fn require_manager(&self, token: &str) -> Result<Session, AuthError> {
        let session = self.validate(token)?;
        if !session.is_manager() {
            return Err(AuthError::Forbidden);
        }
        Ok(session)
    }

    pub fn remove(&self, token: &str) {
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.remove(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_password_verifies() {
        let hash = hash_password("clave123").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("clave123", &hash));
        assert!(!verify_password("otra", &hash));
    }

    #[test]
    fn legacy_plaintext_still_verifies() {
        assert!(verify_password("1234", "1234"));
        assert!(!verify_password("12345", "1234"));
        assert!(!verify_password("", ""));
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert_eq!(hash_password("abc"), Err(AuthError::PasswordTooShort(4)));
    }

    #[test]
    fn email_syntax() {
        assert!(is_valid_email("jefe@lab.com"));
        assert!(!is_valid_email("jefe@lab"));
        assert!(!is_valid_email("jefe lab@x.com"));
    }

    #[test]
    fn sessions_expire_and_carry_role() {
        let store = SessionStore::new();
        let token = store.create(UserRole::Analyst, Some("Ana".into()));
        let session = store.validate(&token).unwrap();
        assert_eq!(session.user.as_deref(), Some("Ana"));
        assert_eq!(store.require_manager(&token), Err(AuthError::Forbidden));

        let expired = SessionStore::with_lifetime(Duration::from_secs(0));
        let token = expired.create(UserRole::Manager, None);
        assert_eq!(expired.validate(&token), Err(AuthError::NoSession));
    }
}
