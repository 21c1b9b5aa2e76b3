//! Authentication: resolving HTTP Basic credentials to a [`Principal`].

use crate::access::Principal;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;

/// Authentication failures.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown user or wrong password. Deliberately indistinguishable.
    #[error("invalid username or password")]
    InvalidCredentials,

    /// The `Authorization` header is not a usable Basic credential.
    #[error("malformed Authorization header")]
    MalformedHeader,

    /// The stored hash could not be checked.
    #[error("password verification failed: {0}")]
    Verification(String),
}

/// How a configured password is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordHash {
    /// Stored verbatim.
    Plain,
    /// Lower-case hex SHA-256 digest.
    Sha256,
    /// bcrypt hash string (`$2b$...`).
    #[default]
    Bcrypt,
}

impl fmt::Display for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasswordHash::Plain => f.write_str("plain"),
            PasswordHash::Sha256 => f.write_str("sha256"),
            PasswordHash::Bcrypt => f.write_str("bcrypt"),
        }
    }
}

/// Produce the stored form of `password` for the given scheme.
pub fn hash_password(password: &str, method: PasswordHash) -> Result<String, AuthError> {
    match method {
        PasswordHash::Plain => Ok(password.to_string()),
        PasswordHash::Sha256 => Ok(hex::encode(Sha256::digest(password.as_bytes()))),
        PasswordHash::Bcrypt => bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|e| AuthError::Verification(e.to_string())),
    }
}

fn verify_password(password: &str, stored: &str, method: PasswordHash) -> Result<bool, AuthError> {
    match method {
        PasswordHash::Plain => Ok(password.as_bytes().ct_eq(stored.as_bytes()).into()),
        PasswordHash::Sha256 => {
            let actual = hex::encode(Sha256::digest(password.as_bytes()));
            let expected = stored.to_ascii_lowercase();
            Ok(actual.as_bytes().ct_eq(expected.as_bytes()).into())
        }
        PasswordHash::Bcrypt => {
            bcrypt::verify(password, stored).map_err(|e| AuthError::Verification(e.to_string()))
        }
    }
}

/// Username and password from an HTTP Basic `Authorization` header.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl BasicCredentials {
    /// Parse `Basic base64(user:pass)`. The password may itself contain `:`.
    pub fn from_header(value: &str) -> Result<Self, AuthError> {
        let (scheme, encoded) = value
            .trim()
            .split_once(' ')
            .ok_or(AuthError::MalformedHeader)?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return Err(AuthError::MalformedHeader);
        }

        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|_| AuthError::MalformedHeader)?;
        let decoded = String::from_utf8(decoded).map_err(|_| AuthError::MalformedHeader)?;
        let (username, password) = decoded.split_once(':').ok_or(AuthError::MalformedHeader)?;

        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

/// Resolves raw credentials to a principal.
pub trait Authenticator: Send + Sync + fmt::Debug {
    fn authenticate(&self, username: &str, password: &str) -> Result<Arc<Principal>, AuthError>;
}

/// A configured user: stored password plus the principal it unlocks.
#[derive(Debug, Clone)]
pub struct StaticUser {
    pub password: String,
    pub hash: PasswordHash,
    pub principal: Arc<Principal>,
}

/// Authenticator over a fixed user table loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthenticator {
    users: HashMap<String, StaticUser>,
}

impl StaticAuthenticator {
    pub fn new(users: impl IntoIterator<Item = StaticUser>) -> Self {
        Self {
            users: users
                .into_iter()
                .map(|u| (u.principal.username().to_string(), u))
                .collect(),
        }
    }

    /// All principals known to this authenticator.
    pub fn principals(&self) -> impl Iterator<Item = &Arc<Principal>> {
        self.users.values().map(|u| &u.principal)
    }
}

impl Authenticator for StaticAuthenticator {
    fn authenticate(&self, username: &str, password: &str) -> Result<Arc<Principal>, AuthError> {
        let Some(user) = self.users.get(username) else {
            debug!(user = %username, "no such user");
            return Err(AuthError::InvalidCredentials);
        };

        if verify_password(password, &user.password, user.hash)? {
            Ok(Arc::clone(&user.principal))
        } else {
            debug!(user = %username, method = %user.hash, "password mismatch");
            Err(AuthError::InvalidCredentials)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{Permission, Scope};

    fn user(name: &str, password: &str, hash: PasswordHash) -> StaticUser {
        StaticUser {
            password: hash_password(password, hash).unwrap(),
            hash,
            principal: Arc::new(Principal::new(
                name,
                format!("/home/{name}"),
                vec![Scope::new("/", [Permission::Read])],
            )),
        }
    }

    #[test]
    fn test_parse_basic_header() {
        let header = format!("Basic {}", STANDARD.encode("alice:pa:ss"));
        let creds = BasicCredentials::from_header(&header).unwrap();
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password, "pa:ss");
        assert!(!format!("{creds:?}").contains("pa:ss"));
    }

    #[test]
    fn test_malformed_headers() {
        let no_colon = format!("Basic {}", STANDARD.encode("nocolon"));
        for header in ["", "Basic", "Bearer abc", "Basic !!!", no_colon.as_str()] {
            assert!(
                matches!(BasicCredentials::from_header(header), Err(AuthError::MalformedHeader)),
                "{header:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_plain_and_sha256() {
        let auth = StaticAuthenticator::new([
            user("plain", "secret", PasswordHash::Plain),
            user("hashed", "secret", PasswordHash::Sha256),
        ]);
        assert_eq!(auth.authenticate("plain", "secret").unwrap().username(), "plain");
        assert_eq!(auth.authenticate("hashed", "secret").unwrap().username(), "hashed");
        assert!(matches!(
            auth.authenticate("hashed", "wrong"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_sha256_digest_format() {
        assert_eq!(
            hash_password("flydav", PasswordHash::Sha256).unwrap(),
            hex::encode(Sha256::digest(b"flydav"))
        );
    }

    #[test]
    fn test_bcrypt() {
        let stored = bcrypt::hash("hunter22", 4).unwrap();
        let auth = StaticAuthenticator::new([StaticUser {
            password: stored,
            hash: PasswordHash::Bcrypt,
            principal: Arc::new(Principal::new("bob", "/", vec![])),
        }]);
        assert!(auth.authenticate("bob", "hunter22").is_ok());
        assert!(auth.authenticate("bob", "hunter2").is_err());
    }

    #[test]
    fn test_unknown_user() {
        let auth = StaticAuthenticator::new([user("alice", "x", PasswordHash::Plain)]);
        assert!(matches!(
            auth.authenticate("mallory", "x"),
            Err(AuthError::InvalidCredentials)
        ));
    }
}
