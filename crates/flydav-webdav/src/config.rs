//! Configuration file support.
//!
//! # Example configuration
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 7086
//! prefix = "/dav"
//! max_body_size = 268435456
//!
//! [cors]
//! enabled = true
//! allowed_origins = ["https://files.example.com"]
//!
//! [ui]
//! enabled = true
//! path = "/ui"
//! source = "/usr/share/flydav/ui"
//!
//! [storage]
//! base_dir = "/srv/flydav"
//!
//! [[auth.users]]
//! username = "alice"
//! password = "$2b$12$..."
//! password_hash = "bcrypt"
//! root_dir = "/home/alice"
//!
//! [[auth.users.scopes]]
//! path = "/docs"
//! permissions = ["read", "write"]
//! ```

use crate::access::{Authorizer, Permission, Principal, Scope};
use crate::cors::CorsPolicy;
use crate::credentials::{PasswordHash, StaticAuthenticator, StaticUser};
use crate::dispatcher::ALLOWED_METHODS;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 7086;

/// Default cap on PUT bodies (256 MiB).
pub const DEFAULT_MAX_BODY_SIZE: u64 = 256 * 1024 * 1024;

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub log: LogSection,

    #[serde(default)]
    pub auth: AuthSection,

    #[serde(default)]
    pub cors: CorsSection,

    #[serde(default)]
    pub ui: UiSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    /// Mount prefix stripped from request paths.
    pub prefix: String,
    /// Realm sent in `WWW-Authenticate`.
    pub realm: String,
    /// Largest accepted PUT body in bytes; larger uploads get 413.
    pub max_body_size: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            prefix: "/".to_string(),
            realm: "flydav".to_string(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    pub base_dir: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    /// Filter directive used when neither `RUST_LOG` nor `-v` is given.
    pub level: String,
    pub format: LogFormat,
    /// Optional log file; stderr when unset.
    pub file: Option<PathBuf>,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            file: None,
        }
    }
}

/// `[cors]`: headers for browser clients on other origins.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsSection {
    pub enabled: bool,
    /// Allowed origins; `"*"` allows any.
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub allow_credentials: bool,
    /// Preflight cache lifetime in seconds; 0 omits `Access-Control-Max-Age`.
    pub max_age: u64,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

impl Default for CorsSection {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_origins: strings(&["*"]),
            allowed_methods: ALLOWED_METHODS.split(", ").map(str::to_string).collect(),
            allowed_headers: strings(&[
                "Authorization",
                "Content-Type",
                "Depth",
                "Destination",
                "Overwrite",
                "Range",
            ]),
            exposed_headers: strings(&[
                "Accept-Ranges",
                "Content-Disposition",
                "Content-Length",
                "Content-Range",
            ]),
            allow_credentials: false,
            max_age: 600,
        }
    }
}

/// `[ui]`: static front end served next to the WebDAV mount.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UiSection {
    pub enabled: bool,
    /// URL prefix of the assets.
    pub path: String,
    /// Directory holding the assets.
    pub source: PathBuf,
}

impl Default for UiSection {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "/ui".to_string(),
            source: PathBuf::from("ui"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthSection {
    pub users: Vec<UserConfig>,
}

/// One `[[auth.users]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub password_hash: PasswordHash,
    #[serde(default = "default_root_dir")]
    pub root_dir: String,
    #[serde(default)]
    pub scopes: Vec<ScopeConfig>,
}

fn default_root_dir() -> String {
    "/".to_string()
}

/// One `[[auth.users.scopes]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScopeConfig {
    pub path: String,
    pub permissions: Vec<Permission>,
}

/// Canonical form of a configured path.
///
/// The path must be absolute and free of `..` and NUL; `.` segments,
/// repeated and trailing separators are removed so the result compares
/// equal to cleaned request paths.
fn canonical(what: &str, path: &str) -> Result<String, ConfigError> {
    if !path.starts_with('/') || path.split('/').any(|seg| seg == "..") || path.contains('\0') {
        return Err(ConfigError::Invalid(format!(
            "{what} must be an absolute path without '..': {path:?}"
        )));
    }
    Ok(paths::clean(path))
}

impl Config {
    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration and rewrite every path to canonical form.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.server.prefix = canonical("server.prefix", &self.server.prefix)?;
        if self.server.max_body_size == 0 {
            return Err(ConfigError::Invalid(
                "server.max_body_size must be greater than zero".to_string(),
            ));
        }
        if self.cors.enabled {
            CorsPolicy::new(&self.cors)?;
        }
        if self.ui.enabled {
            self.ui.path = canonical("ui.path", &self.ui.path)?;
            if self.ui.path == "/" {
                return Err(ConfigError::Invalid(
                    "ui.path cannot be the root; it would shadow every WebDAV path".to_string(),
                ));
            }
        }

        if self.auth.users.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one [[auth.users]] entry is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for user in &mut self.auth.users {
            if user.username.is_empty() || user.username.contains(':') {
                return Err(ConfigError::Invalid(format!(
                    "invalid username {:?}",
                    user.username
                )));
            }
            if !seen.insert(user.username.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate user {:?}",
                    user.username
                )));
            }
            if user.password.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "user {:?} has an empty password",
                    user.username
                )));
            }
            let what = format!("user {:?}: root_dir", user.username);
            user.root_dir = canonical(&what, &user.root_dir)?;
            for scope in &mut user.scopes {
                let what = format!("user {:?}: scope path", user.username);
                scope.path = canonical(&what, &scope.path)?;
            }
        }
        Ok(())
    }

    /// Principals described by the `[[auth.users]]` entries.
    pub fn principals(&self) -> Vec<Arc<Principal>> {
        self.auth
            .users
            .iter()
            .map(|u| Arc::new(principal_from(u)))
            .collect()
    }

    /// Authenticator over the configured users.
    pub fn authenticator(&self) -> StaticAuthenticator {
        StaticAuthenticator::new(self.auth.users.iter().map(|u| StaticUser {
            password: u.password.clone(),
            hash: u.password_hash,
            principal: Arc::new(principal_from(u)),
        }))
    }

    /// Authorizer over the configured users.
    pub fn authorizer(&self) -> Authorizer {
        Authorizer::new(self.principals())
    }

    /// CORS policy, when `[cors]` is enabled.
    pub fn cors_policy(&self) -> Option<CorsPolicy> {
        if !self.cors.enabled {
            return None;
        }
        match CorsPolicy::new(&self.cors) {
            Ok(policy) => Some(policy),
            Err(e) => {
                warn!(error = %e, "CORS disabled");
                None
            }
        }
    }
}

fn principal_from(user: &UserConfig) -> Principal {
    let scopes = user
        .scopes
        .iter()
        .map(|s| Scope::new(s.path.clone(), s.permissions.iter().copied()))
        .collect();
    Principal::new(user.username.clone(), user.root_dir.clone(), scopes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Authenticator;

    const SAMPLE: &str = r#"
        [server]
        port = 8080
        prefix = "/dav"

        [storage]
        base_dir = "/tmp/flydav"

        [[auth.users]]
        username = "alice"
        password = "secret"
        password_hash = "plain"
        root_dir = "/home/alice"

        [[auth.users.scopes]]
        path = "/docs"
        permissions = ["read", "write"]

        [[auth.users.scopes]]
        path = "/public"
        permissions = ["read"]
    "#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.prefix, "/dav");
        assert_eq!(config.log.format, LogFormat::Text);

        let principals = config.principals();
        assert_eq!(principals.len(), 1);
        assert_eq!(principals[0].root_dir(), "/home/alice");
        assert_eq!(principals[0].scopes().len(), 2);
    }

    #[test]
    fn test_authenticator_and_authorizer_from_config() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let principal = config.authenticator().authenticate("alice", "secret").unwrap();
        let authz = config.authorizer();
        assert!(authz.authorize(&principal, "/docs/a.txt", Permission::Write));
        assert!(!authz.authorize(&principal, "/public/a.txt", Permission::Write));
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml(
            r#"
            [[auth.users]]
            username = "bob"
            password = "$2b$04$abcdefghijklmnopqrstuv"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.auth.users[0].password_hash, PasswordHash::Bcrypt);
        assert_eq!(config.auth.users[0].root_dir, "/");
    }

    #[test]
    fn test_rejects_invalid() {
        let no_users = "[server]\nport = 1\n";
        assert!(matches!(Config::from_toml(no_users), Err(ConfigError::Invalid(_))));

        let dup = r#"
            [[auth.users]]
            username = "a"
            password = "x"
            [[auth.users]]
            username = "a"
            password = "y"
        "#;
        assert!(matches!(Config::from_toml(dup), Err(ConfigError::Invalid(_))));

        let escape = r#"
            [[auth.users]]
            username = "a"
            password = "x"
            root_dir = "/home/../etc"
        "#;
        assert!(matches!(Config::from_toml(escape), Err(ConfigError::Invalid(_))));

        let relative_scope = r#"
            [[auth.users]]
            username = "a"
            password = "x"
            [[auth.users.scopes]]
            path = "docs"
            permissions = ["read"]
        "#;
        assert!(matches!(Config::from_toml(relative_scope), Err(ConfigError::Invalid(_))));

        assert!(matches!(Config::from_toml("[server"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_paths_are_canonicalized() {
        let config = Config::from_toml(
            r#"
            [server]
            prefix = "/dav//"

            [[auth.users]]
            username = "alice"
            password = "secret"
            password_hash = "plain"
            root_dir = "/home//alice/."

            [[auth.users.scopes]]
            path = "/docs/."
            permissions = ["read"]

            [[auth.users.scopes]]
            path = "/shared//team/"
            permissions = ["read", "write"]
            "#,
        )
        .unwrap();
        assert_eq!(config.server.prefix, "/dav");
        let user = &config.auth.users[0];
        assert_eq!(user.root_dir, "/home/alice");
        assert_eq!(user.scopes[0].path, "/docs");
        assert_eq!(user.scopes[1].path, "/shared/team");

        let principal = config.authenticator().authenticate("alice", "secret").unwrap();
        let authz = config.authorizer();
        assert!(authz.authorize(&principal, "/docs/a.txt", Permission::Read));
        assert!(authz.authorize(&principal, "/shared/team/b.txt", Permission::Write));
    }

    #[test]
    fn test_body_limit_and_optional_sections() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.server.max_body_size, DEFAULT_MAX_BODY_SIZE);
        assert!(!config.cors.enabled);
        assert!(config.cors_policy().is_none());
        assert!(!config.ui.enabled);

        let config = Config::from_toml(&format!(
            "{SAMPLE}\n[cors]\nenabled = true\nallowed_origins = [\"https://a.example\"]\n\
             [ui]\nenabled = true\npath = \"/app/\"\nsource = \"/srv/ui\"\n"
        ))
        .unwrap();
        assert!(config.cors_policy().is_some());
        assert_eq!(config.ui.path, "/app");

        let zero = SAMPLE.replace("port = 8080", "port = 8080\nmax_body_size = 0");
        assert!(matches!(Config::from_toml(&zero), Err(ConfigError::Invalid(_))));

        let root_ui = format!("{SAMPLE}\n[ui]\nenabled = true\npath = \"/\"\n");
        assert!(matches!(Config::from_toml(&root_ui), Err(ConfigError::Invalid(_))));

        let no_origins = format!("{SAMPLE}\n[cors]\nenabled = true\nallowed_origins = []\n");
        assert!(matches!(Config::from_toml(&no_origins), Err(ConfigError::Invalid(_))));
    }
}
