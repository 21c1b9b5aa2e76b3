//! Path-scoped authorization.
//!
//! A [`Principal`] carries a set of [`Scope`]s, each granting a set of
//! [`Permission`]s on a path prefix. A request is allowed iff at least one
//! scope both matches the path and includes the requested permission. There
//! are no deny rules and no precedence between overlapping scopes; Read and
//! Write are independent bits.
//!
//! Paths handed to the engine must already be canonical (absolute, no `.`
//! or `..` segments). The dispatcher cleans request paths before asking; a
//! path that is not canonical is denied rather than interpreted.

use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// A single capability bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Read => f.write_str("read"),
            Permission::Write => f.write_str("write"),
        }
    }
}

/// Returns true if `path` is `prefix` itself or lies below it.
///
/// The prefix must be followed by a separator in `path`: `/foo` matches
/// `/foo` and `/foo/bar` but never `/foobar`. The root prefix `/` matches
/// every absolute path.
pub fn scope_matches(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return path.starts_with('/');
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Returns true if `path` is absolute and free of empty, `.` and `..` segments.
fn is_canonical(path: &str) -> bool {
    if path == "/" {
        return true;
    }
    path.strip_prefix('/')
        .is_some_and(|rest| rest.split('/').all(|seg| !matches!(seg, "" | "." | "..")))
}

/// A path-prefix grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    prefix: String,
    permissions: Vec<Permission>,
}

impl Scope {
    /// Create a scope. The prefix is lexically cleaned, so `/docs/.` and
    /// `/docs//` both become `/docs`.
    pub fn new(
        prefix: impl Into<String>,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Self {
        let prefix = paths::clean(&prefix.into());

        let mut perms: Vec<Permission> = Vec::new();
        for p in permissions {
            if !perms.contains(&p) {
                perms.push(p);
            }
        }
        Self {
            prefix,
            permissions: perms,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    /// Whether this scope covers `path`.
    pub fn matches(&self, path: &str) -> bool {
        scope_matches(&self.prefix, path)
    }

    /// Whether this scope grants `permission` on `path`.
    pub fn grants(&self, path: &str, permission: Permission) -> bool {
        self.permissions.contains(&permission) && self.matches(path)
    }
}

/// An authenticated identity.
///
/// Built once from configuration and shared read-only across requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    username: String,
    root_dir: String,
    scopes: Vec<Scope>,
}

impl Principal {
    pub fn new(
        username: impl Into<String>,
        root_dir: impl Into<String>,
        scopes: Vec<Scope>,
    ) -> Self {
        Self {
            username: username.into(),
            root_dir: root_dir.into(),
            scopes,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Storage prefix under which all of this principal's paths live.
    pub fn root_dir(&self) -> &str {
        &self.root_dir
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }
}

/// Decides allow/deny for (principal, path, permission) triples.
#[derive(Debug, Clone, Default)]
pub struct Authorizer {
    principals: HashMap<String, Arc<Principal>>,
}

impl Authorizer {
    /// Build an authorizer over a fixed principal table.
    pub fn new(principals: impl IntoIterator<Item = Arc<Principal>>) -> Self {
        Self {
            principals: principals
                .into_iter()
                .map(|p| (p.username().to_string(), p))
                .collect(),
        }
    }

    /// Look up a principal by name.
    pub fn principal(&self, username: &str) -> Option<&Arc<Principal>> {
        self.principals.get(username)
    }

    /// Decide whether `principal` may exercise `permission` on `path`.
    pub fn authorize(&self, principal: &Principal, path: &str, permission: Permission) -> bool {
        let allowed = is_canonical(path)
            && principal
                .scopes
                .iter()
                .any(|scope| scope.grants(path, permission));

        info!(
            target: "flydav::audit",
            user = %principal.username,
            path = %path,
            permission = %permission,
            allowed,
            "authorization decision"
        );
        allowed
    }

    /// Like [`authorize`](Self::authorize), by username. Unknown users are denied.
    pub fn authorize_user(&self, username: &str, path: &str, permission: Permission) -> bool {
        match self.principals.get(username) {
            Some(principal) => self.authorize(principal, path, permission),
            None => {
                info!(
                    target: "flydav::audit",
                    user = %username,
                    path = %path,
                    permission = %permission,
                    allowed = false,
                    "authorization decision for unknown user"
                );
                false
            }
        }
    }
}
