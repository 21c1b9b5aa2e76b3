//! Scope-authorized file server speaking a WebDAV subset over HTTP.
//!
//! # How It Works
//!
//! 1. A request arrives and is authenticated with HTTP Basic credentials
//! 2. The URI path is decoded, stripped of the mount prefix and cleaned
//! 3. The principal's scopes decide whether Read or Write is granted
//! 4. The request is served from, or applied to, a [`flydav_storage::Storage`]
//!
//! Each principal sees its own tree: paths in requests and listings are
//! relative to the principal, and storage keys are the principal's
//! `root_dir` joined with that path.
//!
//! # Example
//!
//! ```ignore
//! use flydav_webdav::{Config, Dispatcher, ServerConfig, WebDavServer};
//! use flydav_storage::LocalStorage;
//!
//! let config = Config::load(Path::new("flydav.toml"))?;
//! let storage = Arc::new(LocalStorage::new(&config.storage.base_dir).await?);
//! let dispatcher = Dispatcher::from_config(&config, storage);
//! let server = WebDavServer::start(dispatcher, ServerConfig::from_config(&config)?).await?;
//! println!("Serving at {}", server.url());
//! ```
//!
//! # Security
//!
//! Every request needs authentication except `OPTIONS` and reads under the
//! optional static UI mount. Paths are cleaned before authorization, so
//! `..` can never reach outside the principal's root. `COPY` and `MOVE`
//! need Write on both source and destination.

mod access;
mod body;
mod config;
mod cors;
mod credentials;
mod dispatcher;
mod error;
mod listing;
mod paths;
mod range;
mod server;
mod ui;

pub use access::{Authorizer, Permission, Principal, Scope, scope_matches};
pub use body::{CHUNK_SIZE, DavBody};
pub use config::{
    AuthSection, Config, ConfigError, CorsSection, DEFAULT_MAX_BODY_SIZE, DEFAULT_PORT, LogFormat,
    LogSection, ScopeConfig, ServerSection, StorageSection, UiSection, UserConfig,
};
pub use cors::CorsPolicy;
pub use credentials::{
    AuthError, Authenticator, BasicCredentials, PasswordHash, StaticAuthenticator, StaticUser,
    hash_password,
};
pub use dispatcher::{ALLOWED_METHODS, Dispatcher};
pub use error::{DavError, DavResult};
pub use listing::{ListingEntry, format_size};
pub use paths::clean as clean_path;
pub use range::{ByteRange, RangeError, parse_range};
pub use server::{ServerConfig, WebDavServer};
pub use ui::UiMount;
