//! Test harness for flydav integration tests.
//!
//! Provides a `TestServer` that runs a real server on an ephemeral port
//! over a temporary directory, and per-user `Session`s with convenience
//! methods for each verb.
//!
//! Users:
//! - `admin` (plain password): root `/`, read+write on `/`
//! - `alice` (sha256 password): root `/home/alice`, read+write on `/docs`,
//!   read on `/public`, write on `/dropbox`
//! - `bob` (plain password): root `/home/bob`, read on `/`, read+write on
//!   `/shared`

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use flydav_storage::{LocalStorage, Storage};
use flydav_webdav::{
    Config, Dispatcher, PasswordHash, ServerConfig, UiMount, WebDavServer, hash_password,
};
use reqwest::{Client, Method, Response, StatusCode};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub const ADMIN_PASSWORD: &str = "admin-pass";
pub const ALICE_PASSWORD: &str = "alice-pass";
pub const BOB_PASSWORD: &str = "bob-pass";

fn test_config(prefix: &str) -> Config {
    let alice_hash = hash_password(ALICE_PASSWORD, PasswordHash::Sha256).unwrap();
    let toml = format!(
        r#"
        [server]
        prefix = "{prefix}"
        realm = "flydav-test"

        [[auth.users]]
        username = "admin"
        password = "{ADMIN_PASSWORD}"
        password_hash = "plain"
        root_dir = "/"
        [[auth.users.scopes]]
        path = "/"
        permissions = ["read", "write"]

        [[auth.users]]
        username = "alice"
        password = "{alice_hash}"
        password_hash = "sha256"
        root_dir = "/home/alice"
        [[auth.users.scopes]]
        path = "/docs"
        permissions = ["read", "write"]
        [[auth.users.scopes]]
        path = "/public"
        permissions = ["read"]
        [[auth.users.scopes]]
        path = "/dropbox"
        permissions = ["write"]

        [[auth.users]]
        username = "bob"
        password = "{BOB_PASSWORD}"
        password_hash = "plain"
        root_dir = "/home/bob"
        [[auth.users.scopes]]
        path = "/"
        permissions = ["read"]
        [[auth.users.scopes]]
        path = "/shared"
        permissions = ["read", "write"]
        "#
    );
    Config::from_toml(&toml).expect("test config must be valid")
}

/// A running server over a temporary storage root.
pub struct TestServer {
    server: WebDavServer,
    client: Client,
    data_dir: PathBuf,
    ui_dir: PathBuf,
    _temp_dir: TempDir,
}

impl TestServer {
    /// Start a server mounted at `/`.
    pub async fn start() -> Self {
        Self::with_prefix("/").await
    }

    /// Start a server mounted at `prefix`.
    pub async fn with_prefix(prefix: &str) -> Self {
        Self::with_config(prefix, |_| {}).await
    }

    /// Start a server mounted at `prefix` after adjusting the test config.
    ///
    /// When `[ui]` is enabled its source is a fresh directory, see
    /// [`TestServer::ui_path`].
    pub async fn with_config(prefix: &str, customize: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let storage = LocalStorage::new(temp_dir.path().join("data"))
            .await
            .expect("open storage");
        let data_dir = storage.base_dir().to_path_buf();

        let mut config = test_config(prefix);
        customize(&mut config);
        config.validate().expect("customized config must be valid");
        for user in &config.auth.users {
            storage
                .create_directory(&user.root_dir)
                .await
                .expect("create user root");
        }

        let ui_dir = temp_dir.path().join("ui");
        let mut dispatcher = Dispatcher::from_config(&config, Arc::new(storage));
        if config.ui.enabled {
            let ui = UiMount::open(&config.ui.path, &ui_dir)
                .await
                .expect("open ui dir");
            dispatcher = dispatcher.with_ui(ui);
        }

        let server = WebDavServer::start(dispatcher, ServerConfig::default())
            .await
            .expect("start server");

        Self {
            server,
            client: Client::new(),
            data_dir,
            ui_dir,
            _temp_dir: temp_dir,
        }
    }

    /// Base URL including the mount prefix.
    pub fn base_url(&self) -> String {
        self.server.url()
    }

    /// Absolute URL for a mount-relative path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url())
    }

    /// Where a storage key lives on disk.
    pub fn storage_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(key.trim_start_matches('/'))
    }

    /// Where a UI asset lives on disk.
    pub fn ui_path(&self, rel: &str) -> PathBuf {
        self.ui_dir.join(rel.trim_start_matches('/'))
    }

    /// Plain client without credentials, for requests outside a `Session`.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn session(&self, username: &str, password: &str) -> Session {
        Session {
            client: self.client.clone(),
            base_url: self.base_url(),
            username: username.to_string(),
            password: Some(password.to_string()),
        }
    }

    pub fn admin(&self) -> Session {
        self.session("admin", ADMIN_PASSWORD)
    }

    pub fn alice(&self) -> Session {
        self.session("alice", ALICE_PASSWORD)
    }

    pub fn bob(&self) -> Session {
        self.session("bob", BOB_PASSWORD)
    }

    /// A session that sends no credentials at all.
    pub fn anonymous(&self) -> Session {
        Session {
            client: self.client.clone(),
            base_url: self.base_url(),
            username: String::new(),
            password: None,
        }
    }

    /// Send a raw HTTP/1.1 request without any client-side URL normalization.
    ///
    /// Returns the status code and the raw response text.
    pub async fn raw_request(
        &self,
        method: &str,
        target: &str,
        credentials: Option<(&str, &str)>,
    ) -> (u16, String) {
        let mut stream = TcpStream::connect(self.server.addr)
            .await
            .expect("connect");

        let mut request = format!(
            "{method} {target} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n",
            self.server.addr
        );
        if let Some((user, pass)) = credentials {
            let token = STANDARD.encode(format!("{user}:{pass}"));
            request.push_str(&format!("Authorization: Basic {token}\r\n"));
        }
        request.push_str("\r\n");
        stream.write_all(request.as_bytes()).await.expect("write");

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.expect("read");
        let text = String::from_utf8_lossy(&response).into_owned();
        let status = text
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .expect("status line");
        (status, text)
    }
}

/// A client acting as one user.
#[derive(Clone)]
pub struct Session {
    client: Client,
    base_url: String,
    username: String,
    password: Option<String>,
}

fn method(name: &str) -> Method {
    Method::from_bytes(name.as_bytes()).expect("valid method")
}

impl Session {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn request(&self, verb: &str, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method(verb), self.url(path));
        match &self.password {
            Some(password) => builder.basic_auth(&self.username, Some(password)),
            None => builder,
        }
    }

    pub async fn get(&self, path: &str) -> Response {
        self.request("GET", path).send().await.expect("GET failed")
    }

    pub async fn get_html(&self, path: &str) -> Response {
        self.request("GET", path)
            .header("Accept", "text/html,application/xhtml+xml")
            .send()
            .await
            .expect("GET failed")
    }

    pub async fn get_range(&self, path: &str, range: &str) -> Response {
        self.request("GET", path)
            .header("Range", range)
            .send()
            .await
            .expect("GET failed")
    }

    pub async fn get_bytes(&self, path: &str) -> Vec<u8> {
        let resp = self.get(path).await;
        assert_eq!(resp.status(), StatusCode::OK, "GET {path} failed");
        resp.bytes().await.expect("read body").to_vec()
    }

    pub async fn head(&self, path: &str) -> Response {
        self.request("HEAD", path).send().await.expect("HEAD failed")
    }

    pub async fn put(&self, path: &str, content: impl Into<Vec<u8>>) -> Response {
        self.request("PUT", path)
            .body(content.into())
            .send()
            .await
            .expect("PUT failed")
    }

    pub async fn put_ok(&self, path: &str, content: impl Into<Vec<u8>>) {
        let resp = self.put(path, content).await;
        assert!(
            resp.status() == StatusCode::OK || resp.status() == StatusCode::NO_CONTENT,
            "PUT {path} failed with {}",
            resp.status()
        );
    }

    pub async fn delete(&self, path: &str) -> Response {
        self.request("DELETE", path).send().await.expect("DELETE failed")
    }

    pub async fn mkcol(&self, path: &str) -> Response {
        self.request("MKCOL", path).send().await.expect("MKCOL failed")
    }

    pub async fn mkcol_ok(&self, path: &str) {
        let resp = self.mkcol(path).await;
        assert_eq!(resp.status(), StatusCode::OK, "MKCOL {path} failed");
    }

    pub async fn copy(&self, from: &str, to: &str, overwrite: bool) -> Response {
        self.transfer("COPY", from, to, overwrite).await
    }

    pub async fn move_(&self, from: &str, to: &str, overwrite: bool) -> Response {
        self.transfer("MOVE", from, to, overwrite).await
    }

    async fn transfer(&self, verb: &str, from: &str, to: &str, overwrite: bool) -> Response {
        self.request(verb, from)
            .header("Destination", self.url(to))
            .header("Overwrite", if overwrite { "T" } else { "F" })
            .send()
            .await
            .unwrap_or_else(|e| panic!("{verb} failed: {e}"))
    }

    pub async fn options(&self, path: &str) -> Response {
        self.request("OPTIONS", path).send().await.expect("OPTIONS failed")
    }
}
