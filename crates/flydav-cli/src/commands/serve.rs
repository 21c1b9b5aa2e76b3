//! `flydav serve`

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use flydav_storage::{LocalStorage, Storage};
use flydav_webdav::{Config, Dispatcher, ServerConfig, UiMount, WebDavServer};
use tracing::{info, warn};

use crate::logging;

#[derive(ClapArgs)]
pub struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "FLYDAV_CONFIG", default_value = "flydav.toml")]
    pub config: PathBuf,

    /// Override [server] host
    #[arg(long)]
    pub host: Option<IpAddr>,

    /// Override [server] port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Override [storage] base_dir
    #[arg(long, value_name = "DIR")]
    pub base_dir: Option<PathBuf>,

    /// Override [server] prefix
    #[arg(long)]
    pub prefix: Option<String>,
}

impl Args {
    /// Apply command-line overrides and re-validate.
    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(host) = self.host {
            config.server.host = host.to_string();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(dir) = &self.base_dir {
            config.storage.base_dir.clone_from(dir);
        }
        if let Some(prefix) = &self.prefix {
            config.server.prefix.clone_from(prefix);
        }
        config.validate().context("Invalid configuration after overrides")?;
        Ok(())
    }
}

pub fn run(args: Args, verbose: u8, quiet: bool) -> Result<()> {
    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config file: {}", args.config.display()))?;
    args.apply(&mut config)?;

    let _guard = logging::setup_tracing(verbose, quiet, &config.log)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("flydav-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(serve(config))
}

async fn serve(config: Config) -> Result<()> {
    let storage = LocalStorage::new(&config.storage.base_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to open storage directory: {}",
                config.storage.base_dir.display()
            )
        })?;
    info!(base_dir = %storage.base_dir().display(), "Storage ready");

    // Every principal gets an existing root so the first listing succeeds
    for user in &config.auth.users {
        if let Err(e) = storage.create_directory(&user.root_dir).await {
            warn!(
                user = %user.username,
                root_dir = %user.root_dir,
                error = %e,
                "Could not create user root"
            );
        }
    }

    let mut dispatcher = Dispatcher::from_config(&config, Arc::new(storage));
    if config.ui.enabled {
        anyhow::ensure!(
            config.ui.source.is_dir(),
            "UI source directory does not exist: {}",
            config.ui.source.display()
        );
        let ui = UiMount::open(&config.ui.path, &config.ui.source)
            .await
            .context("Failed to open UI source directory")?;
        info!(path = %ui.prefix(), source = %config.ui.source.display(), "Serving static UI");
        dispatcher = dispatcher.with_ui(ui);
    }
    let server_config = ServerConfig::from_config(&config)?;
    let server = WebDavServer::start(dispatcher, server_config)
        .await
        .with_context(|| {
            format!(
                "Failed to bind {}:{}",
                config.server.host, config.server.port
            )
        })?;

    info!(url = %server.url(), users = config.auth.users.len(), "flydav is serving");
    eprintln!("Serving at {} (Ctrl-C to stop)", server.url());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutting down");
    server.stop().await;
    Ok(())
}
