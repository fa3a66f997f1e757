//! Serve command - expose an object store over WebDAV until interrupted.
//!
//! # Examples
//!
//! ```bash
//! # Serve a directory on the default port
//! restfs serve --root ./store
//!
//! # In-memory store, any free port, served at /
//! restfs serve --memory --port 0 --prefix /
//! ```

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use restfs::{DEFAULT_PREFIX, RestFileSystem, ServerConfig, TempDirStaging, WebDavServer};
use tracing::{info, instrument};

use super::{BackendArgs, runtime};

/// Port the server listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 5555;

#[derive(ClapArgs, Clone, Debug)]
pub struct Args {
    #[command(flatten)]
    pub backend: BackendArgs,

    /// Port to listen on (0 picks a free port)
    #[arg(short, long, env = "RESTFS_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind
    #[arg(long, env = "RESTFS_BIND", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub bind: IpAddr,

    /// URL path the filesystem is served under
    #[arg(long, env = "RESTFS_PREFIX", default_value = DEFAULT_PREFIX)]
    pub prefix: String,

    /// Directory for local staging files [default: <system temp>/restfs]
    #[arg(long, value_name = "DIR", env = "RESTFS_STAGING_DIR")]
    pub staging_dir: Option<PathBuf>,

    /// Do not render HTML indexes for browser GETs on directories
    #[arg(long)]
    pub no_autoindex: bool,

    /// Log every object in the store before serving
    #[arg(long)]
    pub list: bool,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig::default()
            .with_port(self.port)
            .with_bind_address(self.bind)
            .with_prefix(&self.prefix)
            .with_autoindex(!self.no_autoindex)
    }

    fn staging(&self) -> TempDirStaging {
        match &self.staging_dir {
            Some(dir) => TempDirStaging::new(dir),
            None => TempDirStaging::system(),
        }
    }
}

#[instrument(level = "info", name = "cmd::serve", skip_all, fields(port = args.port))]
pub fn execute(args: &Args) -> Result<()> {
    let staging = args.staging();
    info!(dir = %staging.dir().display(), "Staging directory");
    let fs = args.backend.filesystem(Arc::new(staging))?;

    runtime()?.block_on(serve(fs, args))
}

async fn serve(fs: RestFileSystem, args: &Args) -> Result<()> {
    if args.list {
        let entries = fs.walk("/").await.context("Failed to list the store")?;
        info!(count = entries.len(), "Store contents");
        for (name, _) in &entries {
            info!("{name}");
        }
    }

    let server = WebDavServer::start(fs, args.server_config())
        .await
        .with_context(|| format!("Failed to start server on {}:{}", args.bind, args.port))?;

    println!("Serving WebDAV at {}/", server.url());
    println!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    info!("Shutting down");
    server.stop().await;
    Ok(())
}
