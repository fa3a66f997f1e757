//! Subcommands and the backend options they share.

pub mod serve;
pub mod tree;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Args as ClapArgs;
use restfs::{LocalDirApi, MemoryApi, RestApi, RestFileSystem, StagingStore};

/// Which object store to put behind the adapter.
#[derive(ClapArgs, Clone, Debug)]
pub struct BackendArgs {
    /// Directory served as the object store
    #[arg(
        long,
        value_name = "DIR",
        env = "RESTFS_ROOT",
        required_unless_present = "memory",
        conflicts_with = "memory"
    )]
    pub root: Option<PathBuf>,

    /// Use an empty in-memory object store instead of a directory
    #[arg(long)]
    pub memory: bool,
}

impl BackendArgs {
    /// Build the adapter over the selected store.
    pub fn filesystem(&self, staging: Arc<dyn StagingStore>) -> Result<RestFileSystem> {
        let api: Arc<dyn RestApi> = match &self.root {
            Some(root) => {
                if !root.exists() {
                    bail!("Root directory does not exist: {}", root.display());
                }
                if !root.is_dir() {
                    bail!("Root is not a directory: {}", root.display());
                }
                Arc::new(LocalDirApi::new(root))
            }
            None => Arc::new(MemoryApi::new()),
        };
        Ok(RestFileSystem::new(api, staging))
    }
}

/// Multi-threaded runtime for the async library calls.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}
