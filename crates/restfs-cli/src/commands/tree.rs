//! Tree command - print every object below a path.
//!
//! # Examples
//!
//! ```bash
//! # Everything in a served directory
//! restfs tree --root ./store
//!
//! # One subtree, with sizes
//! restfs tree --root ./store -l /photos
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use restfs::{EntryInfo, MemoryStaging, RestFileSystem};
use tracing::instrument;

use super::{BackendArgs, runtime};

#[derive(ClapArgs, Clone, Debug)]
pub struct Args {
    #[command(flatten)]
    pub backend: BackendArgs,

    /// Path to start from
    #[arg(default_value = "/")]
    pub path: String,

    /// Show sizes next to files
    #[arg(short, long)]
    pub long: bool,
}

#[instrument(level = "info", name = "cmd::tree", skip_all, fields(path = %args.path))]
pub fn execute(args: &Args) -> Result<()> {
    // Nothing is written, so staging never leaves memory
    let fs = args.backend.filesystem(Arc::new(MemoryStaging))?;
    let entries = runtime()?.block_on(collect(&fs, &args.path))?;

    for (name, info) in &entries {
        println!("{}", format_line(name, info, args.long));
    }
    Ok(())
}

async fn collect(fs: &RestFileSystem, path: &str) -> Result<Vec<(String, EntryInfo)>> {
    fs.walk(path)
        .await
        .with_context(|| format!("Failed to walk {path}"))
}

/// One output line: directories end in `/`, sizes are right-aligned.
pub(crate) fn format_line(name: &str, info: &EntryInfo, long: bool) -> String {
    let mut line = name.to_string();
    if info.is_dir && name != "/" {
        line.push('/');
    }
    if !long {
        return line;
    }
    let size = if info.is_dir {
        "-".to_string()
    } else {
        info.size.to_string()
    };
    format!("{size:>12}  {line}")
}
