//! OOBFS FUSE mount daemon.
//!
//! Mounts the out-of-band router over a null backend: every in-band call
//! answers `ENOSYS` until a real backing filesystem is wired in, while
//! registered out-of-band contexts get the full shadow-namespace service.

use clap::Parser;
use oobfs_core::{AuditLog, NullFilesystem, OobRegistry};
use oobfs_fuse::config::HostConfig;
use oobfs_fuse::mount::parse_mount_options;
use oobfs_fuse::session::FuseSession;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "oob-fuse", about = "OOBFS shadow-namespace FUSE daemon")]
struct Args {
    /// Mount point for the filesystem
    mountpoint: PathBuf,

    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Context id to classify as out-of-band (repeatable)
    #[arg(long = "oob-pid")]
    oob_pids: Vec<u32>,

    /// Allow other users to access the filesystem
    #[arg(long)]
    allow_other: bool,

    /// Allow root to access the filesystem
    #[arg(long)]
    allow_root: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => HostConfig::load(path)?,
        None => HostConfig::default(),
    };

    let mut options = parse_mount_options(&config.mount_options)?;
    if args.allow_other {
        options.allow_other = true;
    }
    if args.allow_root {
        options.allow_root = true;
    }

    let registry = Arc::new(OobRegistry::new());
    for id in config
        .out_of_band_contexts
        .iter()
        .copied()
        .chain(args.oob_pids.iter().copied())
    {
        registry.register(id);
    }
    tracing::info!(
        "starting oob-fuse at {} with {} out-of-band context(s)",
        args.mountpoint.display(),
        registry.len()
    );

    let audit = if config.audit_stderr {
        AuditLog::stderr()
    } else {
        AuditLog::with_sink(Box::new(std::io::sink()))
    };

    let mut session = FuseSession::mount(
        NullFilesystem,
        registry,
        audit,
        &args.mountpoint,
        &options,
    )?;
    let mut killswitch = session.killswitch();

    let mut worker = tokio::task::spawn_blocking(move || session.run());
    tokio::select! {
        result = &mut worker => {
            result??;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
            killswitch.kill();
            worker.await??;
        }
    }
    tracing::info!("unmounted");
    Ok(())
}
