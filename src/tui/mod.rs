//! Interactive terminal dashboard.
//!
//! The TUI renders the agent grid full-screen and drives every remote call
//! off the render thread. Logs go to a file under the data directory (the
//! terminal is busy); set `DH_LOG` to adjust verbosity.

mod app;
mod keymap;
mod palette;
mod views;

pub use app::{SharedService, run_tui};
pub use keymap::{Action, action_for};

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::agent_service::CloudClient;
use crate::store::Store;
use crate::{Error, Result};

/// Start the dashboard on the current terminal and block until quit.
pub fn run(store: Store, service: CloudClient) -> Result<()> {
    let _log_guard = init_logging()?;

    let runtime = tokio::runtime::Runtime::new()?;
    let service: SharedService = Arc::new(service);
    runtime.block_on(run_tui(store, service))
}

/// File logging under `<data dir>/logs`, daily rotation. The returned guard
/// flushes buffered lines on drop.
fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = crate::store::data_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let appender = tracing_appender::rolling::daily(&log_dir, "dh-tui.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_env("DH_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| Error::Other(format!("logging init failed: {e}")))?;

    Ok(guard)
}
