//! `verge serve` - boot the runtime facade from a config file and block
//! until interrupted.

use crate::exit_error::ExitError;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use verge_runtime::{Runtime, RuntimeConfig};

#[derive(Args)]
pub struct ServeArgs {
    /// Path to a YAML or JSON runtime config file. Defaults built in if omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Open the log store rooted at the config's `log.dir`.
    #[arg(long)]
    pub with_log: bool,
}

pub async fn run(args: ServeArgs) -> Result<(), ExitError> {
    let config = match &args.config {
        Some(path) => {
            RuntimeConfig::load_file(path).map_err(|e| ExitError::new(1, format!("loading config: {e}")))?
        }
        None => RuntimeConfig::default(),
    };

    let runtime: Arc<Runtime> = if args.with_log {
        Runtime::bootstrap_with_log(&config, None)
            .await
            .map_err(|e| ExitError::new(1, format!("booting runtime: {e}")))?
    } else {
        Runtime::bootstrap(&config)
    };

    tracing::info!("runtime started, waiting for ctrl-c");
    tokio::signal::ctrl_c().await.map_err(|e| ExitError::new(1, format!("waiting for signal: {e}")))?;
    tracing::info!("shutting down");
    runtime.close().await;
    Ok(())
}
