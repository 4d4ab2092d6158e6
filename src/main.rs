use std::panic;
use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::config::JobConfig;
use crate::debug::DebugConfig;
use crate::job::JobEngine;
use crate::job::monitor::LoggingMonitor;
use crate::runner::local::LocalRunner;

mod config;
mod debug;
mod domain;
mod job;
mod runner;


#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    set_panic_hook();

    // argument parsing lives in the CLI layer; this binary consumes the
    // already-resolved test command lines
    let config = JobConfig {
        tests: std::env::args().skip(1).collect(),
        ..JobConfig::default()
    };
    let debug = match DebugConfig::builder().build() {
        Ok(debug) => debug,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(domain::EXIT_VALIDATION);
        }
    };

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping the job");
            let _ = cancel_tx.send(true);
        }
    });

    let runner = LocalRunner::new().with_cancel(cancel_rx.clone());
    let engine = JobEngine::new(config, debug, Arc::new(runner), Arc::new(LoggingMonitor))
        .with_cancel(cancel_rx);

    match engine.run().await {
        Ok(job) => std::process::exit(job.exit_code),
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(e.exit_code());
        }
    }
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
