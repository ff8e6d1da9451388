//! ivr-callflow-daemon: call-flow engine behind an IVR webhook front end
//!
//! The telephony provider calls the front end once per call step; the front
//! end forwards each webhook here over a Unix socket and renders the returned
//! voice instructions into provider markup.
//!
//! This daemon provides:
//! - An explicit prompt/retry state machine (greet, re-prompt, hang up)
//! - Process-wide silence counters, summarized and reset on call completion
//! - IPC server for the webhook front end
//!
//! Out of scope here: HTTP, TLS, markup serialization.

mod config;
mod events;
mod flow;
mod ipc;
mod lifecycle;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::events::CallEvent;
use crate::flow::CallFlow;
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "ivr-callflow-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        ?config.socket_path,
        base_url = %config.flow.base_url,
        max_attempts = config.flow.max_attempts,
        "configuration loaded"
    );

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    // Call flow -> event logger
    let (event_tx, mut event_rx) = broadcast::channel::<CallEvent>(64);

    let flow = Arc::new(CallFlow::new(config.flow.clone(), event_tx));
    let server = Server::new(&config.socket_path, flow)?;

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Log call-flow progress
        _ = async {
            loop {
                match event_rx.recv().await {
                    Ok(event) => {
                        info!(%event, "call event");
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "call event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("call event logger exited");
        }

        // Wait for shutdown signal
        result = shutdown.wait() => {
            match result {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => error!(?e, "failed to install signal handlers"),
            }
        }
    }

    // Cleanup
    info!("shutting down...");

    server.shutdown().await;

    info!("ivr-callflow-daemon stopped");

    Ok(())
}
