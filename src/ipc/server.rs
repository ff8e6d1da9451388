//! Unix domain socket server for IPC
//!
//! Each webhook forwarded by the front end arrives as one framed request and
//! gets exactly one framed response. Connections are served concurrently.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::flow::{AttemptContext, CallFlow, CompletionReport, Instruction};

use super::protocol::{DaemonStats, Request, Response, SUMMARY_RECEIVED};

/// Largest accepted frame body
const MAX_FRAME_LEN: usize = 1024 * 1024;

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    flow: Arc<CallFlow>,
    start_time: Instant,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Create a new IPC server
    pub fn new(socket_path: &Path, flow: Arc<CallFlow>) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path)
                .context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path)
            .context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            flow,
            start_time: Instant::now(),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref()
            .context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let flow = Arc::clone(&self.flow);
                    let start_time = self.start_time;
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, flow, start_time) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(
        mut stream: UnixStream,
        flow: Arc<CallFlow>,
        start_time: Instant,
    ) -> Result<()> {
        let mut len_buf = [0u8; 4];

        loop {
            // Read message length (4-byte little-endian)
            match stream.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("client disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_FRAME_LEN {
                warn!(len, "message too large, disconnecting");
                return Ok(());
            }

            // Read message body
            let mut msg_buf = vec![0u8; len];
            stream.read_exact(&mut msg_buf).await?;

            let response = match serde_json::from_slice::<Request>(&msg_buf) {
                Ok(request) => {
                    debug!(?request, "received request");
                    Self::process_request(request, &flow, start_time).await
                }
                Err(e) => {
                    warn!(?e, "failed to parse request");
                    Response::error("bad_request", e.to_string())
                }
            };

            Self::send_message(&mut stream, &response).await?;
        }
    }

    /// Send a length-prefixed JSON message
    async fn send_message<T: serde::Serialize>(stream: &mut UnixStream, msg: &T) -> Result<()> {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        stream.write_all(&msg_len).await?;
        stream.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Process a request and return a response
    async fn process_request(request: Request, flow: &CallFlow, start_time: Instant) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::CallStarted => {
                let instructions = flow.start_call().await;
                info!(count = instructions.len(), "call started");
                Response::Instructions { instructions }
            }

            Request::ProcessInput { attempt, digits } => {
                let context = AttemptContext::from_query(attempt.as_deref());
                let instructions = flow.process_input(context, digits.as_deref()).await;
                info!(
                    attempt = context.attempt,
                    answered = digits.as_deref().is_some_and(|d| !d.is_empty()),
                    ends_call = instructions.iter().any(Instruction::is_hang_up),
                    "input processed"
                );
                Response::Instructions { instructions }
            }

            Request::CallStatus {
                call_duration,
                call_sid,
                call_status,
            } => {
                let report = CompletionReport {
                    call_duration,
                    call_sid,
                    call_status,
                };
                match flow.complete_call(report).await {
                    Ok(_) => Response::Ack {
                        message: SUMMARY_RECEIVED.to_string(),
                    },
                    Err(e) => {
                        warn!(%e, "rejected call status callback");
                        Response::error("validation_error", e.to_string())
                    }
                }
            }

            Request::GetStats => Response::Stats(DaemonStats {
                uptime_secs: start_time.elapsed().as_secs(),
                call: flow.snapshot().await,
                ..DaemonStats::default()
            }),
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}
