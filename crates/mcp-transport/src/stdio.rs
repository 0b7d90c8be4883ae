//! Child-process stdio transport: newline-delimited JSON over the child's
//! stdin/stdout, with a rolling stderr tail surfaced on abnormal exit.

use crate::config::StdioTransportConfig;
use crate::error::{TransportError, TransportResult};
use crate::transport::{ConnectedTransport, Transport, TransportCapabilities, TransportKind};
use async_trait::async_trait;
use mcp_protocol::jsonrpc::JsonRpcMessage;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, warn};

const STDERR_TAIL_LINES: usize = 10;

pub type StderrLineCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Sent to the task supervising the child process to request a graceful
/// shutdown; the reply carries the outcome of that shutdown so `disconnect`
/// can propagate it.
type ShutdownRequest = oneshot::Sender<TransportResult<()>>;

pub struct StdioTransport {
    config: StdioTransportConfig,
    shutdown_tx: Option<mpsc::Sender<ShutdownRequest>>,
    exited: Arc<AtomicBool>,
    connected: bool,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    on_stderr_line: Option<StderrLineCallback>,
}

impl StdioTransport {
    pub fn new(config: StdioTransportConfig) -> Self {
        Self {
            config,
            shutdown_tx: None,
            exited: Arc::new(AtomicBool::new(false)),
            connected: false,
            stderr_tail: Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES))),
            on_stderr_line: None,
        }
    }

    pub fn on_stderr_line(mut self, callback: StderrLineCallback) -> Self {
        self.on_stderr_line = Some(callback);
        self
    }

    fn build_command(&self) -> Command {
        // On Windows, commands resolved through PATH shims (npx.cmd and
        // friends) don't execute directly; route them through cmd.exe the
        // way a shell would.
        if cfg!(windows) && self.config.command.to_lowercase() != "cmd.exe" {
            let mut cmd = Command::new("cmd.exe");
            cmd.arg("/c").arg(&self.config.command).args(&self.config.args);
            cmd
        } else {
            let mut cmd = Command::new(&self.config.command);
            cmd.args(&self.config.args);
            cmd
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    fn capabilities(&self) -> TransportCapabilities {
        TransportCapabilities {
            streaming: false,
            bidirectional: true,
            server_initiated_messages: true,
            persistent: true,
        }
    }

    async fn connect(&mut self) -> TransportResult<ConnectedTransport> {
        let mut command = self.build_command();
        command
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        if let Some(dir) = &self.config.working_directory {
            command.current_dir(dir);
        }
        for (key, value) in &self.config.environment {
            match value {
                Some(v) => {
                    command.env(key, v);
                }
                None => {
                    command.env_remove(key);
                }
            }
        }

        let mut child = command
            .spawn()
            .map_err(|e| TransportError::ConnectionFailed(format!("failed to spawn '{}': {e}", self.config.command)))?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<JsonRpcMessage>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<JsonRpcMessage>();

        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(message) = outbound_rx.recv().await {
                let mut line = match serde_json::to_vec(&message) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        error!("failed to serialize outbound message: {e}");
                        continue;
                    }
                };
                line.push(b'\n');
                if let Err(e) = stdin.write_all(&line).await {
                    warn!("stdio write failed, child likely exited: {e}");
                    break;
                }
            }
        });

        let stderr_tail = Arc::clone(&self.stderr_tail);
        let on_stderr_line = self.on_stderr_line.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(cb) = &on_stderr_line {
                    cb(line.clone());
                }
                let mut tail = stderr_tail.lock().await;
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match JsonRpcMessage::from_slice(line.as_bytes()) {
                            Ok(message) => {
                                if inbound_tx.send(message).is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!("dropping malformed stdio frame: {e}");
                            }
                        }
                    }
                    Ok(None) => {
                        debug!("child stdout closed");
                        break;
                    }
                    Err(e) => {
                        error!("stdio read error: {e}");
                        break;
                    }
                }
            }
        });

        let (error_tx, error_rx) = mpsc::unbounded_channel::<TransportError>();
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<ShutdownRequest>(1);
        let shutdown_timeout = self.config.shutdown_timeout;
        let supervisor_stderr_tail = Arc::clone(&self.stderr_tail);
        let exited = Arc::clone(&self.exited);

        // Owns the child for its whole lifetime: either it exits on its own
        // (reported as `ProcessExited` on `error_tx`, unless a shutdown is
        // already in flight) or `disconnect` asks this task to tear it down.
        tokio::spawn(async move {
            let mut child = child;
            tokio::select! {
                status = child.wait() => {
                    exited.store(true, Ordering::SeqCst);
                    let code = status.ok().and_then(|s| s.code());
                    let stderr_tail = supervisor_stderr_tail.lock().await.iter().cloned().collect::<Vec<_>>().join("\n");
                    let _ = error_tx.send(TransportError::ProcessExited { code, stderr_tail });
                }
                Some(reply) = shutdown_rx.recv() => {
                    let wait = tokio::time::timeout(shutdown_timeout, child.wait()).await;
                    let result = match wait {
                        Ok(Ok(_)) => Ok(()),
                        _ => {
                            warn!("child did not exit within shutdown timeout, killing process tree");
                            child.kill().await.map_err(TransportError::Io)
                        }
                    };
                    exited.store(true, Ordering::SeqCst);
                    let _ = reply.send(result);
                }
            }
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.connected = true;

        Ok(ConnectedTransport { outbound_tx, inbound_rx, session_id: None, error_rx: Some(error_rx) })
    }

    async fn disconnect(&mut self) -> TransportResult<()> {
        let Some(shutdown_tx) = self.shutdown_tx.take() else {
            return Ok(());
        };
        self.connected = false;

        let (reply_tx, reply_rx) = oneshot::channel();
        if shutdown_tx.send(reply_tx).await.is_err() {
            // Supervisor already exited on its own; the child is gone.
            return Ok(());
        }
        reply_rx.await.unwrap_or(Ok(()))
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn health_check(&self) -> TransportResult<()> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self.exited.load(Ordering::SeqCst) {
            let stderr_tail = self.stderr_tail.lock().await.iter().cloned().collect::<Vec<_>>().join("\n");
            return Err(TransportError::ProcessExited { code: None, stderr_tail });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connects_to_a_trivial_cat_like_process() {
        // `cat` with stdin redirected to stdout is a harmless way to
        // exercise the duplex channel wiring without a real MCP server.
        if cfg!(windows) {
            return;
        }
        let config = StdioTransportConfig::new("cat");
        let mut transport = StdioTransport::new(config);
        let connected = transport.connect().await.unwrap();
        assert!(transport.is_connected());
        drop(connected.outbound_tx);
        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn unexpected_exit_is_surfaced_as_process_exited_with_exit_code() {
        if cfg!(windows) {
            return;
        }
        // `sh -c 'exit 7'` exits immediately on its own, without `disconnect`
        // ever being called — the shape of an unexpected crash.
        let config = StdioTransportConfig::new("sh").with_args(["-c", "exit 7"]);
        let mut transport = StdioTransport::new(config);
        let mut connected = transport.connect().await.unwrap();

        let error = connected.error_rx.as_mut().expect("stdio transport always provides error_rx").recv().await.unwrap();
        assert!(matches!(error, TransportError::ProcessExited { code: Some(7), .. }));

        assert!(matches!(transport.health_check().await, Err(TransportError::ProcessExited { .. })));
    }
}
