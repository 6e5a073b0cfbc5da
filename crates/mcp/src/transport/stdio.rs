//! Child process transport (newline-delimited JSON over stdio).

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{INBOUND_CAPACITY, MAX_MESSAGE_SIZE, StdioParameters, Transport};
use crate::error::{Error, Result};

/// Handle to a spawned MCP server process.
pub struct StdioTransport {
    command: String,
    process: Mutex<Child>,
    stdin: Mutex<Option<ChildStdin>>,
    reader: JoinHandle<()>,
}

impl StdioTransport {
    /// Spawn the server process and start reading its stdout.
    pub async fn spawn(params: &StdioParameters) -> Result<(Self, mpsc::Receiver<String>)> {
        debug!(command = %params.command, args = ?params.args, "spawn: called");
        let mut cmd = Command::new(&params.command);
        cmd.args(&params.args)
            .envs(&params.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut process = cmd
            .spawn()
            .map_err(|e| Error::Connection(format!("failed to spawn {}: {e}", params.command)))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::Connection("failed to capture stdin".to_string()))?;

        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::Connection("failed to capture stdout".to_string()))?;

        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let reader = tokio::spawn(read_lines(stdout, tx));

        Ok((
            Self {
                command: params.command.clone(),
                process: Mutex::new(process),
                stdin: Mutex::new(Some(stdin)),
                reader,
            },
            rx,
        ))
    }

    /// Check if the server process is still running.
    pub async fn is_running(&self) -> bool {
        let mut process = self.process.lock().await;
        matches!(process.try_wait(), Ok(None))
    }
}

async fn read_lines(stdout: ChildStdout, tx: mpsc::Sender<String>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                if line.len() > MAX_MESSAGE_SIZE {
                    warn!(
                        size = line.len(),
                        max = MAX_MESSAGE_SIZE,
                        "read_lines: dropping oversized message"
                    );
                    continue;
                }
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                debug!("read_lines: server closed stdout");
                break;
            }
            Err(e) => {
                warn!(error = %e, "read_lines: read failed");
                break;
            }
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, message: String) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(Error::ConnectionClosed)?;
        stdin.write_all(message.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        debug!(command = %self.command, "close: called");
        // Dropping stdin signals EOF to well-behaved servers.
        self.stdin.lock().await.take();
        self.reader.abort();

        let mut process = self.process.lock().await;
        if matches!(process.try_wait(), Ok(None)) {
            let _ = process.kill().await;
        }
        Ok(())
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
