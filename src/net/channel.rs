//! Resilient TCP link to the cloud command server
//!
//! Connection loss is never fatal: the receive loop reconnects on EOF or
//! read errors, and a failed send asks it to do the same.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, Notify};

use super::framing::FrameBuffer;
use crate::config::NetworkConfig;

/// Outbound telemetry frame
#[derive(Debug, Serialize)]
struct StateFrame<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: &'a str,
    id: &'a str,
    content: &'a T,
}

enum ReadOutcome {
    Shutdown,
    Reconnect,
    Read(std::io::Result<usize>),
}

/// TCP client with reconnect, dual framing and a shared send lock
pub struct NetworkChannel {
    addr: String,
    reconnect_interval: Duration,
    connect_timeout: Duration,
    read_chunk_size: usize,
    connected: AtomicBool,
    running: AtomicBool,
    writer: Mutex<Option<OwnedWriteHalf>>,
    reader: Mutex<Option<OwnedReadHalf>>,
    shutdown: Notify,
    reconnect: Notify,
}

impl NetworkChannel {
    /// Create a disconnected channel
    #[must_use]
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            addr: config.server_addr.clone(),
            reconnect_interval: config.reconnect_interval(),
            connect_timeout: config.connect_timeout(),
            read_chunk_size: config.read_chunk_size.max(1),
            connected: AtomicBool::new(false),
            running: AtomicBool::new(true),
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            shutdown: Notify::new(),
            reconnect: Notify::new(),
        }
    }

    /// Server address
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Whether a connection is currently established
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Whether [`close`](Self::close) has not been called
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Connect, retrying every reconnect interval until it succeeds
    ///
    /// Returns `false` only if the channel was closed while waiting.
    pub async fn connect(&self) -> bool {
        while self.is_running() {
            let connect = TcpStream::connect(&self.addr);
            match tokio::time::timeout(self.connect_timeout, connect).await {
                Ok(Ok(stream)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::warn!(error = %e, "failed to set TCP_NODELAY");
                    }
                    let (read_half, write_half) = stream.into_split();
                    *self.reader.lock().await = Some(read_half);
                    *self.writer.lock().await = Some(write_half);
                    self.connected.store(true, Ordering::Release);
                    tracing::info!(addr = %self.addr, "connected to cloud server");
                    return true;
                }
                Ok(Err(e)) => {
                    tracing::warn!(addr = %self.addr, error = %e, "connection failed");
                }
                Err(_) => {
                    tracing::warn!(addr = %self.addr, "connection timed out");
                }
            }

            tracing::info!(
                retry_in_secs = self.reconnect_interval.as_secs_f64(),
                "retrying connection"
            );
            tokio::select! {
                () = tokio::time::sleep(self.reconnect_interval) => {}
                () = self.shutdown.notified() => {}
            }
        }
        false
    }

    /// Read and dispatch messages until the channel is closed
    ///
    /// Connects first when needed. Each complete message, newline
    /// terminated or a bare known command token, is passed to `on_message`.
    pub async fn receive_loop<F>(&self, mut on_message: F)
    where
        F: FnMut(String) + Send,
    {
        let mut frames = FrameBuffer::new();
        let mut chunk = vec![0u8; self.read_chunk_size];

        while self.is_running() {
            if !self.is_connected() && !self.connect().await {
                break;
            }

            let reader = self.reader.lock().await.take();
            let Some(mut reader) = reader else {
                self.mark_disconnected().await;
                continue;
            };
            frames.clear();

            loop {
                let outcome = tokio::select! {
                    () = self.shutdown.notified() => ReadOutcome::Shutdown,
                    () = self.reconnect.notified() => ReadOutcome::Reconnect,
                    read = reader.read(&mut chunk) => ReadOutcome::Read(read),
                };

                match outcome {
                    ReadOutcome::Shutdown => {
                        tracing::debug!("receive loop stopping");
                        return;
                    }
                    ReadOutcome::Reconnect => {
                        // A stale request from an earlier connection
                        if self.is_connected() {
                            continue;
                        }
                        tracing::info!("send failure, reconnecting");
                        break;
                    }
                    ReadOutcome::Read(Ok(0)) => {
                        tracing::warn!("server closed the connection");
                        break;
                    }
                    ReadOutcome::Read(Ok(n)) => {
                        frames.push(&chunk[..n]);
                        for message in frames.drain() {
                            tracing::info!(command = %message, "command received");
                            on_message(message);
                        }
                    }
                    ReadOutcome::Read(Err(e)) => {
                        tracing::warn!(error = %e, "receive error");
                        break;
                    }
                }
            }

            self.mark_disconnected().await;
        }
    }

    /// Send `{type, id, content}` followed by a newline
    ///
    /// Returns `false` without raising if not connected or the write
    /// fails; a failed write marks the channel disconnected so the receive
    /// loop reconnects.
    pub async fn send_state<T: Serialize + Sync>(&self, kind: &str, id: &str, content: &T) -> bool {
        let mut line = match serde_json::to_vec(&StateFrame { kind, id, content }) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize state frame");
                return false;
            }
        };
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        if !self.is_connected() {
            tracing::warn!("not connected, state not sent");
            return false;
        }
        let Some(stream) = writer.as_mut() else {
            tracing::warn!("not connected, state not sent");
            return false;
        };

        match stream.write_all(&line).await {
            Ok(()) => {
                tracing::debug!(kind, id, bytes = line.len(), "state sent");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to send state");
                *writer = None;
                self.connected.store(false, Ordering::Release);
                self.reconnect.notify_one();
                false
            }
        }
    }

    /// Stop all loops and close the socket
    pub async fn close(&self) {
        self.running.store(false, Ordering::Release);
        self.connected.store(false, Ordering::Release);
        self.shutdown.notify_one();

        if let Some(mut stream) = self.writer.lock().await.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::debug!(error = %e, "socket shutdown failed");
            }
        }
        self.reader.lock().await.take();
        tracing::info!("network channel closed");
    }

    async fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
        self.writer.lock().await.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_frame_shape() {
        let content = serde_json::json!({"energy_remain": 80});
        let frame = StateFrame {
            kind: "state",
            id: "1001",
            content: &content,
        };
        assert_eq!(
            serde_json::to_string(&frame).unwrap(),
            r#"{"type":"state","id":"1001","content":{"energy_remain":80}}"#
        );
    }

    #[tokio::test]
    async fn send_without_connection_fails_quietly() {
        let channel = NetworkChannel::new(&NetworkConfig::default());
        assert!(!channel.is_connected());
        let empty = serde_json::json!({});
        assert!(!channel.send_state("state", "1", &empty).await);
    }

    #[tokio::test]
    async fn close_stops_connect_retries() {
        let config = NetworkConfig {
            server_addr: "127.0.0.1:1".to_string(),
            reconnect_interval_secs: 60.0,
            ..NetworkConfig::default()
        };
        let channel = std::sync::Arc::new(NetworkChannel::new(&config));
        let task = {
            let channel = std::sync::Arc::clone(&channel);
            tokio::spawn(async move { channel.connect().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        channel.close().await;
        let connected = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(!connected);
    }

    #[tokio::test]
    async fn failed_send_triggers_reconnect() {
        use std::sync::Arc;

        use tokio::io::{AsyncBufReadExt, BufReader};
        use tokio::net::TcpListener;

        const WAIT: Duration = Duration::from_secs(5);

        async fn wait_connected(channel: &NetworkChannel) {
            tokio::time::timeout(WAIT, async {
                while !channel.is_connected() {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .expect("channel connected");
        }

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = NetworkConfig {
            server_addr: listener.local_addr().unwrap().to_string(),
            reconnect_interval_secs: 0.05,
            ..NetworkConfig::default()
        };
        let channel = Arc::new(NetworkChannel::new(&config));
        let task = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.receive_loop(|_| {}).await })
        };

        let (_first, _) = tokio::time::timeout(WAIT, listener.accept())
            .await
            .unwrap()
            .unwrap();
        wait_connected(&channel).await;

        // Writes on a shut down half fail with a broken pipe
        channel
            .writer
            .lock()
            .await
            .as_mut()
            .unwrap()
            .shutdown()
            .await
            .unwrap();
        let report = serde_json::json!({"energy_remain": 50});
        assert!(!channel.send_state("state", "1001", &report).await);
        assert!(!channel.is_connected());

        let (second, _) = tokio::time::timeout(WAIT, listener.accept())
            .await
            .unwrap()
            .unwrap();
        wait_connected(&channel).await;
        assert!(channel.send_state("state", "1001", &report).await);

        let mut line = String::new();
        let mut reader = BufReader::new(second);
        tokio::time::timeout(WAIT, reader.read_line(&mut line))
            .await
            .unwrap()
            .unwrap();
        let frame: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(frame["content"]["energy_remain"], 50);

        channel.close().await;
        tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    }
}
