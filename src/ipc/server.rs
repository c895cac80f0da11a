//! Unix domain socket server for IPC
//!
//! Lets the surrounding order/registration UI drive capture sessions, feed
//! document keystrokes, and receive scan results as push notifications.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::keyboard::KeyboardHub;
use crate::state::{CaptureError, CaptureHandle};

use super::protocol::{CaptureStatus, Notification, Request, Response, MAX_MESSAGE_LEN};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    context: Arc<ServerContext>,
    shutdown_tx: broadcast::Sender<()>,
}

/// State shared with every client handler
struct ServerContext {
    handle: CaptureHandle,
    keyboard: KeyboardHub,
    notify_tx: broadcast::Sender<Notification>,
    start_time: Instant,
}

/// Request as read off the wire, before validation
type IncomingRequest = Result<Request, serde_json::Error>;

impl Server {
    /// Create a new IPC server bound to `socket_path`
    pub fn new(socket_path: &Path, handle: CaptureHandle, keyboard: KeyboardHub) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Owner-only access
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);
        let (notify_tx, _) = broadcast::channel(64);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            context: Arc::new(ServerContext {
                handle,
                keyboard,
                notify_tx,
                start_time: Instant::now(),
            }),
            shutdown_tx,
        })
    }

    /// Sender for pushing notifications to subscribed clients
    pub fn notifier(&self) -> broadcast::Sender<Notification> {
        self.context.notify_tx.clone()
    }

    /// Push a notification to every subscribed client
    pub fn publish(&self, notification: Notification) {
        // No subscribers is fine
        let _ = self.context.notify_tx.send(notification);
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let context = Arc::clone(&self.context);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, context) => {
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
    ///
    /// Reads happen on a separate task so a pending read never has to be
    /// cancelled to push a notification.
    async fn handle_client(stream: UnixStream, context: Arc<ServerContext>) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let (request_tx, mut request_rx) = mpsc::channel::<IncomingRequest>(16);
        let reader_task = tokio::spawn(Self::read_loop(reader, request_tx));

        let mut notifications: Option<broadcast::Receiver<Notification>> = None;

        let result = loop {
            tokio::select! {
                incoming = request_rx.recv() => {
                    let Some(incoming) = incoming else {
                        break Ok(());
                    };

                    let (response, subscribe) = match incoming {
                        Ok(request) => {
                            debug!(?request, "received request");
                            Self::process_request(request, &context).await
                        }
                        Err(e) => {
                            warn!(%e, "malformed request");
                            let response = Response::Error {
                                code: "invalid_request".to_string(),
                                message: e.to_string(),
                            };
                            (response, false)
                        }
                    };

                    if let Err(e) = Self::send_message(&mut writer, &response).await {
                        break Err(e);
                    }

                    if subscribe && notifications.is_none() {
                        notifications = Some(context.notify_tx.subscribe());
                        debug!("client subscribed to notifications");
                    }
                }
                notification = next_notification(&mut notifications) => match notification {
                    Ok(notification) => {
                        if let Err(e) = Self::send_message(&mut writer, &notification).await {
                            break Err(e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "client notification receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        notifications = None;
                    }
                },
            }
        };

        reader_task.abort();
        result
    }

    /// Read length-prefixed requests until the client disconnects
    async fn read_loop(mut reader: OwnedReadHalf, request_tx: mpsc::Sender<IncomingRequest>) {
        let mut len_buf = [0u8; 4];

        loop {
            // Read message length (4-byte little-endian)
            match reader.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("client disconnected");
                    return;
                }
                Err(e) => {
                    warn!(?e, "client read error");
                    return;
                }
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_MESSAGE_LEN {
                warn!(len, "message too large, disconnecting");
                return;
            }

            // Read message body
            let mut msg_buf = vec![0u8; len];
            if let Err(e) = reader.read_exact(&mut msg_buf).await {
                warn!(?e, "client read error");
                return;
            }

            let incoming = serde_json::from_slice::<Request>(&msg_buf);
            if request_tx.send(incoming).await.is_err() {
                return;
            }
        }
    }

    /// Send a length-prefixed JSON message
    async fn send_message<T: serde::Serialize>(writer: &mut OwnedWriteHalf, msg: &T) -> Result<()> {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        writer.write_all(&msg_len).await?;
        writer.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Process a request and return a response
    /// Returns (Response, should_subscribe)
    async fn process_request(request: Request, context: &ServerContext) -> (Response, bool) {
        match request {
            Request::Ping => (Response::Pong, false),

            Request::GetStatus => {
                let status = CaptureStatus {
                    mode: context.handle.mode(),
                    listening: context.keyboard.is_listening(),
                    uptime_secs: context.start_time.elapsed().as_secs(),
                    ..CaptureStatus::default()
                };
                (Response::Status(status), false)
            }

            Request::Open => (command_response(context.handle.open().await), false),

            Request::SelectChannel { channel } => {
                (command_response(context.handle.select(channel).await), false)
            }

            Request::Cancel => (command_response(context.handle.cancel().await), false),

            Request::Key { key, target } => {
                let delivered = context.keyboard.dispatch(key, target);
                (Response::KeyDispatched { delivered }, false)
            }

            Request::Subscribe => (Response::Subscribed, true),
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

fn command_response(result: Result<(), CaptureError>) -> Response {
    match result {
        Ok(()) => Response::Ack,
        Err(e) => Response::Error {
            code: "controller_stopped".to_string(),
            message: e.to_string(),
        },
    }
}

async fn next_notification(
    notifications: &mut Option<broadcast::Receiver<Notification>>,
) -> Result<Notification, broadcast::error::RecvError> {
    match notifications {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::{json, Value};

    use super::*;
    use crate::events::CaptureEvent;
    use crate::optical::UnavailableCamera;
    use crate::state::{CaptureController, ScanResult};

    fn socket_path() -> PathBuf {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("scan-capture-test-{}-{}.sock", std::process::id(), n))
    }

    /// Controller plus server wired the way the daemon wires them
    fn start_daemon() -> PathBuf {
        let keyboard = KeyboardHub::new();
        let (event_tx, mut event_rx) = broadcast::channel::<CaptureEvent>(64);
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<ScanResult>();
        let (command_tx, command_rx) = mpsc::channel(8);

        let mut controller = CaptureController::new(
            keyboard.clone(),
            Arc::new(UnavailableCamera),
            move |result: ScanResult| {
                let _ = result_tx.send(result);
            },
            event_tx,
        )
        .with_inactivity_window(Duration::from_secs(5));
        let handle = controller.handle(command_tx);

        let path = socket_path();
        let server = Server::new(&path, handle, keyboard).unwrap();
        let notifier = server.notifier();

        tokio::spawn(async move { controller.run(command_rx).await });
        tokio::spawn(async move { server.run().await });
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok(event) = event_rx.recv() => {
                        let _ = notifier.send(Notification::CaptureEvent(event));
                    }
                    Some(result) = result_rx.recv() => {
                        let _ = notifier.send(Notification::ScanResult(result));
                    }
                    else => break,
                }
            }
        });

        path
    }

    async fn send(stream: &mut UnixStream, msg: Value) {
        let bytes = serde_json::to_vec(&msg).unwrap();
        stream.write_all(&(bytes.len() as u32).to_le_bytes()).await.unwrap();
        stream.write_all(&bytes).await.unwrap();
    }

    async fn read(stream: &mut UnixStream) -> Value {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await.unwrap();
        let mut body = vec![0u8; u32::from_le_bytes(len_buf) as usize];
        stream.read_exact(&mut body).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    /// Read until a message matches, skipping everything else
    async fn read_until(stream: &mut UnixStream, matches: impl Fn(&Value) -> bool) -> Value {
        let read_matching = async {
            loop {
                let msg = read(stream).await;
                if matches(&msg) {
                    return msg;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), read_matching)
            .await
            .expect("timed out waiting for message")
    }

    fn is_event(msg: &Value, kind: &str) -> bool {
        msg["type"] == "capture_event" && msg["data"]["type"] == kind
    }

    #[tokio::test]
    async fn test_ping_and_status() {
        let path = start_daemon();
        let mut stream = UnixStream::connect(&path).await.unwrap();

        send(&mut stream, json!({"type": "ping"})).await;
        assert_eq!(read(&mut stream).await, json!({"type": "pong"}));

        send(&mut stream, json!({"type": "get_status"})).await;
        let status = read(&mut stream).await;
        assert_eq!(status["type"], "status");
        assert_eq!(status["mode"], "idle");
        assert_eq!(status["listening"], false);
    }

    #[tokio::test]
    async fn test_malformed_request() {
        let path = start_daemon();
        let mut stream = UnixStream::connect(&path).await.unwrap();

        send(&mut stream, json!({"type": "launch_rockets"})).await;
        let resp = read(&mut stream).await;
        assert_eq!(resp["type"], "error");
        assert_eq!(resp["code"], "invalid_request");

        // Connection stays usable
        send(&mut stream, json!({"type": "ping"})).await;
        assert_eq!(read(&mut stream).await, json!({"type": "pong"}));
    }

    #[tokio::test]
    async fn test_device_scan_over_ipc() {
        let path = start_daemon();
        let mut stream = UnixStream::connect(&path).await.unwrap();

        send(&mut stream, json!({"type": "subscribe"})).await;
        read_until(&mut stream, |m| m["type"] == "subscribed").await;

        send(&mut stream, json!({"type": "open"})).await;
        read_until(&mut stream, |m| is_event(m, "session_opened")).await;

        send(&mut stream, json!({"type": "select_channel", "channel": "device"})).await;
        read_until(&mut stream, |m| is_event(m, "channel_activated")).await;

        // Typing into a form field is not captured
        send(&mut stream, json!({"type": "key", "key": "x", "target": "text_input"})).await;
        read_until(&mut stream, |m| m["type"] == "key_dispatched").await;

        for key in ["A", "B", "C", "Enter"] {
            send(&mut stream, json!({"type": "key", "key": key})).await;
            let resp = read_until(&mut stream, |m| m["type"] == "key_dispatched").await;
            assert_eq!(resp["delivered"], true);
        }

        let result = read_until(&mut stream, |m| m["type"] == "scan_result").await;
        assert_eq!(result["data"], json!({"value": "ABC", "channel": "device"}));

        read_until(&mut stream, |m| is_event(m, "scan_completed")).await;
        send(&mut stream, json!({"type": "get_status"})).await;
        let status = read_until(&mut stream, |m| m["type"] == "status").await;
        assert_eq!(status["mode"], "idle");
        assert_eq!(status["listening"], false);
    }

    #[tokio::test]
    async fn test_camera_failure_notice() {
        let path = start_daemon();
        let mut stream = UnixStream::connect(&path).await.unwrap();

        send(&mut stream, json!({"type": "subscribe"})).await;
        send(&mut stream, json!({"type": "open"})).await;
        send(&mut stream, json!({"type": "select_channel", "channel": "optical"})).await;

        let failed = read_until(&mut stream, |m| is_event(m, "camera_failed")).await;
        assert!(failed["data"]["message"]
            .as_str()
            .unwrap()
            .contains("camera unavailable"));

        send(&mut stream, json!({"type": "get_status"})).await;
        let status = read_until(&mut stream, |m| m["type"] == "status").await;
        assert_eq!(status["mode"], "choice_prompt");
    }
}
