//! TCP connection to the hook handler.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use hookwire_core::config::HandlerConfig;
use hookwire_core::{AppError, AppResult, ErrorKind, FaultSlot};

use crate::codec::HandlerCodec;
use crate::message::HandlerMessage;
use crate::pending::PendingCalls;

/// Connects to the handler started as `command_line`, retrying until the
/// connect deadline.
///
/// A crash already recorded in `fault` ends the attempt with that error. On
/// success the handler gets `after_connect_wait` to finish booting before
/// the stream is returned.
pub async fn connect_with_retry(
    config: &HandlerConfig,
    command_line: &str,
    fault: &FaultSlot,
) -> AppResult<TcpStream> {
    let address = config.address();
    let start = Instant::now();
    let deadline = start + config.connect_timeout();
    let mut attempt: u32 = 0;

    loop {
        fault.check()?;

        let now = Instant::now();
        if now >= deadline {
            return Err(connect_timeout_error(config, command_line));
        }

        attempt += 1;
        debug!(address = %address, attempt, "Connecting to hooks handler");

        match tokio::time::timeout_at(deadline, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => {
                info!(
                    address = %address,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    after_connect_wait_ms = config.after_connect_wait,
                    "Connected to hooks handler"
                );
                tokio::time::sleep(config.after_connect_wait()).await;
                return Ok(stream);
            }
            Ok(Err(e)) => {
                debug!(address = %address, attempt, error = %e, "Hooks handler not reachable yet");
                if attempt > 1 {
                    warn!(
                        address = %address,
                        "Error connecting to the hooks handler process. Is the handler running? Retrying."
                    );
                }
            }
            Err(_) => return Err(connect_timeout_error(config, command_line)),
        }

        let wake = (Instant::now() + config.connect_retry()).min(deadline);
        tokio::time::sleep_until(wake).await;
    }
}

fn connect_timeout_error(config: &HandlerConfig, command_line: &str) -> AppError {
    AppError::connection(format!(
        "Connection timeout {}s to hooks handler '{}' on {} exceeded. Try increasing the limit.",
        config.connect_timeout as f64 / 1000.0,
        command_line,
        config.address()
    ))
}

/// An established connection: a writer for requests and a reader task that
/// routes replies into [`PendingCalls`].
#[derive(Debug)]
pub struct HandlerConnection {
    writer: Mutex<Option<FramedWrite<OwnedWriteHalf, HandlerCodec>>>,
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
    closed: Arc<AtomicBool>,
}

impl HandlerConnection {
    /// Splits `stream` and starts routing replies into `pending`.
    pub fn start(stream: TcpStream, pending: Arc<PendingCalls>) -> Self {
        let (read_half, write_half) = stream.into_split();
        let closed = Arc::new(AtomicBool::new(false));

        let reader = tokio::spawn(read_replies(read_half, pending, Arc::clone(&closed)));

        Self {
            writer: Mutex::new(Some(FramedWrite::new(write_half, HandlerCodec::new()))),
            reader: std::sync::Mutex::new(Some(reader)),
            closed,
        }
    }

    /// Whether the connection has stopped delivering replies.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Writes one message followed by the delimiter.
    pub async fn send(&self, message: HandlerMessage) -> AppResult<()> {
        let mut writer = self.writer.lock().await;
        let Some(writer) = writer.as_mut() else {
            return Err(AppError::connection(
                "Connection to hooks handler is closed",
            ));
        };
        writer.send(message).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Connection,
                format!("Unable to write to hooks handler: {e}"),
                e,
            )
        })
    }

    /// Closes both directions of the socket. Safe to call twice.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);

        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.close().await {
                debug!(error = %e, "Error while closing connection to hooks handler");
            }
        }

        let reader = self
            .reader
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(reader) = reader {
            reader.abort();
        }
    }
}

async fn read_replies(read_half: OwnedReadHalf, pending: Arc<PendingCalls>, closed: Arc<AtomicBool>) {
    let mut frames = FramedRead::new(read_half, HandlerCodec::new());

    while let Some(frame) = frames.next().await {
        match frame {
            Ok(message) => match message.uuid {
                Some(uuid) => {
                    debug!(uuid = %uuid, event = %message.event, "Received message from hooks handler");
                    pending.resolve(&uuid, message.data);
                }
                None => {
                    debug!(event = %message.event, "UUID not present in hooks handler message, ignoring");
                }
            },
            Err(e) => {
                debug!(error = %e, "TCP communication with hooks handler errored");
                break;
            }
        }
    }

    debug!("TCP communication with hooks handler closed");
    closed.store(true, Ordering::SeqCst);
    pending.clear();
}
