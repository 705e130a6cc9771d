//! Control protocol types and framing
//!
//! Each frame is a big-endian `u32` length followed by that many bytes of
//! bincode-encoded data. One request and one response are exchanged per
//! frame pair.

use std::fmt::{Display, Formatter};

use chrono::{TimeZone, Utc, offset::LocalResult};
use pixelpost_common::activity::LogEntry;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{ControlError, MAX_FRAME_SIZE, Result};

/// Bumped whenever the bincode layout of a request or response changes
pub const PROTOCOL_VERSION: u32 = 1;

fn format_timestamp(epoch_secs: u64) -> String {
    match Utc.timestamp_opt(i64::try_from(epoch_secs).unwrap_or(0), 0) {
        LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        _ => "unknown".to_string(),
    }
}

/// A management command as it travels over the control socket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub version: u32,
    /// Bearer token, required when the server has authentication enabled
    #[serde(default)]
    pub token: Option<String>,
    pub command: RequestCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestCommand {
    Queue(QueueCommand),
    DeadLetter(DeadLetterCommand),
    System(SystemCommand),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueCommand {
    /// Newest first
    List { limit: usize, offset: usize },
    /// Reset attempts so the item is sent on the next pass
    Retry { id: i64 },
    Delete { id: i64 },
    Status,
    /// Run a dispatch pass now; `None` uses the server's manual limit
    ProcessNow { limit: Option<usize> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeadLetterCommand {
    List { limit: usize, offset: usize },
    /// Move the item back into the queue with a fresh retry budget
    Retry { id: i64 },
    Delete { id: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemCommand {
    Ping,
    Status,
    /// Most recent activity log entries, newest first
    Logs { limit: usize },
}

/// The answer to a [`Request`], tagged with the protocol version it was encoded with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub version: u32,
    pub payload: ResponsePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponsePayload {
    Ok,
    Data(Box<ResponseData>),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseData {
    QueueList(Vec<QueueRow>),
    DeadLetterList(Vec<DeadLetterRow>),
    QueueStatus(QueueSummary),
    SystemStatus(SystemStatus),
    Logs(Vec<LogEntry>),
    /// Rows handled by a forced dispatch pass
    Processed(usize),
    /// New queue id of a requeued dead-letter item, `None` if it did not exist
    Requeued(Option<i64>),
    /// Whether a retry or delete found its target
    Changed(bool),
    Message(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRow {
    pub id: i64,
    pub destination: String,
    pub event_name: String,
    pub attempts: u32,
    /// Epoch seconds, zero when eligible immediately
    pub next_attempt_at: u64,
    pub created_at: u64,
    pub preview: String,
}

impl Display for QueueRow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("ID:          {}\n", self.id))?;
        f.write_fmt(format_args!("Destination: {}\n", self.destination))?;
        f.write_fmt(format_args!("Event:       {}\n", self.event_name))?;
        f.write_fmt(format_args!("Attempts:    {}\n", self.attempts))?;
        if self.next_attempt_at > 0 {
            f.write_fmt(format_args!(
                "Next retry:  {}\n",
                format_timestamp(self.next_attempt_at)
            ))?;
        }
        f.write_fmt(format_args!("Created:     {}\n", format_timestamp(self.created_at)))?;
        f.write_fmt(format_args!("Payload:     {}\n", self.preview))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterRow {
    pub id: i64,
    pub destination: String,
    pub event_name: String,
    pub failure_message: String,
    pub failed_at: u64,
    pub preview: String,
}

impl Display for DeadLetterRow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("ID:          {}\n", self.id))?;
        f.write_fmt(format_args!("Destination: {}\n", self.destination))?;
        f.write_fmt(format_args!("Event:       {}\n", self.event_name))?;
        f.write_fmt(format_args!("Failure:     {}\n", self.failure_message))?;
        f.write_fmt(format_args!("Failed:      {}\n", format_timestamp(self.failed_at)))?;
        f.write_fmt(format_args!("Payload:     {}\n", self.preview))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSummary {
    pub queue_length: usize,
    pub deadletter_length: usize,
    pub last_processed: Option<u64>,
}

impl Display for QueueSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("Queued:         {}\n", self.queue_length))?;
        f.write_fmt(format_args!("Dead-lettered:  {}\n", self.deadletter_length))?;
        f.write_fmt(format_args!(
            "Last processed: {}\n",
            self.last_processed
                .map_or_else(|| "never".to_string(), format_timestamp)
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_secs: u64,
    pub queue: QueueSummary,
    /// Destinations with a dedicated adapter
    pub destinations: Vec<String>,
    /// Whether every destination is forwarded through the relay
    pub relaying: bool,
}

impl Display for SystemStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("Version:        {}\n", self.version))?;
        f.write_fmt(format_args!("Uptime:         {}s\n", self.uptime_secs))?;
        self.queue.fmt(f)?;
        f.write_fmt(format_args!(
            "Destinations:   {}\n",
            if self.destinations.is_empty() {
                "generic only".to_string()
            } else {
                self.destinations.join(", ")
            }
        ))?;
        f.write_fmt(format_args!("Relay:          {}\n", if self.relaying { "on" } else { "off" }))
    }
}

impl Request {
    #[must_use]
    pub const fn new(command: RequestCommand) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            token: None,
            command,
        }
    }

    #[must_use]
    pub fn with_token(command: RequestCommand, token: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            token: Some(token.into()),
            command,
        }
    }

    #[must_use]
    pub const fn is_version_compatible(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}

impl Response {
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload: ResponsePayload::Error(message.into()),
        }
    }

    #[must_use]
    pub const fn ok() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload: ResponsePayload::Ok,
        }
    }

    #[must_use]
    pub fn data(data: ResponseData) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload: ResponsePayload::Data(Box::new(data)),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self.payload, ResponsePayload::Error(_))
    }

    #[must_use]
    pub const fn is_version_compatible(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}

/// Read one length-prefixed frame.
pub(crate) async fn read_frame<T, S>(stream: &mut S) -> Result<T>
where
    T: DeserializeOwned,
    S: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ControlError::ConnectionClosed
        } else {
            ControlError::Io(e)
        }
    })?;

    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_SIZE {
        return Err(ControlError::Protocol(format!(
            "Frame too large: {len} bytes (max {MAX_FRAME_SIZE})"
        )));
    }

    let mut bytes = vec![0u8; len as usize];
    stream.read_exact(&mut bytes).await?;

    let (value, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::legacy())?;
    Ok(value)
}

/// Write one length-prefixed frame.
pub(crate) async fn write_frame<T, S>(stream: &mut S, value: &T) -> Result<()>
where
    T: Serialize,
    S: AsyncWrite + Unpin,
{
    let bytes = bincode::serde::encode_to_vec(value, bincode::config::legacy())?;
    let len = u32::try_from(bytes.len())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(&bytes).await?;
    stream.flush().await?;

    Ok(())
}
