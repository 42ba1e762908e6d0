//! Redis Streams queue backend.
//!
//! # Commands
//! ```text
//! append        XADD <stream> * data <envelope-json>
//! first receive XGROUP CREATE <stream> <group> 0 MKSTREAM   (BUSYGROUP ok)
//! receive       XREADGROUP GROUP <group> <consumer> COUNT 1 BLOCK <ms>
//!                   STREAMS <stream> <0 | >>
//! ack           XACK <stream> <group> <entry-id>
//! ```
//!
//! # Design Decisions
//! - Two connections: one dedicated to blocking reads, one for everything
//!   else, so an ack never waits behind a blocked XREADGROUP
//! - The group starts at `0`, so entries appended before any worker
//!   connected are delivered too; an existing group keeps its position
//! - A consumer first re-reads its own pending entries (cursor `0`), the
//!   ones delivered before a crash, then switches to new entries (`>`)
//! - A connection is taken out of its slot for the duration of a command;
//!   if the command fails at the transport level or its future is dropped,
//!   the connection is discarded and re-established on next use

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use url::Url;

use super::resp::{self, Value};
use super::{Delivery, Envelope, QueueClient, QueueError};

const DEFAULT_PORT: u16 = 6379;
const DATA_FIELD: &str = "data";

/// Parsed `host:port` or `redis://[user:password@]host[:port][/db]` address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisEndpoint {
    pub host_port: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub db: Option<u32>,
}

impl RedisEndpoint {
    pub fn parse(address: &str) -> Result<Self, QueueError> {
        let invalid = |reason: String| QueueError::Rejected(format!("invalid redis address {address}: {reason}"));

        if !address.contains("://") {
            if address.is_empty() {
                return Err(invalid("empty".into()));
            }
            let host_port = if address.contains(':') {
                address.to_string()
            } else {
                format!("{address}:{DEFAULT_PORT}")
            };
            return Ok(Self {
                host_port,
                username: None,
                password: None,
                db: None,
            });
        }

        let url = Url::parse(address).map_err(|e| invalid(e.to_string()))?;
        if url.scheme() != "redis" {
            return Err(invalid(format!("unsupported scheme {}", url.scheme())));
        }
        let host = url.host_str().ok_or_else(|| invalid("missing host".into()))?;
        let port = url.port().unwrap_or(DEFAULT_PORT);

        let db = match url.path().trim_start_matches('/') {
            "" => None,
            db => Some(db.parse::<u32>().map_err(|_| invalid(format!("invalid database {db}")))?),
        };

        Ok(Self {
            host_port: format!("{host}:{port}"),
            username: Some(url.username().to_string()).filter(|u| !u.is_empty()),
            password: url.password().map(str::to_string),
            db,
        })
    }
}

/// Settings for [`RedisStreamQueue`].
#[derive(Debug, Clone)]
pub struct RedisOptions {
    pub endpoint: RedisEndpoint,
    pub group: String,
    pub consumer: String,
    pub block: Duration,
    pub connect_timeout: Duration,
}

/// A single RESP connection.
struct Connection {
    stream: TcpStream,
    buf: BytesMut,
}

impl Connection {
    async fn open(endpoint: &RedisEndpoint, timeout: Duration) -> Result<Self, QueueError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&endpoint.host_port))
            .await
            .map_err(|_| QueueError::Unavailable(format!("connect to {} timed out", endpoint.host_port)))?
            .map_err(|e| QueueError::Unavailable(format!("connect to {}: {e}", endpoint.host_port)))?;
        stream
            .set_nodelay(true)
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        let mut conn = Self {
            stream,
            buf: BytesMut::with_capacity(8 * 1024),
        };

        if let Some(password) = &endpoint.password {
            match &endpoint.username {
                Some(user) => conn.call(&[b"AUTH", user.as_bytes(), password.as_bytes()]).await?,
                None => conn.call(&[b"AUTH", password.as_bytes()]).await?,
            };
        }
        if let Some(db) = endpoint.db {
            conn.call(&[b"SELECT", db.to_string().as_bytes()]).await?;
        }

        tracing::debug!(address = %endpoint.host_port, "Redis connection established");
        Ok(conn)
    }

    /// Send one command and read its reply. Error replies become
    /// [`QueueError::Rejected`]; the connection stays usable after them.
    async fn call(&mut self, args: &[&[u8]]) -> Result<Value, QueueError> {
        let mut out = BytesMut::new();
        resp::encode_command(args, &mut out);
        self.stream
            .write_all(&out)
            .await
            .map_err(|e| QueueError::Unavailable(format!("write: {e}")))?;

        let value = self.read_value().await?;
        if let Value::Error(msg) = value {
            return Err(QueueError::Rejected(String::from_utf8_lossy(&msg).into_owned()));
        }
        Ok(value)
    }

    async fn read_value(&mut self) -> Result<Value, QueueError> {
        loop {
            match Value::parse(&self.buf) {
                Ok((value, consumed)) => {
                    self.buf.advance(consumed);
                    return Ok(value);
                }
                Err(e) if e.is_incomplete() => {}
                Err(e) => return Err(QueueError::Unavailable(format!("protocol: {e}"))),
            }

            let n = self
                .stream
                .read_buf(&mut self.buf)
                .await
                .map_err(|e| QueueError::Unavailable(format!("read: {e}")))?;
            if n == 0 {
                return Err(QueueError::Unavailable("connection closed by server".into()));
            }
        }
    }
}

/// A lazily (re)connected connection slot.
struct Slot {
    conn: Option<Connection>,
}

impl Slot {
    fn empty() -> Self {
        Self { conn: None }
    }

    async fn call(
        &mut self,
        options: &RedisOptions,
        args: &[&[u8]],
    ) -> Result<Value, QueueError> {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => Connection::open(&options.endpoint, options.connect_timeout).await?,
        };
        let result = conn.call(args).await;
        // Transport failures leave the stream in an unknown state.
        if !matches!(result, Err(QueueError::Unavailable(_))) {
            self.conn = Some(conn);
        }
        result
    }
}

struct ConsumerState {
    slot: Slot,
    /// Per stream: whether this consumer's pending backlog has been drained.
    backlog_drained: HashMap<String, bool>,
}

/// [`QueueClient`] over Redis Streams with a consumer group.
pub struct RedisStreamQueue {
    options: RedisOptions,
    commands: Mutex<Slot>,
    consumer: Mutex<ConsumerState>,
}

impl RedisStreamQueue {
    pub fn new(options: RedisOptions) -> Self {
        Self {
            options,
            commands: Mutex::new(Slot::empty()),
            consumer: Mutex::new(ConsumerState {
                slot: Slot::empty(),
                backlog_drained: HashMap::new(),
            }),
        }
    }

    /// Round-trip a PING, establishing the command connection.
    pub async fn ping(&self) -> Result<(), QueueError> {
        self.command(&[b"PING"]).await.map(|_| ())
    }

    async fn command(&self, args: &[&[u8]]) -> Result<Value, QueueError> {
        self.commands.lock().await.call(&self.options, args).await
    }

    async fn ensure_group(&self, stream: &str) -> Result<(), QueueError> {
        let result = self
            .command(&[
                b"XGROUP",
                b"CREATE",
                stream.as_bytes(),
                self.options.group.as_bytes(),
                b"0",
                b"MKSTREAM",
            ])
            .await;
        match result {
            Ok(_) => {
                tracing::info!(stream, group = %self.options.group, "Created consumer group");
                Ok(())
            }
            Err(QueueError::Rejected(msg)) if msg.starts_with("BUSYGROUP") => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl QueueClient for RedisStreamQueue {
    async fn append(&self, stream: &str, envelope: &Envelope) -> Result<(), QueueError> {
        let json = envelope
            .to_json()
            .map_err(|e| QueueError::Rejected(format!("serialize envelope: {e}")))?;
        let entry_id = self
            .command(&[b"XADD", stream.as_bytes(), b"*", DATA_FIELD.as_bytes(), json.as_bytes()])
            .await?;

        tracing::debug!(
            stream,
            envelope_id = %envelope.id,
            entry_id = entry_id.as_str().unwrap_or("?"),
            "Envelope appended"
        );
        Ok(())
    }

    async fn receive_next(&self, stream: &str) -> Result<Delivery, QueueError> {
        let mut state = self.consumer.lock().await;
        let block_ms = self.options.block.as_millis().to_string();

        loop {
            let drained = match state.backlog_drained.get(stream) {
                Some(drained) => *drained,
                None => {
                    self.ensure_group(stream).await?;
                    state.backlog_drained.insert(stream.to_string(), false);
                    false
                }
            };
            let cursor: &[u8] = if drained { b">" } else { b"0" };

            let reply = state
                .slot
                .call(
                    &self.options,
                    &[
                        b"XREADGROUP",
                        b"GROUP",
                        self.options.group.as_bytes(),
                        self.options.consumer.as_bytes(),
                        b"COUNT",
                        b"1",
                        b"BLOCK",
                        block_ms.as_bytes(),
                        b"STREAMS",
                        stream.as_bytes(),
                        cursor,
                    ],
                )
                .await;

            let reply = match reply {
                Ok(reply) => reply,
                Err(QueueError::Rejected(msg)) if msg.starts_with("NOGROUP") => {
                    // Stream or group was deleted; recreate on the next pass.
                    state.backlog_drained.remove(stream);
                    return Err(QueueError::Rejected(msg));
                }
                Err(e) => return Err(e),
            };

            match first_entry(reply)? {
                None => {
                    if !drained {
                        tracing::debug!(stream, "Pending backlog drained");
                        state.backlog_drained.insert(stream.to_string(), true);
                    }
                }
                Some((receipt, None)) => {
                    // Pending entry whose content was trimmed from the stream.
                    tracing::warn!(stream, receipt = %receipt, "Pending entry no longer exists, acknowledging");
                    self.ack(stream, &receipt).await?;
                }
                Some((receipt, Some(fields))) => {
                    return match envelope_from_fields(fields) {
                        Ok(envelope) => Ok(Delivery { receipt, envelope }),
                        Err(reason) => Err(QueueError::CorruptEntry { receipt, reason }),
                    };
                }
            }
        }
    }

    async fn ack(&self, stream: &str, receipt: &str) -> Result<(), QueueError> {
        self.command(&[
            b"XACK",
            stream.as_bytes(),
            self.options.group.as_bytes(),
            receipt.as_bytes(),
        ])
        .await
        .map(|_| ())
    }
}

/// Pull the first `(entry-id, fields)` out of an XREADGROUP reply.
///
/// Returns `None` for an empty or timed-out read. Fields are `None` when a
/// pending entry has been deleted from the stream.
fn first_entry(reply: Value) -> Result<Option<(String, Option<Vec<Value>>)>, QueueError> {
    let unexpected = || QueueError::Rejected("unexpected XREADGROUP reply shape".into());

    let streams = match reply {
        Value::Null => return Ok(None),
        Value::Array(streams) => streams,
        _ => return Err(unexpected()),
    };
    let Some(stream) = streams.into_iter().next() else {
        return Ok(None);
    };
    let mut stream = stream.into_array().ok_or_else(unexpected)?;
    if stream.len() != 2 {
        return Err(unexpected());
    }
    let entries = stream.pop().and_then(Value::into_array).ok_or_else(unexpected)?;
    let Some(entry) = entries.into_iter().next() else {
        return Ok(None);
    };

    let mut entry = entry.into_array().ok_or_else(unexpected)?.into_iter();
    let receipt = entry
        .next()
        .and_then(|id| id.as_str().map(str::to_string))
        .ok_or_else(unexpected)?;
    let fields = entry.next().and_then(Value::into_array);
    Ok(Some((receipt, fields)))
}

fn envelope_from_fields(fields: Vec<Value>) -> Result<Envelope, String> {
    let mut pairs = fields.into_iter();
    while let (Some(name), Some(value)) = (pairs.next(), pairs.next()) {
        if name.as_str() == Some(DATA_FIELD) {
            return match value {
                Value::BulkString(data) => Envelope::from_json(&data).map_err(|e| e.to_string()),
                _ => Err("data field is not a bulk string".into()),
            };
        }
    }
    Err(format!("entry has no {DATA_FIELD} field"))
}
