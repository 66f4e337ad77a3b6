//! Line-delimited JSON ingest for the order feed.
//!
//! An upstream bridge (or `orderctl push`) connects to the feed socket and
//! writes one [`FeedMessage`] per line; each line is answered with a
//! [`PublishAck`] once it has been fanned out through the [`FeedHub`].

use anyhow::Result;
use feed::FeedHub;
use orders::{FeedError, FeedSnapshot, ShopId};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

pub const DEFAULT_FEED_SOCKET_PATH: &str = "/tmp/order_feed.sock";

/// Longest accepted feed line, newline included.
pub const MAX_LINE_BYTES: usize = 256 * 1024;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum FeedMessage {
    Snapshot(FeedSnapshot),
    Error { shop_id: ShopId, error: FeedError },
}

impl FeedMessage {
    pub fn shop_id(&self) -> &ShopId {
        match self {
            FeedMessage::Snapshot(snapshot) => &snapshot.shop_id,
            FeedMessage::Error { shop_id, .. } => shop_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum PublishAck {
    Delivered(usize),
    Rejected(String),
}

pub fn dispatch(hub: &FeedHub, msg: FeedMessage) -> usize {
    match msg {
        FeedMessage::Snapshot(snapshot) => hub.publish_snapshot(snapshot),
        FeedMessage::Error { shop_id, error } => hub.publish_error(&shop_id, error),
    }
}

pub async fn run_server(socket_path: &str, hub: FeedHub) -> Result<()> {
    let _ = std::fs::remove_file(socket_path);
    let listener = UnixListener::bind(socket_path)?;
    info!(socket = socket_path, "feed ingest listening");
    loop {
        let (stream, _) = listener.accept().await?;
        let hub = hub.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_stream(stream, hub).await {
                warn!(error = ?err, "feed ingest connection error");
            }
        });
    }
}

enum LineRead {
    Eof,
    Line,
    TooLong,
}

/// Reads one newline-terminated line into `buf`, never buffering more than
/// [`MAX_LINE_BYTES`]. An oversized line is consumed up to its newline and
/// reported as [`LineRead::TooLong`].
async fn read_bounded_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let n = AsyncReadExt::take(&mut *reader, MAX_LINE_BYTES as u64)
        .read_until(b'\n', buf)
        .await?;
    if n == 0 {
        return Ok(LineRead::Eof);
    }
    if buf.ends_with(b"\n") || n < MAX_LINE_BYTES {
        return Ok(LineRead::Line);
    }
    loop {
        buf.clear();
        let n = AsyncReadExt::take(&mut *reader, MAX_LINE_BYTES as u64)
            .read_until(b'\n', buf)
            .await?;
        if n == 0 || buf.ends_with(b"\n") {
            buf.clear();
            return Ok(LineRead::TooLong);
        }
    }
}

fn parse_line(hub: &FeedHub, raw: &[u8]) -> Option<PublishAck> {
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line.trim(),
        Err(err) => {
            warn!(error = %err, "rejected feed line that is not utf-8");
            return Some(PublishAck::Rejected(format!("invalid utf-8: {err}")));
        }
    };
    if line.is_empty() {
        return None;
    }
    let ack = match serde_json::from_str::<FeedMessage>(line) {
        Ok(msg) => {
            let shop_id = msg.shop_id().clone();
            let delivered = dispatch(hub, msg);
            debug!(shop_id = %shop_id, delivered, "feed message published");
            PublishAck::Delivered(delivered)
        }
        Err(err) => {
            warn!(error = %err, "rejected malformed feed message");
            PublishAck::Rejected(err.to_string())
        }
    };
    Some(ack)
}

async fn handle_stream(stream: UnixStream, hub: FeedHub) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut buf = Vec::new();
    loop {
        let ack = match read_bounded_line(&mut reader, &mut buf).await? {
            LineRead::Eof => break,
            LineRead::Line => match parse_line(&hub, &buf) {
                Some(ack) => ack,
                None => continue,
            },
            LineRead::TooLong => {
                warn!(limit = MAX_LINE_BYTES, "rejected oversized feed line");
                PublishAck::Rejected(format!("line exceeds {MAX_LINE_BYTES} bytes"))
            }
        };
        let out = serde_json::to_string(&ack)? + "\n";
        write_half.write_all(out.as_bytes()).await?;
    }
    Ok(())
}

pub async fn publish(socket_path: &str, msg: &FeedMessage) -> Result<PublishAck> {
    let mut acks = publish_all(socket_path, std::slice::from_ref(msg)).await?;
    acks.pop()
        .ok_or_else(|| anyhow::anyhow!("feed socket closed without acknowledging"))
}

/// Sends every message over one connection, in order, and collects the acks.
pub async fn publish_all(socket_path: &str, msgs: &[FeedMessage]) -> Result<Vec<PublishAck>> {
    let stream = UnixStream::connect(socket_path).await?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut acks = Vec::with_capacity(msgs.len());
    for msg in msgs {
        let line = serde_json::to_string(msg)? + "\n";
        write_half.write_all(line.as_bytes()).await?;
        let mut buf = String::new();
        if reader.read_line(&mut buf).await? == 0 {
            break;
        }
        acks.push(serde_json::from_str(buf.trim())?);
    }
    Ok(acks)
}
