use std::net::SocketAddr;

use anyhow::{anyhow, Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::debug;

use crate::daemon::ipc::{
    messages::{Reply, Request},
    MAX_LINE_LENGTH,
};

/// Sends one request to a running daemon and waits for its reply.
pub async fn send_request(address: SocketAddr, request: &Request) -> Result<Reply> {
    let stream = TcpStream::connect(address)
        .await
        .with_context(|| format!("Couldn't reach the daemon on {address}, is it running?"))?;
    let mut lines = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

    debug!("Sending {request:?}");
    lines.send(serde_json::to_string(request)?).await?;
    let line = lines
        .next()
        .await
        .ok_or_else(|| anyhow!("Daemon closed the connection without replying"))??;
    Ok(serde_json::from_str(&line)?)
}
