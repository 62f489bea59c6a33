use std::net::SocketAddr;

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{mpsc, oneshot},
};
use tokio_util::{
    codec::{Framed, LinesCodec},
    sync::CancellationToken,
    task::TaskTracker,
};
use tracing::{debug, info, warn, Instrument};

use crate::daemon::tracker::TrackerEvent;

use super::{
    messages::{Reply, Request},
    MAX_LINE_LENGTH,
};

pub struct IpcServer {
    listener: TcpListener,
    events: mpsc::Sender<TrackerEvent>,
    shutdown: CancellationToken,
}

impl IpcServer {
    pub async fn bind(
        address: SocketAddr,
        events: mpsc::Sender<TrackerEvent>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let listener = TcpListener::bind(address).await?;
        info!("Listening for messages on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            events,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until shutdown, then waits for open connections to finish their
    /// current request.
    pub async fn run(self) -> Result<()> {
        let connections = TaskTracker::new();
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let events = self.events.clone();
                        let shutdown = self.shutdown.clone();
                        let span = tracing::info_span!("connection", %peer);
                        connections.spawn(
                            async move {
                                if let Err(e) = serve_connection(stream, events, shutdown).await {
                                    debug!("Connection closed with error {e:?}");
                                }
                            }
                            .instrument(span),
                        );
                    }
                    Err(e) => warn!("Failed to accept connection {e:?}"),
                }
            }
        }
        connections.close();
        connections.wait().await;
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    events: mpsc::Sender<TrackerEvent>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut lines = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            line = lines.next() => match line {
                Some(line) => line?,
                None => return Ok(()),
            },
        };
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                debug!("Received {request:?}");
                dispatch(request, &events).await
            }
            Err(e) => Reply::failure(format!("invalid request: {e}")),
        };
        lines.send(serde_json::to_string(&reply)?).await?;
    }
}

/// Hands the request to the tracker and waits for its answer.
pub async fn dispatch(request: Request, events: &mpsc::Sender<TrackerEvent>) -> Reply {
    let (reply, answer) = oneshot::channel();
    if events
        .send(TrackerEvent::Request { request, reply })
        .await
        .is_err()
    {
        return Reply::failure("tracker is shutting down");
    }
    answer
        .await
        .unwrap_or_else(|_| Reply::failure("tracker dropped the request"))
}
