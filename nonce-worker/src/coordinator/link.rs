//! Coordinator link: moves messages between the wire and the executor.
//!
//! The link owns both halves of the transport. Inbound lines are decoded,
//! routed by shape, and forwarded to the executor's inbox; messages from the
//! executor's outbox are encoded and written back. It holds no executor state,
//! so delivery never races the scan loop.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use super::codec::MessageCodec;
use super::error::{LinkError, LinkResult};
use super::messages::{CoordinatorMessage, WorkerMessage};
use crate::tracing::prelude::*;

/// Transport connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Endpoint {
    /// Newline-delimited JSON over stdin/stdout
    #[default]
    Stdio,

    /// Newline-delimited JSON over a TCP connection (`host:port`)
    Tcp(String),
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Stdio => write!(f, "stdio"),
            Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
        }
    }
}

/// Bridge between a coordinator transport and one executor.
pub struct CoordinatorLink<R, W> {
    reader: FramedRead<R, MessageCodec>,
    writer: FramedWrite<W, MessageCodec>,

    /// Executor inbox
    inbox_tx: mpsc::Sender<CoordinatorMessage>,

    /// Executor outbox
    outbox_rx: mpsc::Receiver<WorkerMessage>,

    shutdown: CancellationToken,
}

impl<R, W> CoordinatorLink<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        reader: R,
        writer: W,
        inbox_tx: mpsc::Sender<CoordinatorMessage>,
        outbox_rx: mpsc::Receiver<WorkerMessage>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            reader: FramedRead::new(reader, MessageCodec::new()),
            writer: FramedWrite::new(writer, MessageCodec::new()),
            inbox_tx,
            outbox_rx,
            shutdown,
        }
    }

    /// Run until the coordinator hangs up, the executor stops, or shutdown.
    ///
    /// Dropping the link closes the executor's inbox, which is how the
    /// executor learns the coordinator is gone.
    pub async fn run(mut self) -> LinkResult<()> {
        loop {
            tokio::select! {
                frame = self.reader.next() => {
                    let Some(frame) = frame else {
                        info!("Coordinator closed the connection");
                        break;
                    };
                    self.route(frame?).await?;
                }

                message = self.outbox_rx.recv() => {
                    let Some(message) = message else {
                        debug!("Executor outbox closed, shutting down link");
                        break;
                    };
                    trace!(?message, "Sending to coordinator");
                    self.writer.send(message).await?;
                }

                _ = self.shutdown.cancelled() => {
                    debug!("Coordinator link shutting down");
                    break;
                }
            }
        }

        // Whatever the executor already queued still belongs on the wire
        while let Ok(message) = self.outbox_rx.try_recv() {
            self.writer.send(message).await?;
        }
        Ok(())
    }

    async fn route(&mut self, value: serde_json::Value) -> LinkResult<()> {
        match CoordinatorMessage::classify(value) {
            Ok(message) => {
                trace!(?message, "Received from coordinator");
                self.inbox_tx
                    .send(message)
                    .await
                    .map_err(|_| LinkError::InboxClosed)
            }
            Err(e) => {
                warn!(error = %e, "Ignoring unrecognized coordinator message");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NonceRange;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn test_routes_inbound_and_skips_unrecognized() {
        let (mut coordinator, worker) = duplex(4096);
        let (reader, writer) = tokio::io::split(worker);
        let (inbox_tx, mut inbox_rx) = mpsc::channel(10);
        let (_outbox_tx, outbox_rx) = mpsc::channel(10);
        let shutdown = CancellationToken::new();

        let link = CoordinatorLink::new(reader, writer, inbox_tx, outbox_rx, shutdown.clone());
        let handle = tokio::spawn(link.run());

        coordinator
            .write_all(b"[1,2]\n{\"startNonce\":5,\"endNonce\":2}\n{\"startNonce\":0,\"endNonce\":8}\n")
            .await
            .unwrap();

        // Array and inverted range are dropped; the valid range gets through
        let message = inbox_rx.recv().await.unwrap();
        assert_eq!(
            message,
            CoordinatorMessage::Range(NonceRange { start: 0, end: 8 })
        );

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_writes_outbound_and_ends_on_hangup() {
        let (coordinator, worker) = duplex(4096);
        let (reader, writer) = tokio::io::split(worker);
        let (inbox_tx, mut inbox_rx) = mpsc::channel(10);
        let (outbox_tx, outbox_rx) = mpsc::channel(10);

        let link = CoordinatorLink::new(
            reader,
            writer,
            inbox_tx,
            outbox_rx,
            CancellationToken::new(),
        );
        let handle = tokio::spawn(link.run());

        outbox_tx.send(WorkerMessage::RangeRequest).await.unwrap();

        let (coord_reader, coord_writer) = tokio::io::split(coordinator);
        let mut lines = BufReader::new(coord_reader).lines();
        assert_eq!(
            lines.next_line().await.unwrap().as_deref(),
            Some("\"requestRange\"")
        );

        // Coordinator hangs up: link ends cleanly and the inbox closes
        drop(coord_writer);
        drop(lines);
        handle.await.unwrap().unwrap();
        assert!(inbox_rx.recv().await.is_none());
    }
}
