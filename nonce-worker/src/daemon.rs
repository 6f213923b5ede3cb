//! Daemon lifecycle for nonce-worker.
//!
//! Wires the coordinator link to an executor, then waits for a signal or for
//! either side to finish, and shuts everything down.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::signal::unix::{self, SignalKind};
use tokio::sync::{mpsc, oneshot};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::tracing::prelude::*;
use crate::{
    config::WorkerConfig,
    coordinator::{CoordinatorLink, CoordinatorMessage, Endpoint, WorkerMessage},
    executor::Executor,
    scoring::DigestScorer,
};

/// Inbox/outbox depth. Bounded so a flood of coordinator messages can't grow
/// memory without limit.
const CHANNEL_CAPACITY: usize = 256;

/// The main daemon.
pub struct Daemon {
    config: WorkerConfig,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Daemon {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Run until the coordinator goes away or shutdown is requested.
    pub async fn run(self) -> anyhow::Result<()> {
        info!(
            endpoint = %self.config.endpoint,
            turbo = self.config.turbo,
            "Starting nonce worker"
        );

        match self.config.endpoint.clone() {
            Endpoint::Stdio => self.serve(tokio::io::stdin(), tokio::io::stdout()).await,
            Endpoint::Tcp(addr) => {
                let stream = TcpStream::connect(&addr).await?;
                info!(%addr, "Connected to coordinator");
                let (reader, writer) = stream.into_split();
                self.serve(reader, writer).await
            }
        }
    }

    async fn serve<R, W>(self, reader: R, writer: W) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (inbox_tx, inbox_rx) = mpsc::channel::<CoordinatorMessage>(CHANNEL_CAPACITY);
        let (outbox_tx, outbox_rx) = mpsc::channel::<WorkerMessage>(CHANNEL_CAPACITY);
        let (done_tx, mut done_rx) = mpsc::channel::<&'static str>(2);
        let (link_result_tx, link_result_rx) = oneshot::channel();

        let link = CoordinatorLink::new(reader, writer, inbox_tx, outbox_rx, self.shutdown.clone());
        self.tracker.spawn({
            let done_tx = done_tx.clone();
            async move {
                let result = link.run().await;
                let _ = link_result_tx.send(result);
                let _ = done_tx.send("coordinator link").await;
            }
        });

        let executor = Executor::new(
            "executor-0".into(),
            DigestScorer,
            self.config.throttle.clone(),
            self.config.turbo,
            inbox_rx,
            outbox_tx,
        );
        self.tracker.spawn(async move {
            match executor.run().await {
                Ok(stats) => info!(
                    hashes = stats.hashes,
                    shares = stats.shares_found,
                    valid = stats.valid_found,
                    "Executor finished"
                ),
                Err(e) => error!(error = %e, "Executor failed"),
            }
            let _ = done_tx.send("executor").await;
        });

        self.tracker.close();

        let mut sigint = unix::signal(SignalKind::interrupt())?;
        let mut sigterm = unix::signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT.");
            },
            _ = sigterm.recv() => {
                info!("Received SIGTERM.");
            },
            Some(who) = done_rx.recv() => {
                debug!(component = who, "Component finished");
            },
        }

        self.shutdown.cancel();
        self.tracker.wait().await;

        if let Ok(Err(e)) = link_result_rx.await {
            error!(error = %e, "Coordinator link failed");
            return Err(e.into());
        }

        info!("Exiting.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn test_serves_until_coordinator_hangs_up() {
        let (coordinator, worker) = tokio::io::duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(worker);
        let daemon = Daemon::new(WorkerConfig {
            turbo: true,
            ..WorkerConfig::default()
        });
        let handle = tokio::spawn(daemon.serve(reader, writer));

        let (coord_reader, mut coord_writer) = tokio::io::split(coordinator);
        let mut lines = BufReader::new(coord_reader).lines();

        coord_writer
            .write_all(
                br#"{"index":1,"previousHash":"00","data":"x","mainFactor":0,"shareFactor":"0xffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff","minerId":"w"}
"#,
            )
            .await
            .unwrap();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("\"requestRange\""));

        // Maximal share factor: every real digest is a share
        coord_writer
            .write_all(b"{\"startNonce\":0,\"endNonce\":2}\n")
            .await
            .unwrap();

        for nonce in 0..2 {
            let report: serde_json::Value =
                serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
            assert_eq!(report["state"], "share");
            assert_eq!(report["nonce"], nonce);
            assert_eq!(report["workerId"], "w");
        }
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("\"requestRange\""));

        // Coordinator hangs up while the worker waits for a range
        drop(coord_writer);
        drop(lines);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
