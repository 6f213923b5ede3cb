use nonce_worker::{config::WorkerConfig, daemon::Daemon, tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing::init_journald_or_stderr();
    Daemon::new(WorkerConfig::from_env()).run().await
}
