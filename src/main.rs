//! Daemon entrypoint: event sync, activity persistence, nightly audit.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fundgate::runtime::run().await
}
