use bushal::{config::DemoConfig, daemon::Daemon, tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing::init_journald_or_stdout();

    let daemon = Daemon::new(DemoConfig::from_env());
    daemon.run().await
}
