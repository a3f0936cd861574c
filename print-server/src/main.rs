use std::path::PathBuf;

use print_server::{Config, Server, init_logger_with_file, print_banner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    let config = Config::from_env()?;

    let log_dir = config.log.dir.as_ref().map(PathBuf::from);
    init_logger_with_file(&config.log.level, config.log.json, log_dir.as_deref())?;

    print_banner();
    tracing::info!(
        mode = %config.run_mode,
        broker = %format!("{}:{}", config.broker.host, config.broker.port),
        topic = %config.broker.topic,
        "Print server starting..."
    );

    if let Err(e) = Server::new(config).run().await {
        tracing::error!(error = %e, "Server error");
        return Err(e.into());
    }
    Ok(())
}
