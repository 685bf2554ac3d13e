use reagentflow::app;
use reagentflow::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load()?;
    log::info!(
        "data directory: {}, remote store: {}",
        config.data_dir.display(),
        if config.connection.has_remote_store() { "configured" } else { "none" }
    );

    app::run(config).await?;

    Ok(())
}
