use argh::FromArgs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

use openweather::{
    consumer::run_consumer, Config, DefaultRouteProbe, Mailbox, RequestTemplate, SessionDriver,
    TcpNetwork,
};

/// OpenWeatherMap poller: fetches current conditions and logs them.
#[derive(FromArgs)]
struct Args {
    /// path to configuration file
    #[argh(option, short = 'c', default = "default_config_path()")]
    config: PathBuf,

    /// routing table consulted for link state
    #[argh(option, default = "PathBuf::from(\"/proc/net/route\")")]
    route_table: PathBuf,
}

fn default_config_path() -> PathBuf {
    PathBuf::from("configs/openweather.yaml")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Args = argh::from_env();

    log::info!("Loading config from: {}", args.config.display());
    let mut config = match Config::from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to load config from '{}': {}", args.config.display(), e);
            std::process::exit(1);
        }
    };
    config.apply_env();
    config.validate()?;

    log::info!(
        "Weather for ({}, {}) from {}:{}{}",
        config.query.lat,
        config.query.lon,
        config.server.host,
        config.server.port,
        config.server.path
    );

    // Graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    ctrlc::set_handler(move || {
        log::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    })?;

    let mailbox = Arc::new(Mailbox::new());
    let driver = SessionDriver::new(
        TcpNetwork::new(config.socket.connect_timeout()),
        DefaultRouteProbe::new(args.route_table),
        RequestTemplate::new(&config.server, &config.query),
        mailbox.clone(),
    )
    .with_config(&config);

    let fetcher = tokio::spawn(driver.run(shutdown_rx.clone()));
    let consumer = tokio::spawn(run_consumer(
        mailbox,
        std::time::Duration::from_millis(config.consumer.poll_interval_ms),
        shutdown_rx,
    ));

    fetcher.await?;
    let consumed = consumer.await?;

    log::info!("Weather node shut down after {} samples, exiting", consumed);
    Ok(())
}
