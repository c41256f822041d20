use std::io;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use xa_engine::{Engine, Service};
use xa_subscriber::Subscriber;
use xa_types::{Exchange, FixedDelay};

mod config;

use config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let config = AppConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_writer(io::stdout)
        .with_max_level(config.log_level)
        .init();

    info!("Service started");
    info!(
        "Monitoring {} as {} on Binance and {} on Kraken. Fees: {}/{}. MinProfit: {}",
        config.market.symbol,
        config.market.binance_symbol,
        config.market.kraken_symbol,
        config.binance_fee,
        config.kraken_fee,
        config.min_profit
    );

    let shutdown = CancellationToken::new();
    let engine = Engine::new(config.engine_config()).start(shutdown.clone());
    let mut service = Service::new(engine);

    let feeds = Subscriber::new(Exchange::ALL.to_vec(), config.market.clone())
        .with_source(config.source)
        .with_reconnect_policy(Arc::new(FixedDelay::new(config.reconnect_delay)))
        .build();
    for feed in feeds {
        service.add_feed(feed);
    }
    service.start();

    tokio::signal::ctrl_c().await?;

    info!("Service stopping");
    service.shutdown();
    service.join().await;

    Ok(())
}
