use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use xa_exchanges_binance::BinanceSubscriber;
use xa_exchanges_kraken::KrakenSubscriber;
use xa_exchanges_mock::MockSubscriber;
use xa_types::{Exchange, FeedAdapter, FixedDelay, Price, ReconnectPolicy};

mod feed;

pub use feed::ReconnectingFeed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSource {
    Live,
    Mock,
}

/// One instrument and how each exchange spells it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Market {
    /// The name both exchanges' quotes are stored under.
    pub symbol: String,
    pub binance_symbol: String,
    pub kraken_symbol: String,
}

impl Default for Market {
    fn default() -> Self {
        Market {
            symbol: "BTC-USD".to_string(),
            binance_symbol: xa_exchanges_binance::DEFAULT_SYMBOL.to_string(),
            kraken_symbol: xa_exchanges_kraken::DEFAULT_SYMBOL.to_string(),
        }
    }
}

/// Builds one reconnecting feed per exchange.
pub struct Subscriber {
    exchanges: Vec<Exchange>,
    market: Market,
    source: FeedSource,
    policy: Arc<dyn ReconnectPolicy>,
}

impl Subscriber {
    pub fn new(exchanges: Vec<Exchange>, market: Market) -> Subscriber {
        Subscriber {
            exchanges,
            market,
            source: FeedSource::Live,
            policy: Arc::new(FixedDelay::default()),
        }
    }

    pub fn with_source(mut self, source: FeedSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_reconnect_policy(mut self, policy: Arc<dyn ReconnectPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> Vec<Box<dyn FeedAdapter>> {
        let mut feeds: Vec<Box<dyn FeedAdapter>> = Vec::new();
        for exchange in self.exchanges.iter().copied() {
            info!("Subscribing to {exchange} ({:?})", self.source);
            let feed: Box<dyn FeedAdapter> = match (self.source, exchange) {
                (FeedSource::Live, Exchange::Binance) => {
                    self.wrap(BinanceSubscriber::new(&self.market.binance_symbol))
                }
                (FeedSource::Live, Exchange::Kraken) => {
                    self.wrap(KrakenSubscriber::new(&self.market.kraken_symbol))
                }
                (FeedSource::Mock, exchange) => self.wrap(mock_subscriber(exchange)),
            };
            feeds.push(feed);
        }
        feeds
    }

    fn wrap<C: xa_types::VenueConnector>(&self, connector: C) -> Box<dyn FeedAdapter> {
        Box::new(
            ReconnectingFeed::new(connector, &self.market.symbol)
                .with_reconnect_policy(self.policy.clone()),
        )
    }
}

// Kraken quotes sit well above Binance's so the mock pair produces opportunities
fn mock_subscriber(exchange: Exchange) -> MockSubscriber {
    let base = match exchange {
        Exchange::Binance => Price::from_units(4_000_000_000_000),
        Exchange::Kraken => Price::from_units(4_020_000_000_000),
    };
    MockSubscriber::new(
        exchange,
        base,
        Price::from_units(1_000_000_000),
        Price::from_units(100_000_000),
    )
    .with_interval(Duration::from_millis(100))
}
