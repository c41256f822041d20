use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::select;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;
use xa_types::{Exchange, Price, SessionContext, SessionError, VenueConnector};

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// Generates random quotes around a base price instead of connecting anywhere.
pub struct MockSubscriber {
    exchange: Exchange,
    base: Price,
    jitter: Price,
    spread: Price,
    interval: Duration,
    rng: StdRng,
}

impl MockSubscriber {
    /// Bids are drawn uniformly from `[base, base + jitter]`; asks are `bid + spread`.
    pub fn new(exchange: Exchange, base: Price, jitter: Price, spread: Price) -> MockSubscriber {
        MockSubscriber {
            exchange,
            base,
            jitter,
            spread,
            interval: DEFAULT_INTERVAL,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn next_quote(&mut self) -> (Price, Price) {
        let offset = self.rng.gen_range(0..=self.jitter.units().max(0));
        let bid = self.base.units().saturating_add(offset);
        let ask = bid.saturating_add(self.spread.units());
        (Price::from_units(bid), Price::from_units(ask))
    }
}

#[async_trait]
impl VenueConnector for MockSubscriber {
    fn exchange(&self) -> Exchange {
        self.exchange
    }

    async fn run_session(
        &mut self,
        context: SessionContext,
        cancellation_token: CancellationToken,
    ) -> Result<(), SessionError> {
        info!("{}: Mock feed connected", self.exchange);
        context.mark_connected();

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            select! {
                _ = cancellation_token.cancelled() => break,
                _ = ticker.tick() => {
                    let (bid, ask) = self.next_quote();
                    context.publish(bid, ask);
                }
            }
        }

        info!("{}: Mock feed disconnected", self.exchange);
        Ok(())
    }
}
