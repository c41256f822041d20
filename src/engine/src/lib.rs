use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace};
use xa_arb_finder::{ArbFinder, FeeSchedule};
use xa_types::{Event, Exchange, Price, QuoteUpdate, UpdateCallback};

mod aggregator;
mod heartbeat;
mod service;
mod sink;
mod store;
#[cfg(test)]
mod testing;

pub use aggregator::{Aggregator, AggregatorStats};
pub use heartbeat::{HeartbeatSource, DEFAULT_HEARTBEAT_INTERVAL};
pub use service::Service;
pub use sink::{HeartbeatReport, HeartbeatSink, LogSink, OpportunitySink, QuoteLine};
pub use store::SnapshotStore;

pub const DEFAULT_MIN_PROFIT: Price = Price::from_units(100);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub fees: FeeSchedule,
    pub min_profit: Price,
    pub heartbeat_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            fees: FeeSchedule::new(),
            min_profit: DEFAULT_MIN_PROFIT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

pub struct Engine {
    config: EngineConfig,
    opportunity_sink: Box<dyn OpportunitySink>,
    heartbeat_sink: Box<dyn HeartbeatSink>,
}

/// Producer side of the event queue. Cheap to clone, safe to use from any task or thread.
#[derive(Clone)]
pub struct SnapshotReporter {
    events: UnboundedSender<Event>,
}

pub struct EngineHandle {
    reporter: SnapshotReporter,
    cancellation_token: CancellationToken,
    shut_down: AtomicBool,
    aggregator: JoinHandle<SnapshotStore>,
    heartbeat: JoinHandle<()>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Engine {
        Engine {
            config,
            opportunity_sink: Box::new(LogSink),
            heartbeat_sink: Box::new(LogSink),
        }
    }

    pub fn with_opportunity_sink<S: OpportunitySink + 'static>(mut self, sink: S) -> Self {
        self.opportunity_sink = Box::new(sink);
        self
    }

    pub fn with_heartbeat_sink<S: HeartbeatSink + 'static>(mut self, sink: S) -> Self {
        self.heartbeat_sink = Box::new(sink);
        self
    }

    /// Spawns the aggregation loop and the heartbeat source. Cancelling `cancellation_token`
    /// (or calling [`EngineHandle::shutdown`]) stops both.
    pub fn start(self, cancellation_token: CancellationToken) -> EngineHandle {
        let (sender, receiver) = unbounded_channel();
        let cancellation_token = cancellation_token.child_token();

        info!(
            "Engine starting. MinProfit: {}. HeartbeatInterval: {:?}",
            self.config.min_profit, self.config.heartbeat_interval
        );

        let aggregator = Aggregator::new(
            ArbFinder::new(self.config.fees, self.config.min_profit),
            self.opportunity_sink,
            self.heartbeat_sink,
        );
        let aggregator = tokio::spawn(aggregator.run_async(receiver, cancellation_token.clone()));

        let heartbeat = HeartbeatSource::new(self.config.heartbeat_interval)
            .run(sender.clone(), cancellation_token.clone());

        EngineHandle {
            reporter: SnapshotReporter { events: sender },
            cancellation_token,
            shut_down: AtomicBool::new(false),
            aggregator,
            heartbeat,
        }
    }
}

impl SnapshotReporter {
    /// Queues a quote for the aggregation loop. Never blocks. Returns `false` once the
    /// engine has stopped, in which case the quote is dropped.
    pub fn report_snapshot(
        &self,
        exchange: Exchange,
        symbol: &str,
        bid: Price,
        ask: Price,
    ) -> bool {
        self.report(QuoteUpdate {
            exchange,
            symbol: symbol.to_string(),
            bid,
            ask,
        })
    }

    pub fn report(&self, update: QuoteUpdate) -> bool {
        match self.events.send(Event::SnapshotUpdate(update)) {
            Ok(()) => true,
            Err(e) => {
                trace!("Engine stopped, dropping {:?}", e.0);
                false
            }
        }
    }

    /// Forces a heartbeat report ahead of the next scheduled one.
    pub fn request_heartbeat(&self) -> bool {
        self.events.send(Event::Heartbeat).is_ok()
    }

    /// A feed adapter callback which forwards every quote into the engine.
    pub fn callback(&self) -> UpdateCallback {
        let reporter = self.clone();
        Arc::new(move |update: QuoteUpdate| {
            reporter.report(update);
        })
    }
}

impl EngineHandle {
    pub fn reporter(&self) -> SnapshotReporter {
        self.reporter.clone()
    }

    pub fn report_snapshot(
        &self,
        exchange: Exchange,
        symbol: &str,
        bid: Price,
        ask: Price,
    ) -> bool {
        self.reporter.report_snapshot(exchange, symbol, bid, ask)
    }

    /// Stops the heartbeat source and the aggregation loop, discarding queued events.
    /// Returns `false` if the engine was already shut down.
    pub fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!("Engine stopping");
        self.cancellation_token.cancel();
        true
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst) || self.cancellation_token.is_cancelled()
    }

    /// Waits for both tasks to finish, returning the final snapshot store.
    pub async fn join(self) -> Option<SnapshotStore> {
        if let Err(e) = self.heartbeat.await {
            error!("Heartbeat task failed: {e}");
        }
        match self.aggregator.await {
            Ok(store) => Some(store),
            Err(e) => {
                error!("Aggregator task failed: {e}");
                None
            }
        }
    }
}
