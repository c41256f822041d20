use crate::sink::{HeartbeatSink, OpportunitySink};
use crate::store::SnapshotStore;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::select;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};
use xa_arb_finder::ArbFinder;
use xa_types::{Event, Opportunity, QuoteUpdate};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorStats {
    pub updates: u64,
    pub heartbeats: u64,
    /// Updates for which at least two exchanges had a snapshot and the detector ran.
    pub checks: u64,
    /// Opportunities the sink accepted.
    pub opportunities: u64,
    /// Events whose processing failed or panicked.
    pub failures: u64,
}

/// The single consumer of the event queue and sole owner of the snapshot store.
pub struct Aggregator {
    store: SnapshotStore,
    finder: ArbFinder,
    opportunity_sink: Box<dyn OpportunitySink>,
    heartbeat_sink: Box<dyn HeartbeatSink>,
    stats: AggregatorStats,
}

impl Aggregator {
    pub fn new(
        finder: ArbFinder,
        opportunity_sink: Box<dyn OpportunitySink>,
        heartbeat_sink: Box<dyn HeartbeatSink>,
    ) -> Aggregator {
        Aggregator {
            store: SnapshotStore::new(),
            finder,
            opportunity_sink,
            heartbeat_sink,
            stats: AggregatorStats::default(),
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn stats(&self) -> AggregatorStats {
        self.stats
    }

    /// Consumes events until cancelled or until every producer is gone. Events still queued
    /// at cancellation are discarded.
    pub async fn run_async(
        mut self,
        mut events: UnboundedReceiver<Event>,
        cancellation_token: CancellationToken,
    ) -> SnapshotStore {
        info!("Aggregator started");

        loop {
            select! {
                biased;
                _ = cancellation_token.cancelled() => break,
                next = events.recv() => match next {
                    Some(event) => self.process(event),
                    None => break,
                },
            }
        }

        events.close();
        info!(
            "Aggregator stopped. Updates: {}. Checks: {}. Opportunities: {}. Failures: {}",
            self.stats.updates, self.stats.checks, self.stats.opportunities, self.stats.failures
        );
        self.store
    }

    /// Handles one event. A failure or panic while handling it is logged and contained.
    pub fn process(&mut self, event: Event) {
        let result = catch_unwind(AssertUnwindSafe(|| self.handle(event)));

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.stats.failures += 1;
                error!("Aggregator: failed to process event: {e:#}");
            }
            Err(panic) => {
                self.stats.failures += 1;
                error!(
                    "Aggregator: panicked while processing event: {}",
                    panic_message(panic.as_ref())
                );
            }
        }
    }

    fn handle(&mut self, event: Event) -> anyhow::Result<()> {
        match event {
            Event::SnapshotUpdate(update) => self.on_update(update),
            Event::Heartbeat => self.on_heartbeat(),
        }
    }

    fn on_update(&mut self, update: QuoteUpdate) -> anyhow::Result<()> {
        self.stats.updates += 1;
        trace!("Aggregator: {update:?}");

        let snapshots = self.store.apply(&update);
        if snapshots.len() < 2 {
            debug!(
                "Aggregator: {} has no counterpart for {} yet",
                update.exchange, update.symbol
            );
            return Ok(());
        }

        self.stats.checks += 1;
        let opportunities = self.finder.find_for_update(&update.symbol, snapshots, update.exchange);

        // Every opportunity is offered to the sink even if an earlier one failed
        let mut first_error = None;
        for opportunity in opportunities {
            if let Err(e) = self.notify_arb(&opportunity) {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn notify_arb(&mut self, opportunity: &Opportunity) -> anyhow::Result<()> {
        self.opportunity_sink.on_opportunity(opportunity)?;
        self.stats.opportunities += 1;
        Ok(())
    }

    fn on_heartbeat(&mut self) -> anyhow::Result<()> {
        self.stats.heartbeats += 1;
        let report = self.store.report();
        self.heartbeat_sink.on_heartbeat(&report)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
