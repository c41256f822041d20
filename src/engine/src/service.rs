use crate::{EngineHandle, SnapshotStore};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{error, info};
use xa_types::{ConnectionState, Exchange, FeedAdapter};

/// Ties feed adapters to a running engine and shuts everything down together.
pub struct Service {
    engine: EngineHandle,
    adapters: Vec<Box<dyn FeedAdapter>>,
    started: bool,
    shut_down: bool,
}

impl Service {
    pub fn new(engine: EngineHandle) -> Service {
        Service {
            engine,
            adapters: Vec::new(),
            started: false,
            shut_down: false,
        }
    }

    /// Routes the adapter's quotes into the engine. Adapters added after [`Service::start`]
    /// are started immediately, unless the service has been shut down.
    pub fn add_feed(&mut self, mut adapter: Box<dyn FeedAdapter>) {
        if self.shut_down {
            info!("Service stopped, ignoring {} feed", adapter.exchange());
            return;
        }

        adapter.on_update(self.engine.reporter().callback());
        if self.started {
            adapter.start();
        }
        self.adapters.push(adapter);
    }

    pub fn start(&mut self) {
        if self.started || self.shut_down {
            return;
        }
        self.started = true;

        for adapter in &mut self.adapters {
            info!("Starting {} feed", adapter.exchange());
            adapter.start();
        }
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn feed_states(&self) -> Vec<(Exchange, ConnectionState)> {
        self.adapters
            .iter()
            .map(|a| (a.exchange(), a.state()))
            .collect()
    }

    /// Stops every feed, then the engine. A feed that fails to stop is logged and does not
    /// prevent the others from stopping. Returns `false` if already shut down.
    pub fn shutdown(&mut self) -> bool {
        if self.shut_down {
            return false;
        }
        self.shut_down = true;

        info!("Service stopping");
        for adapter in &mut self.adapters {
            let exchange = adapter.exchange();
            if catch_unwind(AssertUnwindSafe(|| adapter.stop())).is_err() {
                error!("Failed to stop {exchange} feed");
            }
        }
        self.engine.shutdown();
        true
    }

    /// Waits for every feed to finish closing, then for the engine. Call after
    /// [`Service::shutdown`].
    pub async fn join(self) -> Option<SnapshotStore> {
        for mut adapter in self.adapters {
            let exchange = adapter.exchange();
            if let Some(task) = adapter.take_task() {
                if let Err(e) = task.await {
                    error!("{exchange} feed task failed: {e}");
                }
            }
        }
        let store = self.engine.join().await;
        info!("Service stopped");
        store
    }
}
