use std::time::Duration;
use tokio::select;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use xa_types::Event;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Injects a [`Event::Heartbeat`] every `interval`, the first one `interval` after start.
pub struct HeartbeatSource {
    interval: Duration,
}

impl HeartbeatSource {
    pub fn new(interval: Duration) -> HeartbeatSource {
        HeartbeatSource { interval }
    }

    pub fn run(
        self,
        events: UnboundedSender<Event>,
        cancellation_token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run_async(events, cancellation_token))
    }

    async fn run_async(
        self,
        events: UnboundedSender<Event>,
        cancellation_token: CancellationToken,
    ) {
        if self.interval.is_zero() {
            warn!("Heartbeat interval is zero, heartbeats disabled");
            return;
        }

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                biased;
                _ = cancellation_token.cancelled() => break,
                _ = ticker.tick() => {
                    if events.send(Event::Heartbeat).is_err() {
                        break;
                    }
                }
            }
        }

        debug!("Heartbeat stopped");
    }
}
