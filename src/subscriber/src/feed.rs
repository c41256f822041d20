use std::sync::Arc;
use tokio::select;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use xa_types::connection::transition;
use xa_types::{
    ConnectionEvent, ConnectionState, Exchange, FeedAdapter, FixedDelay, QuoteUpdate,
    ReconnectPolicy, SessionContext, UpdateCallback, VenueConnector,
};

/// Keeps a [`VenueConnector`] connected, reconnecting according to a [`ReconnectPolicy`].
pub struct ReconnectingFeed<C: VenueConnector> {
    exchange: Exchange,
    symbol: String,
    connector: Option<C>,
    policy: Arc<dyn ReconnectPolicy>,
    callback: Option<UpdateCallback>,
    state: Arc<watch::Sender<ConnectionState>>,
    cancellation_token: CancellationToken,
    task: Option<JoinHandle<()>>,
    stopped: bool,
}

impl<C: VenueConnector> ReconnectingFeed<C> {
    /// `symbol` is the canonical symbol quotes are reported under.
    pub fn new(connector: C, symbol: &str) -> ReconnectingFeed<C> {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        ReconnectingFeed {
            exchange: connector.exchange(),
            symbol: symbol.to_string(),
            connector: Some(connector),
            policy: Arc::new(FixedDelay::default()),
            callback: None,
            state: Arc::new(state),
            cancellation_token: CancellationToken::new(),
            task: None,
            stopped: false,
        }
    }

    pub fn with_reconnect_policy(mut self, policy: Arc<dyn ReconnectPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl<C: VenueConnector> FeedAdapter for ReconnectingFeed<C> {
    fn exchange(&self) -> Exchange {
        self.exchange
    }

    fn on_update(&mut self, callback: UpdateCallback) {
        if self.connector.is_none() {
            warn!("{}: Feed already started, ignoring new callback", self.exchange);
            return;
        }
        self.callback = Some(callback);
    }

    fn start(&mut self) {
        if self.stopped {
            warn!("{}: Feed stopped, not starting", self.exchange);
            return;
        }
        let Some(connector) = self.connector.take() else {
            return;
        };

        let callback: UpdateCallback = match &self.callback {
            Some(callback) => callback.clone(),
            None => {
                warn!("{}: No update callback registered, quotes will be dropped", self.exchange);
                Arc::new(|_: QuoteUpdate| {})
            }
        };

        self.task = Some(tokio::spawn(run_async(
            connector,
            self.symbol.clone(),
            callback,
            self.policy.clone(),
            self.state.clone(),
            self.cancellation_token.clone(),
        )));
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        info!("{}: Stopping feed", self.exchange);
        if let Err(e) = transition(&self.state, ConnectionEvent::Stop) {
            warn!("{}: {e}", self.exchange);
        }
        self.cancellation_token.cancel();
    }

    fn take_task(&mut self) -> Option<JoinHandle<()>> {
        self.task.take()
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }
}

async fn run_async<C: VenueConnector>(
    mut connector: C,
    symbol: String,
    callback: UpdateCallback,
    policy: Arc<dyn ReconnectPolicy>,
    state: Arc<watch::Sender<ConnectionState>>,
    cancellation_token: CancellationToken,
) {
    let exchange = connector.exchange();
    let mut failures = 0u32;

    loop {
        if transition(&state, ConnectionEvent::Connect).is_err() {
            break;
        }
        info!("{exchange}: Connecting");

        let context = SessionContext::new(exchange, &symbol, callback.clone(), state.clone());
        let result = connector
            .run_session(context, cancellation_token.clone())
            .await;

        if cancellation_token.is_cancelled() {
            break;
        }

        let was_connected = state.borrow().is_connected();
        if transition(&state, ConnectionEvent::Lost).is_err() {
            break;
        }
        match result {
            Ok(()) => warn!("{exchange}: Connection closed"),
            Err(e) => warn!("{e}"),
        }

        failures = if was_connected {
            1
        } else {
            failures.saturating_add(1)
        };

        let Some(delay) = policy.next_delay(failures) else {
            error!("{exchange}: Giving up after {failures} failed attempts");
            return;
        };

        info!("{exchange}: Reconnecting in {delay:?}");
        select! {
            _ = sleep(delay) => (),
            _ = cancellation_token.cancelled() => break,
        }
    }

    info!("{exchange} feed stopped");
}
