use crate::connection::{transition, ConnectionEvent, ConnectionState};
use crate::{Exchange, Price, QuoteUpdate};
use async_trait::async_trait;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub type UpdateCallback = Arc<dyn Fn(QuoteUpdate) + Send + Sync>;

/// A live connection to one venue which normalizes its quotes and keeps itself connected.
pub trait FeedAdapter: Send {
    fn exchange(&self) -> Exchange;

    /// Registers the callback invoked for every normalized quote, replacing any previous one.
    /// Invoked on the adapter's own task.
    fn on_update(&mut self, callback: UpdateCallback);

    /// Begins connecting in the background. Must be called from within a tokio runtime.
    fn start(&mut self);

    /// Closes the connection and halts reconnection. Calling it again has no effect.
    fn stop(&mut self);

    fn state(&self) -> ConnectionState;

    /// Hands over the background task spawned by `start`, so the caller can wait for the
    /// connection to finish closing after `stop`.
    fn take_task(&mut self) -> Option<JoinHandle<()>>;
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{exchange}: connection failed: {reason}")]
    Connect { exchange: Exchange, reason: String },
    #[error("{exchange}: connection lost: {reason}")]
    Closed { exchange: Exchange, reason: String },
}

/// A single connection session against one venue. Reconnecting is left to the caller.
#[async_trait]
pub trait VenueConnector: Send + 'static {
    fn exchange(&self) -> Exchange;

    /// Runs until the connection ends or `cancellation_token` fires. `Ok` means the session
    /// was closed on purpose.
    async fn run_session(
        &mut self,
        context: SessionContext,
        cancellation_token: CancellationToken,
    ) -> Result<(), SessionError>;
}

/// Handed to a connector for the duration of one session.
#[derive(Clone)]
pub struct SessionContext {
    exchange: Exchange,
    symbol: Arc<str>,
    callback: UpdateCallback,
    state: Arc<watch::Sender<ConnectionState>>,
}

impl SessionContext {
    pub fn new(
        exchange: Exchange,
        symbol: &str,
        callback: UpdateCallback,
        state: Arc<watch::Sender<ConnectionState>>,
    ) -> SessionContext {
        SessionContext {
            exchange,
            symbol: symbol.into(),
            callback,
            state,
        }
    }

    pub fn exchange(&self) -> Exchange {
        self.exchange
    }

    /// The canonical symbol quotes are reported under.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn mark_connected(&self) {
        if let Err(e) = transition(&self.state, ConnectionEvent::Established) {
            warn!("{}: {e}", self.exchange);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    /// Converts the way a connection ended into the error reported to the supervisor.
    pub fn ended<E: Display>(&self, result: Result<(), E>) -> SessionError {
        let reason = match result {
            Ok(()) => "closed".to_string(),
            Err(e) => e.to_string(),
        };
        if self.is_connected() {
            SessionError::Closed {
                exchange: self.exchange,
                reason,
            }
        } else {
            SessionError::Connect {
                exchange: self.exchange,
                reason,
            }
        }
    }

    pub fn publish(&self, bid: Price, ask: Price) {
        (self.callback)(QuoteUpdate {
            exchange: self.exchange,
            symbol: self.symbol.to_string(),
            bid,
            ask,
        });
    }
}
