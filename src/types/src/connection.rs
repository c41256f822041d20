use std::fmt::{Display, Formatter};
use std::time::Duration;
use tokio::sync::watch;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal. Only reached through an explicit stop.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connect,
    Established,
    Lost,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition: {event:?} while {state}")]
pub struct InvalidTransition {
    pub state: ConnectionState,
    pub event: ConnectionEvent,
}

impl ConnectionState {
    pub fn on(self, event: ConnectionEvent) -> Result<ConnectionState, InvalidTransition> {
        use ConnectionEvent::*;
        use ConnectionState::*;

        match (self, event) {
            (Stopped, Stop) => Ok(Stopped),
            (Stopped, _) => Err(InvalidTransition { state: self, event }),
            (_, Stop) => Ok(Stopped),
            (Disconnected, Connect) => Ok(Connecting),
            (Connecting, Established) => Ok(Connected),
            (Connecting | Connected, Lost) => Ok(Disconnected),
            _ => Err(InvalidTransition { state: self, event }),
        }
    }

    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Applies `event` to the state held by `state`, notifying any watchers on success.
pub fn transition(
    state: &watch::Sender<ConnectionState>,
    event: ConnectionEvent,
) -> Result<ConnectionState, InvalidTransition> {
    let mut result = Ok(*state.borrow());
    state.send_if_modified(|current| match current.on(event) {
        Ok(next) => {
            let changed = next != *current;
            *current = next;
            result = Ok(next);
            changed
        }
        Err(e) => {
            result = Err(e);
            false
        }
    });
    result
}

/// Decides how long a feed waits before reconnecting.
pub trait ReconnectPolicy: Send + Sync {
    /// `failures` counts consecutive sessions that ended since the last successful
    /// connection, starting at 1. Returning `None` gives up.
    fn next_delay(&self, failures: u32) -> Option<Duration>;
}

/// Retries forever with the same delay.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> FixedDelay {
        FixedDelay { delay }
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        FixedDelay::new(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectPolicy for FixedDelay {
    fn next_delay(&self, _failures: u32) -> Option<Duration> {
        Some(self.delay)
    }
}

/// Doubles the delay after every consecutive failure, capped at `max`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy for ExponentialBackoff {
    fn next_delay(&self, failures: u32) -> Option<Duration> {
        if let Some(max_attempts) = self.max_attempts {
            if failures > max_attempts {
                return None;
            }
        }

        let exponent = failures.saturating_sub(1).min(31);
        let delay = self.initial.saturating_mul(1u32 << exponent);
        Some(delay.min(self.max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::ConnectionEvent::*;
    use super::ConnectionState::*;
    use test_case::test_case;

    #[test_case(Disconnected, Connect, Connecting)]
    #[test_case(Connecting, Established, Connected)]
    #[test_case(Connecting, Lost, Disconnected; "connect failure")]
    #[test_case(Connected, Lost, Disconnected; "unexpected close")]
    #[test_case(Connected, Stop, Stopped)]
    #[test_case(Disconnected, Stop, Stopped)]
    #[test_case(Stopped, Stop, Stopped; "stop is idempotent")]
    fn valid_transitions(from: ConnectionState, event: ConnectionEvent, to: ConnectionState) {
        assert_eq!(from.on(event), Ok(to));
    }

    #[test_case(Disconnected, Established)]
    #[test_case(Connected, Connect)]
    #[test_case(Disconnected, Lost)]
    #[test_case(Stopped, Connect; "no restart after stop")]
    fn invalid_transitions(from: ConnectionState, event: ConnectionEvent) {
        assert_eq!(
            from.on(event),
            Err(InvalidTransition { state: from, event })
        );
    }

    #[test]
    fn transition_updates_watchers() {
        let (tx, rx) = watch::channel(Disconnected);
        assert_eq!(transition(&tx, Connect), Ok(Connecting));
        assert_eq!(*rx.borrow(), Connecting);
        assert!(transition(&tx, Connect).is_err());
        assert_eq!(*rx.borrow(), Connecting);
    }

    #[test]
    fn fixed_delay_retries_forever() {
        let policy = FixedDelay::default();
        for failures in [1, 2, 100, u32::MAX] {
            assert_eq!(policy.next_delay(failures), Some(Duration::from_secs(5)));
        }
    }

    #[test_case(1, Some(1))]
    #[test_case(2, Some(2))]
    #[test_case(4, Some(8))]
    #[test_case(6, Some(30); "capped")]
    #[test_case(10, Some(30))]
    #[test_case(11, None; "gives up")]
    fn exponential_backoff(failures: u32, expected_secs: Option<u64>) {
        let policy = ExponentialBackoff {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            max_attempts: Some(10),
        };
        assert_eq!(
            policy.next_delay(failures),
            expected_secs.map(Duration::from_secs)
        );
    }
}
