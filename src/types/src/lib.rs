use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub mod connection;
mod feed;
mod price;

pub use connection::{
    ConnectionEvent, ConnectionState, ExponentialBackoff, FixedDelay, InvalidTransition,
    ReconnectPolicy,
};
pub use feed::{FeedAdapter, SessionContext, SessionError, UpdateCallback, VenueConnector};
pub use price::{FeeRate, Price, PriceError, SCALE};

#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub enum Exchange {
    Binance,
    Kraken,
}

impl Exchange {
    pub const ALL: [Exchange; 2] = [Exchange::Binance, Exchange::Kraken];

    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::Binance => "binance",
            Exchange::Kraken => "kraken",
        }
    }
}

impl Display for Exchange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown exchange '{0}'")]
pub struct UnknownExchange(pub String);

impl FromStr for Exchange {
    type Err = UnknownExchange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binance" => Ok(Exchange::Binance),
            "kraken" => Ok(Exchange::Kraken),
            _ => Err(UnknownExchange(s.to_string())),
        }
    }
}

/// Latest known best bid/ask for one symbol on one exchange. `ask >= bid` is not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub bid: Price,
    pub ask: Price,
}

/// A normalized top-of-book quote as produced by a feed adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteUpdate {
    pub exchange: Exchange,
    pub symbol: String,
    pub bid: Price,
    pub ask: Price,
}

impl QuoteUpdate {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            bid: self.bid,
            ask: self.ask,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    SnapshotUpdate(QuoteUpdate),
    Heartbeat,
}

/// A fee-adjusted, cross-exchange price discrepancy that clears the minimum profit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opportunity {
    pub symbol: String,
    pub buy_exchange: Exchange,
    pub sell_exchange: Exchange,
    /// Ask paid on `buy_exchange`.
    pub buy_price: Price,
    /// Bid received on `sell_exchange`.
    pub sell_price: Price,
    /// `buy_price` plus fees.
    pub cost: Price,
    /// `sell_price` less fees.
    pub proceeds: Price,
    pub profit: Price,
}

impl Display for Opportunity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: buy {} @ {} / sell {} @ {} (cost {}, proceeds {}, profit {})",
            self.symbol,
            self.buy_exchange,
            self.buy_price,
            self.sell_exchange,
            self.sell_price,
            self.cost,
            self.proceeds,
            self.profit
        )
    }
}
