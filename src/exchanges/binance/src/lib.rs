mod subscriber;

pub use subscriber::BinanceSubscriber;

pub const DEFAULT_SYMBOL: &str = "BTCUSDT";
