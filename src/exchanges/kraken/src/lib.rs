use serde::Serialize;

mod subscriber;

pub use subscriber::KrakenSubscriber;

pub const DEFAULT_SYMBOL: &str = "BTC/USD";

fn serialize_to_json<S: Serialize>(value: &S) -> Result<String, serde_json::Error> {
    serde_json::to_string(value)
}
