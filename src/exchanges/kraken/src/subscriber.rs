use crate::serialize_to_json;
use async_trait::async_trait;
use ezsockets::client::ClientCloseMode;
use ezsockets::{ClientConfig, ClientExt, CloseFrame, Error, MessageSignal, WSError};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::str::FromStr;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use xa_types::{Exchange, Price, PriceError, SessionContext, SessionError, VenueConnector};

const URL: &str = "wss://ws.kraken.com/v2";

/// Streams best bid/ask for one pair from the v2 `ticker` channel.
pub struct KrakenSubscriber {
    symbol: String,
}

impl KrakenSubscriber {
    /// `symbol` as Kraken spells it, e.g. `BTC/USD`.
    pub fn new(symbol: &str) -> KrakenSubscriber {
        KrakenSubscriber {
            symbol: symbol.to_string(),
        }
    }
}

struct WebSocketClient {
    handle: ezsockets::Client<Self>,
    symbol: String,
    context: SessionContext,
}

impl WebSocketClient {
    fn send<S: Serialize>(&mut self, value: &S) -> Result<MessageSignal, Error> {
        let json = serialize_to_json(value)?;
        trace!("Kraken: Sending message: {json}");
        self.handle.text(json).map_err(|e| e.into())
    }

    fn subscribe(&mut self) -> Result<MessageSignal, Error> {
        let request = Request {
            method: "subscribe",
            params: SubscribeParams {
                channel: "ticker",
                symbol: vec![self.symbol.clone()],
            },
        };
        self.send(&request)
    }

    fn on_message(&self, text: &str) -> Result<(), ParseError> {
        match parse_message(text)? {
            Message::Tickers(tickers) => {
                for ticker in tickers {
                    if ticker.symbol == self.symbol {
                        self.context.publish(ticker.bid, ticker.ask);
                    } else {
                        trace!("Kraken: Ignoring ticker for {}", ticker.symbol);
                    }
                }
            }
            Message::Subscribed { success: true, .. } => {
                info!("Kraken: Subscribed to ticker for {}", self.symbol);
            }
            Message::Subscribed { success: false, error } => {
                error!(
                    "Kraken: Subscription for {} rejected: {}",
                    self.symbol,
                    error.unwrap_or_default()
                );
            }
            Message::Other => {}
        }
        Ok(())
    }
}

#[async_trait]
impl ClientExt for WebSocketClient {
    type Call = ();

    async fn on_text(&mut self, text: String) -> Result<(), Error> {
        trace!("Kraken: Received text: {text}");

        if let Err(e) = self.on_message(&text) {
            warn!("Kraken: Dropping message: {e}. Message: {text}");
        }
        Ok(())
    }

    async fn on_binary(&mut self, _: Vec<u8>) -> Result<(), Error> {
        Ok(())
    }

    async fn on_call(&mut self, _: Self::Call) -> Result<(), Error> {
        Ok(())
    }

    async fn on_connect(&mut self) -> Result<(), Error> {
        info!("Kraken: Connected");
        self.context.mark_connected();
        self.subscribe()?;
        Ok(())
    }

    async fn on_connect_fail(&mut self, error: WSError) -> Result<ClientCloseMode, Error> {
        error!("Kraken: Failed to connect: {error:?}");
        Ok(ClientCloseMode::Close)
    }

    async fn on_close(&mut self, frame: Option<CloseFrame>) -> Result<ClientCloseMode, Error> {
        info!("Kraken: Closed by server: {frame:?}");
        Ok(ClientCloseMode::Close)
    }

    async fn on_disconnect(&mut self) -> Result<ClientCloseMode, Error> {
        info!("Kraken: Disconnected");
        Ok(ClientCloseMode::Close)
    }
}

#[async_trait]
impl VenueConnector for KrakenSubscriber {
    fn exchange(&self) -> Exchange {
        Exchange::Kraken
    }

    async fn run_session(
        &mut self,
        context: SessionContext,
        cancellation_token: CancellationToken,
    ) -> Result<(), SessionError> {
        let symbol = self.symbol.clone();
        let session = context.clone();

        let (handle, future) = ezsockets::connect(
            |handle| WebSocketClient {
                handle,
                symbol,
                context,
            },
            ClientConfig::new(URL),
        )
        .await;

        select! {
            result = future => Err(session.ended(result)),
            _ = cancellation_token.cancelled() => {
                if let Err(e) = handle.close(None) {
                    warn!("Kraken: Failed to close connection: {e:?}");
                }
                info!("Kraken disconnected");
                Ok(())
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum ParseError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Price(#[from] PriceError),
}

#[derive(Debug, PartialEq, Eq)]
enum Message {
    Tickers(Vec<Ticker>),
    Subscribed {
        success: bool,
        error: Option<String>,
    },
    Other,
}

#[derive(Debug, PartialEq, Eq)]
struct Ticker {
    symbol: String,
    bid: Price,
    ask: Price,
}

#[derive(Serialize)]
struct Request {
    method: &'static str,
    params: SubscribeParams,
}

#[derive(Serialize)]
struct SubscribeParams {
    channel: &'static str,
    symbol: Vec<String>,
}

#[derive(Deserialize)]
struct Envelope<'a> {
    channel: Option<String>,
    method: Option<String>,
    success: Option<bool>,
    error: Option<String>,
    #[serde(borrow)]
    data: Option<&'a RawValue>,
}

// Prices arrive as JSON numbers and are read from their raw text, never through f64
#[derive(Deserialize)]
struct TickerData<'a> {
    symbol: String,
    #[serde(borrow)]
    bid: &'a RawValue,
    #[serde(borrow)]
    ask: &'a RawValue,
}

fn parse_message(text: &str) -> Result<Message, ParseError> {
    let envelope: Envelope = serde_json::from_str(text)?;

    if envelope.method.as_deref() == Some("subscribe") {
        return Ok(Message::Subscribed {
            success: envelope.success.unwrap_or(false),
            error: envelope.error,
        });
    }

    match (envelope.channel.as_deref(), envelope.data) {
        (Some("ticker"), Some(data)) => {
            let tickers: Vec<TickerData> = serde_json::from_str(data.get())?;
            let tickers = tickers
                .into_iter()
                .map(|t| -> Result<Ticker, ParseError> {
                    Ok(Ticker {
                        symbol: t.symbol,
                        bid: price_from_raw(t.bid)?,
                        ask: price_from_raw(t.ask)?,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Message::Tickers(tickers))
        }
        (channel, _) => {
            debug!("Kraken: Ignoring message on channel {channel:?}");
            Ok(Message::Other)
        }
    }
}

fn price_from_raw(raw: &RawValue) -> Result<Price, PriceError> {
    Price::from_str(raw.get().trim_matches('"'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn parses_ticker_with_numeric_prices() {
        let text = r#"{"channel":"ticker","type":"update","data":[{"symbol":"BTC/USD","bid":40020.1,"bid_qty":0.5,"ask":40020.2,"ask_qty":1.25,"last":40020.1,"volume":100.0,"vwap":40000.0,"low":39000.0,"high":41000.0,"change":10.0,"change_pct":0.02}]}"#;

        let message = parse_message(text).unwrap();

        assert_eq!(
            message,
            Message::Tickers(vec![Ticker {
                symbol: "BTC/USD".to_string(),
                bid: Price::from_units(4_002_010_000_000),
                ask: Price::from_units(4_002_020_000_000),
            }])
        );
    }

    #[test]
    fn keeps_digits_a_float_would_lose() {
        let text = r#"{"channel":"ticker","type":"snapshot","data":[{"symbol":"BTC/USD","bid":0.30000001,"ask":"90071992.54740993"}]}"#;

        let Message::Tickers(tickers) = parse_message(text).unwrap() else {
            panic!("expected tickers");
        };

        assert_eq!(tickers[0].bid, Price::from_units(30_000_001));
        assert_eq!(tickers[0].ask, Price::from_units(9_007_199_254_740_993));
    }

    #[test_case(r#"{"method":"subscribe","result":{"channel":"ticker","symbol":"BTC/USD"},"success":true}"#, true; "accepted")]
    #[test_case(r#"{"method":"subscribe","error":"Currency pair not supported","success":false}"#, false; "rejected")]
    fn parses_subscription_ack(text: &str, expected: bool) {
        let Message::Subscribed { success, .. } = parse_message(text).unwrap() else {
            panic!("expected subscription ack");
        };
        assert_eq!(success, expected);
    }

    #[test_case(r#"{"channel":"heartbeat"}"#; "heartbeat")]
    #[test_case(r#"{"channel":"status","type":"update","data":[{"system":"online","version":"2.0.0"}]}"#; "status")]
    fn ignores_other_channels(text: &str) {
        assert_eq!(parse_message(text).unwrap(), Message::Other);
    }

    #[test_case(r#"[1,2,3]"#; "not an object")]
    #[test_case(r#"{"channel":"ticker","data":[{"symbol":"BTC/USD","bid":"x","ask":1}]}"#; "bad price")]
    #[test_case(r#"{"channel":"ticker","data":[{"symbol":"BTC/USD","bid":1}]}"#; "missing ask")]
    #[test_case(r#"{"channel":"ticker","data":[{"symbol":"BTC/USD","bid":1.000000001,"ask":2}]}"#; "too precise")]
    fn rejects_malformed(text: &str) {
        assert!(parse_message(text).is_err());
    }

    #[test]
    fn subscribe_request_format() {
        let request = Request {
            method: "subscribe",
            params: SubscribeParams {
                channel: "ticker",
                symbol: vec!["BTC/USD".to_string()],
            },
        };

        assert_eq!(
            serialize_to_json(&request).unwrap(),
            r#"{"method":"subscribe","params":{"channel":"ticker","symbol":["BTC/USD"]}}"#
        );
    }
}
