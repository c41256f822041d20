use async_trait::async_trait;
use ezsockets::client::ClientCloseMode;
use ezsockets::{ClientConfig, ClientExt, CloseFrame, Error, WSError};
use serde::Deserialize;
use std::str::FromStr;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};
use xa_types::{Exchange, Price, PriceError, SessionContext, SessionError, VenueConnector};

const URL: &str = "wss://stream.binance.com:9443/ws/";

/// Streams best bid/ask for one symbol from the `bookTicker` channel.
pub struct BinanceSubscriber {
    symbol: String,
}

impl BinanceSubscriber {
    /// `symbol` as Binance spells it, e.g. `BTCUSDT`.
    pub fn new(symbol: &str) -> BinanceSubscriber {
        BinanceSubscriber {
            symbol: symbol.to_uppercase(),
        }
    }

    fn url(&self) -> String {
        format!("{URL}{}@bookTicker", self.symbol.to_lowercase())
    }
}

struct WebSocketClient {
    symbol: String,
    context: SessionContext,
}

#[async_trait]
impl ClientExt for WebSocketClient {
    type Call = ();

    async fn on_text(&mut self, text: String) -> Result<(), Error> {
        trace!("Binance: Received text: {text}");

        match parse_book_ticker(&text) {
            Ok(ticker) if ticker.symbol == self.symbol => {
                self.context.publish(ticker.bid, ticker.ask);
            }
            Ok(ticker) => trace!("Binance: Ignoring ticker for {}", ticker.symbol),
            Err(e) => warn!("Binance: Dropping message: {e}. Message: {text}"),
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
        info!("Binance: Connected");
        self.context.mark_connected();
        Ok(())
    }

    async fn on_connect_fail(&mut self, error: WSError) -> Result<ClientCloseMode, Error> {
        error!("Binance: Failed to connect: {error:?}");
        Ok(ClientCloseMode::Close)
    }

    async fn on_close(&mut self, frame: Option<CloseFrame>) -> Result<ClientCloseMode, Error> {
        info!("Binance: Closed by server: {frame:?}");
        Ok(ClientCloseMode::Close)
    }

    async fn on_disconnect(&mut self) -> Result<ClientCloseMode, Error> {
        info!("Binance: Disconnected");
        Ok(ClientCloseMode::Close)
    }
}

#[async_trait]
impl VenueConnector for BinanceSubscriber {
    fn exchange(&self) -> Exchange {
        Exchange::Binance
    }

    async fn run_session(
        &mut self,
        context: SessionContext,
        cancellation_token: CancellationToken,
    ) -> Result<(), SessionError> {
        let url = self.url();
        let symbol = self.symbol.clone();
        let session = context.clone();

        let (handle, future) = ezsockets::connect(
            |_| WebSocketClient { symbol, context },
            ClientConfig::new(url.as_str()),
        )
        .await;

        select! {
            result = future => Err(session.ended(result)),
            _ = cancellation_token.cancelled() => {
                if let Err(e) = handle.close(None) {
                    warn!("Binance: Failed to close connection: {e:?}");
                }
                info!("Binance disconnected");
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
struct Ticker {
    symbol: String,
    bid: Price,
    ask: Price,
}

#[derive(Deserialize)]
struct BookTicker {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "b")]
    bid: String,
    #[serde(rename = "a")]
    ask: String,
}

fn parse_book_ticker(text: &str) -> Result<Ticker, ParseError> {
    let message: BookTicker = serde_json::from_str(text)?;
    Ok(Ticker {
        symbol: message.symbol,
        bid: Price::from_str(&message.bid)?,
        ask: Price::from_str(&message.ask)?,
    })
}
