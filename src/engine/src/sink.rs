use std::fmt::{Display, Formatter};
use tracing::info;
use xa_types::{Exchange, Opportunity, Price};

/// Receives every qualifying opportunity. Called synchronously from the aggregation loop,
/// so a slow sink delays all further event processing.
pub trait OpportunitySink: Send {
    fn on_opportunity(&mut self, opportunity: &Opportunity) -> anyhow::Result<()>;
}

/// Receives the status dump produced on every heartbeat. Same threading as [`OpportunitySink`].
pub trait HeartbeatSink: Send {
    fn on_heartbeat(&mut self, report: &HeartbeatReport) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatReport {
    NoData,
    Quotes(Vec<QuoteLine>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteLine {
    pub symbol: String,
    pub exchange: Exchange,
    pub bid: Price,
    pub ask: Price,
}

impl Display for QuoteLine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}: bid {} ask {}",
            self.symbol, self.exchange, self.bid, self.ask
        )
    }
}

/// Writes opportunities and heartbeats to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl OpportunitySink for LogSink {
    fn on_opportunity(&mut self, opportunity: &Opportunity) -> anyhow::Result<()> {
        info!("Found arb: {opportunity}");
        Ok(())
    }
}

impl HeartbeatSink for LogSink {
    fn on_heartbeat(&mut self, report: &HeartbeatReport) -> anyhow::Result<()> {
        match report {
            HeartbeatReport::NoData => info!("Heartbeat: no data yet"),
            HeartbeatReport::Quotes(lines) => {
                for line in lines {
                    info!("Heartbeat: {line}");
                }
            }
        }
        Ok(())
    }
}
