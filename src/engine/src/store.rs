use crate::sink::{HeartbeatReport, QuoteLine};
use std::collections::BTreeMap;
use xa_types::{Exchange, QuoteUpdate, Snapshot};

/// Latest snapshot per symbol per exchange. Owned by the aggregation loop, never shared.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    symbols: BTreeMap<String, BTreeMap<Exchange, Snapshot>>,
}

impl SnapshotStore {
    pub fn new() -> SnapshotStore {
        SnapshotStore::default()
    }

    /// Overwrites the snapshot for the update's symbol and exchange, returning every
    /// exchange's snapshot for that symbol.
    pub fn apply(&mut self, update: &QuoteUpdate) -> &BTreeMap<Exchange, Snapshot> {
        let exchanges = self.symbols.entry(update.symbol.clone()).or_default();
        exchanges.insert(update.exchange, update.snapshot());
        exchanges
    }

    pub fn get(&self, symbol: &str, exchange: Exchange) -> Option<Snapshot> {
        self.symbols.get(symbol)?.get(&exchange).copied()
    }

    pub fn exchanges(&self, symbol: &str) -> Option<&BTreeMap<Exchange, Snapshot>> {
        self.symbols.get(symbol)
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn report(&self) -> HeartbeatReport {
        if self.is_empty() {
            return HeartbeatReport::NoData;
        }

        HeartbeatReport::Quotes(
            self.symbols
                .iter()
                .flat_map(|(symbol, exchanges)| {
                    exchanges.iter().map(move |(&exchange, snapshot)| QuoteLine {
                        symbol: symbol.clone(),
                        exchange,
                        bid: snapshot.bid,
                        ask: snapshot.ask,
                    })
                })
                .collect(),
        )
    }
}
