use std::collections::{BTreeMap, HashMap};
use xa_types::{Exchange, FeeRate, Opportunity, Price, Snapshot, SCALE};

/// Taker fee per exchange. Exchanges without an entry trade fee-free.
#[derive(Debug, Clone, Default)]
pub struct FeeSchedule {
    rates: HashMap<Exchange, FeeRate>,
}

impl FeeSchedule {
    pub fn new() -> FeeSchedule {
        FeeSchedule::default()
    }

    pub fn with_fee(mut self, exchange: Exchange, rate: FeeRate) -> Self {
        self.rates.insert(exchange, rate);
        self
    }

    pub fn fee(&self, exchange: Exchange) -> FeeRate {
        self.rates.get(&exchange).copied().unwrap_or(FeeRate::ZERO)
    }
}

/// Compares snapshots across exchanges and reports trades that are profitable after fees.
///
/// All arithmetic is done on `i128` values scaled by `SCALE` twice (price units times fee
/// units), so nothing is rounded before the profit is compared with the threshold.
#[derive(Debug, Clone)]
pub struct ArbFinder {
    fees: FeeSchedule,
    min_profit: Price,
}

impl ArbFinder {
    pub fn new(fees: FeeSchedule, min_profit: Price) -> ArbFinder {
        ArbFinder { fees, min_profit }
    }

    pub fn min_profit(&self) -> Price {
        self.min_profit
    }

    /// Checks `latest_update` against every other exchange holding a snapshot for `symbol`.
    pub fn find_for_update(
        &self,
        symbol: &str,
        snapshots: &BTreeMap<Exchange, Snapshot>,
        latest_update: Exchange,
    ) -> Vec<Opportunity> {
        let mut found = Vec::new();
        if let Some(updated) = snapshots.get(&latest_update) {
            for (&exchange, existing) in snapshots.iter().filter(|(e, _)| **e != latest_update) {
                found.extend(self.find(
                    symbol,
                    (latest_update, updated),
                    (exchange, existing),
                ));
            }
        }
        found
    }

    /// Evaluates both directions between two exchanges independently.
    pub fn find(
        &self,
        symbol: &str,
        first: (Exchange, &Snapshot),
        second: (Exchange, &Snapshot),
    ) -> Vec<Opportunity> {
        [
            self.evaluate(symbol, first, second),
            self.evaluate(symbol, second, first),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn evaluate(
        &self,
        symbol: &str,
        (buy_exchange, buy): (Exchange, &Snapshot),
        (sell_exchange, sell): (Exchange, &Snapshot),
    ) -> Option<Opportunity> {
        let scale = i128::from(SCALE);
        let buy_fee = i128::from(self.fees.fee(buy_exchange).units());
        let sell_fee = i128::from(self.fees.fee(sell_exchange).units());

        let cost = i128::from(buy.ask.units()) * (scale + buy_fee);
        let proceeds = i128::from(sell.bid.units()) * (scale - sell_fee);
        let profit = proceeds - cost;

        if profit < i128::from(self.min_profit.units()) * scale {
            return None;
        }

        Some(Opportunity {
            symbol: symbol.to_string(),
            buy_exchange,
            sell_exchange,
            buy_price: buy.ask,
            sell_price: sell.bid,
            cost: descale(cost),
            proceeds: descale(proceeds),
            profit: descale(profit),
        })
    }
}

// Truncates toward zero, saturating at the bounds of `Price`.
fn descale(value: i128) -> Price {
    let units = value / i128::from(SCALE);
    Price::from_units(i64::try_from(units).unwrap_or(if units < 0 { i64::MIN } else { i64::MAX }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::{Decimal, RoundingStrategy};
    use std::str::FromStr;
    use test_case::test_case;

    fn fees(binance: &str, kraken: &str) -> FeeSchedule {
        FeeSchedule::new()
            .with_fee(Exchange::Binance, FeeRate::from_str(binance).unwrap())
            .with_fee(Exchange::Kraken, FeeRate::from_str(kraken).unwrap())
    }

    fn snapshot(bid: i64, ask: i64) -> Snapshot {
        Snapshot {
            bid: Price::from_units(bid),
            ask: Price::from_units(ask),
        }
    }

    fn reference_finder() -> ArbFinder {
        ArbFinder::new(fees("0.001", "0.002"), Price::from_units(100))
    }

    #[test]
    fn narrow_spread_is_eaten_by_fees() {
        let binance = snapshot(4_000_000_000_000, 4_000_100_000_000);
        let kraken = snapshot(4_002_000_000_000, 4_002_100_000_000);

        let found = reference_finder().find(
            "BTC-USD",
            (Exchange::Binance, &binance),
            (Exchange::Kraken, &kraken),
        );

        assert!(found.is_empty());
    }

    #[test]
    fn wide_spread_reports_exactly_one_direction() {
        let binance = snapshot(3_999_900_000_000, 4_000_000_000_000);
        let kraken = snapshot(4_020_000_000_000, 4_020_100_000_000);

        let found = reference_finder().find(
            "BTC-USD",
            (Exchange::Binance, &binance),
            (Exchange::Kraken, &kraken),
        );

        assert_eq!(
            found,
            vec![Opportunity {
                symbol: "BTC-USD".to_string(),
                buy_exchange: Exchange::Binance,
                sell_exchange: Exchange::Kraken,
                buy_price: Price::from_units(4_000_000_000_000),
                sell_price: Price::from_units(4_020_000_000_000),
                cost: Price::from_units(4_004_000_000_000),
                proceeds: Price::from_units(4_011_960_000_000),
                profit: Price::from_units(7_960_000_000),
            }]
        );
    }

    #[test]
    fn argument_order_does_not_change_the_result() {
        let binance = snapshot(3_999_900_000_000, 4_000_000_000_000);
        let kraken = snapshot(4_020_000_000_000, 4_020_100_000_000);
        let finder = reference_finder();

        let forward = finder.find(
            "BTC-USD",
            (Exchange::Binance, &binance),
            (Exchange::Kraken, &kraken),
        );
        let reverse = finder.find(
            "BTC-USD",
            (Exchange::Kraken, &kraken),
            (Exchange::Binance, &binance),
        );

        assert_eq!(forward, reverse);
    }

    // Binance fee 0.001 makes a 1000.0 ask cost exactly 1001.0
    #[test_case(100_100_000_100, true; "profit equal to threshold")]
    #[test_case(100_100_000_099, false; "one unit below threshold")]
    #[test_case(100_100_000_101, true; "one unit above threshold")]
    fn threshold_is_inclusive(kraken_bid: i64, expected: bool) {
        let finder = ArbFinder::new(fees("0.001", "0"), Price::from_units(100));
        let binance = snapshot(99_900_000_000, 100_000_000_000);
        let kraken = snapshot(kraken_bid, 200_000_000_000);

        let found = finder.find(
            "BTC-USD",
            (Exchange::Binance, &binance),
            (Exchange::Kraken, &kraken),
        );

        assert_eq!(!found.is_empty(), expected);
    }

    #[test]
    fn fractional_profit_is_not_rounded_up() {
        // Cost is 500.5 units, so a 600 unit bid leaves 99.5 units of profit
        let finder = ArbFinder::new(fees("0.001", "0"), Price::from_units(100));
        let binance = snapshot(0, 500);
        let below = snapshot(600, 10_000);
        let above = snapshot(601, 10_000);

        assert!(finder
            .find("X", (Exchange::Binance, &binance), (Exchange::Kraken, &below))
            .is_empty());

        let found = finder.find("X", (Exchange::Binance, &binance), (Exchange::Kraken, &above));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].cost, Price::from_units(500));
        assert_eq!(found[0].profit, Price::from_units(100));
    }

    #[test]
    fn inverted_quotes_report_both_directions_independently() {
        let finder = ArbFinder::new(FeeSchedule::new(), Price::from_units(100));
        let binance = snapshot(10_100, 9_900);
        let kraken = snapshot(10_100, 9_900);

        let found = finder.find("X", (Exchange::Binance, &binance), (Exchange::Kraken, &kraken));

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].buy_exchange, Exchange::Binance);
        assert_eq!(found[1].buy_exchange, Exchange::Kraken);
        assert!(found.iter().all(|o| o.profit == Price::from_units(200)));
    }

    #[test]
    fn inverted_quotes_with_fees_do_not_panic() {
        let binance = snapshot(i64::MAX, 0);
        let kraken = snapshot(i64::MAX, i64::MIN);

        let found = reference_finder().find(
            "X",
            (Exchange::Binance, &binance),
            (Exchange::Kraken, &kraken),
        );

        assert!(found.iter().all(|o| o.profit > Price::ZERO));
    }

    fn decimal(units: i64) -> Decimal {
        Decimal::new(units, 8)
    }

    // Profit of buying at `ask` and selling at `bid`, computed in decimal arithmetic
    fn decimal_profit(ask: i64, buy_fee: i64, bid: i64, sell_fee: i64) -> Decimal {
        decimal(bid) * (Decimal::ONE - decimal(sell_fee))
            - decimal(ask) * (Decimal::ONE + decimal(buy_fee))
    }

    #[test]
    fn decision_matches_decimal_arithmetic() {
        let price = 0..1_000_000_000_000_000i64;
        let fee = -1_000_000..10_000_000i64;
        let threshold = -1_000_000_000_000..1_000_000_000_000i64;
        proptest!(|(
            binance in (price.clone(), price.clone()),
            kraken in (price.clone(), price),
            binance_fee in fee.clone(),
            kraken_fee in fee,
            min_profit in threshold
        )| {
            let finder = ArbFinder::new(
                FeeSchedule::new()
                    .with_fee(Exchange::Binance, FeeRate::from_units(binance_fee).unwrap())
                    .with_fee(Exchange::Kraken, FeeRate::from_units(kraken_fee).unwrap()),
                Price::from_units(min_profit),
            );
            let found = finder.find(
                "X",
                (Exchange::Binance, &snapshot(binance.0, binance.1)),
                (Exchange::Kraken, &snapshot(kraken.0, kraken.1)),
            );

            let directions = [
                (Exchange::Binance, decimal_profit(binance.1, binance_fee, kraken.0, kraken_fee)),
                (Exchange::Kraken, decimal_profit(kraken.1, kraken_fee, binance.0, binance_fee)),
            ];
            for (buy_exchange, expected) in directions {
                let reported = found.iter().find(|o| o.buy_exchange == buy_exchange);
                prop_assert_eq!(reported.is_some(), expected >= decimal(min_profit));
                if let Some(opportunity) = reported {
                    let truncated = expected.round_dp_with_strategy(8, RoundingStrategy::ToZero);
                    prop_assert_eq!(decimal(opportunity.profit.units()), truncated);
                }
            }
        });
    }

    #[test]
    fn find_for_update_skips_when_counterpart_is_missing() {
        let mut snapshots = BTreeMap::new();
        snapshots.insert(Exchange::Binance, snapshot(0, 1));

        let found = reference_finder().find_for_update("X", &snapshots, Exchange::Binance);

        assert!(found.is_empty());
    }

    #[test]
    fn find_for_update_compares_against_other_exchanges() {
        let mut snapshots = BTreeMap::new();
        snapshots.insert(Exchange::Binance, snapshot(3_999_900_000_000, 4_000_000_000_000));
        snapshots.insert(Exchange::Kraken, snapshot(4_020_000_000_000, 4_020_100_000_000));

        let found = reference_finder().find_for_update("BTC-USD", &snapshots, Exchange::Kraken);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].buy_exchange, Exchange::Binance);
        assert_eq!(found[0].sell_exchange, Exchange::Kraken);
    }

    #[test]
    fn unknown_exchange_defaults_to_zero_fee() {
        assert_eq!(FeeSchedule::new().fee(Exchange::Kraken), FeeRate::ZERO);
    }
}
