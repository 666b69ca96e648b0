//! Deterministic synthetic market data for tests and examples.

use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use tickd_types::DailyBar;

/// Default range start when a request carries no `from`.
const DEFAULT_FROM: (i32, u32, u32) = (2024, 1, 2);
/// Default range end when a request carries no `to`.
const DEFAULT_TO: (i32, u32, u32) = (2024, 1, 31);

fn seed_for(symbol: &str) -> i64 {
    symbol.bytes().map(i64::from).sum::<i64>() % 50 + 10
}

/// Deterministic daily bars for `symbol` over the inclusive range,
/// weekends skipped. The same inputs always produce the same bars.
#[must_use]
pub fn daily_bars(symbol: &str, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Vec<DailyBar> {
    let from = from.unwrap_or_else(|| {
        NaiveDate::from_ymd_opt(DEFAULT_FROM.0, DEFAULT_FROM.1, DEFAULT_FROM.2).unwrap()
    });
    let to = to.unwrap_or_else(|| {
        NaiveDate::from_ymd_opt(DEFAULT_TO.0, DEFAULT_TO.1, DEFAULT_TO.2).unwrap()
    });

    let base = seed_for(symbol);
    let mut bars = Vec::new();
    let mut day = from;
    let mut step: i64 = 0;
    while day <= to {
        if day.weekday().number_from_monday() <= 5 {
            let open = Decimal::from(base * 100 + step) / Decimal::from(100);
            let close = Decimal::from(base * 100 + step + 40) / Decimal::from(100);
            let low = open - Decimal::new(25, 2);
            let high = close + Decimal::new(25, 2);
            bars.push(DailyBar {
                session: day,
                open,
                high,
                low,
                close,
                volume: Decimal::from(1_000 + step * 10),
                adjusted_close: Some(close),
            });
            step += 7;
        }
        day += Duration::days(1);
    }
    bars
}
