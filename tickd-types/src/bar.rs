//! Historical daily bar record returned by history providers.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::event::EventPayload;

/// One daily OHLCV bar. History providers return these ascending by
/// `session`, deduplicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    /// Trading session date.
    pub session: NaiveDate,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Total session volume.
    pub volume: Decimal,
    /// Close adjusted for corporate actions, when the provider supplies it.
    pub adjusted_close: Option<Decimal>,
}

impl DailyBar {
    /// Convert into the canonical bar event payload.
    #[must_use]
    pub fn to_payload(&self) -> EventPayload {
        EventPayload::Bar {
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            session: self.session,
        }
    }

    /// Whether the bar satisfies OHLC ordering: all values positive and
    /// `low <= min(open, close) <= max(open, close) <= high`.
    #[must_use]
    pub fn is_coherent(&self) -> bool {
        let positive = self.open > Decimal::ZERO
            && self.high > Decimal::ZERO
            && self.low > Decimal::ZERO
            && self.close > Decimal::ZERO;
        positive
            && self.low <= self.open.min(self.close)
            && self.open.max(self.close) <= self.high
    }
}
