//! Desired-symbol configuration applied by the subscription coordinator.

use serde::{Deserialize, Serialize};

use crate::event::canonicalize_symbol;

/// Vendor-assigned subscription identifier.
///
/// Positive values identify a live subscription. `-1` means the provider was
/// unavailable when the subscription was attempted; the intent is remembered
/// and retried on the next reconciliation.
pub type SubscriptionId = i64;

/// Sentinel id recording a failed subscription attempt to retry later.
pub const PENDING_SUBSCRIPTION: SubscriptionId = -1;

/// Per-symbol collection configuration, keyed by canonical symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolSubscription {
    /// Ticker as written in configuration; canonicalized before use.
    pub symbol: String,
    /// Collect trade prints.
    pub subscribe_trades: bool,
    /// Collect L2 depth.
    pub subscribe_depth: bool,
    /// Depth levels requested when depth is on.
    pub depth_levels: u32,
    /// Routing exchange hint.
    pub exchange: String,
    /// Primary listing exchange.
    pub primary_exchange: String,
    /// Vendor-local symbol override, when it differs from the canonical one.
    pub local_symbol: String,
    /// Security type (e.g. "STK", "FUT").
    pub security_type: String,
    /// Quote currency.
    pub currency: String,
}

impl SymbolSubscription {
    /// Minimal subscription for `symbol` with both streams enabled.
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            subscribe_trades: true,
            subscribe_depth: true,
            depth_levels: 10,
            exchange: String::new(),
            primary_exchange: String::new(),
            local_symbol: String::new(),
            security_type: "STK".to_string(),
            currency: "USD".to_string(),
        }
    }

    /// Canonical form of the configured symbol.
    #[must_use]
    pub fn canonical(&self) -> String {
        canonicalize_symbol(&self.symbol)
    }

    /// Whether two configurations are equivalent for reconciliation
    /// purposes.
    ///
    /// Compares the subscription flags, depth levels, and the routing
    /// fields {exchange, local_symbol, primary_exchange}; string fields
    /// compare case-insensitively.
    #[must_use]
    pub fn same_config(&self, other: &Self) -> bool {
        self.subscribe_trades == other.subscribe_trades
            && self.subscribe_depth == other.subscribe_depth
            && self.depth_levels == other.depth_levels
            && self.exchange.eq_ignore_ascii_case(&other.exchange)
            && self.local_symbol.eq_ignore_ascii_case(&other.local_symbol)
            && self
                .primary_exchange
                .eq_ignore_ascii_case(&other.primary_exchange)
    }
}

/// The full desired symbol set handed to the coordinator on (re)load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolSubscriptionSet {
    /// Desired subscriptions; entries with empty symbols are ignored.
    pub symbols: Vec<SymbolSubscription>,
}

impl SymbolSubscriptionSet {
    /// Build a set from individual subscriptions.
    #[must_use]
    pub fn new(symbols: Vec<SymbolSubscription>) -> Self {
        Self { symbols }
    }
}
