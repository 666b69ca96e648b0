//! Mock tickd connector with deterministic data and scripted failure
//! injection.
//!
//! The mock serves synthetic daily bars and a controllable streaming side.
//! Magic symbols force failure paths without any scripting:
//! - `"FAIL"`: every history call fails with a provider error;
//! - `"TIMEOUT"`: history calls stall briefly so orchestrators can time out;
//! - `"EMPTY"`: history calls return an empty series.
//!
//! Everything else is drivable from tests through [`MockController`].

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tickd_core::connector::{HistoryProvider, StreamingProvider, TickdConnector};
use tickd_core::normalize::EventIngress;
use tickd_core::TickdError;
use tickd_types::{
    AggressorSide, DailyBar, Event, EventKind, EventPayload, RateLimitConfig, StreamingCaps,
    StreamingCapabilities, SubscriptionId, SymbolSubscription, canonicalize_symbol,
};

pub mod fixtures;
pub mod transport;

/// Instruction for how a history call should behave for a given symbol.
#[derive(Clone)]
pub enum MockBehavior {
    /// Return the provided bars.
    Return(Vec<DailyBar>),
    /// Fail with the provided error.
    Fail(TickdError),
    /// Fail with the provided error a number of times, then serve fixture
    /// data (exercises retry paths).
    FailTimes(u32, TickdError),
}

/// Instruction for how subscription calls should behave.
#[derive(Clone)]
pub enum SubscribeBehavior {
    /// Hand out the next positive id.
    Succeed,
    /// Report the provider unavailable (`Ok(-1)`, intent remembered).
    Unavailable,
    /// Fail with the provided error.
    Fail(TickdError),
}

#[derive(Default)]
struct InternalState {
    history_rules: HashMap<String, MockBehavior>,
    fail_budget: HashMap<String, u32>,
    subscribe_depth: Option<SubscribeBehavior>,
    subscribe_trades: Option<SubscribeBehavior>,
    op_log: Vec<String>,
    available: bool,
}

/// Mock connector for tests. Streaming and history capable.
pub struct MockConnector {
    id: &'static str,
    state: StdMutex<InternalState>,
    connected: AtomicBool,
    next_id: AtomicI64,
    ingress: StdMutex<Option<EventIngress>>,
    sequences: StdMutex<HashMap<String, u64>>,
}

impl MockConnector {
    /// Connector with the default id `"tickd-mock"`.
    #[must_use]
    pub fn new() -> Self {
        Self::named("tickd-mock")
    }

    /// Connector with an explicit id, for multi-provider tests.
    #[must_use]
    pub fn named(id: &'static str) -> Self {
        Self {
            id,
            state: StdMutex::new(InternalState {
                available: true,
                ..InternalState::default()
            }),
            connected: AtomicBool::new(false),
            next_id: AtomicI64::new(1),
            ingress: StdMutex::new(None),
            sequences: StdMutex::new(HashMap::new()),
        }
    }

    /// Controller handle for scripting this connector from a test.
    #[must_use]
    pub fn controller(&self) -> MockController<'_> {
        MockController { connector: self }
    }

    fn log(&self, op: String) {
        self.state.lock().expect("mutex poisoned").op_log.push(op);
    }

    fn next_sequence(&self, symbol: &str, kind: EventKind) -> u64 {
        let mut seqs = self.sequences.lock().expect("mutex poisoned");
        let counter = seqs
            .entry(format!("{symbol}|{kind}"))
            .or_insert(0);
        *counter += 1;
        *counter
    }

    /// Emit a trade through the connected ingress. Sequences are assigned
    /// monotonically per `(symbol, kind)` as a real adapter would.
    ///
    /// # Panics
    /// Panics when the connector is not connected.
    pub async fn emit_trade(&self, symbol: &str, price: Decimal, size: Decimal) {
        let ingress = self
            .ingress
            .lock()
            .expect("mutex poisoned")
            .clone()
            .expect("emit_trade before connect");
        let seq = self.next_sequence(symbol, EventKind::Trade);
        let event = Event::new(
            EventKind::Trade,
            symbol,
            self.id,
            EventPayload::Trade {
                price,
                size,
                aggressor: AggressorSide::Unknown,
            },
        )
        .with_sequence(seq);
        let _ = ingress.emit(event).await;
    }

    fn maybe_magic_symbol(&self, symbol: &str) -> Option<Result<Vec<DailyBar>, TickdError>> {
        match symbol {
            "FAIL" => Some(Err(TickdError::provider(
                self.id,
                "forced failure: daily-bars",
            ))),
            "EMPTY" => Some(Ok(Vec::new())),
            _ => None,
        }
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

/// Controller handle used by tests to drive the mock from the outside.
pub struct MockController<'a> {
    connector: &'a MockConnector,
}

impl MockController<'_> {
    /// Set the behavior for history calls for a specific symbol.
    pub fn set_history_behavior(&self, symbol: &str, behavior: MockBehavior) {
        let mut guard = self.connector.state.lock().expect("mutex poisoned");
        if let MockBehavior::FailTimes(n, _) = &behavior {
            guard.fail_budget.insert(canonicalize_symbol(symbol), *n);
        }
        guard
            .history_rules
            .insert(canonicalize_symbol(symbol), behavior);
    }

    /// Set the behavior of `subscribe_market_depth`.
    pub fn set_depth_subscribe_behavior(&self, behavior: SubscribeBehavior) {
        self.connector
            .state
            .lock()
            .expect("mutex poisoned")
            .subscribe_depth = Some(behavior);
    }

    /// Set the behavior of `subscribe_trades`.
    pub fn set_trade_subscribe_behavior(&self, behavior: SubscribeBehavior) {
        self.connector
            .state
            .lock()
            .expect("mutex poisoned")
            .subscribe_trades = Some(behavior);
    }

    /// Toggle `is_available` for the history side.
    pub fn set_available(&self, available: bool) {
        self.connector
            .state
            .lock()
            .expect("mutex poisoned")
            .available = available;
    }

    /// Ordered log of subscription operations the connector received.
    #[must_use]
    pub fn op_log(&self) -> Vec<String> {
        self.connector
            .state
            .lock()
            .expect("mutex poisoned")
            .op_log
            .clone()
    }

    /// Clear the operation log.
    pub fn clear_op_log(&self) {
        self.connector
            .state
            .lock()
            .expect("mutex poisoned")
            .op_log
            .clear();
    }

    /// Whether the streaming side is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connector.connected.load(Ordering::Acquire)
    }
}

impl TickdConnector for MockConnector {
    fn id(&self) -> &'static str {
        self.id
    }

    fn display_name(&self) -> &'static str {
        "Mock"
    }

    fn streaming_capabilities(&self) -> StreamingCapabilities {
        StreamingCapabilities {
            caps: StreamingCaps::TRADES | StreamingCaps::QUOTES | StreamingCaps::DEPTH,
            max_depth_levels: 10,
            rate_limit: RateLimitConfig::default(),
        }
    }

    fn as_streaming_provider(&self) -> Option<&dyn StreamingProvider> {
        Some(self as &dyn StreamingProvider)
    }

    fn as_history_provider(&self) -> Option<&dyn HistoryProvider> {
        Some(self as &dyn HistoryProvider)
    }
}

#[async_trait]
impl StreamingProvider for MockConnector {
    async fn connect(&self, ingress: EventIngress) -> Result<(), TickdError> {
        *self.ingress.lock().expect("mutex poisoned") = Some(ingress);
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TickdError> {
        self.connected.store(false, Ordering::Release);
        *self.ingress.lock().expect("mutex poisoned") = None;
        Ok(())
    }

    async fn subscribe_market_depth(
        &self,
        sub: &SymbolSubscription,
    ) -> Result<SubscriptionId, TickdError> {
        let behavior = {
            let guard = self.state.lock().expect("mutex poisoned");
            guard
                .subscribe_depth
                .clone()
                .unwrap_or(SubscribeBehavior::Succeed)
        };
        match behavior {
            SubscribeBehavior::Succeed => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                self.log(format!("subscribe_depth {} -> {id}", sub.canonical()));
                Ok(id)
            }
            SubscribeBehavior::Unavailable => {
                self.log(format!("subscribe_depth {} -> unavailable", sub.canonical()));
                Ok(-1)
            }
            SubscribeBehavior::Fail(e) => {
                self.log(format!("subscribe_depth {} -> error", sub.canonical()));
                Err(e)
            }
        }
    }

    async fn unsubscribe_market_depth(&self, id: SubscriptionId) -> Result<(), TickdError> {
        self.log(format!("unsubscribe_depth {id}"));
        Ok(())
    }

    async fn subscribe_trades(
        &self,
        sub: &SymbolSubscription,
    ) -> Result<SubscriptionId, TickdError> {
        let behavior = {
            let guard = self.state.lock().expect("mutex poisoned");
            guard
                .subscribe_trades
                .clone()
                .unwrap_or(SubscribeBehavior::Succeed)
        };
        match behavior {
            SubscribeBehavior::Succeed => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                self.log(format!("subscribe_trades {} -> {id}", sub.canonical()));
                Ok(id)
            }
            SubscribeBehavior::Unavailable => {
                self.log(format!("subscribe_trades {} -> unavailable", sub.canonical()));
                Ok(-1)
            }
            SubscribeBehavior::Fail(e) => {
                self.log(format!("subscribe_trades {} -> error", sub.canonical()));
                Err(e)
            }
        }
    }

    async fn unsubscribe_trades(&self, id: SubscriptionId) -> Result<(), TickdError> {
        self.log(format!("unsubscribe_trades {id}"));
        Ok(())
    }
}

#[async_trait]
impl HistoryProvider for MockConnector {
    async fn daily_bars(
        &self,
        symbol: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DailyBar>, TickdError> {
        let symbol = canonicalize_symbol(symbol);
        if symbol == "TIMEOUT" {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        }
        if let Some(outcome) = self.maybe_magic_symbol(&symbol) {
            return outcome;
        }

        let rule = {
            let mut guard = self.state.lock().expect("mutex poisoned");
            match guard.history_rules.get(&symbol).cloned() {
                Some(MockBehavior::FailTimes(_, err)) => {
                    let remaining = guard.fail_budget.entry(symbol.clone()).or_insert(0);
                    if *remaining > 0 {
                        *remaining -= 1;
                        Some(MockBehavior::Fail(err))
                    } else {
                        None
                    }
                }
                other => other,
            }
        };

        match rule {
            Some(MockBehavior::Return(bars)) => Ok(bars),
            Some(MockBehavior::Fail(e)) => Err(e),
            Some(MockBehavior::FailTimes(..)) | None => {
                Ok(fixtures::daily_bars(&symbol, from, to))
            }
        }
    }

    async fn adjusted_daily_bars(
        &self,
        symbol: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DailyBar>, TickdError> {
        self.daily_bars(symbol, from, to).await
    }

    async fn is_available(&self) -> bool {
        self.state.lock().expect("mutex poisoned").available
    }

    fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig::default()
    }
}
