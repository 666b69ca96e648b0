//! Subscription coordinator: reconciles the desired symbol set against the
//! active provider's live subscriptions.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex as StdMutex};

use tickd_core::connector::TickdConnector;
use tickd_core::TickdError;
use tickd_types::{
    PENDING_SUBSCRIPTION, SubscriptionId, SymbolSubscription, SymbolSubscriptionSet,
};

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Symbols newly subscribed (depth or trades).
    pub subscribed: Vec<String>,
    /// Symbols whose configuration changed and was re-applied.
    pub updated: Vec<String>,
    /// Symbols fully unsubscribed and forgotten.
    pub removed: Vec<String>,
    /// Per-symbol vendor failures; the intent is remembered and retried on
    /// the next pass.
    pub failed: Vec<(String, String)>,
}

#[derive(Default)]
struct SubMaps {
    depth: HashMap<String, SubscriptionId>,
    trades: HashMap<String, SubscriptionId>,
}

struct CoordState {
    provider: Arc<dyn TickdConnector>,
    previous: HashMap<String, SymbolSubscription>,
}

/// Thread-safe coordinator. `apply` and `repoint` serialize under a single
/// reconciliation lock; map reads return eventually-consistent snapshots.
pub struct SubscriptionCoordinator {
    state: tokio::sync::Mutex<CoordState>,
    maps: StdMutex<SubMaps>,
}

impl SubscriptionCoordinator {
    /// Coordinator initially pointed at `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn TickdConnector>) -> Self {
        Self {
            state: tokio::sync::Mutex::new(CoordState {
                provider,
                previous: HashMap::new(),
            }),
            maps: StdMutex::new(SubMaps::default()),
        }
    }

    /// Reconcile the desired symbol set against current subscriptions.
    ///
    /// Per-symbol vendor errors are recorded and never abort the pass; a
    /// failed subscription is remembered with a pending id so the next
    /// `apply` retries it.
    pub async fn apply(&self, config: &SymbolSubscriptionSet) -> ReconcileReport {
        let mut state = self.state.lock().await;

        let desired: HashMap<String, SymbolSubscription> = config
            .symbols
            .iter()
            .filter(|s| !s.symbol.trim().is_empty())
            .map(|s| (s.canonical(), s.clone()))
            .collect();

        let mut report = ReconcileReport::default();

        // Everything currently known but no longer desired goes away.
        let known: BTreeSet<String> = {
            let maps = self.maps.lock().expect("mutex poisoned");
            maps.depth
                .keys()
                .chain(maps.trades.keys())
                .chain(state.previous.keys())
                .cloned()
                .collect()
        };
        for symbol in known.iter().filter(|s| !desired.contains_key(*s)) {
            self.drop_symbol(&state.provider, symbol).await;
            report.removed.push(symbol.clone());
        }

        // Deterministic order keeps logs and tests stable.
        let mut symbols: Vec<&String> = desired.keys().collect();
        symbols.sort();
        for symbol in symbols {
            let sub = &desired[symbol];
            let changed = match state.previous.get(symbol) {
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::info!(symbol = %symbol, "subscribing");
                    report.subscribed.push(symbol.clone());
                    false
                }
                Some(prev) if !prev.same_config(sub) => {
                    #[cfg(feature = "tracing")]
                    tracing::info!(symbol = %symbol, "updating subscription");
                    report.updated.push(symbol.clone());
                    true
                }
                Some(_) => false,
            };
            self.reconcile_symbol(&state.provider, symbol, sub, changed, &mut report)
                .await;
        }

        state.previous = desired;
        report
    }

    /// Re-issue the full desired set against a new active provider.
    ///
    /// The old provider's subscription ids are forgotten, not unsubscribed:
    /// on failover the old provider is presumed unavailable.
    pub async fn repoint(&self, provider: Arc<dyn TickdConnector>) -> ReconcileReport {
        let mut state = self.state.lock().await;
        state.provider = provider;
        {
            let mut maps = self.maps.lock().expect("mutex poisoned");
            maps.depth.clear();
            maps.trades.clear();
        }

        let mut report = ReconcileReport::default();
        let mut symbols: Vec<String> = state.previous.keys().cloned().collect();
        symbols.sort();
        for symbol in symbols {
            let sub = state.previous[&symbol].clone();
            report.subscribed.push(symbol.clone());
            self.reconcile_symbol(&state.provider, &symbol, &sub, false, &mut report)
                .await;
        }
        report
    }

    /// Snapshot of depth subscription ids by symbol.
    #[must_use]
    pub fn depth_subscriptions(&self) -> HashMap<String, SubscriptionId> {
        self.maps.lock().expect("mutex poisoned").depth.clone()
    }

    /// Snapshot of trade subscription ids by symbol.
    #[must_use]
    pub fn trade_subscriptions(&self) -> HashMap<String, SubscriptionId> {
        self.maps.lock().expect("mutex poisoned").trades.clone()
    }

    async fn drop_symbol(&self, provider: &Arc<dyn TickdConnector>, symbol: &str) {
        let (depth_id, trade_id) = {
            let mut maps = self.maps.lock().expect("mutex poisoned");
            (maps.depth.remove(symbol), maps.trades.remove(symbol))
        };
        if let Some(streaming) = provider.as_streaming_provider() {
            if let Some(id) = depth_id.filter(|id| *id > 0)
                && let Err(_e) = streaming.unsubscribe_market_depth(id).await
            {
                #[cfg(feature = "tracing")]
                tracing::warn!(symbol = %symbol, error = %_e, "depth unsubscribe failed");
            }
            if let Some(id) = trade_id.filter(|id| *id > 0)
                && let Err(_e) = streaming.unsubscribe_trades(id).await
            {
                #[cfg(feature = "tracing")]
                tracing::warn!(symbol = %symbol, error = %_e, "trade unsubscribe failed");
            }
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn reconcile_symbol(
        &self,
        provider: &Arc<dyn TickdConnector>,
        symbol: &str,
        sub: &SymbolSubscription,
        changed: bool,
        report: &mut ReconcileReport,
    ) {
        let Some(streaming) = provider.as_streaming_provider() else {
            report.failed.push((
                symbol.to_string(),
                TickdError::unsupported("stream-trades").to_string(),
            ));
            return;
        };

        // Depth stream.
        let current_depth = {
            let maps = self.maps.lock().expect("mutex poisoned");
            maps.depth.get(symbol).copied()
        };
        if sub.subscribe_depth {
            let needs_subscribe = match current_depth {
                None | Some(PENDING_SUBSCRIPTION) => true,
                Some(id) if changed => {
                    if id > 0 {
                        let _ = streaming.unsubscribe_market_depth(id).await;
                    }
                    true
                }
                Some(_) => false,
            };
            if needs_subscribe {
                match streaming.subscribe_market_depth(sub).await {
                    Ok(id) => {
                        let mut maps = self.maps.lock().expect("mutex poisoned");
                        maps.depth.insert(symbol.to_string(), id);
                    }
                    Err(e) => {
                        let mut maps = self.maps.lock().expect("mutex poisoned");
                        maps.depth.insert(symbol.to_string(), PENDING_SUBSCRIPTION);
                        drop(maps);
                        report.failed.push((symbol.to_string(), e.to_string()));
                    }
                }
            }
        } else if let Some(id) = current_depth {
            {
                let mut maps = self.maps.lock().expect("mutex poisoned");
                maps.depth.remove(symbol);
            }
            if id > 0 {
                let _ = streaming.unsubscribe_market_depth(id).await;
            }
        }

        // Trade stream.
        let current_trades = {
            let maps = self.maps.lock().expect("mutex poisoned");
            maps.trades.get(symbol).copied()
        };
        if sub.subscribe_trades {
            let needs_subscribe = match current_trades {
                None | Some(PENDING_SUBSCRIPTION) => true,
                Some(id) if changed => {
                    if id > 0 {
                        let _ = streaming.unsubscribe_trades(id).await;
                    }
                    true
                }
                Some(_) => false,
            };
            if needs_subscribe {
                match streaming.subscribe_trades(sub).await {
                    Ok(id) => {
                        let mut maps = self.maps.lock().expect("mutex poisoned");
                        maps.trades.insert(symbol.to_string(), id);
                    }
                    Err(e) => {
                        let mut maps = self.maps.lock().expect("mutex poisoned");
                        maps.trades.insert(symbol.to_string(), PENDING_SUBSCRIPTION);
                        drop(maps);
                        report.failed.push((symbol.to_string(), e.to_string()));
                    }
                }
            }
        } else if let Some(id) = current_trades {
            {
                let mut maps = self.maps.lock().expect("mutex poisoned");
                maps.trades.remove(symbol);
            }
            if id > 0 {
                let _ = streaming.unsubscribe_trades(id).await;
            }
        }
    }
}
