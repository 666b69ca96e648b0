use core::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::config::RateLimitConfig;

/// High-level capability labels for routing, errors, and telemetry.
///
/// These map one-to-one with connector operations and allow consistent
/// Display formatting and match-exhaustive handling when adding new
/// capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Capability {
    /// Establish a streaming session.
    Connect,
    /// Live trade subscription.
    StreamTrades,
    /// Live BBO quote subscription.
    StreamQuotes,
    /// Live market depth subscription.
    StreamDepth,
    /// Historical daily bars.
    DailyBars,
    /// Historical daily bars adjusted for corporate actions.
    AdjustedDailyBars,
    /// Provider availability probe.
    Availability,
}

impl Capability {
    /// Stable, kebab-case identifier for logs/errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::StreamTrades => "stream-trades",
            Self::StreamQuotes => "stream-quotes",
            Self::StreamDepth => "stream-depth",
            Self::DailyBars => "daily-bars",
            Self::AdjustedDailyBars => "adjusted-daily-bars",
            Self::Availability => "availability",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    /// Streaming feature flags advertised by a connector.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StreamingCaps: u8 {
        /// Connector can stream trade prints.
        const TRADES = 1 << 0;
        /// Connector can stream BBO quotes.
        const QUOTES = 1 << 1;
        /// Connector can stream L2 depth.
        const DEPTH = 1 << 2;
    }
}

/// Full streaming capability declaration: feature flags plus limits.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingCapabilities {
    /// Supported stream kinds.
    pub caps: StreamingCaps,
    /// Maximum depth levels the connector can deliver; 0 when depth is
    /// unsupported.
    pub max_depth_levels: u32,
    /// Outbound request limits declared by the vendor.
    pub rate_limit: RateLimitConfig,
}

impl Default for StreamingCapabilities {
    fn default() -> Self {
        Self {
            caps: StreamingCaps::empty(),
            max_depth_levels: 0,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl StreamingCapabilities {
    /// Whether the declared flags include `wanted`.
    #[must_use]
    pub const fn supports(&self, wanted: StreamingCaps) -> bool {
        self.caps.contains(wanted)
    }
}
