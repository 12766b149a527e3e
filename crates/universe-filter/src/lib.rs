pub mod exclusion;

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use discovery_core::{GuardConfig, MarketCalendar, TickerSnapshot};
use rust_decimal::Decimal;

use exclusion::ExclusionSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RejectionReason {
    PennyStock,
    ThinDollarVolume,
    WideSpread,
    Etp,
}

impl RejectionReason {
    fn label(self) -> &'static str {
        match self {
            RejectionReason::PennyStock => "penny_stock",
            RejectionReason::ThinDollarVolume => "thin_dollar_volume",
            RejectionReason::WideSpread => "wide_spread",
            RejectionReason::Etp => "etp_excluded",
        }
    }
}

pub struct FilterResult {
    pub kept: Vec<TickerSnapshot>,
    /// Rejection-reason histogram, keyed by reason label.
    pub rejections: BTreeMap<String, usize>,
    /// Set when the market is closed or the snapshot is older than one
    /// trading day relative to last close. Downstream caps tiers at
    /// `monitor` but no threshold here is relaxed.
    pub stale: bool,
}

pub struct UniverseFilter {
    guards: GuardConfig,
}

impl UniverseFilter {
    pub fn new(guards: GuardConfig) -> Self {
        Self { guards }
    }

    fn passes_guards(&self, s: &TickerSnapshot) -> Result<(), RejectionReason> {
        if s.last_price < self.guards.min_price {
            return Err(RejectionReason::PennyStock);
        }

        let dollar_volume = Decimal::from(s.session_volume) * s.last_price;
        if dollar_volume < self.guards.min_dollar_volume {
            return Err(RejectionReason::ThinDollarVolume);
        }

        if !s.last_price.is_zero() {
            let spread_bps = (s.session_high - s.session_low) / s.last_price * Decimal::from(10_000);
            if spread_bps > Decimal::from_f64_retain(self.guards.max_spread_bps).unwrap_or(Decimal::MAX) {
                return Err(RejectionReason::WideSpread);
            }
        }

        let name = s.name.as_ref().known();
        if ExclusionSet::is_excluded(&s.symbol, name.map(|n| n.as_str())) {
            return Err(RejectionReason::Etp);
        }

        Ok(())
    }

    pub fn apply(
        &self,
        snapshots: Vec<TickerSnapshot>,
        freshness: DateTime<Utc>,
        now: DateTime<Utc>,
        calendar: &dyn MarketCalendar,
    ) -> FilterResult {
        let mut kept = Vec::with_capacity(snapshots.len());
        let mut rejections: BTreeMap<String, usize> = BTreeMap::new();

        for s in snapshots {
            match self.passes_guards(&s) {
                Ok(()) => kept.push(s),
                Err(reason) => {
                    *rejections.entry(reason.label().to_string()).or_insert(0) += 1;
                }
            }
        }

        let last_close = calendar.last_close(now);
        let stale = !calendar.is_open(now) || freshness < last_close - Duration::days(1);

        FilterResult {
            kept,
            rejections,
            stale,
        }
    }
}
