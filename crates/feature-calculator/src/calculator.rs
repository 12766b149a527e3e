use discovery_core::{EnrichedSymbol, Field};
use rust_decimal::prelude::ToPrimitive;

use crate::indicators::{atr, ema, finite_or, rsi};

/// One daily OHLCV bar, the trailing window this module computes over.
#[derive(Debug, Clone, Copy)]
pub struct Bar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// Normative intraday volume curve (§6): expected fraction of the day's
/// volume that has typically printed by a given exchange-local hour.
pub const TOD_CURVE: &[(u32, f64)] = &[
    (9, 1.8),
    (10, 1.2),
    (11, 0.8),
    (12, 0.7),
    (13, 0.8),
    (14, 0.9),
    (15, 1.3),
    (16, 1.6),
];

pub fn tod_multiplier(hour: u32) -> f64 {
    TOD_CURVE
        .iter()
        .find(|(h, _)| *h == hour)
        .map(|(_, m)| *m)
        .unwrap_or(1.0)
}

/// Capped linear scaling of a raw metric into [0,1].
fn norm_capped(value: f64, cap: f64) -> f64 {
    finite_or((value / cap).clamp(0.0, 1.0), 0.0)
}

/// Friction index: weighted blend of short-sale friction metrics. Unknown
/// components reduce the weight denominator instead of contributing 0.
fn friction_index(
    short_interest_pct: Field<f64>,
    borrow_fee_pct: Field<f64>,
    utilization_pct: Field<f64>,
) -> Field<f64> {
    let components: [(Field<f64>, f64, f64); 3] = [
        (short_interest_pct, 0.5, 40.0),
        (borrow_fee_pct, 0.3, 50.0),
        (utilization_pct, 0.2, 100.0),
    ];

    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for (field, weight, cap) in components {
        if let Field::Known(v) = field {
            weighted_sum += weight * norm_capped(v, cap);
            weight_total += weight;
        }
    }

    if weight_total <= 0.0 {
        Field::Unknown
    } else {
        Field::Known((weighted_sum / weight_total) * 100.0)
    }
}

/// Computes every feature-calculator-owned field on `enriched` in place,
/// from its trailing daily bar window (oldest first, most recent last)
/// and the exchange-local hour of the current session.
pub fn compute_features(enriched: &mut EnrichedSymbol, bars: &[Bar], hour_of_day: u32) {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();

    enriched.rsi14 = rsi(&closes, 14).into();
    enriched.ema9 = ema(&closes, 9).into();
    enriched.ema20 = ema(&closes, 20).into();

    let last_price = enriched.snapshot.last_price.to_f64().unwrap_or(0.0);
    enriched.atr_pct = atr(&highs, &lows, &closes, 14)
        .filter(|_| last_price > 0.0)
        .map(|a| (a / last_price) * 100.0)
        .into();

    enriched.intraday_relvol = match enriched.avg_volume_20d {
        Field::Known(avg) if avg > 0 => {
            let expected = avg as f64 * tod_multiplier(hour_of_day);
            Field::Known(finite_or(enriched.snapshot.session_volume as f64 / expected, 0.0))
        }
        _ => Field::Unknown,
    };

    enriched.float_rotation_pct = match enriched.float_shares {
        Field::Known(float) if float > 0 => Field::Known(
            100.0 * enriched.snapshot.session_volume as f64 / float as f64,
        ),
        _ => Field::Unknown,
    };

    enriched.friction_index = friction_index(
        enriched.short_interest_pct,
        enriched.borrow_fee_pct,
        enriched.utilization_pct,
    );
}
