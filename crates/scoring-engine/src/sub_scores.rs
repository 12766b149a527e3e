use discovery_core::{EnrichedSymbol, Field, Regime};
use rust_decimal::prelude::ToPrimitive;

use crate::regime::rsi_sweet_spot;
use crate::weighting::{combine_bucket, piecewise_linear};

/// Per-symbol context the scoring engine needs beyond `EnrichedSymbol`,
/// derived from the trailing bar window before scoring runs.
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext {
    pub regime: Regime,
    /// Consecutive up-day count ending at the latest close, capped at 5.
    pub consecutive_up_days: Field<u32>,
    pub atr_pct_10d_mean: Field<f64>,
}

const BUCKET_UNKNOWN_THRESHOLD: f64 = 0.4;

pub fn consecutive_up_days(closes: &[f64]) -> u32 {
    let mut count = 0u32;
    for w in closes.windows(2).rev() {
        if w[1] > w[0] {
            count += 1;
            if count >= 5 {
                break;
            }
        } else {
            break;
        }
    }
    count
}

fn vwap_reclaim_score(enriched: &EnrichedSymbol) -> Field<f64> {
    match enriched.snapshot.vwap {
        Field::Known(vwap) => {
            let price = enriched.snapshot.last_price;
            Field::Known(if price >= vwap { 100.0 } else { 0.0 })
        }
        Field::Unknown => Field::Unknown,
    }
}

pub fn volume_momentum(enriched: &EnrichedSymbol, ctx: &ScoringContext) -> Field<f64> {
    let relvol = enriched
        .intraday_relvol
        .map(|x| piecewise_linear(x, &[(1.0, 0.0), (2.5, 60.0), (5.0, 85.0), (10.0, 100.0)]));

    let up_days = ctx
        .consecutive_up_days
        .map(|d| (d.min(5) as f64 / 5.0) * 100.0);

    let vwap_reclaim = vwap_reclaim_score(enriched);

    let atr_expansion = match (enriched.atr_pct, ctx.atr_pct_10d_mean) {
        (Field::Known(atr), Field::Known(mean)) if mean > 0.0 => {
            let expansion_pct = (atr / mean - 1.0) * 100.0;
            Field::Known(piecewise_linear(expansion_pct, &[(0.0, 0.0), (50.0, 100.0)]))
        }
        _ => Field::Unknown,
    };

    combine_bucket(
        &[
            (relvol, 0.40),
            (up_days, 0.30),
            (vwap_reclaim, 0.20),
            (atr_expansion, 0.10),
        ],
        BUCKET_UNKNOWN_THRESHOLD,
    )
}

pub fn squeeze(enriched: &EnrichedSymbol) -> Field<f64> {
    let float_rotation = enriched
        .float_rotation_pct
        .map(|x| piecewise_linear(x, &[(0.0, 0.0), (100.0, 100.0)]));

    let friction = enriched.friction_index;

    let inverse_float = enriched.float_shares.map(|shares| {
        let millions = shares as f64 / 1_000_000.0;
        piecewise_linear(millions, &[(20.0, 100.0), (200.0, 0.0)])
    });

    combine_bucket(
        &[(float_rotation, 0.35), (friction, 0.40), (inverse_float, 0.25)],
        BUCKET_UNKNOWN_THRESHOLD,
    )
}

pub fn catalyst(enriched: &EnrichedSymbol) -> Field<f64> {
    match (enriched.catalyst_strength, enriched.catalyst_age_hours) {
        (Field::Known(strength), Field::Known(age_hours)) => {
            let decay = 0.5_f64.powf(age_hours / 6.0);
            let mut score = strength * decay;
            if enriched.catalyst_source_verified {
                score *= 1.25;
            }
            Field::Known(score.min(100.0))
        }
        _ => Field::Unknown,
    }
}

pub fn sentiment(enriched: &EnrichedSymbol) -> Field<f64> {
    enriched
        .sentiment_z_score
        .map(|z| 50.0 * (1.0 - (-z.abs() / 2.0).exp()))
}

pub fn options(enriched: &EnrichedSymbol) -> Field<f64> {
    let cpr = enriched
        .call_put_ratio
        .map(|x| piecewise_linear(x, &[(1.0, 0.0), (3.0, 100.0)]));

    let iv = enriched
        .iv_percentile
        .map(|x| piecewise_linear(x.min(95.0), &[(0.0, 0.0), (95.0, 100.0)]));

    combine_bucket(&[(cpr, 0.60), (iv, 0.40)], BUCKET_UNKNOWN_THRESHOLD)
}

pub fn technical(enriched: &EnrichedSymbol, ctx: &ScoringContext) -> Field<f64> {
    let (low, high) = rsi_sweet_spot(ctx.regime);

    let rsi_component = enriched.rsi14.map(|rsi| {
        if rsi >= low && rsi <= high {
            100.0
        } else {
            let distance = if rsi < low { low - rsi } else { rsi - high };
            (100.0 - distance * (100.0 / 15.0)).max(0.0)
        }
    });

    let cross_component = match (enriched.ema9, enriched.ema20) {
        (Field::Known(e9), Field::Known(e20)) => Field::Known(if e9 > e20 { 100.0 } else { 0.0 }),
        _ => Field::Unknown,
    };

    combine_bucket(
        &[(rsi_component, 0.70), (cross_component, 0.30)],
        BUCKET_UNKNOWN_THRESHOLD,
    )
}

#[allow(dead_code)]
fn price_as_f64(enriched: &EnrichedSymbol) -> f64 {
    enriched.snapshot.last_price.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_up_days_caps_at_five() {
        let closes = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        assert_eq!(consecutive_up_days(&closes), 5);
    }

    #[test]
    fn consecutive_up_days_stops_at_down_day() {
        let closes = vec![5.0, 4.0, 5.0, 6.0, 7.0];
        assert_eq!(consecutive_up_days(&closes), 3);
    }

    #[test]
    fn catalyst_decays_with_age() {
        use discovery_core::{EnrichedSymbol, TickerSnapshot};
        use rust_decimal::Decimal;

        let mut sym = EnrichedSymbol {
            snapshot: TickerSnapshot {
                symbol: "AAA".into(),
                last_price: Decimal::new(1000, 2),
                session_volume: 1_000_000,
                prev_close: Decimal::new(990, 2),
                session_high: Decimal::new(1010, 2),
                session_low: Decimal::new(990, 2),
                vwap: Field::Unknown,
                open: Decimal::new(995, 2),
                name: Field::Unknown,
            },
            avg_volume_20d: Field::Unknown,
            float_shares: Field::Unknown,
            short_interest_pct: Field::Unknown,
            borrow_fee_pct: Field::Unknown,
            utilization_pct: Field::Unknown,
            call_put_ratio: Field::Unknown,
            iv_percentile: Field::Unknown,
            catalyst_strength: Field::Known(100.0),
            catalyst_age_hours: Field::Known(6.0),
            catalyst_source_verified: false,
            sentiment_z_score: Field::Unknown,
            ema9: Field::Unknown,
            ema20: Field::Unknown,
            rsi14: Field::Unknown,
            atr_pct: Field::Unknown,
            intraday_relvol: Field::Unknown,
            float_rotation_pct: Field::Unknown,
            friction_index: Field::Unknown,
        };

        let score = catalyst(&sym);
        assert_eq!(score.known(), Some(50.0));

        sym.catalyst_source_verified = true;
        let verified_score = catalyst(&sym).known().unwrap();
        assert_eq!(verified_score, 62.5);
    }
}
