pub mod calculator;
pub mod indicators;

pub use calculator::{compute_features, tod_multiplier, Bar, TOD_CURVE};
pub use indicators::{atr, ema, finite_or, rsi, sma};

#[cfg(test)]
mod tests {
    use super::*;
    use discovery_core::{EnrichedSymbol, Field};
    use rust_decimal::Decimal;

    fn bar(close: f64) -> Bar {
        Bar {
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 1_000_000,
        }
    }

    fn base_symbol() -> EnrichedSymbol {
        discovery_core::EnrichedSymbol {
            snapshot: discovery_core::TickerSnapshot {
                symbol: "AAA".into(),
                last_price: Decimal::new(1000, 2),
                session_volume: 20_000_000,
                prev_close: Decimal::new(950, 2),
                session_high: Decimal::new(1050, 2),
                session_low: Decimal::new(980, 2),
                vwap: Field::Unknown,
                open: Decimal::new(990, 2),
                name: Field::Unknown,
            },
            avg_volume_20d: Field::Known(5_000_000),
            float_shares: Field::Known(10_000_000),
            short_interest_pct: Field::Known(20.0),
            borrow_fee_pct: Field::Unknown,
            utilization_pct: Field::Known(80.0),
            call_put_ratio: Field::Unknown,
            iv_percentile: Field::Unknown,
            catalyst_strength: Field::Unknown,
            catalyst_age_hours: Field::Unknown,
            catalyst_source_verified: false,
            sentiment_z_score: Field::Unknown,
            ema9: Field::Unknown,
            ema20: Field::Unknown,
            rsi14: Field::Unknown,
            atr_pct: Field::Unknown,
            intraday_relvol: Field::Unknown,
            float_rotation_pct: Field::Unknown,
            friction_index: Field::Unknown,
        }
    }

    #[test]
    fn relvol_uses_tod_curve_and_avg_volume() {
        let mut sym = base_symbol();
        let bars: Vec<Bar> = (0..30).map(|i| bar(10.0 + i as f64 * 0.05)).collect();
        compute_features(&mut sym, &bars, 10);

        match sym.intraday_relvol {
            Field::Known(v) => {
                let expected = 20_000_000.0 / (5_000_000.0 * 1.2);
                assert!((v - expected).abs() < 1e-6);
            }
            Field::Unknown => panic!("expected known relvol"),
        }
    }

    #[test]
    fn relvol_unknown_when_avg_volume_unknown() {
        let mut sym = base_symbol();
        sym.avg_volume_20d = Field::Unknown;
        let bars: Vec<Bar> = (0..30).map(|i| bar(10.0 + i as f64 * 0.05)).collect();
        compute_features(&mut sym, &bars, 10);
        assert!(!sym.intraday_relvol.is_known());
    }

    #[test]
    fn friction_index_renormalizes_over_known_components() {
        let mut sym = base_symbol();
        let bars: Vec<Bar> = (0..30).map(|i| bar(10.0 + i as f64 * 0.05)).collect();
        compute_features(&mut sym, &bars, 10);
        // borrow_fee_pct is unknown; friction_index should still be known,
        // computed over short_interest_pct (0.5) and utilization_pct (0.2).
        assert!(sym.friction_index.is_known());
    }
}
