pub mod composite;
pub mod reasons;
pub mod regime;
pub mod sub_scores;
pub mod weighting;

pub use composite::{
    apply_elastic_floor, composite_score, score_candidate, score_sub_scores, sort_candidates, tag,
};
pub use regime::classify_regime;
pub use sub_scores::{consecutive_up_days, ScoringContext};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use discovery_core::{EnrichedSymbol, Field, Regime, ScoreWeights, TickerSnapshot, TierThresholds};
    use rust_decimal::Decimal;

    fn enriched(symbol: &str, price: &str, relvol: f64) -> EnrichedSymbol {
        EnrichedSymbol {
            snapshot: TickerSnapshot {
                symbol: symbol.into(),
                last_price: price.parse().unwrap(),
                session_volume: 10_000_000,
                prev_close: price.parse().unwrap(),
                session_high: price.parse().unwrap(),
                session_low: price.parse().unwrap(),
                vwap: Field::Known(price.parse::<Decimal>().unwrap() * Decimal::new(99, 2)),
                open: price.parse().unwrap(),
                name: Field::Unknown,
            },
            avg_volume_20d: Field::Known(2_000_000),
            float_shares: Field::Known(15_000_000),
            short_interest_pct: Field::Known(25.0),
            borrow_fee_pct: Field::Known(10.0),
            utilization_pct: Field::Known(70.0),
            call_put_ratio: Field::Known(2.0),
            iv_percentile: Field::Known(80.0),
            catalyst_strength: Field::Known(90.0),
            catalyst_age_hours: Field::Known(2.0),
            catalyst_source_verified: true,
            sentiment_z_score: Field::Known(1.5),
            ema9: Field::Known(11.0),
            ema20: Field::Known(10.0),
            rsi14: Field::Known(65.0),
            atr_pct: Field::Known(4.0),
            intraday_relvol: Field::Known(relvol),
            float_rotation_pct: Field::Known(60.0),
            friction_index: Field::Known(50.0),
        }
    }

    fn ctx() -> ScoringContext {
        ScoringContext {
            regime: Regime::Normal,
            consecutive_up_days: Field::Known(3),
            atr_pct_10d_mean: Field::Known(3.0),
        }
    }

    #[test]
    fn sub_scores_and_composite_in_range() {
        let sym = enriched("AAA", "5.00", 6.0);
        let sub_scores = score_sub_scores(&sym, &ctx());
        for (_, score) in sub_scores.iter_named() {
            if let Field::Known(v) = score {
                assert!((0.0..=100.0).contains(&v));
            }
        }
        let (composite, confidence) = composite_score(&sub_scores, &ScoreWeights::ALPHASTACK_4_1);
        assert!((0.0..=100.0).contains(&composite));
        assert!((0.0..=1.0).contains(&confidence));
    }

    #[test]
    fn renormalization_matches_known_bucket_weighted_mean() {
        let sym = enriched("AAA", "5.00", 6.0);
        let mut sub_scores = score_sub_scores(&sym, &ctx());
        sub_scores.sentiment = Field::Unknown;

        let weights = ScoreWeights::ALPHASTACK_4_1;
        let (composite, confidence) = composite_score(&sub_scores, &weights);

        let known_weight = weights.sum() - weights.sentiment;
        let expected: f64 = sub_scores
            .iter_named()
            .filter_map(|(name, s)| s.known().map(|v| (weights.get(name).unwrap(), v)))
            .map(|(w, v)| w * v)
            .sum::<f64>()
            / known_weight;

        assert!((composite - (expected * 10.0).round() / 10.0).abs() < 1e-9);
        assert!((confidence - known_weight / weights.sum()).abs() < 1e-9);
    }

    #[test]
    fn higher_relvol_scores_higher() {
        let low = enriched("BBB", "12.00", 1.0);
        let high = enriched("AAA", "5.00", 8.0);
        let ctx = ctx();
        let (low_score, _) = composite_score(&score_sub_scores(&low, &ctx), &ScoreWeights::ALPHASTACK_4_1);
        let (high_score, _) = composite_score(&score_sub_scores(&high, &ctx), &ScoreWeights::ALPHASTACK_4_1);
        assert!(high_score > low_score);
    }

    #[test]
    fn ordering_tie_break_by_relvol_then_price() {
        let weights = ScoreWeights::ALPHASTACK_4_1;
        let thresholds = TierThresholds::default();
        let ctx = ctx();
        let now = Utc::now();

        let a = score_candidate(&enriched("AAA", "5.00", 8.0), &ctx, &weights, &thresholds, "default", false, now);
        let b = score_candidate(&enriched("BBB", "12.00", 8.0), &ctx, &weights, &thresholds, "default", false, now);

        let mut candidates = vec![b.unwrap(), a.unwrap()];
        // Equal composite/relvol/volume_momentum by construction; price
        // ascending should win the tie-break, putting AAA (5.00) first.
        candidates[0].composite_score = candidates[1].composite_score;
        sort_candidates(&mut candidates);
        assert_eq!(candidates[0].symbol, "AAA");
    }

    #[test]
    fn elastic_floor_promotes_without_touching_hard_guards() {
        let weights = ScoreWeights::ALPHASTACK_4_1;
        let thresholds = TierThresholds::default();
        let ctx = ctx();
        let now = Utc::now();

        let mut candidates: Vec<_> = (0..1)
            .filter_map(|_| score_candidate(&enriched("AAA", "5.00", 3.0), &ctx, &weights, &thresholds, "default", false, now))
            .collect();
        assert_eq!(candidates[0].action_tag, discovery_core::ActionTag::Monitor);

        apply_elastic_floor(&mut candidates, &thresholds, 1, false);
        assert_ne!(candidates[0].action_tag, discovery_core::ActionTag::Monitor);
    }

    #[test]
    fn stale_run_caps_every_candidate_at_monitor() {
        let weights = ScoreWeights::ALPHASTACK_4_1;
        let thresholds = TierThresholds::default();
        let ctx = ctx();
        let now = Utc::now();

        let candidate = score_candidate(&enriched("AAA", "5.00", 9.0), &ctx, &weights, &thresholds, "default", true, now).unwrap();
        assert_eq!(candidate.action_tag, discovery_core::ActionTag::Monitor);
    }
}
