use discovery_core::{EnrichedSymbol, Field};

/// Builds the 2-5 short machine-readable reason strings a candidate
/// carries, in the compact `key:value` shape the UI consumes as a
/// contract (not prose).
pub fn build_reasons(enriched: &EnrichedSymbol) -> Vec<String> {
    let mut reasons = Vec::new();

    if let Field::Known(relvol) = enriched.intraday_relvol {
        reasons.push(format!("relvol:{relvol:.1}x"));
    }
    if let Field::Known(rotation) = enriched.float_rotation_pct {
        reasons.push(format!("float_rotation:{rotation:.0}%"));
    }
    if enriched.catalyst_strength.is_known() {
        let freshness = match enriched.catalyst_age_hours {
            Field::Known(h) if h <= 6.0 => "fresh",
            Field::Known(h) if h <= 24.0 => "recent",
            _ => "aged",
        };
        let source = if enriched.catalyst_source_verified {
            "verified"
        } else {
            "unverified"
        };
        reasons.push(format!("catalyst:{freshness}_{source}"));
    }
    if let Field::Known(rsi) = enriched.rsi14 {
        reasons.push(format!("rsi14:{rsi:.0}"));
    }
    if let Field::Known(z) = enriched.sentiment_z_score {
        reasons.push(format!("sentiment_z:{z:.1}"));
    }
    if let Field::Known(cpr) = enriched.call_put_ratio {
        reasons.push(format!("call_put:{cpr:.2}"));
    }

    reasons.truncate(5);
    while reasons.len() < 2 {
        reasons.push("insufficient_data".to_string());
    }
    reasons
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_enriched() -> EnrichedSymbol {
        EnrichedSymbol {
            snapshot: discovery_core::TickerSnapshot {
                symbol: "AAA".to_string(),
                last_price: Default::default(),
                session_volume: 0,
                prev_close: Default::default(),
                session_high: Default::default(),
                session_low: Default::default(),
                vwap: Field::Unknown,
                open: Default::default(),
                name: Field::Unknown,
            },
            avg_volume_20d: Field::Unknown,
            float_shares: Field::Unknown,
            short_interest_pct: Field::Unknown,
            borrow_fee_pct: Field::Unknown,
            utilization_pct: Field::Unknown,
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
    fn no_known_fields_pads_to_two_reasons() {
        let reasons = build_reasons(&blank_enriched());
        assert_eq!(reasons.len(), 2);
        assert!(reasons.iter().all(|r| r == "insufficient_data"));
    }

    #[test]
    fn a_single_known_field_still_pads_to_two_reasons() {
        let mut enriched = blank_enriched();
        enriched.intraday_relvol = Field::Known(4.2);
        let reasons = build_reasons(&enriched);
        assert_eq!(reasons.len(), 2);
        assert_eq!(reasons[0], "relvol:4.2x");
        assert_eq!(reasons[1], "insufficient_data");
    }

    #[test]
    fn six_known_fields_truncate_to_five() {
        let mut enriched = blank_enriched();
        enriched.intraday_relvol = Field::Known(4.2);
        enriched.float_rotation_pct = Field::Known(12.0);
        enriched.catalyst_strength = Field::Known(90.0);
        enriched.catalyst_age_hours = Field::Known(2.0);
        enriched.catalyst_source_verified = true;
        enriched.rsi14 = Field::Known(65.0);
        enriched.sentiment_z_score = Field::Known(1.5);
        enriched.call_put_ratio = Field::Known(2.0);

        let reasons = build_reasons(&enriched);
        assert_eq!(reasons.len(), 5);
    }
}
