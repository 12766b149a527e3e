use discovery_core::Regime;

/// Detect regime from SPY ATR% and a market volatility index proxy (VIX).
pub fn classify_regime(spy_atr_pct: f64, vix: f64) -> Regime {
    if spy_atr_pct > 3.0 || vix > 25.0 {
        Regime::HighVol
    } else if spy_atr_pct < 1.5 && vix < 15.0 {
        Regime::LowVol
    } else {
        Regime::Normal
    }
}

/// RSI "sweet spot" band, (low, high), per regime.
pub fn rsi_sweet_spot(regime: Regime) -> (f64, f64) {
    match regime {
        Regime::Normal => (60.0, 70.0),
        Regime::HighVol => (65.0, 75.0),
        Regime::LowVol => (55.0, 65.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_vol_from_spy_atr() {
        assert_eq!(classify_regime(3.5, 18.0), Regime::HighVol);
    }

    #[test]
    fn high_vol_from_vix() {
        assert_eq!(classify_regime(2.0, 30.0), Regime::HighVol);
    }

    #[test]
    fn low_vol_requires_both() {
        assert_eq!(classify_regime(1.0, 10.0), Regime::LowVol);
        assert_eq!(classify_regime(1.0, 20.0), Regime::Normal);
    }
}
