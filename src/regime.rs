use crate::models::Category;

pub const BEARISH_FLOOR: f64 = 0.0;
pub const SIDEWAYS_BEARISH_FLOOR: f64 = 0.06;
pub const NEUTRAL_FLOOR: f64 = 0.10;
pub const BULLISH_FLOOR: f64 = 0.12;
pub const EXTREME_BULLISH_FLOOR: f64 = 0.15;

/// Maps an annualized CAGR onto its regime. Each bucket includes its lower
/// bound, so a value sitting on a threshold lands in the higher bucket.
pub fn classify(cagr: f64) -> Category {
    if cagr < BEARISH_FLOOR {
        Category::ExtremeBearish
    } else if cagr < SIDEWAYS_BEARISH_FLOOR {
        Category::Bearish
    } else if cagr < NEUTRAL_FLOOR {
        Category::SidewaysBearish
    } else if cagr < BULLISH_FLOOR {
        Category::Neutral
    } else if cagr < EXTREME_BULLISH_FLOOR {
        Category::Bullish
    } else {
        Category::ExtremeBullish
    }
}
