//! Integer-micros money representation.
//!
//! Prices and order amounts are stored as `i64` micros (1 unit = 1_000_000
//! micros) so that equality and ordering of bids are exact. `f64` values
//! exist only at the HTTP boundary:
//!
//! | Direction            | Function            |
//! |----------------------|---------------------|
//! | internal → JSON API  | [`micros_to_price`] |
//! | JSON API → internal  | [`price_to_micros`] |

/// Scale factor: 1 currency unit = 1_000_000 micros.
pub const MICROS_PER_UNIT: i64 = 1_000_000;

/// Errors returned by [`price_to_micros`] when the input is not representable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PricingError {
    #[error("price is not finite (NaN or Inf)")]
    NotFinite,
    #[error("price out of range after scaling to micros")]
    OutOfRange,
}

pub fn micros_to_price(micros: i64) -> f64 {
    micros as f64 / MICROS_PER_UNIT as f64
}

/// Convert a decimal amount received over the API into micros, rounding to
/// the nearest micro.
pub fn price_to_micros(price: f64) -> Result<i64, PricingError> {
    if !price.is_finite() {
        return Err(PricingError::NotFinite);
    }
    scaled_to_micros(price * MICROS_PER_UNIT as f64)
}

/// `i64::MAX as f64` rounds up to 2^63, which is itself out of range, so
/// the upper bound is exclusive. `as` saturates on overflow; reject instead.
fn scaled_to_micros(scaled: f64) -> Result<i64, PricingError> {
    if scaled >= i64::MAX as f64 || scaled < i64::MIN as f64 {
        return Err(PricingError::OutOfRange);
    }
    Ok(scaled.round() as i64)
}
