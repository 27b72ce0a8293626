//! Exchange odds ladder.
//!
//! Limit prices must sit on one of 350 ticks between 1.01 and 1000, with
//! the increment growing in bands. Prices are kept as `Decimal` so tick
//! arithmetic is exact.

use std::sync::OnceLock;

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;

/// Direction to round an off-ladder price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Nearest,
    Up,
    Down,
}

#[derive(Debug, Clone)]
pub struct OddsLadder {
    ticks: Vec<Decimal>,
}

/// (upper bound of band, increment inside band)
fn bands() -> [(Decimal, Decimal); 10] {
    [
        (dec!(2), dec!(0.01)),
        (dec!(3), dec!(0.02)),
        (dec!(4), dec!(0.05)),
        (dec!(6), dec!(0.1)),
        (dec!(10), dec!(0.2)),
        (dec!(20), dec!(0.5)),
        (dec!(30), dec!(1)),
        (dec!(50), dec!(2)),
        (dec!(100), dec!(5)),
        (dec!(1000), dec!(10)),
    ]
}

impl Default for OddsLadder {
    fn default() -> Self {
        Self::new()
    }
}

impl OddsLadder {
    pub fn new() -> Self {
        let mut ticks = Vec::with_capacity(350);
        let mut price = dec!(1.00);
        for (upper, step) in bands() {
            while price < upper {
                price += step;
                ticks.push(price.normalize());
            }
        }
        Self { ticks }
    }

    pub fn ticks(&self) -> &[Decimal] {
        &self.ticks
    }

    pub fn min_price(&self) -> Decimal {
        self.ticks[0]
    }

    pub fn max_price(&self) -> Decimal {
        self.ticks[self.ticks.len() - 1]
    }

    /// Position of an exact ladder price.
    pub fn index_of(&self, price: Decimal) -> Option<usize> {
        self.ticks.binary_search(&price.normalize()).ok()
    }

    /// Snap `price` onto the ladder. Prices outside the ladder clamp to its
    /// ends.
    pub fn round(&self, price: Decimal, mode: Rounding) -> Decimal {
        match self.ticks.binary_search(&price) {
            Ok(i) => self.ticks[i],
            Err(0) => self.min_price(),
            Err(i) if i == self.ticks.len() => self.max_price(),
            Err(i) => {
                let below = self.ticks[i - 1];
                let above = self.ticks[i];
                match mode {
                    Rounding::Up => above,
                    Rounding::Down => below,
                    Rounding::Nearest => {
                        if above - price <= price - below {
                            above
                        } else {
                            below
                        }
                    }
                }
            }
        }
    }

    /// `round` for float prices; `None` for NaN or infinities.
    pub fn round_f64(&self, price: f64, mode: Rounding) -> Option<f64> {
        let price = Decimal::from_f64(price)?;
        self.round(price, mode).to_f64()
    }

    /// Move `price` by `pips` ticks, stopping at either end of the ladder.
    /// The price is snapped to the nearest tick first.
    pub fn shift(&self, price: Decimal, pips: i64) -> Decimal {
        let start = self.round(price, Rounding::Nearest);
        let i = self.index_of(start).unwrap_or(0) as i64;
        let j = (i + pips).clamp(0, self.ticks.len() as i64 - 1);
        self.ticks[j as usize]
    }

    /// Number of ticks between a back and a lay price (positive when the
    /// lay is above the back).
    pub fn tick_spread(&self, back: Decimal, lay: Decimal) -> i64 {
        let b = self.index_of(self.round(back, Rounding::Nearest)).unwrap_or(0) as i64;
        let l = self.index_of(self.round(lay, Rounding::Nearest)).unwrap_or(0) as i64;
        l - b
    }
}

/// Shared ladder instance.
pub fn ladder() -> &'static OddsLadder {
    static LADDER: OnceLock<OddsLadder> = OnceLock::new();
    LADDER.get_or_init(OddsLadder::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_shape() {
        let l = ladder();
        assert_eq!(l.ticks().len(), 350);
        assert_eq!(l.min_price(), dec!(1.01));
        assert_eq!(l.max_price(), dec!(1000));
        assert!(l.ticks().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_band_boundaries() {
        let l = ladder();
        assert_eq!(l.shift(dec!(2), 1), dec!(2.02));
        assert_eq!(l.shift(dec!(3), 1), dec!(3.05));
        assert_eq!(l.shift(dec!(10), 1), dec!(10.5));
        assert_eq!(l.shift(dec!(100), 1), dec!(110));
        assert_eq!(l.shift(dec!(2.02), -1), dec!(2));
    }

    #[test]
    fn test_rounding_modes() {
        let l = ladder();
        assert_eq!(l.round(dec!(2.03), Rounding::Up), dec!(2.04));
        assert_eq!(l.round(dec!(2.03), Rounding::Down), dec!(2.02));
        assert_eq!(l.round(dec!(3.06), Rounding::Nearest), dec!(3.05));
        assert_eq!(l.round(dec!(3.5), Rounding::Nearest), dec!(3.5));
        assert_eq!(l.round(dec!(1.001), Rounding::Down), dec!(1.01));
        assert_eq!(l.round(dec!(5000), Rounding::Up), dec!(1000));
    }

    #[test]
    fn test_round_f64() {
        let l = ladder();
        assert_eq!(l.round_f64(4.33, Rounding::Nearest), Some(4.3));
        assert_eq!(l.round_f64(f64::NAN, Rounding::Nearest), None);
    }

    #[test]
    fn test_shift_saturates() {
        let l = ladder();
        assert_eq!(l.shift(dec!(1.02), -5), dec!(1.01));
        assert_eq!(l.shift(dec!(990), 3), dec!(1000));
    }

    #[test]
    fn test_tick_spread() {
        let l = ladder();
        assert_eq!(l.tick_spread(dec!(1.98), dec!(2.04)), 4);
        assert_eq!(l.tick_spread(dec!(5.0), dec!(5.0)), 0);
        assert_eq!(l.tick_spread(dec!(6.2), dec!(6.0)), -1);
    }
}
