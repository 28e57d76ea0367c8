use crate::{CandidateSource, Fixed, Kind, Value, ValueSpace};
use rand::{Rng, rng};

/// A [`CandidateSource`] backed by the thread-local RNG (`rand::rng()`).
///
/// Integers are uniform over `0..2^int_bits`; floats are uniform over
/// `[0, float_max)` and rounded to `float_scale` decimals.
///
/// The RNG is fast and reseeded periodically, but this type makes no
/// unpredictability promise: do not hand out its values as secrets.
#[derive(Clone, Debug, Default)]
pub struct ThreadRandom {
    space: ValueSpace,
}

impl ThreadRandom {
    pub const fn new(space: ValueSpace) -> Self {
        Self { space }
    }

    pub const fn space(&self) -> &ValueSpace {
        &self.space
    }
}

impl CandidateSource for ThreadRandom {
    fn next(&self, kind: Kind) -> Value {
        match kind {
            Kind::Int => {
                let raw: u64 = rng().random();
                let bits = self.space.int_bits.clamp(1, 64);
                Value::Int(raw >> (64 - bits))
            }
            Kind::Float => {
                let raw: f64 = rng().random::<f64>() * self.space.float_max;
                Value::Float(Fixed::round(raw, self.space.float_scale))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ints_respect_bit_width() {
        let source = ThreadRandom::new(ValueSpace::new(3, 1.0, 0));
        for value in source.candidates(Kind::Int).take(1_000) {
            assert!(matches!(value, Value::Int(v) if v < 8));
        }
    }

    #[test]
    fn full_width_ints_do_not_overflow() {
        let source = ThreadRandom::new(ValueSpace::new(64, 1.0, 0));
        assert!(matches!(source.next(Kind::Int), Value::Int(_)));
    }

    #[test]
    fn floats_are_rounded_and_bounded() {
        let space = ValueSpace::new(32, 10.0, 2);
        let source = ThreadRandom::new(space);
        for value in source.candidates(Kind::Float).take(1_000) {
            let Value::Float(fixed) = value else {
                panic!("expected float, got {value:?}");
            };
            assert_eq!(fixed.scale(), 2);
            assert!(fixed.units() <= 1_000);
        }
    }
}
