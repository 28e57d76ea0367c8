use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize, Serializer};

/// Identifier of a partition (shard) within a pool.
pub type PartitionId = u32;

/// The category a value belongs to. Uniqueness is enforced separately per
/// kind: an integer never collides with a float.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    #[serde(alias = "integer")]
    Int,
    Float,
}

impl Kind {
    pub const ALL: [Self; 2] = [Self::Int, Self::Float];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "int" | "integer" => Ok(Self::Int),
            "float" => Ok(Self::Float),
            other => Err(format!("unknown value kind `{other}` (expected `int` or `float`)")),
        }
    }
}

/// A non-negative decimal with a fixed number of fractional digits.
///
/// Stored as an integer count of `10^-scale` units so that equality, hashing
/// and ordering are exact. Two raw draws that round to the same decimal are
/// the same `Fixed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fixed {
    units: u64,
    scale: u8,
}

impl Fixed {
    /// Largest supported scale. Keeps `10^scale` well inside `u64` and the
    /// rounded value exactly representable for the configured ranges.
    pub const MAX_SCALE: u8 = 9;

    pub const fn from_units(units: u64, scale: u8) -> Self {
        Self { units, scale }
    }

    /// Rounds `raw` to `scale` decimal places (half away from zero).
    ///
    /// Negative and non-finite inputs clamp to zero.
    pub fn round(raw: f64, scale: u8) -> Self {
        let factor = Self::factor(scale) as f64;
        let scaled = (raw * factor).round();
        let units = if scaled.is_finite() && scaled > 0.0 {
            scaled as u64
        } else {
            0
        };
        Self { units, scale }
    }

    pub const fn units(self) -> u64 {
        self.units
    }

    pub const fn scale(self) -> u8 {
        self.scale
    }

    pub fn to_f64(self) -> f64 {
        self.units as f64 / Self::factor(self.scale) as f64
    }

    const fn factor(scale: u8) -> u64 {
        10_u64.pow(scale as u32)
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.units);
        }
        let factor = Self::factor(self.scale);
        write!(
            f,
            "{}.{:0width$}",
            self.units / factor,
            self.units % factor,
            width = self.scale as usize
        )
    }
}

/// A single poolable value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Int(u64),
    Float(Fixed),
}

impl Value {
    pub const fn kind(&self) -> Kind {
        match self {
            Self::Int(_) => Kind::Int,
            Self::Float(_) => Kind::Float,
        }
    }

    /// The integer key this value is stored under within its kind.
    pub const fn key(&self) -> u64 {
        match self {
            Self::Int(v) => *v,
            Self::Float(f) => f.units(),
        }
    }

    /// Rebuilds a value from its storage key.
    pub const fn from_key(kind: Kind, key: u64, scale: u8) -> Self {
        match kind {
            Kind::Int => Self::Int(key),
            Kind::Float => Self::Float(Fixed::from_units(key, scale)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

// Values travel over the wire as plain JSON numbers.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Int(v) => serializer.serialize_u64(*v),
            Self::Float(v) => serializer.serialize_f64(v.to_f64()),
        }
    }
}

/// The candidate space values are drawn from.
///
/// Shared by generators and journals: a journal records the float scale in
/// its header so that reopening it under a different precision is refused.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ValueSpace {
    /// Integer candidates are uniform over `0..2^int_bits`.
    pub int_bits: u32,
    /// Float candidates are uniform over `[0, float_max)` before rounding.
    pub float_max: f64,
    /// Decimal places floats are rounded to.
    pub float_scale: u8,
}

impl ValueSpace {
    pub const fn new(int_bits: u32, float_max: f64, float_scale: u8) -> Self {
        Self {
            int_bits,
            float_max,
            float_scale,
        }
    }

    /// The scale recorded for values of `kind`. Integers have none.
    pub const fn scale_for(&self, kind: Kind) -> u8 {
        match kind {
            Kind::Int => 0,
            Kind::Float => self.float_scale,
        }
    }
}

impl Default for ValueSpace {
    fn default() -> Self {
        Self::new(32, 10_000.0, 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_happens_before_identity() {
        let a = Fixed::round(12.345_61, 4);
        let b = Fixed::round(12.345_64, 4);
        assert_eq!(a, b);
        assert_eq!(Value::Float(a).key(), 123_456);
        assert_eq!(a.to_string(), "12.3456");
    }

    #[test]
    fn fixed_formats_leading_zeros() {
        assert_eq!(Fixed::from_units(5, 4).to_string(), "0.0005");
        assert_eq!(Fixed::from_units(42, 0).to_string(), "42");
    }

    #[test]
    fn negative_and_nan_clamp_to_zero() {
        assert_eq!(Fixed::round(-3.0, 2).units(), 0);
        assert_eq!(Fixed::round(f64::NAN, 2).units(), 0);
    }

    #[test]
    fn key_round_trips_per_kind() {
        let v = Value::Float(Fixed::from_units(99, 3));
        assert_eq!(Value::from_key(Kind::Float, v.key(), 3), v);
        assert_eq!(Value::from_key(Kind::Int, 7, 0), Value::Int(7));
    }

    #[test]
    fn kind_parses_aliases() {
        assert_eq!("INT".parse::<Kind>(), Ok(Kind::Int));
        assert_eq!("integer".parse::<Kind>(), Ok(Kind::Int));
        assert_eq!("float".parse::<Kind>(), Ok(Kind::Float));
        assert!("double".parse::<Kind>().is_err());
    }

    #[test]
    fn values_serialize_as_plain_numbers() {
        let int = serde_json::to_string(&Value::Int(42)).unwrap();
        let float = serde_json::to_string(&Value::Float(Fixed::from_units(12_500, 4))).unwrap();
        assert_eq!(int, "42");
        assert_eq!(float, "1.25");
    }
}
