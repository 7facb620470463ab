//! Numeric values as templates see them.

use std::fmt;

/// A template-visible number.
///
/// Host integers of any width arrive as `Int`; floating point values as
/// `Float`. Template arithmetic is the execution engine's concern - this
/// type only preserves enough to round-trip and format.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Number {
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
}

impl Number {
    /// The value as an `f64`. Lossy for very large integers.
    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Int(i) => *i as f64,
            Number::Float(f) => *f,
        }
    }

    /// The value as an `i64`, if it is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Number::Int(i) => Some(*i),
            Number::Float(_) => None,
        }
    }

    /// Whether this number carries an integer representation.
    pub fn is_int(&self) -> bool {
        matches!(self, Number::Int(_))
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{}", i),
            Number::Float(v) => write!(f, "{}", v),
        }
    }
}

impl From<i8> for Number {
    fn from(v: i8) -> Self {
        Number::Int(v as i64)
    }
}

impl From<i16> for Number {
    fn from(v: i16) -> Self {
        Number::Int(v as i64)
    }
}

impl From<i32> for Number {
    fn from(v: i32) -> Self {
        Number::Int(v as i64)
    }
}

impl From<i64> for Number {
    fn from(v: i64) -> Self {
        Number::Int(v)
    }
}

impl From<u8> for Number {
    fn from(v: u8) -> Self {
        Number::Int(v as i64)
    }
}

impl From<u32> for Number {
    fn from(v: u32) -> Self {
        Number::Int(v as i64)
    }
}

impl From<f32> for Number {
    fn from(v: f32) -> Self {
        Number::Float(v as f64)
    }
}

impl From<f64> for Number {
    fn from(v: f64) -> Self {
        Number::Float(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_round_trips() {
        let n = Number::from(42i32);
        assert_eq!(n.as_i64(), Some(42));
        assert!(n.is_int());
        assert_eq!(format!("{}", n), "42");
    }

    #[test]
    fn float_has_no_i64_form() {
        let n = Number::from(1.5f64);
        assert_eq!(n.as_i64(), None);
        assert_eq!(n.as_f64(), 1.5);
    }

    #[test]
    fn narrow_integers_widen() {
        assert_eq!(Number::from(5i8), Number::Int(5));
        assert_eq!(Number::from(5u8), Number::Int(5));
        assert_eq!(Number::from(5i64), Number::Int(5));
    }
}
