// packages/engine/src/recording/scalar.rs
//! Primitive values and their 64-bit log encoding

use crate::probe::ValueDescriptor;
use serde::{Deserialize, Serialize};

/// A primitive observed at a probe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Char(char),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl Scalar {
    /// Encode into the event's value slot
    ///
    /// Integers widen arithmetically; floats keep their raw bits so NaN
    /// payloads and negative zero survive.
    pub fn encode(&self) -> i64 {
        match *self {
            Scalar::Bool(v) => v as i64,
            Scalar::Byte(v) => v as i64,
            Scalar::Short(v) => v as i64,
            Scalar::Char(v) => v as u32 as i64,
            Scalar::Int(v) => v as i64,
            Scalar::Long(v) => v,
            Scalar::Float(v) => v.to_bits() as i64,
            Scalar::Double(v) => v.to_bits() as i64,
        }
    }

    /// Inverse of [`Scalar::encode`]. `None` for non-primitive descriptors and
    /// raw values outside the descriptor's range.
    pub fn decode(descriptor: ValueDescriptor, raw: i64) -> Option<Scalar> {
        match descriptor {
            ValueDescriptor::Boolean => match raw {
                0 => Some(Scalar::Bool(false)),
                1 => Some(Scalar::Bool(true)),
                _ => None,
            },
            ValueDescriptor::Byte => i8::try_from(raw).ok().map(Scalar::Byte),
            ValueDescriptor::Short => i16::try_from(raw).ok().map(Scalar::Short),
            ValueDescriptor::Char => u32::try_from(raw)
                .ok()
                .and_then(char::from_u32)
                .map(Scalar::Char),
            ValueDescriptor::Integer => i32::try_from(raw).ok().map(Scalar::Int),
            ValueDescriptor::Long => Some(Scalar::Long(raw)),
            ValueDescriptor::Float => u32::try_from(raw)
                .ok()
                .map(|bits| Scalar::Float(f32::from_bits(bits))),
            ValueDescriptor::Double => Some(Scalar::Double(f64::from_bits(raw as u64))),
            ValueDescriptor::Void | ValueDescriptor::Object => None,
        }
    }

    pub fn descriptor(&self) -> ValueDescriptor {
        match self {
            Scalar::Bool(_) => ValueDescriptor::Boolean,
            Scalar::Byte(_) => ValueDescriptor::Byte,
            Scalar::Short(_) => ValueDescriptor::Short,
            Scalar::Char(_) => ValueDescriptor::Char,
            Scalar::Int(_) => ValueDescriptor::Integer,
            Scalar::Long(_) => ValueDescriptor::Long,
            Scalar::Float(_) => ValueDescriptor::Float,
            Scalar::Double(_) => ValueDescriptor::Double,
        }
    }

    /// Bitwise equality; unlike `==`, NaN equals itself
    pub fn same_bits(&self, other: &Scalar) -> bool {
        self.descriptor() == other.descriptor() && self.encode() == other.encode()
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<i8> for Scalar {
    fn from(v: i8) -> Self {
        Scalar::Byte(v)
    }
}

impl From<i16> for Scalar {
    fn from(v: i16) -> Self {
        Scalar::Short(v)
    }
}

impl From<char> for Scalar {
    fn from(v: char) -> Self {
        Scalar::Char(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Int(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Long(v)
    }
}

impl From<f32> for Scalar {
    fn from(v: f32) -> Self {
        Scalar::Float(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Double(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_integer_widening() {
        assert_eq!(Scalar::Bool(true).encode(), 1);
        assert_eq!(Scalar::Byte(-1).encode(), -1);
        assert_eq!(Scalar::Short(i16::MIN).encode(), i16::MIN as i64);
        assert_eq!(Scalar::Char('é').encode(), 0xE9);
        assert_eq!(Scalar::Int(-5).encode(), -5);
    }

    #[test]
    fn test_float_bits_zero_extended() {
        let encoded = Scalar::Float(-0.0).encode();
        assert_eq!(encoded, 0x8000_0000);
        assert!(encoded > 0);

        let decoded = Scalar::decode(ValueDescriptor::Float, encoded).unwrap();
        assert!(decoded.same_bits(&Scalar::Float(-0.0)));
        assert_ne!(
            Scalar::Float(-0.0).encode(),
            Scalar::Float(0.0).encode()
        );
    }

    #[test]
    fn test_decode_rejects_out_of_range() {
        assert_eq!(Scalar::decode(ValueDescriptor::Boolean, 2), None);
        assert_eq!(Scalar::decode(ValueDescriptor::Byte, 300), None);
        assert_eq!(Scalar::decode(ValueDescriptor::Char, 0xD800), None);
        assert_eq!(Scalar::decode(ValueDescriptor::Float, -1), None);
        assert_eq!(Scalar::decode(ValueDescriptor::Object, 0), None);
    }

    #[test]
    fn test_nan_payload_preserved() {
        let nan = f64::from_bits(0x7ff8_dead_beef_0001);
        let scalar = Scalar::Double(nan);
        let back = Scalar::decode(ValueDescriptor::Double, scalar.encode()).unwrap();

        assert!(back.same_bits(&scalar));
        assert_ne!(back, scalar);
    }

    proptest! {
        #[test]
        fn prop_double_bits_round_trip(bits in any::<u64>()) {
            let scalar = Scalar::Double(f64::from_bits(bits));
            let back = Scalar::decode(ValueDescriptor::Double, scalar.encode()).unwrap();
            prop_assert!(back.same_bits(&scalar));
        }

        #[test]
        fn prop_float_bits_round_trip(bits in any::<u32>()) {
            let scalar = Scalar::Float(f32::from_bits(bits));
            let back = Scalar::decode(ValueDescriptor::Float, scalar.encode()).unwrap();
            prop_assert!(back.same_bits(&scalar));
        }

        #[test]
        fn prop_integers_round_trip(v in any::<i32>(), c in any::<char>()) {
            prop_assert_eq!(Scalar::decode(ValueDescriptor::Integer, Scalar::Int(v).encode()), Some(Scalar::Int(v)));
            prop_assert_eq!(Scalar::decode(ValueDescriptor::Char, Scalar::Char(c).encode()), Some(Scalar::Char(c)));
        }
    }
}
