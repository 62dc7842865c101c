//! Exact primitive coercion
//!
//! A guest scalar converts to a host primitive target only when the value is
//! represented exactly: integers must fit the target width, floating values
//! must be integral (and not negative zero) to become integers, and integers
//! cross into floating types only inside the range where every integer is
//! representable.

use tandem_sdk::Primitive;

use crate::host_value::HostValue;
use crate::types::{HostClass, PrimitiveKind};

/// Largest integer magnitude every `f32` represents exactly
pub const MAX_SAFE_FLOAT: i64 = (1 << 24) - 1;

/// Largest integer magnitude every `f64` represents exactly
pub const MAX_SAFE_DOUBLE: i64 = (1 << 53) - 1;

/// Convert `value` to the primitive-coercible `target`, or `None` when the
/// conversion would lose information or the kinds are unrelated
pub fn to_primitive(value: &Primitive, target: &HostClass) -> Option<HostValue> {
    match target {
        HostClass::Primitive(kind) | HostClass::Boxed(kind) => to_kind(value, *kind),
        HostClass::String | HostClass::CharSequence => match value {
            Primitive::String(s) => Some(HostValue::String(s.to_string())),
            Primitive::Char(c) => Some(HostValue::String(c.to_string())),
            _ => None,
        },
        HostClass::Number => match value {
            Primitive::Byte(v) => Some(HostValue::Byte(*v)),
            Primitive::Short(v) => Some(HostValue::Short(*v)),
            Primitive::Int(v) => Some(HostValue::Int(*v)),
            Primitive::Long(v) => Some(HostValue::Long(*v)),
            Primitive::Float(v) => Some(HostValue::Float(*v)),
            Primitive::Double(v) => Some(HostValue::Double(*v)),
            _ => None,
        },
        _ => None,
    }
}

fn to_kind(value: &Primitive, kind: PrimitiveKind) -> Option<HostValue> {
    match kind {
        PrimitiveKind::Boolean => match value {
            Primitive::Boolean(b) => Some(HostValue::Boolean(*b)),
            _ => None,
        },
        PrimitiveKind::Byte => exact_integer(value)
            .and_then(|v| i8::try_from(v).ok())
            .map(HostValue::Byte),
        PrimitiveKind::Short => exact_integer(value)
            .and_then(|v| i16::try_from(v).ok())
            .map(HostValue::Short),
        PrimitiveKind::Int => exact_integer(value)
            .and_then(|v| i32::try_from(v).ok())
            .map(HostValue::Int),
        PrimitiveKind::Long => exact_integer(value).map(HostValue::Long),
        PrimitiveKind::Float => exact_float(value).map(HostValue::Float),
        PrimitiveKind::Double => exact_double(value).map(HostValue::Double),
        PrimitiveKind::Char => match value {
            Primitive::Char(c) => Some(HostValue::Char(*c)),
            Primitive::String(s) => single_char(s).map(HostValue::Char),
            _ => None,
        },
    }
}

/// Integer value of a numeric scalar, when it has an exact one
pub fn to_integer(value: &Primitive) -> Option<i64> {
    exact_integer(value)
}

/// A numeric scalar read as a UTF-16 code unit, when it is in range and
/// denotes a valid `char`
pub fn to_char_code(value: &Primitive) -> Option<char> {
    to_integer(value)
        .filter(|v| (0..=0xFFFF).contains(v))
        .and_then(|v| char::from_u32(v as u32))
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

fn exact_integer(value: &Primitive) -> Option<i64> {
    match value {
        Primitive::Byte(v) => Some(i64::from(*v)),
        Primitive::Short(v) => Some(i64::from(*v)),
        Primitive::Int(v) => Some(i64::from(*v)),
        Primitive::Long(v) => Some(*v),
        Primitive::Float(v) => integral(f64::from(*v), MAX_SAFE_FLOAT),
        Primitive::Double(v) => integral(*v, MAX_SAFE_DOUBLE),
        _ => None,
    }
}

fn integral(value: f64, limit: i64) -> Option<i64> {
    let negative_zero = value == 0.0 && value.is_sign_negative();
    if value.is_finite() && value.fract() == 0.0 && !negative_zero && value.abs() <= limit as f64 {
        Some(value as i64)
    } else {
        None
    }
}

fn exact_double(value: &Primitive) -> Option<f64> {
    match value {
        Primitive::Double(v) => Some(*v),
        Primitive::Float(v) => Some(f64::from(*v)),
        Primitive::Byte(v) => Some(f64::from(*v)),
        Primitive::Short(v) => Some(f64::from(*v)),
        Primitive::Int(v) => Some(f64::from(*v)),
        Primitive::Long(v) if v.unsigned_abs() <= MAX_SAFE_DOUBLE as u64 => Some(*v as f64),
        _ => None,
    }
}

fn exact_float(value: &Primitive) -> Option<f32> {
    match value {
        Primitive::Float(v) => Some(*v),
        Primitive::Double(v) => {
            let narrowed = *v as f32;
            if v.is_nan() || f64::from(narrowed) == *v {
                Some(narrowed)
            } else {
                None
            }
        }
        Primitive::Byte(v) => Some(f32::from(*v)),
        Primitive::Short(v) => Some(f32::from(*v)),
        Primitive::Int(v) if i64::from(*v).abs() <= MAX_SAFE_FLOAT => Some(*v as f32),
        Primitive::Long(v) if v.unsigned_abs() <= MAX_SAFE_FLOAT as u64 => Some(*v as f32),
        _ => None,
    }
}
