//! Guest value model
//!
//! A guest value is one of: the guest's null, a scalar passed by value, an
//! opaque foreign object that answers capability messages, or a host object
//! that was handed to the guest earlier and is passed back unchanged.

use std::fmt;
use std::sync::Arc;

use crate::object::{ForeignObject, HostObject};

/// Shared handle to a foreign (guest owned) object.
pub type ForeignRef = Arc<dyn ForeignObject>;

/// Shared handle to a host object living inside a guest.
pub type HostRef = Arc<dyn HostObject>;

// ============================================================================
// Primitive
// ============================================================================

/// A guest scalar, passed by value across the boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum Primitive {
    /// Boolean
    Boolean(bool),
    /// 8-bit signed integer
    Byte(i8),
    /// 16-bit signed integer
    Short(i16),
    /// 32-bit signed integer
    Int(i32),
    /// 64-bit signed integer
    Long(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// A single character
    Char(char),
    /// Immutable string
    String(Arc<str>),
}

impl Primitive {
    /// Name of the scalar kind, as shown in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Primitive::Boolean(_) => "boolean",
            Primitive::Byte(_) => "byte",
            Primitive::Short(_) => "short",
            Primitive::Int(_) => "int",
            Primitive::Long(_) => "long",
            Primitive::Float(_) => "float",
            Primitive::Double(_) => "double",
            Primitive::Char(_) => "char",
            Primitive::String(_) => "string",
        }
    }

    /// Whether this scalar is one of the numeric kinds
    pub fn is_number(&self) -> bool {
        matches!(
            self,
            Primitive::Byte(_)
                | Primitive::Short(_)
                | Primitive::Int(_)
                | Primitive::Long(_)
                | Primitive::Float(_)
                | Primitive::Double(_)
        )
    }

    /// Borrow the string payload, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Primitive::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Boolean(b) => write!(f, "{}", b),
            Primitive::Byte(v) => write!(f, "{}", v),
            Primitive::Short(v) => write!(f, "{}", v),
            Primitive::Int(v) => write!(f, "{}", v),
            Primitive::Long(v) => write!(f, "{}", v),
            Primitive::Float(v) => write!(f, "{}", v),
            Primitive::Double(v) => write!(f, "{}", v),
            Primitive::Char(c) => write!(f, "{}", c),
            Primitive::String(s) => f.write_str(s),
        }
    }
}

// ============================================================================
// Guest Value
// ============================================================================

/// A value as seen on the guest side of the boundary.
#[derive(Clone)]
pub enum GuestValue {
    /// The guest's null
    Null,
    /// A scalar
    Primitive(Primitive),
    /// A foreign object reachable only through capability messages
    Object(ForeignRef),
    /// A host object passed into the guest
    Host(HostRef),
}

impl GuestValue {
    /// Wrap a foreign object
    pub fn object<T: ForeignObject>(object: T) -> Self {
        GuestValue::Object(Arc::new(object))
    }

    /// Wrap a host object
    pub fn host<T: HostObject>(object: T) -> Self {
        GuestValue::Host(Arc::new(object))
    }

    /// Whether this value is null, either directly or because a foreign
    /// object reports itself as null
    pub fn is_null(&self) -> bool {
        match self {
            GuestValue::Null => true,
            GuestValue::Object(object) => object.is_null(),
            _ => false,
        }
    }

    /// Borrow the foreign object, if any
    pub fn as_object(&self) -> Option<&ForeignRef> {
        match self {
            GuestValue::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Borrow the scalar, if any
    pub fn as_primitive(&self) -> Option<&Primitive> {
        match self {
            GuestValue::Primitive(p) => Some(p),
            _ => None,
        }
    }

    /// The scalar carried by this value: either the value itself or the
    /// result of unboxing a boxed foreign object
    pub fn unboxed(&self) -> Option<Primitive> {
        match self {
            GuestValue::Primitive(p) => Some(p.clone()),
            GuestValue::Object(object) => object.unbox(),
            _ => None,
        }
    }
}

impl fmt::Debug for GuestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuestValue::Null => f.write_str("Null"),
            GuestValue::Primitive(p) => write!(f, "Primitive({:?})", p),
            GuestValue::Object(object) => write!(
                f,
                "Object({}: {})",
                object.language(),
                object.display_string()
            ),
            GuestValue::Host(host) => write!(f, "Host({})", host.class_name()),
        }
    }
}

impl From<Primitive> for GuestValue {
    fn from(p: Primitive) -> Self {
        GuestValue::Primitive(p)
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for GuestValue {
                fn from(v: $ty) -> Self {
                    GuestValue::Primitive(Primitive::$variant(v))
                }
            }
        )*
    };
}

impl_from_scalar! {
    bool => Boolean,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    char => Char,
}

impl From<&str> for GuestValue {
    fn from(s: &str) -> Self {
        GuestValue::Primitive(Primitive::String(Arc::from(s)))
    }
}

impl From<String> for GuestValue {
    fn from(s: String) -> Self {
        GuestValue::Primitive(Primitive::String(Arc::from(s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{BoxedObject, NullObject};

    #[test]
    fn test_null_detection() {
        assert!(GuestValue::Null.is_null());
        assert!(GuestValue::object(NullObject).is_null());
        assert!(!GuestValue::from(0).is_null());
    }

    #[test]
    fn test_unboxed_reads_through_boxed_objects() {
        let boxed = GuestValue::object(BoxedObject::new(Primitive::Int(42)));
        assert_eq!(boxed.unboxed(), Some(Primitive::Int(42)));
        assert_eq!(GuestValue::from("x").unboxed(), Some(Primitive::String("x".into())));
        assert_eq!(GuestValue::Null.unboxed(), None);
    }

    #[test]
    fn test_primitive_display() {
        assert_eq!(Primitive::Boolean(true).to_string(), "true");
        assert_eq!(Primitive::Char('c').to_string(), "c");
        assert_eq!(Primitive::Long(-7).to_string(), "-7");
        assert_eq!(Primitive::String("abc".into()).to_string(), "abc");
    }
}
