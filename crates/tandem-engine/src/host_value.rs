//! Host-side values
//!
//! [`HostValue`] is what conversions produce and what host code passes back
//! into guests. Scalars are held by value; structural values are live views
//! over a guest object and compare by identity.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tandem_sdk::HostRef;

use crate::proxy::InterfaceProxy;
use crate::types::{HostClass, HostType, PrimitiveKind};
use crate::views::{
    ByteSequenceView, FunctionView, IterableView, IteratorView, ListView, MapEntryView, MapView,
    ValueHandle,
};

/// A value on the host side of the boundary.
#[derive(Clone)]
pub enum HostValue {
    Null,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(char),
    String(String),
    /// A host array; shared and mutable, like any host reference
    Array(HostArray),
    List(ListView),
    Map(MapView),
    Entry(MapEntryView),
    Iterable(IterableView),
    Iterator(IteratorView),
    Function(FunctionView),
    Bytes(ByteSequenceView),
    Proxy(InterfaceProxy),
    Value(ValueHandle),
    /// An opaque host object
    Object(HostRef),
}

impl HostValue {
    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    /// Runtime class of the value; `None` for null
    pub fn class(&self) -> Option<HostClass> {
        let class = match self {
            HostValue::Null => return None,
            HostValue::Boolean(_) => HostClass::Boxed(PrimitiveKind::Boolean),
            HostValue::Byte(_) => HostClass::Boxed(PrimitiveKind::Byte),
            HostValue::Short(_) => HostClass::Boxed(PrimitiveKind::Short),
            HostValue::Int(_) => HostClass::Boxed(PrimitiveKind::Int),
            HostValue::Long(_) => HostClass::Boxed(PrimitiveKind::Long),
            HostValue::Float(_) => HostClass::Boxed(PrimitiveKind::Float),
            HostValue::Double(_) => HostClass::Boxed(PrimitiveKind::Double),
            HostValue::Char(_) => HostClass::Boxed(PrimitiveKind::Char),
            HostValue::String(_) => HostClass::String,
            HostValue::Array(array) => HostClass::Array(Box::new(array.component().class().clone())),
            HostValue::List(_) => HostClass::List,
            HostValue::Map(_) => HostClass::Map,
            HostValue::Entry(_) => HostClass::MapEntry,
            HostValue::Iterable(_) => HostClass::Iterable,
            HostValue::Iterator(_) => HostClass::Iterator,
            HostValue::Function(_) => HostClass::Function,
            HostValue::Bytes(_) => HostClass::ByteSequence,
            HostValue::Proxy(proxy) => HostClass::Interface(proxy.interface().clone()),
            HostValue::Value(_) => HostClass::Value,
            HostValue::Object(object) => HostClass::Named(Arc::from(object.class_name())),
        };
        Some(class)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Integral payload widened to `i64`
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HostValue::Byte(v) => Some(i64::from(*v)),
            HostValue::Short(v) => Some(i64::from(*v)),
            HostValue::Int(v) => Some(i64::from(*v)),
            HostValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            HostValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Floating payload widened to `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Float(v) => Some(f64::from(*v)),
            HostValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_char(&self) -> Option<char> {
        match self {
            HostValue::Char(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&HostArray> {
        match self {
            HostValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListView> {
        match self {
            HostValue::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapView> {
        match self {
            HostValue::Map(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_iterable(&self) -> Option<&IterableView> {
        match self {
            HostValue::Iterable(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_iterator(&self) -> Option<&IteratorView> {
        match self {
            HostValue::Iterator(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionView> {
        match self {
            HostValue::Function(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&ByteSequenceView> {
        match self {
            HostValue::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&InterfaceProxy> {
        match self {
            HostValue::Proxy(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&ValueHandle> {
        match self {
            HostValue::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Null, HostValue::Null) => true,
            (HostValue::Boolean(a), HostValue::Boolean(b)) => a == b,
            (HostValue::Byte(a), HostValue::Byte(b)) => a == b,
            (HostValue::Short(a), HostValue::Short(b)) => a == b,
            (HostValue::Int(a), HostValue::Int(b)) => a == b,
            (HostValue::Long(a), HostValue::Long(b)) => a == b,
            (HostValue::Float(a), HostValue::Float(b)) => a.to_bits() == b.to_bits(),
            (HostValue::Double(a), HostValue::Double(b)) => a.to_bits() == b.to_bits(),
            (HostValue::Char(a), HostValue::Char(b)) => a == b,
            (HostValue::String(a), HostValue::String(b)) => a == b,
            (HostValue::Array(a), HostValue::Array(b)) => a == b,
            (HostValue::List(a), HostValue::List(b)) => a == b,
            (HostValue::Map(a), HostValue::Map(b)) => a == b,
            (HostValue::Entry(a), HostValue::Entry(b)) => a == b,
            (HostValue::Iterable(a), HostValue::Iterable(b)) => a == b,
            (HostValue::Iterator(a), HostValue::Iterator(b)) => a == b,
            (HostValue::Function(a), HostValue::Function(b)) => a == b,
            (HostValue::Bytes(a), HostValue::Bytes(b)) => a == b,
            (HostValue::Proxy(a), HostValue::Proxy(b)) => a == b,
            (HostValue::Value(a), HostValue::Value(b)) => a == b,
            (HostValue::Object(a), HostValue::Object(b)) => {
                std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
            }
            _ => false,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Null => f.write_str("Null"),
            HostValue::Boolean(v) => write!(f, "Boolean({})", v),
            HostValue::Byte(v) => write!(f, "Byte({})", v),
            HostValue::Short(v) => write!(f, "Short({})", v),
            HostValue::Int(v) => write!(f, "Int({})", v),
            HostValue::Long(v) => write!(f, "Long({})", v),
            HostValue::Float(v) => write!(f, "Float({})", v),
            HostValue::Double(v) => write!(f, "Double({})", v),
            HostValue::Char(v) => write!(f, "Char({:?})", v),
            HostValue::String(v) => write!(f, "String({:?})", v),
            HostValue::Array(a) => write!(f, "Array({}; {})", a.component(), a.len()),
            HostValue::List(v) => write!(f, "List({:?})", v),
            HostValue::Map(v) => write!(f, "Map({:?})", v),
            HostValue::Entry(v) => write!(f, "Entry({:?})", v),
            HostValue::Iterable(v) => write!(f, "Iterable({:?})", v),
            HostValue::Iterator(v) => write!(f, "Iterator({:?})", v),
            HostValue::Function(v) => write!(f, "Function({:?})", v),
            HostValue::Bytes(v) => write!(f, "Bytes({:?})", v),
            HostValue::Proxy(v) => write!(f, "Proxy({:?})", v),
            HostValue::Value(v) => write!(f, "Value({:?})", v),
            HostValue::Object(o) => write!(f, "Object({})", o.class_name()),
        }
    }
}

macro_rules! impl_from_host_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for HostValue {
                fn from(v: $ty) -> Self {
                    HostValue::$variant(v)
                }
            }
        )*
    };
}

impl_from_host_scalar! {
    bool => Boolean,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    char => Char,
    String => String,
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::String(s.to_string())
    }
}

// ============================================================================
// Host arrays
// ============================================================================

/// A fixed-length host array. Clones share the same storage.
#[derive(Clone)]
pub struct HostArray {
    component: HostType,
    elements: Arc<RwLock<Vec<HostValue>>>,
}

impl HostArray {
    pub fn new(component: HostType, elements: Vec<HostValue>) -> Self {
        HostArray {
            component,
            elements: Arc::new(RwLock::new(elements)),
        }
    }

    pub fn component(&self) -> &HostType {
        &self.component
    }

    /// The array's own type, `component[]`
    pub fn array_type(&self) -> HostType {
        HostType::array_of(self.component.clone())
    }

    pub fn len(&self) -> usize {
        self.elements.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<HostValue> {
        self.elements.read().get(index).cloned()
    }

    /// Replace the element at `index`; returns false when out of range
    pub fn set(&self, index: usize, value: HostValue) -> bool {
        match self.elements.write().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn to_vec(&self) -> Vec<HostValue> {
        self.elements.read().clone()
    }

    pub fn ptr_eq(&self, other: &HostArray) -> bool {
        Arc::ptr_eq(&self.elements, &other.elements)
    }
}

impl PartialEq for HostArray {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}
