//! Generic handle to a guest value
//!
//! A [`ValueHandle`] is the "any value" target: it keeps the guest value and
//! its owning context together and converts lazily on request.

use std::fmt;
use std::hash::{Hash, Hasher};

use tandem_sdk::{same_object, GuestValue};

use crate::context::Context;
use crate::error::PolyglotResult;
use crate::host_value::HostValue;
use crate::to_host::{can_convert, to_host, Priority};
use crate::types::HostType;

#[derive(Clone)]
pub struct ValueHandle {
    context: Context,
    value: GuestValue,
}

impl ValueHandle {
    pub(crate) fn new(context: Context, value: GuestValue) -> Self {
        ValueHandle { context, value }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn guest_value(&self) -> &GuestValue {
        &self.value
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// Convert the value to `target`
    pub fn as_type(&self, target: &HostType) -> PolyglotResult<HostValue> {
        self.context
            .guarded(|| to_host(&self.context, &self.value, target, Priority::HostProxy))
    }

    /// Whether [`ValueHandle::as_type`] would succeed for `target`
    pub fn fits(&self, target: &HostType) -> bool {
        can_convert(&self.context, &self.value, target, Priority::HostProxy)
    }

    pub fn to_display_string(&self) -> String {
        match &self.value {
            GuestValue::Null => "null".to_string(),
            GuestValue::Primitive(p) => p.to_string(),
            GuestValue::Object(object) => object.display_string(),
            GuestValue::Host(host) => host.display_string(),
        }
    }
}

impl PartialEq for ValueHandle {
    fn eq(&self, other: &Self) -> bool {
        if self.context != other.context {
            return false;
        }
        match (&self.value, &other.value) {
            (GuestValue::Null, GuestValue::Null) => true,
            (GuestValue::Primitive(a), GuestValue::Primitive(b)) => a == b,
            (GuestValue::Object(a), GuestValue::Object(b)) => {
                same_object(a, b) || a.is_identical(&other.value)
            }
            (GuestValue::Host(a), GuestValue::Host(b)) => std::sync::Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Hash for ValueHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.context.id().hash(state);
        if let GuestValue::Object(object) = &self.value {
            object.identity_hash().hash(state);
        }
    }
}

impl fmt::Debug for ValueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({:?})@{}", self.value, self.context.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_sdk::{ArrayObject, RecordObject};

    #[test]
    fn test_value_handle_converts_on_request() {
        let context = Context::builder("memory").build();
        let handle = context.as_value(GuestValue::from(42));
        assert_eq!(handle.as_type(&HostType::string()).unwrap(), HostValue::from("42"));
        assert_eq!(
            handle
                .as_type(&HostType::primitive(crate::types::PrimitiveKind::Long))
                .unwrap(),
            HostValue::Long(42)
        );
        assert!(!handle.fits(&HostType::list_of(HostType::object())));
    }

    #[test]
    fn test_value_handle_identity() {
        let context = Context::builder("memory").build();
        let array = GuestValue::object(ArrayObject::new(vec![]));
        let a = context.as_value(array.clone());
        let b = context.as_value(array);
        let other = context.as_value(GuestValue::object(RecordObject::new(Vec::<(String, GuestValue)>::new())));
        assert_eq!(a, b);
        assert_ne!(a, other);

        let elsewhere = Context::builder("memory").build();
        assert_ne!(a, elsewhere.as_value(a.guest_value().clone()));
    }
}
