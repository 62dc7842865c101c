//! Cross-context bridge
//!
//! A guest value never leaves its context. When it is handed to another
//! context it is migrated: scalars, null and host objects pass through as
//! they are, while foreign objects are wrapped in an [`OtherContextValue`]
//! that forwards every message to the original object with its context
//! entered. Exceptions raised on the far side come back wrapped in an
//! [`OtherContextException`].
//!
//! Wrappers never nest. Migrating a wrapper back into the context that owns
//! its delegate unwraps it, and migrating it into a third context rewraps the
//! delegate itself.

mod other_context;

pub use other_context::{OtherContextException, OtherContextValue};

use std::sync::Arc;

use tandem_sdk::{ForeignRef, GuestException, GuestValue, InteropError};
use tracing::debug;

use crate::context::Context;

/// Where a foreign object really lives
fn origin_of(object: &ForeignRef, holder: &Context) -> (ForeignRef, Context) {
    if let Some(wrapper) = object.as_any().downcast_ref::<OtherContextValue>() {
        return (
            wrapper.delegate().clone(),
            wrapper.delegate_context().clone(),
        );
    }
    if let Some(wrapper) = object.as_any().downcast_ref::<OtherContextException>() {
        return (
            wrapper.delegate().clone(),
            wrapper.delegate_context().clone(),
        );
    }
    (object.clone(), holder.clone())
}

impl Context {
    /// Make `value`, a value of context `from`, usable by guests of this
    /// context
    pub fn migrate_value(&self, value: GuestValue, from: &Context) -> GuestValue {
        if self == from {
            return value;
        }
        let object = match value {
            GuestValue::Object(object) => object,
            other => return other,
        };
        let (delegate, owner) = origin_of(&object, from);
        if &owner == self {
            debug!(
                into = self.id().as_u64(),
                from = from.id().as_u64(),
                "migrated value unwrapped"
            );
            return GuestValue::Object(delegate);
        }
        debug!(
            into = self.id().as_u64(),
            owner = owner.id().as_u64(),
            "migrated value wrapped"
        );
        GuestValue::Object(Arc::new(OtherContextValue::new(
            self.clone(),
            delegate,
            owner,
        )))
    }

    /// Make a failure raised by guests of `from` observable by guests of
    /// this context.
    ///
    /// Guest exceptions are wrapped once; an exception already wrapped for
    /// this pair of contexts passes unchanged, and one wrapped for the
    /// reverse pair is unwrapped. Internal engine failures become host
    /// errors. Values carried by argument errors are migrated.
    pub fn migrate_exception(&self, error: InteropError, from: &Context) -> InteropError {
        match error {
            InteropError::Guest(exception) => {
                InteropError::Guest(self.migrate_guest_exception(exception, from))
            }
            InteropError::Engine(host) => InteropError::Host(host),
            InteropError::UnsupportedType { message, supplied } => InteropError::UnsupportedType {
                message,
                supplied: supplied
                    .into_iter()
                    .map(|value| self.migrate_value(value, from))
                    .collect(),
            },
            other => other,
        }
    }

    fn migrate_guest_exception(&self, exception: GuestException, from: &Context) -> GuestException {
        if self == from {
            return exception;
        }
        let object = exception.object();
        if let Some(wrapped) = object.as_any().downcast_ref::<OtherContextException>() {
            if wrapped.receiver_context() == self && wrapped.delegate_context() == from {
                return exception;
            }
        }
        let (delegate, owner) = origin_of(object, from);
        let message = exception.message().to_string();
        if &owner == self {
            debug!(into = self.id().as_u64(), "exception unwrapped");
            return GuestException::with_message(delegate, message);
        }
        debug!(
            into = self.id().as_u64(),
            owner = owner.id().as_u64(),
            "exception wrapped"
        );
        let wrapped: ForeignRef = Arc::new(OtherContextException::new(self.clone(), delegate, owner));
        GuestException::with_message(wrapped, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PolyglotError;
    use tandem_sdk::{same_object, ArrayObject, ExceptionObject, Primitive};

    fn pair() -> (Context, Context) {
        (
            Context::builder("memory").build(),
            Context::builder("memory").build(),
        )
    }

    #[test]
    fn test_scalars_and_same_context_pass_through() {
        let (a, b) = pair();
        let value = b.migrate_value(GuestValue::from(3), &a);
        assert!(matches!(value, GuestValue::Primitive(Primitive::Int(3))));

        let array = GuestValue::object(ArrayObject::new(vec![]));
        let same = a.migrate_value(array.clone(), &a);
        assert!(same_object(
            same.as_object().unwrap(),
            array.as_object().unwrap()
        ));
    }

    #[test]
    fn test_migrating_back_unwraps() {
        let (a, b) = pair();
        let array = GuestValue::object(ArrayObject::new(vec![GuestValue::from(1)]));
        let wrapped = b.migrate_value(array.clone(), &a);
        let wrapper = wrapped
            .as_object()
            .unwrap()
            .as_any()
            .downcast_ref::<OtherContextValue>()
            .unwrap();
        assert_eq!(wrapper.receiver_context(), &b);
        assert_eq!(wrapper.delegate_context(), &a);

        let back = a.migrate_value(wrapped.clone(), &b);
        assert!(same_object(
            back.as_object().unwrap(),
            array.as_object().unwrap()
        ));
    }

    #[test]
    fn test_third_context_rewraps_delegate() {
        let (a, b) = pair();
        let c = Context::builder("memory").build();
        let array = GuestValue::object(ArrayObject::new(vec![]));
        let in_b = b.migrate_value(array.clone(), &a);
        let in_c = c.migrate_value(in_b, &b);
        let wrapper = in_c
            .as_object()
            .unwrap()
            .as_any()
            .downcast_ref::<OtherContextValue>()
            .unwrap();
        assert_eq!(wrapper.receiver_context(), &c);
        assert_eq!(wrapper.delegate_context(), &a);
        assert!(same_object(wrapper.delegate(), array.as_object().unwrap()));
    }

    #[test]
    fn test_exception_wrapped_once() {
        let (a, b) = pair();
        let raised = ExceptionObject::raise("boom");
        let in_b = b.migrate_exception(raised, &a);
        let exception = match &in_b {
            InteropError::Guest(exception) => exception.clone(),
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(exception.message(), "boom");
        let wrapper = exception
            .object()
            .as_any()
            .downcast_ref::<OtherContextException>()
            .unwrap();
        assert_eq!(wrapper.receiver_context(), &b);

        // same pair: unchanged
        match b.migrate_exception(in_b.clone(), &a) {
            InteropError::Guest(again) => assert!(same_object(again.object(), exception.object())),
            other => panic!("unexpected {:?}", other),
        }

        // reverse pair: unwrapped
        match a.migrate_exception(in_b, &b) {
            InteropError::Guest(original) => {
                assert!(original.object().as_any().is::<ExceptionObject>());
                assert_eq!(original.message(), "boom");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_engine_failure_becomes_host_error() {
        let (a, b) = pair();
        let failure = InteropError::Engine(tandem_sdk::HostException::new(
            PolyglotError::IllegalState("left twice".to_string()),
        ));
        match b.migrate_exception(failure, &a) {
            InteropError::Host(host) => {
                assert!(host.downcast_ref::<PolyglotError>().is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
