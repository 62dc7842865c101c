//! Wrappers forwarding messages to a value of another context

use std::any::Any;
use std::sync::Arc;

use tandem_sdk::{
    dispatch, resolve, ForeignObject, ForeignRef, GuestValue, HostException, InteropError, InteropResult,
    KeyInfo, Message, Primitive, Reply,
};
use tracing::{trace, warn};

use crate::cache::{CacheKey, SendTarget};
use crate::context::Context;

/// The two contexts a wrapper connects and the object it forwards to.
struct Bridge {
    receiver: Context,
    delegate: ForeignRef,
    delegate_context: Context,
}

impl Bridge {
    fn new(receiver: Context, delegate: ForeignRef, delegate_context: Context) -> Self {
        debug_assert!(receiver != delegate_context, "bridge within one context");
        debug_assert!(
            !delegate.as_any().is::<OtherContextValue>()
                && !delegate.as_any().is::<OtherContextException>(),
            "nested bridge"
        );
        Bridge {
            receiver,
            delegate,
            delegate_context,
        }
    }

    /// Whether both contexts share a claimed layer, making forwarding
    /// routines cacheable
    fn shares_claimed_layer(&self) -> bool {
        let layer = self.receiver.layer();
        Arc::ptr_eq(layer, self.delegate_context.layer()) && layer.is_claimed()
    }

    /// Forward `message` to the delegate with its context entered
    fn send(&self, message: Message) -> InteropResult<Reply> {
        let message = match message {
            Message::IsIdentical(other) => match self.identical_candidate(other) {
                Some(candidate) => Message::IsIdentical(candidate),
                None => return Ok(Reply::Bool(false)),
            },
            other => other,
        };
        let prior = self
            .delegate_context
            .enter()
            .map_err(|e| InteropError::Host(HostException::new(e)))?;
        let result = self.forward(message);
        match self.delegate_context.leave(prior) {
            Ok(()) => result,
            Err(leave_error) => {
                if let Err(body_error) = &result {
                    warn!(%body_error, "error discarded because leaving the context failed");
                }
                Err(InteropError::Host(HostException::new(leave_error)))
            }
        }
    }

    fn forward(&self, message: Message) -> InteropResult<Reply> {
        let message = match message {
            // already unwrapped into the delegate context
            identical @ Message::IsIdentical(_) => identical,
            other => other.map_values(|value| {
                self.delegate_context.migrate_value(value, &self.receiver)
            }),
        };
        trace!(
            message = message.name(),
            delegate = self.delegate_context.id().as_u64(),
            "forwarding message"
        );
        let reply = if self.shares_claimed_layer() {
            let key = CacheKey::send(&message, &*self.delegate);
            let target: Arc<SendTarget> = self
                .delegate_context
                .layer()
                .send_targets()
                .get_or_install(key, || -> Arc<SendTarget> { Arc::new(resolve(&message)) });
            target(&*self.delegate, &message)
        } else {
            dispatch(&*self.delegate, &message)
        };
        match reply {
            Ok(reply) => Ok(reply.map_value(|value| {
                self.receiver.migrate_value(value, &self.delegate_context)
            })),
            Err(error) => Err(self.receiver.migrate_exception(error, &self.delegate_context)),
        }
    }

    /// Only a wrapper over the same delegate context can be identical to
    /// this one; comparing anything else would bounce between the contexts
    fn identical_candidate(&self, other: GuestValue) -> Option<GuestValue> {
        let object = other.as_object()?;
        let wrapper = object.as_any().downcast_ref::<OtherContextValue>()?;
        if wrapper.delegate_context() == &self.delegate_context {
            Some(GuestValue::Object(wrapper.delegate().clone()))
        } else {
            None
        }
    }

    fn query(&self, message: Message) -> bool {
        self.send(message)
            .and_then(Reply::into_bool)
            .unwrap_or(false)
    }

    fn value(&self, message: Message) -> InteropResult<GuestValue> {
        self.send(message)?.into_value()
    }

    fn unit(&self, message: Message) -> InteropResult<()> {
        self.send(message)?.into_unit()
    }

    fn info(&self, message: Message) -> KeyInfo {
        self.send(message)
            .and_then(Reply::into_info)
            .unwrap_or(KeyInfo::NONE)
    }
}

/// A value of another context, usable by guests of the receiver context.
pub struct OtherContextValue {
    bridge: Bridge,
}

impl OtherContextValue {
    pub(crate) fn new(receiver: Context, delegate: ForeignRef, delegate_context: Context) -> Self {
        OtherContextValue {
            bridge: Bridge::new(receiver, delegate, delegate_context),
        }
    }

    pub fn receiver_context(&self) -> &Context {
        &self.bridge.receiver
    }

    /// The wrapped object, only usable inside [`Self::delegate_context`]
    pub fn delegate(&self) -> &ForeignRef {
        &self.bridge.delegate
    }

    pub fn delegate_context(&self) -> &Context {
        &self.bridge.delegate_context
    }
}

/// An exception raised by guests of another context.
pub struct OtherContextException {
    bridge: Bridge,
}

impl OtherContextException {
    pub(crate) fn new(receiver: Context, delegate: ForeignRef, delegate_context: Context) -> Self {
        OtherContextException {
            bridge: Bridge::new(receiver, delegate, delegate_context),
        }
    }

    pub fn receiver_context(&self) -> &Context {
        &self.bridge.receiver
    }

    /// The original exception object
    pub fn delegate(&self) -> &ForeignRef {
        &self.bridge.delegate
    }

    pub fn delegate_context(&self) -> &Context {
        &self.bridge.delegate_context
    }
}

macro_rules! forward_to_delegate {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ForeignObject for $ty {
                fn as_any(&self) -> &dyn Any {
                    self
                }

                fn language(&self) -> &str {
                    self.bridge.delegate.language()
                }

                fn display_string(&self) -> String {
                    self.bridge
                        .send(Message::ToDisplayString)
                        .and_then(Reply::into_text)
                        .unwrap_or_else(|_| {
                            format!("<value of context {}>", self.bridge.delegate_context.id())
                        })
                }

                fn meta_name(&self) -> Option<String> {
                    self.bridge
                        .send(Message::GetMetaName)
                        .and_then(Reply::into_meta_name)
                        .unwrap_or(None)
                }

                fn is_null(&self) -> bool {
                    self.bridge.query(Message::IsNull)
                }

                fn is_boxed(&self) -> bool {
                    self.bridge.query(Message::IsBoxed)
                }

                fn unbox(&self) -> Option<Primitive> {
                    self.bridge
                        .send(Message::Unbox)
                        .and_then(Reply::into_unboxed)
                        .unwrap_or(None)
                }

                fn has_array_elements(&self) -> bool {
                    self.bridge.query(Message::HasArrayElements)
                }

                fn array_size(&self) -> InteropResult<u64> {
                    self.bridge.send(Message::GetArraySize)?.into_size()
                }

                fn read_array_element(&self, index: u64) -> InteropResult<GuestValue> {
                    self.bridge.value(Message::ReadArrayElement(index))
                }

                fn write_array_element(&self, index: u64, value: GuestValue) -> InteropResult<()> {
                    self.bridge.unit(Message::WriteArrayElement(index, value))
                }

                fn remove_array_element(&self, index: u64) -> InteropResult<()> {
                    self.bridge.unit(Message::RemoveArrayElement(index))
                }

                fn array_element_info(&self, index: u64) -> KeyInfo {
                    self.bridge.info(Message::ArrayElementInfo(index))
                }

                fn has_members(&self) -> bool {
                    self.bridge.query(Message::HasMembers)
                }

                fn member_keys(&self) -> InteropResult<Vec<String>> {
                    self.bridge.send(Message::GetMembers)?.into_keys()
                }

                fn read_member(&self, key: &str) -> InteropResult<GuestValue> {
                    self.bridge.value(Message::ReadMember(key.to_string()))
                }

                fn write_member(&self, key: &str, value: GuestValue) -> InteropResult<()> {
                    self.bridge.unit(Message::WriteMember(key.to_string(), value))
                }

                fn remove_member(&self, key: &str) -> InteropResult<()> {
                    self.bridge.unit(Message::RemoveMember(key.to_string()))
                }

                fn member_info(&self, key: &str) -> KeyInfo {
                    self.bridge.info(Message::MemberInfo(key.to_string()))
                }

                fn invoke_member(&self, key: &str, args: &[GuestValue]) -> InteropResult<GuestValue> {
                    self.bridge
                        .value(Message::InvokeMember(key.to_string(), args.to_vec()))
                }

                fn is_executable(&self) -> bool {
                    self.bridge.query(Message::IsExecutable)
                }

                fn execute(&self, args: &[GuestValue]) -> InteropResult<GuestValue> {
                    self.bridge.value(Message::Execute(args.to_vec()))
                }

                fn is_instantiable(&self) -> bool {
                    self.bridge.query(Message::IsInstantiable)
                }

                fn instantiate(&self, args: &[GuestValue]) -> InteropResult<GuestValue> {
                    self.bridge.value(Message::Instantiate(args.to_vec()))
                }

                fn has_iterator(&self) -> bool {
                    self.bridge.query(Message::HasIterator)
                }

                fn get_iterator(&self) -> InteropResult<GuestValue> {
                    self.bridge.value(Message::GetIterator)
                }

                fn is_iterator(&self) -> bool {
                    self.bridge.query(Message::IsIterator)
                }

                fn has_iterator_next_element(&self) -> InteropResult<bool> {
                    self.bridge.send(Message::HasIteratorNextElement)?.into_bool()
                }

                fn get_iterator_next_element(&self) -> InteropResult<GuestValue> {
                    self.bridge.value(Message::GetIteratorNextElement)
                }

                fn has_buffer_elements(&self) -> bool {
                    self.bridge.query(Message::HasBufferElements)
                }

                fn buffer_size(&self) -> InteropResult<u64> {
                    self.bridge.send(Message::GetBufferSize)?.into_size()
                }

                fn read_buffer_byte(&self, offset: u64) -> InteropResult<u8> {
                    self.bridge.send(Message::ReadBufferByte(offset))?.into_byte()
                }

                fn read_buffer(&self, offset: u64, dst: &mut [u8]) -> InteropResult<()> {
                    let bytes = self
                        .bridge
                        .send(Message::ReadBuffer(offset, dst.len()))?
                        .into_bytes()?;
                    if bytes.len() != dst.len() {
                        return Err(InteropError::InvalidBufferOffset {
                            offset,
                            length: dst.len() as u64,
                        });
                    }
                    dst.copy_from_slice(&bytes);
                    Ok(())
                }

                fn is_exception(&self) -> bool {
                    self.bridge.query(Message::IsException)
                }

                fn is_identical(&self, other: &GuestValue) -> bool {
                    self.bridge.query(Message::IsIdentical(other.clone()))
                }

                fn identity_hash(&self) -> u64 {
                    self.bridge
                        .send(Message::IdentityHash)
                        .and_then(Reply::into_hash)
                        .unwrap_or_else(|_| tandem_sdk::identity_of(&self.bridge.delegate) as u64)
                }
            }
        )*
    };
}

forward_to_delegate!(OtherContextValue, OtherContextException);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Layer;
    use crate::error::PolyglotError;
    use tandem_sdk::{same_object, ArrayObject, ExceptionObject, FunctionObject};

    fn wrap(value: &GuestValue, from: &Context, into: &Context) -> ForeignRef {
        into.migrate_value(value.clone(), from)
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_reads_are_forwarded_and_migrated() {
        let a = Context::builder("memory").build();
        let b = Context::builder("memory").build();
        let inner = GuestValue::object(ArrayObject::new(vec![GuestValue::from(7)]));
        let outer = GuestValue::object(ArrayObject::new(vec![inner.clone(), GuestValue::from("x")]));
        let wrapper = wrap(&outer, &a, &b);

        assert!(wrapper.has_array_elements());
        assert_eq!(wrapper.array_size().unwrap(), 2);
        let nested = wrapper.read_array_element(0).unwrap();
        let nested = nested.as_object().unwrap();
        let nested_wrapper = nested.as_any().downcast_ref::<OtherContextValue>().unwrap();
        assert!(same_object(nested_wrapper.delegate(), inner.as_object().unwrap()));
        assert_eq!(nested.read_array_element(0).unwrap().unboxed(), Some(Primitive::Int(7)));
        assert!(!a.is_entered());
    }

    #[test]
    fn test_arguments_are_migrated_into_the_delegate_context() {
        let a = Context::builder("memory").build();
        let b = Context::builder("memory").build();
        let native = GuestValue::object(ArrayObject::new(vec![]));
        let expected = native.as_object().cloned().unwrap();
        let seen_context = a.clone();
        let function = GuestValue::object(FunctionObject::new("check", move |args| {
            let current = Context::current().unwrap();
            assert_eq!(current, seen_context);
            let arg = args[0].as_object().unwrap();
            Ok(GuestValue::from(same_object(arg, &expected)))
        }));
        let wrapper = wrap(&function, &a, &b);
        let argument = b.migrate_value(native, &a);
        let result = wrapper.execute(&[argument]).unwrap();
        assert_eq!(result.unboxed(), Some(Primitive::Boolean(true)));
    }

    #[test]
    fn test_guest_exception_is_rewrapped() {
        let a = Context::builder("memory").build();
        let b = Context::builder("memory").build();
        let function = GuestValue::object(FunctionObject::new("fail", |_| {
            Err(ExceptionObject::raise("bad thing"))
        }));
        let wrapper = wrap(&function, &a, &b);
        match wrapper.execute(&[]) {
            Err(InteropError::Guest(exception)) => {
                let object = exception.object();
                let wrapped = object
                    .as_any()
                    .downcast_ref::<OtherContextException>()
                    .unwrap();
                assert_eq!(wrapped.receiver_context(), &b);
                assert_eq!(wrapped.delegate_context(), &a);
                assert!(object.is_exception());
                assert_eq!(exception.message(), "bad thing");
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_closed_delegate_reports_host_error() {
        let a = Context::builder("memory").build();
        let b = Context::builder("memory").build();
        let array = GuestValue::object(ArrayObject::new(vec![GuestValue::from(1)]));
        let wrapper = wrap(&array, &a, &b);
        a.close().unwrap();
        match wrapper.array_size() {
            Err(InteropError::Host(host)) => assert!(matches!(
                host.downcast_ref::<PolyglotError>(),
                Some(PolyglotError::ContextClosed(_))
            )),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!wrapper.has_array_elements());
    }

    #[test]
    fn test_identity_across_contexts() {
        let a = Context::builder("memory").build();
        let b = Context::builder("memory").build();
        let array = GuestValue::object(ArrayObject::new(vec![]));
        let first = wrap(&array, &a, &b);
        let second = wrap(&array, &a, &b);
        assert!(first.is_identical(&GuestValue::Object(second.clone())));
        assert_eq!(first.identity_hash(), second.identity_hash());

        let local = GuestValue::object(ArrayObject::new(vec![]));
        assert!(!first.is_identical(&local));
        assert!(!first.is_identical(&GuestValue::from(1)));
    }

    #[test]
    fn test_claimed_layer_caches_forwarding_routines() {
        let layer = Layer::new();
        let a = Context::builder("memory").layer(layer.clone()).build();
        let b = Context::builder("memory").layer(layer.clone()).build();
        let array = GuestValue::object(ArrayObject::new(vec![GuestValue::from(1)]));
        let wrapper = wrap(&array, &a, &b);

        wrapper.array_size().unwrap();
        assert_eq!(layer.send_targets().len(), 0);

        layer.claim();
        wrapper.array_size().unwrap();
        wrapper.array_size().unwrap();
        wrapper.read_array_element(0).unwrap();
        assert_eq!(layer.send_targets().len(), 2);
    }

    #[test]
    fn test_cached_routine_serves_later_messages_of_its_kind() {
        let layer = Layer::new();
        layer.claim();
        let a = Context::builder("memory").layer(layer.clone()).build();
        let b = Context::builder("memory").layer(layer.clone()).build();
        let array = GuestValue::object(ArrayObject::new(vec![
            GuestValue::from(1),
            GuestValue::from(2),
        ]));
        let wrapper = wrap(&array, &a, &b);

        let first = wrapper.read_array_element(0).unwrap();
        let second = wrapper.read_array_element(1).unwrap();
        assert_eq!(first.unboxed(), Some(Primitive::Int(1)));
        assert_eq!(second.unboxed(), Some(Primitive::Int(2)));
        assert!(matches!(
            wrapper.read_array_element(2),
            Err(InteropError::InvalidArrayIndex(2))
        ));
        assert_eq!(layer.send_targets().len(), 1);
    }

    #[test]
    fn test_identity_with_unrelated_value_skips_the_delegate_context() {
        let a = Context::builder("memory").build();
        let b = Context::builder("memory").build();
        let array = GuestValue::object(ArrayObject::new(vec![]));
        let wrapper = b.migrate_value(array, &a);
        let wrapper = wrapper.as_object().unwrap();
        let wrapper = wrapper.as_any().downcast_ref::<OtherContextValue>().unwrap();
        a.close().unwrap();

        let reply = wrapper
            .bridge
            .send(Message::IsIdentical(GuestValue::object(ArrayObject::new(vec![]))))
            .unwrap();
        assert!(matches!(reply, Reply::Bool(false)));
        // messages that need the delegate still fail
        assert!(matches!(
            wrapper.bridge.send(Message::GetArraySize),
            Err(InteropError::Host(_))
        ));
    }
}
