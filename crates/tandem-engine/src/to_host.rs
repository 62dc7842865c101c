//! Guest-to-host conversion
//!
//! [`to_host`] is total: every `(value, target, priority)` either produces a
//! host value assignable to the target or fails with a typed error. The
//! decision runs in a fixed order:
//!
//! 1. null converts to host null, except for primitive targets
//! 2. primitive-coercible targets try exact coercion of the unboxed scalar,
//!    then the char bridge (above `Strict`), then stringification (from
//!    `Coerce` on)
//! 3. the `Value` target wraps anything as a [`ValueHandle`]
//! 4. foreign objects are matched against the structural targets, building a
//!    live view when the object has the required capabilities
//! 5. host objects pass through when already assignable
//!
//! [`can_convert`] answers the same question without building anything and is
//! what overload resolution ranks candidates with.

use std::fmt;

use tandem_sdk::{ForeignRef, GuestValue, HostRef, Primitive};
use tracing::trace;

use crate::coercion::{to_char_code, to_primitive};
use crate::context::Context;
use crate::error::{cannot_convert, null_coercion, PolyglotError, PolyglotResult};
use crate::host_value::{HostArray, HostValue};
use crate::proxy::{InterfaceProxy, ProxyMode};
use crate::to_guest::HostArrayObject;
use crate::types::{HostClass, HostType};
use crate::views::{
    ByteSequenceView, FunctionView, IterableView, IteratorView, KeyKind, ListView, MapBacking,
    MapEntryView, MapView, ValueHandle, MAX_ARRAY_LENGTH,
};

const UNSUPPORTED_TARGET: &str = "Unsupported target type.";
const LOSSY_COERCION: &str = "Invalid or lossy primitive coercion.";

/// How permissive a conversion may be. Anything legal at one level is legal
/// at every higher level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    /// Exact coercion only
    Strict,
    /// Also numeric values as chars
    Loose,
    /// Also any scalar as a string
    Coerce,
    /// Also guest objects as host interface implementations
    HostProxy,
}

impl Priority {
    /// All levels, strictest first
    pub const ALL: [Priority; 4] = [
        Priority::Strict,
        Priority::Loose,
        Priority::Coerce,
        Priority::HostProxy,
    ];
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Strict => "STRICT",
            Priority::Loose => "LOOSE",
            Priority::Coerce => "COERCE",
            Priority::HostProxy => "HOST_PROXY",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Conversion
// ============================================================================

/// Convert a guest value of `context` to `target`
pub fn to_host(
    context: &Context,
    value: &GuestValue,
    target: &HostType,
    priority: Priority,
) -> PolyglotResult<HostValue> {
    trace!(host_type = %target, %priority, ?value, "to_host");
    if value.is_null() {
        if target.is_primitive() {
            return Err(null_coercion(context, value, target));
        }
        return Ok(HostValue::Null);
    }

    if target.is_primitive_coercible() {
        if let Some(scalar) = value.unboxed() {
            if let Some(converted) = convert_primitive(&scalar, target, priority) {
                return Ok(converted);
            }
        }
    }

    if let HostClass::Value = target.class() {
        return Ok(HostValue::Value(ValueHandle::new(context.clone(), value.clone())));
    }

    match value {
        GuestValue::Object(object) => {
            if let Some(array) = host_array(object, target) {
                return Ok(HostValue::Array(array));
            }
            if !target.is_primitive_coercible() {
                return foreign_to_host(context, value, object, target, priority);
            }
        }
        GuestValue::Host(host) => {
            if let Some(converted) = host_to_host(host, target) {
                return Ok(converted);
            }
        }
        GuestValue::Primitive(p) => {
            if let HostClass::Object = target.class() {
                return Ok(primitive_to_host(p));
            }
        }
        GuestValue::Null => {}
    }

    let reason = if target.is_primitive_coercible() {
        LOSSY_COERCION
    } else {
        UNSUPPORTED_TARGET
    };
    Err(cannot_convert(context, value, target, reason))
}

/// Whether [`to_host`] would succeed, without building views
pub fn can_convert(context: &Context, value: &GuestValue, target: &HostType, priority: Priority) -> bool {
    if value.is_null() {
        return !target.is_primitive();
    }
    if target.is_primitive_coercible() {
        if let Some(scalar) = value.unboxed() {
            if primitive_fits(&scalar, target, priority) {
                return true;
            }
        }
    }
    if let HostClass::Value = target.class() {
        return true;
    }
    match value {
        GuestValue::Object(object) => {
            if host_array(object, target).is_some() {
                return true;
            }
            !target.is_primitive_coercible() && foreign_fits(context, object, target, priority)
        }
        GuestValue::Host(host) => host_fits(host, target),
        GuestValue::Primitive(_) => matches!(target.class(), HostClass::Object),
        GuestValue::Null => false,
    }
}

// ============================================================================
// Scalars
// ============================================================================

fn convert_primitive(scalar: &Primitive, target: &HostType, priority: Priority) -> Option<HostValue> {
    if let Some(converted) = to_primitive(scalar, target.class()) {
        return Some(converted);
    }
    if target.is_char() && priority > Priority::Strict {
        if let Some(c) = to_char_code(scalar) {
            return Some(HostValue::Char(c));
        }
    }
    if stringifies(target) && priority >= Priority::Coerce {
        return Some(HostValue::String(scalar.to_string()));
    }
    None
}

fn primitive_fits(scalar: &Primitive, target: &HostType, priority: Priority) -> bool {
    let exact = match (scalar, target.class()) {
        (Primitive::String(_), HostClass::String | HostClass::CharSequence) => true,
        (Primitive::Char(_), HostClass::String | HostClass::CharSequence) => true,
        (_, HostClass::String | HostClass::CharSequence) => false,
        _ => to_primitive(scalar, target.class()).is_some(),
    };
    exact
        || (target.is_char() && priority > Priority::Strict && to_char_code(scalar).is_some())
        || (stringifies(target) && priority >= Priority::Coerce)
}

fn stringifies(target: &HostType) -> bool {
    matches!(target.class(), HostClass::String | HostClass::CharSequence)
}

/// A guest scalar as the host's boxed counterpart
pub(crate) fn primitive_to_host(value: &Primitive) -> HostValue {
    match value {
        Primitive::Boolean(v) => HostValue::Boolean(*v),
        Primitive::Byte(v) => HostValue::Byte(*v),
        Primitive::Short(v) => HostValue::Short(*v),
        Primitive::Int(v) => HostValue::Int(*v),
        Primitive::Long(v) => HostValue::Long(*v),
        Primitive::Float(v) => HostValue::Float(*v),
        Primitive::Double(v) => HostValue::Double(*v),
        Primitive::Char(v) => HostValue::Char(*v),
        Primitive::String(v) => HostValue::String(v.to_string()),
    }
}

// ============================================================================
// Host objects
// ============================================================================

/// A host array that travelled through the guest, when `target` accepts it
fn host_array(object: &ForeignRef, target: &HostType) -> Option<HostArray> {
    let wrapper = object.as_any().downcast_ref::<HostArrayObject>()?;
    let array = wrapper.array();
    let accepted = match target.class() {
        HostClass::Object => true,
        class @ HostClass::Array(_) => class.is_assignable_from(array.array_type().class()),
        _ => false,
    };
    accepted.then(|| array.clone())
}

fn host_to_host(host: &HostRef, target: &HostType) -> Option<HostValue> {
    if let Some(entry) = host.as_any().downcast_ref::<MapEntryView>() {
        if matches!(target.class(), HostClass::MapEntry | HostClass::Object) {
            return Some(HostValue::Entry(entry.clone()));
        }
    }
    host_fits(host, target).then(|| HostValue::Object(host.clone()))
}

fn host_fits(host: &HostRef, target: &HostType) -> bool {
    match target.class() {
        HostClass::Object => true,
        HostClass::MapEntry => host.as_any().is::<MapEntryView>(),
        HostClass::Named(name) => host.is_instance_of(name),
        HostClass::Interface(desc) => host.is_instance_of(desc.name()),
        _ => false,
    }
}

// ============================================================================
// Foreign objects
// ============================================================================

fn disabled(context: &Context, value: &GuestValue, target: &HostType, access: &str) -> PolyglotError {
    cannot_convert(
        context,
        value,
        target,
        &format!("{} access is disabled.", access),
    )
}

fn foreign_to_host(
    context: &Context,
    value: &GuestValue,
    object: &ForeignRef,
    target: &HostType,
    priority: Priority,
) -> PolyglotResult<HostValue> {
    let options = context.options();
    let require = |present: bool, reason: &str| {
        if present {
            Ok(())
        } else {
            Err(cannot_convert(context, value, target, reason))
        }
    };
    match target.class() {
        HostClass::Object => Ok(object_to_host(context, value, object)),
        HostClass::List => {
            if !options.allow_list_access {
                return Err(disabled(context, value, target, "List"));
            }
            require(object.has_array_elements(), "Value must have array elements.")?;
            Ok(HostValue::List(ListView::new(
                context.clone(),
                object.clone(),
                target.param(0),
            )))
        }
        HostClass::Map => {
            if !options.allow_map_access {
                return Err(disabled(context, value, target, "Map"));
            }
            let key = target.param(0);
            let kind = KeyKind::of(&key).ok_or_else(|| {
                PolyglotError::IllegalArgument(format!("Unsupported Map key type: {}.", key))
            })?;
            match kind.backing(&**object) {
                Some(backing) => Ok(HostValue::Map(MapView::new(
                    context.clone(),
                    object.clone(),
                    key,
                    target.param(1),
                    backing,
                ))),
                None => Err(cannot_convert(context, value, target, kind.requirement())),
            }
        }
        HostClass::Iterable => {
            if !options.allow_iterator_access {
                return Err(disabled(context, value, target, "Iterator"));
            }
            require(object.has_iterator(), "Value must have an iterator.")?;
            Ok(HostValue::Iterable(IterableView::new(
                context.clone(),
                object.clone(),
                target.param(0),
            )))
        }
        HostClass::Iterator => {
            if !options.allow_iterator_access {
                return Err(disabled(context, value, target, "Iterator"));
            }
            require(object.is_iterator(), "Value must be an iterator.")?;
            Ok(HostValue::Iterator(IteratorView::new(
                context.clone(),
                object.clone(),
                target.param(0),
            )))
        }
        HostClass::Function => {
            require(
                object.is_executable() || object.is_instantiable(),
                "Value must be executable or instantiable.",
            )?;
            Ok(HostValue::Function(FunctionView::new(
                context.clone(),
                object.clone(),
                target.param(1),
            )))
        }
        HostClass::ByteSequence => {
            if !options.allow_buffer_access {
                return Err(disabled(context, value, target, "Buffer"));
            }
            require(object.has_buffer_elements(), "Value must have buffer elements.")?;
            Ok(HostValue::Bytes(ByteSequenceView::new(
                context.clone(),
                object.clone(),
            )))
        }
        HostClass::Array(_) => {
            if !options.allow_list_access {
                return Err(disabled(context, value, target, "List"));
            }
            require(object.has_array_elements(), "Value must have array elements.")?;
            materialize_array(context, value, object, target)
        }
        HostClass::Interface(desc) if priority >= Priority::HostProxy => {
            if !options.allow_implementations {
                return Err(disabled(context, value, target, "Implementation"));
            }
            let mode = if desc.is_functional() && (object.is_executable() || object.is_instantiable()) {
                ProxyMode::Function
            } else if object.has_members() {
                ProxyMode::Object
            } else {
                return Err(cannot_convert(
                    context,
                    value,
                    target,
                    "Value must be executable or have members.",
                ));
            };
            trace!(interface = desc.name(), ?mode, "implementing interface");
            Ok(HostValue::Proxy(InterfaceProxy::new(
                context.clone(),
                object.clone(),
                desc.clone(),
                mode,
            )))
        }
        _ => Err(cannot_convert(context, value, target, UNSUPPORTED_TARGET)),
    }
}

/// Best host representation of a guest object requested as `Object`
fn object_to_host(context: &Context, value: &GuestValue, object: &ForeignRef) -> HostValue {
    let options = context.options();
    if let Some(scalar) = object.unbox() {
        return primitive_to_host(&scalar);
    }
    if options.allow_map_access && object.has_members() {
        return HostValue::Map(MapView::new(
            context.clone(),
            object.clone(),
            HostType::object(),
            HostType::object(),
            MapBacking::Members,
        ));
    }
    if options.allow_list_access && object.has_array_elements() {
        return HostValue::List(ListView::new(
            context.clone(),
            object.clone(),
            HostType::object(),
        ));
    }
    if object.is_executable() || object.is_instantiable() {
        return HostValue::Function(FunctionView::new(
            context.clone(),
            object.clone(),
            HostType::object(),
        ));
    }
    HostValue::Value(ValueHandle::new(context.clone(), value.clone()))
}

/// Copy a guest array into a host array, element by element and in order;
/// the first failing element aborts the copy
fn materialize_array(
    context: &Context,
    value: &GuestValue,
    object: &ForeignRef,
    target: &HostType,
) -> PolyglotResult<HostValue> {
    let component = match target.component() {
        Some(component) => component,
        None => return Err(cannot_convert(context, value, target, UNSUPPORTED_TARGET)),
    };
    let list = ListView::new(context.clone(), object.clone(), component.clone());
    let size = list.size()?;
    if size as u64 > MAX_ARRAY_LENGTH {
        return Err(cannot_convert(
            context,
            value,
            target,
            "Array size exceeds the host array limit.",
        ));
    }
    let mut elements = Vec::with_capacity(size);
    for element in list.iter() {
        context.poll()?;
        elements.push(element?);
    }
    Ok(HostValue::Array(HostArray::new(component, elements)))
}

fn foreign_fits(context: &Context, object: &ForeignRef, target: &HostType, priority: Priority) -> bool {
    let options = context.options();
    match target.class() {
        HostClass::Object => true,
        HostClass::List | HostClass::Array(_) => {
            options.allow_list_access && object.has_array_elements()
        }
        HostClass::Map => {
            options.allow_map_access
                && KeyKind::of(&target.param(0))
                    .and_then(|kind| kind.backing(&**object))
                    .is_some()
        }
        HostClass::Iterable => options.allow_iterator_access && object.has_iterator(),
        HostClass::Iterator => options.allow_iterator_access && object.is_iterator(),
        HostClass::Function => object.is_executable() || object.is_instantiable(),
        HostClass::ByteSequence => options.allow_buffer_access && object.has_buffer_elements(),
        HostClass::Interface(desc) => {
            priority >= Priority::HostProxy
                && options.allow_implementations
                && ((desc.is_functional() && (object.is_executable() || object.is_instantiable()))
                    || object.has_members())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InteropOptions;
    use crate::types::{InterfaceDesc, MethodDesc, PrimitiveKind};
    use tandem_sdk::{ArrayObject, BoxedObject, FunctionObject, NullObject, RecordObject};

    fn context() -> Context {
        Context::builder("memory").build()
    }

    fn int() -> HostType {
        HostType::primitive(PrimitiveKind::Int)
    }

    #[test]
    fn test_null_conversion() {
        let ctx = context();
        assert_eq!(
            to_host(&ctx, &GuestValue::Null, &HostType::string(), Priority::Strict).unwrap(),
            HostValue::Null
        );
        let foreign_null = GuestValue::object(NullObject);
        assert_eq!(
            to_host(&ctx, &foreign_null, &HostType::list_of(HostType::object()), Priority::Strict).unwrap(),
            HostValue::Null
        );
        let err = to_host(&ctx, &GuestValue::Null, &int(), Priority::HostProxy).unwrap_err();
        assert!(matches!(err, PolyglotError::NullCoercion(_)));
    }

    #[test]
    fn test_boxed_object_unboxes() {
        let ctx = context();
        let boxed = GuestValue::object(BoxedObject::new(Primitive::Double(3.0)));
        assert_eq!(to_host(&ctx, &boxed, &int(), Priority::Strict).unwrap(), HostValue::Int(3));
        assert_eq!(
            to_host(&ctx, &boxed, &HostType::object(), Priority::Strict).unwrap(),
            HostValue::Double(3.0)
        );
    }

    #[test]
    fn test_lossy_coercion_message() {
        let ctx = context();
        let err = to_host(&ctx, &GuestValue::from(3.5), &int(), Priority::HostProxy).unwrap_err();
        assert_eq!(
            err.message(),
            "Cannot convert '3.5'(language: memory, type: double) to host type 'int': Invalid or lossy primitive coercion."
        );
    }

    #[test]
    fn test_char_bridge_needs_loose() {
        let ctx = context();
        let code = GuestValue::from(65);
        let target = HostType::primitive(PrimitiveKind::Char);
        assert!(to_host(&ctx, &code, &target, Priority::Strict).is_err());
        assert_eq!(
            to_host(&ctx, &code, &target, Priority::Loose).unwrap(),
            HostValue::Char('A')
        );
    }

    #[test]
    fn test_stringification_needs_coerce() {
        let ctx = context();
        let value = GuestValue::from(true);
        assert!(!can_convert(&ctx, &value, &HostType::string(), Priority::Loose));
        assert!(can_convert(&ctx, &value, &HostType::string(), Priority::Coerce));
        assert_eq!(
            to_host(&ctx, &value, &HostType::string(), Priority::Coerce).unwrap(),
            HostValue::from("true")
        );
    }

    #[test]
    fn test_object_target_shape_order() {
        let ctx = context();
        let record = GuestValue::object(RecordObject::new(vec![("a", GuestValue::from(1))]));
        assert!(matches!(
            to_host(&ctx, &record, &HostType::object(), Priority::Strict).unwrap(),
            HostValue::Map(_)
        ));
        let array = GuestValue::object(ArrayObject::new(vec![]));
        assert!(matches!(
            to_host(&ctx, &array, &HostType::object(), Priority::Strict).unwrap(),
            HostValue::List(_)
        ));
        let function = GuestValue::object(FunctionObject::new("f", |_| Ok(GuestValue::Null)));
        assert!(matches!(
            to_host(&ctx, &function, &HostType::object(), Priority::Strict).unwrap(),
            HostValue::Function(_)
        ));
        let buffer = GuestValue::object(tandem_sdk::BufferObject::new(vec![1]));
        assert!(matches!(
            to_host(&ctx, &buffer, &HostType::object(), Priority::Strict).unwrap(),
            HostValue::Value(_)
        ));
    }

    #[test]
    fn test_list_requires_array_elements() {
        let ctx = context();
        let record = GuestValue::object(RecordObject::new(vec![("a", GuestValue::from(1))]));
        let err = to_host(&ctx, &record, &HostType::list_of(HostType::string()), Priority::HostProxy)
            .unwrap_err();
        assert!(matches!(err, PolyglotError::ClassCast(_)));
        assert!(err.message().ends_with("Value must have array elements."));
    }

    #[test]
    fn test_map_key_gate() {
        let ctx = context();
        let record = GuestValue::object(RecordObject::new(vec![("a", GuestValue::from(1))]));
        let bad = HostType::map_of(HostType::named("Thread"), HostType::object());
        let err = to_host(&ctx, &record, &bad, Priority::HostProxy).unwrap_err();
        assert!(matches!(err, PolyglotError::IllegalArgument(_)));
        assert!(!can_convert(&ctx, &record, &bad, Priority::HostProxy));

        let good = HostType::map_of(HostType::string(), HostType::object());
        assert!(matches!(
            to_host(&ctx, &record, &good, Priority::HostProxy).unwrap(),
            HostValue::Map(_)
        ));
    }

    #[test]
    fn test_disabled_access() {
        let ctx = Context::builder("memory")
            .options(InteropOptions::restricted())
            .build();
        let array = GuestValue::object(ArrayObject::new(vec![]));
        let err = to_host(&ctx, &array, &HostType::list_of(HostType::object()), Priority::HostProxy)
            .unwrap_err();
        assert!(err.message().ends_with("List access is disabled."));
    }

    #[test]
    fn test_interface_requires_host_proxy_priority() {
        let ctx = context();
        let runnable = HostType::interface(InterfaceDesc::new(
            "Runnable",
            vec![MethodDesc::new("run")],
        ));
        let function = GuestValue::object(FunctionObject::new("f", |_| Ok(GuestValue::Null)));
        assert!(!can_convert(&ctx, &function, &runnable, Priority::Coerce));
        assert!(can_convert(&ctx, &function, &runnable, Priority::HostProxy));
        assert!(to_host(&ctx, &function, &runnable, Priority::Coerce).is_err());
        assert!(matches!(
            to_host(&ctx, &function, &runnable, Priority::HostProxy).unwrap(),
            HostValue::Proxy(_)
        ));
    }

    #[test]
    fn test_priority_monotonicity() {
        let ctx = context();
        let values = vec![
            GuestValue::Null,
            GuestValue::from(1),
            GuestValue::from(65i64),
            GuestValue::from(2.5),
            GuestValue::from("x"),
            GuestValue::from('c'),
            GuestValue::from(true),
            GuestValue::object(ArrayObject::new(vec![GuestValue::from("a")])),
            GuestValue::object(RecordObject::new(vec![("k", GuestValue::from(1))])),
        ];
        let targets = vec![
            int(),
            HostType::boxed(PrimitiveKind::Char),
            HostType::primitive(PrimitiveKind::Double),
            HostType::string(),
            HostType::number(),
            HostType::object(),
            HostType::value(),
            HostType::list_of(HostType::string()),
            HostType::map_of(HostType::string(), HostType::object()),
            HostType::array_of(HostType::string()),
        ];
        for value in &values {
            for target in &targets {
                for (i, stricter) in Priority::ALL.iter().enumerate() {
                    if !can_convert(&ctx, value, target, *stricter) {
                        continue;
                    }
                    for looser in &Priority::ALL[i..] {
                        assert!(
                            can_convert(&ctx, value, target, *looser),
                            "{:?} -> {} legal at {} but not at {}",
                            value,
                            target,
                            stricter,
                            looser
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_array_materialization_in_order() {
        let ctx = context();
        let array = GuestValue::object(ArrayObject::new(vec![
            GuestValue::from("a"),
            GuestValue::from("b"),
            GuestValue::from("c"),
        ]));
        let converted = to_host(&ctx, &array, &HostType::array_of(HostType::string()), Priority::HostProxy)
            .unwrap();
        let elements = converted.as_array().unwrap().to_vec();
        assert_eq!(
            elements,
            vec![HostValue::from("a"), HostValue::from("b"), HostValue::from("c")]
        );
    }

    #[test]
    fn test_array_materialization_aborts_on_bad_element() {
        let ctx = context();
        let array = GuestValue::object(ArrayObject::new(vec![
            GuestValue::from(1),
            GuestValue::from(2.5),
            GuestValue::from(3),
        ]));
        let err = to_host(&ctx, &array, &HostType::array_of(int()), Priority::HostProxy).unwrap_err();
        assert!(matches!(err, PolyglotError::ClassCast(_)));
    }
}
