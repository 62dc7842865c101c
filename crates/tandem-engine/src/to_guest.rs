//! Host-to-guest conversion
//!
//! The mirror of [`crate::to_host`]. Scalars become guest scalars, views hand
//! back the guest value they wrap (migrated when the view belongs to another
//! context) and host arrays are exposed as guest arrays that write through to
//! the host storage.

use std::any::Any;
use std::sync::Arc;

use tandem_sdk::{ForeignObject, GuestValue, InteropError, InteropResult, KeyInfo, Primitive};

use crate::context::Context;
use crate::host_value::{HostArray, HostValue};
use crate::to_host::{to_host, Priority};

/// Language name of guest-visible host objects
pub const HOST_LANGUAGE: &str = "host";

/// Convert a host value for use by a guest of `context`
pub fn to_guest(context: &Context, value: &HostValue) -> GuestValue {
    let owned = |owner: &Context, guest: GuestValue| {
        if owner == context {
            guest
        } else {
            context.migrate_value(guest, owner)
        }
    };
    match value {
        HostValue::Null => GuestValue::Null,
        HostValue::Boolean(v) => Primitive::Boolean(*v).into(),
        HostValue::Byte(v) => Primitive::Byte(*v).into(),
        HostValue::Short(v) => Primitive::Short(*v).into(),
        HostValue::Int(v) => Primitive::Int(*v).into(),
        HostValue::Long(v) => Primitive::Long(*v).into(),
        HostValue::Float(v) => Primitive::Float(*v).into(),
        HostValue::Double(v) => Primitive::Double(*v).into(),
        HostValue::Char(v) => Primitive::Char(*v).into(),
        HostValue::String(v) => Primitive::String(Arc::from(v.as_str())).into(),
        HostValue::Array(array) => GuestValue::object(HostArrayObject {
            context: context.clone(),
            array: array.clone(),
        }),
        HostValue::List(view) => owned(view.context(), view.guest_value()),
        HostValue::Map(view) => owned(view.context(), view.guest_value()),
        HostValue::Iterable(view) => owned(view.context(), view.guest_value()),
        HostValue::Iterator(view) => owned(view.context(), view.guest_value()),
        HostValue::Function(view) => owned(view.context(), view.guest_value()),
        HostValue::Bytes(view) => owned(view.context(), view.guest_value()),
        HostValue::Proxy(proxy) => owned(proxy.context(), proxy.guest_value()),
        HostValue::Value(handle) => owned(handle.context(), handle.guest_value().clone()),
        HostValue::Entry(entry) => GuestValue::Host(Arc::new(entry.clone())),
        HostValue::Object(object) => GuestValue::Host(object.clone()),
    }
}

/// A host array seen from a guest: fixed length, readable and writable
pub struct HostArrayObject {
    context: Context,
    array: HostArray,
}

impl HostArrayObject {
    pub fn array(&self) -> &HostArray {
        &self.array
    }

    fn slot(&self, index: u64) -> InteropResult<usize> {
        usize::try_from(index)
            .ok()
            .filter(|i| *i < self.array.len())
            .ok_or(InteropError::InvalidArrayIndex(index.min(i64::MAX as u64) as i64))
    }
}

impl ForeignObject for HostArrayObject {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn language(&self) -> &str {
        HOST_LANGUAGE
    }

    fn display_string(&self) -> String {
        let parts: Vec<String> = self
            .array
            .to_vec()
            .iter()
            .map(|v| format!("{:?}", v))
            .collect();
        format!("[{}]", parts.join(", "))
    }

    fn meta_name(&self) -> Option<String> {
        Some(self.array.array_type().to_string())
    }

    fn has_array_elements(&self) -> bool {
        true
    }

    fn array_size(&self) -> InteropResult<u64> {
        Ok(self.array.len() as u64)
    }

    fn read_array_element(&self, index: u64) -> InteropResult<GuestValue> {
        let slot = self.slot(index)?;
        let value = self
            .array
            .get(slot)
            .ok_or(InteropError::InvalidArrayIndex(slot as i64))?;
        Ok(to_guest(&self.context, &value))
    }

    fn write_array_element(&self, index: u64, value: GuestValue) -> InteropResult<()> {
        let slot = self.slot(index)?;
        let converted = to_host(&self.context, &value, self.array.component(), Priority::HostProxy)
            .map_err(|e| InteropError::unsupported_type(e.message(), vec![value.clone()]))?;
        if self.array.set(slot, converted) {
            Ok(())
        } else {
            Err(InteropError::InvalidArrayIndex(slot as i64))
        }
    }

    fn array_element_info(&self, index: u64) -> KeyInfo {
        if self.slot(index).is_ok() {
            KeyInfo::EXISTING | KeyInfo::READABLE | KeyInfo::MODIFIABLE
        } else {
            KeyInfo::NONE
        }
    }

    fn has_iterator(&self) -> bool {
        true
    }

    fn get_iterator(&self) -> InteropResult<GuestValue> {
        let elements = self
            .array
            .to_vec()
            .iter()
            .map(|v| to_guest(&self.context, v))
            .collect();
        Ok(GuestValue::object(tandem_sdk::IteratorObject::new(elements)))
    }
}
