//! In-memory reference guest
//!
//! A tiny guest language whose values live in ordinary Rust collections. It is
//! used to exercise the engine and doubles as a template for real guests.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{GuestException, InteropError, InteropResult};
use crate::object::{ForeignObject, KeyInfo};
use crate::value::{GuestValue, Primitive};

/// Language name reported by every object in this module
pub const MEMORY_LANGUAGE: &str = "memory";

fn render(value: &GuestValue) -> String {
    match value {
        GuestValue::Null => "null".to_string(),
        GuestValue::Primitive(Primitive::String(s)) => format!("\"{}\"", s),
        GuestValue::Primitive(p) => p.to_string(),
        GuestValue::Object(o) => o.display_string(),
        GuestValue::Host(h) => h.display_string(),
    }
}

fn invalid_index(index: u64) -> InteropError {
    InteropError::InvalidArrayIndex(i64::try_from(index).unwrap_or(i64::MAX))
}

// ============================================================================
// Arrays and iterators
// ============================================================================

/// A growable array of guest values.
pub struct ArrayObject {
    elements: Arc<RwLock<Vec<GuestValue>>>,
    mutable: bool,
}

impl ArrayObject {
    /// Create a mutable, resizable array
    pub fn new(elements: Vec<GuestValue>) -> Self {
        ArrayObject {
            elements: Arc::new(RwLock::new(elements)),
            mutable: true,
        }
    }

    /// Create an array that rejects every write
    pub fn read_only(elements: Vec<GuestValue>) -> Self {
        ArrayObject {
            elements: Arc::new(RwLock::new(elements)),
            mutable: false,
        }
    }

    /// Copy of the current elements
    pub fn snapshot(&self) -> Vec<GuestValue> {
        self.elements.read().clone()
    }

    /// Remove every element, bypassing the mutability flag
    pub fn clear(&self) {
        self.elements.write().clear();
    }
}

impl ForeignObject for ArrayObject {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn language(&self) -> &str {
        MEMORY_LANGUAGE
    }

    fn display_string(&self) -> String {
        let elements = self.elements.read();
        let parts: Vec<String> = elements.iter().map(render).collect();
        format!("[{}]", parts.join(", "))
    }

    fn meta_name(&self) -> Option<String> {
        Some("Array".to_string())
    }

    fn has_array_elements(&self) -> bool {
        true
    }

    fn array_size(&self) -> InteropResult<u64> {
        Ok(self.elements.read().len() as u64)
    }

    fn read_array_element(&self, index: u64) -> InteropResult<GuestValue> {
        let elements = self.elements.read();
        usize::try_from(index)
            .ok()
            .and_then(|i| elements.get(i).cloned())
            .ok_or_else(|| invalid_index(index))
    }

    fn write_array_element(&self, index: u64, value: GuestValue) -> InteropResult<()> {
        if !self.mutable {
            return Err(InteropError::UnsupportedMessage);
        }
        let mut elements = self.elements.write();
        let len = elements.len() as u64;
        if index < len {
            elements[index as usize] = value;
            Ok(())
        } else if index == len {
            elements.push(value);
            Ok(())
        } else {
            Err(invalid_index(index))
        }
    }

    fn remove_array_element(&self, index: u64) -> InteropResult<()> {
        if !self.mutable {
            return Err(InteropError::UnsupportedMessage);
        }
        let mut elements = self.elements.write();
        if index < elements.len() as u64 {
            elements.remove(index as usize);
            Ok(())
        } else {
            Err(invalid_index(index))
        }
    }

    fn array_element_info(&self, index: u64) -> KeyInfo {
        let len = self.elements.read().len() as u64;
        if index < len {
            let info = KeyInfo::EXISTING | KeyInfo::READABLE;
            if self.mutable {
                info | KeyInfo::MODIFIABLE | KeyInfo::REMOVABLE
            } else {
                info
            }
        } else if index == len && self.mutable {
            KeyInfo::INSERTABLE
        } else {
            KeyInfo::NONE
        }
    }

    fn has_iterator(&self) -> bool {
        true
    }

    fn get_iterator(&self) -> InteropResult<GuestValue> {
        Ok(GuestValue::object(IteratorObject {
            source: self.elements.clone(),
            cursor: AtomicUsize::new(0),
        }))
    }
}

/// A cursor over a live element vector.
///
/// The cursor observes concurrent changes to its source, so clearing the
/// source between `has_iterator_next_element` and `get_iterator_next_element`
/// makes the latter report [`InteropError::StopIteration`].
pub struct IteratorObject {
    source: Arc<RwLock<Vec<GuestValue>>>,
    cursor: AtomicUsize,
}

impl IteratorObject {
    /// Iterate over a private copy of `elements`
    pub fn new(elements: Vec<GuestValue>) -> Self {
        IteratorObject {
            source: Arc::new(RwLock::new(elements)),
            cursor: AtomicUsize::new(0),
        }
    }
}

impl ForeignObject for IteratorObject {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn language(&self) -> &str {
        MEMORY_LANGUAGE
    }

    fn display_string(&self) -> String {
        format!("Iterator@{}", self.cursor.load(Ordering::Relaxed))
    }

    fn is_iterator(&self) -> bool {
        true
    }

    fn has_iterator_next_element(&self) -> InteropResult<bool> {
        Ok(self.cursor.load(Ordering::SeqCst) < self.source.read().len())
    }

    fn get_iterator_next_element(&self) -> InteropResult<GuestValue> {
        let source = self.source.read();
        let index = self.cursor.load(Ordering::SeqCst);
        match source.get(index) {
            Some(value) => {
                self.cursor.store(index + 1, Ordering::SeqCst);
                Ok(value.clone())
            }
            None => Err(InteropError::StopIteration),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// An object with named members, kept in insertion order.
pub struct RecordObject {
    members: RwLock<Vec<(String, GuestValue)>>,
    frozen: bool,
}

impl RecordObject {
    /// Create a mutable record
    pub fn new<K: Into<String>>(members: Vec<(K, GuestValue)>) -> Self {
        RecordObject {
            members: RwLock::new(members.into_iter().map(|(k, v)| (k.into(), v)).collect()),
            frozen: false,
        }
    }

    /// Create a record that rejects every write
    pub fn frozen<K: Into<String>>(members: Vec<(K, GuestValue)>) -> Self {
        RecordObject {
            frozen: true,
            ..RecordObject::new(members)
        }
    }

    fn lookup(&self, key: &str) -> Option<GuestValue> {
        self.members
            .read()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }
}

impl ForeignObject for RecordObject {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn language(&self) -> &str {
        MEMORY_LANGUAGE
    }

    fn display_string(&self) -> String {
        let members = self.members.read();
        let parts: Vec<String> = members
            .iter()
            .map(|(k, v)| format!("{}: {}", k, render(v)))
            .collect();
        format!("{{{}}}", parts.join(", "))
    }

    fn meta_name(&self) -> Option<String> {
        Some("Record".to_string())
    }

    fn has_members(&self) -> bool {
        true
    }

    fn member_keys(&self) -> InteropResult<Vec<String>> {
        Ok(self.members.read().iter().map(|(k, _)| k.clone()).collect())
    }

    fn read_member(&self, key: &str) -> InteropResult<GuestValue> {
        self.lookup(key)
            .ok_or_else(|| InteropError::UnknownIdentifier(key.to_string()))
    }

    fn write_member(&self, key: &str, value: GuestValue) -> InteropResult<()> {
        if self.frozen {
            return Err(InteropError::UnsupportedMessage);
        }
        let mut members = self.members.write();
        match members.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => members.push((key.to_string(), value)),
        }
        Ok(())
    }

    fn remove_member(&self, key: &str) -> InteropResult<()> {
        if self.frozen {
            return Err(InteropError::UnsupportedMessage);
        }
        let mut members = self.members.write();
        let position = members
            .iter()
            .position(|(k, _)| k == key)
            .ok_or_else(|| InteropError::UnknownIdentifier(key.to_string()))?;
        members.remove(position);
        Ok(())
    }

    fn member_info(&self, key: &str) -> KeyInfo {
        let exists = self.members.read().iter().any(|(k, _)| k == key);
        match (exists, self.frozen) {
            (true, true) => KeyInfo::EXISTING | KeyInfo::READABLE,
            (true, false) => KeyInfo::existing_mutable() | KeyInfo::REMOVABLE,
            (false, false) => KeyInfo::INSERTABLE,
            (false, true) => KeyInfo::NONE,
        }
    }

    fn invoke_member(&self, key: &str, args: &[GuestValue]) -> InteropResult<GuestValue> {
        match self.read_member(key)? {
            GuestValue::Object(target) if target.is_executable() => target.execute(args),
            _ => Err(InteropError::UnsupportedMessage),
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

type FunctionBody = dyn Fn(&[GuestValue]) -> InteropResult<GuestValue> + Send + Sync;

/// A guest function backed by a Rust closure.
pub struct FunctionObject {
    name: String,
    arity: Option<usize>,
    constructor: bool,
    body: Arc<FunctionBody>,
}

impl FunctionObject {
    /// Create an executable function accepting any number of arguments
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&[GuestValue]) -> InteropResult<GuestValue> + Send + Sync + 'static,
    {
        FunctionObject {
            name: name.into(),
            arity: None,
            constructor: false,
            body: Arc::new(body),
        }
    }

    /// Create a constructor: instantiable but not executable
    pub fn constructor<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&[GuestValue]) -> InteropResult<GuestValue> + Send + Sync + 'static,
    {
        FunctionObject {
            constructor: true,
            ..FunctionObject::new(name, body)
        }
    }

    /// Require exactly `arity` arguments
    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = Some(arity);
        self
    }

    fn call(&self, args: &[GuestValue]) -> InteropResult<GuestValue> {
        if let Some(arity) = self.arity {
            if args.len() != arity {
                return Err(InteropError::arity(arity, Some(arity), args.len()));
            }
        }
        (self.body)(args)
    }
}

impl fmt::Debug for FunctionObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionObject")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

impl ForeignObject for FunctionObject {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn language(&self) -> &str {
        MEMORY_LANGUAGE
    }

    fn display_string(&self) -> String {
        format!("function {}()", self.name)
    }

    fn meta_name(&self) -> Option<String> {
        Some("Function".to_string())
    }

    fn is_executable(&self) -> bool {
        !self.constructor
    }

    fn execute(&self, args: &[GuestValue]) -> InteropResult<GuestValue> {
        if self.constructor {
            return Err(InteropError::UnsupportedMessage);
        }
        self.call(args)
    }

    fn is_instantiable(&self) -> bool {
        self.constructor
    }

    fn instantiate(&self, args: &[GuestValue]) -> InteropResult<GuestValue> {
        if !self.constructor {
            return Err(InteropError::UnsupportedMessage);
        }
        self.call(args)
    }
}

// ============================================================================
// Buffers, boxes, null and exceptions
// ============================================================================

/// A byte buffer.
pub struct BufferObject {
    bytes: RwLock<Vec<u8>>,
}

impl BufferObject {
    /// Create a buffer over `bytes`
    pub fn new(bytes: Vec<u8>) -> Self {
        BufferObject {
            bytes: RwLock::new(bytes),
        }
    }
}

impl ForeignObject for BufferObject {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn language(&self) -> &str {
        MEMORY_LANGUAGE
    }

    fn display_string(&self) -> String {
        format!("Buffer({})", self.bytes.read().len())
    }

    fn has_buffer_elements(&self) -> bool {
        true
    }

    fn buffer_size(&self) -> InteropResult<u64> {
        Ok(self.bytes.read().len() as u64)
    }

    fn read_buffer_byte(&self, offset: u64) -> InteropResult<u8> {
        let bytes = self.bytes.read();
        usize::try_from(offset)
            .ok()
            .and_then(|i| bytes.get(i).copied())
            .ok_or(InteropError::InvalidBufferOffset { offset, length: 1 })
    }

    fn read_buffer(&self, offset: u64, dst: &mut [u8]) -> InteropResult<()> {
        let bytes = self.bytes.read();
        let length = dst.len() as u64;
        let end = offset.checked_add(length);
        match end {
            Some(end) if end <= bytes.len() as u64 => {
                dst.copy_from_slice(&bytes[offset as usize..end as usize]);
                Ok(())
            }
            _ => Err(InteropError::InvalidBufferOffset { offset, length }),
        }
    }
}

/// A single scalar wrapped in an object.
pub struct BoxedObject {
    value: Primitive,
}

impl BoxedObject {
    /// Box `value`
    pub fn new(value: Primitive) -> Self {
        BoxedObject { value }
    }
}

impl ForeignObject for BoxedObject {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn language(&self) -> &str {
        MEMORY_LANGUAGE
    }

    fn display_string(&self) -> String {
        self.value.to_string()
    }

    fn meta_name(&self) -> Option<String> {
        Some(self.value.type_name().to_string())
    }

    fn unbox(&self) -> Option<Primitive> {
        Some(self.value.clone())
    }
}

/// The guest's null.
pub struct NullObject;

impl ForeignObject for NullObject {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn language(&self) -> &str {
        MEMORY_LANGUAGE
    }

    fn display_string(&self) -> String {
        "null".to_string()
    }

    fn is_null(&self) -> bool {
        true
    }
}

/// A guest exception object.
pub struct ExceptionObject {
    message: String,
}

impl ExceptionObject {
    /// Create an exception object
    pub fn new(message: impl Into<String>) -> Self {
        ExceptionObject {
            message: message.into(),
        }
    }

    /// Build the error a guest raises when throwing this exception
    pub fn raise(message: impl Into<String>) -> InteropError {
        InteropError::Guest(GuestException::new(Arc::new(ExceptionObject::new(message))))
    }
}

impl ForeignObject for ExceptionObject {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn language(&self) -> &str {
        MEMORY_LANGUAGE
    }

    fn display_string(&self) -> String {
        self.message.clone()
    }

    fn meta_name(&self) -> Option<String> {
        Some("Error".to_string())
    }

    fn is_exception(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_write_appends_at_end() {
        let array = ArrayObject::new(vec![GuestValue::from(1)]);
        assert!(array.array_element_info(1).is_insertable());
        array.write_array_element(1, GuestValue::from(2)).unwrap();
        assert_eq!(array.array_size().unwrap(), 2);
        assert!(matches!(
            array.write_array_element(5, GuestValue::Null),
            Err(InteropError::InvalidArrayIndex(5))
        ));
    }

    #[test]
    fn test_read_only_array_rejects_writes() {
        let array = ArrayObject::read_only(vec![GuestValue::from(1)]);
        assert!(!array.array_element_info(0).is_modifiable());
        assert!(matches!(
            array.write_array_element(0, GuestValue::Null),
            Err(InteropError::UnsupportedMessage)
        ));
    }

    #[test]
    fn test_iterator_sees_cleared_source() {
        let array = ArrayObject::new(vec![GuestValue::from(1)]);
        let iterator = array.get_iterator().unwrap();
        let iterator = iterator.as_object().unwrap();
        assert!(iterator.has_iterator_next_element().unwrap());
        array.clear();
        assert!(matches!(
            iterator.get_iterator_next_element(),
            Err(InteropError::StopIteration)
        ));
    }

    #[test]
    fn test_record_members() {
        let record = RecordObject::new(vec![("a", GuestValue::from(1))]);
        assert!(record.member_info("a").is_readable());
        assert!(record.member_info("b").is_insertable());
        record.write_member("b", GuestValue::from(2)).unwrap();
        assert_eq!(record.member_keys().unwrap(), vec!["a", "b"]);
        record.remove_member("a").unwrap();
        assert!(matches!(
            record.read_member("a"),
            Err(InteropError::UnknownIdentifier(_))
        ));
        assert_eq!(record.display_string(), "{b: 2}");
    }

    #[test]
    fn test_function_arity() {
        let f = FunctionObject::new("id", |args| Ok(args[0].clone())).with_arity(1);
        assert!(f.execute(&[GuestValue::from(3)]).is_ok());
        assert!(matches!(
            f.execute(&[]),
            Err(InteropError::Arity { expected_min: 1, actual: 0, .. })
        ));
    }

    #[test]
    fn test_buffer_bounds() {
        let buffer = BufferObject::new(vec![1, 2, 3]);
        let mut dst = [0u8; 2];
        buffer.read_buffer(1, &mut dst).unwrap();
        assert_eq!(dst, [2, 3]);
        assert!(buffer.read_buffer(2, &mut dst).is_err());
        assert!(buffer.read_buffer_byte(3).is_err());
    }
}
