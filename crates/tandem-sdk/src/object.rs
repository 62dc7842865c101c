//! The capability protocol
//!
//! Every foreign object implements [`ForeignObject`]. Capability queries
//! (`has_*`, `is_*`) never fail; messages return [`InteropResult`] and the
//! default implementation of every message reports
//! [`InteropError::UnsupportedMessage`], so a guest only implements what its
//! values can actually do.

use std::any::Any;
use std::ops::BitOr;
use std::sync::Arc;

use crate::error::{InteropError, InteropResult};
use crate::value::{ForeignRef, GuestValue, Primitive};

// ============================================================================
// Key Info
// ============================================================================

/// What may be done with a single member key or array index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct KeyInfo(u8);

impl KeyInfo {
    /// Nothing is permitted; the key does not exist
    pub const NONE: KeyInfo = KeyInfo(0);
    /// The key exists
    pub const EXISTING: KeyInfo = KeyInfo(1);
    /// The value under the key can be read
    pub const READABLE: KeyInfo = KeyInfo(1 << 1);
    /// The value under the key can be replaced
    pub const MODIFIABLE: KeyInfo = KeyInfo(1 << 2);
    /// The key can be removed
    pub const REMOVABLE: KeyInfo = KeyInfo(1 << 3);
    /// A value can be written under the (currently absent) key
    pub const INSERTABLE: KeyInfo = KeyInfo(1 << 4);

    /// Info for an existing key that can be read and replaced
    pub const fn existing_mutable() -> KeyInfo {
        KeyInfo(Self::EXISTING.0 | Self::READABLE.0 | Self::MODIFIABLE.0)
    }

    /// Whether every flag in `other` is set
    pub const fn contains(self, other: KeyInfo) -> bool {
        self.0 & other.0 == other.0
    }

    /// The key exists
    pub const fn is_existing(self) -> bool {
        self.contains(Self::EXISTING)
    }

    /// The key is readable
    pub const fn is_readable(self) -> bool {
        self.contains(Self::READABLE)
    }

    /// The key is modifiable
    pub const fn is_modifiable(self) -> bool {
        self.contains(Self::MODIFIABLE)
    }

    /// The key is removable
    pub const fn is_removable(self) -> bool {
        self.contains(Self::REMOVABLE)
    }

    /// A value may be inserted under the key
    pub const fn is_insertable(self) -> bool {
        self.contains(Self::INSERTABLE)
    }

    /// A write under the key would succeed (modify or insert)
    pub const fn is_writable(self) -> bool {
        self.is_modifiable() || self.is_insertable()
    }
}

impl BitOr for KeyInfo {
    type Output = KeyInfo;

    fn bitor(self, rhs: KeyInfo) -> KeyInfo {
        KeyInfo(self.0 | rhs.0)
    }
}

// ============================================================================
// Foreign Object
// ============================================================================

/// A guest value reachable only through capability messages.
///
/// Implementations must be thread safe: the host may send messages from any
/// thread that has entered the owning context.
pub trait ForeignObject: Send + Sync + 'static {
    /// Upcast for downcasting to the concrete guest type
    fn as_any(&self) -> &dyn Any;

    /// Name of the language that owns this value
    fn language(&self) -> &str;

    /// Guest-defined display string
    fn display_string(&self) -> String;

    /// Guest-defined name of this value's type, if the guest has one
    fn meta_name(&self) -> Option<String> {
        None
    }

    // ------------------------------------------------------------------------
    // Null and boxed scalars
    // ------------------------------------------------------------------------

    /// Whether this object is the guest's null
    fn is_null(&self) -> bool {
        false
    }

    /// Whether this object wraps a single scalar
    fn is_boxed(&self) -> bool {
        self.unbox().is_some()
    }

    /// The wrapped scalar, if this object is boxed
    fn unbox(&self) -> Option<Primitive> {
        None
    }

    // ------------------------------------------------------------------------
    // Array elements
    // ------------------------------------------------------------------------

    /// Whether the object has indexable elements
    fn has_array_elements(&self) -> bool {
        false
    }

    /// Number of array elements
    fn array_size(&self) -> InteropResult<u64> {
        Err(InteropError::UnsupportedMessage)
    }

    /// Read the element at `index`
    fn read_array_element(&self, _index: u64) -> InteropResult<GuestValue> {
        Err(InteropError::UnsupportedMessage)
    }

    /// Write (modify or insert) the element at `index`
    fn write_array_element(&self, _index: u64, _value: GuestValue) -> InteropResult<()> {
        Err(InteropError::UnsupportedMessage)
    }

    /// Remove the element at `index`, shifting later elements down
    fn remove_array_element(&self, _index: u64) -> InteropResult<()> {
        Err(InteropError::UnsupportedMessage)
    }

    /// What may be done with `index`
    fn array_element_info(&self, _index: u64) -> KeyInfo {
        KeyInfo::NONE
    }

    // ------------------------------------------------------------------------
    // Members
    // ------------------------------------------------------------------------

    /// Whether the object has named members
    fn has_members(&self) -> bool {
        false
    }

    /// Names of the object's members
    fn member_keys(&self) -> InteropResult<Vec<String>> {
        Err(InteropError::UnsupportedMessage)
    }

    /// Read the member named `key`
    fn read_member(&self, _key: &str) -> InteropResult<GuestValue> {
        Err(InteropError::UnsupportedMessage)
    }

    /// Write (modify or insert) the member named `key`
    fn write_member(&self, _key: &str, _value: GuestValue) -> InteropResult<()> {
        Err(InteropError::UnsupportedMessage)
    }

    /// Remove the member named `key`
    fn remove_member(&self, _key: &str) -> InteropResult<()> {
        Err(InteropError::UnsupportedMessage)
    }

    /// What may be done with the member named `key`
    fn member_info(&self, _key: &str) -> KeyInfo {
        KeyInfo::NONE
    }

    /// Invoke the member named `key` as a method
    fn invoke_member(&self, _key: &str, _args: &[GuestValue]) -> InteropResult<GuestValue> {
        Err(InteropError::UnsupportedMessage)
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    /// Whether the object can be called
    fn is_executable(&self) -> bool {
        false
    }

    /// Call the object
    fn execute(&self, _args: &[GuestValue]) -> InteropResult<GuestValue> {
        Err(InteropError::UnsupportedMessage)
    }

    /// Whether the object can construct new values
    fn is_instantiable(&self) -> bool {
        false
    }

    /// Construct a new value
    fn instantiate(&self, _args: &[GuestValue]) -> InteropResult<GuestValue> {
        Err(InteropError::UnsupportedMessage)
    }

    // ------------------------------------------------------------------------
    // Iteration
    // ------------------------------------------------------------------------

    /// Whether the object can produce an iterator
    fn has_iterator(&self) -> bool {
        false
    }

    /// Produce a fresh iterator object
    fn get_iterator(&self) -> InteropResult<GuestValue> {
        Err(InteropError::UnsupportedMessage)
    }

    /// Whether the object is itself an iterator
    fn is_iterator(&self) -> bool {
        false
    }

    /// Whether the iterator has another element
    fn has_iterator_next_element(&self) -> InteropResult<bool> {
        Err(InteropError::UnsupportedMessage)
    }

    /// Advance the iterator; reports [`InteropError::StopIteration`] when
    /// exhausted
    fn get_iterator_next_element(&self) -> InteropResult<GuestValue> {
        Err(InteropError::UnsupportedMessage)
    }

    // ------------------------------------------------------------------------
    // Buffers
    // ------------------------------------------------------------------------

    /// Whether the object exposes raw bytes
    fn has_buffer_elements(&self) -> bool {
        false
    }

    /// Number of bytes in the buffer
    fn buffer_size(&self) -> InteropResult<u64> {
        Err(InteropError::UnsupportedMessage)
    }

    /// Read one byte
    fn read_buffer_byte(&self, _offset: u64) -> InteropResult<u8> {
        Err(InteropError::UnsupportedMessage)
    }

    /// Fill `dst` with bytes starting at `offset`
    fn read_buffer(&self, offset: u64, dst: &mut [u8]) -> InteropResult<()> {
        for (i, slot) in dst.iter_mut().enumerate() {
            *slot = self.read_buffer_byte(offset + i as u64)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Exceptions and identity
    // ------------------------------------------------------------------------

    /// Whether the object is a guest exception
    fn is_exception(&self) -> bool {
        false
    }

    /// Whether `other` is the very same guest value as this object
    fn is_identical(&self, other: &GuestValue) -> bool {
        match other {
            GuestValue::Object(o) => {
                std::ptr::eq(Arc::as_ptr(o) as *const (), self as *const Self as *const ())
            }
            _ => false,
        }
    }

    /// Hash consistent with [`ForeignObject::is_identical`]
    fn identity_hash(&self) -> u64 {
        self as *const Self as *const () as usize as u64
    }
}

/// Whether two handles point at the same foreign object
pub fn same_object(a: &ForeignRef, b: &ForeignRef) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Address-based identity of a foreign object
pub fn identity_of(object: &ForeignRef) -> usize {
    Arc::as_ptr(object) as *const () as usize
}

// ============================================================================
// Host Object
// ============================================================================

/// A host value handed into a guest and passed back unchanged.
pub trait HostObject: Send + Sync + 'static {
    /// Host class name
    fn class_name(&self) -> &str;

    /// Whether this object is an instance of the named host class or interface
    fn is_instance_of(&self, class_name: &str) -> bool {
        self.class_name() == class_name
    }

    /// Upcast for downcasting to the concrete host type
    fn as_any(&self) -> &dyn Any;

    /// Display string used in diagnostics
    fn display_string(&self) -> String {
        self.class_name().to_string()
    }
}
