//! Tandem SDK - the capability protocol spoken between guest languages and the host
//!
//! A guest language exposes its values to the host by implementing
//! [`ForeignObject`]. The host never inspects guest memory directly; it only
//! asks capability questions (`has_array_elements`, `is_executable`, ...) and
//! sends messages (`read_array_element`, `execute`, ...). Anything a guest does
//! not support answers [`InteropError::UnsupportedMessage`].
//!
//! # Example
//!
//! ```ignore
//! use tandem_sdk::{ArrayObject, ForeignObject, GuestValue};
//!
//! let array = ArrayObject::new(vec![GuestValue::from(1), GuestValue::from(2)]);
//! assert!(array.has_array_elements());
//! assert_eq!(array.array_size().unwrap(), 2);
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod message;
pub mod object;
pub mod objects;
pub mod value;

pub use error::{GuestException, HostException, InteropError, InteropResult};
pub use message::{dispatch, resolve, Handler, Message, Reply};
pub use object::{identity_of, same_object, ForeignObject, HostObject, KeyInfo};
pub use objects::{
    ArrayObject, BoxedObject, BufferObject, ExceptionObject, FunctionObject, IteratorObject,
    NullObject, RecordObject, MEMORY_LANGUAGE,
};
pub use value::{ForeignRef, GuestValue, HostRef, Primitive};
