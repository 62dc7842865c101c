//! Error types of the capability protocol

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::value::{ForeignRef, GuestValue};

/// Result type for capability messages
pub type InteropResult<T> = Result<T, InteropError>;

/// Failure of a single capability message.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InteropError {
    /// The receiver does not support the message
    #[error("Message not supported")]
    UnsupportedMessage,

    /// Array index outside the valid range
    #[error("Invalid array index {0}")]
    InvalidArrayIndex(i64),

    /// Member key does not exist
    #[error("Unknown identifier '{0}'")]
    UnknownIdentifier(String),

    /// An argument or written value has a type the receiver does not accept
    #[error("{message}")]
    UnsupportedType {
        /// Description of the mismatch
        message: String,
        /// The values that were rejected
        supplied: Vec<GuestValue>,
    },

    /// Wrong number of arguments
    #[error("Expected {} argument(s) but got {actual}", expected_arguments(.expected_min, .expected_max))]
    Arity {
        /// Minimum accepted argument count
        expected_min: usize,
        /// Maximum accepted argument count; `None` means unbounded
        expected_max: Option<usize>,
        /// Supplied argument count
        actual: usize,
    },

    /// The iterator is exhausted
    #[error("Iteration stopped")]
    StopIteration,

    /// Buffer access outside the buffer
    #[error("Invalid buffer access of length {length} at byte offset {offset}")]
    InvalidBufferOffset {
        /// Byte offset of the access
        offset: u64,
        /// Length of the access
        length: u64,
    },

    /// An exception raised by guest code
    #[error("{0}")]
    Guest(GuestException),

    /// A host error that travelled through guest code
    #[error("{0}")]
    Host(HostException),

    /// An internal engine failure; reported to callers as a host error
    #[error("{0}")]
    Engine(HostException),
}

impl InteropError {
    /// Convenience constructor for [`InteropError::UnsupportedType`]
    pub fn unsupported_type(message: impl Into<String>, supplied: Vec<GuestValue>) -> Self {
        InteropError::UnsupportedType {
            message: message.into(),
            supplied,
        }
    }

    /// Convenience constructor for [`InteropError::Arity`]
    pub fn arity(expected_min: usize, expected_max: Option<usize>, actual: usize) -> Self {
        InteropError::Arity {
            expected_min,
            expected_max,
            actual,
        }
    }
}

/// Render an expected argument count: `n`, `min-max` or `min+`
pub fn expected_arguments(min: &usize, max: &Option<usize>) -> String {
    match max {
        Some(max) if max == min => min.to_string(),
        Some(max) => format!("{}-{}", min, max),
        None => format!("{}+", min),
    }
}

// ============================================================================
// Exceptions
// ============================================================================

/// An exception raised inside a guest, carrying the guest's exception object.
#[derive(Clone)]
pub struct GuestException {
    object: ForeignRef,
    message: String,
}

impl GuestException {
    /// Wrap a guest exception object, using its display string as message
    pub fn new(object: ForeignRef) -> Self {
        let message = object.display_string();
        GuestException { object, message }
    }

    /// Wrap a guest exception object with an explicit message
    pub fn with_message(object: ForeignRef, message: impl Into<String>) -> Self {
        GuestException {
            object,
            message: message.into(),
        }
    }

    /// The guest exception object
    pub fn object(&self) -> &ForeignRef {
        &self.object
    }

    /// The exception message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for GuestException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl fmt::Debug for GuestException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestException")
            .field("language", &self.object.language())
            .field("message", &self.message)
            .finish()
    }
}

/// A host-side error carried through guest code.
#[derive(Clone)]
pub struct HostException(Arc<dyn Error + Send + Sync + 'static>);

impl HostException {
    /// Wrap any host error
    pub fn new<E: Error + Send + Sync + 'static>(error: E) -> Self {
        HostException(Arc::new(error))
    }

    /// Borrow the wrapped error
    pub fn error(&self) -> &(dyn Error + Send + Sync + 'static) {
        &*self.0
    }

    /// Downcast the wrapped error
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }
}

impl fmt::Display for HostException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for HostException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostException({:?})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("disk on fire")]
    struct Fire;

    #[test]
    fn test_expected_arguments_format() {
        assert_eq!(expected_arguments(&2, &Some(2)), "2");
        assert_eq!(expected_arguments(&1, &Some(3)), "1-3");
        assert_eq!(expected_arguments(&1, &None), "1+");
    }

    #[test]
    fn test_arity_display() {
        let err = InteropError::arity(2, Some(2), 3);
        assert_eq!(err.to_string(), "Expected 2 argument(s) but got 3");
    }

    #[test]
    fn test_host_exception_downcast() {
        let ex = HostException::new(Fire);
        assert!(ex.downcast_ref::<Fire>().is_some());
        assert_eq!(ex.to_string(), "disk on fire");
    }
}
