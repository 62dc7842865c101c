//! Host-facing error taxonomy
//!
//! Every failure a host caller can observe is a [`PolyglotError`]. Guest
//! exceptions and host errors that travelled through guest code are carried
//! unchanged; protocol failures are mapped to the host's collection and
//! conversion error kinds with a message that names the operation, the
//! declared host type and the receiver.

use tandem_sdk::{GuestException, GuestValue, HostException};
use thiserror::Error;

use crate::context::Context;
use crate::types::HostType;

/// Result type for host-facing operations
pub type PolyglotResult<T> = Result<T, PolyglotError>;

/// Error observed by host code
#[derive(Debug, Clone, Error)]
pub enum PolyglotError {
    /// Null converted to a primitive target
    #[error("{0}")]
    NullCoercion(String),

    /// Conversion or cast failure
    #[error("{0}")]
    ClassCast(String),

    /// Operation not supported by the underlying guest value
    #[error("{0}")]
    Unsupported(String),

    /// Invalid argument: wrong arity, wrong argument type, bad key type
    #[error("{0}")]
    IllegalArgument(String),

    /// Index or key does not exist where existence was required
    #[error("{0}")]
    IndexOutOfBounds(String),

    /// A view observed a contradiction caused by concurrent mutation
    #[error("{0}")]
    ConcurrentModification(String),

    /// An exhausted iterator was advanced
    #[error("{0}")]
    NoSuchElement(String),

    /// The owning context is closed or being cancelled
    #[error("{0}")]
    ContextClosed(String),

    /// Misuse of the context's threading rules
    #[error("{0}")]
    IllegalState(String),

    /// An exception raised by guest code
    #[error("{0}")]
    Guest(GuestException),

    /// A host error that travelled through guest code
    #[error("{0}")]
    Host(HostException),
}

impl PolyglotError {
    /// The error's message
    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, PolyglotError::Guest(_))
    }
}

// ============================================================================
// Message builders
// ============================================================================

/// `Cannot convert '<v>'(language: L, type: T) to host type 'X': <reason>`
pub(crate) fn cannot_convert(
    context: &Context,
    value: &GuestValue,
    target: &HostType,
    reason: &str,
) -> PolyglotError {
    PolyglotError::ClassCast(format!(
        "Cannot convert {} to host type '{}': {}",
        context.value_info(value),
        target,
        reason
    ))
}

pub(crate) fn null_coercion(context: &Context, value: &GuestValue, target: &HostType) -> PolyglotError {
    PolyglotError::NullCoercion(format!(
        "Cannot convert null value {} to host primitive type '{}'.",
        context.value_info(value),
        target
    ))
}

/// Which host error kind a view failure maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ViewFailure {
    Unsupported,
    IndexOutOfBounds,
    ClassCast,
    IllegalArgument,
}

/// `<Operation> <reason> for <Target> <Receiver>[, index 'k'].`
pub(crate) fn view_error(
    failure: ViewFailure,
    context: &Context,
    operation: &str,
    reason: &str,
    target: &HostType,
    receiver: &GuestValue,
    key: Option<&str>,
) -> PolyglotError {
    let mut message = format!(
        "{} {} for {} {}",
        operation,
        reason,
        target,
        context.value_info(receiver)
    );
    if let Some(key) = key {
        message.push_str(&format!(", index '{}'", key));
    }
    message.push('.');
    match failure {
        ViewFailure::Unsupported => PolyglotError::Unsupported(message),
        ViewFailure::IndexOutOfBounds => PolyglotError::IndexOutOfBounds(message),
        ViewFailure::ClassCast => PolyglotError::ClassCast(message),
        ViewFailure::IllegalArgument => PolyglotError::IllegalArgument(message),
    }
}

/// `Invalid argument count when executing <f> with arguments [..]. Expected n argument(s) but got m.`
pub(crate) fn invalid_arity(
    context: &Context,
    receiver: &GuestValue,
    args: &[GuestValue],
    expected_min: usize,
    expected_max: Option<usize>,
    actual: usize,
) -> PolyglotError {
    PolyglotError::IllegalArgument(format!(
        "Invalid argument count when executing {} with arguments {}. Expected {} argument(s) but got {}.",
        context.value_info(receiver),
        render_arguments(context, args),
        tandem_sdk::error::expected_arguments(&expected_min, &expected_max),
        actual
    ))
}

pub(crate) fn invalid_argument(
    context: &Context,
    receiver: &GuestValue,
    args: &[GuestValue],
    detail: &str,
) -> PolyglotError {
    PolyglotError::IllegalArgument(format!(
        "Invalid argument when executing {} with arguments {}: {}",
        context.value_info(receiver),
        render_arguments(context, args),
        detail
    ))
}

fn render_arguments(context: &Context, args: &[GuestValue]) -> String {
    let parts: Vec<String> = args.iter().map(|a| context.value_info(a)).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use tandem_sdk::{ArrayObject, GuestValue};

    #[test]
    fn test_view_error_format() {
        let context = Context::builder("memory").build();
        let receiver = GuestValue::object(ArrayObject::new(vec![]));
        let err = view_error(
            ViewFailure::Unsupported,
            &context,
            "Unsupported operation",
            "remove",
            &HostType::list_of(HostType::string()),
            &receiver,
            Some("3"),
        );
        assert_eq!(
            err.message(),
            "Unsupported operation remove for List<String> '[]'(language: memory, type: Array), index '3'."
        );
        assert!(matches!(err, PolyglotError::Unsupported(_)));
    }

    #[test]
    fn test_arity_message() {
        let context = Context::builder("memory").build();
        let receiver = GuestValue::from(1);
        let err = invalid_arity(&context, &receiver, &[GuestValue::from(2)], 2, None, 1);
        assert_eq!(
            err.message(),
            "Invalid argument count when executing '1'(language: memory, type: int) with arguments ['2'(language: memory, type: int)]. Expected 2+ argument(s) but got 1."
        );
    }

    #[test]
    fn test_cannot_convert_format() {
        let context = Context::builder("memory").build();
        let err = cannot_convert(
            &context,
            &GuestValue::from("abc"),
            &HostType::primitive(crate::types::PrimitiveKind::Int),
            "Invalid or lossy primitive coercion.",
        );
        assert_eq!(
            err.message(),
            "Cannot convert 'abc'(language: memory, type: string) to host type 'int': Invalid or lossy primitive coercion."
        );
    }
}
