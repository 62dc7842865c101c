//! Reverse proxies between host and guest code
//!
//! - [`InterfaceProxy`]: a guest value implementing a host interface, either
//!   as a function (functional interfaces) or through its members
//! - [`HostFunction`]: host closures exposed to guests, with overload
//!   resolution over typed signatures

mod host_function;
mod interface;

pub use host_function::{HostFunction, HostFunctionBuilder, Overload};
pub use interface::InterfaceProxy;

pub(crate) use interface::ProxyMode;

use tandem_sdk::{GuestValue, InteropError};

use crate::context::Context;
use crate::error::{invalid_argument, invalid_arity, PolyglotError};

/// Map the failure of executing `callee` with `args` to a host error
pub(crate) fn execution_error(
    context: &Context,
    callee: &GuestValue,
    args: &[GuestValue],
    error: InteropError,
) -> PolyglotError {
    match error {
        InteropError::Arity {
            expected_min,
            expected_max,
            actual,
        } => invalid_arity(context, callee, args, expected_min, expected_max, actual),
        InteropError::UnsupportedType { message, .. } => {
            invalid_argument(context, callee, args, &message)
        }
        other => context.to_host_error(other),
    }
}
