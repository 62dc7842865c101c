//! `Function<P, R>` over a guest executable or instantiable value

use std::fmt;
use std::hash::{Hash, Hasher};

use tandem_sdk::{ForeignRef, GuestValue, InteropError};

use super::{fail, routine, ViewCore};
use crate::cache::Operation;
use crate::context::Context;
use crate::error::{PolyglotResult, ViewFailure};
use crate::host_value::HostValue;
use crate::proxy::execution_error;
use crate::to_guest::to_guest;
use crate::to_host::{to_host, Priority};
use crate::types::HostType;

/// A live function view. Arguments are passed to the guest as is; the result
/// is converted to the declared return type.
#[derive(Clone)]
pub struct FunctionView {
    core: ViewCore,
    ret: HostType,
}

impl FunctionView {
    pub(crate) fn new(context: Context, receiver: ForeignRef, ret: HostType) -> Self {
        FunctionView {
            core: ViewCore::new(context, receiver),
            ret,
        }
    }

    pub fn return_type(&self) -> &HostType {
        &self.ret
    }

    pub fn context(&self) -> &Context {
        self.core.context()
    }

    pub fn guest_value(&self) -> GuestValue {
        self.core.guest_value()
    }

    /// Call the guest value; executable values are executed, instantiable
    /// ones are instantiated
    pub fn apply(&self, args: &[HostValue]) -> PolyglotResult<HostValue> {
        let ret = self.ret.clone();
        self.core.call(
            self.core.key(Operation::FunctionApply, vec![self.ret.clone()]),
            || {
                routine(move |context, receiver, args| {
                    let guest_args: Vec<GuestValue> =
                        args.iter().map(|a| to_guest(context, a)).collect();
                    let result = if receiver.is_executable() {
                        receiver.execute(&guest_args)
                    } else if receiver.is_instantiable() {
                        receiver.instantiate(&guest_args)
                    } else {
                        Err(InteropError::UnsupportedMessage)
                    };
                    match result {
                        Ok(value) => to_host(context, &value, &ret, Priority::HostProxy),
                        Err(InteropError::UnsupportedMessage) => Err(fail(
                            ViewFailure::Unsupported,
                            context,
                            "Unsupported operation",
                            "apply",
                            &HostType::function_of(HostType::object(), ret.clone()),
                            receiver,
                            None,
                        )),
                        Err(e) => Err(execution_error(
                            context,
                            &GuestValue::Object(receiver.clone()),
                            &guest_args,
                            e,
                        )),
                    }
                })
            },
            args,
        )
    }
}

impl PartialEq for FunctionView {
    fn eq(&self, other: &Self) -> bool {
        self.core == other.core
    }
}

impl Hash for FunctionView {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core.hash(state);
    }
}

impl fmt::Debug for FunctionView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function<Object, {}> over {:?}", self.ret, self.core)
    }
}
