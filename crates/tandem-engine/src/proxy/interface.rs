//! Guest values implementing host interfaces

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tandem_sdk::{ForeignRef, GuestValue, InteropError};
use tracing::trace;

use super::execution_error;
use crate::cache::Operation;
use crate::context::Context;
use crate::error::{PolyglotError, PolyglotResult, ViewFailure};
use crate::host_value::HostValue;
use crate::to_guest::to_guest;
use crate::to_host::{to_host, Priority};
use crate::types::{HostType, InterfaceDesc, MethodDesc};
use crate::views::{fail, routine, ViewCore};

/// How interface methods reach the guest value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ProxyMode {
    /// The single abstract method executes the guest value
    Function,
    /// Each method invokes the guest member of the same name
    Object,
}

/// A host interface implemented by a guest value.
///
/// `equals`, `hashCode` and `toString` are answered from the identity of the
/// guest value. Methods with a default body that the guest does not provide
/// run the default.
#[derive(Clone)]
pub struct InterfaceProxy {
    core: ViewCore,
    interface: Arc<InterfaceDesc>,
    mode: ProxyMode,
}

impl InterfaceProxy {
    pub(crate) fn new(
        context: Context,
        receiver: ForeignRef,
        interface: Arc<InterfaceDesc>,
        mode: ProxyMode,
    ) -> Self {
        InterfaceProxy {
            core: ViewCore::new(context, receiver),
            interface,
            mode,
        }
    }

    pub fn interface(&self) -> &Arc<InterfaceDesc> {
        &self.interface
    }

    pub fn context(&self) -> &Context {
        self.core.context()
    }

    pub fn guest_value(&self) -> GuestValue {
        self.core.guest_value()
    }

    /// Whether the guest value is executed as the interface's function
    pub fn is_function(&self) -> bool {
        self.mode == ProxyMode::Function
    }

    /// Call interface method `name`
    pub fn invoke(&self, name: &str, args: &[HostValue]) -> PolyglotResult<HostValue> {
        if let Some(answer) = self.object_method(name, args) {
            return Ok(answer);
        }
        let method = self.interface.method(name).ok_or_else(|| {
            PolyglotError::Unsupported(format!(
                "Method '{}' is not declared by interface {}.",
                name,
                self.interface.name()
            ))
        })?;
        trace!(interface = self.interface.name(), method = name, "proxy invoke");
        match self.mode {
            ProxyMode::Function => {
                let functional = self
                    .interface
                    .functional_method()
                    .map(|m| m.name() == name)
                    .unwrap_or(false);
                if functional {
                    self.execute(method, args)
                } else {
                    self.run_default(method, args)
                }
            }
            ProxyMode::Object => {
                if method.default_body().is_some() && !self.provides(name)? {
                    return self.run_default(method, args);
                }
                self.invoke_member(method, args)
            }
        }
    }

    fn object_method(&self, name: &str, args: &[HostValue]) -> Option<HostValue> {
        match (name, args) {
            ("equals", [other]) => Some(HostValue::Boolean(match other {
                HostValue::Proxy(other) => self == other,
                _ => false,
            })),
            ("hashCode", []) => Some(HostValue::Int(self.core.identity_hash() as i32)),
            ("toString", []) => Some(HostValue::String(self.core.receiver().display_string())),
            _ => None,
        }
    }

    fn run_default(&self, method: &MethodDesc, args: &[HostValue]) -> PolyglotResult<HostValue> {
        match method.default_body() {
            Some(body) => body(self, args),
            None => Err(fail(
                ViewFailure::Unsupported,
                self.core.context(),
                "Unsupported operation",
                "invoke",
                &HostType::interface(self.interface.clone()),
                self.core.receiver(),
                Some(method.name().to_string()),
            )),
        }
    }

    fn provides(&self, name: &str) -> PolyglotResult<bool> {
        self.core
            .context()
            .guarded(|| Ok(self.core.receiver().member_info(name).is_existing()))
    }

    fn execute(&self, method: &MethodDesc, args: &[HostValue]) -> PolyglotResult<HostValue> {
        let ret = method.return_type().clone();
        let key = self
            .core
            .key(Operation::ProxyInvoke, vec![ret.clone()])
            .with_detail("execute");
        self.core.call(
            key,
            || {
                routine(move |context, receiver, args| {
                    let guest_args: Vec<GuestValue> =
                        args.iter().map(|a| to_guest(context, a)).collect();
                    let result = if receiver.is_executable() {
                        receiver.execute(&guest_args)
                    } else {
                        receiver.instantiate(&guest_args)
                    };
                    match result {
                        Ok(value) => to_host(context, &value, &ret, Priority::HostProxy),
                        Err(e) => Err(execution_error(
                            context,
                            &GuestValue::Object(receiver.clone()),
                            &guest_args,
                            e,
                        )),
                    }
                })
            },
            &spread_varargs(method, args),
        )
    }

    fn invoke_member(&self, method: &MethodDesc, args: &[HostValue]) -> PolyglotResult<HostValue> {
        let ret = method.return_type().clone();
        let name = method.name().to_string();
        let interface_type = HostType::interface(self.interface.clone());
        let key = self
            .core
            .key(Operation::ProxyInvoke, vec![ret.clone()])
            .with_detail(&name);
        self.core.call(
            key,
            || {
                routine(move |context, receiver, args| {
                    let guest_args: Vec<GuestValue> =
                        args.iter().map(|a| to_guest(context, a)).collect();
                    let unsupported = || {
                        fail(
                            ViewFailure::Unsupported,
                            context,
                            "Unsupported operation",
                            "invoke",
                            &interface_type,
                            receiver,
                            Some(name.clone()),
                        )
                    };
                    let result = match receiver.invoke_member(&name, &guest_args) {
                        Err(InteropError::UnsupportedMessage) | Err(InteropError::UnknownIdentifier(_)) => {
                            let member = match receiver.read_member(&name) {
                                Ok(member) => member,
                                Err(InteropError::UnsupportedMessage)
                                | Err(InteropError::UnknownIdentifier(_)) => return Err(unsupported()),
                                Err(e) => return Err(context.to_host_error(e)),
                            };
                            match &member {
                                GuestValue::Object(target) if target.is_executable() => {
                                    target.execute(&guest_args).map_err(|e| {
                                        execution_error(context, &member, &guest_args, e)
                                    })?
                                }
                                _ if guest_args.is_empty() => member.clone(),
                                _ => return Err(unsupported()),
                            }
                        }
                        Err(e) => {
                            return Err(execution_error(
                                context,
                                &GuestValue::Object(receiver.clone()),
                                &guest_args,
                                e,
                            ))
                        }
                        Ok(value) => value,
                    };
                    to_host(context, &result, &ret, Priority::HostProxy)
                })
            },
            &spread_varargs(method, args),
        )
    }
}

/// Host arguments as the guest sees them: a trailing array passed to a
/// variable-arity method is spread into individual arguments
fn spread_varargs(method: &MethodDesc, args: &[HostValue]) -> Vec<HostValue> {
    if method.is_varargs() && args.len() == method.params().len() {
        if let Some((HostValue::Array(trailing), fixed)) = args.split_last() {
            let mut spread = fixed.to_vec();
            spread.extend(trailing.to_vec());
            return spread;
        }
    }
    args.to_vec()
}

impl PartialEq for InterfaceProxy {
    fn eq(&self, other: &Self) -> bool {
        self.core == other.core && self.interface == other.interface
    }
}

impl Hash for InterfaceProxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core.hash(state);
    }
}

impl fmt::Debug for InterfaceProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?}) over {:?}",
            self.interface.name(),
            self.mode,
            self.core
        )
    }
}
