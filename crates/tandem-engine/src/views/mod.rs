//! Live host views over guest objects
//!
//! A view implements a host collection or functional contract on top of a
//! guest object. Views hold no copy of the guest data: every operation looks
//! up its routine in the layer's call-target cache, enters the owning context
//! and sends capability messages to the receiver.
//!
//! Two views are equal when they belong to the same context and wrap the same
//! guest value.

mod bytes;
mod function;
mod iterator;
mod list;
mod map;
mod value;

pub use bytes::{ByteSequenceView, MAX_ARRAY_LENGTH};
pub use function::FunctionView;
pub use iterator::{Elements, IterableView, IteratorView};
pub use list::{ListIter, ListView};
pub use map::{MapEntryView, MapView};
pub use value::ValueHandle;

pub(crate) use map::{KeyKind, MapBacking};

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tandem_sdk::{same_object, ForeignRef, GuestValue};

use crate::cache::{CacheKey, HostCallTarget, Operation};
use crate::context::Context;
use crate::error::{view_error, PolyglotError, PolyglotResult, ViewFailure};
use crate::host_value::HostValue;
use crate::types::HostType;

/// Wrap a closure as a cacheable routine
pub(crate) fn routine<F>(body: F) -> Arc<HostCallTarget>
where
    F: Fn(&Context, &ForeignRef, &[HostValue]) -> PolyglotResult<HostValue> + Send + Sync + 'static,
{
    Arc::new(body)
}

/// State shared by every view: the owning context and the guest receiver
#[derive(Clone)]
pub(crate) struct ViewCore {
    context: Context,
    receiver: ForeignRef,
}

impl ViewCore {
    pub(crate) fn new(context: Context, receiver: ForeignRef) -> Self {
        ViewCore { context, receiver }
    }

    pub(crate) fn context(&self) -> &Context {
        &self.context
    }

    pub(crate) fn receiver(&self) -> &ForeignRef {
        &self.receiver
    }

    pub(crate) fn guest_value(&self) -> GuestValue {
        GuestValue::Object(self.receiver.clone())
    }

    pub(crate) fn key(&self, operation: Operation, types: Vec<HostType>) -> CacheKey {
        CacheKey::new(operation, &*self.receiver, types)
    }

    /// Run the cached routine for `key` with the context entered
    pub(crate) fn call(
        &self,
        key: CacheKey,
        build: impl FnOnce() -> Arc<HostCallTarget>,
        args: &[HostValue],
    ) -> PolyglotResult<HostValue> {
        let target = self.context.layer().host_targets().get_or_install(key, build);
        self.context
            .guarded(|| target(&self.context, &self.receiver, args))
    }

    pub(crate) fn identity_hash(&self) -> u64 {
        self.receiver.identity_hash()
    }
}

impl PartialEq for ViewCore {
    fn eq(&self, other: &Self) -> bool {
        self.context == other.context
            && (same_object(&self.receiver, &other.receiver)
                || self.receiver.is_identical(&other.guest_value()))
    }
}

impl Hash for ViewCore {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.context.id().hash(state);
        self.identity_hash().hash(state);
    }
}

impl fmt::Debug for ViewCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}",
            self.receiver.language(),
            self.context.id()
        )
    }
}

/// Build a view failure for `receiver`
pub(crate) fn fail(
    failure: ViewFailure,
    context: &Context,
    operation: &str,
    reason: &str,
    target: &HostType,
    receiver: &ForeignRef,
    key: Option<String>,
) -> PolyglotError {
    view_error(
        failure,
        context,
        operation,
        reason,
        target,
        &GuestValue::Object(receiver.clone()),
        key.as_deref(),
    )
}

/// Routine argument at `position`, read as an index or offset. A negative or
/// missing argument is returned as the key text for the failure message.
pub(crate) fn index_arg(args: &[HostValue], position: usize) -> Result<u64, String> {
    let raw = args.get(position).and_then(HostValue::as_i64);
    raw.and_then(|v| u64::try_from(v).ok())
        .ok_or_else(|| raw.map(|v| v.to_string()).unwrap_or_default())
}

pub(crate) fn length_of(value: HostValue) -> usize {
    value
        .as_i64()
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or(0)
}
