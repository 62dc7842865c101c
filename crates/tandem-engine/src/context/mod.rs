//! Guest execution contexts
//!
//! A [`Context`] is one isolated guest execution environment. Guest values
//! belong to exactly one context, and every operation on a guest value runs
//! with its context entered on the calling thread. Entering is explicit:
//! [`Context::enter`] returns a [`PriorState`] that must be handed back to
//! [`Context::leave`], and leaving reports its own failures.
//!
//! Contexts created on the same [`Layer`] share the layer's call-target
//! caches. Once a layer is claimed, contexts on it take the fast path when
//! forwarding messages to each other.

mod registry;

pub use registry::ContextRegistry;

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tandem_sdk::{GuestValue, InteropError};
use tracing::{debug, trace, warn};

use crate::cache::{CallTargetCache, HostCallTarget, SendTarget};
use crate::config::InteropOptions;
use crate::error::{PolyglotError, PolyglotResult};
use crate::views::ValueHandle;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a Context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    /// Create a new unique context ID
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        ContextId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Unique identifier for a Layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerId(u64);

impl LayerId {
    fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        LayerId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

// ============================================================================
// Layer
// ============================================================================

/// Shared code layer: the call-target caches used by every context on it.
pub struct Layer {
    id: LayerId,
    claimed: AtomicBool,
    host_targets: CallTargetCache<HostCallTarget>,
    send_targets: CallTargetCache<SendTarget>,
}

impl Layer {
    pub fn new() -> Arc<Layer> {
        Arc::new(Layer {
            id: LayerId::new(),
            claimed: AtomicBool::new(false),
            host_targets: CallTargetCache::new(),
            send_targets: CallTargetCache::new(),
        })
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    /// Mark the layer as owned by a single engine; contexts on a claimed
    /// layer forward messages to each other through cached routines
    pub fn claim(&self) {
        if !self.claimed.swap(true, Ordering::AcqRel) {
            debug!(layer = self.id.as_u64(), "layer claimed");
        }
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    /// Routines serving host views
    pub fn host_targets(&self) -> &CallTargetCache<HostCallTarget> {
        &self.host_targets
    }

    /// Routines serving cross-context sends
    pub fn send_targets(&self) -> &CallTargetCache<SendTarget> {
        &self.send_targets
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("claimed", &self.is_claimed())
            .field("host_targets", &self.host_targets.len())
            .field("send_targets", &self.send_targets.len())
            .finish()
    }
}

// ============================================================================
// Context
// ============================================================================

const STATE_ACTIVE: u8 = 0;
const STATE_CANCELLING: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Lifecycle state of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Active,
    /// Cancelled; no new entries, closes when the last thread leaves
    Cancelling,
    Closed,
}

struct ContextInner {
    id: ContextId,
    language: String,
    layer: Arc<Layer>,
    options: InteropOptions,
    state: AtomicU8,
    /// Entry depth per thread
    entered: Mutex<FxHashMap<ThreadId, usize>>,
}

/// Handle to a guest execution context. Clones refer to the same context.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

thread_local! {
    static CURRENT: RefCell<Option<Context>> = const { RefCell::new(None) };
}

/// The thread's context state before an [`Context::enter`]
#[must_use = "the prior state must be passed back to Context::leave"]
pub struct PriorState {
    previous: Option<Context>,
    entered: ContextId,
}

impl Context {
    /// Start building a context for `language`
    pub fn builder(language: impl Into<String>) -> ContextBuilder {
        ContextBuilder::new(language)
    }

    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    /// Name of the guest language this context runs
    pub fn language(&self) -> &str {
        &self.inner.language
    }

    pub fn layer(&self) -> &Arc<Layer> {
        &self.inner.layer
    }

    pub fn options(&self) -> &InteropOptions {
        &self.inner.options
    }

    pub fn state(&self) -> ContextState {
        match self.inner.state.load(Ordering::Acquire) {
            STATE_ACTIVE => ContextState::Active,
            STATE_CANCELLING => ContextState::Cancelling,
            _ => ContextState::Closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ContextState::Closed
    }

    /// The context entered on the current thread, if any
    pub fn current() -> Option<Context> {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Whether the current thread has entered this context
    pub fn is_entered(&self) -> bool {
        self.inner
            .entered
            .lock()
            .contains_key(&thread::current().id())
    }

    /// Fail if the context no longer accepts work
    pub fn poll(&self) -> PolyglotResult<()> {
        match self.state() {
            ContextState::Active => Ok(()),
            ContextState::Cancelling => Err(PolyglotError::ContextClosed(format!(
                "Context {} execution was cancelled.",
                self.id()
            ))),
            ContextState::Closed => Err(PolyglotError::ContextClosed(format!(
                "Context {} is already closed.",
                self.id()
            ))),
        }
    }

    /// Enter the context on the current thread
    pub fn enter(&self) -> PolyglotResult<PriorState> {
        let thread = thread::current().id();
        {
            // state changes away from active happen under this lock
            let mut entered = self.inner.entered.lock();
            self.poll()?;
            if self.inner.options.single_threaded && entered.keys().any(|t| *t != thread) {
                return Err(PolyglotError::IllegalState(format!(
                    "Multi threaded access requested by thread {:?} but is not allowed for context {}.",
                    thread,
                    self.id()
                )));
            }
            *entered.entry(thread).or_insert(0) += 1;
        }
        let previous = CURRENT.with(|current| current.replace(Some(self.clone())));
        trace!(context = self.id().as_u64(), "entered");
        Ok(PriorState {
            previous,
            entered: self.id(),
        })
    }

    /// Leave the context, restoring the thread's prior state
    pub fn leave(&self, prior: PriorState) -> PolyglotResult<()> {
        CURRENT.with(|current| *current.borrow_mut() = prior.previous);
        if prior.entered != self.id() {
            return Err(PolyglotError::IllegalState(format!(
                "Context {} left with the prior state of context {}.",
                self.id(),
                prior.entered
            )));
        }
        let thread = thread::current().id();
        let mut entered = self.inner.entered.lock();
        match entered.get_mut(&thread) {
            Some(depth) if *depth > 1 => *depth -= 1,
            Some(_) => {
                entered.remove(&thread);
            }
            None => {
                return Err(PolyglotError::IllegalState(format!(
                    "Context {} was not entered on the current thread.",
                    self.id()
                )))
            }
        }
        if entered.is_empty()
            && self
                .inner
                .state
                .compare_exchange(
                    STATE_CANCELLING,
                    STATE_CLOSED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
        {
            debug!(context = self.id().as_u64(), "cancelled context closed");
        }
        trace!(context = self.id().as_u64(), "left");
        Ok(())
    }

    /// Run `body` with the context entered; a failure to leave wins over the
    /// body's own result
    pub fn guarded<T>(&self, body: impl FnOnce() -> PolyglotResult<T>) -> PolyglotResult<T> {
        let prior = self.enter()?;
        let result = body();
        match self.leave(prior) {
            Ok(()) => result,
            Err(leave_error) => {
                if let Err(body_error) = &result {
                    warn!(%body_error, "error discarded because leaving the context failed");
                }
                Err(leave_error)
            }
        }
    }

    /// Cancel the context: new entries fail, threads inside observe the
    /// cancellation at their next poll, and the context closes once the last
    /// thread leaves
    pub fn cancel(&self) {
        let entered = self.inner.entered.lock();
        let idle = entered.is_empty();
        let next = if idle { STATE_CLOSED } else { STATE_CANCELLING };
        match self.inner.state.compare_exchange(
            STATE_ACTIVE,
            next,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => debug!(context = self.id().as_u64(), closed = idle, "context cancelled"),
            Err(current) => trace!(
                context = self.id().as_u64(),
                state = current,
                "cancel ignored, context is not active"
            ),
        }
    }

    /// Close an idle context
    pub fn close(&self) -> PolyglotResult<()> {
        let entered = self.inner.entered.lock();
        if !entered.is_empty() {
            return Err(PolyglotError::IllegalState(format!(
                "Context {} is still entered on {} thread(s) and cannot be closed.",
                self.id(),
                entered.len()
            )));
        }
        self.inner.state.store(STATE_CLOSED, Ordering::Release);
        debug!(context = self.id().as_u64(), "context closed");
        Ok(())
    }

    /// Wrap a guest value of this context in a generic handle
    pub fn as_value(&self, value: GuestValue) -> ValueHandle {
        ValueHandle::new(self.clone(), value)
    }

    /// Describe a guest value for diagnostics:
    /// `'<display>'(language: <L>, type: <T>)`, with the display part cut at
    /// the configured width
    pub fn value_info(&self, value: &GuestValue) -> String {
        let (display, language, type_name) = match value {
            GuestValue::Null => (
                "null".to_string(),
                self.language().to_string(),
                "null".to_string(),
            ),
            GuestValue::Primitive(p) => (
                p.to_string(),
                self.language().to_string(),
                p.type_name().to_string(),
            ),
            GuestValue::Object(object) => (
                object.display_string(),
                object.language().to_string(),
                object.meta_name().unwrap_or_else(|| "Unknown".to_string()),
            ),
            GuestValue::Host(host) => (
                host.display_string(),
                "host".to_string(),
                host.class_name().to_string(),
            ),
        };
        format!(
            "'{}'(language: {}, type: {})",
            truncate(&display, self.inner.options.value_info_limit),
            language,
            type_name
        )
    }

    /// Map a protocol failure to the error a host caller observes
    pub fn to_host_error(&self, error: InteropError) -> PolyglotError {
        match error {
            InteropError::Host(host) | InteropError::Engine(host) => {
                match host.downcast_ref::<PolyglotError>() {
                    Some(original) => original.clone(),
                    None => PolyglotError::Host(host),
                }
            }
            InteropError::Guest(exception) => PolyglotError::Guest(exception),
            InteropError::UnsupportedMessage => {
                PolyglotError::Unsupported("Unsupported operation.".to_string())
            }
            InteropError::InvalidArrayIndex(index) => {
                PolyglotError::IndexOutOfBounds(format!("Invalid array index {}.", index))
            }
            InteropError::UnknownIdentifier(key) => PolyglotError::IndexOutOfBounds(format!(
                "Non readable or non-existent member key '{}'.",
                key
            )),
            InteropError::UnsupportedType { message, .. } => PolyglotError::IllegalArgument(message),
            error @ InteropError::Arity { .. } => PolyglotError::IllegalArgument(error.to_string()),
            InteropError::StopIteration => {
                PolyglotError::NoSuchElement("Iteration was stopped.".to_string())
            }
            error @ InteropError::InvalidBufferOffset { .. } => {
                PolyglotError::IndexOutOfBounds(error.to_string())
            }
        }
    }
}

fn truncate(display: &str, limit: usize) -> String {
    match display.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &display[..cut]),
        None => display.to_string(),
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Context {}

impl Hash for Context {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.inner.id)
            .field("language", &self.inner.language)
            .field("layer", &self.inner.layer.id())
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Context`]
pub struct ContextBuilder {
    language: String,
    options: InteropOptions,
    layer: Option<Arc<Layer>>,
}

impl ContextBuilder {
    pub fn new(language: impl Into<String>) -> Self {
        ContextBuilder {
            language: language.into(),
            options: InteropOptions::default(),
            layer: None,
        }
    }

    pub fn options(mut self, options: InteropOptions) -> Self {
        self.options = options;
        self
    }

    /// Share `layer` with other contexts; a fresh layer is used otherwise
    pub fn layer(mut self, layer: Arc<Layer>) -> Self {
        self.layer = Some(layer);
        self
    }

    pub fn build(self) -> Context {
        let layer = self.layer.unwrap_or_else(Layer::new);
        let context = Context {
            inner: Arc::new(ContextInner {
                id: ContextId::new(),
                language: self.language,
                layer,
                options: self.options,
                state: AtomicU8::new(STATE_ACTIVE),
                entered: Mutex::new(FxHashMap::default()),
            }),
        };
        debug!(
            context = context.id().as_u64(),
            language = context.language(),
            layer = context.layer().id().as_u64(),
            "context created"
        );
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use tandem_sdk::{ArrayObject, ExceptionObject};

    #[test]
    fn test_context_id_uniqueness() {
        let id1 = ContextId::new();
        let id2 = ContextId::new();
        let id3 = ContextId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn test_enter_leave_restores_current() {
        let outer = Context::builder("memory").build();
        let inner = Context::builder("memory").build();
        assert!(Context::current().is_none());

        let outer_prior = outer.enter().unwrap();
        assert_eq!(Context::current(), Some(outer.clone()));
        let inner_prior = inner.enter().unwrap();
        assert_eq!(Context::current(), Some(inner.clone()));
        assert!(inner.is_entered());

        inner.leave(inner_prior).unwrap();
        assert_eq!(Context::current(), Some(outer.clone()));
        assert!(!inner.is_entered());
        outer.leave(outer_prior).unwrap();
        assert!(Context::current().is_none());
    }

    #[test]
    fn test_leave_with_foreign_prior_state_fails() {
        let a = Context::builder("memory").build();
        let b = Context::builder("memory").build();
        let prior_a = a.enter().unwrap();
        let err = b.leave(prior_a).unwrap_err();
        assert!(matches!(err, PolyglotError::IllegalState(_)));
        // the thread's context stack is restored regardless
        assert!(Context::current().is_none());
    }

    #[test]
    fn test_closed_context_rejects_entry() {
        let context = Context::builder("memory").build();
        context.close().unwrap();
        assert!(matches!(context.enter(), Err(PolyglotError::ContextClosed(_))));
    }

    #[test]
    fn test_close_while_entered_fails() {
        let context = Context::builder("memory").build();
        let prior = context.enter().unwrap();
        assert!(matches!(context.close(), Err(PolyglotError::IllegalState(_))));
        context.leave(prior).unwrap();
        context.close().unwrap();
    }

    #[test]
    fn test_cancel_closes_after_last_leave() {
        let context = Context::builder("memory").build();
        let prior = context.enter().unwrap();
        context.cancel();
        assert_eq!(context.state(), ContextState::Cancelling);
        assert!(matches!(context.poll(), Err(PolyglotError::ContextClosed(_))));
        context.leave(prior).unwrap();
        assert_eq!(context.state(), ContextState::Closed);
    }

    #[test]
    fn test_cancel_after_close_keeps_closed() {
        let context = Context::builder("memory").build();
        context.close().unwrap();
        context.cancel();
        assert_eq!(context.state(), ContextState::Closed);
    }

    #[test]
    fn test_no_thread_runs_inside_a_closed_context() {
        let context = Context::builder("memory").build();
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let context = context.clone();
                thread::spawn(move || {
                    let mut closed_inside = 0;
                    for _ in 0..2_000 {
                        let prior = match context.enter() {
                            Ok(prior) => prior,
                            Err(_) => break,
                        };
                        if context.is_closed() {
                            closed_inside += 1;
                        }
                        context.leave(prior).unwrap();
                    }
                    closed_inside
                })
            })
            .collect();
        while context.close().is_err() {
            thread::yield_now();
        }
        for worker in workers {
            assert_eq!(worker.join().unwrap(), 0);
        }
        assert!(matches!(context.enter(), Err(PolyglotError::ContextClosed(_))));
    }

    #[test]
    fn test_single_threaded_rejects_second_thread() {
        let options = InteropOptions {
            single_threaded: true,
            ..InteropOptions::default()
        };
        let context = Context::builder("memory").options(options).build();
        let prior = context.enter().unwrap();

        let (tx, rx) = mpsc::channel();
        let other = context.clone();
        thread::spawn(move || {
            tx.send(other.enter().map(|p| other.leave(p))).unwrap();
        })
        .join()
        .unwrap();
        let result = rx.recv().unwrap();
        assert!(matches!(result, Err(PolyglotError::IllegalState(_))));

        context.leave(prior).unwrap();
    }

    #[test]
    fn test_guarded_prefers_leave_error() {
        let context = Context::builder("memory").build();
        let result: PolyglotResult<()> = context.guarded(|| {
            // corrupt the entry bookkeeping so that leaving fails
            context.inner.entered.lock().clear();
            Err(PolyglotError::Unsupported("body".into()))
        });
        assert!(matches!(result, Err(PolyglotError::IllegalState(_))));
    }

    #[test]
    fn test_value_info_truncates_display() {
        let options = InteropOptions {
            value_info_limit: 16,
            ..InteropOptions::default()
        };
        let context = Context::builder("memory").options(options).build();
        let long = GuestValue::from("x".repeat(40));
        assert_eq!(
            context.value_info(&long),
            format!("'{}...'(language: memory, type: string)", "x".repeat(16))
        );
        let array = GuestValue::object(ArrayObject::new(vec![GuestValue::from(1)]));
        assert_eq!(
            context.value_info(&array),
            "'[1]'(language: memory, type: Array)"
        );
    }

    #[test]
    fn test_to_host_error_unwraps_host_errors() {
        let context = Context::builder("memory").build();
        let original = PolyglotError::IndexOutOfBounds("gone".into());
        let wrapped = InteropError::Host(tandem_sdk::HostException::new(original));
        assert!(matches!(
            context.to_host_error(wrapped),
            PolyglotError::IndexOutOfBounds(m) if m == "gone"
        ));
        let guest = ExceptionObject::raise("boom");
        assert!(context.to_host_error(guest).is_guest());
        assert!(matches!(
            context.to_host_error(InteropError::StopIteration),
            PolyglotError::NoSuchElement(_)
        ));
    }
}
