//! `Iterable<T>` and `Iterator<T>` over guest iterables and iterators
//!
//! An iterator view remembers the answer of the last `has_next` until the next
//! `next` consumes it. If the guest then reports exhaustion although it had
//! just promised an element, the guest was mutated underneath the view: the
//! view reports a concurrent modification and stays failed from then on.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use tandem_sdk::{ForeignRef, GuestValue, HostObject, InteropError};

use super::{fail, routine, ViewCore};
use crate::cache::Operation;
use crate::context::Context;
use crate::error::{PolyglotError, PolyglotResult, ViewFailure};
use crate::host_value::HostValue;
use crate::to_host::{to_host, Priority};
use crate::types::HostType;

// ============================================================================
// Iterable
// ============================================================================

/// A live `Iterable<element>` view.
#[derive(Clone)]
pub struct IterableView {
    core: ViewCore,
    element: HostType,
}

impl IterableView {
    pub(crate) fn new(context: Context, receiver: ForeignRef, element: HostType) -> Self {
        IterableView {
            core: ViewCore::new(context, receiver),
            element,
        }
    }

    pub fn element_type(&self) -> &HostType {
        &self.element
    }

    pub fn context(&self) -> &Context {
        self.core.context()
    }

    pub fn guest_value(&self) -> GuestValue {
        self.core.guest_value()
    }

    /// A fresh iterator over the guest iterable
    pub fn iterator(&self) -> PolyglotResult<IteratorView> {
        let element = self.element.clone();
        let iterable_type = HostType::iterable_of(self.element.clone());
        let iterator = self.core.call(
            self.core.key(Operation::IterableIterator, vec![self.element.clone()]),
            || {
                routine(move |context, receiver, _| {
                    let unsupported = || {
                        fail(
                            ViewFailure::Unsupported,
                            context,
                            "Unsupported operation",
                            "iterator",
                            &iterable_type,
                            receiver,
                            None,
                        )
                    };
                    match receiver.get_iterator() {
                        Ok(GuestValue::Object(iterator)) if iterator.is_iterator() => {
                            Ok(HostValue::Iterator(IteratorView::new(
                                context.clone(),
                                iterator,
                                element.clone(),
                            )))
                        }
                        Ok(_) | Err(InteropError::UnsupportedMessage) => Err(unsupported()),
                        Err(e) => Err(context.to_host_error(e)),
                    }
                })
            },
            &[],
        )?;
        match iterator {
            HostValue::Iterator(view) => Ok(view),
            other => Err(PolyglotError::ClassCast(format!(
                "Iterable produced {:?} instead of an iterator.",
                other
            ))),
        }
    }
}

impl PartialEq for IterableView {
    fn eq(&self, other: &Self) -> bool {
        self.core == other.core
    }
}

impl Hash for IterableView {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core.hash(state);
    }
}

impl fmt::Debug for IterableView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Iterable<{}> over {:?}", self.element, self.core)
    }
}

// ============================================================================
// Iterator
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HasNext {
    Unknown,
    Yes,
    No,
}

#[derive(Debug)]
struct IteratorState {
    has_next: HasNext,
    poisoned: bool,
}

/// Outcome of advancing the guest iterator
enum NextElement {
    Element(HostValue),
    Exhausted,
}

/// Marker the next routine returns when the guest stops iteration. No
/// converted element can be one, so host errors raised by the guest keep
/// their kind.
struct Exhausted;

impl HostObject for Exhausted {
    fn class_name(&self) -> &str {
        "Exhausted"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A live `Iterator<element>` view. Clones share the same cursor.
#[derive(Clone)]
pub struct IteratorView {
    core: ViewCore,
    element: HostType,
    state: Arc<Mutex<IteratorState>>,
}

impl IteratorView {
    pub(crate) fn new(context: Context, receiver: ForeignRef, element: HostType) -> Self {
        IteratorView {
            core: ViewCore::new(context, receiver),
            element,
            state: Arc::new(Mutex::new(IteratorState {
                has_next: HasNext::Unknown,
                poisoned: false,
            })),
        }
    }

    pub fn element_type(&self) -> &HostType {
        &self.element
    }

    pub fn iterator_type(&self) -> HostType {
        HostType::iterator_of(self.element.clone())
    }

    pub fn context(&self) -> &Context {
        self.core.context()
    }

    pub fn guest_value(&self) -> GuestValue {
        self.core.guest_value()
    }

    pub fn has_next(&self) -> PolyglotResult<bool> {
        match self.state.lock().has_next {
            HasNext::Yes => return Ok(true),
            HasNext::No => return Ok(false),
            HasNext::Unknown => {}
        }
        let iterator_type = self.iterator_type();
        let answer = self.core.call(
            self.core.key(Operation::IteratorHasNext, vec![self.element.clone()]),
            || {
                routine(move |context, receiver, _| match receiver.has_iterator_next_element() {
                    Ok(answer) => Ok(HostValue::Boolean(answer)),
                    Err(InteropError::UnsupportedMessage) => Err(fail(
                        ViewFailure::Unsupported,
                        context,
                        "Unsupported operation",
                        "hasNext",
                        &iterator_type,
                        receiver,
                        None,
                    )),
                    Err(e) => Err(context.to_host_error(e)),
                })
            },
            &[],
        )?;
        let answer = answer.as_bool().unwrap_or(false);
        self.state.lock().has_next = if answer { HasNext::Yes } else { HasNext::No };
        Ok(answer)
    }

    /// Advance the iterator
    pub fn next(&self) -> PolyglotResult<HostValue> {
        let promised = {
            let mut state = self.state.lock();
            if state.poisoned {
                return Err(self.concurrent_modification());
            }
            std::mem::replace(&mut state.has_next, HasNext::Unknown)
        };
        if promised == HasNext::No {
            return Err(self.no_such_element());
        }
        match self.fetch_next()? {
            NextElement::Element(value) => Ok(value),
            NextElement::Exhausted if promised == HasNext::Yes => {
                self.state.lock().poisoned = true;
                Err(self.concurrent_modification())
            }
            NextElement::Exhausted => Err(self.no_such_element()),
        }
    }

    /// Adapter yielding the remaining elements
    pub fn elements(&self) -> Elements<'_> {
        Elements {
            iterator: self,
            done: false,
        }
    }

    fn fetch_next(&self) -> PolyglotResult<NextElement> {
        let element = self.element.clone();
        let iterator_type = self.iterator_type();
        let result = self.core.call(
            self.core.key(Operation::IteratorNext, vec![self.element.clone()]),
            || {
                routine(move |context, receiver, _| match receiver.get_iterator_next_element() {
                    Ok(value) => to_host(context, &value, &element, Priority::HostProxy),
                    Err(InteropError::StopIteration) => Ok(HostValue::Object(Arc::new(Exhausted))),
                    Err(InteropError::UnsupportedMessage) => Err(fail(
                        ViewFailure::Unsupported,
                        context,
                        "Unsupported operation",
                        "next",
                        &iterator_type,
                        receiver,
                        None,
                    )),
                    Err(e) => Err(context.to_host_error(e)),
                })
            },
            &[],
        );
        match result? {
            HostValue::Object(object) if object.as_any().is::<Exhausted>() => {
                Ok(NextElement::Exhausted)
            }
            value => Ok(NextElement::Element(value)),
        }
    }

    fn describe(&self) -> String {
        self.core.context().value_info(&self.core.guest_value())
    }

    fn no_such_element(&self) -> PolyglotError {
        PolyglotError::NoSuchElement(format!(
            "Iteration was stopped for iterator {}.",
            self.describe()
        ))
    }

    fn concurrent_modification(&self) -> PolyglotError {
        PolyglotError::ConcurrentModification(format!(
            "Iterator {} was modified concurrently: an element was announced but none was available.",
            self.describe()
        ))
    }
}

impl PartialEq for IteratorView {
    fn eq(&self, other: &Self) -> bool {
        self.core == other.core
    }
}

impl Hash for IteratorView {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core.hash(state);
    }
}

impl fmt::Debug for IteratorView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} over {:?}", self.iterator_type(), self.core)
    }
}

/// Iterator adapter over an [`IteratorView`]; stops after the first error
pub struct Elements<'a> {
    iterator: &'a IteratorView,
    done: bool,
}

impl Iterator for Elements<'_> {
    type Item = PolyglotResult<HostValue>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = match self.iterator.has_next() {
            Ok(true) => self.iterator.next(),
            Ok(false) => {
                self.done = true;
                return None;
            }
            Err(e) => Err(e),
        };
        if item.is_err() {
            self.done = true;
        }
        Some(item)
    }
}
