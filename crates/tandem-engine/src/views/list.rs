//! `List<T>` over a guest value with array elements

use std::fmt;
use std::hash::{Hash, Hasher};

use tandem_sdk::{ForeignRef, GuestValue, InteropError};

use super::{fail, index_arg, length_of, routine, ViewCore};
use crate::cache::Operation;
use crate::context::Context;
use crate::error::{PolyglotResult, ViewFailure};
use crate::host_value::HostValue;
use crate::to_guest::to_guest;
use crate::to_host::{to_host, Priority};
use crate::types::HostType;

/// A live `List<element>` view.
#[derive(Clone)]
pub struct ListView {
    core: ViewCore,
    element: HostType,
}

impl ListView {
    pub(crate) fn new(context: Context, receiver: ForeignRef, element: HostType) -> Self {
        ListView {
            core: ViewCore::new(context, receiver),
            element,
        }
    }

    pub fn element_type(&self) -> &HostType {
        &self.element
    }

    /// The declared host type of this view
    pub fn list_type(&self) -> HostType {
        HostType::list_of(self.element.clone())
    }

    pub fn context(&self) -> &Context {
        self.core.context()
    }

    /// The underlying guest value
    pub fn guest_value(&self) -> GuestValue {
        self.core.guest_value()
    }

    pub fn size(&self) -> PolyglotResult<usize> {
        let list_type = self.list_type();
        let size = self.core.call(
            self.core.key(Operation::ListSize, vec![self.element.clone()]),
            || {
                routine(move |context, receiver, _| match receiver.array_size() {
                    Ok(size) => Ok(HostValue::Long(size.min(i64::MAX as u64) as i64)),
                    Err(InteropError::UnsupportedMessage) => Err(fail(
                        ViewFailure::Unsupported,
                        context,
                        "Unsupported operation",
                        "size",
                        &list_type,
                        receiver,
                        None,
                    )),
                    Err(e) => Err(context.to_host_error(e)),
                })
            },
            &[],
        )?;
        Ok(length_of(size))
    }

    pub fn is_empty(&self) -> PolyglotResult<bool> {
        Ok(self.size()? == 0)
    }

    pub fn get(&self, index: usize) -> PolyglotResult<HostValue> {
        let element = self.element.clone();
        let list_type = self.list_type();
        self.core.call(
            self.core.key(Operation::ListGet, vec![self.element.clone()]),
            || {
                routine(move |context, receiver, args| {
                    let index = match index_arg(args, 0) {
                        Ok(index) => index,
                        Err(key) => {
                            return Err(fail(
                                ViewFailure::IndexOutOfBounds,
                                context,
                                "Index out of bounds in",
                                "get",
                                &list_type,
                                receiver,
                                Some(key),
                            ))
                        }
                    };
                    match receiver.read_array_element(index) {
                        Ok(value) => to_host(context, &value, &element, Priority::HostProxy),
                        Err(InteropError::InvalidArrayIndex(_)) => Err(fail(
                            ViewFailure::IndexOutOfBounds,
                            context,
                            "Index out of bounds in",
                            "get",
                            &list_type,
                            receiver,
                            Some(index.to_string()),
                        )),
                        Err(InteropError::UnsupportedMessage) => Err(fail(
                            ViewFailure::Unsupported,
                            context,
                            "Unsupported operation",
                            "get",
                            &list_type,
                            receiver,
                            Some(index.to_string()),
                        )),
                        Err(e) => Err(context.to_host_error(e)),
                    }
                })
            },
            &[self.position("get", index)?],
        )
    }

    /// Replace the element at `index`, returning the previous element
    pub fn set(&self, index: usize, value: HostValue) -> PolyglotResult<HostValue> {
        let element = self.element.clone();
        let list_type = self.list_type();
        self.core.call(
            self.core.key(Operation::ListSet, vec![self.element.clone()]),
            || {
                routine(move |context, receiver, args| {
                    let index = match index_arg(args, 0) {
                        Ok(index) => index,
                        Err(key) => {
                            return Err(fail(
                                ViewFailure::IndexOutOfBounds,
                                context,
                                "Index out of bounds in",
                                "set",
                                &list_type,
                                receiver,
                                Some(key),
                            ))
                        }
                    };
                    let value = args.get(1).unwrap_or(&HostValue::Null);
                    let failure = |kind, operation| {
                        fail(kind, context, operation, "set", &list_type, receiver, Some(index.to_string()))
                    };
                    let info = receiver.array_element_info(index);
                    if !info.is_existing() {
                        return Err(failure(ViewFailure::IndexOutOfBounds, "Index out of bounds in"));
                    }
                    if !info.is_modifiable() {
                        return Err(failure(ViewFailure::Unsupported, "Unsupported operation"));
                    }
                    let previous = receiver
                        .read_array_element(index)
                        .map_err(|e| context.to_host_error(e))?;
                    let previous = to_host(context, &previous, &element, Priority::HostProxy)?;
                    match receiver.write_array_element(index, to_guest(context, value)) {
                        Ok(()) => Ok(previous),
                        Err(InteropError::UnsupportedType { .. }) => {
                            Err(failure(ViewFailure::ClassCast, "Invalid value in"))
                        }
                        Err(InteropError::InvalidArrayIndex(_)) => {
                            Err(failure(ViewFailure::IndexOutOfBounds, "Index out of bounds in"))
                        }
                        Err(InteropError::UnsupportedMessage) => {
                            Err(failure(ViewFailure::Unsupported, "Unsupported operation"))
                        }
                        Err(e) => Err(context.to_host_error(e)),
                    }
                })
            },
            &[self.position("set", index)?, value],
        )
    }

    /// Append an element
    pub fn add(&self, value: HostValue) -> PolyglotResult<()> {
        let list_type = self.list_type();
        self.core.call(
            self.core.key(Operation::ListAdd, vec![self.element.clone()]),
            || {
                routine(move |context, receiver, args| {
                    let value = args.first().unwrap_or(&HostValue::Null);
                    let size = receiver.array_size().map_err(|e| context.to_host_error(e))?;
                    let failure = |kind, operation| {
                        fail(kind, context, operation, "add", &list_type, receiver, Some(size.to_string()))
                    };
                    if !receiver.array_element_info(size).is_insertable() {
                        return Err(failure(ViewFailure::Unsupported, "Unsupported operation"));
                    }
                    match receiver.write_array_element(size, to_guest(context, value)) {
                        Ok(()) => Ok(HostValue::Null),
                        Err(InteropError::UnsupportedType { .. }) => {
                            Err(failure(ViewFailure::ClassCast, "Invalid value in"))
                        }
                        Err(InteropError::UnsupportedMessage) => {
                            Err(failure(ViewFailure::Unsupported, "Unsupported operation"))
                        }
                        Err(e) => Err(context.to_host_error(e)),
                    }
                })
            },
            &[value],
        )?;
        Ok(())
    }

    /// Remove the element at `index`, returning it
    pub fn remove(&self, index: usize) -> PolyglotResult<HostValue> {
        let element = self.element.clone();
        let list_type = self.list_type();
        self.core.call(
            self.core.key(Operation::ListRemove, vec![self.element.clone()]),
            || {
                routine(move |context, receiver, args| {
                    let index = match index_arg(args, 0) {
                        Ok(index) => index,
                        Err(key) => {
                            return Err(fail(
                                ViewFailure::IndexOutOfBounds,
                                context,
                                "Index out of bounds in",
                                "remove",
                                &list_type,
                                receiver,
                                Some(key),
                            ))
                        }
                    };
                    let failure = |kind, operation| {
                        fail(kind, context, operation, "remove", &list_type, receiver, Some(index.to_string()))
                    };
                    let info = receiver.array_element_info(index);
                    if !info.is_existing() {
                        return Err(failure(ViewFailure::IndexOutOfBounds, "Index out of bounds in"));
                    }
                    if !info.is_removable() {
                        return Err(failure(ViewFailure::Unsupported, "Unsupported operation"));
                    }
                    let previous = receiver
                        .read_array_element(index)
                        .map_err(|e| context.to_host_error(e))?;
                    let previous = to_host(context, &previous, &element, Priority::HostProxy)?;
                    match receiver.remove_array_element(index) {
                        Ok(()) => Ok(previous),
                        Err(InteropError::InvalidArrayIndex(_)) => {
                            Err(failure(ViewFailure::IndexOutOfBounds, "Index out of bounds in"))
                        }
                        Err(InteropError::UnsupportedMessage) => {
                            Err(failure(ViewFailure::Unsupported, "Unsupported operation"))
                        }
                        Err(e) => Err(context.to_host_error(e)),
                    }
                })
            },
            &[self.position("remove", index)?],
        )
    }

    /// Host index as a routine argument; indices past `i64::MAX` exist in no
    /// guest array
    fn position(&self, operation: &str, index: usize) -> PolyglotResult<HostValue> {
        i64::try_from(index).map(HostValue::Long).map_err(|_| {
            fail(
                ViewFailure::IndexOutOfBounds,
                self.core.context(),
                "Index out of bounds in",
                operation,
                &self.list_type(),
                self.core.receiver(),
                Some(index.to_string()),
            )
        })
    }

    /// Iterate over the elements present when iteration starts
    pub fn iter(&self) -> ListIter<'_> {
        ListIter {
            list: self,
            index: 0,
            len: None,
        }
    }

    /// Copy the current elements into a vector
    pub fn to_vec(&self) -> PolyglotResult<Vec<HostValue>> {
        self.iter().collect()
    }
}

impl PartialEq for ListView {
    fn eq(&self, other: &Self) -> bool {
        self.core == other.core
    }
}

impl Hash for ListView {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core.hash(state);
    }
}

impl fmt::Debug for ListView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} over {:?}", self.list_type(), self.core)
    }
}

/// Iterator over a [`ListView`]
pub struct ListIter<'a> {
    list: &'a ListView,
    index: usize,
    len: Option<usize>,
}

impl Iterator for ListIter<'_> {
    type Item = PolyglotResult<HostValue>;

    fn next(&mut self) -> Option<Self::Item> {
        let len = match self.len {
            Some(len) => len,
            None => match self.list.size() {
                Ok(len) => {
                    self.len = Some(len);
                    len
                }
                Err(e) => {
                    self.len = Some(0);
                    return Some(Err(e));
                }
            },
        };
        if self.index >= len {
            return None;
        }
        let item = self.list.get(self.index);
        self.index += 1;
        if item.is_err() {
            self.index = len;
        }
        Some(item)
    }
}
