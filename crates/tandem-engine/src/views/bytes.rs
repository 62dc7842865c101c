//! `ByteSequence` over a guest value with buffer elements

use std::fmt;
use std::hash::{Hash, Hasher};

use tandem_sdk::{ForeignRef, GuestValue, InteropError};

use super::{fail, index_arg, length_of, routine, ViewCore};
use crate::cache::Operation;
use crate::context::Context;
use crate::error::{PolyglotError, PolyglotResult, ViewFailure};
use crate::host_value::{HostArray, HostValue};
use crate::types::{HostType, PrimitiveKind};

/// Largest array the host can allocate
pub const MAX_ARRAY_LENGTH: u64 = i32::MAX as u64 - 8;

/// A live byte sequence over a window of a guest buffer
#[derive(Clone)]
pub struct ByteSequenceView {
    core: ViewCore,
    start: u64,
    /// Window length; `None` spans to the end of the buffer
    len: Option<u64>,
}

impl ByteSequenceView {
    pub(crate) fn new(context: Context, receiver: ForeignRef) -> Self {
        ByteSequenceView {
            core: ViewCore::new(context, receiver),
            start: 0,
            len: None,
        }
    }

    pub fn context(&self) -> &Context {
        self.core.context()
    }

    pub fn guest_value(&self) -> GuestValue {
        self.core.guest_value()
    }

    pub fn length(&self) -> PolyglotResult<usize> {
        if let Some(len) = self.len {
            return Ok(len as usize);
        }
        let size = self.core.call(
            self.core.key(Operation::BytesLength, vec![]),
            || {
                routine(|context, receiver, args| {
                    let start = index_arg(args, 0).unwrap_or(0);
                    match receiver.buffer_size() {
                        Ok(size) => Ok(HostValue::Long(size.saturating_sub(start).min(i64::MAX as u64) as i64)),
                        Err(InteropError::UnsupportedMessage) => Err(fail(
                            ViewFailure::Unsupported,
                            context,
                            "Unsupported operation",
                            "length",
                            &HostType::bytes(),
                            receiver,
                            None,
                        )),
                        Err(e) => Err(context.to_host_error(e)),
                    }
                })
            },
            &[HostValue::Long(self.start as i64)],
        )?;
        Ok(length_of(size))
    }

    pub fn byte_at(&self, index: usize) -> PolyglotResult<u8> {
        let length = self.length()?;
        if index >= length {
            return Err(self.out_of_bounds("byteAt", index));
        }
        let byte = self.core.call(
            self.core.key(Operation::BytesByteAt, vec![]),
            || {
                routine(|context, receiver, args| {
                    let offset = match index_arg(args, 0) {
                        Ok(offset) => offset,
                        Err(key) => {
                            return Err(fail(
                                ViewFailure::IndexOutOfBounds,
                                context,
                                "Index out of bounds in",
                                "byteAt",
                                &HostType::bytes(),
                                receiver,
                                Some(key),
                            ))
                        }
                    };
                    match receiver.read_buffer_byte(offset) {
                        Ok(byte) => Ok(HostValue::Byte(byte as i8)),
                        Err(InteropError::InvalidBufferOffset { .. }) => Err(fail(
                            ViewFailure::IndexOutOfBounds,
                            context,
                            "Index out of bounds in",
                            "byteAt",
                            &HostType::bytes(),
                            receiver,
                            Some(offset.to_string()),
                        )),
                        Err(InteropError::UnsupportedMessage) => Err(fail(
                            ViewFailure::Unsupported,
                            context,
                            "Unsupported operation",
                            "byteAt",
                            &HostType::bytes(),
                            receiver,
                            Some(offset.to_string()),
                        )),
                        Err(e) => Err(context.to_host_error(e)),
                    }
                })
            },
            &[HostValue::Long((self.start + index as u64) as i64)],
        )?;
        match byte {
            HostValue::Byte(b) => Ok(b as u8),
            other => Err(PolyglotError::ClassCast(format!(
                "Buffer read produced {:?} instead of a byte.",
                other
            ))),
        }
    }

    /// A window of this sequence covering `start..end`
    pub fn sub_sequence(&self, start: usize, end: usize) -> PolyglotResult<ByteSequenceView> {
        let length = self.length()?;
        if start > end || end > length {
            return Err(PolyglotError::IndexOutOfBounds(format!(
                "Invalid sub-sequence range {}..{} for byte sequence of length {} {}.",
                start,
                end,
                length,
                self.core.context().value_info(&self.core.guest_value())
            )));
        }
        Ok(ByteSequenceView {
            core: self.core.clone(),
            start: self.start + start as u64,
            len: Some((end - start) as u64),
        })
    }

    /// Copy the sequence into a host byte vector
    pub fn to_byte_array(&self) -> PolyglotResult<Vec<u8>> {
        let length = match self.len {
            Some(len) => len,
            None => self.length()? as u64,
        };
        let copied = self.core.call(
            self.core.key(Operation::BytesRead, vec![]),
            || {
                routine(|context, receiver, args| {
                    let (offset, length) = match (index_arg(args, 0), index_arg(args, 1)) {
                        (Ok(offset), Ok(length)) => (offset, length),
                        (Err(key), _) | (_, Err(key)) => {
                            return Err(fail(
                                ViewFailure::IndexOutOfBounds,
                                context,
                                "Index out of bounds in",
                                "toByteArray",
                                &HostType::bytes(),
                                receiver,
                                Some(key),
                            ))
                        }
                    };
                    if length > MAX_ARRAY_LENGTH {
                        return Err(fail(
                            ViewFailure::Unsupported,
                            context,
                            "Unsupported operation",
                            "toByteArray",
                            &HostType::bytes(),
                            receiver,
                            Some(length.to_string()),
                        ));
                    }
                    let mut bytes = vec![0u8; length as usize];
                    match receiver.read_buffer(offset, &mut bytes) {
                        Ok(()) => Ok(HostValue::Array(HostArray::new(
                            HostType::primitive(PrimitiveKind::Byte),
                            bytes.into_iter().map(|b| HostValue::Byte(b as i8)).collect(),
                        ))),
                        Err(InteropError::InvalidBufferOffset { .. }) => Err(fail(
                            ViewFailure::IndexOutOfBounds,
                            context,
                            "Index out of bounds in",
                            "toByteArray",
                            &HostType::bytes(),
                            receiver,
                            Some(offset.to_string()),
                        )),
                        Err(InteropError::UnsupportedMessage) => Err(fail(
                            ViewFailure::Unsupported,
                            context,
                            "Unsupported operation",
                            "toByteArray",
                            &HostType::bytes(),
                            receiver,
                            None,
                        )),
                        Err(e) => Err(context.to_host_error(e)),
                    }
                })
            },
            &[
                HostValue::Long(self.start as i64),
                HostValue::Long(length.min(i64::MAX as u64) as i64),
            ],
        )?;
        match copied {
            HostValue::Array(array) => Ok(array
                .to_vec()
                .into_iter()
                .filter_map(|b| b.as_i64().map(|b| b as u8))
                .collect()),
            other => Err(PolyglotError::ClassCast(format!(
                "Buffer read produced {:?} instead of a byte array.",
                other
            ))),
        }
    }

    fn out_of_bounds(&self, operation: &str, index: usize) -> PolyglotError {
        fail(
            ViewFailure::IndexOutOfBounds,
            self.core.context(),
            "Index out of bounds in",
            operation,
            &HostType::bytes(),
            self.core.receiver(),
            Some(index.to_string()),
        )
    }
}

impl PartialEq for ByteSequenceView {
    fn eq(&self, other: &Self) -> bool {
        self.core == other.core && self.start == other.start && self.len == other.len
    }
}

impl Hash for ByteSequenceView {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core.hash(state);
        self.start.hash(state);
    }
}

impl fmt::Debug for ByteSequenceView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.len {
            Some(len) => write!(
                f,
                "ByteSequence[{}..{}] over {:?}",
                self.start,
                self.start + len,
                self.core
            ),
            None => write!(f, "ByteSequence[{}..] over {:?}", self.start, self.core),
        }
    }
}
