//! Reified capability messages
//!
//! The bridge between two guest contexts forwards messages generically: it
//! does not know which message it is relaying, only how to migrate the values
//! a message carries. [`Message`] is the data form of every capability call
//! and [`dispatch`] sends one to a receiver. [`resolve`] picks the handler
//! for a kind of message once, so callers can keep it for later sends.

use crate::error::{InteropError, InteropResult};
use crate::object::{ForeignObject, KeyInfo};
use crate::value::{GuestValue, Primitive};

/// A capability call in data form.
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub enum Message {
    IsNull,
    IsBoxed,
    Unbox,
    HasArrayElements,
    GetArraySize,
    ReadArrayElement(u64),
    WriteArrayElement(u64, GuestValue),
    RemoveArrayElement(u64),
    ArrayElementInfo(u64),
    HasMembers,
    GetMembers,
    ReadMember(String),
    WriteMember(String, GuestValue),
    RemoveMember(String),
    MemberInfo(String),
    InvokeMember(String, Vec<GuestValue>),
    IsExecutable,
    Execute(Vec<GuestValue>),
    IsInstantiable,
    Instantiate(Vec<GuestValue>),
    HasIterator,
    GetIterator,
    IsIterator,
    HasIteratorNextElement,
    GetIteratorNextElement,
    HasBufferElements,
    GetBufferSize,
    ReadBufferByte(u64),
    ReadBuffer(u64, usize),
    IsException,
    IsIdentical(GuestValue),
    IdentityHash,
    ToDisplayString,
    GetMetaName,
}

impl Message {
    /// Protocol name of the message
    pub fn name(&self) -> &'static str {
        match self {
            Message::IsNull => "isNull",
            Message::IsBoxed => "isBoxed",
            Message::Unbox => "unbox",
            Message::HasArrayElements => "hasArrayElements",
            Message::GetArraySize => "getArraySize",
            Message::ReadArrayElement(_) => "readArrayElement",
            Message::WriteArrayElement(..) => "writeArrayElement",
            Message::RemoveArrayElement(_) => "removeArrayElement",
            Message::ArrayElementInfo(_) => "arrayElementInfo",
            Message::HasMembers => "hasMembers",
            Message::GetMembers => "getMembers",
            Message::ReadMember(_) => "readMember",
            Message::WriteMember(..) => "writeMember",
            Message::RemoveMember(_) => "removeMember",
            Message::MemberInfo(_) => "memberInfo",
            Message::InvokeMember(..) => "invokeMember",
            Message::IsExecutable => "isExecutable",
            Message::Execute(_) => "execute",
            Message::IsInstantiable => "isInstantiable",
            Message::Instantiate(_) => "instantiate",
            Message::HasIterator => "hasIterator",
            Message::GetIterator => "getIterator",
            Message::IsIterator => "isIterator",
            Message::HasIteratorNextElement => "hasIteratorNextElement",
            Message::GetIteratorNextElement => "getIteratorNextElement",
            Message::HasBufferElements => "hasBufferElements",
            Message::GetBufferSize => "getBufferSize",
            Message::ReadBufferByte(_) => "readBufferByte",
            Message::ReadBuffer(..) => "readBuffer",
            Message::IsException => "isException",
            Message::IsIdentical(_) => "isIdentical",
            Message::IdentityHash => "identityHashCode",
            Message::ToDisplayString => "toDisplayString",
            Message::GetMetaName => "getMetaObject",
        }
    }

    /// Rewrite every guest value carried by the message
    pub fn map_values(self, mut f: impl FnMut(GuestValue) -> GuestValue) -> Message {
        match self {
            Message::WriteArrayElement(index, value) => Message::WriteArrayElement(index, f(value)),
            Message::WriteMember(key, value) => Message::WriteMember(key, f(value)),
            Message::InvokeMember(key, args) => {
                Message::InvokeMember(key, args.into_iter().map(f).collect())
            }
            Message::Execute(args) => Message::Execute(args.into_iter().map(f).collect()),
            Message::Instantiate(args) => Message::Instantiate(args.into_iter().map(f).collect()),
            Message::IsIdentical(other) => Message::IsIdentical(f(other)),
            other => other,
        }
    }
}

/// Result of a dispatched [`Message`].
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub enum Reply {
    Unit,
    Bool(bool),
    Size(u64),
    Value(GuestValue),
    Unboxed(Option<Primitive>),
    Keys(Vec<String>),
    Info(KeyInfo),
    Byte(u8),
    Bytes(Vec<u8>),
    Hash(u64),
    Text(String),
    MetaName(Option<String>),
}

macro_rules! reply_accessor {
    ($(#[$doc:meta] $name:ident => $variant:ident($ty:ty)),* $(,)?) => {
        impl Reply {
            $(
                #[$doc]
                pub fn $name(self) -> InteropResult<$ty> {
                    match self {
                        Reply::$variant(v) => Ok(v),
                        _ => Err(InteropError::UnsupportedMessage),
                    }
                }
            )*
        }
    };
}

reply_accessor! {
    /// Expect a boolean reply
    into_bool => Bool(bool),
    /// Expect a size reply
    into_size => Size(u64),
    /// Expect a value reply
    into_value => Value(GuestValue),
    /// Expect an unboxed scalar reply
    into_unboxed => Unboxed(Option<Primitive>),
    /// Expect a key list reply
    into_keys => Keys(Vec<String>),
    /// Expect a key info reply
    into_info => Info(KeyInfo),
    /// Expect a single byte reply
    into_byte => Byte(u8),
    /// Expect a byte run reply
    into_bytes => Bytes(Vec<u8>),
    /// Expect a hash reply
    into_hash => Hash(u64),
    /// Expect a text reply
    into_text => Text(String),
    /// Expect a meta name reply
    into_meta_name => MetaName(Option<String>),
}

impl Reply {
    /// Expect a unit reply
    pub fn into_unit(self) -> InteropResult<()> {
        match self {
            Reply::Unit => Ok(()),
            _ => Err(InteropError::UnsupportedMessage),
        }
    }

    /// Rewrite the guest value carried by the reply, if any
    pub fn map_value(self, f: impl FnOnce(GuestValue) -> GuestValue) -> Reply {
        match self {
            Reply::Value(v) => Reply::Value(f(v)),
            other => other,
        }
    }
}

/// Routine answering one kind of message
pub type Handler = fn(&dyn ForeignObject, &Message) -> InteropResult<Reply>;

/// Send `message` to `receiver`.
pub fn dispatch(receiver: &dyn ForeignObject, message: &Message) -> InteropResult<Reply> {
    resolve(message)(receiver, message)
}

/// The handler for messages of the same kind as `message`. A handler given a
/// message of another kind falls back to [`dispatch`].
pub fn resolve(message: &Message) -> Handler {
    match message {
        Message::IsNull => |r, _| Ok(Reply::Bool(r.is_null())),
        Message::IsBoxed => |r, _| Ok(Reply::Bool(r.is_boxed())),
        Message::Unbox => |r, _| Ok(Reply::Unboxed(r.unbox())),
        Message::HasArrayElements => |r, _| Ok(Reply::Bool(r.has_array_elements())),
        Message::GetArraySize => |r, _| Ok(Reply::Size(r.array_size()?)),
        Message::ReadArrayElement(_) => |r, m| match m {
            Message::ReadArrayElement(index) => Ok(Reply::Value(r.read_array_element(*index)?)),
            other => dispatch(r, other),
        },
        Message::WriteArrayElement(..) => |r, m| match m {
            Message::WriteArrayElement(index, value) => {
                r.write_array_element(*index, value.clone())?;
                Ok(Reply::Unit)
            }
            other => dispatch(r, other),
        },
        Message::RemoveArrayElement(_) => |r, m| match m {
            Message::RemoveArrayElement(index) => {
                r.remove_array_element(*index)?;
                Ok(Reply::Unit)
            }
            other => dispatch(r, other),
        },
        Message::ArrayElementInfo(_) => |r, m| match m {
            Message::ArrayElementInfo(index) => Ok(Reply::Info(r.array_element_info(*index))),
            other => dispatch(r, other),
        },
        Message::HasMembers => |r, _| Ok(Reply::Bool(r.has_members())),
        Message::GetMembers => |r, _| Ok(Reply::Keys(r.member_keys()?)),
        Message::ReadMember(_) => |r, m| match m {
            Message::ReadMember(key) => Ok(Reply::Value(r.read_member(key)?)),
            other => dispatch(r, other),
        },
        Message::WriteMember(..) => |r, m| match m {
            Message::WriteMember(key, value) => {
                r.write_member(key, value.clone())?;
                Ok(Reply::Unit)
            }
            other => dispatch(r, other),
        },
        Message::RemoveMember(_) => |r, m| match m {
            Message::RemoveMember(key) => {
                r.remove_member(key)?;
                Ok(Reply::Unit)
            }
            other => dispatch(r, other),
        },
        Message::MemberInfo(_) => |r, m| match m {
            Message::MemberInfo(key) => Ok(Reply::Info(r.member_info(key))),
            other => dispatch(r, other),
        },
        Message::InvokeMember(..) => |r, m| match m {
            Message::InvokeMember(key, args) => Ok(Reply::Value(r.invoke_member(key, args)?)),
            other => dispatch(r, other),
        },
        Message::IsExecutable => |r, _| Ok(Reply::Bool(r.is_executable())),
        Message::Execute(_) => |r, m| match m {
            Message::Execute(args) => Ok(Reply::Value(r.execute(args)?)),
            other => dispatch(r, other),
        },
        Message::IsInstantiable => |r, _| Ok(Reply::Bool(r.is_instantiable())),
        Message::Instantiate(_) => |r, m| match m {
            Message::Instantiate(args) => Ok(Reply::Value(r.instantiate(args)?)),
            other => dispatch(r, other),
        },
        Message::HasIterator => |r, _| Ok(Reply::Bool(r.has_iterator())),
        Message::GetIterator => |r, _| Ok(Reply::Value(r.get_iterator()?)),
        Message::IsIterator => |r, _| Ok(Reply::Bool(r.is_iterator())),
        Message::HasIteratorNextElement => |r, _| Ok(Reply::Bool(r.has_iterator_next_element()?)),
        Message::GetIteratorNextElement => |r, _| Ok(Reply::Value(r.get_iterator_next_element()?)),
        Message::HasBufferElements => |r, _| Ok(Reply::Bool(r.has_buffer_elements())),
        Message::GetBufferSize => |r, _| Ok(Reply::Size(r.buffer_size()?)),
        Message::ReadBufferByte(_) => |r, m| match m {
            Message::ReadBufferByte(offset) => Ok(Reply::Byte(r.read_buffer_byte(*offset)?)),
            other => dispatch(r, other),
        },
        Message::ReadBuffer(..) => |r, m| match m {
            Message::ReadBuffer(offset, length) => {
                let mut bytes = vec![0u8; *length];
                r.read_buffer(*offset, &mut bytes)?;
                Ok(Reply::Bytes(bytes))
            }
            other => dispatch(r, other),
        },
        Message::IsException => |r, _| Ok(Reply::Bool(r.is_exception())),
        Message::IsIdentical(_) => |r, m| match m {
            Message::IsIdentical(other) => Ok(Reply::Bool(r.is_identical(other))),
            other => dispatch(r, other),
        },
        Message::IdentityHash => |r, _| Ok(Reply::Hash(r.identity_hash())),
        Message::ToDisplayString => |r, _| Ok(Reply::Text(r.display_string())),
        Message::GetMetaName => |r, _| Ok(Reply::MetaName(r.meta_name())),
    }
}
