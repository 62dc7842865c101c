//! `Map<K, V>` over a guest value with members or array elements
//!
//! String keys address members; integral keys address array elements. An
//! `Object` key type picks members when the guest value has them and array
//! elements otherwise. Like a host map, lookups of absent keys yield null.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tandem_sdk::{
    ForeignObject, ForeignRef, GuestValue, HostObject, InteropError, InteropResult, KeyInfo,
    Primitive,
};

use super::{fail, length_of, routine, ViewCore};
use crate::cache::{HostCallTarget, Operation};
use crate::context::Context;
use crate::error::{PolyglotError, PolyglotResult, ViewFailure};
use crate::host_value::{HostArray, HostValue};
use crate::to_guest::to_guest;
use crate::to_host::{to_host, Priority};
use crate::types::{HostClass, HostType, PrimitiveKind};

/// Key types a map view accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyKind {
    Any,
    Name,
    Index,
}

impl KeyKind {
    pub(crate) fn of(key: &HostType) -> Option<KeyKind> {
        match key.class() {
            HostClass::Object => Some(KeyKind::Any),
            HostClass::String => Some(KeyKind::Name),
            HostClass::Boxed(PrimitiveKind::Int)
            | HostClass::Boxed(PrimitiveKind::Long)
            | HostClass::Number => Some(KeyKind::Index),
            _ => None,
        }
    }

    pub(crate) fn backing(self, object: &dyn ForeignObject) -> Option<MapBacking> {
        match self {
            KeyKind::Any if object.has_members() => Some(MapBacking::Members),
            KeyKind::Any if object.has_array_elements() => Some(MapBacking::Elements),
            KeyKind::Any => None,
            KeyKind::Name => object.has_members().then_some(MapBacking::Members),
            KeyKind::Index => object.has_array_elements().then_some(MapBacking::Elements),
        }
    }

    pub(crate) fn requirement(self) -> &'static str {
        match self {
            KeyKind::Any => "Value must have members or array elements.",
            KeyKind::Name => "Value must have members.",
            KeyKind::Index => "Value must have array elements.",
        }
    }
}

/// Which guest capability backs a map view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum MapBacking {
    Members,
    Elements,
}

impl MapBacking {
    fn detail(self) -> &'static str {
        match self {
            MapBacking::Members => "members",
            MapBacking::Elements => "elements",
        }
    }

    fn slot(self, key: &HostValue) -> Option<Slot> {
        match self {
            MapBacking::Members => key.as_str().map(|s| Slot::Name(s.to_string())),
            MapBacking::Elements => key
                .as_i64()
                .filter(|i| *i >= 0)
                .map(|i| Slot::Index(i as u64)),
        }
    }
}

enum Slot {
    Name(String),
    Index(u64),
}

impl Slot {
    fn info(&self, receiver: &ForeignRef) -> KeyInfo {
        match self {
            Slot::Name(name) => receiver.member_info(name),
            Slot::Index(index) => receiver.array_element_info(*index),
        }
    }

    fn read(&self, receiver: &ForeignRef) -> InteropResult<GuestValue> {
        match self {
            Slot::Name(name) => receiver.read_member(name),
            Slot::Index(index) => receiver.read_array_element(*index),
        }
    }

    fn write(&self, receiver: &ForeignRef, value: GuestValue) -> InteropResult<()> {
        match self {
            Slot::Name(name) => receiver.write_member(name, value),
            Slot::Index(index) => receiver.write_array_element(*index, value),
        }
    }

    fn remove(&self, receiver: &ForeignRef) -> InteropResult<()> {
        match self {
            Slot::Name(name) => receiver.remove_member(name),
            Slot::Index(index) => receiver.remove_array_element(*index),
        }
    }

    fn describe(&self) -> String {
        match self {
            Slot::Name(name) => name.clone(),
            Slot::Index(index) => index.to_string(),
        }
    }
}

/// A live `Map<key, value>` view.
#[derive(Clone)]
pub struct MapView {
    core: ViewCore,
    key: HostType,
    value: HostType,
    backing: MapBacking,
}

impl MapView {
    pub(crate) fn new(
        context: Context,
        receiver: ForeignRef,
        key: HostType,
        value: HostType,
        backing: MapBacking,
    ) -> Self {
        MapView {
            core: ViewCore::new(context, receiver),
            key,
            value,
            backing,
        }
    }

    pub fn key_type(&self) -> &HostType {
        &self.key
    }

    pub fn value_type(&self) -> &HostType {
        &self.value
    }

    pub fn map_type(&self) -> HostType {
        HostType::map_of(self.key.clone(), self.value.clone())
    }

    pub fn context(&self) -> &Context {
        self.core.context()
    }

    pub fn guest_value(&self) -> GuestValue {
        self.core.guest_value()
    }

    /// Whether keys address members (as opposed to array elements)
    pub fn is_member_backed(&self) -> bool {
        self.backing == MapBacking::Members
    }

    fn types(&self) -> Vec<HostType> {
        vec![self.key.clone(), self.value.clone()]
    }

    fn call(
        &self,
        operation: Operation,
        build: impl FnOnce() -> Arc<HostCallTarget>,
        args: &[HostValue],
    ) -> PolyglotResult<HostValue> {
        let key = self
            .core
            .key(operation, self.types())
            .with_detail(self.backing.detail());
        self.core.call(key, build, args)
    }

    pub fn size(&self) -> PolyglotResult<usize> {
        let backing = self.backing;
        let map_type = self.map_type();
        let size = self.call(
            Operation::MapSize,
            || {
                routine(move |context, receiver, _| {
                    let size = match backing {
                        MapBacking::Members => receiver.member_keys().map(|k| k.len() as u64),
                        MapBacking::Elements => receiver.array_size(),
                    };
                    match size {
                        Ok(size) => Ok(HostValue::Long(size.min(i64::MAX as u64) as i64)),
                        Err(InteropError::UnsupportedMessage) => Err(fail(
                            ViewFailure::Unsupported,
                            context,
                            "Unsupported operation",
                            "size",
                            &map_type,
                            receiver,
                            None,
                        )),
                        Err(e) => Err(context.to_host_error(e)),
                    }
                })
            },
            &[],
        )?;
        Ok(length_of(size))
    }

    pub fn is_empty(&self) -> PolyglotResult<bool> {
        Ok(self.size()? == 0)
    }

    /// The value under `key`, or null when the key is absent or unreadable
    pub fn get(&self, key: &HostValue) -> PolyglotResult<HostValue> {
        let backing = self.backing;
        let value_type = self.value.clone();
        self.call(
            Operation::MapGet,
            || {
                routine(move |context, receiver, args| {
                    let slot = match args.first().and_then(|k| backing.slot(k)) {
                        Some(slot) => slot,
                        None => return Ok(HostValue::Null),
                    };
                    if !slot.info(receiver).is_readable() {
                        return Ok(HostValue::Null);
                    }
                    let value = slot.read(receiver).map_err(|e| context.to_host_error(e))?;
                    to_host(context, &value, &value_type, Priority::HostProxy)
                })
            },
            &[key.clone()],
        )
    }

    pub fn contains_key(&self, key: &HostValue) -> PolyglotResult<bool> {
        let backing = self.backing;
        let present = self.call(
            Operation::MapContainsKey,
            || {
                routine(move |_, receiver, args| {
                    let present = args
                        .first()
                        .and_then(|k| backing.slot(k))
                        .map(|slot| slot.info(receiver).is_existing())
                        .unwrap_or(false);
                    Ok(HostValue::Boolean(present))
                })
            },
            &[key.clone()],
        )?;
        Ok(present.as_bool().unwrap_or(false))
    }

    /// Store `value` under `key`, returning the previous value or null
    pub fn put(&self, key: HostValue, value: HostValue) -> PolyglotResult<HostValue> {
        let backing = self.backing;
        let value_type = self.value.clone();
        let map_type = self.map_type();
        self.call(
            Operation::MapPut,
            || {
                routine(move |context, receiver, args| {
                    let key = args.first().unwrap_or(&HostValue::Null);
                    let value = args.get(1).unwrap_or(&HostValue::Null);
                    let slot = match backing.slot(key) {
                        Some(slot) => slot,
                        None => {
                            return Err(fail(
                                ViewFailure::IllegalArgument,
                                context,
                                "Invalid key in",
                                "put",
                                &map_type,
                                receiver,
                                Some(format!("{:?}", key)),
                            ))
                        }
                    };
                    let failure = |kind, operation| {
                        fail(kind, context, operation, "put", &map_type, receiver, Some(slot.describe()))
                    };
                    let info = slot.info(receiver);
                    if !info.is_writable() {
                        return Err(failure(ViewFailure::Unsupported, "Unsupported operation"));
                    }
                    let previous = if info.is_readable() {
                        let previous = slot.read(receiver).map_err(|e| context.to_host_error(e))?;
                        to_host(context, &previous, &value_type, Priority::HostProxy)?
                    } else {
                        HostValue::Null
                    };
                    match slot.write(receiver, to_guest(context, value)) {
                        Ok(()) => Ok(previous),
                        Err(InteropError::UnsupportedType { .. }) => {
                            Err(failure(ViewFailure::ClassCast, "Invalid value in"))
                        }
                        Err(InteropError::UnsupportedMessage) => {
                            Err(failure(ViewFailure::Unsupported, "Unsupported operation"))
                        }
                        Err(InteropError::InvalidArrayIndex(_))
                        | Err(InteropError::UnknownIdentifier(_)) => {
                            Err(failure(ViewFailure::IndexOutOfBounds, "Index out of bounds in"))
                        }
                        Err(e) => Err(context.to_host_error(e)),
                    }
                })
            },
            &[key, value],
        )
    }

    /// Remove `key`, returning the previous value or null when absent
    pub fn remove(&self, key: &HostValue) -> PolyglotResult<HostValue> {
        let backing = self.backing;
        let value_type = self.value.clone();
        let map_type = self.map_type();
        self.call(
            Operation::MapRemove,
            || {
                routine(move |context, receiver, args| {
                    let slot = match args.first().and_then(|k| backing.slot(k)) {
                        Some(slot) => slot,
                        None => return Ok(HostValue::Null),
                    };
                    let failure = |kind, operation| {
                        fail(kind, context, operation, "remove", &map_type, receiver, Some(slot.describe()))
                    };
                    let info = slot.info(receiver);
                    if !info.is_existing() {
                        return Ok(HostValue::Null);
                    }
                    if !info.is_removable() {
                        return Err(failure(ViewFailure::Unsupported, "Unsupported operation"));
                    }
                    let previous = if info.is_readable() {
                        let previous = slot.read(receiver).map_err(|e| context.to_host_error(e))?;
                        to_host(context, &previous, &value_type, Priority::HostProxy)?
                    } else {
                        HostValue::Null
                    };
                    match slot.remove(receiver) {
                        Ok(()) => Ok(previous),
                        Err(InteropError::UnsupportedMessage) => {
                            Err(failure(ViewFailure::Unsupported, "Unsupported operation"))
                        }
                        Err(InteropError::InvalidArrayIndex(_))
                        | Err(InteropError::UnknownIdentifier(_)) => {
                            Err(failure(ViewFailure::IndexOutOfBounds, "Index out of bounds in"))
                        }
                        Err(e) => Err(context.to_host_error(e)),
                    }
                })
            },
            &[key.clone()],
        )
    }

    /// The current keys, converted to the key type
    pub fn keys(&self) -> PolyglotResult<Vec<HostValue>> {
        let backing = self.backing;
        let key_type = self.key.clone();
        let keys = self.call(
            Operation::MapKeys,
            || {
                routine(move |context, receiver, _| {
                    let raw: Vec<Primitive> = match backing {
                        MapBacking::Members => receiver
                            .member_keys()
                            .map_err(|e| context.to_host_error(e))?
                            .into_iter()
                            .map(|k| Primitive::String(k.into()))
                            .collect(),
                        MapBacking::Elements => {
                            let size = receiver.array_size().map_err(|e| context.to_host_error(e))?;
                            (0..size).map(|i| Primitive::Long(i as i64)).collect()
                        }
                    };
                    let keys = raw
                        .into_iter()
                        .map(|k| to_host(context, &GuestValue::Primitive(k), &key_type, Priority::HostProxy))
                        .collect::<PolyglotResult<Vec<_>>>()?;
                    Ok(HostValue::Array(HostArray::new(key_type.clone(), keys)))
                })
            },
            &[],
        )?;
        match keys {
            HostValue::Array(array) => Ok(array.to_vec()),
            _ => Ok(Vec::new()),
        }
    }

    /// Entry views for the current keys
    pub fn entries(&self) -> PolyglotResult<Vec<MapEntryView>> {
        Ok(self
            .keys()?
            .into_iter()
            .map(|key| MapEntryView {
                map: self.clone(),
                key: Box::new(key),
            })
            .collect())
    }
}

impl PartialEq for MapView {
    fn eq(&self, other: &Self) -> bool {
        self.core == other.core
    }
}

impl Hash for MapView {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core.hash(state);
    }
}

impl fmt::Debug for MapView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} over {:?} ({})", self.map_type(), self.core, self.backing.detail())
    }
}

// ============================================================================
// Entries
// ============================================================================

/// One `Map.Entry<K, V>` of a [`MapView`]; reads and writes go to the map.
#[derive(Clone)]
pub struct MapEntryView {
    map: MapView,
    key: Box<HostValue>,
}

impl MapEntryView {
    pub fn key(&self) -> &HostValue {
        &self.key
    }

    pub fn map(&self) -> &MapView {
        &self.map
    }

    pub fn value(&self) -> PolyglotResult<HostValue> {
        self.map.get(&self.key)
    }

    /// Replace the entry's value, returning the previous one
    pub fn set_value(&self, value: HostValue) -> PolyglotResult<HostValue> {
        self.map.put(HostValue::clone(&self.key), value)
    }

    /// Remove the entry from the map; the key must still exist
    pub fn remove(&self) -> PolyglotResult<HostValue> {
        if !self.map.contains_key(&self.key)? {
            return Err(PolyglotError::IndexOutOfBounds(format!(
                "Entry removal of non-existent key {:?} for {} {}.",
                self.key,
                self.map.map_type(),
                self.map.context().value_info(&self.map.guest_value())
            )));
        }
        self.map.remove(&self.key)
    }
}

impl PartialEq for MapEntryView {
    fn eq(&self, other: &Self) -> bool {
        self.map == other.map && self.key == other.key
    }
}

impl fmt::Debug for MapEntryView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} of {:?}", self.key, self.map)
    }
}

impl HostObject for MapEntryView {
    fn class_name(&self) -> &str {
        "Map.Entry"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
