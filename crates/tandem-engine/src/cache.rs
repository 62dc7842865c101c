//! Per-shape call-target cache
//!
//! Every view operation is served by a routine specialized for the receiver's
//! shape, the operation and the declared host types. Routines are built on
//! first use and installed with compare-and-install: two threads racing on the
//! same key may both build a candidate, but only the first one installed is
//! ever returned, so all callers of a key end up sharing one routine.

use std::any::TypeId;
use std::hash::BuildHasherDefault;
use std::mem::Discriminant;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use rustc_hash::FxHasher;
use tandem_sdk::{ForeignObject, ForeignRef, InteropResult, Message, Reply};
use tracing::debug;

use crate::context::Context;
use crate::error::PolyglotResult;
use crate::host_value::HostValue;
use crate::types::HostType;

/// A cached host-side routine: `(context, receiver, host arguments) -> result`
pub type HostCallTarget =
    dyn Fn(&Context, &ForeignRef, &[HostValue]) -> PolyglotResult<HostValue> + Send + Sync;

/// A cached cross-context message routine
pub type SendTarget = dyn Fn(&dyn ForeignObject, &Message) -> InteropResult<Reply> + Send + Sync;

/// The operation a routine implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListSize,
    ListGet,
    ListSet,
    ListAdd,
    ListRemove,
    MapSize,
    MapGet,
    MapPut,
    MapRemove,
    MapContainsKey,
    MapKeys,
    IterableIterator,
    IteratorHasNext,
    IteratorNext,
    FunctionApply,
    BytesLength,
    BytesByteAt,
    BytesRead,
    ProxyInvoke,
    /// Forward a message to another context
    Send(Discriminant<Message>),
}

/// Identity of a cached routine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    operation: Operation,
    receiver: TypeId,
    types: Vec<HostType>,
    detail: Option<Arc<str>>,
}

impl CacheKey {
    /// Key for `operation` on receivers shaped like `receiver`
    pub fn new(operation: Operation, receiver: &dyn ForeignObject, types: Vec<HostType>) -> Self {
        CacheKey {
            operation,
            receiver: shape_of(receiver),
            types,
            detail: None,
        }
    }

    /// Key for forwarding `message` to receivers shaped like `receiver`
    pub fn send(message: &Message, receiver: &dyn ForeignObject) -> Self {
        Self::new(
            Operation::Send(std::mem::discriminant(message)),
            receiver,
            Vec::new(),
        )
    }

    /// Distinguish routines of the same operation (member name, backing mode)
    pub fn with_detail(mut self, detail: &str) -> Self {
        self.detail = Some(Arc::from(detail));
        self
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }
}

/// Shape of a foreign object: the concrete guest type behind it
pub fn shape_of(receiver: &dyn ForeignObject) -> TypeId {
    std::any::Any::type_id(receiver.as_any())
}

/// Thread-safe routine cache
pub struct CallTargetCache<T: ?Sized> {
    entries: DashMap<CacheKey, Arc<T>, BuildHasherDefault<FxHasher>>,
    hits: AtomicUsize,
    installs: AtomicUsize,
}

impl<T: ?Sized> CallTargetCache<T> {
    pub fn new() -> Self {
        CallTargetCache {
            entries: DashMap::with_hasher(BuildHasherDefault::default()),
            hits: AtomicUsize::new(0),
            installs: AtomicUsize::new(0),
        }
    }

    /// Look up an installed routine
    pub fn get(&self, key: &CacheKey) -> Option<Arc<T>> {
        let hit = self.entries.get(key).map(|entry| entry.value().clone());
        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    /// Return the routine for `key`, building and installing one if absent.
    ///
    /// `build` runs without any lock held. If another thread installed a
    /// routine for the same key in the meantime, that routine wins and the
    /// freshly built candidate is dropped.
    pub fn get_or_install(&self, key: CacheKey, build: impl FnOnce() -> Arc<T>) -> Arc<T> {
        if let Some(hit) = self.get(&key) {
            return hit;
        }
        let candidate = build();
        let operation = key.operation;
        let installed = self.entries.entry(key).or_insert_with(|| {
            self.installs.fetch_add(1, Ordering::Relaxed);
            candidate
        });
        debug!(?operation, "call target installed");
        installed.value().clone()
    }

    /// Number of installed routines
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of lookups served from the cache
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of routines ever installed
    pub fn installs(&self) -> usize {
        self.installs.load(Ordering::Relaxed)
    }

    /// Drop every routine
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl<T: ?Sized> Default for CallTargetCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
