//! Tandem Interop Engine
//!
//! This crate lets host code work with values owned by guest languages:
//! - **Coercion**: exact, lossless primitive conversion (`coercion` module)
//! - **ToHost / ToGuest**: conversion between guest values and host types at
//!   increasing priority levels (`to_host`, `to_guest` modules)
//! - **Views**: live host collections, iterators and functions backed by
//!   guest objects (`views` module)
//! - **Proxies**: guest values implementing host interfaces and host
//!   functions callable from guests (`proxy` module)
//! - **Bridge**: migration of values and exceptions between contexts
//!   (`bridge` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use tandem_engine::{to_host, Context, HostType, Priority};
//! use tandem_sdk::{ArrayObject, GuestValue};
//!
//! let context = Context::builder("memory").build();
//! let array = GuestValue::object(ArrayObject::new(vec!["a".into(), "b".into()]));
//!
//! let list = to_host(&context, &array, &HostType::list_of(HostType::string()), Priority::HostProxy)?;
//! let list = list.as_list().unwrap();
//! assert_eq!(list.size()?, 2);
//! assert_eq!(list.get(0)?.as_str(), Some("a"));
//! ```

#![warn(rust_2018_idioms)]
#![allow(clippy::new_without_default)]
#![allow(clippy::should_implement_trait)]

// ============================================================================
// Core Modules
// ============================================================================

/// Cross-context migration of values and exceptions
pub mod bridge;

/// Per-shape call-target cache
pub mod cache;

/// Exact primitive coercion
pub mod coercion;

/// Interop options
pub mod config;

/// Execution contexts, layers and the context registry
pub mod context;

/// Host-facing error taxonomy
pub mod error;

/// Host values
pub mod host_value;

/// Interface proxies and host functions
pub mod proxy;

/// Host-to-guest conversion
pub mod to_guest;

/// Guest-to-host conversion
pub mod to_host;

/// Host type descriptors
pub mod types;

/// Live host views over guest objects
pub mod views;

// ============================================================================
// Re-exports
// ============================================================================

pub use bridge::{OtherContextException, OtherContextValue};
pub use cache::{CacheKey, CallTargetCache, HostCallTarget, Operation, SendTarget};
pub use coercion::to_primitive;
pub use config::{ConfigError, InteropOptions};
pub use context::{Context, ContextBuilder, ContextId, ContextRegistry, ContextState, Layer, PriorState};
pub use error::{PolyglotError, PolyglotResult};
pub use host_value::{HostArray, HostValue};
pub use proxy::{HostFunction, HostFunctionBuilder, InterfaceProxy, Overload};
pub use to_guest::{to_guest, HostArrayObject};
pub use to_host::{can_convert, to_host, Priority};
pub use types::{HostClass, HostType, InterfaceDesc, MethodDesc, PrimitiveKind};
pub use views::{
    ByteSequenceView, FunctionView, IterableView, IteratorView, ListView, MapEntryView, MapView,
    ValueHandle,
};
