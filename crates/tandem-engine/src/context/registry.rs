//! Registry of live contexts

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::warn;

use super::{Context, ContextId};
use crate::error::PolyglotError;

/// Registry of the contexts owned by one embedding
pub struct ContextRegistry {
    contexts: Mutex<FxHashMap<ContextId, Context>>,
}

impl ContextRegistry {
    /// Create a new context registry
    pub fn new() -> Self {
        Self {
            contexts: Mutex::new(FxHashMap::default()),
        }
    }

    /// Register a context
    pub fn register(&self, context: Context) -> ContextId {
        let id = context.id();
        self.contexts.lock().insert(id, context);
        id
    }

    /// Get a context by ID
    pub fn get(&self, id: ContextId) -> Option<Context> {
        self.contexts.lock().get(&id).cloned()
    }

    /// Remove a context
    pub fn remove(&self, id: ContextId) -> Option<Context> {
        self.contexts.lock().remove(&id)
    }

    /// Get the number of registered contexts
    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get all context IDs
    pub fn all_ids(&self) -> Vec<ContextId> {
        self.contexts.lock().keys().copied().collect()
    }

    /// Close and unregister every idle context; contexts that are still
    /// entered are cancelled and stay registered
    pub fn close_all(&self) -> Vec<(ContextId, PolyglotError)> {
        let contexts: Vec<Context> = self.contexts.lock().values().cloned().collect();
        let mut failures = Vec::new();
        for context in contexts {
            match context.close() {
                Ok(()) => {
                    self.remove(context.id());
                }
                Err(error) => {
                    warn!(context = context.id().as_u64(), %error, "context busy, cancelling");
                    context.cancel();
                    failures.push((context.id(), error));
                }
            }
        }
        failures
    }
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextState;

    #[test]
    fn test_register_get_remove() {
        let registry = ContextRegistry::new();
        assert!(registry.is_empty());

        let a = registry.register(Context::builder("memory").build());
        let b = registry.register(Context::builder("memory").build());
        assert_eq!(registry.len(), 2);
        assert!(registry.all_ids().contains(&a));
        assert_eq!(registry.get(b).map(|c| c.id()), Some(b));

        assert!(registry.remove(a).is_some());
        assert!(registry.get(a).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_close_all_cancels_busy_contexts() {
        let registry = ContextRegistry::new();
        let idle = Context::builder("memory").build();
        let busy = Context::builder("memory").build();
        registry.register(idle.clone());
        let busy_id = registry.register(busy.clone());

        let prior = busy.enter().unwrap();
        let failures = registry.close_all();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, busy_id);
        assert!(idle.is_closed());
        assert_eq!(busy.state(), ContextState::Cancelling);
        assert_eq!(registry.len(), 1);

        busy.leave(prior).unwrap();
        assert!(busy.is_closed());
    }
}
