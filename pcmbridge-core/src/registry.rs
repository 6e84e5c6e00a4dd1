//! Opaque `u64` handles for objects reached from a native audio callback.
//!
//! A callback that only carries an integer (C userdata, a cpal closure that
//! must not own the sampler) resolves it here. Handles are drawn at random
//! and re-drawn on collision; `0` is never issued so it can mean "none".
//! Unregistering detaches the object immediately: later lookups return
//! `None` and the callback outputs silence.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

pub struct HandleRegistry<T: ?Sized> {
    entries: RwLock<HashMap<u64, Arc<T>>>,
}

impl<T: ?Sized> HandleRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Store `value` under a fresh non-zero handle.
    pub fn register(&self, value: Arc<T>) -> u64 {
        let mut entries = self.entries.write();
        loop {
            let handle = rand::random::<u64>();
            if handle != 0 && !entries.contains_key(&handle) {
                entries.insert(handle, value);
                debug!(handle, live = entries.len(), "handle registered");
                return handle;
            }
        }
    }

    pub fn get(&self, handle: u64) -> Option<Arc<T>> {
        self.entries.read().get(&handle).cloned()
    }

    /// Remove and return the object behind `handle`, if any.
    pub fn unregister(&self, handle: u64) -> Option<Arc<T>> {
        let removed = self.entries.write().remove(&handle);
        if removed.is_some() {
            debug!(handle, "handle unregistered");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<T: ?Sized> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn register_then_lookup() {
        let registry = HandleRegistry::new();
        let handle = registry.register(Arc::new("sink-a".to_string()));
        assert_ne!(handle, 0);
        assert_eq!(registry.get(handle).as_deref().map(String::as_str), Some("sink-a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn handles_are_unique() {
        let registry = HandleRegistry::new();
        let handles: HashSet<u64> = (0..512).map(|i| registry.register(Arc::new(i))).collect();
        assert_eq!(handles.len(), 512);
        assert_eq!(registry.len(), 512);
    }

    #[test]
    fn unregister_detaches() {
        let registry = HandleRegistry::new();
        let handle = registry.register(Arc::new(7u32));
        assert_eq!(registry.unregister(handle).as_deref(), Some(&7));
        assert!(registry.get(handle).is_none());
        assert!(registry.unregister(handle).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_handle_is_none() {
        let registry: HandleRegistry<u8> = HandleRegistry::default();
        assert!(registry.get(0).is_none());
        assert!(registry.get(42).is_none());
    }

    #[test]
    fn holds_trait_objects() {
        let registry: HandleRegistry<dyn Fn() -> u8 + Send + Sync> = HandleRegistry::new();
        let handle = registry.register(Arc::new(|| 9u8));
        let f = registry.get(handle).unwrap();
        assert_eq!(f(), 9);
    }
}
