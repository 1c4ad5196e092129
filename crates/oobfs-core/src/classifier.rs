//! Thread-affinity classification.
//!
//! Certain worker contexts replay already-applied changes and must not
//! re-trigger real side effects; every call they issue is serviced from the
//! shadow namespace instead. The wrapped filesystem (or its adapter)
//! registers those contexts here, and the host adapter tests membership for
//! each incoming call.

use dashmap::DashSet;

/// Identifier of a calling execution context, as reported by the host
/// framework for each request.
pub type ContextId = u32;

/// The set of execution contexts whose calls are out-of-band.
///
/// Shared between the component that designates worker contexts and the
/// per-call classification in the host adapter; membership tests are
/// lock-free reads.
#[derive(Debug, Default)]
pub struct OobRegistry {
    members: DashSet<ContextId>,
}

impl OobRegistry {
    pub fn new() -> Self {
        OobRegistry {
            members: DashSet::new(),
        }
    }

    /// Marks a context as out-of-band. Registering twice is a no-op.
    pub fn register(&self, id: ContextId) {
        self.members.insert(id);
    }

    /// Returns the context to ordinary in-band servicing.
    pub fn deregister(&self, id: ContextId) {
        self.members.remove(&id);
    }

    /// Classifies a calling context.
    pub fn is_out_of_band(&self, id: ContextId) -> bool {
        self.members.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_empty_registry_classifies_nothing() {
        let registry = OobRegistry::new();
        assert!(!registry.is_out_of_band(42));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_then_classify() {
        let registry = OobRegistry::new();
        registry.register(42);
        assert!(registry.is_out_of_band(42));
        assert!(!registry.is_out_of_band(43));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_deregister_returns_context_to_in_band() {
        let registry = OobRegistry::new();
        registry.register(7);
        registry.deregister(7);
        assert!(!registry.is_out_of_band(7));
    }

    #[test]
    fn test_double_register_is_single_membership() {
        let registry = OobRegistry::new();
        registry.register(9);
        registry.register(9);
        assert_eq!(registry.len(), 1);
        registry.deregister(9);
        assert!(!registry.is_out_of_band(9));
    }

    #[test]
    fn test_concurrent_membership_checks() {
        let registry = Arc::new(OobRegistry::new());
        for id in 0..64u32 {
            if id % 2 == 0 {
                registry.register(id);
            }
        }
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for id in 0..64u32 {
                        assert_eq!(registry.is_out_of_band(id), id % 2 == 0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
