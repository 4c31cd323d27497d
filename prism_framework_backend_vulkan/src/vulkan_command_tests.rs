use super::PoolRegistry;

// Pool creation needs a device; these tests cover the registration logic,
// which is pure bookkeeping.

#[test]
fn test_register_hands_out_distinct_ids() {
    let mut registry = PoolRegistry::new(false);
    let a = registry.register();
    let b = registry.register();
    let c = registry.register();

    assert_ne!(a, b);
    assert_ne!(b, c);
    assert_ne!(a, c);
    assert_eq!(registry.worker_count(), 3);
}

#[test]
fn test_fresh_registry_is_empty() {
    let registry = PoolRegistry::new(true);
    assert_eq!(registry.worker_count(), 0);
}
