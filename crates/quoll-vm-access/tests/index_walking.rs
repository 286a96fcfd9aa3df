//! Index Walking Integration Tests
//!
//! End-to-end walks over arrays, holey arrays with prototype-visible
//! indices, sparse arrays, and plain objects, plus the length paths
//! that ride the same strategy caches.

use quoll_vm_access::{
    ArrayLengthReadSite, ElementReadSite, FirstIndexSite, HasPropertySite, LastIndexSite,
    NextIndexSite, PreviousIndexSite, set_array_length, set_array_length_with,
};
use quoll_vm_object::{
    ArrayStorage, EngineContext, JsObject, MAX_SAFE_INTEGER, PropertyKey, Value,
};
use std::sync::Arc;

fn ctx() -> EngineContext {
    EngineContext::default()
}

fn array_of(ctx: &EngineContext, values: &[i32]) -> Value {
    Value::object(Arc::new(JsObject::array_from(
        ctx,
        values.iter().copied().map(Value::int32).collect(),
        None,
    )))
}

// ============================================================================
// Dense walks
// ============================================================================

#[test]
fn test_dense_walk_forward_and_backward() {
    let ctx = ctx();
    let array = array_of(&ctx, &[1, 2, 3]);
    let mut first = FirstIndexSite::new();
    let mut next = NextIndexSite::new();
    let mut last = LastIndexSite::new();
    let mut previous = PreviousIndexSite::new();

    assert_eq!(first.first_index(&ctx, &array, 3).unwrap(), 0);
    assert_eq!(next.next_index(&ctx, &array, 0, 3).unwrap(), 1);
    assert_eq!(next.next_index(&ctx, &array, 1, 3).unwrap(), 2);
    assert_eq!(next.next_index(&ctx, &array, 2, 3).unwrap(), MAX_SAFE_INTEGER);

    assert_eq!(last.last_index(&ctx, &array, 3).unwrap(), 2);
    assert_eq!(previous.previous_index(&ctx, &array, 2, 3).unwrap(), 1);
    assert_eq!(previous.previous_index(&ctx, &array, 0, 3).unwrap(), -1);
}

#[test]
fn test_first_element_is_reachable_whenever_one_exists() {
    let ctx = ctx();
    let mut first = FirstIndexSite::new();
    let mut has = HasPropertySite::new();

    let targets = [
        array_of(&ctx, &[5]),
        Value::object(Arc::new(JsObject::array(
            &ctx,
            ArrayStorage::holey(vec![None, None, Some(Value::int32(9))]),
            None,
        ))),
    ];
    for target in &targets {
        let length = target
            .as_object()
            .unwrap()
            .with_elements(|s| s.length())
            .unwrap();
        assert!(length > 0);
        let index = first.first_index(&ctx, target, length).unwrap();
        assert!(index < length);
        assert!(has.has(target, &PropertyKey::from_element_index(index)));
    }
}

// ============================================================================
// Holes and prototypes
// ============================================================================

#[test]
fn test_prototype_bridges_hole() {
    let ctx = ctx();
    let proto = Arc::new(JsObject::array_from(&ctx, Vec::new(), None));
    let holey = Value::object(Arc::new(JsObject::array(
        &ctx,
        ArrayStorage::holey(vec![Some(Value::int32(1)), None, Some(Value::int32(3))]),
        Some(proto.clone()),
    )));
    proto.set_element(&ctx, 1, Value::int32(42), false).unwrap();

    let mut first = FirstIndexSite::new();
    let mut next = NextIndexSite::new();
    let mut reads = ElementReadSite::new();

    assert_eq!(first.first_index(&ctx, &holey, 3).unwrap(), 0);
    assert_eq!(next.next_index(&ctx, &holey, 0, 3).unwrap(), 1);
    assert_eq!(reads.get(&holey, 1).unwrap(), Value::int32(42));
}

#[test]
fn test_assumption_invalidation_is_permanent_and_global() {
    let ctx = ctx();
    let proto = Arc::new(JsObject::array_from(&ctx, Vec::new(), None));
    let _child = JsObject::ordinary(&ctx, Some(proto.clone()));
    assert!(ctx.prototypes_have_no_elements());
    proto.set_element(&ctx, 0, Value::int32(1), false).unwrap();
    assert!(!ctx.prototypes_have_no_elements());
    // No re-arming
    proto
        .with_elements_mut(|s| s.delete_element(0, false))
        .unwrap()
        .unwrap();
    assert!(!ctx.prototypes_have_no_elements());
}

// ============================================================================
// Sparse arrays
// ============================================================================

#[test]
fn test_sparse_walk_skips_holes_in_both_directions() {
    let ctx = ctx();
    let mut storage = ArrayStorage::sparse(1_000_000);
    for index in [10, 500, 999_999] {
        storage.set_element(&ctx, index, Value::int32(1), false).unwrap();
    }
    let sparse = Value::object(Arc::new(JsObject::array(&ctx, storage, None)));

    let mut first = FirstIndexSite::new();
    let mut next = NextIndexSite::new();
    let mut last = LastIndexSite::new();
    let mut previous = PreviousIndexSite::new();

    assert_eq!(first.first_index(&ctx, &sparse, 1_000_000).unwrap(), 10);
    assert_eq!(next.next_index(&ctx, &sparse, 10, 1_000_000).unwrap(), 500);
    assert_eq!(last.last_index(&ctx, &sparse, 1_000_000).unwrap(), 999_999);
    assert_eq!(
        previous.previous_index(&ctx, &sparse, 999_999, 1_000_000).unwrap(),
        500
    );
}

// ============================================================================
// Length
// ============================================================================

#[test]
fn test_length_read_across_strategies() {
    let ctx = ctx();
    let mut site = ArrayLengthReadSite::new();
    let dense = array_of(&ctx, &[1, 2, 3]);
    let sparse = Value::object(Arc::new(JsObject::array(
        &ctx,
        ArrayStorage::sparse(7_000_000_000),
        None,
    )));
    assert_eq!(site.length(&dense).unwrap(), Value::int32(3));
    assert_eq!(site.length(&sparse).unwrap(), Value::number(7e9));
}

#[test]
fn test_shrink_through_set_array_length() {
    let ctx = ctx();
    let target = array_of(&ctx, &[1, 2, 3, 4, 5]);
    set_array_length(&ctx, &target, 2.0, true).unwrap();
    let object = target.as_object().unwrap();
    assert_eq!(object.with_elements(|s| s.length()), Some(2));
    assert!(!object.with_elements(|s| s.has_element(4)).unwrap());
}

#[test]
fn test_sealed_shrink_deletes_in_descending_order() {
    let ctx = ctx();
    let target = array_of(&ctx, &[0, 1, 2, 3, 4]);
    target
        .as_object()
        .unwrap()
        .with_elements_mut(|storage| storage.seal());

    let mut visited = Vec::new();
    set_array_length_with(&ctx, &target, 3.0, false, |index| visited.push(index)).unwrap();
    // Indices 4 then 3 were visited, in that order; index 2 untouched
    assert_eq!(visited, vec![4, 3]);
    let object = target.as_object().unwrap();
    assert_eq!(
        object.with_elements(|s| s.get_element(2)),
        Some(Some(Value::int32(2)))
    );
    assert_eq!(object.with_elements(|s| s.length()), Some(3));
}

// ============================================================================
// Generic object walks
// ============================================================================

#[test]
fn test_plain_object_walks_like_an_array() {
    let ctx = ctx();
    let object = Arc::new(JsObject::ordinary(&ctx, None));
    for index in [2_u32, 7] {
        object
            .define_own_property(
                &ctx,
                PropertyKey::index(index),
                Value::int32(index as i32),
                quoll_vm_object::PropertyAttributes::data(),
            )
            .unwrap();
    }
    let target = Value::object(object);

    let mut first = FirstIndexSite::new();
    let mut next = NextIndexSite::new();
    let mut last = LastIndexSite::new();
    assert_eq!(first.first_index(&ctx, &target, 10).unwrap(), 2);
    assert_eq!(next.next_index(&ctx, &target, 2, 10).unwrap(), 7);
    assert_eq!(last.last_index(&ctx, &target, 10).unwrap(), 7);
    // A shorter view hides the tail
    assert_eq!(last.last_index(&ctx, &target, 5).unwrap(), 2);
}
