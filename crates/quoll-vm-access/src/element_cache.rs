//! Array element access caches
//!
//! Indexed reads and writes specialized per storage strategy kind, with
//! the usual depth-4 bound. The fast path asks the strategy for the
//! element and falls back to the generic object lookup when the
//! strategy reports no element at the index: integer-named properties
//! may be defined directly on the object or inherited.

use crate::generic::{element_key, generic_get_on_object, generic_set};
use crate::site::{SiteCounters, SiteState, StrategyCache};
use quoll_vm_object::{AccessError, AccessResult, EngineContext, Value};

/// An indexed element read site.
#[derive(Debug, Default)]
pub struct ElementReadSite {
    cache: StrategyCache,
}

impl ElementReadSite {
    /// Create an uninitialized site.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read element `index` of `target`.
    pub fn get(&mut self, target: &Value, index: i64) -> AccessResult<Value> {
        if target.is_nullish() {
            return Err(AccessError::type_error(format!(
                "Cannot read properties of {} (reading {index})",
                target.type_name()
            )));
        }
        let Some(object) = target.as_object() else {
            return Ok(Value::undefined());
        };
        let fast = object
            .with_elements(|storage| {
                (storage.is_stateless() && self.cache.check(storage.kind()))
                    .then(|| {
                        if storage.has_element(index) {
                            storage.get_element(index)
                        } else {
                            None
                        }
                    })
            })
            .flatten();
        match fast {
            Some(Some(value)) => Ok(value),
            // Strategy had no element there; the index may still name
            // an own or inherited property.
            Some(None) | None => Ok(generic_get_on_object(object, &element_key(index))),
        }
    }

    /// Current tier of this site.
    pub fn state(&self) -> SiteState {
        self.cache.state()
    }

    /// Hit/install counters.
    pub fn counters(&self) -> SiteCounters {
        self.cache.counters()
    }
}

/// An indexed element write site.
#[derive(Debug, Default)]
pub struct ElementWriteSite {
    cache: StrategyCache,
}

impl ElementWriteSite {
    /// Create an uninitialized site.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write element `index` of `target`.
    pub fn set(
        &mut self,
        ctx: &EngineContext,
        target: &Value,
        index: i64,
        value: Value,
        strict: bool,
    ) -> AccessResult<()> {
        if target.is_nullish() {
            return Err(AccessError::type_error(format!(
                "Cannot set properties of {} (setting {index})",
                target.type_name()
            )));
        }
        let Some(object) = target.as_object() else {
            return generic_set(ctx, target, &element_key(index), value, strict);
        };
        let fast = object
            .with_elements(|storage| storage.is_stateless() && self.cache.check(storage.kind()))
            .unwrap_or(false);
        if fast {
            return object.set_element(ctx, index, value, strict);
        }
        generic_set(ctx, target, &element_key(index), value, strict)
    }

    /// Current tier of this site.
    pub fn state(&self) -> SiteState {
        self.cache.state()
    }

    /// Hit/install counters.
    pub fn counters(&self) -> SiteCounters {
        self.cache.counters()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quoll_vm_object::{ArrayStorage, JsObject, TypedKind, TypedStorage};
    use std::sync::Arc;

    fn ctx() -> EngineContext {
        EngineContext::default()
    }

    #[test]
    fn test_read_write_round_trip() {
        let ctx = ctx();
        let mut reads = ElementReadSite::new();
        let mut writes = ElementWriteSite::new();
        let array = Value::object(Arc::new(JsObject::array_from(
            &ctx,
            vec![Value::int32(1), Value::int32(2)],
            None,
        )));
        writes.set(&ctx, &array, 1, Value::int32(9), true).unwrap();
        assert_eq!(reads.get(&array, 1).unwrap(), Value::int32(9));
        assert!(reads.get(&array, 5).unwrap().is_undefined());
    }

    #[test]
    fn test_hole_falls_back_to_prototype() {
        let ctx = ctx();
        let mut reads = ElementReadSite::new();
        let proto = Arc::new(JsObject::array_from(
            &ctx,
            vec![Value::int32(0), Value::int32(111)],
            None,
        ));
        let holey = Value::object(Arc::new(JsObject::array(
            &ctx,
            ArrayStorage::holey(vec![Some(Value::int32(1)), None, Some(Value::int32(3))]),
            Some(proto),
        )));
        assert_eq!(reads.get(&holey, 1).unwrap(), Value::int32(111));
    }

    #[test]
    fn test_detached_typed_read_is_undefined() {
        let ctx = ctx();
        let mut reads = ElementReadSite::new();
        let view = TypedStorage::with_length(TypedKind::Int32, 4);
        let buffer = view.buffer().clone();
        let typed = Value::object(Arc::new(JsObject::typed_array(
            &ctx,
            ArrayStorage::typed(view),
            None,
        )));
        assert_eq!(reads.get(&typed, 0).unwrap(), Value::number(0.0));
        buffer.detach();
        assert!(reads.get(&typed, 0).unwrap().is_undefined());
        // Stateful strategy: nothing was installed
        assert_eq!(reads.state(), SiteState::Uninitialized);
    }

    #[test]
    fn test_representation_transition_respecializes() {
        let ctx = ctx();
        let mut reads = ElementReadSite::new();
        let array = Value::object(Arc::new(JsObject::array_from(
            &ctx,
            vec![Value::int32(1), Value::int32(2), Value::int32(3)],
            None,
        )));
        assert_eq!(reads.get(&array, 0).unwrap(), Value::int32(1));
        assert_eq!(reads.state(), SiteState::Monomorphic);

        // Deleting an element moves the array to the holey
        // representation; the dense guard misses and a second entry is
        // installed.
        array
            .as_object()
            .unwrap()
            .with_elements_mut(|storage| storage.delete_element(1, false))
            .unwrap()
            .unwrap();
        assert!(reads.get(&array, 1).unwrap().is_undefined());
        assert_eq!(reads.get(&array, 2).unwrap(), Value::int32(3));
        assert_eq!(reads.state(), SiteState::Polymorphic(2));
    }

    #[test]
    fn test_plain_object_indexed_property() {
        let ctx = ctx();
        let mut reads = ElementReadSite::new();
        let mut writes = ElementWriteSite::new();
        let plain = Value::object(Arc::new(JsObject::ordinary(&ctx, None)));
        writes.set(&ctx, &plain, 3, Value::int32(7), true).unwrap();
        assert_eq!(reads.get(&plain, 3).unwrap(), Value::int32(7));
        assert_eq!(reads.state(), SiteState::Uninitialized);
    }
}
