//! Array length access
//!
//! Length reads split into an integer fast path, valid for strategy
//! kinds that can never report a length beyond 32 bits (everything but
//! Sparse), and a general numeric path covering the full mode range.
//! Cache entries are keyed on strategy kind; stateful strategies always
//! take the general path and install nothing.

use crate::generic::{generic_length, length_value};
use crate::site::{SiteCounters, SiteState, StrategyCache};
use quoll_vm_object::{
    AccessError, AccessResult, ArrayStrategyKind, EngineContext, Value,
};

/// A cached array length read site.
#[derive(Debug, Default)]
pub struct ArrayLengthReadSite {
    cache: StrategyCache,
}

impl ArrayLengthReadSite {
    /// Create an uninitialized site.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the length of `target`. Raises TypeError for targets
    /// without element storage.
    pub fn length(&mut self, target: &Value) -> AccessResult<Value> {
        let Some(object) = target.as_object() else {
            return Err(AccessError::type_error(format!(
                "{} is not an object",
                target.type_name()
            )));
        };
        let Some((kind, stateless, length)) = object
            .with_elements(|storage| (storage.kind(), storage.is_stateless(), storage.length()))
        else {
            return Err(AccessError::type_error("object is not array-like"));
        };
        if !stateless {
            // Stateful strategies (typed views tracking a detachable
            // buffer) always take the general path.
            return Ok(length_value(length));
        }
        if !self.cache.check(kind) {
            return generic_length(target);
        }
        if kind == ArrayStrategyKind::Sparse {
            // General numeric path: sparse lengths may need the full
            // legacy-or-modern range.
            return Ok(length_value(length));
        }
        // Integer fast path: non-sparse strategies keep their length
        // below 2^32.
        debug_assert!(length <= u32::MAX as i64);
        Ok(length_value(length))
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

/// Write an array's length.
pub fn set_array_length(
    ctx: &EngineContext,
    target: &Value,
    new_length: f64,
    strict: bool,
) -> AccessResult<()> {
    set_array_length_with(ctx, target, new_length, strict, |_| {})
}

/// Write an array's length, reporting indices deleted by a sealed
/// shrink to `on_delete` in visit order (descending).
pub fn set_array_length_with(
    ctx: &EngineContext,
    target: &Value,
    new_length: f64,
    strict: bool,
    on_delete: impl FnMut(i64),
) -> AccessResult<()> {
    let Some(object) = target.as_object() else {
        return Err(AccessError::type_error(format!(
            "{} is not an object",
            target.type_name()
        )));
    };
    if new_length.fract() != 0.0
        || new_length < 0.0
        || new_length >= ctx.length_mode().max_length() as f64
    {
        return Err(AccessError::range_error("Invalid array length"));
    }
    object
        .with_elements_mut(|storage| {
            storage.set_length_with(ctx, new_length as i64, strict, on_delete)
        })
        .ok_or_else(|| AccessError::type_error("object is not array-like"))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use quoll_vm_object::{ArrayStorage, JsObject, LengthMode, TypedKind, TypedStorage};
    use std::sync::Arc;

    fn ctx() -> EngineContext {
        EngineContext::default()
    }

    fn dense(ctx: &EngineContext, n: i32) -> Value {
        Value::object(Arc::new(JsObject::array_from(
            ctx,
            (0..n).map(Value::int32).collect(),
            None,
        )))
    }

    #[test]
    fn test_int_fast_path() {
        let ctx = ctx();
        let mut site = ArrayLengthReadSite::new();
        assert_eq!(site.length(&dense(&ctx, 3)).unwrap(), Value::int32(3));
        assert_eq!(site.length(&dense(&ctx, 5)).unwrap(), Value::int32(5));
        assert_eq!(site.counters().installs, 1);
        assert_eq!(site.counters().hits, 1);
    }

    #[test]
    fn test_sparse_general_path() {
        let ctx = ctx();
        let mut site = ArrayLengthReadSite::new();
        let huge = Value::object(Arc::new(JsObject::array(
            &ctx,
            ArrayStorage::sparse(10_000_000_000),
            None,
        )));
        assert_eq!(site.length(&huge).unwrap(), Value::number(1e10));
    }

    #[test]
    fn test_stateful_strategy_not_cached() {
        let ctx = ctx();
        let mut site = ArrayLengthReadSite::new();
        let view = TypedStorage::with_length(TypedKind::Uint8, 16);
        let buffer = view.buffer().clone();
        let typed = Value::object(Arc::new(JsObject::typed_array(
            &ctx,
            ArrayStorage::typed(view),
            None,
        )));
        assert_eq!(site.length(&typed).unwrap(), Value::int32(16));
        assert_eq!(site.state(), SiteState::Uninitialized);
        // Detached buffer reads length 0, it never raises
        buffer.detach();
        assert_eq!(site.length(&typed).unwrap(), Value::int32(0));
    }

    #[test]
    fn test_non_array_raises() {
        let ctx = ctx();
        let mut site = ArrayLengthReadSite::new();
        assert!(site.length(&Value::int32(3)).is_err());
        let plain = Value::object(Arc::new(JsObject::ordinary(&ctx, None)));
        assert!(site.length(&plain).is_err());
    }

    #[test]
    fn test_set_length_range_errors() {
        let ctx = EngineContext::new(LengthMode::Legacy32);
        let target = dense(&ctx, 3);
        assert!(set_array_length(&ctx, &target, 2.5, false).is_err());
        assert!(set_array_length(&ctx, &target, -1.0, false).is_err());
        assert!(set_array_length(&ctx, &target, 4294967296.0, false).is_err());
        set_array_length(&ctx, &target, 2.0, false).unwrap();
        assert_eq!(
            target.as_object().unwrap().with_elements(|s| s.length()),
            Some(2)
        );
    }

    #[test]
    fn test_sealed_shrink_visits_descending() {
        let ctx = ctx();
        let target = dense(&ctx, 5);
        target
            .as_object()
            .unwrap()
            .with_elements_mut(|storage| storage.seal());
        let mut visited = Vec::new();
        set_array_length_with(&ctx, &target, 3.0, false, |index| visited.push(index)).unwrap();
        assert_eq!(visited, vec![4, 3]);
        let object = target.as_object().unwrap();
        assert_eq!(object.with_elements(|s| s.length()), Some(3));
        assert!(object.with_elements(|s| s.has_element(2)).unwrap());
        assert!(!object.with_elements(|s| s.has_element(3)).unwrap());
    }
}
