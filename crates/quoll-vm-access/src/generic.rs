//! Generic, always-correct access paths
//!
//! Every cache chain terminates here: explicit runtime dispatch over
//! key kinds and storage variants, no cache state, linear in property
//! count or chain depth in the worst case. Also serves uninitialized
//! sites and everything the specialized paths refuse to cache.

use quoll_vm_object::{
    AccessError, AccessResult, EngineContext, JsObject, PropertyAttributes, PropertyKey, Value,
};
use std::sync::Arc;

pub(crate) fn not_coercible(key: &PropertyKey, target: &Value) -> AccessError {
    AccessError::type_error(format!(
        "Cannot read properties of {} (reading {key:?})",
        target.type_name()
    ))
}

/// Generic property read: element storage first for index keys, then
/// shape-addressed slots, then the prototype chain.
pub fn generic_get(target: &Value, key: &PropertyKey) -> AccessResult<Value> {
    if target.is_nullish() {
        return Err(not_coercible(key, target));
    }
    let Some(object) = target.as_object() else {
        // No wrapper objects in scope; primitives expose no properties.
        return Ok(Value::undefined());
    };
    Ok(generic_get_on_object(object, key))
}

pub(crate) fn generic_get_on_object(object: &Arc<JsObject>, key: &PropertyKey) -> Value {
    let mut current = Some(object);
    while let Some(obj) = current {
        if let Some(value) = obj.get_own_property(key) {
            return value;
        }
        current = obj.prototype();
    }
    Value::undefined()
}

/// Generic property write.
///
/// Own writable slots are overwritten in place; absent keys become new
/// own data properties unless a non-writable property anywhere on the
/// chain blocks the assignment or the receiver is not extensible.
/// Writing an absent key to a non-extensible object always raises, and
/// the object is unchanged.
pub fn generic_set(
    ctx: &EngineContext,
    target: &Value,
    key: &PropertyKey,
    value: Value,
    strict: bool,
) -> AccessResult<()> {
    if target.is_nullish() {
        return Err(AccessError::type_error(format!(
            "Cannot set properties of {} (setting {key:?})",
            target.type_name()
        )));
    }
    let Some(object) = target.as_object() else {
        if strict {
            return Err(AccessError::type_error(format!(
                "Cannot create property {key:?} on {}",
                target.type_name()
            )));
        }
        return Ok(());
    };

    if let Some(index) = key.as_element_index() {
        if object.has_elements() {
            return object.set_element(ctx, index, value, strict);
        }
    }

    if let Some(slot) = object.lookup_own_slot(key) {
        if slot.attributes.writable {
            object.set_slot_value(slot.offset, value);
            return Ok(());
        }
        if strict {
            return Err(AccessError::type_error(format!(
                "Cannot assign to read only property {key:?}"
            )));
        }
        return Ok(());
    }

    // Absent own property: an inherited non-writable data property
    // blocks the assignment.
    let mut current = object.prototype();
    while let Some(proto) = current {
        if let Some(index) = key.as_element_index() {
            if proto.with_elements(|s| s.has_element(index)).unwrap_or(false) {
                break; // inherited elements never block
            }
        }
        if let Some(slot) = proto.lookup_own_slot(key) {
            if !slot.attributes.writable {
                if strict {
                    return Err(AccessError::type_error(format!(
                        "Cannot assign to read only property {key:?}"
                    )));
                }
                return Ok(());
            }
            break;
        }
        current = proto.prototype();
    }

    if !object.is_extensible() {
        return Err(AccessError::type_error(format!(
            "Cannot add property {key:?}, object is not extensible"
        )));
    }
    object.define_own_property(ctx, key.clone(), value, PropertyAttributes::data())
}

/// Generic `in`-style membership test over the prototype chain.
pub fn generic_has(target: &Value, key: &PropertyKey) -> bool {
    match target.as_object() {
        Some(object) => object.has_property(key),
        None => false,
    }
}

/// Generic array length read.
pub fn generic_length(target: &Value) -> AccessResult<Value> {
    let object = target
        .as_object()
        .ok_or_else(|| AccessError::type_error(format!("{} is not an object", target.type_name())))?;
    let length = object
        .with_elements(|storage| storage.length())
        .ok_or_else(|| AccessError::type_error("object is not array-like"))?;
    Ok(length_value(length))
}

/// The property key naming element `index`. Negative indices are not
/// element indices, they name ordinary string properties.
pub(crate) fn element_key(index: i64) -> PropertyKey {
    if index >= 0 {
        PropertyKey::from_element_index(index)
    } else {
        PropertyKey::String(index.to_string().into())
    }
}

/// Represent a length as a value: int32 when it fits, double otherwise.
pub(crate) fn length_value(length: i64) -> Value {
    if let Ok(small) = i32::try_from(length) {
        Value::int32(small)
    } else {
        Value::number(length as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quoll_vm_object::ArrayStorage;

    fn ctx() -> EngineContext {
        EngineContext::default()
    }

    #[test]
    fn test_get_on_nullish_raises() {
        assert!(generic_get(&Value::undefined(), &PropertyKey::string("x")).is_err());
        assert!(generic_get(&Value::null(), &PropertyKey::string("x")).is_err());
    }

    #[test]
    fn test_get_on_primitive_is_undefined() {
        let value = generic_get(&Value::int32(1), &PropertyKey::string("x")).unwrap();
        assert!(value.is_undefined());
    }

    #[test]
    fn test_set_then_get_round_trip() {
        let ctx = ctx();
        let target = Value::object(Arc::new(JsObject::ordinary(&ctx, None)));
        let key = PropertyKey::string("x");
        generic_set(&ctx, &target, &key, Value::int32(5), true).unwrap();
        assert_eq!(generic_get(&target, &key).unwrap(), Value::int32(5));
    }

    #[test]
    fn test_non_extensible_absent_raises_and_object_unchanged() {
        let ctx = ctx();
        let object = Arc::new(JsObject::ordinary(&ctx, None));
        object.prevent_extensions();
        let target = Value::object(object.clone());
        let key = PropertyKey::string("x");
        assert!(generic_set(&ctx, &target, &key, Value::int32(1), false).is_err());
        assert!(!object.has_own_property(&key));
    }

    #[test]
    fn test_inherited_read_only_blocks_strict_write() {
        let ctx = ctx();
        let proto = Arc::new(JsObject::ordinary(&ctx, None));
        proto
            .define_own_property(
                &ctx,
                PropertyKey::string("x"),
                Value::int32(1),
                PropertyAttributes::read_only(),
            )
            .unwrap();
        let target = Value::object(Arc::new(JsObject::ordinary(&ctx, Some(proto))));
        let err = generic_set(&ctx, &target, &PropertyKey::string("x"), Value::int32(2), true);
        assert!(err.is_err());
        // Sloppy mode: silent, no own property created
        generic_set(&ctx, &target, &PropertyKey::string("x"), Value::int32(2), false).unwrap();
        assert!(
            !target
                .as_object()
                .unwrap()
                .has_own_property(&PropertyKey::string("x"))
        );
    }

    #[test]
    fn test_element_get_through_prototype() {
        let ctx = ctx();
        let proto = Arc::new(JsObject::array_from(&ctx, vec![Value::int32(7)], None));
        let target = Value::object(Arc::new(JsObject::ordinary(&ctx, Some(proto))));
        assert_eq!(
            generic_get(&target, &PropertyKey::index(0)).unwrap(),
            Value::int32(7)
        );
    }

    #[test]
    fn test_generic_length() {
        let ctx = ctx();
        let target = Value::object(Arc::new(JsObject::array(
            &ctx,
            ArrayStorage::sparse(5_000_000_000),
            None,
        )));
        assert_eq!(generic_length(&target).unwrap(), Value::number(5e9));
        let plain = Value::object(Arc::new(JsObject::ordinary(&ctx, None)));
        assert!(generic_length(&plain).is_err());
    }
}
