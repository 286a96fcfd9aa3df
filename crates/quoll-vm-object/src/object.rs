//! Object instances
//!
//! An object owns exactly one current shape reference, replaced
//! wholesale on structural mutation, and a slot vector addressed by the
//! shape's property offsets. Array-like objects additionally own an
//! element storage. Objects are thread-confined; locks exist to satisfy
//! `Send + Sync`, not for cross-thread coordination.

use crate::array::{ArrayStorage, ArrayStrategyKind};
use crate::context::EngineContext;
use crate::error::{AccessError, AccessResult};
use crate::shape::{PropertySlot, Shape, ShapeId};
use crate::value::Value;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Property key (string, symbol, or array index)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String property key
    String(Arc<str>),
    /// Symbol property key
    Symbol(u64),
    /// Integer index (for arrays)
    Index(u32),
}

impl PropertyKey {
    /// Create a string property key, normalizing canonical numeric
    /// strings ("0", "7", but not "07" or "4294967295") to index keys.
    pub fn string(s: &str) -> Self {
        if let Some(index) = canonical_index(s) {
            return Self::Index(index);
        }
        Self::String(Arc::from(s))
    }

    /// Create an index property key
    pub fn index(i: u32) -> Self {
        Self::Index(i)
    }

    /// Key naming element `index`: an index key within the canonical
    /// u32 range, the decimal string key beyond it (modern-mode sparse
    /// arrays index past 2^32).
    pub fn from_element_index(index: i64) -> Self {
        debug_assert!(index >= 0);
        if index < u32::MAX as i64 {
            Self::Index(index as u32)
        } else {
            Self::String(index.to_string().into())
        }
    }

    /// The element index this key names, if any.
    pub fn as_element_index(&self) -> Option<i64> {
        match self {
            Self::Index(i) => Some(*i as i64),
            Self::String(s) => canonical_big_index(s),
            Self::Symbol(_) => None,
        }
    }

    /// True for keys that name an element index.
    pub fn is_element_index(&self) -> bool {
        self.as_element_index().is_some()
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<u32> for PropertyKey {
    fn from(i: u32) -> Self {
        Self::Index(i)
    }
}

/// A canonical array index: the decimal representation of an integer
/// below 2^32 - 1, with no leading zeros.
fn canonical_index(s: &str) -> Option<u32> {
    if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
        return None;
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let parsed: u64 = s.parse().ok()?;
    if parsed < u32::MAX as u64 {
        Some(parsed as u32)
    } else {
        None
    }
}

/// A canonical element index of any magnitude below 2^53 - 1.
fn canonical_big_index(s: &str) -> Option<i64> {
    if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
        return None;
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let parsed: i64 = s.parse().ok()?;
    (parsed < crate::context::MAX_SAFE_INTEGER).then_some(parsed)
}

/// Property attributes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PropertyAttributes {
    /// Property is writable
    pub writable: bool,
    /// Property is enumerable
    pub enumerable: bool,
    /// Property is configurable
    pub configurable: bool,
}

impl PropertyAttributes {
    /// Default data property attributes
    pub const fn data() -> Self {
        Self {
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Enumerable and configurable, but not writable
    pub const fn read_only() -> Self {
        Self {
            writable: false,
            enumerable: true,
            configurable: true,
        }
    }

    /// Non-writable, non-enumerable, non-configurable
    pub const fn frozen() -> Self {
        Self {
            writable: false,
            enumerable: false,
            configurable: false,
        }
    }
}

/// The runtime class of an object, used by classification predicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClassTag {
    /// Plain object
    Ordinary,
    /// Array exotic object
    Array,
    /// Arguments exotic object
    Arguments,
    /// Typed array view
    TypedArray,
}

struct ObjectData {
    shape: Arc<Shape>,
    slots: Vec<Value>,
}

/// A language object: shape-addressed named properties plus optional
/// element storage.
pub struct JsObject {
    data: RwLock<ObjectData>,
    elements: Option<RwLock<ArrayStorage>>,
    prototype: Option<Arc<JsObject>>,
    class: ClassTag,
    extensible: AtomicBool,
    /// Set once the object is installed as another object's prototype;
    /// structural mutations then invalidate shape validity tokens and,
    /// for indexed keys, the global prototype-elements assumption.
    is_prototype: AtomicBool,
}

impl JsObject {
    fn with_parts(
        ctx: &EngineContext,
        class: ClassTag,
        elements: Option<ArrayStorage>,
        prototype: Option<Arc<JsObject>>,
    ) -> Self {
        if let Some(proto) = &prototype {
            proto.mark_as_prototype();
        }
        Self {
            data: RwLock::new(ObjectData {
                shape: Arc::clone(ctx.root_shape(class)),
                slots: Vec::new(),
            }),
            elements: elements.map(RwLock::new),
            prototype,
            class,
            extensible: AtomicBool::new(true),
            is_prototype: AtomicBool::new(false),
        }
    }

    /// Create a plain object.
    pub fn ordinary(ctx: &EngineContext, prototype: Option<Arc<JsObject>>) -> Self {
        Self::with_parts(ctx, ClassTag::Ordinary, None, prototype)
    }

    /// Create an array with the given element storage.
    pub fn array(
        ctx: &EngineContext,
        storage: ArrayStorage,
        prototype: Option<Arc<JsObject>>,
    ) -> Self {
        Self::with_parts(ctx, ClassTag::Array, Some(storage), prototype)
    }

    /// Create an array over dense elements.
    pub fn array_from(
        ctx: &EngineContext,
        values: Vec<Value>,
        prototype: Option<Arc<JsObject>>,
    ) -> Self {
        Self::array(ctx, ArrayStorage::dense(values), prototype)
    }

    /// Create an arguments exotic object.
    pub fn arguments(
        ctx: &EngineContext,
        storage: ArrayStorage,
        prototype: Option<Arc<JsObject>>,
    ) -> Self {
        Self::with_parts(ctx, ClassTag::Arguments, Some(storage), prototype)
    }

    /// Create a typed array view object.
    pub fn typed_array(
        ctx: &EngineContext,
        storage: ArrayStorage,
        prototype: Option<Arc<JsObject>>,
    ) -> Self {
        debug_assert!(matches!(storage.kind(), ArrayStrategyKind::Typed(_)));
        Self::with_parts(ctx, ClassTag::TypedArray, Some(storage), prototype)
    }

    /// The runtime class of this object.
    pub fn class_tag(&self) -> ClassTag {
        self.class
    }

    /// The prototype, if any.
    pub fn prototype(&self) -> Option<&Arc<JsObject>> {
        self.prototype.as_ref()
    }

    /// The current layout descriptor.
    pub fn shape(&self) -> Arc<Shape> {
        Arc::clone(&self.data.read().shape)
    }

    /// Identifier of the current layout descriptor.
    pub fn shape_id(&self) -> ShapeId {
        self.data.read().shape.id()
    }

    /// True while new properties may be added.
    pub fn is_extensible(&self) -> bool {
        self.extensible.load(Ordering::Relaxed)
    }

    /// Forbid adding properties (and elements, if array-like).
    pub fn prevent_extensions(&self) {
        self.extensible.store(false, Ordering::Relaxed);
        if let Some(elements) = &self.elements {
            elements.write().prevent_extensions();
        }
    }

    /// Mark this object as being used as a prototype.
    pub fn mark_as_prototype(&self) {
        self.is_prototype.store(true, Ordering::Relaxed);
    }

    /// True once the object has served as a prototype.
    pub fn is_marked_prototype(&self) -> bool {
        self.is_prototype.load(Ordering::Relaxed)
    }

    /// Look up the slot of an own named property.
    pub fn lookup_own_slot(&self, key: &PropertyKey) -> Option<PropertySlot> {
        self.data.read().shape.get_slot(key)
    }

    /// Read the value stored at `offset`.
    pub fn get_slot_value(&self, offset: usize) -> Value {
        self.data.read().slots[offset].clone()
    }

    /// Overwrite the value stored at `offset` in place. The slot's
    /// shape, and therefore its attributes, are unchanged.
    pub fn set_slot_value(&self, offset: usize, value: Value) {
        self.data.write().slots[offset] = value;
    }

    /// Read an own property: element storage first for index keys, then
    /// the shape-addressed slots.
    pub fn get_own_property(&self, key: &PropertyKey) -> Option<Value> {
        if let Some(index) = key.as_element_index() {
            if let Some(elements) = &self.elements {
                let storage = elements.read();
                if storage.has_element(index) {
                    return storage.get_element(index);
                }
            }
        }
        let data = self.data.read();
        data.shape.get_slot(key).map(|slot| data.slots[slot.offset].clone())
    }

    /// Define an own data property, transitioning the shape when the
    /// key is new or its attributes change.
    pub fn define_own_property(
        &self,
        ctx: &EngineContext,
        key: PropertyKey,
        value: Value,
        attributes: PropertyAttributes,
    ) -> AccessResult<()> {
        if let Some(index) = key.as_element_index() {
            if self.elements.is_some() {
                return self.set_element(ctx, index, value, true);
            }
        }

        let mut data = self.data.write();
        let old_shape = Arc::clone(&data.shape);
        if let Some(slot) = old_shape.get_slot(&key) {
            if slot.attributes == attributes {
                data.slots[slot.offset] = value;
                return Ok(());
            }
            if !slot.attributes.configurable {
                return Err(AccessError::type_error(format!(
                    "Cannot redefine property: {key:?}"
                )));
            }
            data.shape = old_shape.transition_reconfigure(&key, attributes);
            data.slots[slot.offset] = value;
            drop(data);
            self.note_structural_change(ctx, &old_shape, &key);
            return Ok(());
        }

        if !self.is_extensible() {
            return Err(AccessError::type_error(format!(
                "Cannot add property {key:?}, object is not extensible"
            )));
        }
        let new_shape = old_shape.transition_add(key.clone(), attributes);
        debug_assert_eq!(
            new_shape.get_slot(&key).map(|slot| slot.offset),
            Some(data.slots.len())
        );
        data.shape = new_shape;
        data.slots.push(value);
        drop(data);
        self.note_structural_change(ctx, &old_shape, &key);
        Ok(())
    }

    /// Delete an own property. Returns false (or raises, when strict)
    /// for non-configurable properties.
    pub fn delete_property(
        &self,
        ctx: &EngineContext,
        key: &PropertyKey,
        strict: bool,
    ) -> AccessResult<bool> {
        if let Some(index) = key.as_element_index() {
            if let Some(elements) = &self.elements {
                let deleted = elements.write().delete_element(index, strict)?;
                if deleted && self.is_marked_prototype() {
                    ctx.prototype_elements_assumption().invalidate();
                }
                return Ok(deleted);
            }
        }

        let mut data = self.data.write();
        let old_shape = Arc::clone(&data.shape);
        let Some(slot) = old_shape.get_slot(key) else {
            return Ok(true);
        };
        if !slot.attributes.configurable {
            if strict {
                return Err(AccessError::type_error(format!(
                    "Cannot delete property {key:?}"
                )));
            }
            return Ok(false);
        }
        let new_shape = old_shape.transition_remove(key);
        // Offsets were compacted; rebuild the slot vector against the
        // new layout.
        let mut slots = Vec::with_capacity(new_shape.property_count());
        for remaining in new_shape.own_keys() {
            let old_slot = old_shape.get_slot(remaining).expect("key survived removal");
            slots.push(data.slots[old_slot.offset].clone());
        }
        data.shape = new_shape;
        data.slots = slots;
        drop(data);
        self.note_structural_change(ctx, &old_shape, key);
        Ok(true)
    }

    /// True if the object itself has the property (element or named).
    pub fn has_own_property(&self, key: &PropertyKey) -> bool {
        if let Some(index) = key.as_element_index() {
            if let Some(elements) = &self.elements {
                if elements.read().has_element(index) {
                    return true;
                }
            }
        }
        self.data.read().shape.has_property(key)
    }

    /// True if the object or any prototype has the property.
    pub fn has_property(&self, key: &PropertyKey) -> bool {
        let mut current = Some(self);
        while let Some(object) = current {
            if object.has_own_property(key) {
                return true;
            }
            current = object.prototype().map(Arc::as_ref);
        }
        false
    }

    /// Own property keys: element indices in ascending order, then
    /// named keys in insertion order.
    pub fn own_property_keys(&self) -> Vec<PropertyKey> {
        let mut keys = Vec::new();
        if let Some(elements) = &self.elements {
            let storage = elements.read();
            let mut index = storage.first_index();
            let length = storage.length();
            while index < length {
                keys.push(PropertyKey::from_element_index(index));
                index = storage.next_index(index);
            }
        }
        keys.extend(self.data.read().shape.own_keys().iter().cloned());
        keys
    }

    /// True if the object owns element storage.
    pub fn has_elements(&self) -> bool {
        self.elements.is_some()
    }

    /// The current array strategy kind, if array-like.
    pub fn strategy_kind(&self) -> Option<ArrayStrategyKind> {
        self.elements.as_ref().map(|elements| elements.read().kind())
    }

    /// Run `f` against the element storage.
    pub fn with_elements<R>(&self, f: impl FnOnce(&ArrayStorage) -> R) -> Option<R> {
        self.elements.as_ref().map(|elements| f(&elements.read()))
    }

    /// Run `f` against the element storage, mutably.
    pub fn with_elements_mut<R>(&self, f: impl FnOnce(&mut ArrayStorage) -> R) -> Option<R> {
        self.elements.as_ref().map(|elements| f(&mut elements.write()))
    }

    /// Store an element, invalidating the prototype-elements assumption
    /// when this object serves as a prototype.
    pub fn set_element(
        &self,
        ctx: &EngineContext,
        index: i64,
        value: Value,
        strict: bool,
    ) -> AccessResult<()> {
        let Some(elements) = &self.elements else {
            return Err(AccessError::internal("object has no element storage"));
        };
        elements.write().set_element(ctx, index, value, strict)?;
        if self.is_marked_prototype() {
            ctx.prototype_elements_assumption().invalidate();
        }
        Ok(())
    }

    /// Apply a previously derived add transition: swap to `new_shape`
    /// and append the new property's value. The caller guarantees the
    /// object still has the transition's parent shape.
    pub fn apply_add_transition(
        &self,
        ctx: &EngineContext,
        key: &PropertyKey,
        new_shape: &Arc<Shape>,
        value: Value,
    ) {
        let old_shape = {
            let mut data = self.data.write();
            debug_assert!(
                new_shape
                    .parent()
                    .is_some_and(|parent| Arc::ptr_eq(parent, &data.shape)),
                "add transition applied to a receiver with a different shape"
            );
            debug_assert_eq!(
                new_shape.get_slot(key).map(|slot| slot.offset),
                Some(data.slots.len())
            );
            let old_shape = Arc::clone(&data.shape);
            data.shape = Arc::clone(new_shape);
            data.slots.push(value);
            old_shape
        };
        self.note_structural_change(ctx, &old_shape, key);
    }

    fn note_structural_change(&self, ctx: &EngineContext, old_shape: &Shape, key: &PropertyKey) {
        if self.is_marked_prototype() {
            old_shape.validity().invalidate();
            if key.is_element_index() {
                ctx.prototype_elements_assumption().invalidate();
            }
        }
    }
}

impl std::fmt::Debug for JsObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.data.read();
        f.debug_struct("JsObject")
            .field("class", &self.class)
            .field("shape", &data.shape.id())
            .field("properties", &data.shape.property_count())
            .field("array", &self.elements.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> EngineContext {
        EngineContext::default()
    }

    #[test]
    fn test_define_and_get() {
        let ctx = ctx();
        let obj = JsObject::ordinary(&ctx, None);
        obj.define_own_property(
            &ctx,
            PropertyKey::string("foo"),
            Value::int32(42),
            PropertyAttributes::data(),
        )
        .unwrap();
        assert_eq!(
            obj.get_own_property(&PropertyKey::string("foo")),
            Some(Value::int32(42))
        );
    }

    #[test]
    fn test_same_insertion_order_shares_shape() {
        let ctx = ctx();
        let a = JsObject::ordinary(&ctx, None);
        let b = JsObject::ordinary(&ctx, None);
        for obj in [&a, &b] {
            obj.define_own_property(
                &ctx,
                PropertyKey::string("x"),
                Value::int32(1),
                PropertyAttributes::data(),
            )
            .unwrap();
            obj.define_own_property(
                &ctx,
                PropertyKey::string("y"),
                Value::int32(2),
                PropertyAttributes::data(),
            )
            .unwrap();
        }
        assert_eq!(a.shape_id(), b.shape_id());
    }

    #[test]
    fn test_delete_rebuilds_slots() {
        let ctx = ctx();
        let obj = JsObject::ordinary(&ctx, None);
        for (key, val) in [("x", 1), ("y", 2), ("z", 3)] {
            obj.define_own_property(
                &ctx,
                PropertyKey::string(key),
                Value::int32(val),
                PropertyAttributes::data(),
            )
            .unwrap();
        }
        assert!(obj.delete_property(&ctx, &PropertyKey::string("y"), false).unwrap());
        assert_eq!(obj.get_own_property(&PropertyKey::string("y")), None);
        assert_eq!(
            obj.get_own_property(&PropertyKey::string("z")),
            Some(Value::int32(3))
        );
    }

    #[test]
    fn test_non_extensible_define_raises() {
        let ctx = ctx();
        let obj = JsObject::ordinary(&ctx, None);
        obj.prevent_extensions();
        let err = obj
            .define_own_property(
                &ctx,
                PropertyKey::string("x"),
                Value::int32(1),
                PropertyAttributes::data(),
            )
            .unwrap_err();
        assert!(err.is_type_error());
    }

    #[test]
    fn test_prototype_chain_has() {
        let ctx = ctx();
        let proto = Arc::new(JsObject::ordinary(&ctx, None));
        proto
            .define_own_property(
                &ctx,
                PropertyKey::string("inherited"),
                Value::int32(1),
                PropertyAttributes::data(),
            )
            .unwrap();
        let obj = JsObject::ordinary(&ctx, Some(proto));
        assert!(obj.has_property(&PropertyKey::string("inherited")));
        assert!(!obj.has_own_property(&PropertyKey::string("inherited")));
    }

    #[test]
    fn test_indexed_prototype_mutation_invalidates_assumption() {
        let ctx = ctx();
        let proto = Arc::new(JsObject::array_from(&ctx, Vec::new(), None));
        let _obj = JsObject::ordinary(&ctx, Some(proto.clone()));
        assert!(ctx.prototypes_have_no_elements());
        proto.set_element(&ctx, 0, Value::int32(1), false).unwrap();
        assert!(!ctx.prototypes_have_no_elements());
    }

    #[test]
    fn test_prototype_structural_change_invalidates_shape() {
        let ctx = ctx();
        let proto = Arc::new(JsObject::ordinary(&ctx, None));
        let _obj = JsObject::ordinary(&ctx, Some(proto.clone()));
        let shape_before = proto.shape();
        assert!(shape_before.is_valid());
        proto
            .define_own_property(
                &ctx,
                PropertyKey::string("x"),
                Value::int32(1),
                PropertyAttributes::data(),
            )
            .unwrap();
        assert!(!shape_before.is_valid());
    }

    #[test]
    fn test_key_normalization() {
        assert_eq!(PropertyKey::string("7"), PropertyKey::Index(7));
        assert_eq!(PropertyKey::string("07"), PropertyKey::String(Arc::from("07")));
        assert_eq!(
            PropertyKey::string("4294967295"),
            PropertyKey::String(Arc::from("4294967295"))
        );
        assert_eq!(PropertyKey::string("4294967294"), PropertyKey::Index(4294967294));
    }

    #[test]
    fn test_own_property_keys_order() {
        let ctx = ctx();
        let obj = JsObject::array_from(&ctx, vec![Value::int32(1), Value::int32(2)], None);
        obj.define_own_property(
            &ctx,
            PropertyKey::string("name"),
            Value::string("arr"),
            PropertyAttributes::data(),
        )
        .unwrap();
        let keys = obj.own_property_keys();
        assert_eq!(
            keys,
            vec![
                PropertyKey::Index(0),
                PropertyKey::Index(1),
                PropertyKey::string("name"),
            ]
        );
    }
}
