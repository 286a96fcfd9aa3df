//! Layout descriptors (shapes) for property access optimization.
//!
//! A Shape describes the structure of an object: which properties it
//! has, at which slots they are stored, and with which attributes.
//! Shapes are shared between objects with the same structure using a
//! transition tree and are immutable once created. Every shape carries
//! a validity assumption that caches relying on global invariants of
//! the shape (e.g. "this key is absent from every object with this
//! shape") can guard on.

use crate::assumption::Assumption;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::object::{ClassTag, PropertyAttributes, PropertyKey};

/// Process-unique shape identifier, usable as a cache key.
pub type ShapeId = u64;

static NEXT_SHAPE_ID: AtomicU64 = AtomicU64::new(1);

/// A property's storage slot and attributes within a shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PropertySlot {
    /// Index into the object's slot vector.
    pub offset: usize,
    /// Attribute flags.
    pub attributes: PropertyAttributes,
}

/// The structural mutation an edge in the transition tree stands for.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum TransitionKey {
    Add(PropertyKey, PropertyAttributes),
    Remove(PropertyKey),
    Reconfigure(PropertyKey, PropertyAttributes),
}

/// A Shape defines the layout of properties in an object.
pub struct Shape {
    id: ShapeId,

    /// The runtime class of objects carrying this shape. Fixed per
    /// transition tree: shape identity implies the class, which is what
    /// makes shape-keyed classification sound.
    class: ClassTag,

    /// The parent shape from which this shape was transitioned.
    /// None for the root (empty) shape.
    parent: Option<Arc<Shape>>,

    /// Transitions from this shape to child shapes.
    /// Weak to break cycles: child -> parent (Arc), parent -> child (Weak).
    /// RefCell since transitions are not on the cached fast path.
    transitions: RefCell<FxHashMap<TransitionKey, Weak<Shape>>>,

    /// All property slots in this shape (inherited + own).
    property_map: FxHashMap<PropertyKey, PropertySlot>,

    /// Keys in insertion order, for enumeration.
    keys_ordered: Vec<PropertyKey>,

    /// Validity token. Invalidated when a global invariant that caches
    /// derived from this shape is broken by a mutation elsewhere.
    validity: Arc<Assumption>,
}

// SAFETY: Shape is only accessed from a single VM thread.
// RefCell is !Sync, but our VM is thread-confined.
unsafe impl Send for Shape {}
unsafe impl Sync for Shape {}

impl Shape {
    /// Create a new root (empty) shape for objects of `class`.
    pub fn root(class: ClassTag) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_SHAPE_ID.fetch_add(1, Ordering::Relaxed),
            class,
            parent: None,
            transitions: RefCell::new(FxHashMap::default()),
            property_map: FxHashMap::default(),
            keys_ordered: Vec::new(),
            validity: Assumption::new("shape validity"),
        })
    }

    fn derive(self: &Arc<Self>, key: TransitionKey) -> Arc<Self> {
        {
            let transitions = self.transitions.borrow();
            if let Some(weak) = transitions.get(&key) {
                if let Some(shape) = weak.upgrade() {
                    return shape;
                }
            }
        }

        let mut transitions = self.transitions.borrow_mut();

        // Double-check after acquiring mutable borrow
        if let Some(weak) = transitions.get(&key) {
            if let Some(shape) = weak.upgrade() {
                return shape;
            }
        }

        let (property_map, keys_ordered) = match &key {
            TransitionKey::Add(k, attrs) => {
                let mut map = self.property_map.clone();
                map.insert(
                    k.clone(),
                    PropertySlot {
                        offset: self.keys_ordered.len(),
                        attributes: *attrs,
                    },
                );
                let mut keys = self.keys_ordered.clone();
                keys.push(k.clone());
                (map, keys)
            }
            TransitionKey::Remove(k) => {
                // Offsets are compacted; the owner rebuilds its slot
                // vector against the new layout.
                let mut keys = self.keys_ordered.clone();
                keys.retain(|existing| existing != k);
                let mut map = FxHashMap::default();
                for (offset, existing) in keys.iter().enumerate() {
                    let old = self.property_map[existing];
                    map.insert(
                        existing.clone(),
                        PropertySlot {
                            offset,
                            attributes: old.attributes,
                        },
                    );
                }
                (map, keys)
            }
            TransitionKey::Reconfigure(k, attrs) => {
                let mut map = self.property_map.clone();
                let slot = map.get_mut(k).expect("reconfigured key must exist");
                slot.attributes = *attrs;
                (map, self.keys_ordered.clone())
            }
        };

        let new_shape = Arc::new(Self {
            id: NEXT_SHAPE_ID.fetch_add(1, Ordering::Relaxed),
            class: self.class,
            parent: Some(Arc::clone(self)),
            transitions: RefCell::new(FxHashMap::default()),
            property_map,
            keys_ordered,
            validity: Assumption::new("shape validity"),
        });

        transitions.insert(key, Arc::downgrade(&new_shape));
        new_shape
    }

    /// Find or create the transition adding `key` with `attributes`.
    pub fn transition_add(
        self: &Arc<Self>,
        key: PropertyKey,
        attributes: PropertyAttributes,
    ) -> Arc<Self> {
        debug_assert!(!self.property_map.contains_key(&key));
        self.derive(TransitionKey::Add(key, attributes))
    }

    /// Find or create the transition removing `key`.
    pub fn transition_remove(self: &Arc<Self>, key: &PropertyKey) -> Arc<Self> {
        debug_assert!(self.property_map.contains_key(key));
        self.derive(TransitionKey::Remove(key.clone()))
    }

    /// Find or create the transition changing `key`'s attributes.
    pub fn transition_reconfigure(
        self: &Arc<Self>,
        key: &PropertyKey,
        attributes: PropertyAttributes,
    ) -> Arc<Self> {
        debug_assert!(self.property_map.contains_key(key));
        self.derive(TransitionKey::Reconfigure(key.clone(), attributes))
    }

    /// Process-unique identifier of this shape.
    pub fn id(&self) -> ShapeId {
        self.id
    }

    /// The runtime class of objects carrying this shape.
    pub fn class_tag(&self) -> ClassTag {
        self.class
    }

    /// The parent this shape was transitioned from, if any.
    pub fn parent(&self) -> Option<&Arc<Shape>> {
        self.parent.as_ref()
    }

    /// Get the slot of a property key in this shape.
    pub fn get_slot(&self, key: &PropertyKey) -> Option<PropertySlot> {
        self.property_map.get(key).copied()
    }

    /// True if this shape has a property at `key`.
    pub fn has_property(&self, key: &PropertyKey) -> bool {
        self.property_map.contains_key(key)
    }

    /// All own property keys in insertion order.
    pub fn own_keys(&self) -> &[PropertyKey] {
        &self.keys_ordered
    }

    /// The number of properties defined in this shape.
    pub fn property_count(&self) -> usize {
        self.property_map.len()
    }

    /// The validity token caches guard on.
    pub fn validity(&self) -> &Arc<Assumption> {
        &self.validity
    }

    /// Shorthand for `validity().is_valid()`.
    pub fn is_valid(&self) -> bool {
        self.validity.is_valid()
    }
}

impl std::fmt::Debug for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shape")
            .field("id", &self.id)
            .field("property_count", &self.property_count())
            .field("valid", &self.is_valid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs() -> PropertyAttributes {
        PropertyAttributes::data()
    }

    fn root() -> Arc<Shape> {
        Shape::root(ClassTag::Ordinary)
    }

    #[test]
    fn test_transitions_are_shared() {
        let root = root();
        let a = root.transition_add(PropertyKey::string("x"), attrs());
        let b = root.transition_add(PropertyKey::string("x"), attrs());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_distinct_paths_distinct_shapes() {
        let root = root();
        let a = root.transition_add(PropertyKey::string("x"), attrs());
        let b = root.transition_add(PropertyKey::string("y"), attrs());
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_offsets_follow_insertion_order() {
        let root = root();
        let s = root
            .transition_add(PropertyKey::string("x"), attrs())
            .transition_add(PropertyKey::string("y"), attrs());
        assert_eq!(s.get_slot(&PropertyKey::string("x")).unwrap().offset, 0);
        assert_eq!(s.get_slot(&PropertyKey::string("y")).unwrap().offset, 1);
        assert_eq!(s.own_keys().len(), 2);
    }

    #[test]
    fn test_remove_compacts_offsets() {
        let root = root();
        let s = root
            .transition_add(PropertyKey::string("x"), attrs())
            .transition_add(PropertyKey::string("y"), attrs())
            .transition_add(PropertyKey::string("z"), attrs());
        let removed = s.transition_remove(&PropertyKey::string("y"));
        assert_eq!(removed.property_count(), 2);
        assert_eq!(
            removed.get_slot(&PropertyKey::string("z")).unwrap().offset,
            1
        );
        assert!(!removed.has_property(&PropertyKey::string("y")));
    }

    #[test]
    fn test_reconfigure_keeps_offsets() {
        let root = root();
        let s = root.transition_add(PropertyKey::string("x"), attrs());
        let frozen = s.transition_reconfigure(
            &PropertyKey::string("x"),
            PropertyAttributes::read_only(),
        );
        assert!(!Arc::ptr_eq(&s, &frozen));
        assert_eq!(frozen.get_slot(&PropertyKey::string("x")).unwrap().offset, 0);
        assert!(
            !frozen
                .get_slot(&PropertyKey::string("x"))
                .unwrap()
                .attributes
                .writable
        );
    }
}
