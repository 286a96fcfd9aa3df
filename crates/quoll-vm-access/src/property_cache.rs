//! Property access cache chains
//!
//! A call site owns an ordered, depth-bounded chain of guarded
//! specialized accessors: reads allow two entries, writes one. Each
//! entry binds a property key and, through its guard, the receiver's
//! layout descriptor; numeric-index keys use a separate accessor family
//! that consults the array storage strategy before the descriptor.
//! First match wins. A miss beyond the depth bound discards the chain
//! and pins the site to the generic fallback for good.

use crate::generic::{generic_get_on_object, generic_has, generic_set, not_coercible};
use crate::site::{
    PROPERTY_READ_CACHE_LIMIT, PROPERTY_WRITE_CACHE_LIMIT, SiteCounters, SiteState,
};
use arrayvec::ArrayVec;
use quoll_vm_object::{
    AccessError, AccessResult, ArrayStrategyKind, EngineContext, JsObject, PropertyAttributes,
    PropertyKey, PropertySlot, Shape, Value,
};
use smallvec::SmallVec;
use std::sync::Arc;

/// Prototype chain shapes recorded when an entry was installed.
type ChainShapes = SmallVec<[Arc<Shape>; 4]>;

/// Check that the receiver's prototype chain still goes through the
/// recorded shapes and that none of their validity tokens has been
/// invalidated. Prototype links are fixed at construction, so shape
/// identity per level is the only thing that can drift.
fn chain_matches(object: &JsObject, expected: &[Arc<Shape>]) -> bool {
    let mut current = object.prototype().cloned();
    for recorded in expected {
        if !recorded.is_valid() {
            return false;
        }
        let Some(proto) = current else {
            return false;
        };
        if !Arc::ptr_eq(&proto.shape(), recorded) {
            return false;
        }
        current = proto.prototype().cloned();
    }
    true
}

fn collect_chain_and_holder(
    object: &Arc<JsObject>,
    key: &PropertyKey,
) -> Result<(ChainShapes, Option<(Arc<JsObject>, PropertySlot)>), ()> {
    let mut chain = ChainShapes::new();
    let mut current = object.prototype().cloned();
    while let Some(proto) = current {
        if key.is_element_index() && proto.has_elements() {
            // Element values live in storage, not slots; uncacheable.
            return Err(());
        }
        let proto_shape = proto.shape();
        chain.push(Arc::clone(&proto_shape));
        if let Some(slot) = proto_shape.get_slot(key) {
            return Ok((chain, Some((Arc::clone(&proto), slot))));
        }
        current = proto.prototype().cloned();
    }
    Ok((chain, None))
}

/// A specialized read accessor plus its guard.
enum GetEntry {
    /// Own data slot at a fixed offset
    Own {
        key: PropertyKey,
        shape: Arc<Shape>,
        offset: usize,
    },
    /// Data slot found on a prototype
    Proto {
        key: PropertyKey,
        shape: Arc<Shape>,
        chain: ChainShapes,
        holder: Arc<JsObject>,
        offset: usize,
    },
    /// Key absent from the receiver and its whole chain
    Absent {
        key: PropertyKey,
        shape: Arc<Shape>,
        chain: ChainShapes,
    },
    /// Numeric-index family: consult the array storage first
    Element { kind: ArrayStrategyKind },
}

impl GetEntry {
    fn matches(&self, object: &Arc<JsObject>, key: &PropertyKey) -> bool {
        match self {
            GetEntry::Own {
                key: bound, shape, ..
            } => bound == key && Arc::ptr_eq(&object.shape(), shape),
            GetEntry::Proto {
                key: bound,
                shape,
                chain,
                ..
            } => {
                bound == key
                    && Arc::ptr_eq(&object.shape(), shape)
                    && shape.is_valid()
                    && chain_matches(object, chain)
            }
            GetEntry::Absent {
                key: bound,
                shape,
                chain,
            } => {
                bound == key
                    && Arc::ptr_eq(&object.shape(), shape)
                    && shape.is_valid()
                    && chain_matches(object, chain)
            }
            GetEntry::Element { kind } => {
                key.is_element_index()
                    && object
                        .with_elements(|storage| {
                            storage.kind() == *kind && storage.is_stateless()
                        })
                        .unwrap_or(false)
            }
        }
    }

    fn read(&self, object: &Arc<JsObject>, key: &PropertyKey) -> Value {
        match self {
            GetEntry::Own { offset, .. } => object.get_slot_value(*offset),
            GetEntry::Proto { holder, offset, .. } => holder.get_slot_value(*offset),
            GetEntry::Absent { .. } => Value::undefined(),
            GetEntry::Element { .. } => {
                let Some(index) = key.as_element_index() else {
                    // Guard admitted a non-index key: cache install
                    // logic is unsound.
                    debug_assert!(false, "element entry matched a non-index key");
                    return generic_get_on_object(object, key);
                };
                let fast = object
                    .with_elements(|storage| {
                        if storage.has_element(index) {
                            storage.get_element(index)
                        } else {
                            None
                        }
                    })
                    .flatten();
                // Integer-named properties may also live on the object
                // itself or be inherited.
                fast.unwrap_or_else(|| generic_get_on_object(object, key))
            }
        }
    }

    fn test(&self, object: &Arc<JsObject>, key: &PropertyKey) -> bool {
        match self {
            GetEntry::Own { .. } | GetEntry::Proto { .. } => true,
            GetEntry::Absent { .. } => false,
            GetEntry::Element { .. } => {
                let Some(index) = key.as_element_index() else {
                    debug_assert!(false, "element entry matched a non-index key");
                    return object.has_property(key);
                };
                object
                    .with_elements(|storage| storage.has_element(index))
                    .unwrap_or(false)
                    || object.has_property(key)
            }
        }
    }
}

fn derive_get_entry(object: &Arc<JsObject>, key: &PropertyKey) -> Option<GetEntry> {
    if key.is_element_index() && object.has_elements() {
        return object
            .with_elements(|storage| {
                storage
                    .is_stateless()
                    .then(|| GetEntry::Element { kind: storage.kind() })
            })
            .flatten();
    }
    let shape = object.shape();
    if let Some(slot) = shape.get_slot(key) {
        return Some(GetEntry::Own {
            key: key.clone(),
            shape,
            offset: slot.offset,
        });
    }
    let (chain, holder) = collect_chain_and_holder(object, key).ok()?;
    match holder {
        Some((holder, slot)) => Some(GetEntry::Proto {
            key: key.clone(),
            shape,
            chain,
            holder,
            offset: slot.offset,
        }),
        None => Some(GetEntry::Absent {
            key: key.clone(),
            shape,
            chain,
        }),
    }
}

/// A keyed property read site.
#[derive(Default)]
pub struct PropertyGetSite {
    entries: ArrayVec<GetEntry, PROPERTY_READ_CACHE_LIMIT>,
    megamorphic: bool,
    counters: SiteCounters,
}

impl PropertyGetSite {
    /// Create an uninitialized site.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `key` from `target`.
    ///
    /// Raises TypeError for undefined/null receivers; other primitives
    /// yield undefined (no wrapper objects in scope).
    pub fn get(&mut self, target: &Value, key: &PropertyKey) -> AccessResult<Value> {
        if target.is_nullish() {
            return Err(not_coercible(key, target));
        }
        let Some(object) = target.as_object() else {
            return Ok(Value::undefined());
        };
        if self.megamorphic {
            return Ok(generic_get_on_object(object, key));
        }
        for entry in &self.entries {
            if entry.matches(object, key) {
                self.counters.record_hit();
                return Ok(entry.read(object, key));
            }
        }
        if self.entries.is_full() {
            tracing::debug!(?key, "property read site went megamorphic");
            self.entries.clear();
            self.megamorphic = true;
            return Ok(generic_get_on_object(object, key));
        }
        match derive_get_entry(object, key) {
            Some(entry) => {
                self.counters.record_install();
                let value = entry.read(object, key);
                self.entries.push(entry);
                Ok(value)
            }
            None => Ok(generic_get_on_object(object, key)),
        }
    }

    /// Current tier of this site.
    pub fn state(&self) -> SiteState {
        SiteState::of(self.entries.len(), self.megamorphic)
    }

    /// Hit/install counters.
    pub fn counters(&self) -> SiteCounters {
        self.counters
    }
}

/// A keyed property membership site (`key in target`), riding the same
/// guard machinery as reads.
#[derive(Default)]
pub struct HasPropertySite {
    entries: ArrayVec<GetEntry, PROPERTY_READ_CACHE_LIMIT>,
    megamorphic: bool,
    counters: SiteCounters,
}

impl HasPropertySite {
    /// Create an uninitialized site.
    pub fn new() -> Self {
        Self::default()
    }

    /// Test whether `target` or its prototypes have `key`.
    pub fn has(&mut self, target: &Value, key: &PropertyKey) -> bool {
        let Some(object) = target.as_object() else {
            return false;
        };
        if self.megamorphic {
            return generic_has(target, key);
        }
        for entry in &self.entries {
            if entry.matches(object, key) {
                self.counters.record_hit();
                return entry.test(object, key);
            }
        }
        if self.entries.is_full() {
            tracing::debug!(?key, "has-property site went megamorphic");
            self.entries.clear();
            self.megamorphic = true;
            return generic_has(target, key);
        }
        match derive_get_entry(object, key) {
            Some(entry) => {
                self.counters.record_install();
                let present = entry.test(object, key);
                self.entries.push(entry);
                present
            }
            None => generic_has(target, key),
        }
    }

    /// Current tier of this site.
    pub fn state(&self) -> SiteState {
        SiteState::of(self.entries.len(), self.megamorphic)
    }

    /// Hit/install counters.
    pub fn counters(&self) -> SiteCounters {
        self.counters
    }
}

/// A specialized write accessor plus its guard.
enum SetEntry {
    /// Overwrite an existing writable slot in place; same descriptor,
    /// same storage location
    Existing {
        key: PropertyKey,
        shape: Arc<Shape>,
        offset: usize,
    },
    /// Define a brand-new own data property via a recorded descriptor
    /// transition
    Add {
        key: PropertyKey,
        old_shape: Arc<Shape>,
        chain: ChainShapes,
        new_shape: Arc<Shape>,
    },
    /// Numeric-index family: store through the array storage strategy
    Element { kind: ArrayStrategyKind },
}

impl SetEntry {
    fn matches(&self, object: &Arc<JsObject>, key: &PropertyKey) -> bool {
        match self {
            SetEntry::Existing {
                key: bound, shape, ..
            } => bound == key && Arc::ptr_eq(&object.shape(), shape),
            SetEntry::Add {
                key: bound,
                old_shape,
                chain,
                ..
            } => {
                bound == key
                    && Arc::ptr_eq(&object.shape(), old_shape)
                    && old_shape.is_valid()
                    && object.is_extensible()
                    && chain_matches(object, chain)
            }
            SetEntry::Element { kind } => {
                key.is_element_index()
                    && object
                        .with_elements(|storage| {
                            storage.kind() == *kind && storage.is_stateless()
                        })
                        .unwrap_or(false)
            }
        }
    }

    fn write(
        &self,
        ctx: &EngineContext,
        object: &Arc<JsObject>,
        key: &PropertyKey,
        value: Value,
        strict: bool,
    ) -> AccessResult<()> {
        match self {
            SetEntry::Existing { offset, .. } => {
                object.set_slot_value(*offset, value);
                Ok(())
            }
            SetEntry::Add { new_shape, key, .. } => {
                object.apply_add_transition(ctx, key, new_shape, value);
                Ok(())
            }
            SetEntry::Element { .. } => {
                let Some(index) = key.as_element_index() else {
                    debug_assert!(false, "element entry matched a non-index key");
                    return Err(AccessError::internal(
                        "element write entry matched a non-index key",
                    ));
                };
                object.set_element(ctx, index, value, strict)
            }
        }
    }
}

fn derive_set_entry(object: &Arc<JsObject>, key: &PropertyKey) -> Option<SetEntry> {
    if key.is_element_index() && object.has_elements() {
        return object
            .with_elements(|storage| {
                storage
                    .is_stateless()
                    .then(|| SetEntry::Element { kind: storage.kind() })
            })
            .flatten();
    }
    let shape = object.shape();
    if let Some(slot) = shape.get_slot(key) {
        // Non-writable slots stay uncached; the generic path settles
        // whether to raise or ignore.
        return slot.attributes.writable.then_some(SetEntry::Existing {
            key: key.clone(),
            shape,
            offset: slot.offset,
        });
    }
    if !object.is_extensible() {
        return None;
    }
    let (chain, holder) = collect_chain_and_holder(object, key).ok()?;
    if let Some((_, slot)) = holder {
        if !slot.attributes.writable {
            // Inherited read-only property blocks the create
            return None;
        }
    }
    let new_shape = shape.transition_add(key.clone(), PropertyAttributes::data());
    Some(SetEntry::Add {
        key: key.clone(),
        old_shape: shape,
        chain,
        new_shape,
    })
}

/// A keyed property write site.
#[derive(Default)]
pub struct PropertySetSite {
    entries: ArrayVec<SetEntry, PROPERTY_WRITE_CACHE_LIMIT>,
    megamorphic: bool,
    counters: SiteCounters,
}

impl PropertySetSite {
    /// Create an uninitialized site.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `key` on `target`.
    pub fn set(
        &mut self,
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
            return generic_set(ctx, target, key, value, strict);
        };
        if self.megamorphic {
            return generic_set(ctx, target, key, value, strict);
        }
        for entry in &self.entries {
            if entry.matches(object, key) {
                self.counters.record_hit();
                return entry.write(ctx, object, key, value, strict);
            }
        }
        if self.entries.is_full() {
            tracing::debug!(?key, "property write site went megamorphic");
            self.entries.clear();
            self.megamorphic = true;
            return generic_set(ctx, target, key, value, strict);
        }
        match derive_set_entry(object, key) {
            Some(entry) => {
                self.counters.record_install();
                let result = entry.write(ctx, object, key, value, strict);
                self.entries.push(entry);
                result
            }
            None => generic_set(ctx, target, key, value, strict),
        }
    }

    /// Current tier of this site.
    pub fn state(&self) -> SiteState {
        SiteState::of(self.entries.len(), self.megamorphic)
    }

    /// Hit/install counters.
    pub fn counters(&self) -> SiteCounters {
        self.counters
    }
}
