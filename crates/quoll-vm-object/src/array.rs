//! Array element storage strategies
//!
//! An array-like object owns one `ArrayStorage` describing how its
//! elements are physically represented. The representation is a closed
//! set of variants dispatched by `match`; operations that change the
//! representation category (a dense array gaining a hole, a huge gap
//! forcing a sparse map) replace the storage value wholesale, so cache
//! guards keyed on the strategy kind miss after a transition.
//!
//! Index arguments are `i64` throughout. Sentinels follow the walker
//! contract: `next_index` reports `MAX_SAFE_INTEGER` when exhausted
//! (this array could be the prototype of a longer one, so reporting our
//! own length would be wrong), `previous_index` reports -1.

use crate::context::{EngineContext, MAX_SAFE_INTEGER};
use crate::error::{AccessError, AccessResult};
use crate::typed::{TypedKind, TypedStorage};
use crate::value::Value;
use std::collections::BTreeMap;

/// Largest gap a contiguous representation absorbs before the storage
/// transitions to the sparse map.
pub const SPARSE_GAP_THRESHOLD: i64 = 4096;

/// Identity of an array storage strategy, used as a cache guard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayStrategyKind {
    /// Contiguous, no holes
    Dense,
    /// Contiguous with gaps
    Holey,
    /// Explicit index-to-value map
    Sparse,
    /// Fixed-width numeric view over an external buffer
    Typed(TypedKind),
}

/// Integrity flags carried across representation transitions.
#[derive(Debug, Clone, Copy)]
pub struct ArrayFlags {
    sealed: bool,
    frozen: bool,
    length_writable: bool,
    extensible: bool,
}

impl Default for ArrayFlags {
    fn default() -> Self {
        Self {
            sealed: false,
            frozen: false,
            length_writable: true,
            extensible: true,
        }
    }
}

enum Repr {
    Dense(Vec<Value>),
    Holey { elements: Vec<Option<Value>> },
    Sparse { elements: BTreeMap<i64, Value>, length: i64 },
    Typed(TypedStorage),
}

/// Element storage of an array-like object.
pub struct ArrayStorage {
    repr: Repr,
    flags: ArrayFlags,
}

impl ArrayStorage {
    /// Empty dense storage.
    pub fn empty() -> Self {
        Self::dense(Vec::new())
    }

    /// Dense storage over the given elements.
    pub fn dense(elements: Vec<Value>) -> Self {
        Self {
            repr: Repr::Dense(elements),
            flags: ArrayFlags::default(),
        }
    }

    /// Holey storage; `None` entries are holes. Length equals the
    /// element vector length.
    pub fn holey(elements: Vec<Option<Value>>) -> Self {
        Self {
            repr: Repr::Holey { elements },
            flags: ArrayFlags::default(),
        }
    }

    /// Sparse storage of the given length with no elements.
    pub fn sparse(length: i64) -> Self {
        Self {
            repr: Repr::Sparse {
                elements: BTreeMap::new(),
                length,
            },
            flags: ArrayFlags::default(),
        }
    }

    /// Typed storage over a buffer view. Typed lengths are never
    /// writable and typed elements are never configurable.
    pub fn typed(view: TypedStorage) -> Self {
        Self {
            repr: Repr::Typed(view),
            flags: ArrayFlags {
                length_writable: false,
                extensible: false,
                ..ArrayFlags::default()
            },
        }
    }

    /// The strategy kind caches guard on.
    pub fn kind(&self) -> ArrayStrategyKind {
        match &self.repr {
            Repr::Dense(_) => ArrayStrategyKind::Dense,
            Repr::Holey { .. } => ArrayStrategyKind::Holey,
            Repr::Sparse { .. } => ArrayStrategyKind::Sparse,
            Repr::Typed(view) => ArrayStrategyKind::Typed(view.kind()),
        }
    }

    /// True if this strategy instance carries no mutable state beyond
    /// its identity. Typed views are stateful: their observable length
    /// follows the external buffer's detach state.
    pub fn is_stateless(&self) -> bool {
        !matches!(self.repr, Repr::Typed(_))
    }

    /// Current length.
    pub fn length(&self) -> i64 {
        match &self.repr {
            Repr::Dense(elements) => elements.len() as i64,
            Repr::Holey { elements } => elements.len() as i64,
            Repr::Sparse { length, .. } => *length,
            Repr::Typed(view) => view.length() as i64,
        }
    }

    /// True if the array has an element (not a hole) at `index`.
    pub fn has_element(&self, index: i64) -> bool {
        if index < 0 {
            return false;
        }
        match &self.repr {
            Repr::Dense(elements) => index < elements.len() as i64,
            Repr::Holey { elements } => {
                index < elements.len() as i64 && elements[index as usize].is_some()
            }
            Repr::Sparse { elements, .. } => elements.contains_key(&index),
            Repr::Typed(view) => index < view.length() as i64,
        }
    }

    /// Read the element at `index`; `None` for holes and out of bounds.
    pub fn get_element(&self, index: i64) -> Option<Value> {
        if index < 0 {
            return None;
        }
        match &self.repr {
            Repr::Dense(elements) => elements.get(index as usize).cloned(),
            Repr::Holey { elements } => elements.get(index as usize).cloned().flatten(),
            Repr::Sparse { elements, .. } => elements.get(&index).cloned(),
            Repr::Typed(view) => view.get(index as usize).map(Value::number),
        }
    }

    /// Store `value` at `index`, transitioning the representation when
    /// the write falls outside the current category.
    pub fn set_element(
        &mut self,
        ctx: &EngineContext,
        index: i64,
        value: Value,
        strict: bool,
    ) -> AccessResult<()> {
        if self.flags.frozen {
            if strict {
                return Err(AccessError::type_error(format!(
                    "Cannot assign to read only property '{index}' of frozen array"
                )));
            }
            return Ok(());
        }
        if !self.flags.length_writable && index >= self.length() {
            // Growing would write length. Out-of-bounds typed stores
            // are ignored even in strict mode.
            if matches!(self.repr, Repr::Typed(_)) {
                return Ok(());
            }
            if strict {
                return Err(AccessError::type_error(
                    "Cannot assign to read only property 'length'",
                ));
            }
            return Ok(());
        }
        if !self.flags.extensible && !self.has_element(index) {
            if strict {
                return Err(AccessError::type_error(format!(
                    "Cannot add property {index}, array is not extensible"
                )));
            }
            return Ok(());
        }
        if !ctx.length_mode().is_valid_index(index) {
            return Err(AccessError::range_error(format!(
                "invalid array index {index}"
            )));
        }

        match &mut self.repr {
            Repr::Dense(elements) => {
                let len = elements.len() as i64;
                if index < len {
                    elements[index as usize] = value;
                } else if index == len {
                    elements.push(value);
                } else if index < len + SPARSE_GAP_THRESHOLD {
                    let mut holey: Vec<Option<Value>> =
                        elements.drain(..).map(Some).collect();
                    holey.resize(index as usize, None);
                    holey.push(Some(value));
                    self.transition(Repr::Holey { elements: holey }, index);
                } else {
                    let mut map: BTreeMap<i64, Value> = elements
                        .drain(..)
                        .enumerate()
                        .map(|(i, v)| (i as i64, v))
                        .collect();
                    map.insert(index, value);
                    self.transition(
                        Repr::Sparse {
                            elements: map,
                            length: index + 1,
                        },
                        index,
                    );
                }
            }
            Repr::Holey { elements } => {
                let len = elements.len() as i64;
                if index < len {
                    elements[index as usize] = Some(value);
                } else if index < len + SPARSE_GAP_THRESHOLD {
                    elements.resize(index as usize, None);
                    elements.push(Some(value));
                } else {
                    let mut map: BTreeMap<i64, Value> = elements
                        .drain(..)
                        .enumerate()
                        .filter_map(|(i, v)| v.map(|v| (i as i64, v)))
                        .collect();
                    map.insert(index, value);
                    self.transition(
                        Repr::Sparse {
                            elements: map,
                            length: index + 1,
                        },
                        index,
                    );
                }
            }
            Repr::Sparse { elements, length } => {
                elements.insert(index, value);
                if index >= *length {
                    *length = index + 1;
                }
            }
            Repr::Typed(view) => {
                let n = value.as_number().unwrap_or(f64::NAN);
                view.set(index as usize, n);
            }
        }
        Ok(())
    }

    /// Delete the element at `index`. Returns false (or raises, when
    /// strict) if the element exists but cannot be deleted.
    pub fn delete_element(&mut self, index: i64, strict: bool) -> AccessResult<bool> {
        if self.flags.sealed && self.has_element(index) {
            if strict {
                return Err(AccessError::type_error(format!(
                    "Cannot delete property '{index}' of sealed array"
                )));
            }
            return Ok(false);
        }
        if let Repr::Typed(_) = self.repr {
            // Typed elements are non-configurable
            return Ok(!self.has_element(index));
        }
        self.delete_element_unchecked(index);
        Ok(true)
    }

    /// Delete without integrity checks. Used by length shrinking, which
    /// removes elements even from sealed storage.
    pub fn delete_element_unchecked(&mut self, index: i64) {
        match &mut self.repr {
            Repr::Dense(elements) => {
                let len = elements.len() as i64;
                if index >= 0 && index < len {
                    let mut holey: Vec<Option<Value>> =
                        elements.drain(..).map(Some).collect();
                    holey[index as usize] = None;
                    self.transition(Repr::Holey { elements: holey }, index);
                }
            }
            Repr::Holey { elements } => {
                if index >= 0 && index < elements.len() as i64 {
                    elements[index as usize] = None;
                }
            }
            Repr::Sparse { elements, .. } => {
                elements.remove(&index);
            }
            Repr::Typed(_) => {}
        }
    }

    /// Set the stored length to `new_len`.
    pub fn set_length(
        &mut self,
        ctx: &EngineContext,
        new_len: i64,
        strict: bool,
    ) -> AccessResult<()> {
        self.set_length_with(ctx, new_len, strict, |_| {})
    }

    /// Set the stored length, reporting each index deleted by a sealed
    /// shrink to `on_delete` in visit order.
    ///
    /// Sealed shrinks delete every element at indices >= `new_len`
    /// before the stored length changes, walking from the current last
    /// element index downward: deletion can alter which indices are
    /// holes, and the walk must observe the storage consistently while
    /// it shrinks.
    pub fn set_length_with(
        &mut self,
        ctx: &EngineContext,
        new_len: i64,
        strict: bool,
        mut on_delete: impl FnMut(i64),
    ) -> AccessResult<()> {
        if !self.flags.length_writable {
            if strict {
                return Err(AccessError::type_error(
                    "Cannot assign to read only property 'length'",
                ));
            }
            return Ok(());
        }
        if new_len < 0 || new_len >= ctx.length_mode().max_length() {
            return Err(AccessError::range_error("Invalid array length"));
        }

        let old_len = self.length();
        if new_len >= old_len {
            self.grow_length(new_len);
            return Ok(());
        }

        if self.flags.sealed {
            let mut index = self.last_index();
            while index >= new_len {
                if self.has_element(index) {
                    on_delete(index);
                    self.delete_element_unchecked(index);
                }
                index = self.previous_index(index);
            }
        }
        self.truncate_length(new_len);
        Ok(())
    }

    fn grow_length(&mut self, new_len: i64) {
        match &mut self.repr {
            Repr::Dense(elements) => {
                let len = elements.len() as i64;
                if new_len == len {
                    return;
                }
                if new_len <= len + SPARSE_GAP_THRESHOLD {
                    let mut holey: Vec<Option<Value>> =
                        elements.drain(..).map(Some).collect();
                    holey.resize(new_len as usize, None);
                    self.transition(Repr::Holey { elements: holey }, new_len);
                } else {
                    let map: BTreeMap<i64, Value> = elements
                        .drain(..)
                        .enumerate()
                        .map(|(i, v)| (i as i64, v))
                        .collect();
                    self.transition(
                        Repr::Sparse {
                            elements: map,
                            length: new_len,
                        },
                        new_len,
                    );
                }
            }
            Repr::Holey { elements } => {
                let len = elements.len() as i64;
                if new_len <= len + SPARSE_GAP_THRESHOLD {
                    elements.resize(new_len as usize, None);
                } else {
                    let map: BTreeMap<i64, Value> = elements
                        .drain(..)
                        .enumerate()
                        .filter_map(|(i, v)| v.map(|v| (i as i64, v)))
                        .collect();
                    self.transition(
                        Repr::Sparse {
                            elements: map,
                            length: new_len,
                        },
                        new_len,
                    );
                }
            }
            Repr::Sparse { length, .. } => *length = new_len,
            Repr::Typed(_) => unreachable!("typed length is never writable"),
        }
    }

    fn truncate_length(&mut self, new_len: i64) {
        match &mut self.repr {
            Repr::Dense(elements) => elements.truncate(new_len as usize),
            Repr::Holey { elements } => elements.truncate(new_len as usize),
            Repr::Sparse { elements, length } => {
                elements.retain(|&index, _| index < new_len);
                *length = new_len;
            }
            Repr::Typed(_) => unreachable!("typed length is never writable"),
        }
    }

    /// First element index; any value >= `length()` means none.
    pub fn first_index(&self) -> i64 {
        match &self.repr {
            Repr::Dense(_) | Repr::Typed(_) => 0,
            Repr::Holey { elements } => elements
                .iter()
                .position(Option::is_some)
                .map(|i| i as i64)
                .unwrap_or(elements.len() as i64),
            Repr::Sparse { elements, length } => {
                elements.keys().next().copied().unwrap_or(*length)
            }
        }
    }

    /// Last element index; -1 means none.
    pub fn last_index(&self) -> i64 {
        match &self.repr {
            Repr::Dense(elements) => elements.len() as i64 - 1,
            Repr::Typed(view) => view.length() as i64 - 1,
            Repr::Holey { elements } => elements
                .iter()
                .rposition(Option::is_some)
                .map(|i| i as i64)
                .unwrap_or(-1),
            Repr::Sparse { elements, .. } => {
                elements.keys().next_back().copied().unwrap_or(-1)
            }
        }
    }

    /// Smallest element index greater than `from`, or
    /// [`MAX_SAFE_INTEGER`] when there is none.
    pub fn next_index(&self, from: i64) -> i64 {
        let candidate = match &self.repr {
            Repr::Dense(elements) => {
                let next = from + 1;
                if next < elements.len() as i64 {
                    Some(next)
                } else {
                    None
                }
            }
            Repr::Typed(view) => {
                let next = from + 1;
                if next < view.length() as i64 {
                    Some(next)
                } else {
                    None
                }
            }
            Repr::Holey { elements } => {
                let start = (from + 1).max(0) as usize;
                elements
                    .get(start..)
                    .and_then(|rest| rest.iter().position(Option::is_some))
                    .map(|i| (start + i) as i64)
            }
            Repr::Sparse { elements, .. } => {
                elements.range(from + 1..).next().map(|(&index, _)| index)
            }
        };
        candidate.unwrap_or(MAX_SAFE_INTEGER)
    }

    /// Largest element index smaller than `from`, or -1 when there is
    /// none.
    pub fn previous_index(&self, from: i64) -> i64 {
        if from <= 0 {
            return -1;
        }
        let candidate = match &self.repr {
            Repr::Dense(elements) => {
                let len = elements.len() as i64;
                Some((from - 1).min(len - 1)).filter(|&i| i >= 0)
            }
            Repr::Typed(view) => {
                let len = view.length() as i64;
                Some((from - 1).min(len - 1)).filter(|&i| i >= 0)
            }
            Repr::Holey { elements } => {
                let end = (from.min(elements.len() as i64)) as usize;
                elements[..end]
                    .iter()
                    .rposition(Option::is_some)
                    .map(|i| i as i64)
            }
            Repr::Sparse { elements, .. } => {
                elements.range(..from).next_back().map(|(&index, _)| index)
            }
        };
        candidate.unwrap_or(-1)
    }

    /// True if any index below the length has no element.
    pub fn has_holes(&self) -> bool {
        match &self.repr {
            Repr::Dense(_) | Repr::Typed(_) => false,
            Repr::Holey { elements } => elements.iter().any(Option::is_none),
            Repr::Sparse { elements, length } => (elements.len() as i64) < *length,
        }
    }

    /// True if elements cannot be deleted.
    pub fn is_sealed(&self) -> bool {
        self.flags.sealed
    }

    /// True if elements cannot be assigned.
    pub fn is_frozen(&self) -> bool {
        self.flags.frozen
    }

    /// True if the stored length can be changed.
    pub fn is_length_writable(&self) -> bool {
        self.flags.length_writable
    }

    /// True if new elements can be added.
    pub fn is_extensible(&self) -> bool {
        self.flags.extensible
    }

    /// Forbid adding elements.
    pub fn prevent_extensions(&mut self) {
        self.flags.extensible = false;
    }

    /// Seal: elements become non-configurable.
    pub fn seal(&mut self) {
        self.flags.sealed = true;
        self.flags.extensible = false;
    }

    /// Freeze: elements become read-only, length stops being writable.
    pub fn freeze(&mut self) {
        self.flags.frozen = true;
        self.flags.sealed = true;
        self.flags.extensible = false;
        self.flags.length_writable = false;
    }

    /// Make the stored length read-only.
    pub fn set_length_not_writable(&mut self) {
        self.flags.length_writable = false;
    }

    fn transition(&mut self, new_repr: Repr, index: i64) {
        let old = self.kind();
        self.repr = new_repr;
        tracing::trace!(from = ?old, to = ?self.kind(), index, "array transition");
    }
}

impl std::fmt::Debug for ArrayStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayStorage")
            .field("kind", &self.kind())
            .field("length", &self.length())
            .field("holes", &self.has_holes())
            .finish()
    }
}
