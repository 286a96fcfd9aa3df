//! Element index walking
//!
//! First/last/next/previous valid element index of an array-like
//! target, combining the target's own storage strategy with indexed
//! properties visible through its prototype chain. The chain walk is
//! skipped entirely while the array has no holes and the global
//! "prototypes never expose indexed properties" assumption holds.
//!
//! Sentinels: `first_index`/`last_index` report any value >= the given
//! length when no element exists; `next_index` reports
//! [`MAX_SAFE_INTEGER`]; `previous_index` reports -1.
//!
//! Non-array targets take a generic walk that either probes
//! `has_property` at consecutive indices (below the context's density
//! threshold) or enumerates own keys over the whole chain once (at or
//! above it). The two generic strategies agree exactly; the threshold
//! is a performance decision, never observable.

use crate::generic::element_key;
use crate::site::{SiteCounters, SiteState, StrategyCache};
use quoll_vm_object::{
    AccessError, AccessResult, EngineContext, JsObject, MAX_SAFE_INTEGER, Value,
};
use std::sync::Arc;

fn walkable<'a>(target: &'a Value) -> AccessResult<Option<&'a Arc<JsObject>>> {
    if target.is_nullish() {
        return Err(AccessError::type_error(format!(
            "{} is not an object",
            target.type_name()
        )));
    }
    Ok(target.as_object())
}

/// Smallest own element index of `object` greater than `from`, or
/// [`MAX_SAFE_INTEGER`]. Consults the storage strategy when present,
/// otherwise the object's own named index keys.
fn own_next_candidate(object: &JsObject, from: i64) -> i64 {
    if let Some(next) = object.with_elements(|storage| storage.next_index(from)) {
        return next;
    }
    object
        .shape()
        .own_keys()
        .iter()
        .filter_map(|key| key.as_element_index())
        .filter(|&index| index > from)
        .min()
        .unwrap_or(MAX_SAFE_INTEGER)
}

/// Largest own element index of `object` smaller than `bound`, or -1.
fn own_previous_candidate(object: &JsObject, bound: i64) -> i64 {
    if let Some(previous) = object.with_elements(|storage| storage.previous_index(bound)) {
        return previous;
    }
    object
        .shape()
        .own_keys()
        .iter()
        .filter_map(|key| key.as_element_index())
        .filter(|&index| index < bound)
        .max()
        .unwrap_or(-1)
}

fn generic_next_scan(ctx: &EngineContext, object: &Arc<JsObject>, from: i64, length: i64) -> i64 {
    if length < ctx.density_threshold() {
        // Small expected element count: linear probing is cheap.
        let mut index = from + 1;
        while index < length {
            if object.has_property(&element_key(index)) {
                return index;
            }
            index += 1;
        }
        MAX_SAFE_INTEGER
    } else {
        // Avoid O(length) probing on sparse, huge-index objects: one
        // enumeration over the chain's own keys instead.
        let mut best = MAX_SAFE_INTEGER;
        let mut current = Some(object.as_ref());
        while let Some(obj) = current {
            for key in obj.own_property_keys() {
                if let Some(index) = key.as_element_index() {
                    if index > from && index < length && index < best {
                        best = index;
                    }
                }
            }
            current = obj.prototype().map(Arc::as_ref);
        }
        best
    }
}

fn generic_previous_scan(
    ctx: &EngineContext,
    object: &Arc<JsObject>,
    from: i64,
    length: i64,
) -> i64 {
    let bound = from.min(length);
    if length < ctx.density_threshold() {
        let mut index = bound - 1;
        while index >= 0 {
            if object.has_property(&element_key(index)) {
                return index;
            }
            index -= 1;
        }
        -1
    } else {
        let mut best = -1;
        let mut current = Some(object.as_ref());
        while let Some(obj) = current {
            for key in obj.own_property_keys() {
                if let Some(index) = key.as_element_index() {
                    if index < bound && index > best {
                        best = index;
                    }
                }
            }
            current = obj.prototype().map(Arc::as_ref);
        }
        best
    }
}

/// First valid element index site.
#[derive(Debug, Default)]
pub struct FirstIndexSite {
    cache: StrategyCache,
}

impl FirstIndexSite {
    /// Create an uninitialized site.
    pub fn new() -> Self {
        Self::default()
    }

    /// First element index of `target` below `length`; returns `length`
    /// when there is none.
    pub fn first_index(
        &mut self,
        ctx: &EngineContext,
        target: &Value,
        length: i64,
    ) -> AccessResult<i64> {
        let Some(object) = walkable(target)? else {
            return Ok(length);
        };
        let guarded = object.with_elements(|storage| (storage.kind(), storage.has_holes()));
        if let Some((kind, has_holes)) = guarded {
            if self.cache.check(kind) {
                let own = own_next_candidate(object, -1);
                let mut candidate = own;
                if has_holes || !ctx.prototypes_have_no_elements() {
                    let mut proto = object.prototype();
                    // The own candidate can't be beaten once it hits
                    // the lower boundary.
                    while candidate != 0 {
                        let Some(p) = proto else { break };
                        candidate = candidate.min(own_next_candidate(p, -1));
                        proto = p.prototype();
                    }
                }
                return Ok(if candidate >= length { length } else { candidate });
            }
        }
        let scanned = generic_next_scan(ctx, object, -1, length);
        Ok(if scanned >= length { length } else { scanned })
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

/// Last valid element index site.
#[derive(Debug, Default)]
pub struct LastIndexSite {
    cache: StrategyCache,
}

impl LastIndexSite {
    /// Create an uninitialized site.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last element index of `target` below `length`; returns `length`
    /// when there is none.
    pub fn last_index(
        &mut self,
        ctx: &EngineContext,
        target: &Value,
        length: i64,
    ) -> AccessResult<i64> {
        let Some(object) = walkable(target)? else {
            return Ok(length);
        };
        let guarded = object.with_elements(|storage| (storage.kind(), storage.has_holes()));
        if let Some((kind, has_holes)) = guarded {
            if self.cache.check(kind) {
                let own = own_previous_candidate(object, length);
                let mut candidate = own;
                if has_holes || !ctx.prototypes_have_no_elements() {
                    let mut proto = object.prototype();
                    while candidate != length - 1 {
                        let Some(p) = proto else { break };
                        candidate = candidate.max(own_previous_candidate(p, length));
                        proto = p.prototype();
                    }
                }
                return Ok(if candidate < 0 { length } else { candidate });
            }
        }
        let scanned = generic_previous_scan(ctx, object, length, length);
        Ok(if scanned < 0 { length } else { scanned })
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

/// Next valid element index site.
#[derive(Debug, Default)]
pub struct NextIndexSite {
    cache: StrategyCache,
}

impl NextIndexSite {
    /// Create an uninitialized site.
    pub fn new() -> Self {
        Self::default()
    }

    /// Smallest element index of `target` greater than `from`, or
    /// [`MAX_SAFE_INTEGER`] when there is none below `length`.
    pub fn next_index(
        &mut self,
        ctx: &EngineContext,
        target: &Value,
        from: i64,
        length: i64,
    ) -> AccessResult<i64> {
        let Some(object) = walkable(target)? else {
            return Ok(MAX_SAFE_INTEGER);
        };
        let guarded = object.with_elements(|storage| (storage.kind(), storage.has_holes()));
        if let Some((kind, has_holes)) = guarded {
            if self.cache.check(kind) {
                let own = own_next_candidate(object, from);
                let mut candidate = own;
                if has_holes || !ctx.prototypes_have_no_elements() {
                    let mut proto = object.prototype();
                    while candidate != from + 1 {
                        let Some(p) = proto else { break };
                        candidate = candidate.min(own_next_candidate(p, from));
                        proto = p.prototype();
                    }
                }
                return Ok(candidate);
            }
        }
        Ok(generic_next_scan(ctx, object, from, length))
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

/// Previous valid element index site.
#[derive(Debug, Default)]
pub struct PreviousIndexSite {
    cache: StrategyCache,
}

impl PreviousIndexSite {
    /// Create an uninitialized site.
    pub fn new() -> Self {
        Self::default()
    }

    /// Largest element index of `target` smaller than `from` (and below
    /// `length`), or -1 when there is none.
    pub fn previous_index(
        &mut self,
        ctx: &EngineContext,
        target: &Value,
        from: i64,
        length: i64,
    ) -> AccessResult<i64> {
        let Some(object) = walkable(target)? else {
            return Ok(-1);
        };
        let bound = from.min(length);
        let guarded = object.with_elements(|storage| (storage.kind(), storage.has_holes()));
        if let Some((kind, has_holes)) = guarded {
            if self.cache.check(kind) {
                let own = own_previous_candidate(object, bound);
                let mut candidate = own;
                if has_holes || !ctx.prototypes_have_no_elements() {
                    let mut proto = object.prototype();
                    while candidate != bound - 1 {
                        let Some(p) = proto else { break };
                        candidate = candidate.max(own_previous_candidate(p, bound));
                        proto = p.prototype();
                    }
                }
                return Ok(candidate);
            }
        }
        Ok(generic_previous_scan(ctx, object, from, length))
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
