//! Cache site state
//!
//! Every call site owns its caches exclusively and moves through the
//! usual tiers: uninitialized, monomorphic, polymorphic, megamorphic.
//! Transitions are monotonic; a site that went megamorphic stays
//! megamorphic.

use arrayvec::ArrayVec;
use quoll_vm_object::ArrayStrategyKind;

/// Maximum number of specialized entries on a keyed property read site.
pub const PROPERTY_READ_CACHE_LIMIT: usize = 2;

/// Maximum number of specialized entries on a keyed property write site.
pub const PROPERTY_WRITE_CACHE_LIMIT: usize = 1;

/// Maximum number of specialized entries on array-index helper sites.
pub const ARRAY_CACHE_LIMIT: usize = 4;

/// Specialization tier of a cache site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteState {
    /// No specialization installed yet
    Uninitialized,
    /// A single specialized entry
    Monomorphic,
    /// Several specialized entries (guard count attached)
    Polymorphic(u8),
    /// Guard diversity exceeded the depth bound; permanently generic
    Megamorphic,
}

impl SiteState {
    pub(crate) fn of(entry_count: usize, megamorphic: bool) -> Self {
        if megamorphic {
            SiteState::Megamorphic
        } else {
            match entry_count {
                0 => SiteState::Uninitialized,
                1 => SiteState::Monomorphic,
                n => SiteState::Polymorphic(n as u8),
            }
        }
    }
}

/// Hit and install counters, observable by tests and profiling.
#[derive(Debug, Clone, Copy, Default)]
pub struct SiteCounters {
    /// Times a specialized entry's guard matched
    pub hits: u64,
    /// Times a new specialized entry was installed
    pub installs: u32,
}

impl SiteCounters {
    #[inline]
    pub(crate) fn record_hit(&mut self) {
        self.hits = self.hits.saturating_add(1);
    }

    pub(crate) fn record_install(&mut self) {
        self.installs = self.installs.saturating_add(1);
    }
}

/// A depth-bounded cache over array strategy kinds.
///
/// Helper sites that specialize per storage strategy (length reads,
/// element access, index walking) share this bookkeeping: a guard set
/// of observed kinds, collapsing to the generic path once diversity
/// exceeds [`ARRAY_CACHE_LIMIT`].
#[derive(Debug, Default)]
pub struct StrategyCache {
    kinds: ArrayVec<ArrayStrategyKind, ARRAY_CACHE_LIMIT>,
    megamorphic: bool,
    counters: SiteCounters,
}

impl StrategyCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report whether the specialized path may run for `kind`,
    /// installing a new guard on first sight and collapsing the site
    /// when the depth bound is exceeded.
    pub fn check(&mut self, kind: ArrayStrategyKind) -> bool {
        if self.megamorphic {
            return false;
        }
        if self.kinds.contains(&kind) {
            self.counters.record_hit();
            return true;
        }
        if self.kinds.is_full() {
            tracing::debug!(?kind, "strategy cache went megamorphic");
            self.kinds.clear();
            self.megamorphic = true;
            return false;
        }
        self.kinds.push(kind);
        self.counters.record_install();
        true
    }

    /// Current tier of this cache.
    pub fn state(&self) -> SiteState {
        SiteState::of(self.kinds.len(), self.megamorphic)
    }

    /// Hit/install counters.
    pub fn counters(&self) -> SiteCounters {
        self.counters
    }
}
