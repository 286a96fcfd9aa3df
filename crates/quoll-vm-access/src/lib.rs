//! # Quoll VM Access
//!
//! Adaptive polymorphic property and element access: the machinery
//! that makes reading and writing named properties and indexed
//! elements fast while object layouts and array representations stay
//! free to change at any time.
//!
//! ## Design Principles
//!
//! - **Self-specializing call sites**: each site owns a depth-bounded
//!   chain of guarded accessors and degrades monotonically
//!   (uninitialized, monomorphic, polymorphic, megamorphic)
//! - **Guards over identities**: shape identity, strategy kind, and
//!   invalidate-once assumptions; never deep structure
//! - **Generic fallback**: every chain terminates in an uncached,
//!   always-correct path

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod array_length;
pub mod classify;
pub mod element_cache;
pub mod generic;
pub mod index_walker;
pub mod property_cache;
pub mod site;

pub use array_length::{ArrayLengthReadSite, set_array_length, set_array_length_with};
pub use classify::{ClassPredicate, ClassificationSite};
pub use element_cache::{ElementReadSite, ElementWriteSite};
pub use generic::{generic_get, generic_has, generic_length, generic_set};
pub use index_walker::{FirstIndexSite, LastIndexSite, NextIndexSite, PreviousIndexSite};
pub use property_cache::{HasPropertySite, PropertyGetSite, PropertySetSite};
pub use site::{
    ARRAY_CACHE_LIMIT, PROPERTY_READ_CACHE_LIMIT, PROPERTY_WRITE_CACHE_LIMIT, SiteCounters,
    SiteState, StrategyCache,
};
