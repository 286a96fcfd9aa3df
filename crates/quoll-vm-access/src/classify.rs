//! Classification caches
//!
//! Answer a fixed boolean question about a value ("is this an array?")
//! without re-deriving it from scratch. The site first caches against
//! the observed shape identity, then against the runtime class when
//! many shapes share one answer, then gives up on caching entirely.
//!
//! The cached boolean is a pure function of shape identity, so a hit
//! stays valid even after the shape's validity token is invalidated.

use quoll_vm_object::{ClassTag, JsObject, ShapeId, Value};

/// The closed set of classification predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassPredicate {
    /// Array exotic objects
    Array,
    /// Typed array views
    TypedArray,
    /// Anything with element storage (arrays, arguments, typed views)
    ArrayLike,
    /// Instances of a specific runtime class
    OfClass(ClassTag),
}

impl ClassPredicate {
    fn evaluate(&self, class: ClassTag) -> bool {
        match self {
            ClassPredicate::Array => class == ClassTag::Array,
            ClassPredicate::TypedArray => class == ClassTag::TypedArray,
            ClassPredicate::ArrayLike => matches!(
                class,
                ClassTag::Array | ClassTag::Arguments | ClassTag::TypedArray
            ),
            ClassPredicate::OfClass(expected) => class == *expected,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ClassifyState {
    Uninitialized,
    ShapeCached { shape: ShapeId, result: bool },
    ClassCached { class: ClassTag, result: bool },
    Uncached,
}

/// A single classification call site.
#[derive(Debug)]
pub struct ClassificationSite {
    predicate: ClassPredicate,
    state: ClassifyState,
    hits: u64,
    recomputations: u64,
}

impl ClassificationSite {
    /// Create a site bound to `predicate`.
    pub fn new(predicate: ClassPredicate) -> Self {
        Self {
            predicate,
            state: ClassifyState::Uninitialized,
            hits: 0,
            recomputations: 0,
        }
    }

    /// The predicate this site answers.
    pub fn predicate(&self) -> ClassPredicate {
        self.predicate
    }

    /// Classify `value`. Primitives and other non-objects
    /// short-circuit to false before any shape guard runs.
    pub fn classify(&mut self, value: &Value) -> bool {
        let Some(object) = value.as_object() else {
            return false;
        };
        match self.state {
            ClassifyState::ShapeCached { shape, result } if shape == object.shape_id() => {
                self.hits += 1;
                result
            }
            ClassifyState::ClassCached { class, result } if class == object.class_tag() => {
                self.hits += 1;
                result
            }
            ClassifyState::Uninitialized => {
                let result = self.recompute(object);
                self.state = ClassifyState::ShapeCached {
                    shape: object.shape_id(),
                    result,
                };
                result
            }
            ClassifyState::ShapeCached { .. } => {
                // Many shapes can share one answer; fall through to a
                // class-keyed entry.
                let result = self.recompute(object);
                self.state = ClassifyState::ClassCached {
                    class: object.class_tag(),
                    result,
                };
                result
            }
            ClassifyState::ClassCached { .. } => {
                tracing::debug!(predicate = ?self.predicate, "classification site went uncached");
                self.state = ClassifyState::Uncached;
                self.recompute(object)
            }
            ClassifyState::Uncached => self.recompute(object),
        }
    }

    fn recompute(&mut self, object: &JsObject) -> bool {
        self.recomputations += 1;
        self.predicate.evaluate(object.class_tag())
    }

    /// Times a cached entry answered without recomputing.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Times the predicate was re-derived from the runtime class.
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }
}
