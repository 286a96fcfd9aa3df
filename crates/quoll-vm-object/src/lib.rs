//! # Quoll VM Object Model
//!
//! The object-model collaborator of the Quoll access subsystem.
//!
//! ## Design Principles
//!
//! - **Shapes**: objects share immutable layout descriptors through a
//!   transition tree; structural mutation swaps the descriptor, never
//!   edits it
//! - **Storage strategies**: array elements live in a closed set of
//!   representations (dense, holey, sparse, typed) dispatched by match
//! - **Assumptions**: caches guard on invalidate-once validity flags
//!   instead of being eagerly flushed
//! - **Thread-confined**: locks satisfy `Send + Sync`, a single logical
//!   thread mutates any given object graph

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod array;
pub mod assumption;
pub mod context;
pub mod error;
pub mod object;
pub mod shape;
pub mod typed;
pub mod value;

pub use array::{ArrayStorage, ArrayStrategyKind};
pub use assumption::Assumption;
pub use context::{EngineContext, LengthMode, MAX_SAFE_INTEGER};
pub use error::{AccessError, AccessResult};
pub use object::{ClassTag, JsObject, PropertyAttributes, PropertyKey};
pub use shape::{PropertySlot, Shape, ShapeId};
pub use typed::{ArrayBuffer, TypedKind, TypedStorage};
pub use value::Value;
