//! Typed element storage
//!
//! A typed storage is a fixed-width numeric view over an external byte
//! buffer. The buffer may be detached at any time; a detached view
//! reports length 0 and yields no elements, it never raises.

use crate::error::{AccessError, AccessResult};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The element kind of a typed view - determines size and interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypedKind {
    /// 8-bit signed integers
    Int8,
    /// 8-bit unsigned integers
    Uint8,
    /// 8-bit unsigned integers (clamped)
    Uint8Clamped,
    /// 16-bit signed integers
    Int16,
    /// 16-bit unsigned integers
    Uint16,
    /// 32-bit signed integers
    Int32,
    /// 32-bit unsigned integers
    Uint32,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
}

impl TypedKind {
    /// Get the byte size of each element
    pub fn element_size(&self) -> usize {
        match self {
            TypedKind::Int8 | TypedKind::Uint8 | TypedKind::Uint8Clamped => 1,
            TypedKind::Int16 | TypedKind::Uint16 => 2,
            TypedKind::Int32 | TypedKind::Uint32 | TypedKind::Float32 => 4,
            TypedKind::Float64 => 8,
        }
    }

    /// Get the name of this view type
    pub fn name(&self) -> &'static str {
        match self {
            TypedKind::Int8 => "Int8Array",
            TypedKind::Uint8 => "Uint8Array",
            TypedKind::Uint8Clamped => "Uint8ClampedArray",
            TypedKind::Int16 => "Int16Array",
            TypedKind::Uint16 => "Uint16Array",
            TypedKind::Int32 => "Int32Array",
            TypedKind::Uint32 => "Uint32Array",
            TypedKind::Float32 => "Float32Array",
            TypedKind::Float64 => "Float64Array",
        }
    }
}

/// A raw binary data buffer, detachable.
#[derive(Debug)]
pub struct ArrayBuffer {
    data: RwLock<Vec<u8>>,
    detached: AtomicBool,
}

impl ArrayBuffer {
    /// Create a zero-filled buffer of `byte_length` bytes.
    pub fn new(byte_length: usize) -> Arc<Self> {
        Arc::new(Self {
            data: RwLock::new(vec![0; byte_length]),
            detached: AtomicBool::new(false),
        })
    }

    /// Byte length; 0 once detached.
    pub fn byte_length(&self) -> usize {
        if self.is_detached() {
            0
        } else {
            self.data.read().len()
        }
    }

    /// Check if the buffer has been detached
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Relaxed)
    }

    /// Detach the buffer, releasing its storage.
    pub fn detach(&self) {
        if !self.detached.swap(true, Ordering::Relaxed) {
            self.data.write().clear();
        }
    }

    /// Run `f` with the buffer contents.
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.data.read())
    }

    /// Run `f` with mutable buffer contents.
    pub fn with_data_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.data.write())
    }
}

/// A fixed-width numeric view over an [`ArrayBuffer`].
#[derive(Debug, Clone)]
pub struct TypedStorage {
    buffer: Arc<ArrayBuffer>,
    byte_offset: usize,
    length: usize,
    kind: TypedKind,
}

impl TypedStorage {
    /// Create a view over `buffer`.
    ///
    /// The offset must be aligned to the element size and the view must
    /// fit in the buffer.
    pub fn new(
        buffer: Arc<ArrayBuffer>,
        kind: TypedKind,
        byte_offset: usize,
        length: usize,
    ) -> AccessResult<Self> {
        let elem_size = kind.element_size();
        if byte_offset % elem_size != 0 {
            return Err(AccessError::range_error(
                "byte offset must be aligned to element size",
            ));
        }
        let byte_length = length
            .checked_mul(elem_size)
            .ok_or_else(|| AccessError::range_error("typed view length overflow"))?;
        if byte_offset + byte_length > buffer.byte_length() {
            return Err(AccessError::range_error(
                "typed view would extend past end of buffer",
            ));
        }
        Ok(Self {
            buffer,
            byte_offset,
            length,
            kind,
        })
    }

    /// Create a view with its own freshly allocated buffer.
    pub fn with_length(kind: TypedKind, length: usize) -> Self {
        let buffer = ArrayBuffer::new(length * kind.element_size());
        Self {
            buffer,
            byte_offset: 0,
            length,
            kind,
        }
    }

    /// The element kind of this view
    pub fn kind(&self) -> TypedKind {
        self.kind
    }

    /// The underlying buffer
    pub fn buffer(&self) -> &Arc<ArrayBuffer> {
        &self.buffer
    }

    /// Number of elements; 0 once the buffer is detached.
    pub fn length(&self) -> usize {
        if self.buffer.is_detached() {
            0
        } else {
            self.length
        }
    }

    /// Check if the underlying buffer is detached
    pub fn is_detached(&self) -> bool {
        self.buffer.is_detached()
    }

    /// Read an element. `None` when out of bounds or detached.
    pub fn get(&self, index: usize) -> Option<f64> {
        if index >= self.length() {
            return None;
        }
        let byte_index = self.byte_offset + index * self.kind.element_size();
        Some(self.buffer.with_data(|data| {
            let bytes = &data[byte_index..];
            match self.kind {
                TypedKind::Int8 => bytes[0] as i8 as f64,
                TypedKind::Uint8 | TypedKind::Uint8Clamped => bytes[0] as f64,
                TypedKind::Int16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f64,
                TypedKind::Uint16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f64,
                TypedKind::Int32 => {
                    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
                }
                TypedKind::Uint32 => {
                    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
                }
                TypedKind::Float32 => {
                    f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
                }
                TypedKind::Float64 => f64::from_le_bytes([
                    bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
                ]),
            }
        }))
    }

    /// Write an element. Out-of-bounds or detached writes are ignored,
    /// matching language semantics for indexed stores on views.
    pub fn set(&self, index: usize, value: f64) {
        if index >= self.length() {
            return;
        }
        let byte_index = self.byte_offset + index * self.kind.element_size();
        self.buffer.with_data_mut(|data| {
            let bytes = &mut data[byte_index..];
            match self.kind {
                TypedKind::Int8 => bytes[0] = to_int32(value) as i8 as u8,
                TypedKind::Uint8 => bytes[0] = to_int32(value) as u8,
                TypedKind::Uint8Clamped => bytes[0] = clamp_u8(value),
                TypedKind::Int16 => {
                    bytes[..2].copy_from_slice(&(to_int32(value) as i16).to_le_bytes())
                }
                TypedKind::Uint16 => {
                    bytes[..2].copy_from_slice(&(to_int32(value) as u16).to_le_bytes())
                }
                TypedKind::Int32 => bytes[..4].copy_from_slice(&to_int32(value).to_le_bytes()),
                TypedKind::Uint32 => {
                    bytes[..4].copy_from_slice(&(to_int32(value) as u32).to_le_bytes())
                }
                TypedKind::Float32 => {
                    bytes[..4].copy_from_slice(&(value as f32).to_le_bytes())
                }
                TypedKind::Float64 => bytes[..8].copy_from_slice(&value.to_le_bytes()),
            }
        });
    }

    /// Read an element, raising RangeError when the requested index
    /// plus element width exceeds the view's bounds. Used by explicit
    /// view operations rather than indexed element access.
    pub fn read_checked(&self, index: usize) -> AccessResult<f64> {
        self.get(index).ok_or_else(|| {
            AccessError::range_error(format!(
                "index {index} out of bounds for {} of length {}",
                self.kind.name(),
                self.length()
            ))
        })
    }
}

/// ToInt32 modulo semantics for typed stores.
fn to_int32(value: f64) -> i32 {
    if !value.is_finite() {
        return 0;
    }
    let modulo = value.trunc().rem_euclid(4294967296.0);
    if modulo >= 2147483648.0 {
        (modulo - 4294967296.0) as i32
    } else {
        modulo as i32
    }
}

fn clamp_u8(value: f64) -> u8 {
    if value.is_nan() {
        0
    } else {
        value.round_ties_even().clamp(0.0, 255.0) as u8
    }
}
