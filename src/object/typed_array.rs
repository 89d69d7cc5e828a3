//! TypedArray views over `ArrayBuffer` storage (spec.md §3 "TypedArray
//! view", §4.3).
//!
//! Grounded on `boa/src/builtins/typed_array/integer_indexed_object.rs`'s
//! byte-offset + element-kind shape and the per-kind files under
//! `boa/src/builtins/typed_arrays/`.

use crate::bigint::JsBigInt;
use crate::error::{JsNativeError, JsResult};
use crate::gc::{Finalize, Trace};
use crate::object::{ArrayBufferData, JsObject, ObjectData};
use crate::property::PropertyKey;
use crate::value::JsValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Trace, Finalize)]
pub enum ElementKind {
    U8,
    U8Clamped,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
    BigInt64,
    BigUint64,
}

impl ElementKind {
    pub fn bytes_per_element(self) -> usize {
        match self {
            ElementKind::U8 | ElementKind::U8Clamped | ElementKind::I8 => 1,
            ElementKind::U16 | ElementKind::I16 => 2,
            ElementKind::U32 | ElementKind::I32 | ElementKind::F32 => 4,
            ElementKind::F64 | ElementKind::BigInt64 | ElementKind::BigUint64 => 8,
        }
    }

    pub fn is_bigint(self) -> bool {
        matches!(self, ElementKind::BigInt64 | ElementKind::BigUint64)
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementKind::U8 => "Uint8Array",
            ElementKind::U8Clamped => "Uint8ClampedArray",
            ElementKind::I8 => "Int8Array",
            ElementKind::U16 => "Uint16Array",
            ElementKind::I16 => "Int16Array",
            ElementKind::U32 => "Uint32Array",
            ElementKind::I32 => "Int32Array",
            ElementKind::F32 => "Float32Array",
            ElementKind::F64 => "Float64Array",
            ElementKind::BigInt64 => "BigInt64Array",
            ElementKind::BigUint64 => "BigUint64Array",
        }
    }
}

#[derive(Debug, Trace, Finalize)]
pub struct TypedArrayData {
    pub buffer: JsObject,
    #[unsafe_ignore_trace]
    pub byte_offset: usize,
    #[unsafe_ignore_trace]
    pub kind: ElementKind,
    /// `None` means length-tracking: recomputed from the buffer's current
    /// byte length on every access (spec.md §4.3).
    #[unsafe_ignore_trace]
    fixed_length: Option<u32>,
}

impl TypedArrayData {
    pub fn new(buffer: JsObject, byte_offset: usize, kind: ElementKind, fixed_length: Option<u32>) -> Self {
        Self {
            buffer,
            byte_offset,
            kind,
            fixed_length,
        }
    }

    pub fn is_length_tracking(&self) -> bool {
        self.fixed_length.is_none()
    }

    fn with_buffer<R>(&self, f: impl FnOnce(&ArrayBufferData) -> R) -> R {
        let buf = self.buffer.borrow();
        let ObjectData::ArrayBuffer(ab) = &buf.data else {
            unreachable!("TypedArray buffer field must be an ArrayBuffer");
        };
        f(ab)
    }

    /// §10.4.5.9 IntegerIndexedObjectLength, generalized with
    /// length-tracking recomputation.
    pub fn length(&self) -> u32 {
        self.with_buffer(|ab| {
            if ab.is_detached() {
                return 0;
            }
            match self.fixed_length {
                Some(n) => n,
                None => {
                    let avail = ab.byte_length().saturating_sub(self.byte_offset);
                    (avail / self.kind.bytes_per_element()) as u32
                }
            }
        })
    }

    pub fn is_out_of_bounds(&self) -> bool {
        self.with_buffer(|ab| {
            if ab.is_detached() {
                return true;
            }
            let bpe = self.kind.bytes_per_element();
            match self.fixed_length {
                Some(n) => self.byte_offset + n as usize * bpe > ab.byte_length(),
                None => self.byte_offset > ab.byte_length(),
            }
        })
    }

    fn byte_at(&self, index: u32) -> usize {
        self.byte_offset + index as usize * self.kind.bytes_per_element()
    }

    pub fn get_element(&self, index: u32) -> Option<JsValue> {
        if self.is_out_of_bounds() || index >= self.length() {
            return None;
        }
        let bpe = self.kind.bytes_per_element();
        let start = self.byte_at(index);
        self.with_buffer(|ab| {
            let slice = &ab.bytes()[start..start + bpe];
            Some(decode_element(self.kind, slice))
        })
    }

    pub fn set_element(&self, index: u32, value: &JsValue) -> JsResult<bool> {
        if self.is_out_of_bounds() {
            return Err(JsNativeError::typ("typed array is out of bounds").into());
        }
        if index >= self.length() {
            return Ok(false);
        }
        let bytes = encode_element(self.kind, value)?;
        let start = self.byte_at(index);
        let mut buf = self.buffer.borrow_mut();
        let ObjectData::ArrayBuffer(ab) = &mut buf.data else {
            unreachable!();
        };
        ab.bytes_mut()[start..start + bytes.len()].copy_from_slice(&bytes);
        Ok(true)
    }

    pub fn to_vec(&self) -> Vec<JsValue> {
        (0..self.length()).filter_map(|i| self.get_element(i)).collect()
    }
}

fn decode_element(kind: ElementKind, bytes: &[u8]) -> JsValue {
    match kind {
        ElementKind::U8 | ElementKind::U8Clamped => JsValue::from(bytes[0] as f64),
        ElementKind::I8 => JsValue::from(bytes[0] as i8 as f64),
        ElementKind::U16 => JsValue::from(u16::from_le_bytes([bytes[0], bytes[1]]) as f64),
        ElementKind::I16 => JsValue::from(i16::from_le_bytes([bytes[0], bytes[1]]) as f64),
        ElementKind::U32 => JsValue::from(u32::from_le_bytes(bytes.try_into().unwrap()) as f64),
        ElementKind::I32 => JsValue::from(i32::from_le_bytes(bytes.try_into().unwrap()) as f64),
        ElementKind::F32 => JsValue::from(f32::from_le_bytes(bytes.try_into().unwrap()) as f64),
        ElementKind::F64 => JsValue::from(f64::from_le_bytes(bytes.try_into().unwrap())),
        ElementKind::BigInt64 => {
            JsValue::BigInt(JsBigInt::new(i64::from_le_bytes(bytes.try_into().unwrap())))
        }
        ElementKind::BigUint64 => {
            JsValue::BigInt(JsBigInt::new(u64::from_le_bytes(bytes.try_into().unwrap())))
        }
    }
}

fn encode_element(kind: ElementKind, value: &JsValue) -> JsResult<Vec<u8>> {
    if kind.is_bigint() {
        let JsValue::BigInt(b) = value else {
            return Err(JsNativeError::typ("cannot convert Number to a BigInt").into());
        };
        return Ok(match kind {
            ElementKind::BigInt64 => b.as_i64_wrapping().to_le_bytes().to_vec(),
            ElementKind::BigUint64 => b.as_u64_wrapping().to_le_bytes().to_vec(),
            _ => unreachable!(),
        });
    }
    let n = match value {
        JsValue::Number(n) => *n,
        JsValue::BigInt(_) => {
            return Err(JsNativeError::typ("cannot convert a BigInt to a Number").into())
        }
        _ => f64::NAN,
    };
    Ok(match kind {
        ElementKind::U8 => [to_uint_n(n, 8) as u8].to_vec(),
        ElementKind::U8Clamped => [clamp_u8_round_half_even(n)].to_vec(),
        ElementKind::I8 => [to_uint_n(n, 8) as i8 as u8].to_vec(),
        ElementKind::U16 => (to_uint_n(n, 16) as u16).to_le_bytes().to_vec(),
        ElementKind::I16 => (to_uint_n(n, 16) as u16 as i16).to_le_bytes().to_vec(),
        ElementKind::U32 => (to_uint_n(n, 32) as u32).to_le_bytes().to_vec(),
        ElementKind::I32 => (to_uint_n(n, 32) as u32 as i32).to_le_bytes().to_vec(),
        ElementKind::F32 => (n as f32).to_le_bytes().to_vec(),
        ElementKind::F64 => n.to_le_bytes().to_vec(),
        ElementKind::BigInt64 | ElementKind::BigUint64 => unreachable!(),
    })
}

/// §7.1.7-ish ToIntegerOrInfinity + modulo 2^n, used for the non-clamped
/// integer element kinds.
fn to_uint_n(n: f64, bits: u32) -> u64 {
    if n.is_nan() || n.is_infinite() {
        return 0;
    }
    let truncated = n.trunc();
    let modulus = 2f64.powi(bits as i32);
    let m = truncated.rem_euclid(modulus);
    m as u64
}

/// `Uint8ClampedArray` clamps with round-half-to-even (spec.md §4.3).
fn clamp_u8_round_half_even(n: f64) -> u8 {
    if n.is_nan() || n <= 0.0 {
        return 0;
    }
    if n >= 255.0 {
        return 255;
    }
    let floor = n.floor();
    let diff = n - floor;
    let rounded = if diff < 0.5 {
        floor
    } else if diff > 0.5 {
        floor + 1.0
    } else if (floor as u64) % 2 == 0 {
        floor
    } else {
        floor + 1.0
    };
    rounded as u8
}

pub fn indexed_get(obj: &JsObject, key: &PropertyKey) -> JsResult<Option<JsValue>> {
    let PropertyKey::Index(i) = key else {
        return Ok(None);
    };
    let ta = obj.borrow();
    let ObjectData::TypedArray(ta) = &ta.data else {
        return Ok(None);
    };
    if ta.is_out_of_bounds() {
        return Err(JsNativeError::typ("typed array is out of bounds").into());
    }
    Ok(ta.get_element(*i))
}

pub fn indexed_set(obj: &JsObject, index: u32, value: JsValue) -> JsResult<bool> {
    let ta = obj.borrow();
    let ObjectData::TypedArray(ta) = &ta.data else {
        unreachable!("indexed_set called on non-typed-array");
    };
    ta.set_element(index, &value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_view(kind: ElementKind, byte_len: usize) -> JsObject {
        let buf = JsObject::new(
            ObjectData::ArrayBuffer(ArrayBufferData::new(byte_len)),
            JsValue::null(),
        );
        let ta = TypedArrayData::new(buf, 0, kind, Some((byte_len / kind.bytes_per_element()) as u32));
        JsObject::new(ObjectData::TypedArray(ta), JsValue::null())
    }

    #[test]
    fn u8_clamped_rounds_half_to_even() {
        assert_eq!(clamp_u8_round_half_even(0.5), 0);
        assert_eq!(clamp_u8_round_half_even(1.5), 2);
        assert_eq!(clamp_u8_round_half_even(-5.0), 0);
        assert_eq!(clamp_u8_round_half_even(300.0), 255);
    }

    #[test]
    fn length_tracking_view_follows_resize() {
        let buf = JsObject::new(ObjectData::ArrayBuffer(ArrayBufferData::resizable(4, 8)), JsValue::null());
        let ta = TypedArrayData::new(buf.clone(), 0, ElementKind::U8, None);
        assert_eq!(ta.length(), 4);
        if let ObjectData::ArrayBuffer(ab) = &mut buf.borrow_mut().data {
            ab.resize(8).unwrap();
        }
        assert_eq!(ta.length(), 8);
    }

    #[test]
    fn detached_buffer_reports_out_of_bounds() {
        let view = make_view(ElementKind::U8, 4);
        indexed_set(&view, 0, JsValue::from(9.0)).unwrap();
        let buffer = match &view.borrow().data {
            ObjectData::TypedArray(ta) => ta.buffer.clone(),
            _ => unreachable!(),
        };
        if let ObjectData::ArrayBuffer(ab) = &mut buffer.borrow_mut().data {
            ab.detach();
        }
        assert!(indexed_get(&view, &PropertyKey::Index(0)).is_err());
    }

    #[test]
    fn bigint64_rejects_number_input() {
        let view = make_view(ElementKind::BigInt64, 8);
        assert!(indexed_set(&view, 0, JsValue::from(1.0)).is_err());
        assert!(indexed_set(&view, 0, JsValue::BigInt(JsBigInt::new(1))).unwrap());
    }
}
