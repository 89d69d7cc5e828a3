//! Array exotic object storage (spec.md §3 "Array", §4.2).
//!
//! Grounded on `boa/src/object/internal_methods/array.rs`'s `ArraySetLength`
//! implementation and `boa/src/builtins/array/array_iterator.rs`'s
//! `{value, done}` iterator shape.

use crate::error::{JsNativeError, JsResult};
use crate::gc::{Finalize, Trace};
use crate::object::{JsObject, ObjectData};
use crate::property::PropertyDescriptor;
use crate::property::PropertyKey;
use crate::value::JsValue;

/// Density threshold (spec.md §3: "up to a density threshold (≈10^6
/// elements)") above which new indices fall back to the sparse map instead
/// of growing the dense vector.
const DENSE_LIMIT: usize = 1_000_000;

#[derive(Debug, Trace, Finalize)]
pub struct ArrayData {
    /// `dense[i]` is `None` for a hole, `Some(v)` for an assigned slot.
    dense: Vec<Option<JsValue>>,
    sparse: std::collections::BTreeMap<u32, JsValue>,
    length: u32,
    #[unsafe_ignore_trace]
    length_writable: bool,
}

impl ArrayData {
    pub fn new() -> Self {
        Self {
            dense: Vec::new(),
            sparse: std::collections::BTreeMap::new(),
            length: 0,
            length_writable: true,
        }
    }

    pub fn from_values(values: Vec<JsValue>) -> Self {
        let length = values.len() as u32;
        Self {
            dense: values.into_iter().map(Some).collect(),
            sparse: std::collections::BTreeMap::new(),
            length,
            length_writable: true,
        }
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    /// Out-of-bounds and hole reads both return `undefined` (spec.md §4.2:
    /// "out-of-bounds reads return the `undefined` sentinel, not a hole").
    pub fn get(&self, index: u32) -> JsValue {
        if (index as usize) < self.dense.len() {
            return self.dense[index as usize].clone().unwrap_or(JsValue::undefined());
        }
        self.sparse.get(&index).cloned().unwrap_or(JsValue::undefined())
    }

    pub fn has(&self, index: u32) -> bool {
        if (index as usize) < self.dense.len() {
            self.dense[index as usize].is_some()
        } else {
            self.sparse.contains_key(&index)
        }
    }

    pub fn delete(&mut self, index: u32) {
        if (index as usize) < self.dense.len() {
            self.dense[index as usize] = None;
        } else {
            self.sparse.remove(&index);
        }
    }

    fn set_raw(&mut self, index: u32, value: JsValue) {
        let idx = index as usize;
        if idx < DENSE_LIMIT {
            if idx >= self.dense.len() {
                self.dense.resize(idx + 1, None);
            }
            self.dense[idx] = Some(value);
        } else {
            self.sparse.insert(index, value);
        }
        if index >= self.length {
            self.length = index + 1;
        }
    }

    pub fn own_index_keys(&self) -> Vec<PropertyKey> {
        let mut out = Vec::new();
        for (i, v) in self.dense.iter().enumerate() {
            if v.is_some() {
                out.push(PropertyKey::Index(i as u32));
            }
        }
        for k in self.sparse.keys() {
            out.push(PropertyKey::Index(*k));
        }
        out
    }

    /// §7.1.5/§10.4.2.4 ArraySetLength step 3-5: truncates storage and
    /// drops sparse keys at or above the new length.
    fn set_length(&mut self, new_len: u32) {
        if (new_len as usize) < self.dense.len() {
            self.dense.truncate(new_len as usize);
        }
        self.sparse.retain(|k, _| *k < new_len);
        self.length = new_len;
    }

    pub fn freeze(&mut self) {
        self.length_writable = false;
    }

    pub fn push(&mut self, value: JsValue) -> u32 {
        let idx = self.length;
        self.set_raw(idx, value);
        self.length
    }

    pub fn pop(&mut self) -> JsValue {
        if self.length == 0 {
            return JsValue::undefined();
        }
        let idx = self.length - 1;
        let v = self.get(idx);
        self.delete(idx);
        self.set_length(idx);
        v
    }

    pub fn shift(&mut self) -> JsValue {
        if self.length == 0 {
            return JsValue::undefined();
        }
        let first = self.get(0);
        for i in 1..self.length {
            let v = self.get(i);
            if self.has(i) {
                self.set_raw(i - 1, v);
            } else {
                self.delete(i - 1);
            }
        }
        let last = self.length - 1;
        self.delete(last);
        self.set_length(last);
        first
    }

    pub fn unshift(&mut self, values: &[JsValue]) -> u32 {
        let n = values.len() as u32;
        let old_len = self.length;
        for i in (0..old_len).rev() {
            let v = self.get(i);
            if self.has(i) {
                self.set_raw(i + n, v);
            } else {
                self.delete(i + n);
            }
        }
        for (i, v) in values.iter().enumerate() {
            self.set_raw(i as u32, v.clone());
        }
        self.length = old_len + n;
        self.length
    }

    pub fn reverse(&mut self) {
        let len = self.length;
        if len == 0 {
            return;
        }
        let mut i = 0u32;
        let mut j = len - 1;
        while i < j {
            let vi = self.get(i);
            let vj = self.get(j);
            let hi = self.has(i);
            let hj = self.has(j);
            if hj {
                self.set_raw(i, vj);
            } else {
                self.delete(i);
            }
            if hi {
                self.set_raw(j, vi);
            } else {
                self.delete(j);
            }
            i += 1;
            j -= 1;
        }
    }

    /// `splice(start, delete_count, items)`, returning the removed slice.
    pub fn splice(&mut self, start: u32, delete_count: u32, items: &[JsValue]) -> Vec<JsValue> {
        let len = self.length;
        let start = start.min(len);
        let delete_count = delete_count.min(len - start);
        let removed: Vec<JsValue> = (start..start + delete_count).map(|i| self.get(i)).collect();

        let tail: Vec<Option<JsValue>> = (start + delete_count..len)
            .map(|i| if self.has(i) { Some(self.get(i)) } else { None })
            .collect();

        let new_len = len - delete_count + items.len() as u32;
        for (offset, item) in items.iter().enumerate() {
            self.set_raw(start + offset as u32, item.clone());
        }
        for (offset, slot) in tail.into_iter().enumerate() {
            let at = start + items.len() as u32 + offset as u32;
            match slot {
                Some(v) => self.set_raw(at, v),
                None => self.delete(at),
            }
        }
        self.set_length(new_len);
        removed
    }

    pub fn to_vec(&self) -> Vec<JsValue> {
        (0..self.length).map(|i| self.get(i)).collect()
    }
}

impl Default for ArrayData {
    fn default() -> Self {
        Self::new()
    }
}

pub fn set_indexed(obj: &JsObject, index: u32, value: JsValue) -> JsResult<bool> {
    let mut o = obj.borrow_mut();
    let ObjectData::Array(arr) = &mut o.data else {
        unreachable!("set_indexed called on non-array");
    };
    if !arr.length_writable && index >= arr.length {
        return Ok(false);
    }
    arr.set_raw(index, value);
    Ok(true)
}

/// §9.4.2.4 ArraySetLength, driven from `defineProperty("length", desc)`.
pub fn set_length_descriptor(obj: &JsObject, desc: &PropertyDescriptor) -> bool {
    let Some(value) = &desc.value else {
        // Generic/accessor descriptor targeting "length" — only writable/
        // enumerable/configurable may be touched, and "length" is always
        // {enumerable:false, configurable:false}.
        if desc.is_accessor_descriptor() {
            return false;
        }
        if desc.enumerable == Some(true) || desc.configurable == Some(true) {
            return false;
        }
        if let Some(w) = desc.writable {
            let mut o = obj.borrow_mut();
            if let ObjectData::Array(arr) = &mut o.data {
                if !w && arr.length_writable {
                    arr.length_writable = false;
                } else if w && !arr.length_writable {
                    return false;
                }
            }
        }
        return true;
    };

    let n = to_length_u32(value);
    let Some(new_len) = n else {
        return false; // caller raises RangeError
    };
    let mut o = obj.borrow_mut();
    let ObjectData::Array(arr) = &mut o.data else {
        return false;
    };
    if !arr.length_writable {
        return false;
    }
    if let Some(w) = desc.writable {
        if !w {
            arr.length_writable = false;
        }
    }
    arr.set_length(new_len);
    true
}

/// §7.1.6-ish: ToNumber then ToUint32, validated equal to the original and
/// within range, per spec.md §4.2 step 1.
fn to_length_u32(value: &JsValue) -> Option<u32> {
    let n = match value {
        JsValue::Number(n) => *n,
        _ => return None,
    };
    if n.is_nan() || n.is_infinite() || n.fract() != 0.0 || n < 0.0 || n > u32::MAX as f64 {
        return None;
    }
    Some(n as u32)
}

pub fn raise_invalid_length() -> JsNativeError {
    JsNativeError::range("invalid array length")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_and_length_track_dense_storage() {
        let mut a = ArrayData::new();
        a.push(JsValue::from(1.0));
        a.push(JsValue::from(2.0));
        assert_eq!(a.length(), 2);
        assert_eq!(a.pop().as_number(), Some(2.0));
        assert_eq!(a.length(), 1);
    }

    #[test]
    fn out_of_bounds_read_is_undefined_not_hole() {
        let a = ArrayData::new();
        assert!(a.get(5).is_undefined());
        assert!(!a.has(5));
    }

    #[test]
    fn setting_beyond_length_grows_it() {
        let mut a = ArrayData::new();
        a.set_raw(9, JsValue::from(1.0));
        assert_eq!(a.length(), 10);
        assert!(!a.has(3));
    }

    #[test]
    fn splice_removes_and_inserts() {
        let mut a = ArrayData::from_values(vec![
            JsValue::from(1.0),
            JsValue::from(2.0),
            JsValue::from(3.0),
        ]);
        let removed = a.splice(1, 1, &[JsValue::from(9.0), JsValue::from(10.0)]);
        assert_eq!(removed.len(), 1);
        assert_eq!(a.to_vec().iter().map(|v| v.as_number().unwrap()).collect::<Vec<_>>(), vec![1.0, 9.0, 10.0, 3.0]);
    }

    #[test]
    fn reverse_preserves_holes() {
        let mut a = ArrayData::new();
        a.set_raw(0, JsValue::from(1.0));
        a.set_raw(2, JsValue::from(3.0));
        a.reverse(); // length 3: [1, hole, 3] -> [3, hole, 1]
        assert_eq!(a.get(0).as_number(), Some(3.0));
        assert!(!a.has(1));
        assert_eq!(a.get(2).as_number(), Some(1.0));
    }
}
