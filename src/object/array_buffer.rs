//! `ArrayBuffer` storage (spec.md §3 "ArrayBuffer", §4.3).
//!
//! Grounded on `boa/src/builtins/array_buffer/mod.rs`'s fixed-length byte
//! vector shape; resizable buffers (`maxByteLength`) are a supplemented
//! TC39 feature not present in that 0.13-era snapshot (see DESIGN.md).

use crate::error::{JsNativeError, JsResult};
use crate::gc::{Finalize, Trace};

#[derive(Debug, Trace, Finalize)]
pub struct ArrayBufferData {
    #[unsafe_ignore_trace]
    bytes: Vec<u8>,
    #[unsafe_ignore_trace]
    max_byte_length: Option<usize>,
    #[unsafe_ignore_trace]
    detached: bool,
}

impl ArrayBufferData {
    pub fn new(byte_length: usize) -> Self {
        Self {
            bytes: vec![0; byte_length],
            max_byte_length: None,
            detached: false,
        }
    }

    pub fn resizable(byte_length: usize, max_byte_length: usize) -> Self {
        Self {
            bytes: vec![0; byte_length],
            max_byte_length: Some(max_byte_length),
            detached: false,
        }
    }

    pub fn byte_length(&self) -> usize {
        self.bytes.len()
    }

    pub fn max_byte_length(&self) -> Option<usize> {
        self.max_byte_length
    }

    pub fn is_resizable(&self) -> bool {
        self.max_byte_length.is_some()
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// §25.1.7.1 ArrayBuffer.prototype.resize (reallocates preserving
    /// `min(old,new)` bytes, per spec.md §4.3).
    pub fn resize(&mut self, new_len: usize) -> JsResult<()> {
        if self.detached {
            return Err(JsNativeError::typ("cannot resize a detached ArrayBuffer").into());
        }
        let Some(max) = self.max_byte_length else {
            return Err(JsNativeError::typ("ArrayBuffer is not resizable").into());
        };
        if new_len > max {
            return Err(JsNativeError::range("resize exceeds maxByteLength").into());
        }
        self.bytes.resize(new_len, 0);
        Ok(())
    }

    pub fn detach(&mut self) {
        self.bytes = Vec::new();
        self.detached = true;
    }

    /// §25.1.6.7 ArrayBuffer.prototype.slice — normalizes negative indices
    /// and copies into a fresh buffer.
    pub fn slice(&self, begin: i64, end: i64) -> ArrayBufferData {
        let len = self.bytes.len() as i64;
        let norm = |i: i64| -> usize {
            if i < 0 {
                (len + i).max(0) as usize
            } else {
                i.min(len) as usize
            }
        };
        let start = norm(begin).min(self.bytes.len());
        let stop = norm(end).max(start).min(self.bytes.len());
        let mut buf = ArrayBufferData::new(stop - start);
        buf.bytes.copy_from_slice(&self.bytes[start..stop]);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_preserves_min_old_new_bytes() {
        let mut b = ArrayBufferData::resizable(4, 8);
        b.bytes_mut()[0] = 9;
        b.resize(8).unwrap();
        assert_eq!(b.byte_length(), 8);
        assert_eq!(b.bytes()[0], 9);
    }

    #[test]
    fn resize_rejects_fixed_buffer() {
        let mut b = ArrayBufferData::new(4);
        assert!(b.resize(8).is_err());
    }

    #[test]
    fn detach_zeroes_length() {
        let mut b = ArrayBufferData::new(4);
        b.detach();
        assert!(b.is_detached());
        assert_eq!(b.byte_length(), 0);
    }
}
