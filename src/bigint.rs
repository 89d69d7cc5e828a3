//! Arbitrary-precision integers backing the `BigInt` primitive.

use crate::gc::{empty_trace, Finalize, Trace};
use crate::error::{JsNativeError, JsResult};
use num_bigint::{BigInt, Sign};
use num_traits::{ToPrimitive, Zero};
use std::{fmt, ops::Deref, rc::Rc};

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct JsBigInt(Rc<BigInt>);

unsafe impl Trace for JsBigInt {
    empty_trace!();
}
impl Finalize for JsBigInt {}

impl JsBigInt {
    pub fn new<T: Into<BigInt>>(value: T) -> Self {
        Self(Rc::new(value.into()))
    }

    pub fn from_string(s: &str, radix: u32) -> Option<Self> {
        BigInt::parse_bytes(s.trim().as_bytes(), radix).map(Self::new)
    }

    pub fn zero() -> Self {
        Self::new(BigInt::zero())
    }

    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(f64::NAN)
    }

    pub fn to_string_radix(&self, radix: u32) -> String {
        self.0.to_str_radix(radix)
    }

    pub fn add(&self, other: &Self) -> Self {
        Self::new(&*self.0 + &*other.0)
    }
    pub fn sub(&self, other: &Self) -> Self {
        Self::new(&*self.0 - &*other.0)
    }
    pub fn mul(&self, other: &Self) -> Self {
        Self::new(&*self.0 * &*other.0)
    }
    pub fn div(&self, other: &Self) -> JsResult<Self> {
        if other.0.is_zero() {
            return Err(JsNativeError::range("division by zero").into());
        }
        Ok(Self::new(&*self.0 / &*other.0))
    }
    pub fn rem(&self, other: &Self) -> JsResult<Self> {
        if other.0.is_zero() {
            return Err(JsNativeError::range("division by zero").into());
        }
        Ok(Self::new(&*self.0 % &*other.0))
    }
    pub fn neg(&self) -> Self {
        Self::new(-&*self.0)
    }
    pub fn pow(&self, exponent: &Self) -> JsResult<Self> {
        if exponent.0.sign() == Sign::Minus {
            return Err(JsNativeError::range("BigInt negative exponent").into());
        }
        let exp = exponent
            .0
            .to_u32()
            .ok_or_else(|| JsNativeError::range("BigInt exponent too large"))?;
        Ok(Self::new(self.0.pow(exp)))
    }

    pub fn bitand(&self, other: &Self) -> Self {
        Self::new(&*self.0 & &*other.0)
    }
    pub fn bitor(&self, other: &Self) -> Self {
        Self::new(&*self.0 | &*other.0)
    }
    pub fn bitxor(&self, other: &Self) -> Self {
        Self::new(&*self.0 ^ &*other.0)
    }
    pub fn not(&self) -> Self {
        Self::new(!&*self.0)
    }
    pub fn shl(&self, rhs: u32) -> Self {
        Self::new(&*self.0 << rhs)
    }
    pub fn shr(&self, rhs: u32) -> Self {
        Self::new(&*self.0 >> rhs)
    }

    pub fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Truncates to `bits` bits and reinterprets as two's-complement signed,
    /// as required for `BigInt64Array` element coercion.
    pub fn as_i64_wrapping(&self) -> i64 {
        let mask = BigInt::from(1u64) << 64;
        let mut v = &*self.0 % &mask;
        if v.sign() == Sign::Minus {
            v += &mask;
        }
        // v is now in [0, 2^64); reinterpret the low 64 bits as i64.
        let (_, bytes) = v.to_bytes_le();
        let mut buf = [0u8; 8];
        for (i, b) in bytes.iter().take(8).enumerate() {
            buf[i] = *b;
        }
        i64::from_le_bytes(buf)
    }

    /// Truncates to the low 64 bits, unsigned, for `BigUint64Array`.
    pub fn as_u64_wrapping(&self) -> u64 {
        let mask = BigInt::from(1u128) << 64;
        let mut v = &*self.0 % &mask;
        if v.sign() == Sign::Minus {
            v += &mask;
        }
        let (_, bytes) = v.to_bytes_le();
        let mut buf = [0u8; 8];
        for (i, b) in bytes.iter().take(8).enumerate() {
            buf[i] = *b;
        }
        u64::from_le_bytes(buf)
    }
}

impl Deref for JsBigInt {
    type Target = BigInt;
    fn deref(&self) -> &BigInt {
        &self.0
    }
}

impl fmt::Display for JsBigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = JsBigInt::new(10);
        let b = JsBigInt::new(3);
        assert_eq!(a.div(&b).unwrap().to_string_radix(10), "3");
        assert_eq!(a.rem(&b).unwrap().to_string_radix(10), "1");
        assert!(a.div(&JsBigInt::zero()).is_err());
    }

    #[test]
    fn wraps_to_64_bits() {
        let huge = JsBigInt::new(BigInt::from(1u128) << 70);
        assert_eq!(huge.as_u64_wrapping(), 0);
        let neg_one = JsBigInt::new(-1);
        assert_eq!(neg_one.as_i64_wrapping(), -1);
        assert_eq!(neg_one.as_u64_wrapping(), u64::MAX);
    }
}
