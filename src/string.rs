//! The engine's interned/refcounted string representation.
//!
//! JavaScript strings are immutable sequences of UTF-16 code units, but the
//! overwhelming majority of runtime strings are well-formed UTF-8, so
//! `JsString` stores a Rust `str` under a reference count and only pays for
//! UTF-16 awareness (`encode_utf16`) at the boundary where the spec cares
//! about surrogate pairs (the RegExp normalizer and the `String` iteration
//! protocol).

use crate::gc::{empty_trace, Finalize, Trace};
use std::{
    fmt,
    hash::{Hash, Hasher},
    ops::Deref,
    rc::Rc,
};

#[derive(Clone, Eq)]
pub struct JsString(Rc<str>);

unsafe impl Trace for JsString {
    empty_trace!();
}
impl Finalize for JsString {}

impl JsString {
    #[inline]
    pub fn new<S: Into<Rc<str>>>(s: S) -> Self {
        Self(s.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in UTF-16 code units, as `String.prototype.length` observes it.
    pub fn utf16_len(&self) -> usize {
        self.0.encode_utf16().count()
    }

    pub fn utf16_code_units(&self) -> Vec<u16> {
        self.0.encode_utf16().collect()
    }

    /// Code point iteration treating unpaired surrogates as U+FFFD is not
    /// attempted here: since the host string is valid UTF-8, every code
    /// point is already well-formed. Astral code points correspond to two
    /// UTF-16 code units, which the RegExp normalizer accounts for.
    pub fn chars(&self) -> std::str::Chars<'_> {
        self.0.chars()
    }

    pub fn concat(&self, other: &JsString) -> JsString {
        let mut s = String::with_capacity(self.0.len() + other.0.len());
        s.push_str(&self.0);
        s.push_str(&other.0);
        JsString::new(s)
    }
}

impl Deref for JsString {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl PartialEq for JsString {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Hash for JsString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl fmt::Debug for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<&str> for JsString {
    fn from(s: &str) -> Self {
        Self(Rc::from(s))
    }
}

impl From<String> for JsString {
    fn from(s: String) -> Self {
        Self(Rc::from(s))
    }
}

impl From<Box<str>> for JsString {
    fn from(s: Box<str>) -> Self {
        Self(Rc::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_and_eq() {
        let a = JsString::new("foo");
        let b = JsString::new("bar");
        assert_eq!(a.concat(&b).as_str(), "foobar");
        assert_eq!(JsString::new("x"), JsString::new("x"));
    }

    #[test]
    fn utf16_len_counts_astral_as_surrogate_pair() {
        let s = JsString::new("\u{1F600}");
        assert_eq!(s.utf16_len(), 2);
        assert_eq!(s.chars().count(), 1);
    }
}
