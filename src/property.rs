//! Property descriptors and attributes (spec.md §3 `PropertyDescriptor`, §4.1).

use crate::gc::{empty_trace, Finalize, Trace};
use crate::symbol::JsSymbol;
use crate::string::JsString;
use crate::value::JsValue;
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Which of `writable`/`enumerable`/`configurable` are *present* on a
    /// descriptor, independent of their boolean value. A freshly-created
    /// slot on a non-extensible object must still default absent booleans
    /// to `false` per ECMA-262 §6.2.5 rather than silently becoming `true`,
    /// which is why presence is tracked separately from value.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct AttributeFlags: u8 {
        const WRITABLE      = 0b0000_0001;
        const HAS_WRITABLE   = 0b0000_0010;
        const ENUMERABLE    = 0b0000_0100;
        const HAS_ENUMERABLE = 0b0000_1000;
        const CONFIGURABLE  = 0b0001_0000;
        const HAS_CONFIGURABLE = 0b0010_0000;
    }
}

unsafe impl Trace for AttributeFlags {
    empty_trace!();
}
impl Finalize for AttributeFlags {}

/// A lightweight, fully-specified set of attributes, used when building
/// intrinsics where every field is always present.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Attribute(AttributeFlags);

impl Attribute {
    pub const fn new(writable: bool, enumerable: bool, configurable: bool) -> Self {
        let mut bits = AttributeFlags::HAS_WRITABLE.bits()
            | AttributeFlags::HAS_ENUMERABLE.bits()
            | AttributeFlags::HAS_CONFIGURABLE.bits();
        if writable {
            bits |= AttributeFlags::WRITABLE.bits();
        }
        if enumerable {
            bits |= AttributeFlags::ENUMERABLE.bits();
        }
        if configurable {
            bits |= AttributeFlags::CONFIGURABLE.bits();
        }
        Self(AttributeFlags::from_bits_truncate(bits))
    }

    /// `{writable: true, enumerable: true, configurable: true}` — the
    /// default for properties created by ordinary assignment.
    pub const fn all() -> Self {
        Self::new(true, true, true)
    }

    /// `{writable: false, enumerable: false, configurable: false}` — the
    /// default for built-in methods installed on prototypes.
    pub const fn non_enumerable() -> Self {
        Self::new(true, false, true)
    }

    pub const fn read_only() -> Self {
        Self::new(false, false, false)
    }

    pub fn writable(self) -> bool {
        self.0.contains(AttributeFlags::WRITABLE)
    }
    pub fn enumerable(self) -> bool {
        self.0.contains(AttributeFlags::ENUMERABLE)
    }
    pub fn configurable(self) -> bool {
        self.0.contains(AttributeFlags::CONFIGURABLE)
    }
}

impl Default for Attribute {
    fn default() -> Self {
        Self::all()
    }
}

/// A property key: array-index, string, or symbol (spec.md §4.1).
///
/// `own_keys` ordering relies on being able to cheaply distinguish the
/// `Index` variant from `String` without re-parsing, since canonical numeric
/// indices are sorted ascending ahead of insertion-ordered string keys.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum PropertyKey {
    Index(u32),
    String(JsString),
    Symbol(JsSymbol),
}

impl PropertyKey {
    pub fn from_str(s: &str) -> Self {
        if let Some(index) = canonical_numeric_index(s) {
            PropertyKey::Index(index)
        } else {
            PropertyKey::String(JsString::new(s))
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, PropertyKey::String(s) if s.as_str().starts_with('#'))
    }
}

/// §7.1.21 CanonicalNumericIndexString, restricted to the array-index
/// subset (0 <= n < 2^32 - 1) that `own_keys` must sort numerically.
fn canonical_numeric_index(s: &str) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    if s == "0" {
        return Some(0);
    }
    if s.starts_with('0') || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: u64 = s.parse().ok()?;
    if n < u32::MAX as u64 {
        Some(n as u32)
    } else {
        None
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::Index(i) => write!(f, "{i}"),
            PropertyKey::String(s) => write!(f, "{s}"),
            PropertyKey::Symbol(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        PropertyKey::from_str(s)
    }
}
impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        PropertyKey::from_str(&s)
    }
}
impl From<JsString> for PropertyKey {
    fn from(s: JsString) -> Self {
        PropertyKey::from_str(s.as_str())
    }
}
impl From<u32> for PropertyKey {
    fn from(i: u32) -> Self {
        PropertyKey::Index(i)
    }
}
impl From<JsSymbol> for PropertyKey {
    fn from(s: JsSymbol) -> Self {
        PropertyKey::Symbol(s)
    }
}

/// A full property descriptor, as returned by `getOwnPropertyDescriptor` and
/// accepted by `defineProperty`. Every field is independently optional so
/// that partial descriptors (`{value: 1}`) can be merged against an
/// existing stored descriptor per §9.1.6.3 `ValidateAndApplyPropertyDescriptor`.
#[derive(Clone, Debug, Default)]
pub struct PropertyDescriptor {
    pub value: Option<JsValue>,
    pub writable: Option<bool>,
    pub get: Option<JsValue>,
    pub set: Option<JsValue>,
    pub enumerable: Option<bool>,
    pub configurable: Option<bool>,
}

impl PropertyDescriptor {
    pub fn data(value: JsValue, writable: bool, enumerable: bool, configurable: bool) -> Self {
        Self {
            value: Some(value),
            writable: Some(writable),
            enumerable: Some(enumerable),
            configurable: Some(configurable),
            get: None,
            set: None,
        }
    }

    pub fn accessor(
        get: Option<JsValue>,
        set: Option<JsValue>,
        enumerable: bool,
        configurable: bool,
    ) -> Self {
        Self {
            value: None,
            writable: None,
            get,
            set,
            enumerable: Some(enumerable),
            configurable: Some(configurable),
        }
    }

    pub fn is_data_descriptor(&self) -> bool {
        self.value.is_some() || self.writable.is_some()
    }

    pub fn is_accessor_descriptor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    pub fn is_generic_descriptor(&self) -> bool {
        !self.is_data_descriptor() && !self.is_accessor_descriptor()
    }

    /// §6.2.5.6 CompletePropertyDescriptor — fills in defaults for an
    /// absent field on a *new* property only; existing properties merge
    /// against their own current attributes instead (see
    /// `object::operations::validate_and_apply`).
    pub fn complete(mut self) -> Self {
        if self.is_accessor_descriptor() {
            self.get = Some(self.get.unwrap_or(JsValue::undefined()));
            self.set = Some(self.set.unwrap_or(JsValue::undefined()));
        } else {
            self.value = Some(self.value.unwrap_or(JsValue::undefined()));
            self.writable = Some(self.writable.unwrap_or(false));
        }
        self.enumerable = Some(self.enumerable.unwrap_or(false));
        self.configurable = Some(self.configurable.unwrap_or(false));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_index_recognition() {
        assert_eq!(PropertyKey::from_str("0"), PropertyKey::Index(0));
        assert_eq!(PropertyKey::from_str("42"), PropertyKey::Index(42));
        assert!(matches!(PropertyKey::from_str("01"), PropertyKey::String(_)));
        assert!(matches!(PropertyKey::from_str("-1"), PropertyKey::String(_)));
        assert!(matches!(PropertyKey::from_str("4294967295"), PropertyKey::String(_)));
    }

    #[test]
    fn descriptor_flavor_is_mutually_exclusive() {
        let d = PropertyDescriptor::data(JsValue::from(1.0), true, true, true);
        assert!(d.is_data_descriptor());
        assert!(!d.is_accessor_descriptor());
    }

    #[test]
    fn complete_defaults_absent_booleans_to_false() {
        let d = PropertyDescriptor {
            value: Some(JsValue::from(1.0)),
            ..Default::default()
        }
        .complete();
        assert_eq!(d.writable, Some(false));
        assert_eq!(d.enumerable, Some(false));
        assert_eq!(d.configurable, Some(false));
    }
}
