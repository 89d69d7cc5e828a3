//! Set / Map / WeakSet / WeakMap storage (spec.md §3/§4.4).
//!
//! Grounded on `boa/src/builtins/map/ordered_map.rs` and
//! `boa/src/builtins/set/ordered_set.rs`'s insertion-ordered wrapper
//! shape, reusing `indexmap::IndexMap` (the teacher's own dependency)
//! directly rather than reimplementing an ordered hash table.

use crate::gc::{custom_trace, Finalize, Trace};
use crate::object::JsObject;
use crate::value::JsValue;
use indexmap::{IndexMap, IndexSet};

/// SameValueZero wrapper so `JsValue` can key an `IndexMap`/`IndexSet`
/// (NaN must hash/eq identically to itself, +0/-0 must collapse).
#[derive(Clone, Debug)]
pub struct SvzKey(pub JsValue);

impl PartialEq for SvzKey {
    fn eq(&self, other: &Self) -> bool {
        JsValue::same_value_zero(&self.0, &other.0)
    }
}
impl Eq for SvzKey {}

impl std::hash::Hash for SvzKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match &self.0 {
            JsValue::Undefined => 0u8.hash(state),
            JsValue::Null => 1u8.hash(state),
            JsValue::Boolean(b) => {
                2u8.hash(state);
                b.hash(state);
            }
            JsValue::Number(n) => {
                3u8.hash(state);
                // SameValueZero: NaN hashes equal to itself, +0/-0 collapse.
                if n.is_nan() {
                    0xdeadbeefu64.hash(state);
                } else if *n == 0.0 {
                    0u64.hash(state);
                } else {
                    n.to_bits().hash(state);
                }
            }
            JsValue::String(s) => {
                4u8.hash(state);
                s.as_str().hash(state);
            }
            JsValue::BigInt(b) => {
                5u8.hash(state);
                b.to_string_radix(10).hash(state);
            }
            JsValue::Symbol(s) => {
                6u8.hash(state);
                s.id().hash(state);
            }
            JsValue::Object(o) => {
                7u8.hash(state);
                o.ptr_id().hash(state);
            }
        }
    }
}

unsafe impl Trace for SvzKey {
    custom_trace!(this, {
        mark(&this.0);
    });
}
impl Finalize for SvzKey {}

#[derive(Debug, Trace, Finalize, Default)]
pub struct SetData {
    entries: IndexSet<SvzKey>,
}

impl SetData {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn add(&mut self, value: JsValue) {
        self.entries.insert(SvzKey(value));
    }
    pub fn has(&self, value: &JsValue) -> bool {
        self.entries.contains(&SvzKey(value.clone()))
    }
    pub fn delete(&mut self, value: &JsValue) -> bool {
        self.entries.shift_remove(&SvzKey(value.clone()))
    }
    pub fn clear(&mut self) {
        self.entries.clear();
    }
    pub fn size(&self) -> usize {
        self.entries.len()
    }
    pub fn values(&self) -> impl Iterator<Item = &JsValue> {
        self.entries.iter().map(|k| &k.0)
    }
}

#[derive(Debug, Trace, Finalize, Default)]
pub struct MapData {
    entries: IndexMap<SvzKey, JsValue>,
}

impl MapData {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set(&mut self, key: JsValue, value: JsValue) {
        self.entries.insert(SvzKey(key), value);
    }
    pub fn get(&self, key: &JsValue) -> Option<JsValue> {
        self.entries.get(&SvzKey(key.clone())).cloned()
    }
    pub fn has(&self, key: &JsValue) -> bool {
        self.entries.contains_key(&SvzKey(key.clone()))
    }
    pub fn delete(&mut self, key: &JsValue) -> bool {
        self.entries.shift_remove(&SvzKey(key.clone())).is_some()
    }
    pub fn clear(&mut self) {
        self.entries.clear();
    }
    pub fn size(&self) -> usize {
        self.entries.len()
    }
    pub fn entries(&self) -> impl Iterator<Item = (&JsValue, &JsValue)> {
        self.entries.iter().map(|(k, v)| (&k.0, v))
    }
}

/// Weak-keyed collections (spec.md §4.4): only objects may be keys; entries
/// are conceptually ephemeron-weak. This crate's GC (`gc`-crate, reference
/// counted) has no ephemeron primitive, so membership is pruned explicitly
/// at safe points rather than automatically on collection — see DESIGN.md's
/// "Weak collections" resolution.
#[derive(Debug, Trace, Finalize, Default)]
pub struct WeakMapData {
    entries: Vec<(JsObject, JsValue)>,
}

impl WeakMapData {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set(&mut self, key: JsObject, value: JsValue) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| JsObject::ptr_eq(k, &key)) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }
    pub fn get(&self, key: &JsObject) -> Option<JsValue> {
        self.entries
            .iter()
            .find(|(k, _)| JsObject::ptr_eq(k, key))
            .map(|(_, v)| v.clone())
    }
    pub fn has(&self, key: &JsObject) -> bool {
        self.entries.iter().any(|(k, _)| JsObject::ptr_eq(k, key))
    }
    pub fn delete(&mut self, key: &JsObject) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !JsObject::ptr_eq(k, key));
        before != self.entries.len()
    }

    /// Drops entries whose key is no longer reachable from anywhere except
    /// this table, per the weak-membership discipline (spec.md §3
    /// "Lifecycle"). `is_live` is supplied by the caller (the `Realm`/GC
    /// root set walk), since this crate's cycle-collected `Gc` doesn't
    /// expose an ephemeron primitive to answer that question on its own —
    /// see DESIGN.md's "Weak collections" resolution.
    pub fn prune(&mut self, is_live: impl Fn(&JsObject) -> bool) {
        self.entries.retain(|(k, _)| is_live(k));
    }
}

#[derive(Debug, Trace, Finalize, Default)]
pub struct WeakSetData {
    entries: Vec<JsObject>,
}

impl WeakSetData {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn add(&mut self, value: JsObject) {
        if !self.has(&value) {
            self.entries.push(value);
        }
    }
    pub fn has(&self, value: &JsObject) -> bool {
        self.entries.iter().any(|v| JsObject::ptr_eq(v, value))
    }
    pub fn delete(&mut self, value: &JsObject) -> bool {
        let before = self.entries.len();
        self.entries.retain(|v| !JsObject::ptr_eq(v, value));
        before != self.entries.len()
    }
    pub fn prune(&mut self, is_live: impl Fn(&JsObject) -> bool) {
        self.entries.retain(|k| is_live(k));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_dedupes_nan_and_preserves_insertion_order() {
        let mut s = SetData::new();
        s.add(JsValue::from(1.0));
        s.add(JsValue::from(1.0));
        s.add(JsValue::nan());
        s.add(JsValue::nan());
        let values: Vec<f64> = s.values().map(|v| v.as_number().unwrap_or(f64::NAN)).collect();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], 1.0);
        assert!(values[1].is_nan());
    }

    #[test]
    fn map_get_set_delete() {
        let mut m = MapData::new();
        m.set(JsValue::from("k"), JsValue::from(1.0));
        assert_eq!(m.get(&JsValue::from("k")).unwrap().as_number(), Some(1.0));
        assert!(m.delete(&JsValue::from("k")));
        assert!(!m.has(&JsValue::from("k")));
    }

    #[test]
    fn weakmap_rejects_nothing_at_storage_layer_keys_are_objects() {
        let mut wm = WeakMapData::new();
        let key = JsObject::ordinary(JsValue::null());
        wm.set(key.clone(), JsValue::from(1.0));
        assert!(wm.has(&key));
    }
}
