//! Property-descriptor protocol operations (spec.md §4.1), generalized off
//! the teacher's `boa/src/object/operations.rs` + `internal_methods.rs`
//! per-trap dispatch, collapsed here into free functions over `JsObject`
//! since this crate doesn't need the teacher's separate `internal_methods`
//! vtable (no Proxy-style trap override beyond the array/typed-array/module
//! exotic objects, which check their own kind inline).

use crate::error::{JsNativeError, JsResult};
use crate::object::{JsObject, ObjectData, PropertyMap};
use crate::property::{PropertyDescriptor, PropertyKey};
use crate::value::JsValue;
use std::collections::HashSet;

/// §9.1.8 [[Get]], generalized with a receiver for accessor `this`-binding.
///
/// `call_getter` is the evaluator's function-call entry point, injected to
/// avoid a dependency cycle between `object` and `exec`.
pub fn try_get(
    obj: &JsObject,
    key: &PropertyKey,
    receiver: &JsValue,
    call_getter: &mut dyn FnMut(&JsValue, &JsValue, &[JsValue]) -> JsResult<JsValue>,
) -> JsResult<Option<JsValue>> {
    try_get_with_seen(obj, key, receiver, call_getter, &mut HashSet::new())
}

fn try_get_with_seen(
    obj: &JsObject,
    key: &PropertyKey,
    receiver: &JsValue,
    call_getter: &mut dyn FnMut(&JsValue, &JsValue, &[JsValue]) -> JsResult<JsValue>,
    seen: &mut HashSet<usize>,
) -> JsResult<Option<JsValue>> {
    if let Some(v) = array_indexed_get(obj, key) {
        return Ok(Some(v));
    }
    if let Some(v) = super::typed_array::indexed_get(obj, key)? {
        return Ok(Some(v));
    }
    if let PropertyKey::String(s) = key {
        if s.as_str() == "length" {
            if let ObjectData::Array(arr) = &obj.borrow().data {
                return Ok(Some(JsValue::from(arr.length() as f64)));
            }
        }
        if let ObjectData::ModuleNamespace(ns) = &obj.borrow().data {
            return ns.get(s.as_str());
        }
    }

    let ptr = obj_ptr(obj);
    if !seen.insert(ptr) {
        // Cyclic prototype chain; treat as "not found" rather than loop.
        return Ok(None);
    }

    let found = obj.borrow().properties_ref().get(key).cloned();
    if let Some(desc) = found {
        return Ok(Some(resolve_descriptor(&desc, receiver, call_getter)?));
    }

    let proto = obj.prototype();
    match proto {
        JsValue::Object(parent) => try_get_with_seen(&parent, key, receiver, call_getter, seen),
        _ => Ok(None),
    }
}

fn resolve_descriptor(
    desc: &PropertyDescriptor,
    receiver: &JsValue,
    call_getter: &mut dyn FnMut(&JsValue, &JsValue, &[JsValue]) -> JsResult<JsValue>,
) -> JsResult<JsValue> {
    if desc.is_accessor_descriptor() {
        match &desc.get {
            Some(getter) if !matches!(getter, JsValue::Undefined) => {
                call_getter(getter, receiver, &[])
            }
            _ => Ok(JsValue::undefined()),
        }
    } else {
        Ok(desc.value.clone().unwrap_or(JsValue::undefined()))
    }
}

fn array_indexed_get(obj: &JsObject, key: &PropertyKey) -> Option<JsValue> {
    let PropertyKey::Index(i) = key else {
        return None;
    };
    match &obj.borrow().data {
        ObjectData::Array(arr) => Some(arr.get(*i)),
        _ => None,
    }
}

/// §9.1.9 [[Set]].
pub fn set(
    obj: &JsObject,
    key: PropertyKey,
    value: JsValue,
    receiver: &JsValue,
    call_setter: &mut dyn FnMut(&JsValue, &JsValue, &[JsValue]) -> JsResult<JsValue>,
) -> JsResult<bool> {
    if let PropertyKey::String(s) = &key {
        if s.as_str() == "__proto__" {
            return set_prototype_of(obj, value);
        }
    }

    if matches!(obj.borrow().data, ObjectData::ModuleNamespace(_)) {
        return super::module_namespace::reject_mutation("assign to");
    }

    if let PropertyKey::String(s) = &key {
        if s.as_str() == "length" && matches!(obj.borrow().data, ObjectData::Array(_)) {
            let desc = PropertyDescriptor::data(value, true, false, false);
            return Ok(super::array::set_length_descriptor(obj, &desc));
        }
    }

    if let PropertyKey::Index(i) = &key {
        if let ObjectData::Array(_) = &obj.borrow().data {
            return super::array::set_indexed(obj, *i, value);
        }
        if matches!(obj.borrow().data, ObjectData::TypedArray(_)) {
            return super::typed_array::indexed_set(obj, *i, value);
        }
    }

    let own = obj.borrow().properties_ref().get(&key).cloned();
    if let Some(desc) = own {
        if desc.is_accessor_descriptor() {
            return match &desc.set {
                Some(setter) if !matches!(setter, JsValue::Undefined) => {
                    call_setter(setter, receiver, std::slice::from_ref(&value))?;
                    Ok(true)
                }
                _ => Ok(false),
            };
        }
        if desc.writable == Some(false) {
            return Ok(false);
        }
        return write_own(obj, key, value);
    }

    // Walk the prototype chain looking for a setter.
    if let JsValue::Object(parent) = obj.prototype() {
        if let Some(desc) = find_inherited(&parent, &key) {
            if desc.is_accessor_descriptor() {
                return match &desc.set {
                    Some(setter) if !matches!(setter, JsValue::Undefined) => {
                        call_setter(setter, receiver, std::slice::from_ref(&value))?;
                        Ok(true)
                    }
                    _ => Ok(false),
                };
            }
            if desc.writable == Some(false) {
                return Ok(false);
            }
        }
    }

    if !obj.is_extensible() {
        return Ok(false);
    }
    write_own(obj, key, value)
}

fn find_inherited(start: &JsObject, key: &PropertyKey) -> Option<PropertyDescriptor> {
    let mut seen = HashSet::new();
    let mut current = start.clone();
    loop {
        if !seen.insert(obj_ptr(&current)) {
            return None;
        }
        if let Some(d) = current.borrow().properties_ref().get(key).cloned() {
            return Some(d);
        }
        match current.prototype() {
            JsValue::Object(p) => current = p,
            _ => return None,
        }
    }
}

fn write_own(obj: &JsObject, key: PropertyKey, value: JsValue) -> JsResult<bool> {
    let mut o = obj.borrow_mut();
    o.properties_mut()
        .insert(key, PropertyDescriptor::data(value, true, true, true));
    Ok(true)
}

/// §10.1.6.3 ValidateAndApplyPropertyDescriptor.
pub fn define(obj: &JsObject, key: PropertyKey, desc: PropertyDescriptor) -> bool {
    if let PropertyKey::String(s) = &key {
        if s.as_str() == "length" && matches!(obj.borrow().data, ObjectData::Array(_)) {
            return super::array::set_length_descriptor(obj, &desc);
        }
    }

    let current = obj.borrow().properties_ref().get(&key).cloned();
    let extensible = obj.is_extensible();

    match current {
        None => {
            if !extensible {
                return false;
            }
            obj.borrow_mut().properties_mut().insert(key, desc.complete());
            true
        }
        Some(current) => {
            if current.configurable == Some(false) {
                if desc.configurable == Some(true) {
                    return false;
                }
                if let Some(e) = desc.enumerable {
                    if Some(e) != current.enumerable {
                        return false;
                    }
                }
                let switching_kind = (desc.is_data_descriptor() && current.is_accessor_descriptor())
                    || (desc.is_accessor_descriptor() && current.is_data_descriptor());
                if switching_kind {
                    return false;
                }
                if current.is_data_descriptor() {
                    if current.writable == Some(false) {
                        if desc.writable == Some(true) {
                            return false;
                        }
                        if let Some(v) = &desc.value {
                            if !JsValue::same_value(v, current.value.as_ref().unwrap()) {
                                return false;
                            }
                        }
                    }
                } else {
                    if let Some(g) = &desc.get {
                        if !same_accessor(g, current.get.as_ref()) {
                            return false;
                        }
                    }
                    if let Some(s) = &desc.set {
                        if !same_accessor(s, current.set.as_ref()) {
                            return false;
                        }
                    }
                }
            }
            let merged = merge(current, desc);
            obj.borrow_mut().properties_mut().insert(key, merged);
            true
        }
    }
}

fn same_accessor(a: &JsValue, b: Option<&JsValue>) -> bool {
    match b {
        Some(b) => JsValue::same_value(a, b),
        None => matches!(a, JsValue::Undefined),
    }
}

fn merge(current: PropertyDescriptor, incoming: PropertyDescriptor) -> PropertyDescriptor {
    let switching_to_accessor = incoming.is_accessor_descriptor() && current.is_data_descriptor();
    let switching_to_data = incoming.is_data_descriptor() && current.is_accessor_descriptor();
    let mut result = if switching_to_accessor {
        PropertyDescriptor {
            value: None,
            writable: None,
            get: Some(JsValue::undefined()),
            set: Some(JsValue::undefined()),
            enumerable: current.enumerable,
            configurable: current.configurable,
        }
    } else if switching_to_data {
        PropertyDescriptor {
            value: Some(JsValue::undefined()),
            writable: Some(false),
            get: None,
            set: None,
            enumerable: current.enumerable,
            configurable: current.configurable,
        }
    } else {
        current
    };
    if let Some(v) = incoming.value {
        result.value = Some(v);
    }
    if let Some(w) = incoming.writable {
        result.writable = Some(w);
    }
    if let Some(g) = incoming.get {
        result.get = Some(g);
    }
    if let Some(s) = incoming.set {
        result.set = Some(s);
    }
    if let Some(e) = incoming.enumerable {
        result.enumerable = Some(e);
    }
    if let Some(c) = incoming.configurable {
        result.configurable = Some(c);
    }
    result
}

/// §10.1.10 [[Delete]].
pub fn delete(obj: &JsObject, key: &PropertyKey) -> bool {
    if matches!(obj.borrow().data, ObjectData::ModuleNamespace(_)) {
        // `module_namespace::reject_mutation` throws at the language-level
        // `delete` operator boundary; this infallible abstract op reports
        // the same "not configurable" outcome its caller already handles.
        return false;
    }
    if let PropertyKey::Index(i) = key {
        if let ObjectData::Array(arr) = &mut obj.borrow_mut().data {
            arr.delete(*i);
            return true;
        }
    }
    match obj.borrow().properties_ref().get(key) {
        None => true,
        Some(d) if d.configurable == Some(false) => false,
        Some(_) => {
            obj.borrow_mut().properties_mut().remove(key);
            true
        }
    }
}

/// §10.1.11 [[OwnPropertyKeys]].
pub fn own_keys(obj: &JsObject) -> Vec<PropertyKey> {
    if let ObjectData::ModuleNamespace(ns) = &obj.borrow().data {
        return ns.export_names.iter().map(|n| PropertyKey::from_str(n)).collect();
    }
    if let ObjectData::Array(arr) = &obj.borrow().data {
        let mut keys = arr.own_index_keys();
        keys.push(PropertyKey::from_str("length"));
        keys.extend(obj.borrow().properties_ref().own_keys());
        return keys;
    }
    if let ObjectData::TypedArray(ta) = &obj.borrow().data {
        let mut keys: Vec<PropertyKey> = (0..ta.length()).map(PropertyKey::Index).collect();
        keys.extend(obj.borrow().properties_ref().own_keys());
        return keys;
    }
    obj.borrow().properties_ref().own_keys()
}

pub fn prevent_extensions(obj: &JsObject) {
    obj.borrow_mut().set_extensible(false);
}

/// `seal`/`freeze` downgrade every own descriptor to non-configurable
/// (`freeze` additionally makes data slots non-writable), per §4.1.
pub fn seal(obj: &JsObject, freeze: bool) {
    prevent_extensions(obj);
    let keys = obj.borrow().properties_ref().own_keys();
    for key in keys {
        let mut o = obj.borrow_mut();
        if let Some(mut d) = o.properties_ref().get(&key).cloned() {
            d.configurable = Some(false);
            if freeze && d.is_data_descriptor() {
                d.writable = Some(false);
            }
            o.properties_mut().insert(key, d);
        }
    }
    if freeze {
        if let ObjectData::Array(arr) = &mut obj.borrow_mut().data {
            arr.freeze();
        }
    }
    obj.borrow_mut().set_sealed(true);
    if freeze {
        obj.borrow_mut().set_frozen(true);
    }
}

fn obj_ptr(obj: &JsObject) -> usize {
    obj.ptr_id()
}

/// `Object.setPrototypeOf` / `__proto__=` (§4.1, Open Question #2: arrays
/// and typed arrays follow the ordinary-object rule, no exotic override).
pub fn set_prototype_of(obj: &JsObject, proto: JsValue) -> JsResult<bool> {
    if !matches!(proto, JsValue::Null) && matches!(obj.borrow().data, ObjectData::ModuleNamespace(_)) {
        return super::module_namespace::reject_mutation("setPrototypeOf");
    }
    if !matches!(proto, JsValue::Object(_) | JsValue::Null) {
        return Ok(true); // non-object, non-null values are silently ignored
    }
    if JsValue::same_value(&obj.prototype(), &proto) {
        return Ok(true);
    }
    if !obj.is_extensible() {
        return Ok(false);
    }
    // Cycle check: walking from `proto` must never reach `obj` itself.
    if let JsValue::Object(mut p) = proto.clone() {
        loop {
            if JsObject::ptr_eq(&p, obj) {
                return Ok(false);
            }
            match p.prototype() {
                JsValue::Object(next) => p = next,
                _ => break,
            }
        }
    }
    obj.set_prototype_unchecked(proto);
    Ok(true)
}

/// Throwing wrapper around `define`, for the language-level
/// `Object.defineProperty` boundary (§4.1 "Failure semantics").
pub fn define_property_or_throw(
    obj: &JsObject,
    key: PropertyKey,
    desc: PropertyDescriptor,
) -> JsResult<()> {
    if define(obj, key.clone(), desc) {
        Ok(())
    } else {
        Err(JsNativeError::typ(format!("cannot redefine property: {key}")).into())
    }
}

// --- small accessors the rest of the crate needs on `Object` ---
impl super::Object {
    pub fn properties_ref(&self) -> &PropertyMap {
        &self.properties
    }
    pub fn properties_mut(&mut self) -> &mut PropertyMap {
        &mut self.properties
    }
    pub fn set_extensible(&mut self, v: bool) {
        self.extensible = v;
    }
    pub fn set_sealed(&mut self, v: bool) {
        self.sealed = v;
    }
    pub fn set_frozen(&mut self, v: bool) {
        self.frozen = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyDescriptor;

    fn noop_getter(_: &JsValue, _: &JsValue, _: &[JsValue]) -> JsResult<JsValue> {
        Ok(JsValue::undefined())
    }

    #[test]
    fn define_then_get_round_trips_data_slot() {
        let obj = JsObject::ordinary(JsValue::null());
        let key = PropertyKey::from_str("x");
        assert!(define(
            &obj,
            key.clone(),
            PropertyDescriptor::data(JsValue::from(1.0), true, true, true)
        ));
        let mut getter = noop_getter;
        let got = try_get(&obj, &key, &JsValue::Object(obj.clone()), &mut getter)
            .unwrap()
            .unwrap();
        assert_eq!(got.as_number(), Some(1.0));
    }

    #[test]
    fn non_configurable_cannot_become_configurable() {
        let obj = JsObject::ordinary(JsValue::null());
        let key = PropertyKey::from_str("x");
        assert!(define(
            &obj,
            key.clone(),
            PropertyDescriptor::data(JsValue::from(1.0), true, true, false)
        ));
        assert!(!define(
            &obj,
            key,
            PropertyDescriptor::data(JsValue::from(2.0), true, true, true)
        ));
    }

    #[test]
    fn delete_rejects_non_configurable() {
        let obj = JsObject::ordinary(JsValue::null());
        let key = PropertyKey::from_str("x");
        define(
            &obj,
            key.clone(),
            PropertyDescriptor::data(JsValue::from(1.0), true, true, false),
        );
        assert!(!delete(&obj, &key));
    }

    #[test]
    fn own_keys_orders_indices_then_strings_then_symbols() {
        let obj = JsObject::ordinary(JsValue::null());
        define(&obj, PropertyKey::from_str("b"), PropertyDescriptor::data(JsValue::from(1.0), true, true, true));
        define(&obj, PropertyKey::Index(2), PropertyDescriptor::data(JsValue::from(1.0), true, true, true));
        define(&obj, PropertyKey::from_str("a"), PropertyDescriptor::data(JsValue::from(1.0), true, true, true));
        define(&obj, PropertyKey::Index(1), PropertyDescriptor::data(JsValue::from(1.0), true, true, true));
        let keys = own_keys(&obj);
        assert_eq!(
            keys,
            vec![
                PropertyKey::Index(1),
                PropertyKey::Index(2),
                PropertyKey::from_str("b"),
                PropertyKey::from_str("a"),
            ]
        );
    }
}
