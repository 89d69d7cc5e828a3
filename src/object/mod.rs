//! The Rust representation of JavaScript object-like values (spec.md §3
//! "Object-like", §4.1, §9 "Heterogeneous is-this-object-like dispatch").
//!
//! Mirrors the teacher's `GcObject(Gc<GcCell<Object>>)` newtype-over-the-GC
//! shape (`boa/src/object/gcobject.rs`), generalized so `ObjectData` carries
//! every exotic kind spec.md names instead of only the ES2020 subset the
//! teacher's snapshot implements.

pub mod array;
pub mod array_buffer;
pub mod builder;
pub mod collections;
pub mod data_view;
pub mod function;
pub mod module_namespace;
pub mod operations;
pub mod typed_array;

use crate::gc::{Finalize, Gc, GcCell, Ref, RefMut, Trace};
use crate::property::{PropertyDescriptor, PropertyKey};
use crate::regexp::JsRegExp;
use crate::string::JsString;
use crate::value::JsValue;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::fmt::{self, Debug};

pub use array::ArrayData;
pub use array_buffer::ArrayBufferData;
pub use collections::{MapData, SetData, WeakMapData, WeakSetData};
pub use data_view::DataViewData;
pub use function::Function;
pub use module_namespace::ModuleNamespaceData;
pub use typed_array::TypedArrayData;

/// Escape hatch for host-defined data attached to an object via
/// `ObjectData::Native`, mirroring the teacher's `NativeObject` trait.
pub trait NativeObject: Debug + Any + Trace {
    fn as_any(&self) -> &dyn Any;
    fn as_mut_any(&mut self) -> &mut dyn Any;
}

impl<T: Any + Debug + Trace> NativeObject for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_mut_any(&mut self) -> &mut dyn Any {
        self
    }
}

/// Tagged dispatch over every object-like kind spec.md §3 enumerates.
#[derive(Debug, Trace, Finalize)]
pub enum ObjectData {
    Ordinary,
    Array(ArrayData),
    ArrayIterator(ArrayIteratorData),
    ArrayBuffer(ArrayBufferData),
    TypedArray(TypedArrayData),
    DataView(DataViewData),
    Set(SetData),
    Map(MapData),
    WeakSet(WeakSetData),
    WeakMap(WeakMapData),
    RegExp(Box<JsRegExp>),
    Promise(crate::promise::PromiseData),
    Function(Function),
    Error,
    ModuleNamespace(ModuleNamespaceData),
    Arguments(crate::environment::ArgumentsData),
    Boolean(bool),
    Number(f64),
    String(JsString),
    Generator(crate::cps::GeneratorStepper),
    /// The sentinel `Expression::YieldSignal` evaluates to: never
    /// script-visible (it's the return value of a generator-body
    /// continuation, unwrapped by `crate::cps::GeneratorStepper::resume`
    /// before the caller ever sees a value), carrying the yielded value plus
    /// the callable continuation to invoke on the next resume.
    YieldSignal(YieldSignalData),
    Native(Box<dyn NativeObject>),
}

/// See `ObjectData::YieldSignal`.
#[derive(Debug, Trace, Finalize)]
pub struct YieldSignalData {
    pub value: JsValue,
    pub next: JsValue,
}

impl ObjectData {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ObjectData::Ordinary => "Ordinary",
            ObjectData::Array(_) => "Array",
            ObjectData::ArrayIterator(_) => "Array Iterator",
            ObjectData::ArrayBuffer(_) => "ArrayBuffer",
            ObjectData::TypedArray(_) => "TypedArray",
            ObjectData::DataView(_) => "DataView",
            ObjectData::Set(_) => "Set",
            ObjectData::Map(_) => "Map",
            ObjectData::WeakSet(_) => "WeakSet",
            ObjectData::WeakMap(_) => "WeakMap",
            ObjectData::RegExp(_) => "RegExp",
            ObjectData::Promise(_) => "Promise",
            ObjectData::Function(_) => "Function",
            ObjectData::Error => "Error",
            ObjectData::ModuleNamespace(_) => "Module Namespace",
            ObjectData::Arguments(_) => "Arguments",
            ObjectData::Boolean(_) => "Boolean",
            ObjectData::Number(_) => "Number",
            ObjectData::String(_) => "String",
            ObjectData::Generator(_) => "Generator",
            ObjectData::YieldSignal(_) => "Yield Signal",
            ObjectData::Native(_) => "Native",
        }
    }
}

/// A single-pass array iterator's saved state (`ObjectData::ArrayIterator`).
#[derive(Debug, Trace, Finalize)]
pub struct ArrayIteratorData {
    pub target: JsObject,
    pub next_index: u32,
    pub done: bool,
}

/// Own-property storage: an insertion-ordered map plus the private-name
/// sidetable and brand set spec.md §4.1 calls out as hidden from
/// enumeration.
#[derive(Debug, Trace, Finalize, Default)]
pub struct PropertyMap {
    map: IndexMap<PropertyKey, PropertyDescriptor>,
    #[unsafe_ignore_trace]
    private_fields: FxHashMap<String, PropertyDescriptor>,
    #[unsafe_ignore_trace]
    private_brands: std::collections::HashSet<String>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &PropertyKey) -> Option<&PropertyDescriptor> {
        if let PropertyKey::String(s) = key {
            if s.as_str().starts_with('#') {
                return self.private_fields.get(s.as_str());
            }
        }
        self.map.get(key)
    }

    pub fn insert(&mut self, key: PropertyKey, desc: PropertyDescriptor) {
        if let PropertyKey::String(s) = &key {
            if s.as_str().starts_with('#') {
                self.private_fields.insert(s.as_str().to_string(), desc);
                return;
            }
        }
        self.map.insert(key, desc);
    }

    pub fn remove(&mut self, key: &PropertyKey) -> Option<PropertyDescriptor> {
        if let PropertyKey::String(s) = key {
            if s.as_str().starts_with('#') {
                return self.private_fields.remove(s.as_str());
            }
        }
        self.map.shift_remove(key)
    }

    pub fn add_private_brand(&mut self, brand: &str) {
        self.private_brands.insert(brand.to_string());
    }

    pub fn has_private_brand(&self, brand: &str) -> bool {
        self.private_brands.contains(brand)
    }

    /// §7.3.23 EnumerableOwnPropertyNames / §OrdinaryOwnPropertyKeys
    /// ordering: integer indices ascending, then strings, then symbols.
    pub fn own_keys(&self) -> Vec<PropertyKey> {
        let mut indices: Vec<u32> = Vec::new();
        let mut strings: Vec<PropertyKey> = Vec::new();
        let mut symbols: Vec<PropertyKey> = Vec::new();
        for key in self.map.keys() {
            match key {
                PropertyKey::Index(i) => indices.push(*i),
                PropertyKey::String(_) => strings.push(key.clone()),
                PropertyKey::Symbol(_) => symbols.push(key.clone()),
            }
        }
        indices.sort_unstable();
        let mut out: Vec<PropertyKey> = indices.into_iter().map(PropertyKey::Index).collect();
        out.extend(strings);
        out.extend(symbols);
        out
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// The data an object owns, independent of its `Gc` wrapper.
#[derive(Debug, Trace, Finalize)]
pub struct Object {
    pub data: ObjectData,
    properties: PropertyMap,
    prototype: JsValue,
    extensible: bool,
    #[unsafe_ignore_trace]
    sealed: bool,
    #[unsafe_ignore_trace]
    frozen: bool,
}

impl Object {
    pub fn new(data: ObjectData, prototype: JsValue) -> Self {
        Self {
            data,
            properties: PropertyMap::new(),
            prototype,
            extensible: true,
            sealed: false,
            frozen: false,
        }
    }
}

/// A reference-counted, cycle-collected handle to an object (spec.md §3
/// "Lifecycle": "objects live until unreachable").
#[derive(Clone, Debug, Trace, Finalize)]
pub struct JsObject(Gc<GcCell<Object>>);

impl JsObject {
    pub fn new(data: ObjectData, prototype: JsValue) -> Self {
        Self(Gc::new(GcCell::new(Object::new(data, prototype))))
    }

    pub fn ordinary(prototype: JsValue) -> Self {
        Self::new(ObjectData::Ordinary, prototype)
    }

    pub fn borrow(&self) -> Ref<'_, Object> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Object> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(a: &JsObject, b: &JsObject) -> bool {
        Gc::ptr_eq(&a.0, &b.0)
    }

    /// A stable identity for this object's backing allocation, for use as a
    /// hash/cycle-detection key. Not exposed to script.
    pub fn ptr_id(&self) -> usize {
        &*self.borrow() as *const Object as usize
    }

    pub fn prototype(&self) -> JsValue {
        self.borrow().prototype.clone()
    }

    /// Unconditionally replaces `[[Prototype]]`; callers that must honour
    /// extensibility (`Object.setPrototypeOf`) check `is_extensible` first
    /// via `operations::set_prototype_of`.
    pub fn set_prototype_unchecked(&self, proto: JsValue) {
        self.borrow_mut().prototype = proto;
    }

    pub fn is_extensible(&self) -> bool {
        self.borrow().extensible
    }

    pub fn is_sealed(&self) -> bool {
        self.borrow().sealed
    }

    pub fn is_frozen(&self) -> bool {
        self.borrow().frozen
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.borrow().data, ObjectData::Function(_))
    }

    pub fn is_constructor(&self) -> bool {
        match &self.borrow().data {
            ObjectData::Function(f) => f.is_constructor(),
            _ => false,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self.borrow().data, ObjectData::Array(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self.borrow().data, ObjectData::Error)
    }

    pub fn kind_name(&self) -> &'static str {
        self.borrow().data.kind_name()
    }
}

impl fmt::Display for JsObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[object {}]", self.kind_name())
    }
}
