//! Fluent intrinsic construction (spec.md §4.9 "Host callables", §9
//! "Realm state").
//!
//! Grounded on `boa/src/builtins/function/mod.rs`'s `FunctionBuilder` and
//! `boa/src/object/mod.rs`'s `ConstructorBuilder`/`ObjectInitializer` shape:
//! rather than hand-assembling a `JsObject` plus its `PropertyMap` at every
//! intrinsic call site, `Realm::new` (spec.md §9) drives these three small
//! builders to get consistent non-enumerable method/accessor attributes
//! (`Attribute::non_enumerable`) without repeating them at each call site.

use crate::object::function::{Function, NativeFunctionData, NativeFunctionSignature};
use crate::object::{JsObject, ObjectData};
use crate::property::{Attribute, PropertyDescriptor, PropertyKey};
use crate::value::JsValue;

/// Builds a single native (host) function object.
pub struct FunctionBuilder {
    name: String,
    handler: NativeFunctionSignature,
    length: usize,
    is_constructor: bool,
    disallow_construct: Option<&'static str>,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>, handler: NativeFunctionSignature) -> Self {
        Self {
            name: name.into(),
            handler,
            length: 0,
            is_constructor: false,
            disallow_construct: None,
        }
    }

    pub fn length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    pub fn constructor(mut self, is_constructor: bool) -> Self {
        self.is_constructor = is_constructor;
        self
    }

    /// Marks the function callable but not constructible, with `message`
    /// used for the `TypeError` a bare `new` throws (spec.md §4.9
    /// "DisallowConstruct", e.g. `Array.prototype.values` is callable-only).
    pub fn disallow_construct(mut self, message: &'static str) -> Self {
        self.disallow_construct = Some(message);
        self
    }

    pub fn build(self, function_prototype: &JsValue) -> JsObject {
        let obj = JsObject::new(
            ObjectData::Function(Function::Native(NativeFunctionData {
                name: self.name.clone(),
                handler: self.handler,
                length: self.length,
                is_constructor: self.is_constructor,
                disallow_construct: self.disallow_construct,
            })),
            function_prototype.clone(),
        );
        install_name_and_length(&obj, &self.name, self.length);
        obj
    }
}

fn install_name_and_length(obj: &JsObject, name: &str, length: usize) {
    let mut o = obj.borrow_mut();
    o.properties_mut().insert(
        PropertyKey::from_str("name"),
        PropertyDescriptor::data(JsValue::from(name), false, false, true),
    );
    o.properties_mut().insert(
        PropertyKey::from_str("length"),
        PropertyDescriptor::data(JsValue::from(length as f64), false, false, true),
    );
}

/// Adds non-enumerable methods and data properties to an already-allocated
/// object (spec.md §9: populating `Array.prototype`, `Promise.prototype`,
/// and similar shared prototypes in place).
pub struct ObjectInitializer<'a> {
    target: &'a JsObject,
    function_prototype: JsValue,
}

impl<'a> ObjectInitializer<'a> {
    pub fn new(target: &'a JsObject, function_prototype: JsValue) -> Self {
        Self {
            target,
            function_prototype,
        }
    }

    pub fn function(self, name: impl Into<String>, handler: NativeFunctionSignature, length: usize) -> Self {
        let func = FunctionBuilder::new(name.into(), handler)
            .length(length)
            .build(&self.function_prototype);
        let name = match &func.borrow().data {
            ObjectData::Function(Function::Native(n)) => n.name.clone(),
            _ => unreachable!(),
        };
        self.target.borrow_mut().properties_mut().insert(
            PropertyKey::from_str(&name),
            PropertyDescriptor::data(JsValue::Object(func), true, false, true),
        );
        self
    }

    pub fn property(self, key: impl Into<PropertyKey>, value: impl Into<JsValue>, attribute: Attribute) -> Self {
        self.target.borrow_mut().properties_mut().insert(
            key.into(),
            PropertyDescriptor::data(
                value.into(),
                attribute.writable(),
                attribute.enumerable(),
                attribute.configurable(),
            ),
        );
        self
    }

    pub fn accessor(
        self,
        key: impl Into<PropertyKey>,
        get: Option<JsObject>,
        set: Option<JsObject>,
        attribute: Attribute,
    ) -> Self {
        self.target.borrow_mut().properties_mut().insert(
            key.into(),
            PropertyDescriptor::accessor(
                get.map(JsValue::Object),
                set.map(JsValue::Object),
                attribute.enumerable(),
                attribute.configurable(),
            ),
        );
        self
    }

    pub fn build(self) -> JsObject {
        self.target.clone()
    }
}

/// Builds a constructor/prototype pair and cross-links them (spec.md §9
/// "every intrinsic is a constructor/prototype pair with `.prototype`/
/// `.constructor` back-links").
pub struct ConstructorBuilder {
    name: String,
    handler: NativeFunctionSignature,
    length: usize,
    constructor: JsObject,
    prototype: JsObject,
}

impl ConstructorBuilder {
    /// `prototype` is the realm's already-allocated prototype object for
    /// this intrinsic (e.g. `realm.array_prototype().clone()`) — the
    /// builder populates it in place rather than allocating a fresh one, so
    /// the methods/properties chained below land on the very object the
    /// rest of the realm resolves through.
    pub fn new(
        name: impl Into<String>,
        handler: NativeFunctionSignature,
        function_prototype: &JsValue,
        prototype: JsObject,
    ) -> Self {
        let name = name.into();
        let constructor = FunctionBuilder::new(name.clone(), handler)
            .constructor(true)
            .build(function_prototype);
        Self {
            name,
            handler,
            length: 0,
            constructor,
            prototype,
        }
    }

    pub fn length(self, length: usize) -> Self {
        install_name_and_length(&self.constructor, &self.name, length);
        Self { length, ..self }
    }

    pub fn method(self, name: impl Into<String>, handler: NativeFunctionSignature, length: usize) -> Self {
        ObjectInitializer::new(&self.prototype, self.constructor.prototype())
            .function(name, handler, length)
            .build();
        self
    }

    pub fn static_method(self, name: impl Into<String>, handler: NativeFunctionSignature, length: usize) -> Self {
        ObjectInitializer::new(&self.constructor, self.constructor.prototype())
            .function(name, handler, length)
            .build();
        self
    }

    pub fn property(self, key: impl Into<PropertyKey>, value: impl Into<JsValue>, attribute: Attribute) -> Self {
        ObjectInitializer::new(&self.prototype, self.constructor.prototype())
            .property(key, value, attribute)
            .build();
        self
    }

    pub fn static_property(self, key: impl Into<PropertyKey>, value: impl Into<JsValue>, attribute: Attribute) -> Self {
        ObjectInitializer::new(&self.constructor, self.constructor.prototype())
            .property(key, value, attribute)
            .build();
        self
    }

    pub fn accessor(self, key: impl Into<PropertyKey>, get: Option<JsObject>, set: Option<JsObject>, attribute: Attribute) -> Self {
        ObjectInitializer::new(&self.prototype, self.constructor.prototype())
            .accessor(key, get, set, attribute)
            .build();
        self
    }

    /// Cross-links `constructor.prototype`/`prototype.constructor` and
    /// returns the finished pair.
    pub fn build(self) -> (JsObject, JsObject) {
        let _ = self.handler;
        self.constructor.borrow_mut().properties_mut().insert(
            PropertyKey::from_str("prototype"),
            PropertyDescriptor::data(JsValue::Object(self.prototype.clone()), false, false, false),
        );
        self.prototype.borrow_mut().properties_mut().insert(
            PropertyKey::from_str("constructor"),
            PropertyDescriptor::data(JsValue::Object(self.constructor.clone()), true, false, true),
        );
        (self.constructor, self.prototype)
    }
}
