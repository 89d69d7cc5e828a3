//! The realm: every intrinsic prototype/constructor pair, the global object,
//! and the well-known symbol table (spec.md §9 "Realm state").
//!
//! Grounded on `boa/src/realm.rs` + `boa/src/context.rs`'s `StandardConstructor`/
//! `StandardObjects` builder-style configuration: one struct owning every
//! intrinsic, built once in `Realm::new` by driving `object::builder`'s three
//! fluent builders, then handed out by reference to `Context` and the
//! evaluator (`exec::operations::to_object`, `exec::iteration::get_iterator`,
//! and friends all resolve prototypes through `Context::realm`).

use crate::error::{ErrorKind, JsNativeError, JsResult};
use crate::object::array::{self, ArrayData};
use crate::object::array_buffer::ArrayBufferData;
use crate::object::builder::{ConstructorBuilder, FunctionBuilder, ObjectInitializer};
use crate::object::collections::{MapData, SetData, WeakMapData, WeakSetData};
use crate::object::data_view::DataViewData;
use crate::object::function::{bind, flatten_bound_call, Function, OrdinaryFunctionData};
use crate::object::module_namespace::{BindingLookup, ModuleNamespaceData};
use crate::object::typed_array::{ElementKind, TypedArrayData};
use crate::object::{ArrayIteratorData, JsObject, ObjectData};
use crate::property::{Attribute, PropertyDescriptor, PropertyKey};
use crate::regexp::JsRegExp;
use crate::string::JsString;
use crate::symbol::{symbol_for, symbol_key_for, JsSymbol, WellKnownSymbols};
use crate::value::JsValue;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::context::Context;
use crate::environment::Environment;

type NativeResult = JsResult<JsValue>;

/// One resolved module: its linked environment plus the namespace object
/// clients observe through `import`/`load_module` (spec.md §4.8 "Modules").
struct ModuleRecord {
    namespace: JsObject,
}

/// Every intrinsic prototype/constructor this realm allocates once at
/// startup, plus the per-realm global object/environment and module
/// registry (spec.md §9 "Realm state": "owns every intrinsic prototype
/// object, the global object, and well-known Symbols").
pub struct Realm {
    global_object: JsObject,
    global_environment: Environment,

    object_prototype: JsObject,
    function_prototype: JsObject,
    array_prototype: JsObject,
    boolean_prototype: JsObject,
    number_prototype: JsObject,
    string_prototype: JsObject,
    symbol_prototype: JsObject,
    regexp_prototype: JsObject,
    error_prototype: JsObject,
    native_error_prototypes: HashMap<&'static str, JsObject>,
    promise_prototype: JsObject,
    generator_prototype: JsObject,
    map_prototype: JsObject,
    set_prototype: JsObject,
    weak_map_prototype: JsObject,
    weak_set_prototype: JsObject,
    array_buffer_prototype: JsObject,
    data_view_prototype: JsObject,
    typed_array_prototype: JsObject,
    array_iterator_prototype: JsObject,

    well_known_symbols: WellKnownSymbols,
    modules: RefCell<HashMap<String, ModuleRecord>>,
}

impl Realm {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        // §9.1 OrdinaryObjectCreate bootstrapping: `Object.prototype` and
        // `Function.prototype` have no prototype of their own (well,
        // `Function.prototype` chains to `Object.prototype`), so they're
        // allocated by hand before any builder can run.
        let object_prototype = JsObject::ordinary(JsValue::null());
        let function_prototype = JsObject::new(
            ObjectData::Function(Function::Native(crate::object::function::NativeFunctionData {
                name: String::new(),
                handler: noop_handler,
                length: 0,
                is_constructor: false,
                disallow_construct: None,
            })),
            JsValue::Object(object_prototype.clone()),
        );
        let func_proto_value = JsValue::Object(function_prototype.clone());

        let array_prototype = JsObject::new(ObjectData::Array(ArrayData::new()), JsValue::Object(object_prototype.clone()));
        let boolean_prototype = JsObject::new(ObjectData::Boolean(false), JsValue::Object(object_prototype.clone()));
        let number_prototype = JsObject::new(ObjectData::Number(0.0), JsValue::Object(object_prototype.clone()));
        let string_prototype = JsObject::new(ObjectData::String(JsString::new("")), JsValue::Object(object_prototype.clone()));
        let symbol_prototype = JsObject::ordinary(JsValue::Object(object_prototype.clone()));
        let regexp_prototype = JsObject::ordinary(JsValue::Object(object_prototype.clone()));
        let error_prototype = JsObject::new(ObjectData::Error, JsValue::Object(object_prototype.clone()));
        let promise_prototype = JsObject::ordinary(JsValue::Object(object_prototype.clone()));
        let generator_prototype = JsObject::ordinary(JsValue::Object(object_prototype.clone()));
        let map_prototype = JsObject::ordinary(JsValue::Object(object_prototype.clone()));
        let set_prototype = JsObject::ordinary(JsValue::Object(object_prototype.clone()));
        let weak_map_prototype = JsObject::ordinary(JsValue::Object(object_prototype.clone()));
        let weak_set_prototype = JsObject::ordinary(JsValue::Object(object_prototype.clone()));
        let array_buffer_prototype = JsObject::ordinary(JsValue::Object(object_prototype.clone()));
        let data_view_prototype = JsObject::ordinary(JsValue::Object(object_prototype.clone()));
        let typed_array_prototype = JsObject::ordinary(JsValue::Object(object_prototype.clone()));
        let array_iterator_prototype = JsObject::ordinary(JsValue::Object(object_prototype.clone()));

        let global_object = JsObject::ordinary(JsValue::Object(object_prototype.clone()));
        let global_environment = Environment::new_global(global_object.clone());

        let mut realm = Self {
            global_object,
            global_environment,
            object_prototype,
            function_prototype,
            array_prototype,
            boolean_prototype,
            number_prototype,
            string_prototype,
            symbol_prototype,
            regexp_prototype,
            error_prototype,
            native_error_prototypes: HashMap::new(),
            promise_prototype,
            generator_prototype,
            map_prototype,
            set_prototype,
            weak_map_prototype,
            weak_set_prototype,
            array_buffer_prototype,
            data_view_prototype,
            typed_array_prototype,
            array_iterator_prototype,
            well_known_symbols: WellKnownSymbols::default(),
            modules: RefCell::new(HashMap::new()),
        };

        init_function(&realm, &func_proto_value);
        init_object(&realm, &func_proto_value);
        init_array(&realm, &func_proto_value);
        init_array_iterator(&realm, &func_proto_value);
        init_boolean(&realm, &func_proto_value);
        init_number(&realm, &func_proto_value);
        init_string(&realm, &func_proto_value);
        init_symbol(&mut realm, &func_proto_value);
        init_regexp(&realm, &func_proto_value);
        init_errors(&mut realm, &func_proto_value);
        init_promise(&realm, &func_proto_value);
        init_generator(&realm, &func_proto_value);
        init_map(&realm, &func_proto_value);
        init_set(&realm, &func_proto_value);
        init_weak_map(&realm, &func_proto_value);
        init_weak_set(&realm, &func_proto_value);
        init_array_buffer(&realm, &func_proto_value);
        init_data_view(&realm, &func_proto_value);
        init_typed_arrays(&realm, &func_proto_value);

        realm
    }

    pub fn global_object(&self) -> &JsObject {
        &self.global_object
    }
    pub fn global_environment(&self) -> &Environment {
        &self.global_environment
    }
    pub fn object_prototype(&self) -> &JsObject {
        &self.object_prototype
    }
    pub fn function_prototype(&self) -> &JsObject {
        &self.function_prototype
    }
    pub fn array_prototype(&self) -> &JsObject {
        &self.array_prototype
    }
    pub fn boolean_prototype(&self) -> &JsObject {
        &self.boolean_prototype
    }
    pub fn number_prototype(&self) -> &JsObject {
        &self.number_prototype
    }
    pub fn string_prototype(&self) -> &JsObject {
        &self.string_prototype
    }
    pub fn symbol_prototype(&self) -> &JsObject {
        &self.symbol_prototype
    }
    pub fn regexp_prototype(&self) -> &JsObject {
        &self.regexp_prototype
    }
    pub fn promise_prototype(&self) -> &JsObject {
        &self.promise_prototype
    }
    pub fn generator_prototype(&self) -> &JsObject {
        &self.generator_prototype
    }
    pub fn map_prototype(&self) -> &JsObject {
        &self.map_prototype
    }
    pub fn set_prototype(&self) -> &JsObject {
        &self.set_prototype
    }
    pub fn weak_map_prototype(&self) -> &JsObject {
        &self.weak_map_prototype
    }
    pub fn weak_set_prototype(&self) -> &JsObject {
        &self.weak_set_prototype
    }
    pub fn array_buffer_prototype(&self) -> &JsObject {
        &self.array_buffer_prototype
    }
    pub fn data_view_prototype(&self) -> &JsObject {
        &self.data_view_prototype
    }
    pub fn typed_array_prototype(&self) -> &JsObject {
        &self.typed_array_prototype
    }
    pub fn array_iterator_prototype(&self) -> &JsObject {
        &self.array_iterator_prototype
    }

    pub fn well_known_symbols(&self) -> &WellKnownSymbols {
        &self.well_known_symbols
    }

    /// `ErrorKind::Type` etc. resolve to the matching `TypeError.prototype`
    /// family member (spec.md §7 "right `.prototype` chain").
    pub fn error_prototype(&self, kind: ErrorKind) -> &JsObject {
        if kind == ErrorKind::Eval {
            // EvalError has no dedicated constructor in this crate's global
            // surface (eval is out of scope per spec.md §1 Non-goals), but
            // `ErrorKind::Eval` still needs a prototype to realize against.
            return self.native_error_prototypes.get("EvalError").unwrap_or(&self.error_prototype);
        }
        self.native_error_prototypes.get(kind.name()).unwrap_or(&self.error_prototype)
    }

    /// Records a linked module's exports as a namespace object (spec.md
    /// §4.8). Every top-level binding of the module body becomes an export,
    /// a documented simplification of the static `export` syntax this
    /// crate's AST has no node for (see DESIGN.md's module-linking entry).
    pub fn register_module(&mut self, specifier: &str, env: Environment) {
        let export_names = env.own_binding_names();
        let lookup_env = env.clone();
        let lookup: BindingLookup = Rc::new(move |name: &str| lookup_env.get_binding_value(name).ok().flatten());
        let ns_data = ModuleNamespaceData::new(export_names, lookup);
        let namespace = JsObject::new(ObjectData::ModuleNamespace(ns_data), JsValue::null());
        self.modules.borrow_mut().insert(specifier.to_string(), ModuleRecord { namespace });
    }

    pub fn module_namespace(&self, specifier: &str) -> Option<JsObject> {
        self.modules.borrow().get(specifier).map(|m| m.namespace.clone())
    }
}

fn noop_handler(_this: &JsValue, _args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    Ok(JsValue::undefined())
}

// --- small shared helpers -------------------------------------------------

fn arg(args: &[JsValue], i: usize) -> JsValue {
    args.get(i).cloned().unwrap_or(JsValue::undefined())
}

fn this_object<'a>(this: &'a JsValue, what: &str) -> JsResult<&'a JsObject> {
    this.as_object().ok_or_else(|| JsNativeError::typ(format!("{what} called on a non-object")).into())
}

/// Helper for methods on a specific `ObjectData` variant, e.g. `Array.prototype.push`
/// being called with a non-array `this`.
macro_rules! with_data {
    ($this:expr, $variant:path, $what:expr, |$data:ident| $body:expr) => {{
        let obj = this_object($this, $what)?;
        let guard = obj.borrow();
        match &guard.data {
            $variant($data) => $body,
            _ => return Err(JsNativeError::typ(format!("{} called on incompatible receiver", $what)).into()),
        }
    }};
}

fn install_well_known_accessor(proto: &JsObject, func_proto: &JsValue, key: PropertyKey, getter_name: &str, handler: crate::object::function::NativeFunctionSignature) {
    let getter = FunctionBuilder::new(getter_name, handler).length(0).build(func_proto);
    ObjectInitializer::new(proto, func_proto.clone())
        .accessor(key, Some(getter), None, Attribute::new(false, false, true))
        .build();
}

// ===========================================================================
// Function
// ===========================================================================

fn init_function(realm: &Realm, func_proto: &JsValue) {
    ObjectInitializer::new(realm.function_prototype(), func_proto.clone())
        .function("call", function_call, 1)
        .function("apply", function_apply, 2)
        .function("bind", function_bind, 1)
        .function("toString", function_to_string, 0)
        .build();
}

fn function_call(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let this_arg = arg(args, 0);
    let rest = if args.is_empty() { &[][..] } else { &args[1..] };
    ctx.call_function(this, &this_arg, rest)
}

fn function_apply(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let this_arg = arg(args, 0);
    let arg_array = arg(args, 1);
    let spread = match arg_array {
        JsValue::Undefined | JsValue::Null => Vec::new(),
        other => {
            let obj = other.as_object().ok_or_else(|| JsNativeError::typ("CreateListFromArrayLike called on non-object"))?;
            match &obj.borrow().data {
                ObjectData::Array(arr) => arr.to_vec(),
                _ => {
                    let len_key = PropertyKey::from_str("length");
                    let mut getter = |g: &JsValue, r: &JsValue, a: &[JsValue]| ctx.call_function(g, r, a);
                    let len = crate::object::operations::try_get(obj, &len_key, &other, &mut getter)?
                        .map(|v| v.as_number().unwrap_or(0.0) as u32)
                        .unwrap_or(0);
                    let mut out = Vec::with_capacity(len as usize);
                    for i in 0..len {
                        let mut getter = |g: &JsValue, r: &JsValue, a: &[JsValue]| ctx.call_function(g, r, a);
                        out.push(
                            crate::object::operations::try_get(obj, &PropertyKey::Index(i), &other, &mut getter)?.unwrap_or(JsValue::undefined()),
                        );
                    }
                    out
                }
            }
        }
    };
    ctx.call_function(this, &this_arg, &spread)
}

fn function_bind(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let target = this_object(this, "Function.prototype.bind")?.clone();
    let bound_this = arg(args, 0);
    let bound_args = if args.is_empty() { Vec::new() } else { args[1..].to_vec() };
    let proto = JsValue::Object(ctx.realm().function_prototype().clone());
    let bound = bind(&target, bound_this, bound_args, proto)?;
    Ok(JsValue::Object(bound))
}

fn function_to_string(this: &JsValue, _args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    let obj = this_object(this, "Function.prototype.toString")?;
    let name = match &obj.borrow().data {
        ObjectData::Function(Function::Native(n)) => n.name.clone(),
        ObjectData::Function(Function::Ordinary(o)) => o.node.name.clone().unwrap_or_default(),
        ObjectData::Function(Function::Bound(_)) => "bound function".to_string(),
        _ => return Err(JsNativeError::typ("not a function").into()),
    };
    Ok(JsValue::from(format!("function {name}() {{ [native code] }}")))
}

// ===========================================================================
// Object
// ===========================================================================

fn init_object(realm: &Realm, func_proto: &JsValue) {
    let object_prototype = realm.object_prototype().clone();
    let (ctor, _proto) = ConstructorBuilder::new("Object", object_constructor, func_proto, object_prototype)
        .length(1)
        .static_method("keys", object_keys, 1)
        .static_method("values", object_values, 1)
        .static_method("entries", object_entries, 1)
        .static_method("assign", object_assign, 2)
        .static_method("freeze", object_freeze, 1)
        .static_method("isFrozen", object_is_frozen, 1)
        .static_method("seal", object_seal, 1)
        .static_method("isSealed", object_is_sealed, 1)
        .static_method("preventExtensions", object_prevent_extensions, 1)
        .static_method("isExtensible", object_is_extensible, 1)
        .static_method("getPrototypeOf", object_get_prototype_of, 1)
        .static_method("setPrototypeOf", object_set_prototype_of, 2)
        .static_method("create", object_create, 2)
        .static_method("defineProperty", object_define_property, 3)
        .static_method("defineProperties", object_define_properties, 2)
        .static_method("getOwnPropertyDescriptor", object_get_own_property_descriptor, 2)
        .static_method("getOwnPropertyNames", object_get_own_property_names, 1)
        .method("hasOwnProperty", object_has_own_property, 1)
        .method("isPrototypeOf", object_is_prototype_of, 1)
        .method("propertyIsEnumerable", object_property_is_enumerable, 1)
        .method("toString", object_to_string, 0)
        .method("valueOf", object_value_of, 0)
        .build();
    install_global(realm, "Object", JsValue::Object(ctor));
}

fn install_global(realm: &Realm, name: &str, value: JsValue) {
    realm.global_object().borrow_mut().properties_mut().insert(
        PropertyKey::from_str(name),
        PropertyDescriptor::data(value, true, false, true),
    );
}

fn object_constructor(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    match arg(args, 0) {
        JsValue::Undefined | JsValue::Null => Ok(JsValue::Object(JsObject::ordinary(JsValue::Object(ctx.realm().object_prototype().clone())))),
        other => crate::exec::operations::to_object(ctx, &other).map(JsValue::Object),
    }
}

fn object_keys(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let obj = crate::exec::operations::to_object(ctx, &arg(args, 0))?;
    let names: Vec<JsValue> = enumerable_own_string_keys(&obj).into_iter().map(JsValue::from).collect();
    Ok(JsValue::Object(new_array(ctx, names)))
}

fn object_values(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let obj = crate::exec::operations::to_object(ctx, &arg(args, 0))?;
    let mut out = Vec::new();
    for key in enumerable_own_string_keys(&obj) {
        let pkey = PropertyKey::from_str(&key);
        let mut getter = |g: &JsValue, r: &JsValue, a: &[JsValue]| ctx.call_function(g, r, a);
        out.push(crate::object::operations::try_get(&obj, &pkey, &JsValue::Object(obj.clone()), &mut getter)?.unwrap_or(JsValue::undefined()));
    }
    Ok(JsValue::Object(new_array(ctx, out)))
}

fn object_entries(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let obj = crate::exec::operations::to_object(ctx, &arg(args, 0))?;
    let mut out = Vec::new();
    for key in enumerable_own_string_keys(&obj) {
        let pkey = PropertyKey::from_str(&key);
        let mut getter = |g: &JsValue, r: &JsValue, a: &[JsValue]| ctx.call_function(g, r, a);
        let value = crate::object::operations::try_get(&obj, &pkey, &JsValue::Object(obj.clone()), &mut getter)?.unwrap_or(JsValue::undefined());
        out.push(JsValue::Object(new_array(ctx, vec![JsValue::from(key), value])));
    }
    Ok(JsValue::Object(new_array(ctx, out)))
}

fn enumerable_own_string_keys(obj: &JsObject) -> Vec<String> {
    crate::object::operations::own_keys(obj)
        .into_iter()
        .filter_map(|key| {
            let enumerable = obj.borrow().properties_ref().get(&key).map(|d| d.enumerable.unwrap_or(false)).unwrap_or(matches!(key, PropertyKey::Index(_)));
            if !enumerable {
                return None;
            }
            match key {
                PropertyKey::Index(i) => Some(i.to_string()),
                PropertyKey::String(s) => Some(s.as_str().to_string()),
                PropertyKey::Symbol(_) => None,
            }
        })
        .collect()
}

fn object_assign(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let target = crate::exec::operations::to_object(ctx, &arg(args, 0))?;
    for source in &args[1.min(args.len())..] {
        if source.is_null_or_undefined() {
            continue;
        }
        let source_obj = crate::exec::operations::to_object(ctx, source)?;
        for key in crate::object::operations::own_keys(&source_obj) {
            let enumerable = source_obj.borrow().properties_ref().get(&key).map(|d| d.enumerable.unwrap_or(false)).unwrap_or(matches!(key, PropertyKey::Index(_)));
            if !enumerable {
                continue;
            }
            let mut getter = |g: &JsValue, r: &JsValue, a: &[JsValue]| ctx.call_function(g, r, a);
            let value = crate::object::operations::try_get(&source_obj, &key, &JsValue::Object(source_obj.clone()), &mut getter)?.unwrap_or(JsValue::undefined());
            let mut setter = |f: &JsValue, t: &JsValue, a: &[JsValue]| ctx.call_function(f, t, a);
            crate::object::operations::set(&target, key, value, &JsValue::Object(target.clone()), &mut setter)?;
        }
    }
    Ok(JsValue::Object(target))
}

fn object_freeze(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    if let JsValue::Object(obj) = arg(args, 0) {
        crate::object::operations::seal(&obj, true);
        Ok(JsValue::Object(obj))
    } else {
        Ok(arg(args, 0))
    }
}

fn object_is_frozen(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    Ok(JsValue::from(match arg(args, 0) {
        JsValue::Object(obj) => obj.is_frozen(),
        _ => true,
    }))
}

fn object_seal(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    if let JsValue::Object(obj) = arg(args, 0) {
        crate::object::operations::seal(&obj, false);
        Ok(JsValue::Object(obj))
    } else {
        Ok(arg(args, 0))
    }
}

fn object_is_sealed(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    Ok(JsValue::from(match arg(args, 0) {
        JsValue::Object(obj) => obj.is_sealed(),
        _ => true,
    }))
}

fn object_prevent_extensions(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    if let JsValue::Object(obj) = arg(args, 0) {
        crate::object::operations::prevent_extensions(&obj);
        Ok(JsValue::Object(obj))
    } else {
        Ok(arg(args, 0))
    }
}

fn object_is_extensible(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    Ok(JsValue::from(match arg(args, 0) {
        JsValue::Object(obj) => obj.is_extensible(),
        _ => false,
    }))
}

fn object_get_prototype_of(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let obj = crate::exec::operations::to_object(ctx, &arg(args, 0))?;
    Ok(obj.prototype())
}

fn object_set_prototype_of(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    let target = arg(args, 0);
    let Some(obj) = target.as_object() else { return Ok(target) };
    let proto = arg(args, 1);
    if !crate::object::operations::set_prototype_of(obj, proto)? {
        return Err(JsNativeError::typ("cannot set prototype of non-extensible object").into());
    }
    Ok(target)
}

fn object_create(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let proto = arg(args, 0);
    if !matches!(proto, JsValue::Object(_) | JsValue::Null) {
        return Err(JsNativeError::typ("Object.create prototype must be an object or null").into());
    }
    let obj = JsObject::ordinary(proto);
    if let JsValue::Object(props) = arg(args, 1) {
        apply_property_descriptors(&obj, &props, ctx)?;
    }
    Ok(JsValue::Object(obj))
}

fn apply_property_descriptors(target: &JsObject, descriptors: &JsObject, ctx: &mut Context) -> JsResult<()> {
    for key in crate::object::operations::own_keys(descriptors) {
        let enumerable = descriptors.borrow().properties_ref().get(&key).map(|d| d.enumerable.unwrap_or(false)).unwrap_or(false);
        if !enumerable {
            continue;
        }
        let mut getter = |g: &JsValue, r: &JsValue, a: &[JsValue]| ctx.call_function(g, r, a);
        let spec = crate::object::operations::try_get(descriptors, &key, &JsValue::Object(descriptors.clone()), &mut getter)?.unwrap_or(JsValue::undefined());
        let spec_obj = spec.as_object().ok_or_else(|| JsNativeError::typ("property descriptor must be an object"))?;
        let desc = descriptor_from_object(spec_obj, ctx)?;
        crate::object::operations::define_property_or_throw(target, key, desc)?;
    }
    Ok(())
}

fn descriptor_from_object(spec: &JsObject, ctx: &mut Context) -> JsResult<PropertyDescriptor> {
    let mut get_field = |name: &str| -> JsResult<Option<JsValue>> {
        let key = PropertyKey::from_str(name);
        if !crate::object::operations::own_keys(spec).contains(&key) {
            return Ok(None);
        }
        let mut getter = |g: &JsValue, r: &JsValue, a: &[JsValue]| ctx.call_function(g, r, a);
        crate::object::operations::try_get(spec, &key, &JsValue::Object(spec.clone()), &mut getter)
    };
    let value = get_field("value")?;
    let writable = get_field("writable")?.map(|v| v.to_boolean());
    let get = get_field("get")?;
    let set = get_field("set")?;
    let enumerable = get_field("enumerable")?.map(|v| v.to_boolean());
    let configurable = get_field("configurable")?.map(|v| v.to_boolean());
    Ok(PropertyDescriptor {
        value,
        writable,
        get,
        set,
        enumerable,
        configurable,
    })
}

fn object_define_property(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let target = arg(args, 0);
    let obj = target.as_object().ok_or_else(|| JsNativeError::typ("Object.defineProperty called on non-object"))?;
    let key = crate::exec::operations::to_property_key(ctx, &arg(args, 1))?;
    let spec = arg(args, 2);
    let spec_obj = spec.as_object().ok_or_else(|| JsNativeError::typ("property descriptor must be an object"))?;
    let desc = descriptor_from_object(spec_obj, ctx)?;
    crate::object::operations::define_property_or_throw(obj, key, desc)?;
    Ok(target)
}

fn object_define_properties(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let target = arg(args, 0);
    let obj = target.as_object().ok_or_else(|| JsNativeError::typ("Object.defineProperties called on non-object"))?;
    if let JsValue::Object(props) = arg(args, 1) {
        apply_property_descriptors(obj, &props, ctx)?;
    }
    Ok(target)
}

fn object_get_own_property_descriptor(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let obj = crate::exec::operations::to_object(ctx, &arg(args, 0))?;
    let key = crate::exec::operations::to_property_key(ctx, &arg(args, 1))?;
    let Some(desc) = obj.borrow().properties_ref().get(&key).cloned() else {
        return Ok(JsValue::undefined());
    };
    let result = JsObject::ordinary(JsValue::Object(ctx.realm().object_prototype().clone()));
    if desc.is_accessor_descriptor() {
        crate::object::operations::define(&result, PropertyKey::from_str("get"), PropertyDescriptor::data(desc.get.unwrap_or(JsValue::undefined()), true, true, true));
        crate::object::operations::define(&result, PropertyKey::from_str("set"), PropertyDescriptor::data(desc.set.unwrap_or(JsValue::undefined()), true, true, true));
    } else {
        crate::object::operations::define(&result, PropertyKey::from_str("value"), PropertyDescriptor::data(desc.value.unwrap_or(JsValue::undefined()), true, true, true));
        crate::object::operations::define(&result, PropertyKey::from_str("writable"), PropertyDescriptor::data(JsValue::from(desc.writable.unwrap_or(false)), true, true, true));
    }
    crate::object::operations::define(&result, PropertyKey::from_str("enumerable"), PropertyDescriptor::data(JsValue::from(desc.enumerable.unwrap_or(false)), true, true, true));
    crate::object::operations::define(&result, PropertyKey::from_str("configurable"), PropertyDescriptor::data(JsValue::from(desc.configurable.unwrap_or(false)), true, true, true));
    Ok(JsValue::Object(result))
}

fn object_get_own_property_names(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let obj = crate::exec::operations::to_object(ctx, &arg(args, 0))?;
    let names: Vec<JsValue> = crate::object::operations::own_keys(&obj)
        .into_iter()
        .filter_map(|k| match k {
            PropertyKey::Index(i) => Some(JsValue::from(i.to_string())),
            PropertyKey::String(s) => Some(JsValue::from(s)),
            PropertyKey::Symbol(_) => None,
        })
        .collect();
    Ok(JsValue::Object(new_array(ctx, names)))
}

fn object_has_own_property(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let obj = crate::exec::operations::to_object(ctx, this)?;
    let key = crate::exec::operations::to_property_key(ctx, &arg(args, 0))?;
    Ok(JsValue::from(crate::object::operations::own_keys(&obj).contains(&key)))
}

fn object_is_prototype_of(this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    let Some(self_obj) = this.as_object() else { return Ok(JsValue::from(false)) };
    let Some(candidate) = arg(args, 0).as_object().cloned() else {
        return Ok(JsValue::from(false));
    };
    let mut proto = candidate.prototype();
    loop {
        match proto {
            JsValue::Object(p) => {
                if JsObject::ptr_eq(&p, self_obj) {
                    return Ok(JsValue::from(true));
                }
                proto = p.prototype();
            }
            _ => return Ok(JsValue::from(false)),
        }
    }
}

fn object_property_is_enumerable(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let obj = crate::exec::operations::to_object(ctx, this)?;
    let key = crate::exec::operations::to_property_key(ctx, &arg(args, 0))?;
    Ok(JsValue::from(obj.borrow().properties_ref().get(&key).map(|d| d.enumerable.unwrap_or(false)).unwrap_or(false)))
}

fn object_to_string(this: &JsValue, _args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    let tag = match this {
        JsValue::Undefined => "Undefined",
        JsValue::Null => "Null",
        JsValue::Object(o) if o.is_array() => "Array",
        JsValue::Object(o) if o.is_callable() => "Function",
        JsValue::Object(o) if o.is_error() => "Error",
        _ => "Object",
    };
    Ok(JsValue::from(format!("[object {tag}]")))
}

fn object_value_of(this: &JsValue, _args: &[JsValue], ctx: &mut Context) -> NativeResult {
    crate::exec::operations::to_object(ctx, this).map(JsValue::Object)
}

fn new_array(ctx: &Context, items: Vec<JsValue>) -> JsObject {
    let proto = JsValue::Object(ctx.realm().array_prototype().clone());
    JsObject::new(ObjectData::Array(ArrayData::from_values(items)), proto)
}

// ===========================================================================
// Array
// ===========================================================================

fn init_array(realm: &Realm, func_proto: &JsValue) {
    let array_prototype = realm.array_prototype().clone();
    let (ctor, _proto) = ConstructorBuilder::new("Array", array_constructor, func_proto, array_prototype)
        .length(1)
        .static_method("isArray", array_is_array, 1)
        .static_method("of", array_of, 0)
        .static_method("from", array_from, 1)
        .method("push", array_push, 1)
        .method("pop", array_pop, 0)
        .method("shift", array_shift, 0)
        .method("unshift", array_unshift, 1)
        .method("slice", array_slice, 2)
        .method("splice", array_splice, 2)
        .method("reverse", array_reverse, 0)
        .method("concat", array_concat, 1)
        .method("join", array_join, 1)
        .method("indexOf", array_index_of, 1)
        .method("includes", array_includes, 1)
        .method("forEach", array_for_each, 1)
        .method("map", array_map, 1)
        .method("filter", array_filter, 1)
        .method("reduce", array_reduce, 1)
        .method("some", array_some, 1)
        .method("every", array_every, 1)
        .method("find", array_find, 1)
        .method("findIndex", array_find_index, 1)
        .method("toString", array_to_string, 0)
        .build();
    // `Array.prototype.values`/`@@iterator`: callable but not constructible
    // (spec.md §9's `DisallowConstruct` example is exactly this method).
    let values_fn = FunctionBuilder::new("values", array_values)
        .length(0)
        .disallow_construct("Array.prototype.values is not a constructor")
        .build(func_proto);
    realm.array_prototype().borrow_mut().properties_mut().insert(
        PropertyKey::from_str("values"),
        PropertyDescriptor::data(JsValue::Object(values_fn.clone()), true, false, true),
    );
    realm.array_prototype().borrow_mut().properties_mut().insert(
        PropertyKey::Symbol(realm.well_known_symbols().iterator.clone()),
        PropertyDescriptor::data(JsValue::Object(values_fn), true, false, true),
    );
    install_global(realm, "Array", JsValue::Object(ctor));
}

fn array_constructor(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    if args.len() == 1 {
        if let JsValue::Number(n) = args[0] {
            let len = n as u32;
            if len as f64 != n || n < 0.0 {
                return Err(JsNativeError::range("invalid array length").into());
            }
            let obj = new_array(ctx, Vec::new());
            crate::object::operations::define(&obj, PropertyKey::from_str("length"), PropertyDescriptor::data(JsValue::from(len as f64), true, false, false));
            return Ok(JsValue::Object(obj));
        }
    }
    Ok(JsValue::Object(new_array(ctx, args.to_vec())))
}

fn array_is_array(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    Ok(JsValue::from(matches!(arg(args, 0), JsValue::Object(o) if o.is_array())))
}

fn array_of(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    Ok(JsValue::Object(new_array(ctx, args.to_vec())))
}

fn array_from(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let source = arg(args, 0);
    let map_fn = arg(args, 1);
    let mapper = map_fn.as_callable().cloned();
    let mut items = Vec::new();
    if let Ok(iterator) = crate::exec::iteration::get_iterator(ctx, &source) {
        loop {
            let (value, done) = crate::exec::iteration::iterator_step(ctx, &iterator)?;
            if done {
                break;
            }
            items.push(value.unwrap_or(JsValue::undefined()));
        }
    } else {
        let obj = crate::exec::operations::to_object(ctx, &source)?;
        let len_key = PropertyKey::from_str("length");
        let mut getter = |g: &JsValue, r: &JsValue, a: &[JsValue]| ctx.call_function(g, r, a);
        let len = crate::object::operations::try_get(&obj, &len_key, &source, &mut getter)?
            .map(|v| v.as_number().unwrap_or(0.0) as u32)
            .unwrap_or(0);
        for i in 0..len {
            let mut getter = |g: &JsValue, r: &JsValue, a: &[JsValue]| ctx.call_function(g, r, a);
            items.push(crate::object::operations::try_get(&obj, &PropertyKey::Index(i), &source, &mut getter)?.unwrap_or(JsValue::undefined()));
        }
    }
    if let Some(mapper) = mapper {
        let mut mapped = Vec::with_capacity(items.len());
        for (i, v) in items.into_iter().enumerate() {
            mapped.push(ctx.call_function(&JsValue::Object(mapper.clone()), &JsValue::undefined(), &[v, JsValue::from(i as u32)])?);
        }
        items = mapped;
    }
    Ok(JsValue::Object(new_array(ctx, items)))
}

fn array_push(this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    let obj = this_object(this, "Array.prototype.push")?;
    let mut guard = obj.borrow_mut();
    let ObjectData::Array(arr) = &mut guard.data else {
        return Err(JsNativeError::typ("Array.prototype.push called on a non-array").into());
    };
    let mut last = 0;
    for v in args {
        last = arr.push(v.clone());
    }
    Ok(JsValue::from(last as f64))
}

fn array_pop(this: &JsValue, _args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    let obj = this_object(this, "Array.prototype.pop")?;
    let mut guard = obj.borrow_mut();
    let ObjectData::Array(arr) = &mut guard.data else {
        return Err(JsNativeError::typ("Array.prototype.pop called on a non-array").into());
    };
    Ok(arr.pop().unwrap_or(JsValue::undefined()))
}

fn array_shift(this: &JsValue, _args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    let obj = this_object(this, "Array.prototype.shift")?;
    let mut guard = obj.borrow_mut();
    let ObjectData::Array(arr) = &mut guard.data else {
        return Err(JsNativeError::typ("Array.prototype.shift called on a non-array").into());
    };
    Ok(arr.shift().unwrap_or(JsValue::undefined()))
}

fn array_unshift(this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    let obj = this_object(this, "Array.prototype.unshift")?;
    let mut guard = obj.borrow_mut();
    let ObjectData::Array(arr) = &mut guard.data else {
        return Err(JsNativeError::typ("Array.prototype.unshift called on a non-array").into());
    };
    Ok(JsValue::from(arr.unshift(args) as f64))
}

fn array_reverse(this: &JsValue, _args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    let obj = this_object(this, "Array.prototype.reverse")?.clone();
    {
        let mut guard = obj.borrow_mut();
        let ObjectData::Array(arr) = &mut guard.data else {
            return Err(JsNativeError::typ("Array.prototype.reverse called on a non-array").into());
        };
        arr.reverse();
    }
    Ok(JsValue::Object(obj))
}

fn array_slice(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let items = with_data!(this, ObjectData::Array, "Array.prototype.slice", |arr| arr.to_vec());
    let len = items.len() as i64;
    let start = normalize_index(arg(args, 0).as_number().unwrap_or(0.0), len);
    let end = match arg(args, 1) {
        JsValue::Undefined => len,
        v => normalize_index(crate::exec::operations::to_number(ctx, &v)?, len),
    };
    let slice: Vec<JsValue> = if start < end { items[start as usize..end as usize].to_vec() } else { Vec::new() };
    Ok(JsValue::Object(new_array(ctx, slice)))
}

fn normalize_index(n: f64, len: i64) -> i64 {
    let n = if n.is_nan() { 0 } else { n as i64 };
    if n < 0 {
        (len + n).max(0)
    } else {
        n.min(len)
    }
}

fn array_splice(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let obj = this_object(this, "Array.prototype.splice")?.clone();
    let len = with_data!(&JsValue::Object(obj.clone()), ObjectData::Array, "Array.prototype.splice", |arr| arr.length() as i64);
    let start = normalize_index(arg(args, 0).as_number().unwrap_or(0.0), len);
    let delete_count = match arg(args, 1) {
        JsValue::Undefined if args.len() < 2 => 0,
        v => (crate::exec::operations::to_number(ctx, &v)? as i64).clamp(0, len - start),
    };
    let items: Vec<JsValue> = if args.len() > 2 { args[2..].to_vec() } else { Vec::new() };
    let removed = {
        let mut guard = obj.borrow_mut();
        let ObjectData::Array(arr) = &mut guard.data else { unreachable!() };
        arr.splice(start as u32, delete_count as u32, &items)
    };
    Ok(JsValue::Object(new_array(ctx, removed)))
}

fn array_concat(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let mut out = with_data!(this, ObjectData::Array, "Array.prototype.concat", |arr| arr.to_vec());
    for v in args {
        match v {
            JsValue::Object(o) if o.is_array() => {
                let guard = o.borrow();
                let ObjectData::Array(arr) = &guard.data else { unreachable!() };
                out.extend(arr.to_vec());
            }
            other => out.push(other.clone()),
        }
    }
    Ok(JsValue::Object(new_array(ctx, out)))
}

fn array_join(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let items = with_data!(this, ObjectData::Array, "Array.prototype.join", |arr| arr.to_vec());
    let sep = match arg(args, 0) {
        JsValue::Undefined => ",".to_string(),
        v => crate::exec::operations::to_string(ctx, &v)?.as_str().to_string(),
    };
    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        parts.push(match item {
            JsValue::Undefined | JsValue::Null => String::new(),
            v => crate::exec::operations::to_string(ctx, &v)?.as_str().to_string(),
        });
    }
    Ok(JsValue::from(parts.join(&sep)))
}

fn array_to_string(this: &JsValue, _args: &[JsValue], ctx: &mut Context) -> NativeResult {
    array_join(this, &[], ctx)
}

fn array_index_of(this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    let items = with_data!(this, ObjectData::Array, "Array.prototype.indexOf", |arr| arr.to_vec());
    let target = arg(args, 0);
    for (i, v) in items.iter().enumerate() {
        if JsValue::strict_equals(v, &target) {
            return Ok(JsValue::from(i as f64));
        }
    }
    Ok(JsValue::from(-1.0))
}

fn array_includes(this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    let items = with_data!(this, ObjectData::Array, "Array.prototype.includes", |arr| arr.to_vec());
    let target = arg(args, 0);
    Ok(JsValue::from(items.iter().any(|v| JsValue::same_value_zero(v, &target))))
}

fn array_for_each(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let items = with_data!(this, ObjectData::Array, "Array.prototype.forEach", |arr| arr.to_vec());
    let callback = arg(args, 0);
    let this_arg = arg(args, 1);
    for (i, v) in items.into_iter().enumerate() {
        ctx.call_function(&callback, &this_arg, &[v, JsValue::from(i as u32), this.clone()])?;
    }
    Ok(JsValue::undefined())
}

fn array_map(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let items = with_data!(this, ObjectData::Array, "Array.prototype.map", |arr| arr.to_vec());
    let callback = arg(args, 0);
    let this_arg = arg(args, 1);
    let mut out = Vec::with_capacity(items.len());
    for (i, v) in items.into_iter().enumerate() {
        out.push(ctx.call_function(&callback, &this_arg, &[v, JsValue::from(i as u32), this.clone()])?);
    }
    Ok(JsValue::Object(new_array(ctx, out)))
}

fn array_filter(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let items = with_data!(this, ObjectData::Array, "Array.prototype.filter", |arr| arr.to_vec());
    let callback = arg(args, 0);
    let this_arg = arg(args, 1);
    let mut out = Vec::new();
    for (i, v) in items.into_iter().enumerate() {
        let keep = ctx.call_function(&callback, &this_arg, &[v.clone(), JsValue::from(i as u32), this.clone()])?;
        if keep.to_boolean() {
            out.push(v);
        }
    }
    Ok(JsValue::Object(new_array(ctx, out)))
}

fn array_reduce(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let items = with_data!(this, ObjectData::Array, "Array.prototype.reduce", |arr| arr.to_vec());
    let callback = arg(args, 0);
    let mut iter = items.into_iter().enumerate();
    let mut acc = if args.len() > 1 {
        arg(args, 1)
    } else {
        let (_, first) = iter.next().ok_or_else(|| JsNativeError::typ("Reduce of empty array with no initial value"))?;
        first
    };
    for (i, v) in iter {
        acc = ctx.call_function(&callback, &JsValue::undefined(), &[acc, v, JsValue::from(i as u32), this.clone()])?;
    }
    Ok(acc)
}

fn array_some(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let items = with_data!(this, ObjectData::Array, "Array.prototype.some", |arr| arr.to_vec());
    let callback = arg(args, 0);
    let this_arg = arg(args, 1);
    for (i, v) in items.into_iter().enumerate() {
        if ctx.call_function(&callback, &this_arg, &[v, JsValue::from(i as u32), this.clone()])?.to_boolean() {
            return Ok(JsValue::from(true));
        }
    }
    Ok(JsValue::from(false))
}

fn array_every(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let items = with_data!(this, ObjectData::Array, "Array.prototype.every", |arr| arr.to_vec());
    let callback = arg(args, 0);
    let this_arg = arg(args, 1);
    for (i, v) in items.into_iter().enumerate() {
        if !ctx.call_function(&callback, &this_arg, &[v, JsValue::from(i as u32), this.clone()])?.to_boolean() {
            return Ok(JsValue::from(false));
        }
    }
    Ok(JsValue::from(true))
}

fn array_find(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let items = with_data!(this, ObjectData::Array, "Array.prototype.find", |arr| arr.to_vec());
    let callback = arg(args, 0);
    let this_arg = arg(args, 1);
    for (i, v) in items.into_iter().enumerate() {
        if ctx.call_function(&callback, &this_arg, &[v.clone(), JsValue::from(i as u32), this.clone()])?.to_boolean() {
            return Ok(v);
        }
    }
    Ok(JsValue::undefined())
}

fn array_find_index(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let items = with_data!(this, ObjectData::Array, "Array.prototype.findIndex", |arr| arr.to_vec());
    let callback = arg(args, 0);
    let this_arg = arg(args, 1);
    for (i, v) in items.into_iter().enumerate() {
        if ctx.call_function(&callback, &this_arg, &[v, JsValue::from(i as u32), this.clone()])?.to_boolean() {
            return Ok(JsValue::from(i as f64));
        }
    }
    Ok(JsValue::from(-1.0))
}

fn array_values(this: &JsValue, _args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let obj = this_object(this, "Array.prototype.values")?.clone();
    let proto = JsValue::Object(ctx.realm().array_iterator_prototype().clone());
    let iter = JsObject::new(
        ObjectData::ArrayIterator(ArrayIteratorData { target: obj, next_index: 0, done: false }),
        proto,
    );
    Ok(JsValue::Object(iter))
}

fn init_array_iterator(realm: &Realm, func_proto: &JsValue) {
    ObjectInitializer::new(realm.array_iterator_prototype(), func_proto.clone())
        .function("next", array_iterator_next, 0)
        .build();
    let proto = realm.array_iterator_prototype().clone();
    let self_iter = FunctionBuilder::new("[Symbol.iterator]", |this: &JsValue, _: &[JsValue], _: &mut Context| Ok(this.clone()))
        .length(0)
        .build(func_proto);
    proto.borrow_mut().properties_mut().insert(
        PropertyKey::Symbol(realm.well_known_symbols().iterator.clone()),
        PropertyDescriptor::data(JsValue::Object(self_iter), true, false, true),
    );
}

fn array_iterator_next(this: &JsValue, _args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let obj = this_object(this, "ArrayIterator.prototype.next")?.clone();
    let (value, done) = {
        let mut guard = obj.borrow_mut();
        let ObjectData::ArrayIterator(data) = &mut guard.data else {
            return Err(JsNativeError::typ("not an array iterator").into());
        };
        if data.done {
            (None, true)
        } else {
            let target = data.target.clone();
            let index = data.next_index;
            let len = match &target.borrow().data {
                ObjectData::Array(arr) => arr.length(),
                _ => 0,
            };
            if index >= len {
                data.done = true;
                (None, true)
            } else {
                data.next_index += 1;
                let v = array::get_element_for_iterator(&target, index);
                (Some(v), false)
            }
        }
    };
    Ok(JsValue::Object(make_iter_result(ctx, value.unwrap_or(JsValue::undefined()), done)))
}

fn make_iter_result(ctx: &Context, value: JsValue, done: bool) -> JsObject {
    let result = JsObject::ordinary(JsValue::Object(ctx.realm().object_prototype().clone()));
    crate::object::operations::define(&result, PropertyKey::from_str("value"), PropertyDescriptor::data(value, true, true, true));
    crate::object::operations::define(&result, PropertyKey::from_str("done"), PropertyDescriptor::data(JsValue::from(done), true, true, true));
    result
}

// ===========================================================================
// Boolean / Number / String wrapper objects
// ===========================================================================

fn init_boolean(realm: &Realm, func_proto: &JsValue) {
    let proto = realm.boolean_prototype().clone();
    let (ctor, _) = ConstructorBuilder::new("Boolean", boolean_constructor, func_proto, proto)
        .length(1)
        .method("toString", |this: &JsValue, _: &[JsValue], _: &mut Context| {
            Ok(JsValue::from(if unwrap_boolean(this)? { "true" } else { "false" }))
        }, 0)
        .method("valueOf", |this: &JsValue, _: &[JsValue], _: &mut Context| Ok(JsValue::from(unwrap_boolean(this)?)), 0)
        .build();
    install_global(realm, "Boolean", JsValue::Object(ctor));
}

fn unwrap_boolean(this: &JsValue) -> JsResult<bool> {
    match this {
        JsValue::Boolean(b) => Ok(*b),
        JsValue::Object(o) => match &o.borrow().data {
            ObjectData::Boolean(b) => Ok(*b),
            _ => Err(JsNativeError::typ("not a Boolean").into()),
        },
        _ => Err(JsNativeError::typ("not a Boolean").into()),
    }
}

fn boolean_constructor(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let b = arg(args, 0).to_boolean();
    Ok(JsValue::Object(JsObject::new(ObjectData::Boolean(b), JsValue::Object(ctx.realm().boolean_prototype().clone()))))
}

fn init_number(realm: &Realm, func_proto: &JsValue) {
    let proto = realm.number_prototype().clone();
    let (ctor, _) = ConstructorBuilder::new("Number", number_constructor, func_proto, proto)
        .length(1)
        .static_method("isInteger", |_: &JsValue, args: &[JsValue], _: &mut Context| {
            Ok(JsValue::from(matches!(arg(args, 0), JsValue::Number(n) if n.is_finite() && n.fract() == 0.0)))
        }, 1)
        .static_method("isFinite", |_: &JsValue, args: &[JsValue], _: &mut Context| {
            Ok(JsValue::from(matches!(arg(args, 0), JsValue::Number(n) if n.is_finite())))
        }, 1)
        .static_method("isNaN", |_: &JsValue, args: &[JsValue], _: &mut Context| {
            Ok(JsValue::from(matches!(arg(args, 0), JsValue::Number(n) if n.is_nan())))
        }, 1)
        .static_property("MAX_SAFE_INTEGER", JsValue::from(9007199254740991.0), Attribute::read_only())
        .static_property("MIN_SAFE_INTEGER", JsValue::from(-9007199254740991.0), Attribute::read_only())
        .static_property("EPSILON", JsValue::from(f64::EPSILON), Attribute::read_only())
        .static_property("POSITIVE_INFINITY", JsValue::from(f64::INFINITY), Attribute::read_only())
        .static_property("NEGATIVE_INFINITY", JsValue::from(f64::NEG_INFINITY), Attribute::read_only())
        .static_property("NaN", JsValue::nan(), Attribute::read_only())
        .method("toString", |this: &JsValue, args: &[JsValue], ctx: &mut Context| {
            let n = unwrap_number(this)?;
            match arg(args, 0) {
                JsValue::Undefined => Ok(JsValue::from(crate::exec::operations::numeric_to_display(n))),
                v => {
                    let radix = crate::exec::operations::to_number(ctx, &v)? as u32;
                    Ok(JsValue::from(crate::bigint::JsBigInt::new(n as i64).to_string_radix(radix.max(2))))
                }
            }
        }, 1)
        .method("valueOf", |this: &JsValue, _: &[JsValue], _: &mut Context| Ok(JsValue::from(unwrap_number(this)?)), 0)
        .build();
    install_global(realm, "Number", JsValue::Object(ctor));
}

fn unwrap_number(this: &JsValue) -> JsResult<f64> {
    match this {
        JsValue::Number(n) => Ok(*n),
        JsValue::Object(o) => match &o.borrow().data {
            ObjectData::Number(n) => Ok(*n),
            _ => Err(JsNativeError::typ("not a Number").into()),
        },
        _ => Err(JsNativeError::typ("not a Number").into()),
    }
}

fn number_constructor(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let n = match args.first() {
        Some(v) => crate::exec::operations::to_number(ctx, v)?,
        None => 0.0,
    };
    Ok(JsValue::Object(JsObject::new(ObjectData::Number(n), JsValue::Object(ctx.realm().number_prototype().clone()))))
}

fn init_string(realm: &Realm, func_proto: &JsValue) {
    let proto = realm.string_prototype().clone();
    let (ctor, _) = ConstructorBuilder::new("String", string_constructor, func_proto, proto)
        .length(1)
        .static_method("fromCharCode", |_: &JsValue, args: &[JsValue], ctx: &mut Context| {
            let mut units = Vec::with_capacity(args.len());
            for a in args {
                units.push(crate::exec::operations::to_number(ctx, a)? as u16);
            }
            Ok(JsValue::from(String::from_utf16_lossy(&units)))
        }, 1)
        .method("toString", |this: &JsValue, _: &[JsValue], _: &mut Context| Ok(JsValue::from(unwrap_string(this)?)), 0)
        .method("valueOf", |this: &JsValue, _: &[JsValue], _: &mut Context| Ok(JsValue::from(unwrap_string(this)?)), 0)
        .method("charAt", |this: &JsValue, args: &[JsValue], ctx: &mut Context| {
            let s = unwrap_string(this)?;
            let i = crate::exec::operations::to_number(ctx, &arg(args, 0))? as i64;
            Ok(JsValue::from(s.chars().nth(i.max(0) as usize).map(|c| c.to_string()).unwrap_or_default()))
        }, 1)
        .method("charCodeAt", |this: &JsValue, args: &[JsValue], ctx: &mut Context| {
            let s = unwrap_string(this)?;
            let i = crate::exec::operations::to_number(ctx, &arg(args, 0))? as i64;
            let units = s.encode_utf16().collect::<Vec<u16>>();
            match units.get(i.max(0) as usize) {
                Some(u) => Ok(JsValue::from(*u as f64)),
                None => Ok(JsValue::nan()),
            }
        }, 1)
        .method("indexOf", |this: &JsValue, args: &[JsValue], ctx: &mut Context| {
            let s = unwrap_string(this)?;
            let needle = crate::exec::operations::to_string(ctx, &arg(args, 0))?;
            Ok(JsValue::from(s.find(needle.as_str()).map(|b| s[..b].encode_utf16().count() as f64).unwrap_or(-1.0)))
        }, 1)
        .method("includes", |this: &JsValue, args: &[JsValue], ctx: &mut Context| {
            let s = unwrap_string(this)?;
            let needle = crate::exec::operations::to_string(ctx, &arg(args, 0))?;
            Ok(JsValue::from(s.contains(needle.as_str())))
        }, 1)
        .method("slice", |this: &JsValue, args: &[JsValue], ctx: &mut Context| {
            let s = unwrap_string(this)?;
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len() as i64;
            let start = normalize_index(arg(args, 0).as_number().unwrap_or(0.0), len);
            let end = match arg(args, 1) {
                JsValue::Undefined => len,
                v => normalize_index(crate::exec::operations::to_number(ctx, &v)?, len),
            };
            let slice: String = if start < end { chars[start as usize..end as usize].iter().collect() } else { String::new() };
            Ok(JsValue::from(slice))
        }, 2)
        .method("split", |this: &JsValue, args: &[JsValue], ctx: &mut Context| {
            let s = unwrap_string(this)?;
            let parts: Vec<JsValue> = match arg(args, 0) {
                JsValue::Undefined => vec![JsValue::from(s)],
                v => {
                    let sep = crate::exec::operations::to_string(ctx, &v)?;
                    if sep.as_str().is_empty() {
                        s.chars().map(|c| JsValue::from(c.to_string())).collect()
                    } else {
                        s.split(sep.as_str()).map(JsValue::from).collect()
                    }
                }
            };
            Ok(JsValue::Object(new_array(ctx, parts)))
        }, 2)
        .method("toUpperCase", |this: &JsValue, _: &[JsValue], _: &mut Context| Ok(JsValue::from(unwrap_string(this)?.to_uppercase())), 0)
        .method("toLowerCase", |this: &JsValue, _: &[JsValue], _: &mut Context| Ok(JsValue::from(unwrap_string(this)?.to_lowercase())), 0)
        .method("trim", |this: &JsValue, _: &[JsValue], _: &mut Context| Ok(JsValue::from(unwrap_string(this)?.trim().to_string())), 0)
        .method("repeat", |this: &JsValue, args: &[JsValue], ctx: &mut Context| {
            let s = unwrap_string(this)?;
            let n = crate::exec::operations::to_number(ctx, &arg(args, 0))?;
            if n < 0.0 || !n.is_finite() {
                return Err(JsNativeError::range("invalid repeat count").into());
            }
            Ok(JsValue::from(s.repeat(n as usize)))
        }, 1)
        .method("concat", |this: &JsValue, args: &[JsValue], ctx: &mut Context| {
            let mut s = unwrap_string(this)?;
            for a in args {
                s.push_str(crate::exec::operations::to_string(ctx, a)?.as_str());
            }
            Ok(JsValue::from(s))
        }, 1)
        .method("startsWith", |this: &JsValue, args: &[JsValue], ctx: &mut Context| {
            let s = unwrap_string(this)?;
            let needle = crate::exec::operations::to_string(ctx, &arg(args, 0))?;
            Ok(JsValue::from(s.starts_with(needle.as_str())))
        }, 1)
        .method("endsWith", |this: &JsValue, args: &[JsValue], ctx: &mut Context| {
            let s = unwrap_string(this)?;
            let needle = crate::exec::operations::to_string(ctx, &arg(args, 0))?;
            Ok(JsValue::from(s.ends_with(needle.as_str())))
        }, 1)
        .accessor(
            "length",
            Some(FunctionBuilder::new("length", |this: &JsValue, _: &[JsValue], _: &mut Context| {
                Ok(JsValue::from(JsString::new(unwrap_string(this)?).utf16_len() as f64))
            }).build(func_proto)),
            None,
            Attribute::new(false, false, true),
        )
        .build();
    install_global(realm, "String", JsValue::Object(ctor));
}

fn unwrap_string(this: &JsValue) -> JsResult<String> {
    match this {
        JsValue::String(s) => Ok(s.as_str().to_string()),
        JsValue::Object(o) => match &o.borrow().data {
            ObjectData::String(s) => Ok(s.as_str().to_string()),
            _ => Err(JsNativeError::typ("not a String").into()),
        },
        _ => Err(JsNativeError::typ("not a String").into()),
    }
}

fn string_constructor(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let s = match args.first() {
        Some(v) => crate::exec::operations::to_string(ctx, v)?,
        None => JsString::new(""),
    };
    Ok(JsValue::Object(JsObject::new(ObjectData::String(s), JsValue::Object(ctx.realm().string_prototype().clone()))))
}

// ===========================================================================
// Symbol
// ===========================================================================

fn init_symbol(realm: &mut Realm, func_proto: &JsValue) {
    let symbol_prototype = realm.symbol_prototype().clone();
    let ctor = FunctionBuilder::new("Symbol", symbol_constructor)
        .length(0)
        .disallow_construct("Symbol is not a constructor")
        .build(func_proto);
    ObjectInitializer::new(&ctor, func_proto.clone())
        .function("for", symbol_for_static, 1)
        .function("keyFor", symbol_key_for_static, 1)
        .build();
    ctor.borrow_mut().properties_mut().insert(
        PropertyKey::from_str("prototype"),
        PropertyDescriptor::data(JsValue::Object(symbol_prototype.clone()), false, false, false),
    );
    symbol_prototype.borrow_mut().properties_mut().insert(
        PropertyKey::from_str("constructor"),
        PropertyDescriptor::data(JsValue::Object(ctor.clone()), true, false, true),
    );
    ObjectInitializer::new(&symbol_prototype, func_proto.clone())
        .function("toString", symbol_to_string, 0)
        .build();

    let wks = realm.well_known_symbols().clone();
    let named: [(&str, JsSymbol); 13] = [
        ("iterator", wks.iterator),
        ("asyncIterator", wks.async_iterator),
        ("toPrimitive", wks.to_primitive),
        ("toStringTag", wks.to_string_tag),
        ("hasInstance", wks.has_instance),
        ("species", wks.species),
        ("isConcatSpreadable", wks.is_concat_spreadable),
        ("unscopables", wks.unscopables),
        ("match", wks.r#match),
        ("matchAll", wks.match_all),
        ("replace", wks.replace),
        ("search", wks.search),
        ("split", wks.split),
    ];
    for (name, sym) in named {
        ctor.borrow_mut().properties_mut().insert(
            PropertyKey::from_str(name),
            PropertyDescriptor::data(JsValue::Symbol(sym), false, false, false),
        );
    }
    install_global(realm, "Symbol", JsValue::Object(ctor));
}

fn symbol_constructor(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let description = match arg(args, 0) {
        JsValue::Undefined => None,
        v => Some(crate::exec::operations::to_string(ctx, &v)?.as_str().to_string()),
    };
    Ok(JsValue::Symbol(JsSymbol::new(description.as_deref())))
}

fn symbol_for_static(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let key = crate::exec::operations::to_string(ctx, &arg(args, 0))?;
    Ok(JsValue::Symbol(symbol_for(key.as_str())))
}

fn symbol_key_for_static(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    match arg(args, 0) {
        JsValue::Symbol(s) => Ok(symbol_key_for(&s).map(JsValue::from).unwrap_or(JsValue::undefined())),
        _ => Err(JsNativeError::typ("Symbol.keyFor requires a symbol").into()),
    }
}

fn symbol_to_string(this: &JsValue, _args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    match this {
        JsValue::Symbol(s) => Ok(JsValue::from(format!("Symbol({})", s.description().unwrap_or_default()))),
        _ => Err(JsNativeError::typ("not a Symbol").into()),
    }
}

// ===========================================================================
// RegExp
// ===========================================================================

fn init_regexp(realm: &Realm, func_proto: &JsValue) {
    let proto = realm.regexp_prototype().clone();
    let (ctor, _) = ConstructorBuilder::new("RegExp", regexp_constructor, func_proto, proto)
        .length(2)
        .method("test", regexp_test, 1)
        .method("exec", regexp_exec, 1)
        .method("toString", regexp_to_string, 0)
        .build();
    install_well_known_accessor(realm.regexp_prototype(), func_proto, PropertyKey::from_str("source"), "get source", |this, _, _| {
        let obj = this_object(this, "RegExp.prototype.source")?;
        let guard = obj.borrow();
        let ObjectData::RegExp(r) = &guard.data else {
            return Err(JsNativeError::typ("not a RegExp").into());
        };
        Ok(JsValue::from(r.source().as_str().to_string()))
    });
    install_well_known_accessor(realm.regexp_prototype(), func_proto, PropertyKey::from_str("flags"), "get flags", |this, _, _| {
        let obj = this_object(this, "RegExp.prototype.flags")?;
        let guard = obj.borrow();
        let ObjectData::RegExp(r) = &guard.data else {
            return Err(JsNativeError::typ("not a RegExp").into());
        };
        Ok(JsValue::from(r.flags_string().as_str().to_string()))
    });
    install_global(realm, "RegExp", JsValue::Object(ctor));
}

/// Mirrors `r.last_index()` back onto the object's own `lastIndex` data
/// property, which is what script actually reads/writes (spec.md §22.2.7.2
/// RegExpBuiltinExec's step of writing `R.[[LastIndex]]`).
fn sync_last_index_prop(obj: &JsObject, value: u32) {
    crate::object::operations::define(
        obj,
        PropertyKey::from_str("lastIndex"),
        PropertyDescriptor::data(JsValue::from(value as f64), true, false, false),
    );
}

fn regexp_constructor(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let (source, flags) = match arg(args, 0) {
        JsValue::Object(o) if matches!(o.borrow().data, ObjectData::RegExp(_)) => {
            let guard = o.borrow();
            let ObjectData::RegExp(r) = &guard.data else { unreachable!() };
            (r.source().as_str().to_string(), r.flags_string())
        }
        v => (crate::exec::operations::to_string(ctx, &v)?.as_str().to_string(), String::new()),
    };
    let flags = match arg(args, 1) {
        JsValue::Undefined => flags,
        v => crate::exec::operations::to_string(ctx, &v)?.as_str().to_string(),
    };
    let regexp = JsRegExp::new(&source, &flags)?;
    let proto = JsValue::Object(ctx.realm().regexp_prototype().clone());
    let obj = JsObject::new(ObjectData::RegExp(Box::new(regexp)), proto);
    crate::object::operations::define(&obj, PropertyKey::from_str("lastIndex"), PropertyDescriptor::data(JsValue::from(0.0), true, false, false));
    Ok(JsValue::Object(obj))
}

fn regexp_test(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let obj = this_object(this, "RegExp.prototype.test")?.clone();
    let input = crate::exec::operations::to_string(ctx, &arg(args, 0))?;
    let result = {
        let guard = obj.borrow();
        let ObjectData::RegExp(r) = &guard.data else {
            return Err(JsNativeError::typ("RegExp.prototype.test called on incompatible receiver").into());
        };
        r.builtin_exec(input.as_str())?
    };
    if let Some(m) = &result {
        let is_global_or_sticky = {
            let guard = obj.borrow();
            let ObjectData::RegExp(r) = &guard.data else { unreachable!() };
            r.is_global() || r.is_sticky()
        };
        if is_global_or_sticky {
            sync_last_index_prop(&obj, m.end as u32);
        }
    }
    Ok(JsValue::from(result.is_some()))
}

fn regexp_exec(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let obj = this_object(this, "RegExp.prototype.exec")?.clone();
    let input = crate::exec::operations::to_string(ctx, &arg(args, 0))?;
    let result = {
        let guard = obj.borrow();
        let ObjectData::RegExp(r) = &guard.data else {
            return Err(JsNativeError::typ("RegExp.prototype.exec called on incompatible receiver").into());
        };
        r.builtin_exec(input.as_str())?
    };
    match result {
        None => Ok(JsValue::null()),
        Some(m) => {
            let is_global_or_sticky = {
                let guard = obj.borrow();
                let ObjectData::RegExp(r) = &guard.data else { unreachable!() };
                r.is_global() || r.is_sticky()
            };
            if is_global_or_sticky {
                sync_last_index_prop(&obj, m.end as u32);
            }
            let mut elements = vec![JsValue::from(m.matched.clone())];
            for capture in &m.captures {
                elements.push(capture.clone().map(JsValue::from).unwrap_or(JsValue::undefined()));
            }
            let array = new_array(ctx, elements);
            crate::object::operations::define(&array, PropertyKey::from_str("index"), PropertyDescriptor::data(JsValue::from(m.index as f64), true, true, true));
            crate::object::operations::define(&array, PropertyKey::from_str("input"), PropertyDescriptor::data(JsValue::from(input), true, true, true));
            if !m.named.is_empty() {
                let groups = JsObject::ordinary(JsValue::null());
                for (name, value) in &m.named {
                    crate::object::operations::define(&groups, PropertyKey::from_str(name), PropertyDescriptor::data(value.clone().map(JsValue::from).unwrap_or(JsValue::undefined()), true, true, true));
                }
                crate::object::operations::define(&array, PropertyKey::from_str("groups"), PropertyDescriptor::data(JsValue::Object(groups), true, true, true));
            } else {
                crate::object::operations::define(&array, PropertyKey::from_str("groups"), PropertyDescriptor::data(JsValue::undefined(), true, true, true));
            }
            Ok(JsValue::Object(array))
        }
    }
}

fn regexp_to_string(this: &JsValue, _args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    let obj = this_object(this, "RegExp.prototype.toString")?.clone();
    let guard = obj.borrow();
    let ObjectData::RegExp(r) = &guard.data else {
        return Err(JsNativeError::typ("not a RegExp").into());
    };
    Ok(JsValue::from(format!("/{}/{}", r.source().as_str(), r.flags_string())))
}

// ===========================================================================
// Errors
// ===========================================================================

const NATIVE_ERROR_NAMES: [&str; 6] = ["Error", "TypeError", "RangeError", "ReferenceError", "SyntaxError", "URIError"];

fn init_errors(realm: &mut Realm, func_proto: &JsValue) {
    let base_proto = realm.error_prototype().clone();
    install_error_prototype_methods(&base_proto, func_proto, "Error");
    let (base_ctor, _) = ConstructorBuilder::new("Error", |this, args, ctx| error_constructor(this, args, ctx, "Error"), func_proto, base_proto.clone())
        .length(1)
        .build();
    install_global(realm, "Error", JsValue::Object(base_ctor.clone()));
    realm.native_error_prototypes.insert("Error", base_proto.clone());

    for &name in NATIVE_ERROR_NAMES.iter().filter(|n| **n != "Error") {
        let proto = JsObject::new(ObjectData::Error, JsValue::Object(base_proto.clone()));
        install_error_prototype_methods(&proto, func_proto, name);
        let ctor = ConstructorBuilder::new(name, move |this, args, ctx| error_constructor(this, args, ctx, name), func_proto, proto.clone());
        let (ctor, _) = ctor.length(1).build();
        // Subclass chain: `TypeError.prototype.__proto__ === Error.prototype`
        // already holds via `base_proto` above; the constructor itself also
        // chains to `Error` (spec.md §7's error-family prototype chain).
        ctor.set_prototype_unchecked(JsValue::Object(base_ctor.clone()));
        install_global(realm, name, JsValue::Object(ctor));
        realm.native_error_prototypes.insert(name, proto);
    }
    // EvalError has no constructor in this crate's global surface (`eval` is
    // out of scope), but `ErrorKind::Eval` still needs a `.prototype` to
    // realize internal eval-shaped errors against.
    let eval_proto = JsObject::new(ObjectData::Error, JsValue::Object(base_proto));
    install_error_prototype_methods(&eval_proto, func_proto, "EvalError");
    realm.native_error_prototypes.insert("EvalError", eval_proto);
}

fn install_error_prototype_methods(proto: &JsObject, func_proto: &JsValue, name: &'static str) {
    ObjectInitializer::new(proto, func_proto.clone())
        .property("name", JsValue::from(name), Attribute::non_enumerable())
        .property("message", JsValue::from(""), Attribute::non_enumerable())
        .function("toString", error_to_string, 0)
        .build();
}

fn error_constructor(_this: &JsValue, args: &[JsValue], ctx: &mut Context, kind_name: &'static str) -> NativeResult {
    let proto = ctx
        .realm()
        .native_error_prototypes
        .get(kind_name)
        .cloned()
        .unwrap_or_else(|| ctx.realm().error_prototype.clone());
    let obj = JsObject::new(ObjectData::Error, JsValue::Object(proto));
    if let Some(message) = args.first().filter(|v| !v.is_undefined()) {
        let message = crate::exec::operations::to_string(ctx, message)?;
        crate::object::operations::define(&obj, PropertyKey::from_str("message"), PropertyDescriptor::data(JsValue::from(message), true, false, true));
    }
    if let Some(JsValue::Object(options)) = args.get(1) {
        let cause_key = PropertyKey::from_str("cause");
        if crate::object::operations::own_keys(options).contains(&cause_key) {
            let mut getter = |g: &JsValue, r: &JsValue, a: &[JsValue]| ctx.call_function(g, r, a);
            if let Some(cause) = crate::object::operations::try_get(options, &cause_key, &JsValue::Object(options.clone()), &mut getter)? {
                crate::object::operations::define(&obj, cause_key, PropertyDescriptor::data(cause, true, false, true));
            }
        }
    }
    Ok(JsValue::Object(obj))
}

fn error_to_string(this: &JsValue, _args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let obj = this_object(this, "Error.prototype.toString")?.clone();
    let mut getter = |g: &JsValue, r: &JsValue, a: &[JsValue]| ctx.call_function(g, r, a);
    let name = crate::object::operations::try_get(&obj, &PropertyKey::from_str("name"), this, &mut getter)?
        .map(|v| v.to_display_string())
        .unwrap_or_else(|| "Error".to_string());
    let mut getter = |g: &JsValue, r: &JsValue, a: &[JsValue]| ctx.call_function(g, r, a);
    let message = crate::object::operations::try_get(&obj, &PropertyKey::from_str("message"), this, &mut getter)?
        .map(|v| v.to_display_string())
        .unwrap_or_default();
    Ok(JsValue::from(if message.is_empty() { name } else { format!("{name}: {message}") }))
}

// ===========================================================================
// Promise
// ===========================================================================

fn init_promise(realm: &Realm, func_proto: &JsValue) {
    let proto = realm.promise_prototype().clone();
    let (ctor, _) = ConstructorBuilder::new("Promise", promise_constructor, func_proto, proto)
        .length(1)
        .static_method("resolve", promise_resolve_static, 1)
        .static_method("reject", promise_reject_static, 1)
        .static_method("all", promise_all, 1)
        .static_method("allSettled", promise_all_settled, 1)
        .static_method("race", promise_race, 1)
        .static_method("any", promise_any, 1)
        .method("then", promise_then, 2)
        .method("catch", promise_catch, 1)
        .method("finally", promise_finally, 1)
        .build();
    install_global(realm, "Promise", JsValue::Object(ctor));
}

fn new_pending_promise(ctx: &Context) -> JsObject {
    crate::promise::new_promise(JsValue::Object(ctx.realm().promise_prototype().clone()))
}

fn promise_constructor(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let executor = arg(args, 0);
    if executor.as_callable().is_none() {
        return Err(JsNativeError::typ("Promise resolver is not a function").into());
    }
    let promise = new_pending_promise(ctx);
    let func_proto = JsValue::Object(ctx.realm().function_prototype().clone());
    let (resolve, reject) = crate::promise::create_resolving_functions(promise.clone(), func_proto);
    let call_result = ctx.call_function(&executor, &JsValue::undefined(), &[JsValue::Object(resolve), JsValue::Object(reject.clone())]);
    if let Err(e) = call_result {
        let reason = ctx.realize(&e);
        crate::promise::reject(&promise, reason, &ctx.scheduler)?;
    }
    Ok(JsValue::Object(promise))
}

fn promise_resolve_static(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let value = arg(args, 0);
    if let JsValue::Object(o) = &value {
        if matches!(o.borrow().data, ObjectData::Promise(_)) {
            return Ok(value);
        }
    }
    let promise = new_pending_promise(ctx);
    let mut call = |f: &JsValue, t: &JsValue, a: &[JsValue]| ctx.call_function(f, t, a);
    crate::promise::resolve(&promise, value, &ctx.scheduler, &mut call)?;
    Ok(JsValue::Object(promise))
}

fn promise_reject_static(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let promise = new_pending_promise(ctx);
    crate::promise::reject(&promise, arg(args, 0), &ctx.scheduler)?;
    Ok(JsValue::Object(promise))
}

fn collect_promises(ctx: &mut Context, iterable: &JsValue) -> JsResult<Vec<JsObject>> {
    let iterator = crate::exec::iteration::get_iterator(ctx, iterable)?;
    let mut out = Vec::new();
    loop {
        let (value, done) = crate::exec::iteration::iterator_step(ctx, &iterator)?;
        if done {
            break;
        }
        let value = value.unwrap_or(JsValue::undefined());
        match promise_resolve_static(&JsValue::undefined(), &[value], ctx)? {
            JsValue::Object(p) => out.push(p),
            _ => unreachable!(),
        }
    }
    Ok(out)
}

fn promise_all(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let items = collect_promises(ctx, &arg(args, 0))?;
    let result = new_pending_promise(ctx);
    let remaining = Rc::new(std::cell::Cell::new(items.len()));
    let results = Rc::new(RefCell::new(vec![JsValue::undefined(); items.len()]));
    if items.is_empty() {
        crate::promise::fulfill(&result, JsValue::Object(new_array(ctx, Vec::new())), &ctx.scheduler)?;
        return Ok(JsValue::Object(result));
    }
    for (i, item) in items.into_iter().enumerate() {
        let result = result.clone();
        let remaining = remaining.clone();
        let results = results.clone();
        let downstream = JsObject::ordinary(JsValue::undefined());
        let on_fulfilled = host_reaction(ctx, move |value, ctx| {
            results.borrow_mut()[i] = value;
            remaining.set(remaining.get() - 1);
            if remaining.get() == 0 {
                let arr = JsValue::Object(new_array(ctx, results.borrow().clone()));
                crate::promise::fulfill(&result, arr, &ctx.scheduler)?;
            }
            Ok(JsValue::undefined())
        });
        let result2 = result.clone();
        let on_rejected = host_reaction(ctx, move |reason, ctx| {
            crate::promise::reject(&result2, reason, &ctx.scheduler)?;
            Ok(JsValue::undefined())
        });
        crate::promise::perform_then(&item, Some(JsValue::Object(on_fulfilled)), Some(JsValue::Object(on_rejected)), downstream, &ctx.scheduler);
    }
    Ok(JsValue::Object(result))
}

fn promise_all_settled(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let items = collect_promises(ctx, &arg(args, 0))?;
    let result = new_pending_promise(ctx);
    let remaining = Rc::new(std::cell::Cell::new(items.len()));
    let results = Rc::new(RefCell::new(vec![JsValue::undefined(); items.len()]));
    if items.is_empty() {
        crate::promise::fulfill(&result, JsValue::Object(new_array(ctx, Vec::new())), &ctx.scheduler)?;
        return Ok(JsValue::Object(result));
    }
    for (i, item) in items.into_iter().enumerate() {
        let downstream = JsObject::ordinary(JsValue::undefined());
        let result_f = result.clone();
        let remaining_f = remaining.clone();
        let results_f = results.clone();
        let on_fulfilled = host_reaction(ctx, move |value, ctx| {
            let entry = settled_record(ctx, "fulfilled", value);
            results_f.borrow_mut()[i] = entry;
            remaining_f.set(remaining_f.get() - 1);
            if remaining_f.get() == 0 {
                let arr = JsValue::Object(new_array(ctx, results_f.borrow().clone()));
                crate::promise::fulfill(&result_f, arr, &ctx.scheduler)?;
            }
            Ok(JsValue::undefined())
        });
        let result_r = result.clone();
        let remaining_r = remaining.clone();
        let results_r = results.clone();
        let on_rejected = host_reaction(ctx, move |reason, ctx| {
            let entry = settled_record(ctx, "rejected", reason);
            results_r.borrow_mut()[i] = entry;
            remaining_r.set(remaining_r.get() - 1);
            if remaining_r.get() == 0 {
                let arr = JsValue::Object(new_array(ctx, results_r.borrow().clone()));
                crate::promise::fulfill(&result_r, arr, &ctx.scheduler)?;
            }
            Ok(JsValue::undefined())
        });
        crate::promise::perform_then(&item, Some(JsValue::Object(on_fulfilled)), Some(JsValue::Object(on_rejected)), downstream, &ctx.scheduler);
    }
    Ok(JsValue::Object(result))
}

fn settled_record(ctx: &Context, status: &str, value: JsValue) -> JsValue {
    let obj = JsObject::ordinary(JsValue::Object(ctx.realm().object_prototype().clone()));
    let key = if status == "fulfilled" { "value" } else { "reason" };
    crate::object::operations::define(&obj, PropertyKey::from_str("status"), PropertyDescriptor::data(JsValue::from(status), true, true, true));
    crate::object::operations::define(&obj, PropertyKey::from_str(key), PropertyDescriptor::data(value, true, true, true));
    JsValue::Object(obj)
}

fn promise_race(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let items = collect_promises(ctx, &arg(args, 0))?;
    let result = new_pending_promise(ctx);
    for item in items {
        let downstream = JsObject::ordinary(JsValue::undefined());
        let result_f = result.clone();
        let on_fulfilled = host_reaction(ctx, move |value, ctx| {
            crate::promise::fulfill(&result_f, value, &ctx.scheduler)?;
            Ok(JsValue::undefined())
        });
        let result_r = result.clone();
        let on_rejected = host_reaction(ctx, move |reason, ctx| {
            crate::promise::reject(&result_r, reason, &ctx.scheduler)?;
            Ok(JsValue::undefined())
        });
        crate::promise::perform_then(&item, Some(JsValue::Object(on_fulfilled)), Some(JsValue::Object(on_rejected)), downstream, &ctx.scheduler);
    }
    Ok(JsValue::Object(result))
}

fn promise_any(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let items = collect_promises(ctx, &arg(args, 0))?;
    let result = new_pending_promise(ctx);
    let remaining = Rc::new(std::cell::Cell::new(items.len()));
    let errors = Rc::new(RefCell::new(vec![JsValue::undefined(); items.len()]));
    if items.is_empty() {
        crate::promise::reject(&result, JsNativeError::typ("all promises were rejected").into(), &ctx.scheduler).ok();
        let err = ctx.realize(&JsNativeError::typ("all promises were rejected").into());
        crate::promise::reject(&result, err, &ctx.scheduler)?;
        return Ok(JsValue::Object(result));
    }
    for (i, item) in items.into_iter().enumerate() {
        let downstream = JsObject::ordinary(JsValue::undefined());
        let result_f = result.clone();
        let on_fulfilled = host_reaction(ctx, move |value, ctx| {
            crate::promise::fulfill(&result_f, value, &ctx.scheduler)?;
            Ok(JsValue::undefined())
        });
        let result_r = result.clone();
        let remaining_r = remaining.clone();
        let errors_r = errors.clone();
        let on_rejected = host_reaction(ctx, move |reason, ctx| {
            errors_r.borrow_mut()[i] = reason;
            remaining_r.set(remaining_r.get() - 1);
            if remaining_r.get() == 0 {
                let agg = JsNativeError::typ("all promises were rejected");
                let reason = ctx.realize(&agg.into());
                if let JsValue::Object(obj) = &reason {
                    let errs = JsValue::Object(new_array(ctx, errors_r.borrow().clone()));
                    crate::object::operations::define(obj, PropertyKey::from_str("errors"), PropertyDescriptor::data(errs, true, false, true));
                }
                crate::promise::reject(&result_r, reason, &ctx.scheduler)?;
            }
            Ok(JsValue::undefined())
        });
        crate::promise::perform_then(&item, Some(JsValue::Object(on_fulfilled)), Some(JsValue::Object(on_rejected)), downstream, &ctx.scheduler);
    }
    Ok(JsValue::Object(result))
}

/// Wraps a Rust closure as a one-shot native host function, used for the
/// internal reaction handlers `Promise.all`/`allSettled`/`race`/`any` attach
/// via `perform_then` (spec.md §4.6's combinators aren't script-observable
/// callables, so they skip `ConstructorBuilder` and go straight through
/// `FunctionBuilder`).
fn host_reaction(ctx: &Context, f: impl Fn(JsValue, &mut Context) -> NativeResult + 'static) -> JsObject {
    let wrapped: Rc<dyn Fn(JsValue, &mut Context) -> NativeResult> = Rc::new(f);
    let data = crate::object::function::HostClosureData { handler: wrapped };
    JsObject::new(
        ObjectData::Function(Function::HostClosure(data)),
        JsValue::Object(ctx.realm().function_prototype().clone()),
    )
}

fn promise_then(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let obj = this_object(this, "Promise.prototype.then")?.clone();
    if !matches!(obj.borrow().data, ObjectData::Promise(_)) {
        return Err(JsNativeError::typ("Promise.prototype.then called on incompatible receiver").into());
    }
    let downstream = new_pending_promise(ctx);
    let on_fulfilled = arg(args, 0);
    let on_rejected = arg(args, 1);
    crate::promise::perform_then(
        &obj,
        on_fulfilled.as_callable().map(|o| JsValue::Object(o.clone())),
        on_rejected.as_callable().map(|o| JsValue::Object(o.clone())),
        downstream.clone(),
        &ctx.scheduler,
    );
    Ok(JsValue::Object(downstream))
}

fn promise_catch(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    promise_then(this, &[JsValue::undefined(), arg(args, 0)], ctx)
}

fn promise_finally(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let on_finally = arg(args, 0);
    let Some(callback) = on_finally.as_callable().cloned() else {
        return promise_then(this, &[], ctx);
    };
    let fulfilled = host_reaction(ctx, move |value, ctx| {
        ctx.call_function(&JsValue::Object(callback.clone()), &JsValue::undefined(), &[])?;
        Ok(value)
    });
    let callback2 = on_finally.as_callable().cloned().unwrap();
    let rejected = host_reaction(ctx, move |reason, ctx| {
        ctx.call_function(&JsValue::Object(callback2.clone()), &JsValue::undefined(), &[])?;
        Err(JsError::from_value(reason))
    });
    promise_then(this, &[JsValue::Object(fulfilled), JsValue::Object(rejected)], ctx)
}

use crate::error::JsError;

// ===========================================================================
// Generator
// ===========================================================================

fn init_generator(realm: &Realm, func_proto: &JsValue) {
    ObjectInitializer::new(realm.generator_prototype(), func_proto.clone())
        .function("next", generator_next, 1)
        .function("throw", generator_throw, 1)
        .function("return", generator_return, 1)
        .build();
    let proto = realm.generator_prototype().clone();
    let self_iter = FunctionBuilder::new("[Symbol.iterator]", |this: &JsValue, _: &[JsValue], _: &mut Context| Ok(this.clone()))
        .length(0)
        .build(func_proto);
    proto.borrow_mut().properties_mut().insert(
        PropertyKey::Symbol(realm.well_known_symbols().iterator.clone()),
        PropertyDescriptor::data(JsValue::Object(self_iter), true, false, true),
    );
}

fn generator_next(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    resume_generator(this, crate::cps::ResumeKind::Next(arg(args, 0)), ctx)
}
fn generator_throw(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    resume_generator(this, crate::cps::ResumeKind::Throw(arg(args, 0)), ctx)
}
fn generator_return(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    resume_generator(this, crate::cps::ResumeKind::Return(arg(args, 0)), ctx)
}

fn resume_generator(this: &JsValue, kind: crate::cps::ResumeKind, ctx: &mut Context) -> NativeResult {
    let obj = this_object(this, "Generator.prototype method")?.clone();
    let (value, done) = {
        let guard = obj.borrow();
        let ObjectData::Generator(stepper) = &guard.data else {
            return Err(JsNativeError::typ("not a generator").into());
        };
        // SAFETY note: `resume` only needs `&self`; the re-entrant call into
        // `ctx` to run the body happens while this `Ref` is held, same as
        // every other injected-callback seam in this crate.
        stepper.resume(ctx, kind)?
    };
    Ok(JsValue::Object(make_iter_result(ctx, value, done)))
}

// ===========================================================================
// Map / Set / WeakMap / WeakSet
// ===========================================================================

fn init_map(realm: &Realm, func_proto: &JsValue) {
    let proto = realm.map_prototype().clone();
    let (ctor, _) = ConstructorBuilder::new("Map", map_constructor, func_proto, proto)
        .length(0)
        .method("get", |this, args, _| Ok(with_map(this, "get", |m| m.get(&arg(args, 0)))?.unwrap_or(JsValue::undefined())), 1)
        .method("set", map_set, 2)
        .method("has", |this, args, _| Ok(JsValue::from(with_map(this, "has", |m| m.has(&arg(args, 0)))?)), 1)
        .method("delete", |this, args, _| Ok(JsValue::from(with_map_mut(this, "delete", |m| m.delete(&arg(args, 0)))?)), 1)
        .method("clear", |this, _args, _| { with_map_mut(this, "clear", |m| m.clear())?; Ok(JsValue::undefined()) }, 0)
        .method("forEach", map_for_each, 1)
        .accessor(
            "size",
            Some(FunctionBuilder::new("get size", |this, _, _| Ok(JsValue::from(with_map(this, "size", |m| m.size())? as f64))).build(func_proto)),
            None,
            Attribute::new(false, false, true),
        )
        .build();
    install_global(realm, "Map", JsValue::Object(ctor));
}

fn map_for_each(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let entries = with_map(this, "forEach", |m| m.entries().map(|(k, v)| (k.clone(), v.clone())).collect::<Vec<_>>())?;
    let callback = arg(args, 0);
    let this_arg = arg(args, 1);
    for (k, v) in entries {
        ctx.call_function(&callback, &this_arg, &[v, k, this.clone()])?;
    }
    Ok(JsValue::undefined())
}

fn with_map<T>(this: &JsValue, what: &str, f: impl FnOnce(&MapData) -> T) -> JsResult<T> {
    let obj = this_object(this, &format!("Map.prototype.{what}"))?;
    let guard = obj.borrow();
    match &guard.data {
        ObjectData::Map(m) => Ok(f(m)),
        _ => Err(JsNativeError::typ(format!("Map.prototype.{what} called on incompatible receiver")).into()),
    }
}

fn with_map_mut<T>(this: &JsValue, what: &str, f: impl FnOnce(&mut MapData) -> T) -> JsResult<T> {
    let obj = this_object(this, &format!("Map.prototype.{what}"))?;
    let mut guard = obj.borrow_mut();
    match &mut guard.data {
        ObjectData::Map(m) => Ok(f(m)),
        _ => Err(JsNativeError::typ(format!("Map.prototype.{what} called on incompatible receiver")).into()),
    }
}

fn map_constructor(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let proto = JsValue::Object(ctx.realm().map_prototype().clone());
    let obj = JsObject::new(ObjectData::Map(MapData::new()), proto);
    if let Some(iterable) = args.first().filter(|v| !v.is_null_or_undefined()) {
        let iterator = crate::exec::iteration::get_iterator(ctx, iterable)?;
        loop {
            let (entry, done) = crate::exec::iteration::iterator_step(ctx, &iterator)?;
            if done {
                break;
            }
            let entry = entry.unwrap_or(JsValue::undefined());
            let entry_iter = crate::exec::iteration::get_iterator(ctx, &entry)?;
            let (k, _) = crate::exec::iteration::iterator_step(ctx, &entry_iter)?;
            let (v, _) = crate::exec::iteration::iterator_step(ctx, &entry_iter)?;
            let mut guard = obj.borrow_mut();
            let ObjectData::Map(m) = &mut guard.data else { unreachable!() };
            m.set(k.unwrap_or(JsValue::undefined()), v.unwrap_or(JsValue::undefined()));
        }
    }
    Ok(JsValue::Object(obj))
}

fn map_set(this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    let obj = this_object(this, "Map.prototype.set")?.clone();
    let mut guard = obj.borrow_mut();
    let ObjectData::Map(m) = &mut guard.data else {
        return Err(JsNativeError::typ("Map.prototype.set called on incompatible receiver").into());
    };
    m.set(arg(args, 0), arg(args, 1));
    drop(guard);
    Ok(JsValue::Object(obj))
}

fn init_set(realm: &Realm, func_proto: &JsValue) {
    let proto = realm.set_prototype().clone();
    let (ctor, _) = ConstructorBuilder::new("Set", set_constructor, func_proto, proto)
        .length(0)
        .method("add", set_add, 1)
        .method("has", |this, args, _| {
            let obj = this_object(this, "Set.prototype.has")?;
            let guard = obj.borrow();
            let ObjectData::Set(s) = &guard.data else { return Err(JsNativeError::typ("Set.prototype.has called on incompatible receiver").into()) };
            Ok(JsValue::from(s.has(&arg(args, 0))))
        }, 1)
        .method("delete", |this, args, _| {
            let obj = this_object(this, "Set.prototype.delete")?;
            let mut guard = obj.borrow_mut();
            let ObjectData::Set(s) = &mut guard.data else { return Err(JsNativeError::typ("Set.prototype.delete called on incompatible receiver").into()) };
            Ok(JsValue::from(s.delete(&arg(args, 0))))
        }, 1)
        .method("clear", |this, _args, _| {
            let obj = this_object(this, "Set.prototype.clear")?;
            let mut guard = obj.borrow_mut();
            let ObjectData::Set(s) = &mut guard.data else { return Err(JsNativeError::typ("Set.prototype.clear called on incompatible receiver").into()) };
            s.clear();
            Ok(JsValue::undefined())
        }, 0)
        .method("forEach", set_for_each, 1)
        .accessor(
            "size",
            Some(FunctionBuilder::new("get size", |this, _, _| {
                let obj = this_object(this, "Set.prototype.size")?;
                let guard = obj.borrow();
                let ObjectData::Set(s) = &guard.data else { return Err(JsNativeError::typ("Set.prototype.size called on incompatible receiver").into()) };
                Ok(JsValue::from(s.size() as f64))
            }).build(func_proto)),
            None,
            Attribute::new(false, false, true),
        )
        .build();
    install_global(realm, "Set", JsValue::Object(ctor));
}

fn set_for_each(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let values = {
        let obj = this_object(this, "Set.prototype.forEach")?;
        let guard = obj.borrow();
        let ObjectData::Set(s) = &guard.data else { return Err(JsNativeError::typ("Set.prototype.forEach called on incompatible receiver").into()) };
        s.values().cloned().collect::<Vec<_>>()
    };
    let callback = arg(args, 0);
    let this_arg = arg(args, 1);
    for v in values {
        ctx.call_function(&callback, &this_arg, &[v.clone(), v, this.clone()])?;
    }
    Ok(JsValue::undefined())
}

fn set_constructor(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let proto = JsValue::Object(ctx.realm().set_prototype().clone());
    let obj = JsObject::new(ObjectData::Set(SetData::new()), proto);
    if let Some(iterable) = args.first().filter(|v| !v.is_null_or_undefined()) {
        let iterator = crate::exec::iteration::get_iterator(ctx, iterable)?;
        loop {
            let (value, done) = crate::exec::iteration::iterator_step(ctx, &iterator)?;
            if done {
                break;
            }
            let mut guard = obj.borrow_mut();
            let ObjectData::Set(s) = &mut guard.data else { unreachable!() };
            s.add(value.unwrap_or(JsValue::undefined()));
        }
    }
    Ok(JsValue::Object(obj))
}

fn set_add(this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    let obj = this_object(this, "Set.prototype.add")?.clone();
    {
        let mut guard = obj.borrow_mut();
        let ObjectData::Set(s) = &mut guard.data else {
            return Err(JsNativeError::typ("Set.prototype.add called on incompatible receiver").into());
        };
        s.add(arg(args, 0));
    }
    Ok(JsValue::Object(obj))
}

fn init_weak_map(realm: &Realm, func_proto: &JsValue) {
    let proto = realm.weak_map_prototype().clone();
    let (ctor, _) = ConstructorBuilder::new("WeakMap", weak_map_constructor, func_proto, proto)
        .length(0)
        .method("set", weak_map_set, 2)
        .method("get", |this, args, _| {
            let key = arg(args, 0).as_object().cloned().ok_or_else(|| JsNativeError::typ("WeakMap key must be an object"))?;
            let obj = this_object(this, "WeakMap.prototype.get")?;
            let guard = obj.borrow();
            let ObjectData::WeakMap(m) = &guard.data else { return Err(JsNativeError::typ("WeakMap.prototype.get called on incompatible receiver").into()) };
            Ok(m.get(&key).unwrap_or(JsValue::undefined()))
        }, 1)
        .method("has", |this, args, _| {
            let key = arg(args, 0).as_object().cloned();
            let Some(key) = key else { return Ok(JsValue::from(false)) };
            let obj = this_object(this, "WeakMap.prototype.has")?;
            let guard = obj.borrow();
            let ObjectData::WeakMap(m) = &guard.data else { return Err(JsNativeError::typ("WeakMap.prototype.has called on incompatible receiver").into()) };
            Ok(JsValue::from(m.has(&key)))
        }, 1)
        .method("delete", |this, args, _| {
            let key = arg(args, 0).as_object().cloned();
            let Some(key) = key else { return Ok(JsValue::from(false)) };
            let obj = this_object(this, "WeakMap.prototype.delete")?;
            let mut guard = obj.borrow_mut();
            let ObjectData::WeakMap(m) = &mut guard.data else { return Err(JsNativeError::typ("WeakMap.prototype.delete called on incompatible receiver").into()) };
            Ok(JsValue::from(m.delete(&key)))
        }, 1)
        .build();
    install_global(realm, "WeakMap", JsValue::Object(ctor));
}

fn weak_map_constructor(_this: &JsValue, _args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let proto = JsValue::Object(ctx.realm().weak_map_prototype().clone());
    Ok(JsValue::Object(JsObject::new(ObjectData::WeakMap(WeakMapData::new()), proto)))
}

fn weak_map_set(this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    let key = arg(args, 0).as_object().cloned().ok_or_else(|| JsNativeError::typ("WeakMap key must be an object"))?;
    let obj = this_object(this, "WeakMap.prototype.set")?.clone();
    {
        let mut guard = obj.borrow_mut();
        let ObjectData::WeakMap(m) = &mut guard.data else {
            return Err(JsNativeError::typ("WeakMap.prototype.set called on incompatible receiver").into());
        };
        m.set(key, arg(args, 1));
    }
    Ok(JsValue::Object(obj))
}

fn init_weak_set(realm: &Realm, func_proto: &JsValue) {
    let proto = realm.weak_set_prototype().clone();
    let (ctor, _) = ConstructorBuilder::new("WeakSet", weak_set_constructor, func_proto, proto)
        .length(0)
        .method("add", weak_set_add, 1)
        .method("has", |this, args, _| {
            let key = arg(args, 0).as_object().cloned();
            let Some(key) = key else { return Ok(JsValue::from(false)) };
            let obj = this_object(this, "WeakSet.prototype.has")?;
            let guard = obj.borrow();
            let ObjectData::WeakSet(s) = &guard.data else { return Err(JsNativeError::typ("WeakSet.prototype.has called on incompatible receiver").into()) };
            Ok(JsValue::from(s.has(&key)))
        }, 1)
        .method("delete", |this, args, _| {
            let key = arg(args, 0).as_object().cloned();
            let Some(key) = key else { return Ok(JsValue::from(false)) };
            let obj = this_object(this, "WeakSet.prototype.delete")?;
            let mut guard = obj.borrow_mut();
            let ObjectData::WeakSet(s) = &mut guard.data else { return Err(JsNativeError::typ("WeakSet.prototype.delete called on incompatible receiver").into()) };
            Ok(JsValue::from(s.delete(&key)))
        }, 1)
        .build();
    install_global(realm, "WeakSet", JsValue::Object(ctor));
}

fn weak_set_constructor(_this: &JsValue, _args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let proto = JsValue::Object(ctx.realm().weak_set_prototype().clone());
    Ok(JsValue::Object(JsObject::new(ObjectData::WeakSet(WeakSetData::new()), proto)))
}

fn weak_set_add(this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    let key = arg(args, 0).as_object().cloned().ok_or_else(|| JsNativeError::typ("WeakSet value must be an object"))?;
    let obj = this_object(this, "WeakSet.prototype.add")?.clone();
    {
        let mut guard = obj.borrow_mut();
        let ObjectData::WeakSet(s) = &mut guard.data else {
            return Err(JsNativeError::typ("WeakSet.prototype.add called on incompatible receiver").into());
        };
        s.add(key);
    }
    Ok(JsValue::Object(obj))
}

// ===========================================================================
// ArrayBuffer / DataView / TypedArray
// ===========================================================================

fn init_array_buffer(realm: &Realm, func_proto: &JsValue) {
    let proto = realm.array_buffer_prototype().clone();
    let (ctor, _) = ConstructorBuilder::new("ArrayBuffer", array_buffer_constructor, func_proto, proto)
        .length(1)
        .static_method("isView", |_this, args, _ctx| {
            Ok(JsValue::from(matches!(arg(args, 0), JsValue::Object(o) if matches!(o.borrow().data, ObjectData::TypedArray(_) | ObjectData::DataView(_)))))
        }, 1)
        .method("slice", array_buffer_slice, 2)
        .method("resize", array_buffer_resize, 1)
        .build();
    install_well_known_accessor(realm.array_buffer_prototype(), func_proto, PropertyKey::from_str("byteLength"), "get byteLength", |this, _, _| {
        with_array_buffer(this, "byteLength", |b| Ok(JsValue::from(b.byte_length() as f64)))
    });
    install_well_known_accessor(realm.array_buffer_prototype(), func_proto, PropertyKey::from_str("resizable"), "get resizable", |this, _, _| {
        with_array_buffer(this, "resizable", |b| Ok(JsValue::from(b.is_resizable())))
    });
    install_global(realm, "ArrayBuffer", JsValue::Object(ctor));
}

fn with_array_buffer<T>(this: &JsValue, what: &str, f: impl FnOnce(&ArrayBufferData) -> JsResult<T>) -> JsResult<T> {
    let obj = this_object(this, &format!("ArrayBuffer.prototype.{what}"))?;
    let guard = obj.borrow();
    match &guard.data {
        ObjectData::ArrayBuffer(b) => f(b),
        _ => Err(JsNativeError::typ(format!("ArrayBuffer.prototype.{what} called on incompatible receiver")).into()),
    }
}

fn array_buffer_constructor(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let len = crate::exec::operations::to_number(ctx, &arg(args, 0))?;
    if len < 0.0 || !len.is_finite() {
        return Err(JsNativeError::range("invalid ArrayBuffer length").into());
    }
    let max_len = match arg(args, 1) {
        JsValue::Object(opts) => {
            let key = PropertyKey::from_str("maxByteLength");
            if crate::object::operations::own_keys(&opts).contains(&key) {
                let mut getter = |g: &JsValue, r: &JsValue, a: &[JsValue]| ctx.call_function(g, r, a);
                crate::object::operations::try_get(&opts, &key, &JsValue::Object(opts.clone()), &mut getter)?
                    .map(|v| crate::exec::operations::to_number(ctx, &v))
                    .transpose()?
                    .map(|n| n as usize)
            } else {
                None
            }
        }
        _ => None,
    };
    let proto = JsValue::Object(ctx.realm().array_buffer_prototype().clone());
    let data = match max_len {
        Some(max) => ArrayBufferData::resizable(len as usize, max),
        None => ArrayBufferData::new(len as usize),
    };
    Ok(JsValue::Object(JsObject::new(ObjectData::ArrayBuffer(data), proto)))
}

fn array_buffer_slice(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let obj = this_object(this, "ArrayBuffer.prototype.slice")?.clone();
    let begin = crate::exec::operations::to_number(ctx, &arg(args, 0))? as i64;
    let end = match arg(args, 1) {
        JsValue::Undefined => i64::MAX,
        v => crate::exec::operations::to_number(ctx, &v)? as i64,
    };
    let sliced = {
        let guard = obj.borrow();
        let ObjectData::ArrayBuffer(b) = &guard.data else {
            return Err(JsNativeError::typ("ArrayBuffer.prototype.slice called on incompatible receiver").into());
        };
        b.slice(begin, end)
    };
    let proto = JsValue::Object(ctx.realm().array_buffer_prototype().clone());
    Ok(JsValue::Object(JsObject::new(ObjectData::ArrayBuffer(sliced), proto)))
}

fn array_buffer_resize(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let obj = this_object(this, "ArrayBuffer.prototype.resize")?.clone();
    let new_len = crate::exec::operations::to_number(ctx, &arg(args, 0))? as usize;
    let mut guard = obj.borrow_mut();
    let ObjectData::ArrayBuffer(b) = &mut guard.data else {
        return Err(JsNativeError::typ("ArrayBuffer.prototype.resize called on incompatible receiver").into());
    };
    b.resize(new_len)?;
    Ok(JsValue::undefined())
}

fn init_data_view(realm: &Realm, func_proto: &JsValue) {
    let proto = realm.data_view_prototype().clone();
    let (ctor, _) = ConstructorBuilder::new("DataView", data_view_constructor, func_proto, proto)
        .length(1)
        .method("getFloat64", |this, args, ctx| data_view_get_float(this, args, ctx), 1)
        .method("setFloat64", |this, args, ctx| data_view_set_float(this, args, ctx), 2)
        .method("getInt32", |this, args, ctx| data_view_get_int(this, args, ctx, 4, true), 1)
        .method("getUint32", |this, args, ctx| data_view_get_int(this, args, ctx, 4, false), 1)
        .method("getInt16", |this, args, ctx| data_view_get_int(this, args, ctx, 2, true), 1)
        .method("getUint16", |this, args, ctx| data_view_get_int(this, args, ctx, 2, false), 1)
        .method("getInt8", |this, args, ctx| data_view_get_int(this, args, ctx, 1, true), 1)
        .method("getUint8", |this, args, ctx| data_view_get_int(this, args, ctx, 1, false), 1)
        .method("setInt32", |this, args, ctx| data_view_set_int(this, args, ctx, 4), 2)
        .method("setUint32", |this, args, ctx| data_view_set_int(this, args, ctx, 4), 2)
        .method("setInt16", |this, args, ctx| data_view_set_int(this, args, ctx, 2), 2)
        .method("setUint16", |this, args, ctx| data_view_set_int(this, args, ctx, 2), 2)
        .method("setInt8", |this, args, ctx| data_view_set_int(this, args, ctx, 1), 2)
        .method("setUint8", |this, args, ctx| data_view_set_int(this, args, ctx, 1), 2)
        .build();
    install_global(realm, "DataView", JsValue::Object(ctor));
}

fn data_view_constructor(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let buffer = arg(args, 0).as_object().cloned().ok_or_else(|| JsNativeError::typ("DataView requires an ArrayBuffer"))?;
    if !matches!(buffer.borrow().data, ObjectData::ArrayBuffer(_)) {
        return Err(JsNativeError::typ("DataView requires an ArrayBuffer").into());
    }
    let offset = match arg(args, 1) {
        JsValue::Undefined => 0,
        v => crate::exec::operations::to_number(ctx, &v)? as usize,
    };
    let length = match arg(args, 2) {
        JsValue::Undefined => None,
        v => Some(crate::exec::operations::to_number(ctx, &v)? as usize),
    };
    let proto = JsValue::Object(ctx.realm().data_view_prototype().clone());
    Ok(JsValue::Object(JsObject::new(ObjectData::DataView(DataViewData::new(buffer, offset, length)), proto)))
}

fn data_view_get_float(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let obj = this_object(this, "DataView.prototype.getFloat64")?.clone();
    let offset = crate::exec::operations::to_number(ctx, &arg(args, 0))? as usize;
    let little_endian = arg(args, 1).to_boolean();
    let guard = obj.borrow();
    let ObjectData::DataView(d) = &guard.data else {
        return Err(JsNativeError::typ("DataView.prototype.getFloat64 called on incompatible receiver").into());
    };
    Ok(JsValue::from(d.get_float64(offset, little_endian)?))
}

fn data_view_set_float(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let obj = this_object(this, "DataView.prototype.setFloat64")?.clone();
    let offset = crate::exec::operations::to_number(ctx, &arg(args, 0))? as usize;
    let value = crate::exec::operations::to_number(ctx, &arg(args, 1))?;
    let little_endian = arg(args, 2).to_boolean();
    let mut guard = obj.borrow_mut();
    let ObjectData::DataView(d) = &mut guard.data else {
        return Err(JsNativeError::typ("DataView.prototype.setFloat64 called on incompatible receiver").into());
    };
    d.set_float64(offset, value, little_endian)?;
    Ok(JsValue::undefined())
}

fn data_view_get_int(this: &JsValue, args: &[JsValue], ctx: &mut Context, size: usize, signed: bool) -> NativeResult {
    let obj = this_object(this, "DataView.prototype get")?.clone();
    let offset = crate::exec::operations::to_number(ctx, &arg(args, 0))? as usize;
    let little_endian = arg(args, 1).to_boolean();
    let guard = obj.borrow();
    let ObjectData::DataView(d) = &guard.data else {
        return Err(JsNativeError::typ("DataView method called on incompatible receiver").into());
    };
    let _ = size;
    d.get_int(offset, size, signed, little_endian)
}

fn data_view_set_int(this: &JsValue, args: &[JsValue], ctx: &mut Context, size: usize) -> NativeResult {
    let obj = this_object(this, "DataView.prototype set")?.clone();
    let offset = crate::exec::operations::to_number(ctx, &arg(args, 0))? as usize;
    let value = crate::exec::operations::to_number(ctx, &arg(args, 1))? as i64;
    let little_endian = arg(args, 2).to_boolean();
    let mut guard = obj.borrow_mut();
    let ObjectData::DataView(d) = &mut guard.data else {
        return Err(JsNativeError::typ("DataView method called on incompatible receiver").into());
    };
    d.set_int(offset, value, size, little_endian)?;
    Ok(JsValue::undefined())
}

const TYPED_ARRAY_KINDS: [(&str, ElementKind); 11] = [
    ("Uint8Array", ElementKind::U8),
    ("Uint8ClampedArray", ElementKind::U8Clamped),
    ("Int8Array", ElementKind::I8),
    ("Uint16Array", ElementKind::U16),
    ("Int16Array", ElementKind::I16),
    ("Uint32Array", ElementKind::U32),
    ("Int32Array", ElementKind::I32),
    ("Float32Array", ElementKind::F32),
    ("Float64Array", ElementKind::F64),
    ("BigInt64Array", ElementKind::BigInt64),
    ("BigUint64Array", ElementKind::BigUint64),
];

fn init_typed_arrays(realm: &Realm, func_proto: &JsValue) {
    let ta_proto = realm.typed_array_prototype().clone();
    ObjectInitializer::new(&ta_proto, func_proto.clone())
        .function("set", typed_array_set, 1)
        .function("subarray", typed_array_subarray, 2)
        .function("fill", typed_array_fill, 1)
        .function("toString", array_to_string_typed, 0)
        .build();
    install_well_known_accessor(&ta_proto, func_proto, PropertyKey::from_str("length"), "get length", |this, _, _| {
        with_typed_array(this, "length", |t| Ok(JsValue::from(t.length() as f64)))
    });
    install_well_known_accessor(&ta_proto, func_proto, PropertyKey::from_str("byteLength"), "get byteLength", |this, _, _| {
        with_typed_array(this, "byteLength", |t| Ok(JsValue::from((t.length() as usize * t.kind.bytes_per_element()) as f64)))
    });
    install_well_known_accessor(&ta_proto, func_proto, PropertyKey::from_str("buffer"), "get buffer", |this, _, _| {
        with_typed_array_obj(this, "buffer", |t| Ok(JsValue::Object(t.buffer.clone())))
    });

    for (name, kind) in TYPED_ARRAY_KINDS {
        let kind_for_ctor = kind;
        let proto = JsObject::new(ObjectData::Ordinary, JsValue::Object(ta_proto.clone()));
        let ctor = ConstructorBuilder::new(
            name,
            move |this, args, ctx| typed_array_constructor(this, args, ctx, kind_for_ctor),
            func_proto,
            proto,
        )
        .length(1)
        .static_property("BYTES_PER_ELEMENT", JsValue::from(kind.bytes_per_element() as f64), Attribute::read_only())
        .build();
        install_global(realm, name, JsValue::Object(ctor.0));
    }
}

fn with_typed_array<T>(this: &JsValue, what: &str, f: impl FnOnce(&TypedArrayData) -> JsResult<T>) -> JsResult<T> {
    let obj = this_object(this, &format!("TypedArray.prototype.{what}"))?;
    let guard = obj.borrow();
    match &guard.data {
        ObjectData::TypedArray(t) => f(t),
        _ => Err(JsNativeError::typ(format!("TypedArray.prototype.{what} called on incompatible receiver")).into()),
    }
}

fn with_typed_array_obj<T>(this: &JsValue, what: &str, f: impl FnOnce(&TypedArrayData) -> JsResult<T>) -> JsResult<T> {
    with_typed_array(this, what, f)
}

fn typed_array_constructor(_this: &JsValue, args: &[JsValue], ctx: &mut Context, kind: ElementKind) -> NativeResult {
    let proto_name = kind.name();
    let proto = lookup_typed_array_prototype(ctx, proto_name);
    match arg(args, 0) {
        JsValue::Object(buffer) if matches!(buffer.borrow().data, ObjectData::ArrayBuffer(_)) => {
            let offset = match arg(args, 1) {
                JsValue::Undefined => 0,
                v => crate::exec::operations::to_number(ctx, &v)? as usize,
            };
            let length = match arg(args, 2) {
                JsValue::Undefined => None,
                v => Some(crate::exec::operations::to_number(ctx, &v)? as u32),
            };
            let data = TypedArrayData::new(buffer, offset, kind, length);
            Ok(JsValue::Object(JsObject::new(ObjectData::TypedArray(data), proto)))
        }
        JsValue::Number(n) => {
            let len = n as usize;
            let buffer = JsObject::new(ObjectData::ArrayBuffer(ArrayBufferData::new(len * kind.bytes_per_element())), JsValue::Object(ctx.realm().array_buffer_prototype().clone()));
            let data = TypedArrayData::new(buffer, 0, kind, Some(len as u32));
            Ok(JsValue::Object(JsObject::new(ObjectData::TypedArray(data), proto)))
        }
        other => {
            let mut items = Vec::new();
            if let Ok(iterator) = crate::exec::iteration::get_iterator(ctx, &other) {
                loop {
                    let (v, done) = crate::exec::iteration::iterator_step(ctx, &iterator)?;
                    if done {
                        break;
                    }
                    items.push(v.unwrap_or(JsValue::undefined()));
                }
            }
            let buffer = JsObject::new(ObjectData::ArrayBuffer(ArrayBufferData::new(items.len() * kind.bytes_per_element())), JsValue::Object(ctx.realm().array_buffer_prototype().clone()));
            let data = TypedArrayData::new(buffer, 0, kind, Some(items.len() as u32));
            let obj = JsObject::new(ObjectData::TypedArray(data), proto);
            for (i, v) in items.into_iter().enumerate() {
                crate::object::typed_array::indexed_set(&obj, i as u32, v)?;
            }
            Ok(JsValue::Object(obj))
        }
    }
}

fn lookup_typed_array_prototype(ctx: &Context, name: &str) -> JsValue {
    let mut getter = |_: &JsValue, _: &JsValue, _: &[JsValue]| Ok(JsValue::undefined());
    let ctor = crate::object::operations::try_get(
        ctx.realm().global_object(),
        &PropertyKey::from_str(name),
        &JsValue::Object(ctx.realm().global_object().clone()),
        &mut getter,
    )
    .ok()
    .flatten();
    match ctor {
        Some(JsValue::Object(c)) => crate::object::operations::try_get(&c, &PropertyKey::from_str("prototype"), &JsValue::Object(c.clone()), &mut getter)
            .ok()
            .flatten()
            .unwrap_or(JsValue::Object(ctx.realm().typed_array_prototype().clone())),
        _ => JsValue::Object(ctx.realm().typed_array_prototype().clone()),
    }
}

fn typed_array_set(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let obj = this_object(this, "TypedArray.prototype.set")?.clone();
    let offset = match arg(args, 1) {
        JsValue::Undefined => 0,
        v => crate::exec::operations::to_number(ctx, &v)? as u32,
    };
    let source = arg(args, 0);
    let values: Vec<JsValue> = match &source {
        JsValue::Object(o) => match &o.borrow().data {
            ObjectData::TypedArray(t) => t.to_vec(),
            ObjectData::Array(a) => a.to_vec(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    for (i, v) in values.into_iter().enumerate() {
        crate::object::typed_array::indexed_set(&obj, offset + i as u32, v)?;
    }
    Ok(JsValue::undefined())
}

fn typed_array_subarray(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let obj = this_object(this, "TypedArray.prototype.subarray")?.clone();
    let (buffer, kind, base_offset, len) = {
        let guard = obj.borrow();
        let ObjectData::TypedArray(t) = &guard.data else {
            return Err(JsNativeError::typ("TypedArray.prototype.subarray called on incompatible receiver").into());
        };
        (t.buffer.clone(), t.kind, t.byte_offset, t.length())
    };
    let start = normalize_index(arg(args, 0).as_number().unwrap_or(0.0), len as i64) as u32;
    let end = match arg(args, 1) {
        JsValue::Undefined => len,
        v => normalize_index(crate::exec::operations::to_number(ctx, &v)?, len as i64) as u32,
    };
    let count = end.saturating_sub(start);
    let new_offset = base_offset + start as usize * kind.bytes_per_element();
    let data = TypedArrayData::new(buffer, new_offset, kind, Some(count));
    let proto = obj.prototype();
    Ok(JsValue::Object(JsObject::new(ObjectData::TypedArray(data), proto)))
}

fn typed_array_fill(this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> NativeResult {
    let obj = this_object(this, "TypedArray.prototype.fill")?.clone();
    let value = arg(args, 0);
    let len = with_typed_array(this, "fill", |t| Ok(t.length()))?;
    for i in 0..len {
        crate::object::typed_array::indexed_set(&obj, i, value.clone())?;
    }
    Ok(JsValue::Object(obj))
}

fn array_to_string_typed(this: &JsValue, _args: &[JsValue], ctx: &mut Context) -> NativeResult {
    let items = with_typed_array(this, "toString", |t| Ok(t.to_vec()))?;
    let parts: JsResult<Vec<String>> = items.iter().map(|v| crate::exec::operations::to_string(ctx, v).map(|s| s.as_str().to_string())).collect();
    Ok(JsValue::from(parts?.join(",")))
}
