//! Host callables and user functions (spec.md §3 "host callables"/"bound
//! callables", §4.9).
//!
//! Grounded on `boa/src/object/function.rs`'s `Function` enum shape,
//! trimmed of the closure-capture machinery (`ClosureFunctionSignature`,
//! `dyn_clone`) this crate doesn't need since its ordinary functions close
//! over a `Rc`-shared `Environment` rather than a native Rust closure.

use crate::ast::FunctionNode;
use crate::context::Context;
use crate::environment::Environment;
use crate::error::{JsNativeError, JsResult};
use crate::gc::{empty_trace, Finalize, Trace};
use crate::object::JsObject;
use crate::value::JsValue;
use std::fmt;
use std::rc::Rc;

/// The signature every host (native Rust) callable must implement (spec.md
/// §6 "Host-function host call signature").
pub type NativeFunctionSignature =
    fn(this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue>;

#[derive(Clone)]
pub struct NativeFunctionData {
    pub name: String,
    pub handler: NativeFunctionSignature,
    pub length: usize,
    pub is_constructor: bool,
    /// `Some(message)` when construction must be rejected with a
    /// `TypeError` carrying that message (spec.md §4.9 "DisallowConstruct").
    pub disallow_construct: Option<&'static str>,
}

impl fmt::Debug for NativeFunctionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunctionData").field("name", &self.name).finish()
    }
}

unsafe impl Trace for NativeFunctionData {
    empty_trace!();
}
impl Finalize for NativeFunctionData {}

/// A user-defined function evaluated by the tree-walker (spec.md §4.9,
/// generalized to also cover CPS-transformed async/generator bodies, which
/// by the time this struct is built have already been rewritten to
/// ordinary function syntax by `crate::cps`).
#[derive(Debug, Trace, Finalize)]
pub struct OrdinaryFunctionData {
    #[unsafe_ignore_trace]
    pub node: Rc<FunctionNode>,
    pub closure: Environment,
    #[unsafe_ignore_trace]
    pub strict: bool,
    #[unsafe_ignore_trace]
    pub is_constructor: bool,
    /// The function's own `.prototype` object, lazily created for
    /// constructible ordinary functions (`new F()` uses it as the new
    /// object's `[[Prototype]]` when present).
    pub prototype_property: Option<JsObject>,
}

#[derive(Debug, Trace, Finalize)]
pub struct BoundFunctionData {
    pub target: JsObject,
    pub bound_this: JsValue,
    pub bound_args: Vec<JsValue>,
}

/// A one-shot native callable that closes over genuine Rust state (the
/// `Promise.all`/`allSettled`/`race`/`any`/`finally` combinators' per-call
/// counters and accumulators), which `NativeFunctionSignature`'s bare `fn`
/// pointer has no slot for.
#[derive(Clone)]
pub struct HostClosureData {
    pub handler: Rc<dyn Fn(JsValue, &mut Context) -> JsResult<JsValue>>,
}

impl fmt::Debug for HostClosureData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostClosureData").finish_non_exhaustive()
    }
}

unsafe impl Trace for HostClosureData {
    empty_trace!();
}
impl Finalize for HostClosureData {}

/// A Promise's resolving function (§27.2.1.3.1 CreateResolvingFunctions):
/// not an ordinary closure, since `NativeFunctionSignature` is a bare `fn`
/// pointer with no capture slot. Engines model these with internal slots
/// rather than user-visible closures too — `crate::exec`'s call dispatch
/// special-cases this variant the same way it special-cases `Bound`.
#[derive(Debug, Trace, Finalize)]
pub struct PromiseResolvingFunctionData {
    pub promise: JsObject,
    #[unsafe_ignore_trace]
    pub is_reject: bool,
    #[unsafe_ignore_trace]
    pub already_resolved: Rc<std::cell::Cell<bool>>,
}

#[derive(Debug, Trace, Finalize)]
pub enum Function {
    Native(NativeFunctionData),
    Ordinary(OrdinaryFunctionData),
    Bound(BoundFunctionData),
    PromiseResolve(PromiseResolvingFunctionData),
    HostClosure(HostClosureData),
}

impl Function {
    pub fn is_constructor(&self) -> bool {
        match self {
            Function::Native(n) => n.is_constructor,
            Function::Ordinary(o) => o.is_constructor,
            Function::Bound(b) => b.target.is_constructor(),
            Function::PromiseResolve(_) => false,
            Function::HostClosure(_) => false,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Function::Native(n) => n.name.clone(),
            Function::Ordinary(o) => o.node.name.clone().unwrap_or_default(),
            Function::Bound(b) => format!("bound {}", b.target.kind_name()),
            Function::PromiseResolve(_) => String::new(),
            Function::HostClosure(_) => String::new(),
        }
    }
}

/// `Function.prototype.bind` (spec.md §4.9): produces a new host function
/// that prefixes stored arguments and fixes `this`.
pub fn bind(target: &JsObject, bound_this: JsValue, bound_args: Vec<JsValue>, prototype: JsValue) -> JsResult<JsObject> {
    if !target.is_callable() {
        return Err(JsNativeError::typ("bind target is not callable").into());
    }
    Ok(JsObject::new(
        crate::object::ObjectData::Function(Function::Bound(BoundFunctionData {
            target: target.clone(),
            bound_this,
            bound_args,
        })),
        prototype,
    ))
}

/// Resolves a bound function chain to the arguments ultimately passed to
/// the target, prefixing each layer's stored arguments (spec.md §4.9).
pub fn flatten_bound_call(obj: &JsObject, this: &JsValue, args: &[JsValue]) -> (JsObject, JsValue, Vec<JsValue>) {
    let data = obj.borrow();
    if let crate::object::ObjectData::Function(Function::Bound(b)) = &data.data {
        let mut full_args = b.bound_args.clone();
        full_args.extend_from_slice(args);
        let target = b.target.clone();
        let bound_this = b.bound_this.clone();
        drop(data);
        flatten_bound_call(&target, &bound_this, &full_args)
    } else {
        drop(data);
        (obj.clone(), this.clone(), args.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::JsValue;

    fn noop(_: &JsValue, _: &[JsValue], _: &mut Context) -> JsResult<JsValue> {
        Ok(JsValue::undefined())
    }

    #[test]
    fn bind_rejects_non_callable() {
        let obj = JsObject::ordinary(JsValue::null());
        assert!(bind(&obj, JsValue::undefined(), vec![], JsValue::null()).is_err());
    }

    #[test]
    fn flatten_bound_call_prefixes_args_through_chain() {
        let native = JsObject::new(
            crate::object::ObjectData::Function(Function::Native(NativeFunctionData {
                name: "f".into(),
                handler: noop,
                length: 0,
                is_constructor: false,
                disallow_construct: None,
            })),
            JsValue::null(),
        );
        let bound_once = bind(&native, JsValue::from(1.0), vec![JsValue::from(10.0)], JsValue::null()).unwrap();
        let bound_twice = bind(&bound_once, JsValue::from(2.0), vec![JsValue::from(20.0)], JsValue::null()).unwrap();
        let (target, this, args) = flatten_bound_call(&bound_twice, &JsValue::undefined(), &[JsValue::from(30.0)]);
        assert!(JsObject::ptr_eq(&target, &native));
        assert_eq!(this.as_number(), Some(1.0));
        assert_eq!(
            args.iter().map(|v| v.as_number().unwrap()).collect::<Vec<_>>(),
            vec![10.0, 20.0, 30.0]
        );
    }
}
