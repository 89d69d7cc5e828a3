//! The embedding surface (spec.md §6 "External interfaces", §9 "Realm
//! state").
//!
//! Grounded on `boa/src/context.rs`'s `Context` shape: owns a `Realm`, hands
//! out a `call_function` entry point native code can reach back through
//! (`object::function::NativeFunctionSignature` takes `&mut Context`), and
//! carries the ambient tunables (call-depth guard, timeout) that live on
//! `crate::scheduler::Scheduler` underneath it.

use crate::ast::Program;
use crate::error::{EngineError, JsError, JsNativeError, JsResult};
use crate::exec;
use crate::object::function::{Function, NativeFunctionData};
use crate::object::JsObject;
use crate::object::ObjectData;
use crate::promise;
use crate::realm::Realm;
use crate::scheduler::Scheduler;
use crate::value::JsValue;
use std::time::Duration;

/// A resolved module: its parsed body plus the namespace object clients
/// observe (spec.md §4.8 "Modules").
///
/// This crate ships no parser (spec.md §1 frames tokenization/parsing as an
/// external collaborator), so `set_module_loader`'s resolver hands back an
/// already-parsed `Program` rather than source text — a supplemented
/// interpretation of spec.md §6's "(specifier, referrer) -> source" contract,
/// recorded in DESIGN.md.
pub type ModuleLoader = Box<dyn FnMut(&str, Option<&str>) -> JsResult<Program>>;

/// The embeddable interpreter instance (spec.md §6).
pub struct Context {
    pub(crate) realm: Realm,
    pub(crate) scheduler: Scheduler,
    module_loader: Option<ModuleLoader>,
    /// Stack of in-flight generator replay frames (`crate::cps::GenReplayFrame`),
    /// one per nested `.next()`/`.throw()` call currently unwinding through
    /// `Expression::Yield`; innermost generator is the last element.
    pub(crate) generator_frames: Vec<crate::cps::GenReplayFrame>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            realm: Realm::new(),
            scheduler: Scheduler::new(1024),
            module_loader: None,
            generator_frames: Vec::new(),
        }
    }

    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    /// Tunes the re-entrancy guard spec.md §4.6/§5 calls out as protecting
    /// against unbounded thenable/recursive-call chains.
    pub fn set_max_call_depth(&mut self, depth: u32) {
        self.scheduler.set_max_call_depth(depth);
    }

    /// Arms (or disables, with `None`) a wall-clock execution deadline
    /// (spec.md §4.6 "Cancellation/timeout").
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.scheduler.arm_timeout(timeout);
    }

    pub fn set_module_loader(&mut self, loader: impl FnMut(&str, Option<&str>) -> JsResult<Program> + 'static) {
        self.module_loader = Some(Box::new(loader));
    }

    /// Installs a host value as a property of the global object (spec.md §6
    /// "set_global(name, value)").
    pub fn set_global(&mut self, name: &str, value: JsValue) {
        let global = self.realm.global_object().clone();
        global.borrow_mut().properties_mut().insert(
            crate::property::PropertyKey::from_str(name),
            crate::property::PropertyDescriptor::data(value, true, true, true),
        );
    }

    /// Installs a host (native Rust) function as a global binding (spec.md
    /// §6 "set_global_function").
    pub fn set_global_function(&mut self, name: &str, length: usize, handler: crate::object::function::NativeFunctionSignature) {
        let func_proto = self.realm.function_prototype().clone();
        let func = crate::object::builder::FunctionBuilder::new(name, handler)
            .length(length)
            .build(&func_proto);
        self.set_global(name, JsValue::Object(func));
    }

    /// Parses-externally-then-evaluates entry point (spec.md §6
    /// `evaluate(source)`). Since this crate has no lexer/parser, `evaluate`
    /// takes an already-parsed `Program`; a host frontend owns tokenizing
    /// source text into one.
    pub fn evaluate(&mut self, program: &Program) -> JsResult<JsValue> {
        let global_env = self.realm.global_environment().clone();
        let result = exec::run_program(self, program, global_env)?;
        self.run_jobs()?;
        Ok(result)
    }

    /// §6 `evaluate_module(source, specifier)`: evaluates the module body in
    /// its own environment and records its exports under `specifier` so a
    /// later `import` (resolved dynamically through `set_module_loader`,
    /// since this AST has no static import/export syntax — see DESIGN.md)
    /// can build a namespace object over it.
    pub fn evaluate_module(&mut self, program: &Program, specifier: &str) -> JsResult<JsValue> {
        let module_env = crate::environment::Environment::new_declarative(Some(self.realm.global_environment().clone()));
        let result = exec::run_program(self, program, module_env.clone())?;
        self.realm.register_module(specifier, module_env);
        self.run_jobs()?;
        Ok(result)
    }

    /// Resolves `specifier` (relative to `referrer`, if given) through the
    /// host-supplied loader, evaluates it if not already cached, and returns
    /// its module namespace object (spec.md §4.8).
    pub fn load_module(&mut self, specifier: &str, referrer: Option<&str>) -> JsResult<JsObject> {
        if let Some(ns) = self.realm.module_namespace(specifier) {
            return Ok(ns);
        }
        let loader = self.module_loader.as_mut().ok_or_else(|| {
            JsError::from(EngineError::ModuleLoad {
                specifier: specifier.to_string(),
                reason: "no module loader installed".to_string(),
            })
        })?;
        let program = loader(specifier, referrer).map_err(|_| {
            JsError::from(EngineError::ModuleLoad {
                specifier: specifier.to_string(),
                reason: "loader failed to resolve module".to_string(),
            })
        })?;
        self.evaluate_module(&program, specifier)?;
        Ok(self.realm.module_namespace(specifier).expect("just registered"))
    }

    /// Drains the scheduler's job queue (Promise reactions, thenable
    /// assimilation), routing re-entrant calls back through `call_function`
    /// (spec.md §4.6 "RunJobs").
    pub fn run_jobs(&mut self) -> JsResult<()> {
        let mut call = |f: &JsValue, this: &JsValue, args: &[JsValue]| -> JsResult<JsValue> {
            CONTEXT_REENTRY.with(|cell| {
                let ctx_ptr = *cell.borrow();
                assert!(!ctx_ptr.is_null(), "run_jobs call trampoline used outside drain");
                let ctx: &mut Context = unsafe { &mut *ctx_ptr };
                ctx.call_function(f, this, args)
            })
        };
        CONTEXT_REENTRY.with(|cell| *cell.borrow_mut() = self as *mut Context);
        let result = self.scheduler.drain(&mut call);
        CONTEXT_REENTRY.with(|cell| *cell.borrow_mut() = std::ptr::null_mut());
        result
    }

    /// The function-call entry point every call site (the evaluator, the
    /// scheduler's job trampoline, `Function.prototype.call/apply/bind`)
    /// ultimately funnels through (spec.md §6 host-function signature).
    pub fn call_function(&mut self, callee: &JsValue, this: &JsValue, args: &[JsValue]) -> JsResult<JsValue> {
        let obj = callee
            .as_callable()
            .ok_or_else(|| JsNativeError::typ("value is not callable"))?
            .clone();
        self.call_object(&obj, this, args, None)
    }

    /// Turns an engine-internal throw signal into a concrete `JsValue`,
    /// allocating a realm-backed `Error` instance (right `.prototype` chain,
    /// so `instanceof Error`/`instanceof TypeError` hold) for the
    /// `JsError::Native` case. Call sites that previously fell back to
    /// `JsError::to_opaque_value` (`exec_try`'s catch binding,
    /// `call_ordinary_function`'s async rejection path) should prefer this
    /// once a `Context` is in hand.
    pub fn realize(&mut self, err: &JsError) -> JsValue {
        match err {
            JsError::Value(v) => v.clone(),
            JsError::Yield(v) => v.clone(),
            JsError::Return(v) => v.clone(),
            JsError::Native(n) => {
                let proto = self.realm.error_prototype(n.kind).clone();
                let obj = JsObject::new(ObjectData::Error, JsValue::Object(proto));
                obj.borrow_mut().properties_mut().insert(
                    crate::property::PropertyKey::from_str("name"),
                    crate::property::PropertyDescriptor::data(JsValue::from(n.kind.name()), true, false, true),
                );
                obj.borrow_mut().properties_mut().insert(
                    crate::property::PropertyKey::from_str("message"),
                    crate::property::PropertyDescriptor::data(JsValue::from(n.message.clone()), true, false, true),
                );
                JsValue::Object(obj)
            }
        }
    }

    pub fn construct(&mut self, callee: &JsObject, args: &[JsValue]) -> JsResult<JsValue> {
        if !callee.is_constructor() {
            return Err(JsNativeError::typ("value is not a constructor").into());
        }
        let proto = match crate::object::operations::try_get(
            callee,
            &crate::property::PropertyKey::from_str("prototype"),
            &JsValue::Object(callee.clone()),
            &mut |_, _, _| Ok(JsValue::undefined()),
        )? {
            Some(p) if p.is_object() => p,
            _ => JsValue::Object(self.realm.object_prototype().clone()),
        };
        let this_obj = JsObject::ordinary(proto);
        let this = JsValue::Object(this_obj.clone());
        let result = self.call_object(callee, &this, args, Some(callee.clone()))?;
        Ok(if result.is_object() { result } else { this })
    }

    fn call_object(&mut self, obj: &JsObject, this: &JsValue, args: &[JsValue], new_target: Option<JsObject>) -> JsResult<JsValue> {
        let data = { obj.borrow().data.kind_name() };
        if data != "Function" {
            return Err(JsNativeError::typ("value is not callable").into());
        }
        // Bound functions flatten to their target before anything else runs
        // (spec.md §4.9 "Bound callables").
        let is_bound = matches!(&obj.borrow().data, ObjectData::Function(Function::Bound(_)));
        if is_bound {
            let (target, bound_this, full_args) = crate::object::function::flatten_bound_call(obj, this, args);
            return self.call_object(&target, &bound_this, &full_args, new_target);
        }

        let snapshot = {
            let guard = obj.borrow();
            match &guard.data {
                ObjectData::Function(Function::Native(n)) => CallKind::Native(n.clone()),
                ObjectData::Function(Function::Ordinary(o)) => CallKind::Ordinary(
                    o.node.clone(),
                    o.closure.clone(),
                    o.strict,
                ),
                ObjectData::Function(Function::PromiseResolve(p)) => CallKind::PromiseResolve(p.promise.clone(), p.is_reject, p.already_resolved.clone()),
                ObjectData::Function(Function::HostClosure(h)) => CallKind::HostClosure(h.handler.clone()),
                _ => unreachable!("non-function reached call_object"),
            }
        };

        match snapshot {
            CallKind::Native(n) => {
                if new_target.is_some() && n.disallow_construct.is_some() {
                    return Err(JsNativeError::typ(n.disallow_construct.unwrap()).into());
                }
                (n.handler)(this, args, self)
            }
            CallKind::Ordinary(node, closure, strict) => {
                exec::call_ordinary_function(self, &node, closure, strict, this, args, new_target)
            }
            CallKind::PromiseResolve(promise, is_reject, already_resolved) => {
                use crate::object::function::PromiseResolvingFunctionData;
                let data = PromiseResolvingFunctionData {
                    promise,
                    is_reject,
                    already_resolved,
                };
                let argument = args.first().cloned().unwrap_or(JsValue::undefined());
                let mut call = |f: &JsValue, t: &JsValue, a: &[JsValue]| self.call_function(f, t, a);
                promise::invoke_resolving_function(&data, argument, &self.scheduler, &mut call)?;
                Ok(JsValue::undefined())
            }
            CallKind::HostClosure(handler) => {
                let argument = args.first().cloned().unwrap_or(JsValue::undefined());
                handler(argument, self)
            }
        }
    }
}

enum CallKind {
    Native(NativeFunctionData),
    Ordinary(std::rc::Rc<crate::ast::FunctionNode>, crate::environment::Environment, bool),
    PromiseResolve(JsObject, bool, std::rc::Rc<std::cell::Cell<bool>>),
    HostClosure(std::rc::Rc<dyn Fn(JsValue, &mut Context) -> JsResult<JsValue>>),
}

// Scratch-cell trampoline letting `run_jobs`' boxed `CallFn` closure reach
// back into `&mut self` without threading `&mut Context` through
// `crate::scheduler::Scheduler`'s realm-agnostic `Job` signature (the same
// seam problem `object::operations`'s injected callbacks solve elsewhere).
// Single-threaded only, matching spec.md §5's concurrency model.
thread_local! {
    static CONTEXT_REENTRY: std::cell::RefCell<*mut Context> = const { std::cell::RefCell::new(std::ptr::null_mut()) };
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
