//! The Promise state machine and resolution algorithm (spec.md §4.6).
//!
//! No teacher implementation of `Promise` survives in the retrieved
//! snapshots (see DESIGN.md's grounding ledger); this module follows the
//! ECMA-262 §27.2 Promise Jobs model (FulfillPromise/RejectPromise/
//! PerformPromiseThen/PromiseResolveThenableJob) directly, shaped with the
//! teacher's own idioms elsewhere in this crate: plain mutable fields on the
//! `ObjectData`-tagged struct (`object/collections.rs`'s pattern, mutated
//! through `JsObject::borrow_mut`) and the injected-callback seam
//! (`object/operations.rs`'s `call_getter`) to reach into the evaluator
//! without a dependency cycle.

use crate::error::{JsNativeError, JsResult};
use crate::gc::{Finalize, Trace};
use crate::object::function::{Function, PromiseResolvingFunctionData};
use crate::object::operations;
use crate::object::{JsObject, ObjectData};
use crate::property::PropertyKey;
use crate::scheduler::{CallFn, Job, Scheduler};
use crate::value::JsValue;
use std::cell::Cell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

/// One registered `then` handler pair's downstream half: the callback (if
/// any — `then(undefined, onRejected)` is valid) plus the promise it must
/// settle (spec.md §4.6 "a queue of `(onFulfilled?, onRejected?, downstream
/// Promise)` handlers").
#[derive(Debug, Clone, Trace, Finalize)]
struct Reaction {
    handler: Option<JsValue>,
    downstream: JsObject,
}

#[derive(Debug, Trace, Finalize)]
pub struct PromiseData {
    #[unsafe_ignore_trace]
    state: PromiseState,
    result: JsValue,
    fulfill_reactions: Vec<Reaction>,
    reject_reactions: Vec<Reaction>,
    #[unsafe_ignore_trace]
    is_handled: bool,
    #[unsafe_ignore_trace]
    already_resolved: Rc<Cell<bool>>,
}

impl Default for PromiseData {
    fn default() -> Self {
        Self {
            state: PromiseState::Pending,
            result: JsValue::undefined(),
            fulfill_reactions: Vec::new(),
            reject_reactions: Vec::new(),
            is_handled: false,
            already_resolved: Rc::new(Cell::new(false)),
        }
    }
}

impl PromiseData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PromiseState {
        self.state
    }

    pub fn result(&self) -> JsValue {
        self.result.clone()
    }

    pub fn is_handled(&self) -> bool {
        self.is_handled
    }
}

/// Creates a new, pending Promise object (§27.2.1 NewPromiseCapability's
/// object-allocation half; the resolving-function half is
/// `create_resolving_functions`).
pub fn new_promise(prototype: JsValue) -> JsObject {
    JsObject::new(ObjectData::Promise(PromiseData::new()), prototype)
}

/// §27.2.1.3.1 CreateResolvingFunctions.
pub fn create_resolving_functions(promise: JsObject, function_prototype: JsValue) -> (JsObject, JsObject) {
    let already_resolved = Rc::new(Cell::new(false));
    let resolve = JsObject::new(
        ObjectData::Function(Function::PromiseResolve(PromiseResolvingFunctionData {
            promise: promise.clone(),
            is_reject: false,
            already_resolved: already_resolved.clone(),
        })),
        function_prototype.clone(),
    );
    let reject = JsObject::new(
        ObjectData::Function(Function::PromiseResolve(PromiseResolvingFunctionData {
            promise,
            is_reject: true,
            already_resolved,
        })),
        function_prototype,
    );
    (resolve, reject)
}

/// Invoked when script (or host code) calls one of the two functions
/// `create_resolving_functions` produced. `crate::exec`'s call dispatch
/// special-cases `Function::PromiseResolve` and routes here.
pub fn invoke_resolving_function(
    data: &PromiseResolvingFunctionData,
    argument: JsValue,
    scheduler: &Scheduler,
    call: &mut CallFn<'_>,
) -> JsResult<()> {
    if data.already_resolved.get() {
        return Ok(());
    }
    data.already_resolved.set(true);
    if data.is_reject {
        reject(&data.promise, argument, scheduler)
    } else {
        resolve(&data.promise, argument, scheduler, call)
    }
}

/// §27.2.1.3.2 FulfillPromise, generalized with thenable assimilation folded
/// into the same entry point (§27.2.1.3.2's caller, ResolvePromise, isn't a
/// separately named AO in the spec text but is worth naming here since this
/// function does both jobs).
pub fn resolve(promise: &JsObject, value: JsValue, scheduler: &Scheduler, call: &mut CallFn<'_>) -> JsResult<()> {
    if let JsValue::Object(o) = &value {
        if JsObject::ptr_eq(o, promise) {
            let err = JsNativeError::typ("chaining cycle detected for promise").to_opaque_error_value();
            return reject(promise, err, scheduler);
        }
    }

    let then = match &value {
        JsValue::Object(obj) => {
            let key = PropertyKey::from_str("then");
            let mut getter = |g: &JsValue, r: &JsValue, a: &[JsValue]| call(g, r, a);
            operations::try_get(obj, &key, &value, &mut getter)?
        }
        _ => None,
    };

    match then {
        Some(then_fn) if then_fn.as_callable().is_some() => {
            let promise = promise.clone();
            let thenable = value.clone();
            scheduler.enqueue(Job::new(move |call: &mut CallFn<'_>, _scheduler: &Scheduler| {
                let (resolve_fn, reject_fn) = create_resolving_functions(promise.clone(), JsValue::undefined());
                let resolve_val = JsValue::Object(resolve_fn);
                let reject_val = JsValue::Object(reject_fn);
                // Resolving functions invoked from inside a thenable job are
                // dispatched the same way any other function call is,
                // through `crate::exec`'s call path, which re-enters
                // `invoke_resolving_function` with the scheduler it already
                // has in scope.
                match call(&then_fn, &thenable, &[resolve_val, reject_val]) {
                    Ok(_) => Ok(()),
                    Err(e) => {
                        fulfill_or_reject_opaque(&promise, e.to_opaque_value(), call)
                    }
                }
            }));
            Ok(())
        }
        _ => fulfill(promise, value, scheduler),
    }
}

/// Settles a promise with a plain (non-thenable-checked) outcome without
/// going through `fulfill`/`reject`'s re-enqueue — used only where the
/// caller is already running nested inside the scheduler's own drain loop,
/// so draining the newly-unblocked reactions inline here is observably
/// equivalent to re-enqueuing them.
fn settle_opaque(promise: &JsObject, outcome: Result<JsValue, JsValue>, call: &mut CallFn<'_>) -> JsResult<()> {
    let (reactions, settled) = {
        let mut obj = promise.borrow_mut();
        let ObjectData::Promise(data) = &mut obj.data else {
            return Ok(());
        };
        if data.state != PromiseState::Pending {
            return Ok(());
        }
        match &outcome {
            Ok(v) => {
                data.state = PromiseState::Fulfilled;
                data.result = v.clone();
                (std::mem::take(&mut data.fulfill_reactions), v.clone())
            }
            Err(reason) => {
                data.state = PromiseState::Rejected;
                data.result = reason.clone();
                (std::mem::take(&mut data.reject_reactions), reason.clone())
            }
        }
    };
    for reaction in reactions {
        run_reaction_inline(reaction, settled.clone(), call, None)?;
    }
    Ok(())
}

fn fulfill_or_reject_opaque(promise: &JsObject, reason: JsValue, call: &mut CallFn<'_>) -> JsResult<()> {
    settle_opaque(promise, Err(reason), call)
}

/// Runs one settled reaction's handler and routes its outcome to the
/// downstream promise. `scheduler` is `Some` whenever a real `Scheduler` is
/// in scope (the normal case, reached through `schedule_reactions`); fresh
/// fulfillments then go through the full `resolve` algorithm so a
/// handler-returned thenable is properly assimilated rather than stored as
/// an opaque value. It's `None` only for callers already nested inside the
/// scheduler's own drain loop (the thenable job's catch arm, and this
/// function's own recursive settling of downstream reactions), where
/// settling opaquely and draining inline is observably equivalent to
/// re-enqueuing.
fn run_reaction_inline(
    reaction: Reaction,
    settled: JsValue,
    call: &mut CallFn<'_>,
    scheduler: Option<&Scheduler>,
) -> JsResult<()> {
    match reaction.handler {
        Some(handler) if handler.as_callable().is_some() => {
            match call(&handler, &JsValue::undefined(), &[settled]) {
                Ok(v) => settle_downstream(&reaction.downstream, Ok(v), call, scheduler),
                Err(e) => settle_downstream(&reaction.downstream, Err(e.to_opaque_value()), call, scheduler),
            }
        }
        _ => settle_downstream(&reaction.downstream, Err(settled), call, scheduler),
    }
}

fn settle_downstream(
    downstream: &JsObject,
    outcome: Result<JsValue, JsValue>,
    call: &mut CallFn<'_>,
    scheduler: Option<&Scheduler>,
) -> JsResult<()> {
    match (outcome, scheduler) {
        (Ok(v), Some(scheduler)) => resolve(downstream, v, scheduler, call),
        (outcome, _) => settle_opaque(downstream, outcome, call),
    }
}

/// §27.2.1.4 FulfillPromise.
pub fn fulfill(promise: &JsObject, value: JsValue, scheduler: &Scheduler) -> JsResult<()> {
    let reactions = {
        let mut obj = promise.borrow_mut();
        let ObjectData::Promise(data) = &mut obj.data else {
            return Err(JsNativeError::typ("not a promise").into());
        };
        if data.state != PromiseState::Pending {
            return Ok(());
        }
        data.state = PromiseState::Fulfilled;
        data.result = value.clone();
        std::mem::take(&mut data.fulfill_reactions)
    };
    schedule_reactions(reactions, value, scheduler);
    Ok(())
}

/// §27.2.1.7 RejectPromise.
pub fn reject(promise: &JsObject, reason: JsValue, scheduler: &Scheduler) -> JsResult<()> {
    let reactions = {
        let mut obj = promise.borrow_mut();
        let ObjectData::Promise(data) = &mut obj.data else {
            return Err(JsNativeError::typ("not a promise").into());
        };
        if data.state != PromiseState::Pending {
            return Ok(());
        }
        data.state = PromiseState::Rejected;
        data.result = reason.clone();
        std::mem::take(&mut data.reject_reactions)
    };
    schedule_reactions(reactions, reason, scheduler);
    Ok(())
}

fn schedule_reactions(reactions: Vec<Reaction>, settled: JsValue, scheduler: &Scheduler) {
    for reaction in reactions {
        let settled = settled.clone();
        scheduler.enqueue(Job::new(move |call: &mut CallFn<'_>, scheduler: &Scheduler| {
            run_reaction_inline(reaction, settled, call, Some(scheduler))
        }));
    }
}

/// §27.2.5.4 PerformPromiseThen.
pub fn perform_then(
    promise: &JsObject,
    on_fulfilled: Option<JsValue>,
    on_rejected: Option<JsValue>,
    downstream: JsObject,
    scheduler: &Scheduler,
) {
    let (state, result) = {
        let mut obj = promise.borrow_mut();
        let ObjectData::Promise(data) = &mut obj.data else {
            return;
        };
        data.is_handled = true;
        match data.state {
            PromiseState::Pending => {
                data.fulfill_reactions.push(Reaction {
                    handler: on_fulfilled,
                    downstream: downstream.clone(),
                });
                data.reject_reactions.push(Reaction {
                    handler: on_rejected,
                    downstream,
                });
                return;
            }
            state => (state, data.result.clone()),
        }
    };
    let reaction = match state {
        PromiseState::Fulfilled => Reaction {
            handler: on_fulfilled,
            downstream,
        },
        PromiseState::Rejected => Reaction {
            handler: on_rejected,
            downstream,
        },
        PromiseState::Pending => unreachable!(),
    };
    scheduler.enqueue(Job::new(move |call: &mut CallFn<'_>, scheduler: &Scheduler| {
        run_reaction_inline(reaction, result, call, Some(scheduler))
    }));
}

impl JsNativeError {
    fn to_opaque_error_value(&self) -> JsValue {
        crate::error::JsError::from(self.clone()).to_opaque_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_call(_: &JsValue, _: &JsValue, _: &[JsValue]) -> JsResult<JsValue> {
        Ok(JsValue::undefined())
    }

    #[test]
    fn fulfilling_a_pending_promise_drains_reactions() {
        let scheduler = Scheduler::new(1024);
        let promise = new_promise(JsValue::null());
        let downstream = new_promise(JsValue::null());
        perform_then(&promise, None, None, downstream.clone(), &scheduler);
        fulfill(&promise, JsValue::from(1.0), &scheduler).unwrap();
        let mut call = noop_call;
        scheduler.drain(&mut call).unwrap();
        let ObjectData::Promise(data) = &downstream.borrow().data else {
            panic!("expected promise data");
        };
        assert_eq!(data.state(), PromiseState::Fulfilled);
        assert_eq!(data.result().as_number(), Some(1.0));
    }

    #[test]
    fn settling_twice_is_a_no_op() {
        let scheduler = Scheduler::new(1024);
        let promise = new_promise(JsValue::null());
        fulfill(&promise, JsValue::from(1.0), &scheduler).unwrap();
        fulfill(&promise, JsValue::from(2.0), &scheduler).unwrap();
        let ObjectData::Promise(data) = &promise.borrow().data else {
            panic!("expected promise data");
        };
        assert_eq!(data.result().as_number(), Some(1.0));
    }

    #[test]
    fn resolving_a_promise_with_itself_rejects_with_type_error() {
        let scheduler = Scheduler::new(1024);
        let promise = new_promise(JsValue::null());
        let mut call = noop_call;
        resolve(&promise, JsValue::Object(promise.clone()), &scheduler, &mut call).unwrap();
        let ObjectData::Promise(data) = &promise.borrow().data else {
            panic!("expected promise data");
        };
        assert_eq!(data.state(), PromiseState::Rejected);
    }
}
