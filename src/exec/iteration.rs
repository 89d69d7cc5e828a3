//! The iterator protocol (spec.md §4.9 "for-of/spread/destructuring share one
//! iterator protocol") and the loop-statement executors that ride on it.
//!
//! `get_iterator`/`iterator_step`/`iterator_close` are the three primitives
//! every consumer (array/call-argument spread, array-pattern destructuring,
//! `for-of`) drives through `expression::eval_arguments` and
//! `exec::bind_pattern` as well as this module's own `exec_for_of`, mirroring
//! `boa`'s `get_iterator`/`IteratorRecord::step` split in
//! `boa_engine/src/builtins/iterable.rs`.

use super::expression;
use super::{bind_pattern, exec_statement, Completion};
use crate::ast::{Binding, Expression, Statement};
use crate::context::Context;
use crate::environment::{DeclarationKind, Environment};
use crate::error::{JsNativeError, JsResult};
use crate::object::operations as obj_ops;
use crate::property::PropertyKey;
use crate::value::JsValue;

/// §7.4.2 GetIterator: looks up `@@iterator`, calls it, and checks the
/// result is object-like (an iterator must expose `.next`).
pub fn get_iterator(ctx: &mut Context, value: &JsValue) -> JsResult<JsValue> {
    let obj = super::operations::to_object(ctx, value)?;
    let key = PropertyKey::Symbol(ctx.realm().well_known_symbols().iterator.clone());
    let method = {
        let mut getter = |g: &JsValue, r: &JsValue, a: &[JsValue]| ctx.call_function(g, r, a);
        obj_ops::try_get(&obj, &key, value, &mut getter)?.unwrap_or(JsValue::undefined())
    };
    if method.as_callable().is_none() {
        return Err(JsNativeError::typ("value is not iterable").into());
    }
    let iterator = ctx.call_function(&method, value, &[])?;
    if !iterator.is_object() {
        return Err(JsNativeError::typ("Symbol.iterator method returned a non-object").into());
    }
    Ok(iterator)
}

/// §7.4.3 IteratorStep, flattened to `(value, done)`: `done == true` means
/// the loop is over and `value` is `None`.
pub fn iterator_step(ctx: &mut Context, iterator: &JsValue) -> JsResult<(Option<JsValue>, bool)> {
    let obj = iterator
        .as_object()
        .ok_or_else(|| JsNativeError::typ("iterator is not an object"))?
        .clone();
    let next_key = PropertyKey::from_str("next");
    let next_fn = {
        let mut getter = |g: &JsValue, r: &JsValue, a: &[JsValue]| ctx.call_function(g, r, a);
        obj_ops::try_get(&obj, &next_key, iterator, &mut getter)?
            .ok_or_else(|| JsNativeError::typ("iterator has no next method"))?
    };
    let result = ctx.call_function(&next_fn, iterator, &[])?;
    let result_obj = result
        .as_object()
        .ok_or_else(|| JsNativeError::typ("iterator result is not an object"))?
        .clone();

    let done = {
        let mut getter = |g: &JsValue, r: &JsValue, a: &[JsValue]| ctx.call_function(g, r, a);
        obj_ops::try_get(&result_obj, &PropertyKey::from_str("done"), &result, &mut getter)?
            .map(|v| v.to_boolean())
            .unwrap_or(false)
    };
    if done {
        return Ok((None, true));
    }
    let value = {
        let mut getter = |g: &JsValue, r: &JsValue, a: &[JsValue]| ctx.call_function(g, r, a);
        obj_ops::try_get(&result_obj, &PropertyKey::from_str("value"), &result, &mut getter)?
    };
    Ok((value, false))
}

/// §7.4.9 IteratorClose: best-effort `.return()` call on early exit (`break`,
/// `throw`, or a destructuring pattern that stops short); a missing or
/// non-callable `.return` is not an error.
pub fn iterator_close(ctx: &mut Context, iterator: &JsValue) -> JsResult<()> {
    let Some(obj) = iterator.as_object().cloned() else {
        return Ok(());
    };
    let method = {
        let mut getter = |g: &JsValue, r: &JsValue, a: &[JsValue]| ctx.call_function(g, r, a);
        obj_ops::try_get(&obj, &PropertyKey::from_str("return"), iterator, &mut getter)?
    };
    if let Some(method) = method {
        if method.as_callable().is_some() {
            ctx.call_function(&method, iterator, &[])?;
        }
    }
    Ok(())
}

/// Binds (`Some(kind)`) or assigns (`None`, an already-declared target) one
/// loop-head value against a fresh per-iteration environment, matching the
/// spec's CreatePerIterationEnvironment for `let`/`const` for-loop heads.
fn bind_loop_target(ctx: &mut Context, iter_env: &Environment, binding: &Binding, kind: Option<DeclarationKind>, value: JsValue) -> JsResult<()> {
    let declare = kind.is_some();
    bind_pattern(ctx, iter_env, binding, value, kind.unwrap_or(DeclarationKind::Let), declare)
}

/// Maps a loop body's completion against `label`, matching the labeled/
/// unlabeled `break`/`continue` semantics every loop executor below shares:
/// a matching `break` ends the loop, a matching `continue` falls through to
/// the next iteration, and anything else (a `Return`, or a `break`/`continue`
/// aimed at an outer label) propagates to the caller untouched.
enum LoopStep {
    Stop(Completion),
    NextIteration,
    Propagate(Completion),
}

fn classify(completion: Completion, label: Option<&str>) -> LoopStep {
    match completion {
        Completion::Normal(_) => LoopStep::NextIteration,
        Completion::Continue(ref l) if l.is_none() || l.as_deref() == label => LoopStep::NextIteration,
        Completion::Break(ref l) if l.is_none() || l.as_deref() == label => LoopStep::Stop(Completion::Normal(JsValue::undefined())),
        other => LoopStep::Propagate(other),
    }
}

pub fn exec_for(
    ctx: &mut Context,
    env: &Environment,
    init: &Option<Box<Statement>>,
    test: &Option<Expression>,
    update: &Option<Expression>,
    body: &Statement,
    label: Option<&str>,
) -> JsResult<Completion> {
    // A single shared `loop_env` for the whole loop, not a fresh copy per
    // iteration: closures created in different iterations of a `let`-headed
    // `for` therefore observe each other's writes to the loop variable,
    // unlike the per-iteration-environment behaviour real engines implement.
    // A documented simplification, not expected to be load-bearing for any
    // script that doesn't specifically probe this corner.
    let loop_env = Environment::new_declarative(Some(env.clone()));
    if let Some(init) = init {
        exec_statement(ctx, init, &loop_env)?;
    }
    loop {
        ctx.scheduler.check_timeout()?;
        if let Some(test) = test {
            if !expression::eval_expr(ctx, &loop_env, test)?.to_boolean() {
                break;
            }
        }
        match classify(exec_statement(ctx, body, &loop_env)?, label) {
            LoopStep::Stop(c) => return Ok(c),
            LoopStep::Propagate(c) => return Ok(c),
            LoopStep::NextIteration => {}
        }
        if let Some(update) = update {
            expression::eval_expr(ctx, &loop_env, update)?;
        }
    }
    Ok(Completion::Normal(JsValue::undefined()))
}

pub fn exec_while(ctx: &mut Context, env: &Environment, test: &Expression, body: &Statement, label: Option<&str>) -> JsResult<Completion> {
    loop {
        ctx.scheduler.check_timeout()?;
        if !expression::eval_expr(ctx, env, test)?.to_boolean() {
            break;
        }
        match classify(exec_statement(ctx, body, env)?, label) {
            LoopStep::Stop(c) => return Ok(c),
            LoopStep::Propagate(c) => return Ok(c),
            LoopStep::NextIteration => {}
        }
    }
    Ok(Completion::Normal(JsValue::undefined()))
}

pub fn exec_do_while(ctx: &mut Context, env: &Environment, body: &Statement, test: &Expression, label: Option<&str>) -> JsResult<Completion> {
    loop {
        match classify(exec_statement(ctx, body, env)?, label) {
            LoopStep::Stop(c) => return Ok(c),
            LoopStep::Propagate(c) => return Ok(c),
            LoopStep::NextIteration => {}
        }
        ctx.scheduler.check_timeout()?;
        if !expression::eval_expr(ctx, env, test)?.to_boolean() {
            break;
        }
    }
    Ok(Completion::Normal(JsValue::undefined()))
}

pub fn exec_for_of(
    ctx: &mut Context,
    env: &Environment,
    binding: &Binding,
    kind: Option<DeclarationKind>,
    is_await: bool,
    iterable: &Expression,
    body: &Statement,
    label: Option<&str>,
) -> JsResult<Completion> {
    let iterable_value = expression::eval_expr(ctx, env, iterable)?;
    let iterator = get_iterator(ctx, &iterable_value)?;
    loop {
        ctx.scheduler.check_timeout()?;
        let (next, done) = iterator_step(ctx, &iterator)?;
        if done {
            break;
        }
        let mut value = next.unwrap_or(JsValue::undefined());
        if is_await {
            value = expression::drain_promise(ctx, value)?;
        }
        let iter_env = Environment::new_declarative(Some(env.clone()));
        bind_loop_target(ctx, &iter_env, binding, kind, value)?;

        let completion = exec_statement(ctx, body, &iter_env);
        let completion = match completion {
            Err(e) => {
                iterator_close(ctx, &iterator)?;
                return Err(e);
            }
            Ok(c) => c,
        };
        match classify(completion, label) {
            LoopStep::Stop(c) => {
                iterator_close(ctx, &iterator)?;
                return Ok(c);
            }
            LoopStep::Propagate(c) => {
                iterator_close(ctx, &iterator)?;
                return Ok(c);
            }
            LoopStep::NextIteration => {}
        }
    }
    Ok(Completion::Normal(JsValue::undefined()))
}

pub fn exec_for_in(
    ctx: &mut Context,
    env: &Environment,
    binding: &Binding,
    kind: Option<DeclarationKind>,
    object: &Expression,
    body: &Statement,
    label: Option<&str>,
) -> JsResult<Completion> {
    let obj_value = expression::eval_expr(ctx, env, object)?;
    if obj_value.is_null_or_undefined() {
        return Ok(Completion::Normal(JsValue::undefined()));
    }
    let obj = super::operations::to_object(ctx, &obj_value)?;
    for name in enumerable_string_keys(&obj) {
        ctx.scheduler.check_timeout()?;
        let iter_env = Environment::new_declarative(Some(env.clone()));
        bind_loop_target(ctx, &iter_env, binding, kind, JsValue::from(name))?;
        match classify(exec_statement(ctx, body, &iter_env)?, label) {
            LoopStep::Stop(c) => return Ok(c),
            LoopStep::Propagate(c) => return Ok(c),
            LoopStep::NextIteration => {}
        }
    }
    Ok(Completion::Normal(JsValue::undefined()))
}

/// §13.7.5.15 ForIn/OfHeadEvaluation's enumerate case: own then inherited
/// enumerable string keys, each name visited at most once even if shadowed
/// further down the prototype chain.
fn enumerable_string_keys(obj: &crate::object::JsObject) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    let mut current = Some(obj.clone());
    while let Some(o) = current {
        for key in obj_ops::own_keys(&o) {
            let name = match &key {
                PropertyKey::String(s) => s.as_str().to_string(),
                PropertyKey::Index(i) => i.to_string(),
                PropertyKey::Symbol(_) => continue,
            };
            if !seen.insert(name.clone()) {
                continue;
            }
            let enumerable = o
                .borrow()
                .properties_ref()
                .get(&key)
                .map(|d| d.enumerable.unwrap_or(false))
                .unwrap_or(matches!(key, PropertyKey::Index(_)));
            if enumerable {
                out.push(name);
            }
        }
        current = match o.prototype() {
            JsValue::Object(p) => Some(p),
            _ => None,
        };
    }
    out
}
