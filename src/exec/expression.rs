//! Expression evaluation (spec.md §4.9, every `ast::Expression` variant).
//!
//! Binary operators mostly delegate straight to `exec::operations::apply_binary`
//! (§13.15's unified arithmetic/bitwise/relational/equality table); the one
//! thing that dispatch point can't own is `LogicalOp`'s short-circuit
//! (lazy-right-operand) evaluation, since `apply_binary` takes both operands
//! already evaluated.

use super::{iteration, operations};
use crate::ast::{ArrayElement, AssignOp, Expression, FunctionNode, Literal, LogicalOp, MemberProperty, ObjectProperty, PropertyKeyNode, UnaryOp, UpdateOp};
use crate::bigint::JsBigInt;
use crate::context::Context;
use crate::environment::Environment;
use crate::error::{JsError, JsNativeError, JsResult};
use crate::object::{array, ArrayData, JsObject, ObjectData};
use crate::promise::PromiseState;
use crate::property::{PropertyDescriptor, PropertyKey};
use crate::value::JsValue;
use std::rc::Rc;

pub fn eval_expr(ctx: &mut Context, env: &Environment, expr: &Expression) -> JsResult<JsValue> {
    match expr {
        Expression::This => Ok(env.resolve_this()),
        Expression::Literal(lit) => eval_literal(lit),
        Expression::Identifier(name) => env
            .get_binding_value(name)?
            .ok_or_else(|| JsNativeError::reference(format!("{name} is not defined")).into()),
        Expression::Array(elements) => eval_array(ctx, env, elements),
        Expression::Object(props) => eval_object(ctx, env, props),
        Expression::Function(node) => Ok(JsValue::Object(build_function(ctx, env, node))),
        Expression::Regexp { source, flags } => eval_regexp(ctx, source, flags),
        Expression::Template { quasis, expressions } => eval_template(ctx, env, quasis, expressions),
        Expression::Unary(op, operand) => eval_unary(ctx, env, *op, operand),
        Expression::Update { op, prefix, target } => eval_update(ctx, env, *op, *prefix, target),
        Expression::Binary(op, left, right) => {
            let lv = eval_expr(ctx, env, left)?;
            let rv = eval_expr(ctx, env, right)?;
            operations::apply_binary(ctx, *op, &lv, &rv)
        }
        Expression::Logical(op, left, right) => eval_logical(ctx, env, *op, left, right),
        Expression::Assign { op, target, value } => eval_assign(ctx, env, *op, target, value),
        Expression::Conditional { test, consequent, alternate } => {
            if eval_expr(ctx, env, test)?.to_boolean() {
                eval_expr(ctx, env, consequent)
            } else {
                eval_expr(ctx, env, alternate)
            }
        }
        Expression::Call { callee, arguments, optional } => eval_call(ctx, env, callee, arguments, *optional),
        Expression::New { callee, arguments } => eval_new(ctx, env, callee, arguments),
        Expression::Member { object, property, optional } => {
            let (_, value) = eval_member(ctx, env, object, property, *optional)?;
            Ok(value)
        }
        Expression::Sequence(exprs) => {
            let mut last = JsValue::undefined();
            for e in exprs {
                last = eval_expr(ctx, env, e)?;
            }
            Ok(last)
        }
        Expression::Await(operand) => eval_top_level_await(ctx, env, operand),
        Expression::Yield { argument, delegate } => {
            let value = match argument {
                Some(arg) => eval_expr(ctx, env, arg)?,
                None => JsValue::undefined(),
            };
            if *delegate {
                crate::cps::perform_yield_delegate(ctx, value)
            } else {
                crate::cps::perform_yield(ctx, value)
            }
        }
        Expression::Spread(operand) => eval_expr(ctx, env, operand),
        Expression::AwaitResolve(operand) => eval_await_resolve(ctx, env, operand),
        Expression::GetIterator(operand) => {
            let value = eval_expr(ctx, env, operand)?;
            iteration::get_iterator(ctx, &value)
        }
        Expression::IteratorNext(operand) => {
            let iterator = eval_expr(ctx, env, operand)?;
            let (value, done) = iteration::iterator_step(ctx, &iterator)?;
            Ok(iterator_result_object(ctx, value, done))
        }
        Expression::YieldSignal { value, next } => {
            let value = eval_expr(ctx, env, value)?;
            let cont = super::make_function(ctx, next.clone(), env.clone());
            let proto = JsValue::Object(ctx.realm().object_prototype().clone());
            let obj = JsObject::new(
                ObjectData::YieldSignal(crate::object::YieldSignalData { value, next: JsValue::Object(cont) }),
                proto,
            );
            Ok(JsValue::Object(obj))
        }
    }
}

/// The CPS transform's non-draining stand-in for `Expression::Await`: wraps
/// `operand`'s value the same way `Promise.resolve` does (adopting another
/// promise as-is, assimilating any other thenable, wrapping a plain value),
/// without running a single job — the `.then` continuation the transform
/// attaches is what actually waits.
fn eval_await_resolve(ctx: &mut Context, env: &Environment, operand: &Expression) -> JsResult<JsValue> {
    let value = eval_expr(ctx, env, operand)?;
    if let JsValue::Object(o) = &value {
        if matches!(o.borrow().data, ObjectData::Promise(_)) {
            return Ok(value);
        }
    }
    let promise_proto = JsValue::Object(ctx.realm().promise_prototype().clone());
    let promise = crate::promise::new_promise(promise_proto);
    let mut call = |f: &JsValue, t: &JsValue, a: &[JsValue]| ctx.call_function(f, t, a);
    crate::promise::resolve(&promise, value, &ctx.scheduler, &mut call)?;
    Ok(JsValue::Object(promise))
}

/// `{value, done}`, the shape `IteratorNext` hands to the synthesized
/// loop-thunk's member accesses.
fn iterator_result_object(ctx: &mut Context, value: Option<JsValue>, done: bool) -> JsValue {
    let proto = JsValue::Object(ctx.realm().object_prototype().clone());
    let obj = JsObject::ordinary(proto);
    crate::object::operations::define(
        &obj,
        PropertyKey::from_str("value"),
        PropertyDescriptor::data(value.unwrap_or(JsValue::undefined()), true, true, true),
    );
    crate::object::operations::define(
        &obj,
        PropertyKey::from_str("done"),
        PropertyDescriptor::data(JsValue::from(done), true, true, true),
    );
    JsValue::Object(obj)
}

fn eval_literal(lit: &Literal) -> JsResult<JsValue> {
    Ok(match lit {
        Literal::Undefined => JsValue::undefined(),
        Literal::Null => JsValue::null(),
        Literal::Boolean(b) => JsValue::from(*b),
        Literal::Number(n) => JsValue::from(*n),
        Literal::String(s) => JsValue::from(s.as_str()),
        Literal::BigInt(digits) => {
            let big = JsBigInt::from_string(digits, 10)
                .ok_or_else(|| JsNativeError::syntax("invalid BigInt literal"))?;
            JsValue::BigInt(big)
        }
    })
}

fn build_function(ctx: &mut Context, env: &Environment, node: &Rc<FunctionNode>) -> JsObject {
    let lowered = crate::cps::lower_function(node.clone());
    super::make_function(ctx, lowered, env.clone())
}

fn eval_regexp(ctx: &mut Context, source: &str, flags: &str) -> JsResult<JsValue> {
    let regexp = crate::regexp::JsRegExp::new(source, flags)?;
    let proto = JsValue::Object(ctx.realm().regexp_prototype().clone());
    let obj = JsObject::new(ObjectData::RegExp(Box::new(regexp)), proto);
    obj.borrow_mut().properties_mut().insert(
        PropertyKey::from_str("lastIndex"),
        PropertyDescriptor::data(JsValue::from(0.0), true, false, false),
    );
    Ok(JsValue::Object(obj))
}

fn eval_template(ctx: &mut Context, env: &Environment, quasis: &[String], expressions: &[Expression]) -> JsResult<JsValue> {
    let mut out = String::new();
    for (i, quasi) in quasis.iter().enumerate() {
        out.push_str(quasi);
        if let Some(e) = expressions.get(i) {
            let v = eval_expr(ctx, env, e)?;
            let s = operations::to_string(ctx, &v)?;
            out.push_str(s.as_str());
        }
    }
    Ok(JsValue::from(out))
}

fn eval_array(ctx: &mut Context, env: &Environment, elements: &[Option<ArrayElement>]) -> JsResult<JsValue> {
    let proto = JsValue::Object(ctx.realm().array_prototype().clone());
    let obj = JsObject::new(ObjectData::Array(ArrayData::new()), proto);
    let mut index: u32 = 0;
    for el in elements {
        match el {
            None => index += 1,
            Some(ArrayElement::Item(e)) => {
                let v = eval_expr(ctx, env, e)?;
                array::set_indexed(&obj, index, v)?;
                index += 1;
            }
            Some(ArrayElement::Spread(e)) => {
                let v = eval_expr(ctx, env, e)?;
                let iterator = iteration::get_iterator(ctx, &v)?;
                loop {
                    let (next, done) = iteration::iterator_step(ctx, &iterator)?;
                    if done {
                        break;
                    }
                    array::set_indexed(&obj, index, next.unwrap_or(JsValue::undefined()))?;
                    index += 1;
                }
            }
        }
    }
    let current_len = match &obj.borrow().data {
        ObjectData::Array(arr) => arr.length(),
        _ => 0,
    };
    if index > current_len {
        crate::object::operations::define(
            &obj,
            PropertyKey::from_str("length"),
            PropertyDescriptor::data(JsValue::from(index as f64), true, false, false),
        );
    }
    Ok(JsValue::Object(obj))
}

fn eval_object(ctx: &mut Context, env: &Environment, props: &[ObjectProperty]) -> JsResult<JsValue> {
    let proto = JsValue::Object(ctx.realm().object_prototype().clone());
    let obj = JsObject::ordinary(proto);
    for prop in props {
        match prop {
            ObjectProperty::KeyValue { key, value, .. } => {
                let k = eval_property_key(ctx, env, key)?;
                let v = eval_expr(ctx, env, value)?;
                crate::object::operations::define(&obj, k, PropertyDescriptor::data(v, true, true, true));
            }
            ObjectProperty::Shorthand(name) => {
                let v = env
                    .get_binding_value(name)?
                    .ok_or_else(|| JsNativeError::reference(format!("{name} is not defined")))?;
                crate::object::operations::define(
                    &obj,
                    PropertyKey::from_str(name),
                    PropertyDescriptor::data(v, true, true, true),
                );
            }
            ObjectProperty::Method { key, function } => {
                let k = eval_property_key(ctx, env, key)?;
                let func = build_function(ctx, env, function);
                crate::object::operations::define(&obj, k, PropertyDescriptor::data(JsValue::Object(func), true, true, true));
            }
            ObjectProperty::Spread(e) => {
                let v = eval_expr(ctx, env, e)?;
                if v.is_null_or_undefined() {
                    continue;
                }
                let source = operations::to_object(ctx, &v)?;
                for key in crate::object::operations::own_keys(&source) {
                    if matches!(&key, PropertyKey::String(s) if s.as_str() == "length") && source.is_array() {
                        continue;
                    }
                    let mut getter = |g: &JsValue, r: &JsValue, a: &[JsValue]| ctx.call_function(g, r, a);
                    if let Some(value) = crate::object::operations::try_get(&source, &key, &v, &mut getter)? {
                        crate::object::operations::define(&obj, key, PropertyDescriptor::data(value, true, true, true));
                    }
                }
            }
        }
    }
    Ok(JsValue::Object(obj))
}

fn eval_property_key(ctx: &mut Context, env: &Environment, key: &PropertyKeyNode) -> JsResult<PropertyKey> {
    match key {
        PropertyKeyNode::Identifier(name) => Ok(PropertyKey::from_str(name)),
        PropertyKeyNode::Computed(e) => {
            let v = eval_expr(ctx, env, e)?;
            operations::to_property_key(ctx, &v)
        }
    }
}

fn eval_unary(ctx: &mut Context, env: &Environment, op: UnaryOp, operand: &Expression) -> JsResult<JsValue> {
    match op {
        UnaryOp::TypeOf => {
            if let Expression::Identifier(name) = operand {
                return Ok(match env.get_binding_value(name) {
                    Ok(Some(v)) => JsValue::from(v.type_of()),
                    _ => JsValue::from("undefined"),
                });
            }
            let v = eval_expr(ctx, env, operand)?;
            Ok(JsValue::from(v.type_of()))
        }
        UnaryOp::Void => {
            eval_expr(ctx, env, operand)?;
            Ok(JsValue::undefined())
        }
        UnaryOp::Delete => eval_delete(ctx, env, operand),
        UnaryOp::Not => Ok(JsValue::from(!eval_expr(ctx, env, operand)?.to_boolean())),
        UnaryOp::Minus => {
            let v = eval_expr(ctx, env, operand)?;
            if let JsValue::BigInt(b) = &v {
                return Ok(JsValue::from(b.neg()));
            }
            Ok(JsValue::from(-operations::to_number(ctx, &v)?))
        }
        UnaryOp::Plus => {
            let v = eval_expr(ctx, env, operand)?;
            Ok(JsValue::from(operations::to_number(ctx, &v)?))
        }
        UnaryOp::BitNot => {
            let v = eval_expr(ctx, env, operand)?;
            if let JsValue::BigInt(b) = &v {
                return Ok(JsValue::from(b.not()));
            }
            let n = operations::to_number(ctx, &v)?;
            Ok(JsValue::from(!operations::to_int32(n) as f64))
        }
    }
}

fn eval_delete(ctx: &mut Context, env: &Environment, operand: &Expression) -> JsResult<JsValue> {
    if let Expression::Member { object, property, optional } = operand {
        let (obj, _) = eval_member_object(ctx, env, object, *optional)?;
        let Some(obj) = obj else { return Ok(JsValue::from(true)) };
        let key = eval_member_key(ctx, env, property)?;
        return Ok(JsValue::from(crate::object::operations::delete(&obj, &key)));
    }
    Ok(JsValue::from(true))
}

fn eval_update(ctx: &mut Context, env: &Environment, op: UpdateOp, prefix: bool, target: &Expression) -> JsResult<JsValue> {
    let old = get_reference_value(ctx, env, target)?;
    let old_num = operations::to_number(ctx, &old)?;
    let new_val = JsValue::from(match op {
        UpdateOp::Increment => old_num + 1.0,
        UpdateOp::Decrement => old_num - 1.0,
    });
    assign_to_target(ctx, env, target, new_val.clone())?;
    Ok(if prefix { new_val } else { JsValue::from(old_num) })
}

fn eval_logical(ctx: &mut Context, env: &Environment, op: LogicalOp, left: &Expression, right: &Expression) -> JsResult<JsValue> {
    let lv = eval_expr(ctx, env, left)?;
    match op {
        LogicalOp::And => {
            if lv.to_boolean() {
                eval_expr(ctx, env, right)
            } else {
                Ok(lv)
            }
        }
        LogicalOp::Or => {
            if lv.to_boolean() {
                Ok(lv)
            } else {
                eval_expr(ctx, env, right)
            }
        }
        LogicalOp::Coalesce => {
            if lv.is_null_or_undefined() {
                eval_expr(ctx, env, right)
            } else {
                Ok(lv)
            }
        }
    }
}

fn eval_assign(ctx: &mut Context, env: &Environment, op: AssignOp, target: &Expression, value: &Expression) -> JsResult<JsValue> {
    if op == AssignOp::Assign {
        let v = eval_expr(ctx, env, value)?;
        assign_to_target(ctx, env, target, v.clone())?;
        return Ok(v);
    }
    if matches!(op, AssignOp::LogicalAnd | AssignOp::LogicalOr | AssignOp::Coalesce) {
        let current = get_reference_value(ctx, env, target)?;
        let short_circuits = match op {
            AssignOp::LogicalAnd => !current.to_boolean(),
            AssignOp::LogicalOr => current.to_boolean(),
            AssignOp::Coalesce => !current.is_null_or_undefined(),
            _ => unreachable!(),
        };
        if short_circuits {
            return Ok(current);
        }
        let v = eval_expr(ctx, env, value)?;
        assign_to_target(ctx, env, target, v.clone())?;
        return Ok(v);
    }
    let current = get_reference_value(ctx, env, target)?;
    let rhs = eval_expr(ctx, env, value)?;
    let binop = match op {
        AssignOp::Add => crate::ast::BinaryOp::Add,
        AssignOp::Sub => crate::ast::BinaryOp::Sub,
        AssignOp::Mul => crate::ast::BinaryOp::Mul,
        AssignOp::Div => crate::ast::BinaryOp::Div,
        AssignOp::Mod => crate::ast::BinaryOp::Mod,
        AssignOp::Pow => crate::ast::BinaryOp::Pow,
        AssignOp::BitAnd => crate::ast::BinaryOp::BitAnd,
        AssignOp::BitOr => crate::ast::BinaryOp::BitOr,
        AssignOp::BitXor => crate::ast::BinaryOp::BitXor,
        AssignOp::Shl => crate::ast::BinaryOp::Shl,
        AssignOp::Shr => crate::ast::BinaryOp::Shr,
        AssignOp::UShr => crate::ast::BinaryOp::UShr,
        AssignOp::Assign | AssignOp::LogicalAnd | AssignOp::LogicalOr | AssignOp::Coalesce => unreachable!(),
    };
    let result = operations::apply_binary(ctx, binop, &current, &rhs)?;
    assign_to_target(ctx, env, target, result.clone())?;
    Ok(result)
}

/// Reads the current value of an assignment target without committing a
/// write; shared by compound-assignment and `++`/`--`.
fn get_reference_value(ctx: &mut Context, env: &Environment, target: &Expression) -> JsResult<JsValue> {
    match target {
        Expression::Identifier(name) => env
            .get_binding_value(name)?
            .ok_or_else(|| JsNativeError::reference(format!("{name} is not defined")).into()),
        Expression::Member { object, property, optional } => eval_member(ctx, env, object, property, *optional).map(|(_, v)| v),
        other => eval_expr(ctx, env, other),
    }
}

/// Only identifiers and member expressions are valid assignment targets
/// (destructuring assignment against an array/object literal expression is
/// not supported here; destructuring only occurs through `ast::Binding` in
/// declarations, parameters, and `for`-of/-in heads).
fn assign_to_target(ctx: &mut Context, env: &Environment, target: &Expression, value: JsValue) -> JsResult<()> {
    match target {
        Expression::Identifier(name) => env.assign(name, value),
        Expression::Member { object, property, .. } => {
            let obj_value = eval_expr(ctx, env, object)?;
            let key = eval_member_key(ctx, env, property)?;
            let obj = operations::to_object(ctx, &obj_value)?;
            let mut setter = |f: &JsValue, t: &JsValue, a: &[JsValue]| ctx.call_function(f, t, a);
            crate::object::operations::set(&obj, key, value, &obj_value, &mut setter)?;
            Ok(())
        }
        _ => Err(JsNativeError::syntax("invalid assignment target").into()),
    }
}

fn eval_member_key(ctx: &mut Context, env: &Environment, property: &MemberProperty) -> JsResult<PropertyKey> {
    match property {
        MemberProperty::Identifier(name) => Ok(PropertyKey::from_str(name)),
        MemberProperty::Private(name) => Ok(PropertyKey::from_str(&format!("#{name}"))),
        MemberProperty::Computed(e) => {
            let v = eval_expr(ctx, env, e)?;
            operations::to_property_key(ctx, &v)
        }
    }
}

/// Evaluates the object half of a member expression, honouring optional
/// chaining by returning `None` when short-circuited.
fn eval_member_object(ctx: &mut Context, env: &Environment, object: &Expression, optional: bool) -> JsResult<(Option<JsObject>, JsValue)> {
    let obj_value = eval_expr(ctx, env, object)?;
    if optional && obj_value.is_null_or_undefined() {
        return Ok((None, JsValue::undefined()));
    }
    let obj = operations::to_object(ctx, &obj_value)?;
    Ok((Some(obj), obj_value))
}

fn eval_member(
    ctx: &mut Context,
    env: &Environment,
    object: &Expression,
    property: &MemberProperty,
    optional: bool,
) -> JsResult<(JsValue, JsValue)> {
    let (obj, obj_value) = eval_member_object(ctx, env, object, optional)?;
    let Some(obj) = obj else {
        return Ok((JsValue::undefined(), JsValue::undefined()));
    };
    let key = eval_member_key(ctx, env, property)?;
    let mut getter = |f: &JsValue, t: &JsValue, a: &[JsValue]| ctx.call_function(f, t, a);
    let value = crate::object::operations::try_get(&obj, &key, &obj_value, &mut getter)?.unwrap_or(JsValue::undefined());
    Ok((obj_value, value))
}

fn eval_arguments(ctx: &mut Context, env: &Environment, args: &[ArrayElement]) -> JsResult<Vec<JsValue>> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            ArrayElement::Item(e) => out.push(eval_expr(ctx, env, e)?),
            ArrayElement::Spread(e) => {
                let v = eval_expr(ctx, env, e)?;
                let iterator = iteration::get_iterator(ctx, &v)?;
                loop {
                    let (next, done) = iteration::iterator_step(ctx, &iterator)?;
                    if done {
                        break;
                    }
                    out.push(next.unwrap_or(JsValue::undefined()));
                }
            }
        }
    }
    Ok(out)
}

fn eval_call(ctx: &mut Context, env: &Environment, callee: &Expression, arguments: &[ArrayElement], optional: bool) -> JsResult<JsValue> {
    let (this, callee_value) = match callee {
        Expression::Member { object, property, optional: member_optional } => {
            let (obj, obj_value) = eval_member_object(ctx, env, object, *member_optional)?;
            let Some(obj) = obj else { return Ok(JsValue::undefined()) };
            let key = eval_member_key(ctx, env, property)?;
            let mut getter = |f: &JsValue, t: &JsValue, a: &[JsValue]| ctx.call_function(f, t, a);
            let value = crate::object::operations::try_get(&obj, &key, &obj_value, &mut getter)?.unwrap_or(JsValue::undefined());
            (obj_value, value)
        }
        other => (JsValue::undefined(), eval_expr(ctx, env, other)?),
    };

    if optional && callee_value.is_null_or_undefined() {
        return Ok(JsValue::undefined());
    }
    let args = eval_arguments(ctx, env, arguments)?;
    ctx.call_function(&callee_value, &this, &args)
}

fn eval_new(ctx: &mut Context, env: &Environment, callee: &Expression, arguments: &[ArrayElement]) -> JsResult<JsValue> {
    let callee_value = eval_expr(ctx, env, callee)?;
    let Some(obj) = callee_value.as_object() else {
        return Err(JsNativeError::typ("value is not a constructor").into());
    };
    let args = eval_arguments(ctx, env, arguments)?;
    ctx.construct(obj, &args)
}

/// Top-level `await` (outside any async function, which the CPS transform
/// already rewrites into `.then` continuations before its body ever reaches
/// this evaluator): drains pending jobs until the awaited promise settles.
/// Only reachable from module/program top level, not from inside a
/// transformed async function body.
fn eval_top_level_await(ctx: &mut Context, env: &Environment, operand: &Expression) -> JsResult<JsValue> {
    let value = eval_expr(ctx, env, operand)?;
    drain_promise(ctx, value)
}

/// Shared by `eval_top_level_await` and `for-await-of`'s per-iteration
/// await: spins the scheduler until `value` (if a promise) settles, or the
/// call-depth bound is exhausted.
pub(super) fn drain_promise(ctx: &mut Context, value: JsValue) -> JsResult<JsValue> {
    let Some(obj) = value.as_object().cloned() else {
        return Ok(value);
    };
    let is_promise = matches!(obj.borrow().data, ObjectData::Promise(_));
    if !is_promise {
        return Ok(value);
    }
    let max_iterations = ctx.scheduler.max_call_depth();
    for _ in 0..max_iterations {
        let (state, result) = {
            let guard = obj.borrow();
            let ObjectData::Promise(p) = &guard.data else { unreachable!() };
            (p.state(), p.result())
        };
        match state {
            PromiseState::Fulfilled => return Ok(result),
            PromiseState::Rejected => return Err(JsError::from_value(result)),
            PromiseState::Pending => {
                if !ctx.scheduler.has_pending_jobs() {
                    return Ok(JsValue::undefined());
                }
                ctx.run_jobs()?;
            }
        }
    }
    Err(JsNativeError::range("await exceeded the maximum job-drain depth").into())
}
