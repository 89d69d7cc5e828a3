//! The tree-walking evaluator (spec.md §4.9 "evaluator", generalized to
//! cover every `ast::Statement`/`ast::Expression` variant).
//!
//! Grounded on `boa/src/exec/mod.rs`'s per-node `Executable::run(&mut
//! Context)` dispatch style, collapsed into free functions taking `&mut
//! Context` and `&Environment` explicitly (this crate's AST nodes don't carry
//! a `run` method of their own, matching `crate::ast`'s framing as a plain
//! data contract rather than an executable tree).

mod declaration;
mod expression;
pub mod iteration;
pub mod operations;

pub use expression::eval_expr;

use crate::ast::{DeclarationKind as DeclKind, FunctionNode, Program, Statement};
use crate::cps;
use crate::environment::{DeclarationKind, Environment};
use crate::error::{JsNativeError, JsResult};
use crate::object::function::{Function, OrdinaryFunctionData};
use crate::object::{JsObject, ObjectData};
use crate::value::JsValue;
use std::rc::Rc;

/// What running a statement produced, distinct from `JsResult`'s throw
/// channel (spec.md §4.9 "Completion: Normal | Return | Break | Continue").
#[derive(Debug, Clone)]
pub enum Completion {
    Normal(JsValue),
    Return(JsValue),
    Break(Option<String>),
    Continue(Option<String>),
}

impl Completion {
    fn is_abrupt(&self) -> bool {
        !matches!(self, Completion::Normal(_))
    }
}

/// Runs a top-level program (or module body) in `env`, returning the
/// completion value of its last expression statement (spec.md §6
/// `evaluate`).
pub fn run_program(ctx: &mut crate::context::Context, program: &Program, env: Environment) -> JsResult<JsValue> {
    declaration::hoist_program(ctx, program, &env)?;
    let completion = run_block(ctx, &program.body, &env)?;
    Ok(match completion {
        Completion::Normal(v) | Completion::Return(v) => v,
        _ => JsValue::undefined(),
    })
}

/// Executes a statement list sequentially, short-circuiting on the first
/// abrupt completion (spec.md §4.9: "a block's completion is its last
/// statement's, or the first abrupt one").
pub fn run_block(ctx: &mut crate::context::Context, stmts: &[Statement], env: &Environment) -> JsResult<Completion> {
    let mut last = Completion::Normal(JsValue::undefined());
    for stmt in stmts {
        ctx_check_timeout(ctx)?;
        last = exec_statement(ctx, stmt, env)?;
        if last.is_abrupt() {
            return Ok(last);
        }
    }
    Ok(last)
}

fn ctx_check_timeout(ctx: &crate::context::Context) -> JsResult<()> {
    ctx.scheduler.check_timeout()
}

pub fn exec_statement(ctx: &mut crate::context::Context, stmt: &Statement, env: &Environment) -> JsResult<Completion> {
    match stmt {
        Statement::Expression(e) => Ok(Completion::Normal(expression::eval_expr(ctx, env, e)?)),
        Statement::VariableDeclaration { kind, declarations } => {
            for (binding, init) in declarations {
                let value = match init {
                    Some(e) => expression::eval_expr(ctx, env, e)?,
                    None => JsValue::undefined(),
                };
                bind_pattern(ctx, env, binding, value, *kind, true)?;
            }
            Ok(Completion::Normal(JsValue::undefined()))
        }
        Statement::FunctionDeclaration(_) => Ok(Completion::Normal(JsValue::undefined())), // hoisted already
        Statement::Block(body) => {
            let block_env = Environment::new_declarative(Some(env.clone()));
            declaration::hoist_block(ctx, body, &block_env)?;
            run_block(ctx, body, &block_env)
        }
        Statement::If { test, consequent, alternate } => {
            if expression::eval_expr(ctx, env, test)?.to_boolean() {
                exec_statement(ctx, consequent, env)
            } else if let Some(alt) = alternate {
                exec_statement(ctx, alt, env)
            } else {
                Ok(Completion::Normal(JsValue::undefined()))
            }
        }
        Statement::For { init, test, update, body } => iteration::exec_for(ctx, env, init, test, update, body, None),
        Statement::ForOf { binding, kind, is_await, iterable, body } => {
            iteration::exec_for_of(ctx, env, binding, *kind, *is_await, iterable, body, None)
        }
        Statement::ForIn { binding, kind, object, body } => {
            iteration::exec_for_in(ctx, env, binding, *kind, object, body, None)
        }
        Statement::While { test, body } => iteration::exec_while(ctx, env, test, body, None),
        Statement::DoWhile { body, test } => iteration::exec_do_while(ctx, env, body, test, None),
        Statement::Return(e) => {
            let value = match e {
                Some(e) => expression::eval_expr(ctx, env, e)?,
                None => JsValue::undefined(),
            };
            Ok(Completion::Return(value))
        }
        Statement::Break(label) => Ok(Completion::Break(label.clone())),
        Statement::Continue(label) => Ok(Completion::Continue(label.clone())),
        Statement::Throw(e) => {
            let value = expression::eval_expr(ctx, env, e)?;
            Err(crate::error::JsError::from_value(value))
        }
        Statement::Try { block, handler, finalizer } => exec_try(ctx, env, block, handler, finalizer),
        Statement::Labeled { label, body } => exec_labeled(ctx, env, label, body),
        Statement::Empty => Ok(Completion::Normal(JsValue::undefined())),
    }
}

fn exec_labeled(ctx: &mut crate::context::Context, env: &Environment, label: &str, body: &Statement) -> JsResult<Completion> {
    // Labeled loops let `continue label`/`break label` target this specific
    // loop (spec.md §4.9's generalization of labeled statements); unlabeled
    // loop statements thread `None` through `iteration`'s `label` parameter,
    // so re-dispatch into the loop executors directly when `body` is one.
    let completion = match body {
        Statement::For { init, test, update, body } => iteration::exec_for(ctx, env, init, test, update, body, Some(label))?,
        Statement::ForOf { binding, kind, is_await, iterable, body } => {
            iteration::exec_for_of(ctx, env, binding, *kind, *is_await, iterable, body, Some(label))?
        }
        Statement::ForIn { binding, kind, object, body } => iteration::exec_for_in(ctx, env, binding, *kind, object, body, Some(label))?,
        Statement::While { test, body } => iteration::exec_while(ctx, env, test, body, Some(label))?,
        Statement::DoWhile { body, test } => iteration::exec_do_while(ctx, env, body, test, Some(label))?,
        other => exec_statement(ctx, other, env)?,
    };
    Ok(match completion {
        Completion::Break(Some(l)) if l == label => Completion::Normal(JsValue::undefined()),
        other => other,
    })
}

fn exec_try(
    ctx: &mut crate::context::Context,
    env: &Environment,
    block: &[Statement],
    handler: &Option<(Option<crate::ast::Binding>, Vec<Statement>)>,
    finalizer: &Option<Vec<Statement>>,
) -> JsResult<Completion> {
    let block_env = Environment::new_declarative(Some(env.clone()));
    declaration::hoist_block(ctx, block, &block_env)?;
    let result = run_block(ctx, block, &block_env);

    let result = match result {
        // A generator's `yield`/`.return()` unwinds through `try` as an
        // internal signal, never a script-observable exception; let it keep
        // propagating without running the catch handler (or, here, the
        // finally block — resuming mid-`finally` after a replay isn't
        // supported, a documented limitation of the replay-based generator
        // strategy).
        Err(e @ (crate::error::JsError::Yield(_) | crate::error::JsError::Return(_))) => return Err(e),
        Err(e) => {
            if let Some((param, catch_body)) = handler {
                let catch_env = Environment::new_declarative(Some(env.clone()));
                if let Some(binding) = param {
                    let realized = ctx.realize(&e);
                    bind_pattern(ctx, &catch_env, binding, realized, DeclKind::Let, true)?;
                }
                declaration::hoist_block(ctx, catch_body, &catch_env)?;
                run_block(ctx, catch_body, &catch_env)
            } else {
                Err(e)
            }
        }
        ok => ok,
    };

    match finalizer {
        Some(fin_body) => {
            let fin_env = Environment::new_declarative(Some(env.clone()));
            declaration::hoist_block(ctx, fin_body, &fin_env)?;
            let fin_completion = run_block(ctx, fin_body, &fin_env)?;
            if fin_completion.is_abrupt() {
                Ok(fin_completion)
            } else {
                result
            }
        }
        None => result,
    }
}

/// Binds a destructuring/identifier pattern to `value` (spec.md §4.8,
/// restricted to the `Binding` shapes `crate::ast` exposes: identifier,
/// array, and object patterns with no default-value nesting).
pub fn bind_pattern(
    ctx: &mut crate::context::Context,
    env: &Environment,
    binding: &crate::ast::Binding,
    value: JsValue,
    kind: DeclKind,
    declare: bool,
) -> JsResult<()> {
    use crate::ast::Binding;
    match binding {
        Binding::Identifier(name) => {
            if declare {
                let decl_kind = match kind {
                    DeclKind::Var => DeclarationKind::Var,
                    DeclKind::Let => DeclarationKind::Let,
                    DeclKind::Const => DeclarationKind::Const,
                };
                if !env.has_binding(name) || decl_kind != DeclarationKind::Var {
                    env.create_mutable_binding(name, decl_kind);
                }
                env.initialize_binding(name, value);
            } else {
                env.assign(name, value)?;
            }
            Ok(())
        }
        Binding::Array(elements) => {
            let iterator = iteration::get_iterator(ctx, &value)?;
            for el in elements {
                let (next_value, _done) = iteration::iterator_step(ctx, &iterator)?;
                if let Some(sub) = el {
                    bind_pattern(ctx, env, sub, next_value.unwrap_or(JsValue::undefined()), kind, declare)?;
                }
            }
            Ok(())
        }
        Binding::Object(props) => {
            for (key_node, sub) in props {
                let key = match key_node {
                    crate::ast::PropertyKeyNode::Identifier(name) => crate::property::PropertyKey::from_str(name),
                    crate::ast::PropertyKeyNode::Computed(e) => {
                        let key_value = expression::eval_expr(ctx, env, e)?;
                        operations::to_property_key(ctx, &key_value)?
                    }
                };
                let obj = operations::to_object(ctx, &value)?;
                let mut getter = |g: &JsValue, r: &JsValue, a: &[JsValue]| ctx.call_function(g, r, a);
                let prop = crate::object::operations::try_get(&obj, &key, &value, &mut getter)?.unwrap_or(JsValue::undefined());
                bind_pattern(ctx, env, sub, prop, kind, declare)?;
            }
            Ok(())
        }
    }
}

/// Invokes an ordinary (user-defined) function's body against a fresh
/// function environment (spec.md §4.9 "OrdinaryCallBindThis" +
/// "FunctionDeclarationInstantiation"), special-casing async/generator
/// functions per `crate::cps`'s scoped lowering.
pub fn call_ordinary_function(
    ctx: &mut crate::context::Context,
    node: &Rc<FunctionNode>,
    closure: Environment,
    strict: bool,
    this: &JsValue,
    args: &[JsValue],
    new_target: Option<JsObject>,
) -> JsResult<JsValue> {
    let _ = strict;
    let this_value = if node.is_arrow { None } else { Some(this.clone()) };
    let new_target_value = new_target.map(JsValue::Object).unwrap_or(JsValue::undefined());
    let fn_env = if node.is_arrow {
        Environment::new_declarative(Some(closure))
    } else {
        Environment::new_function(Some(closure), this_value, new_target_value)
    };

    bind_parameters(ctx, &fn_env, &node.params, args)?;
    if !node.is_arrow {
        install_arguments_object(&fn_env, &node.params, args, strict);
    }

    if node.is_generator {
        let stepper = cps::GeneratorStepper::new(node.clone(), fn_env);
        let proto = ctx.realm().generator_prototype().clone();
        let obj = JsObject::new(ObjectData::Generator(stepper), JsValue::Object(proto));
        return Ok(JsValue::Object(obj));
    }

    declaration::hoist_function_body(ctx, &node.body, &fn_env)?;
    let outcome = run_block(ctx, &node.body, &fn_env);

    if node.is_async {
        let promise_proto = JsValue::Object(ctx.realm().promise_prototype().clone());
        let promise = crate::promise::new_promise(promise_proto);
        match outcome {
            Ok(Completion::Return(v)) | Ok(Completion::Normal(v)) => {
                let mut call = |f: &JsValue, t: &JsValue, a: &[JsValue]| ctx.call_function(f, t, a);
                crate::promise::resolve(&promise, v, &ctx.scheduler, &mut call)?;
            }
            Ok(_) => {
                crate::promise::fulfill(&promise, JsValue::undefined(), &ctx.scheduler)?;
            }
            Err(e) => {
                let reason = ctx.realize(&e);
                crate::promise::reject(&promise, reason, &ctx.scheduler)?;
            }
        }
        return Ok(JsValue::Object(promise));
    }

    Ok(match outcome? {
        Completion::Return(v) => v,
        _ => JsValue::undefined(),
    })
}

fn bind_parameters(ctx: &mut crate::context::Context, env: &Environment, params: &[crate::ast::Binding], args: &[JsValue]) -> JsResult<()> {
    for (i, param) in params.iter().enumerate() {
        let value = args.get(i).cloned().unwrap_or(JsValue::undefined());
        bind_pattern(ctx, env, param, value, DeclKind::Let, true)?;
    }
    Ok(())
}

fn install_arguments_object(env: &Environment, params: &[crate::ast::Binding], args: &[JsValue], strict: bool) {
    use crate::ast::Binding;
    let param_names: Vec<String> = params
        .iter()
        .map(|p| match p {
            Binding::Identifier(name) => name.clone(),
            _ => String::new(),
        })
        .collect();
    let mapped = if strict { Vec::new() } else { param_names };
    let data = crate::environment::ArgumentsData::new(mapped, env.clone(), strict);
    let arguments_obj = JsObject::new(ObjectData::Arguments(data), JsValue::null());
    for (i, arg) in args.iter().enumerate() {
        arguments_obj.borrow_mut().properties_mut().insert(
            crate::property::PropertyKey::Index(i as u32),
            crate::property::PropertyDescriptor::data(arg.clone(), true, true, true),
        );
    }
    arguments_obj.borrow_mut().properties_mut().insert(
        crate::property::PropertyKey::from_str("length"),
        crate::property::PropertyDescriptor::data(JsValue::from(args.len() as u32), true, false, true),
    );
    env.create_mutable_binding("arguments", DeclarationKind::Var);
    env.initialize_binding("arguments", JsValue::Object(arguments_obj));
}

/// Builds a user-defined function object from a parsed `FunctionNode`
/// (spec.md §4.9 "OrdinaryFunctionCreate"), closing over `env`.
pub fn make_function(ctx: &mut crate::context::Context, node: Rc<FunctionNode>, env: Environment) -> JsObject {
    let function_prototype = JsValue::Object(ctx.realm().function_prototype().clone());
    let strict = node.strict;
    let is_constructor = !node.is_arrow && !node.is_async && !node.is_generator;
    let obj = JsObject::new(
        ObjectData::Function(Function::Ordinary(OrdinaryFunctionData {
            node: node.clone(),
            closure: env,
            strict,
            is_constructor,
            prototype_property: None,
        })),
        function_prototype,
    );
    let name = node.name.clone().unwrap_or_default();
    let length = node.params.iter().take_while(|p| matches!(p, crate::ast::Binding::Identifier(_))).count();
    obj.borrow_mut().properties_mut().insert(
        crate::property::PropertyKey::from_str("name"),
        crate::property::PropertyDescriptor::data(JsValue::from(name), false, false, true),
    );
    obj.borrow_mut().properties_mut().insert(
        crate::property::PropertyKey::from_str("length"),
        crate::property::PropertyDescriptor::data(JsValue::from(length as f64), false, false, true),
    );
    if is_constructor {
        let proto = JsObject::ordinary(JsValue::Object(ctx.realm().object_prototype().clone()));
        proto.borrow_mut().properties_mut().insert(
            crate::property::PropertyKey::from_str("constructor"),
            crate::property::PropertyDescriptor::data(JsValue::Object(obj.clone()), true, false, true),
        );
        obj.borrow_mut().properties_mut().insert(
            crate::property::PropertyKey::from_str("prototype"),
            crate::property::PropertyDescriptor::data(JsValue::Object(proto), true, false, false),
        );
    }
    obj
}

pub(crate) fn throw_not_callable() -> JsResult<JsValue> {
    Err(JsNativeError::typ("value is not callable").into())
}

/// Runs a generator's body once against its saved closure environment:
/// the very first run for both of `GeneratorStepper`'s resume strategies,
/// and (for the replay strategy only) every run after that too. `declaration`
/// is a private submodule of this one, so `cps` reaches `hoist_function_body`
/// through this seam rather than needing it to be `pub(crate)` itself.
pub(crate) fn run_generator_body(ctx: &mut crate::context::Context, node: &Rc<FunctionNode>, env: &Environment) -> JsResult<Completion> {
    declaration::hoist_function_body(ctx, &node.body, env)?;
    run_block(ctx, &node.body, env)
}
