//! Var/function hoisting (spec.md §4.9 "FunctionDeclarationInstantiation",
//! generalized to top-level programs and plain blocks alike).
//!
//! `crate::ast::Program::hoisted_var_names` already walks the statement tree
//! collecting `var` names without crossing function boundaries; this module
//! adds the companion pass over function declarations, which (unlike `var`)
//! are bound and initialized eagerly, before the block's statements run.

use crate::ast::{FunctionNode, Statement};
use crate::context::Context;
use crate::environment::{DeclarationKind, Environment};
use crate::error::JsResult;
use crate::exec;
use crate::value::JsValue;
use std::rc::Rc;

/// Top-level program entry: `var`-hoists every name in the tree, then
/// declares+initializes every top-level function declaration.
pub fn hoist_program(ctx: &mut Context, program: &crate::ast::Program, env: &Environment) -> JsResult<()> {
    for name in program.hoisted_var_names() {
        env.create_mutable_binding(&name, DeclarationKind::Var);
    }
    hoist_functions(ctx, &program.body, env)
}

/// A nested block's hoisting pass: function declarations only. `var` names
/// were already collected at the enclosing function/program boundary, so a
/// plain `{ ... }` block just needs its own direct function declarations
/// bound before its statements run (closures created earlier in the block
/// can call a function declared later in it).
pub fn hoist_block(ctx: &mut Context, stmts: &[Statement], env: &Environment) -> JsResult<()> {
    hoist_functions(ctx, stmts, env)
}

/// A function body's hoisting pass: both `var` names scoped to this call and
/// its direct function declarations.
pub fn hoist_function_body(ctx: &mut Context, stmts: &[Statement], env: &Environment) -> JsResult<()> {
    let mut names = Vec::new();
    for stmt in stmts {
        collect_var_names_shallow(stmt, &mut names);
    }
    for name in names {
        if !env.has_binding(&name) {
            env.create_mutable_binding(&name, DeclarationKind::Var);
        }
    }
    hoist_functions(ctx, stmts, env)
}

fn hoist_functions(ctx: &mut Context, stmts: &[Statement], env: &Environment) -> JsResult<()> {
    for stmt in stmts {
        if let Statement::FunctionDeclaration(node) = stmt {
            bind_function_declaration(ctx, node, env);
        }
    }
    Ok(())
}

fn bind_function_declaration(ctx: &mut Context, node: &Rc<FunctionNode>, env: &Environment) {
    let name = node.name.clone().unwrap_or_default();
    let transformed = crate::cps::lower_function(node.clone());
    let func = exec::make_function(ctx, transformed, env.clone());
    if !env.has_binding(&name) {
        env.create_mutable_binding(&name, DeclarationKind::Var);
    }
    env.initialize_binding(&name, JsValue::Object(func));
}

/// Same walk as `ast::Program::hoisted_var_names`, but over a single
/// statement reachable from a function body rather than a whole program;
/// `ast.rs` keeps that walk private, so function-body hoisting re-derives it
/// from the public `collect_binding_names` building block plus its own
/// shallow statement recursion.
fn collect_var_names_shallow(stmt: &Statement, out: &mut Vec<String>) {
    use crate::ast::collect_binding_names;
    match stmt {
        Statement::VariableDeclaration {
            kind: DeclarationKind::Var,
            declarations,
        } => {
            for (binding, _) in declarations {
                collect_binding_names(binding, out);
            }
        }
        Statement::Block(body) => {
            for s in body {
                collect_var_names_shallow(s, out);
            }
        }
        Statement::If { consequent, alternate, .. } => {
            collect_var_names_shallow(consequent, out);
            if let Some(alt) = alternate {
                collect_var_names_shallow(alt, out);
            }
        }
        Statement::For { init, body, .. } => {
            if let Some(init) = init {
                collect_var_names_shallow(init, out);
            }
            collect_var_names_shallow(body, out);
        }
        Statement::ForOf { binding, kind, body, .. } | Statement::ForIn { binding, kind, body, .. } => {
            if matches!(kind, Some(DeclarationKind::Var)) {
                collect_binding_names(binding, out);
            }
            collect_var_names_shallow(body, out);
        }
        Statement::While { body, .. } | Statement::DoWhile { body, .. } | Statement::Labeled { body, .. } => {
            collect_var_names_shallow(body, out);
        }
        Statement::Try { block, handler, finalizer } => {
            for s in block {
                collect_var_names_shallow(s, out);
            }
            if let Some((_, body)) = handler {
                for s in body {
                    collect_var_names_shallow(s, out);
                }
            }
            if let Some(body) = finalizer {
                for s in body {
                    collect_var_names_shallow(s, out);
                }
            }
        }
        _ => {}
    }
}
